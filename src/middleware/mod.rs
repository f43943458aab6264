pub mod auth;

pub use auth::{AuthState, CallerId, auth_middleware};

pub mod analytics;
pub mod chat;
pub mod document;
pub mod metric;
pub mod query_spec;
pub mod rag;

pub use analytics::*;
pub use chat::*;
pub use document::*;
pub use metric::*;
pub use query_spec::*;
pub use rag::*;

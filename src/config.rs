use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub llm: LlmConfig,
    pub vector_store: VectorStoreConfig,
    pub documents: DocumentsConfig,
    pub chat: ChatConfig,
    pub mcp_audit: McpAuditConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Two separate stores: `app_database_url` (sqlite) holds sessions, messages,
/// artifacts, documents, and LLM provider config/cache; `warehouse_database_url`
/// (Postgres) is the KPI warehouse the analytics service (C6) queries.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub app_database_url: String,
    pub warehouse_database_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// The caller-identity extractor's only configuration: the HMAC secret used
/// to verify inbound Bearer tokens (see §10's trimmed-down JwtUtil).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub cache_ttl_hours_as_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub url: String,
    pub collection: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
    pub max_file_size_bytes: u64,
    #[serde(deserialize_with = "deserialize_days_i64")]
    pub files_ttl_days: i64,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub documents_ttl_hours_as_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub stream_queue_size: usize,
    pub max_tokens: u32,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub turn_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct McpAuditConfig {
    pub use_mcp_auditor: bool,
    pub auditor_url: Option<String>,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub auditor_timeout_secs: u64,
    pub run_mcp_stack: bool,
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone)]
#[command(name = "bankwise")]
#[command(version, about = "Bankwise - Conversational banking analytics backend")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Server host (overrides config file)
    #[arg(long, value_name = "HOST")]
    pub server_host: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, value_name = "PORT")]
    pub server_port: Option<u16>,

    /// App state database URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub app_database_url: Option<String>,

    /// KPI warehouse database URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub warehouse_database_url: Option<String>,

    /// Logging level (overrides config file, e.g., "info,bankwise=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Enable/disable the LLM client (overrides config file)
    #[arg(long, value_name = "BOOL")]
    pub llm_enabled: Option<bool>,

    /// JWT signing/verification secret (overrides config file)
    #[arg(long, value_name = "SECRET")]
    pub jwt_secret: Option<String>,

    /// Vector store URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub vector_store_url: Option<String>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables (prefixed with APP_)
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load() -> Result<Self, anyhow::Error> {
        let cli_args = CommandLineArgs::parse();

        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(&cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Supported environment variables:
    /// `APP_SERVER_HOST`, `APP_SERVER_PORT`, `APP_DATABASE_URL`, `APP_WAREHOUSE_DATABASE_URL`,
    /// `APP_LOG_LEVEL`, `APP_LLM_ENABLED`, `APP_JWT_SECRET`, `QDRANT_URL`, `QDRANT_API_KEY`, `MAX_FILE_SIZE`,
    /// `FILES_TTL_DAYS`, `DOCUMENTS_TTL_HOURS`, `USE_MCP_AUDITOR`, `CAPITAL414_AUDITOR_URL`,
    /// `CAPITAL414_AUDITOR_TIMEOUT`, `RUN_MCP_STACK`.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("APP_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("APP_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
        }
        if let Ok(url) = std::env::var("APP_DATABASE_URL") {
            self.database.app_database_url = url;
        }
        if let Ok(url) = std::env::var("APP_WAREHOUSE_DATABASE_URL") {
            self.database.warehouse_database_url = url;
        }
        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(enabled) = std::env::var("APP_LLM_ENABLED")
            && let Ok(val) = enabled.parse()
        {
            self.llm.enabled = val;
        }
        if let Ok(secret) = std::env::var("APP_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(url) = std::env::var("QDRANT_URL") {
            self.vector_store.url = url;
        }
        if let Ok(key) = std::env::var("QDRANT_API_KEY") {
            self.vector_store.api_key = Some(key);
        }
        if let Ok(size) = std::env::var("MAX_FILE_SIZE")
            && let Ok(val) = size.parse()
        {
            self.documents.max_file_size_bytes = val;
        }
        if let Ok(days) = std::env::var("FILES_TTL_DAYS") {
            match parse_days_to_i64(&days) {
                Ok(val) => self.documents.files_ttl_days = val,
                Err(e) => tracing::warn!("invalid FILES_TTL_DAYS '{}': {}", days, e),
            }
        }
        if let Ok(hours) = std::env::var("DOCUMENTS_TTL_HOURS") {
            match parse_duration_to_secs(&hours) {
                Ok(val) => self.documents.documents_ttl_hours_as_secs = val,
                Err(e) => tracing::warn!("invalid DOCUMENTS_TTL_HOURS '{}': {}", hours, e),
            }
        }
        if let Ok(val) = std::env::var("USE_MCP_AUDITOR")
            && let Ok(val) = val.parse()
        {
            self.mcp_audit.use_mcp_auditor = val;
        }
        if let Ok(url) = std::env::var("CAPITAL414_AUDITOR_URL") {
            self.mcp_audit.auditor_url = Some(url);
        }
        if let Ok(timeout) = std::env::var("CAPITAL414_AUDITOR_TIMEOUT") {
            match parse_duration_to_secs(&timeout) {
                Ok(val) => self.mcp_audit.auditor_timeout_secs = val,
                Err(e) => tracing::warn!("invalid CAPITAL414_AUDITOR_TIMEOUT '{}': {}", timeout, e),
            }
        }
        if let Ok(val) = std::env::var("RUN_MCP_STACK")
            && let Ok(val) = val.parse()
        {
            self.mcp_audit.run_mcp_stack = val;
        }
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.server_host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.server_port {
            self.server.port = port;
        }
        if let Some(url) = &args.app_database_url {
            self.database.app_database_url = url.clone();
        }
        if let Some(url) = &args.warehouse_database_url {
            self.database.warehouse_database_url = url.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if let Some(enabled) = args.llm_enabled {
            self.llm.enabled = enabled;
        }
        if let Some(secret) = &args.jwt_secret {
            self.auth.jwt_secret = secret.clone();
        }
        if let Some(url) = &args.vector_store_url {
            self.vector_store.url = url.clone();
        }
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("server.port cannot be 0");
        }
        if self.database.app_database_url.is_empty() {
            anyhow::bail!("database.app_database_url cannot be empty");
        }
        if self.database.warehouse_database_url.is_empty() {
            anyhow::bail!("database.warehouse_database_url cannot be empty");
        }
        if self.documents.max_file_size_bytes == 0 {
            anyhow::bail!("documents.max_file_size_bytes must be > 0");
        }
        if self.chat.stream_queue_size == 0 {
            anyhow::bail!("chat.stream_queue_size must be > 0");
        }
        if self.auth.jwt_secret.is_empty() {
            anyhow::bail!("auth.jwt_secret cannot be empty");
        }
        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths = ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];
        possible_paths.iter().find(|p| Path::new(p).exists()).map(|p| p.to_string())
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            app_database_url: "sqlite://data/bankwise.db".to_string(),
            warehouse_database_url: "postgres://localhost/bank_kpis".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,bankwise=debug".to_string(), file: Some("logs/bankwise.log".to_string()) }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { jwt_secret: "dev-secret-key-change-in-production".to_string() }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self { enabled: true, cache_ttl_hours_as_secs: 24 * 3600 }
    }
}

impl LlmConfig {
    pub fn cache_ttl_hours(&self) -> i64 {
        (self.cache_ttl_hours_as_secs / 3600) as i64
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            collection: "bank_documents".to_string(),
            api_key: None,
        }
    }
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 20 * 1024 * 1024,
            files_ttl_days: 30,
            documents_ttl_hours_as_secs: 72 * 3600,
        }
    }
}

impl DocumentsConfig {
    pub fn documents_ttl_hours(&self) -> i64 {
        (self.documents_ttl_hours_as_secs / 3600) as i64
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { stream_queue_size: 10, max_tokens: 4096, turn_timeout_secs: 60 }
    }
}

impl Default for McpAuditConfig {
    fn default() -> Self {
        Self {
            use_mcp_auditor: false,
            auditor_url: None,
            auditor_timeout_secs: 10,
            run_mcp_stack: false,
        }
    }
}

// =========================
// Helpers for parsing values
// =========================

fn parse_duration_to_secs(input: &str) -> Result<u64, String> {
    if let Ok(val) = input.parse::<u64>() {
        return Ok(val);
    }

    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: u64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Ok(n),
        "m" | "min" | "mins" | "minute" | "minutes" => Ok(n * 60),
        "h" | "hr" | "hour" | "hours" => Ok(n * 60 * 60),
        "d" | "day" | "days" => Ok(n * 60 * 60 * 24),
        _ => Err(format!("unsupported unit: {}", unit)),
    }
}

fn parse_days_to_i64(input: &str) -> Result<i64, String> {
    if let Ok(val) = input.parse::<i64>() {
        return Ok(val);
    }

    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: i64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "d" | "day" | "days" => Ok(n),
        "w" | "week" | "weeks" => Ok(n * 7),
        _ => Err(format!("unsupported unit: {}", unit)),
    }
}

fn deserialize_duration_secs<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = u64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a number of seconds or a string like '30s', '5m', '1h'")
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v)
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if v >= 0 { Ok(v as u64) } else { Err(E::custom("negative not allowed")) }
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(v).map_err(E::custom)
        }
        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(&v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}

fn deserialize_days_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = i64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a number of days or a string like '7d' or '2w'")
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(v)
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v as i64)
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_days_to_i64(v).map_err(E::custom)
        }
        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_days_to_i64(&v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}

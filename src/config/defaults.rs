//! Default values for configuration

/// Backend used when nothing else is configured
pub const PRODUCTION_API_BASE_URL: &str = "https://reto-rag-production.up.railway.app";

/// Environment variable selecting the backend base URL
pub const API_BASE_URL_ENV: &str = "DOCCHAT_API_BASE_URL";

/// Default backend base URL (env override, then production)
pub fn default_api_base_url() -> String {
    std::env::var(API_BASE_URL_ENV).unwrap_or_else(|_| PRODUCTION_API_BASE_URL.to_string())
}

/// Default: no request timeout
pub fn default_request_timeout_secs() -> Option<u64> {
    None
}

/// Default document status polling interval (3 seconds)
pub fn default_poll_interval_ms() -> u64 {
    3000
}

/// Default maximum upload size (10 MiB)
pub fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}

/// Default delay before the authoritative refetch after an upload
pub fn default_refetch_delay_ms() -> u64 {
    1000
}

/// Default simulated upload progress tick
pub fn default_progress_tick_ms() -> u64 {
    200
}

/// Default delay before upload progress returns to zero
pub fn default_progress_reset_ms() -> u64 {
    1000
}

/// Default maximum chat message length
pub fn default_max_message_chars() -> usize {
    2000
}

/// Default maximum session name length
pub fn default_session_name_max_chars() -> usize {
    100
}

/// Name of the session created automatically on first run
pub fn default_session_name() -> String {
    "Mi primera sesión".to_string()
}

/// Default user agent
pub fn default_user_agent() -> String {
    format!("docchat/{}", env!("CARGO_PKG_VERSION"))
}

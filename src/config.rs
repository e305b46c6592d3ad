use std::time::Duration;

/// Items per page, shared by every list the engine drives.
pub const PAGE_SIZE: usize = 10;

/// Distance from the bottom (in scroll units) at which the next page is requested.
pub const SCROLL_THRESHOLD: f64 = 100.0;

/// Client settings derived from env.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    pub api_url: String,
    pub fetch_timeout: Duration,
    pub session_token: Option<String>,
}

impl FeedConfig {
    pub fn from_env() -> Self {
        fn dur_env(name: &str, default: u64) -> Duration { Duration::from_secs(std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)) }
        Self {
            api_url: std::env::var("FORUM_API_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            fetch_timeout: dur_env("FORUM_FETCH_TIMEOUT_SECS", 10),
            session_token: std::env::var("FORUM_SESSION_TOKEN").ok().filter(|t| !t.trim().is_empty()),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".to_string(),
            fetch_timeout: Duration::from_secs(10),
            session_token: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn from_env_reads_overrides() {
        std::env::set_var("FORUM_API_URL", "http://forum.test/");
        std::env::set_var("FORUM_FETCH_TIMEOUT_SECS", "3");
        std::env::set_var("FORUM_SESSION_TOKEN", "  ");
        let cfg = FeedConfig::from_env();
        assert_eq!(cfg.api_url, "http://forum.test");
        assert_eq!(cfg.fetch_timeout, Duration::from_secs(3));
        assert!(cfg.session_token.is_none());
        std::env::remove_var("FORUM_API_URL");
        std::env::remove_var("FORUM_FETCH_TIMEOUT_SECS");
        std::env::remove_var("FORUM_SESSION_TOKEN");
    }

    #[test]
    #[serial]
    fn from_env_defaults() {
        std::env::remove_var("FORUM_API_URL");
        std::env::remove_var("FORUM_FETCH_TIMEOUT_SECS");
        let cfg = FeedConfig::from_env();
        assert_eq!(cfg.api_url, "http://localhost:8080");
        assert_eq!(cfg.fetch_timeout, Duration::from_secs(10));
    }
}

//! Environment variable configuration module.
//!
//! Provides environment variable loading and the global `APP_CONFIG` instance.

use std::env;
use std::sync::Once;

use once_cell::sync::Lazy;

static INIT: Once = Once::new();

/// Origins allowed by default for local frontend development.
pub const DEFAULT_CORS_ORIGINS: [&str; 4] = [
    "http://localhost:5173",
    "http://127.0.0.1:5173",
    "http://localhost:3000",
    "http://127.0.0.1:3000",
];

/// Initializes the environment by loading the .env file.
/// This is called automatically when `get_env` is first used.
fn init_env() {
    INIT.call_once(|| {
        if let Err(e) = dotenvy::dotenv() {
            tracing::warn!("Warning: .env file not found or error loading: {}", e);
        }
    });
}

/// Retrieves an environment variable by key.
///
/// If the variable is not set, returns the provided default value.
/// If no default is provided and the variable is not set, returns an empty string.
pub fn get_env(key: &str, default: Option<&str>) -> String {
    init_env();
    env::var(key).unwrap_or_else(|_| default.unwrap_or("").to_string())
}

/// Retrieves an environment variable as a parsed type.
pub fn get_env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    init_env();
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Retrieves a boolean flag (`true`, `1`, `yes`, `on`, case-insensitive).
pub fn get_env_flag(key: &str, default: bool) -> bool {
    init_env();
    env::var(key).map_or(default, |v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        )
    })
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Server settings
    pub server_port: u16,

    // Environment
    pub is_production: bool,

    // Sentry settings
    pub sentry_dsn: String,
    pub sentry_traces_sample_rate: f32,

    // Apify settings
    pub apify_api_key: String,
    pub apify_base_url: String,
    pub idealista_standby_url: String,
    pub idealista_actor_id: String,
    pub immobiliare_actor_id: String,
    pub james_edition_actor_id: String,
    pub apify_poll_interval_secs: u64,
    pub apify_run_max_wait_secs: u64,
    pub apify_run_sync_timeout_secs: u64,

    // Cache settings
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    pub redis_max_connections: usize,

    // CORS settings
    pub cors_origins: String,
    pub frontend_url: String,

    // Rate limiting
    pub rate_limit_per_second: u64,
    pub rate_limit_burst_size: u32,

    // Matching
    pub rental_index_path: String,
    pub match_top_k: usize,
    pub scrape_match_top_k: usize,
}

impl AppConfig {
    /// Creates a new `AppConfig` from environment variables.
    pub fn from_env() -> Self {
        let rust_env = get_env("RUST_ENV", Some("development"));
        let is_production = rust_env == "production" || rust_env == "prod";

        Self {
            server_port: get_env_parsed("PORT", 8000),

            is_production,

            sentry_dsn: get_env("SENTRY_DSN", None),
            sentry_traces_sample_rate: get_env_parsed("SENTRY_TRACES_SAMPLE_RATE", 0.1),

            apify_api_key: get_env("APIFY_API_KEY", None).trim().to_string(),
            apify_base_url: get_env("APIFY_BASE_URL", Some("https://api.apify.com")),
            idealista_standby_url: get_env(
                "IDEALISTA_STANDBY_URL",
                Some("https://dz-omar--idealista-scraper-api.apify.actor/"),
            ),
            idealista_actor_id: get_env("IDEALISTA_ACTOR_ID", Some("dz_omar~idealista-scraper-api")),
            immobiliare_actor_id: get_env("IMMOBILIARE_ACTOR_ID", Some("p9QZzUdBCGXMDuKad")),
            james_edition_actor_id: get_env(
                "JAMES_EDITION_ACTOR_ID",
                Some("parseforge~james-edition-real-estate-scraper"),
            ),
            apify_poll_interval_secs: get_env_parsed("APIFY_POLL_INTERVAL_SECS", 5),
            apify_run_max_wait_secs: get_env_parsed("APIFY_RUN_MAX_WAIT_SECS", 600),
            apify_run_sync_timeout_secs: get_env_parsed("APIFY_RUN_SYNC_TIMEOUT_SECS", 600),

            cache_enabled: get_env_flag("CACHE_ENABLED", false),
            cache_ttl_secs: get_env_parsed("CACHE_TTL_SECS", 3600),
            redis_max_connections: get_env_parsed("REDIS_MAX_CONNECTIONS", 20),

            cors_origins: get_env("CORS_ORIGINS", None),
            frontend_url: get_env("FRONTEND_URL", None).trim().to_string(),

            rate_limit_per_second: get_env_parsed("RATE_LIMIT_PER_SECOND", 10),
            rate_limit_burst_size: get_env_parsed("RATE_LIMIT_BURST_SIZE", 50),

            rental_index_path: get_env("RENTAL_INDEX_PATH", Some("data/rental_index.json")),
            match_top_k: get_env_parsed("MATCH_TOP_K", 5),
            scrape_match_top_k: get_env_parsed("SCRAPE_MATCH_TOP_K", 10),
        }
    }

    /// Whether an Apify token is available for the scrapers.
    pub fn scrapers_configured(&self) -> bool {
        !self.apify_api_key.is_empty()
    }

    /// Returns `true` when CORS should accept any origin.
    ///
    /// The `*` wildcard is ignored in production, where only the explicit
    /// origins and `FRONTEND_URL` are allowed.
    pub fn cors_allow_any(&self) -> bool {
        !self.is_production && self.cors_origins.trim() == "*"
    }

    /// Environment name reported to Sentry.
    pub const fn environment_name(&self) -> &'static str {
        if self.is_production {
            "production"
        } else {
            "development"
        }
    }

    /// Resolves the allowed CORS origins.
    ///
    /// Uses `CORS_ORIGINS` when set, otherwise the local development origins.
    /// `FRONTEND_URL` is appended in both its http and https form.
    pub fn cors_origins(&self) -> Vec<String> {
        let mut origins: Vec<String> = if self.cors_origins.trim().is_empty() {
            DEFAULT_CORS_ORIGINS.iter().map(ToString::to_string).collect()
        } else {
            self.cors_origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty() && *s != "*")
                .map(ToString::to_string)
                .collect()
        };

        let frontend = self.frontend_url.trim_end_matches('/');
        if !frontend.is_empty() {
            origins.push(frontend.to_string());
            if let Some(rest) = frontend.strip_prefix("http://") {
                origins.push(format!("https://{rest}"));
            } else if let Some(rest) = frontend.strip_prefix("https://") {
                origins.push(format!("http://{rest}"));
            }
        }

        let mut seen = std::collections::HashSet::new();
        origins.retain(|o| seen.insert(o.clone()));
        origins
    }
}

/// Global application configuration instance.
pub static APP_CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(cors_origins: &str, frontend_url: &str) -> AppConfig {
        AppConfig {
            cors_origins: cors_origins.to_string(),
            frontend_url: frontend_url.to_string(),
            is_production: false,
            ..AppConfig::from_env()
        }
    }

    // ============ get_env 함수 테스트 ============

    #[test]
    fn test_get_env_with_default() {
        let result = get_env("NON_EXISTENT_VAR_FOR_TEST_12345", Some("default_value"));
        assert_eq!(result, "default_value");
    }

    #[test]
    fn test_get_env_no_default() {
        let result = get_env("NON_EXISTENT_VAR_FOR_TEST_67890", None);
        assert_eq!(result, "");
    }

    // ============ get_env_parsed 함수 테스트 ============

    #[test]
    fn test_get_env_parsed_default_u16() {
        let result: u16 = get_env_parsed("NON_EXISTENT_U16_VAR", 8000);
        assert_eq!(result, 8000);
    }

    #[test]
    fn test_get_env_parsed_default_f32() {
        let result: f32 = get_env_parsed("NON_EXISTENT_F32_VAR", 0.5);
        assert!((result - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_get_env_flag_default() {
        assert!(get_env_flag("NON_EXISTENT_FLAG_VAR_1", true));
        assert!(!get_env_flag("NON_EXISTENT_FLAG_VAR_2", false));
    }

    // ============ AppConfig 구조체 테스트 ============

    #[test]
    fn test_app_config_from_env_defaults() {
        let config = AppConfig::from_env();

        assert!(config.server_port > 0);
        assert!(config.apify_poll_interval_secs > 0);
        assert!(config.rate_limit_per_second > 0);
        assert!(config.match_top_k > 0);
        assert!(config.scrape_match_top_k > 0);
        assert!(!config.rental_index_path.is_empty());
    }

    #[test]
    fn test_app_config_debug() {
        let config = AppConfig::from_env();
        let debug_str = format!("{config:?}");

        assert!(debug_str.contains("AppConfig"));
        assert!(debug_str.contains("server_port"));
        assert!(debug_str.contains("rental_index_path"));
    }

    #[test]
    fn test_scrapers_configured_requires_key() {
        let mut config = AppConfig::from_env();
        config.apify_api_key = String::new();
        assert!(!config.scrapers_configured());

        config.apify_api_key = "apify_api_token".to_string();
        assert!(config.scrapers_configured());
    }

    // ============ CORS origin 테스트 ============

    #[test]
    fn test_cors_origins_default_list() {
        let config = config_with("", "");
        let origins = config.cors_origins();

        assert_eq!(origins.len(), 4);
        assert!(origins.contains(&"http://localhost:5173".to_string()));
        assert!(origins.contains(&"http://127.0.0.1:3000".to_string()));
    }

    #[test]
    fn test_cors_origins_frontend_url_both_schemes() {
        let config = config_with("", "https://app.example.com/");
        let origins = config.cors_origins();

        assert!(origins.contains(&"https://app.example.com".to_string()));
        assert!(origins.contains(&"http://app.example.com".to_string()));
        assert_eq!(origins.len(), 6);
    }

    #[test]
    fn test_cors_origins_explicit_list() {
        let config = config_with("https://a.example.com, https://b.example.com", "");
        let origins = config.cors_origins();

        assert_eq!(
            origins,
            vec![
                "https://a.example.com".to_string(),
                "https://b.example.com".to_string()
            ]
        );
    }

    #[test]
    fn test_cors_origins_deduplicated() {
        let config = config_with("http://localhost:3000", "http://localhost:3000");
        let origins = config.cors_origins();

        assert_eq!(
            origins,
            vec![
                "http://localhost:3000".to_string(),
                "https://localhost:3000".to_string()
            ]
        );
    }

    #[test]
    fn test_cors_allow_any() {
        assert!(config_with("*", "").cors_allow_any());
        assert!(!config_with("", "").cors_allow_any());
    }

    #[test]
    fn test_production_ignores_cors_wildcard() {
        let mut config = config_with("*", "https://app.example.com");
        config.is_production = true;

        assert!(!config.cors_allow_any());
        assert_eq!(
            config.cors_origins(),
            vec![
                "https://app.example.com".to_string(),
                "http://app.example.com".to_string()
            ]
        );
    }

    #[test]
    fn test_environment_name() {
        let mut config = config_with("", "");
        assert_eq!(config.environment_name(), "development");

        config.is_production = true;
        assert_eq!(config.environment_name(), "production");
    }
}

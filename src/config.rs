use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::models::SuggestionSeed;

/// Main configuration structure for the SpotOn client core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub services: ServicesConfig,
    pub http: HttpConfig,
    pub search: SearchConfig,
    pub map: MapConfig,
    pub chat: ChatConfig,
    pub detail: DetailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// POST endpoint returning rating and description for a locality
    pub locality_url: String,
    /// POST endpoint answering free-text questions
    pub assistant_url: String,
    /// GET endpoint of a Nominatim-compatible search API
    pub geocoder_url: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_base: f64,
    pub jitter_factor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionFilter {
    /// Always offer the full seed list
    #[default]
    All,
    /// Case-insensitive prefix match on the current query
    Prefix,
    /// Skim fuzzy ranking against the current query
    Fuzzy,
}

impl SuggestionFilter {
    fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "all" => Some(Self::All),
            "prefix" => Some(Self::Prefix),
            "fuzzy" => Some(Self::Fuzzy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub suggestions: Vec<SuggestionSeed>,
    pub blur_grace_ms: u64,
    #[serde(default)]
    pub filter: SuggestionFilter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    pub highlight_radius_m: f64,
    pub zoom: u8,
    pub fly_duration_ms: u64,
    pub ease_linearity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub greeting: String,
    pub fallback_error: String,
    /// Re-seed the transcript whenever a new locality becomes current
    #[serde(default)]
    pub reset_on_selection: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailConfig {
    pub default_time_range_years: u32,
}

impl Config {
    /// Load configuration from file with environment variable overrides
    /// Always returns a usable config
    pub fn load() -> Self {
        let env_paths = ["../.env", ".env"];

        let mut env_loaded = false;
        for path in &env_paths {
            if dotenvy::from_path(path).is_ok() {
                tracing::info!("Loaded .env from: {}", path);
                env_loaded = true;
                break;
            }
        }

        if !env_loaded {
            tracing::debug!("No .env file found - continuing with env vars only");
        }

        let config_path =
            env::var("SPOTON_CONFIG_PATH").unwrap_or_else(|_| "spoton.yaml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => Self::from_yaml(&contents).unwrap_or_else(|e| {
                    tracing::error!(
                        "Failed to parse config file {}: {} - using defaults",
                        config_path,
                        e
                    );
                    Self::default()
                }),
                Err(e) => {
                    tracing::error!(
                        "Failed to read config file {}: {} - using defaults",
                        config_path,
                        e
                    );
                    Self::default()
                }
            }
        } else {
            tracing::warn!("Config file not found at {} - using defaults", config_path);
            Self::default()
        };

        config.apply_env_overrides();

        if let Err(e) = config.validate() {
            tracing::warn!("Config validation warnings: {} - continuing anyway", e);
        }

        config
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        let config = serde_yaml::from_str::<Config>(contents)?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("SPOTON_LOCALITY_URL") {
            self.services.locality_url = url;
        }
        if let Some(url) = var("SPOTON_ASSISTANT_URL") {
            self.services.assistant_url = url;
        }
        if let Some(url) = var("SPOTON_GEOCODER_URL") {
            self.services.geocoder_url = url;
        }
        if let Some(agent) = var("SPOTON_USER_AGENT") {
            self.services.user_agent = agent;
        }

        if let Some(timeout) = var("SPOTON_HTTP_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse() {
                self.http.timeout_seconds = secs;
            }
        }
        if let Some(attempts) = var("SPOTON_RETRY_MAX_ATTEMPTS") {
            if let Ok(n) = attempts.parse() {
                self.http.retry.max_attempts = n;
            }
        }

        if let Some(list) = var("SPOTON_SUGGESTIONS") {
            let seeds: Vec<SuggestionSeed> = list
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| {
                    // Keep known coordinates for names that were already seeded
                    let known = self
                        .search
                        .suggestions
                        .iter()
                        .find(|s| s.name.eq_ignore_ascii_case(name))
                        .and_then(|s| s.coordinates);
                    SuggestionSeed::new(name, known)
                })
                .collect();
            if !seeds.is_empty() {
                self.search.suggestions = seeds;
            }
        }
        if let Some(grace) = var("SPOTON_BLUR_GRACE_MS") {
            if let Ok(ms) = grace.parse() {
                self.search.blur_grace_ms = ms;
            }
        }
        if let Some(filter) = var("SPOTON_SUGGESTION_FILTER") {
            match SuggestionFilter::from_string(&filter) {
                Some(f) => self.search.filter = f,
                None => tracing::warn!("Unknown suggestion filter: {}. Keeping current.", filter),
            }
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        for (name, url) in [
            ("locality_url", &self.services.locality_url),
            ("assistant_url", &self.services.assistant_url),
            ("geocoder_url", &self.services.geocoder_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("services.{name} must be an http(s) URL, got '{url}'").into());
            }
        }

        if self.http.timeout_seconds == 0 {
            return Err("http.timeout_seconds cannot be 0".into());
        }
        if self.http.retry.max_attempts == 0 {
            return Err("http.retry.max_attempts cannot be 0".into());
        }
        if self.http.retry.jitter_factor < 0.0 || self.http.retry.jitter_factor > 1.0 {
            return Err("Retry jitter factor must be between 0.0 and 1.0".into());
        }

        if self.search.suggestions.is_empty() {
            return Err("search.suggestions is empty - the search box will offer nothing".into());
        }
        if self.map.highlight_radius_m <= 0.0 {
            return Err("map.highlight_radius_m must be positive".into());
        }
        if self.chat.fallback_error.trim().is_empty() {
            return Err("chat.fallback_error cannot be empty".into());
        }

        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_seconds)
    }

    pub fn blur_grace(&self) -> Duration {
        Duration::from_millis(self.search.blur_grace_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            services: ServicesConfig {
                locality_url: "https://bedrock-llm-api.vercel.app/rate-locality".to_string(),
                assistant_url: "https://bedrock-llm-api.vercel.app/ask".to_string(),
                geocoder_url: "https://nominatim.openstreetmap.org/search".to_string(),
                user_agent: format!("spoton/{}", env!("CARGO_PKG_VERSION")),
            },
            http: HttpConfig {
                timeout_seconds: 20,
                retry: RetryConfig {
                    max_attempts: 3,
                    initial_delay_ms: 200,
                    max_delay_ms: 5000,
                    backoff_base: 2.0,
                    jitter_factor: 0.2,
                },
            },
            search: SearchConfig {
                // Names only; the map geocodes unless a seed opts into coordinates
                suggestions: ["Sarjapur", "Whitefield", "Varthur", "Electronic City"]
                    .into_iter()
                    .map(|name| SuggestionSeed::new(name, None))
                    .collect(),
                blur_grace_ms: 200,
                filter: SuggestionFilter::All,
            },
            map: MapConfig {
                highlight_radius_m: 800.0,
                zoom: 15,
                fly_duration_ms: 1500,
                ease_linearity: 0.25,
            },
            chat: ChatConfig {
                greeting: "Hello! Ask me anything about this locality.".to_string(),
                fallback_error: "Sorry, there was an error processing your request.".to_string(),
                reset_on_selection: false,
            },
            detail: DetailConfig {
                default_time_range_years: 5,
            },
        }
    }
}

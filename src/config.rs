use serde::Deserialize;
use url::Url;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time;
use crate::SptoolsError;

/// Constants for HTTP Config
pub const HTTP_TIMEOUT: u64 = 8000;
pub const HTTP_CONNECT_TIMEOUT: u64 = 2000;
pub const HTTP_POOL_MAX_IDLE: usize = 4;
pub const HTTP_POOL_IDLE_TIMEOUT: u64 = 90000;
pub const HTTP_MAX_REDIRECTS: u8 = 4;

pub const RETRY_MAX_ATTEMPTS: u8 = 4;
pub const RETRY_BASE_BACKOFF: u64 = 250;
pub const RETRY_JITTER: bool = true;
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

pub const DEFAULT_CONFIG_FILE: &str = "sptools.toml";
pub const DEFAULT_DB_URL: &str = "sqlite:./data/sptools.db";

/// Wrapper over env::var to return an invalid enviroment var error
fn env_check(s: &str) -> Result<String, SptoolsError> {
    match std::env::var(s) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(SptoolsError::Config(format!("{s} was not set"))),
    }
}

/// Ensures that url is https
fn ensure_https(url: &Url) -> Result<(), String> {
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(format!("URL must be https: {url}"))
    }
}

fn ensure_host(url: &Url, expected_host: &str) -> Result<(), String> {
    match url.host_str() {
        Some(h) if h.eq_ignore_ascii_case(expected_host) => Ok(()),
        Some(h) => Err(
            format!("Unexpected host for {url} (got {h}, expected {expected_host})")
        ),
        None => Err(format!("URL missing host: {url}"))
    }
}

/// Configuration that Spotify expects when hitting endpoints
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub token_url: Url,
    pub api_base: Url,
}

fn build_spotify() -> Result<SpotifyConfig, SptoolsError> {
    let client_id     = env_check("SPOTIFY_CLIENT_ID")?;
    let client_secret = env_check("SPOTIFY_CLIENT_SECRET")?;
    let refresh_token = env_check("SPOTIFY_REFRESH_TOKEN")?;

    // form urls
    let token_url = std::env::var("SPOTIFY_TOKEN_URL")
        .unwrap_or_else(|_| "https://accounts.spotify.com/api/token".to_string());

    let api_base  = std::env::var("SPOTIFY_API_BASE")
        .unwrap_or_else(|_| "https://api.spotify.com/v1/".to_string());

    let token_url = Url::parse(&token_url)
        .map_err(|e| SptoolsError::Config(format!("SPOTIFY_TOKEN_URL invalid {e}")))?;

    let mut api_base = Url::parse(&api_base)
        .map_err(|e| SptoolsError::Config(format!("SPOTIFY_API_BASE invalid {e}")))?;

    // ensure valid https and hostname for both urls
    ensure_https(&token_url).map_err(SptoolsError::Config)?;
    ensure_https(&api_base).map_err(SptoolsError::Config)?;
    ensure_host(&token_url, "accounts.spotify.com").map_err(SptoolsError::Config)?;
    ensure_host(&api_base, "api.spotify.com").map_err(SptoolsError::Config)?;

    if !api_base.path().ends_with('/') {
        let mut path = api_base.path().to_string();
        path.push('/');
        api_base.set_path(&path);
    }

    Ok( SpotifyConfig { client_id, client_secret, refresh_token, token_url, api_base })
}

///
/// Configuration for Http timeouts, retries, etc.
///
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u8,
    pub base_backoff: time::Duration,
    pub jitter: bool,
    pub retryable_statuses: Vec<u16>,
    pub retry_transport_errors: bool
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            base_backoff: time::Duration::from_millis(RETRY_BASE_BACKOFF),
            jitter: RETRY_JITTER,
            retryable_statuses: RETRYABLE_STATUSES.to_vec(),
            retry_transport_errors: true
        }
    }
}

impl RetryConfig {
    /// Policy for requests that change server state. Only a 429 is known
    /// to be rejected before it is applied, everything else is returned
    pub fn for_mutation(&self) -> Self {
        Self {
            retryable_statuses: vec![429],
            retry_transport_errors: false,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: time::Duration,
    pub connect_timeout: time::Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: time::Duration,
    pub max_redirects: u8,
    pub retry: RetryConfig
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: time::Duration::from_millis(HTTP_TIMEOUT),
            connect_timeout: time::Duration::from_millis(HTTP_CONNECT_TIMEOUT),
            pool_max_idle_per_host: HTTP_POOL_MAX_IDLE,
            pool_idle_timeout: time::Duration::from_millis(HTTP_POOL_IDLE_TIMEOUT),
            max_redirects: HTTP_MAX_REDIRECTS,
            retry: RetryConfig::default()
        }
    }
}

///
/// Configuration for the snapshot store, read from the toml config file
///
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PersistenceConfig {
    pub db_url: String,
    pub only_owned_playlists: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            db_url: DEFAULT_DB_URL.to_string(),
            only_owned_playlists: false,
        }
    }
}

impl PersistenceConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, SptoolsError> {
        Ok(toml::from_str(contents)?)
    }

    /// An explicitly requested file must exist, the default one may not
    pub fn load(explicit: Option<&Path>) -> Result<Self, SptoolsError> {
        let path: PathBuf = match explicit {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let contents = std::fs::read_to_string(&path)
            .map_err(|e| SptoolsError::Config(
                format!("read config file {}: {e}", path.display())
            ))?;
        Self::from_toml_str(&contents).map_err(|e| SptoolsError::Config(
            format!("parse config file {}: {e}", path.display())
        ))
    }
}

///
/// Configuration for Logger
///

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json
}

impl FromStr for LogFormat {
    type Err = SptoolsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json"   => Ok(LogFormat::Json),
            other => Err(SptoolsError::Config(
                format!("SPTOOLS_LOG_FORMAT must be pretty or json, got {other:?}")
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter_directives: String,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub include_file_line: bool,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter_directives: "warn,sptools=info".to_string(),
            format: LogFormat::Pretty,
            with_ansi: true,
            include_file_line: false,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Defaults with the format taken from `SPTOOLS_LOG_FORMAT` when set
    pub fn with_format(format: Option<&str>) -> Result<Self, SptoolsError> {
        let mut cfg = Self::default();
        if let Some(format) = format {
            cfg.format = format.parse()?;
        }
        Ok(cfg)
    }
}

///
/// AppConfig which holds everything the commands need
///
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub spotify: SpotifyConfig,
    pub http: HttpConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig
}

///
/// Return all configuration to caller at program start.
///
pub fn load_config() -> Result<AppConfig, SptoolsError> {
    dotenvy::dotenv().ok();

    let explicit    = std::env::var("SPTOOLS_CONFIG").ok().map(PathBuf::from);
    let persistence = PersistenceConfig::load(explicit.as_deref())?;
    let spotify     = build_spotify()?;
    let http        = HttpConfig::default();
    let log_format  = std::env::var("SPTOOLS_LOG_FORMAT").ok();
    let logging     = LoggingConfig::with_format(log_format.as_deref())?;

    Ok( AppConfig { spotify, http, persistence, logging } )
}

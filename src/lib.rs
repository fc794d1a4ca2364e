use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

pub mod auth;
pub mod calendar;
pub mod tokens;
pub mod web;

/// Result type used throughout this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type returned by all fallible operations within this crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Auth(#[from] auth::AuthError),
    #[error(transparent)]
    Store(#[from] tokens::StoreError),
    #[error(transparent)]
    Gateway(#[from] calendar::GatewayError),
    #[error(transparent)]
    Form(#[from] web::forms::FormError),
}

/// Website specific configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct SiteConfig {
    /// The site title.
    pub title: String,
    /// The tagline displayed next to the site title.
    pub tagline: String,
}

/// Web server configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ServerConfig {
    /// Address on which the web server will listen.
    pub listen_addr: SocketAddr,
    /// Automatically reload templates when they are modified.
    pub template_autoreload: bool,
    /// Path to the template directory.
    pub template_dir: PathBuf,
    /// Path to the static directory.
    pub static_dir: PathBuf,
}

/// Google OAuth client configuration.
///
/// Both values usually come from the environment (`GOOGLE__CLIENT_ID` /
/// `GOOGLE__CLIENT_SECRET`, or the `TERMINE_`-prefixed variants). Missing
/// values are only an error once the OAuth flow is actually initiated.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct GoogleConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Sign-in and OAuth flow configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct AuthConfig {
    /// Identity the token record is stored under after a successful
    /// authorization. Single-tenant by design.
    pub user_id: String,
    /// How anti-forgery state values are checked on the OAuth callback.
    pub state_validation: auth::state::StateValidation,
}

/// Calendar configuration section.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct CalendarConfig {
    /// Time zone attached to event start/end timestamps on writes and used
    /// to render form timestamps.
    pub time_zone: chrono_tz::Tz,
    /// Upper bound on events fetched for the dashboard.
    pub max_results: u32,
}

/// Token store configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct StoreConfig {
    /// Path to the SQLite database holding token records.
    pub path: PathBuf,
}

/// Global application configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct AppConfig {
    /// Server configuration section.
    pub server: ServerConfig,
    /// Website configuration section.
    pub site: SiteConfig,
    /// Google OAuth client section.
    #[serde(default)]
    pub google: GoogleConfig,
    /// Sign-in configuration section.
    pub auth: AuthConfig,
    /// Calendar configuration section.
    pub calendar: CalendarConfig,
    /// Token store configuration section.
    pub store: StoreConfig,
}

impl AppConfig {
    /// Loads the application configuration from files in the `config/` directory and environment
    /// variables.
    pub fn load() -> Result<AppConfig> {
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".into());

        log::info!("loading configuration using {} environment", app_env);

        let config = Config::builder()
            // Configuration defaults from `config/default.toml`.
            .add_source(File::with_name("config/default"))
            // Optional environment specific config overrides, e.g. `config/production.toml`.
            .add_source(File::with_name(&format!("config/{}", app_env)).required(false))
            // Optional local config overrides from `config/local.toml` (on .gitignore).
            .add_source(File::with_name("config/local").required(false))
            // Config from environment variables.
            .add_source(Environment::default().separator("__"))
            // Config from environment variables prefixed with `TERMINE_`.
            .add_source(
                Environment::with_prefix("TERMINE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }
}

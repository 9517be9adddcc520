// Application configuration, loaded from environment variables and CLI flags.

use std::path::PathBuf;

use crate::engine::config::{MatchDuration, MatchRules};
use crate::engine::session::SessionSettings;
use crate::error::CoreError;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Directory containing pre-built frontend files to serve.
    pub static_dir: Option<PathBuf>,
    /// Bout length used until the officials pick another.
    pub duration: MatchDuration,
    /// Division name stamped on match logs.
    pub division: String,
    /// Referee name stamped on match logs.
    pub referee_name: String,
}

impl Config {
    /// Load configuration from the process environment and arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:kumite.db?mode=rwc`)
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `STATIC_DIR` - Path to frontend dist directory for static file serving
    /// - `KUMITE_DURATION` - Bout length label, e.g. `2:00` (default)
    /// - `KUMITE_DIVISION`, `KUMITE_REFEREE` - Log entry context
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    /// - `--duration <LABEL>` - Override the bout length
    pub fn load() -> Result<Self, CoreError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    /// Resolve settings from CLI args and an environment lookup. CLI flags
    /// take precedence over the environment.
    pub fn from_sources(
        args: &[String],
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, CoreError> {
        let database_url =
            env("DATABASE_URL").unwrap_or_else(|| "sqlite:kumite.db?mode=rwc".to_string());

        let port = Self::parse_cli_value(args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| env("PORT").and_then(|v| v.parse().ok()))
            .unwrap_or(3000);

        let static_dir = env("STATIC_DIR").map(PathBuf::from);

        let duration = match Self::parse_cli_value(args, "--duration").or_else(|| env("KUMITE_DURATION")) {
            Some(label) => MatchDuration::parse(&label)?,
            None => MatchDuration::default(),
        };

        Ok(Config {
            database_url,
            port,
            static_dir,
            duration,
            division: env("KUMITE_DIVISION").unwrap_or_default(),
            referee_name: env("KUMITE_REFEREE").unwrap_or_default(),
        })
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            division: self.division.clone(),
            referee_name: self.referee_name.clone(),
            rules: MatchRules {
                duration: self.duration,
                ..MatchRules::default()
            },
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

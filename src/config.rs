use crate::models::backend::BackendKind;
use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Backend receiving new uploads.
    pub backend: BackendKind,
    /// Prefix of the relative URLs handed out for filesystem objects.
    pub url_prefix: String,
    /// Age after which cleanup treats temp files and unregistered rows as
    /// crash leftovers.
    pub leftover_grace_secs: u32,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Dual-backend file storage service")]
pub struct Args {
    /// Host to bind to (overrides FILE_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILE_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where filesystem objects are stored (overrides FILE_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides FILE_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Default backend: `filesystem` or `database` (overrides FILE_STORE_BACKEND)
    #[arg(long)]
    pub backend: Option<BackendKind>,

    /// URL prefix for filesystem objects (overrides FILE_STORE_URL_PREFIX)
    #[arg(long)]
    pub url_prefix: Option<String>,

    /// Seconds before cleanup reclaims crash leftovers (overrides FILE_STORE_LEFTOVER_GRACE_SECS)
    #[arg(long)]
    pub leftover_grace_secs: Option<u32>,

    /// Apply the database schema and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::resolve(args, |key| env::var(key))?;
        Ok((cfg, migrate))
    }

    /// Merge CLI arguments over values looked up through `var`.
    pub fn resolve<F>(args: Args, var: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        // --- Environment fallback ---
        let env_host = var("FILE_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match var("FILE_STORE_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing FILE_STORE_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading FILE_STORE_PORT"),
        };
        let env_storage =
            var("FILE_STORE_STORAGE_DIR").unwrap_or_else(|_| "./data/files".into());
        let env_db = var("FILE_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/file_store.db".into());
        let env_prefix = var("FILE_STORE_URL_PREFIX").unwrap_or_else(|_| "/uploads".into());
        let env_backend = Self::backend_from_env(&var)?;
        let env_grace = match var("FILE_STORE_LEFTOVER_GRACE_SECS") {
            Ok(value) => value.parse::<u32>().with_context(|| {
                format!("parsing FILE_STORE_LEFTOVER_GRACE_SECS value `{}`", value)
            })?,
            Err(env::VarError::NotPresent) => 3600,
            Err(err) => return Err(err).context("reading FILE_STORE_LEFTOVER_GRACE_SECS"),
        };

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            backend: args.backend.unwrap_or(env_backend),
            url_prefix: args.url_prefix.unwrap_or(env_prefix),
            leftover_grace_secs: args.leftover_grace_secs.unwrap_or(env_grace),
        })
    }

    /// `FILE_STORE_BACKEND` wins over the legacy `FILE_STORE_USE_DATABASE`
    /// toggle; with neither set the filesystem backend is used.
    fn backend_from_env<F>(var: &F) -> Result<BackendKind>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        if let Ok(value) = var("FILE_STORE_BACKEND") {
            return value
                .parse()
                .map_err(|err: String| anyhow!(err))
                .context("parsing FILE_STORE_BACKEND");
        }

        match var("FILE_STORE_USE_DATABASE") {
            Ok(value) => {
                let use_database = match value.trim().to_ascii_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => true,
                    "0" | "false" | "no" | "off" | "" => false,
                    other => {
                        return Err(anyhow!(
                            "parsing FILE_STORE_USE_DATABASE value `{}`",
                            other
                        ));
                    }
                };
                Ok(BackendKind::from_use_database(use_database))
            }
            Err(_) => Ok(BackendKind::default()),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Result<String, env::VarError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned().ok_or(env::VarError::NotPresent)
    }

    #[test]
    fn defaults_to_filesystem() {
        let cfg = AppConfig::resolve(Args::default(), lookup(&[])).unwrap();
        assert_eq!(cfg.backend, BackendKind::Filesystem);
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.storage_dir, "./data/files");
        assert_eq!(cfg.addr(), "0.0.0.0:3000");
        assert_eq!(cfg.leftover_grace_secs, 3600);
    }

    #[test]
    fn leftover_grace_from_env_or_args() {
        let env = lookup(&[("FILE_STORE_LEFTOVER_GRACE_SECS", "120")]);
        let cfg = AppConfig::resolve(Args::default(), env).unwrap();
        assert_eq!(cfg.leftover_grace_secs, 120);

        let args = Args {
            leftover_grace_secs: Some(5),
            ..Args::default()
        };
        let cfg = AppConfig::resolve(args, lookup(&[("FILE_STORE_LEFTOVER_GRACE_SECS", "120")]))
            .unwrap();
        assert_eq!(cfg.leftover_grace_secs, 5);

        assert!(
            AppConfig::resolve(Args::default(), lookup(&[("FILE_STORE_LEFTOVER_GRACE_SECS", "-1")]))
                .is_err()
        );
    }

    #[test]
    fn legacy_toggle_selects_database() {
        let cfg =
            AppConfig::resolve(Args::default(), lookup(&[("FILE_STORE_USE_DATABASE", "true")]))
                .unwrap();
        assert_eq!(cfg.backend, BackendKind::Database);
    }

    #[test]
    fn explicit_backend_beats_toggle_and_args_beat_env() {
        let env = lookup(&[
            ("FILE_STORE_USE_DATABASE", "true"),
            ("FILE_STORE_BACKEND", "filesystem"),
            ("FILE_STORE_PORT", "8080"),
        ]);
        let args = Args {
            port: Some(9000),
            ..Args::default()
        };
        let cfg = AppConfig::resolve(args, env).unwrap();
        assert_eq!(cfg.backend, BackendKind::Filesystem);
        assert_eq!(cfg.port, 9000);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(AppConfig::resolve(Args::default(), lookup(&[("FILE_STORE_PORT", "x")])).is_err());
        assert!(
            AppConfig::resolve(Args::default(), lookup(&[("FILE_STORE_BACKEND", "s3")])).is_err()
        );
        assert!(
            AppConfig::resolve(Args::default(), lookup(&[("FILE_STORE_USE_DATABASE", "maybe")]))
                .is_err()
        );
    }
}

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Default reporting currency.
fn default_reporting_currency() -> String {
    "INR".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

/// File-on-disk configuration. Secrets are read from the file as plain
/// strings (so a `artha.toml` checked into a private dotfiles repo works),
/// but every field here is also overridable by an environment variable at
/// the composition root — see [`EnvOverrides`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the data directory holding the Ledger/Planning/Docs stores.
    /// If relative, resolved from the config file's directory.
    pub data_dir: Option<PathBuf>,

    pub reporting_currency: String,

    pub port: u16,

    pub cors_origins: Vec<String>,

    pub openai_api_key: Option<String>,
    pub sarvam_api_key: Option<String>,
    pub zoho_client_id: Option<String>,
    pub zoho_client_secret: Option<String>,
    pub zoho_refresh_token: Option<String>,
    pub gov_msme_api_key: Option<String>,

    /// Accepted for config-file compatibility with the original Mongo-backed
    /// deployment; unused here since the store is JSON-file-backed (see
    /// `storage::json_file`).
    pub mongo_uri: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            reporting_currency: default_reporting_currency(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            openai_api_key: None,
            sarvam_api_key: None,
            zoho_client_id: None,
            zoho_client_secret: None,
            zoho_refresh_token: None,
            gov_msme_api_key: None,
            mongo_uri: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Overlay environment variables on top of a loaded config. Env vars win;
    /// this is the only place the process reads `std::env` so providers
    /// downstream never reach into it themselves.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                self.port = port;
            }
        }
        overlay(&mut self.mongo_uri, "MONGO_URI");
        overlay(&mut self.sarvam_api_key, "SARVAM_API_KEY");
        overlay(&mut self.openai_api_key, "OPENAI_API_KEY");
        overlay(&mut self.zoho_client_id, "ZOHO_CLIENT_ID");
        overlay(&mut self.zoho_client_secret, "ZOHO_CLIENT_SECRET");
        overlay(&mut self.zoho_refresh_token, "ZOHO_REFRESH_TOKEN");
        overlay(&mut self.gov_msme_api_key, "GOV_MSME_API_KEY");
    }

    pub fn resolve_data_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.data_dir {
            Some(data_dir) if data_dir.is_absolute() => data_dir.clone(),
            Some(data_dir) => config_dir.join(data_dir),
            None => config_dir.to_path_buf(),
        }
    }
}

fn overlay(field: &mut Option<String>, var: &str) {
    if let Ok(value) = std::env::var(var) {
        if !value.is_empty() {
            *field = Some(value);
        }
    }
}

/// Loaded configuration with resolved paths and secrets wrapped so they
/// never show up in a `Debug` print of the composition root.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_dir: PathBuf,
    pub reporting_currency: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub openai_api_key: Option<SecretString>,
    pub sarvam_api_key: Option<SecretString>,
    pub zoho_client_id: Option<SecretString>,
    pub zoho_client_secret: Option<SecretString>,
    pub zoho_refresh_token: Option<SecretString>,
    pub gov_msme_api_key: Option<SecretString>,
}

/// Resolution order:
/// 1. `./artha.toml` if it exists in the current directory
/// 2. `~/.local/share/artha/artha.toml` (XDG data directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("artha.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("artha").join("artha.toml");
    }

    local_config
}

impl ResolvedConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        let mut config = Config::load(&config_path)?;
        config.apply_env_overrides();
        let data_dir = config.resolve_data_dir(config_dir);

        Ok(Self::from_config(config, data_dir))
    }

    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            Self::load(config_path)
        } else {
            let config_path = if config_path.is_relative() {
                std::env::current_dir()
                    .context("Failed to get current directory")?
                    .join(config_path)
            } else {
                config_path.to_path_buf()
            };

            let config_dir = config_path
                .parent()
                .context("Config path has no parent directory")?;

            let mut config = Config::default();
            config.apply_env_overrides();

            Ok(Self::from_config(config, config_dir.to_path_buf()))
        }
    }

    fn from_config(config: Config, data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            reporting_currency: config.reporting_currency,
            port: config.port,
            cors_origins: config.cors_origins,
            openai_api_key: config.openai_api_key.map(SecretString::from),
            sarvam_api_key: config.sarvam_api_key.map(SecretString::from),
            zoho_client_id: config.zoho_client_id.map(SecretString::from),
            zoho_client_secret: config.zoho_client_secret.map(SecretString::from),
            zoho_refresh_token: config.zoho_refresh_token.map(SecretString::from),
            gov_msme_api_key: config.gov_msme_api_key.map(SecretString::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn default_data_dir_is_config_dir() {
        let config = Config::default();
        let config_dir = Path::new("/home/user/finances");
        assert_eq!(
            config.resolve_data_dir(config_dir),
            PathBuf::from("/home/user/finances")
        );
    }

    #[test]
    fn relative_data_dir() {
        let config = Config {
            data_dir: Some(PathBuf::from("data")),
            ..Default::default()
        };
        let config_dir = Path::new("/home/user/finances");
        assert_eq!(
            config.resolve_data_dir(config_dir),
            PathBuf::from("/home/user/finances/data")
        );
    }

    #[test]
    fn absolute_data_dir() {
        let config = Config {
            data_dir: Some(PathBuf::from("/var/artha/data")),
            ..Default::default()
        };
        let config_dir = Path::new("/home/user/finances");
        assert_eq!(
            config.resolve_data_dir(config_dir),
            PathBuf::from("/var/artha/data")
        );
    }

    #[test]
    fn load_config() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("artha.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "data_dir = \"./my-data\"")?;

        let config = Config::load(&config_path)?;
        assert_eq!(config.data_dir, Some(PathBuf::from("./my-data")));

        Ok(())
    }

    #[test]
    fn load_empty_config_uses_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("artha.toml");

        std::fs::File::create(&config_path)?;

        let config = Config::load(&config_path)?;
        assert_eq!(config.data_dir, None);
        assert_eq!(config.port, 8000);
        assert_eq!(config.reporting_currency, "INR");

        Ok(())
    }

    #[test]
    fn default_port_and_cors() {
        let config = Config::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.cors_origins, vec!["*".to_string()]);
    }
}

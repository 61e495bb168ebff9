//! Configuration
//!
//! Connection target and forwarded driver options, loaded from defaults, an
//! optional TOML file and `SORADB_*` environment variables.

use crate::error::{Result, SoraError};
use crate::logging::LogConfig;
use mongodb::options::ClientOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Files tried in order when no explicit path is given
const CONFIG_PATHS: [&str; 2] = ["soradb.toml", "config/soradb.toml"];

const ENV_PREFIX: &str = "SORADB";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoraConfig {
    /// MongoDB connection string
    pub url: String,
    /// Database to select after connecting
    pub database: String,
    /// Collection the facade operates on
    pub collection: String,
    /// Options forwarded to the driver
    pub options: ConnectionOptions,
    /// Logging for the binary
    pub log: LogConfig,
}

impl Default for SoraConfig {
    fn default() -> Self {
        Self {
            url: "mongodb://localhost:27017".to_string(),
            database: "soradb".to_string(),
            collection: "documents".to_string(),
            options: ConnectionOptions::default(),
            log: LogConfig::default(),
        }
    }
}

impl SoraConfig {
    pub fn new(
        url: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            database: database.into(),
            collection: collection.into(),
            ..Self::default()
        }
    }

    /// Load configuration.
    ///
    /// Sources, lowest precedence first: built-in defaults, `path` (or the
    /// first existing default location), then `SORADB_*` variables such as
    /// `SORADB_URL` or `SORADB_OPTIONS__MAX_POOL_SIZE`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, env_source())
    }

    fn load_with_env(path: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut settings =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        match path {
            Some(path) => {
                settings = settings.add_source(config::File::from(path).required(true));
            }
            None => {
                if let Some(found) = default_config_path() {
                    tracing::debug!(path = %found.display(), "reading configuration file");
                    settings = settings.add_source(config::File::from(found).required(false));
                }
            }
        }

        let config: SoraConfig = settings.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(SoraError::Config(
                "MongoDB URL cannot be empty".to_string(),
            ));
        }
        if self.database.is_empty() {
            return Err(SoraError::Config(
                "Database name cannot be empty".to_string(),
            ));
        }
        if self.collection.is_empty() {
            return Err(SoraError::Config(
                "Collection name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn default_config_path() -> Option<PathBuf> {
    CONFIG_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

/// Driver options applied on top of whatever the connection string sets.
///
/// Unset fields leave the driver's (or the URL's) value untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    pub app_name: Option<String>,
    pub max_pool_size: Option<u32>,
    pub min_pool_size: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub server_selection_timeout_ms: Option<u64>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            app_name: Some("soradb".to_string()),
            max_pool_size: None,
            min_pool_size: None,
            connect_timeout_ms: None,
            server_selection_timeout_ms: None,
        }
    }
}

impl ConnectionOptions {
    /// Copy the set fields into parsed driver options
    pub fn apply(&self, client_options: &mut ClientOptions) {
        if let Some(ref app_name) = self.app_name {
            if client_options.app_name.is_none() {
                client_options.app_name = Some(app_name.clone());
            }
        }
        if let Some(size) = self.max_pool_size {
            client_options.max_pool_size = Some(size);
        }
        if let Some(size) = self.min_pool_size {
            client_options.min_pool_size = Some(size);
        }
        if let Some(ms) = self.connect_timeout_ms {
            client_options.connect_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(ms) = self.server_selection_timeout_ms {
            client_options.server_selection_timeout = Some(Duration::from_millis(ms));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn isolated_env(vars: &[(&str, &str)]) -> config::Environment {
        let mut map = config::Map::new();
        for (key, value) in vars {
            map.insert(key.to_string(), value.to_string());
        }
        env_source().source(Some(map))
    }

    #[test]
    fn test_default_config() {
        let config = SoraConfig::default();
        assert_eq!(config.url, "mongodb://localhost:27017");
        assert_eq!(config.database, "soradb");
        assert_eq!(config.collection, "documents");
        assert_eq!(config.options.app_name.as_deref(), Some("soradb"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let config = SoraConfig::new("", "db", "coll");
        assert!(matches!(config.validate(), Err(SoraError::Config(_))));

        let config = SoraConfig::new("mongodb://localhost", "", "coll");
        assert!(matches!(config.validate(), Err(SoraError::Config(_))));

        let config = SoraConfig::new("mongodb://localhost", "db", "");
        assert!(matches!(config.validate(), Err(SoraError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
url = "mongodb://db.internal:27017"
database = "inventory"
collection = "items"

[options]
max_pool_size = 20
server_selection_timeout_ms = 1500

[log]
level = "debug"
"#
        )
        .unwrap();

        let config = SoraConfig::load_with_env(Some(file.path()), isolated_env(&[])).unwrap();
        assert_eq!(config.url, "mongodb://db.internal:27017");
        assert_eq!(config.database, "inventory");
        assert_eq!(config.collection, "items");
        assert_eq!(config.options.max_pool_size, Some(20));
        assert_eq!(config.options.server_selection_timeout_ms, Some(1500));
        assert_eq!(config.options.app_name.as_deref(), Some("soradb"));
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "database = \"from_file\"\ncollection = \"items\"").unwrap();

        let env = isolated_env(&[
            ("SORADB_DATABASE", "from_env"),
            ("SORADB_OPTIONS__MIN_POOL_SIZE", "2"),
        ]);
        let config = SoraConfig::load_with_env(Some(file.path()), env).unwrap();
        assert_eq!(config.database, "from_env");
        assert_eq!(config.collection, "items");
        assert_eq!(config.options.min_pool_size, Some(2));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = SoraConfig::load_with_env(
            Some(Path::new("/nonexistent/soradb.toml")),
            isolated_env(&[]),
        );
        assert!(matches!(result, Err(SoraError::ConfigLoad(_))));
    }

    #[test]
    fn test_apply_connection_options() {
        let mut client_options = ClientOptions::builder().build();
        let options = ConnectionOptions {
            app_name: Some("reports".to_string()),
            max_pool_size: Some(50),
            min_pool_size: Some(1),
            connect_timeout_ms: Some(2_000),
            server_selection_timeout_ms: Some(500),
        };
        options.apply(&mut client_options);

        assert_eq!(client_options.app_name.as_deref(), Some("reports"));
        assert_eq!(client_options.max_pool_size, Some(50));
        assert_eq!(client_options.min_pool_size, Some(1));
        assert_eq!(client_options.connect_timeout, Some(Duration::from_secs(2)));
        assert_eq!(
            client_options.server_selection_timeout,
            Some(Duration::from_millis(500))
        );
    }

    #[test]
    fn test_apply_keeps_url_app_name() {
        let mut client_options = ClientOptions::builder().build();
        client_options.app_name = Some("from-url".to_string());
        ConnectionOptions::default().apply(&mut client_options);
        assert_eq!(client_options.app_name.as_deref(), Some("from-url"));
        assert_eq!(client_options.max_pool_size, None);
    }
}

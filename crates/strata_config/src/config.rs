//! Loading, merging and validating `.strata.toml` configuration files.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The name of the configuration files that are discovered automatically.
pub const CONFIG_FILE_NAME: &str = ".strata.toml";

/// The environment variable that points at an additional configuration file.
pub const CONFIG_ENV_VAR: &str = "STRATA_CONFIG";

/// An error that occurs when a loaded configuration is not consistent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid value for a field.
    #[error("Invalid value for field {0}: {1}")]
    InvalidValue(String, String),

    /// The default database does not name a configured database.
    #[error("The default database '{0}' is not configured")]
    UnknownDefault(String),
}

/// An error that can occur while loading configuration files.
#[derive(Error, Debug)]
pub enum LoadError {
    /// IO error while reading configuration file.
    #[error("IO error while reading configuration file '{}'", .0.display())]
    IoError(PathBuf, #[source] std::io::Error),

    /// Error parsing configuration file.
    #[error("Error parsing configuration file '{}'", .0.display())]
    ParseError(PathBuf, #[source] toml::de::Error),

    /// Error validating configuration.
    #[error("Error validating configuration")]
    ValidationError(#[from] ValidationError),
}

/// A database that can be referred to by an alias in dataset targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DatabaseConfig {
    /// The directory of the database. Relative paths are resolved against
    /// the directory of the configuration file that declared them.
    pub path: PathBuf,
}

/// The content of one or more merged `.strata.toml` files.
///
/// ```toml
/// default = "local"
///
/// [db.local]
/// path = "./data"
///
/// [db.shared]
/// path = "/srv/strata"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// The alias of the database used when a target does not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Databases by alias.
    #[serde(default, rename = "db", skip_serializing_if = "IndexMap::is_empty")]
    pub databases: IndexMap<String, DatabaseConfig>,

    /// The files this configuration was loaded from, lowest priority first.
    #[serde(skip)]
    pub loaded_from: Vec<PathBuf>,
}

impl Config {
    /// Loads and merges the given files. Later files take priority over
    /// earlier ones. The merged result is validated.
    pub fn load_from_files<I, P>(paths: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut config = Config::default();

        for path in paths {
            let path = path.as_ref();
            let content = fs_err::read_to_string(path)
                .map_err(|e| LoadError::IoError(path.to_path_buf(), e))?;
            let mut other: Config =
                toml::from_str(&content).map_err(|e| LoadError::ParseError(path.to_path_buf(), e))?;
            if let Some(dir) = path.parent() {
                other.resolve_relative_paths(dir);
            }
            other.loaded_from.push(path.to_path_buf());
            tracing::debug!("loaded configuration from '{}'", path.display());
            config = config.merge_config(other);
        }

        config.validate()?;
        Ok(config)
    }

    /// Discovers the configuration files for `cwd` and loads them.
    pub fn load(cwd: &Path, explicit: Option<&Path>) -> Result<Self, LoadError> {
        Self::load_from_files(discover_config_files(cwd, explicit))
    }

    /// Merge another configuration (file) into this one.
    /// Note: the "other" configuration takes priority over the current one.
    pub fn merge_config(self, other: Self) -> Self {
        Self {
            default: other.default.or(self.default),
            databases: self.databases.into_iter().chain(other.databases).collect(),
            loaded_from: self
                .loaded_from
                .into_iter()
                .chain(other.loaded_from)
                .collect(),
        }
    }

    /// Checks that every database has a path and that the default names a
    /// configured database.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (alias, database) in &self.databases {
            if database.path.as_os_str().is_empty() {
                return Err(ValidationError::InvalidValue(
                    format!("db.{alias}.path"),
                    "must not be empty".to_string(),
                ));
            }
        }

        if let Some(default) = &self.default {
            if !self.databases.contains_key(default) {
                return Err(ValidationError::UnknownDefault(default.clone()));
            }
        }

        Ok(())
    }

    fn resolve_relative_paths(&mut self, base: &Path) {
        for database in self.databases.values_mut() {
            if database.path.is_relative() {
                database.path = base.join(&database.path);
            }
        }
    }
}

/// Returns the configuration files that apply to `cwd`, lowest priority
/// first.
///
/// Every `.strata.toml` in `cwd` or one of its ancestors is included, files
/// closer to `cwd` taking priority. An `explicit` file, usually taken from
/// [`CONFIG_ENV_VAR`], takes priority over all of them.
pub fn discover_config_files(cwd: &Path, explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = cwd
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .filter(|path| path.is_file())
        .collect();
    files.reverse();
    files.extend(explicit.map(Path::to_path_buf));
    files
}

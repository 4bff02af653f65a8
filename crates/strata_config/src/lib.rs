#![deny(missing_docs)]

//! Resolves dataset targets like `local::daily` to a [`Database`] and a
//! [`Dataset`] snapshot, using database aliases declared in `.strata.toml`
//! files.

pub mod config;
mod target;

use std::path::{Path, PathBuf};

pub use config::{Config, DatabaseConfig, LoadError, ValidationError};
use strata_dataset::{Database, DatabaseError, Dataset};
pub use target::{DatabaseRef, DatasetTarget, ParseDatasetTargetError, DATABASE_SEPARATOR};

/// An error that can occur while turning a target into a dataset.
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    InvalidTarget(#[from] ParseDatasetTargetError),

    #[error("unknown database alias '{0}'")]
    UnknownAlias(String),

    #[error("'{0}' does not name a database and no default database is configured")]
    NoDefaultDatabase(String),

    #[error("failed to open dataset '{target}'")]
    Open {
        target: String,
        #[source]
        source: DatabaseError,
    },
}

/// Resolves dataset targets against a [`Config`].
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    config: Config,
}

impl Resolver {
    /// Constructs a resolver from an already loaded configuration.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Loads the configuration that applies to `cwd`. See
    /// [`config::discover_config_files`].
    pub fn from_cwd(cwd: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Ok(Self::new(Config::load(cwd, explicit)?))
    }

    /// The configuration used by this resolver.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the directory of the database a target refers to.
    pub fn database_path(&self, target: &DatasetTarget) -> Result<PathBuf, ConfigError> {
        match &target.database {
            DatabaseRef::Path(path) => Ok(path.clone()),
            DatabaseRef::Alias(alias) => self.alias_path(alias),
            DatabaseRef::Default => match &self.config.default {
                Some(alias) => self.alias_path(alias),
                None => Err(ConfigError::NoDefaultDatabase(target.to_string())),
            },
        }
    }

    fn alias_path(&self, alias: &str) -> Result<PathBuf, ConfigError> {
        self.config
            .databases
            .get(alias)
            .map(|database| database.path.clone())
            .ok_or_else(|| ConfigError::UnknownAlias(alias.to_owned()))
    }

    /// Parses `target`, opens its database and reads a snapshot of the
    /// dataset. This performs blocking IO.
    pub fn open_dataset(&self, target: &str) -> Result<(Database, Dataset), ConfigError> {
        let parsed: DatasetTarget = target.parse()?;
        let path = self.database_path(&parsed)?;
        tracing::debug!("resolved '{target}' to '{}'", path.display());

        let open = |source| ConfigError::Open {
            target: target.to_owned(),
            source,
        };
        let database = Database::open(path).map_err(open)?;
        let dataset = database.dataset(&parsed.dataset).map_err(open)?;
        Ok((database, dataset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn resolver(dir: &Path) -> Resolver {
        let path = dir.join(config::CONFIG_FILE_NAME);
        fs_err::write(
            &path,
            "default = \"local\"\n[db.local]\npath = \"db\"\n[db.other]\npath = \"other\"\n",
        )
        .unwrap();
        Resolver::from_cwd(dir, None).unwrap()
    }

    #[test]
    fn test_bare_name_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(dir.path());

        let (database, dataset) = resolver.open_dataset("daily").unwrap();
        assert_eq!(database.root(), dir.path().join("db"));
        assert_eq!(dataset.name(), "daily");
        assert!(!dataset.has_head());
    }

    #[test]
    fn test_alias_and_path() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(dir.path());

        let (database, _) = resolver.open_dataset("other::daily").unwrap();
        assert_eq!(database.root(), dir.path().join("other"));

        let explicit = dir.path().join("explicit");
        let (database, _) = resolver
            .open_dataset(&format!("{}::daily", explicit.display()))
            .unwrap();
        assert_eq!(database.root(), explicit);
    }

    #[test]
    fn test_unknown_alias() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(dir.path());
        assert_matches!(
            resolver.open_dataset("nope::daily"),
            Err(ConfigError::UnknownAlias(alias)) if alias == "nope"
        );
    }

    #[test]
    fn test_no_default_database() {
        let resolver = Resolver::default();
        assert_matches!(
            resolver.open_dataset("daily"),
            Err(ConfigError::NoDefaultDatabase(_))
        );
    }

    #[test]
    fn test_invalid_dataset_name() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(dir.path());
        assert_matches!(
            resolver.open_dataset("local::bad name"),
            Err(ConfigError::Open {
                source: DatabaseError::InvalidDatasetName(..),
                ..
            })
        );
    }
}

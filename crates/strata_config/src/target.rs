use std::{
    fmt::{Display, Formatter},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Separates the database from the dataset in a target.
pub const DATABASE_SEPARATOR: &str = "::";

/// Refers to the database part of a [`DatasetTarget`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DatabaseRef {
    /// The target did not name a database.
    Default,

    /// An alias from a configuration file.
    Alias(String),

    /// A directory on disk.
    Path(PathBuf),
}

/// A parsed `<database>::<dataset>` string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetTarget {
    /// The database that holds the dataset.
    pub database: DatabaseRef,

    /// The name of the dataset within the database.
    pub dataset: String,
}

/// An error that is returned when a dataset target cannot be parsed.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("invalid dataset target '{input}': {reason}")]
pub struct ParseDatasetTargetError {
    input: String,
    reason: &'static str,
}

impl FromStr for DatasetTarget {
    type Err = ParseDatasetTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| ParseDatasetTargetError {
            input: s.to_owned(),
            reason,
        };

        let (database, dataset) = match s.rsplit_once(DATABASE_SEPARATOR) {
            Some(("", _)) => return Err(err("the database is empty")),
            Some((database, dataset)) => (parse_database(database), dataset),
            None => (DatabaseRef::Default, s),
        };

        if dataset.is_empty() {
            return Err(err("the dataset name is empty"));
        }

        Ok(Self {
            database,
            dataset: dataset.to_owned(),
        })
    }
}

/// Anything that looks like a path is a path, everything else an alias.
fn parse_database(s: &str) -> DatabaseRef {
    let looks_like_path = s.starts_with('.')
        || s.starts_with('~')
        || s.contains(std::path::MAIN_SEPARATOR)
        || s.contains('/')
        || Path::new(s).is_absolute();
    if looks_like_path {
        DatabaseRef::Path(PathBuf::from(s))
    } else {
        DatabaseRef::Alias(s.to_owned())
    }
}

impl Display for DatasetTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.database {
            DatabaseRef::Default => write!(f, "{}", self.dataset),
            DatabaseRef::Alias(alias) => write!(f, "{alias}{DATABASE_SEPARATOR}{}", self.dataset),
            DatabaseRef::Path(path) => write!(
                f,
                "{}{DATABASE_SEPARATOR}{}",
                path.display(),
                self.dataset
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("daily", DatabaseRef::Default, "daily")]
    #[case("local::daily", DatabaseRef::Alias("local".into()), "daily")]
    #[case("./data::daily", DatabaseRef::Path("./data".into()), "daily")]
    #[case("/srv/strata::team/daily", DatabaseRef::Path("/srv/strata".into()), "team/daily")]
    #[case("./a::b::c", DatabaseRef::Path("./a::b".into()), "c")]
    fn test_parse(#[case] input: &str, #[case] database: DatabaseRef, #[case] dataset: &str) {
        let target: DatasetTarget = input.parse().unwrap();
        assert_eq!(target.database, database);
        assert_eq!(target.dataset, dataset);
    }

    #[rstest]
    #[case("")]
    #[case("local::")]
    #[case("::daily")]
    fn test_parse_invalid(#[case] input: &str) {
        assert!(input.parse::<DatasetTarget>().is_err());
    }

    #[test]
    fn test_display() {
        let target: DatasetTarget = "local::daily".parse().unwrap();
        assert_eq!(target.to_string(), "local::daily");
        let target: DatasetTarget = "daily".parse().unwrap();
        assert_eq!(target.to_string(), "daily");
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strata_dataset::{Commit, CommitMeta};

/// The key of the etag in commit metadata.
pub const ETAG_KEY: &str = "etag";

/// The key of the source file in commit metadata.
pub const FILE_KEY: &str = "file";

/// The key of the source url in commit metadata.
pub const URL_KEY: &str = "url";

/// Describes where the value of a commit came from. It is stored in the
/// metadata of every commit made by a fetch and is used to detect whether a
/// remote resource changed since.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchMetadata {
    /// The `ETag` HTTP header of the response the value was read from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// The local file the value was read from.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "file")]
    pub source_file: Option<String>,

    /// The url the value was read from.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "url")]
    pub source_url: Option<String>,
}

impl FetchMetadata {
    /// Reads the metadata recorded in a commit. Keys that are not part of a
    /// fetch are ignored. Fails if a known key holds something other than a
    /// string.
    pub fn from_commit(commit: &Commit) -> Result<Self, serde_json::Error> {
        let fields = [ETAG_KEY, FILE_KEY, URL_KEY]
            .into_iter()
            .filter_map(|key| {
                commit
                    .meta
                    .extra
                    .get(key)
                    .map(|value| (key.to_owned(), value.clone()))
            })
            .collect::<serde_json::Map<_, _>>();
        serde_json::from_value(serde_json::Value::Object(fields))
    }

    /// Constructs metadata from the key value pairs of a source.
    pub fn from_entries(entries: &BTreeMap<String, String>) -> Self {
        Self {
            etag: entries.get(ETAG_KEY).cloned(),
            source_file: entries.get(FILE_KEY).cloned(),
            source_url: entries.get(URL_KEY).cloned(),
        }
    }

    /// Returns the etag to send along with a request for `url`. An etag is
    /// only returned if it was recorded for the same url and is not empty.
    pub fn etag_for(&self, url: &str) -> Option<&str> {
        if self.source_url.as_deref() != Some(url) {
            return None;
        }
        self.etag.as_deref().filter(|etag| !etag.is_empty())
    }

    /// Adds the fields of this instance to the metadata of a commit,
    /// replacing entries with the same key.
    pub fn apply_to(&self, mut meta: CommitMeta) -> CommitMeta {
        for (key, value) in [
            (ETAG_KEY, &self.etag),
            (FILE_KEY, &self.source_file),
            (URL_KEY, &self.source_url),
        ] {
            if let Some(value) = value {
                meta.extra.insert(key.to_owned(), value.clone().into());
            }
        }
        meta
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;
    use strata_dataset::BlobHash;

    fn commit_with(meta: CommitMeta) -> Commit {
        Commit {
            value: BlobHash::of(b"value"),
            parents: Vec::new(),
            meta,
        }
    }

    #[test]
    fn test_from_commit() {
        let commit = commit_with(
            CommitMeta::new()
                .with_entry("url", "https://example.com/a")
                .unwrap()
                .with_entry("etag", "\"abc\"")
                .unwrap()
                .with_entry("author", "someone")
                .unwrap(),
        );
        let metadata = FetchMetadata::from_commit(&commit).unwrap();
        assert_eq!(
            metadata,
            FetchMetadata {
                etag: Some("\"abc\"".into()),
                source_file: None,
                source_url: Some("https://example.com/a".into()),
            }
        );
    }

    #[test]
    fn test_from_commit_without_fetch_keys() {
        let commit = commit_with(CommitMeta::new().with_message("manual"));
        assert_eq!(
            FetchMetadata::from_commit(&commit).unwrap(),
            FetchMetadata::default()
        );
    }

    #[test]
    fn test_from_commit_rejects_non_strings() {
        let commit = commit_with(CommitMeta::new().with_entry("etag", 42).unwrap());
        assert!(FetchMetadata::from_commit(&commit).is_err());
    }

    #[rstest]
    #[case(Some("https://a"), Some("\"e\""), "https://a", Some("\"e\""))]
    #[case(Some("https://a"), Some("\"e\""), "https://b", None)]
    #[case(Some("https://a"), Some(""), "https://a", None)]
    #[case(Some("https://a"), None, "https://a", None)]
    #[case(None, Some("\"e\""), "https://a", None)]
    fn test_etag_for(
        #[case] url: Option<&str>,
        #[case] etag: Option<&str>,
        #[case] requested: &str,
        #[case] expected: Option<&str>,
    ) {
        let metadata = FetchMetadata {
            etag: etag.map(ToOwned::to_owned),
            source_file: None,
            source_url: url.map(ToOwned::to_owned),
        };
        assert_eq!(metadata.etag_for(requested), expected);
    }

    #[test]
    fn test_apply_to_overrides_user_entries() {
        let metadata = FetchMetadata {
            etag: None,
            source_file: Some("/tmp/data.csv".into()),
            source_url: None,
        };
        let meta = metadata.apply_to(
            CommitMeta::new()
                .with_entry("file", "user supplied")
                .unwrap()
                .with_entry("owner", "me")
                .unwrap(),
        );
        assert_eq!(meta.extra["file"], "/tmp/data.csv");
        assert_eq!(meta.extra["owner"], "me");
        assert!(!meta.extra.contains_key("etag"));
    }
}

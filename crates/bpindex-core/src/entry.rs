use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BpIndexError;

/// One buildpack version to index.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Entry {
    #[serde(rename = "ns")]
    pub namespace: String,
    pub name: String,
    pub version: String,
    #[serde(rename = "addr")]
    pub address: String,
}

impl Entry {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version: version.into(),
            address: address.into(),
        }
    }

    /// `namespace/name`, the ID the metadata label must carry.
    pub fn id(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// `namespace/name@version`, used to tag log lines and outcomes.
    pub fn identity(&self) -> String {
        format!("{}/{}@{}", self.namespace, self.name, self.version)
    }

    /// Parses a JSON array of entries. `origin` names the source in errors.
    pub fn parse_batch(input: &str, origin: &str) -> Result<Vec<Entry>, BpIndexError> {
        serde_json::from_str(input).map_err(|source| {
            BpIndexError::InvalidInput {
                origin: origin.to_string(),
                source,
            }
        })
    }

    /// Parses a single JSON object, the degenerate batch of one.
    pub fn parse_one(input: &str, origin: &str) -> Result<Entry, BpIndexError> {
        serde_json::from_str(input).map_err(|source| {
            BpIndexError::InvalidInput {
                origin: origin.to_string(),
                source,
            }
        })
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_batch() {
        let input = r#"[
            {"ns": "heroku", "name": "nodejs", "version": "1.0.0", "addr": "ghcr.io/heroku/nodejs@sha256:abc"},
            {"ns": "heroku", "name": "go", "version": "0.3.1", "addr": "ghcr.io/heroku/go@sha256:def", "extra": true}
        ]"#;

        let batch = Entry::parse_batch(input, "batch.json").unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].identity(), "heroku/nodejs@1.0.0");
        assert_eq!(batch[0].id(), "heroku/nodejs");
        assert_eq!(batch[1].address, "ghcr.io/heroku/go@sha256:def");
    }

    #[test]
    fn test_parse_empty_batch() {
        assert!(Entry::parse_batch("[]", "stdin").unwrap().is_empty());
    }

    #[test]
    fn test_parse_batch_rejects_malformed_input() {
        let err = Entry::parse_batch("[{\"ns\": \"heroku\"}]", "stdin").unwrap_err();
        assert!(err.is_input_error());

        let err = Entry::parse_batch("not json", "stdin").unwrap_err();
        assert!(err.is_input_error());
    }

    #[test]
    fn test_parse_one() {
        let entry = Entry::parse_one(
            r#"{"ns":"heroku","name":"nodejs","version":"1.0.0","addr":"a@sha256:00"}"#,
            "--entry",
        )
        .unwrap();
        assert_eq!(entry, Entry::new("heroku", "nodejs", "1.0.0", "a@sha256:00"));
        assert_eq!(entry.to_string(), "heroku/nodejs@1.0.0");
    }
}

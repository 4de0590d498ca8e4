use serde::{Deserialize, Deserializer, Serialize};

/// Image config label holding the buildpackage metadata.
pub const METADATA_LABEL: &str = "io.buildpacks.buildpackage.metadata";

/// Buildpackage metadata as published in [`METADATA_LABEL`].
///
/// Absent and `null` fields decode as empty so that they fail the identity
/// and version checks instead of the parse. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Metadata {
    #[serde(rename = "ID", alias = "id", deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "Version", alias = "version", deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(rename = "Homepage", alias = "homepage", deserialize_with = "null_as_default")]
    pub homepage: String,
    #[serde(rename = "Stacks", alias = "stacks", deserialize_with = "null_as_default")]
    pub stacks: Vec<Stack>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Stack {
    #[serde(rename = "ID", alias = "id", deserialize_with = "null_as_default")]
    pub id: String,
}

impl Metadata {
    /// Parses a label value. A `null` label yields empty metadata.
    pub fn parse(label: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Option<Self>>(label).map(Option::unwrap_or_default)
    }

    /// Stack IDs in label order.
    pub fn stack_ids(&self) -> Vec<String> {
        self.stacks.iter().map(|s| s.id.clone()).collect()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

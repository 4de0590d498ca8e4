use chrono::Utc;
use diesel::{prelude::*, sqlite::Sqlite};
use serde_json::Value;

use crate::schema::buildpacks;

/// A buildpack version as stored in the index.
#[derive(Debug, Clone, PartialEq, Eq, Selectable)]
#[diesel(table_name = buildpacks)]
pub struct IndexedBuildpack {
    pub id: i32,
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub address: String,
    pub metadata_id: String,
    pub homepage: String,
    pub stacks: Vec<String>,
    /// RFC 3339 time of the first upsert.
    pub indexed_at: String,
}

impl IndexedBuildpack {
    pub fn identity(&self) -> String {
        format!("{}/{}@{}", self.namespace, self.name, self.version)
    }
}

impl Queryable<buildpacks::SqlType, Sqlite> for IndexedBuildpack {
    type Row = (i32, String, String, String, String, String, String, Value, String);

    fn build(row: Self::Row) -> diesel::deserialize::Result<Self> {
        Ok(Self {
            id: row.0,
            namespace: row.1,
            name: row.2,
            version: row.3,
            address: row.4,
            metadata_id: row.5,
            homepage: row.6,
            stacks: serde_json::from_value(row.7)?,
            indexed_at: row.8,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = buildpacks)]
pub struct NewBuildpack<'a> {
    pub namespace: &'a str,
    pub name: &'a str,
    pub version: &'a str,
    pub address: &'a str,
    pub metadata_id: &'a str,
    pub homepage: &'a str,
    pub stacks: Value,
    pub indexed_at: String,
}

impl<'a> NewBuildpack<'a> {
    /// Builds a record stamped with the current time.
    pub fn new(
        namespace: &'a str,
        name: &'a str,
        version: &'a str,
        address: &'a str,
        metadata_id: &'a str,
        homepage: &'a str,
        stacks: &[String],
    ) -> Self {
        Self {
            namespace,
            name,
            version,
            address,
            metadata_id,
            homepage,
            stacks: Value::from(stacks.to_vec()),
            indexed_at: Utc::now().to_rfc3339(),
        }
    }
}

//! Data source model
//!
//! Mirrors the JSON objects served by `/api/data_sources`. Only the fields the
//! tool reads are typed; everything else the server returns is kept in `extra`
//! so a snapshot holds the object exactly as it was read.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Server-assigned data source identifier
pub type DataSourceId = u64;

/// A data source as returned by the show operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: DataSourceId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub options: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DataSource {
    /// The `options.dbname` value, if the data source has one
    pub fn dbname(&self) -> Option<&str> {
        self.options.get("dbname").and_then(Value::as_str)
    }

    /// Payload needed to recreate this data source; the id is dropped
    pub fn to_new(&self) -> NewDataSource {
        NewDataSource {
            name: self.name.clone(),
            kind: self.kind.clone(),
            options: self.options.clone(),
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.name, self.id)
    }
}

/// Create payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDataSource {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub options: Map<String, Value>,
}

impl From<&DataSource> for NewDataSource {
    fn from(data_source: &DataSource) -> Self {
        data_source.to_new()
    }
}

/// Outcome of the remote connection test
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthCheck {
    pub ok: bool,
    #[serde(default)]
    pub message: String,
}

//! Wire data model for ksqlDB push queries
//!
//! Inbound, the `/query-stream` endpoint answers with newline-delimited JSON:
//! one header object followed by one JSON array per result row.
//!
//! ```text
//! {"queryId":"transient_PAGEVIEWS_1","columnNames":["ID","TS"],"columnTypes":["STRING","BIGINT"]}
//! ["user_1",1700000000000]
//! ["user_2",1700000000042]
//! ```
//!
//! Outbound, two JSON payloads are sent: the query itself and the close-query request.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Offset reset policy sent with every push query
pub const AUTO_OFFSET_RESET_KEY: &str = "ksql.streams.auto.offset.reset";
pub const AUTO_OFFSET_RESET_LATEST: &str = "latest";

/// One result column. Both fields are always non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

impl Column {
    /// Returns `None` when either the name or the type is empty.
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Option<Self> {
        let name = name.into();
        let column_type = column_type.into();
        if name.is_empty() || column_type.is_empty() {
            return None;
        }
        Some(Self { name, column_type })
    }
}

/// Schema header of a push query
///
/// `query_id` is absent for queries the server does not assign an id to.
/// Column order is the server's declaration order and defines the position of
/// every value in a [`Row`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    #[serde(rename = "queryId", skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
    pub columns: Vec<Column>,
}

impl Header {
    /// Fold a later header fragment into this one.
    ///
    /// A present query id replaces the current one; columns are appended.
    pub fn merge(&mut self, other: Header) {
        if other.query_id.is_some() {
            self.query_id = other.query_id;
        }
        self.columns.extend(other.columns);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// One result row, positioned per the header's columns
///
/// Values are kept exactly as JSON decoding produced them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(pub Vec<Value>);

impl Row {
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Look up a value by column name using the session's header.
    pub fn get_by_name(&self, header: &Header, name: &str) -> Option<&Value> {
        header.column_index(name).and_then(|i| self.0.get(i))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// Body of the `/query-stream` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryStreamPayload {
    pub properties: BTreeMap<String, String>,
    pub sql: String,
}

impl QueryStreamPayload {
    /// Push query reading from the latest offset.
    pub fn latest(sql: impl Into<String>) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(
            AUTO_OFFSET_RESET_KEY.to_string(),
            AUTO_OFFSET_RESET_LATEST.to_string(),
        );
        Self {
            properties,
            sql: sql.into(),
        }
    }
}

/// Body of the `/close-query` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseQueryPayload {
    #[serde(rename = "queryId")]
    pub query_id: String,
}

impl CloseQueryPayload {
    pub fn new(query_id: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
        }
    }
}

/// Error object returned by ksqlDB with non-success responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    #[serde(rename = "@type", default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    pub error_code: i64,
    pub message: String,
}

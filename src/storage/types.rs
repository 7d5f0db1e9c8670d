use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::error::StoreError;

/// A single cell value.
///
/// `Null` is a cleared cell: reads never return it, and a column holding it
/// is reported as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Timestamp(DateTime<Utc>),
    TextList(Vec<String>),
    TimestampList(Vec<DateTime<Utc>>),
}

impl Value {
    pub fn kind(&self) -> Option<ColumnKind> {
        match self {
            Value::Null => None,
            Value::Text(_) => Some(ColumnKind::Text),
            Value::Int(_) => Some(ColumnKind::Int),
            Value::Timestamp(_) => Some(ColumnKind::Timestamp),
            Value::TextList(_) => Some(ColumnKind::TextList),
            Value::TimestampList(_) => Some(ColumnKind::TimestampList),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Orders two scalar values of the same kind. Lists and mixed kinds are unordered.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Text,
    Int,
    Timestamp,
    TextList,
    TimestampList,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnDef {
    pub fn new(name: &str, kind: ColumnKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// Physical layout of one wide table: its columns and the columns forming the partition key.
///
/// Key columns are always `Text`. Every write is checked against the schema before it
/// reaches a replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub partition_key: Vec<String>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn is_key_column(&self, name: &str) -> bool {
        self.partition_key.iter().any(|key| key == name)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.name.is_empty() {
            return Err(StoreError::InvalidQuery("table name is empty".to_string()));
        }
        if self.partition_key.is_empty() {
            return Err(StoreError::InvalidQuery(format!(
                "table '{}' has no partition key",
                self.name
            )));
        }
        for key in &self.partition_key {
            match self.column(key) {
                Some(column) if column.kind == ColumnKind::Text => {}
                Some(_) => {
                    return Err(StoreError::InvalidQuery(format!(
                        "partition key column '{}' must be text",
                        key
                    )));
                }
                None => {
                    return Err(StoreError::InvalidQuery(format!(
                        "partition key column '{}' is not defined",
                        key
                    )));
                }
            }
        }
        Ok(())
    }

    /// Extracts the partition key of a full row.
    pub fn key_of(&self, row: &Row) -> Result<RowKey, StoreError> {
        let mut parts = Vec::with_capacity(self.partition_key.len());
        for key in &self.partition_key {
            match row.get(key) {
                Some(Value::Text(part)) => parts.push(part.clone()),
                _ => {
                    return Err(StoreError::InvalidQuery(format!(
                        "row is missing partition key column '{}'",
                        key
                    )));
                }
            }
        }
        Ok(RowKey(parts))
    }

    pub fn check_key(&self, key: &RowKey) -> Result<(), StoreError> {
        if key.0.len() != self.partition_key.len() {
            return Err(StoreError::InvalidQuery(format!(
                "key has {} parts, table '{}' expects {}",
                key.0.len(),
                self.name,
                self.partition_key.len()
            )));
        }
        Ok(())
    }

    pub fn check_value(&self, column: &str, value: &Value) -> Result<(), StoreError> {
        let def = self.column(column).ok_or_else(|| {
            StoreError::InvalidQuery(format!(
                "unknown column '{}' in table '{}'",
                column, self.name
            ))
        })?;
        match value.kind() {
            None => Ok(()),
            Some(kind) if kind == def.kind => Ok(()),
            Some(kind) => Err(StoreError::InvalidQuery(format!(
                "column '{}' expects {:?}, got {:?}",
                column, def.kind, kind
            ))),
        }
    }

    pub fn check_row(&self, row: &Row) -> Result<(), StoreError> {
        for (column, value) in row.iter() {
            self.check_value(column, value)?;
        }
        Ok(())
    }

    pub fn check_mutation(&self, mutation: &Mutation) -> Result<(), StoreError> {
        match mutation {
            Mutation::Insert { row } => {
                self.check_row(row)?;
                self.key_of(row).map(|_| ())
            }
            Mutation::Update { key, values } => {
                self.check_key(key)?;
                self.check_row(values)?;
                for (idx, column) in self.partition_key.iter().enumerate() {
                    let changed = values
                        .get(column)
                        .is_some_and(|value| value != &Value::Text(key.0[idx].clone()));
                    if changed {
                        return Err(StoreError::InvalidQuery(format!(
                            "update may not change partition key column '{}'",
                            column
                        )));
                    }
                }
                Ok(())
            }
            Mutation::Delete { key } => self.check_key(key),
        }
    }

    pub fn check_filter(&self, filter: &Filter) -> Result<(), StoreError> {
        match filter {
            Filter::Eq { column, value } | Filter::Gt { column, value } => {
                self.check_value(column, value)
            }
            Filter::In { column, values } => {
                for value in values {
                    self.check_value(column, value)?;
                }
                Ok(())
            }
        }
    }
}

/// Partition key values of a row, in partition-key column order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey(pub Vec<String>);

impl RowKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }
}

/// A flat row: column name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(pub BTreeMap<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.0.insert(column.to_string(), value.into());
    }

    /// Returns the value of a column, treating `Null` as absent.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column).filter(|value| !value.is_null())
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.0.remove(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Tunable consistency level of a single read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Consistency {
    One,
    Quorum,
    /// Quorum in every datacenter. The store runs a single datacenter, so this
    /// requires the same acknowledgements as `Quorum`.
    EachQuorum,
    All,
}

impl Consistency {
    pub fn required_replicas(self, replication_factor: usize) -> usize {
        match self {
            Consistency::One => 1,
            Consistency::Quorum | Consistency::EachQuorum => replication_factor / 2 + 1,
            Consistency::All => replication_factor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Eq { column: String, value: Value },
    In { column: String, values: Vec<Value> },
    Gt { column: String, value: Value },
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Eq {
            column: column.to_string(),
            value: value.into(),
        }
    }

    pub fn is_in<I, V>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::In {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn gt(column: &str, value: impl Into<Value>) -> Self {
        Filter::Gt {
            column: column.to_string(),
            value: value.into(),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::Eq { column, value } => row.get(column) == Some(value),
            Filter::In { column, values } => row
                .get(column)
                .map(|current| values.contains(current))
                .unwrap_or(false),
            Filter::Gt { column, value } => row
                .get(column)
                .and_then(|current| current.compare(value))
                .map(|ordering| ordering == Ordering::Greater)
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    /// Writes every column of `row`; the key is taken from the row itself.
    Insert { row: Row },
    /// Writes `values` into the row at `key`, creating it if absent.
    Update { key: RowKey, values: Row },
    /// Removes the whole row.
    Delete { key: RowKey },
}

impl Mutation {
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::Insert { .. } => "insert",
            Mutation::Update { .. } => "update",
            Mutation::Delete { .. } => "delete",
        }
    }
}

/// A precondition a conditional batch checks before applying any mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Exists { key: RowKey },
    NotExists { key: RowKey },
    ColumnEquals {
        key: RowKey,
        column: String,
        value: Value,
    },
}

impl Condition {
    pub fn key(&self) -> &RowKey {
        match self {
            Condition::Exists { key }
            | Condition::NotExists { key }
            | Condition::ColumnEquals { key, .. } => key,
        }
    }

    pub fn holds(&self, current: Option<&Row>) -> bool {
        match self {
            Condition::Exists { .. } => current.is_some(),
            Condition::NotExists { .. } => current.is_none(),
            Condition::ColumnEquals { column, value, .. } => current
                .and_then(|row| row.get(column))
                .map(|stored| stored == value)
                .unwrap_or(false),
        }
    }
}

/// An ordered list of mutations applied as one unit, optionally guarded by conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub mutations: Vec<Mutation>,
    pub conditions: Vec<Condition>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, row: Row) -> Self {
        self.mutations.push(Mutation::Insert { row });
        self
    }

    pub fn update(mut self, key: RowKey, values: Row) -> Self {
        self.mutations.push(Mutation::Update { key, values });
        self
    }

    pub fn delete(mut self, key: RowKey) -> Self {
        self.mutations.push(Mutation::Delete { key });
        self
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn is_conditional(&self) -> bool {
        !self.conditions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOutcome {
    Applied,
    /// A condition did not hold; nothing was written.
    Rejected,
}

impl BatchOutcome {
    pub fn is_applied(self) -> bool {
        self == BatchOutcome::Applied
    }
}

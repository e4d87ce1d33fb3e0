//! Record store trait and the in-memory implementation.
//!
//! Stores work on [`Row`]s: one JSON scalar per column, with structured
//! columns already encoded by the [codec](crate::codec).

use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::OutboxError;
use crate::record::RecordId;

/// A stored record: column name to scalar value.
pub type Row = Map<String, Value>;

/// Comparison applied by a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Lt,
}

/// A single `column <op> value` constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub op: Op,
    pub value: Value,
}

impl Condition {
    /// Whether `row` satisfies this condition. Missing columns never match.
    pub fn matches(&self, row: &Row) -> bool {
        let Some(actual) = row.get(&self.column) else {
            return false;
        };
        match self.op {
            Op::Eq => actual == &self.value,
            Op::Lt => compare(actual, &self.value) == Some(Ordering::Less),
        }
    }
}

/// Strings compare lexically (RFC 3339 dates sort correctly), numbers numerically.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        _ => None,
    }
}

/// A conjunction of conditions.
///
/// ```
/// use outbox::Conditions;
///
/// let conditions = Conditions::new()
///     .eq("type", "private")
///     .lt("send_date", "2008-01-01");
/// assert_eq!(conditions.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    conditions: Vec<Condition>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `column == value`.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, Op::Eq, value);
        self
    }

    /// Require `column < value`.
    pub fn lt(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, Op::Lt, value);
        self
    }

    fn push(&mut self, column: impl Into<String>, op: Op, value: impl Into<Value>) {
        self.conditions.push(Condition {
            column: column.into(),
            op,
            value: value.into(),
        });
    }

    /// Append all conditions of `other`.
    pub fn extend(mut self, other: Conditions) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    /// Whether a condition on `column` is present.
    pub fn constrains(&self, column: &str) -> bool {
        self.conditions.iter().any(|c| c.column == column)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter()
    }

    /// Whether `row` satisfies every condition. Empty conditions match everything.
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// A query: conditions plus an optional row limit (0 = unbounded).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    pub conditions: Conditions,
    pub limit: usize,
}

impl Criteria {
    pub fn new(conditions: Conditions) -> Self {
        Self {
            conditions,
            limit: 0,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Options for [`RecordStore::save`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Only these columns are written on update. `None` writes the whole row.
    pub fields: Option<Vec<String>>,
}

impl SaveOptions {
    /// Write only the given columns.
    pub fn only<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: Some(fields.into_iter().map(Into::into).collect()),
        }
    }

    /// The terminal write of a dispatch outcome: subject and status only.
    pub fn bookkeeping() -> Self {
        Self::only(["subject", "status"])
    }

    fn allows(&self, column: &str) -> bool {
        self.fields
            .as_ref()
            .map_or(true, |fields| fields.iter().any(|f| f == column))
    }
}

/// Trait for record storage backends.
pub trait RecordStore: Send + Sync {
    /// Rows matching `criteria`, ordered by id.
    fn find(&self, criteria: &Criteria) -> Result<Vec<Row>, OutboxError>;

    /// The row with this id.
    fn load(&self, id: RecordId) -> Result<Option<Row>, OutboxError>;

    /// Insert (`id == None`) or update a row and return its id.
    ///
    /// Updating an unknown id is an error.
    fn save(&self, id: Option<RecordId>, row: Row, options: &SaveOptions)
        -> Result<RecordId, OutboxError>;

    /// Set a single column. Returns false if the row does not exist.
    fn save_field(&self, id: RecordId, column: &str, value: Value) -> Result<bool, OutboxError>;

    /// Delete every row matching `conditions` and return how many were removed.
    fn delete_all(&self, conditions: &Conditions) -> Result<usize, OutboxError>;
}

/// Thread-safe in-memory record store.
///
/// Ids are assigned sequentially from 1.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<BTreeMap<RecordId, Row>>,
    next_id: RwLock<RecordId>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store wrapped in an Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of stored rows.
    pub fn count(&self) -> usize {
        self.rows.read().len()
    }

    /// All rows, ordered by id.
    pub fn all(&self) -> Vec<Row> {
        self.rows.read().values().cloned().collect()
    }

    /// Remove every row.
    pub fn clear(&self) {
        self.rows.write().clear();
    }

    fn allocate_id(&self) -> RecordId {
        let mut next = self.next_id.write();
        *next += 1;
        *next
    }
}

impl RecordStore for MemoryStore {
    fn find(&self, criteria: &Criteria) -> Result<Vec<Row>, OutboxError> {
        let rows = self.rows.read();
        let matching = rows
            .values()
            .filter(|row| criteria.conditions.matches(row))
            .cloned();

        Ok(match criteria.limit {
            0 => matching.collect(),
            limit => matching.take(limit).collect(),
        })
    }

    fn load(&self, id: RecordId) -> Result<Option<Row>, OutboxError> {
        Ok(self.rows.read().get(&id).cloned())
    }

    fn save(
        &self,
        id: Option<RecordId>,
        mut row: Row,
        options: &SaveOptions,
    ) -> Result<RecordId, OutboxError> {
        match id {
            None => {
                let id = self.allocate_id();
                row.insert("id".into(), Value::from(id));
                self.rows.write().insert(id, row);
                Ok(id)
            }
            Some(id) => {
                let mut rows = self.rows.write();
                let existing = rows
                    .get_mut(&id)
                    .ok_or(OutboxError::RecordNotFound(id))?;
                for (column, value) in row {
                    if column != "id" && options.allows(&column) {
                        existing.insert(column, value);
                    }
                }
                Ok(id)
            }
        }
    }

    fn save_field(&self, id: RecordId, column: &str, value: Value) -> Result<bool, OutboxError> {
        let mut rows = self.rows.write();
        match rows.get_mut(&id) {
            Some(row) => {
                row.insert(column.to_string(), value);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_all(&self, conditions: &Conditions) -> Result<usize, OutboxError> {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|_, row| !conditions.matches(row));
        Ok(before - rows.len())
    }
}

impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    fn find(&self, criteria: &Criteria) -> Result<Vec<Row>, OutboxError> {
        (**self).find(criteria)
    }

    fn load(&self, id: RecordId) -> Result<Option<Row>, OutboxError> {
        (**self).load(id)
    }

    fn save(
        &self,
        id: Option<RecordId>,
        row: Row,
        options: &SaveOptions,
    ) -> Result<RecordId, OutboxError> {
        (**self).save(id, row, options)
    }

    fn save_field(&self, id: RecordId, column: &str, value: Value) -> Result<bool, OutboxError> {
        (**self).save_field(id, column, value)
    }

    fn delete_all(&self, conditions: &Conditions) -> Result<usize, OutboxError> {
        (**self).delete_all(conditions)
    }
}

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};
use tokio::sync::watch;

use crate::store::{Filter, PhotoStore, Relation, Select, Store, StoreError, StoreResult};
use crate::types::event::{ChangeBus, ChangeEvent, ChangeKind};
use crate::types::pagination::SortDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Select,
    Insert,
    Update,
    Delete,
}

/// One request as seen by the store, kept for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreCall {
    pub op: StoreOp,
    pub relation: Relation,
    pub filters: Vec<Filter>,
}

impl StoreCall {
    pub fn is(&self, op: StoreOp, relation: Relation) -> bool {
        self.op == op && self.relation == relation
    }
}

struct Inner {
    tables: HashMap<Relation, Vec<Value>>,
    next_id: i64,
    clock: DateTime<Utc>,
    calls: Vec<StoreCall>,
    failures: Vec<(StoreOp, Relation)>,
    objects: HashMap<String, Vec<u8>>,
}

/// In-process implementation of the query surface.
///
/// Rows live in memory; ids and timestamps are assigned on insert with a
/// clock that advances one second per row, so ordering by `created_at`
/// is deterministic. Every request is recorded, one-shot failures can be
/// injected per (operation, relation), and selects can be held back to
/// observe callers while a fetch is outstanding.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    gate: watch::Sender<bool>,
    changes: Option<ChangeBus>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            inner: Mutex::new(Inner {
                tables: HashMap::new(),
                next_id: 1,
                clock: DateTime::from_timestamp(1_704_067_200, 0).unwrap_or_default(),
                calls: Vec::new(),
                failures: Vec::new(),
                objects: HashMap::new(),
            }),
            gate,
            changes: None,
        }
    }

    /// Publish a change event for every row written.
    pub fn with_changes(mut self, bus: ChangeBus) -> Self {
        self.changes = Some(bus);
        self
    }

    /// Insert a row directly, without recording a call or emitting a change.
    pub fn seed(&self, relation: Relation, row: Value) -> Value {
        let mut inner = self.inner.lock().unwrap();
        let row = inner.with_defaults(relation, row);
        inner.table(relation).push(row.clone());
        row
    }

    pub fn rows(&self, relation: Relation) -> Vec<Value> {
        let inner = self.inner.lock().unwrap();
        inner.tables.get(&relation).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    /// Fail the next `op` against `relation`.
    pub fn fail_next(&self, op: StoreOp, relation: Relation) {
        self.inner.lock().unwrap().failures.push((op, relation));
    }

    /// Hold every select until [`MemoryStore::resume_selects`].
    pub fn pause_selects(&self) {
        self.gate.send_replace(true);
    }

    pub fn resume_selects(&self) {
        self.gate.send_replace(false);
    }

    pub fn object_count(&self) -> usize {
        self.inner.lock().unwrap().objects.len()
    }

    fn begin(&self, op: StoreOp, relation: Relation, filters: &[Filter]) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(StoreCall {
            op,
            relation,
            filters: filters.to_vec(),
        });
        if let Some(pos) = inner.failures.iter().position(|f| *f == (op, relation)) {
            inner.failures.remove(pos);
            return Err(StoreError::Unavailable(format!("injected {op:?} failure on {relation}")));
        }
        Ok(())
    }

    fn notify(&self, relation: Relation, kind: ChangeKind, rows: usize) {
        if let Some(bus) = &self.changes {
            for _ in 0..rows {
                bus.emit(ChangeEvent::new(relation, kind));
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn table(&mut self, relation: Relation) -> &mut Vec<Value> {
        self.tables.entry(relation).or_default()
    }

    fn with_defaults(&mut self, relation: Relation, row: Value) -> Value {
        let mut row = match row {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".into(), other);
                map
            }
        };

        if relation != Relation::SavedPosts && relation != Relation::Profiles && !row.contains_key("id") {
            row.insert("id".into(), json!(self.next_id));
            self.next_id += 1;
        }

        if matches!(relation, Relation::Posts | Relation::Reviews | Relation::Messages)
            && !row.contains_key("created_at")
        {
            self.clock += Duration::seconds(1);
            row.insert("created_at".into(), json!(self.clock));
        }

        if relation == Relation::Posts {
            row.entry("photos").or_insert_with(|| json!([]));
            row.entry("sold").or_insert(json!(false));
            row.entry("parent").or_insert(Value::Null);
            row.entry("comments_number").or_insert(json!(0));
        }

        Value::Object(row)
    }

    fn conflicts(&self, relation: Relation, row: &Value) -> bool {
        let key: &[&str] = match relation {
            Relation::Likes | Relation::SavedPosts => &["post_id", "user_id"],
            Relation::Profiles => &["id"],
            _ => return false,
        };
        self.tables.get(&relation).is_some_and(|rows| {
            rows.iter().any(|existing| key.iter().all(|k| existing.get(*k) == row.get(*k)))
        })
    }

    fn embed(&self, query: &Select, mut row: Value) -> Value {
        for embed in &query.embeds {
            let target = row.get(embed.via).cloned().unwrap_or(Value::Null);
            let found = self
                .tables
                .get(&embed.relation)
                .and_then(|rows| rows.iter().find(|r| r.get("id") == Some(&target)))
                .cloned()
                .unwrap_or(Value::Null);
            if let Value::Object(map) = &mut row {
                map.insert(embed.relation.as_str().into(), found);
            }
        }
        row
    }
}

fn matches_all(filters: &[Filter], row: &Value) -> bool {
    filters.iter().all(|f| f.matches(row))
}

fn compare_cells(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

impl Store for MemoryStore {
    async fn select(&self, query: Select) -> StoreResult<Vec<Value>> {
        self.begin(StoreOp::Select, query.relation, &query.filters)?;

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|paused| !*paused).await;

        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<Value> = inner
            .tables
            .get(&query.relation)
            .map(|rows| rows.iter().filter(|r| matches_all(&query.filters, r)).cloned().collect())
            .unwrap_or_default();

        if let Some(order) = query.order {
            rows.sort_by(|a, b| {
                let ord = compare_cells(a.get(order.column), b.get(order.column));
                match order.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            });
        }

        if let Some(range) = query.range {
            rows = rows
                .into_iter()
                .skip(range.start as usize)
                .take(range.len() as usize)
                .collect();
        }

        Ok(rows.into_iter().map(|row| inner.embed(&query, row)).collect())
    }

    async fn insert(&self, relation: Relation, row: Value) -> StoreResult<Vec<Value>> {
        self.begin(StoreOp::Insert, relation, &[])?;

        let stored = {
            let mut inner = self.inner.lock().unwrap();
            if inner.conflicts(relation, &row) {
                return Err(StoreError::Conflict(format!("duplicate row in {relation}")));
            }
            let stored = inner.with_defaults(relation, row);
            inner.table(relation).push(stored.clone());
            stored
        };

        self.notify(relation, ChangeKind::Insert, 1);
        Ok(vec![stored])
    }

    async fn update(&self, relation: Relation, filters: Vec<Filter>, patch: Value) -> StoreResult<Vec<Value>> {
        self.begin(StoreOp::Update, relation, &filters)?;

        let updated: Vec<Value> = {
            let mut inner = self.inner.lock().unwrap();
            let mut updated = Vec::new();
            for row in inner.table(relation).iter_mut() {
                if !matches_all(&filters, row) {
                    continue;
                }
                if let (Value::Object(target), Value::Object(changes)) = (&mut *row, &patch) {
                    for (k, v) in changes {
                        target.insert(k.clone(), v.clone());
                    }
                }
                updated.push(row.clone());
            }
            updated
        };

        self.notify(relation, ChangeKind::Update, updated.len());
        Ok(updated)
    }

    async fn delete(&self, relation: Relation, filters: Vec<Filter>) -> StoreResult<Vec<Value>> {
        self.begin(StoreOp::Delete, relation, &filters)?;

        let removed: Vec<Value> = {
            let mut inner = self.inner.lock().unwrap();
            let table = inner.table(relation);
            let (removed, kept): (Vec<Value>, Vec<Value>) = std::mem::take(table)
                .into_iter()
                .partition(|row| matches_all(&filters, row));
            *table = kept;
            removed
        };

        self.notify(relation, ChangeKind::Delete, removed.len());
        Ok(removed)
    }
}

impl PhotoStore for MemoryStore {
    async fn put(&self, key: &str, body: Vec<u8>, _content_type: &str) -> StoreResult<String> {
        self.inner.lock().unwrap().objects.insert(key.to_string(), body);
        Ok(format!("memory://photos/{key}"))
    }
}

//! Database layer (Firestore).

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::AppError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const SCANS: &str = "scans";
    pub const CREDIT_USES: &str = "credit_uses";
    pub const ENTITLEMENTS: &str = "entitlements";
    pub const PRIVATE: &str = "private";
    pub const GATE: &str = "gate";
    pub const CONFIG: &str = "config";
    /// Fixed-window rate-limit buckets (keyed by derived key)
    pub const RATE_LIMITS: &str = "ratelimits";

    /// Subcollections removed when an account is deleted.
    pub const USER_SUBCOLLECTIONS: [&str; 5] = [SCANS, CREDIT_USES, ENTITLEMENTS, GATE, PRIVATE];
}

/// Path of a single document, as `(collection, id)` segments from the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath {
    segments: Vec<(String, String)>,
}

impl DocPath {
    /// A top-level document.
    pub fn root(collection: &str, id: impl Into<String>) -> Self {
        Self {
            segments: vec![(collection.to_string(), id.into())],
        }
    }

    /// A document in a subcollection of this document.
    pub fn child(&self, collection: &str, id: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push((collection.to_string(), id.into()));
        Self { segments }
    }

    pub fn collection(&self) -> &str {
        &self.last().0
    }

    pub fn id(&self) -> &str {
        &self.last().1
    }

    /// Path of the parent document relative to the database root, if any.
    pub fn parent_relative(&self) -> Option<String> {
        let parent = &self.segments[..self.segments.len() - 1];
        if parent.is_empty() {
            return None;
        }
        Some(join_segments(parent))
    }

    /// Full relative path, e.g. `users/u1/scans/s1`.
    pub fn relative(&self) -> String {
        join_segments(&self.segments)
    }

    fn last(&self) -> &(String, String) {
        // Constructors always push at least one segment.
        &self.segments[self.segments.len() - 1]
    }
}

fn join_segments(segments: &[(String, String)]) -> String {
    segments
        .iter()
        .map(|(c, id)| format!("{c}/{id}"))
        .collect::<Vec<_>>()
        .join("/")
}

/// Canonical document paths.
pub mod paths {
    use super::{collections, DocPath};

    /// Document id for the single entitlement doc.
    pub const CURRENT_ENTITLEMENT: &str = "current";
    /// Document id holding a user's sliding rate-limit buckets.
    pub const RATE_LIMITS_DOC: &str = "rateLimits";

    pub fn user(uid: &str) -> DocPath {
        DocPath::root(collections::USERS, uid)
    }

    pub fn scan(uid: &str, scan_id: &str) -> DocPath {
        user(uid).child(collections::SCANS, scan_id)
    }

    pub fn credit_use(uid: &str, id: &str) -> DocPath {
        user(uid).child(collections::CREDIT_USES, id)
    }

    pub fn entitlement(uid: &str) -> DocPath {
        user(uid).child(collections::ENTITLEMENTS, CURRENT_ENTITLEMENT)
    }

    pub fn user_rate_limits(uid: &str) -> DocPath {
        user(uid).child(collections::PRIVATE, RATE_LIMITS_DOC)
    }

    pub fn gate(uid: &str, date_key: &str) -> DocPath {
        user(uid).child(collections::GATE, date_key)
    }

    /// Fixed-window bucket; the key is URL-encoded so it is a valid doc id.
    pub fn fixed_window_bucket(key: &str) -> DocPath {
        DocPath::root(
            collections::RATE_LIMITS,
            urlencoding::encode(key).into_owned(),
        )
    }

    pub fn app_config() -> DocPath {
        DocPath::root(collections::CONFIG, "app")
    }
}

/// A write queued by a transaction.
#[derive(Debug, Clone)]
pub enum TxnWrite {
    Set(DocPath, Value),
    /// Update only the listed dotted field paths; every other field of the
    /// stored document is kept.
    Merge(DocPath, FieldPatch),
    Delete(DocPath),
}

impl TxnWrite {
    /// Serialize `obj` into a full-document write.
    pub fn set<T: Serialize>(path: DocPath, obj: &T) -> Result<Self, AppError> {
        let value = to_document(&path, obj)?;
        Ok(TxnWrite::Set(path, value))
    }

    /// Write only `fields` of `obj`, leaving the rest of the document alone.
    pub fn merge<T: Serialize>(path: DocPath, obj: &T, fields: &[&str]) -> Result<Self, AppError> {
        let patch = FieldPatch::of(&path, obj, fields)?;
        Ok(TxnWrite::Merge(path, patch))
    }
}

fn to_document<T: Serialize>(path: &DocPath, obj: &T) -> Result<Value, AppError> {
    serde_json::to_value(obj)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize {}: {e}", path.relative())))
}

/// A partial document plus the field mask it applies to.
///
/// A masked field missing from `value` is removed from the stored document,
/// matching Firestore update-mask semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPatch {
    pub value: Value,
    pub fields: Vec<String>,
}

impl FieldPatch {
    /// Serialize `obj` and keep only `fields`.
    pub fn of<T: Serialize>(path: &DocPath, obj: &T, fields: &[&str]) -> Result<Self, AppError> {
        Ok(Self::from_object(&to_document(path, obj)?, fields))
    }

    /// Project `fields` (dotted paths) out of a serialized document.
    pub fn from_object(full: &Value, fields: &[&str]) -> Self {
        let mut value = Value::Object(Default::default());
        for field in fields {
            if let Some(v) = lookup(full, field) {
                insert_at(&mut value, field, v.clone());
            }
        }
        Self {
            value,
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Apply the patch to a stored document (or to an empty one).
    pub fn apply_to(&self, target: Option<Value>) -> Value {
        let mut doc = match target {
            Some(Value::Object(map)) => Value::Object(map),
            _ => Value::Object(Default::default()),
        };
        for field in &self.fields {
            match lookup(&self.value, field) {
                Some(v) => insert_at(&mut doc, field, v.clone()),
                None => remove_at(&mut doc, field),
            }
        }
        doc
    }
}

fn lookup<'a>(value: &'a Value, field: &str) -> Option<&'a Value> {
    field
        .split('.')
        .try_fold(value, |current, segment| current.get(segment))
}

fn insert_at(target: &mut Value, field: &str, value: Value) {
    let mut segments = field.split('.').peekable();
    let mut current = target;
    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = Value::Object(Default::default());
        }
        let Value::Object(map) = current else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
    }
}

fn remove_at(target: &mut Value, field: &str) {
    match field.rsplit_once('.') {
        Some((parent, leaf)) => {
            if let Some(Value::Object(map)) = lookup_mut(target, parent) {
                map.remove(leaf);
            }
        }
        None => {
            if let Value::Object(map) = target {
                map.remove(field);
            }
        }
    }
}

fn lookup_mut<'a>(value: &'a mut Value, field: &str) -> Option<&'a mut Value> {
    field
        .split('.')
        .try_fold(value, |current, segment| current.get_mut(segment))
}

/// Result of a transaction body: the value returned to the caller plus the
/// writes to commit atomically.
#[derive(Debug)]
pub struct TxnPlan<T> {
    pub value: T,
    pub writes: Vec<TxnWrite>,
}

impl<T> TxnPlan<T> {
    pub fn new(value: T, writes: Vec<TxnWrite>) -> Self {
        Self { value, writes }
    }

    /// Commit nothing.
    pub fn read_only(value: T) -> Self {
        Self {
            value,
            writes: Vec::new(),
        }
    }
}

/// Decode a document read inside a transaction.
pub fn decode<T: DeserializeOwned>(doc: Option<&Value>) -> Result<Option<T>, AppError> {
    doc.map(|value| {
        serde_json::from_value(value.clone())
            .map_err(|e| AppError::Database(format!("Malformed document: {e}")))
    })
    .transpose()
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process document store.
//!
//! Documents are JSON values keyed by relative path. Transactions hold the
//! store lock for their whole read-decide-write cycle, so they are
//! serializable, like Firestore transactions after retries.

use super::{DocPath, FieldPatch, TxnPlan, TxnWrite};
use crate::error::AppError;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// Shared in-memory document store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, path: &DocPath) -> Option<Value> {
        self.docs.lock().await.get(&path.relative()).cloned()
    }

    pub async fn set(&self, path: &DocPath, value: Value) {
        self.docs.lock().await.insert(path.relative(), value);
    }

    pub async fn merge(&self, path: &DocPath, patch: &FieldPatch) {
        let key = path.relative();
        let mut docs = self.docs.lock().await;
        let merged = patch.apply_to(docs.remove(&key));
        docs.insert(key, merged);
    }

    pub async fn delete(&self, path: &DocPath) {
        self.docs.lock().await.remove(&path.relative());
    }

    /// Ids of the documents directly inside `parent/collection`.
    pub async fn list_ids(&self, parent: &DocPath, collection: &str) -> Vec<String> {
        let prefix = format!("{}/{}/", parent.relative(), collection);
        self.docs
            .lock()
            .await
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, _)| {
                let rest = &key[prefix.len()..];
                (!rest.contains('/')).then(|| rest.to_string())
            })
            .collect()
    }

    /// Run `apply` against a consistent snapshot of `reads` and commit its
    /// writes before releasing the lock.
    pub async fn transact<T, F>(&self, reads: &[DocPath], apply: F) -> Result<T, AppError>
    where
        F: Fn(&[Option<Value>]) -> Result<TxnPlan<T>, AppError>,
    {
        let mut docs = self.docs.lock().await;
        let snapshot: Vec<Option<Value>> = reads
            .iter()
            .map(|path| docs.get(&path.relative()).cloned())
            .collect();

        let plan = apply(&snapshot)?;

        for write in plan.writes {
            match write {
                TxnWrite::Set(path, value) => {
                    docs.insert(path.relative(), value);
                }
                TxnWrite::Merge(path, patch) => {
                    let key = path.relative();
                    let merged = patch.apply_to(docs.remove(&key));
                    docs.insert(key, merged);
                }
                TxnWrite::Delete(path) => {
                    docs.remove(&path.relative());
                }
            }
        }

        Ok(plan.value)
    }
}

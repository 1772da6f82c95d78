// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides:
//! - generic document get/set/delete by [`DocPath`]
//! - `transact`, an optimistic read-decide-write transaction
//! - typed helpers for users, scans, entitlements and app config
//! - account data deletion
//!
//! The same API runs against real Firestore, an in-process
//! [`MemoryStore`], or an offline mock that fails every call.

use crate::db::memory::MemoryStore;
use crate::db::{collections, paths, DocPath, FieldPatch, TxnPlan, TxnWrite};
use crate::error::AppError;
use crate::models::{AppConfig, Entitlement, Scan, User};
use firestore::errors::{BackoffError, FirestoreError};
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

#[derive(Clone)]
enum Backend {
    Firestore(firestore::FirestoreDb),
    Memory(Arc<MemoryStore>),
    Offline,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    backend: Backend,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            backend: Backend::Firestore(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            backend: Backend::Firestore(client),
        })
    }

    /// Create a client backed by an in-process store.
    ///
    /// Used by tests and local runs without the emulator.
    pub fn new_in_memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(MemoryStore::new())),
        }
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self {
            backend: Backend::Offline,
        }
    }

    fn offline() -> AppError {
        AppError::Database("Database not connected (offline mode)".to_string())
    }

    // ─── Generic Document Operations ─────────────────────────────

    /// Read a document, `None` if it does not exist.
    pub async fn get_doc<T>(&self, path: &DocPath) -> Result<Option<T>, AppError>
    where
        T: DeserializeOwned + Send,
    {
        match &self.backend {
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(path.collection())
                .parent(absolute_parent(client.get_documents_path(), path))
                .obj()
                .one(path.id())
                .await
                .map_err(|e| AppError::Database(e.to_string())),
            Backend::Memory(store) => super::decode(store.get(path).await.as_ref()),
            Backend::Offline => Err(Self::offline()),
        }
    }

    /// Create or replace a document.
    pub async fn set_doc<T>(&self, path: &DocPath, obj: &T) -> Result<(), AppError>
    where
        T: Serialize + DeserializeOwned + Sync + Send,
    {
        match &self.backend {
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(path.collection())
                    .document_id(path.id())
                    .parent(absolute_parent(client.get_documents_path(), path))
                    .object(obj)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok(())
            }
            Backend::Memory(store) => {
                let value = serde_json::to_value(obj)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize document: {e}")))?;
                store.set(path, value).await;
                Ok(())
            }
            Backend::Offline => Err(Self::offline()),
        }
    }

    /// Update only `fields` of a document from `obj`; other fields are kept.
    ///
    /// Creates the document if it does not exist.
    pub async fn merge_doc<T>(&self, path: &DocPath, obj: &T, fields: &[&str]) -> Result<(), AppError>
    where
        T: Serialize + Sync + Send,
    {
        let patch = FieldPatch::of(path, obj, fields)?;

        match &self.backend {
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .fields(patch.fields.iter())
                    .in_col(path.collection())
                    .document_id(path.id())
                    .parent(absolute_parent(client.get_documents_path(), path))
                    .object(&patch.value)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok(())
            }
            Backend::Memory(store) => {
                store.merge(path, &patch).await;
                Ok(())
            }
            Backend::Offline => Err(Self::offline()),
        }
    }

    /// Delete a document (no error if it does not exist).
    pub async fn delete_doc(&self, path: &DocPath) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                client
                    .fluent()
                    .delete()
                    .from(path.collection())
                    .document_id(path.id())
                    .parent(absolute_parent(client.get_documents_path(), path))
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok(())
            }
            Backend::Memory(store) => {
                store.delete(path).await;
                Ok(())
            }
            Backend::Offline => Err(Self::offline()),
        }
    }

    /// Ids of all documents in `parent/collection`.
    pub async fn list_doc_ids(
        &self,
        parent: &DocPath,
        collection: &str,
    ) -> Result<Vec<String>, AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let parent_path = format!("{}/{}", client.get_documents_path(), parent.relative());
                let docs = client
                    .fluent()
                    .select()
                    .from(collection)
                    .parent(parent_path)
                    .query()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;

                Ok(docs
                    .into_iter()
                    .filter_map(|doc| doc.name.rsplit('/').next().map(str::to_string))
                    .collect())
            }
            Backend::Memory(store) => Ok(store.list_ids(parent, collection).await),
            Backend::Offline => Err(Self::offline()),
        }
    }

    // ─── Transactions ────────────────────────────────────────────

    /// Atomically read `reads`, decide with `apply`, and commit its writes.
    ///
    /// `apply` receives the documents in the order of `reads` and must be
    /// pure: Firestore re-runs it with fresh data when a concurrent commit
    /// touched any of the documents. If `apply` returns an error nothing is
    /// written and the error is returned unchanged.
    pub async fn transact<T, F>(&self, reads: Vec<DocPath>, apply: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: Fn(&[Option<Value>]) -> Result<TxnPlan<T>, AppError> + Send + Sync + 'static,
    {
        match &self.backend {
            Backend::Firestore(client) => {
                let reads = Arc::new(reads);
                let apply = Arc::new(apply);
                let documents_path = client.get_documents_path().clone();

                let outcome = client
                    .run_transaction(move |db, transaction| {
                        let reads = reads.clone();
                        let apply = apply.clone();
                        let documents_path = documents_path.clone();

                        async move {
                            let mut snapshot = Vec::with_capacity(reads.len());
                            for path in reads.iter() {
                                let doc: Option<Value> = db
                                    .fluent()
                                    .select()
                                    .by_id_in(path.collection())
                                    .parent(absolute_parent(&documents_path, path))
                                    .obj()
                                    .one(path.id())
                                    .await?;
                                snapshot.push(doc);
                            }

                            let plan = match (apply.as_ref())(&snapshot) {
                                Ok(plan) => plan,
                                Err(e) => return Ok(Err(e)),
                            };

                            for write in &plan.writes {
                                match write {
                                    TxnWrite::Set(path, value) => {
                                        db.fluent()
                                            .update()
                                            .in_col(path.collection())
                                            .document_id(path.id())
                                            .parent(absolute_parent(&documents_path, path))
                                            .object(value)
                                            .add_to_transaction(transaction)?;
                                    }
                                    TxnWrite::Merge(path, patch) => {
                                        db.fluent()
                                            .update()
                                            .fields(patch.fields.iter())
                                            .in_col(path.collection())
                                            .document_id(path.id())
                                            .parent(absolute_parent(&documents_path, path))
                                            .object(&patch.value)
                                            .add_to_transaction(transaction)?;
                                    }
                                    TxnWrite::Delete(path) => {
                                        db.fluent()
                                            .delete()
                                            .from(path.collection())
                                            .document_id(path.id())
                                            .parent(absolute_parent(&documents_path, path))
                                            .add_to_transaction(transaction)?;
                                    }
                                }
                            }

                            Ok::<Result<T, AppError>, BackoffError<FirestoreError>>(Ok(
                                plan.value,
                            ))
                        }
                        .boxed()
                    })
                    .await
                    .map_err(|e| AppError::Database(format!("Transaction failed: {}", e)))?;

                outcome
            }
            Backend::Memory(store) => store.transact(&reads, apply).await,
            Backend::Offline => Err(Self::offline()),
        }
    }

    /// Delete documents in transactional batches.
    async fn batch_delete(&self, docs: Vec<DocPath>) -> Result<usize, AppError> {
        let total = docs.len();
        for chunk in docs.chunks(BATCH_SIZE) {
            let chunk = chunk.to_vec();
            self.transact(Vec::new(), move |_| {
                Ok(TxnPlan::new(
                    (),
                    chunk.iter().cloned().map(TxnWrite::Delete).collect(),
                ))
            })
            .await?;
        }
        Ok(total)
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user by UID.
    pub async fn get_user(&self, uid: &str) -> Result<Option<User>, AppError> {
        self.get_doc(&paths::user(uid)).await
    }

    /// Create or replace a user.
    pub async fn upsert_user(&self, uid: &str, user: &User) -> Result<(), AppError> {
        self.set_doc(&paths::user(uid), user).await
    }

    // ─── Scan Operations ─────────────────────────────────────────

    pub async fn get_scan(&self, uid: &str, scan_id: &str) -> Result<Option<Scan>, AppError> {
        self.get_doc(&paths::scan(uid, scan_id)).await
    }

    /// Plain (non-transactional) write of the listed scan fields.
    pub async fn update_scan(&self, scan: &Scan, fields: &[&str]) -> Result<(), AppError> {
        self.merge_doc(&paths::scan(&scan.uid, &scan.scan_id), scan, fields)
            .await
    }

    // ─── Entitlements & Config ───────────────────────────────────

    pub async fn get_entitlement(&self, uid: &str) -> Result<Option<Entitlement>, AppError> {
        self.get_doc(&paths::entitlement(uid)).await
    }

    pub async fn set_entitlement(&self, uid: &str, ent: &Entitlement) -> Result<(), AppError> {
        self.set_doc(&paths::entitlement(uid), ent).await
    }

    pub async fn get_app_config(&self) -> Result<Option<AppConfig>, AppError> {
        self.get_doc(&paths::app_config()).await
    }

    pub async fn set_app_config(&self, config: &AppConfig) -> Result<(), AppError> {
        self.set_doc(&paths::app_config(), config).await
    }

    // ─── User Data Deletion ──────────────────────────────────────

    /// Delete ALL data for a user.
    ///
    /// Removes every document in the user's subcollections, then the user
    /// document itself. Returns the number of documents deleted.
    pub async fn delete_user_data(&self, uid: &str) -> Result<usize, AppError> {
        let user = paths::user(uid);
        let mut deleted_count = 0;

        for collection in collections::USER_SUBCOLLECTIONS {
            let ids = self.list_doc_ids(&user, collection).await?;
            let docs = ids
                .into_iter()
                .map(|id| user.child(collection, id))
                .collect();
            let count = self.batch_delete(docs).await?;
            deleted_count += count;
            tracing::debug!(uid, collection, count, "Deleted user subcollection");
        }

        self.delete_doc(&user).await?;
        deleted_count += 1;

        tracing::info!(uid, deleted_count, "User data deletion complete");

        Ok(deleted_count)
    }
}

/// Absolute parent path for `path` in the Firestore API.
fn absolute_parent(documents_path: &str, path: &DocPath) -> String {
    match path.parent_relative() {
        Some(rel) => format!("{documents_path}/{rel}"),
        None => documents_path.to_string(),
    }
}

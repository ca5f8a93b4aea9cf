//! Partial updates driven by the field registry
//!
//! A [`PatchSet`] maps external field names to untyped JSON values.
//! [`PatchEngine::merge_one`] overlays it on a copy of an existing record;
//! [`PatchEngine::merge_batch`] does the same for many records inside one
//! storage transaction, so either every item is written or none is.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::fields::{FieldRegistry, Record};
use crate::repository::{RecordTransaction, Transactional};

/// External field name to raw JSON value
pub type PatchSet = Map<String, Value>;

/// Applies [`PatchSet`]s to records of type `R`
#[derive(Debug)]
pub struct PatchEngine<R: Record> {
    registry: Arc<FieldRegistry<R>>,
}

impl<R: Record> Clone for PatchEngine<R> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<R: Record> PatchEngine<R> {
    /// Create an engine over a shared field registry
    pub fn new(registry: Arc<FieldRegistry<R>>) -> Self {
        Self { registry }
    }

    /// Overlay a patch onto a copy of `existing`
    ///
    /// The identifier key, unknown keys and read-only fields are ignored.
    /// `existing` is never modified.
    ///
    /// # Errors
    ///
    /// Returns `Error::TypeMismatch` when a value cannot be converted to
    /// its field's declared kind.
    pub fn merge_one(&self, existing: &R, patch: &PatchSet) -> Result<R> {
        let mut merged = existing.clone();

        for (key, raw) in patch {
            if key == R::IDENTIFIER {
                continue;
            }
            let Some(descriptor) = self.registry.get(key) else {
                tracing::debug!(field = %key, "Ignoring unknown patch field");
                continue;
            };
            if !descriptor.patchable {
                continue;
            }

            let mismatch = || Error::TypeMismatch {
                field: key.clone(),
                value: raw.to_string(),
            };
            let value = descriptor.kind().coerce_json(raw).ok_or_else(mismatch)?;
            merged.set(descriptor.field, value).map_err(|_| mismatch())?;
        }

        Ok(merged)
    }

    /// Merge and write a batch of patches atomically
    ///
    /// Each item must carry the record identifier, either as a JSON integer
    /// or a decimal string. The transaction is opened before the first read;
    /// any failure rolls back every write made so far and is returned
    /// unchanged.
    pub async fn merge_batch<S>(&self, store: &S, items: Vec<PatchSet>) -> Result<Vec<R>>
    where
        S: Transactional<R>,
    {
        let mut tx = store.begin().await?;

        match self.apply_batch(&mut tx, &items).await {
            Ok(merged) => {
                tx.commit().await?;
                tracing::info!(count = merged.len(), "Batch patch committed");
                Ok(merged)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Batch patch rollback failed");
                }
                tracing::info!(error = %err, "Batch patch rolled back");
                Err(err)
            }
        }
    }

    async fn apply_batch<T>(&self, tx: &mut T, items: &[PatchSet]) -> Result<Vec<R>>
    where
        T: RecordTransaction<R>,
    {
        let mut merged = Vec::with_capacity(items.len());

        for (position, item) in items.iter().enumerate() {
            let id = identifier_of::<R>(item, position)?;
            let existing = tx
                .fetch(id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("record {} not found", id)))?;

            let record = self.merge_one(&existing, item)?;
            tx.write(&record).await?;
            merged.push(record);
        }

        Ok(merged)
    }
}

fn identifier_of<R: Record>(item: &PatchSet, position: usize) -> Result<i64> {
    let missing = || {
        Error::Validation(format!(
            "item {} requires an integer '{}'",
            position,
            R::IDENTIFIER
        ))
    };

    match item.get(R::IDENTIFIER) {
        Some(Value::Number(n)) => n.as_i64().ok_or_else(missing),
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| missing()),
        _ => Err(missing()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::database::{create_pool, test_pool};
    use crate::models::{teacher_registry, NewTeacher, Teacher};
    use crate::query::QueryFragment;
    use crate::repository::{SqliteTeacherRepository, TeacherRepository};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn engine() -> PatchEngine<Teacher> {
        PatchEngine::new(Arc::new(teacher_registry().unwrap()))
    }

    fn patch(value: Value) -> PatchSet {
        match value {
            Value::Object(map) => map,
            _ => panic!("patch must be an object"),
        }
    }

    fn jane() -> Teacher {
        Teacher {
            id: 1,
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            email: "jane@school.test".to_string(),
            class: "10A".to_string(),
            subject: "Algebra".to_string(),
        }
    }

    async fn seeded() -> SqliteTeacherRepository {
        let repo = SqliteTeacherRepository::new(test_pool().await);
        let people = [("John", "Math"), ("Jane", "Algebra")];
        repo.create_many(
            people
                .iter()
                .map(|(first, subject)| NewTeacher {
                    first_name: first.to_string(),
                    last_name: "Doe".to_string(),
                    email: format!("{}@school.test", first.to_lowercase()),
                    class: "9A".to_string(),
                    subject: subject.to_string(),
                })
                .collect(),
        )
        .await
        .unwrap();
        repo
    }

    #[test]
    fn test_merge_one_overlays_known_fields() {
        let existing = jane();
        let merged = engine()
            .merge_one(
                &existing,
                &patch(json!({"subject": "Geometry", "unknown": 5, "id": 99})),
            )
            .unwrap();

        assert_eq!(merged.subject, "Geometry");
        assert_eq!(merged.id, 1);
        assert_eq!(merged.first_name, "Jane");
        assert_eq!(existing, jane());
    }

    #[test]
    fn test_merge_one_type_mismatch() {
        let err = engine()
            .merge_one(&jane(), &patch(json!({"first_name": 42})))
            .unwrap_err();

        match err {
            Error::TypeMismatch { field, value } => {
                assert_eq!(field, "first_name");
                assert_eq!(value, "42");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_empty_patch_is_identity() {
        let merged = engine().merge_one(&jane(), &PatchSet::new()).unwrap();
        assert_eq!(merged, jane());
    }

    #[test]
    fn test_identifier_forms() {
        assert_eq!(identifier_of::<Teacher>(&patch(json!({"id": 4})), 0).unwrap(), 4);
        assert_eq!(identifier_of::<Teacher>(&patch(json!({"id": "4"})), 0).unwrap(), 4);
        for bad in [json!({"id": "four"}), json!({"id": 1.5}), json!({"subject": "x"})] {
            let err = identifier_of::<Teacher>(&patch(bad), 2).unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_merge_batch_commits_all() {
        let repo = seeded().await;
        let merged = engine()
            .merge_batch(
                &repo,
                vec![
                    patch(json!({"id": 1, "subject": "Physics"})),
                    patch(json!({"id": "2", "class": "11B"})),
                ],
            )
            .await
            .unwrap();
        assert_eq!(merged.len(), 2);

        assert_eq!(repo.find_by_id(1).await.unwrap().unwrap().subject, "Physics");
        assert_eq!(repo.find_by_id(2).await.unwrap().unwrap().class, "11B");
    }

    #[tokio::test]
    async fn test_merge_batch_missing_record_rolls_back() {
        let repo = seeded().await;
        let before = repo.find_all(&QueryFragment::default()).await.unwrap();

        let err = engine()
            .merge_batch(
                &repo,
                vec![
                    patch(json!({"id": 1, "subject": "Physics"})),
                    patch(json!({"id": 999, "subject": "Chemistry"})),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let after = repo.find_all(&QueryFragment::default()).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_merge_batch_type_mismatch_rolls_back() {
        let repo = seeded().await;

        let err = engine()
            .merge_batch(
                &repo,
                vec![
                    patch(json!({"id": 1, "subject": "Physics"})),
                    patch(json!({"id": 2, "class": 11})),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert_eq!(repo.find_by_id(1).await.unwrap().unwrap().subject, "Math");
    }

    #[tokio::test]
    async fn test_overlapping_batches_on_shared_file_all_commit() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("school.db").display()),
            max_connections: 8,
            connection_timeout_secs: 10,
            max_retries: 0,
            retry_delay_secs: 0,
        };
        let repo = SqliteTeacherRepository::new(create_pool(&config).await.unwrap());
        repo.create_many(
            ["John", "Jane"]
                .iter()
                .map(|first| NewTeacher {
                    first_name: first.to_string(),
                    last_name: "Doe".to_string(),
                    email: format!("{}@school.test", first.to_lowercase()),
                    class: "9A".to_string(),
                    subject: "Math".to_string(),
                })
                .collect(),
        )
        .await
        .unwrap();

        let engine = engine();
        let batches = (0..16).map(|i| {
            let subject = format!("s{}", i);
            engine.merge_batch(
                &repo,
                vec![
                    patch(json!({"id": 1, "subject": &subject})),
                    patch(json!({"id": 2, "subject": &subject})),
                ],
            )
        });
        let results = futures::future::join_all(batches).await;

        let failures: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
        assert!(failures.is_empty(), "batches failed: {:?}", failures);

        let first = repo.find_by_id(1).await.unwrap().unwrap();
        let second = repo.find_by_id(2).await.unwrap().unwrap();
        assert_eq!(first.subject, second.subject);
    }

    /// Store whose writes always fail, recording how the transaction ended
    #[derive(Default)]
    struct FailingStore {
        committed: Arc<AtomicBool>,
        rolled_back: Arc<AtomicBool>,
    }

    struct FailingTransaction {
        committed: Arc<AtomicBool>,
        rolled_back: Arc<AtomicBool>,
    }

    impl RecordTransaction<Teacher> for FailingTransaction {
        async fn fetch(&mut self, id: i64) -> Result<Option<Teacher>> {
            let mut teacher = jane();
            teacher.id = id;
            Ok(Some(teacher))
        }

        async fn write(&mut self, _record: &Teacher) -> Result<()> {
            Err(Error::Internal("disk full".to_string()))
        }

        async fn commit(self) -> Result<()> {
            self.committed.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn rollback(self) -> Result<()> {
            self.rolled_back.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Transactional<Teacher> for FailingStore {
        type Transaction = FailingTransaction;

        async fn begin(&self) -> Result<FailingTransaction> {
            Ok(FailingTransaction {
                committed: Arc::clone(&self.committed),
                rolled_back: Arc::clone(&self.rolled_back),
            })
        }
    }

    #[tokio::test]
    async fn test_write_failure_rolls_back_and_propagates() {
        let store = FailingStore::default();
        let err = engine()
            .merge_batch(&store, vec![patch(json!({"id": 1, "subject": "Physics"}))])
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Internal(_)));
        assert!(store.rolled_back.load(Ordering::SeqCst));
        assert!(!store.committed.load(Ordering::SeqCst));
    }
}

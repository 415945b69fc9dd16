use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::model::{reference_ids, Document, Id, RelationshipDescriptor, ID_FIELD};
use crate::store::{DocumentStore, FieldUpdate};

/// One reverse-reference update on a related document.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationTask {
    pub model: String,
    pub id: Id,
    pub update: FieldUpdate,
}

/// Updates that make every document referenced by `created` point back at it.
pub fn on_create(relationships: &[RelationshipDescriptor], created: &Document) -> Vec<RelationTask> {
    reverse_updates(relationships, created, |relation, owner| {
        if relation.is_array {
            FieldUpdate::AddToSet {
                field: relation.related_field.clone(),
                value: owner,
            }
        } else {
            FieldUpdate::Set {
                field: relation.related_field.clone(),
                value: owner,
            }
        }
    })
}

/// Updates that remove every back reference to `deleted`.
pub fn on_delete(relationships: &[RelationshipDescriptor], deleted: &Document) -> Vec<RelationTask> {
    reverse_updates(relationships, deleted, |relation, owner| {
        if relation.is_array {
            FieldUpdate::Pull {
                field: relation.related_field.clone(),
                value: owner,
            }
        } else {
            FieldUpdate::Unset {
                field: relation.related_field.clone(),
            }
        }
    })
}

fn reverse_updates<F>(
    relationships: &[RelationshipDescriptor],
    document: &Document,
    make_update: F,
) -> Vec<RelationTask>
where
    F: Fn(&RelationshipDescriptor, Value) -> FieldUpdate,
{
    let Some(owner) = document.get(ID_FIELD) else {
        return Vec::new();
    };
    relationships
        .iter()
        .filter_map(|relation| {
            document
                .get(&relation.owning_field)
                .map(|value| (relation, reference_ids(value)))
        })
        .flat_map(|(relation, ids)| {
            let make_update = &make_update;
            ids.into_iter().map(move |id| RelationTask {
                model: relation.related_model.clone(),
                id,
                update: make_update(relation, owner.clone()),
            })
        })
        .collect()
}

#[derive(Default)]
struct Progress {
    in_flight: AtomicUsize,
    failures: AtomicU64,
    idle: Notify,
}

impl Progress {
    fn finish(&self, ok: bool) {
        if !ok {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Best-effort background runner for relationship maintenance.
///
/// Tasks are spawned independently and never awaited by the request that
/// scheduled them. Failures are logged and counted, never surfaced.
pub struct RelationshipQueue<S> {
    store: Arc<S>,
    progress: Arc<Progress>,
}

impl<S> Clone for RelationshipQueue<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            progress: self.progress.clone(),
        }
    }
}

/// Handles to tasks spawned by one [`RelationshipQueue::schedule`] call.
///
/// Dropping it detaches the tasks; they keep running.
#[must_use = "drop the handle to detach the tasks"]
pub struct PendingRelations(Vec<JoinHandle<bool>>);

impl PendingRelations {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Wait for all tasks and return how many succeeded.
    pub async fn wait(self) -> usize {
        let mut succeeded = 0;
        for handle in self.0 {
            if matches!(handle.await, Ok(true)) {
                succeeded += 1;
            }
        }
        succeeded
    }
}

impl<S: DocumentStore + 'static> RelationshipQueue<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            progress: Arc::new(Progress::default()),
        }
    }

    pub fn schedule(&self, tasks: Vec<RelationTask>) -> PendingRelations {
        let handles = tasks
            .into_iter()
            .map(|task| {
                let store = self.store.clone();
                let progress = self.progress.clone();
                progress.in_flight.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let ok = run_task(store.as_ref(), &task).await;
                    progress.finish(ok);
                    ok
                })
            })
            .collect();
        PendingRelations(handles)
    }

    /// Number of tasks that failed since the queue was created.
    pub fn failures(&self) -> u64 {
        self.progress.failures.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.progress.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until every scheduled task has finished.
    pub async fn settle(&self) {
        loop {
            let idle = self.progress.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            idle.await;
        }
    }
}

async fn run_task<S: DocumentStore>(store: &S, task: &RelationTask) -> bool {
    match store.update_by_id(&task.model, &task.id, &task.update).await {
        Ok(true) => {
            log::debug!(
                "Relationship update applied: {}.{} on {}",
                task.model,
                task.update.field(),
                task.id
            );
            true
        }
        Ok(false) => {
            log::debug!(
                "Relationship target {} {} not found, skipping {}",
                task.model,
                task.id,
                task.update.field()
            );
            true
        }
        Err(err) => {
            log::warn!(
                "Failed to relate {}.{} on {}: {}",
                task.model,
                task.update.field(),
                task.id,
                err
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::generate_id;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn relations() -> Vec<RelationshipDescriptor> {
        vec![
            RelationshipDescriptor {
                owning_field: "owner".into(),
                related_model: "User".into(),
                related_field: "tasks".into(),
                is_array: true,
            },
            RelationshipDescriptor {
                owning_field: "project".into(),
                related_model: "Project".into(),
                related_field: "lead".into(),
                is_array: false,
            },
        ]
    }

    #[test]
    fn create_adds_or_sets_back_references() {
        let task = doc(json!({"_id": "t1", "owner": ["u1", "u2"], "project": "p1"}));
        let tasks = on_create(&relations(), &task);

        assert_eq!(tasks.len(), 3);
        assert_eq!(
            tasks[0],
            RelationTask {
                model: "User".into(),
                id: "u1".into(),
                update: FieldUpdate::AddToSet {
                    field: "tasks".into(),
                    value: json!("t1")
                },
            }
        );
        assert_eq!(
            tasks[2].update,
            FieldUpdate::Set {
                field: "lead".into(),
                value: json!("t1")
            }
        );
    }

    #[test]
    fn delete_pulls_or_unsets_back_references() {
        let task = doc(json!({"_id": "t1", "owner": "u1", "project": "p1"}));
        let tasks = on_delete(&relations(), &task);

        assert_eq!(
            tasks.iter().map(|t| t.update.clone()).collect::<Vec<_>>(),
            vec![
                FieldUpdate::Pull {
                    field: "tasks".into(),
                    value: json!("t1")
                },
                FieldUpdate::Unset {
                    field: "lead".into()
                },
            ]
        );
    }

    #[test]
    fn absent_owning_fields_produce_nothing() {
        let task = doc(json!({"_id": "t1", "title": "x"}));
        assert!(on_create(&relations(), &task).is_empty());
        let orphan = doc(json!({"owner": "u1"}));
        assert!(on_create(&relations(), &orphan).is_empty());
    }

    #[tokio::test]
    async fn queue_runs_tasks_and_counts_failures() {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .insert("User", doc(json!({"name": "alice"})))
            .await
            .unwrap();
        let user_id = user[ID_FIELD].as_str().unwrap().to_string();
        let queue = RelationshipQueue::new(store.clone());

        let pending = queue.schedule(vec![
            RelationTask {
                model: "User".into(),
                id: user_id.clone(),
                update: FieldUpdate::AddToSet {
                    field: "tasks".into(),
                    value: json!("t1"),
                },
            },
            RelationTask {
                model: "User".into(),
                id: "not-an-id".into(),
                update: FieldUpdate::Unset {
                    field: "tasks".into(),
                },
            },
            RelationTask {
                model: "User".into(),
                id: generate_id(),
                update: FieldUpdate::Unset {
                    field: "tasks".into(),
                },
            },
        ]);
        assert_eq!(pending.len(), 3);
        assert_eq!(pending.wait().await, 2);

        queue.settle().await;
        assert_eq!(queue.failures(), 1);
        assert_eq!(queue.in_flight(), 0);
        assert_eq!(store.get("User", &user_id).unwrap()["tasks"], json!(["t1"]));
    }

    #[tokio::test]
    async fn settle_waits_for_detached_tasks() {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .insert("User", doc(json!({"name": "bob"})))
            .await
            .unwrap();
        let user_id = user[ID_FIELD].as_str().unwrap().to_string();
        let queue = RelationshipQueue::new(store.clone());

        queue.settle().await;
        let tasks = (0..20)
            .map(|n| RelationTask {
                model: "User".into(),
                id: user_id.clone(),
                update: FieldUpdate::AddToSet {
                    field: "tasks".into(),
                    value: json!(format!("t{n}")),
                },
            })
            .collect();
        drop(queue.schedule(tasks));

        tokio::time::timeout(std::time::Duration::from_secs(5), queue.settle())
            .await
            .unwrap();
        assert_eq!(queue.in_flight(), 0);
        let stored = store.get("User", &user_id).unwrap();
        assert_eq!(stored["tasks"].as_array().unwrap().len(), 20);
    }
}

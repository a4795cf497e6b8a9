//! Units of queue work

use serde::{Deserialize, Serialize};

use crate::generation::FailureKind;
use crate::store::Entity;

/// One (entity, slot) generation job. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenTask {
    pub id: String,
    pub entity_id: String,
    pub slot: usize,
}

impl GenTask {
    pub fn new(entity_id: &str, slot: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_id: entity_id.to_string(),
            slot,
        }
    }
}

/// Lifecycle of a task: `Queued -> Running -> (Done | Failed)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "kind")]
pub enum TaskState {
    Queued,
    Running,
    Done,
    Failed(FailureKind),
}

/// Tasks for every slot of every entity, entity-major
pub fn tasks_for(entity_ids: &[String], slots: &[usize]) -> Vec<GenTask> {
    entity_ids
        .iter()
        .flat_map(|id| slots.iter().map(move |&slot| GenTask::new(id, slot)))
        .collect()
}

/// Tasks for the slots an entity has no result for yet
pub fn tasks_for_missing(entity: &Entity, slot_count: usize) -> Vec<GenTask> {
    entity
        .missing_slots(slot_count)
        .into_iter()
        .map(|slot| GenTask::new(&entity.id, slot))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tasks_for_is_entity_major() {
        let tasks = tasks_for(&["a".to_string(), "b".to_string()], &[0, 2]);
        let pairs: Vec<(&str, usize)> = tasks
            .iter()
            .map(|t| (t.entity_id.as_str(), t.slot))
            .collect();
        assert_eq!(pairs, vec![("a", 0), ("a", 2), ("b", 0), ("b", 2)]);
        assert_ne!(tasks[0].id, tasks[1].id);
    }

    #[test]
    fn test_tasks_for_missing() {
        let mut entity = Entity::new("a", "wlop");
        entity.set_benchmark(0, "img".to_string());
        let slots: Vec<usize> = tasks_for_missing(&entity, 3).iter().map(|t| t.slot).collect();
        assert_eq!(slots, vec![1, 2]);
    }

    #[test]
    fn test_task_wire_format() {
        let task = GenTask::new("a1", 3);
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["entityId"], "a1");
        assert_eq!(json["slot"], 3);
    }
}

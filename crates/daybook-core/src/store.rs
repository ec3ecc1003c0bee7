use std::collections::BTreeMap;

use serde::{
  Deserialize,
  Serialize
};
use tracing::{
  debug,
  trace
};

use crate::datetime::DayKey;
use crate::task::Task;

/// Tasks grouped by calendar day. Within a day, insertion order is
/// display order. A missing key and an empty list mean the same thing.
#[derive(
  Debug,
  Clone,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize
)]
#[serde(transparent)]
pub struct TaskStore {
  days: BTreeMap<DayKey, Vec<Task>>
}

impl TaskStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn tasks_for(
    &self,
    key: &DayKey
  ) -> &[Task] {
    self
      .days
      .get(key)
      .map(Vec::as_slice)
      .unwrap_or_default()
  }

  /// Days holding at least one task, with their lists.
  pub fn days(
    &self
  ) -> impl Iterator<Item = (&DayKey, &[Task])>
  {
    self
      .days
      .iter()
      .filter(|(_, tasks)| !tasks.is_empty())
      .map(|(key, tasks)| {
        (key, tasks.as_slice())
      })
  }

  pub fn has_tasks(
    &self,
    key: &DayKey
  ) -> bool {
    !self.tasks_for(key).is_empty()
  }

  pub fn task_count(&self) -> usize {
    self.days.values().map(Vec::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.task_count() == 0
  }

  /// Creation timestamp, bumped past every id already stored so two
  /// adds within one millisecond still get distinct ids.
  pub fn next_id(
    &self,
    now_ms: u64
  ) -> u64 {
    let max_existing = self
      .days
      .values()
      .flatten()
      .map(|task| task.id)
      .max();
    match max_existing {
      | Some(max) if max >= now_ms => {
        max.saturating_add(1)
      }
      | _ => now_ms
    }
  }

  /// Appends a new open task. Blank text is ignored and yields `None`.
  pub fn add_task(
    &mut self,
    key: &DayKey,
    text: &str,
    now_ms: u64
  ) -> Option<Task> {
    let text = text.trim();
    if text.is_empty() {
      trace!(day = %key, "ignoring blank task text");
      return None;
    }

    let task = Task::new_pending(
      text.to_string(),
      self.next_id(now_ms)
    );
    self
      .days
      .entry(key.clone())
      .or_default()
      .push(task.clone());
    debug!(day = %key, id = task.id, "task added");
    Some(task)
  }

  /// Flips completion. Returns `false` when nothing matched.
  pub fn toggle_task(
    &mut self,
    key: &DayKey,
    id: u64
  ) -> bool {
    let Some(task) = self
      .days
      .get_mut(key)
      .and_then(|tasks| {
        tasks
          .iter_mut()
          .find(|task| task.id == id)
      })
    else {
      trace!(day = %key, id, "toggle target not found");
      return false;
    };

    task.toggle();
    debug!(
      day = %key,
      id,
      completed = task.completed,
      "task toggled"
    );
    true
  }

  /// Removes a task, dropping the day entirely once it is empty.
  pub fn delete_task(
    &mut self,
    key: &DayKey,
    id: u64
  ) -> Option<Task> {
    let tasks = self.days.get_mut(key)?;
    let idx = tasks
      .iter()
      .position(|task| task.id == id)?;
    let removed = tasks.remove(idx);
    if tasks.is_empty() {
      self.days.remove(key);
    }
    debug!(day = %key, id, "task deleted");
    Some(removed)
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::TaskStore;
  use crate::datetime::{
    DayKey,
    day_key
  };

  fn key(
    y: i32,
    m: u32,
    d: u32
  ) -> DayKey {
    day_key(
      NaiveDate::from_ymd_opt(y, m, d)
        .expect("valid date")
    )
  }

  #[test]
  fn add_then_delete_restores_store() {
    let mut store = TaskStore::new();
    store.add_task(&key(2024, 3, 7), "existing", 10);
    let before = store.clone();

    let task = store
      .add_task(&key(2024, 3, 7), "  Buy milk  ", 20)
      .expect("task added");
    assert_eq!(task.text, "Buy milk");
    assert!(!task.completed);
    assert_ne!(store, before);

    let removed = store
      .delete_task(&key(2024, 3, 7), task.id)
      .expect("task removed");
    assert_eq!(removed, task);
    assert_eq!(store, before);
  }

  #[test]
  fn add_then_delete_on_fresh_day_leaves_no_key() {
    let mut store = TaskStore::new();
    let task = store
      .add_task(&key(2024, 3, 8), "one", 1)
      .expect("task added");
    store.delete_task(&key(2024, 3, 8), task.id);
    assert_eq!(store, TaskStore::new());
    assert_eq!(store.days().count(), 0);
  }

  #[test]
  fn blank_text_is_ignored() {
    let mut store = TaskStore::new();
    assert!(store.add_task(&key(2024, 3, 7), "   ", 1).is_none());
    assert!(store.add_task(&key(2024, 3, 7), "", 1).is_none());
    assert_eq!(store, TaskStore::new());
  }

  #[test]
  fn toggle_twice_is_identity() {
    let mut store = TaskStore::new();
    let day = key(2024, 3, 7);
    let task = store.add_task(&day, "Read", 5).expect("task added");

    assert!(store.toggle_task(&day, task.id));
    assert!(store.tasks_for(&day)[0].completed);
    assert!(store.toggle_task(&day, task.id));
    assert!(!store.tasks_for(&day)[0].completed);
  }

  #[test]
  fn unknown_targets_are_noops() {
    let mut store = TaskStore::new();
    let day = key(2024, 3, 7);
    let task = store.add_task(&day, "Read", 5).expect("task added");
    let before = store.clone();

    assert!(!store.toggle_task(&key(2024, 3, 8), task.id));
    assert!(!store.toggle_task(&day, task.id + 1));
    assert!(store.delete_task(&key(2024, 3, 8), task.id).is_none());
    assert!(store.delete_task(&day, task.id + 1).is_none());
    assert_eq!(store, before);
  }

  #[test]
  fn ids_stay_unique_within_one_millisecond() {
    let mut store = TaskStore::new();
    let a = store.add_task(&key(2024, 3, 7), "a", 100).expect("a");
    let b = store.add_task(&key(2024, 3, 9), "b", 100).expect("b");
    let c = store.add_task(&key(2024, 3, 7), "c", 50).expect("c");
    assert_eq!(a.id, 100);
    assert_eq!(b.id, 101);
    assert_eq!(c.id, 102);
    assert_eq!(store.next_id(500), 500);
  }

  #[test]
  fn keeps_insertion_order_per_day() {
    let mut store = TaskStore::new();
    let day = key(2024, 3, 7);
    for (n, text) in ["first", "second", "third"].iter().enumerate() {
      store.add_task(&day, text, n as u64 + 1);
    }
    let texts: Vec<&str> = store
      .tasks_for(&day)
      .iter()
      .map(|t| t.text.as_str())
      .collect();
    assert_eq!(texts, ["first", "second", "third"]);
    assert!(store.tasks_for(&key(2024, 3, 8)).is_empty());
    assert_eq!(store.task_count(), 3);
  }

  #[test]
  fn serializes_as_day_keyed_object() {
    let mut store = TaskStore::new();
    store.add_task(&key(2024, 3, 7), "Buy milk", 1_709_805_600_000);
    let json = serde_json::to_value(&store).expect("serialize");
    assert_eq!(
      json,
      serde_json::json!({
        "2024-3-7": [
          { "id": 1_709_805_600_000_u64, "text": "Buy milk", "completed": false }
        ]
      })
    );
  }
}

use serde::{Deserialize, Serialize};

/// One to-do entry scoped to a single day.
///
/// `id` is a creation timestamp in milliseconds, kept unique within the
/// whole store (see [`crate::store::TaskStore::next_id`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: u64,

    pub text: String,

    #[serde(default)]
    pub completed: bool,
}

impl Task {
    pub fn new_pending(text: String, id: u64) -> Self {
        Self {
            id,
            text,
            completed: false,
        }
    }

    pub fn toggle(&mut self) {
        self.completed = !self.completed;
    }

    pub fn status_mark(&self) -> &'static str {
        if self.completed { "[x]" } else { "[ ]" }
    }
}

#[cfg(test)]
mod tests {
    use super::Task;

    #[test]
    fn deserializes_browser_shaped_record() {
        let raw = r#"{"id":1709805600000,"text":"Buy milk","completed":true}"#;
        let task: Task = serde_json::from_str(raw).expect("parse task");
        assert_eq!(task.id, 1_709_805_600_000);
        assert_eq!(task.text, "Buy milk");
        assert!(task.completed);
    }

    #[test]
    fn missing_completed_defaults_to_false() {
        let task: Task =
            serde_json::from_str(r#"{"id":3,"text":"Call mom"}"#).expect("parse task");
        assert!(!task.completed);
        assert_eq!(task.status_mark(), "[ ]");
    }
}

//! Task identifiers and lifecycle state

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a submitted task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Current state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum TaskState {
    /// Task is queued and waiting for an execution context
    Pending = 0,
    /// Task is currently being executed
    Running = 1,
    /// Task completed successfully
    Success = 2,
    /// Task failed with an error
    Failure = 3,
}

impl TaskState {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskState::Pending,
            1 => TaskState::Running,
            2 => TaskState::Success,
            _ => TaskState::Failure,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::Running => write!(f, "running"),
            TaskState::Success => write!(f, "success"),
            TaskState::Failure => write!(f, "failure"),
        }
    }
}

/// Shared view of a task's state, written by the executing thread
#[derive(Debug, Clone)]
pub struct TaskStatus {
    state: Arc<AtomicU8>,
}

impl TaskStatus {
    /// Create a status in the pending state
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(TaskState::Pending as u8)),
        }
    }

    /// Current state
    pub fn get(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Mark task as running
    pub fn mark_running(&self) {
        self.state.store(TaskState::Running as u8, Ordering::Release);
    }

    /// Mark task as finished with the given success flag
    pub fn mark_finished(&self, success: bool) {
        let state = if success {
            TaskState::Success
        } else {
            TaskState::Failure
        };
        self.state.store(state as u8, Ordering::Release);
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_ids_are_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
        assert_eq!(TaskId::from("abc").as_str(), "abc");
    }

    #[test]
    fn test_task_state_transitions() {
        let status = TaskStatus::new();
        let observer = status.clone();
        assert_eq!(observer.get(), TaskState::Pending);
        assert!(!observer.get().is_terminal());

        status.mark_running();
        assert_eq!(observer.get(), TaskState::Running);

        status.mark_finished(false);
        assert_eq!(observer.get(), TaskState::Failure);
        assert!(observer.get().is_terminal());
        assert_eq!(observer.get().to_string(), "failure");
    }
}

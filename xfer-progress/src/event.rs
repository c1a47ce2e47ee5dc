use std::time::Instant;

use uuid::Uuid;

/// The four progress-event variants (§3). Every event carries a creation
/// timestamp; per-task-id ordering from a single publisher is preserved
/// by [`crate::Subject::publish`] being serial (never concurrent with
/// itself).
#[derive(Debug, Clone)]
pub enum Event {
    TaskStarted {
        task_id: Uuid,
        description: String,
        total: u64,
        at: Instant,
    },
    ProgressAdvanced {
        task_id: Uuid,
        advance: u64,
        at: Instant,
    },
    TaskFinished {
        task_id: Uuid,
        success: bool,
        at: Instant,
    },
    TaskError {
        task_id: Uuid,
        /// Stable machine-readable error kind (e.g. `"io"`, `"protocol"`,
        /// `"cancelled"`), per §7's "publishes a `TaskError` event with a
        /// stable machine-readable kind plus message".
        kind: &'static str,
        message: String,
        at: Instant,
    },
}

impl Event {
    pub fn task_id(&self) -> Uuid {
        match self {
            Event::TaskStarted { task_id, .. }
            | Event::ProgressAdvanced { task_id, .. }
            | Event::TaskFinished { task_id, .. }
            | Event::TaskError { task_id, .. } => *task_id,
        }
    }

    pub fn task_started(task_id: Uuid, description: impl Into<String>, total: u64) -> Self {
        Event::TaskStarted {
            task_id,
            description: description.into(),
            total,
            at: Instant::now(),
        }
    }

    pub fn progress_advanced(task_id: Uuid, advance: u64) -> Self {
        Event::ProgressAdvanced {
            task_id,
            advance,
            at: Instant::now(),
        }
    }

    pub fn task_finished(task_id: Uuid, success: bool) -> Self {
        Event::TaskFinished {
            task_id,
            success,
            at: Instant::now(),
        }
    }

    pub fn task_error(task_id: Uuid, kind: &'static str, message: impl Into<String>) -> Self {
        Event::TaskError {
            task_id,
            kind,
            message: message.into(),
            at: Instant::now(),
        }
    }
}

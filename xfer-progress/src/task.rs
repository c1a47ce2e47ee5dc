use uuid::Uuid;

/// A Progress Task (§3): created by `TaskStarted`, mutated only by events
/// carrying its task-id, terminated by `TaskFinished`/`TaskError`.
#[derive(Debug, Clone)]
pub struct ProgressTask {
    pub task_id: Uuid,
    pub description: String,
    pub total_bytes: u64,
    pub completed_bytes: u64,
    pub state: TaskState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Finished,
    Errored,
}

impl ProgressTask {
    pub fn new(task_id: Uuid, description: impl Into<String>, total_bytes: u64) -> Self {
        ProgressTask {
            task_id,
            description: description.into(),
            total_bytes,
            completed_bytes: 0,
            state: TaskState::Running,
        }
    }

    /// Advances completion, clamped so `completed_bytes` never exceeds
    /// `total_bytes` regardless of what the publisher reports (§4.G).
    pub fn advance(&mut self, by: u64) {
        self.completed_bytes = (self.completed_bytes + by).min(self.total_bytes);
    }

    pub fn finish(&mut self, success: bool) {
        self.state = if success { TaskState::Finished } else { TaskState::Errored };
    }

    pub fn error(&mut self) {
        self.state = TaskState::Errored;
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.state, TaskState::Running)
    }
}

use std::collections::HashMap;
use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::warn;
use uuid::Uuid;

use crate::event::Event;
use crate::subject::Observer;
use crate::task::{ProgressTask, TaskState};

struct Entry {
    task: ProgressTask,
    bar: ProgressBar,
}

/// Aggregating observer (§4.G): a single instance fans in events from any
/// number of `Subject`s and drives exactly one rendering sink --
/// `indicatif::MultiProgress` -- one bar per active task-id. The task map
/// is guarded by one mutex with short critical sections (map lookup plus
/// a counter update); the `MultiProgress` handle is only ever touched
/// while that mutex is held, so it never outlives the observer.
pub struct RichObserver {
    multi: MultiProgress,
    tasks: Mutex<HashMap<Uuid, Entry>>,
}

impl RichObserver {
    pub fn new() -> Self {
        RichObserver {
            multi: MultiProgress::new(),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Drives an existing `MultiProgress` sink instead of creating one --
    /// useful when the caller wants bars for other components to share
    /// the same terminal area.
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        RichObserver { multi, tasks: Mutex::new(HashMap::new()) }
    }

    fn bar_style(total: u64) -> ProgressStyle {
        if total == 0 {
            ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
        } else {
            ProgressStyle::with_template(
                "{spinner:.green} {msg} [{bar:32.cyan/blue}] {bytes}/{total_bytes} ({binary_bytes_per_sec}, eta {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
        }
    }

    /// Evicts every task in a terminal state (`Finished`/`Errored`) from
    /// both the task map and the rendering sink. Per §9's resolved open
    /// question, this is never called on a timer -- only explicitly, by
    /// the orchestrator at session-worker exit or process shutdown.
    pub fn reap(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        tasks.retain(|_, entry| {
            let terminal = entry.task.is_terminal();
            if terminal {
                self.multi.remove(&entry.bar);
            }
            !terminal
        });
    }

    /// Snapshot of every task currently tracked, terminal or not --
    /// primarily useful for tests and for the exit-code decision (§7: a
    /// non-zero exit code if any session ended `Failed`).
    pub fn snapshot(&self) -> Vec<ProgressTask> {
        self.tasks.lock().unwrap().values().map(|e| e.task.clone()).collect()
    }
}

impl Default for RichObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer for RichObserver {
    fn on_event(&self, event: &Event) {
        let mut tasks = self.tasks.lock().unwrap();
        match event {
            Event::TaskStarted { task_id, description, total, .. } => {
                let bar = self.multi.add(ProgressBar::new(*total));
                bar.set_style(Self::bar_style(*total));
                bar.set_message(description.clone());
                tasks.insert(
                    *task_id,
                    Entry {
                        task: ProgressTask::new(*task_id, description.clone(), *total),
                        bar,
                    },
                );
            },
            Event::ProgressAdvanced { task_id, advance, .. } => {
                let Some(entry) = tasks.get_mut(task_id) else {
                    warn!(%task_id, "progress advanced for unknown task");
                    return;
                };
                entry.task.advance(*advance);
                entry.bar.set_position(entry.task.completed_bytes);
            },
            Event::TaskFinished { task_id, success, .. } => {
                let Some(entry) = tasks.get_mut(task_id) else {
                    warn!(%task_id, "task finished for unknown task");
                    return;
                };
                entry.task.finish(*success);
                if *success {
                    entry.bar.finish_with_message(format!("{} done", entry.task.description));
                } else {
                    entry.bar.abandon_with_message(format!("{} failed", entry.task.description));
                }
            },
            Event::TaskError { task_id, kind, message, .. } => {
                let Some(entry) = tasks.get_mut(task_id) else {
                    warn!(%task_id, "task error for unknown task");
                    return;
                };
                entry.task.error();
                entry.bar.abandon_with_message(format!("{} [{kind}]: {message}", entry.task.description));
            },
        }
    }
}

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::event::Event;
use crate::subject::Observer;

const PRINT_INTERVAL: Duration = Duration::from_millis(200);

/// Fallback renderer used when no rich rendering sink (indicatif) is
/// available: prints one line per event to stdout, rate-limited to one
/// line per task every 200ms -- except terminal events, which always
/// print so a failure or completion is never swallowed by the rate limit.
pub struct SimpleObserver {
    last_printed: Mutex<HashMap<Uuid, Instant>>,
}

impl SimpleObserver {
    pub fn new() -> Self {
        SimpleObserver { last_printed: Mutex::new(HashMap::new()) }
    }

    fn should_print(&self, task_id: Uuid, is_terminal: bool) -> bool {
        if is_terminal {
            return true;
        }
        let mut last = self.last_printed.lock().unwrap();
        let now = Instant::now();
        match last.get(&task_id) {
            Some(prev) if now.duration_since(*prev) < PRINT_INTERVAL => false,
            _ => {
                last.insert(task_id, now);
                true
            },
        }
    }
}

impl Default for SimpleObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer for SimpleObserver {
    fn on_event(&self, event: &Event) {
        match event {
            Event::TaskStarted { task_id, description, total, .. } => {
                if self.should_print(*task_id, false) {
                    println!("[{task_id}] {description}: starting ({total} bytes)");
                }
            },
            Event::ProgressAdvanced { task_id, advance, .. } => {
                if self.should_print(*task_id, false) {
                    println!("[{task_id}] +{advance} bytes");
                }
            },
            Event::TaskFinished { task_id, success, .. } => {
                if *success {
                    println!("[{task_id}] finished");
                } else {
                    println!("[{task_id}] finished with errors");
                }
            },
            Event::TaskError { task_id, kind, message, .. } => {
                println!("[{task_id}] error ({kind}): {message}");
            },
        }
    }
}

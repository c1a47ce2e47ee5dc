//! Progress-event publish/subscribe fabric (§3 Progress Task, §4.F
//! Progress Subject, §4.G Rich/Simple Observer): thread-safe fan-in from
//! many concurrent transfer sessions to one rendering sink.

mod event;
mod rich;
mod simple;
mod subject;
mod task;

pub use event::Event;
pub use rich::RichObserver;
pub use simple::SimpleObserver;
pub use subject::{Observer, Subject};
pub use task::{ProgressTask, TaskState};

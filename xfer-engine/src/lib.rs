//! Transfer Session data model (§3) and Transfer Engine (§4.E): the
//! send/receive state machines that drive the Frame Codec, Stream I/O,
//! Latency Prober (`xfer_transport`) and Buffer Manager (`xfer_buffer`)
//! through one file transfer, publishing progress into an
//! `xfer_progress::Subject` as it goes.

mod cancel;
mod config;
mod error;
mod file_info;
mod receiver;
mod sender;
mod session;

pub use cancel::{CancelToken, CancelTrigger, cancel_pair};
pub use config::TransferConfig;
pub use error::EngineError;
pub use file_info::FileInfo;
pub use receiver::receive_file;
pub use sender::send_file;
pub use session::{Role, TerminalState, TransferSession};

//! Wire framing and stream primitives for the adaptive-transport core:
//! the length-prefixed frame codec (§4.A), exact-byte stream I/O with
//! timeouts and stall detection (§4.B), and the latency prober (§4.C).

mod error;
pub mod frame;
pub mod io;
pub mod latency;

pub use error::TransportError;
pub use frame::{Frame, Kind, MAX_PAYLOAD_LEN, decode_next, encode};
pub use io::StreamIo;
pub use latency::{Prober, probe_rtt, respond_to_ping};

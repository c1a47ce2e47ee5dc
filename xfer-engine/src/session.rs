use std::net::SocketAddr;
use std::time::{Duration, Instant};

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalState {
    Success,
    Failed { reason: String },
    Cancelled,
}

/// One per accepted/dialed connection (§3). Tracks the bookkeeping the
/// engine reports through progress events and exposes at the end of a
/// transfer; it does not itself drive any I/O.
#[derive(Debug, Clone)]
pub struct TransferSession {
    pub session_id: Uuid,
    pub role: Role,
    pub peer_addr: SocketAddr,
    pub start_time: Instant,
    pub bytes_transferred: u64,
    pub current_chunk_size: usize,
    pub last_rtt: Duration,
    pub terminal_state: Option<TerminalState>,
}

impl TransferSession {
    pub fn new(role: Role, peer_addr: SocketAddr) -> Self {
        TransferSession {
            session_id: Uuid::new_v4(),
            role,
            peer_addr,
            start_time: Instant::now(),
            bytes_transferred: 0,
            current_chunk_size: 0,
            last_rtt: Duration::from_millis(50),
            terminal_state: None,
        }
    }

    pub fn record_chunk(&mut self, n: u64, chunk_size: usize) {
        self.bytes_transferred += n;
        self.current_chunk_size = chunk_size;
    }

    pub fn finish(&mut self, state: TerminalState) {
        self.terminal_state = Some(state);
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal_state.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_untermed_with_default_rtt() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let session = TransferSession::new(Role::Sender, addr);
        assert!(!session.is_terminal());
        assert_eq!(session.last_rtt, Duration::from_millis(50));
        assert_eq!(session.bytes_transferred, 0);
    }

    #[test]
    fn record_chunk_accumulates_bytes() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let mut session = TransferSession::new(Role::Receiver, addr);
        session.record_chunk(100, 4096);
        session.record_chunk(50, 4096);
        assert_eq!(session.bytes_transferred, 150);
        assert_eq!(session.current_chunk_size, 4096);
    }
}

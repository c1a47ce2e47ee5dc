use std::net::SocketAddr;
use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::info;
use uuid::Uuid;

use xfer_buffer::BufferManager;
use xfer_progress::{Event, Subject};
use xfer_transport::{Frame, Kind, StreamIo, probe_rtt};

use crate::TransferConfig;
use crate::cancel::CancelToken;
use crate::error::EngineError;
use crate::file_info::FileInfo;
use crate::session::{Role, TerminalState, TransferSession};

/// Drives the sender side of one transfer (§4.E): handshake, negotiate an
/// initial chunk size, stream the file in chunks sized by the Buffer
/// Manager, finalize, and report the outcome through `subject`.
///
/// Always returns the session with its terminal state set, even on
/// failure -- callers that want the error as well should inspect
/// `session.terminal_state` rather than relying solely on `Result::Err`,
/// since a best-effort `ERROR` frame and `TaskError` event are already
/// published before this returns.
pub async fn send_file<S>(
    io: S,
    file_path: &Path,
    config: &TransferConfig,
    subject: &Subject,
    mut cancel: CancelToken,
    peer_addr: SocketAddr,
) -> (TransferSession, Result<(), EngineError>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = StreamIo::with_deadlines(io, config.control_frame_deadline(), config.stall_deadline());
    let mut session = TransferSession::new(Role::Sender, peer_addr);
    let task_id = session.session_id;

    let result = run(&mut stream, file_path, config, subject, &mut cancel, &mut session, task_id).await;

    match &result {
        Ok(()) => {
            session.finish(TerminalState::Success);
            subject.publish(Event::task_finished(task_id, true));
        }
        Err(err @ EngineError::Cancelled) => {
            session.finish(TerminalState::Cancelled);
            let _ = stream.write_frame(Kind::Error, b"cancelled").await;
            subject.publish(Event::task_error(task_id, err.kind(), "cancelled"));
        }
        Err(err) => {
            session.finish(TerminalState::Failed { reason: err.to_string() });
            let _ = stream.write_frame(Kind::Error, err.to_string().as_bytes()).await;
            subject.publish(Event::task_error(task_id, err.kind(), err.to_string()));
        }
    }
    stream.close().await;
    (session, result)
}

async fn run<S>(
    stream: &mut StreamIo<S>,
    file_path: &Path,
    config: &TransferConfig,
    subject: &Subject,
    cancel: &mut CancelToken,
    session: &mut TransferSession,
    task_id: Uuid,
) -> Result<(), EngineError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_frame(Kind::Message, b"HELLO").await?;
    let ready = stream.read_frame().await?;
    expect_message(&ready, "READY")?;

    let rtt = probe_rtt(stream).await;
    session.last_rtt = rtt;

    let mut file = tokio::fs::File::open(file_path)
        .await
        .map_err(|e| EngineError::Io(e.to_string()))?;
    let metadata = file.metadata().await.map_err(|e| EngineError::Io(e.to_string()))?;
    let size = metadata.len();
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs());
    let name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());

    let initial = config
        .initial_buffer_size
        .unwrap_or_else(|| BufferManager::suggest_initial(rtt, config.adaptation_strategy));
    let mut buffer = BufferManager::new(config.buffer_config(initial)).map_err(EngineError::Config)?;
    buffer.set_rtt(rtt);

    subject.publish(Event::task_started(task_id, name.clone(), size));
    info!(name, size, rtt_ms = rtt.as_millis(), "sending file");

    let info = FileInfo::new(name, size, mtime);
    let payload = serde_json::to_vec(&info).map_err(|e| EngineError::Protocol(e.to_string()))?;
    stream.write_frame(Kind::FileInfo, &payload).await?;

    let mut remaining = size;
    while remaining > 0 {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let chunk_size = (buffer.current_size() as u64).min(remaining) as usize;
        let mut chunk = vec![0u8; chunk_size];
        file.read_exact(&mut chunk).await.map_err(|e| EngineError::Io(e.to_string()))?;

        let start = std::time::Instant::now();
        stream.write_frame(Kind::FileData, &chunk).await?;
        let elapsed = start.elapsed();

        buffer.adaptive_adjust(chunk_size, elapsed);
        session.record_chunk(chunk_size as u64, buffer.current_size());
        remaining -= chunk_size as u64;
        subject.publish(Event::progress_advanced(task_id, chunk_size as u64));
    }

    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    stream.write_frame(Kind::FileEnd, &[]).await?;
    let ack = stream.read_frame().await?;
    match ack.kind {
        Kind::Message if ack.payload[..] == b"ACK"[..] => Ok(()),
        Kind::Error => Err(EngineError::Peer(String::from_utf8_lossy(&ack.payload).into_owned())),
        other => Err(EngineError::Protocol(format!("expected ACK, got {other:?}"))),
    }
}

fn expect_message(frame: &Frame, text: &str) -> Result<(), EngineError> {
    match frame.kind {
        Kind::Message if frame.payload[..] == *text.as_bytes() => Ok(()),
        Kind::Error => Err(EngineError::Peer(String::from_utf8_lossy(&frame.payload).into_owned())),
        other => Err(EngineError::Protocol(format!("expected MESSAGE {text:?}, got {other:?}"))),
    }
}

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::info;
use uuid::Uuid;

use xfer_buffer::BufferManager;
use xfer_progress::{Event, Subject};
use xfer_transport::latency::DEFAULT_RTT;
use xfer_transport::{Kind, StreamIo, respond_to_ping};

use crate::TransferConfig;
use crate::cancel::CancelToken;
use crate::error::EngineError;
use crate::file_info::FileInfo;
use crate::session::{Role, TerminalState, TransferSession};

/// Drives the receiver side of one transfer (§4.E): handshake, echo
/// latency probes, accept the incoming `FILE_INFO`/`FILE_DATA*`/`FILE_END`
/// sequence, and write the file under `output_dir`.
///
/// The output file is written under a `.part` suffix for the duration of
/// the transfer. On success it is renamed to its final name; on failure
/// it is left in place with the suffix, per the persisted-state policy.
/// Returns the final (non-`.part`) path on success.
pub async fn receive_file<S>(
    io: S,
    output_dir: &Path,
    config: &TransferConfig,
    subject: &Subject,
    mut cancel: CancelToken,
    peer_addr: SocketAddr,
) -> (TransferSession, Result<PathBuf, EngineError>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = StreamIo::with_deadlines(io, config.control_frame_deadline(), config.stall_deadline());
    let mut session = TransferSession::new(Role::Receiver, peer_addr);
    let task_id = session.session_id;

    let result = run(&mut stream, output_dir, subject, &mut cancel, &mut session, task_id).await;

    match &result {
        Ok(_) => {
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
    output_dir: &Path,
    subject: &Subject,
    cancel: &mut CancelToken,
    session: &mut TransferSession,
    task_id: Uuid,
) -> Result<PathBuf, EngineError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let hello = stream.read_frame().await?;
    match hello.kind {
        Kind::Message if hello.payload[..] == b"HELLO"[..] => {}
        other => return Err(EngineError::Protocol(format!("expected MESSAGE HELLO, got {other:?}"))),
    }
    stream.write_frame(Kind::Message, b"READY").await?;

    // Echo latency probes until the sender moves on to FILE_INFO.
    let info_frame = loop {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let frame = stream.read_frame().await?;
        match frame.kind {
            Kind::Ping => respond_to_ping(stream).await?,
            Kind::FileInfo => break frame,
            Kind::Error => return Err(EngineError::Peer(String::from_utf8_lossy(&frame.payload).into_owned())),
            other => return Err(EngineError::Protocol(format!("expected FILE_INFO, got {other:?}"))),
        }
    };

    let info: FileInfo = serde_json::from_slice(&info_frame.payload).map_err(|e| EngineError::Protocol(e.to_string()))?;
    let final_path = output_dir.join(&info.name);
    let part_path = part_path_for(&final_path);

    let mut file = tokio::fs::File::create(&part_path)
        .await
        .map_err(|e| EngineError::Io(e.to_string()))?;

    subject.publish(Event::task_started(task_id, info.name.clone(), info.size));
    info!(name = info.name.as_str(), size = info.size, "receiving file");

    // The receiver has no independent RTT measurement of its own (only the
    // sender drives the PING/PONG probe), so it seeds its Buffer Manager
    // from the same default RTT the prober falls back to on failure.
    let initial = config
        .initial_buffer_size
        .unwrap_or_else(|| BufferManager::suggest_initial(DEFAULT_RTT, config.adaptation_strategy));
    let mut buffer = BufferManager::new(config.buffer_config(initial)).map_err(EngineError::Config)?;

    let mut written: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let start = Instant::now();
        let frame = stream.read_frame().await?;
        match frame.kind {
            Kind::FileData => {
                let elapsed = start.elapsed();
                file.write_all(&frame.payload)
                    .await
                    .map_err(|e| EngineError::Io(e.to_string()))?;
                written += frame.payload.len() as u64;
                buffer.adaptive_adjust(frame.payload.len(), elapsed);
                session.record_chunk(frame.payload.len() as u64, buffer.current_size());
                subject.publish(Event::progress_advanced(task_id, frame.payload.len() as u64));
            }
            Kind::FileEnd => break,
            Kind::Error => return Err(EngineError::Peer(String::from_utf8_lossy(&frame.payload).into_owned())),
            other => return Err(EngineError::Protocol(format!("expected FILE_DATA or FILE_END, got {other:?}"))),
        }
    }
    file.flush().await.map_err(|e| EngineError::Io(e.to_string()))?;
    drop(file);

    if written != info.size {
        return Err(EngineError::Protocol(format!(
            "size mismatch: FILE_INFO promised {} bytes, received {written}",
            info.size
        )));
    }

    stream.write_frame(Kind::Message, b"ACK").await?;
    tokio::fs::rename(&part_path, &final_path)
        .await
        .map_err(|e| EngineError::Io(e.to_string()))?;
    Ok(final_path)
}

fn part_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".part");
    final_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_path_appends_suffix_to_file_name_only() {
        let path = Path::new("/tmp/out/report.csv");
        assert_eq!(part_path_for(path), PathBuf::from("/tmp/out/report.csv.part"));
    }
}

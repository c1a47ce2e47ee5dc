//! Connection Orchestrator (component H): accepts/dials, runs the
//! handshake via the engine, and spawns one worker per connection.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use xfer_core::drain::DrainWatcher;
use xfer_engine::{TransferConfig, cancel_pair, receive_file, send_file};
use xfer_progress::{RichObserver, Subject};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Accepts connections on `port` until `drain` signals a shutdown, never
/// stopping the loop on a per-accept error -- it is logged and the loop
/// continues, matching the error-taxonomy's "orchestrator never re-throws
/// into the accept loop" policy.
///
/// `reaper` is the concrete Rich Observer attached to `subject`, if any --
/// distinct from `subject` itself (an `Arc<dyn Observer>` collection has no
/// `reap()` to call). Each worker reaps terminal tasks from it once its own
/// transfer reaches a terminal state (§4.G / §9's resolved open question).
pub async fn run_server(
    port: u16,
    recv_dir: PathBuf,
    config: Arc<TransferConfig>,
    subject: Arc<Subject>,
    reaper: Option<Arc<RichObserver>>,
    drain: DrainWatcher,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(addr = %listener.local_addr()?, "listening for incoming transfers");

    let mut workers = JoinSet::new();
    let mut drain_fut = Box::pin(drain.wait_for_drain());
    let release = loop {
        tokio::select! {
            biased;
            release = &mut drain_fut => break release,
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => spawn_receiver(
                        &mut workers,
                        socket,
                        peer,
                        recv_dir.clone(),
                        config.clone(),
                        subject.clone(),
                        reaper.clone(),
                    ),
                    Err(err) => error!(error = %err, "accept failed, continuing"),
                }
            }
        }
    };
    info!("drain signaled, no longer accepting new connections");
    while workers.join_next().await.is_some() {}
    drop(release);
    Ok(())
}

fn spawn_receiver(
    workers: &mut JoinSet<()>,
    socket: TcpStream,
    peer: SocketAddr,
    recv_dir: PathBuf,
    config: Arc<TransferConfig>,
    subject: Arc<Subject>,
    reaper: Option<Arc<RichObserver>>,
) {
    workers.spawn(async move {
        let (_trigger, cancel) = cancel_pair();
        let (_session, result) = receive_file(socket, &recv_dir, &config, &subject, cancel, peer).await;
        if let Err(err) = result {
            warn!(%peer, error = %err, "transfer failed");
        }
        if let Some(reaper) = reaper {
            reaper.reap();
        }
    });
}

/// Dials `host:port`, retrying up to `config.connect_retries` times with a
/// fixed backoff between attempts, then drives the sender side of one
/// transfer for `file_path`.
pub async fn run_client(
    host: &str,
    port: u16,
    file_path: PathBuf,
    config: Arc<TransferConfig>,
    subject: Arc<Subject>,
    reaper: Option<Arc<RichObserver>>,
) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let stream = connect_with_retries(&addr, config.connect_retries).await?;
    let peer = stream.peer_addr()?;
    let (_trigger, cancel) = cancel_pair();
    let (_session, result) = send_file(stream, &file_path, &config, &subject, cancel, peer).await;
    if let Some(reaper) = reaper {
        reaper.reap();
    }
    result.map_err(|err| anyhow::anyhow!(err))
}

async fn connect_with_retries(addr: &str, retries: u32) -> anyhow::Result<TcpStream> {
    let attempts = retries.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(err)) => {
                warn!(attempt, %err, "connect attempt failed");
                last_err = Some(anyhow::anyhow!(err));
            }
            Err(_) => {
                warn!(attempt, "connect attempt timed out after {:?}", CONNECT_TIMEOUT);
                last_err = Some(anyhow::anyhow!("connect to {addr} timed out"));
            }
        }
        if attempt < attempts {
            tokio::time::sleep(RETRY_BACKOFF).await;
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("failed to connect to {addr}")))
}

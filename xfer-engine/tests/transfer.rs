use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use tempfile::tempdir;
use tokio::net::{TcpListener, TcpStream};

use xfer_engine::{TransferConfig, cancel_pair, receive_file, send_file};
use xfer_progress::{Event, Observer, Subject};

struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn new() -> Self {
        Recorder { events: Mutex::new(Vec::new()) }
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl Observer for Recorder {
    fn on_event(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}

async fn loopback_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connect = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
    let (server, _) = listener.accept().await.unwrap();
    let client = connect.await.unwrap();
    (client, server)
}

#[tokio::test]
async fn hello_world_transfers_eleven_bytes_intact() {
    let dir = tempdir().unwrap();
    let src_path = dir.path().join("hello.txt");
    tokio::fs::write(&src_path, b"hello world").await.unwrap();

    let (client, server) = loopback_pair().await;
    let config = TransferConfig::default();
    let sender_subject = Subject::new();
    let receiver_subject = Subject::new();
    let recorder = Arc::new(Recorder::new());
    receiver_subject.attach(recorder.clone());

    let out_dir = dir.path().join("out");
    tokio::fs::create_dir_all(&out_dir).await.unwrap();

    let (_client_token, sender_cancel) = cancel_pair();
    let (_server_token, receiver_cancel) = cancel_pair();

    let recv_task = tokio::spawn({
        let config = config.clone();
        let out_dir = out_dir.clone();
        async move {
            receive_file(
                server,
                &out_dir,
                &config,
                &receiver_subject,
                receiver_cancel,
                "127.0.0.1:0".parse().unwrap(),
            )
            .await
        }
    });

    let (_session, send_result) = send_file(
        client,
        &src_path,
        &config,
        &sender_subject,
        sender_cancel,
        "127.0.0.1:0".parse().unwrap(),
    )
    .await;
    send_result.expect("send should succeed");

    let (_recv_session, recv_result) = recv_task.await.unwrap();
    let final_path = recv_result.expect("receive should succeed");

    let original = std::fs::read(&src_path).unwrap();
    let received = std::fs::read(&final_path).unwrap();
    assert_eq!(original, received);
    assert_eq!(Sha256::digest(&original), Sha256::digest(&received));

    let advances: Vec<u64> = recorder
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::ProgressAdvanced { advance, .. } => Some(advance),
            _ => None,
        })
        .collect();
    assert_eq!(advances, vec![11]);
}

#[tokio::test]
async fn zero_byte_file_produces_no_progress_events() {
    let dir = tempdir().unwrap();
    let src_path = dir.path().join("empty.bin");
    tokio::fs::write(&src_path, b"").await.unwrap();
    let out_dir = dir.path().join("out");
    tokio::fs::create_dir_all(&out_dir).await.unwrap();

    let (client, server) = loopback_pair().await;
    let config = TransferConfig::default();
    let sender_subject = Subject::new();
    let receiver_subject = Subject::new();
    let recorder = Arc::new(Recorder::new());
    receiver_subject.attach(recorder.clone());

    let (_t1, sender_cancel) = cancel_pair();
    let (_t2, receiver_cancel) = cancel_pair();

    let recv_task = tokio::spawn({
        let config = config.clone();
        let out_dir = out_dir.clone();
        async move {
            receive_file(
                server,
                &out_dir,
                &config,
                &receiver_subject,
                receiver_cancel,
                "127.0.0.1:0".parse().unwrap(),
            )
            .await
        }
    });

    let (_session, send_result) = send_file(
        client,
        &src_path,
        &config,
        &sender_subject,
        sender_cancel,
        "127.0.0.1:0".parse().unwrap(),
    )
    .await;
    send_result.expect("send should succeed");

    let (_recv_session, recv_result) = recv_task.await.unwrap();
    let final_path = recv_result.expect("receive should succeed");
    assert_eq!(std::fs::read(&final_path).unwrap(), Vec::<u8>::new());

    let has_progress = recorder
        .events()
        .iter()
        .any(|e| matches!(e, Event::ProgressAdvanced { .. }));
    assert!(!has_progress);
    let finished = recorder
        .events()
        .iter()
        .any(|e| matches!(e, Event::TaskFinished { success: true, .. }));
    assert!(finished);
}

#[tokio::test]
async fn file_exactly_max_buffer_size_sends_as_a_single_chunk() {
    let dir = tempdir().unwrap();
    let max_buffer_size = 64 * 1024usize;
    let src_path = dir.path().join("exact.bin");
    tokio::fs::write(&src_path, vec![3u8; max_buffer_size]).await.unwrap();
    let out_dir = dir.path().join("out");
    tokio::fs::create_dir_all(&out_dir).await.unwrap();

    let (client, server) = loopback_pair().await;
    let config = TransferConfig {
        initial_buffer_size: Some(max_buffer_size),
        max_buffer_size,
        ..TransferConfig::default()
    };
    let sender_subject = Subject::new();
    let receiver_subject = Subject::new();
    let recorder = Arc::new(Recorder::new());
    receiver_subject.attach(recorder.clone());

    let (_t1, sender_cancel) = cancel_pair();
    let (_t2, receiver_cancel) = cancel_pair();

    let recv_task = tokio::spawn({
        let config = config.clone();
        let out_dir = out_dir.clone();
        async move {
            receive_file(
                server,
                &out_dir,
                &config,
                &receiver_subject,
                receiver_cancel,
                "127.0.0.1:0".parse().unwrap(),
            )
            .await
        }
    });

    let (_session, send_result) = send_file(
        client,
        &src_path,
        &config,
        &sender_subject,
        sender_cancel,
        "127.0.0.1:0".parse().unwrap(),
    )
    .await;
    send_result.expect("send should succeed");

    let (_recv_session, recv_result) = recv_task.await.unwrap();
    let final_path = recv_result.expect("receive should succeed");
    assert_eq!(tokio::fs::metadata(&final_path).await.unwrap().len(), max_buffer_size as u64);

    let advances: Vec<u64> = recorder
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::ProgressAdvanced { advance, .. } => Some(advance),
            _ => None,
        })
        .collect();
    assert_eq!(advances, vec![max_buffer_size as u64]);
}

#[tokio::test]
async fn concurrent_transfers_share_one_observer_without_cross_contamination() {
    let dir = tempdir().unwrap();
    let out_dir = dir.path().join("out");
    tokio::fs::create_dir_all(&out_dir).await.unwrap();
    let recorder = Arc::new(Recorder::new());

    let mut handles = Vec::new();
    for i in 0..2 {
        let src_path = dir.path().join(format!("payload-{i}.bin"));
        let payload = vec![(i + 1) as u8; 1024 * 1024];
        tokio::fs::write(&src_path, &payload).await.unwrap();

        let (client, server) = loopback_pair().await;
        let config = TransferConfig::default();
        let sender_subject = Subject::new();
        let receiver_subject = Subject::new();
        receiver_subject.attach(recorder.clone());
        let (_t1, sender_cancel) = cancel_pair();
        let (_t2, receiver_cancel) = cancel_pair();
        let out_dir = out_dir.clone();

        let recv_task = tokio::spawn(async move {
            receive_file(
                server,
                &out_dir,
                &config,
                &receiver_subject,
                receiver_cancel,
                "127.0.0.1:0".parse().unwrap(),
            )
            .await
        });
        let send_task = tokio::spawn(async move {
            send_file(
                client,
                &src_path,
                &config,
                &sender_subject,
                sender_cancel,
                "127.0.0.1:0".parse().unwrap(),
            )
            .await
        });
        handles.push((send_task, recv_task));
    }

    for (send_task, recv_task) in handles {
        let (_s, send_result) = send_task.await.unwrap();
        send_result.unwrap();
        let (_r, recv_result) = recv_task.await.unwrap();
        recv_result.unwrap();
    }

    let finished = recorder
        .events()
        .iter()
        .filter(|e| matches!(e, Event::TaskFinished { success: true, .. }))
        .count();
    assert_eq!(finished, 2);
}

struct CancelAtHalf {
    trigger: xfer_engine::CancelTrigger,
    total: u64,
    seen: Mutex<u64>,
}

impl Observer for CancelAtHalf {
    fn on_event(&self, event: &Event) {
        if let Event::ProgressAdvanced { advance, .. } = event {
            let mut seen = self.seen.lock().unwrap();
            *seen += advance;
            if *seen >= self.total / 2 {
                self.trigger.cancel();
            }
        }
    }
}

#[tokio::test]
async fn cancelling_mid_transfer_leaves_a_part_file_no_larger_than_total() {
    let dir = tempdir().unwrap();
    let src_path = dir.path().join("big.bin");
    let total = 2 * 1024 * 1024u64;
    tokio::fs::write(&src_path, vec![7u8; total as usize]).await.unwrap();
    let out_dir = dir.path().join("out");
    tokio::fs::create_dir_all(&out_dir).await.unwrap();

    let (client, server) = loopback_pair().await;
    let config = TransferConfig {
        max_buffer_size: 32 * 1024,
        ..TransferConfig::default()
    };
    let sender_subject = Subject::new();
    let receiver_subject = Subject::new();

    let (sender_trigger, sender_cancel) = cancel_pair();
    let (_t2, receiver_cancel) = cancel_pair();

    sender_subject.attach(Arc::new(CancelAtHalf {
        trigger: sender_trigger,
        total,
        seen: Mutex::new(0),
    }));

    let recv_task = tokio::spawn({
        let config = config.clone();
        let out_dir = out_dir.clone();
        async move {
            receive_file(
                server,
                &out_dir,
                &config,
                &receiver_subject,
                receiver_cancel,
                "127.0.0.1:0".parse().unwrap(),
            )
            .await
        }
    });

    let (_session, send_result) = send_file(
        client,
        &src_path,
        &config,
        &sender_subject,
        sender_cancel,
        "127.0.0.1:0".parse().unwrap(),
    )
    .await;
    assert!(send_result.is_err());

    let (_recv_session, recv_result) = recv_task.await.unwrap();
    assert!(recv_result.is_err());

    let part_path = out_dir.join("big.bin.part");
    let metadata = tokio::fs::metadata(&part_path).await.unwrap();
    assert!(metadata.len() <= total);
}

#[tokio::test]
async fn oversize_header_is_rejected_without_allocating_a_payload() {
    let dir = tempdir().unwrap();
    let out_dir = dir.path().join("out");
    tokio::fs::create_dir_all(&out_dir).await.unwrap();

    let (mut attacker, server) = tokio::io::duplex(64);
    let config = TransferConfig::default();
    let receiver_subject = Subject::new();
    let (_t, receiver_cancel) = cancel_pair();

    let recv_task = tokio::spawn(async move {
        receive_file(
            server,
            &out_dir,
            &config,
            &receiver_subject,
            receiver_cancel,
            "127.0.0.1:0".parse().unwrap(),
        )
        .await
    });

    // MESSAGE(0x01) with an attacker-controlled length near u32::MAX/2.
    use tokio::io::AsyncWriteExt;
    let mut header = vec![0x01u8];
    header.extend_from_slice(&(1u32 << 31).to_be_bytes());
    attacker.write_all(&header).await.unwrap();
    drop(attacker);

    let (_session, result) = recv_task.await.unwrap();
    assert!(result.is_err());
}

#[tokio::test]
async fn peer_drop_after_file_info_before_any_file_data_fails_with_io_error() {
    let dir = tempdir().unwrap();
    let out_dir = dir.path().join("out");
    tokio::fs::create_dir_all(&out_dir).await.unwrap();

    let (mut attacker, server) = tokio::io::duplex(4096);
    let config = TransferConfig::default();
    let receiver_subject = Subject::new();
    let (_t, receiver_cancel) = cancel_pair();

    let recv_task = tokio::spawn(async move {
        receive_file(
            server,
            &out_dir,
            &config,
            &receiver_subject,
            receiver_cancel,
            "127.0.0.1:0".parse().unwrap(),
        )
        .await
    });

    use tokio::io::AsyncWriteExt;
    let hello = xfer_transport::encode(xfer_transport::Kind::Message, b"HELLO").unwrap();
    attacker.write_all(&hello).await.unwrap();

    // Read and discard the READY reply so the receiver is past the handshake.
    let mut discard = [0u8; 64];
    use tokio::io::AsyncReadExt;
    let _ = attacker.read(&mut discard).await;

    let info = xfer_engine::FileInfo::new("ghost.bin", 10, None);
    let payload = serde_json::to_vec(&info).unwrap();
    let frame = xfer_transport::encode(xfer_transport::Kind::FileInfo, &payload).unwrap();
    attacker.write_all(&frame).await.unwrap();
    drop(attacker);

    let (_session, result) = recv_task.await.unwrap();
    assert!(result.is_err());
}

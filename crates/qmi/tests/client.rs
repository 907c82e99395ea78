//! End-to-end client behavior against a scripted modem.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use qmi::services::wds;
use qmi::{DeviceOpener, Event, Qmi};

static TRACING_INIT: AtomicBool = AtomicBool::new(false);

fn init_tracing() {
    if TRACING_INIT
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }
}

struct QueueOpener {
    streams: VecDeque<DuplexStream>,
}

impl DeviceOpener for QueueOpener {
    type Stream = DuplexStream;

    async fn open(&mut self) -> io::Result<DuplexStream> {
        match self.streams.pop_front() {
            Some(s) => Ok(s),
            None => std::future::pending().await,
        }
    }
}

async fn connect(host: DuplexStream) -> Qmi {
    init_tracing();
    Qmi::builder()
        .name("test")
        .open_with(QueueOpener {
            streams: [host].into(),
        })
        .await
        .unwrap()
}

struct Request {
    service: u8,
    client: u8,
    tid: u16,
    message_id: u16,
    tlvs: Vec<u8>,
}

async fn read_request(dev: &mut DuplexStream) -> Request {
    let mut head = [0u8; 3];
    dev.read_exact(&mut head).await.unwrap();
    assert_eq!(head[0], 0x01);
    let length = u16::from_le_bytes([head[1], head[2]]) as usize;
    let mut rest = vec![0u8; length - 2];
    dev.read_exact(&mut rest).await.unwrap();
    let service = rest[1];
    let client = rest[2];
    let (tid, body) = if service == 0 {
        (rest[4] as u16, &rest[5..])
    } else {
        (u16::from_le_bytes([rest[4], rest[5]]), &rest[6..])
    };
    Request {
        service,
        client,
        tid,
        message_id: u16::from_le_bytes([body[0], body[1]]),
        tlvs: body[4..].to_vec(),
    }
}

async fn respond(dev: &mut DuplexStream, req: &Request, extra_tlvs: &[u8]) {
    let mut tlvs = vec![0x02, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00];
    tlvs.extend_from_slice(extra_tlvs);

    let mut frame = vec![0x01, 0, 0, 0x80, req.service, req.client];
    if req.service == 0 {
        frame.push(0x01);
        frame.push(req.tid as u8);
    } else {
        frame.push(0x02);
        frame.extend_from_slice(&req.tid.to_le_bytes());
    }
    frame.extend_from_slice(&req.message_id.to_le_bytes());
    frame.extend_from_slice(&(tlvs.len() as u16).to_le_bytes());
    frame.extend_from_slice(&tlvs);
    let length = (frame.len() - 1) as u16;
    frame[1..3].copy_from_slice(&length.to_le_bytes());
    dev.write_all(&frame).await.unwrap();
}

#[tokio::test]
async fn bootstrap_allocates_a_client_id_once() {
    let (host, mut modem) = tokio::io::duplex(4096);
    let qmi = connect(host).await;

    let modem_task = tokio::spawn(async move {
        // First WDS call triggers the control-service bootstrap.
        let alloc = read_request(&mut modem).await;
        assert_eq!(alloc.service, 0x00);
        assert_eq!(alloc.client, 0x00);
        assert_eq!(alloc.message_id, 0x0022);
        assert_eq!(alloc.tlvs, vec![0x01, 0x01, 0x00, 0x01]); // wants WDS
        respond(&mut modem, &alloc, &[0x01, 0x02, 0x00, 0x01, 0x0F]).await;

        let first = read_request(&mut modem).await;
        assert_eq!(first.service, 0x01);
        assert_eq!(first.client, 0x0F, "allocated id addresses the service");
        respond(&mut modem, &first, &[0x01, 0x01, 0x00, 0x02]).await;

        // Second call reuses the cached id; no second allocation shows up.
        let second = read_request(&mut modem).await;
        assert_eq!(second.service, 0x01);
        assert_eq!(second.client, 0x0F);
        respond(&mut modem, &second, &[0x01, 0x01, 0x00, 0x01]).await;
    });

    let status = qmi.call(wds::GetPacketServiceStatus).await.unwrap();
    assert_eq!(status, wds::ConnectionStatus::Connected);
    let status = qmi.call(wds::GetPacketServiceStatus).await.unwrap();
    assert_eq!(status, wds::ConnectionStatus::Disconnected);
    modem_task.await.unwrap();
}

#[tokio::test]
async fn release_clients_hands_ids_back() {
    let (host, mut modem) = tokio::io::duplex(4096);
    let qmi = connect(host).await;

    let modem_task = tokio::spawn(async move {
        let alloc = read_request(&mut modem).await;
        respond(&mut modem, &alloc, &[0x01, 0x02, 0x00, 0x01, 0x0F]).await;
        let call = read_request(&mut modem).await;
        respond(&mut modem, &call, &[0x01, 0x01, 0x00, 0x02]).await;

        let release = read_request(&mut modem).await;
        assert_eq!(release.service, 0x00);
        assert_eq!(release.message_id, 0x0023);
        assert_eq!(release.tlvs, vec![0x01, 0x02, 0x00, 0x01, 0x0F]);
        respond(&mut modem, &release, &[]).await;
    });

    qmi.call(wds::GetPacketServiceStatus).await.unwrap();
    qmi.release_clients().await.unwrap();
    modem_task.await.unwrap();
}

#[tokio::test]
async fn indications_surface_as_parsed_events() {
    init_tracing();
    let (host, mut modem) = tokio::io::duplex(4096);
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let qmi = Qmi::builder()
        .name("test")
        .on_event(move |event| {
            tx.send(event).unwrap();
        })
        .open_with(QueueOpener {
            streams: [host].into(),
        })
        .await
        .unwrap();

    // WDS packet-service status indication: connected, no reconfigure.
    let tlvs = [0x01, 0x02, 0x00, 0x02, 0x00];
    let mut frame = vec![0x01, 0, 0, 0x80, 0x01, 0x0F, 0x04, 0x00, 0x00];
    frame.extend_from_slice(&0x0022u16.to_le_bytes());
    frame.extend_from_slice(&(tlvs.len() as u16).to_le_bytes());
    frame.extend_from_slice(&tlvs);
    let length = (frame.len() - 1) as u16;
    frame[1..3].copy_from_slice(&length.to_le_bytes());
    modem.write_all(&frame).await.unwrap();

    let event = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    match event {
        Event::PacketServiceStatus(status) => {
            assert_eq!(status.status, wds::ConnectionStatus::Connected);
            assert!(!status.reconfiguration_required);
            assert_eq!(status.call_end_reason, None);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    drop(qmi);
}

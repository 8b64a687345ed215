use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

use wavechat::error::{ChatError, SendRejection};
use wavechat::playback::AudioOutput;
use wavechat::{
    ChannelState, Command, EntryContent, Origin, SessionConfig, SessionHandle, SessionUpdate,
    TranscriptEntry,
};

const STEP: Duration = Duration::from_secs(5);

struct MockServer {
    listener: TcpListener,
    uris: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    async fn bind() -> Self {
        Self {
            listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
            uris: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn addr(&self) -> SocketAddr {
        self.listener.local_addr().unwrap()
    }

    async fn accept(&self) -> WebSocketStream<TcpStream> {
        let (stream, _) = self.listener.accept().await.unwrap();
        let uris = self.uris.clone();
        accept_hdr_async(stream, move |req: &Request, resp: Response| {
            uris.lock().unwrap().push(req.uri().to_string());
            Ok(resp)
        })
        .await
        .unwrap()
    }
}

fn config(addr: SocketAddr, quiet_ms: u64) -> SessionConfig {
    SessionConfig {
        url: format!("ws://{}/ws", addr),
        quiet_period: Duration::from_millis(quiet_ms),
        output: AudioOutput::Null,
        ..SessionConfig::default()
    }
}

fn wav_chunk(samples: usize) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 24_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..samples {
            writer.write_sample((i % 100) as i16 * 100).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Read updates until one matches.
async fn wait_for<F>(session: &mut SessionHandle, what: &str, mut pred: F) -> SessionUpdate
where
    F: FnMut(&SessionUpdate) -> bool,
{
    tokio::time::timeout(STEP, async {
        loop {
            match session.recv().await {
                Some(update) if pred(&update) => return update,
                Some(_) => continue,
                None => panic!("session ended while waiting for {}", what),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {}", what))
}

async fn wait_for_entry(session: &mut SessionHandle, what: &str) -> TranscriptEntry {
    match wait_for(session, what, |u| matches!(u, SessionUpdate::EntryAppended(_))).await {
        SessionUpdate::EntryAppended(entry) => entry,
        _ => unreachable!(),
    }
}

/// Every update that arrives within `window`.
async fn updates_within(session: &mut SessionHandle, window: Duration) -> Vec<SessionUpdate> {
    let mut seen = Vec::new();
    let _ = tokio::time::timeout(window, async {
        while let Some(update) = session.recv().await {
            seen.push(update);
        }
    })
    .await;
    seen
}

fn audio_len(entry: &TranscriptEntry) -> Option<usize> {
    match &entry.content {
        EntryContent::Audio(audio) => Some(audio.len()),
        EntryContent::Text(_) => None,
    }
}

#[tokio::test]
async fn test_text_and_audio_turn() {
    let server = MockServer::bind().await;
    let (_token_tx, token_rx) = watch::channel(Some("abc".to_string()));
    let mut session = wavechat::spawn(config(server.addr(), 150), token_rx);

    let mut ws = server.accept().await;
    assert!(server.uris.lock().unwrap()[0].contains("token=abc"));
    wait_for(&mut session, "open", |u| matches!(u, SessionUpdate::Status(ChannelState::Open))).await;

    ws.send(Message::Text("hello".into())).await.unwrap();
    let entry = wait_for_entry(&mut session, "text entry").await;
    assert_eq!(entry.origin, Origin::Remote);
    assert_eq!(entry.content, EntryContent::Text("hello".to_string()));

    for _ in 0..3 {
        ws.send(Message::Binary(wav_chunk(100).into())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
    let entry = wait_for_entry(&mut session, "audio entry").await;
    assert_eq!(entry.origin, Origin::Remote);
    assert_eq!(audio_len(&entry), Some(300));

    assert!(session.send(Command::SendText("thanks".to_string())));
    let entry = wait_for_entry(&mut session, "local entry").await;
    assert_eq!(entry.origin, Origin::Local);
    wait_for(&mut session, "awaiting", |u| matches!(u, SessionUpdate::AwaitingReply(true))).await;

    let received = tokio::time::timeout(STEP, ws.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(received, Message::Text("thanks".into()));

    ws.send(Message::Text("bye".into())).await.unwrap();
    wait_for(&mut session, "reply", |u| matches!(u, SessionUpdate::AwaitingReply(false))).await;

    session.shutdown().await;
}

#[tokio::test]
async fn test_send_commits_pending_audio_first() {
    let server = MockServer::bind().await;
    let (_token_tx, token_rx) = watch::channel(Some("abc".to_string()));
    // long enough that the turn never closes on its own during the test
    let mut session = wavechat::spawn(config(server.addr(), 10_000), token_rx);

    let mut ws = server.accept().await;
    wait_for(&mut session, "open", |u| matches!(u, SessionUpdate::Status(ChannelState::Open))).await;

    ws.send(Message::Binary(wav_chunk(50).into())).await.unwrap();
    ws.send(Message::Binary(b"not audio".to_vec().into())).await.unwrap();
    ws.send(Message::Binary(wav_chunk(50).into())).await.unwrap();
    ws.send(Message::Text("marker".into())).await.unwrap();
    let marker = wait_for_entry(&mut session, "marker").await;
    assert_eq!(marker.content, EntryContent::Text("marker".to_string()));

    assert!(session.send(Command::SendText("interrupting".to_string())));
    let audio = wait_for_entry(&mut session, "flushed audio").await;
    assert_eq!(audio_len(&audio), Some(100));
    let local = wait_for_entry(&mut session, "local text").await;
    assert_eq!(local.origin, Origin::Local);
    assert!(audio.order < local.order);

    session.shutdown().await;
}

#[tokio::test]
async fn test_server_close_and_reconnect() {
    let server = MockServer::bind().await;
    let (_token_tx, token_rx) = watch::channel(Some("abc".to_string()));
    let mut session = wavechat::spawn(config(server.addr(), 100), token_rx);

    let mut ws = server.accept().await;
    wait_for(&mut session, "open", |u| matches!(u, SessionUpdate::Status(ChannelState::Open))).await;

    ws.close(None).await.unwrap();
    wait_for(&mut session, "closed", |u| matches!(u, SessionUpdate::Status(ChannelState::Closed))).await;

    assert!(session.send(Command::SendText("anyone?".to_string())));
    wait_for(&mut session, "rejection", |u| {
        matches!(
            u,
            SessionUpdate::Notice(ChatError::SendRejected(SendRejection::NotConnected))
        )
    })
    .await;

    assert!(session.send(Command::Reconnect));
    let _ws2 = server.accept().await;
    wait_for(&mut session, "reopen", |u| matches!(u, SessionUpdate::Status(ChannelState::Open))).await;
    assert_eq!(server.uris.lock().unwrap().len(), 2);

    session.shutdown().await;
}

#[tokio::test]
async fn test_token_lifecycle() {
    let server = MockServer::bind().await;
    let (token_tx, token_rx) = watch::channel(None);
    let mut session = wavechat::spawn(config(server.addr(), 100), token_rx);

    wait_for(&mut session, "sign in", |u| matches!(u, SessionUpdate::SignInRequired)).await;

    token_tx.send(Some("fresh".to_string())).unwrap();
    let _ws = server.accept().await;
    assert!(server.uris.lock().unwrap()[0].contains("token=fresh"));
    wait_for(&mut session, "open", |u| matches!(u, SessionUpdate::Status(ChannelState::Open))).await;

    token_tx.send(None).unwrap();
    wait_for(&mut session, "auth notice", |u| {
        matches!(u, SessionUpdate::Notice(ChatError::AuthUnavailable))
    })
    .await;
    wait_for(&mut session, "sign in again", |u| matches!(u, SessionUpdate::SignInRequired)).await;

    session.shutdown().await;
}

#[tokio::test]
async fn test_connect_failure_is_not_fatal() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let (_token_tx, token_rx) = watch::channel(Some("abc".to_string()));
    let mut session = wavechat::spawn(config(addr, 100), token_rx);

    wait_for(&mut session, "connect failure", |u| {
        matches!(u, SessionUpdate::Notice(ChatError::ConnectFailure(_)))
    })
    .await;

    // still responsive
    assert!(session.send(Command::SetAudioEnabled(false)));
    wait_for(&mut session, "audio toggle", |u| matches!(u, SessionUpdate::AudioEnabled(false))).await;

    session.shutdown().await;
}

#[tokio::test]
async fn test_audio_disabled_drops_chunks_before_decoding() {
    let server = MockServer::bind().await;
    let (_token_tx, token_rx) = watch::channel(Some("abc".to_string()));
    let mut session = wavechat::spawn(config(server.addr(), 100), token_rx);

    let mut ws = server.accept().await;
    wait_for(&mut session, "open", |u| matches!(u, SessionUpdate::Status(ChannelState::Open))).await;

    assert!(session.send(Command::SetAudioEnabled(false)));
    wait_for(&mut session, "audio off", |u| matches!(u, SessionUpdate::AudioEnabled(false))).await;

    assert!(session.send(Command::SendText("talk to me".to_string())));
    wait_for(&mut session, "awaiting", |u| matches!(u, SessionUpdate::AwaitingReply(true))).await;
    let received = tokio::time::timeout(STEP, ws.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(received, Message::Text("talk to me".into()));

    for _ in 0..3 {
        ws.send(Message::Binary(wav_chunk(100).into())).await.unwrap();
    }
    // the reply still counts as an answer even though it is not decoded
    wait_for(&mut session, "reply", |u| matches!(u, SessionUpdate::AwaitingReply(false))).await;

    ws.send(Message::Text("marker".into())).await.unwrap();
    let marker = wait_for_entry(&mut session, "marker").await;
    assert_eq!(marker.content, EntryContent::Text("marker".to_string()));

    // several quiet periods pass without any audio turn being committed
    let later = updates_within(&mut session, Duration::from_millis(400)).await;
    assert!(!later
        .iter()
        .any(|u| matches!(u, SessionUpdate::EntryAppended(_))));

    session.shutdown().await;
}

#[tokio::test]
async fn test_token_refresh_keeps_open_channel() {
    let server = MockServer::bind().await;
    let (token_tx, token_rx) = watch::channel(Some("abc".to_string()));
    let mut session = wavechat::spawn(config(server.addr(), 100), token_rx);

    let mut ws = server.accept().await;
    wait_for(&mut session, "open", |u| matches!(u, SessionUpdate::Status(ChannelState::Open))).await;

    token_tx.send(Some("def".to_string())).unwrap();
    ws.send(Message::Text("still here".into())).await.unwrap();

    let seen = updates_within(&mut session, Duration::from_millis(400)).await;
    assert!(seen.iter().any(|u| matches!(
        u,
        SessionUpdate::EntryAppended(entry) if entry.content == EntryContent::Text("still here".to_string())
    )));
    assert!(!seen.iter().any(|u| matches!(u, SessionUpdate::Status(_))));
    assert_eq!(server.uris.lock().unwrap().len(), 1);

    // the refreshed token is used by the next connect
    ws.close(None).await.unwrap();
    wait_for(&mut session, "closed", |u| matches!(u, SessionUpdate::Status(ChannelState::Closed))).await;
    assert!(session.send(Command::Reconnect));
    let _ws2 = server.accept().await;
    assert!(server.uris.lock().unwrap()[1].contains("token=def"));
    wait_for(&mut session, "reopen", |u| matches!(u, SessionUpdate::Status(ChannelState::Open))).await;

    session.shutdown().await;
}

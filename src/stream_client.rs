//! # Streaming Protocol Client
//!
//! Reconnecting client for line-oriented telnet-style feeds with an
//! interactive login step. One instance per endpoint; the feed-specific work
//! is delegated to a [`LineParser`] and the transport to a [`Connector`].
//!
//! ## State machine
//!
//! - `Disconnected` → `Connecting` on [`StreamClient::connect`]
//! - `Connecting` → `AwaitingLogin` once the transport is up
//! - `AwaitingLogin` → `Streaming` after a login prompt is answered with the
//!   configured identifier; a keepalive blank line is then sent every 5 minutes
//! - any transport error or close → `Disconnected`, then exactly one reconnect
//!   after a fixed delay
//!
//! Each connection cycle runs inside a single driver task. The keepalive
//! timer, the partial-line buffer and the pending reconnect sleep all live in
//! that task, so aborting it (on `connect` or `disconnect`) tears all of them
//! down at once and never leaves a second timer behind.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::metrics;

pub const CLUSTER_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const SKIMMER_RECONNECT_DELAY: Duration = Duration::from_secs(10);
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(300);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

const READ_CHUNK: usize = 4096;
// A line that never terminates is noise; drop it instead of growing forever.
const MAX_PENDING_BYTES: usize = 16 * 1024;

const LOGIN_PROMPTS: &[&str] = &["login:", "call:", "callsign:", "your call", "password:"];

/// Turns one complete line into a feed-specific record, or drops it.
pub trait LineParser: Send + Sync + 'static {
    type Record: Send + fmt::Debug + 'static;

    fn parse_line(&self, line: &str) -> Option<Self::Record>;
}

/// Opens the byte stream for an endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn connect(&self, endpoint: &Endpoint) -> std::io::Result<Self::Stream>;
}

/// Plain TCP transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, endpoint: &Endpoint) -> std::io::Result<TcpStream> {
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingLogin,
    Streaming,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::AwaitingLogin => "awaiting-login",
            ConnectionState::Streaming => "streaming",
        };
        f.write_str(s)
    }
}

/// Connectivity report for observers.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStatus {
    pub feed: String,
    pub endpoint: String,
    pub state: ConnectionState,
    pub connected: bool,
    pub logged_in: bool,
    pub detail: Option<String>,
}

#[derive(Debug)]
pub enum StreamEvent<R> {
    Status(ConnectionStatus),
    Record(R),
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("event receiver dropped")]
    Closed,
}

/// Per-feed client settings.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Short feed name used in logs, metrics and status events.
    pub name: String,
    pub login: Option<String>,
    pub reconnect_delay: Duration,
    pub keepalive_interval: Duration,
    pub connect_timeout: Duration,
}

impl StreamConfig {
    pub fn new(name: impl Into<String>, login: Option<String>, reconnect_delay: Duration) -> Self {
        Self {
            name: name.into(),
            login,
            reconnect_delay,
            keepalive_interval: KEEPALIVE_INTERVAL,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    pub fn cluster(login: Option<String>) -> Self {
        Self::new("cluster", login, CLUSTER_RECONNECT_DELAY)
    }

    pub fn skimmer(login: Option<String>) -> Self {
        Self::new("skimmer", login, SKIMMER_RECONNECT_DELAY)
    }

    fn login_id(&self) -> Option<&str> {
        self.login.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Byte offset just past a login prompt in `buf`, if one is present.
///
/// Keyword prompts are matched case-insensitively anywhere and take the rest
/// of their line with them. A bare trailing `>` only counts on the
/// unterminated tail, so banner lines such as `<v4.0>` are not prompts.
pub fn login_prompt_end(buf: &[u8]) -> Option<usize> {
    let lower = buf.to_ascii_lowercase();
    let keyword_end = LOGIN_PROMPTS
        .iter()
        .filter_map(|p| find_bytes(&lower, p.as_bytes()).map(|at| at + p.len()))
        .min();
    if let Some(end) = keyword_end {
        return Some(match buf[end..].iter().position(|&b| b == b'\n') {
            Some(nl) => end + nl + 1,
            None => buf.len(),
        });
    }

    let tail_start = buf.iter().rposition(|&b| b == b'\n').map_or(0, |nl| nl + 1);
    let tail = String::from_utf8_lossy(&buf[tail_start..]);
    tail.trim_end().ends_with('>').then_some(buf.len())
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub struct StreamClient<P: LineParser, C: Connector> {
    config: StreamConfig,
    parser: Arc<P>,
    connector: Arc<C>,
    events: mpsc::Sender<StreamEvent<P::Record>>,
    state: Arc<watch::Sender<ConnectionState>>,
    endpoint: Option<Endpoint>,
    driver: Option<JoinHandle<()>>,
}

impl<P: LineParser, C: Connector> StreamClient<P, C> {
    pub fn new(
        config: StreamConfig,
        parser: P,
        connector: C,
        events: mpsc::Sender<StreamEvent<P::Record>>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            parser: Arc::new(parser),
            connector: Arc::new(connector),
            events,
            state: Arc::new(state),
            endpoint: None,
            driver: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// New login identifier; used from the next `connect`.
    pub fn set_login(&mut self, login: Option<String>) {
        self.config.login = login;
    }

    pub fn is_running(&self) -> bool {
        self.driver.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Starts a fresh connection cycle, cancelling any running session and
    /// any pending reconnect.
    pub fn connect(&mut self, endpoint: Endpoint) {
        self.abort_driver();
        let driver = Driver {
            config: self.config.clone(),
            parser: self.parser.clone(),
            connector: self.connector.clone(),
            events: self.events.clone(),
            state: self.state.clone(),
            endpoint: endpoint.clone(),
        };
        self.endpoint = Some(endpoint);
        self.driver = Some(tokio::spawn(driver.run()));
    }

    /// Stops the client without reconnecting. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        let was_running = self.abort_driver();
        let previous = self.state.send_replace(ConnectionState::Disconnected);
        if !was_running && previous == ConnectionState::Disconnected {
            return;
        }
        metrics::set_stream_connected(&self.config.name, false);
        info!("🔌 [{}] Disconnected by request", self.config.name);
        let status = ConnectionStatus {
            feed: self.config.name.clone(),
            endpoint: self
                .endpoint
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            state: ConnectionState::Disconnected,
            connected: false,
            logged_in: false,
            detail: None,
        };
        if self.events.try_send(StreamEvent::Status(status)).is_err() {
            debug!("[{}] Status channel full or closed on disconnect", self.config.name);
        }
    }

    fn abort_driver(&mut self) -> bool {
        match self.driver.take() {
            Some(handle) => {
                let running = !handle.is_finished();
                handle.abort();
                running
            }
            None => false,
        }
    }
}

impl<P: LineParser, C: Connector> Drop for StreamClient<P, C> {
    fn drop(&mut self) {
        self.abort_driver();
    }
}

struct Driver<P: LineParser, C: Connector> {
    config: StreamConfig,
    parser: Arc<P>,
    connector: Arc<C>,
    events: mpsc::Sender<StreamEvent<P::Record>>,
    state: Arc<watch::Sender<ConnectionState>>,
    endpoint: Endpoint,
}

impl<P: LineParser, C: Connector> Driver<P, C> {
    async fn run(self) {
        loop {
            let result = self.session().await;
            self.set_state(ConnectionState::Disconnected);
            metrics::set_stream_connected(&self.config.name, false);

            let detail = match &result {
                Ok(()) => "connection closed by peer".to_string(),
                Err(StreamError::Closed) => {
                    info!("🛑 [{}] Event receiver gone, stopping", self.config.name);
                    return;
                }
                Err(e) => e.to_string(),
            };
            if self.emit_status(false, false, Some(detail.clone())).await.is_err() {
                return;
            }

            metrics::increment_reconnect(&self.config.name);
            warn!(
                "🔄 [{}] {} ({}), reconnecting in {:?}",
                self.config.name, detail, self.endpoint, self.config.reconnect_delay
            );
            sleep(self.config.reconnect_delay).await;
        }
    }

    async fn session(&self) -> Result<(), StreamError> {
        let name = self.config.name.as_str();
        self.set_state(ConnectionState::Connecting);
        info!("🔌 [{}] Connecting to {}", name, self.endpoint);

        let stream = timeout(self.config.connect_timeout, self.connector.connect(&self.endpoint))
            .await
            .map_err(|_| StreamError::ConnectTimeout(self.config.connect_timeout))??;

        self.set_state(ConnectionState::AwaitingLogin);
        metrics::set_stream_connected(name, true);
        info!("✅ [{}] Connected to {}, awaiting login prompt", name, self.endpoint);
        self.emit_status(true, false, None).await?;

        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut buf = vec![0u8; READ_CHUNK];
        let mut pending: Vec<u8> = Vec::new();
        let mut logged_in = false;
        let mut missing_login_reported = false;

        let period = self.config.keepalive_interval;
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                read = reader.read(&mut buf) => {
                    let n = read?;
                    if n == 0 {
                        return Ok(());
                    }
                    pending.extend_from_slice(&buf[..n]);

                    if logged_in {
                        self.drain_lines(&mut pending).await?;
                    } else if let Some(prompt_end) = login_prompt_end(&pending) {
                        pending.drain(..prompt_end);
                        match self.config.login_id() {
                            Some(login) => {
                                writer.write_all(format!("{}\r\n", login).as_bytes()).await?;
                                writer.flush().await?;
                                logged_in = true;
                                keepalive.reset();
                                self.set_state(ConnectionState::Streaming);
                                info!("🔑 [{}] Logged in as {}", name, login);
                                self.emit_status(true, true, None).await?;
                                // Spots that arrived with the prompt
                                self.drain_lines(&mut pending).await?;
                            }
                            None => {
                                if !missing_login_reported {
                                    missing_login_reported = true;
                                    warn!("⚠️ [{}] Login prompt received but no login identifier is configured", name);
                                    self.emit_status(
                                        true,
                                        false,
                                        Some("no login identifier configured".to_string()),
                                    )
                                    .await?;
                                }
                            }
                        }
                    } else {
                        discard_complete_lines(&mut pending);
                    }
                }
                _ = keepalive.tick(), if logged_in => {
                    debug!("[{}] Keepalive", name);
                    writer.write_all(b"\r\n").await?;
                    writer.flush().await?;
                }
            }
        }
    }

    async fn drain_lines(&self, pending: &mut Vec<u8>) -> Result<(), StreamError> {
        while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw);
            let line = text.trim_end_matches(&['\r', '\n'][..]);
            if line.trim().is_empty() {
                continue;
            }
            match self.parser.parse_line(line) {
                Some(record) => self
                    .events
                    .send(StreamEvent::Record(record))
                    .await
                    .map_err(|_| StreamError::Closed)?,
                None => metrics::increment_lines_dropped(&self.config.name),
            }
        }
        if pending.len() > MAX_PENDING_BYTES {
            warn!(
                "⚠️ [{}] Dropping {} bytes without a line terminator",
                self.config.name,
                pending.len()
            );
            pending.clear();
        }
        Ok(())
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    async fn emit_status(
        &self,
        connected: bool,
        logged_in: bool,
        detail: Option<String>,
    ) -> Result<(), StreamError> {
        let status = ConnectionStatus {
            feed: self.config.name.clone(),
            endpoint: self.endpoint.to_string(),
            state: *self.state.borrow(),
            connected,
            logged_in,
            detail,
        };
        self.events
            .send(StreamEvent::Status(status))
            .await
            .map_err(|_| StreamError::Closed)
    }
}

/// Keeps only the unterminated tail while waiting for a prompt.
fn discard_complete_lines(pending: &mut Vec<u8>) {
    if let Some(pos) = pending.iter().rposition(|&b| b == b'\n') {
        pending.drain(..=pos);
    }
    if pending.len() > MAX_PENDING_BYTES {
        pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::DuplexStream;

    struct MockConnector {
        attempts: Arc<AtomicUsize>,
        peers: mpsc::UnboundedSender<DuplexStream>,
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Stream = DuplexStream;

        async fn connect(&self, _endpoint: &Endpoint) -> std::io::Result<DuplexStream> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let (client, server) = tokio::io::duplex(4096);
            let _ = self.peers.send(server);
            Ok(client)
        }
    }

    struct DxOnly;

    impl LineParser for DxOnly {
        type Record = String;

        fn parse_line(&self, line: &str) -> Option<String> {
            line.starts_with("DX de").then(|| line.to_string())
        }
    }

    type TestClient = StreamClient<DxOnly, MockConnector>;

    fn client(
        login: Option<&str>,
    ) -> (
        TestClient,
        Arc<AtomicUsize>,
        mpsc::UnboundedReceiver<DuplexStream>,
        mpsc::Receiver<StreamEvent<String>>,
    ) {
        let attempts = Arc::new(AtomicUsize::new(0));
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let (tx, rx) = mpsc::channel(64);
        let connector = MockConnector {
            attempts: attempts.clone(),
            peers: peer_tx,
        };
        let client = StreamClient::new(
            StreamConfig::cluster(login.map(str::to_string)),
            DxOnly,
            connector,
            tx,
        );
        (client, attempts, peer_rx, rx)
    }

    async fn next_status(rx: &mut mpsc::Receiver<StreamEvent<String>>) -> ConnectionStatus {
        match rx.recv().await {
            Some(StreamEvent::Status(status)) => status,
            other => panic!("expected status, got {:?}", other),
        }
    }

    async fn next_record(rx: &mut mpsc::Receiver<StreamEvent<String>>) -> String {
        match rx.recv().await {
            Some(StreamEvent::Record(record)) => record,
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_prompt_detection() {
        let is_prompt = |text: &str| login_prompt_end(text.as_bytes()).is_some();
        assert!(is_prompt("Please enter your call: "));
        assert!(is_prompt("LOGIN:"));
        assert!(is_prompt("Welcome\r\nCallsign:"));
        assert!(is_prompt("dxspider >"));
        assert!(!is_prompt("Welcome to the cluster\r\n"));
        assert!(!is_prompt("Running CC Cluster <v4.0>\r\n"));
        assert!(is_prompt("Running CC Cluster <v4.0>\r\nlogin: "));
    }

    #[test]
    fn test_prompt_end_keeps_following_text() {
        let buf = b"Welcome\r\nPlease enter your call:\r\nDX de W1AW: 14025.0 K1ABC CQ 1234Z\r\n";
        let end = login_prompt_end(buf).unwrap();
        assert_eq!(&buf[end..], b"DX de W1AW: 14025.0 K1ABC CQ 1234Z\r\n");
        assert_eq!(login_prompt_end(b"dxspider >"), Some(10));
    }

    #[test]
    fn test_endpoint_display() {
        let ep = Endpoint::new("dxc.example.net", 7300);
        assert_eq!(ep.to_string(), "dxc.example.net:7300");
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_then_records_across_reads() {
        let (mut client, _, mut peers, mut rx) = client(Some("N0CALL"));
        let mut state = client.subscribe_state();
        client.connect(Endpoint::new("test", 7300));
        let mut server = peers.recv().await.unwrap();

        let status = next_status(&mut rx).await;
        assert!(status.connected && !status.logged_in);
        assert_eq!(status.state, ConnectionState::AwaitingLogin);

        server.write_all(b"Welcome\r\nPlease enter your call: ").await.unwrap();
        let mut buf = [0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"N0CALL\r\n");

        let status = next_status(&mut rx).await;
        assert!(status.logged_in);
        assert_eq!(client.state(), ConnectionState::Streaming);
        assert_eq!(*state.borrow_and_update(), ConnectionState::Streaming);

        server
            .write_all(b"DX de W1AW: 14025.0 K1ABC CQ 1234Z\r\nWWV de X <18>: junk\r\nDX de W1AW: 7025")
            .await
            .unwrap();
        assert_eq!(next_record(&mut rx).await, "DX de W1AW: 14025.0 K1ABC CQ 1234Z");

        server.write_all(b".0 K2ABC CQ 1234Z\r\n").await.unwrap();
        assert_eq!(next_record(&mut rx).await, "DX de W1AW: 7025.0 K2ABC CQ 1234Z");
    }

    #[tokio::test(start_paused = true)]
    async fn test_banner_ending_in_gt_does_not_trigger_login() {
        let (mut client, _, mut peers, mut rx) = client(Some("N0CALL"));
        client.connect(Endpoint::new("test", 7300));
        let mut server = peers.recv().await.unwrap();
        next_status(&mut rx).await;

        server.write_all(b"Running CC Cluster <v4.0>\r\n").await.unwrap();
        let mut buf = [0u8; 64];
        assert!(timeout(Duration::from_millis(50), server.read(&mut buf)).await.is_err());
        assert_eq!(client.state(), ConnectionState::AwaitingLogin);

        server.write_all(b"login: ").await.unwrap();
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"N0CALL\r\n");
        assert!(next_status(&mut rx).await.logged_in);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spots_sent_with_prompt_are_kept() {
        let (mut client, _, mut peers, mut rx) = client(Some("N0CALL"));
        client.connect(Endpoint::new("test", 7300));
        let mut server = peers.recv().await.unwrap();
        next_status(&mut rx).await;

        server
            .write_all(b"login:\r\nDX de W1AW: 14025.0 K1ABC CQ 1234Z\r\n")
            .await
            .unwrap();
        assert!(next_status(&mut rx).await.logged_in);
        assert_eq!(next_record(&mut rx).await, "DX de W1AW: 14025.0 K1ABC CQ 1234Z");
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_after_login() {
        let (mut client, _, mut peers, mut rx) = client(Some("N0CALL"));
        client.connect(Endpoint::new("test", 7300));
        let mut server = peers.recv().await.unwrap();
        next_status(&mut rx).await;

        server.write_all(b"login: ").await.unwrap();
        let mut buf = [0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"N0CALL\r\n");

        tokio::time::sleep(KEEPALIVE_INTERVAL + Duration::from_secs(1)).await;
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_reconnect_after_close() {
        let (mut client, attempts, mut peers, mut rx) = client(Some("N0CALL"));
        client.connect(Endpoint::new("test", 7300));
        let server = peers.recv().await.unwrap();
        assert!(next_status(&mut rx).await.connected);

        drop(server);
        let status = next_status(&mut rx).await;
        assert!(!status.connected);
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        tokio::time::sleep(CLUSTER_RECONNECT_DELAY - Duration::from_secs(1)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        let _server = peers.recv().await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let (mut client, attempts, mut peers, mut rx) = client(Some("N0CALL"));
        client.connect(Endpoint::new("test", 7300));
        let server = peers.recv().await.unwrap();
        next_status(&mut rx).await;
        drop(server);
        assert!(!next_status(&mut rx).await.connected);

        client.disconnect();
        client.disconnect();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(peers.try_recv().is_err());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_login_stays_awaiting() {
        let (mut client, _, mut peers, mut rx) = client(None);
        client.connect(Endpoint::new("test", 7300));
        let mut server = peers.recv().await.unwrap();
        next_status(&mut rx).await;

        server.write_all(b"login: ").await.unwrap();
        let status = next_status(&mut rx).await;
        assert!(status.connected && !status.logged_in);
        assert!(status.detail.is_some());

        server.write_all(b"\r\nlogin: ").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(client.state(), ConnectionState::AwaitingLogin);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_replaces_running_session() {
        let (mut client, _, mut peers, mut rx) = client(Some("N0CALL"));
        client.connect(Endpoint::new("one", 7300));
        let mut first = peers.recv().await.unwrap();
        next_status(&mut rx).await;

        client.connect(Endpoint::new("two", 7300));
        let _second = peers.recv().await.unwrap();
        assert_eq!(client.endpoint(), Some(&Endpoint::new("two", 7300)));

        // The aborted session dropped its half of the first connection
        let mut buf = [0u8; 16];
        assert_eq!(first.read(&mut buf).await.unwrap(), 0);
    }
}

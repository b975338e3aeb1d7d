use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as TokioMutex};

use crate::event::RconEvent;
use crate::protocol::{decode_packet, encode_packet, Decoded, SERVERDATA_AUTH, SERVERDATA_EXECCOMMAND};

const CACHE_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
pub struct RconConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub silence_timeout: Duration,
    pub reconnect_delay: Duration,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 27015,
            password: String::new(),
            connect_timeout: Duration::from_secs(15),
            command_timeout: Duration::from_secs(10),
            silence_timeout: Duration::from_secs(1),
            reconnect_delay: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Error)]
pub enum RconError {
    #[error("connect timed out")]
    ConnectTimeout,
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("no response within the command timeout")]
    NoResponse,
    #[error("not connected")]
    NotConnected,
    #[error("connection closed")]
    ConnectionClosed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

struct CacheEntry {
    at: Instant,
    response: String,
}

struct Inner {
    cfg: RconConfig,
    writer: TokioMutex<Option<OwnedWriteHalf>>,
    /// Serializes commands: the second caller waits for the first to resolve.
    cmd_lock: TokioMutex<()>,
    /// Body sink of the one in-flight command.
    active: parking_lot::Mutex<Option<mpsc::UnboundedSender<String>>>,
    next_id: AtomicU32,
    cache: parking_lot::Mutex<HashMap<String, CacheEntry>>,
    events: mpsc::UnboundedSender<RconEvent>,
    connected: AtomicBool,
    reconnecting: AtomicBool,
    /// Connection generation; stale reader tasks compare before acting.
    generation: AtomicU32,
}

/// TCP RCON client with an auth handshake, a single in-flight command queue,
/// lenient response collection and an infinite reconnect loop.
#[derive(Clone)]
pub struct RconClient {
    inner: Arc<Inner>,
}

impl RconClient {
    pub fn new(cfg: RconConfig) -> (Self, mpsc::UnboundedReceiver<RconEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            cfg,
            writer: TokioMutex::new(None),
            cmd_lock: TokioMutex::new(()),
            active: parking_lot::Mutex::new(None),
            next_id: AtomicU32::new(0),
            cache: parking_lot::Mutex::new(HashMap::new()),
            events,
            connected: AtomicBool::new(false),
            reconnecting: AtomicBool::new(false),
            generation: AtomicU32::new(0),
        });
        (Self { inner }, events_rx)
    }

    pub async fn connect(&self) -> Result<(), RconError> {
        self.inner.connect().await
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Relaxed)
    }

    /// Sends one command and collects its response. Commands are serialized;
    /// concurrent callers queue behind each other.
    pub async fn send(&self, cmd: &str) -> Result<String, RconError> {
        let _guard = self.inner.cmd_lock.lock().await;
        self.inner.send_locked(cmd).await
    }

    /// TTL-cached [`RconClient::send`].
    pub async fn send_cached(&self, cmd: &str, ttl: Duration) -> Result<String, RconError> {
        if let Some(hit) = self.inner.cache_get(cmd, ttl) {
            return Ok(hit);
        }
        let response = self.send(cmd).await?;
        self.inner.cache_put(cmd, response.clone(), ttl);
        Ok(response)
    }

    /// Drops the connection and disables the reconnect loop.
    pub async fn close(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.connected.store(false, Ordering::Relaxed);
        *self.inner.writer.lock().await = None;
        self.inner.active.lock().take();
    }
}

impl Inner {
    fn connect(
        self: &Arc<Self>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), RconError>> + Send + '_>>
    {
        Box::pin(async move {
            let addr = (self.cfg.host.clone(), self.cfg.port);
            let stream = tokio::time::timeout(self.cfg.connect_timeout, async {
                let stream = TcpStream::connect(addr).await?;
                self.authenticate(stream).await
            })
            .await
            .map_err(|_| RconError::ConnectTimeout)??;

            let (read_half, write_half) = stream.into_split();
            *self.writer.lock().await = Some(write_half);
            self.connected.store(true, Ordering::Relaxed);

            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let inner = self.clone();
            tokio::spawn(async move {
                inner.reader_loop(read_half, generation).await;
            });
            Ok(())
        })
    }

    /// Sends the auth packet and waits for the verdict. An empty `type=0,
    /// id=1` padding packet before the real reply is skipped.
    async fn authenticate(&self, mut stream: TcpStream) -> Result<TcpStream, RconError> {
        stream
            .write_all(&encode_packet(1, SERVERDATA_AUTH, &self.cfg.password))
            .await?;

        let mut buf = Vec::new();
        let mut tmp = [0u8; 4096];
        let mut skipped_padding = false;
        loop {
            match decode_packet(&mut buf) {
                Decoded::Frame { id, ptype, body } => {
                    if !skipped_padding && ptype == 0 && id == 1 && body.is_empty() {
                        skipped_padding = true;
                        continue;
                    }
                    if id == -1 {
                        return Err(RconError::AuthenticationFailed);
                    }
                    if (ptype == 0 || ptype == 2) && id == 1 {
                        return Ok(stream);
                    }
                    // unrelated frame during the handshake, ignore
                }
                Decoded::Raw(text) => {
                    log::debug!("rcon: out-of-spec data during auth: {:?}", text);
                }
                Decoded::Incomplete => {
                    let n = stream.read(&mut tmp).await?;
                    if n == 0 {
                        return Err(RconError::ConnectionClosed);
                    }
                    buf.extend(&tmp[..n]);
                }
            }
        }
    }

    async fn reader_loop(self: Arc<Self>, mut read_half: OwnedReadHalf, generation: u32) {
        let mut buf = Vec::new();
        let mut tmp = [0u8; 8192];
        let reason = loop {
            match decode_packet(&mut buf) {
                Decoded::Frame { body, .. } => self.deliver(body),
                Decoded::Raw(text) => self.deliver(text),
                Decoded::Incomplete => match read_half.read(&mut tmp).await {
                    Ok(0) => break "connection closed by peer".to_string(),
                    Ok(n) => buf.extend(&tmp[..n]),
                    Err(err) => break err.to_string(),
                },
            }
        };
        if self.generation.load(Ordering::SeqCst) != generation {
            // superseded by a newer connection or an explicit close
            return;
        }
        self.on_disconnect(reason).await;
    }

    /// Routes one body (or raw-text fallback) to the in-flight command.
    fn deliver(&self, body: String) {
        let active = self.active.lock();
        if let Some(tx) = active.as_ref() {
            let _ = tx.send(body);
        } else if !body.is_empty() {
            log::debug!("rcon: unsolicited data dropped: {:?}", body);
        }
    }

    async fn on_disconnect(self: &Arc<Self>, reason: String) {
        self.connected.store(false, Ordering::Relaxed);
        *self.writer.lock().await = None;
        // closing the body channel resolves the in-flight command
        self.active.lock().take();

        let _ = self.events.send(RconEvent::Disconnect {
            reason: reason.clone(),
        });
        log::warn!("rcon: disconnected: {}", reason);

        if self.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = self.clone();
        let down_since = Instant::now();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(inner.cfg.reconnect_delay).await;
                match inner.connect().await {
                    Ok(()) => {
                        let downtime = down_since.elapsed();
                        let _ = inner.events.send(RconEvent::Reconnect { downtime });
                        log::info!("rcon: reconnected after {:.0?}", downtime);
                        break;
                    }
                    Err(err) => {
                        log::warn!("rcon: reconnect attempt failed: {}", err);
                    }
                }
            }
            inner.reconnecting.store(false, Ordering::SeqCst);
        });
    }

    async fn send_locked(&self, cmd: &str) -> Result<String, RconError> {
        // fresh positive 31-bit id, 1 stays reserved for auth
        let id = ((self.next_id.fetch_add(1, Ordering::Relaxed) & 0x3FFF_FFFF) + 2) as i32;

        let (tx, mut rx) = mpsc::unbounded_channel();
        *self.active.lock() = Some(tx);

        {
            let mut writer = self.writer.lock().await;
            let Some(w) = writer.as_mut() else {
                self.active.lock().take();
                return Err(RconError::NotConnected);
            };
            if let Err(err) = w
                .write_all(&encode_packet(id, SERVERDATA_EXECCOMMAND, cmd))
                .await
            {
                self.active.lock().take();
                return Err(err.into());
            }
        }

        let started = tokio::time::Instant::now();
        let absolute = tokio::time::sleep_until(started + self.cfg.command_timeout);
        tokio::pin!(absolute);
        // armed on the first body; until then it sits safely past the
        // absolute deadline
        let silence = tokio::time::sleep_until(started + self.cfg.command_timeout * 2);
        tokio::pin!(silence);
        let mut acc = String::new();

        let result = loop {
            tokio::select! {
                _ = &mut absolute => {
                    break if acc.is_empty() {
                        Err(RconError::NoResponse)
                    } else {
                        Ok(acc)
                    };
                }
                _ = &mut silence => {
                    break Ok(acc);
                }
                body = rx.recv() => match body {
                    Some(text) => {
                        acc.push_str(&text);
                        silence.as_mut().reset(
                            tokio::time::Instant::now() + self.cfg.silence_timeout,
                        );
                    }
                    None => {
                        break if acc.is_empty() {
                            Err(RconError::ConnectionClosed)
                        } else {
                            Ok(acc)
                        };
                    }
                },
            }
        };

        self.active.lock().take();
        result
    }

    fn cache_get(&self, cmd: &str, ttl: Duration) -> Option<String> {
        let cache = self.cache.lock();
        cache
            .get(cmd)
            .filter(|e| e.at.elapsed() < ttl)
            .map(|e| e.response.clone())
    }

    fn cache_put(&self, cmd: &str, response: String, ttl: Duration) {
        let mut cache = self.cache.lock();
        cache.insert(
            cmd.to_string(),
            CacheEntry {
                at: Instant::now(),
                response,
            },
        );
        // lazy eviction, only when over capacity
        if cache.len() > CACHE_CAPACITY {
            cache.retain(|_, e| e.at.elapsed() < ttl * 2);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::net::TcpListener;

    fn test_cfg(port: u16) -> RconConfig {
        RconConfig {
            host: "127.0.0.1".into(),
            port,
            password: "hunter2".into(),
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(2),
            silence_timeout: Duration::from_millis(100),
            reconnect_delay: Duration::from_millis(100),
        }
    }

    /// Scripted server side of one accepted connection.
    struct ServerConn {
        stream: TcpStream,
        buf: Vec<u8>,
    }

    impl ServerConn {
        fn new(stream: TcpStream) -> Self {
            Self {
                stream,
                buf: Vec::new(),
            }
        }

        async fn read_frame(&mut self) -> (i32, i32, String) {
            let mut tmp = [0u8; 4096];
            loop {
                match decode_packet(&mut self.buf) {
                    Decoded::Frame { id, ptype, body } => return (id, ptype, body),
                    Decoded::Raw(_) => panic!("client sent malformed packet"),
                    Decoded::Incomplete => {
                        let n = self.stream.read(&mut tmp).await.unwrap();
                        assert!(n > 0, "client closed while a frame was expected");
                        self.buf.extend(&tmp[..n]);
                    }
                }
            }
        }

        async fn expect_silence(&mut self, wait: Duration) {
            let mut tmp = [0u8; 64];
            let res = tokio::time::timeout(wait, self.stream.read(&mut tmp)).await;
            assert!(res.is_err(), "client transmitted while it should be waiting");
        }

        async fn write(&mut self, bytes: &[u8]) {
            self.stream.write_all(bytes).await.unwrap();
        }

        async fn handle_auth(&mut self, password: &str) {
            let (id, ptype, body) = self.read_frame().await;
            assert_eq!((id, ptype), (1, SERVERDATA_AUTH));
            assert_eq!(body, password);
            let reply = encode_packet(1, 2, "");
            self.write(&reply).await;
        }
    }

    async fn listen() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn auth_then_command_round_trip() {
        let (listener, port) = listen().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = ServerConn::new(stream);
            conn.handle_auth("hunter2").await;
            let (id, ptype, body) = conn.read_frame().await;
            assert_eq!(ptype, SERVERDATA_EXECCOMMAND);
            assert!(id >= 2);
            assert_eq!(body, "list");
            let reply = encode_packet(id, 0, "A,B");
            conn.write(&reply).await;
            conn
        });

        let (client, _events) = RconClient::new(test_cfg(port));
        client.connect().await.unwrap();
        assert!(client.is_connected());
        let response = client.send("list").await.unwrap();
        assert_eq!(response, "A,B");
        let _conn = server.await.unwrap();
    }

    #[tokio::test]
    async fn auth_failure_is_reported() {
        let (listener, port) = listen().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = ServerConn::new(stream);
            let _ = conn.read_frame().await;
            let reply = encode_packet(-1, 2, "");
            conn.write(&reply).await;
            // keep the socket open so the client decides on the packet
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let (client, _events) = RconClient::new(test_cfg(port));
        assert!(matches!(
            client.connect().await,
            Err(RconError::AuthenticationFailed)
        ));
    }

    #[tokio::test]
    async fn empty_padding_packet_before_auth_reply_is_skipped() {
        let (listener, port) = listen().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = ServerConn::new(stream);
            let _ = conn.read_frame().await;
            let padding = encode_packet(1, 0, "");
            conn.write(&padding).await;
            let reply = encode_packet(1, 2, "");
            conn.write(&reply).await;
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let (client, _events) = RconClient::new(test_cfg(port));
        client.connect().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_sends_are_serialized() {
        let (listener, port) = listen().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = ServerConn::new(stream);
            conn.handle_auth("hunter2").await;

            let (id, _, body) = conn.read_frame().await;
            assert_eq!(body, "one");
            // the second command must not hit the wire before the first
            // resolves
            conn.expect_silence(Duration::from_millis(250)).await;
            let reply = encode_packet(id, 0, "R1");
            conn.write(&reply).await;

            let (id, _, body) = conn.read_frame().await;
            assert_eq!(body, "two");
            let reply = encode_packet(id, 0, "R2");
            conn.write(&reply).await;
            conn
        });

        let (client, _events) = RconClient::new(test_cfg(port));
        client.connect().await.unwrap();
        let (r1, r2) = tokio::join!(client.send("one"), client.send("two"));
        assert_eq!(r1.unwrap(), "R1");
        assert_eq!(r2.unwrap(), "R2");
        let _conn = server.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_frame_is_surfaced_as_raw_text() {
        let (listener, port) = listen().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = ServerConn::new(stream);
            conn.handle_auth("hunter2").await;
            let _ = conn.read_frame().await;
            let mut garbage = 5i32.to_le_bytes().to_vec();
            garbage.extend(b"hello world");
            conn.write(&garbage).await;
            conn
        });

        let (client, _events) = RconClient::new(test_cfg(port));
        client.connect().await.unwrap();
        let response = client.send("status").await.unwrap();
        assert!(response.contains("hello world"));
        let _conn = server.await.unwrap();
    }

    #[tokio::test]
    async fn cached_send_skips_the_wire_within_ttl() {
        let (listener, port) = listen().await;
        let hits = Arc::new(AtomicU32::new(0));
        let server_hits = hits.clone();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = ServerConn::new(stream);
            conn.handle_auth("hunter2").await;
            loop {
                let (id, _, _) = conn.read_frame().await;
                server_hits.fetch_add(1, Ordering::SeqCst);
                let reply = encode_packet(id, 0, "A,B");
                conn.write(&reply).await;
            }
        });

        let (client, _events) = RconClient::new(test_cfg(port));
        client.connect().await.unwrap();

        let ttl = Duration::from_millis(400);
        assert_eq!(client.send_cached("list", ttl).await.unwrap(), "A,B");
        assert_eq!(client.send_cached("list", ttl).await.unwrap(), "A,B");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        tokio::time::sleep(ttl + Duration::from_millis(50)).await;
        assert_eq!(client.send_cached("list", ttl).await.unwrap(), "A,B");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        server.abort();
    }

    #[tokio::test]
    async fn empty_timeout_rejects_with_no_response() {
        let (listener, port) = listen().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = ServerConn::new(stream);
            conn.handle_auth("hunter2").await;
            let _ = conn.read_frame().await;
            // never reply
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let mut cfg = test_cfg(port);
        cfg.command_timeout = Duration::from_millis(300);
        let (client, _events) = RconClient::new(cfg);
        client.connect().await.unwrap();
        assert!(matches!(
            client.send("list").await,
            Err(RconError::NoResponse)
        ));
    }

    #[tokio::test]
    async fn disconnect_then_reconnect_emits_events() {
        let (listener, port) = listen().await;
        let server = tokio::spawn(async move {
            // first connection: auth, then drop
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = ServerConn::new(stream);
            conn.handle_auth("hunter2").await;
            drop(conn);
            // second connection: auth and stay up
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = ServerConn::new(stream);
            conn.handle_auth("hunter2").await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let (client, mut events) = RconClient::new(test_cfg(port));
        client.connect().await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(3), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(first, RconEvent::Disconnect { .. }));

        let second = tokio::time::timeout(Duration::from_secs(3), events.recv())
            .await
            .unwrap()
            .unwrap();
        let RconEvent::Reconnect { downtime } = second else {
            panic!("expected reconnect");
        };
        assert!(downtime >= Duration::from_millis(100));
        assert!(client.is_connected());
        server.abort();
    }
}

//! Control Coordinator: owns the control connection, drives the login
//! handshake, and hands frames to the active sub-test engine.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{Connector, MaybeTlsStream, connect_async_tls_with_config};
use tracing::{debug, info};
use url::Url;

use crate::download::S2cTest;
use crate::error::{NdtError, Result};
use crate::event::{EventHandler, StateToken};
use crate::message::{self, Frame, MessageType};
use crate::meta::MetaTest;
use crate::params;
use crate::summary::Summary;
use crate::upload::C2sTest;

/// Type alias for the WebSocket stream
pub type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<TcpStream>>;

pub(crate) type ControlSink = SplitSink<WsStream, Message>;

/// Builder for [`Client`].
pub struct ClientBuilder {
    host: String,
    port: u16,
    path: String,
    tests: u8,
    secure: bool,
    upload_window: Duration,
}

impl ClientBuilder {
    /// Start building a client for the given server host.
    pub fn new(host: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            host: host.into(),
            port: params::DEFAULT_CONTROL_PORT,
            path: params::DEFAULT_PATH.into(),
            tests: params::TEST_C2S | params::TEST_S2C | params::TEST_META,
            secure: false,
            upload_window: params::UPLOAD_WINDOW,
        }
    }

    /// Control port (default 3001).
    pub fn port(mut self, port: u16) -> ClientBuilder {
        self.port = port;
        self
    }

    /// URL path of the NDT endpoint (default `/ndt_protocol`).
    pub fn path(mut self, path: impl Into<String>) -> ClientBuilder {
        self.path = path.into();
        self
    }

    /// Test-selection mask, a combination of [`params::TEST_C2S`],
    /// [`params::TEST_S2C`] and [`params::TEST_META`]. The status bit is
    /// always added at login.
    pub fn tests(mut self, mask: u8) -> ClientBuilder {
        self.tests = mask;
        self
    }

    /// Connect with `wss://` instead of plain `ws://`.
    pub fn secure(mut self, secure: bool) -> ClientBuilder {
        self.secure = secure;
        self
    }

    /// Length of the upload test's send window (default 10 s, which is
    /// what real servers measure against; shorten it only for tests).
    pub fn upload_window(mut self, window: Duration) -> ClientBuilder {
        self.upload_window = window;
        self
    }

    /// Build the client.
    pub fn build(self) -> Client {
        Client {
            host: self.host,
            port: self.port,
            path: self.path,
            tests: self.tests,
            secure: self.secure,
            upload_window: self.upload_window,
        }
    }
}

/// A legacy NDT client bound to one server.
///
/// Each [`Client::run`] call is one complete session: login, the
/// server-scheduled sub-tests in order, results, logout. A failed session
/// is never retried; call `run` again for a fresh attempt.
pub struct Client {
    host: String,
    port: u16,
    path: String,
    tests: u8,
    secure: bool,
    upload_window: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlState {
    LoginSent,
    WaitForTestIds,
    WaitForResults,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestId {
    C2s,
    S2c,
    Meta,
}

pub(crate) enum Status {
    Continue,
    Done,
}

pub(crate) struct EngineCx<'a> {
    pub(crate) sink: &'a mut ControlSink,
    pub(crate) handler: &'a mut dyn EventHandler,
    pub(crate) summary: &'a mut Summary,
    pub(crate) fault_tx: &'a mpsc::Sender<NdtError>,
    pub(crate) client: &'a Client,
}

enum Engine {
    Download(S2cTest),
    Upload(C2sTest),
    Meta(MetaTest),
}

impl Engine {
    fn new(id: TestId, upload_window: Duration) -> Engine {
        match id {
            TestId::C2s => Engine::Upload(C2sTest::new(upload_window)),
            TestId::S2c => Engine::Download(S2cTest::new()),
            TestId::Meta => Engine::Meta(MetaTest::new()),
        }
    }

    async fn handle(&mut self, frame: &Frame, cx: &mut EngineCx<'_>) -> Result<Status> {
        match self {
            Engine::Download(test) => test.handle(frame, cx).await,
            Engine::Upload(test) => test.handle(frame, cx).await,
            Engine::Meta(test) => test.handle(frame, cx).await,
        }
    }
}

impl Client {
    /// Run one NDT session against the configured server.
    ///
    /// Lifecycle events are delivered through `handler`; on success the
    /// measured results are also returned. On failure `on_error` fires
    /// exactly once, after pending data connections and send tasks are
    /// torn down.
    pub async fn run(&self, handler: &mut dyn EventHandler) -> Result<Summary> {
        let mut summary = Summary {
            server: self.host.clone(),
            ..Default::default()
        };
        match self.session(handler, &mut summary).await {
            Ok(()) => Ok(summary),
            Err(e) => {
                handler.on_error(&e.to_string());
                Err(e)
            }
        }
    }

    async fn session(&self, handler: &mut dyn EventHandler, summary: &mut Summary) -> Result<()> {
        let ws = self.connect_ws(self.port, params::PROTO_CONTROL).await?;
        handler.on_start(&self.host);

        let (mut sink, mut stream) = ws.split();
        sink.send(Message::Binary(message::extended_login(self.tests)))
            .await?;
        debug!(tests = self.tests, "login sent");

        // Data-connection tasks report failures here; any fault kills the
        // session just like a bad control frame.
        let (fault_tx, mut fault_rx) = mpsc::channel::<NdtError>(4);

        let mut state = ControlState::LoginSent;
        // Engines are staged on a stack but pushed in reverse, so pops
        // reproduce the order the server listed the tests in.
        let mut queue: Vec<Engine> = Vec::new();
        let mut active: Option<Engine> = None;

        while state != ControlState::Terminated {
            let frame = tokio::select! {
                // A queued data-connection fault must win over any control
                // frame, including a logout that would end the session.
                biased;
                Some(fault) = fault_rx.recv() => return Err(fault),
                msg = stream.next() => match msg {
                    Some(Ok(msg)) => match frame_from_message(msg)? {
                        Some(frame) => frame,
                        None => continue,
                    },
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(NdtError::ConnectionClosed),
                },
            };
            debug!(kind = ?frame.kind, ?state, "control frame");

            if active.is_none() {
                active = queue.pop();
            }
            if let Some(engine) = active.as_mut() {
                let mut cx = EngineCx {
                    sink: &mut sink,
                    handler: &mut *handler,
                    summary: &mut *summary,
                    fault_tx: &fault_tx,
                    client: self,
                };
                if let Status::Done = engine.handle(&frame, &mut cx).await? {
                    active = None;
                }
                continue;
            }

            match (state, frame.kind) {
                (ControlState::LoginSent, MessageType::SrvQueue) => {
                    let body = frame.control_text()?;
                    match body.as_str() {
                        params::QUEUE_KEEPALIVE => {
                            sink.send(Message::Binary(message::encode(
                                MessageType::MsgWaiting,
                                "",
                            )?))
                            .await?;
                        }
                        params::QUEUE_REJECTED => return Err(NdtError::ServerRejected),
                        other => info!(queue = other, "queued, waiting for login reply"),
                    }
                }
                (ControlState::LoginSent, MessageType::MsgLogin) => {
                    let body = frame.control_text()?;
                    if !body.starts_with('v') {
                        return Err(NdtError::ProtocolViolation(format!(
                            "bad server version {body:?}"
                        )));
                    }
                    debug!(version = %body, "login accepted");
                    state = ControlState::WaitForTestIds;
                }
                (ControlState::WaitForTestIds, MessageType::MsgLogin) => {
                    let body = frame.control_text()?;
                    let ids = parse_test_ids(&body)?;
                    info!(?ids, "server scheduled tests");
                    for id in ids.iter().rev() {
                        queue.push(Engine::new(*id, self.upload_window));
                    }
                    state = ControlState::WaitForResults;
                }
                (ControlState::WaitForResults, MessageType::MsgResults) => {
                    let results = frame.control_text()?;
                    info!(%results, "server results");
                }
                (ControlState::WaitForResults, MessageType::MsgLogout) => {
                    if let Err(e) = sink.close().await {
                        debug!(error = %e, "close after logout");
                    }
                    handler.on_change(StateToken::FinishedAll);
                    handler.on_completion();
                    state = ControlState::Terminated;
                }
                (state, kind) => {
                    return Err(NdtError::ProtocolViolation(format!(
                        "unexpected {kind:?} in state {state:?}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Open a WebSocket to the server on `port` with the given subprotocol
    /// (`ndt` for the control channel, `s2c`/`c2s` for data connections).
    pub(crate) async fn connect_ws(&self, port: u16, subprotocol: &str) -> Result<WsStream> {
        let scheme = if self.secure { "wss" } else { "ws" };
        let url = Url::parse(&format!("{scheme}://{}:{port}{}", self.host, self.path))?;

        let mut request = url.to_string().into_client_request()?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", subprotocol.parse().unwrap());

        // Connect using rustls for TLS; the connector is only exercised
        // for wss:// URLs.
        let root_store =
            rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::aws_lc_rs::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(root_store)
        .with_no_client_auth();

        let connector = Connector::Rustls(Arc::new(tls_config));
        let (ws_stream, _response) =
            connect_async_tls_with_config(request, None, false, Some(connector)).await?;

        Ok(ws_stream)
    }
}

fn frame_from_message(msg: Message) -> Result<Option<Frame>> {
    match msg {
        Message::Binary(data) => Frame::decode(&data).map(Some),
        Message::Text(text) => Frame::decode(text.as_bytes()).map(Some),
        Message::Close(_) => Err(NdtError::ConnectionClosed),
        _ => Ok(None), // Ping/Pong handled by tokio-tungstenite
    }
}

fn parse_test_ids(body: &str) -> Result<Vec<TestId>> {
    let mut ids = Vec::new();
    for token in body.split(' ') {
        match token {
            "" => continue,
            "2" => ids.push(TestId::C2s),
            "4" => ids.push(TestId::S2c),
            "32" => ids.push(TestId::Meta),
            other => {
                return Err(NdtError::ProtocolViolation(format!(
                    "unknown test id {other:?}"
                )));
            }
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_keep_server_order() {
        let ids = parse_test_ids("2 4 32").unwrap();
        assert_eq!(ids, vec![TestId::C2s, TestId::S2c, TestId::Meta]);
    }

    #[test]
    fn empty_tokens_ignored() {
        assert_eq!(parse_test_ids("").unwrap(), vec![]);
        assert_eq!(parse_test_ids("  4  ").unwrap(), vec![TestId::S2c]);
    }

    #[test]
    fn unknown_test_id_is_fatal() {
        assert!(matches!(
            parse_test_ids("2 7"),
            Err(NdtError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn reversed_staging_restores_order() {
        let ids = parse_test_ids("2 4 32").unwrap();
        let mut stack: Vec<TestId> = ids.iter().rev().copied().collect();
        let mut popped = Vec::new();
        while let Some(id) = stack.pop() {
            popped.push(id);
        }
        assert_eq!(popped, ids);
    }
}

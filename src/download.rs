//! Download (S2C) sub-test.
//!
//! The server streams junk at the client over a dedicated data connection
//! for its measurement window. The client counts what arrives, including
//! an estimate of the transport's own framing overhead, and reports the
//! rate it saw back to the server on the control channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::client::{EngineCx, Status, WsStream};
use crate::error::{NdtError, Result};
use crate::event::StateToken;
use crate::message::{self, Frame, MessageType};
use crate::params;
use crate::throughput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum S2cState {
    WaitPrepare,
    WaitStart,
    WaitFirstMsg,
    WaitMsgOrFinish,
}

pub(crate) struct S2cTest {
    state: S2cState,
    received: Arc<AtomicU64>,
    start: Option<Instant>,
    end: Option<Instant>,
    reader: Option<JoinHandle<()>>,
}

impl S2cTest {
    pub(crate) fn new() -> S2cTest {
        S2cTest {
            state: S2cState::WaitPrepare,
            received: Arc::new(AtomicU64::new(0)),
            start: None,
            end: None,
            reader: None,
        }
    }

    pub(crate) async fn handle(&mut self, frame: &Frame, cx: &mut EngineCx<'_>) -> Result<Status> {
        match (self.state, frame.kind) {
            (S2cState::WaitPrepare, MessageType::TestPrepare) => {
                cx.handler.on_change(StateToken::PreparingS2c);
                let body = frame.control_text()?;
                let port: u16 = body.trim().parse().map_err(|_| {
                    NdtError::ProtocolViolation(format!("bad s2c port {body:?}"))
                })?;
                let conn = cx.client.connect_ws(port, params::PROTO_S2C).await?;
                self.start = Some(Instant::now());
                let received = Arc::clone(&self.received);
                let fault_tx = cx.fault_tx.clone();
                self.reader = Some(tokio::spawn(count_incoming(conn, received, fault_tx)));
                self.state = S2cState::WaitStart;
                Ok(Status::Continue)
            }
            (S2cState::WaitStart, MessageType::TestStart) => {
                cx.handler.on_change(StateToken::RunningS2c);
                self.state = S2cState::WaitFirstMsg;
                Ok(Status::Continue)
            }
            (S2cState::WaitFirstMsg, MessageType::TestMsg) => {
                if self.end.is_none() {
                    self.end = Some(Instant::now());
                }
                let start = self
                    .start
                    .ok_or_else(|| NdtError::ProtocolViolation("s2c never prepared".into()))?;
                let end = self
                    .end
                    .ok_or_else(|| NdtError::ProtocolViolation("s2c never timed".into()))?;
                let seconds = (end - start).as_secs_f64();
                if seconds <= 0.0 {
                    return Err(NdtError::ProtocolViolation(
                        "s2c finished with no elapsed time".into(),
                    ));
                }
                let rate = throughput::rate_kbps(self.received.load(Ordering::Relaxed), seconds);
                let server_rate = frame.control_text()?;
                debug!(rate_kbps = rate, server_rate = %server_rate, "s2c rate");
                cx.summary.download_kbps = Some(rate);
                cx.sink
                    .send(Message::Binary(message::encode(
                        MessageType::TestMsg,
                        &rate.to_string(),
                    )?))
                    .await?;
                self.state = S2cState::WaitMsgOrFinish;
                Ok(Status::Continue)
            }
            (S2cState::WaitMsgOrFinish, MessageType::TestMsg) => {
                mine_reported_vars(&frame.control_text()?, &mut cx.summary.reported_vars);
                Ok(Status::Continue)
            }
            (S2cState::WaitMsgOrFinish, MessageType::TestFinalize) => {
                if let Some(reader) = self.reader.take() {
                    reader.abort();
                }
                cx.handler.on_change(StateToken::FinishedS2c);
                Ok(Status::Done)
            }
            (state, kind) => Err(NdtError::ProtocolViolation(format!(
                "s2c: unexpected {kind:?} in state {state:?}"
            ))),
        }
    }
}

impl Drop for S2cTest {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Count everything the server sends on the data connection. Errors are
/// funneled to the coordinator through the fault channel.
async fn count_incoming(
    mut conn: WsStream,
    received: Arc<AtomicU64>,
    fault_tx: mpsc::Sender<NdtError>,
) {
    while let Some(msg) = conn.next().await {
        match msg {
            Ok(Message::Binary(data)) => {
                received.fetch_add(counted_len(data.len()), Ordering::Relaxed);
            }
            Ok(Message::Text(text)) => {
                received.fetch_add(counted_len(text.len()), Ordering::Relaxed);
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                let _ = fault_tx.send(e.into()).await;
                break;
            }
        }
    }
}

/// Payload length plus the WebSocket frame header the transport spent on
/// it, so the computed throughput matches the protocol's accounting.
fn counted_len(payload: usize) -> u64 {
    let overhead = if payload < 126 {
        2
    } else if payload < 65536 {
        4
    } else {
        10
    };
    (payload + overhead) as u64
}

/// Pull tracked `Name: value` counters out of a result frame body.
fn mine_reported_vars(body: &str, vars: &mut HashMap<String, String>) {
    for line in body.lines() {
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            if params::TRACKED_VARS.contains(&name) {
                debug!(name, value = value.trim(), "reported variable");
                vars.insert(name.to_string(), value.trim().to_string());
            }
        }
    }
}

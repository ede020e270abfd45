//! Upload (C2S) sub-test.
//!
//! The client pushes a fixed printable-ASCII buffer at the server for a
//! fixed window, as fast as the transport drains it, then reports the
//! rate computed from what it actually handed to the socket.

use std::time::Duration;

use bytes::Bytes;
use futures_util::SinkExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::client::{EngineCx, Status, WsStream};
use crate::error::{NdtError, Result};
use crate::event::StateToken;
use crate::message::{Frame, MessageType};
use crate::params;
use crate::throughput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum C2sState {
    WaitPrepare,
    WaitStart,
    WaitMsg,
    WaitFinalize,
}

pub(crate) struct C2sTest {
    state: C2sState,
    window: Duration,
    conn: Option<WsStream>,
    outcome: Option<oneshot::Receiver<(u64, Duration)>>,
    sender: Option<JoinHandle<()>>,
}

impl C2sTest {
    pub(crate) fn new(window: Duration) -> C2sTest {
        C2sTest {
            state: C2sState::WaitPrepare,
            window,
            conn: None,
            outcome: None,
            sender: None,
        }
    }

    pub(crate) async fn handle(&mut self, frame: &Frame, cx: &mut EngineCx<'_>) -> Result<Status> {
        match (self.state, frame.kind) {
            (C2sState::WaitPrepare, MessageType::TestPrepare) => {
                cx.handler.on_change(StateToken::PreparingC2s);
                let body = frame.control_text()?;
                let port: u16 = body.trim().parse().map_err(|_| {
                    NdtError::ProtocolViolation(format!("bad c2s port {body:?}"))
                })?;
                self.conn = Some(cx.client.connect_ws(port, params::PROTO_C2S).await?);
                self.state = C2sState::WaitStart;
                Ok(Status::Continue)
            }
            (C2sState::WaitStart, MessageType::TestStart) => {
                cx.handler.on_change(StateToken::RunningC2s);
                let conn = self
                    .conn
                    .take()
                    .ok_or_else(|| NdtError::ProtocolViolation("c2s never prepared".into()))?;
                let (done_tx, done_rx) = oneshot::channel();
                self.outcome = Some(done_rx);
                self.sender = Some(tokio::spawn(send_loop(
                    conn,
                    self.window,
                    done_tx,
                    cx.fault_tx.clone(),
                )));
                self.state = C2sState::WaitMsg;
                Ok(Status::Continue)
            }
            (C2sState::WaitMsg, MessageType::TestMsg) => {
                let server_rate = frame.control_text()?;
                debug!(server_rate = %server_rate, "c2s server-side rate");
                self.state = C2sState::WaitFinalize;
                Ok(Status::Continue)
            }
            (C2sState::WaitFinalize, MessageType::TestFinalize) => {
                let outcome = self
                    .outcome
                    .take()
                    .ok_or_else(|| NdtError::ProtocolViolation("c2s never started".into()))?;
                let (sent, elapsed) = outcome.await.map_err(|_| NdtError::ConnectionClosed)?;
                let rate = throughput::rate_kbps(sent, elapsed.as_secs_f64());
                debug!(rate_kbps = rate, sent, "c2s rate");
                cx.summary.upload_kbps = Some(rate);
                cx.handler.on_change(StateToken::FinishedC2s);
                Ok(Status::Done)
            }
            (state, kind) => Err(NdtError::ProtocolViolation(format!(
                "c2s: unexpected {kind:?} in state {state:?}"
            ))),
        }
    }
}

impl Drop for C2sTest {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            sender.abort();
        }
    }
}

/// Push the fill buffer until the window closes. Each send awaits the
/// transport's flush, so the loop stays cooperative and never queues a
/// chunk before the previous one has drained.
async fn send_loop(
    mut conn: WsStream,
    window: Duration,
    done: oneshot::Sender<(u64, Duration)>,
    fault_tx: mpsc::Sender<NdtError>,
) {
    let chunk = Bytes::from(fill_pattern(params::UPLOAD_CHUNK_SIZE));
    let start = Instant::now();
    let mut sent: u64 = 0;
    while start.elapsed() < window {
        if let Err(e) = conn.send(Message::Binary(chunk.clone())).await {
            let _ = fault_tx.send(e.into()).await;
            break;
        }
        sent += chunk.len() as u64;
    }
    let _ = done.send((sent, start.elapsed()));
}

/// Deterministic printable-ASCII fill: `32 + (i * 101) % 94`. The prime
/// stride gives a 94-byte repeat cycle instead of a constant run.
fn fill_pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| 32 + ((i * 101) % 94) as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_is_printable_ascii() {
        let buf = fill_pattern(params::UPLOAD_CHUNK_SIZE);
        assert_eq!(buf.len(), 8188);
        assert!(buf.iter().all(|&b| (32..126).contains(&b)));
    }

    #[test]
    fn fill_pattern_values() {
        let buf = fill_pattern(200);
        assert_eq!(buf[0], 32);
        assert_eq!(buf[1], 32 + 7);
        // 101 is coprime to 94, so the cycle length is exactly 94.
        assert_eq!(buf[94], buf[0]);
        assert_ne!(&buf[..93], &buf[1..94]);
    }
}

//! Metadata (Meta) sub-test.
//!
//! No data connection: the client pushes a few `key:value` facts about
//! itself over the control channel, then an empty TEST_MSG to say it is
//! done.

use futures_util::SinkExt;
use tokio_tungstenite::tungstenite::Message;

use crate::client::{EngineCx, Status};
use crate::error::{NdtError, Result};
use crate::event::StateToken;
use crate::message::{self, Frame, MessageType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetaState {
    WaitPrepare,
    WaitStart,
    WaitFinalize,
}

pub(crate) struct MetaTest {
    state: MetaState,
}

impl MetaTest {
    pub(crate) fn new() -> MetaTest {
        MetaTest {
            state: MetaState::WaitPrepare,
        }
    }

    pub(crate) async fn handle(&mut self, frame: &Frame, cx: &mut EngineCx<'_>) -> Result<Status> {
        match (self.state, frame.kind) {
            (MetaState::WaitPrepare, MessageType::TestPrepare) => {
                cx.handler.on_change(StateToken::PreparingMeta);
                self.state = MetaState::WaitStart;
                Ok(Status::Continue)
            }
            (MetaState::WaitStart, MessageType::TestStart) => {
                cx.handler.on_change(StateToken::PreparingMeta);
                let os = format!("client.os.name:{}", std::env::consts::OS);
                cx.sink
                    .send(Message::Binary(message::encode(MessageType::TestMsg, &os)?))
                    .await?;
                // Empty TEST_MSG terminates the metadata exchange.
                cx.sink
                    .send(Message::Binary(message::encode(MessageType::TestMsg, "")?))
                    .await?;
                self.state = MetaState::WaitFinalize;
                Ok(Status::Continue)
            }
            (MetaState::WaitFinalize, MessageType::TestFinalize) => {
                cx.handler.on_change(StateToken::FinishedMeta);
                Ok(Status::Done)
            }
            (state, kind) => Err(NdtError::ProtocolViolation(format!(
                "meta: unexpected {kind:?} in state {state:?}"
            ))),
        }
    }
}

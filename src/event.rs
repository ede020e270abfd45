//! Session lifecycle notifications.
//!
//! The protocol engine reports progress through an [`EventHandler`]. The
//! callbacks are strictly one-way: nothing a handler does can influence
//! protocol decisions, and every method has a no-op default so callers
//! only implement what they care about.

use std::fmt;

use serde::Serialize;

/// The canonical state tokens passed to [`EventHandler::on_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateToken {
    /// Download test is opening its data connection.
    PreparingS2c,
    /// Download test is receiving data.
    RunningS2c,
    /// Download test finished.
    FinishedS2c,
    /// Upload test is opening its data connection.
    PreparingC2s,
    /// Upload test is sending data.
    RunningC2s,
    /// Upload test finished.
    FinishedC2s,
    /// Metadata test is in progress.
    PreparingMeta,
    /// Metadata test finished.
    FinishedMeta,
    /// Every scheduled test finished and the server logged the client out.
    FinishedAll,
}

impl StateToken {
    /// The token's wire-style snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StateToken::PreparingS2c => "preparing_s2c",
            StateToken::RunningS2c => "running_s2c",
            StateToken::FinishedS2c => "finished_s2c",
            StateToken::PreparingC2s => "preparing_c2s",
            StateToken::RunningC2s => "running_c2s",
            StateToken::FinishedC2s => "finished_c2s",
            StateToken::PreparingMeta => "preparing_meta",
            StateToken::FinishedMeta => "finished_meta",
            StateToken::FinishedAll => "finished_all",
        }
    }
}

impl fmt::Display for StateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callbacks for NDT session lifecycle events.
pub trait EventHandler: Send {
    /// Called once the control connection is open, before login.
    fn on_start(&mut self, _site: &str) {}
    /// Called on every sub-test state transition.
    fn on_change(&mut self, _state: StateToken) {}
    /// Called exactly once, after the server logs the client out.
    fn on_completion(&mut self) {}
    /// Called exactly once if the session dies; no further callbacks follow.
    fn on_error(&mut self, _message: &str) {}
}

/// An [`EventHandler`] that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

impl EventHandler for NullHandler {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_serialize_as_snake_case() {
        for token in [
            StateToken::PreparingS2c,
            StateToken::FinishedC2s,
            StateToken::FinishedAll,
        ] {
            let json = serde_json::to_string(&token).unwrap();
            assert_eq!(json, format!("\"{}\"", token.as_str()));
        }
    }

    #[test]
    fn display_matches_wire_name() {
        assert_eq!(StateToken::RunningS2c.to_string(), "running_s2c");
        assert_eq!(StateToken::PreparingMeta.to_string(), "preparing_meta");
    }
}

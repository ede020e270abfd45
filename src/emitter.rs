//! Output formatting for session events.
//!
//! The [`Emitter`] trait extends [`EventHandler`] with a final summary.
//! Two implementations are provided:
//! - [`HumanReadableEmitter`] — progress lines and a formatted summary on a terminal.
//! - [`JsonEmitter`] — one JSON object per line, suitable for machine consumption.

use std::io::Write;

use serde::Serialize;
use tracing::warn;

use crate::event::{EventHandler, StateToken};
use crate::summary::Summary;

#[derive(Serialize)]
#[serde(tag = "type")]
enum Event<'a> {
    Started { site: &'a str },
    State { state: StateToken },
    Completed,
    Error { error: &'a str },
    Summary { summary: &'a Summary },
}

/// An [`EventHandler`] that also renders the session summary.
pub trait Emitter: EventHandler {
    /// Called once after a successful run, with the measured results.
    fn on_summary(&mut self, summary: &Summary);
}

/// Emits human-readable progress and results to a writer.
pub struct HumanReadableEmitter<W: Write> {
    out: W,
}

impl<W: Write + Send> HumanReadableEmitter<W> {
    /// Create a new emitter writing to `out`.
    pub fn new(out: W) -> Self {
        HumanReadableEmitter { out }
    }
}

impl<W: Write + Send> EventHandler for HumanReadableEmitter<W> {
    fn on_start(&mut self, site: &str) {
        let _ = writeln!(self.out, "connected to {site}");
    }

    fn on_change(&mut self, state: StateToken) {
        let _ = writeln!(self.out, "{state}");
    }

    fn on_completion(&mut self) {
        let _ = writeln!(self.out, "all tests finished");
    }

    fn on_error(&mut self, message: &str) {
        let _ = writeln!(self.out, "test failed: {message}");
    }
}

impl<W: Write + Send> Emitter for HumanReadableEmitter<W> {
    fn on_summary(&mut self, s: &Summary) {
        let _ = writeln!(self.out, "\nTest results\n");
        let _ = writeln!(self.out, "{:>10}: {}", "Server", s.server);

        if let Some(dl) = s.download_kbps {
            let _ = writeln!(
                self.out,
                "{:>10}: {:>7.1} Mbit/s",
                "Download",
                dl / 1000.0
            );
        }
        if let Some(ul) = s.upload_kbps {
            let _ = writeln!(self.out, "{:>10}: {:>7.1} Mbit/s", "Upload", ul / 1000.0);
        }
        for (name, value) in &s.reported_vars {
            let _ = writeln!(self.out, "{:>10}: {}", name, value);
        }
    }
}

/// Emits one JSON object per line for each event.
pub struct JsonEmitter<W: Write> {
    out: W,
}

impl<W: Write + Send> JsonEmitter<W> {
    /// Create a new JSON emitter writing to `out`.
    pub fn new(out: W) -> Self {
        JsonEmitter { out }
    }

    fn emit(&mut self, event: &Event) {
        match serde_json::to_string(event) {
            Ok(json) => {
                let _ = writeln!(self.out, "{}", json);
            }
            Err(e) => warn!(error = %e, "dropping unserializable event"),
        }
    }
}

impl<W: Write + Send> EventHandler for JsonEmitter<W> {
    fn on_start(&mut self, site: &str) {
        self.emit(&Event::Started { site });
    }

    fn on_change(&mut self, state: StateToken) {
        self.emit(&Event::State { state });
    }

    fn on_completion(&mut self) {
        self.emit(&Event::Completed);
    }

    fn on_error(&mut self, message: &str) {
        self.emit(&Event::Error { error: message });
    }
}

impl<W: Write + Send> Emitter for JsonEmitter<W> {
    fn on_summary(&mut self, summary: &Summary) {
        self.emit(&Event::Summary { summary });
    }
}

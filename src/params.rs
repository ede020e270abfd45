//! Protocol constants and tuning parameters.

use std::time::Duration;

/// WebSocket subprotocol of the control connection.
pub const PROTO_CONTROL: &str = "ndt";

/// WebSocket subprotocol of the download (server-to-client) data connection.
pub const PROTO_S2C: &str = "s2c";

/// WebSocket subprotocol of the upload (client-to-server) data connection.
pub const PROTO_C2S: &str = "c2s";

/// Default control port of an NDT server speaking the WebSocket transport.
pub const DEFAULT_CONTROL_PORT: u16 = 3001;

/// Default URL path of the NDT endpoint.
pub const DEFAULT_PATH: &str = "/ndt_protocol";

/// Test-selection bit for the upload (C2S) test.
pub const TEST_C2S: u8 = 2;

/// Test-selection bit for the download (S2C) test.
pub const TEST_S2C: u8 = 4;

/// Test-selection bit for status updates. Always set by this client so the
/// server knows it may send SRV_QUEUE updates.
pub const TEST_STATUS: u8 = 16;

/// Test-selection bit for the metadata test.
pub const TEST_META: u8 = 32;

/// SRV_QUEUE body the server uses as a keepalive; answered with MSG_WAITING.
pub const QUEUE_KEEPALIVE: &str = "9990";

/// SRV_QUEUE body meaning the server gave up on the session.
pub const QUEUE_REJECTED: &str = "9977";

/// Duration of the upload test's send window.
pub const UPLOAD_WINDOW: Duration = Duration::from_secs(10);

/// Size of the upload test's send buffer.
pub const UPLOAD_CHUNK_SIZE: usize = 8192 - 4;

/// Server-reported performance counters captured from the download test's
/// trailing TEST_MSG frames.
pub const TRACKED_VARS: &[&str] = &["MinRTT"];

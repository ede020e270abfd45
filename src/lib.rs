//! A client for the legacy [NDT](https://code.google.com/p/ndt/wiki/NDTProtocol)
//! network-measurement protocol over its WebSocket transport.
//!
//! NDT measures download and upload throughput against a measurement
//! server. One persistent control connection carries a binary-framed
//! handshake and per-test coordination; each throughput test opens its
//! own short-lived data connection. The server decides which sub-tests
//! run and in what order; the client reports the rates it measured and
//! collects server-side counters such as the minimum round-trip time.
//!
//! # Quick start
//!
//! ```no_run
//! use ndt_ws_client::client::ClientBuilder;
//! use ndt_ws_client::event::NullHandler;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ClientBuilder::new("ndt.example.net").build();
//! let summary = client.run(&mut NullHandler).await?;
//! println!("download: {:?} kbit/s", summary.download_kbps);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod emitter;
pub mod error;
pub mod event;
pub mod message;
pub mod params;
pub mod summary;
pub mod throughput;

mod download;
mod meta;
mod upload;

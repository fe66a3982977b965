//! Async Rust client for the Signal K REST API.
//!
//! Wire-level concerns only: URL construction, envelope parsing, and the
//! error taxonomy. The typed value cache and synchronization logic live in
//! `tidewatch-core`.

pub mod client;
pub mod envelope;
pub mod error;
pub mod transport;

pub use client::RestClient;
pub use envelope::{
    BatchResponse, PathSpec, RequestState, SourceValue, ValueEnvelope, WriteAck, parse_timestamp,
};
pub use error::Error;
pub use transport::{TlsMode, TransportConfig};

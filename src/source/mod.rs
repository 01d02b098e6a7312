//! Reading sources
//!
//! A source produces the raw body of one reading. The HTTP source polls the
//! device's web endpoint; the scripted source replays canned responses
//! in-process so the render loop can be tested without a server.

pub mod http;
pub mod scripted;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpSource;
pub use scripted::{ScriptedResponse, ScriptedSource};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error! Status: {0}")]
    Status(u16),

    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Something that can be asked for the current reading.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// Fetch the body of the current reading. A non-success status is an
    /// error; the body is returned unparsed.
    async fn fetch(&self) -> Result<Vec<u8>, SourceError>;

    /// Human-readable location of the source, for log lines.
    fn describe(&self) -> String;
}

//! Render targets
//!
//! A render target is whatever surface the widget writes text into: a set of
//! elements addressed by id. The host owns the elements; the widget only ever
//! overwrites their text and never creates them.

pub mod memory;
pub mod terminal;

use thiserror::Error;

pub use memory::ElementMap;
pub use terminal::TerminalTarget;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TargetError {
    #[error("Element `{0}` does not exist on the render target")]
    MissingElement(String),

    #[error("Write to element `{id}` failed: {reason}")]
    WriteFailed { id: String, reason: String },
}

/// A surface holding text elements addressed by id.
///
/// Implementations synchronize internally so a target can be shared between
/// overlapping render cycles.
pub trait RenderTarget: Send + Sync {
    /// Whether the host provides an element with this id.
    fn has_element(&self, id: &str) -> bool;

    /// Replace the text content of an element.
    fn set_text(&self, id: &str, text: &str) -> Result<(), TargetError>;
}

use thiserror::Error;

use crate::reading::DecodeError;
use crate::source::SourceError;
use crate::target::TargetError;

/// Why a render cycle produced no update.
///
/// Every variant aborts only the current cycle; the poller keeps ticking.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WidgetError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] SourceError),

    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Render failed: {0}")]
    Render(#[from] TargetError),
}

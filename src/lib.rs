// vitalpoll - periodic vital-signs reading renderer

pub mod config;
pub mod error;
pub mod reading;
pub mod render;
pub mod source;
pub mod target;
pub mod widget;

pub use config::{ConfigError, ElementIds, WidgetConfig};
pub use error::WidgetError;
pub use reading::{DecodeError, DefaultingPolicy, Reading};
pub use render::{ConnectionStatus, Formatting, RenderedReading};
pub use source::{HttpSource, ReadingSource, SourceError};
pub use target::{ElementMap, RenderTarget, TargetError, TerminalTarget};
pub use widget::{CycleReport, PollerHandle, Widget};

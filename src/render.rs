//! render.rs
//!
//! Turns a decoded `Reading` into element text and writes it to a target.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::WidgetConfig;
use crate::reading::Reading;
use crate::target::{RenderTarget, TargetError};

/// How sensor values are turned into text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Formatting {
    /// `72`, `98`, `36.6`
    Raw,
    /// `72 bpm`, `98 %`, `36.60 °C`
    UnitSuffixed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

impl ConnectionStatus {
    /// Connected iff the reading carries a timestamp strictly younger than
    /// `window` at `now_secs`.
    pub fn evaluate(last_ts: Option<f64>, now_secs: f64, window: Duration) -> Self {
        match last_ts {
            Some(ts) if now_secs - ts < window.as_secs_f64() => ConnectionStatus::Connected,
            _ => ConnectionStatus::Disconnected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Disconnected => "Disconnected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The text written by one successful render.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderedReading {
    pub heart_rate: String,
    pub spo2: String,
    pub temperature: String,
    /// `None` when the flag is disabled or the host has no status element.
    pub connection: Option<ConnectionStatus>,
}

impl RenderedReading {
    pub fn format(
        reading: &Reading,
        formatting: Formatting,
        connection: Option<ConnectionStatus>,
    ) -> Self {
        let heart_rate = format_number(reading.heart_rate);
        let spo2 = format_number(reading.spo2);

        match formatting {
            Formatting::Raw => Self {
                heart_rate,
                spo2,
                temperature: format_number(reading.temperature),
                connection,
            },
            Formatting::UnitSuffixed => Self {
                heart_rate: format!("{} bpm", heart_rate),
                spo2: format!("{} %", spo2),
                temperature: format!("{} °C", format_fixed_2(reading.temperature)),
                connection,
            },
        }
    }
}

/// Shortest decimal text for a number: `72` rather than `72.0`.
pub fn format_number(value: f64) -> String {
    // -0.0 would otherwise print as "-0"
    if value == 0.0 {
        return "0".to_string();
    }
    value.to_string()
}

/// Two-decimal text with ties rounded away from zero (`36.125` -> `36.13`).
///
/// `{:.2}` alone rounds exact ties to even. Only multiples of 1/8 can sit
/// exactly on a hundredths tie, so those are nudged before formatting.
pub fn format_fixed_2(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let magnitude = value.abs();
    let hundredths = magnitude * 100.0;
    let magnitude = if (magnitude * 8.0).fract() == 0.0 && hundredths.fract() == 0.5 {
        hundredths.ceil() / 100.0
    } else {
        magnitude
    };
    format!("{}{:.2}", sign, magnitude)
}

/// Write `reading` into `target` according to `config`.
///
/// All required elements are checked before the first write, so a host
/// missing one of them sees no partial update.
pub fn render(
    reading: &Reading,
    config: &WidgetConfig,
    now_secs: f64,
    target: &dyn RenderTarget,
) -> Result<RenderedReading, TargetError> {
    let ids = &config.elements;
    if let Some(missing) = ids.required().into_iter().find(|id| !target.has_element(id)) {
        return Err(TargetError::MissingElement(missing.to_string()));
    }

    let connection = (config.show_connection_status
        && target.has_element(&ids.connection_status))
    .then(|| ConnectionStatus::evaluate(reading.last_ts, now_secs, config.freshness_window));

    let rendered = RenderedReading::format(reading, config.formatting, connection);

    target.set_text(&ids.heart_rate, &rendered.heart_rate)?;
    target.set_text(&ids.spo2, &rendered.spo2)?;
    target.set_text(&ids.temperature, &rendered.temperature)?;
    if let Some(status) = rendered.connection {
        target.set_text(&ids.connection_status, status.as_str())?;
    }
    Ok(rendered)
}

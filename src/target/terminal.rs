//! Terminal render target used by the CLI host.
//!
//! Keeps the latest text of each element and prints a status line to the
//! wrapped writer every time an element changes.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Mutex;

use super::{RenderTarget, TargetError};

pub struct TerminalTarget {
    /// Element id -> (label, current text). Ordered so output is stable.
    elements: Mutex<BTreeMap<String, (String, String)>>,
    out: Mutex<Box<dyn Write + Send>>,
}

impl TerminalTarget {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            elements: Mutex::new(BTreeMap::new()),
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Register an element with the label printed next to its value.
    pub fn with_element(self, id: impl Into<String>, label: impl Into<String>) -> Self {
        if let Ok(mut elements) = self.elements.lock() {
            elements.insert(id.into(), (label.into(), String::new()));
        }
        self
    }
}

impl RenderTarget for TerminalTarget {
    fn has_element(&self, id: &str) -> bool {
        self.elements
            .lock()
            .map(|elements| elements.contains_key(id))
            .unwrap_or(false)
    }

    fn set_text(&self, id: &str, text: &str) -> Result<(), TargetError> {
        let write_failed = |reason: String| TargetError::WriteFailed {
            id: id.to_string(),
            reason,
        };

        let mut elements = self.elements.lock().map_err(|e| write_failed(e.to_string()))?;
        let (label, current) = elements
            .get_mut(id)
            .ok_or_else(|| TargetError::MissingElement(id.to_string()))?;
        *current = text.to_string();

        let mut out = self.out.lock().map_err(|e| write_failed(e.to_string()))?;
        writeln!(out, "{:>18}: {}", label, text).map_err(|e| write_failed(e.to_string()))?;
        out.flush().map_err(|e| write_failed(e.to_string()))
    }
}

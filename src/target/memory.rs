//! In-memory element map, the headless stand-in for a page's elements.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::{RenderTarget, TargetError};

/// A fixed set of elements whose text can be read back.
pub struct ElementMap {
    elements: Mutex<HashMap<String, String>>,
    writes: AtomicU64,
}

impl ElementMap {
    /// Create a map providing the given element ids, all with empty text.
    pub fn with_elements<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let elements = ids.into_iter().map(|id| (id.into(), String::new())).collect();
        Self {
            elements: Mutex::new(elements),
            writes: AtomicU64::new(0),
        }
    }

    /// Current text of an element, `None` if the element does not exist.
    pub fn text(&self, id: &str) -> Option<String> {
        self.elements.lock().ok()?.get(id).cloned()
    }

    /// Total number of successful `set_text` calls.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.elements
            .lock()
            .map(|elements| elements.clone())
            .unwrap_or_default()
    }
}

impl RenderTarget for ElementMap {
    fn has_element(&self, id: &str) -> bool {
        self.elements
            .lock()
            .map(|elements| elements.contains_key(id))
            .unwrap_or(false)
    }

    fn set_text(&self, id: &str, text: &str) -> Result<(), TargetError> {
        let mut elements = self.elements.lock().map_err(|e| TargetError::WriteFailed {
            id: id.to_string(),
            reason: e.to_string(),
        })?;
        let slot = elements
            .get_mut(id)
            .ok_or_else(|| TargetError::MissingElement(id.to_string()))?;
        slot.clear();
        slot.push_str(text);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

//! In-process scripted source
//!
//! Replays a queue of canned responses, each optionally delayed. Delays use
//! tokio time, so paused clocks advance instantly in tests. Once the queue
//! is drained the last response keeps being served.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ReadingSource, SourceError};

#[derive(Clone, Debug)]
pub enum ScriptedResponse {
    /// 200 with this body.
    Body(Vec<u8>),
    /// A non-success status code.
    Status(u16),
    /// The request never produced a response.
    NetworkFailure(String),
}

impl ScriptedResponse {
    pub fn json(value: &serde_json::Value) -> Self {
        ScriptedResponse::Body(value.to_string().into_bytes())
    }

    fn resolve(self) -> Result<Vec<u8>, SourceError> {
        match self {
            ScriptedResponse::Body(body) => Ok(body),
            ScriptedResponse::Status(code) => Err(SourceError::Status(code)),
            ScriptedResponse::NetworkFailure(reason) => Err(SourceError::Network(reason)),
        }
    }
}

pub struct ScriptedSource {
    script: Mutex<VecDeque<(Duration, ScriptedResponse)>>,
    last: Mutex<Option<ScriptedResponse>>,
    fetches: AtomicU64,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            fetches: AtomicU64::new(0),
        }
    }

    /// Queue a response served without delay.
    pub fn then(self, response: ScriptedResponse) -> Self {
        self.then_after(Duration::ZERO, response)
    }

    /// Queue a response that resolves `delay` after the fetch starts.
    pub fn then_after(mut self, delay: Duration, response: ScriptedResponse) -> Self {
        self.script.get_mut().push_back((delay, response));
        self
    }

    /// Number of fetches started so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadingSource for ScriptedSource {
    async fn fetch(&self) -> Result<Vec<u8>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let next = self.script.lock().await.pop_front();
        let (delay, response) = match next {
            Some((delay, response)) => {
                *self.last.lock().await = Some(response.clone());
                (delay, response)
            }
            None => match self.last.lock().await.clone() {
                Some(response) => (Duration::ZERO, response),
                None => {
                    return Err(SourceError::Network("scripted source is empty".into()));
                }
            },
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        response.resolve()
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

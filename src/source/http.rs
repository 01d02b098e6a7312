//! HTTP polling source backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};

use super::{ReadingSource, SourceError};

pub struct HttpSource {
    client: Client,
    url: Url,
}

impl HttpSource {
    /// Build a source for `base_url` joined with `path` (e.g. `/get_data`).
    ///
    /// No request timeout is applied unless `timeout` is given; a slow
    /// response simply overlaps the next tick.
    pub fn new(base_url: &str, path: &str, timeout: Option<Duration>) -> Result<Self, SourceError> {
        let base = Url::parse(base_url)
            .map_err(|e| SourceError::InvalidEndpoint(format!("{}: {}", base_url, e)))?;
        let url = base
            .join(path)
            .map_err(|e| SourceError::InvalidEndpoint(format!("{}: {}", path, e)))?;

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ReadingSource for HttpSource {
    async fn fetch(&self) -> Result<Vec<u8>, SourceError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::Body(e.to_string()))?;
        Ok(body.to_vec())
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{
    header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE},
    Client,
};

use super::{GitRequest, Transport, UPLOAD_PACK_REQUEST_TYPE, UPLOAD_PACK_RESULT_TYPE};
use crate::config::FetchConfig;

/// Smart-HTTP transport over reqwest.
///
/// The client is cheaply cloneable and reuses connections across the
/// requests of one clone.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    client: Client,
}

impl HttpTransport {
    /// Create a transport for the repository at `base_url`
    /// (e.g. `https://github.com/owner/repo.git`).
    pub fn new(base_url: &str, config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn info_refs_url(&self) -> String {
        format!("{}/info/refs?service=git-upload-pack", self.base_url)
    }

    pub fn upload_pack_url(&self) -> String {
        format!("{}/git-upload-pack", self.base_url)
    }
}

impl Transport for HttpTransport {
    async fn request(&self, request: GitRequest) -> Result<Vec<u8>> {
        let (url, builder) = match request {
            GitRequest::InfoRefs => {
                let url = self.info_refs_url();
                let builder = self.client.get(&url);
                (url, builder)
            }
            GitRequest::UploadPack { body } => {
                let url = self.upload_pack_url();
                let builder = self
                    .client
                    .post(&url)
                    .header(CONTENT_TYPE, UPLOAD_PACK_REQUEST_TYPE)
                    .header(ACCEPT, UPLOAD_PACK_RESULT_TYPE)
                    .header(CONTENT_LENGTH, body.len())
                    .body(body);
                (url, builder)
            }
        };

        tracing::debug!("requesting {}", url);
        let response = builder
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?
            .error_for_status()
            .with_context(|| format!("Request to {} failed", url))?;

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;
        tracing::debug!("received {} bytes from {}", bytes.len(), url);

        Ok(bytes.to_vec())
    }
}

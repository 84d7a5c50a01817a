//! HTTP(S) URI handler
//!
//! Downloads are streamed chunk by chunk into a temporary file and renamed
//! into place once the body is complete. Uploads send the whole file in a
//! single PUT request.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{redirect, Client};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use crate::app::transfer::CancelFlag;
use crate::app::uri;
use crate::constants::http;
use crate::errors::{TransferError, TransferResult};

use super::handler::{commit_temp_file, temp_path_for, ProgressReporter, UriHandler};

/// Handler for `http://` and `https://` URIs
#[derive(Debug, Clone)]
pub struct HttpUriHandler {
    client: Client,
}

impl HttpUriHandler {
    /// Build a handler with its own connection pool
    pub fn new() -> TransferResult<Self> {
        let client = Client::builder()
            .user_agent(http::USER_AGENT)
            .connect_timeout(http::CONNECT_TIMEOUT)
            .redirect(redirect::Policy::limited(http::MAX_REDIRECTS))
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn parse_url(uri: &str) -> TransferResult<Url> {
        Url::parse(uri).map_err(|e| TransferError::InvalidUri {
            uri: uri.to_string(),
            error: e.to_string(),
        })
    }

    fn check_status(response: &reqwest::Response, uri: &str) -> TransferResult<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(TransferError::SourceNotFound {
                source_uri: uri.to_string(),
            });
        }
        Err(TransferError::ServerError {
            status: status.as_u16(),
        })
    }

    async fn stream_to_file(
        response: reqwest::Response,
        temp_path: &Path,
        progress: &mut ProgressReporter,
        cancel: &CancelFlag,
    ) -> TransferResult<u64> {
        let total = response.content_length();
        let mut file = File::create(temp_path).await?;
        let mut stream = response.bytes_stream();
        let mut received = 0u64;

        progress.report(0, total);
        while let Some(chunk) = stream.next().await {
            if cancel.is_set() {
                return Err(TransferError::Cancelled);
            }
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;
            progress.report(received, total);
        }
        file.flush().await?;
        progress.report(received, Some(received));
        Ok(received)
    }
}

#[async_trait]
impl UriHandler for HttpUriHandler {
    fn name(&self) -> &'static str {
        "http"
    }

    fn can_handle(&self, uri: &str) -> bool {
        matches!(uri::scheme(uri), Some("http") | Some("https"))
    }

    async fn stage_file_read(
        &self,
        source_uri: &str,
        destination: &Path,
        progress: &mut ProgressReporter,
        cancel: &CancelFlag,
    ) -> TransferResult<u64> {
        let url = Self::parse_url(source_uri)?;
        debug!("GET {}", url);

        let response = self.client.get(url).send().await?;
        Self::check_status(&response, source_uri)?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp_path = temp_path_for(destination, progress.transfer_id());

        match Self::stream_to_file(response, &temp_path, progress, cancel).await {
            Ok(received) => {
                commit_temp_file(&temp_path, destination).await?;
                info!("Downloaded {} ({} bytes)", destination.display(), received);
                Ok(received)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                Err(e)
            }
        }
    }

    async fn stage_file_write(
        &self,
        source: &Path,
        destination_uri: &str,
        progress: &mut ProgressReporter,
        cancel: &CancelFlag,
    ) -> TransferResult<u64> {
        let url = Self::parse_url(destination_uri)?;
        let body = tokio::fs::read(source)
            .await
            .map_err(|_| TransferError::SourceNotFound {
                source_uri: source.display().to_string(),
            })?;
        let total = body.len() as u64;

        if cancel.is_set() {
            return Err(TransferError::Cancelled);
        }
        progress.report(0, Some(total));
        debug!("PUT {} ({} bytes)", url, total);

        let response = self.client.put(url).body(body).send().await?;
        Self::check_status(&response, destination_uri)?;

        progress.report(total, Some(total));
        info!("Uploaded {} to {}", source.display(), destination_uri);
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_http_handler_schemes() {
        let handler = HttpUriHandler::new().unwrap();
        assert!(handler.can_handle("http://host/a.nrrd"));
        assert!(handler.can_handle("https://host/a.nrrd"));
        assert!(!handler.can_handle("ftp://host/a.nrrd"));
        assert!(!handler.can_handle("file:///tmp/a.nrrd"));
        assert!(!handler.can_handle("/tmp/a.nrrd"));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_any_request() {
        let handler = HttpUriHandler::new().unwrap();
        let (tx, _rx) = mpsc::channel(4);
        let mut progress = ProgressReporter::new(1, tx);

        let result = handler
            .stage_file_read(
                "http://",
                Path::new("/tmp/never-written"),
                &mut progress,
                &CancelFlag::new(),
            )
            .await;
        assert!(matches!(result, Err(TransferError::InvalidUri { .. })));
    }
}

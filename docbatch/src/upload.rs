#![doc = "HTTP upload client: one multipart POST per attempt against the document repository."]
//
//! [`HttpUploadClient`] implements [`UploadClient`] for the real repository.
//! Each call sends a `metadata` part (`{"properties": {...}}`) and a `content`
//! part with the file bytes. 200 and 201 are acceptance; any other status, a
//! transport error or a timeout is returned as an [`UploadFailure`]. Retrying
//! is the caller's job.
//!
//! The underlying `reqwest::Client` keeps a connection pool and is shared by
//! every worker.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use docbatch_core::contract::{UploadClient, UploadReceipt};
use docbatch_core::error::UploadFailure;
use docbatch_core::metadata::MetadataRecord;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};

use crate::load_config::{credentials_from_env, Credentials, UploadSection};

pub struct HttpUploadClient {
    http: reqwest::Client,
    endpoint: String,
    credentials: Credentials,
}

impl HttpUploadClient {
    pub fn new(endpoint: impl Into<String>, credentials: Credentials, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let endpoint = endpoint.into();
        tracing::info!(
            endpoint = %endpoint,
            username = %credentials.username,
            timeout_secs = timeout.as_secs(),
            "Initialized upload client"
        );
        Ok(Self {
            http,
            endpoint,
            credentials,
        })
    }

    /// Endpoint and timeout from config, credentials from the environment.
    pub fn from_config(section: &UploadSection) -> Result<Self> {
        Self::new(
            section.endpoint.clone(),
            credentials_from_env()?,
            Duration::from_secs(section.timeout_secs),
        )
    }
}

#[async_trait]
impl UploadClient for HttpUploadClient {
    async fn upload(
        &self,
        document: &Path,
        record: &MetadataRecord,
    ) -> Result<UploadReceipt, UploadFailure> {
        let bytes = tokio::fs::read(document)
            .await
            .map_err(|e| UploadFailure::Io(e.to_string()))?;
        let file_name = document
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let content_hash = {
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            format!("{:x}", hasher.finalize())
        };
        tracing::debug!(
            document = %file_name,
            size = bytes.len(),
            content_hash = %content_hash,
            "Uploading document"
        );

        let metadata = Part::text(record.to_properties_json().to_string())
            .mime_str("application/json")
            .map_err(transport_failure)?;
        let content = Part::bytes(bytes)
            .file_name(file_name.clone())
            .mime_str(content_type(document))
            .map_err(transport_failure)?;
        let form = Form::new().part("metadata", metadata).part("content", content);

        let response = self
            .http
            .post(&self.endpoint)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header(ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::CREATED {
            Ok(UploadReceipt {
                status: status.as_u16(),
            })
        } else {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(document = %file_name, status = status.as_u16(), body = %body, "Upload rejected");
            Err(UploadFailure::Status {
                code: status.as_u16(),
                body,
            })
        }
    }
}

fn transport_failure(e: reqwest::Error) -> UploadFailure {
    if e.is_timeout() {
        UploadFailure::Timeout
    } else {
        UploadFailure::Transport(e.to_string())
    }
}

/// Best-effort MIME type from the file extension.
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "tif" | "tiff" => "image/tiff",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

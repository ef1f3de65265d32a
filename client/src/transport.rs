use reqwest::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("URL parsing failed: {0}")]
    UrlError(#[from] url::ParseError),
    #[error("Network error: {0}")]
    Network(String),
}

impl TransportError {
    // Requests that never got an answer are reported as network errors.
    fn from_send(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            TransportError::Network(err.to_string())
        } else {
            TransportError::HttpError(err)
        }
    }
}

/// A reply as it came off the wire, before anything looks at the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub status_text: String,
    pub content_type: Option<String>,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub field: &'static str,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

pub trait Transport: Send + Sync {
    fn post_json<B>(
        &self,
        path: &str,
        body: &B,
    ) -> impl Future<Output = Result<HttpReply, TransportError>> + Send
    where
        B: Serialize + Sync;

    fn post_image(
        &self,
        path: &str,
        upload: ImageUpload,
    ) -> impl Future<Output = Result<HttpReply, TransportError>> + Send;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    http_client: HttpClient,
    base_url: Url,
}

impl ReqwestTransport {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, TransportError> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    async fn read_reply(response: reqwest::Response) -> Result<HttpReply, TransportError> {
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await?;

        Ok(HttpReply {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            content_type,
            body,
        })
    }
}

impl Transport for ReqwestTransport {
    async fn post_json<B>(&self, path: &str, body: &B) -> Result<HttpReply, TransportError>
    where
        B: Serialize + Sync,
    {
        let url = self.endpoint(path)?;
        log::debug!("POST {}", url);

        let response = self
            .http_client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(TransportError::from_send)?;
        Self::read_reply(response).await
    }

    async fn post_image(&self, path: &str, upload: ImageUpload) -> Result<HttpReply, TransportError> {
        let url = self.endpoint(path)?;
        log::debug!(
            "POST {} ({} bytes of {})",
            url,
            upload.bytes.len(),
            upload.mime_type
        );

        let part = Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.mime_type)?;
        let form = Form::new().part(upload.field, part);

        let response = self
            .http_client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(TransportError::from_send)?;
        Self::read_reply(response).await
    }
}

use async_trait::async_trait;
use reqwest::{multipart, Client, ClientBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

use crate::error::{ClientError, ClientResult};
use crate::settings::Settings;

/* ================= BACKEND API STRUCTURES ================= */

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    message: &'a str,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub response: String,
    // retrieval sources; shape varies per document so they stay untyped
    #[serde(default)]
    pub sources: Vec<Value>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReply {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub message: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContactReply {
    pub message: String,
}

/// A file chosen in the upload control, already read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Wire encoding of the "save to default knowledge base" checkbox.
pub fn save_flag(save_to_default: bool) -> &'static str {
    if save_to_default {
        "1"
    } else {
        "0"
    }
}

/// Fails any non-2xx status, then decodes the body as JSON.
pub fn decode_body<T: DeserializeOwned>(status: StatusCode, body: &str) -> ClientResult<T> {
    if !status.is_success() {
        return Err(ClientError::Status(status));
    }
    Ok(serde_json::from_str(body)?)
}

/// Runs `request` under an optional deadline. `None` waits forever.
pub async fn bounded<T, F>(timeout: Option<Duration>, request: F) -> ClientResult<T>
where
    F: Future<Output = ClientResult<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, request)
            .await
            .map_err(|_| ClientError::Timeout(limit))?,
        None => request.await,
    }
}

/* ================= BACKEND CONTRACT ================= */

/// The site's HTTP API as seen by a chat panel.
#[async_trait(?Send)]
pub trait ChatBackend {
    async fn chat(&self, message: &str) -> ClientResult<ChatReply>;

    async fn upload(&self, file: PickedFile, save_to_default: bool) -> ClientResult<UploadReply>;

    /// Any 2xx counts as success; the body is ignored.
    async fn clear_history(&self) -> ClientResult<()>;

    async fn contact(&self, form: &ContactForm) -> ClientResult<ContactReply>;
}

#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(settings: &Settings) -> ClientResult<Self> {
        Self::from_builder(Client::builder(), settings)
    }

    // the server keys chat history on its session cookie, so the jar lives as
    // long as this backend and is shared by every panel
    fn from_builder(builder: ClientBuilder, settings: &Settings) -> ClientResult<Self> {
        let client = builder.cookie_store(true).build()?;
        Ok(Self {
            client,
            base_url: settings.api_base_url.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
        let status = response.status();
        let body = response.text().await?;
        decode_body(status, &body)
    }
}

#[async_trait(?Send)]
impl ChatBackend for HttpBackend {
    async fn chat(&self, message: &str) -> ClientResult<ChatReply> {
        let response = self
            .client
            .post(self.endpoint("/api/chat"))
            .json(&ChatRequest { message })
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn upload(&self, file: PickedFile, save_to_default: bool) -> ClientResult<UploadReply> {
        let part = multipart::Part::bytes(file.bytes).file_name(file.name);
        let form = multipart::Form::new()
            .part("file", part)
            .text("save_to_default", save_flag(save_to_default));

        let response = self
            .client
            .post(self.endpoint("/api/upload"))
            .multipart(form)
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn clear_history(&self) -> ClientResult<()> {
        let response = self
            .client
            .post(self.endpoint("/api/clear-history"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status));
        }
        Ok(())
    }

    async fn contact(&self, form: &ContactForm) -> ClientResult<ContactReply> {
        let response = self
            .client
            .post(self.endpoint("/api/contact"))
            .json(form)
            .send()
            .await?;
        Self::read_json(response).await
    }
}

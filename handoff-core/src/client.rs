//! HTTP client for the relay API, used by terminal clients and the poller.

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::code;
use crate::models::{AppendRequest, ErrorBody, Message, NewSession, SenderType, SessionHandle};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        message: String,
        details: Option<String>,
        code: Option<String>,
    },
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HandoffClient {
    client: Client,
    base_url: String,
}

impl HandoffClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /session`
    pub async fn create_session(&self) -> Result<NewSession, ClientError> {
        let resp = self
            .client
            .post(format!("{}/session", self.base_url))
            .send()
            .await?;
        decode(resp).await
    }

    /// `GET /session?code=` — the code is normalized before it is sent.
    pub async fn resolve_session(&self, raw_code: &str) -> Result<SessionHandle, ClientError> {
        let resp = self
            .client
            .get(format!("{}/session", self.base_url))
            .query(&[("code", code::normalize(raw_code))])
            .send()
            .await?;
        decode(resp).await
    }

    /// `POST /messages`
    pub async fn send_message(
        &self,
        session_id: Uuid,
        content: &str,
        sender_type: SenderType,
    ) -> Result<Message, ClientError> {
        let body = AppendRequest {
            session_id: Some(session_id.to_string()),
            content: Some(content.to_string()),
            sender_type: Some(sender_type.as_str().to_string()),
        };
        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .json(&body)
            .send()
            .await?;
        decode(resp).await
    }

    /// `GET /messages?sessionId=`
    pub async fn list_messages(&self, session_id: Uuid) -> Result<Vec<Message>, ClientError> {
        let resp = self
            .client
            .get(format!("{}/messages", self.base_url))
            .query(&[("sessionId", session_id.to_string())])
            .send()
            .await?;
        decode(resp).await
    }

    /// `GET /health`
    pub async fn health(&self) -> Result<serde_json::Value, ClientError> {
        let resp = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json::<T>().await?);
    }

    let text = resp.text().await.unwrap_or_default();
    let body = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => body,
        Err(_) => ErrorBody::new(text),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        message: body.error,
        details: body.details,
        code: body.code,
    })
}

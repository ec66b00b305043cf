use lendflow_types::{NewMessage, NewSession, SessionDetail, SessionSummary, StoredMessage};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ClientError, Result};

/// HTTP client for the `/chat/sessions` endpoints
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    http_client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct TitleUpdate<'a> {
    title: &'a str,
}

#[derive(Serialize)]
struct LinkRequest<'a> {
    session_ids: &'a [String],
    customer_id: &'a str,
}

#[derive(serde::Deserialize)]
struct LinkResponse {
    linked: u64,
}

impl DirectoryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http_client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `/chat/sessions/{id}[/{tail}]` with the id escaped as one path segment
    fn session_url(&self, session_id: &str, tail: Option<&str>) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["chat", "sessions", session_id])
            .extend(tail);
        Ok(url)
    }

    pub async fn list_sessions(&self, customer_id: Option<&str>) -> Result<Vec<SessionSummary>> {
        let mut request = self.http_client.get(self.url("/chat/sessions"));
        if let Some(customer_id) = customer_id {
            request = request.query(&[("customer_id", customer_id)]);
        }
        decode(request.send().await?).await
    }

    /// Sessions an anonymous user created on this device
    pub async fn list_sessions_by_ids(
        &self,
        session_ids: &[String],
    ) -> Result<Vec<SessionSummary>> {
        if session_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = session_ids.join(",");
        let response = self
            .http_client
            .get(self.url("/chat/sessions"))
            .query(&[("ids", ids.as_str())])
            .send()
            .await?;
        decode(response).await
    }

    /// Full history; `None` when the server does not know the session
    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionDetail>> {
        let response = self
            .http_client
            .get(self.session_url(session_id, None)?)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(response).await.map(Some)
    }

    pub async fn create_session(&self, new_session: &NewSession) -> Result<SessionSummary> {
        let response = self
            .http_client
            .post(self.url("/chat/sessions"))
            .json(new_session)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn append_message(
        &self,
        session_id: &str,
        message: &NewMessage,
    ) -> Result<StoredMessage> {
        let response = self
            .http_client
            .post(self.session_url(session_id, Some("messages"))?)
            .json(message)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn update_title(&self, session_id: &str, title: &str) -> Result<()> {
        let response = self
            .http_client
            .patch(self.session_url(session_id, None)?)
            .json(&TitleUpdate { title })
            .send()
            .await?;
        ensure_success(response).await.map(|_| ())
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let response = self
            .http_client
            .delete(self.session_url(session_id, None)?)
            .send()
            .await?;
        ensure_success(response).await.map(|_| ())
    }

    /// Claim anonymous sessions for a verified customer
    pub async fn link_sessions(&self, session_ids: &[String], customer_id: &str) -> Result<u64> {
        let response = self
            .http_client
            .post(self.url("/chat/sessions/link"))
            .json(&LinkRequest {
                session_ids,
                customer_id,
            })
            .send()
            .await?;
        let body: LinkResponse = decode(response).await?;
        Ok(body.linked)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status { status, body })
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let response = ensure_success(response).await?;
    Ok(response.json::<T>().await?)
}

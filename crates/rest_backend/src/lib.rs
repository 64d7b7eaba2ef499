use async_trait::async_trait;
use chrono::Utc;
use client_core::{AccountService, MediaStore, ProfileStore};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared::{
    document::ProfileDocument,
    domain::{Identity, SessionInfo},
    error::{ErrorCode, RemoteError, RemoteResult},
};
use tokio::sync::watch;
use tracing::info;
use url::Url;

/// REST implementation of the account, profile, and media collaborator
/// contracts against a managed backend. One instance implements all
/// three traits; the API key rides every request as a query parameter.
pub struct RestBackend {
    http: Client,
    base_url: Url,
    api_key: String,
    sessions: watch::Sender<Option<SessionInfo>>,
}

impl RestBackend {
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            api_key: api_key.into(),
            sessions: watch::channel(None).0,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> RemoteResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|_| RemoteError::new(ErrorCode::Internal, "base url cannot hold paths"))?;
            parts.pop_if_empty();
            for segment in segments {
                for piece in segment.split('/') {
                    parts.push(piece);
                }
            }
        }
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }
}

fn transport(err: reqwest::Error) -> RemoteError {
    RemoteError::new(ErrorCode::Network, err.to_string())
}

async fn check(response: reqwest::Response) -> RemoteResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let code = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorCode::Unauthorized,
        StatusCode::NOT_FOUND => ErrorCode::NotFound,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ErrorCode::Validation,
        _ => ErrorCode::Internal,
    };
    let message = response
        .text()
        .await
        .ok()
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| format!("request failed with status {status}"));
    Err(RemoteError::new(code, message))
}

#[derive(Serialize)]
struct CredentialsRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    identity: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateNameRequest<'a> {
    display_name: &'a str,
}

#[derive(Serialize)]
struct UpdatePasswordRequest<'a> {
    password: &'a str,
}

#[derive(Serialize)]
struct PasswordResetRequest<'a> {
    email: &'a str,
}

#[derive(Deserialize)]
struct DownloadUrlResponse {
    url: String,
}

#[async_trait]
impl AccountService for RestBackend {
    async fn sign_in(&self, email: &str, password: &str) -> RemoteResult<()> {
        let url = self.endpoint(&["accounts", "sign_in"])?;
        let response = self
            .http
            .post(url)
            .json(&CredentialsRequest { email, password })
            .send()
            .await
            .map_err(transport)?;
        let account: AccountResponse = check(response)
            .await?
            .json()
            .await
            .map_err(transport)?;
        info!(identity = %account.identity, "signed in");
        let _ = self.sessions.send(Some(SessionInfo {
            identity: Identity::new(account.identity),
            display_name: account.display_name,
        }));
        Ok(())
    }

    async fn sign_up(&self, email: &str, password: &str) -> RemoteResult<Identity> {
        let url = self.endpoint(&["accounts", "sign_up"])?;
        let response = self
            .http
            .post(url)
            .json(&CredentialsRequest { email, password })
            .send()
            .await
            .map_err(transport)?;
        let account: AccountResponse = check(response)
            .await?
            .json()
            .await
            .map_err(transport)?;
        let identity = Identity::new(account.identity);
        let _ = self.sessions.send(Some(SessionInfo {
            identity: identity.clone(),
            display_name: account.display_name,
        }));
        Ok(identity)
    }

    async fn update_display_name(&self, name: &str) -> RemoteResult<()> {
        let url = self.endpoint(&["accounts", "update_name"])?;
        let response = self
            .http
            .post(url)
            .json(&UpdateNameRequest { display_name: name })
            .send()
            .await
            .map_err(transport)?;
        check(response).await?;
        let name = name.to_string();
        self.sessions.send_modify(|current| {
            if let Some(info) = current {
                info.display_name = Some(name);
            }
        });
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> RemoteResult<()> {
        let url = self.endpoint(&["accounts", "update_password"])?;
        let response = self
            .http
            .post(url)
            .json(&UpdatePasswordRequest {
                password: new_password,
            })
            .send()
            .await
            .map_err(transport)?;
        check(response).await.map(|_| ())
    }

    async fn send_password_reset(&self, email: &str) -> RemoteResult<()> {
        let url = self.endpoint(&["accounts", "password_reset"])?;
        let response = self
            .http
            .post(url)
            .json(&PasswordResetRequest { email })
            .send()
            .await
            .map_err(transport)?;
        check(response).await.map(|_| ())
    }

    // Sign-out is a local credential discard; the session listener is
    // told right away.
    async fn sign_out(&self) {
        let _ = self.sessions.send(None);
    }

    fn subscribe_sessions(&self) -> watch::Receiver<Option<SessionInfo>> {
        self.sessions.subscribe()
    }
}

#[async_trait]
impl ProfileStore for RestBackend {
    async fn get(&self, identity: &Identity) -> RemoteResult<Option<ProfileDocument>> {
        let url = self.endpoint(&["profiles", identity.as_str()])?;
        let response = self.http.get(url).send().await.map_err(transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let document: ProfileDocument = check(response)
            .await?
            .json()
            .await
            .map_err(transport)?;
        Ok(Some(document))
    }

    async fn set(&self, identity: &Identity, document: &ProfileDocument) -> RemoteResult<()> {
        let mut document = document.clone();
        document.updated_at = Some(Utc::now());
        let url = self.endpoint(&["profiles", identity.as_str()])?;
        let response = self
            .http
            .put(url)
            .json(&document)
            .send()
            .await
            .map_err(transport)?;
        check(response).await.map(|_| ())
    }

    async fn update_field(
        &self,
        identity: &Identity,
        field: &str,
        value: serde_json::Value,
    ) -> RemoteResult<()> {
        let url = self.endpoint(&["profiles", identity.as_str(), "fields", field])?;
        let response = self
            .http
            .patch(url)
            .json(&json!({ "value": value }))
            .send()
            .await
            .map_err(transport)?;
        check(response).await.map(|_| ())
    }
}

#[async_trait]
impl MediaStore for RestBackend {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> RemoteResult<()> {
        let url = self.endpoint(&["media", path])?;
        let response = self
            .http
            .post(url)
            .body(bytes)
            .send()
            .await
            .map_err(transport)?;
        check(response).await.map(|_| ())
    }

    async fn download_url(&self, path: &str) -> RemoteResult<String> {
        let url = self.endpoint(&["media", path, "url"])?;
        let response = self.http.get(url).send().await.map_err(transport)?;
        let payload: DownloadUrlResponse = check(response)
            .await?
            .json()
            .await
            .map_err(transport)?;
        Ok(payload.url)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

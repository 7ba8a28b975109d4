//! REST client for the authority HTTP endpoints.
//!
//! Wraps the authority API (login, account scoping, job, user and roleset
//! lookups) using [`reqwest`] with a per-instance cookie store, so every
//! [`HttpAuthority`] is an independent authenticated session.

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;

use crate::client::AuthorityClient;
use crate::config::AuthorityConfig;
use crate::error::AuthorityError;
use crate::model::{AccountRecord, AuthorityUser, Roleset};

/// HTTP client for one authority session.
pub struct HttpAuthority {
    client: reqwest::Client,
    base_url: Url,
    email: String,
    password: String,
}

impl HttpAuthority {
    /// Create a client with its own cookie jar.
    pub fn new(config: &AuthorityConfig) -> Result<Self, AuthorityError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| AuthorityError::BaseUrl(format!("{}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(AuthorityError::BaseUrl(config.base_url.clone()));
        }

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url,
            email: config.email.clone(),
            password: config.password.clone(),
        })
    }

    /// Append `segments` to the base URL. Each segment is percent-encoded,
    /// so ids containing `/`, `?` or `#` stay within one segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Cannot fail: `new` rejects cannot-be-a-base URLs.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an [`AuthorityError::Status`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, AuthorityError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(AuthorityError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, AuthorityError> {
        let response = Self::ensure_success(response).await?;
        response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                AuthorityError::Decode(e.to_string())
            } else {
                AuthorityError::Transport(e)
            }
        })
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), AuthorityError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

/// Replace a 4xx [`AuthorityError::Status`] with a domain error.
///
/// 401 and 403 mean the authority no longer accepts this session and read
/// as [`AuthorityError::Authentication`], so the session logs in again.
/// 5xx and transport failures pass through unchanged.
fn on_client_error(
    err: AuthorityError,
    denial: impl FnOnce(u16) -> AuthorityError,
) -> AuthorityError {
    match err {
        AuthorityError::Status { status: status @ (401 | 403), .. } => {
            AuthorityError::Authentication { status }
        }
        AuthorityError::Status { status, .. } if (400..500).contains(&status) => denial(status),
        other => other,
    }
}

#[async_trait]
impl AuthorityClient for HttpAuthority {
    async fn login(&self) -> Result<(), AuthorityError> {
        let body = serde_json::json!({
            "email": self.email,
            "password": self.password,
        });

        let response = self
            .client
            .post(self.url(&["user", "login"]))
            .query(&[("token", "true")])
            .json(&body)
            .send()
            .await?;

        Self::check_status(response)
            .await
            .map_err(|e| on_client_error(e, |status| AuthorityError::Authentication { status }))
    }

    async fn set_account(&self, account_id: &str) -> Result<(), AuthorityError> {
        let body = serde_json::json!({ "account": account_id });

        let response = self
            .client
            .post(self.url(&["user", "setaccount"]))
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await.map_err(|e| {
            on_client_error(e, |_| AuthorityError::AccountScope {
                account_id: account_id.to_string(),
            })
        })
    }

    async fn fetch_job(&self, job_id: &str) -> Result<(), AuthorityError> {
        let response = self
            .client
            .get(self.url(&["job", "job", job_id]))
            .send()
            .await?;

        Self::check_status(response).await.map_err(|e| {
            on_client_error(e, |_| AuthorityError::JobNotFound {
                job_id: job_id.to_string(),
            })
        })
    }

    async fn fetch_user(&self, user_id: &str) -> Result<AuthorityUser, AuthorityError> {
        let response = self
            .client
            .get(self.url(&["admin", "user", user_id]))
            .send()
            .await?;

        Self::parse_response(response).await.map_err(|e| {
            on_client_error(e, |_| AuthorityError::UserNotFound {
                user_id: user_id.to_string(),
            })
        })
    }

    async fn fetch_roleset(&self, account_id: &str) -> Result<Roleset, AuthorityError> {
        let response = self
            .client
            .get(self.url(&["admin", "account", account_id]))
            .send()
            .await?;

        let account: AccountRecord = Self::parse_response(response).await.map_err(|e| {
            on_client_error(e, |_| AuthorityError::AccountScope {
                account_id: account_id.to_string(),
            })
        })?;
        Ok(account.roleset)
    }

    async fn list_users(&self) -> Result<Vec<AuthorityUser>, AuthorityError> {
        let response = self.client.get(self.url(&["admin", "users"])).send().await?;
        Self::parse_response(response).await
    }
}

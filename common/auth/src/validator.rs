use std::time::Duration;

use async_trait::async_trait;

use crate::error::TokenValidatorError;
use crate::user_data::UserData;

/// Narrow interface AuthN depends on; the gateway's pipeline never touches
/// `reqwest` directly, only this trait (spec §2's dependency-inversion
/// seam for the identity provider).
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, token: &str) -> Result<UserData, TokenValidatorError>;
}

/// Introspects a bearer token against the remote identity provider over
/// HTTP. One client is built at startup and shared across requests.
pub struct HttpTokenValidator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTokenValidator {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.into() })
    }
}

#[async_trait]
impl TokenValidator for HttpTokenValidator {
    async fn validate(&self, token: &str) -> Result<UserData, TokenValidatorError> {
        let response = self
            .client
            .get(&self.base_url)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(TokenValidatorError::Rejected);
        }
        if !status.is_success() {
            return Err(TokenValidatorError::UnexpectedStatus(status.as_u16()));
        }

        let body = response.bytes().await?;
        let user_data: UserData = serde_json::from_slice(&body)?;
        Ok(user_data)
    }
}

use thiserror::Error;

/// Failures from introspecting a bearer token against the identity
/// provider. AuthN logs the detail and surfaces only `Unauthorized` to the
/// client — these variants exist so that detail can be logged usefully.
#[derive(Debug, Error)]
pub enum TokenValidatorError {
    #[error("identity provider rejected the token")]
    Rejected,

    #[error("identity provider returned an unexpected status {0}")]
    UnexpectedStatus(u16),

    #[error("identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("identity provider response was not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

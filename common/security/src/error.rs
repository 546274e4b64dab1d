use thiserror::Error;

/// AuthZ's decision failures. The gateway crate maps this onto
/// `common_http_errors::ApiError::forbidden` at the pipeline boundary,
/// keeping this crate free of any particular HTTP framework.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecurityError {
    #[error("policy denies {action} on {resource}")]
    Denied { resource: String, action: String },
    #[error("route requires a resource and an action but declares neither")]
    RouteMisconfigured,
}

pub mod envelope;
pub mod error;
pub mod layer;
pub mod metrics;
pub mod redact;

pub use envelope::{ErrorEnvelope, FieldError, SuccessEnvelope};
pub use error::{ApiError, ApiResult};
pub use layer::exception_mapper_layer;
pub use redact::redact_json;

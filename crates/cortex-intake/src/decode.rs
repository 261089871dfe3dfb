//! Typed decoding of validated documents.

use thiserror::Error;

use crate::model::CreateRequest;
use crate::unify::Validated;

/// A validated value that still does not fit `CreateRequest`. This means the
/// schema and the Rust types have drifted apart.
#[derive(Debug, Error)]
#[error("validated document does not decode into a create request: {source}")]
pub struct DecodeError {
    #[from]
    source: serde_json::Error,
}

pub fn decode(value: Validated) -> Result<CreateRequest, DecodeError> {
    serde_json::from_value(value.into_inner()).map_err(|e| {
        tracing::error!("schema/type mismatch while decoding agent document: {}", e);
        DecodeError::from(e)
    })
}

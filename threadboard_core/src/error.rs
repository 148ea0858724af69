use thiserror::Error;
use zel_core::prelude::*;

/// What a remote caller sees when something failed on our side.
#[derive(Debug, Error)]
#[error("internal error, please try again later")]
pub struct InternalError;

/// Logs the real cause and hands the transport a generic infrastructure error.
pub(crate) fn internal<E>(error: E) -> ResourceError
where
    E: std::error::Error,
{
    tracing::error!(error = %error, source = ?error.source(), "internal failure");
    ResourceError::infra(InternalError)
}

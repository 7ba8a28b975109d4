use notigate_authority::{AuthorityError, AuthorizationError};
use notigate_core::{CoreError, KeyError};

/// Errors surfaced by the gateway façade and the sidecar.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Authority(#[from] AuthorityError),
}

impl GatewayError {
    /// Whether the authority denied the subject.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Authorization(e) if e.is_unauthorized())
    }

    /// Whether the caller sent something malformed, as opposed to the
    /// gateway or the authority failing.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::Key(_) | Self::Core(CoreError::Validation(_)))
    }
}

//! Error types of the authority layer.
//!
//! [`AuthorityError`] keeps the precise reason an authority call failed and
//! is only ever logged. Callers of the resolver and the dispatch queue see
//! [`AuthorizationError`], where every denial reads the same.

/// Failure of a single authority call or session primitive.
#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    #[error("can't find user {user_id}")]
    UserNotFound { user_id: String },

    #[error("can't find account {account_id}")]
    AccountScope { account_id: String },

    #[error("can't find job {job_id}")]
    JobNotFound { job_id: String },

    #[error("user {user_id} lacks permission {permission}")]
    InsufficientPermissions { user_id: String, permission: String },

    /// The authority refused the gateway's credentials or no longer
    /// accepts its session.
    #[error("authority rejected service session (HTTP {status})")]
    Authentication { status: u16 },

    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The authority answered with an unexpected non-2xx status.
    #[error("authority API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("unexpected authority response: {0}")]
    Decode(String),

    #[error("invalid authority base URL: {0}")]
    BaseUrl(String),
}

impl AuthorityError {
    /// Whether the failure is a decision about the subject (deny) rather
    /// than a failure to reach a decision.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            Self::UserNotFound { .. }
                | Self::AccountScope { .. }
                | Self::JobNotFound { .. }
                | Self::InsufficientPermissions { .. }
        )
    }
}

/// Outcome of a failed authorization, as seen by the caller.
#[derive(Debug, thiserror::Error)]
pub enum AuthorizationError {
    /// The subject is not allowed. Deliberately carries no reason.
    #[error("Unauthorized")]
    Unauthorized,

    /// No decision could be reached because the authority failed.
    #[error("Authority unavailable: {0}")]
    Authority(#[source] AuthorityError),

    /// The worker handling the request stopped before replying.
    #[error("Authorization worker stopped before replying")]
    WorkerLost,
}

impl AuthorizationError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

impl From<AuthorityError> for AuthorizationError {
    fn from(err: AuthorityError) -> Self {
        if err.is_denial() {
            Self::Unauthorized
        } else {
            Self::Authority(err)
        }
    }
}

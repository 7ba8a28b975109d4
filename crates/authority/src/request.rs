use serde::{Deserialize, Serialize};

/// An authorization request accepted by the dispatch queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthorizationRequest {
    /// Does `user_id` hold every permission in `permissions` on the account?
    CheckPermission {
        account_id: String,
        user_id: String,
        permissions: Vec<String>,
    },
    /// May `user_id` assign `stakeholder_id` to `stage` on the job, and is
    /// the stakeholder eligible for that stage?
    EditStakeholder {
        account_id: String,
        job_id: String,
        user_id: String,
        stakeholder_id: String,
        stage: String,
    },
}

impl AuthorizationRequest {
    /// Wire tag of the request, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CheckPermission { .. } => "check_permission",
            Self::EditStakeholder { .. } => "edit_stakeholder",
        }
    }

    pub fn account_id(&self) -> &str {
        match self {
            Self::CheckPermission { account_id, .. } | Self::EditStakeholder { account_id, .. } => {
                account_id
            }
        }
    }
}

//! Composite permission checks.
//!
//! Both checks run on a session lent by the dispatch pool and log it in
//! once, before the first authority call. Every denial
//! (unknown user, user outside the account, unknown account or job,
//! missing permission) comes back as the same
//! [`AuthorizationError::Unauthorized`] so callers cannot probe account
//! structure; the precise reason is logged at debug level only.

use notigate_core::permissions::STAKEHOLDER_EDIT;

use crate::client::AuthorityClient;
use crate::error::{AuthorityError, AuthorizationError};
use crate::model::AuthorityUser;
use crate::session::AuthoritySession;

/// Permission checks against the authority's live permission model.
pub struct PermissionResolver;

impl PermissionResolver {
    /// Does `user_id` hold every permission in `permissions` on the account?
    ///
    /// Returns the user's record when authorized.
    pub async fn check_account_permission<C: AuthorityClient>(
        session: &mut AuthoritySession<C>,
        user_id: &str,
        account_id: &str,
        permissions: &[String],
    ) -> Result<AuthorityUser, AuthorizationError> {
        let result = async {
            session.login().await?;
            session.set_account_scope(account_id).await?;
            session
                .fetch_user_with_permission_check(user_id, account_id, permissions)
                .await
        }
        .await;

        settle(result, "check_permission", user_id, account_id)
    }

    /// May `acting_user_id` move `stakeholder_id` into `stage` on the job?
    ///
    /// The actor needs `Stakeholder_Edit` and the stage permission; the
    /// stakeholder needs the stage permission. The actor is checked first
    /// and a failure there skips the stakeholder lookup. Returns the
    /// stakeholder's record when authorized.
    pub async fn check_stakeholder_transfer<C: AuthorityClient>(
        session: &mut AuthoritySession<C>,
        acting_user_id: &str,
        stakeholder_id: &str,
        account_id: &str,
        job_id: &str,
        stage: &str,
    ) -> Result<AuthorityUser, AuthorizationError> {
        let result = async {
            session.login().await?;
            session.set_account_scope(account_id).await?;
            session.fetch_job(job_id).await?;

            let actor_requires = [STAKEHOLDER_EDIT.to_string(), stage.to_string()];
            session
                .fetch_user_with_permission_check(acting_user_id, account_id, &actor_requires)
                .await?;

            let stakeholder_requires = [stage.to_string()];
            session
                .fetch_user_with_permission_check(stakeholder_id, account_id, &stakeholder_requires)
                .await
        }
        .await;

        settle(result, "edit_stakeholder", acting_user_id, account_id)
    }
}

/// Collapse denials into `Unauthorized`, keeping the reason in the logs.
fn settle(
    result: Result<AuthorityUser, AuthorityError>,
    check: &'static str,
    user_id: &str,
    account_id: &str,
) -> Result<AuthorityUser, AuthorizationError> {
    match result {
        Ok(user) => Ok(user),
        Err(e) if e.is_denial() => {
            tracing::debug!(check, user_id, account_id, reason = %e, "Authorization denied");
            Err(AuthorizationError::Unauthorized)
        }
        Err(e) => {
            tracing::warn!(check, user_id, account_id, error = %e, "Authority call failed");
            Err(AuthorizationError::Authority(e))
        }
    }
}

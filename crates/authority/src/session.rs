//! One authenticated session with the authority.
//!
//! A session owns one [`AuthorityClient`] (and so one cookie jar) plus the
//! time of its last login. [`login`](AuthoritySession::login) is called
//! once at the start of each unit of work (a resolver check or an
//! assignment lookup); the scoping and lookup primitives that follow run on
//! that login and never authenticate in between, so a check cannot lose its
//! account scope to a mid-check login. Sessions take `&mut self`: the
//! dispatch pool hands each one to a single task at a time, so no locking
//! happens here.

use std::time::Duration;

use chrono::Utc;

use crate::client::AuthorityClient;
use crate::error::AuthorityError;
use crate::model::AuthorityUser;

/// An authority session and its login state.
pub struct AuthoritySession<C> {
    id: usize,
    client: C,
    ttl: Duration,
    /// Epoch seconds of the last successful login; written only by
    /// [`login`](Self::login) and cleared when the authority rejects us.
    last_login: Option<i64>,
}

impl<C: AuthorityClient> AuthoritySession<C> {
    /// A session that has never logged in.
    pub fn new(id: usize, client: C, ttl: Duration) -> Self {
        Self {
            id,
            client,
            ttl,
            last_login: None,
        }
    }

    /// Pretend the last login happened at `epoch_secs`.
    pub fn with_last_login(mut self, epoch_secs: i64) -> Self {
        self.last_login = Some(epoch_secs);
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn last_login(&self) -> Option<i64> {
        self.last_login
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Whether a login is due at `now` (epoch seconds).
    pub fn needs_login(&self, now: i64) -> bool {
        match self.last_login {
            None => true,
            Some(at) => now.saturating_sub(at) > self.ttl.as_secs() as i64,
        }
    }

    /// Authenticate unless the current login is still within the TTL.
    ///
    /// Returns whether credentials were submitted.
    pub async fn login(&mut self) -> Result<bool, AuthorityError> {
        let now = Utc::now().timestamp();
        if !self.needs_login(now) {
            return Ok(false);
        }

        self.client.login().await?;
        self.last_login = Some(now);
        tracing::info!(session = self.id, "Authority session authenticated");
        Ok(true)
    }

    /// Scope subsequent calls to `account_id`.
    pub async fn set_account_scope(&mut self, account_id: &str) -> Result<(), AuthorityError> {
        let result = self.client.set_account(account_id).await;
        self.observe(result)
    }

    /// Verify the job exists.
    pub async fn fetch_job(&mut self, job_id: &str) -> Result<(), AuthorityError> {
        let result = self.client.fetch_job(job_id).await;
        self.observe(result)
    }

    /// Fetch a user and verify their role in `account_id` grants every
    /// permission in `required`.
    ///
    /// A user without a membership (or role) in the account reads as
    /// [`AuthorityError::UserNotFound`]; a member lacking a permission as
    /// [`AuthorityError::InsufficientPermissions`] naming the first one
    /// missing.
    pub async fn fetch_user_with_permission_check(
        &mut self,
        user_id: &str,
        account_id: &str,
        required: &[String],
    ) -> Result<AuthorityUser, AuthorityError> {
        let result = self.client.fetch_user(user_id).await;
        let user = self.observe(result)?;

        let not_found = || AuthorityError::UserNotFound {
            user_id: user_id.to_string(),
        };
        let role = user.role_in(account_id).ok_or_else(not_found)?;

        let result = self.client.fetch_roleset(account_id).await;
        let roleset = self.observe(result)?;
        let granted = roleset.permissions(role).ok_or_else(not_found)?;

        if let Some(missing) = required.iter().find(|p| !granted.contains(p)) {
            return Err(AuthorityError::InsufficientPermissions {
                user_id: user_id.to_string(),
                permission: missing.clone(),
            });
        }
        Ok(user)
    }

    /// Whether `job_id` is on the user's job list under `job_scope_id`.
    ///
    /// Never fails: a missing list, a missing key or an authority failure
    /// all read as `false`.
    pub async fn fetch_job_assignment_list(
        &mut self,
        user_id: &str,
        job_scope_id: &str,
        job_id: &str,
    ) -> bool {
        let result = async {
            self.login().await?;
            let result = self.client.fetch_user(user_id).await;
            self.observe(result)
        }
        .await;

        match result {
            Ok(user) => user.is_assigned(job_scope_id, job_id),
            Err(e) => {
                tracing::warn!(
                    session = self.id,
                    user_id,
                    job_id,
                    error = %e,
                    "Job assignment lookup failed, treating as unassigned"
                );
                false
            }
        }
    }

    /// Ids of every user with `job_id` on their job list under
    /// `job_scope_id`, from the bulk user listing.
    pub async fn fetch_job_assignees(
        &mut self,
        job_scope_id: &str,
        job_id: &str,
    ) -> Result<Vec<String>, AuthorityError> {
        self.login().await?;
        let result = self.client.list_users().await;
        let users = self.observe(result)?;
        Ok(users
            .into_iter()
            .filter(|u| u.is_assigned(job_scope_id, job_id))
            .map(|u| u.external_user_id)
            .collect())
    }

    /// Forget the login when the authority stops accepting it, so the next
    /// call re-authenticates instead of waiting out the TTL.
    fn observe<T>(&mut self, result: Result<T, AuthorityError>) -> Result<T, AuthorityError> {
        if let Err(AuthorityError::Authentication { .. }) = &result {
            tracing::warn!(session = self.id, "Authority rejected session, forcing re-login");
            self.last_login = None;
        }
        result
    }
}

//! The seam between sessions and the authority transport.

use async_trait::async_trait;

use crate::error::AuthorityError;
use crate::model::{AuthorityUser, Roleset};

/// Raw calls against the authority's REST surface.
///
/// One implementor instance carries one authenticated transport (cookie
/// jar). Implementors map HTTP statuses onto [`AuthorityError`] variants;
/// session and resolver logic is built on top in
/// [`AuthoritySession`](crate::session::AuthoritySession).
#[async_trait]
pub trait AuthorityClient: Send + Sync + 'static {
    /// `POST /user/login?token=true` with the service credentials.
    async fn login(&self) -> Result<(), AuthorityError>;

    /// `POST /user/setaccount`; scopes subsequent calls to one account.
    async fn set_account(&self, account_id: &str) -> Result<(), AuthorityError>;

    /// `GET /job/job/:jobId`; only the status matters.
    async fn fetch_job(&self, job_id: &str) -> Result<(), AuthorityError>;

    /// `GET /admin/user/:id`.
    async fn fetch_user(&self, user_id: &str) -> Result<AuthorityUser, AuthorityError>;

    /// `GET /admin/account/:accountId`, reduced to its roleset.
    async fn fetch_roleset(&self, account_id: &str) -> Result<Roleset, AuthorityError>;

    /// `GET /admin/users`.
    async fn list_users(&self) -> Result<Vec<AuthorityUser>, AuthorityError>;
}

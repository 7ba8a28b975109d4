#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use notigate_authority::{
    AuthorityClient, AuthorityError, AuthorityUser, AuthoritySession, AuthorizationDispatchQueue,
    Roleset,
};
use notigate_core::TopicKeyCodec;
use notigate_gateway::NotificationGateway;

pub const ACCOUNT: &str = "acct1";
pub const JOB: &str = "job1";

/// Read-only authority directory.
///
/// `acct1` roles: `Manager` (edit + view + cover approval), `Approver`
/// (cover approval), `Member` (nothing). `job1` is assigned to `manager`
/// and `approver`.
#[derive(Clone)]
pub struct Directory {
    users: Arc<HashMap<String, AuthorityUser>>,
    roleset: Arc<Roleset>,
    list_calls: Arc<AtomicUsize>,
}

impl Directory {
    pub fn new() -> Self {
        let roleset = serde_json::from_value(serde_json::json!({
            "Roles": {
                "Manager": { "Permissions": ["Stakeholder_Edit", "Stakeholder_View", "Approve_Cover"] },
                "Approver": { "Permissions": ["Approve_Cover"] },
                "Member": { "Permissions": [] }
            }
        }))
        .unwrap();

        let users = [
            user("manager", "Manager", &[JOB]),
            user("approver", "Approver", &[JOB, "job2"]),
            user("member", "Member", &["job2"]),
        ]
        .into_iter()
        .map(|u| (u.external_user_id.clone(), u))
        .collect();

        Self {
            users: Arc::new(users),
            roleset: Arc::new(roleset),
            list_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of bulk user listings served.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

fn user(id: &str, role: &str, jobs: &[&str]) -> AuthorityUser {
    serde_json::from_value(serde_json::json!({
        "Email": format!("{id}@example.com"),
        "UserID": id,
        "FirstName": id,
        "LastName": "Test",
        "Accounts": [ACCOUNT],
        "Roles": [role],
        "JobsList": { ACCOUNT: jobs },
    }))
    .unwrap()
}

#[async_trait]
impl AuthorityClient for Directory {
    async fn login(&self) -> Result<(), AuthorityError> {
        Ok(())
    }

    async fn set_account(&self, account_id: &str) -> Result<(), AuthorityError> {
        if account_id == ACCOUNT {
            Ok(())
        } else {
            Err(AuthorityError::AccountScope {
                account_id: account_id.to_string(),
            })
        }
    }

    async fn fetch_job(&self, job_id: &str) -> Result<(), AuthorityError> {
        if job_id == JOB || job_id == "job2" {
            Ok(())
        } else {
            Err(AuthorityError::JobNotFound {
                job_id: job_id.to_string(),
            })
        }
    }

    async fn fetch_user(&self, user_id: &str) -> Result<AuthorityUser, AuthorityError> {
        self.users
            .get(user_id)
            .cloned()
            .ok_or_else(|| AuthorityError::UserNotFound {
                user_id: user_id.to_string(),
            })
    }

    async fn fetch_roleset(&self, _account_id: &str) -> Result<Roleset, AuthorityError> {
        Ok(Roleset::clone(&self.roleset))
    }

    async fn list_users(&self) -> Result<Vec<AuthorityUser>, AuthorityError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut users: Vec<_> = self.users.values().cloned().collect();
        users.sort_by(|a, b| a.external_user_id.cmp(&b.external_user_id));
        Ok(users)
    }
}

/// A gateway over two sessions of `directory` with the default codec.
pub fn gateway(directory: &Directory) -> NotificationGateway<Directory> {
    gateway_with_codec(directory, TopicKeyCodec::default())
}

pub fn gateway_with_codec(
    directory: &Directory,
    codec: TopicKeyCodec,
) -> NotificationGateway<Directory> {
    let sessions = (0..2)
        .map(|id| AuthoritySession::new(id, directory.clone(), Duration::from_secs(3600)))
        .collect();
    NotificationGateway::new(AuthorizationDispatchQueue::new(sessions), codec)
}

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use notigate_authority::{
    AuthorityClient, AuthorityError, AuthorityUser, AuthoritySession, AuthorizationDispatchQueue,
    Roleset,
};

pub const ACCOUNT: &str = "acct1";
pub const JOB: &str = "job1";
pub const STAGE: &str = "Approve_Cover";

/// In-memory stand-in for the authority.
///
/// Clones share state, so a test keeps one handle for assertions while the
/// sessions own the others. Every call is recorded in order and can be
/// held at a gate to build up a backlog.
#[derive(Clone)]
pub struct FakeAuthority {
    state: Arc<FakeState>,
}

struct FakeState {
    users: Mutex<HashMap<String, AuthorityUser>>,
    rolesets: Mutex<HashMap<String, Roleset>>,
    jobs: Mutex<HashSet<String>>,
    failing_users: Mutex<HashSet<String>>,
    panicking_users: Mutex<HashSet<String>>,
    reject_logins: AtomicBool,
    calls: Mutex<Vec<String>>,
    logins: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    gate: watch::Sender<bool>,
}

impl Default for FakeAuthority {
    fn default() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Arc::new(FakeState {
                users: Mutex::default(),
                rolesets: Mutex::default(),
                jobs: Mutex::default(),
                failing_users: Mutex::default(),
                panicking_users: Mutex::default(),
                reject_logins: AtomicBool::new(false),
                calls: Mutex::default(),
                logins: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                gate,
            }),
        }
    }
}

impl FakeAuthority {
    /// `acct1` with three roles, `job1`, and one user per role plus an
    /// outsider who only belongs to `acct2`.
    pub fn with_fixture() -> Self {
        let fake = Self::default();
        fake.add_roleset(
            ACCOUNT,
            &[
                ("Editor", &["Stakeholder_Edit", "Approve_Cover", "Stakeholder_View"]),
                ("Approver", &["Approve_Cover", "Stakeholder_View"]),
                ("Coordinator", &["Stakeholder_Edit", "Stakeholder_View"]),
                ("Reader", &[]),
            ],
        );
        fake.add_roleset("acct2", &[("Editor", &["Stakeholder_Edit", "Approve_Cover"])]);
        fake.add_job(JOB);
        fake.add_user(user("editor", &[(ACCOUNT, "Editor")], &[(ACCOUNT, &[JOB])]));
        fake.add_user(user("approver", &[(ACCOUNT, "Approver")], &[(ACCOUNT, &[JOB, "job2"])]));
        fake.add_user(user("coordinator", &[(ACCOUNT, "Coordinator")], &[]));
        fake.add_user(user("reader", &[(ACCOUNT, "Reader")], &[(ACCOUNT, &["job2"])]));
        fake.add_user(user("outsider", &[("acct2", "Editor")], &[("acct2", &[JOB])]));
        fake
    }

    pub fn add_user(&self, user: AuthorityUser) {
        self.state
            .users
            .lock()
            .unwrap()
            .insert(user.external_user_id.clone(), user);
    }

    pub fn add_roleset(&self, account_id: &str, roles: &[(&str, &[&str])]) {
        let roles: serde_json::Map<String, serde_json::Value> = roles
            .iter()
            .map(|(name, permissions)| {
                (
                    name.to_string(),
                    serde_json::json!({ "Permissions": permissions }),
                )
            })
            .collect();
        let roleset: Roleset = serde_json::from_value(serde_json::json!({ "Roles": roles })).unwrap();
        self.state
            .rolesets
            .lock()
            .unwrap()
            .insert(account_id.to_string(), roleset);
    }

    pub fn add_job(&self, job_id: &str) {
        self.state.jobs.lock().unwrap().insert(job_id.to_string());
    }

    /// Lookups of `user_id` fail with a 503.
    pub fn fail_user(&self, user_id: &str) {
        self.state
            .failing_users
            .lock()
            .unwrap()
            .insert(user_id.to_string());
    }

    /// Lookups of `user_id` panic inside the worker.
    pub fn panic_on_user(&self, user_id: &str) {
        self.state
            .panicking_users
            .lock()
            .unwrap()
            .insert(user_id.to_string());
    }

    pub fn reject_logins(&self) {
        self.state.reject_logins.store(true, Ordering::SeqCst);
    }

    /// Park every call until [`release`](Self::release).
    pub fn hold(&self) {
        self.state.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.state.gate.send_replace(true);
    }

    pub fn logins(&self) -> usize {
        self.state.logins.load(Ordering::SeqCst)
    }

    /// Calls currently inside the fake.
    pub fn active(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    /// Every call so far, as `"<operation> <argument>"`.
    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().unwrap().clone()
    }

    /// Arguments of the `fetch_user` calls, in order.
    pub fn fetched_users(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix("fetch_user ").map(str::to_string))
            .collect()
    }

    async fn enter(&self, call: String) -> ActiveCall {
        self.state.calls.lock().unwrap().push(call);
        let now = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_active.fetch_max(now, Ordering::SeqCst);
        let guard = ActiveCall(Arc::clone(&self.state));

        let mut gate = self.state.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        guard
    }
}

struct ActiveCall(Arc<FakeState>);

impl Drop for ActiveCall {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuthorityClient for FakeAuthority {
    async fn login(&self) -> Result<(), AuthorityError> {
        let _call = self.enter("login".to_string()).await;
        if self.state.reject_logins.load(Ordering::SeqCst) {
            return Err(AuthorityError::Authentication { status: 401 });
        }
        self.state.logins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_account(&self, account_id: &str) -> Result<(), AuthorityError> {
        let _call = self.enter(format!("set_account {account_id}")).await;
        if self.state.rolesets.lock().unwrap().contains_key(account_id) {
            Ok(())
        } else {
            Err(AuthorityError::AccountScope {
                account_id: account_id.to_string(),
            })
        }
    }

    async fn fetch_job(&self, job_id: &str) -> Result<(), AuthorityError> {
        let _call = self.enter(format!("fetch_job {job_id}")).await;
        if self.state.jobs.lock().unwrap().contains(job_id) {
            Ok(())
        } else {
            Err(AuthorityError::JobNotFound {
                job_id: job_id.to_string(),
            })
        }
    }

    async fn fetch_user(&self, user_id: &str) -> Result<AuthorityUser, AuthorityError> {
        let _call = self.enter(format!("fetch_user {user_id}")).await;
        if self.state.panicking_users.lock().unwrap().contains(user_id) {
            panic!("fake authority blew up on {user_id}");
        }
        if self.state.failing_users.lock().unwrap().contains(user_id) {
            return Err(AuthorityError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.state
            .users
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| AuthorityError::UserNotFound {
                user_id: user_id.to_string(),
            })
    }

    async fn fetch_roleset(&self, account_id: &str) -> Result<Roleset, AuthorityError> {
        let _call = self.enter(format!("fetch_roleset {account_id}")).await;
        self.state
            .rolesets
            .lock()
            .unwrap()
            .get(account_id)
            .cloned()
            .ok_or_else(|| AuthorityError::AccountScope {
                account_id: account_id.to_string(),
            })
    }

    async fn list_users(&self) -> Result<Vec<AuthorityUser>, AuthorityError> {
        let _call = self.enter("list_users".to_string()).await;
        let mut users: Vec<_> = self.state.users.lock().unwrap().values().cloned().collect();
        users.sort_by(|a, b| a.external_user_id.cmp(&b.external_user_id));
        Ok(users)
    }
}

/// Build a user record the way the authority serializes it.
pub fn user(id: &str, memberships: &[(&str, &str)], jobs: &[(&str, &[&str])]) -> AuthorityUser {
    let accounts: Vec<_> = memberships.iter().map(|(a, _)| *a).collect();
    let roles: Vec<_> = memberships.iter().map(|(_, r)| *r).collect();
    let jobs_list: serde_json::Map<String, serde_json::Value> = jobs
        .iter()
        .map(|(scope, ids)| (scope.to_string(), serde_json::json!(ids)))
        .collect();

    serde_json::from_value(serde_json::json!({
        "Email": format!("{id}@example.com"),
        "UserID": id,
        "FirstName": id,
        "LastName": "Test",
        "Accounts": accounts,
        "Roles": roles,
        "JobsList": jobs_list,
    }))
    .unwrap()
}

/// `size` sessions over clones of `fake`.
pub fn queue(fake: &FakeAuthority, size: usize) -> AuthorizationDispatchQueue<FakeAuthority> {
    let sessions = (0..size)
        .map(|id| AuthoritySession::new(id, fake.clone(), Duration::from_secs(3600)))
        .collect();
    AuthorizationDispatchQueue::new(sessions)
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

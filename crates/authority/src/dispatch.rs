//! Bounded-concurrency authorization dispatcher.
//!
//! [`AuthorizationDispatchQueue`] accepts requests from any number of
//! concurrent callers and runs them over a fixed pool of
//! [`AuthoritySession`]s, so at most `pool_size` authority-bound operations
//! are ever in flight. Requests beyond that wait in a FIFO queue; nothing is
//! rejected or dropped.
//!
//! The pending queue and the idle pool live behind one mutex and are only
//! touched by [`dispatch`](AuthorizationDispatchQueue::dispatch) (pop) and
//! the worker lease (push back). Dispatch is re-run on every submission and
//! every completion, so a single completion drains as many queued requests
//! as there are idle sessions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::api::HttpAuthority;
use crate::client::AuthorityClient;
use crate::config::AuthorityConfig;
use crate::error::{AuthorityError, AuthorizationError};
use crate::model::AuthorityUser;
use crate::permissions::PermissionResolver;
use crate::request::AuthorizationRequest;
use crate::session::AuthoritySession;

type Reply<T> = oneshot::Sender<T>;

/// Work items accepted by the queue, each with its own reply channel.
enum Job {
    Authorize {
        request: AuthorizationRequest,
        reply: Reply<Result<AuthorityUser, AuthorizationError>>,
    },
    UserAssigned {
        user_id: String,
        job_scope_id: String,
        job_id: String,
        reply: Reply<bool>,
    },
    Assignees {
        job_scope_id: String,
        job_id: String,
        reply: Reply<Result<Vec<String>, AuthorizationError>>,
    },
}

impl Job {
    fn kind(&self) -> &'static str {
        match self {
            Self::Authorize { request, .. } => request.kind(),
            Self::UserAssigned { .. } => "user_assigned",
            Self::Assignees { .. } => "job_assignees",
        }
    }
}

struct QueuedJob {
    id: Uuid,
    job: Job,
    enqueued_at: Instant,
}

struct State<C> {
    pending: VecDeque<QueuedJob>,
    idle: Vec<AuthoritySession<C>>,
    in_flight: usize,
}

struct Shared<C> {
    state: Mutex<State<C>>,
    pool_size: usize,
}

impl<C> Shared<C> {
    fn lock(&self) -> MutexGuard<'_, State<C>> {
        // A panic never leaves the queue/pool pair half-updated, so a
        // poisoned lock is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// AuthorizationDispatchQueue
// ---------------------------------------------------------------------------

/// FIFO authorization queue over a fixed pool of authority sessions.
///
/// Cheap to clone; clones share the queue and the pool.
pub struct AuthorizationDispatchQueue<C> {
    shared: Arc<Shared<C>>,
}

impl<C> Clone for AuthorizationDispatchQueue<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl AuthorizationDispatchQueue<HttpAuthority> {
    /// Build a pool of `config.pool_size` HTTP sessions, each with its own
    /// cookie jar. No login happens until a session is first used (or
    /// [`warm_up`](Self::warm_up) is called).
    pub fn connect(config: &AuthorityConfig) -> Result<Self, AuthorityError> {
        let sessions = (0..config.pool_size)
            .map(|id| {
                HttpAuthority::new(config)
                    .map(|client| AuthoritySession::new(id, client, config.session_ttl))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(sessions))
    }
}

impl<C: AuthorityClient> AuthorizationDispatchQueue<C> {
    /// Create a queue owning `sessions` as its worker pool.
    ///
    /// An empty pool accepts submissions but never serves them.
    pub fn new(sessions: Vec<AuthoritySession<C>>) -> Self {
        if sessions.is_empty() {
            tracing::warn!("Authorization dispatch queue created without sessions");
        }
        let pool_size = sessions.len();
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    pending: VecDeque::new(),
                    idle: sessions,
                    in_flight: 0,
                }),
                pool_size,
            }),
        }
    }

    /// Number of sessions in the pool.
    pub fn pool_size(&self) -> usize {
        self.shared.pool_size
    }

    /// Sessions currently available for work.
    pub fn idle_workers(&self) -> usize {
        self.shared.lock().idle.len()
    }

    /// Requests currently running on a session.
    pub fn in_flight(&self) -> usize {
        self.shared.lock().in_flight
    }

    /// Requests waiting for a session.
    pub fn queued(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Authorize `request`, waiting for a free session if necessary.
    ///
    /// Dropping the returned future does not cancel the authority call;
    /// it completes on its session and the reply is discarded.
    pub async fn submit(
        &self,
        request: AuthorizationRequest,
    ) -> Result<AuthorityUser, AuthorizationError> {
        let (reply, rx) = oneshot::channel();
        self.enqueue(Job::Authorize { request, reply });
        rx.await.map_err(|_| AuthorizationError::WorkerLost)?
    }

    /// Whether `job_id` is on `user_id`'s job list under `job_scope_id`.
    ///
    /// Lookup failures read as `false`.
    pub async fn is_assigned(
        &self,
        user_id: &str,
        job_scope_id: &str,
        job_id: &str,
    ) -> Result<bool, AuthorizationError> {
        let (reply, rx) = oneshot::channel();
        self.enqueue(Job::UserAssigned {
            user_id: user_id.to_string(),
            job_scope_id: job_scope_id.to_string(),
            job_id: job_id.to_string(),
            reply,
        });
        rx.await.map_err(|_| AuthorizationError::WorkerLost)
    }

    /// Ids of every user assigned to `job_id` under `job_scope_id`.
    pub async fn job_assignees(
        &self,
        job_scope_id: &str,
        job_id: &str,
    ) -> Result<Vec<String>, AuthorizationError> {
        let (reply, rx) = oneshot::channel();
        self.enqueue(Job::Assignees {
            job_scope_id: job_scope_id.to_string(),
            job_id: job_id.to_string(),
            reply,
        });
        rx.await.map_err(|_| AuthorizationError::WorkerLost)?
    }

    /// Log every idle session in.
    ///
    /// Returns the number of sessions that authenticated. Sessions stay in
    /// the pool whether or not their login succeeded; a failed one retries
    /// on first use.
    pub async fn warm_up(&self) -> usize {
        let sessions: Vec<_> = {
            let mut state = self.shared.lock();
            state.in_flight += state.idle.len();
            state.idle.drain(..).collect()
        };

        let mut authenticated = 0;
        for mut session in sessions {
            match session.login().await {
                Ok(_) => authenticated += 1,
                Err(e) => {
                    tracing::error!(session = session.id(), error = %e, "Authority session login failed");
                }
            }
            drop(WorkerLease::new(session, Arc::clone(&self.shared)));
        }

        tracing::info!(
            authenticated,
            pool_size = self.shared.pool_size,
            "Authority session pool warmed up"
        );
        authenticated
    }

    fn enqueue(&self, job: Job) {
        let queued = QueuedJob {
            id: Uuid::now_v7(),
            job,
            enqueued_at: Instant::now(),
        };
        tracing::trace!(request_id = %queued.id, kind = queued.job.kind(), "Authorization request queued");
        self.shared.lock().pending.push_back(queued);
        Self::dispatch(&self.shared);
    }

    /// Pair queued jobs with idle sessions until one side runs out.
    ///
    /// No-op when the queue is empty or every session is busy.
    fn dispatch(shared: &Arc<Shared<C>>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No runtime available, queued authorization requests stay pending");
            return;
        };

        loop {
            let (queued, session) = {
                let mut state = shared.lock();
                if state.pending.is_empty() || state.idle.is_empty() {
                    return;
                }
                let (Some(queued), Some(session)) = (state.pending.pop_front(), state.idle.pop())
                else {
                    unreachable!("checked non-empty under the same lock");
                };
                state.in_flight += 1;
                (queued, session)
            };

            let lease = WorkerLease::new(session, Arc::clone(shared));
            runtime.spawn(run_job(lease, queued));
        }
    }
}

// ---------------------------------------------------------------------------
// Worker lease
// ---------------------------------------------------------------------------

/// Exclusive use of one pooled session.
///
/// Dropping the lease returns the session to the pool and re-runs
/// dispatch, whether the job finished, failed or panicked.
struct WorkerLease<C: AuthorityClient> {
    session: Option<AuthoritySession<C>>,
    shared: Arc<Shared<C>>,
}

impl<C: AuthorityClient> WorkerLease<C> {
    fn new(session: AuthoritySession<C>, shared: Arc<Shared<C>>) -> Self {
        Self {
            session: Some(session),
            shared,
        }
    }
}

impl<C: AuthorityClient> Drop for WorkerLease<C> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        {
            let mut state = self.shared.lock();
            state.idle.push(session);
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        AuthorizationDispatchQueue::<C>::dispatch(&self.shared);
    }
}

/// Run one job on a leased session and deliver its reply.
///
/// The session goes back to the pool before the reply is sent, so a caller
/// that has its answer always observes the worker as available again.
async fn run_job<C: AuthorityClient>(mut lease: WorkerLease<C>, queued: QueuedJob) {
    let QueuedJob {
        id,
        job,
        enqueued_at,
    } = queued;
    let Some(session) = lease.session.as_mut() else {
        return;
    };
    let session_id = session.id();
    let waited_ms = enqueued_at.elapsed().as_millis() as u64;
    let kind = job.kind();

    tracing::debug!(request_id = %id, session = session_id, kind, waited_ms, "Authorization request dispatched");

    let delivered = match job {
        Job::Authorize { request, reply } => {
            let outcome = match &request {
                AuthorizationRequest::CheckPermission {
                    account_id,
                    user_id,
                    permissions,
                } => {
                    PermissionResolver::check_account_permission(
                        session,
                        user_id,
                        account_id,
                        permissions,
                    )
                    .await
                }
                AuthorizationRequest::EditStakeholder {
                    account_id,
                    job_id,
                    user_id,
                    stakeholder_id,
                    stage,
                } => {
                    PermissionResolver::check_stakeholder_transfer(
                        session,
                        user_id,
                        stakeholder_id,
                        account_id,
                        job_id,
                        stage,
                    )
                    .await
                }
            };
            tracing::debug!(
                request_id = %id,
                session = session_id,
                kind,
                authorized = outcome.is_ok(),
                "Authorization request completed"
            );
            drop(lease);
            reply.send(outcome).is_ok()
        }
        Job::UserAssigned {
            user_id,
            job_scope_id,
            job_id,
            reply,
        } => {
            let assigned = session
                .fetch_job_assignment_list(&user_id, &job_scope_id, &job_id)
                .await;
            drop(lease);
            reply.send(assigned).is_ok()
        }
        Job::Assignees {
            job_scope_id,
            job_id,
            reply,
        } => {
            let outcome = session
                .fetch_job_assignees(&job_scope_id, &job_id)
                .await
                .map_err(AuthorizationError::from);
            drop(lease);
            reply.send(outcome).is_ok()
        }
    };

    if !delivered {
        tracing::debug!(request_id = %id, kind, "Caller went away before the reply, discarding");
    }
}

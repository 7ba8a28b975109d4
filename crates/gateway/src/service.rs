//! The gateway façade.
//!
//! [`NotificationGateway`] pairs the authorization dispatch queue with the
//! topic key codec: every subscription change is authorized against the
//! authority and translated into the topic keys to register and to drop.
//! Persisting subscriptions and talking to the topic store stay with the
//! caller.

use serde::{Deserialize, Serialize};

use notigate_authority::{
    AuthorityClient, AuthorityUser, AuthorizationDispatchQueue, AuthorizationRequest,
    HttpAuthority,
};
use notigate_core::permissions::STAKEHOLDER_VIEW;
use notigate_core::subscriptions::{
    self, InformativeSummary, ReplaceScope, StakeholderMatrix, TopicSubscribers,
};
use notigate_core::{CoreError, InformativeKeyParts, TopicAddress, TopicKey, TopicKeyCodec};

use crate::config::GatewayConfig;
use crate::error::GatewayError;

/// Requested stakeholder assignment on a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeholderChange {
    pub stakeholder_id: String,
    pub stage: String,
    pub parts: Vec<String>,
}

/// Requested informative subscription for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InformativeChange {
    pub event: String,
    #[serde(default)]
    pub parts: Vec<String>,
    #[serde(default)]
    pub all_titles: bool,
}

/// An authorized subscription change, ready to apply to the topic store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionPlan {
    /// Authority record of the subscriber being (re)subscribed.
    pub subscriber: AuthorityUser,
    pub subscribe: Vec<TopicKey>,
    /// Previously registered keys the change supersedes.
    pub unsubscribe: Vec<String>,
}

/// Pool occupancy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub pool_size: usize,
    pub idle: usize,
    pub in_flight: usize,
    pub queued: usize,
}

/// Authorization plus topic addressing for notification preferences.
pub struct NotificationGateway<C> {
    queue: AuthorizationDispatchQueue<C>,
    codec: TopicKeyCodec,
}

impl<C> Clone for NotificationGateway<C> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            codec: self.codec.clone(),
        }
    }
}

impl NotificationGateway<HttpAuthority> {
    /// Build the session pool and codec described by `config`.
    pub fn connect(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let queue = AuthorizationDispatchQueue::connect(&config.authority)?;
        Ok(Self::new(queue, config.codec()?))
    }
}

impl<C: AuthorityClient> NotificationGateway<C> {
    pub fn new(queue: AuthorizationDispatchQueue<C>, codec: TopicKeyCodec) -> Self {
        Self { queue, codec }
    }

    pub fn queue(&self) -> &AuthorizationDispatchQueue<C> {
        &self.queue
    }

    pub fn codec(&self) -> &TopicKeyCodec {
        &self.codec
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            pool_size: self.queue.pool_size(),
            idle: self.queue.idle_workers(),
            in_flight: self.queue.in_flight(),
            queued: self.queue.queued(),
        }
    }

    /// Run a raw authorization request through the queue.
    pub async fn authorize(
        &self,
        request: AuthorizationRequest,
    ) -> Result<AuthorityUser, GatewayError> {
        Ok(self.queue.submit(request).await?)
    }

    // ---- stakeholders ----

    /// Authorize `acting_user_id` to assign a stakeholder on a job and plan
    /// the key changes.
    ///
    /// `existing` are the stakeholder's currently registered keys; those of
    /// the same job and stage that are no longer wanted come back in
    /// [`SubscriptionPlan::unsubscribe`]. Keys are built before the
    /// authority is consulted, so malformed input never costs a round trip.
    pub async fn authorize_stakeholder_subscription<S: AsRef<str>>(
        &self,
        acting_user_id: &str,
        account_id: &str,
        job_id: &str,
        change: &StakeholderChange,
        existing: &[S],
    ) -> Result<SubscriptionPlan, GatewayError> {
        if self.codec.catalog().stage(&change.stage).is_none() {
            return Err(CoreError::Validation(format!("Unknown stage: {}", change.stage)).into());
        }
        let subscribe =
            subscriptions::stakeholder_keys(&self.codec, job_id, &change.stage, &change.parts)?;

        let subscriber = self
            .queue
            .submit(AuthorizationRequest::EditStakeholder {
                account_id: account_id.to_string(),
                job_id: job_id.to_string(),
                user_id: acting_user_id.to_string(),
                stakeholder_id: change.stakeholder_id.clone(),
                stage: change.stage.clone(),
            })
            .await?;

        let prefix = TopicKeyCodec::stakeholder_prefix(job_id);
        let unsubscribe = self.stale(existing, &prefix, &subscribe, ReplaceScope::Stage(&change.stage));

        tracing::info!(
            account_id,
            job_id,
            acting_user_id,
            stakeholder_id = %change.stakeholder_id,
            stage = %change.stage,
            subscribe = subscribe.len(),
            unsubscribe = unsubscribe.len(),
            "Stakeholder subscription authorized"
        );
        Ok(SubscriptionPlan {
            subscriber,
            subscribe,
            unsubscribe,
        })
    }

    /// Stakeholder assignments of a job, grouped by subscriber and stage.
    ///
    /// `topics` is the topic store's listing under the job's stakeholder
    /// prefix; topics of other jobs are ignored.
    pub async fn stakeholder_overview(
        &self,
        user_id: &str,
        account_id: &str,
        job_id: &str,
        topics: &[TopicSubscribers],
    ) -> Result<StakeholderMatrix, GatewayError> {
        self.queue
            .submit(AuthorizationRequest::CheckPermission {
                account_id: account_id.to_string(),
                user_id: user_id.to_string(),
                permissions: vec![STAKEHOLDER_VIEW.to_string()],
            })
            .await?;

        let prefix = TopicKeyCodec::stakeholder_prefix(job_id);
        let of_job: Vec<_> = topics
            .iter()
            .filter(|t| t.key.starts_with(&prefix))
            .cloned()
            .collect();
        Ok(subscriptions::group_stakeholder_subscriptions(&self.codec, &of_job))
    }

    /// Key a stakeholder trigger for one part of a job publishes to.
    pub fn stakeholder_trigger_key(
        &self,
        job_id: &str,
        stage: &str,
        part: &str,
    ) -> Result<TopicKey, GatewayError> {
        Ok(self.codec.build_stakeholder_key(job_id, stage, part)?)
    }

    // ---- informative ----

    /// Authorize `user_id` to subscribe to an informative event of the
    /// account and plan the key changes.
    ///
    /// Any member of the account may subscribe. `existing` are the user's
    /// currently registered keys; those of the same account and event that
    /// are no longer wanted come back in [`SubscriptionPlan::unsubscribe`].
    pub async fn authorize_informative_subscription<S: AsRef<str>>(
        &self,
        user_id: &str,
        account_id: &str,
        change: &InformativeChange,
        existing: &[S],
    ) -> Result<SubscriptionPlan, GatewayError> {
        let subscribe = subscriptions::informative_keys(
            &self.codec,
            account_id,
            &change.event,
            &change.parts,
            user_id,
            change.all_titles,
        )?;

        let subscriber = self.check_membership(user_id, account_id).await?;

        let prefix = TopicKeyCodec::informative_prefix(account_id);
        let unsubscribe = self.stale(existing, &prefix, &subscribe, ReplaceScope::Event(&change.event));

        tracing::info!(
            account_id,
            user_id,
            event = %change.event,
            all_titles = change.all_titles,
            subscribe = subscribe.len(),
            unsubscribe = unsubscribe.len(),
            "Informative subscription authorized"
        );
        Ok(SubscriptionPlan {
            subscriber,
            subscribe,
            unsubscribe,
        })
    }

    /// A member's informative subscriptions in the account, per event.
    pub async fn informative_preferences<S: AsRef<str>>(
        &self,
        user_id: &str,
        account_id: &str,
        keys: &[S],
    ) -> Result<Vec<InformativeSummary>, GatewayError> {
        self.check_membership(user_id, account_id).await?;

        let prefix = TopicKeyCodec::informative_prefix(account_id);
        let in_account: Vec<&str> = keys
            .iter()
            .map(AsRef::<str>::as_ref)
            .filter(|k| k.starts_with(&prefix))
            .collect();
        Ok(subscriptions::summarize_informative(&self.codec, &in_account)
            .into_values()
            .collect())
    }

    /// Keys an informative trigger publishes to.
    ///
    /// Always the "all titles" key. When the trigger concerns a job, also
    /// the "my titles" key of every user the authority lists as assigned to
    /// it (job scope = account).
    pub async fn informative_trigger_keys(
        &self,
        account_id: &str,
        event: &str,
        part: Option<&str>,
        job_id: Option<&str>,
    ) -> Result<Vec<TopicKey>, GatewayError> {
        let assignees = match job_id {
            Some(job_id) if !self.codec.catalog().is_administrative(event) => {
                self.queue.job_assignees(account_id, job_id).await?
            }
            _ => Vec::new(),
        };
        Ok(subscriptions::informative_trigger_keys(
            &self.codec,
            account_id,
            event,
            part,
            &assignees,
        )?)
    }

    /// Build a single informative key.
    pub fn informative_key(&self, parts: &InformativeKeyParts<'_>) -> Result<TopicKey, GatewayError> {
        Ok(self.codec.build_informative_key(parts)?)
    }

    /// Whether `job_id` is one of the user's titles in the account.
    pub async fn is_my_title(
        &self,
        user_id: &str,
        account_id: &str,
        job_id: &str,
    ) -> Result<bool, GatewayError> {
        Ok(self.queue.is_assigned(user_id, account_id, job_id).await?)
    }

    pub fn parse_key(&self, key: &str) -> Option<TopicAddress> {
        self.codec.parse_key(key)
    }

    // ---- private helpers ----

    async fn check_membership(
        &self,
        user_id: &str,
        account_id: &str,
    ) -> Result<AuthorityUser, GatewayError> {
        Ok(self
            .queue
            .submit(AuthorizationRequest::CheckPermission {
                account_id: account_id.to_string(),
                user_id: user_id.to_string(),
                permissions: Vec::new(),
            })
            .await?)
    }

    fn stale<S: AsRef<str>>(
        &self,
        existing: &[S],
        prefix: &str,
        desired: &[TopicKey],
        scope: ReplaceScope<'_>,
    ) -> Vec<String> {
        let in_scope: Vec<&str> = existing
            .iter()
            .map(AsRef::<str>::as_ref)
            .filter(|k| k.starts_with(prefix))
            .collect();
        subscriptions::stale_keys(&self.codec, &in_scope, desired, scope)
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

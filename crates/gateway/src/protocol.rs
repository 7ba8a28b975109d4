//! Line protocol of the `notigate-gateway` sidecar.
//!
//! One JSON command per input line, one JSON reply per output line. A
//! command may carry an `id`, echoed on its reply; replies can arrive out of
//! order since commands run concurrently.
//!
//! ```text
//! {"id":1,"op":"authorize","request":{"type":"check_permission","account_id":"a1","user_id":"u1","permissions":["Stakeholder_View"]}}
//! {"id":1,"ok":true,"result":{"Email":"u1@example.com", ...}}
//! {"id":2,"op":"parse_key","key":"stakeholder:job1:Approve_Cover:cover"}
//! {"id":2,"ok":true,"result":{"kind":"stakeholder","job_id":"job1","stage":"Approve_Cover","part":"cover"}}
//! ```
//!
//! Denials reply `{"ok":false,"error":"unauthorized"}` and nothing more.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use notigate_authority::{AuthorityClient, AuthorizationRequest};
use notigate_core::subscriptions::TopicSubscribers;
use notigate_core::InformativeKeyParts;

use crate::error::GatewayError;
use crate::service::{InformativeChange, NotificationGateway, StakeholderChange};

/// A command line: optional correlation id plus the operation.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub command: Command,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Authorize {
        request: AuthorizationRequest,
    },
    StakeholderKey {
        job_id: String,
        stage: String,
        part: String,
    },
    InformativeKey {
        account_id: String,
        event: String,
        #[serde(default)]
        part: Option<String>,
        #[serde(default)]
        subscriber_id: Option<String>,
        #[serde(default)]
        all_titles: bool,
    },
    ParseKey {
        key: String,
    },
    SubscribeStakeholder {
        acting_user_id: String,
        account_id: String,
        job_id: String,
        #[serde(flatten)]
        change: StakeholderChange,
        #[serde(default)]
        existing: Vec<String>,
    },
    SubscribeInformative {
        user_id: String,
        account_id: String,
        #[serde(flatten)]
        change: InformativeChange,
        #[serde(default)]
        existing: Vec<String>,
    },
    Stakeholders {
        user_id: String,
        account_id: String,
        job_id: String,
        topics: Vec<TopicListing>,
    },
    InformativePreferences {
        user_id: String,
        account_id: String,
        keys: Vec<String>,
    },
    TriggerKeys {
        account_id: String,
        event: String,
        #[serde(default)]
        part: Option<String>,
        #[serde(default)]
        job_id: Option<String>,
    },
    IsMyTitle {
        user_id: String,
        account_id: String,
        job_id: String,
    },
    Status,
}

impl Command {
    pub fn op(&self) -> &'static str {
        match self {
            Self::Authorize { .. } => "authorize",
            Self::StakeholderKey { .. } => "stakeholder_key",
            Self::InformativeKey { .. } => "informative_key",
            Self::ParseKey { .. } => "parse_key",
            Self::SubscribeStakeholder { .. } => "subscribe_stakeholder",
            Self::SubscribeInformative { .. } => "subscribe_informative",
            Self::Stakeholders { .. } => "stakeholders",
            Self::InformativePreferences { .. } => "informative_preferences",
            Self::TriggerKeys { .. } => "trigger_keys",
            Self::IsMyTitle { .. } => "is_my_title",
            Self::Status => "status",
        }
    }
}

/// A topic and its subscribers as listed by the topic store.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicListing {
    pub key: String,
    #[serde(default)]
    pub subscribers: Vec<String>,
}

/// One output line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<Value>, error: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Reply for a line that is not a valid command.
    pub fn malformed(err: &serde_json::Error) -> Self {
        Self::failure(None, format!("invalid command: {err}"))
    }
}

/// Parse one input line.
pub fn parse_line(line: &str) -> Result<Envelope, serde_json::Error> {
    serde_json::from_str(line)
}

/// Run one command against the gateway.
pub async fn handle<C: AuthorityClient>(
    gateway: &NotificationGateway<C>,
    envelope: Envelope,
) -> Reply {
    let Envelope { id, command } = envelope;
    let op = command.op();

    match execute(gateway, command).await {
        Ok(result) => Reply::success(id, result),
        Err(e) if e.is_unauthorized() => Reply::failure(id, "unauthorized"),
        Err(e) => {
            if e.is_invalid_input() {
                tracing::debug!(op, error = %e, "Rejected command");
            } else {
                tracing::warn!(op, error = %e, "Command failed");
            }
            Reply::failure(id, e.to_string())
        }
    }
}

async fn execute<C: AuthorityClient>(
    gateway: &NotificationGateway<C>,
    command: Command,
) -> Result<Value, GatewayError> {
    let value = match command {
        Command::Authorize { request } => to_value(gateway.authorize(request).await?),
        Command::StakeholderKey {
            job_id,
            stage,
            part,
        } => to_value(gateway.stakeholder_trigger_key(&job_id, &stage, &part)?),
        Command::InformativeKey {
            account_id,
            event,
            part,
            subscriber_id,
            all_titles,
        } => to_value(gateway.informative_key(&InformativeKeyParts {
            account_id: &account_id,
            event: &event,
            part: part.as_deref(),
            subscriber_id: subscriber_id.as_deref(),
            all_titles,
        })?),
        Command::ParseKey { key } => to_value(gateway.parse_key(&key)),
        Command::SubscribeStakeholder {
            acting_user_id,
            account_id,
            job_id,
            change,
            existing,
        } => to_value(
            gateway
                .authorize_stakeholder_subscription(
                    &acting_user_id,
                    &account_id,
                    &job_id,
                    &change,
                    &existing,
                )
                .await?,
        ),
        Command::SubscribeInformative {
            user_id,
            account_id,
            change,
            existing,
        } => to_value(
            gateway
                .authorize_informative_subscription(&user_id, &account_id, &change, &existing)
                .await?,
        ),
        Command::Stakeholders {
            user_id,
            account_id,
            job_id,
            topics,
        } => {
            let topics: Vec<_> = topics
                .into_iter()
                .map(|t| TopicSubscribers {
                    key: t.key,
                    subscribers: t.subscribers,
                })
                .collect();
            to_value(
                gateway
                    .stakeholder_overview(&user_id, &account_id, &job_id, &topics)
                    .await?,
            )
        }
        Command::InformativePreferences {
            user_id,
            account_id,
            keys,
        } => to_value(
            gateway
                .informative_preferences(&user_id, &account_id, &keys)
                .await?,
        ),
        Command::TriggerKeys {
            account_id,
            event,
            part,
            job_id,
        } => to_value(
            gateway
                .informative_trigger_keys(&account_id, &event, part.as_deref(), job_id.as_deref())
                .await?,
        ),
        Command::IsMyTitle {
            user_id,
            account_id,
            job_id,
        } => to_value(gateway.is_my_title(&user_id, &account_id, &job_id).await?),
        Command::Status => to_value(gateway.status()),
    };
    Ok(value)
}

fn to_value<T: Serialize>(value: T) -> Value {
    // Result types have string keys only, so this cannot fail.
    serde_json::to_value(value).unwrap_or(Value::Null)
}

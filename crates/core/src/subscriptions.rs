//! Subscription planning over topic keys.
//!
//! Pure helpers used when a subscriber replaces a subscription or when an
//! event is triggered: which keys to register, which previously registered
//! keys became stale, and how a set of registered keys reads back as a
//! preferences summary.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::topic_key::{InformativeKeyParts, KeyError, TopicAddress, TopicKey, TopicKeyCodec};

// ---------------------------------------------------------------------------
// Key fan-out
// ---------------------------------------------------------------------------

/// Keys for a stakeholder assigned to `stage` on `parts` of a job.
///
/// Duplicate parts collapse into one key.
pub fn stakeholder_keys(
    codec: &TopicKeyCodec,
    job_id: &str,
    stage: &str,
    parts: &[String],
) -> Result<Vec<TopicKey>, KeyError> {
    let mut keys = Vec::with_capacity(parts.len());
    for part in parts {
        push_unique(&mut keys, codec.build_stakeholder_key(job_id, stage, part)?);
    }
    Ok(keys)
}

/// Keys for one subscriber's informative subscription.
///
/// Administrative events and events without parts produce exactly one key;
/// otherwise one key per part.
pub fn informative_keys(
    codec: &TopicKeyCodec,
    account_id: &str,
    event: &str,
    parts: &[String],
    subscriber_id: &str,
    all_titles: bool,
) -> Result<Vec<TopicKey>, KeyError> {
    let meta = codec
        .catalog()
        .event(event)
        .ok_or_else(|| KeyError::UnknownEvent(event.to_string()))?;

    let build = |part: Option<&str>| {
        codec.build_informative_key(&InformativeKeyParts {
            account_id,
            event,
            part,
            subscriber_id: Some(subscriber_id),
            all_titles,
        })
    };

    if !meta.keyed_by_part() {
        return Ok(vec![build(None)?]);
    }
    if parts.is_empty() {
        return Err(KeyError::MissingPart(event.to_string()));
    }

    let mut keys = Vec::with_capacity(parts.len());
    for part in parts {
        push_unique(&mut keys, build(Some(part.as_str()))?);
    }
    Ok(keys)
}

/// Keys an informative trigger publishes to.
///
/// Always the "all titles" key; plus, for non-administrative events, the
/// "my titles" key of every subscriber assigned to the triggering job.
pub fn informative_trigger_keys(
    codec: &TopicKeyCodec,
    account_id: &str,
    event: &str,
    part: Option<&str>,
    assigned_subscribers: &[String],
) -> Result<Vec<TopicKey>, KeyError> {
    let all_titles = codec.build_informative_key(&InformativeKeyParts {
        account_id,
        event,
        part,
        subscriber_id: None,
        all_titles: true,
    })?;

    let mut keys = vec![all_titles];
    if codec.catalog().is_administrative(event) {
        return Ok(keys);
    }
    for subscriber_id in assigned_subscribers {
        let key = codec.build_informative_key(&InformativeKeyParts {
            account_id,
            event,
            part,
            subscriber_id: Some(subscriber_id.as_str()),
            all_titles: false,
        })?;
        push_unique(&mut keys, key);
    }
    Ok(keys)
}

fn push_unique(keys: &mut Vec<TopicKey>, key: TopicKey) {
    if !keys.contains(&key) {
        keys.push(key);
    }
}

// ---------------------------------------------------------------------------
// Stale keys
// ---------------------------------------------------------------------------

/// Which registered keys a replacement subscription supersedes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceScope<'a> {
    /// Stakeholder keys of this stage.
    Stage(&'a str),
    /// Informative keys of this event.
    Event(&'a str),
}

/// Registered keys to unsubscribe when `desired` replaces the keys in
/// `scope`.
///
/// Keys outside the scope, keys still desired, and keys that do not parse
/// are left alone.
pub fn stale_keys<'a, S: AsRef<str>>(
    codec: &TopicKeyCodec,
    existing: &'a [S],
    desired: &[TopicKey],
    scope: ReplaceScope<'_>,
) -> Vec<&'a str> {
    existing
        .iter()
        .map(AsRef::<str>::as_ref)
        .filter(|key| !desired.iter().any(|d| d == *key))
        .filter(|key| match (codec.parse_key(key), scope) {
            (Some(TopicAddress::Stakeholder(a)), ReplaceScope::Stage(stage)) => a.stage == stage,
            (Some(TopicAddress::Informative(a)), ReplaceScope::Event(event)) => a.event == event,
            _ => false,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Read-back
// ---------------------------------------------------------------------------

/// A topic and the subscribers registered under it, as listed by the
/// topic store.
#[derive(Debug, Clone)]
pub struct TopicSubscribers {
    pub key: String,
    pub subscribers: Vec<String>,
}

/// subscriber id → stage → parts.
pub type StakeholderMatrix = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Group the stakeholder topics of a job by subscriber and stage.
pub fn group_stakeholder_subscriptions(
    codec: &TopicKeyCodec,
    topics: &[TopicSubscribers],
) -> StakeholderMatrix {
    let mut matrix = StakeholderMatrix::new();
    for topic in topics {
        let Some(TopicAddress::Stakeholder(address)) = codec.parse_key(&topic.key) else {
            continue;
        };
        for subscriber in &topic.subscribers {
            let parts = matrix
                .entry(subscriber.clone())
                .or_default()
                .entry(address.stage.clone())
                .or_default();
            if !parts.contains(&address.part) {
                parts.push(address.part.clone());
            }
        }
    }
    matrix
}

/// One event's worth of a subscriber's informative subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InformativeSummary {
    pub event: String,
    pub parts: Vec<String>,
    pub keys: Vec<String>,
    pub all_titles: bool,
    pub administrative: bool,
}

/// Summarize a subscriber's informative keys per event.
pub fn summarize_informative<S: AsRef<str>>(
    codec: &TopicKeyCodec,
    keys: &[S],
) -> BTreeMap<String, InformativeSummary> {
    let mut summary: BTreeMap<String, InformativeSummary> = BTreeMap::new();
    for key in keys.iter().map(AsRef::<str>::as_ref) {
        let Some(TopicAddress::Informative(address)) = codec.parse_key(key) else {
            continue;
        };
        let administrative = codec.catalog().is_administrative(&address.event);
        let entry = summary
            .entry(address.event.clone())
            .or_insert_with(|| InformativeSummary {
                event: address.event.clone(),
                parts: Vec::new(),
                keys: Vec::new(),
                all_titles: address.subscriber_id.is_none() && !administrative,
                administrative,
            });
        if let Some(part) = address.part {
            if !entry.parts.contains(&part) {
                entry.parts.push(part);
            }
        }
        entry.keys.push(key.to_string());
    }
    summary
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

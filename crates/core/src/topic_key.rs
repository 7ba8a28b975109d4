//! Topic key addressing.
//!
//! A topic key is the flat string under which a subscription is registered
//! in the notification platform's topic store. Two subscription shapes are
//! addressed:
//!
//! - stakeholder reviews, keyed by job × stage × part:
//!   `stakeholder:<jobId>:<stage>:<part>`
//! - informative events, keyed by account × event × part × subscriber:
//!   `informative:<accountId>:<event>[:<part>][:<subscriberId>]`
//!
//! Those are the *segmented* forms. Older keys use an *encoded* form whose
//! third segment is base64-encoded JSON. [`TopicKeyCodec`] builds keys in
//! its active [`KeyEncoding`] and parses either form, depending on
//! configuration. Parsing never fails loudly: malformed input yields `None`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::catalog::EventCatalog;

/// Namespace of stakeholder review keys.
pub const STAKEHOLDER_NAMESPACE: &str = "stakeholder";

/// Namespace of informative event keys.
pub const INFORMATIVE_NAMESPACE: &str = "informative";

const SEPARATOR: char = ':';

// ---------------------------------------------------------------------------
// TopicKey
// ---------------------------------------------------------------------------

/// A built topic key. Only [`TopicKeyCodec`] constructs these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TopicKey(String);

impl TopicKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// The namespace segment (`"stakeholder"` or `"informative"`).
    pub fn namespace(&self) -> &str {
        self.0.split(SEPARATOR).next().unwrap_or_default()
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TopicKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<TopicKey> for String {
    fn from(key: TopicKey) -> Self {
        key.0
    }
}

impl PartialEq<str> for TopicKey {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TopicKey {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// The address style new keys are built in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEncoding {
    /// Colon-delimited plain segments.
    #[default]
    Segmented,
    /// Base64-encoded JSON payload in the third segment.
    Encoded,
}

impl FromStr for KeyEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "segmented" => Ok(Self::Segmented),
            "encoded" => Ok(Self::Encoded),
            other => Err(format!("Unknown topic key encoding: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a topic key cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("Invalid {field} {value:?}: must be non-empty and must not contain ':'")]
    InvalidSegment { field: &'static str, value: String },

    #[error("Unknown informative event: {0}")]
    UnknownEvent(String),

    #[error("Event {0} is scoped to parts; a part is required")]
    MissingPart(String),

    #[error("Event {0} targets a subscriber's titles; a subscriber id is required")]
    MissingSubscriber(String),

    #[error("Failed to encode key payload: {0}")]
    Payload(String),
}

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// A stakeholder review subscription address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeholderAddress {
    pub job_id: String,
    pub stage: String,
    pub part: String,
}

/// An informative event subscription address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InformativeAddress {
    pub account_id: String,
    pub event: String,
    pub part: Option<String>,
    /// Present for "my titles" subscriptions; absent for "all titles" and
    /// administrative events.
    pub subscriber_id: Option<String>,
}

/// The decoded fields of a topic key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopicAddress {
    Stakeholder(StakeholderAddress),
    Informative(InformativeAddress),
}

impl TopicAddress {
    pub fn as_stakeholder(&self) -> Option<&StakeholderAddress> {
        match self {
            Self::Stakeholder(address) => Some(address),
            Self::Informative(_) => None,
        }
    }

    pub fn as_informative(&self) -> Option<&InformativeAddress> {
        match self {
            Self::Informative(address) => Some(address),
            Self::Stakeholder(_) => None,
        }
    }
}

/// Inputs for [`TopicKeyCodec::build_informative_key`].
#[derive(Debug, Clone, Copy)]
pub struct InformativeKeyParts<'a> {
    pub account_id: &'a str,
    pub event: &'a str,
    pub part: Option<&'a str>,
    pub subscriber_id: Option<&'a str>,
    /// Subscribe to the event on every title of the account rather than
    /// the subscriber's own titles.
    pub all_titles: bool,
}

// ---------------------------------------------------------------------------
// Encoded payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct StakeholderPayload {
    part: String,
    stage: String,
    #[serde(rename = "jobId", default, skip_serializing_if = "Option::is_none")]
    job_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct InformativePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    part: Option<String>,
    event: String,
    // Older keys also recorded the delivery channel; it is not part of the
    // address.
    #[serde(default, skip_serializing)]
    #[allow(dead_code)]
    channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    administrative: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn encode_payload<T: Serialize>(payload: &T) -> Result<String, KeyError> {
    let json = serde_json::to_vec(payload).map_err(|e| KeyError::Payload(e.to_string()))?;
    Ok(STANDARD.encode(json))
}

fn decode_payload<T: serde::de::DeserializeOwned>(segment: &str) -> Option<T> {
    let bytes = STANDARD.decode(segment).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn validate_segment(field: &'static str, value: &str) -> Result<(), KeyError> {
    if value.is_empty() || value.contains(SEPARATOR) {
        return Err(KeyError::InvalidSegment {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// TopicKeyCodec
// ---------------------------------------------------------------------------

/// Builds and parses topic keys.
///
/// Event metadata is taken from the codec's [`EventCatalog`], never inferred
/// from the shape of a key: a segmented informative key for an event without
/// parts parses with `part == None` even when a stray part segment is
/// present.
#[derive(Debug, Clone)]
pub struct TopicKeyCodec {
    encoding: KeyEncoding,
    legacy_fallback: bool,
    catalog: Arc<EventCatalog>,
}

impl TopicKeyCodec {
    /// Create a codec building segmented keys and still accepting encoded
    /// keys on parse.
    pub fn new(catalog: Arc<EventCatalog>) -> Self {
        Self {
            encoding: KeyEncoding::Segmented,
            legacy_fallback: true,
            catalog,
        }
    }

    pub fn with_encoding(mut self, encoding: KeyEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Whether encoded keys are accepted while segmented is active.
    pub fn with_legacy_fallback(mut self, enabled: bool) -> Self {
        self.legacy_fallback = enabled;
        self
    }

    pub fn encoding(&self) -> KeyEncoding {
        self.encoding
    }

    pub fn catalog(&self) -> &EventCatalog {
        &self.catalog
    }

    /// Prefix shared by every stakeholder key of a job.
    pub fn stakeholder_prefix(job_id: &str) -> String {
        format!("{STAKEHOLDER_NAMESPACE}{SEPARATOR}{job_id}{SEPARATOR}")
    }

    /// Prefix shared by every informative key of an account.
    pub fn informative_prefix(account_id: &str) -> String {
        format!("{INFORMATIVE_NAMESPACE}{SEPARATOR}{account_id}{SEPARATOR}")
    }

    // ---- build ----

    /// Build the key of a stakeholder review subscription.
    pub fn build_stakeholder_key(
        &self,
        job_id: &str,
        stage: &str,
        part: &str,
    ) -> Result<TopicKey, KeyError> {
        validate_segment("job id", job_id)?;
        validate_segment("stage", stage)?;
        validate_segment("part", part)?;

        let key = match self.encoding {
            KeyEncoding::Segmented => {
                format!("{STAKEHOLDER_NAMESPACE}:{job_id}:{stage}:{part}")
            }
            KeyEncoding::Encoded => {
                let payload = encode_payload(&StakeholderPayload {
                    part: part.to_string(),
                    stage: stage.to_string(),
                    job_id: Some(job_id.to_string()),
                })?;
                format!("{STAKEHOLDER_NAMESPACE}:{job_id}:{payload}")
            }
        };
        Ok(TopicKey(key))
    }

    /// Build the key of an informative event subscription.
    ///
    /// The part is kept only for events scoped to parts; the subscriber id
    /// only for "my titles" subscriptions to non-administrative events.
    pub fn build_informative_key(
        &self,
        parts: &InformativeKeyParts<'_>,
    ) -> Result<TopicKey, KeyError> {
        validate_segment("account id", parts.account_id)?;
        let meta = self
            .catalog
            .event(parts.event)
            .ok_or_else(|| KeyError::UnknownEvent(parts.event.to_string()))?;
        validate_segment("event", parts.event)?;

        let part = if meta.keyed_by_part() {
            let part = parts
                .part
                .ok_or_else(|| KeyError::MissingPart(meta.value.clone()))?;
            validate_segment("part", part)?;
            Some(part)
        } else {
            None
        };

        let subscriber_id = if meta.administrative || parts.all_titles {
            None
        } else {
            let subscriber_id = parts
                .subscriber_id
                .ok_or_else(|| KeyError::MissingSubscriber(meta.value.clone()))?;
            validate_segment("subscriber id", subscriber_id)?;
            Some(subscriber_id)
        };

        let key = match self.encoding {
            KeyEncoding::Segmented => {
                let mut key = format!("{INFORMATIVE_NAMESPACE}:{}:{}", parts.account_id, parts.event);
                for segment in [part, subscriber_id].into_iter().flatten() {
                    key.push(SEPARATOR);
                    key.push_str(segment);
                }
                key
            }
            KeyEncoding::Encoded => {
                let payload = encode_payload(&InformativePayload {
                    part: part.map(str::to_string),
                    event: parts.event.to_string(),
                    channel: None,
                    user: subscriber_id.map(str::to_string),
                    administrative: meta.administrative,
                })?;
                format!("{INFORMATIVE_NAMESPACE}:{}:{payload}", parts.account_id)
            }
        };
        Ok(TopicKey(key))
    }

    // ---- parse ----

    /// Decode a key into its address fields.
    ///
    /// Returns `None` for unknown namespaces, wrong segment counts, invalid
    /// base64 or JSON payloads, events missing from the catalog, and keys
    /// that are not well-formed for the active encoding.
    pub fn parse_key(&self, key: &str) -> Option<TopicAddress> {
        let segments: Vec<&str> = key.split(SEPARATOR).collect();
        let [namespace, scope, rest @ ..] = segments.as_slice() else {
            return None;
        };
        if scope.is_empty() || rest.is_empty() {
            return None;
        }

        match self.encoding {
            KeyEncoding::Segmented => self
                .parse_segmented(namespace, scope, rest)
                .or_else(|| match rest {
                    [payload] if self.legacy_fallback => {
                        self.parse_encoded(namespace, scope, payload)
                    }
                    _ => None,
                }),
            KeyEncoding::Encoded => match rest {
                [payload] => self.parse_encoded(namespace, scope, payload),
                _ => None,
            },
        }
    }

    fn parse_segmented(&self, namespace: &str, scope: &str, rest: &[&str]) -> Option<TopicAddress> {
        if rest.iter().any(|s| s.is_empty()) {
            return None;
        }
        match namespace {
            STAKEHOLDER_NAMESPACE => match rest {
                [stage, part] => Some(TopicAddress::Stakeholder(StakeholderAddress {
                    job_id: scope.to_string(),
                    stage: stage.to_string(),
                    part: part.to_string(),
                })),
                _ => None,
            },
            INFORMATIVE_NAMESPACE => self.parse_segmented_informative(scope, rest),
            _ => None,
        }
    }

    fn parse_segmented_informative(&self, account_id: &str, rest: &[&str]) -> Option<TopicAddress> {
        let (event, tail) = rest.split_first()?;
        let meta = self.catalog.event(event)?;

        let (part, subscriber_id) = if meta.administrative {
            // Account-wide: at most a stray part segment, never a subscriber.
            match tail {
                [] | [_] => (None, None),
                _ => return None,
            }
        } else if meta.has_parts {
            match tail {
                [part] => (Some(*part), None),
                [part, subscriber] => (Some(*part), Some(*subscriber)),
                _ => return None,
            }
        } else {
            match tail {
                [] => (None, None),
                [subscriber] | [_, subscriber] => (None, Some(*subscriber)),
                _ => return None,
            }
        };

        Some(TopicAddress::Informative(InformativeAddress {
            account_id: account_id.to_string(),
            event: event.to_string(),
            part: part.map(str::to_string),
            subscriber_id: subscriber_id.map(str::to_string),
        }))
    }

    fn parse_encoded(&self, namespace: &str, scope: &str, payload: &str) -> Option<TopicAddress> {
        match namespace {
            STAKEHOLDER_NAMESPACE => {
                let payload: StakeholderPayload = decode_payload(payload)?;
                Some(TopicAddress::Stakeholder(StakeholderAddress {
                    job_id: scope.to_string(),
                    stage: payload.stage,
                    part: payload.part,
                }))
            }
            INFORMATIVE_NAMESPACE => {
                let payload: InformativePayload = decode_payload(payload)?;
                let meta = self.catalog.event(&payload.event);
                let administrative =
                    payload.administrative || meta.is_some_and(|m| m.administrative);
                // Events no longer in the catalog keep whatever part was recorded.
                let keyed_by_part = !administrative && meta.map_or(true, |m| m.has_parts);

                Some(TopicAddress::Informative(InformativeAddress {
                    account_id: scope.to_string(),
                    event: payload.event,
                    part: payload.part.filter(|_| keyed_by_part),
                    subscriber_id: payload.user.filter(|_| !administrative),
                }))
            }
            _ => None,
        }
    }
}

impl Default for TopicKeyCodec {
    fn default() -> Self {
        Self::new(Arc::new(EventCatalog::default()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

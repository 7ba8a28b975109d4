//! Core building blocks of the notification-preference gateway.
//!
//! - [`catalog`]: informative event and stakeholder stage metadata.
//! - [`topic_key`]: building and parsing topic-store addresses.
//! - [`subscriptions`]: planning helpers layered over the codec
//!   (fan-out, stale-key detection, grouping).
//! - [`permissions`]: well-known authority permission names.

pub mod catalog;
pub mod error;
pub mod permissions;
pub mod subscriptions;
pub mod topic_key;

pub use catalog::{EventCatalog, EventMeta, StageMeta};
pub use error::CoreError;
pub use topic_key::{
    InformativeAddress, InformativeKeyParts, KeyEncoding, KeyError, StakeholderAddress,
    TopicAddress, TopicKey, TopicKeyCodec,
};

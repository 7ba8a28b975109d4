//! Notification-preference gateway.
//!
//! [`NotificationGateway`] authorizes subscription changes against the
//! partner authority (through the bounded session pool of
//! `notigate-authority`) and translates them into topic keys (through the
//! codec of `notigate-core`). The `notigate-gateway` binary exposes it as a
//! line-delimited JSON sidecar, see [`protocol`].

pub mod config;
pub mod error;
pub mod protocol;
pub mod service;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use service::{
    InformativeChange, NotificationGateway, PoolStatus, StakeholderChange, SubscriptionPlan,
};

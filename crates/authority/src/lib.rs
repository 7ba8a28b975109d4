//! Authorization against the partner authority.
//!
//! - [`HttpAuthority`]: reqwest client for the authority's REST surface,
//!   one cookie jar per instance.
//! - [`AuthoritySession`]: one authenticated session with time-boxed
//!   re-login and the session-scoped primitives.
//! - [`PermissionResolver`]: composite permission checks that collapse
//!   denials into a single unauthorized outcome.
//! - [`AuthorizationDispatchQueue`]: FIFO queue serializing requests over a
//!   fixed pool of sessions.

pub mod api;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod permissions;
pub mod request;
pub mod session;

pub use api::HttpAuthority;
pub use client::AuthorityClient;
pub use config::{AuthorityConfig, ConfigError};
pub use dispatch::AuthorizationDispatchQueue;
pub use error::{AuthorityError, AuthorizationError};
pub use model::{AuthorityUser, RoleDefinition, Roleset};
pub use permissions::PermissionResolver;
pub use request::AuthorizationRequest;
pub use session::AuthoritySession;

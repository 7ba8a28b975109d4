//! Records returned by the authority.
//!
//! The authority uses PascalCase field names and is inconsistent about id
//! types (some deployments return numeric account and job ids). All ids
//! are normalized to strings on the way in.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Deserializer, Serialize};

/// A user record from `GET /admin/user/:id`.
///
/// `role_ids[i]` is the user's role in `account_memberships[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityUser {
    #[serde(rename = "Email", default)]
    pub email: String,

    #[serde(rename = "UserID", default, deserialize_with = "id")]
    pub external_user_id: String,

    #[serde(rename = "FirstName", default)]
    pub first_name: String,

    #[serde(rename = "LastName", default)]
    pub last_name: String,

    #[serde(rename = "Accounts", default, deserialize_with = "id_list")]
    pub account_memberships: Vec<String>,

    #[serde(rename = "Roles", default, deserialize_with = "id_list")]
    pub role_ids: Vec<String>,

    /// Job-scope id → ids of the jobs assigned to the user ("my titles").
    #[serde(
        rename = "JobsList",
        default,
        deserialize_with = "jobs_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub jobs_list: Option<BTreeMap<String, Vec<String>>>,
}

impl AuthorityUser {
    /// The user's role name within `account_id`, if they are a member.
    pub fn role_in(&self, account_id: &str) -> Option<&str> {
        let index = self
            .account_memberships
            .iter()
            .position(|a| a == account_id)?;
        self.role_ids.get(index).map(String::as_str)
    }

    /// Whether `job_id` is in the user's job list under `job_scope_id`.
    ///
    /// A missing list or scope reads as "not assigned".
    pub fn is_assigned(&self, job_scope_id: &str, job_id: &str) -> bool {
        self.jobs_list
            .as_ref()
            .and_then(|jobs| jobs.get(job_scope_id))
            .is_some_and(|jobs| jobs.iter().any(|j| j == job_id))
    }
}

/// The roleset of an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roleset {
    #[serde(rename = "Roles", default)]
    pub roles: HashMap<String, RoleDefinition>,
}

impl Roleset {
    /// Permissions granted by `role`, if the roleset defines it.
    pub fn permissions(&self, role: &str) -> Option<&[String]> {
        self.roles.get(role).map(|r| r.permissions.as_slice())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    #[serde(rename = "Permissions", default)]
    pub permissions: Vec<String>,
}

/// Body of `GET /admin/account/:accountId`; only the roleset is read.
#[derive(Debug, Deserialize)]
pub(crate) struct AccountRecord {
    #[serde(rename = "Roleset", default)]
    pub roleset: Roleset,
}

// ---------------------------------------------------------------------------
// Id normalization
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

fn id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Option::<RawId>::deserialize(deserializer).map(|raw| raw.map(String::from).unwrap_or_default())
}

fn id_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let raw = Option::<Vec<RawId>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(String::from)
        .collect())
}

fn jobs_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<BTreeMap<String, Vec<String>>>, D::Error> {
    let raw = Option::<BTreeMap<String, Option<Vec<RawId>>>>::deserialize(deserializer)?;
    Ok(raw.map(|scopes| {
        scopes
            .into_iter()
            .map(|(scope, jobs)| {
                let jobs = jobs.unwrap_or_default().into_iter().map(String::from).collect();
                (scope, jobs)
            })
            .collect()
    }))
}

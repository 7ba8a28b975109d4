//! Informative event and stakeholder stage catalog.
//!
//! The catalog is the metadata source the topic key codec branches on:
//! whether an event carries parts, and whether it is administrative
//! (account-wide rather than per title). A built-in catalog is available
//! via [`EventCatalog::default`]; deployments can supply their own JSON
//! document through [`EventCatalog::from_json`] or [`EventCatalog::load`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Metadata types
// ---------------------------------------------------------------------------

/// Metadata for a single informative event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    /// Wire value used in topic keys, e.g. `"TITLE_WAS_CREATED"`.
    pub value: String,

    /// Human-readable label.
    #[serde(default)]
    pub label: Option<String>,

    /// Whether subscriptions to this event are scoped to a part.
    #[serde(default)]
    pub has_parts: bool,

    /// Administrative events are account-wide and never per subscriber.
    #[serde(default)]
    pub administrative: bool,
}

impl EventMeta {
    fn new(value: &str, label: &str, has_parts: bool, administrative: bool) -> Self {
        Self {
            value: value.to_string(),
            label: Some(label.to_string()),
            has_parts,
            administrative,
        }
    }

    /// Whether a topic key for this event includes a part segment.
    pub fn keyed_by_part(&self) -> bool {
        self.has_parts && !self.administrative
    }
}

/// A named group of informative events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCategory {
    pub name: String,
    pub events: Vec<EventMeta>,
}

/// A stakeholder workflow stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMeta {
    pub value: String,
    #[serde(default)]
    pub label: Option<String>,
}

// ---------------------------------------------------------------------------
// EventCatalog
// ---------------------------------------------------------------------------

/// Lookup table over informative events and stakeholder stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCatalog {
    #[serde(default)]
    informative: Vec<EventCategory>,
    #[serde(default)]
    stages: Vec<StageMeta>,
}

impl EventCatalog {
    /// Build a catalog from explicit categories and stages.
    ///
    /// Fails if the same event value appears twice.
    pub fn new(informative: Vec<EventCategory>, stages: Vec<StageMeta>) -> Result<Self, CoreError> {
        let catalog = Self {
            informative,
            stages,
        };
        catalog.check_unique()?;
        Ok(catalog)
    }

    /// Parse a catalog from its JSON document form:
    ///
    /// ```json
    /// {
    ///   "informative": [{ "name": "Titles", "events": [{ "value": "TITLE_WAS_CREATED" }] }],
    ///   "stages": [{ "value": "Approve_To_Print" }]
    /// }
    /// ```
    pub fn from_json(document: &str) -> Result<Self, CoreError> {
        let catalog: Self = serde_json::from_str(document)
            .map_err(|e| CoreError::Validation(format!("Invalid event catalog: {e}")))?;
        catalog.check_unique()?;
        Ok(catalog)
    }

    /// Read and parse a catalog JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let document =
            std::fs::read_to_string(path).map_err(|source| CoreError::CatalogRead {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(&document)
    }

    /// Look up an informative event by its wire value.
    pub fn event(&self, value: &str) -> Option<&EventMeta> {
        self.events().find(|e| e.value == value)
    }

    /// Iterate over every informative event across all categories.
    pub fn events(&self) -> impl Iterator<Item = &EventMeta> {
        self.informative.iter().flat_map(|c| c.events.iter())
    }

    pub fn categories(&self) -> &[EventCategory] {
        &self.informative
    }

    /// Whether `value` names an administrative event.
    pub fn is_administrative(&self, value: &str) -> bool {
        self.event(value).is_some_and(|e| e.administrative)
    }

    /// Look up a stakeholder stage by its wire value.
    pub fn stage(&self, value: &str) -> Option<&StageMeta> {
        self.stages.iter().find(|s| s.value == value)
    }

    pub fn stages(&self) -> &[StageMeta] {
        &self.stages
    }

    fn check_unique(&self) -> Result<(), CoreError> {
        let mut seen = std::collections::HashSet::new();
        for event in self.events() {
            if !seen.insert(event.value.as_str()) {
                return Err(CoreError::Validation(format!(
                    "Duplicate informative event in catalog: {}",
                    event.value
                )));
            }
        }
        Ok(())
    }
}

impl Default for EventCatalog {
    fn default() -> Self {
        let titles = EventCategory {
            name: "Titles".to_string(),
            events: vec![
                EventMeta::new("TITLE_WAS_CREATED", "Title Created", false, false),
                EventMeta::new("TITLE_WAS_MODIFIED", "Title Modified", false, false),
                EventMeta::new("FILE_WAS_UPLOADED", "File Uploaded", true, false),
                EventMeta::new("PROOF_WAS_APPROVED", "Proof Approved", true, false),
                EventMeta::new("PROOF_WAS_REJECTED", "Proof Rejected", true, false),
            ],
        };
        let users = EventCategory {
            name: "Users".to_string(),
            events: vec![
                EventMeta::new("USER_WAS_CREATED", "User Created", false, true),
                EventMeta::new("USER_WAS_MODIFIED", "User Modified", false, true),
                EventMeta::new("USER_WAS_DELETED", "User Deleted", false, true),
            ],
        };
        let stages = [
            ("Approve_Cover", "Approve Cover"),
            ("Approve_Interior", "Approve Interior"),
            ("Approve_To_Print", "Approve to Print"),
        ]
        .into_iter()
        .map(|(value, label)| StageMeta {
            value: value.to_string(),
            label: Some(label.to_string()),
        })
        .collect();

        Self {
            informative: vec![titles, users],
            stages,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

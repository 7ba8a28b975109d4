//! Well-known authority permission names.
//!
//! These must match the permission strings stored in the authority's
//! account rolesets. Stakeholder stage values double as permission names:
//! holding a stage's permission makes a user eligible for that stage.

/// Required (together with the stage permission) to assign another user
/// to a stakeholder stage.
pub const STAKEHOLDER_EDIT: &str = "Stakeholder_Edit";

/// Required to view stakeholder assignments on a job.
pub const STAKEHOLDER_VIEW: &str = "Stakeholder_View";

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

// =============================================================================
// CAPABILITY
// =============================================================================

/// A named permission from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, FromRow)]
pub struct Capability {
    pub id: i64,
    #[schema(example = "edit_product")]
    pub name: String,
    #[schema(example = "Edit product details")]
    pub description: String,
    /// Outcome when no subject or group grant expresses an opinion.
    pub default_granted: bool,
}

// =============================================================================
// TARGET SCOPE
// =============================================================================

/// Which instances of a resource type a grant covers.
///
/// On the wire this is either the keyword `"all"` or a positive integer id.
/// In storage `All` is a NULL `target_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawTarget", into = "RawTarget")]
pub enum TargetScope {
    All,
    Id(i64),
}

impl TargetScope {
    pub fn from_column(target_id: Option<i64>) -> Self {
        match target_id {
            Some(id) => TargetScope::Id(id),
            None => TargetScope::All,
        }
    }

    pub fn to_column(self) -> Option<i64> {
        match self {
            TargetScope::All => None,
            TargetScope::Id(id) => Some(id),
        }
    }

    /// True when this scope names exactly the requested instance.
    pub fn is_exact(self, requested: Option<i64>) -> bool {
        matches!((self, requested), (TargetScope::Id(id), Some(want)) if id == want)
    }
}

impl fmt::Display for TargetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetScope::All => f.write_str("all"),
            TargetScope::Id(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTarget {
    Id(i64),
    Keyword(String),
}

impl TryFrom<RawTarget> for TargetScope {
    type Error = String;

    fn try_from(raw: RawTarget) -> Result<Self, Self::Error> {
        match raw {
            RawTarget::Id(id) if id > 0 => Ok(TargetScope::Id(id)),
            RawTarget::Id(id) => Err(format!("target id must be positive, got {id}")),
            RawTarget::Keyword(word) if word.eq_ignore_ascii_case("all") => Ok(TargetScope::All),
            RawTarget::Keyword(word) => Err(format!("target must be \"all\" or a positive id, got {word:?}")),
        }
    }
}

impl From<TargetScope> for RawTarget {
    fn from(scope: TargetScope) -> Self {
        match scope {
            TargetScope::All => RawTarget::Keyword("all".to_string()),
            TargetScope::Id(id) => RawTarget::Id(id),
        }
    }
}

// =============================================================================
// GRANT
// =============================================================================

/// A stored grant row, for either a user (subject) or a group owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Grant {
    pub id: i64,
    pub owner_id: i64,
    #[schema(example = "edit_product")]
    pub capability: String,
    #[schema(value_type = String, example = "all")]
    pub target: TargetScope,
    pub enabled: bool,
    pub denied: bool,
}

impl Grant {
    /// Rows that are neither enabled nor denied carry no opinion.
    pub fn is_inert(&self) -> bool {
        !self.enabled && !self.denied
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbGrant {
    pub id: i64,
    pub owner_id: i64,
    pub capability: String,
    pub target_id: Option<i64>,
    pub enabled: bool,
    pub denied: bool,
}

impl From<DbGrant> for Grant {
    fn from(db: DbGrant) -> Self {
        Grant {
            id: db.id,
            owner_id: db.owner_id,
            capability: db.capability,
            target: TargetScope::from_column(db.target_id),
            enabled: db.enabled,
            denied: db.denied,
        }
    }
}

/// A grant row not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGrant {
    pub owner_id: i64,
    pub capability_id: i64,
    pub capability: String,
    pub target: TargetScope,
    pub enabled: bool,
    pub denied: bool,
}

// =============================================================================
// WORKFLOW REQUESTS
// =============================================================================

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AssignEntry {
    #[schema(example = "edit_product")]
    pub capability: String,
    /// `"all"` or a positive resource id. Required.
    #[schema(value_type = String, example = "all")]
    pub target: Option<TargetScope>,
    pub enabled: Option<bool>,
    pub denied: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignRequest {
    pub permissions: Vec<AssignEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AssignStatus {
    Assigned,
    Unchanged,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AssignOutcome {
    pub grant: Grant,
    pub status: AssignStatus,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GrantChange {
    pub id: i64,
    pub enabled: Option<bool>,
    pub denied: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateGrantsRequest {
    pub grants: Vec<GrantChange>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RevokeRequest {
    #[serde(default)]
    pub grant_ids: Vec<i64>,
    #[serde(default)]
    #[schema(example = json!(["edit_product"]))]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RevokeResponse {
    pub revoked: Vec<Grant>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckRequest {
    #[schema(example = "edit_product")]
    pub capability: String,
    pub target: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckResponse {
    pub capability: String,
    pub target: Option<i64>,
    pub allowed: bool,
    /// Which rule decided: `subject`, `self_scope`, `group:<id>` or `default`.
    #[schema(example = "default")]
    pub basis: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_accepts_keyword_and_positive_ids() {
        let all: TargetScope = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(all, TargetScope::All);
        let one: TargetScope = serde_json::from_str("42").unwrap();
        assert_eq!(one, TargetScope::Id(42));
    }

    #[test]
    fn target_rejects_zero_and_other_words() {
        assert!(serde_json::from_str::<TargetScope>("0").is_err());
        assert!(serde_json::from_str::<TargetScope>("-3").is_err());
        assert!(serde_json::from_str::<TargetScope>("\"some\"").is_err());
    }

    #[test]
    fn target_serializes_back_to_wire_form() {
        assert_eq!(serde_json::to_string(&TargetScope::All).unwrap(), "\"all\"");
        assert_eq!(serde_json::to_string(&TargetScope::Id(9)).unwrap(), "9");
    }

    #[test]
    fn exact_match_requires_a_concrete_request() {
        assert!(TargetScope::Id(5).is_exact(Some(5)));
        assert!(!TargetScope::Id(5).is_exact(Some(6)));
        assert!(!TargetScope::Id(5).is_exact(None));
        assert!(!TargetScope::All.is_exact(Some(5)));
    }
}

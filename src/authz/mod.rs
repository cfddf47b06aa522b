//! Authorization module - decision engine and grant workflows
//!
//! Decisions combine three sources, in order:
//! - direct subject grants (an explicit deny is final)
//! - grants held by the actor's groups
//! - the catalog default of the capability
//!
//! Requests touching the caller's own records may be marked self-scoped,
//! which allows them when no subject grant says otherwise.

pub mod assignment;
mod evaluator;
mod request;
mod verdict;

pub use evaluator::{Decision, DecisionBasis, DefaultPolicyEvaluator, GrantSource, PolicyEvaluator};
pub use request::AccessRequest;
pub use verdict::Verdict;

use crate::errors::{AppError, AppResult};

/// Asks the evaluator and turns a negative decision into `Forbidden`.
///
/// Guards only name built-in capabilities, so one missing from storage means
/// the catalog was never synced and is reported as a configuration error.
pub async fn enforce(evaluator: &dyn PolicyEvaluator, request: AccessRequest) -> AppResult<()> {
    let decision = match evaluator.decide(&request).await {
        Ok(decision) => decision,
        Err(AppError::NotFound(message)) => {
            tracing::error!(capability = %request.capability, "capability missing from catalog");
            return Err(AppError::configuration(message));
        }
        Err(err) => return Err(err),
    };

    if decision.allowed {
        return Ok(());
    }

    tracing::warn!(
        actor_id = request.actor_id,
        capability = %request.capability,
        target = ?request.target,
        basis = %decision.basis,
        "permission denied"
    );
    Err(AppError::forbidden(format!(
        "missing permission '{}'",
        request.capability
    )))
}

/// Built-in capability catalog, synced into storage at startup.
pub mod capabilities {
    use std::collections::BTreeMap;

    use crate::db::catalog::{CapabilitySpec, DesiredCatalog};

    // Users
    pub const VIEW_USERS: &str = "view_users";
    pub const EDIT_USER: &str = "edit_user";
    pub const DELETE_USER: &str = "delete_user";

    // Products
    pub const VIEW_PRODUCTS: &str = "view_products";
    pub const CREATE_PRODUCT: &str = "create_product";
    pub const EDIT_PRODUCT: &str = "edit_product";
    pub const DELETE_PRODUCT: &str = "delete_product";

    // Categories
    pub const VIEW_CATEGORIES: &str = "view_categories";
    pub const CREATE_CATEGORY: &str = "create_category";
    pub const EDIT_CATEGORY: &str = "edit_category";
    pub const DELETE_CATEGORY: &str = "delete_category";

    // Groups
    pub const VIEW_GROUPS: &str = "view_groups";
    pub const MANAGE_GROUPS: &str = "manage_groups";
    pub const MANAGE_GROUP_MEMBERS: &str = "manage_group_members";

    // Permissions
    pub const VIEW_PERMISSIONS: &str = "view_permissions";
    pub const MANAGE_USER_PERMISSIONS: &str = "manage_user_permissions";
    pub const MANAGE_GROUP_PERMISSIONS: &str = "manage_group_permissions";

    /// (name, description, default_granted)
    pub const CATALOG: &[(&str, &str, bool)] = &[
        (VIEW_USERS, "View user accounts", false),
        (EDIT_USER, "Edit user accounts", false),
        (DELETE_USER, "Delete user accounts", false),
        (VIEW_PRODUCTS, "Browse products", true),
        (CREATE_PRODUCT, "Create products", false),
        (EDIT_PRODUCT, "Edit product details", false),
        (DELETE_PRODUCT, "Delete products", false),
        (VIEW_CATEGORIES, "Browse categories", true),
        (CREATE_CATEGORY, "Create categories", false),
        (EDIT_CATEGORY, "Edit categories", false),
        (DELETE_CATEGORY, "Delete categories", false),
        (VIEW_GROUPS, "View groups and their members", false),
        (MANAGE_GROUPS, "Create and delete groups", false),
        (MANAGE_GROUP_MEMBERS, "Add and remove group members", false),
        (VIEW_PERMISSIONS, "View the capability catalog and grants", false),
        (MANAGE_USER_PERMISSIONS, "Assign, update and revoke user grants", false),
        (MANAGE_GROUP_PERMISSIONS, "Assign, update and revoke group grants", false),
    ];

    pub fn desired() -> DesiredCatalog {
        CATALOG
            .iter()
            .map(|(name, description, default_granted)| {
                (
                    name.to_string(),
                    CapabilitySpec::new(*description, *default_granted),
                )
            })
            .collect::<BTreeMap<_, _>>()
    }
}

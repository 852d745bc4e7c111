//! Role policy: the authenticated actor and the single place where the
//! ADMIN override is applied.

use pmboard_state::{FieldPermission, Role, UserId};
use serde::Serialize;

use crate::error::{AccessError, AccessResult};

/// Authenticated caller, as supplied by the session layer. Trusted input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<UserId>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Confidential project notes are gated independently of field
    /// permissions; today only admins hold the right.
    pub fn can_see_confidential(&self) -> bool {
        self.is_admin()
    }

    /// Fail with `Forbidden` unless the actor is an admin.
    pub fn require_admin(&self) -> AccessResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AccessError::forbidden())
        }
    }
}

/// Capability flags for one (role, parameter) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldAccess {
    pub can_view: bool,
    pub can_edit: bool,
    pub can_update: bool,
}

impl FieldAccess {
    pub const NONE: FieldAccess = FieldAccess {
        can_view: false,
        can_edit: false,
        can_update: false,
    };

    pub const ALL: FieldAccess = FieldAccess {
        can_view: true,
        can_edit: true,
        can_update: true,
    };

    /// Edit and update are both accepted as "may write" at the project
    /// mutation boundary.
    pub fn can_write(&self) -> bool {
        self.can_edit || self.can_update
    }
}

impl From<&FieldPermission> for FieldAccess {
    fn from(p: &FieldPermission) -> Self {
        FieldAccess {
            can_view: p.can_view,
            can_edit: p.can_edit,
            can_update: p.can_update,
        }
    }
}

/// Flags that actually apply to `role`, given the stored row (if any).
/// ADMIN always gets every flag.
pub fn effective_permission(role: Role, stored: Option<FieldAccess>) -> FieldAccess {
    if role.is_admin() {
        FieldAccess::ALL
    } else {
        stored.unwrap_or(FieldAccess::NONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_override_ignores_stored_flags() {
        assert_eq!(effective_permission(Role::Admin, Some(FieldAccess::NONE)), FieldAccess::ALL);
        assert_eq!(effective_permission(Role::Admin, None), FieldAccess::ALL);
    }

    #[test]
    fn missing_row_means_no_access() {
        assert_eq!(effective_permission(Role::Staff, None), FieldAccess::NONE);
        let view_only = FieldAccess {
            can_view: true,
            ..FieldAccess::NONE
        };
        assert_eq!(effective_permission(Role::Manager, Some(view_only)), view_only);
    }

    #[test]
    fn edit_or_update_allows_writes() {
        let edit = FieldAccess { can_edit: true, ..FieldAccess::NONE };
        let update = FieldAccess { can_update: true, ..FieldAccess::NONE };
        assert!(edit.can_write());
        assert!(update.can_write());
        assert!(!FieldAccess::NONE.can_write());
    }

    #[test]
    fn only_admins_pass_admin_gate() {
        assert!(Actor::new("a", Role::Admin).require_admin().is_ok());
        let err = Actor::new("m", Role::Manager).require_admin().unwrap_err();
        assert!(matches!(err, AccessError::Forbidden(_)));
    }
}

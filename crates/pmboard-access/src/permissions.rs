//! Field permission table: per-role capability flags for each parameter.
//!
//! Lookups go through the injected [`PermissionCache`]. `set_permissions`
//! clears the whole cache after committing. A lookup captures the cache
//! generation before reading the store, so a row read before that clear is
//! not cached after it.

use std::sync::Arc;

use pmboard_state::{
    AuditAction, AuditEntity, AuditRecord, FieldPermission, Parameter, Role, StateStore, new_id,
    unix_now,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::cache::PermissionCache;
use crate::error::{AccessError, AccessResult};
use crate::policy::{Actor, FieldAccess, effective_permission};

/// One entry of a permission batch. Role stays a raw string so that a stale
/// or malformed row can be skipped instead of failing the whole batch.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PermissionInput {
    #[serde(alias = "projectParameterId")]
    pub parameter_id: String,
    pub role: String,
    pub can_view: Option<bool>,
    pub can_edit: Option<bool>,
    pub can_update: Option<bool>,
}

impl PermissionInput {
    pub fn new(parameter_id: &str, role: Role, access: FieldAccess) -> Self {
        Self {
            parameter_id: parameter_id.to_string(),
            role: role.as_str().to_string(),
            can_view: Some(access.can_view),
            can_edit: Some(access.can_edit),
            can_update: Some(access.can_update),
        }
    }
}

/// A stored row joined with its parameter descriptor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionView {
    #[serde(flatten)]
    pub permission: FieldPermission,
    pub parameter: Option<Parameter>,
}

#[derive(Clone)]
pub struct PermissionTable {
    store: StateStore,
    cache: Arc<dyn PermissionCache>,
}

impl PermissionTable {
    pub fn new(store: StateStore, cache: Arc<dyn PermissionCache>) -> Self {
        Self { store, cache }
    }

    /// Effective flags for `(role, parameter)`: all-false without a stored
    /// row, all-true for ADMIN.
    pub fn get_permission(&self, role: Role, parameter_id: &str) -> AccessResult<FieldAccess> {
        if role.is_admin() {
            return Ok(effective_permission(role, None));
        }
        if let Some(hit) = self.cache.get(role, parameter_id) {
            return Ok(hit);
        }
        let generation = self.cache.generation();
        let stored = self
            .store
            .get_permission(parameter_id, role)?
            .as_ref()
            .map(FieldAccess::from);
        let access = effective_permission(role, stored);
        self.cache.put(role, parameter_id, access, generation);
        Ok(access)
    }

    /// Upsert a batch of rows. Entries naming an unknown parameter or an
    /// invalid role are skipped. ADMIN rows are always stored all-true.
    pub fn set_permissions(
        &self,
        actor: &Actor,
        batch: &[PermissionInput],
    ) -> AccessResult<Vec<PermissionView>> {
        actor.require_admin()?;
        let now = unix_now();

        let applied = self.store.write(|txn| -> AccessResult<_> {
            let mut applied = 0usize;
            for entry in batch {
                let Some(role) = Role::parse(entry.role.trim()) else {
                    debug!(role = %entry.role, "skipping permission entry with invalid role");
                    continue;
                };
                let parameter_id = entry.parameter_id.trim();
                if parameter_id.is_empty() || txn.get_parameter(parameter_id)?.is_none() {
                    debug!(%parameter_id, "skipping permission entry for unknown parameter");
                    continue;
                }

                let requested = FieldAccess {
                    can_view: entry.can_view.unwrap_or(false),
                    can_edit: entry.can_edit.unwrap_or(false),
                    can_update: entry.can_update.unwrap_or(false),
                };
                let access = effective_permission(role, Some(requested));
                let (id, action) = match txn.get_permission(parameter_id, role)? {
                    Some(existing) => (existing.id, AuditAction::Update),
                    None => (new_id()?, AuditAction::Create),
                };
                let row = FieldPermission {
                    id,
                    parameter_id: parameter_id.to_string(),
                    role,
                    can_view: access.can_view,
                    can_edit: access.can_edit,
                    can_update: access.can_update,
                    updated_at: now,
                };
                txn.put_permission(&row)?;
                txn.append_audit(
                    AuditRecord::new(&actor.user_id, AuditEntity::Permission, Some(&row.id), action)
                        .new_value(
                            json!({
                                "canView": row.can_view,
                                "canEdit": row.can_edit,
                                "canUpdate": row.can_update,
                            })
                            .to_string(),
                        ),
                )?;
                applied += 1;
            }
            Ok::<_, AccessError>(applied)
        })?;

        self.cache.clear();
        info!(applied, skipped = batch.len() - applied, "field permissions saved");
        self.list_permissions(actor)
    }

    /// Every stored row with its descriptor, in parameter display order.
    pub fn list_permissions(&self, actor: &Actor) -> AccessResult<Vec<PermissionView>> {
        actor.require_admin()?;
        let params = self.store.list_parameters()?;
        let position = |id: &str| params.iter().position(|p| p.id == id).unwrap_or(usize::MAX);

        let mut rows = self.store.list_permissions()?;
        rows.sort_by(|a, b| {
            position(&a.parameter_id)
                .cmp(&position(&b.parameter_id))
                .then(a.role.cmp(&b.role))
        });
        Ok(rows
            .into_iter()
            .map(|permission| {
                let parameter = params.iter().find(|p| p.id == permission.parameter_id).cloned();
                PermissionView { permission, parameter }
            })
            .collect())
    }
}

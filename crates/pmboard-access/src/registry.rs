//! Parameter registry: admin-defined extra project fields.
//!
//! Descriptors are ordered by `order`, ties broken by creation sequence.
//! Deleting a descriptor drops its permission rows but never touches the
//! values already stored in project attribute bags.

use std::sync::Arc;

use pmboard_state::{
    AuditAction, AuditEntity, AuditRecord, Parameter, ParameterType, StateError, StateStore, new_id,
    unix_now,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::cache::PermissionCache;
use crate::error::{AccessError, AccessResult};
use crate::page::{Page, PageRequest};
use crate::policy::Actor;

/// Keys owned by the fixed project columns of the projection wire shape.
pub const RESERVED_KEYS: [&str; 6] = [
    "id",
    "name",
    "status",
    "createdAt",
    "updatedAt",
    "confidentialNotes",
];

/// Body of a create request. Everything is optional on the wire so that
/// missing fields surface as validation errors rather than decode errors.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ParameterInput {
    pub key: Option<String>,
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub options: Option<String>,
    pub order: Option<i64>,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ParameterPatch {
    pub key: Option<String>,
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub options: Option<String>,
    pub order: Option<i64>,
}

#[derive(Clone)]
pub struct ParameterRegistry {
    store: StateStore,
    cache: Arc<dyn PermissionCache>,
}

impl ParameterRegistry {
    pub fn new(store: StateStore, cache: Arc<dyn PermissionCache>) -> Self {
        Self { store, cache }
    }

    /// Every descriptor, in display order.
    pub fn list(&self) -> AccessResult<Vec<Parameter>> {
        Ok(self.store.list_parameters()?)
    }

    pub fn list_page(&self, actor: &Actor, req: PageRequest) -> AccessResult<Page<Parameter>> {
        actor.require_admin()?;
        Ok(Page::slice(self.list()?, req))
    }

    pub fn get(&self, actor: &Actor, id: &str) -> AccessResult<Parameter> {
        actor.require_admin()?;
        self.store
            .get_parameter(id)?
            .ok_or_else(|| AccessError::not_found("Parameter not found"))
    }

    pub fn create(&self, actor: &Actor, input: &ParameterInput) -> AccessResult<Parameter> {
        actor.require_admin()?;
        let key = input.key.as_deref().map(str::trim).unwrap_or_default();
        let label = input.label.as_deref().map(str::trim).unwrap_or_default();
        if key.is_empty() || label.is_empty() {
            return Err(AccessError::validation("key and label are required."));
        }
        check_reserved(key)?;

        let kind = ParameterType::parse_lenient(input.kind.as_deref().unwrap_or_default());
        let options = match kind {
            ParameterType::Select => input.options.as_deref().and_then(normalize_options),
            _ => None,
        };
        let now = unix_now();

        let param = self.store.write(|txn| -> AccessResult<_> {
            if txn.find_parameter_by_key(key)?.is_some() {
                return Err(duplicate_key());
            }
            let param = Parameter {
                id: new_id()?,
                key: key.to_string(),
                label: label.to_string(),
                kind,
                options,
                order: input.order.unwrap_or(0),
                seq: txn.next_seq()?,
                created_at: now,
                updated_at: now,
            };
            txn.put_parameter(&param).map_err(conflict_as_duplicate)?;
            txn.append_audit(
                AuditRecord::new(&actor.user_id, AuditEntity::Parameter, Some(&param.id), AuditAction::Create)
                    .new_value(json!({ "key": param.key, "label": param.label }).to_string()),
            )?;
            Ok::<_, AccessError>(param)
        })?;

        info!(id = %param.id, key = %param.key, "parameter created");
        Ok(param)
    }

    pub fn update(&self, actor: &Actor, id: &str, patch: &ParameterPatch) -> AccessResult<Parameter> {
        actor.require_admin()?;
        let param = self.store.write(|txn| -> AccessResult<_> {
            let mut param = txn
                .get_parameter(id)?
                .ok_or_else(|| AccessError::not_found("Parameter not found"))?;
            let old_key = param.key.clone();

            // A blank key in the patch leaves the key unchanged.
            if let Some(key) = patch.key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
                if key != param.key {
                    check_reserved(key)?;
                    if let Some(owner) = txn.find_parameter_by_key(key)? {
                        if owner.id != param.id {
                            return Err(AccessError::DuplicateKey("Key already in use.".to_string()));
                        }
                    }
                    param.key = key.to_string();
                }
            }
            if let Some(label) = patch.label.as_deref() {
                let label = label.trim();
                if label.is_empty() {
                    return Err(AccessError::validation("label cannot be empty."));
                }
                param.label = label.to_string();
            }
            if let Some(kind) = patch.kind.as_deref() {
                param.kind = ParameterType::parse_lenient(kind);
            }
            if let Some(order) = patch.order {
                param.order = order;
            }
            if let Some(options) = patch.options.as_deref() {
                param.options = normalize_options(options);
            }
            if param.kind != ParameterType::Select {
                param.options = None;
            }
            param.updated_at = unix_now();

            txn.put_parameter(&param).map_err(conflict_as_duplicate)?;
            if param.key != old_key {
                txn.append_audit(
                    AuditRecord::new(&actor.user_id, AuditEntity::Parameter, Some(id), AuditAction::Update)
                        .field("key", Some(old_key), Some(param.key.clone())),
                )?;
            }
            Ok::<_, AccessError>(param)
        })?;

        info!(id = %param.id, key = %param.key, "parameter updated");
        Ok(param)
    }

    /// Remove a descriptor and its permission rows. Stored attribute
    /// values stay behind as unreachable orphans.
    pub fn delete(&self, actor: &Actor, id: &str) -> AccessResult<()> {
        actor.require_admin()?;
        let removed = self.store.write(|txn| -> AccessResult<_> {
            let removed = txn
                .delete_parameter(id)?
                .ok_or_else(|| AccessError::not_found("Parameter not found"))?;
            txn.append_audit(
                AuditRecord::new(&actor.user_id, AuditEntity::Parameter, Some(id), AuditAction::Delete)
                    .old_value(json!({ "key": removed.key }).to_string()),
            )?;
            Ok::<_, AccessError>(removed)
        })?;
        self.cache.clear();
        info!(%id, key = %removed.key, "parameter deleted");
        Ok(())
    }
}

/// Split select options on commas or newlines, trim, drop empties.
pub fn normalize_options(raw: &str) -> Option<String> {
    let joined = raw
        .split([',', '\n'])
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .collect::<Vec<_>>()
        .join(",");
    (!joined.is_empty()).then_some(joined)
}

fn check_reserved(key: &str) -> AccessResult<()> {
    if RESERVED_KEYS.contains(&key) {
        return Err(AccessError::validation(format!(
            "\"{key}\" is reserved for a built-in project field."
        )));
    }
    Ok(())
}

fn duplicate_key() -> AccessError {
    AccessError::DuplicateKey("A parameter with this key already exists.".to_string())
}

fn conflict_as_duplicate(e: StateError) -> AccessError {
    match e {
        StateError::Conflict(_) => duplicate_key(),
        other => AccessError::State(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryPermissionCache;
    use crate::policy::FieldAccess;
    use pmboard_state::Role;

    fn admin() -> Actor {
        Actor::new("admin-1", Role::Admin)
    }

    fn registry() -> (ParameterRegistry, Arc<MemoryPermissionCache>) {
        let store = StateStore::open_in_memory().unwrap();
        let cache = Arc::new(MemoryPermissionCache::new());
        (ParameterRegistry::new(store, cache.clone()), cache)
    }

    fn input(key: &str, label: &str) -> ParameterInput {
        ParameterInput {
            key: Some(key.to_string()),
            label: Some(label.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn create_trims_and_defaults() {
        let (reg, _) = registry();
        let p = reg.create(&admin(), &input("  dueDate ", " Due date ")).unwrap();
        assert_eq!(p.key, "dueDate");
        assert_eq!(p.label, "Due date");
        assert_eq!(p.kind, ParameterType::Text);
        assert_eq!(p.order, 0);
        assert!(p.options.is_none());
    }

    #[test]
    fn create_rejects_blank_key_or_label() {
        let (reg, _) = registry();
        let err = reg.create(&admin(), &input("   ", "Label")).unwrap_err();
        assert!(matches!(err, AccessError::Validation(_)));
        let err = reg.create(&admin(), &input("key", "")).unwrap_err();
        assert!(matches!(err, AccessError::Validation(_)));
        let err = reg.create(&admin(), &ParameterInput::default()).unwrap_err();
        assert!(matches!(err, AccessError::Validation(_)));
    }

    #[test]
    fn create_rejects_reserved_keys() {
        let (reg, _) = registry();
        let err = reg.create(&admin(), &input("status", "Status")).unwrap_err();
        assert!(matches!(err, AccessError::Validation(_)));
    }

    #[test]
    fn create_rejects_duplicate_key() {
        let (reg, _) = registry();
        reg.create(&admin(), &input("owner", "Owner")).unwrap();
        let err = reg.create(&admin(), &input("owner", "Other")).unwrap_err();
        assert!(matches!(err, AccessError::DuplicateKey(_)));
    }

    #[test]
    fn non_admins_cannot_mutate() {
        let (reg, _) = registry();
        let manager = Actor::new("m1", Role::Manager);
        let err = reg.create(&manager, &input("owner", "Owner")).unwrap_err();
        assert!(matches!(err, AccessError::Forbidden(_)));
        assert!(reg.list().unwrap().is_empty());
    }

    #[test]
    fn select_options_are_normalized() {
        let (reg, _) = registry();
        let p = reg
            .create(
                &admin(),
                &ParameterInput {
                    kind: Some("select".into()),
                    options: Some(" low, medium\nhigh ,,".into()),
                    ..input("priority", "Priority")
                },
            )
            .unwrap();
        assert_eq!(p.options.as_deref(), Some("low,medium,high"));

        let text = reg
            .create(
                &admin(),
                &ParameterInput {
                    options: Some("a,b".into()),
                    ..input("notes", "Notes")
                },
            )
            .unwrap();
        assert!(text.options.is_none());
    }

    #[test]
    fn list_orders_by_order_then_creation() {
        let (reg, _) = registry();
        for (key, order) in [("c", 2), ("a", 1), ("b", 1)] {
            reg.create(
                &admin(),
                &ParameterInput {
                    order: Some(order),
                    ..input(key, key)
                },
            )
            .unwrap();
        }
        let keys: Vec<String> = reg.list().unwrap().into_iter().map(|p| p.key).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn update_missing_parameter_is_not_found() {
        let (reg, _) = registry();
        let err = reg.update(&admin(), "nope", &ParameterPatch::default()).unwrap_err();
        assert!(matches!(err, AccessError::NotFound(_)));
    }

    #[test]
    fn update_key_to_taken_key_is_duplicate() {
        let (reg, _) = registry();
        reg.create(&admin(), &input("owner", "Owner")).unwrap();
        let budget = reg.create(&admin(), &input("budget", "Budget")).unwrap();

        let patch = ParameterPatch {
            key: Some("owner".into()),
            ..Default::default()
        };
        let err = reg.update(&admin(), &budget.id, &patch).unwrap_err();
        assert!(matches!(err, AccessError::DuplicateKey(_)));

        // Renaming to its own key is a no-op, not a conflict.
        let same = ParameterPatch {
            key: Some("budget".into()),
            label: Some("Budget (USD)".into()),
            ..Default::default()
        };
        let updated = reg.update(&admin(), &budget.id, &same).unwrap();
        assert_eq!(updated.label, "Budget (USD)");
    }

    #[test]
    fn update_renames_key_and_frees_old_one() {
        let (reg, _) = registry();
        let p = reg.create(&admin(), &input("owner", "Owner")).unwrap();
        let patch = ParameterPatch {
            key: Some("lead".into()),
            order: Some(7),
            ..Default::default()
        };
        let updated = reg.update(&admin(), &p.id, &patch).unwrap();
        assert_eq!(updated.key, "lead");
        assert_eq!(updated.order, 7);
        reg.create(&admin(), &input("owner", "Owner again")).unwrap();
    }

    #[test]
    fn delete_clears_permission_cache() {
        let (reg, cache) = registry();
        let p = reg.create(&admin(), &input("owner", "Owner")).unwrap();
        cache.put(Role::Staff, &p.id, FieldAccess::ALL, cache.generation());

        reg.delete(&admin(), &p.id).unwrap();
        assert!(cache.is_empty());
        assert!(reg.list().unwrap().is_empty());

        let err = reg.delete(&admin(), &p.id).unwrap_err();
        assert!(matches!(err, AccessError::NotFound(_)));
    }
}

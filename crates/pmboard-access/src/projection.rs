//! Role projections of project records.
//!
//! Reads compute one viewable parameter set per request and project every
//! row through it, so all rows of a response carry identical attribute
//! keys. Writes only touch `name`, `status`, and keys the role may edit;
//! everything else in a patch is dropped without error.

use std::collections::{BTreeMap, HashSet};

use pmboard_state::{
    AttributeValue, AuditAction, AuditEntity, AuditRecord, Parameter, Project, Role, StateStore,
    new_id, unix_now,
};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::json;
use tracing::{debug, info};

use crate::error::{AccessError, AccessResult};
use crate::page::{Page, PageRequest};
use crate::permissions::PermissionTable;
use crate::policy::Actor;

/// Status given to projects created without one.
pub const DEFAULT_STATUS: &str = "pending";

/// Incoming project fields keyed by wire name.
pub type ProjectPatch = BTreeMap<String, AttributeValue>;

/// The parameters one role may see, in display order.
#[derive(Debug, Clone)]
pub struct FieldView {
    pub role: Role,
    pub parameters: Vec<Parameter>,
}

impl FieldView {
    pub fn keys(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.key.clone()).collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.parameters.iter().any(|p| p.key == key)
    }

    /// Project one stored record through this view.
    pub fn project(&self, record: &Project, confidential: bool) -> ProjectView {
        let attributes = self
            .parameters
            .iter()
            .map(|p| {
                let value = record
                    .attributes
                    .get(&p.key)
                    .map(|v| v.present(p.kind))
                    .unwrap_or(AttributeValue::Null);
                (p.key.clone(), value)
            })
            .collect();
        ProjectView {
            id: record.id.clone(),
            name: record.name.clone(),
            status: record.status.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            attributes,
            confidential_notes: confidential
                .then(|| record.confidential_notes.clone().unwrap_or_default()),
        }
    }
}

/// A project as one role sees it. Serializes as a flat open map:
/// fixed columns, then every viewable key (null when unset), then
/// `confidentialNotes` when included.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectView {
    pub id: String,
    pub name: String,
    pub status: String,
    pub created_at: u64,
    pub updated_at: u64,
    pub attributes: Vec<(String, AttributeValue)>,
    pub confidential_notes: Option<String>,
}

impl ProjectView {
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn attribute_keys(&self) -> Vec<&str> {
        self.attributes.iter().map(|(k, _)| k.as_str()).collect()
    }
}

impl Serialize for ProjectView {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = usize::from(self.confidential_notes.is_some());
        let mut map = serializer.serialize_map(Some(5 + self.attributes.len() + extra))?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("name", &self.name)?;
        map.serialize_entry("status", &self.status)?;
        map.serialize_entry("createdAt", &self.created_at)?;
        map.serialize_entry("updatedAt", &self.updated_at)?;
        for (key, value) in &self.attributes {
            map.serialize_entry(key, value)?;
        }
        if let Some(notes) = &self.confidential_notes {
            map.serialize_entry("confidentialNotes", notes)?;
        }
        map.end()
    }
}

/// One field transition produced by [`apply_patch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: String,
    pub old: String,
    pub new: String,
}

/// Apply `patch` to `project` in place and report what changed.
///
/// `name` and `status` are trimmed and applied as given; a blank name is
/// rejected, a blank status is stored. `Null` leaves either untouched. Keys in
/// `editable` are written into the attribute bag, `Null` removing the
/// entry. A field only counts as changed when its trimmed string form
/// differs, so reapplying the same patch yields no changes.
pub fn apply_patch(
    project: &mut Project,
    editable: &HashSet<String>,
    patch: &ProjectPatch,
) -> AccessResult<Vec<FieldChange>> {
    let mut changes = Vec::new();
    for (key, value) in patch {
        match key.as_str() {
            "name" | "status" => {
                if value.is_null() {
                    continue;
                }
                let new = value.compare_string();
                if key == "name" && new.is_empty() {
                    return Err(AccessError::validation("name is required."));
                }
                let slot = if key == "name" {
                    &mut project.name
                } else {
                    &mut project.status
                };
                if *slot != new {
                    changes.push(FieldChange {
                        field: key.clone(),
                        old: std::mem::replace(slot, new.clone()),
                        new,
                    });
                }
            }
            _ if editable.contains(key) => {
                let old = project
                    .attributes
                    .get(key)
                    .map(AttributeValue::compare_string)
                    .unwrap_or_default();
                let new = value.compare_string();
                if old == new {
                    continue;
                }
                match value {
                    AttributeValue::Null => {
                        project.attributes.remove(key);
                    }
                    AttributeValue::Text(_) => {
                        project
                            .attributes
                            .insert(key.clone(), AttributeValue::Text(new.clone()));
                    }
                    AttributeValue::Number(_) => {
                        project.attributes.insert(key.clone(), value.clone());
                    }
                }
                changes.push(FieldChange {
                    field: key.clone(),
                    old,
                    new,
                });
            }
            _ => {}
        }
    }
    Ok(changes)
}

fn matches_filters(project: &Project, view: &FieldView, filters: &BTreeMap<String, String>) -> bool {
    filters.iter().all(|(key, needle)| {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let haystack = if key == "status" {
            project.status.clone()
        } else if view.contains(key) {
            project
                .attributes
                .get(key)
                .map(AttributeValue::compare_string)
                .unwrap_or_default()
        } else {
            return true;
        };
        haystack.to_lowercase().contains(&needle)
    })
}

#[derive(Clone)]
pub struct ProjectionService {
    store: StateStore,
    permissions: PermissionTable,
}

impl ProjectionService {
    pub fn new(store: StateStore, permissions: PermissionTable) -> Self {
        Self { store, permissions }
    }

    /// Parameters `role` may view, in display order.
    pub fn viewable_parameters(&self, role: Role) -> AccessResult<Vec<Parameter>> {
        let mut out = Vec::new();
        for param in self.store.list_parameters()? {
            if self.permissions.get_permission(role, &param.id)?.can_view {
                out.push(param);
            }
        }
        Ok(out)
    }

    pub fn field_view(&self, role: Role) -> AccessResult<FieldView> {
        Ok(FieldView {
            role,
            parameters: self.viewable_parameters(role)?,
        })
    }

    pub fn viewable_keys(&self, role: Role) -> AccessResult<Vec<String>> {
        Ok(self.field_view(role)?.keys())
    }

    /// Keys `role` may write: those with edit or update granted.
    pub fn editable_keys(&self, role: Role) -> AccessResult<HashSet<String>> {
        let mut out = HashSet::new();
        for param in self.store.list_parameters()? {
            if self.permissions.get_permission(role, &param.id)?.can_write() {
                out.insert(param.key);
            }
        }
        Ok(out)
    }

    /// Filtered, paginated listing, most recently updated first.
    ///
    /// Only `status` and keys viewable by the actor's role are honoured as
    /// filters; a row matches when every filter value is a
    /// case-insensitive substring of the field.
    pub fn list_projects(
        &self,
        actor: &Actor,
        req: PageRequest,
        filters: &BTreeMap<String, String>,
    ) -> AccessResult<Page<ProjectView>> {
        let view = self.field_view(actor.role)?;
        let rows: Vec<Project> = self
            .store
            .list_projects()?
            .into_iter()
            .filter(|p| matches_filters(p, &view, filters))
            .collect();
        Ok(Page::slice(rows, req).map(|p| view.project(&p, false)))
    }

    /// A single project. Confidential notes are attached only for actors
    /// holding the confidential right who ask for them.
    pub fn get_project(&self, actor: &Actor, id: &str, include_confidential: bool) -> AccessResult<ProjectView> {
        let project = self
            .store
            .get_project(id)?
            .ok_or_else(|| AccessError::not_found("Project not found"))?;
        let view = self.field_view(actor.role)?;
        Ok(view.project(&project, include_confidential && actor.can_see_confidential()))
    }

    pub fn create_project(&self, actor: &Actor, input: &ProjectPatch) -> AccessResult<ProjectView> {
        let name = input.get("name").map(AttributeValue::compare_string).unwrap_or_default();
        if name.is_empty() {
            return Err(AccessError::validation("name is required."));
        }
        let status = input
            .get("status")
            .map(AttributeValue::compare_string)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_STATUS.to_string());

        let editable = self.editable_keys(actor.role)?;
        let mut attributes = BTreeMap::new();
        for (key, value) in input {
            if !editable.contains(key) || value.is_null() {
                continue;
            }
            let stored = match value {
                AttributeValue::Text(s) => AttributeValue::Text(s.trim().to_string()),
                other => other.clone(),
            };
            attributes.insert(key.clone(), stored);
        }

        let now = unix_now();
        let project = self.store.write(|txn| -> AccessResult<_> {
            let project = Project {
                id: new_id()?,
                name,
                status,
                attributes,
                confidential_notes: None,
                created_at: now,
                updated_at: now,
            };
            txn.put_project(&project)?;
            txn.append_audit(
                AuditRecord::new(&actor.user_id, AuditEntity::Project, Some(&project.id), AuditAction::Create)
                    .new_value(json!({ "name": project.name, "status": project.status }).to_string()),
            )?;
            Ok::<_, AccessError>(project)
        })?;

        info!(id = %project.id, actor = %actor.user_id, "project created");
        let view = self.field_view(actor.role)?;
        Ok(view.project(&project, false))
    }

    /// Apply a role-filtered patch. The row and one audit record per
    /// changed field commit together; an empty change set writes nothing.
    pub fn update_project(&self, actor: &Actor, id: &str, patch: &ProjectPatch) -> AccessResult<ProjectView> {
        let editable = self.editable_keys(actor.role)?;
        let (project, changed) = self.store.write(|txn| -> AccessResult<(Project, usize)> {
            let mut project = txn
                .get_project(id)?
                .ok_or_else(|| AccessError::not_found("Project not found"))?;
            let changes = apply_patch(&mut project, &editable, patch)?;
            if changes.is_empty() {
                return Ok((project, 0));
            }
            project.updated_at = unix_now();
            txn.put_project(&project)?;
            for change in &changes {
                txn.append_audit(
                    AuditRecord::new(&actor.user_id, AuditEntity::Project, Some(id), AuditAction::Update)
                        .field(&change.field, Some(change.old.clone()), Some(change.new.clone())),
                )?;
            }
            Ok((project, changes.len()))
        })?;

        if changed > 0 {
            info!(%id, actor = %actor.user_id, changed, "project updated");
        } else {
            debug!(%id, "project patch produced no changes");
        }
        let view = self.field_view(actor.role)?;
        Ok(view.project(&project, actor.can_see_confidential()))
    }

    pub fn confidential(&self, actor: &Actor, id: &str) -> AccessResult<String> {
        actor.require_admin()?;
        let project = self
            .store
            .get_project(id)?
            .ok_or_else(|| AccessError::not_found("Project not found"))?;
        Ok(project.confidential_notes.unwrap_or_default())
    }

    pub fn set_confidential(&self, actor: &Actor, id: &str, notes: &str) -> AccessResult<String> {
        actor.require_admin()?;
        self.store.write(|txn| -> AccessResult<_> {
            let mut project = txn
                .get_project(id)?
                .ok_or_else(|| AccessError::not_found("Project not found"))?;
            let old = project.confidential_notes.replace(notes.to_string()).unwrap_or_default();
            project.updated_at = unix_now();
            txn.put_project(&project)?;
            txn.append_audit(
                AuditRecord::new(&actor.user_id, AuditEntity::Project, Some(id), AuditAction::Update)
                    .field("confidentialNotes", Some(old), Some(notes.to_string())),
            )?;
            Ok::<_, AccessError>(())
        })?;
        info!(%id, "confidential notes updated");
        Ok(notes.to_string())
    }
}

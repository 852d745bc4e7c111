//! Admin queries over the append-only audit log.

use std::collections::HashMap;

use pmboard_state::{AuditEntry, StateStore};
use serde::{Deserialize, Serialize};

use crate::accounts::UserRef;
use crate::error::AccessResult;
use crate::page::{Page, PageRequest};
use crate::policy::Actor;

/// Optional exact-match filters. `project_id` matches the entity id.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuditFilter {
    pub project_id: Option<String>,
    pub entity: Option<String>,
    pub actor_id: Option<String>,
}

fn want(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl AuditFilter {
    fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(id) = want(&self.project_id) {
            if entry.entity_id.as_deref() != Some(id) {
                return false;
            }
        }
        if let Some(entity) = want(&self.entity) {
            if entry.entity.as_str() != entity {
                return false;
            }
        }
        if let Some(actor) = want(&self.actor_id) {
            if entry.actor_id != actor {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditView {
    #[serde(flatten)]
    pub entry: AuditEntry,
    /// None once the acting user has been deleted.
    pub actor: Option<UserRef>,
}

#[derive(Clone)]
pub struct AuditLog {
    store: StateStore,
}

impl AuditLog {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Newest first.
    pub fn list(&self, actor: &Actor, filter: &AuditFilter, req: PageRequest) -> AccessResult<Page<AuditView>> {
        actor.require_admin()?;
        let entries: Vec<AuditEntry> = self
            .store
            .list_audit()?
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect();
        let users: HashMap<String, UserRef> = self
            .store
            .list_users()?
            .iter()
            .map(|u| (u.id.clone(), UserRef::from(u)))
            .collect();
        Ok(Page::slice(entries, req).map(|entry| {
            let actor = users.get(&entry.actor_id).cloned();
            AuditView { entry, actor }
        }))
    }
}

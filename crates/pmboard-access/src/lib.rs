//! pmboard-access: role-aware services over the pmboard state store.
//!
//! Every operation takes the authenticated [`Actor`] and enforces role
//! checks before touching the store. [`Board`] bundles the services around
//! one shared store and permission cache.

pub mod accounts;
pub mod audit;
pub mod cache;
pub mod error;
pub mod messaging;
pub mod page;
pub mod password;
pub mod permissions;
pub mod policy;
pub mod projection;
pub mod registry;

use std::sync::Arc;

use pmboard_state::StateStore;

pub use accounts::{
    AccountService, AccountUpdate, AccountView, LoginOutcome, NewUser, UserRef, UserSummary,
    UserUpdate,
};
pub use audit::{AuditFilter, AuditLog, AuditView};
pub use cache::{MemoryPermissionCache, NoopPermissionCache, PermissionCache};
pub use error::{AccessError, AccessResult};
pub use messaging::{MessageInput, MessageService, MessageView, NotificationView};
pub use page::{Page, PageRequest};
pub use permissions::{PermissionInput, PermissionTable, PermissionView};
pub use policy::{Actor, FieldAccess, effective_permission};
pub use projection::{FieldView, ProjectPatch, ProjectView, ProjectionService};
pub use registry::{ParameterInput, ParameterPatch, ParameterRegistry};

/// All services wired to one store and one permission cache.
#[derive(Clone)]
pub struct Board {
    pub store: StateStore,
    pub parameters: ParameterRegistry,
    pub permissions: PermissionTable,
    pub projects: ProjectionService,
    pub accounts: AccountService,
    pub messages: MessageService,
    pub audit: AuditLog,
}

impl Board {
    pub fn new(store: StateStore, cache: Arc<dyn PermissionCache>) -> Self {
        let parameters = ParameterRegistry::new(store.clone(), cache.clone());
        let permissions = PermissionTable::new(store.clone(), cache);
        let projects = ProjectionService::new(store.clone(), permissions.clone());
        let accounts = AccountService::new(store.clone(), projects.clone());
        Self {
            parameters,
            permissions,
            projects,
            accounts,
            messages: MessageService::new(store.clone()),
            audit: AuditLog::new(store.clone()),
            store,
        }
    }

    /// Board over a fresh in-memory store with the default cache.
    pub fn in_memory() -> AccessResult<Self> {
        let store = StateStore::open_in_memory()?;
        Ok(Self::new(store, Arc::new(MemoryPermissionCache::new())))
    }

    pub fn with_session_ttl(mut self, secs: u64) -> Self {
        self.accounts = self.accounts.with_session_ttl(secs);
        self
    }
}

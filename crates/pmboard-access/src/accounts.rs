//! Users, bearer sessions, and self-service account settings.

use pmboard_state::{
    AuditAction, AuditEntity, AuditRecord, Role, Session, StateError, StateStore, User, new_id,
    random_hex, unix_now,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::error::{AccessError, AccessResult};
use crate::password::{MIN_PASSWORD_LEN, hash_password, verify_password};
use crate::policy::Actor;
use crate::projection::ProjectionService;

/// Default session lifetime: 30 days.
pub const SESSION_TTL_SECS: u64 = 30 * 24 * 60 * 60;

const TOKEN_BYTES: usize = 32;
const INVALID_CREDENTIALS: &str = "Invalid email or password.";
const INVALID_NEW_USER: &str = "Valid email and password (min 6 characters) are required.";
const DUPLICATE_EMAIL: &str = "A user with this email already exists.";

/// Public view of a user for admin listings.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    pub created_at: u64,
}

impl From<&User> for UserSummary {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.clone(),
            email: u.email.clone(),
            name: u.name.clone(),
            role: u.role,
            created_at: u.created_at,
        }
    }
}

/// Minimal user reference embedded in messages and audit entries.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserRef {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
}

impl From<&User> for UserRef {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.clone(),
            email: u.email.clone(),
            name: u.name.clone(),
        }
    }
}

/// The caller's own account.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    pub dashboard_column_keys: Vec<String>,
}

impl From<&User> for AccountView {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.clone(),
            email: u.email.clone(),
            name: u.name.clone(),
            role: u.role,
            dashboard_column_keys: u.dashboard_column_keys.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    pub token: String,
    pub expires_at: u64,
    pub user: AccountView,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewUser {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccountUpdate {
    pub email: Option<String>,
    pub name: Option<String>,
    pub old_password: Option<String>,
    pub new_password: Option<String>,
    pub dashboard_column_keys: Option<Vec<String>>,
}

fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn conflict_as_duplicate(err: StateError) -> AccessError {
    match err {
        StateError::Conflict(_) => AccessError::DuplicateKey(DUPLICATE_EMAIL.to_string()),
        other => other.into(),
    }
}

fn user_not_found() -> AccessError {
    AccessError::not_found("User not found")
}

#[derive(Clone)]
pub struct AccountService {
    store: StateStore,
    projection: ProjectionService,
    session_ttl: u64,
}

impl AccountService {
    pub fn new(store: StateStore, projection: ProjectionService) -> Self {
        Self {
            store,
            projection,
            session_ttl: SESSION_TTL_SECS,
        }
    }

    pub fn with_session_ttl(mut self, secs: u64) -> Self {
        self.session_ttl = secs;
        self
    }

    // ── Sessions ───────────────────────────────────────────────────

    /// Exchange credentials for a bearer token. Unknown email and wrong
    /// password fail identically.
    pub fn login(&self, email: &str, password: &str) -> AccessResult<LoginOutcome> {
        let email = normalize_email(email);
        let user = match self.store.find_user_by_email(&email)? {
            Some(user) if verify_password(password, &user.password_hash) => user,
            _ => {
                warn!(%email, "rejected login");
                return Err(AccessError::unauthorized(INVALID_CREDENTIALS));
            }
        };

        let now = unix_now();
        let session = Session {
            token: random_hex(TOKEN_BYTES)?,
            user_id: user.id.clone(),
            created_at: now,
            expires_at: now.saturating_add(self.session_ttl),
        };
        self.store.write(|txn| txn.put_session(&session))?;
        info!(user = %user.id, "session opened");
        Ok(LoginOutcome {
            token: session.token,
            expires_at: session.expires_at,
            user: AccountView::from(&user),
        })
    }

    pub fn logout(&self, token: &str) -> AccessResult<()> {
        let removed = self.store.write(|txn| txn.delete_session(token.trim()))?;
        if removed {
            info!("session closed");
        }
        Ok(())
    }

    /// Resolve a bearer token to the acting user. Expired sessions are
    /// dropped on sight.
    pub fn authenticate(&self, token: &str) -> AccessResult<Actor> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AccessError::unauthorized("Unauthorized"));
        }
        let Some(session) = self.store.get_session(token)? else {
            return Err(AccessError::unauthorized("Unauthorized"));
        };
        if session.is_expired(unix_now()) {
            self.store.write(|txn| txn.delete_session(token))?;
            return Err(AccessError::unauthorized("Session expired"));
        }
        match self.store.get_user(&session.user_id)? {
            Some(user) => Ok(Actor::new(user.id, user.role)),
            None => Err(AccessError::unauthorized("Unauthorized")),
        }
    }

    /// Ensure an admin account exists for `email`. Returns true if one was
    /// created.
    pub fn seed_admin(&self, email: &str, password: &str, name: Option<&str>) -> AccessResult<bool> {
        let email = normalize_email(email);
        if email.is_empty() || password.len() < MIN_PASSWORD_LEN {
            return Err(AccessError::validation(INVALID_NEW_USER));
        }
        if self.store.find_user_by_email(&email)?.is_some() {
            return Ok(false);
        }
        let user = User {
            id: new_id()?,
            email,
            name: name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
            role: Role::Admin,
            password_hash: hash_password(password)?,
            dashboard_column_keys: Vec::new(),
            created_at: unix_now(),
        };
        self.store.write(|txn| txn.put_user(&user)).map_err(conflict_as_duplicate)?;
        info!(email = %user.email, "admin account seeded");
        Ok(true)
    }

    // ── Admin user management ──────────────────────────────────────

    pub fn list_users(&self, actor: &Actor) -> AccessResult<Vec<UserSummary>> {
        actor.require_admin()?;
        let users = self.store.list_users()?;
        Ok(users.iter().map(UserSummary::from).collect())
    }

    pub fn get_user(&self, actor: &Actor, id: &str) -> AccessResult<UserSummary> {
        actor.require_admin()?;
        let user = self.store.get_user(id)?.ok_or_else(user_not_found)?;
        Ok(UserSummary::from(&user))
    }

    pub fn create_user(&self, actor: &Actor, input: &NewUser) -> AccessResult<UserSummary> {
        actor.require_admin()?;
        let email = input.email.as_deref().map(normalize_email).unwrap_or_default();
        let password = input.password.as_deref().unwrap_or_default();
        if email.is_empty() || password.len() < MIN_PASSWORD_LEN {
            return Err(AccessError::validation(INVALID_NEW_USER));
        }
        let role = input
            .role
            .as_deref()
            .and_then(|r| Role::parse(r.trim()))
            .unwrap_or(Role::Staff);
        let password_hash = hash_password(password)?;

        let user = self.store.write(|txn| -> AccessResult<User> {
            if txn.find_user_by_email(&email)?.is_some() {
                return Err(AccessError::DuplicateKey(DUPLICATE_EMAIL.to_string()));
            }
            let user = User {
                id: new_id()?,
                email,
                name: input
                    .name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string),
                role,
                password_hash,
                dashboard_column_keys: Vec::new(),
                created_at: unix_now(),
            };
            txn.put_user(&user).map_err(conflict_as_duplicate)?;
            txn.append_audit(
                AuditRecord::new(&actor.user_id, AuditEntity::User, Some(&user.id), AuditAction::Create)
                    .new_value(json!({ "email": user.email, "role": user.role }).to_string()),
            )?;
            Ok(user)
        })?;

        info!(id = %user.id, role = %user.role, "user created");
        Ok(UserSummary::from(&user))
    }

    /// Admin edit. Blank or invalid fields (short password, unknown role)
    /// are dropped; if nothing valid remains the call fails.
    pub fn update_user(&self, actor: &Actor, id: &str, input: &UserUpdate) -> AccessResult<UserSummary> {
        actor.require_admin()?;
        let email = input.email.as_deref().map(normalize_email).filter(|e| !e.is_empty());
        let name = input
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        let role = input.role.as_deref().and_then(|r| Role::parse(r.trim()));
        let password_hash = match input.password.as_deref() {
            Some(p) if p.len() >= MIN_PASSWORD_LEN => Some(hash_password(p)?),
            _ => None,
        };
        if email.is_none() && name.is_none() && role.is_none() && password_hash.is_none() {
            return Err(AccessError::validation("No valid fields to update."));
        }

        let user = self.store.write(|txn| -> AccessResult<User> {
            let mut user = txn.get_user(id)?.ok_or_else(user_not_found)?;
            let mut records = Vec::new();
            let field = |name: &str, old: String, new: String| {
                AuditRecord::new(&actor.user_id, AuditEntity::User, Some(id), AuditAction::Update)
                    .field(name, Some(old), Some(new))
            };

            if let Some(email) = email {
                if email != user.email {
                    records.push(field("email", user.email.clone(), email.clone()));
                    user.email = email;
                }
            }
            if let Some(role) = role {
                if role != user.role {
                    records.push(field("role", user.role.to_string(), role.to_string()));
                    user.role = role;
                }
            }
            if let Some(name) = name {
                if user.name.as_deref() != Some(name.as_str()) {
                    records.push(field("name", user.name.clone().unwrap_or_default(), name.clone()));
                    user.name = Some(name);
                }
            }
            if let Some(hash) = password_hash {
                user.password_hash = hash;
                records.push(
                    AuditRecord::new(&actor.user_id, AuditEntity::User, Some(id), AuditAction::Update)
                        .field("password", None, Some("[changed by admin]".to_string())),
                );
            }

            txn.put_user(&user).map_err(conflict_as_duplicate)?;
            for record in records {
                txn.append_audit(record)?;
            }
            Ok(user)
        })?;

        info!(%id, "user updated");
        Ok(UserSummary::from(&user))
    }

    /// Remove a user with their sessions and notifications. Admins cannot
    /// remove themselves.
    pub fn delete_user(&self, actor: &Actor, id: &str) -> AccessResult<()> {
        actor.require_admin()?;
        if id == actor.user_id {
            return Err(AccessError::validation("You cannot delete your own account."));
        }
        self.store.write(|txn| -> AccessResult<()> {
            let user = txn.get_user(id)?.ok_or_else(user_not_found)?;
            txn.delete_user(id)?;
            txn.append_audit(
                AuditRecord::new(&actor.user_id, AuditEntity::User, Some(id), AuditAction::Delete)
                    .old_value(json!({ "email": user.email, "role": user.role }).to_string()),
            )?;
            Ok(())
        })?;
        info!(%id, "user deleted");
        Ok(())
    }

    // ── Self service ───────────────────────────────────────────────

    pub fn account(&self, actor: &Actor) -> AccessResult<AccountView> {
        let user = self.store.get_user(&actor.user_id)?.ok_or_else(user_not_found)?;
        Ok(AccountView::from(&user))
    }

    pub fn update_account(&self, actor: &Actor, input: &AccountUpdate) -> AccessResult<AccountView> {
        let email = input.email.as_deref().map(normalize_email).filter(|e| !e.is_empty());
        // An explicit blank name clears it.
        let name = input
            .name
            .as_deref()
            .map(|n| Some(n.trim()).filter(|n| !n.is_empty()).map(str::to_string));
        let new_password = input.new_password.as_deref().filter(|p| !p.is_empty());

        let columns = match &input.dashboard_column_keys {
            Some(keys) => {
                let viewable = self.projection.viewable_keys(actor.role)?;
                if keys.iter().any(|k| !viewable.contains(k)) {
                    return Err(AccessError::validation(
                        "dashboardColumnKeys contains keys you are not allowed to view.",
                    ));
                }
                Some(keys.clone())
            }
            None => None,
        };

        if email.is_none() && name.is_none() && new_password.is_none() && columns.is_none() {
            return Err(AccessError::validation("No valid fields to update."));
        }

        let current = self.store.get_user(&actor.user_id)?.ok_or_else(user_not_found)?;
        let password_hash = match new_password {
            Some(new) => {
                let old = input.old_password.as_deref().unwrap_or_default();
                if old.is_empty() {
                    return Err(AccessError::validation(
                        "Current password is required to set a new password.",
                    ));
                }
                if !verify_password(old, &current.password_hash) {
                    return Err(AccessError::validation("Current password is incorrect."));
                }
                if new.len() < MIN_PASSWORD_LEN {
                    return Err(AccessError::validation("New password must be at least 6 characters."));
                }
                Some(hash_password(new)?)
            }
            None => None,
        };

        let user = self.store.write(|txn| -> AccessResult<User> {
            let mut user = txn.get_user(&actor.user_id)?.ok_or_else(user_not_found)?;
            let id = actor.user_id.as_str();
            let mut records = Vec::new();
            let update = || AuditRecord::new(id, AuditEntity::Account, Some(id), AuditAction::Update);

            if let Some(email) = email {
                if email != user.email {
                    records.push(update().field("email", Some(user.email.clone()), Some(email.clone())));
                    user.email = email;
                }
            }
            if let Some(name) = name {
                if name != user.name {
                    records.push(update().field(
                        "name",
                        Some(user.name.clone().unwrap_or_default()),
                        Some(name.clone().unwrap_or_default()),
                    ));
                    user.name = name;
                }
            }
            if let Some(hash) = password_hash {
                user.password_hash = hash;
                records.push(update().field("password", None, Some("[changed]".to_string())));
            }
            if let Some(columns) = columns {
                user.dashboard_column_keys = columns;
            }

            txn.put_user(&user).map_err(conflict_as_duplicate)?;
            for record in records {
                txn.append_audit(record)?;
            }
            Ok(user)
        })?;

        info!(id = %user.id, "account updated");
        Ok(AccountView::from(&user))
    }
}

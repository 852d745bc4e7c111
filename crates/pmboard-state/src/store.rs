//! StateStore: redb-backed state persistence for pmboard.
//!
//! Provides typed reads over every table and a transactional write API:
//! [`StateStore::write`] runs a closure against a [`StoreTxn`] and commits
//! only when the closure returns `Ok`. Dropping an uncommitted redb write
//! transaction aborts it, so a failed closure leaves no partial state.
//!
//! The store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::ids::{new_id, unix_now};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

const SEQ_COUNTER: &str = "seq";

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for def in [
            USERS,
            SESSIONS,
            PARAMETERS,
            FIELD_PERMISSIONS,
            PROJECTS,
            AUDIT_LOG,
            MESSAGES,
            NOTIFICATIONS,
        ] {
            txn.open_table(def).map_err(map_err!(Table))?;
        }
        txn.open_table(USER_EMAILS).map_err(map_err!(Table))?;
        txn.open_table(PARAMETER_KEYS).map_err(map_err!(Table))?;
        txn.open_table(COUNTERS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Run `f` inside one write transaction, committing only on success.
    ///
    /// The closure's error type only needs a `From<StateError>` conversion,
    /// so service layers can fail the transaction with their own errors.
    pub fn write<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&StoreTxn) -> Result<R, E>,
        E: From<StateError>,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let unit = StoreTxn { txn };
        let out = f(&unit)?;
        unit.txn.commit().map_err(map_err!(Transaction))?;
        Ok(out)
    }

    // ── Generic reads ──────────────────────────────────────────────

    fn get<T: DeserializeOwned>(&self, def: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        read_json(&table, key)
    }

    fn scan<T: DeserializeOwned>(&self, def: JsonTable, prefix: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        scan_json(&table, prefix)
    }

    fn lookup(&self, def: IndexTable, key: &str) -> StateResult<Option<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        read_index(&table, key)
    }

    // ── Users / Sessions ───────────────────────────────────────────

    pub fn get_user(&self, id: &str) -> StateResult<Option<User>> {
        self.get(USERS, id)
    }

    /// Look a user up by (already normalized) email.
    pub fn find_user_by_email(&self, email: &str) -> StateResult<Option<User>> {
        match self.lookup(USER_EMAILS, email)? {
            Some(id) => self.get_user(&id),
            None => Ok(None),
        }
    }

    /// List all users, newest first.
    pub fn list_users(&self) -> StateResult<Vec<User>> {
        let mut users: Vec<User> = self.scan(USERS, "")?;
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.email.cmp(&b.email)));
        Ok(users)
    }

    pub fn get_session(&self, token: &str) -> StateResult<Option<Session>> {
        self.get(SESSIONS, token)
    }

    // ── Parameters / Permissions ───────────────────────────────────

    pub fn get_parameter(&self, id: &str) -> StateResult<Option<Parameter>> {
        self.get(PARAMETERS, id)
    }

    /// List all parameters ordered by `order`, ties by creation sequence.
    pub fn list_parameters(&self) -> StateResult<Vec<Parameter>> {
        let mut params: Vec<Parameter> = self.scan(PARAMETERS, "")?;
        params.sort_by(|a, b| a.order.cmp(&b.order).then(a.seq.cmp(&b.seq)));
        Ok(params)
    }

    pub fn get_permission(&self, parameter_id: &str, role: Role) -> StateResult<Option<FieldPermission>> {
        self.get(FIELD_PERMISSIONS, &permission_key(parameter_id, role))
    }

    /// List every stored permission row.
    pub fn list_permissions(&self) -> StateResult<Vec<FieldPermission>> {
        self.scan(FIELD_PERMISSIONS, "")
    }

    // ── Projects ───────────────────────────────────────────────────

    pub fn get_project(&self, id: &str) -> StateResult<Option<Project>> {
        self.get(PROJECTS, id)
    }

    /// List all projects, most recently updated first.
    pub fn list_projects(&self) -> StateResult<Vec<Project>> {
        let mut projects: Vec<Project> = self.scan(PROJECTS, "")?;
        projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(projects)
    }

    // ── Audit ──────────────────────────────────────────────────────

    /// List audit entries, newest first.
    pub fn list_audit(&self) -> StateResult<Vec<AuditEntry>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(AUDIT_LOG).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))?.rev() {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let audit: AuditEntry =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(audit);
        }
        Ok(results)
    }

    // ── Messages / Notifications ───────────────────────────────────

    pub fn get_message(&self, id: &str) -> StateResult<Option<Message>> {
        self.get(MESSAGES, id)
    }

    /// List all messages, newest first.
    pub fn list_messages(&self) -> StateResult<Vec<Message>> {
        let mut messages: Vec<Message> = self.scan(MESSAGES, "")?;
        messages.sort_by(|a, b| b.seq.cmp(&a.seq));
        Ok(messages)
    }

    /// List a user's notifications, newest first.
    pub fn list_notifications_for_user(&self, user_id: &str) -> StateResult<Vec<Notification>> {
        let mut list: Vec<Notification> = self.scan(NOTIFICATIONS, &format!("{user_id}:"))?;
        list.sort_by(|a, b| b.seq.cmp(&a.seq));
        Ok(list)
    }
}

/// Handle to an open write transaction. Reads through it observe the
/// transaction's own uncommitted writes.
pub struct StoreTxn {
    txn: WriteTransaction,
}

impl StoreTxn {
    // ── Generic access ─────────────────────────────────────────────

    fn get<T: DeserializeOwned>(&self, def: JsonTable, key: &str) -> StateResult<Option<T>> {
        let table = self.txn.open_table(def).map_err(map_err!(Table))?;
        read_json(&table, key)
    }

    fn scan<T: DeserializeOwned>(&self, def: JsonTable, prefix: &str) -> StateResult<Vec<T>> {
        let table = self.txn.open_table(def).map_err(map_err!(Table))?;
        scan_json(&table, prefix)
    }

    fn put<T: Serialize>(&self, def: JsonTable, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let mut table = self.txn.open_table(def).map_err(map_err!(Table))?;
        table
            .insert(key, bytes.as_slice())
            .map_err(map_err!(Write))?;
        Ok(())
    }

    fn remove(&self, def: JsonTable, key: &str) -> StateResult<bool> {
        let mut table = self.txn.open_table(def).map_err(map_err!(Table))?;
        let existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        Ok(existed)
    }

    /// Remove every key starting with `prefix`. Returns number removed.
    fn remove_prefix(&self, def: JsonTable, prefix: &str) -> StateResult<u32> {
        let mut table = self.txn.open_table(def).map_err(map_err!(Table))?;
        // Collect keys first; the iterator borrows the table.
        let keys: Vec<String> = {
            let mut keys = Vec::new();
            for entry in table.range(prefix..).map_err(map_err!(Read))? {
                let (key, _) = entry.map_err(map_err!(Read))?;
                let k = key.value();
                if !k.starts_with(prefix) {
                    break;
                }
                keys.push(k.to_string());
            }
            keys
        };
        for key in &keys {
            table.remove(key.as_str()).map_err(map_err!(Write))?;
        }
        Ok(keys.len() as u32)
    }

    fn lookup(&self, def: IndexTable, key: &str) -> StateResult<Option<String>> {
        let table = self.txn.open_table(def).map_err(map_err!(Table))?;
        read_index(&table, key)
    }

    fn index_put(&self, def: IndexTable, key: &str, id: &str) -> StateResult<()> {
        let mut table = self.txn.open_table(def).map_err(map_err!(Table))?;
        table.insert(key, id).map_err(map_err!(Write))?;
        Ok(())
    }

    fn index_remove(&self, def: IndexTable, key: &str) -> StateResult<()> {
        let mut table = self.txn.open_table(def).map_err(map_err!(Table))?;
        table.remove(key).map_err(map_err!(Write))?;
        Ok(())
    }

    /// Claim `key` in a unique index for `id`, releasing `previous` if the
    /// record's natural key changed.
    fn claim(&self, def: IndexTable, key: &str, id: &str, previous: Option<&str>) -> StateResult<()> {
        if let Some(owner) = self.lookup(def, key)? {
            if owner != id {
                return Err(StateError::Conflict(key.to_string()));
            }
        }
        if let Some(prev) = previous {
            if prev != key {
                self.index_remove(def, prev)?;
            }
        }
        self.index_put(def, key, id)
    }

    /// Next value of the store-wide monotonic sequence.
    pub fn next_seq(&self) -> StateResult<u64> {
        let mut table = self.txn.open_table(COUNTERS).map_err(map_err!(Table))?;
        let current = table
            .get(SEQ_COUNTER)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value())
            .unwrap_or(0);
        let next = current + 1;
        table.insert(SEQ_COUNTER, next).map_err(map_err!(Write))?;
        Ok(next)
    }

    // ── Users / Sessions ───────────────────────────────────────────

    pub fn get_user(&self, id: &str) -> StateResult<Option<User>> {
        self.get(USERS, id)
    }

    pub fn find_user_by_email(&self, email: &str) -> StateResult<Option<User>> {
        match self.lookup(USER_EMAILS, email)? {
            Some(id) => self.get_user(&id),
            None => Ok(None),
        }
    }

    pub fn list_users(&self) -> StateResult<Vec<User>> {
        self.scan(USERS, "")
    }

    /// Insert or update a user. Fails with `Conflict` if the email belongs
    /// to another user.
    pub fn put_user(&self, user: &User) -> StateResult<()> {
        let previous: Option<User> = self.get(USERS, &user.id)?;
        self.claim(
            USER_EMAILS,
            &user.email,
            &user.id,
            previous.as_ref().map(|u| u.email.as_str()),
        )?;
        self.put(USERS, &user.id, user)?;
        debug!(id = %user.id, "user stored");
        Ok(())
    }

    /// Delete a user together with their sessions and notifications.
    /// Returns true if the user existed.
    pub fn delete_user(&self, id: &str) -> StateResult<bool> {
        let Some(user) = self.get_user(id)? else {
            return Ok(false);
        };
        self.remove(USERS, id)?;
        self.index_remove(USER_EMAILS, &user.email)?;
        self.delete_sessions_for_user(id)?;
        let notifications = self.remove_prefix(NOTIFICATIONS, &format!("{id}:"))?;
        debug!(%id, notifications, "user deleted");
        Ok(true)
    }

    pub fn put_session(&self, session: &Session) -> StateResult<()> {
        self.put(SESSIONS, &session.token, session)
    }

    pub fn delete_session(&self, token: &str) -> StateResult<bool> {
        self.remove(SESSIONS, token)
    }

    /// Delete every session belonging to a user. Returns number deleted.
    pub fn delete_sessions_for_user(&self, user_id: &str) -> StateResult<u32> {
        let sessions: Vec<Session> = self.scan(SESSIONS, "")?;
        let mut count = 0;
        for session in sessions.iter().filter(|s| s.user_id == user_id) {
            if self.remove(SESSIONS, &session.token)? {
                count += 1;
            }
        }
        Ok(count)
    }

    // ── Parameters / Permissions ───────────────────────────────────

    pub fn get_parameter(&self, id: &str) -> StateResult<Option<Parameter>> {
        self.get(PARAMETERS, id)
    }

    pub fn find_parameter_by_key(&self, key: &str) -> StateResult<Option<Parameter>> {
        match self.lookup(PARAMETER_KEYS, key)? {
            Some(id) => self.get_parameter(&id),
            None => Ok(None),
        }
    }

    /// Insert or update a parameter. Fails with `Conflict` if the key
    /// belongs to another parameter.
    pub fn put_parameter(&self, param: &Parameter) -> StateResult<()> {
        let previous: Option<Parameter> = self.get(PARAMETERS, &param.id)?;
        self.claim(
            PARAMETER_KEYS,
            &param.key,
            &param.id,
            previous.as_ref().map(|p| p.key.as_str()),
        )?;
        self.put(PARAMETERS, &param.id, param)?;
        debug!(id = %param.id, key = %param.key, "parameter stored");
        Ok(())
    }

    /// Delete a parameter and its permission rows. Project attribute values
    /// are left in place. Returns the removed descriptor.
    pub fn delete_parameter(&self, id: &str) -> StateResult<Option<Parameter>> {
        let Some(param) = self.get_parameter(id)? else {
            return Ok(None);
        };
        self.remove(PARAMETERS, id)?;
        self.index_remove(PARAMETER_KEYS, &param.key)?;
        let permissions = self.remove_prefix(FIELD_PERMISSIONS, &format!("{id}:"))?;
        debug!(%id, permissions, "parameter deleted");
        Ok(Some(param))
    }

    pub fn get_permission(&self, parameter_id: &str, role: Role) -> StateResult<Option<FieldPermission>> {
        self.get(FIELD_PERMISSIONS, &permission_key(parameter_id, role))
    }

    pub fn put_permission(&self, perm: &FieldPermission) -> StateResult<()> {
        self.put(FIELD_PERMISSIONS, &perm.table_key(), perm)
    }

    // ── Projects ───────────────────────────────────────────────────

    pub fn get_project(&self, id: &str) -> StateResult<Option<Project>> {
        self.get(PROJECTS, id)
    }

    /// Insert or overwrite a whole project row.
    pub fn put_project(&self, project: &Project) -> StateResult<()> {
        self.put(PROJECTS, &project.id, project)?;
        debug!(id = %project.id, "project stored");
        Ok(())
    }

    // ── Messages / Notifications ───────────────────────────────────

    pub fn put_message(&self, message: &Message) -> StateResult<()> {
        self.put(MESSAGES, &message.id, message)
    }

    pub fn get_notification(&self, user_id: &str, id: &str) -> StateResult<Option<Notification>> {
        self.get(NOTIFICATIONS, &notification_key(user_id, id))
    }

    pub fn put_notification(&self, notification: &Notification) -> StateResult<()> {
        self.put(NOTIFICATIONS, &notification.table_key(), notification)
    }

    // ── Audit ──────────────────────────────────────────────────────

    /// Append an audit record, assigning id, sequence, and timestamp.
    pub fn append_audit(&self, record: AuditRecord) -> StateResult<AuditEntry> {
        let entry = AuditEntry {
            id: new_id()?,
            seq: self.next_seq()?,
            actor_id: record.actor_id,
            entity: record.entity,
            entity_id: record.entity_id,
            action: record.action,
            field_name: record.field_name,
            old_value: record.old_value,
            new_value: record.new_value,
            metadata: record.metadata,
            created_at: unix_now(),
        };
        self.put(AUDIT_LOG, &entry.table_key(), &entry)?;
        Ok(entry)
    }
}

// ── Table helpers ──────────────────────────────────────────────────

fn read_json<T, Tbl>(table: &Tbl, key: &str) -> StateResult<Option<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key).map_err(map_err!(Read))? {
        Some(guard) => {
            let value: T = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Keys sharing `prefix` are contiguous, so the scan starts at the prefix
/// and stops at the first key past it.
fn scan_json<T, Tbl>(table: &Tbl, prefix: &str) -> StateResult<Vec<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    let mut results = Vec::new();
    for entry in table.range(prefix..).map_err(map_err!(Read))? {
        let (key, value) = entry.map_err(map_err!(Read))?;
        if !key.value().starts_with(prefix) {
            break;
        }
        let item: T = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
        results.push(item);
    }
    Ok(results)
}

fn read_index<Tbl>(table: &Tbl, key: &str) -> StateResult<Option<String>>
where
    Tbl: ReadableTable<&'static str, &'static str>,
{
    Ok(table
        .get(key)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn test_user(id: &str, email: &str) -> User {
        User {
            id: id.to_string(),
            email: email.to_string(),
            name: None,
            role: Role::Staff,
            password_hash: "x".to_string(),
            dashboard_column_keys: Vec::new(),
            created_at: 1000,
        }
    }

    fn test_parameter(id: &str, key: &str, order: i64, seq: u64) -> Parameter {
        Parameter {
            id: id.to_string(),
            key: key.to_string(),
            label: key.to_uppercase(),
            kind: ParameterType::Text,
            options: None,
            order,
            seq,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    fn test_project(id: &str, updated_at: u64) -> Project {
        Project {
            id: id.to_string(),
            name: format!("project {id}"),
            status: "pending".to_string(),
            attributes: BTreeMap::new(),
            confidential_notes: None,
            created_at: 1000,
            updated_at,
        }
    }

    fn permission(param: &str, role: Role, view: bool) -> FieldPermission {
        FieldPermission {
            id: format!("perm-{param}-{role}"),
            parameter_id: param.to_string(),
            role,
            can_view: view,
            can_edit: false,
            can_update: false,
            updated_at: 1000,
        }
    }

    // ── Users ──────────────────────────────────────────────────────

    #[test]
    fn user_put_and_lookup_by_email() {
        let store = StateStore::open_in_memory().unwrap();
        let user = test_user("u1", "a@example.com");
        store.write(|txn| txn.put_user(&user)).unwrap();

        assert_eq!(store.get_user("u1").unwrap(), Some(user.clone()));
        assert_eq!(store.find_user_by_email("a@example.com").unwrap(), Some(user));
        assert!(store.find_user_by_email("b@example.com").unwrap().is_none());
    }

    #[test]
    fn user_email_is_unique() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .write(|txn| txn.put_user(&test_user("u1", "a@example.com")))
            .unwrap();

        let err = store
            .write(|txn| txn.put_user(&test_user("u2", "a@example.com")))
            .unwrap_err();
        assert!(matches!(err, StateError::Conflict(_)));
        assert!(store.get_user("u2").unwrap().is_none());
    }

    #[test]
    fn user_email_change_releases_old_index_entry() {
        let store = StateStore::open_in_memory().unwrap();
        let mut user = test_user("u1", "old@example.com");
        store.write(|txn| txn.put_user(&user)).unwrap();

        user.email = "new@example.com".to_string();
        store.write(|txn| txn.put_user(&user)).unwrap();

        assert!(store.find_user_by_email("old@example.com").unwrap().is_none());
        assert_eq!(store.find_user_by_email("new@example.com").unwrap().unwrap().id, "u1");
        // The old address is free again.
        store
            .write(|txn| txn.put_user(&test_user("u2", "old@example.com")))
            .unwrap();
    }

    #[test]
    fn notification_scan_is_bounded_by_user_prefix() {
        let store = StateStore::open_in_memory().unwrap();
        let note = |user: &str, id: &str, seq: u64| Notification {
            id: id.into(),
            user_id: user.into(),
            message_id: "m1".into(),
            read: false,
            seq,
            created_at: 0,
        };
        store
            .write(|txn| {
                txn.put_notification(&note("u0", "n0", 1))?;
                txn.put_notification(&note("u1", "n1", 2))?;
                txn.put_notification(&note("u1", "n2", 3))?;
                txn.put_notification(&note("u10", "n3", 4))?;
                txn.put_notification(&note("u2", "n4", 5))
            })
            .unwrap();

        let ids: Vec<String> = store
            .list_notifications_for_user("u1")
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec!["n2", "n1"]);
        assert_eq!(store.list_notifications_for_user("u10").unwrap().len(), 1);
        assert!(store.list_notifications_for_user("u3").unwrap().is_empty());

        store.write(|txn| txn.put_user(&test_user("u1", "a@example.com"))).unwrap();
        assert!(store.write(|txn| txn.delete_user("u1")).unwrap());
        assert!(store.list_notifications_for_user("u1").unwrap().is_empty());
        assert_eq!(store.list_notifications_for_user("u10").unwrap().len(), 1);
        assert_eq!(store.list_notifications_for_user("u0").unwrap().len(), 1);
    }

    #[test]
    fn delete_user_removes_sessions_and_notifications() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .write(|txn| {
                txn.put_user(&test_user("u1", "a@example.com"))?;
                txn.put_session(&Session {
                    token: "t1".into(),
                    user_id: "u1".into(),
                    created_at: 0,
                    expires_at: 10,
                })?;
                txn.put_notification(&Notification {
                    id: "n1".into(),
                    user_id: "u1".into(),
                    message_id: "m1".into(),
                    read: false,
                    seq: 1,
                    created_at: 0,
                })
            })
            .unwrap();

        assert!(store.write(|txn| txn.delete_user("u1")).unwrap());
        assert!(store.get_session("t1").unwrap().is_none());
        assert!(store.list_notifications_for_user("u1").unwrap().is_empty());
        assert!(store.find_user_by_email("a@example.com").unwrap().is_none());
        assert!(!store.write(|txn| txn.delete_user("u1")).unwrap());
    }

    // ── Parameters ─────────────────────────────────────────────────

    #[test]
    fn parameters_sorted_by_order_then_creation() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .write(|txn| {
                txn.put_parameter(&test_parameter("p1", "late", 5, 1))?;
                txn.put_parameter(&test_parameter("p2", "first", 0, 2))?;
                txn.put_parameter(&test_parameter("p3", "second", 0, 3))
            })
            .unwrap();

        let keys: Vec<String> = store
            .list_parameters()
            .unwrap()
            .into_iter()
            .map(|p| p.key)
            .collect();
        assert_eq!(keys, vec!["first", "second", "late"]);
    }

    #[test]
    fn parameter_key_is_unique() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .write(|txn| txn.put_parameter(&test_parameter("p1", "owner", 0, 1)))
            .unwrap();
        let err = store
            .write(|txn| txn.put_parameter(&test_parameter("p2", "owner", 0, 2)))
            .unwrap_err();
        assert!(matches!(err, StateError::Conflict(_)));
    }

    #[test]
    fn delete_parameter_removes_permission_rows_only() {
        let store = StateStore::open_in_memory().unwrap();
        let mut project = test_project("x", 1000);
        project
            .attributes
            .insert("owner".into(), AttributeValue::Text("Alice".into()));
        store
            .write(|txn| {
                txn.put_parameter(&test_parameter("p1", "owner", 0, 1))?;
                txn.put_parameter(&test_parameter("p2", "budget", 0, 2))?;
                txn.put_permission(&permission("p1", Role::Staff, true))?;
                txn.put_permission(&permission("p1", Role::Manager, true))?;
                txn.put_permission(&permission("p2", Role::Staff, true))?;
                txn.put_project(&project)
            })
            .unwrap();

        let removed = store.write(|txn| txn.delete_parameter("p1")).unwrap();
        assert_eq!(removed.unwrap().key, "owner");

        let remaining = store.list_permissions().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].parameter_id, "p2");
        // Attribute values are not garbage-collected.
        let stored = store.get_project("x").unwrap().unwrap();
        assert!(stored.attributes.contains_key("owner"));
        // The key can be reused.
        store
            .write(|txn| txn.put_parameter(&test_parameter("p3", "owner", 0, 3)))
            .unwrap();
    }

    #[test]
    fn permission_lookup_by_role() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .write(|txn| {
                txn.put_permission(&permission("p1", Role::Staff, true))?;
                txn.put_permission(&permission("p1", Role::Manager, false))
            })
            .unwrap();

        assert!(store.get_permission("p1", Role::Staff).unwrap().unwrap().can_view);
        assert!(store.get_permission("p1", Role::Admin).unwrap().is_none());
        assert_eq!(store.list_permissions().unwrap().len(), 2);
    }

    // ── Transactions ───────────────────────────────────────────────

    #[test]
    fn failed_write_closure_rolls_back() {
        let store = StateStore::open_in_memory().unwrap();
        let result: StateResult<()> = store.write(|txn| {
            txn.put_project(&test_project("x", 1000))?;
            Err(StateError::Write("boom".into()))
        });
        assert!(result.is_err());
        assert!(store.get_project("x").unwrap().is_none());
    }

    #[test]
    fn projects_listed_most_recent_first() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .write(|txn| {
                txn.put_project(&test_project("a", 100))?;
                txn.put_project(&test_project("b", 300))?;
                txn.put_project(&test_project("c", 200))
            })
            .unwrap();
        let ids: Vec<String> = store.list_projects().unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    // ── Audit ──────────────────────────────────────────────────────

    #[test]
    fn audit_entries_listed_newest_first() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .write(|txn| {
                for field in ["name", "status", "owner"] {
                    txn.append_audit(
                        AuditRecord::new("u1", AuditEntity::Project, Some("x"), AuditAction::Update)
                            .field(field, None, Some("v".into())),
                    )?;
                }
                Ok::<_, StateError>(())
            })
            .unwrap();

        let fields: Vec<String> = store
            .list_audit()
            .unwrap()
            .into_iter()
            .filter_map(|e| e.field_name)
            .collect();
        assert_eq!(fields, vec!["owner", "status", "name"]);
    }

    #[test]
    fn sequence_is_monotonic_across_transactions() {
        let store = StateStore::open_in_memory().unwrap();
        let a = store.write(|txn| txn.next_seq()).unwrap();
        let b = store.write(|txn| txn.next_seq()).unwrap();
        assert!(b > a);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.write(|txn| txn.put_project(&test_project("x", 1000))).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let project = store.get_project("x").unwrap();
        assert_eq!(project.unwrap().name, "project x");
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_users().unwrap().is_empty());
        assert!(store.list_parameters().unwrap().is_empty());
        assert!(store.list_projects().unwrap().is_empty());
        assert!(store.list_audit().unwrap().is_empty());
        assert!(store.list_messages().unwrap().is_empty());
        assert!(store.list_notifications_for_user("any").unwrap().is_empty());
        assert!(store.write(|txn| txn.delete_parameter("nope")).unwrap().is_none());
        assert!(!store.write(|txn| txn.delete_session("nope")).unwrap());
    }
}

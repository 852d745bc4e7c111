//! redb table definitions for the pmboard state store.
//!
//! Record tables use `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Index tables map a unique natural key to a record id.

use redb::TableDefinition;

/// Shape shared by every JSON record table.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Shape shared by unique-index tables (natural key → record id).
pub type IndexTable = TableDefinition<'static, &'static str, &'static str>;

/// Users keyed by `{user_id}`.
pub const USERS: JsonTable = TableDefinition::new("users");

/// Unique index: lowercased email → user id.
pub const USER_EMAILS: IndexTable = TableDefinition::new("user_emails");

/// Sessions keyed by bearer token.
pub const SESSIONS: JsonTable = TableDefinition::new("sessions");

/// Parameter descriptors keyed by `{parameter_id}`.
pub const PARAMETERS: JsonTable = TableDefinition::new("parameters");

/// Unique index: parameter key → parameter id.
pub const PARAMETER_KEYS: IndexTable = TableDefinition::new("parameter_keys");

/// Field permissions keyed by `{parameter_id}:{ROLE}`.
pub const FIELD_PERMISSIONS: JsonTable = TableDefinition::new("field_permissions");

/// Projects keyed by `{project_id}`.
pub const PROJECTS: JsonTable = TableDefinition::new("projects");

/// Audit entries keyed by zero-padded sequence number (append order).
pub const AUDIT_LOG: JsonTable = TableDefinition::new("audit_log");

/// Messages keyed by `{message_id}`.
pub const MESSAGES: JsonTable = TableDefinition::new("messages");

/// Notifications keyed by `{user_id}:{notification_id}`.
pub const NOTIFICATIONS: JsonTable = TableDefinition::new("notifications");

/// Named monotonic counters.
pub const COUNTERS: TableDefinition<'static, &'static str, u64> = TableDefinition::new("counters");

//! Domain types for the pmboard state store.
//!
//! These types represent the persisted state of users, sessions, project
//! parameters, field permissions, projects, messages, notifications, and
//! audit entries. All types are serializable to/from JSON for storage in
//! redb tables.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a user.
pub type UserId = String;

/// Unique identifier for a parameter descriptor.
pub type ParameterId = String;

/// Unique identifier for a project.
pub type ProjectId = String;

// ── Roles ─────────────────────────────────────────────────────────

/// Account role. ADMIN bypasses every field-level restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Manager,
    Staff,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Manager, Role::Staff];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Manager => "MANAGER",
            Role::Staff => "STAFF",
        }
    }

    /// Parse the wire form (`ADMIN`, `MANAGER`, `STAFF`). Exact match only.
    pub fn parse(s: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|r| r.as_str() == s)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── User / Session ────────────────────────────────────────────────

/// A user account. `password_hash` is persisted but never leaves the
/// service layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    /// Trimmed, lowercased.
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    pub password_hash: String,
    /// Parameter keys the user chose to show as dashboard columns.
    #[serde(default)]
    pub dashboard_column_keys: Vec<String>,
    pub created_at: u64,
}

/// Bearer-token session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub created_at: u64,
    pub expires_at: u64,
}

impl Session {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

// ── Parameter ─────────────────────────────────────────────────────

/// Declared type of a parameter's values. Only used at presentation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    #[default]
    Text,
    Number,
    Date,
    Select,
}

impl ParameterType {
    /// Parse a type tag, falling back to `Text` for blank or unknown input.
    pub fn parse_lenient(s: &str) -> ParameterType {
        match s.trim().to_ascii_lowercase().as_str() {
            "number" => ParameterType::Number,
            "date" => ParameterType::Date,
            "select" => ParameterType::Select,
            _ => ParameterType::Text,
        }
    }
}

/// Admin-defined extra project field descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub id: ParameterId,
    /// Unique attribute-bag key.
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: ParameterType,
    /// Comma-separated choices; only meaningful for `select`.
    pub options: Option<String>,
    /// Primary sort key.
    pub order: i64,
    /// Creation sequence; breaks `order` ties.
    pub seq: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

// ── Field permission ──────────────────────────────────────────────

/// Stored capability flags for one (parameter, role) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldPermission {
    pub id: String,
    pub parameter_id: ParameterId,
    pub role: Role,
    pub can_view: bool,
    pub can_edit: bool,
    pub can_update: bool,
    pub updated_at: u64,
}

impl FieldPermission {
    /// Build the composite key for the field permissions table.
    pub fn table_key(&self) -> String {
        permission_key(&self.parameter_id, self.role)
    }
}

/// Composite key `{parameter_id}:{ROLE}`.
pub fn permission_key(parameter_id: &str, role: Role) -> String {
    format!("{parameter_id}:{}", role.as_str())
}

// ── Project ───────────────────────────────────────────────────────

/// Loosely-typed scalar held in a project's attribute bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Number(f64),
    Text(String),
}

impl AttributeValue {
    /// Convert an arbitrary JSON value. Non-scalar input is kept as its
    /// JSON text.
    pub fn from_json(value: &serde_json::Value) -> AttributeValue {
        match value {
            serde_json::Value::Null => AttributeValue::Null,
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => AttributeValue::Number(f),
                None => AttributeValue::Text(n.to_string()),
            },
            serde_json::Value::String(s) => AttributeValue::Text(s.clone()),
            other => AttributeValue::Text(other.to_string()),
        }
    }

    /// Trimmed string form used for change detection, filtering and audit.
    /// `Null` compares as the empty string.
    pub fn compare_string(&self) -> String {
        match self {
            AttributeValue::Null => String::new(),
            AttributeValue::Number(n) => n.to_string(),
            AttributeValue::Text(s) => s.trim().to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Value as it should be shown for a parameter of type `kind`.
    /// Numeric text is surfaced as a number for `number` parameters.
    pub fn present(&self, kind: ParameterType) -> AttributeValue {
        match (kind, self) {
            (ParameterType::Number, AttributeValue::Text(s)) => match s.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => AttributeValue::Number(n),
                _ => self.clone(),
            },
            _ => self.clone(),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        AttributeValue::Number(n)
    }
}

/// A project row: fixed columns plus the open attribute bag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    /// Free-form; the UI convention is `pending`, `in_progress`, `completed`.
    pub status: String,
    /// Values keyed by parameter key. May contain orphaned keys.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    pub confidential_notes: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

// ── Audit ─────────────────────────────────────────────────────────

/// Entity kind an audit record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditEntity {
    User,
    Project,
    Message,
    Parameter,
    Permission,
    Account,
    Notification,
}

impl AuditEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEntity::User => "user",
            AuditEntity::Project => "project",
            AuditEntity::Message => "message",
            AuditEntity::Parameter => "parameter",
            AuditEntity::Permission => "permission",
            AuditEntity::Account => "account",
            AuditEntity::Notification => "notification",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

/// Audit record as submitted; the store assigns id, sequence and time.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub actor_id: UserId,
    pub entity: AuditEntity,
    pub entity_id: Option<String>,
    pub action: AuditAction,
    pub field_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl AuditRecord {
    pub fn new(actor_id: &str, entity: AuditEntity, entity_id: Option<&str>, action: AuditAction) -> Self {
        Self {
            actor_id: actor_id.to_string(),
            entity,
            entity_id: entity_id.map(str::to_string),
            action,
            field_name: None,
            old_value: None,
            new_value: None,
            metadata: None,
        }
    }

    /// Record a single field transition.
    pub fn field(mut self, name: &str, old: Option<String>, new: Option<String>) -> Self {
        self.field_name = Some(name.to_string());
        self.old_value = old;
        self.new_value = new;
        self
    }

    pub fn new_value(mut self, value: String) -> Self {
        self.new_value = Some(value);
        self
    }

    pub fn old_value(mut self, value: String) -> Self {
        self.old_value = Some(value);
        self
    }
}

/// Persisted audit entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub seq: u64,
    pub actor_id: UserId,
    pub entity: AuditEntity,
    pub entity_id: Option<String>,
    pub action: AuditAction,
    pub field_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: u64,
}

impl AuditEntry {
    /// Zero-padded key so lexical order equals append order.
    pub fn table_key(&self) -> String {
        audit_key(self.seq)
    }
}

pub fn audit_key(seq: u64) -> String {
    format!("{seq:020}")
}

// ── Messaging ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessagePriority {
    #[default]
    Normal,
    Important,
}

impl MessagePriority {
    /// Exact wire match (`NORMAL`, `IMPORTANT`).
    pub fn parse(s: &str) -> Option<MessagePriority> {
        match s {
            "NORMAL" => Some(MessagePriority::Normal),
            "IMPORTANT" => Some(MessagePriority::Important),
            _ => None,
        }
    }
}

/// Internal broadcast message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: UserId,
    pub title: String,
    pub body: String,
    pub priority: MessagePriority,
    pub seq: u64,
    pub created_at: u64,
}

/// Per-user inbox entry pointing at a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: UserId,
    pub message_id: String,
    pub read: bool,
    pub seq: u64,
    pub created_at: u64,
}

impl Notification {
    /// Build the composite key for the notifications table.
    pub fn table_key(&self) -> String {
        notification_key(&self.user_id, &self.id)
    }
}

pub fn notification_key(user_id: &str, notification_id: &str) -> String {
    format!("{user_id}:{notification_id}")
}

pub const SCHEMA_VERSION: i32 = 3;

pub const SCHEMA_V1: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY,
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS contacts (
    id TEXT PRIMARY KEY,
    user_id TEXT,
    identity_provider_id TEXT,
    contact_type TEXT NOT NULL DEFAULT 'LEAD',
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    phone TEXT,
    company TEXT,
    stage TEXT NOT NULL DEFAULT 'NEW',
    stage_entered_at TEXT NOT NULL,
    referrer_username TEXT,
    referrer_type TEXT,
    attribution_method TEXT,
    attribution_confidence INTEGER,
    commission_rate REAL,
    commission_rate_locked_at TEXT,
    assigned_preparer_id TEXT,
    assigned_at TEXT,
    last_contacted_at TEXT,
    lead_score INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

-- Append-only
CREATE TABLE IF NOT EXISTS interactions (
    id TEXT PRIMARY KEY,
    contact_id TEXT NOT NULL,
    interaction_type TEXT NOT NULL,
    direction TEXT NOT NULL,
    subject TEXT,
    body TEXT,
    occurred_at TEXT NOT NULL,
    attachments TEXT NOT NULL DEFAULT '[]',
    created_by TEXT,
    created_at TEXT NOT NULL,
    FOREIGN KEY (contact_id) REFERENCES contacts(id)
);

-- Append-only
CREATE TABLE IF NOT EXISTS stage_history (
    id TEXT PRIMARY KEY,
    contact_id TEXT NOT NULL,
    from_stage TEXT NOT NULL,
    to_stage TEXT NOT NULL,
    changed_by TEXT NOT NULL,
    reason TEXT,
    created_at TEXT NOT NULL,
    FOREIGN KEY (contact_id) REFERENCES contacts(id)
);

CREATE INDEX IF NOT EXISTS idx_contact_stage ON contacts(stage);
CREATE INDEX IF NOT EXISTS idx_contact_type ON contacts(contact_type);
CREATE INDEX IF NOT EXISTS idx_contact_assigned ON contacts(assigned_preparer_id);
CREATE INDEX IF NOT EXISTS idx_contact_updated ON contacts(updated_at);
CREATE INDEX IF NOT EXISTS idx_contact_deleted ON contacts(deleted_at);
CREATE INDEX IF NOT EXISTS idx_interaction_contact ON interactions(contact_id, occurred_at);
CREATE INDEX IF NOT EXISTS idx_stage_history_contact ON stage_history(contact_id, created_at);
"#;

/// V2 migration: tags and follow-up tasks
pub const MIGRATION_V2: &str = r#"
CREATE TABLE IF NOT EXISTS tags (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
    color TEXT
);

CREATE TABLE IF NOT EXISTS contact_tags (
    id TEXT PRIMARY KEY,
    contact_id TEXT NOT NULL,
    tag_id TEXT NOT NULL,
    added_at TEXT NOT NULL,
    FOREIGN KEY (contact_id) REFERENCES contacts(id),
    FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE,
    UNIQUE(contact_id, tag_id)
);

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    contact_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    due_at TEXT,
    completed_at TEXT,
    assigned_to TEXT,
    created_by TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (contact_id) REFERENCES contacts(id)
);

CREATE INDEX IF NOT EXISTS idx_contact_tag_contact ON contact_tags(contact_id);
CREATE INDEX IF NOT EXISTS idx_task_contact ON tasks(contact_id);
CREATE INDEX IF NOT EXISTS idx_task_completed ON tasks(completed_at);
"#;

/// V3 migration: email activity log for notification attempts
pub const MIGRATION_V3: &str = r#"
CREATE TABLE IF NOT EXISTS email_activity (
    id TEXT PRIMARY KEY,
    contact_id TEXT,
    event TEXT NOT NULL,
    recipient TEXT NOT NULL,
    subject TEXT NOT NULL,
    provider_message_id TEXT,
    status TEXT NOT NULL CHECK(status IN ('SENT', 'FAILED')),
    error TEXT,
    created_at TEXT NOT NULL,
    FOREIGN KEY (contact_id) REFERENCES contacts(id)
);

CREATE INDEX IF NOT EXISTS idx_email_activity_contact ON email_activity(contact_id, created_at);
"#;

/// Migrations in order; entry `i` upgrades the schema to version `i + 1`.
pub const MIGRATIONS: [&str; SCHEMA_VERSION as usize] = [SCHEMA_V1, MIGRATION_V2, MIGRATION_V3];

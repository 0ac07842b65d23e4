pub const SCHEMA: &str = r#"
-- One document per installed team. Key columns are copied out of the
-- document so secondary lookups and uniqueness are enforced by SQLite.
CREATE TABLE IF NOT EXISTS tenants (
    id TEXT PRIMARY KEY,
    rev TEXT NOT NULL,                 -- optimistic concurrency token
    team TEXT NOT NULL UNIQUE,
    carrier_account_id TEXT,           -- NULL until provisioned
    phone_digits TEXT UNIQUE,          -- NULL until provisioned
    doc TEXT NOT NULL,                 -- JSON tenant document
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_tenants_carrier_account ON tenants(carrier_account_id);
"#;

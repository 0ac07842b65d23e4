use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TenantStore;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::phone::digits;
use crate::types::{CarrierCredentials, ChatCredentials, EventTimestamp, Tenant};

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

const SELECT_TENANT: &str = "SELECT id, rev, doc, created_at, updated_at FROM tenants";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::with_busy_timeout(db_path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Opens the database; `busy_timeout` bounds how long a write waits on a
    /// locked database before failing.
    pub fn with_busy_timeout<P: AsRef<Path>>(db_path: P, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn query_tenants(&self, sql: &str, value: &str) -> Result<Vec<Tenant>> {
        let raws = {
            let conn = self.conn();
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params![value], RawTenant::from_row)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        raws.into_iter().map(RawTenant::decode).collect()
    }

    /// Zero or one tenant for a key that should identify at most one.
    fn query_unique(&self, sql: &str, value: &str, key: &str) -> Result<Option<Tenant>> {
        let mut tenants = self.query_tenants(sql, value)?;
        if tenants.len() > 1 {
            let teams: Vec<&str> = tenants.iter().map(|t| t.team.as_str()).collect();
            return Err(Error::Inconsistent(format!(
                "{key} {value} matches {} teams: {}",
                tenants.len(),
                teams.join(", ")
            )));
        }
        Ok(tenants.pop())
    }
}

/// The JSON document stored for each tenant.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TenantDocument {
    team: String,
    chat_credentials: ChatCredentials,
    #[serde(default)]
    carrier_credentials: Option<CarrierCredentials>,
    #[serde(default)]
    phone_number: Option<String>,
    channels: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    last_event_timestamp: Option<EventTimestamp>,
    #[serde(default)]
    channel_event_timestamps: BTreeMap<String, EventTimestamp>,
}

impl From<&Tenant> for TenantDocument {
    fn from(tenant: &Tenant) -> Self {
        Self {
            team: tenant.team.clone(),
            chat_credentials: tenant.chat.clone(),
            carrier_credentials: tenant.carrier.clone(),
            phone_number: tenant.phone_number.clone(),
            channels: tenant.channels.clone(),
            last_event_timestamp: tenant.last_event_ts,
            channel_event_timestamps: tenant.channel_event_ts.clone(),
        }
    }
}

struct RawTenant {
    id: String,
    rev: String,
    doc: String,
    created_at: String,
    updated_at: String,
}

impl RawTenant {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            rev: row.get(1)?,
            doc: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn decode(self) -> Result<Tenant> {
        let doc: TenantDocument = serde_json::from_str(&self.doc)
            .map_err(|e| Error::Document(format!("tenant {}: {e}", self.id)))?;

        if doc.team.trim().is_empty() {
            return Err(Error::Document(format!("tenant {} has an empty team", self.id)));
        }
        if doc.chat_credentials.bot_access_token.is_empty() {
            return Err(Error::Document(format!(
                "tenant {} (team {}) has no bot access token",
                self.id, doc.team
            )));
        }

        let created_at = parse_timestamp(&self.id, "created_at", &self.created_at)?;
        let updated_at = parse_timestamp(&self.id, "updated_at", &self.updated_at)?;

        Ok(Tenant {
            id: self.id,
            revision: self.rev,
            team: doc.team,
            chat: doc.chat_credentials,
            carrier: doc.carrier_credentials,
            phone_number: doc.phone_number,
            channels: doc.channels,
            last_event_ts: doc.last_event_timestamp,
            channel_event_ts: doc.channel_event_timestamps,
            created_at,
            updated_at,
        })
    }
}

/// Rows written by this store carry RFC 3339; rows that fell back to the
/// column default carry `datetime('now')` output.
fn parse_timestamp(id: &str, column: &str, value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .map(|ndt| ndt.and_utc())
        .map_err(|e| Error::Document(format!("tenant {id} has a bad {column} '{value}': {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Revisions are `<generation>-<random>`; the generation only aids debugging.
fn next_revision(current: Option<&str>) -> String {
    let generation = current
        .and_then(|rev| rev.split_once('-'))
        .and_then(|(generation, _)| generation.parse::<u64>().ok())
        .unwrap_or(0);
    format!("{}-{}", generation + 1, Uuid::new_v4().simple())
}

fn phone_key(tenant: &Tenant) -> Option<String> {
    tenant
        .phone_number
        .as_deref()
        .map(digits)
        .filter(|d| !d.is_empty())
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn unique_violation(tenant: &Tenant) -> Error {
    Error::AlreadyExists(format!(
        "team {} or phone number {} already belongs to another tenant",
        tenant.team,
        tenant.phone_number.as_deref().unwrap_or("-")
    ))
}

fn insert_tenant(conn: &Connection, tenant: &Tenant) -> Result<()> {
    let doc = serde_json::to_string(&TenantDocument::from(tenant))?;
    let result = conn.execute(
        "INSERT INTO tenants (id, rev, team, carrier_account_id, phone_digits, doc, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            tenant.id,
            tenant.revision,
            tenant.team,
            tenant.carrier.as_ref().map(|c| c.account_id.as_str()),
            phone_key(tenant),
            doc,
            format_datetime(&tenant.created_at),
            format_datetime(&tenant.updated_at),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_constraint_violation(&e) => Err(unique_violation(tenant)),
        Err(e) => Err(Error::from(e)),
    }
}

/// Writes `tenant` under `new_rev` if the stored revision is still
/// `tenant.revision`. Returns the number of rows written.
fn update_tenant(
    conn: &Connection,
    tenant: &Tenant,
    new_rev: &str,
    now: &DateTime<Utc>,
) -> Result<usize> {
    let doc = serde_json::to_string(&TenantDocument::from(tenant))?;
    let result = conn.execute(
        "UPDATE tenants
         SET rev = ?1, team = ?2, carrier_account_id = ?3, phone_digits = ?4, doc = ?5, updated_at = ?6
         WHERE id = ?7 AND rev = ?8",
        params![
            new_rev,
            tenant.team,
            tenant.carrier.as_ref().map(|c| c.account_id.as_str()),
            phone_key(tenant),
            doc,
            format_datetime(now),
            tenant.id,
            tenant.revision,
        ],
    );

    match result {
        Ok(rows) => Ok(rows),
        Err(e) if is_constraint_violation(&e) => Err(unique_violation(tenant)),
        Err(e) => Err(Error::from(e)),
    }
}

impl TenantStore for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Tenant>> {
        self.query_unique(&format!("{SELECT_TENANT} WHERE id = ?1"), id, "tenant id")
    }

    fn find_by_team(&self, team: &str) -> Result<Option<Tenant>> {
        self.query_unique(&format!("{SELECT_TENANT} WHERE team = ?1"), team, "team")
    }

    fn find_by_carrier_account(&self, account_id: &str) -> Result<Option<Tenant>> {
        self.query_unique(
            &format!("{SELECT_TENANT} WHERE carrier_account_id = ?1"),
            account_id,
            "carrier account",
        )
    }

    fn find_by_phone(&self, phone: &str) -> Result<Option<Tenant>> {
        let key = digits(phone);
        if key.is_empty() {
            return Ok(None);
        }
        self.query_unique(
            &format!("{SELECT_TENANT} WHERE phone_digits = ?1"),
            &key,
            "phone number",
        )
    }

    fn upsert(&self, team: &str, chat: &ChatCredentials) -> Result<Tenant> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = Utc::now();

        let existing = tx
            .query_row(
                &format!("{SELECT_TENANT} WHERE team = ?1"),
                params![team],
                RawTenant::from_row,
            )
            .optional()?;

        let tenant = match existing {
            Some(raw) => {
                let current = raw.decode()?;
                let updated = Tenant {
                    chat: chat.clone(),
                    ..current
                };
                let rev = next_revision(Some(&updated.revision));
                if update_tenant(&tx, &updated, &rev, &now)? == 0 {
                    return Err(Error::Conflict(format!(
                        "tenant for team {team} changed during install"
                    )));
                }
                Tenant {
                    revision: rev,
                    updated_at: now,
                    ..updated
                }
            }
            None => {
                let tenant = Tenant {
                    id: Uuid::new_v4().to_string(),
                    revision: next_revision(None),
                    team: team.to_string(),
                    chat: chat.clone(),
                    carrier: None,
                    phone_number: None,
                    channels: BTreeMap::new(),
                    last_event_ts: None,
                    channel_event_ts: BTreeMap::new(),
                    created_at: now,
                    updated_at: now,
                };
                insert_tenant(&tx, &tenant)?;
                tenant
            }
        };

        tx.commit()?;
        Ok(tenant)
    }

    fn save(&self, tenant: &Tenant) -> Result<Tenant> {
        if tenant.id.is_empty() {
            return Err(Error::Document(format!(
                "refusing to save tenant for team {} without an id",
                tenant.team
            )));
        }

        let conn = self.conn();
        let now = Utc::now();
        let rev = next_revision(Some(&tenant.revision));

        if update_tenant(&conn, tenant, &rev, &now)? == 0 {
            let current: Option<String> = conn
                .query_row(
                    "SELECT rev FROM tenants WHERE id = ?1",
                    params![tenant.id],
                    |row| row.get(0),
                )
                .optional()?;

            return Err(match current {
                Some(current) => Error::Conflict(format!(
                    "tenant {} (team {}) is at revision {current}, write was based on {}",
                    tenant.id, tenant.team, tenant.revision
                )),
                None => Error::NotFound(format!("tenant {} (team {})", tenant.id, tenant.team)),
            });
        }

        Ok(Tenant {
            revision: rev,
            updated_at: now,
            ..tenant.clone()
        })
    }
}

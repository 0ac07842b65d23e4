mod schema;
mod sqlite;

pub use sqlite::{DEFAULT_BUSY_TIMEOUT, SqliteStore};

use crate::error::{Error, Result};
use crate::types::phone::digits;
use crate::types::{CarrierCredentials, ChatCredentials, Tenant};

/// Tenant persistence with optimistic concurrency.
///
/// Every write presents the revision it read; `save` fails with
/// [`Error::Conflict`] when the stored revision has moved on.
pub trait TenantStore: Send + Sync {
    fn initialize(&self) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<Tenant>>;
    fn find_by_team(&self, team: &str) -> Result<Option<Tenant>>;
    fn find_by_carrier_account(&self, account_id: &str) -> Result<Option<Tenant>>;
    fn find_by_phone(&self, phone: &str) -> Result<Option<Tenant>>;

    /// Creates the team's tenant, or replaces only its chat credentials.
    fn upsert(&self, team: &str, chat: &ChatCredentials) -> Result<Tenant>;

    /// Writes the tenant and returns it with its new revision.
    fn save(&self, tenant: &Tenant) -> Result<Tenant>;
}

/// Looks a team's tenant up, turning absence into [`Error::NotFound`].
pub fn require_team(store: &dyn TenantStore, team: &str) -> Result<Tenant> {
    store
        .find_by_team(team)?
        .ok_or_else(|| Error::NotFound(format!("Unknown team ID {team}.")))
}

/// Read-modify-write against the latest revision of a team's tenant.
///
/// `apply` returns whether it changed the tenant; unchanged tenants are not
/// written. A conflicting write re-reads and re-applies, up to `attempts`
/// times in total, before the conflict is surfaced.
pub fn modify_tenant<F>(
    store: &dyn TenantStore,
    team: &str,
    attempts: u32,
    mut apply: F,
) -> Result<(Tenant, bool)>
where
    F: FnMut(&mut Tenant) -> bool,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        let mut tenant = require_team(store, team)?;
        if !apply(&mut tenant) {
            return Ok((tenant, false));
        }

        match store.save(&tenant) {
            Ok(saved) => return Ok((saved, true)),
            Err(Error::Conflict(reason)) if attempt < attempts => {
                tracing::debug!(team, attempt, "Retrying tenant write: {reason}");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Persists a subscription. Returns `false` when it already existed.
pub fn subscribe(
    store: &dyn TenantStore,
    team: &str,
    user: &str,
    channel: &str,
    attempts: u32,
) -> Result<bool> {
    modify_tenant(store, team, attempts, |tenant| tenant.subscribe(user, channel))
        .map(|(_, changed)| changed)
}

/// [`TenantStore::upsert`] with the same bounded retry as [`modify_tenant`].
///
/// A concurrent reinstall surfaces as a conflict and a concurrent first
/// install as a duplicate team; both are retried against the row that won.
pub fn install(
    store: &dyn TenantStore,
    team: &str,
    chat: &ChatCredentials,
    attempts: u32,
) -> Result<Tenant> {
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        match store.upsert(team, chat) {
            Err(Error::Conflict(reason) | Error::AlreadyExists(reason)) if attempt < attempts => {
                tracing::debug!(team, attempt, "Retrying install: {reason}");
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Attaches carrier credentials and an SMS number to a team's tenant.
pub fn provision(
    store: &dyn TenantStore,
    team: &str,
    carrier: CarrierCredentials,
    phone_number: &str,
    attempts: u32,
) -> Result<Tenant> {
    if carrier.account_id.is_empty() || carrier.auth_token.is_empty() {
        return Err(Error::BadRequest("carrier credentials must not be empty".to_string()));
    }
    if digits(phone_number).is_empty() {
        return Err(Error::BadRequest(format!("'{phone_number}' is not a phone number")));
    }

    modify_tenant(store, team, attempts, |tenant| {
        let changed = tenant.carrier.as_ref() != Some(&carrier)
            || tenant.phone_number.as_deref() != Some(phone_number);
        tenant.carrier = Some(carrier.clone());
        tenant.phone_number = Some(phone_number.to_string());
        changed
    })
    .map(|(tenant, _)| tenant)
}

/// Removes a subscription. Returns `false` when there was none.
pub fn unsubscribe(
    store: &dyn TenantStore,
    team: &str,
    user: &str,
    channel: &str,
    attempts: u32,
) -> Result<bool> {
    modify_tenant(store, team, attempts, |tenant| tenant.unsubscribe(user, channel))
        .map(|(_, changed)| changed)
}

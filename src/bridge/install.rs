use std::sync::Arc;

use super::BridgeSettings;
use crate::chat::{ChatConnector, TenantChat};
use crate::error::{Error, Result};
use crate::store::{self, TenantStore};
use crate::types::{ChatCredentials, Tenant};

/// Records a team's tokens once its OAuth code exchange has completed.
#[derive(Clone)]
pub struct InstallFlow {
    store: Arc<dyn TenantStore>,
    chat: Arc<dyn ChatConnector>,
    settings: Arc<BridgeSettings>,
}

impl InstallFlow {
    #[must_use]
    pub fn new(
        store: Arc<dyn TenantStore>,
        chat: Arc<dyn ChatConnector>,
        settings: Arc<BridgeSettings>,
    ) -> Self {
        Self {
            store,
            chat,
            settings,
        }
    }

    /// Creates the team's tenant or refreshes its tokens in place.
    ///
    /// Subscriptions, carrier credentials and the phone number survive a
    /// reinstall. When `installer` is given and a welcome message is
    /// configured, the installer is greeted; a failed greeting is only logged.
    pub async fn complete_install(
        &self,
        team: &str,
        credentials: ChatCredentials,
        installer: Option<&str>,
    ) -> Result<Tenant> {
        if team.trim().is_empty() {
            return Err(Error::BadRequest("install is missing a team id".to_string()));
        }
        if credentials.bot_access_token.is_empty() || credentials.bot_user_id.is_empty() {
            return Err(Error::BadRequest(format!(
                "install for team {team} is missing bot credentials"
            )));
        }

        tracing::info!("Installing for team {team}");
        let tenant = store::install(
            self.store.as_ref(),
            team,
            &credentials,
            self.settings.conflict_attempts,
        )?;

        if let (Some(user), Some(welcome)) = (installer, &self.settings.welcome_message) {
            let chat = TenantChat::new(Arc::clone(&self.chat), &tenant.chat);
            if let Err(e) = chat.bot().send_direct_message(user, welcome).await {
                tracing::warn!("Failed to greet {user} on {team}: {e}");
            }
        }

        Ok(tenant)
    }
}

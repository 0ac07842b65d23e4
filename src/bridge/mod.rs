//! Tenant resolution and message routing between chat and SMS.

pub mod commands;
pub mod events;
pub mod install;
pub mod sms;

use std::sync::Arc;

use crate::carrier::CarrierGateway;
use crate::chat::ChatConnector;
use crate::store::TenantStore;
use crate::types::WatermarkPolicy;

pub use commands::CommandRouter;
pub use events::{ChatEventRouter, EventOutcome, FanoutReport, RecipientFailure};
pub use install::InstallFlow;
pub use sms::{ChannelTag, OutboundSms, PostedSms, SmsInboundRouter, extract_channel_tag};

pub const DEFAULT_COMMAND: &str = "/sms";
pub const DEFAULT_CONFLICT_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Total tries for a read-modify-write that keeps hitting conflicts.
    pub conflict_attempts: u32,
    /// The slash command this bridge answers to.
    pub command: String,
    /// Verification token slash command requests must carry, if set.
    pub command_token: Option<String>,
    /// Message subtypes that are relayed; everything else is skipped.
    pub allowed_subtypes: Vec<String>,
    pub watermark: WatermarkPolicy,
    /// Direct message sent to the installing user after an install.
    pub welcome_message: Option<String>,
    /// Bearer token for the outbound SMS endpoint. Unset disables it.
    pub send_token: Option<String>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            conflict_attempts: DEFAULT_CONFLICT_ATTEMPTS,
            command: DEFAULT_COMMAND.to_string(),
            command_token: None,
            allowed_subtypes: Vec::new(),
            watermark: WatermarkPolicy::default(),
            welcome_message: None,
            send_token: None,
        }
    }
}

/// Every router, wired to the same store and clients.
#[derive(Clone)]
pub struct Bridge {
    pub install: InstallFlow,
    pub events: ChatEventRouter,
    pub inbound: SmsInboundRouter,
    pub outbound: OutboundSms,
    pub commands: CommandRouter,
}

impl Bridge {
    #[must_use]
    pub fn new(
        store: Arc<dyn TenantStore>,
        chat: Arc<dyn ChatConnector>,
        carrier: Arc<dyn CarrierGateway>,
        settings: BridgeSettings,
    ) -> Self {
        let settings = Arc::new(settings);
        let outbound = OutboundSms::new(Arc::clone(&store), carrier)
            .with_send_token(settings.send_token.clone());

        Self {
            install: InstallFlow::new(Arc::clone(&store), Arc::clone(&chat), Arc::clone(&settings)),
            events: ChatEventRouter::new(
                Arc::clone(&store),
                Arc::clone(&chat),
                outbound.clone(),
                Arc::clone(&settings),
            ),
            inbound: SmsInboundRouter::new(Arc::clone(&store), Arc::clone(&chat)),
            commands: CommandRouter::new(store, chat, settings),
            outbound,
        }
    }
}

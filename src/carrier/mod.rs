//! SMS carrier capabilities consumed by the bridge.

mod twilio;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::error::Result;
use crate::types::CarrierCredentials;

pub use twilio::{DEFAULT_TWILIO_API_BASE, TwilioGateway};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CarrierGateway: Send + Sync {
    /// Sends one SMS from `from` to `to` using the tenant's carrier account.
    async fn send(
        &self,
        credentials: &CarrierCredentials,
        from: &str,
        to: &str,
        body: &str,
    ) -> Result<()>;
}

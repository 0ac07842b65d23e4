mod event_ts;
mod payloads;
pub mod phone;
mod tenant;

pub use event_ts::EventTimestamp;
pub use payloads::*;
#[cfg(test)]
pub(crate) use tenant::test_tenant;
pub use tenant::{CarrierCredentials, ChatCredentials, Tenant, WatermarkPolicy, WatermarkScope};

mod commands;
mod events;
mod install;
pub mod response;
mod router;
mod sms;

pub use router::{AppState, create_router};

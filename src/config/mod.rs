mod server;

pub use server::{ServerConfig, SlackConfig, TwilioConfig};

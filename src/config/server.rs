use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bridge::{BridgeSettings, DEFAULT_COMMAND, DEFAULT_CONFLICT_ATTEMPTS};
use crate::carrier::DEFAULT_TWILIO_API_BASE;
use crate::chat::DEFAULT_SLACK_API_BASE;
use crate::error::{Error, Result};
use crate::types::WatermarkPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Timeout for every call to the chat platform or the carrier.
    pub request_timeout_secs: u64,
    /// How long a database write waits on a locked database.
    pub busy_timeout_ms: u64,
    pub conflict_attempts: u32,
    pub slack: SlackConfig,
    pub twilio: TwilioConfig,
    pub dedup: WatermarkPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub api_base: String,
    pub command: String,
    pub command_token: Option<String>,
    pub allowed_subtypes: Vec<String>,
    pub welcome_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwilioConfig {
    pub api_base: String,
    /// Bearer token for `POST /sms/send`. The route refuses every request
    /// while this is unset.
    pub send_token: Option<String>,
}

impl ServerConfig {
    /// Reads a TOML config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.conflict_attempts == 0 {
            return Err(Error::Config("conflict_attempts must be at least 1".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config("request_timeout_secs must be at least 1".to_string()));
        }
        if !self.slack.command.starts_with('/') {
            return Err(Error::Config(format!(
                "slack.command must start with '/', got '{}'",
                self.slack.command
            )));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("sms-bridge.db")
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    #[must_use]
    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            conflict_attempts: self.conflict_attempts,
            command: self.slack.command.clone(),
            command_token: self.slack.command_token.clone(),
            allowed_subtypes: self.slack.allowed_subtypes.clone(),
            watermark: self.dedup,
            welcome_message: self.slack.welcome_message.clone(),
            send_token: self.twilio.send_token.clone(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            request_timeout_secs: 10,
            busy_timeout_ms: 5000,
            conflict_attempts: DEFAULT_CONFLICT_ATTEMPTS,
            slack: SlackConfig::default(),
            twilio: TwilioConfig::default(),
            dedup: WatermarkPolicy::default(),
        }
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_SLACK_API_BASE.to_string(),
            command: DEFAULT_COMMAND.to_string(),
            command_token: None,
            allowed_subtypes: Vec::new(),
            welcome_message: None,
        }
    }
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_TWILIO_API_BASE.to_string(),
            send_token: None,
        }
    }
}

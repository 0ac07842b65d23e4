use std::sync::Arc;

use super::BridgeSettings;
use crate::chat::{ChatConnector, TenantChat};
use crate::error::{Error, Result};
use crate::store::{self, TenantStore, require_team};
use crate::types::{CommandReply, SlashCommand, Tenant};

const NO_PHONE: &str =
    "Oops! It doesn't look like you have a phone number set in your Slack profile.";
const NOT_RECEIVING: &str = "You are not receiving SMS from this channel.";
const STOPPED: &str = "You will no longer receive SMS from this channel.";
const NO_SUBSCRIPTIONS: &str = "You are not receiving SMS messages from any channel.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subcommand {
    Help,
    Info,
    Subscribe,
    Unsubscribe,
}

impl Subcommand {
    /// Reads the first word of the command text. Anything unrecognised,
    /// including no text at all, subscribes.
    fn parse(text: &str) -> Self {
        let word = text.split_whitespace().next().unwrap_or_default();
        match word.to_ascii_lowercase().as_str() {
            "help" => Self::Help,
            "info" => Self::Info,
            "stop" | "unsubscribe" => Self::Unsubscribe,
            _ => Self::Subscribe,
        }
    }
}

/// Answers the bridge's slash command.
#[derive(Clone)]
pub struct CommandRouter {
    store: Arc<dyn TenantStore>,
    chat: Arc<dyn ChatConnector>,
    settings: Arc<BridgeSettings>,
}

impl CommandRouter {
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

    pub async fn handle(&self, command: &SlashCommand) -> Result<CommandReply> {
        if let Some(expected) = &self.settings.command_token {
            if command.token.as_deref() != Some(expected.as_str()) {
                tracing::warn!(team = %command.team_id, "Rejected command with a bad token");
                return Err(Error::Unauthorized("invalid command token".to_string()));
            }
        }

        let tenant = require_team(self.store.as_ref(), &command.team_id)?;
        tracing::info!(
            team = %command.team_id,
            user = %command.user_id,
            "Command received: {} [{}]",
            command.command,
            command.text
        );

        if command.command != self.settings.command {
            return Err(Error::BadRequest(format!(
                "Command mismatch. Expected {}",
                self.settings.command
            )));
        }

        let text = match Subcommand::parse(&command.text) {
            Subcommand::Help => self.help(),
            Subcommand::Info => self.info(&tenant, command).await?,
            Subcommand::Subscribe => self.subscribe(&tenant, command).await?,
            Subcommand::Unsubscribe => self.unsubscribe(command)?,
        };
        Ok(CommandReply::new(text))
    }

    fn help(&self) -> String {
        let name = &self.settings.command;
        format!(
            "`{name}` or `{name} subscribe` will send you an SMS for each message in this channel.\n\
             `{name} stop` will stop sending you messages from this channel.\n\
             `{name} info` lists the channels you receive SMS from."
        )
    }

    fn already_subscribed(&self) -> String {
        format!(
            "You are already receiving SMS messages from this channel. To stop receiving messages, use `{} stop`",
            self.settings.command
        )
    }

    async fn subscribe(&self, tenant: &Tenant, command: &SlashCommand) -> Result<String> {
        let chat = TenantChat::new(Arc::clone(&self.chat), &tenant.chat);

        let Some(phone) = chat.bot().phone_of(&command.user_id).await? else {
            tracing::info!(
                team = %tenant.team,
                "{} has no phone number in their profile",
                command.user_id
            );
            return Ok(NO_PHONE.to_string());
        };

        if tenant.is_subscribed(&command.user_id, &command.channel_id) {
            return Ok(self.already_subscribed());
        }

        chat.ensure_bot_in_channel(&command.channel_id).await?;

        let added = store::subscribe(
            self.store.as_ref(),
            &tenant.team,
            &command.user_id,
            &command.channel_id,
            self.settings.conflict_attempts,
        )?;
        if !added {
            return Ok(self.already_subscribed());
        }

        tracing::info!(
            team = %tenant.team,
            channel = %command.channel_id,
            "Subscribed {}",
            command.user_id
        );
        Ok(format!(
            "Okay! I will send an SMS message to {phone} for each message sent to this channel."
        ))
    }

    fn unsubscribe(&self, command: &SlashCommand) -> Result<String> {
        let removed = store::unsubscribe(
            self.store.as_ref(),
            &command.team_id,
            &command.user_id,
            &command.channel_id,
            self.settings.conflict_attempts,
        )?;

        let text = if removed { STOPPED } else { NOT_RECEIVING };
        Ok(text.to_string())
    }

    async fn info(&self, tenant: &Tenant, command: &SlashCommand) -> Result<String> {
        let channels = tenant.subscriptions_of(&command.user_id);
        if channels.is_empty() {
            return Ok(NO_SUBSCRIPTIONS.to_string());
        }

        let chat = TenantChat::new(Arc::clone(&self.chat), &tenant.chat);
        let mut names = Vec::with_capacity(channels.len());
        for channel in &channels {
            names.push(chat.bot().channel_name(channel).await?);
        }
        names.sort_by_key(|name| name.to_lowercase());

        Ok(format!(
            "You are receiving SMS messages from: #{}",
            names.join(", #")
        ))
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::*;
    use crate::bridge::fixtures;
    use crate::chat::{ChatDirectory, MockChatConnector, MockChatDirectory};
    use crate::store::SqliteStore;

    fn command(text: &str) -> SlashCommand {
        SlashCommand {
            token: None,
            team_id: "T1".to_string(),
            user_id: "U1".to_string(),
            channel_id: "C1".to_string(),
            command: "/sms".to_string(),
            text: text.to_string(),
        }
    }

    fn router(store: Arc<SqliteStore>, connector: MockChatConnector) -> CommandRouter {
        CommandRouter::new(store, Arc::new(connector), Arc::new(BridgeSettings::default()))
    }

    fn with_phone() -> MockChatDirectory {
        let mut directory = MockChatDirectory::new();
        directory
            .expect_phone_of()
            .with(eq("U1"))
            .returning(|_| Ok(Some("555-123-4567".to_string())));
        directory
    }

    #[test]
    fn test_parse_subcommand() {
        assert_eq!(Subcommand::parse(""), Subcommand::Subscribe);
        assert_eq!(Subcommand::parse("  "), Subcommand::Subscribe);
        assert_eq!(Subcommand::parse("subscribe"), Subcommand::Subscribe);
        assert_eq!(Subcommand::parse("whatever else"), Subcommand::Subscribe);
        assert_eq!(Subcommand::parse("HELP me"), Subcommand::Help);
        assert_eq!(Subcommand::parse("info"), Subcommand::Info);
        assert_eq!(Subcommand::parse("stop"), Subcommand::Unsubscribe);
        assert_eq!(Subcommand::parse(" unsubscribe now"), Subcommand::Unsubscribe);
    }

    #[tokio::test]
    async fn test_subscribe_then_already_subscribed() {
        let (_temp, store) = fixtures::store_with_team("T1");

        let mut directory = with_phone();
        directory
            .expect_is_member()
            .with(eq("UBOT"), eq("C1"))
            .times(1)
            .returning(|_, _| Ok(true));
        directory.expect_invite().never();

        let router = router(store.clone(), fixtures::connector(directory));

        let reply = router.handle(&command("")).await.unwrap();
        assert_eq!(
            reply.text,
            "Okay! I will send an SMS message to 555-123-4567 for each message sent to this channel."
        );
        assert!(store.find_by_team("T1").unwrap().unwrap().is_subscribed("U1", "C1"));

        let reply = router.handle(&command("subscribe")).await.unwrap();
        assert!(reply.text.starts_with("You are already receiving SMS messages from this channel."));
        assert!(reply.text.ends_with("`/sms stop`"));
    }

    #[tokio::test]
    async fn test_subscribe_invites_bot_with_installer_token() {
        let (_temp, store) = fixtures::store_with_team("T1");

        let mut bot = with_phone();
        bot.expect_is_member().returning(|_, _| Ok(false));
        bot.expect_invite().never();
        let bot: Arc<dyn ChatDirectory> = Arc::new(bot);

        let mut installer = MockChatDirectory::new();
        installer
            .expect_invite()
            .with(eq("UBOT"), eq("C1"))
            .times(1)
            .returning(|_, _| Ok(()));
        let installer: Arc<dyn ChatDirectory> = Arc::new(installer);

        let mut connector = MockChatConnector::new();
        connector
            .expect_connect()
            .with(eq("xoxb-bot"))
            .returning(move |_| Arc::clone(&bot));
        connector
            .expect_connect()
            .with(eq("xoxp-user"))
            .returning(move |_| Arc::clone(&installer));

        let router = router(store.clone(), connector);
        let reply = router.handle(&command("")).await.unwrap();

        assert!(reply.text.starts_with("Okay!"));
        assert!(store.find_by_team("T1").unwrap().unwrap().is_subscribed("U1", "C1"));
    }

    #[tokio::test]
    async fn test_subscribe_without_phone_changes_nothing() {
        let (_temp, store) = fixtures::store_with_team("T1");
        let before = store.find_by_team("T1").unwrap().unwrap();

        let mut directory = MockChatDirectory::new();
        directory.expect_phone_of().returning(|_| Ok(None));
        directory.expect_is_member().never();

        let router = router(store.clone(), fixtures::connector(directory));
        let reply = router.handle(&command("")).await.unwrap();

        assert_eq!(reply.text, NO_PHONE);
        let after = store.find_by_team("T1").unwrap().unwrap();
        assert_eq!(after.revision, before.revision);
        assert!(after.channels.is_empty());
    }

    #[tokio::test]
    async fn test_stop_and_stop_again() {
        let (_temp, store) = fixtures::store_with_team("T1");
        store::subscribe(&*store, "T1", "U1", "C1", 3).unwrap();

        let router = router(store.clone(), MockChatConnector::new());

        let reply = router.handle(&command("stop")).await.unwrap();
        assert_eq!(reply.text, STOPPED);

        let reply = router.handle(&command("unsubscribe")).await.unwrap();
        assert_eq!(reply.text, NOT_RECEIVING);
    }

    #[tokio::test]
    async fn test_info_lists_channels_sorted() {
        let (_temp, store) = fixtures::store_with_team("T1");
        for channel in ["C1", "C2", "C3"] {
            store::subscribe(&*store, "T1", "U1", channel, 3).unwrap();
        }
        store::subscribe(&*store, "T1", "U2", "C4", 3).unwrap();

        let mut directory = MockChatDirectory::new();
        directory.expect_channel_name().returning(|channel| {
            Ok(match channel {
                "C1" => "random",
                "C2" => "General",
                _ => "dev",
            }
            .to_string())
        });

        let router = router(store, fixtures::connector(directory));
        let reply = router.handle(&command("info")).await.unwrap();

        assert_eq!(
            reply.text,
            "You are receiving SMS messages from: #dev, #General, #random"
        );
    }

    #[tokio::test]
    async fn test_info_without_subscriptions() {
        let (_temp, store) = fixtures::store_with_team("T1");
        let router = router(store, MockChatConnector::new());

        let reply = router.handle(&command("info")).await.unwrap();
        assert_eq!(reply.text, NO_SUBSCRIPTIONS);
    }

    #[tokio::test]
    async fn test_help_names_the_command() {
        let (_temp, store) = fixtures::store_with_team("T1");
        let router = router(store, MockChatConnector::new());

        let reply = router.handle(&command("help")).await.unwrap();
        assert_eq!(reply.text.lines().count(), 3);
        assert!(reply.text.contains("`/sms stop`"));
    }

    #[tokio::test]
    async fn test_command_mismatch_and_unknown_team() {
        let (_temp, store) = fixtures::store_with_team("T1");
        let router = router(store, MockChatConnector::new());

        let mut other = command("");
        other.command = "/text".to_string();
        let err = router.handle(&other).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
        assert!(err.to_string().contains("Command mismatch. Expected /sms"));

        let mut unknown = command("");
        unknown.team_id = "T404".to_string();
        let err = router.handle(&unknown).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(err.to_string().contains("Unknown team ID T404."));
    }

    #[tokio::test]
    async fn test_command_token_is_checked() {
        let (_temp, store) = fixtures::store_with_team("T1");
        let settings = BridgeSettings {
            command_token: Some("verify".to_string()),
            ..BridgeSettings::default()
        };
        let router =
            CommandRouter::new(store, Arc::new(MockChatConnector::new()), Arc::new(settings));

        let result = router.handle(&command("help")).await;
        assert!(matches!(result, Err(Error::Unauthorized(_))));

        let mut signed = command("help");
        signed.token = Some("verify".to_string());
        assert!(router.handle(&signed).await.is_ok());
    }
}

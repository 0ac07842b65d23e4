use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{ChatConnector, ChatDirectory, PostMessage, UserProfile};
use crate::error::{Error, Result};
use crate::types::phone::sender_matches;

pub const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";

const PAGE_LIMIT: &str = "200";

/// Builds [`SlackClient`]s that share one HTTP connection pool.
#[derive(Debug, Clone)]
pub struct SlackConnector {
    http: Client,
    api_base: String,
}

impl SlackConnector {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }
}

impl ChatConnector for SlackConnector {
    fn connect(&self, token: &str) -> Arc<dyn ChatDirectory> {
        Arc::new(SlackClient {
            http: self.http.clone(),
            api_base: self.api_base.clone(),
            token: token.to_string(),
        })
    }
}

/// Slack Web API client bound to one token.
#[derive(Clone)]
pub struct SlackClient {
    http: Client,
    api_base: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    is_admin: bool,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    profile: SlackProfile,
}

#[derive(Debug, Default, Deserialize)]
struct SlackProfile {
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    image_192: Option<String>,
}

impl From<SlackUser> for UserProfile {
    fn from(user: SlackUser) -> Self {
        let real_name = user
            .profile
            .real_name
            .filter(|n| !n.is_empty())
            .or(user.real_name)
            .unwrap_or_else(|| user.name.clone());
        Self {
            id: user.id,
            name: user.name,
            real_name,
            phone: user.profile.phone.filter(|p| !p.trim().is_empty()),
            image_192: user.profile.image_192,
            is_admin: user.is_admin,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    user: SlackUser,
}

#[derive(Debug, Deserialize)]
struct UserList {
    members: Vec<SlackUser>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ChannelInfo {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelMembers {
    members: Vec<String>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

fn next_cursor(metadata: Option<ResponseMetadata>) -> Option<String> {
    metadata
        .map(|m| m.next_cursor)
        .filter(|cursor| !cursor.is_empty())
}

impl SlackClient {
    /// Calls a Web API method and decodes the body of an `ok` reply.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/{}", self.api_base, method);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .form(params)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "{method} failed with status {status}: {text}"
            )));
        }

        let body: Value = resp.json().await?;
        if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            let reason = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(Error::Upstream(format!("{method} failed: {reason}")));
        }

        serde_json::from_value(body)
            .map_err(|e| Error::Upstream(format!("{method} returned an unexpected body: {e}")))
    }

    async fn list_users(&self) -> Result<Vec<SlackUser>> {
        let mut users = Vec::new();
        let mut cursor = String::new();

        loop {
            let page: UserList = self
                .call("users.list", &[("limit", PAGE_LIMIT), ("cursor", cursor.as_str())])
                .await?;
            users.extend(page.members);

            match next_cursor(page.response_metadata) {
                Some(next) => cursor = next,
                None => return Ok(users),
            }
        }
    }
}

#[async_trait]
impl ChatDirectory for SlackClient {
    async fn channel_name(&self, channel: &str) -> Result<String> {
        tracing::debug!("Looking up name for {channel}");
        let info: ChannelInfo = self
            .call("conversations.info", &[("channel", channel)])
            .await?;
        Ok(info.channel.name.unwrap_or(info.channel.id))
    }

    async fn user_profile(&self, user: &str) -> Result<UserProfile> {
        tracing::debug!("Looking up profile for user {user}");
        let info: UserInfo = self.call("users.info", &[("user", user)]).await?;
        Ok(info.user.into())
    }

    async fn phone_of(&self, user: &str) -> Result<Option<String>> {
        let profile = self.user_profile(user).await?;
        Ok(profile.phone)
    }

    async fn user_by_phone(&self, phone: &str) -> Result<Option<UserProfile>> {
        let users = self.list_users().await?;
        Ok(users
            .into_iter()
            .filter(|u| !u.deleted)
            .find(|u| {
                u.profile
                    .phone
                    .as_deref()
                    .is_some_and(|stored| sender_matches(phone, stored))
            })
            .map(UserProfile::from))
    }

    async fn post_message(&self, message: &PostMessage) -> Result<()> {
        let mut params = vec![
            ("channel", message.channel.as_str()),
            ("text", message.text.as_str()),
        ];
        if let Some(username) = &message.username {
            params.push(("as_user", "false"));
            params.push(("username", username.as_str()));
        }
        if let Some(icon_url) = &message.icon_url {
            params.push(("icon_url", icon_url.as_str()));
        }

        let _: Value = self.call("chat.postMessage", &params).await?;
        Ok(())
    }

    async fn is_member(&self, user: &str, channel: &str) -> Result<bool> {
        let mut cursor = String::new();

        loop {
            let page: ChannelMembers = self
                .call(
                    "conversations.members",
                    &[("channel", channel), ("limit", PAGE_LIMIT), ("cursor", cursor.as_str())],
                )
                .await?;
            if page.members.iter().any(|m| m == user) {
                return Ok(true);
            }

            match next_cursor(page.response_metadata) {
                Some(next) => cursor = next,
                None => return Ok(false),
            }
        }
    }

    async fn invite(&self, user: &str, channel: &str) -> Result<()> {
        let _: Value = self
            .call("conversations.invite", &[("channel", channel), ("users", user)])
            .await?;
        Ok(())
    }

    async fn send_direct_message(&self, user: &str, text: &str) -> Result<()> {
        let opened: ChannelInfo = self.call("conversations.open", &[("users", user)]).await?;
        self.post_message(&PostMessage {
            channel: opened.channel.id,
            text: text.to_string(),
            username: None,
            icon_url: None,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;

    /// Serves `router` on an ephemeral port and returns its base URL.
    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn client(router: Router, timeout: Duration) -> Arc<dyn ChatDirectory> {
        let base = serve(router).await;
        SlackConnector::new(&base, timeout).unwrap().connect("xoxb-test")
    }

    fn upstream_message(result: Result<impl std::fmt::Debug>) -> String {
        match result {
            Err(Error::Upstream(message)) => message,
            other => panic!("expected an upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ok_reply_is_decoded_with_bearer_token() {
        let router = Router::new().route(
            "/users.info",
            post(
                |headers: HeaderMap, Form(params): Form<HashMap<String, String>>| async move {
                    let auth = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
                    if auth != Some("Bearer xoxb-test") {
                        return Json(json!({ "ok": false, "error": "not_authed" }));
                    }
                    let id = params.get("user").cloned().unwrap_or_default();
                    Json(json!({
                        "ok": true,
                        "user": {
                            "id": id,
                            "name": "alice",
                            "profile": { "real_name": "Alice", "phone": "555-123-4567" }
                        }
                    }))
                },
            ),
        );
        let slack = client(router, Duration::from_secs(5)).await;

        let profile = slack.user_profile("U1").await.unwrap();
        assert_eq!(profile.id, "U1");
        assert_eq!(profile.real_name, "Alice");
    }

    #[tokio::test]
    async fn test_not_ok_reply_is_upstream_error() {
        let router = Router::new().route(
            "/users.info",
            post(|| async { Json(json!({ "ok": false, "error": "user_not_found" })) }),
        );
        let slack = client(router, Duration::from_secs(5)).await;

        let message = upstream_message(slack.user_profile("U404").await);
        assert_eq!(message, "users.info failed: user_not_found");
    }

    #[tokio::test]
    async fn test_error_status_is_upstream_error() {
        let router = Router::new().route(
            "/conversations.info",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "maintenance") }),
        );
        let slack = client(router, Duration::from_secs(5)).await;

        let message = upstream_message(slack.channel_name("C1").await);
        assert!(message.contains("conversations.info"), "{message}");
        assert!(message.contains("500"), "{message}");
        assert!(message.contains("maintenance"), "{message}");
    }

    #[tokio::test]
    async fn test_slow_reply_times_out() {
        let router = Router::new().route(
            "/conversations.info",
            post(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Json(json!({ "ok": true, "channel": { "id": "C1", "name": "general" } }))
            }),
        );
        let slack = client(router, Duration::from_millis(100)).await;

        let message = upstream_message(slack.channel_name("C1").await);
        assert!(message.starts_with("request timed out"), "{message}");
    }

    #[test]
    fn test_profile_prefers_profile_real_name() {
        let user: SlackUser = serde_json::from_value(serde_json::json!({
            "id": "U1",
            "name": "alice",
            "real_name": "Alice A.",
            "is_admin": true,
            "profile": {
                "real_name": "Alice",
                "phone": "555-123-4567",
                "image_192": "https://example.com/a.png"
            }
        }))
        .unwrap();

        let profile = UserProfile::from(user);
        assert_eq!(profile.real_name, "Alice");
        assert_eq!(profile.phone(), Some("555-123-4567"));
        assert_eq!(profile.image_192.as_deref(), Some("https://example.com/a.png"));
        assert!(profile.is_admin);
    }

    #[test]
    fn test_profile_falls_back_to_handle_and_drops_blank_phone() {
        let user: SlackUser = serde_json::from_value(serde_json::json!({
            "id": "U2",
            "name": "bob",
            "profile": { "phone": "  " }
        }))
        .unwrap();

        let profile = UserProfile::from(user);
        assert_eq!(profile.real_name, "bob");
        assert_eq!(profile.phone, None);
    }

    #[test]
    fn test_next_cursor() {
        assert_eq!(next_cursor(None), None);
        assert_eq!(
            next_cursor(Some(ResponseMetadata {
                next_cursor: String::new()
            })),
            None
        );
        assert_eq!(
            next_cursor(Some(ResponseMetadata {
                next_cursor: "abc".to_string()
            })),
            Some("abc".to_string())
        );
    }
}

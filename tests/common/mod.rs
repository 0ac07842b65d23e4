#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use sms_bridge::bridge::BridgeSettings;
use sms_bridge::carrier::CarrierGateway;
use sms_bridge::chat::{ChatConnector, ChatDirectory, PostMessage, UserProfile};
use sms_bridge::error::{Error, Result};
use sms_bridge::server::{AppState, create_router};
use sms_bridge::store::{self, SqliteStore, TenantStore};
use sms_bridge::types::phone::sender_matches;
use sms_bridge::types::{CarrierCredentials, ChatCredentials, Tenant};

pub const TEAM: &str = "T1";
pub const ACCOUNT: &str = "AC0001";
pub const TENANT_PHONE: &str = "+15550001111";
pub const SEND_TOKEN: &str = "outbound-secret";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentSms {
    pub account: String,
    pub from: String,
    pub to: String,
    pub body: String,
}

#[derive(Default)]
pub struct FakeCarrier {
    pub sent: Mutex<Vec<SentSms>>,
}

impl FakeCarrier {
    pub fn sent(&self) -> Vec<SentSms> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl CarrierGateway for FakeCarrier {
    async fn send(
        &self,
        credentials: &CarrierCredentials,
        from: &str,
        to: &str,
        body: &str,
    ) -> Result<()> {
        self.sent.lock().unwrap().push(SentSms {
            account: credentials.account_id.clone(),
            from: from.to_string(),
            to: to.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// An in-memory workspace shared by every token.
#[derive(Default)]
pub struct FakeWorkspace {
    pub users: Mutex<Vec<UserProfile>>,
    pub channels: Mutex<HashMap<String, String>>,
    pub members: Mutex<HashSet<(String, String)>>,
    pub posted: Mutex<Vec<PostMessage>>,
    /// `(token, user, channel)` for each invite.
    pub invites: Mutex<Vec<(String, String, String)>>,
    pub direct_messages: Mutex<Vec<(String, String)>>,
}

impl FakeWorkspace {
    pub fn add_user(&self, id: &str, real_name: &str, phone: Option<&str>) {
        self.users.lock().unwrap().push(UserProfile {
            id: id.to_string(),
            name: real_name.to_lowercase(),
            real_name: real_name.to_string(),
            phone: phone.map(str::to_string),
            image_192: Some(format!("https://avatars.example.com/{id}.png")),
            is_admin: false,
        });
    }

    pub fn add_channel(&self, id: &str, name: &str) {
        self.channels
            .lock()
            .unwrap()
            .insert(id.to_string(), name.to_string());
    }

    pub fn posted(&self) -> Vec<PostMessage> {
        self.posted.lock().unwrap().clone()
    }

    fn user(&self, id: &str) -> Option<UserProfile> {
        self.users.lock().unwrap().iter().find(|u| u.id == id).cloned()
    }
}

pub struct FakeChat {
    pub workspace: Arc<FakeWorkspace>,
}

impl ChatConnector for FakeChat {
    fn connect(&self, token: &str) -> Arc<dyn ChatDirectory> {
        Arc::new(FakeDirectory {
            workspace: Arc::clone(&self.workspace),
            token: token.to_string(),
        })
    }
}

struct FakeDirectory {
    workspace: Arc<FakeWorkspace>,
    token: String,
}

#[async_trait]
impl ChatDirectory for FakeDirectory {
    async fn channel_name(&self, channel: &str) -> Result<String> {
        self.workspace
            .channels
            .lock()
            .unwrap()
            .get(channel)
            .cloned()
            .ok_or_else(|| Error::Upstream("channel_not_found".to_string()))
    }

    async fn user_profile(&self, user: &str) -> Result<UserProfile> {
        self.workspace
            .user(user)
            .ok_or_else(|| Error::Upstream("user_not_found".to_string()))
    }

    async fn phone_of(&self, user: &str) -> Result<Option<String>> {
        Ok(self.user_profile(user).await?.phone)
    }

    async fn user_by_phone(&self, phone: &str) -> Result<Option<UserProfile>> {
        Ok(self
            .workspace
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.phone.as_deref().is_some_and(|p| sender_matches(phone, p)))
            .cloned())
    }

    async fn post_message(&self, message: &PostMessage) -> Result<()> {
        self.workspace.posted.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn is_member(&self, user: &str, channel: &str) -> Result<bool> {
        Ok(self
            .workspace
            .members
            .lock()
            .unwrap()
            .contains(&(user.to_string(), channel.to_string())))
    }

    async fn invite(&self, user: &str, channel: &str) -> Result<()> {
        self.workspace.invites.lock().unwrap().push((
            self.token.clone(),
            user.to_string(),
            channel.to_string(),
        ));
        self.workspace
            .members
            .lock()
            .unwrap()
            .insert((user.to_string(), channel.to_string()));
        Ok(())
    }

    async fn send_direct_message(&self, user: &str, text: &str) -> Result<()> {
        self.workspace
            .direct_messages
            .lock()
            .unwrap()
            .push((user.to_string(), text.to_string()));
        Ok(())
    }
}

pub struct TestApp {
    pub temp_dir: TempDir,
    pub store: Arc<SqliteStore>,
    pub workspace: Arc<FakeWorkspace>,
    pub carrier: Arc<FakeCarrier>,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(BridgeSettings {
            send_token: Some(SEND_TOKEN.to_string()),
            ..BridgeSettings::default()
        })
    }

    /// A workspace with Alice (U1) and Bob (U2) and channels C1/C2.
    pub fn with_settings(settings: BridgeSettings) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let store = Arc::new(
            SqliteStore::new(temp_dir.path().join("sms-bridge.db")).expect("open database"),
        );
        store.initialize().expect("initialize database");

        let workspace = Arc::new(FakeWorkspace::default());
        workspace.add_user("U1", "Alice", Some("555-123-4567"));
        workspace.add_user("U2", "Bob", Some("+1 (555) 765-4321"));
        workspace.add_user("U3", "Carol", None);
        workspace.add_channel("C1", "general");
        workspace.add_channel("C2", "random");

        let carrier = Arc::new(FakeCarrier::default());
        let state = Arc::new(AppState::new(
            store.clone(),
            Arc::new(FakeChat {
                workspace: Arc::clone(&workspace),
            }),
            carrier.clone(),
            settings,
        ));

        Self {
            temp_dir,
            store,
            workspace,
            carrier,
            router: create_router(state),
        }
    }

    /// Installs and provisions the default team.
    pub fn provisioned() -> Self {
        let app = Self::new();
        app.install_directly(TEAM);
        app.provision(TEAM, ACCOUNT, TENANT_PHONE);
        app
    }

    pub fn install_directly(&self, team: &str) -> Tenant {
        self.store
            .upsert(
                team,
                &ChatCredentials {
                    user_access_token: "xoxp-installer".to_string(),
                    bot_access_token: "xoxb-bot".to_string(),
                    bot_user_id: "UBOT".to_string(),
                },
            )
            .expect("install team")
    }

    pub fn provision(&self, team: &str, account: &str, phone: &str) -> Tenant {
        let carrier = CarrierCredentials {
            account_id: account.to_string(),
            auth_token: "secret".to_string(),
        };
        store::provision(&*self.store, team, carrier, phone, 3).expect("provision team")
    }

    pub fn tenant(&self, team: &str) -> Tenant {
        self.store
            .find_by_team(team)
            .expect("read tenant")
            .expect("tenant exists")
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("build request");
        self.send(request).await
    }

    pub async fn post_json(&self, uri: &str, body: &Value) -> (StatusCode, String) {
        self.post(uri, "application/json", body.to_string(), None).await
    }

    pub async fn post_form(&self, uri: &str, fields: &[(&str, &str)]) -> (StatusCode, String) {
        self.post(uri, FORM, encode_form(fields), None).await
    }

    /// Posts a form carrying `Authorization: Bearer <token>`.
    pub async fn post_form_with_token(
        &self,
        uri: &str,
        fields: &[(&str, &str)],
        token: &str,
    ) -> (StatusCode, String) {
        self.post(uri, FORM, encode_form(fields), Some(token)).await
    }

    pub async fn post_json_with_token(
        &self,
        uri: &str,
        body: &Value,
        token: &str,
    ) -> (StatusCode, String) {
        self.post(uri, "application/json", body.to_string(), Some(token)).await
    }

    async fn post(
        &self,
        uri: &str,
        content_type: &str,
        body: String,
        token: Option<&str>,
    ) -> (StatusCode, String) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, content_type);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body)).expect("build request");
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        (status, String::from_utf8_lossy(&bytes).to_string())
    }
}

const FORM: &str = "application/x-www-form-urlencoded";

fn encode_form(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

pub fn message_event(team: &str, channel: &str, user: &str, ts: &str, text: &str) -> Value {
    serde_json::json!({
        "type": "event_callback",
        "team_id": team,
        "event": {
            "type": "message",
            "channel": channel,
            "user": user,
            "text": text,
            "ts": ts,
        }
    })
}

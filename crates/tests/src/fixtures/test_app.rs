//! Spawns the real axum app on an ephemeral port, backed by the in-memory
//! store, and hands out authenticated HTTP/WS clients.

use bson::oid::ObjectId;
use hirewire_api::{build_router, state::AppState, tasks};
use hirewire_config::Settings;
use hirewire_db::models::User;
use hirewire_services::notify::NotificationSink;
use hirewire_services::store::CallStore;
use std::net::SocketAddr;
use std::sync::Arc;

use super::memory_store::MemoryCallStore;

pub struct TestApp {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    pub store: Arc<MemoryCallStore>,
    pub state: AppState,
}

pub struct TestUser {
    pub id: ObjectId,
    pub id_hex: String,
    pub access_token: String,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_settings(|_| {}).await
    }

    pub async fn spawn_with_settings(customize: impl FnOnce(&mut Settings)) -> Self {
        let mut settings = Settings::default();
        settings.auth.jwt_secret = "test-secret".to_string();
        customize(&mut settings);

        let store = Arc::new(MemoryCallStore::new());
        let state = AppState::new(
            Arc::new(settings),
            store.clone() as Arc<dyn CallStore>,
            store.clone() as Arc<dyn NotificationSink>,
        );

        tasks::spawn_pending_sweeper(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");

        let router = build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("server run");
        });

        Self {
            addr,
            client: reqwest::Client::new(),
            store,
            state,
        }
    }

    /// Seeds a user and mints an access token for them.
    pub fn seed_user(&self, username: &str) -> TestUser {
        self.seed(username, false)
    }

    pub fn seed_admin(&self, username: &str) -> TestUser {
        self.seed(username, true)
    }

    fn seed(&self, username: &str, is_admin: bool) -> TestUser {
        let user: User = self.store.seed_user(username, is_admin);
        let id = user.id.expect("seeded user id");
        let access_token = self
            .state
            .auth
            .issue_access_token(id)
            .expect("issue access token");
        TestUser {
            id,
            id_hex: id.to_hex(),
            access_token,
        }
    }

    /// A token whose subject does not exist in the store.
    pub fn token_for_unknown_user(&self) -> String {
        self.state
            .auth
            .issue_access_token(ObjectId::new())
            .expect("issue access token")
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/ws?token={}", self.addr, token)
    }

    pub fn auth_get(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(token)
    }

    pub fn auth_post(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(token)
    }

    pub fn auth_put(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client.put(self.url(path)).bearer_auth(token)
    }

    pub fn auth_delete(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client.delete(self.url(path)).bearer_auth(token)
    }
}

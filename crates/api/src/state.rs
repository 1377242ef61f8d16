use hirewire_config::Settings;
use hirewire_services::auth::AuthService;
use hirewire_services::call::{CallLocks, CallManager};
use hirewire_services::notify::{NotificationSink, Notifier};
use hirewire_services::store::CallStore;
use std::sync::Arc;

use crate::ws::registry::RoomRegistry;

/// Shared application state. Components are constructed once here and wired
/// together explicitly; nothing reaches for an ambient singleton.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub auth: Arc<AuthService>,
    pub store: Arc<dyn CallStore>,
    pub calls: Arc<CallManager>,
    pub registry: Arc<RoomRegistry>,
}

impl AppState {
    pub fn new(
        settings: Arc<Settings>,
        store: Arc<dyn CallStore>,
        notification_sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let auth = Arc::new(AuthService::new(&settings.auth));
        let locks = Arc::new(CallLocks::new());
        let notifier = Notifier::new(notification_sink);
        let calls = Arc::new(CallManager::new(
            store.clone(),
            notifier,
            locks,
            settings.call.clone(),
            settings.ice.clone(),
        ));
        let registry = Arc::new(RoomRegistry::new(store.clone(), calls.clone()));

        Self {
            settings,
            auth,
            store,
            calls,
            registry,
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use outpass_core::audit::AuditLog;
use outpass_core::config::AppConfig;
use outpass_core::identity::{Identity, SignedTokenIdentity};
use outpass_core::lifecycle::{LifecycleEngine, LifecycleSettings};
use outpass_core::notifier::Notifier;
use outpass_core::realtime::EventBus;
use outpass_core::scheduler::JobScheduler;
use outpass_core::store::OutpassStore;
use outpass_core::token::TokenService;

/// Everything a handler or realtime connection needs, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub engine: LifecycleEngine,
    pub tokens: TokenService,
    pub identity: Arc<dyn Identity>,
    pub notifier: Notifier,
    pub audit: Arc<dyn AuditLog>,
    pub join_timeout: Duration,
}

impl AppState {
    pub fn new(config: &AppConfig, store: Arc<dyn OutpassStore>, audit: Arc<dyn AuditLog>) -> Self {
        let tokens = TokenService::new(store.clone(), config.credential.ttl_secs);
        let engine = LifecycleEngine::new(
            store,
            tokens.clone(),
            audit.clone(),
            LifecycleSettings::from(&config.lifecycle),
        );
        let identity = SignedTokenIdentity::new(
            config.identity.signing_secret.clone(),
            config.identity.token_ttl_secs,
        );

        Self {
            engine,
            tokens,
            identity: Arc::new(identity),
            notifier: Notifier::new(EventBus::new(config.realtime.channel_capacity)),
            audit,
            join_timeout: Duration::from_secs(config.realtime.join_timeout_secs),
        }
    }

    pub fn scheduler(&self, store: Arc<dyn OutpassStore>) -> JobScheduler {
        JobScheduler::new(store, self.tokens.clone(), self.notifier.clone())
    }
}

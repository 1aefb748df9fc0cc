use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::chat::{ChatService, OutboundClient};
use crate::config::Config;
use crate::llm::LlmGateway;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
    gateway: Arc<LlmGateway>,
    chat: Arc<ChatService>,
    outbound: Arc<OutboundClient>,
    config: Arc<Config>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: Instant,
}

impl AppState {
    pub fn new(store: Arc<Store>, config: &Config, shutdown_tx: broadcast::Sender<()>) -> Self {
        let gateway = Arc::new(LlmGateway::new(&config.llm, store.clone()));
        let chat = Arc::new(ChatService::new(store.clone(), gateway.clone(), config));
        let outbound = Arc::new(OutboundClient::new(&config.notify, &config.chat_out));

        Self {
            store,
            gateway,
            chat,
            outbound,
            config: Arc::new(config.clone()),
            shutdown_tx,
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn gateway(&self) -> &Arc<LlmGateway> {
        &self.gateway
    }

    pub fn chat(&self) -> &ChatService {
        &self.chat
    }

    pub fn outbound(&self) -> &Arc<OutboundClient> {
        &self.outbound
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shutdown_rx(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn shutdown_tx(&self) -> &broadcast::Sender<()> {
        &self.shutdown_tx
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

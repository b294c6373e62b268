//! Application wiring.
//!
//! Builds the shared components from a [`Config`] and starts the SMTP and
//! HTTP listeners over them.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use crate::chaos::Chaos;
use crate::config::Config;
use crate::error::Result;
use crate::release::{OutgoingRegistry, Releaser};
use crate::smtp::{SmtpHandler, SmtpServer};
use crate::storage::MessageStore;
use crate::web::{AppState, WebServer};

/// The capture server: message store plus everything that shares it.
pub struct Application {
    config: Arc<Config>,
    store: MessageStore,
    chaos: Arc<Chaos>,
    outgoing: Arc<OutgoingRegistry>,
}

/// Addresses of the started listeners.
#[derive(Debug, Clone, Copy)]
pub struct RunningAddrs {
    /// SMTP listener.
    pub smtp: SocketAddr,
    /// HTTP listener.
    pub web: SocketAddr,
}

impl Application {
    /// Open the store and restore chaos settings.
    ///
    /// Fails when the storage location cannot be opened.
    pub fn new(config: Config) -> Result<Self> {
        let store = MessageStore::open(&config.storage)?;
        let chaos = Arc::new(Chaos::load(&config.chaos, config.chaos_state_file())?);
        let outgoing = Arc::new(OutgoingRegistry::from_config(&config));

        Ok(Self {
            config: Arc::new(config),
            store,
            chaos,
            outgoing,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Get the message store.
    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Get the fault injector.
    pub fn chaos(&self) -> &Arc<Chaos> {
        &self.chaos
    }

    /// State for the HTTP handlers.
    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.store.clone(),
            Releaser::from_config(&self.config),
            self.outgoing.clone(),
            self.chaos.clone(),
        )
    }

    /// Bind both listeners and serve them in the background.
    ///
    /// Fails when either port cannot be bound.
    pub async fn start(&self) -> Result<RunningAddrs> {
        let smtp = SmtpServer::bind(&self.config.smtp).await?;
        let smtp_addr = smtp.local_addr()?;

        let web_addr = WebServer::new(&self.config, self.app_state())
            .run_with_addr()
            .await?;

        let handler = SmtpHandler::new(&self.config.smtp, self.store.clone(), self.chaos.clone());
        tokio::spawn(smtp.run(move |stream, peer| {
            let handler = handler.clone();
            async move { handler.handle(stream, peer).await }
        }));

        info!(smtp = %smtp_addr, web = %web_addr, "MailHog started");
        Ok(RunningAddrs {
            smtp: smtp_addr,
            web: web_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageKind;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.smtp.host = "127.0.0.1".to_string();
        config.smtp.port = 0;
        config.web.host = "127.0.0.1".to_string();
        config.web.port = 0;
        config.storage.path = dir.path().join("data").to_string_lossy().into_owned();
        config
    }

    #[tokio::test]
    async fn test_start_binds_both_listeners() {
        let dir = TempDir::new().unwrap();
        let app = Application::new(test_config(&dir)).unwrap();
        let addrs = app.start().await.unwrap();

        assert_ne!(addrs.smtp.port(), 0);
        assert_ne!(addrs.web.port(), 0);
        assert!(app.store().is_empty());
    }

    #[test]
    fn test_unopenable_storage_is_fatal() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let mut config = test_config(&dir);
        config.storage.kind = StorageKind::Maildir;
        config.storage.path = blocker.join("data").to_string_lossy().into_owned();
        assert!(Application::new(config).is_err());
    }
}

//! Fault injection for the SMTP listener.
//!
//! When enabled, sessions randomly reject connections, senders or
//! recipients, or drop the connection after a command. Settings can be
//! changed at runtime through the API and are saved to a JSON file so they
//! survive restarts.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ChaosConfig;
use crate::{MailhogError, Result};

/// Runtime fault injection settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChaosSettings {
    /// Whether faults are injected at all.
    pub enabled: bool,
    /// Probability of rejecting a new connection.
    pub reject_connection_chance: f64,
    /// Probability of rejecting a MAIL FROM.
    pub reject_sender_chance: f64,
    /// Probability of rejecting a RCPT TO.
    pub reject_recipient_chance: f64,
    /// Probability of dropping the connection after a command.
    pub disconnect_chance: f64,
}

impl ChaosSettings {
    /// Settings from the static configuration.
    pub fn from_config(config: &ChaosConfig) -> Self {
        Self {
            enabled: config.enabled,
            reject_connection_chance: config.reject_connection_chance,
            reject_sender_chance: config.reject_sender_chance,
            reject_recipient_chance: config.reject_recipient_chance,
            disconnect_chance: config.disconnect_chance,
        }
    }

    /// Check every probability is within 0.0..=1.0.
    pub fn validate(&self) -> Result<()> {
        for (name, chance) in [
            ("reject_connection_chance", self.reject_connection_chance),
            ("reject_sender_chance", self.reject_sender_chance),
            ("reject_recipient_chance", self.reject_recipient_chance),
            ("disconnect_chance", self.disconnect_chance),
        ] {
            if !(0.0..=1.0).contains(&chance) {
                return Err(MailhogError::Validation(format!(
                    "{name} must be between 0.0 and 1.0"
                )));
            }
        }
        Ok(())
    }
}

/// Shared fault injector.
#[derive(Debug)]
pub struct Chaos {
    settings: RwLock<ChaosSettings>,
    state_file: Option<PathBuf>,
}

impl Chaos {
    /// Create an injector. `state_file`, when set, receives every update.
    pub fn new(settings: ChaosSettings, state_file: Option<PathBuf>) -> Self {
        Self {
            settings: RwLock::new(settings),
            state_file,
        }
    }

    /// Injector that never fires and saves nothing.
    pub fn disabled() -> Self {
        Self::new(
            ChaosSettings::from_config(&ChaosConfig::default()),
            None,
        )
    }

    /// Restore settings from `state_file` if it exists, else use `config`.
    pub fn load(config: &ChaosConfig, state_file: impl Into<PathBuf>) -> Result<Self> {
        let state_file = state_file.into();
        let mut settings = ChaosSettings::from_config(config);

        match fs::read(&state_file) {
            Ok(content) => match serde_json::from_slice::<ChaosSettings>(&content) {
                Ok(saved) if saved.validate().is_ok() => {
                    info!("Restored chaos settings from {}", state_file.display());
                    settings = saved;
                    // An explicit enable on the command line wins.
                    settings.enabled |= config.enabled;
                }
                Ok(_) | Err(_) => {
                    warn!("Ignoring invalid chaos state file {}", state_file.display());
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(Self::new(settings, Some(state_file)))
    }

    /// Current settings.
    pub fn settings(&self) -> ChaosSettings {
        *self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the settings and save them.
    pub fn update(&self, settings: ChaosSettings) -> Result<ChaosSettings> {
        settings.validate()?;
        let mut current = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        self.commit(&mut current, settings)
    }

    /// Turn fault injection off, keeping the probabilities.
    pub fn disable(&self) -> Result<ChaosSettings> {
        let mut current = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        let settings = ChaosSettings {
            enabled: false,
            ..*current
        };
        self.commit(&mut current, settings)
    }

    /// Save `settings` and install them. The caller holds the write lock,
    /// so the state file and memory change together.
    fn commit(
        &self,
        current: &mut ChaosSettings,
        settings: ChaosSettings,
    ) -> Result<ChaosSettings> {
        if let Some(path) = &self.state_file {
            save(path, &settings)?;
        }
        *current = settings;
        info!(enabled = settings.enabled, "Chaos settings updated");
        Ok(settings)
    }

    /// Roll for rejecting a new connection.
    pub fn reject_connection(&self) -> bool {
        self.roll(|s| s.reject_connection_chance)
    }

    /// Roll for rejecting a sender.
    pub fn reject_sender(&self) -> bool {
        self.roll(|s| s.reject_sender_chance)
    }

    /// Roll for rejecting a recipient.
    pub fn reject_recipient(&self) -> bool {
        self.roll(|s| s.reject_recipient_chance)
    }

    /// Roll for dropping the connection.
    pub fn disconnect(&self) -> bool {
        self.roll(|s| s.disconnect_chance)
    }

    fn roll(&self, chance: impl Fn(&ChaosSettings) -> f64) -> bool {
        let settings = self.settings();
        if !settings.enabled {
            return false;
        }
        let p = chance(&settings).clamp(0.0, 1.0);
        p > 0.0 && rand::rng().random_bool(p)
    }
}

fn save(path: &Path, settings: &ChaosSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(settings)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

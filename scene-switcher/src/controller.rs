use crate::types::{Result, SwitcherError};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use interfaces::defs::{ControllerError, SceneController};
use obs_control::{ObsClient, ObsConfig, ObsError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Serializes all calls to the scene controller and enforces the
/// post-switch cooldown.
pub struct SwitchControllerAdapter {
    controller: Box<dyn SceneController>,
    cooldown: Duration,
    switches: u64,
}

impl SwitchControllerAdapter {
    pub fn new(controller: Box<dyn SceneController>, cooldown: Duration) -> Self {
        Self {
            controller,
            cooldown,
            switches: 0,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Successful switches so far.
    pub fn switch_count(&self) -> u64 {
        self.switches
    }

    pub async fn current(&mut self) -> std::result::Result<String, ControllerError> {
        self.controller.current_scene().await
    }

    /// Sets the active scene, then holds for the cooldown before returning.
    /// No cooldown is applied when the call fails.
    pub async fn switch_to(&mut self, scene: &str) -> std::result::Result<(), ControllerError> {
        self.controller.set_current_scene(scene).await?;
        self.switches += 1;

        if !self.cooldown.is_zero() {
            debug!("Cooling down for {:?} after switching to {}", self.cooldown, scene);
            tokio::time::sleep(self.cooldown).await;
        }
        Ok(())
    }

    pub async fn disconnect(&mut self) -> std::result::Result<(), ControllerError> {
        self.controller.disconnect().await
    }
}

/// Connects to OBS, retrying with exponential backoff.
///
/// Authentication failures are not retried. Exhausting all attempts yields
/// [`SwitcherError::ControllerUnavailable`].
pub async fn connect_obs(config: ObsConfig, attempts: u32) -> Result<ObsClient> {
    let attempts = attempts.max(1);
    let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
        current_interval: Duration::from_millis(500),
        initial_interval: Duration::from_millis(500),
        max_interval: Duration::from_secs(8),
        multiplier: 2.0,
        max_elapsed_time: None,
        ..Default::default()
    };

    let mut last_error = None;
    for attempt in 1..=attempts {
        match ObsClient::connect(config.clone()).await {
            Ok(client) => {
                info!("Connected to OBS at {}:{}", config.host, config.port);
                return Ok(client);
            }
            Err(e @ ObsError::Authentication(_)) => {
                return Err(SwitcherError::ControllerUnavailable(e.to_string()));
            }
            Err(e) => {
                if attempt < attempts {
                    if let Some(delay) = backoff.next_backoff() {
                        warn!(
                            "OBS connection attempt {} of {} failed: {}; retrying in {:?}",
                            attempt, attempts, e, delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                last_error = Some(e);
            }
        }
    }

    let reason = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "Unknown error".to_string());
    Err(SwitcherError::ControllerUnavailable(format!(
        "gave up after {} attempts: {}",
        attempts, reason
    )))
}

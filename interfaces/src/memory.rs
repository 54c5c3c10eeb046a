use crate::defs::{ControllerError, SceneController};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryState {
    current: String,
    connected: bool,
    set_calls: Vec<String>,
    switches: Vec<String>,
    query_calls: usize,
    queued_query_failures: VecDeque<ControllerError>,
    queued_switch_failures: VecDeque<ControllerError>,
}

/// In-process stand-in for a presentation tool. Clones share state, so a
/// caller can keep a handle for inspection after giving one away.
#[derive(Debug, Clone)]
pub struct MemorySceneController {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySceneController {
    pub fn new(initial_scene: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                current: initial_scene.into(),
                connected: true,
                ..Default::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn scene(&self) -> String {
        self.lock().current.clone()
    }

    /// Every `set_current_scene` call received, including no-op ones.
    pub fn set_calls(&self) -> Vec<String> {
        self.lock().set_calls.clone()
    }

    /// Scenes actually switched to, in order.
    pub fn switches(&self) -> Vec<String> {
        self.lock().switches.clone()
    }

    pub fn query_calls(&self) -> usize {
        self.lock().query_calls
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Make the next `current_scene` call fail with `error`.
    pub fn fail_next_query(&self, error: ControllerError) {
        self.lock().queued_query_failures.push_back(error);
    }

    /// Make the next `set_current_scene` call fail with `error`.
    pub fn fail_next_switch(&self, error: ControllerError) {
        self.lock().queued_switch_failures.push_back(error);
    }
}

#[async_trait]
impl SceneController for MemorySceneController {
    async fn current_scene(&mut self) -> Result<String, ControllerError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(ControllerError::Unavailable);
        }
        state.query_calls += 1;
        if let Some(error) = state.queued_query_failures.pop_front() {
            return Err(error);
        }
        Ok(state.current.clone())
    }

    async fn set_current_scene(&mut self, scene: &str) -> Result<(), ControllerError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(ControllerError::Unavailable);
        }
        state.set_calls.push(scene.to_string());
        if let Some(error) = state.queued_switch_failures.pop_front() {
            return Err(error);
        }
        if state.current != scene {
            state.current = scene.to_string();
            state.switches.push(scene.to_string());
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ControllerError> {
        self.lock().connected = false;
        Ok(())
    }
}

//! Backend-independent HID behaviour.
//!
//! [`HidService`] sits between the API and a [`HidBackend`] and adds what
//! every backend needs:
//!
//! - dropping keys listed in `ignore_keys`,
//! - optional slow typing (a short pause between key events),
//! - remapping absolute mouse positions into the configured axis ranges,
//! - squashing bursts of relative or wheel deltas,
//! - tracking the last user activity for the mouse jiggler,
//! - the jiggler itself: after `interval` idle seconds it wiggles the
//!   pointer so the target host does not go to sleep.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use kvmd_core::{squash_deltas, MouseRange};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use crate::domain::config::{AxisRange, HidConfig};
use crate::domain::hid::{HidBackend, HidError, HidState, JigglerState};

/// Pause between key events when slow typing is requested.
const SLOW_TYPING_DELAY: Duration = Duration::from_millis(20);

/// How often the jiggler checks for idleness.
const JIGGLER_CHECK_PERIOD: Duration = Duration::from_secs(1);

/// Pause between the moves of one jiggle.
const JIGGLE_STEP_DELAY: Duration = Duration::from_millis(100);

const JIGGLE_STEPS: usize = 5;
const JIGGLE_ABSOLUTE_OFFSET: i32 = 100;
const JIGGLE_RELATIVE_OFFSET: i32 = 10;

/// Backend state plus jiggler state; the payload of the `hid` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HidSnapshot {
    #[serde(flatten)]
    pub state: HidState,
    pub jiggler: JigglerState,
}

/// HID front-end shared by the HTTP and WebSocket APIs.
pub struct HidService {
    backend: Arc<dyn HidBackend>,
    ignore_keys: HashSet<String>,
    mouse_x_range: AxisRange,
    mouse_y_range: AxisRange,
    jiggler_enabled: bool,
    jiggler_active: watch::Sender<bool>,
    jiggler_interval: u64,
    started: Instant,
    /// Seconds since `started` of the last user input.
    last_activity: AtomicU64,
}

impl HidService {
    pub fn new(backend: Arc<dyn HidBackend>, config: &HidConfig) -> Self {
        Self {
            backend,
            ignore_keys: config.ignore_keys.iter().cloned().collect(),
            mouse_x_range: config.mouse_x_range,
            mouse_y_range: config.mouse_y_range,
            jiggler_enabled: config.jiggler.enabled,
            jiggler_active: watch::Sender::new(config.jiggler.enabled && config.jiggler.active),
            jiggler_interval: config.jiggler.interval,
            started: Instant::now(),
            last_activity: AtomicU64::new(0),
        }
    }

    // ── State ─────────────────────────────────────────────────────────────────

    pub fn jiggler_state(&self) -> JigglerState {
        JigglerState {
            enabled: self.jiggler_enabled,
            active: *self.jiggler_active.borrow(),
            interval: self.jiggler_interval,
        }
    }

    pub async fn get_state(&self) -> HidSnapshot {
        HidSnapshot {
            state: self.backend.get_state().await,
            jiggler: self.jiggler_state(),
        }
    }

    /// Snapshots for every backend state change and every jiggler toggle,
    /// starting with the current state.
    pub fn poll_state(self: &Arc<Self>) -> BoxStream<'static, HidSnapshot> {
        let service = Arc::clone(self);
        let backend = self.backend.poll_state().map(Some);
        // `None` marks a jiggler toggle: the backend state is fetched afresh.
        let jiggler = WatchStream::from_changes(self.jiggler_active.subscribe()).map(|_| None);
        stream::select(backend, jiggler)
            .then(move |state| {
                let service = Arc::clone(&service);
                async move {
                    let state = match state {
                        Some(state) => state,
                        None => service.backend.get_state().await,
                    };
                    HidSnapshot {
                        state,
                        jiggler: service.jiggler_state(),
                    }
                }
            })
            .boxed()
    }

    // ── Control ───────────────────────────────────────────────────────────────

    pub async fn reset(&self) -> Result<(), HidError> {
        self.backend.reset().await
    }

    /// Switches outputs and/or the jiggler.  `None` leaves a setting unchanged.
    pub fn set_params(
        &self,
        keyboard_output: Option<String>,
        mouse_output: Option<String>,
        jiggler: Option<bool>,
    ) -> Result<(), HidError> {
        if keyboard_output.is_some() || mouse_output.is_some() {
            self.backend.set_params(keyboard_output, mouse_output)?;
        }
        if let Some(active) = jiggler {
            self.set_jiggler_active(active);
        }
        Ok(())
    }

    /// Turns the jiggler on or off.  Ignored when the config disables it.
    pub fn set_jiggler_active(&self, active: bool) {
        if !self.jiggler_enabled {
            debug!("Mouse jiggler is disabled in the config, ignoring");
            return;
        }
        let changed = self.jiggler_active.send_if_modified(|current| {
            let changed = *current != active;
            *current = active;
            changed
        });
        if changed {
            info!("Mouse jiggler {}", if active { "activated" } else { "deactivated" });
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.backend.set_connected(connected);
    }

    pub async fn clear_events(&self) {
        self.backend.clear_events().await;
    }

    pub async fn cleanup(&self) {
        self.backend.cleanup().await;
    }

    // ── Keyboard ──────────────────────────────────────────────────────────────

    /// Sends a sequence of key events.
    ///
    /// Ignored keys are skipped unless `no_ignore_keys` is set.  With `slow`
    /// the service pauses between events for hosts that drop fast input.
    pub async fn send_key_events(
        &self,
        keys: &[(String, bool)],
        no_ignore_keys: bool,
        slow: bool,
    ) -> Result<(), HidError> {
        let mut sent = false;
        for (key, state) in keys {
            if !no_ignore_keys && self.ignore_keys.contains(key) {
                continue;
            }
            if slow && sent {
                sleep(SLOW_TYPING_DELAY).await;
            }
            self.backend.send_key_event(key, *state, false).await?;
            sent = true;
        }
        if sent {
            self.bump_activity();
        }
        Ok(())
    }

    /// Sends one key event; ignored keys are dropped.
    pub async fn send_key_event(&self, key: &str, state: bool, finish: bool) -> Result<(), HidError> {
        if self.ignore_keys.contains(key) {
            return Ok(());
        }
        self.backend.send_key_event(key, state, finish).await?;
        self.bump_activity();
        Ok(())
    }

    // ── Mouse ─────────────────────────────────────────────────────────────────

    pub async fn send_mouse_button_event(&self, button: &str, state: bool) -> Result<(), HidError> {
        self.backend.send_mouse_button_event(button, state).await?;
        self.bump_activity();
        Ok(())
    }

    /// Sends an absolute position given in the full wire range.
    pub async fn send_mouse_move_event(&self, to_x: i32, to_y: i32) -> Result<(), HidError> {
        let to_x = remap_axis(to_x, &self.mouse_x_range);
        let to_y = remap_axis(to_y, &self.mouse_y_range);
        self.backend.send_mouse_move_event(to_x, to_y).await?;
        self.bump_activity();
        Ok(())
    }

    pub async fn send_mouse_relative_event(&self, delta_x: i32, delta_y: i32) -> Result<(), HidError> {
        self.backend.send_mouse_relative_event(delta_x, delta_y).await?;
        self.bump_activity();
        Ok(())
    }

    /// Sends a burst of relative deltas, summing them first when `squash` is set.
    pub async fn send_mouse_relative_events(
        &self,
        deltas: &[(i32, i32)],
        squash: bool,
    ) -> Result<(), HidError> {
        for (dx, dy) in prepare_deltas(deltas, squash) {
            self.send_mouse_relative_event(dx, dy).await?;
        }
        Ok(())
    }

    pub async fn send_mouse_wheel_event(&self, delta_x: i32, delta_y: i32) -> Result<(), HidError> {
        self.backend.send_mouse_wheel_event(delta_x, delta_y).await?;
        self.bump_activity();
        Ok(())
    }

    /// Sends a burst of wheel deltas, summing them first when `squash` is set.
    pub async fn send_mouse_wheel_events(
        &self,
        deltas: &[(i32, i32)],
        squash: bool,
    ) -> Result<(), HidError> {
        for (dx, dy) in prepare_deltas(deltas, squash) {
            self.send_mouse_wheel_event(dx, dy).await?;
        }
        Ok(())
    }

    // ── Jiggler ───────────────────────────────────────────────────────────────

    fn now_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    fn bump_activity(&self) {
        self.last_activity.store(self.now_secs(), Ordering::Relaxed);
    }

    /// `true` when the jiggler is on and no input arrived for `interval` seconds.
    pub fn should_jiggle(&self) -> bool {
        *self.jiggler_active.borrow()
            && self.last_activity.load(Ordering::Relaxed) + self.jiggler_interval < self.now_secs()
    }

    /// One jiggle: five small moves back and forth.
    pub async fn jiggle(&self) -> Result<(), HidError> {
        let absolute = self.backend.get_state().await.mouse.absolute;
        let mut factor = 1;
        for _ in 0..JIGGLE_STEPS {
            if absolute {
                let offset = JIGGLE_ABSOLUTE_OFFSET * factor;
                self.send_mouse_move_event(offset, offset).await?;
            } else {
                let offset = JIGGLE_RELATIVE_OFFSET * factor;
                self.send_mouse_relative_event(offset, offset).await?;
            }
            factor = -factor;
            sleep(JIGGLE_STEP_DELAY).await;
        }
        Ok(())
    }

    /// Jiggler loop; runs until the task is aborted.
    pub async fn run_jiggler(self: Arc<Self>) {
        loop {
            if self.should_jiggle() {
                if let Err(e) = self.jiggle().await {
                    warn!("Mouse jiggler failed: {e}");
                }
            }
            sleep(JIGGLER_CHECK_PERIOD).await;
        }
    }
}

fn remap_axis(value: i32, range: &AxisRange) -> i32 {
    if range.is_full() {
        value
    } else {
        MouseRange::remap(value, range.min, range.max)
    }
}

fn prepare_deltas(deltas: &[(i32, i32)], squash: bool) -> Vec<(i32, i32)> {
    if squash {
        squash_deltas(deltas.iter().copied())
    } else {
        deltas.to_vec()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

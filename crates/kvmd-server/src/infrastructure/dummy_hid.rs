//! In-memory HID backend.
//!
//! `DummyHid` accepts every event, keeps track of what is currently pressed
//! and publishes its state through a `watch` channel.  It is the backend
//! the daemon runs with when no hardware is configured, and the one the
//! integration tests drive end to end.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info};

use crate::domain::hid::{
    HidBackend, HidError, HidOutputs, HidState, HidStateStream, KeyboardState, MouseState,
};

/// Output that switches the mouse into relative mode.
const RELATIVE_MOUSE_OUTPUT: &str = "usb_rel";

#[derive(Debug, Default)]
struct Pressed {
    keys: BTreeSet<String>,
    buttons: BTreeSet<String>,
    position: (i32, i32),
}

/// A backend with no device behind it.
#[derive(Debug)]
pub struct DummyHid {
    state: watch::Sender<HidState>,
    pressed: Mutex<Pressed>,
    busy: AtomicBool,
}

impl Default for DummyHid {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyHid {
    pub fn new() -> Self {
        let state = HidState {
            online: true,
            busy: false,
            connected: None,
            keyboard: KeyboardState {
                online: true,
                outputs: HidOutputs {
                    available: vec!["usb".to_string()],
                    active: "usb".to_string(),
                },
                ..KeyboardState::default()
            },
            mouse: MouseState {
                online: true,
                absolute: true,
                outputs: HidOutputs {
                    available: vec!["usb".to_string(), RELATIVE_MOUSE_OUTPUT.to_string()],
                    active: "usb".to_string(),
                },
            },
        };
        let (state, _) = watch::channel(state);
        Self {
            state,
            pressed: Mutex::new(Pressed::default()),
            busy: AtomicBool::new(false),
        }
    }

    /// Makes every event fail with [`HidError::Busy`] until cleared.
    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::Relaxed);
        self.state.send_modify(|state| state.busy = busy);
    }

    /// Keys currently held down, sorted.
    pub async fn pressed_keys(&self) -> Vec<String> {
        self.pressed.lock().await.keys.iter().cloned().collect()
    }

    /// Mouse buttons currently held down, sorted.
    pub async fn pressed_buttons(&self) -> Vec<String> {
        self.pressed.lock().await.buttons.iter().cloned().collect()
    }

    /// Last absolute position received.
    pub async fn position(&self) -> (i32, i32) {
        self.pressed.lock().await.position
    }

    fn check_busy(&self) -> Result<(), HidError> {
        if self.busy.load(Ordering::Relaxed) {
            Err(HidError::Busy("Performing another HID operation".to_string()))
        } else {
            Ok(())
        }
    }
}

fn check_output(outputs: &HidOutputs, output: &str) -> Result<(), HidError> {
    if outputs.available.iter().any(|o| o == output) {
        Ok(())
    } else {
        Err(HidError::InvalidParam(format!("Unknown HID output: {output}")))
    }
}

#[async_trait]
impl HidBackend for DummyHid {
    async fn get_state(&self) -> HidState {
        self.state.borrow().clone()
    }

    fn poll_state(&self) -> HidStateStream {
        Box::pin(WatchStream::new(self.state.subscribe()))
    }

    async fn reset(&self) -> Result<(), HidError> {
        self.check_busy()?;
        *self.pressed.lock().await = Pressed::default();
        info!("Dummy HID reset");
        Ok(())
    }

    fn set_params(
        &self,
        keyboard_output: Option<String>,
        mouse_output: Option<String>,
    ) -> Result<(), HidError> {
        let current = self.state.borrow().clone();
        if let Some(output) = &keyboard_output {
            check_output(&current.keyboard.outputs, output)?;
        }
        if let Some(output) = &mouse_output {
            check_output(&current.mouse.outputs, output)?;
        }
        self.state.send_modify(|state| {
            if let Some(output) = keyboard_output {
                state.keyboard.outputs.active = output;
            }
            if let Some(output) = mouse_output {
                state.mouse.absolute = output != RELATIVE_MOUSE_OUTPUT;
                state.mouse.outputs.active = output;
            }
        });
        Ok(())
    }

    fn set_connected(&self, connected: bool) {
        self.state.send_modify(|state| state.connected = Some(connected));
    }

    async fn send_key_event(&self, key: &str, state: bool, finish: bool) -> Result<(), HidError> {
        self.check_busy()?;
        let mut pressed = self.pressed.lock().await;
        if state {
            pressed.keys.insert(key.to_string());
        } else {
            pressed.keys.remove(key);
        }
        debug!(key, state, finish, "dummy key event");
        Ok(())
    }

    async fn send_mouse_button_event(&self, button: &str, state: bool) -> Result<(), HidError> {
        self.check_busy()?;
        let mut pressed = self.pressed.lock().await;
        if state {
            pressed.buttons.insert(button.to_string());
        } else {
            pressed.buttons.remove(button);
        }
        debug!(button, state, "dummy mouse button event");
        Ok(())
    }

    async fn send_mouse_move_event(&self, to_x: i32, to_y: i32) -> Result<(), HidError> {
        self.check_busy()?;
        self.pressed.lock().await.position = (to_x, to_y);
        debug!(to_x, to_y, "dummy mouse move event");
        Ok(())
    }

    async fn send_mouse_relative_event(&self, delta_x: i32, delta_y: i32) -> Result<(), HidError> {
        self.check_busy()?;
        debug!(delta_x, delta_y, "dummy mouse relative event");
        Ok(())
    }

    async fn send_mouse_wheel_event(&self, delta_x: i32, delta_y: i32) -> Result<(), HidError> {
        self.check_busy()?;
        debug!(delta_x, delta_y, "dummy mouse wheel event");
        Ok(())
    }

    async fn clear_events(&self) {
        let mut pressed = self.pressed.lock().await;
        pressed.keys.clear();
        pressed.buttons.clear();
    }

    async fn cleanup(&self) {
        self.clear_events().await;
        info!("Dummy HID cleaned up");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

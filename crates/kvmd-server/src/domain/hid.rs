//! HID backend abstraction and state model.
//!
//! A backend drives a physical (or emulated) keyboard and mouse.  The daemon
//! talks to it only through [`HidBackend`], so the USB gadget, serial and
//! dummy implementations are interchangeable.
//!
//! Key and button names are passed through as strings (`"KeyA"`, `"left"`);
//! translating them to scan codes is the backend's job.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::Serialize;
use thiserror::Error;

use super::errors::ApiError;

/// Errors a backend reports back to the API layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HidError {
    /// The device is busy with another operation.
    #[error("HID is busy: {0}")]
    Busy(String),

    /// A parameter is not supported by this backend.
    #[error("invalid HID parameter: {0}")]
    InvalidParam(String),

    /// The device failed to perform the operation.
    #[error("HID operation failed: {0}")]
    Operation(String),
}

impl From<HidError> for ApiError {
    fn from(err: HidError) -> Self {
        match err {
            HidError::Busy(msg) => ApiError::Busy(msg),
            HidError::InvalidParam(msg) => ApiError::InvalidInput(msg),
            HidError::Operation(msg) => ApiError::Operation(msg),
        }
    }
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Selectable outputs of one HID function (e.g. `usb`, `ps2`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HidOutputs {
    pub available: Vec<String>,
    pub active: String,
}

/// Keyboard LED state reported by the target host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KeyboardLeds {
    pub caps: bool,
    pub scroll: bool,
    pub num: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyboardState {
    pub online: bool,
    pub leds: KeyboardLeds,
    pub outputs: HidOutputs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MouseState {
    pub online: bool,
    pub absolute: bool,
    pub outputs: HidOutputs,
}

/// Full backend state, broadcast to clients as the `hid` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HidState {
    pub online: bool,
    pub busy: bool,
    /// `None` when the backend cannot report the cable state.
    pub connected: Option<bool>,
    pub keyboard: KeyboardState,
    pub mouse: MouseState,
}

/// Jiggler state, merged into the `hid` event by the HID service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JigglerState {
    pub enabled: bool,
    pub active: bool,
    pub interval: u64,
}

/// Stream of state snapshots.  The first item is the current state.
pub type HidStateStream = BoxStream<'static, HidState>;

// ── Backend trait ─────────────────────────────────────────────────────────────

/// Driver for a keyboard/mouse device.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HidBackend: Send + Sync {
    async fn get_state(&self) -> HidState;

    /// Yields the current state and then every change.
    fn poll_state(&self) -> HidStateStream;

    /// Releases everything and re-initialises the device.
    async fn reset(&self) -> Result<(), HidError>;

    /// Switches the active keyboard and/or mouse output.
    fn set_params(
        &self,
        keyboard_output: Option<String>,
        mouse_output: Option<String>,
    ) -> Result<(), HidError>;

    /// Plugs or unplugs the emulated cable where supported.
    fn set_connected(&self, connected: bool);

    /// `finish` marks the last event of a typed sequence.
    async fn send_key_event(&self, key: &str, state: bool, finish: bool) -> Result<(), HidError>;

    async fn send_mouse_button_event(&self, button: &str, state: bool) -> Result<(), HidError>;

    /// Absolute position, already remapped into the configured range.
    async fn send_mouse_move_event(&self, to_x: i32, to_y: i32) -> Result<(), HidError>;

    async fn send_mouse_relative_event(&self, delta_x: i32, delta_y: i32)
        -> Result<(), HidError>;

    async fn send_mouse_wheel_event(&self, delta_x: i32, delta_y: i32) -> Result<(), HidError>;

    /// Releases all pressed keys and buttons.
    async fn clear_events(&self);

    /// Called once on shutdown.
    async fn cleanup(&self);
}

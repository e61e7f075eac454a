//! HID API: HTTP routes, WebSocket input events and the `hid` state feed.
//!
//! # HTTP
//!
//! | Method | Path                             | Arguments                                    |
//! |--------|----------------------------------|----------------------------------------------|
//! | GET    | `/hid`                           |                                              |
//! | POST   | `/hid/set_params`                | `keyboard_output`, `mouse_output`, `jiggler` |
//! | POST   | `/hid/set_connected`             | `connected`                                  |
//! | POST   | `/hid/reset`                     |                                              |
//! | POST   | `/hid/events/send_key`           | `key`, `state` (omitted: press and release)  |
//! | POST   | `/hid/events/send_shortcut`      | `keys` (comma-separated), typed slowly       |
//! | POST   | `/hid/events/send_mouse_button`  | `button`, `state` (omitted: click)           |
//! | POST   | `/hid/events/send_mouse_move`    | `to_x`, `to_y`                               |
//! | POST   | `/hid/events/send_mouse_relative`| `delta_x`, `delta_y`                         |
//! | POST   | `/hid/events/send_mouse_wheel`   | `delta_x`, `delta_y`                         |
//!
//! # WebSocket
//!
//! Text events `key`, `mouse_button`, `mouse_move`, `mouse_relative` and
//! `mouse_wheel` plus binary opcodes 1-5 (see [`kvmd_core::InputEvent`]).
//! Malformed input events are dropped without a reply: they arrive at
//! pointer-motion rates and answering each one would flood the client.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use axum::response::Response;
use futures_util::StreamExt;
use kvmd_core::{EventPayload, InputEvent};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::exposed::{Exposed, HttpExposed, WsExposed};
use super::hid_service::HidService;
use super::http::{make_json_response, QueryArgs};
use super::hub::{SessionHooks, SessionHub};
use crate::domain::validators::{
    valid_bool, valid_hid_key, valid_hid_mouse_button, valid_hid_mouse_delta,
    valid_hid_mouse_move, valid_hid_output,
};
use crate::domain::{ApiError, ValidatorError, WsSession};
use kvmd_core::protocol::input::opcode;

/// Serializes a value into a JSON object payload.
pub(crate) fn to_payload<T: Serialize>(value: &T) -> EventPayload {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => EventPayload::new(),
    }
}

fn ok_response() -> Response {
    make_json_response(Value::Null, StatusCode::OK)
}

/// The HID API component.
pub struct HidApi {
    hid: Arc<HidService>,
}

impl HidApi {
    pub fn new(hid: Arc<HidService>) -> Self {
        Self { hid }
    }

    /// Broadcasts a `hid` event for every backend state change.
    pub async fn run_state_poller(&self, hub: Arc<SessionHub>) {
        let mut states = self.hid.poll_state();
        while let Some(snapshot) = states.next().await {
            hub.broadcast("hid", &to_payload(&snapshot)).await;
        }
        info!("HID state stream ended");
    }

    fn http_route<F, Fut>(&self, method: Method, path: &str, handler: F) -> HttpExposed
    where
        F: Fn(Arc<HidService>, QueryArgs) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Response, ApiError>> + Send + 'static,
    {
        let hid = Arc::clone(&self.hid);
        let handler = Arc::new(handler);
        HttpExposed::new(method, path, move |request| {
            let hid = Arc::clone(&hid);
            let handler = Arc::clone(&handler);
            async move {
                let args = QueryArgs::from_uri(request.uri())?;
                handler(hid, args).await
            }
        })
    }

    fn ws_text<F, Fut>(&self, event_type: &str, handler: F) -> WsExposed
    where
        F: Fn(Arc<HidService>, EventPayload) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        let hid = Arc::clone(&self.hid);
        let handler = Arc::new(handler);
        WsExposed::text(event_type, move |_session, event| {
            let hid = Arc::clone(&hid);
            let handler = Arc::clone(&handler);
            async move { handler(hid, event).await }
        })
    }

    fn ws_binary(&self, code: u8) -> WsExposed {
        let hid = Arc::clone(&self.hid);
        WsExposed::binary(code, move |_session, data| {
            let hid = Arc::clone(&hid);
            async move {
                match InputEvent::decode(code, &data) {
                    Ok(event) => apply_input(&hid, event).await,
                    Err(e) => {
                        debug!("Dropping malformed binary HID event: {e}");
                        Ok(())
                    }
                }
            }
        })
    }
}

// ── Input handling ────────────────────────────────────────────────────────────

/// Forwards a decoded binary input event to the HID service.
async fn apply_input(hid: &HidService, event: InputEvent) -> Result<(), ApiError> {
    match event {
        InputEvent::Key { key, state, finish } => {
            let key = match valid_hid_key(&Value::String(key)) {
                Ok(key) => key,
                Err(e) => return drop_invalid(e),
            };
            hid.send_key_event(&key, state, finish).await?;
        }
        InputEvent::MouseButton { button, state } => {
            let button = match valid_hid_mouse_button(&Value::String(button)) {
                Ok(button) => button,
                Err(e) => return drop_invalid(e),
            };
            hid.send_mouse_button_event(&button, state).await?;
        }
        InputEvent::MouseMove { to_x, to_y } => {
            hid.send_mouse_move_event(i32::from(to_x), i32::from(to_y))
                .await?;
        }
        InputEvent::MouseRelative { deltas, squash } => {
            hid.send_mouse_relative_events(&widen(&deltas), squash).await?;
        }
        InputEvent::MouseWheel { deltas, squash } => {
            hid.send_mouse_wheel_events(&widen(&deltas), squash).await?;
        }
    }
    Ok(())
}

fn widen(deltas: &[(i8, i8)]) -> Vec<(i32, i32)> {
    deltas
        .iter()
        .map(|(dx, dy)| (i32::from(*dx), i32::from(*dy)))
        .collect()
}

fn drop_invalid(err: ValidatorError) -> Result<(), ApiError> {
    debug!("Dropping invalid HID event: {err}");
    Ok(())
}

fn field<'a>(event: &'a EventPayload, name: &str) -> &'a Value {
    event.get(name).unwrap_or(&Value::Null)
}

fn optional_bool(event: &EventPayload, name: &str) -> Result<bool, ValidatorError> {
    match event.get(name) {
        None | Some(Value::Null) => Ok(false),
        Some(value) => valid_bool(value),
    }
}

fn event_delta(event: &EventPayload, name: &str) -> Result<(i32, i32), ValidatorError> {
    let delta = field(event, name);
    Ok((
        valid_hid_mouse_delta(delta.get("x").unwrap_or(&Value::Null))?,
        valid_hid_mouse_delta(delta.get("y").unwrap_or(&Value::Null))?,
    ))
}

async fn ws_key(hid: Arc<HidService>, event: EventPayload) -> Result<(), ApiError> {
    let parsed = (|| {
        Ok::<_, ValidatorError>((
            valid_hid_key(field(&event, "key"))?,
            valid_bool(field(&event, "state"))?,
            optional_bool(&event, "finish")?,
        ))
    })();
    match parsed {
        Ok((key, state, finish)) => Ok(hid.send_key_event(&key, state, finish).await?),
        Err(e) => drop_invalid(e),
    }
}

async fn ws_mouse_button(hid: Arc<HidService>, event: EventPayload) -> Result<(), ApiError> {
    let parsed = (|| {
        Ok::<_, ValidatorError>((
            valid_hid_mouse_button(field(&event, "button"))?,
            valid_bool(field(&event, "state"))?,
        ))
    })();
    match parsed {
        Ok((button, state)) => Ok(hid.send_mouse_button_event(&button, state).await?),
        Err(e) => drop_invalid(e),
    }
}

async fn ws_mouse_move(hid: Arc<HidService>, event: EventPayload) -> Result<(), ApiError> {
    let to = field(&event, "to");
    let parsed = (|| {
        Ok::<_, ValidatorError>((
            valid_hid_mouse_move(to.get("x").unwrap_or(&Value::Null))?,
            valid_hid_mouse_move(to.get("y").unwrap_or(&Value::Null))?,
        ))
    })();
    match parsed {
        Ok((to_x, to_y)) => Ok(hid.send_mouse_move_event(to_x, to_y).await?),
        Err(e) => drop_invalid(e),
    }
}

async fn ws_mouse_relative(hid: Arc<HidService>, event: EventPayload) -> Result<(), ApiError> {
    let parsed = event_delta(&event, "delta")
        .and_then(|delta| Ok((delta, optional_bool(&event, "squash")?)));
    match parsed {
        Ok((delta, squash)) => Ok(hid.send_mouse_relative_events(&[delta], squash).await?),
        Err(e) => drop_invalid(e),
    }
}

async fn ws_mouse_wheel(hid: Arc<HidService>, event: EventPayload) -> Result<(), ApiError> {
    let parsed = event_delta(&event, "delta")
        .and_then(|delta| Ok((delta, optional_bool(&event, "squash")?)));
    match parsed {
        Ok((delta, squash)) => Ok(hid.send_mouse_wheel_events(&[delta], squash).await?),
        Err(e) => drop_invalid(e),
    }
}

// ── HTTP handlers ─────────────────────────────────────────────────────────────

async fn http_state(hid: Arc<HidService>, _args: QueryArgs) -> Result<Response, ApiError> {
    let snapshot = hid.get_state().await;
    Ok(make_json_response(
        Value::Object(to_payload(&snapshot)),
        StatusCode::OK,
    ))
}

async fn http_set_params(hid: Arc<HidService>, args: QueryArgs) -> Result<Response, ApiError> {
    let keyboard_output = valid_hid_output(args.get("keyboard_output").as_ref())?;
    let mouse_output = valid_hid_output(args.get("mouse_output").as_ref())?;
    let jiggler = args.get("jiggler").map(|v| valid_bool(&v)).transpose()?;
    hid.set_params(keyboard_output, mouse_output, jiggler)?;
    Ok(ok_response())
}

async fn http_set_connected(hid: Arc<HidService>, args: QueryArgs) -> Result<Response, ApiError> {
    let connected = valid_bool(&args.require("connected")?)?;
    hid.set_connected(connected);
    Ok(ok_response())
}

async fn http_reset(hid: Arc<HidService>, _args: QueryArgs) -> Result<Response, ApiError> {
    hid.reset().await?;
    Ok(ok_response())
}

async fn http_send_key(hid: Arc<HidService>, args: QueryArgs) -> Result<Response, ApiError> {
    let key = valid_hid_key(&args.require("key")?)?;
    match args.get("state") {
        Some(state) => {
            let state = valid_bool(&state)?;
            hid.send_key_events(&[(key, state)], false, false).await?;
        }
        None => {
            hid.send_key_events(&[(key.clone(), true), (key, false)], false, false)
                .await?;
        }
    }
    Ok(ok_response())
}

/// Presses every key in order, then releases them in reverse.
async fn http_send_shortcut(hid: Arc<HidService>, args: QueryArgs) -> Result<Response, ApiError> {
    let list = args.require("keys")?;
    let keys = list
        .as_str()
        .unwrap_or_default()
        .split(',')
        .filter(|key| !key.is_empty())
        .map(|key| valid_hid_key(&Value::String(key.to_string())))
        .collect::<Result<Vec<_>, _>>()?;
    if !keys.is_empty() {
        let events: Vec<(String, bool)> = keys
            .iter()
            .map(|key| (key.clone(), true))
            .chain(keys.iter().rev().map(|key| (key.clone(), false)))
            .collect();
        hid.send_key_events(&events, false, true).await?;
    }
    Ok(ok_response())
}

async fn http_send_mouse_button(
    hid: Arc<HidService>,
    args: QueryArgs,
) -> Result<Response, ApiError> {
    let button = valid_hid_mouse_button(&args.require("button")?)?;
    match args.get("state") {
        Some(state) => {
            let state = valid_bool(&state)?;
            hid.send_mouse_button_event(&button, state).await?;
        }
        None => {
            hid.send_mouse_button_event(&button, true).await?;
            hid.send_mouse_button_event(&button, false).await?;
        }
    }
    Ok(ok_response())
}

async fn http_send_mouse_move(hid: Arc<HidService>, args: QueryArgs) -> Result<Response, ApiError> {
    let to_x = valid_hid_mouse_move(&args.require("to_x")?)?;
    let to_y = valid_hid_mouse_move(&args.require("to_y")?)?;
    hid.send_mouse_move_event(to_x, to_y).await?;
    Ok(ok_response())
}

async fn http_send_mouse_relative(
    hid: Arc<HidService>,
    args: QueryArgs,
) -> Result<Response, ApiError> {
    let delta_x = valid_hid_mouse_delta(&args.require("delta_x")?)?;
    let delta_y = valid_hid_mouse_delta(&args.require("delta_y")?)?;
    hid.send_mouse_relative_event(delta_x, delta_y).await?;
    Ok(ok_response())
}

async fn http_send_mouse_wheel(
    hid: Arc<HidService>,
    args: QueryArgs,
) -> Result<Response, ApiError> {
    let delta_x = valid_hid_mouse_delta(&args.require("delta_x")?)?;
    let delta_y = valid_hid_mouse_delta(&args.require("delta_y")?)?;
    hid.send_mouse_wheel_event(delta_x, delta_y).await?;
    Ok(ok_response())
}

// ── Exposed ───────────────────────────────────────────────────────────────────

impl Exposed for HidApi {
    fn exposed_http(&self) -> Vec<HttpExposed> {
        vec![
            self.http_route(Method::GET, "/hid", http_state),
            self.http_route(Method::POST, "/hid/set_params", http_set_params),
            self.http_route(Method::POST, "/hid/set_connected", http_set_connected),
            self.http_route(Method::POST, "/hid/reset", http_reset),
            self.http_route(Method::POST, "/hid/events/send_key", http_send_key),
            self.http_route(Method::POST, "/hid/events/send_shortcut", http_send_shortcut),
            self.http_route(
                Method::POST,
                "/hid/events/send_mouse_button",
                http_send_mouse_button,
            ),
            self.http_route(Method::POST, "/hid/events/send_mouse_move", http_send_mouse_move),
            self.http_route(
                Method::POST,
                "/hid/events/send_mouse_relative",
                http_send_mouse_relative,
            ),
            self.http_route(Method::POST, "/hid/events/send_mouse_wheel", http_send_mouse_wheel),
        ]
    }

    fn exposed_ws(&self) -> Vec<WsExposed> {
        vec![
            self.ws_text("key", ws_key),
            self.ws_text("mouse_button", ws_mouse_button),
            self.ws_text("mouse_move", ws_mouse_move),
            self.ws_text("mouse_relative", ws_mouse_relative),
            self.ws_text("mouse_wheel", ws_mouse_wheel),
            self.ws_binary(opcode::KEY),
            self.ws_binary(opcode::MOUSE_BUTTON),
            self.ws_binary(opcode::MOUSE_MOVE),
            self.ws_binary(opcode::MOUSE_RELATIVE),
            self.ws_binary(opcode::MOUSE_WHEEL),
        ]
    }
}

#[async_trait]
impl SessionHooks for HidApi {
    async fn on_opened(&self, session: &Arc<WsSession>) {
        let snapshot = self.hid.get_state().await;
        if let Err(e) = session.send_event("hid", &to_payload(&snapshot)).await {
            debug!(session = %session.id(), "initial hid state not delivered: {e}");
        }
    }

    async fn on_closed(&self, _session: &Arc<WsSession>) {
        self.hid.clear_events().await;
    }
}

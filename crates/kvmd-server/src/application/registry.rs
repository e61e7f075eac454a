//! Startup-time collection of exposed routes.
//!
//! [`ExposedRegistry::build`] walks every component once and indexes its
//! declarations.  A second declaration for the same `(method, path)` or the
//! same WebSocket key is a configuration bug and aborts startup.
//!
//! After the server adds its own upgrade route the registry is frozen; the
//! WebSocket tables are shared read-only as `Arc<WsRoutes>`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::http::Method;
use thiserror::Error;

use super::exposed::{
    Exposed, HttpExposed, WsBinaryHandler, WsEventKey, WsExposed, WsTextHandler,
};

/// A conflicting or unusable declaration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate HTTP route: {method} {path}")]
    DuplicateHttpRoute { method: Method, path: String },

    #[error("duplicate WebSocket event handler: {0}")]
    DuplicateWsEvent(WsEventKey),

    #[error("HTTP route path must start with '/': {0:?}")]
    InvalidPath(String),

    #[error("WebSocket event type must not be empty")]
    EmptyEventType,

    #[error("unsupported HTTP method for {path}: {method}")]
    UnsupportedMethod { method: Method, path: String },
}

/// WebSocket handler tables, keyed by event type and opcode.
#[derive(Default, Clone)]
pub struct WsRoutes {
    text: HashMap<String, WsTextHandler>,
    binary: HashMap<u8, WsBinaryHandler>,
}

impl WsRoutes {
    pub fn text_handler(&self, event_type: &str) -> Option<&WsTextHandler> {
        self.text.get(event_type)
    }

    pub fn binary_handler(&self, opcode: u8) -> Option<&WsBinaryHandler> {
        self.binary.get(&opcode)
    }

    pub fn len(&self) -> usize {
        self.text.len() + self.binary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// All HTTP routes and WebSocket handlers of the daemon.
#[derive(Default)]
pub struct ExposedRegistry {
    http: Vec<HttpExposed>,
    http_keys: HashSet<(Method, String)>,
    ws: WsRoutes,
}

impl ExposedRegistry {
    /// Collects the declarations of every component.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistryError`] encountered.
    pub fn build(components: &[&dyn Exposed]) -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        for component in components {
            for exposed in component.exposed_http() {
                registry.add_http(exposed)?;
            }
            for exposed in component.exposed_ws() {
                registry.add_ws(exposed)?;
            }
        }
        Ok(registry)
    }

    /// Adds one HTTP route.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateHttpRoute`] if `(method, path)` is
    /// already taken, or [`RegistryError::InvalidPath`] for a relative path.
    pub fn add_http(&mut self, exposed: HttpExposed) -> Result<(), RegistryError> {
        let route = &exposed.route;
        if !route.path.starts_with('/') {
            return Err(RegistryError::InvalidPath(route.path.clone()));
        }
        let key = (route.method.clone(), route.path.clone());
        if !self.http_keys.insert(key) {
            return Err(RegistryError::DuplicateHttpRoute {
                method: route.method.clone(),
                path: route.path.clone(),
            });
        }
        self.http.push(exposed);
        Ok(())
    }

    /// Adds one WebSocket handler.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateWsEvent`] if the key is already
    /// taken, or [`RegistryError::EmptyEventType`].
    pub fn add_ws(&mut self, exposed: WsExposed) -> Result<(), RegistryError> {
        let key = exposed.key();
        match exposed {
            WsExposed::Text {
                event_type,
                handler,
            } => {
                if event_type.is_empty() {
                    return Err(RegistryError::EmptyEventType);
                }
                if self.ws.text.contains_key(&event_type) {
                    return Err(RegistryError::DuplicateWsEvent(key));
                }
                self.ws.text.insert(event_type, handler);
            }
            WsExposed::Binary { opcode, handler } => {
                if self.ws.binary.contains_key(&opcode) {
                    return Err(RegistryError::DuplicateWsEvent(key));
                }
                self.ws.binary.insert(opcode, handler);
            }
        }
        Ok(())
    }

    pub fn http_routes(&self) -> &[HttpExposed] {
        &self.http
    }

    pub fn ws_routes(&self) -> &WsRoutes {
        &self.ws
    }

    /// Freezes the registry, splitting it into the HTTP list and the shared
    /// WebSocket tables.
    pub fn into_parts(self) -> (Vec<HttpExposed>, Arc<WsRoutes>) {
        (self.http, Arc::new(self.ws))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    struct Component {
        http_paths: Vec<(Method, &'static str)>,
        events: Vec<&'static str>,
        opcodes: Vec<u8>,
    }

    impl Exposed for Component {
        fn exposed_http(&self) -> Vec<HttpExposed> {
            self.http_paths
                .iter()
                .map(|(method, path)| {
                    HttpExposed::new(method.clone(), path, |_req| async {
                        Ok("ok".into_response())
                    })
                })
                .collect()
        }

        fn exposed_ws(&self) -> Vec<WsExposed> {
            let text = self
                .events
                .iter()
                .map(|event_type| WsExposed::text(event_type, |_s, _e| async { Ok(()) }));
            let binary = self
                .opcodes
                .iter()
                .map(|opcode| WsExposed::binary(*opcode, |_s, _d| async { Ok(()) }));
            text.chain(binary).collect()
        }
    }

    fn component(
        http_paths: Vec<(Method, &'static str)>,
        events: Vec<&'static str>,
        opcodes: Vec<u8>,
    ) -> Component {
        Component {
            http_paths,
            events,
            opcodes,
        }
    }

    #[test]
    fn test_build_indexes_all_components() {
        // Arrange
        let a = component(vec![(Method::GET, "/hid")], vec!["key"], vec![1]);
        let b = component(vec![(Method::POST, "/hid")], vec!["ping"], vec![2]);

        // Act
        let registry = ExposedRegistry::build(&[&a, &b]).expect("no conflicts");

        // Assert
        assert_eq!(registry.http_routes().len(), 2);
        assert_eq!(registry.ws_routes().len(), 4);
        assert!(registry.ws_routes().text_handler("ping").is_some());
        assert!(registry.ws_routes().binary_handler(2).is_some());
        assert!(registry.ws_routes().binary_handler(3).is_none());
    }

    #[test]
    fn test_duplicate_http_route_across_components_fails() {
        let a = component(vec![(Method::GET, "/hid")], vec![], vec![]);
        let b = component(vec![(Method::GET, "/hid")], vec![], vec![]);

        let result = ExposedRegistry::build(&[&a, &b]);

        assert_eq!(
            result.err(),
            Some(RegistryError::DuplicateHttpRoute {
                method: Method::GET,
                path: "/hid".to_string()
            })
        );
    }

    #[test]
    fn test_duplicate_text_event_fails() {
        let a = component(vec![], vec!["ping"], vec![]);
        let b = component(vec![], vec!["ping"], vec![]);

        let result = ExposedRegistry::build(&[&a, &b]);

        assert_eq!(
            result.err(),
            Some(RegistryError::DuplicateWsEvent(WsEventKey::Text(
                "ping".to_string()
            )))
        );
    }

    #[test]
    fn test_duplicate_opcode_fails() {
        let a = component(vec![], vec![], vec![3, 3]);

        let result = ExposedRegistry::build(&[&a]);

        assert_eq!(
            result.err(),
            Some(RegistryError::DuplicateWsEvent(WsEventKey::Binary(3)))
        );
    }

    #[test]
    fn test_relative_path_is_rejected() {
        let a = component(vec![(Method::GET, "hid")], vec![], vec![]);
        assert!(matches!(
            ExposedRegistry::build(&[&a]),
            Err(RegistryError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_empty_event_type_is_rejected() {
        let a = component(vec![], vec![""], vec![]);
        assert_eq!(
            ExposedRegistry::build(&[&a]).err(),
            Some(RegistryError::EmptyEventType)
        );
    }
}

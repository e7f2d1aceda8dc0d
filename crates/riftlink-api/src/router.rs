//! Event router.
//!
//! Pattern → handler registry. A pattern matches when it is a substring of
//! the event URI, and every matching handler runs, in registration order,
//! on the caller's thread. Handlers are expected to parse and hand work off
//! elsewhere; they must not block.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};

use tracing::{trace, warn};

use crate::frame::ApiEvent;

/// Callback invoked for every event whose URI contains the route pattern.
pub type EventHandler = Arc<dyn Fn(&ApiEvent) + Send + Sync>;

/// Substring-matching fan-out router.
#[derive(Default)]
pub struct EventRouter {
    routes: RwLock<Vec<(String, EventHandler)>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `pattern`. Re-registering a pattern replaces
    /// its handler but keeps its original position.
    pub fn register_handler<F>(&self, pattern: impl Into<String>, handler: F)
    where
        F: Fn(&ApiEvent) + Send + Sync + 'static,
    {
        let pattern = pattern.into();
        let handler: EventHandler = Arc::new(handler);
        let mut routes = self.routes.write().expect("router lock poisoned");
        if let Some(slot) = routes.iter_mut().find(|(p, _)| *p == pattern) {
            slot.1 = handler;
        } else {
            routes.push((pattern, handler));
        }
    }

    /// Remove the route registered under exactly `pattern`.
    pub fn delete_handler(&self, pattern: &str) -> bool {
        let mut routes = self.routes.write().expect("router lock poisoned");
        let before = routes.len();
        routes.retain(|(p, _)| p != pattern);
        routes.len() != before
    }

    /// Run every handler whose pattern occurs in `event.uri`.
    ///
    /// Returns how many handlers ran. Unmatched events are dropped silently.
    /// A panicking handler is logged and does not stop the others.
    pub fn dispatch(&self, event: &ApiEvent) -> usize {
        // Snapshot matches so handlers may (un)register routes themselves.
        let matched: Vec<(String, EventHandler)> = {
            let routes = self.routes.read().expect("router lock poisoned");
            routes
                .iter()
                .filter(|(pattern, _)| event.uri.contains(pattern.as_str()))
                .map(|(p, h)| (p.clone(), Arc::clone(h)))
                .collect()
        };

        if matched.is_empty() {
            trace!(uri = %event.uri, "no route for event");
        }

        for (pattern, handler) in &matched {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!(pattern = %pattern, uri = %event.uri, "event handler panicked");
            }
        }
        matched.len()
    }

    pub fn patterns(&self) -> Vec<String> {
        self.routes
            .read()
            .expect("router lock poisoned")
            .iter()
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.routes.read().expect("router lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::frame::{EventType, decode_frame};

    fn event(uri: &str) -> ApiEvent {
        ApiEvent {
            topic: "OnJsonApiEvent".into(),
            uri: uri.into(),
            event_type: EventType::Update,
            data: json!({}),
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &str) -> impl Fn(&ApiEvent) + use<> {
        let log = Arc::clone(log);
        let tag = tag.to_owned();
        move |_: &ApiEvent| log.lock().expect("log lock").push(tag.clone())
    }

    #[test]
    fn fans_out_to_all_substring_matches_in_order() {
        let router = EventRouter::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        router.register_handler("/lol-inventory", recorder(&log, "inventory"));
        router.register_handler("/lol-ranked", recorder(&log, "ranked"));
        router.register_handler("wallet", recorder(&log, "wallet"));

        let ran = router.dispatch(&event("/lol-inventory/v1/wallet"));

        assert_eq!(ran, 2);
        assert_eq!(*log.lock().expect("log lock"), vec!["inventory", "wallet"]);
    }

    #[test]
    fn unmatched_events_are_dropped() {
        let router = EventRouter::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        router.register_handler("/lol-ranked", recorder(&log, "ranked"));

        assert_eq!(router.dispatch(&event("/lol-chat/v1/me")), 0);
        assert!(log.lock().expect("log lock").is_empty());
    }

    #[test]
    fn delete_and_replace_handlers() {
        let router = EventRouter::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        router.register_handler("a", recorder(&log, "first"));
        router.register_handler("b", recorder(&log, "b"));
        router.register_handler("a", recorder(&log, "second"));
        assert_eq!(router.patterns(), vec!["a", "b"]);

        router.dispatch(&event("ab"));
        assert_eq!(*log.lock().expect("log lock"), vec!["second", "b"]);

        assert!(router.delete_handler("a"));
        assert!(!router.delete_handler("a"));
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn panicking_handler_does_not_stop_dispatch() {
        let router = EventRouter::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        router.register_handler("x", |_| panic!("boom"));
        router.register_handler("x", recorder(&log, "replaced"));
        router.register_handler("", |_| panic!("boom"));
        router.register_handler("xy", recorder(&log, "after"));

        assert_eq!(router.dispatch(&event("xyz")), 3);
        assert_eq!(*log.lock().expect("log lock"), vec!["replaced", "after"]);
    }

    #[test]
    fn decoded_frame_reaches_substring_routes() {
        let router = EventRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        router.register_handler("u", move |e: &ApiEvent| {
            sink.lock().expect("seen lock").push(e.event_type.code());
        });

        let frame = r#"[8, "topic", {"uri":"u","eventType":"Create","data":{}}]"#;
        let event = decode_frame(frame).expect("valid").expect("event");
        router.dispatch(&event);

        assert_eq!(*seen.lock().expect("seen lock"), vec![0]);
    }
}

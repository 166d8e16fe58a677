//! Per-connection `LISTEN`/`NOTIFY` registry (spec.md §4.5 `add_listener` /
//! `remove_listener` / `reset`).

use std::collections::HashMap;
use std::sync::Arc;

use futures_channel::mpsc::{self, UnboundedReceiver};

use crate::message::Notification;

/// A callback invoked with `(backend_pid, channel, payload)` for every
/// `NotificationResponse` on a registered channel, in arrival order (spec.md
/// §5 ordering guarantees).
pub type ListenerFn = Arc<dyn Fn(u32, &str, &str) + Send + Sync>;

#[derive(Default)]
pub struct ListenerRegistry {
    listeners: HashMap<String, Vec<ListenerFn>>,
}

impl ListenerRegistry {
    pub fn add(&mut self, channel: impl Into<String>, f: ListenerFn) {
        self.listeners.entry(channel.into()).or_default().push(f);
    }

    /// Removes every listener registered for `channel`. The identity-based
    /// variant (removing one specific callback among several) isn't
    /// representable with a plain `Fn`, so callers that need that should
    /// keep their own dedup key and re-`add` the survivors; this mirrors
    /// the common case of one callback per channel.
    pub fn remove(&mut self, channel: &str) {
        self.listeners.remove(channel);
    }

    pub fn reset(&mut self) {
        self.listeners.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn dispatch(&self, notification: &Notification) {
        let channel = String::from_utf8_lossy(&notification.channel);
        let Some(callbacks) = self.listeners.get(channel.as_ref()) else {
            return;
        };
        let payload = String::from_utf8_lossy(&notification.payload);
        for callback in callbacks {
            callback(notification.process_id, &channel, &payload);
        }
    }
}

/// Quotes an identifier for use in `LISTEN "channel"` / `UNLISTEN "channel"`,
/// doubling embedded double quotes -- the same escaping `NOTIFY`/`LISTEN`
/// channel names need as any other SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Creates the unbounded channel a [`super::stream::PgStream`] pushes
/// `NotificationResponse`s into while a listener registry is attached, and
/// the receiving half a background task would drain to call into
/// [`ListenerRegistry::dispatch`].
pub fn notification_channel() -> (mpsc::UnboundedSender<Notification>, UnboundedReceiver<Notification>) {
    mpsc::unbounded()
}

//! Connectivity and visibility signals from the hosting platform.
//!
//! The host (browser shell, desktop app, mobile wrapper) translates its own online/offline
//! and foreground/background events into [`ConnectivityChanged`] notifications. Coming
//! back online and regaining focus both emit a [`ReconnectTrigger`] on a broadcast
//! channel; the sync coordinator listens there and drains its queue.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityChanged {
    Online,
    Offline,
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectTrigger {
    BecameOnline,
    BecameVisible,
}

#[derive(Debug)]
pub struct ConnectivityMonitor {
    online: AtomicBool,
    triggers: broadcast::Sender<ReconnectTrigger>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (triggers, _) = broadcast::channel(16);
        Self {
            online: AtomicBool::new(initially_online),
            triggers,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReconnectTrigger> {
        self.triggers.subscribe()
    }

    /// Apply a platform notification. Returns the trigger emitted, if any.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn notify(&self, event: ConnectivityChanged) -> Option<ReconnectTrigger> {
        let trigger = match event {
            ConnectivityChanged::Online => {
                let was_online = self.online.swap(true, Ordering::SeqCst);
                (!was_online).then_some(ReconnectTrigger::BecameOnline)
            }
            ConnectivityChanged::Offline => {
                if self.online.swap(false, Ordering::SeqCst) {
                    tracing::info!("connectivity lost");
                }
                None
            }
            ConnectivityChanged::Visible => Some(ReconnectTrigger::BecameVisible),
            ConnectivityChanged::Hidden => None,
        };

        if let Some(trigger) = trigger {
            tracing::debug!(?trigger, "emitting reconnect trigger");
            // No receivers is fine: nothing is listening yet.
            let _ = self.triggers.send(trigger);
        }
        trigger
    }

    pub fn set_online(&self, online: bool) -> Option<ReconnectTrigger> {
        self.notify(if online {
            ConnectivityChanged::Online
        } else {
            ConnectivityChanged::Offline
        })
    }
}

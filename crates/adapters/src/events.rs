// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! Event broadcasting contract (spec §6): `broadcast(eventType, payload)` is
//! fire-and-forget; `appendSystemEvent` persists an audit record.

use async_trait::async_trait;
use cam_core::{Event, SystemEvent};
use tokio::sync::broadcast;

#[async_trait]
pub trait EventBroadcaster: Send + Sync {
    /// Fire-and-forget; no subscriber is guaranteed to exist.
    fn broadcast(&self, event: Event);
}

/// Broadcasts over an in-process `tokio::sync::broadcast` channel, the way
/// a websocket layer would fan events out to connected dashboards. That
/// layer itself is out of scope here; this only owns the channel.
#[derive(Clone)]
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<Event>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBroadcaster for ChannelBroadcaster {
    fn broadcast(&self, event: Event) {
        // No receivers is not an error; events are fire-and-forget.
        let _ = self.tx.send(event);
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    pub struct RecordingBroadcaster {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl RecordingBroadcaster {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<Event> {
            self.events.lock().clone()
        }
    }

    impl EventBroadcaster for RecordingBroadcaster {
        fn broadcast(&self, event: Event) {
            self.events.lock().push(event);
        }
    }
}

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Diff streams and explicit fan-out.
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use weave_core::TimedDiffCollection;

/// Receiving end of a diff stream.
pub type DiffStream = mpsc::UnboundedReceiver<Arc<TimedDiffCollection>>;

/// Sending end of a diff stream.
pub type DiffSink = mpsc::UnboundedSender<Arc<TimedDiffCollection>>;

/// New connected sink/stream pair.
pub fn diff_channel() -> (DiffSink, DiffStream) {
    mpsc::unbounded_channel()
}

/// Delivers every published collection to all live subscribers.
///
/// Subscribers whose stream was dropped are pruned on the next publish.
#[derive(Debug, Default)]
pub struct Broadcaster {
    subscribers: Mutex<Vec<DiffSink>>,
}

impl Broadcaster {
    /// Broadcaster without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a stream receiving everything published from now on.
    pub fn subscribe(&self) -> DiffStream {
        let (sink, stream) = diff_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink);
        stream
    }

    /// Sends `diffs` to every subscriber; returns how many received it.
    pub fn publish(&self, diffs: &Arc<TimedDiffCollection>) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|sink| sink.send(Arc::clone(diffs)).is_ok());
        subscribers.len()
    }

    /// Number of subscribers still connected as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

//! The shared message-stream subscription and its fan-out.
//!
//! The driver holds at most one [`MessageStream`]. A pump task owns the
//! subscription's event channel, decodes each event once and hands a copy
//! to every registered reactor. Reactors whose receiver was dropped are
//! pruned on the next event.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chatwire_protocol::{IncomingMessage, MalformedEvent, SubscriptionId, decode_stream_event};
use chatwire_transport::Subscription;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One decoded stream event.
pub type StreamEvent = Result<IncomingMessage, MalformedEvent>;

/// Receiving end of a reactor registration.
pub type MessageReceiver = mpsc::UnboundedReceiver<StreamEvent>;

type ReactorList = Arc<Mutex<Vec<mpsc::UnboundedSender<StreamEvent>>>>;

/// A live message-stream subscription, shared by every reactor.
#[derive(Debug)]
pub struct MessageStream {
    id: SubscriptionId,
    name: String,
    reactors: ReactorList,
    pump: JoinHandle<()>,
}

impl MessageStream {
    /// Takes ownership of `subscription` and starts pumping its events.
    pub(crate) fn start(subscription: Subscription) -> Arc<Self> {
        let Subscription { id, name, events } = subscription;
        let reactors: ReactorList = Arc::new(Mutex::new(Vec::new()));
        let pump = tokio::spawn(pump(events, Arc::clone(&reactors), id.clone()));

        Arc::new(Self {
            id,
            name,
            reactors,
            pump,
        })
    }

    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a new reactor. It sees every event from now on.
    pub fn react(&self) -> MessageReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.reactors).push(tx);
        rx
    }

    /// False once the pump has ended, which happens when the transport
    /// drops the subscription (a closed connection, for one).
    pub fn is_live(&self) -> bool {
        !self.pump.is_finished()
    }

    pub fn reactor_count(&self) -> usize {
        lock(&self.reactors).len()
    }

    /// Stops the pump and closes every reactor's channel.
    pub(crate) fn stop(&self) {
        self.pump.abort();
        lock(&self.reactors).clear();
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn pump(
    mut events: mpsc::UnboundedReceiver<Value>,
    reactors: ReactorList,
    id: SubscriptionId,
) {
    while let Some(fields) = events.recv().await {
        let event = decode_stream_event(&fields);
        if let Err(e) = &event {
            tracing::warn!(subscription = %id, error = %e, "malformed message event");
        }

        lock(&reactors).retain(|reactor| reactor.send(event.clone()).is_ok());
    }

    tracing::debug!(subscription = %id, "message stream ended");
    lock(&reactors).clear();
}

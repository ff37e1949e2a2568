use std::{
    pin::Pin,
    sync::{Arc, Weak},
    task::{Context, Poll},
};

use futures_util::Stream;
use log::debug;
use parking_lot::Mutex;
use tokio::sync::mpsc::{channel, error::TrySendError, Receiver, Sender};

use crate::{events::PresencePayload, util::Id};

pub type ObserverId = Id<Observer>;

/// The send side of one registered observer
#[derive(Debug)]
pub struct Observer {
    id: ObserverId,
    sender: Sender<PresencePayload>,
}

/// Delivers every presence notification to all currently registered
/// observers. Sends never block: an observer whose buffer has filled up is
/// evicted and simply misses events until it reconnects.
pub struct Fanout {
    me: Weak<Fanout>,
    observers: Mutex<Vec<Observer>>,
    /// Undelivered notifications an observer may accumulate before eviction
    buffer: usize,
}

/// The receive side handed to the transport layer. Dropping it unregisters
/// the observer.
pub struct ObserverHandle {
    id: ObserverId,
    receiver: Receiver<PresencePayload>,
    fanout: Weak<Fanout>,
}

impl Fanout {
    pub fn new(buffer: usize) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            observers: Default::default(),
            buffer,
        })
    }

    /// Registers a new observer and greets it with the given initial payload
    pub fn register(&self, initial: PresencePayload) -> ObserverHandle {
        let (sender, receiver) = channel(self.buffer);

        let observer = Observer {
            id: ObserverId::new(),
            sender,
        };

        let handle = ObserverHandle {
            id: observer.id,
            receiver,
            fanout: self.me.clone(),
        };

        // The buffer is freshly created, so this cannot fail
        let _ = observer.sender.try_send(initial);
        self.observers.lock().push(observer);

        handle
    }

    /// Hands the payload to every observer. A failed send evicts that
    /// observer without affecting the others.
    pub fn publish(&self, payload: &PresencePayload) {
        let mut observers = self.observers.lock();

        observers.retain(|observer| match observer.sender.try_send(payload.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Evicting observer {} for not keeping up", observer.id);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    fn unregister(&self, id: ObserverId) {
        self.observers.lock().retain(|observer| observer.id != id)
    }
}

impl ObserverHandle {
    /// Waits for the next notification. Returns [None] once the observer has
    /// been evicted.
    pub async fn next_payload(&mut self) -> Option<PresencePayload> {
        self.receiver.recv().await
    }

    /// Returns an already-delivered notification, if one is waiting
    pub fn try_next_payload(&mut self) -> Option<PresencePayload> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for ObserverHandle {
    type Item = PresencePayload;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        if let Some(fanout) = self.fanout.upgrade() {
            fanout.unregister(self.id)
        }
    }
}

//! Hand-off of database snapshots to the persistence hook.
//!
//! Writes capture a snapshot while they hold the database lock and queue it here.
//! One background task per client drains the queue in order, so the hook sees
//! snapshots in mutation order while write callers never wait for it.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{
    mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    oneshot,
};
use tracing::{trace, warn};

use docmock_core::persist::{DatabaseSnapshot, Persistence};

#[derive(Debug)]
enum Message {
    Snapshot(DatabaseSnapshot),
    Flush(oneshot::Sender<()>),
}

/// Ordered queue in front of a [`Persistence`] hook.
///
/// The drain task is spawned on first use, so the queue can be built outside a
/// runtime. It stops once the queue is dropped.
#[derive(Debug)]
pub(crate) struct Persister {
    sender: UnboundedSender<Message>,
    pending: Mutex<Option<(UnboundedReceiver<Message>, Arc<dyn Persistence>)>>,
}

impl Persister {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        let (sender, receiver) = unbounded_channel();
        Self { sender, pending: Mutex::new(Some((receiver, persistence))) }
    }

    /// Queues a snapshot without waiting for the hook.
    pub fn push(&self, snapshot: DatabaseSnapshot) {
        self.ensure_started();
        trace!(target: "docmock::persist", database = %snapshot.name, "Queue snapshot");

        if self.sender.send(Message::Snapshot(snapshot)).is_err() {
            warn!(target: "docmock::persist", "Persistence task has stopped, snapshot dropped");
        }
    }

    /// Waits until every snapshot queued so far was handed to the hook.
    pub async fn flush(&self) {
        self.ensure_started();

        let (done, flushed) = oneshot::channel();
        if self.sender.send(Message::Flush(done)).is_ok() {
            let _ = flushed.await;
        }
    }

    fn ensure_started(&self) {
        if let Some((receiver, persistence)) = self.pending.lock().take() {
            tokio::spawn(drain(receiver, persistence));
        }
    }
}

async fn drain(mut receiver: UnboundedReceiver<Message>, persistence: Arc<dyn Persistence>) {
    while let Some(message) = receiver.recv().await {
        match message {
            Message::Snapshot(snapshot) => {
                let database = snapshot.name.clone();
                if let Err(err) = persistence.persist(snapshot).await {
                    warn!(target: "docmock::persist", database = %database, error = %err, "Failed to persist database");
                }
            }
            Message::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmock_core::persist::{CollectionSnapshot, MemoryPersistence};

    #[tokio::test]
    async fn snapshots_reach_the_hook_in_queue_order() {
        let persistence = Arc::new(MemoryPersistence::default());
        let persister = Persister::new(persistence.clone());

        for n in 0..3 {
            let mut snapshot = DatabaseSnapshot { name: "db".into(), ..Default::default() };
            snapshot.collections.push(CollectionSnapshot {
                name: format!("c{n}"),
                documents: Vec::new(),
            });
            persister.push(snapshot);
        }
        persister.flush().await;

        let latest = persistence.latest("db").unwrap();
        assert_eq!(latest.collections[0].name, "c2");
    }
}

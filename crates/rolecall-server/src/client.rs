use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rolecall_core::ClientId;
use tokio::sync::mpsc;

/// A connected WebSocket client: its outbound queue and liveness.
pub struct Client {
    pub id: ClientId,
    tx: mpsc::Sender<String>,
    last_activity: AtomicU64,
}

impl Client {
    fn new(id: ClientId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            tx,
            last_activity: AtomicU64::new(now_secs()),
        }
    }

    pub fn touch(&self) {
        self.last_activity.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_idle(&self, timeout: Duration) -> bool {
        let last = self.last_activity.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) >= timeout.as_secs()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Result of queueing one outbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    /// Queue full; message dropped.
    Full,
    /// Client gone (disconnected or never existed).
    Gone,
}

/// Registry of all connected WebSocket clients, keyed by transport id.
pub struct ClientRegistry {
    clients: DashMap<ClientId, Client>,
    max_send_queue: usize,
}

impl ClientRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            clients: DashMap::new(),
            max_send_queue: max_send_queue.max(1),
        }
    }

    /// Register a new client and return its ID + outbound receiver.
    pub fn register(&self) -> (ClientId, mpsc::Receiver<String>) {
        let id = ClientId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        self.clients.insert(id.clone(), Client::new(id.clone(), tx));
        (id, rx)
    }

    /// Remove a client. Dropping its sender ends the writer task.
    pub fn unregister(&self, id: &ClientId) -> bool {
        self.clients.remove(id).is_some()
    }

    pub fn contains(&self, id: &ClientId) -> bool {
        self.clients.contains_key(id)
    }

    pub fn touch(&self, id: &ClientId) {
        if let Some(client) = self.clients.get(id) {
            client.touch();
        }
    }

    /// Queue a message for a client without waiting.
    pub fn send_to(&self, client_id: &ClientId, message: String) -> SendOutcome {
        let Some(client) = self.clients.get(client_id) else {
            return SendOutcome::Gone;
        };
        match client.tx.try_send(message) {
            Ok(()) => SendOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(
                    client_id = %client_id,
                    msg_len = msg.len(),
                    "Send queue full, dropping message"
                );
                SendOutcome::Full
            }
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Gone,
        }
    }

    /// Number of connected clients.
    pub fn count(&self) -> usize {
        self.clients.len()
    }

    /// Remove clients that have been silent for at least `timeout`.
    pub fn evict_idle(&self, timeout: Duration) -> Vec<ClientId> {
        let idle: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|entry| entry.value().is_idle(timeout))
            .map(|entry| entry.key().clone())
            .collect();

        for id in &idle {
            self.unregister(id);
            tracing::info!(client_id = %id, "Evicted idle client");
        }
        idle
    }

    #[cfg(test)]
    fn backdate(&self, id: &ClientId, secs: u64) {
        if let Some(client) = self.clients.get(id) {
            client
                .last_activity
                .store(now_secs().saturating_sub(secs), Ordering::Relaxed);
        }
    }
}

/// Start a background task that periodically evicts idle clients.
pub fn start_sweep_task(
    registry: Arc<ClientRegistry>,
    timeout: Duration,
    interval: Duration,
    on_evict: impl Fn(usize) + Send + 'static,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let evicted = registry.evict_idle(timeout);
            if !evicted.is_empty() {
                tracing::info!(evicted = evicted.len(), "Idle client sweep");
                on_evict(evicted.len());
            }
        }
    })
}

//! Message Bus — in-process routing between named pipeline participants.
//!
//! Features:
//!   - FIFO delivery loop on a background task (`start` / `stop`)
//!   - Direct, broadcast (`*`) and agent delivery
//!   - Agents run on their own tasks; their answers come back as replies
//!   - Failing deliveries become error envelopes routed to the sender
//!   - `wait_for` / `expect`: one-shot subscriptions removed on drop
//!   - Bounded message history for diagnostics
//!
//! `send` never suspends. Locks guarding the subscriber table and history
//! are never held across an await point.

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agents::{Agent, AgentStats};
use crate::models::{AgentMessage, MessageKind, BROADCAST};

/// Sender name used for envelopes the bus produces itself.
pub const BUS_SENDER: &str = "message_bus";

pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Delivery callback. Returning `Err` (or panicking) makes the bus route an
/// error envelope back to the message's sender.
pub type MessageCallback = Arc<dyn Fn(&AgentMessage) -> Result<(), String> + Send + Sync>;

/// Identifies one subscription under a participant name.
pub type SubscriptionId = u64;

/// Filter over envelopes, used by `history` and `expect`.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub recipient: Option<String>,
    pub sender: Option<String>,
    pub kind: Option<MessageKind>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
}

impl MessageFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn kind(mut self, kind: MessageKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to = Some(message_id.into());
        self
    }

    pub fn matches(&self, message: &AgentMessage) -> bool {
        if let Some(ref recipient) = self.recipient {
            if &message.recipient != recipient {
                return false;
            }
        }
        if let Some(ref sender) = self.sender {
            if &message.sender != sender {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if message.kind != kind {
                return false;
            }
        }
        if let Some(ref correlation_id) = self.correlation_id {
            if &message.correlation_id != correlation_id {
                return false;
            }
        }
        if let Some(ref reply_to) = self.reply_to {
            if message.reply_to.as_ref() != Some(reply_to) {
                return false;
            }
        }
        true
    }
}

struct Subscriber {
    id: SubscriptionId,
    callback: MessageCallback,
}

struct MessageBusInner {
    subscribers: HashMap<String, Vec<Subscriber>>,
    agents: HashMap<String, Arc<dyn Agent>>,
    agent_stats: HashMap<String, AgentStats>,
    history: VecDeque<AgentMessage>,
    history_limit: usize,
    next_subscription_id: SubscriptionId,
}

struct Worker {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

struct Shared {
    state: RwLock<MessageBusInner>,
    queue_tx: mpsc::UnboundedSender<AgentMessage>,
    queue_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<AgentMessage>>,
    worker: Mutex<Option<Worker>>,
}

/// Thread-safe message bus. Cloning yields another handle to the same bus.
#[derive(Clone)]
pub struct MessageBus {
    shared: Arc<Shared>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(MessageBusInner {
                    subscribers: HashMap::new(),
                    agents: HashMap::new(),
                    agent_stats: HashMap::new(),
                    history: VecDeque::new(),
                    history_limit: history_limit.max(1),
                    next_subscription_id: 1,
                }),
                queue_tx,
                queue_rx: tokio::sync::Mutex::new(queue_rx),
                worker: Mutex::new(None),
            }),
        }
    }

    // ─── Registration ───────────────────────────────────────────────────

    /// Register an agent under `name`. The last registration wins.
    pub fn register(&self, name: &str, agent: Arc<dyn Agent>) {
        let replaced = self
            .shared
            .write()
            .agents
            .insert(name.to_string(), agent)
            .is_some();
        if replaced {
            tracing::info!("[MessageBus] Replaced agent: {}", name);
        } else {
            tracing::info!("[MessageBus] Registered agent: {}", name);
        }
    }

    pub fn has_agent(&self, name: &str) -> bool {
        self.shared.read().agents.contains_key(name)
    }

    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.read().agents.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn agent_stats(&self, name: &str) -> Option<AgentStats> {
        self.shared.read().agent_stats.get(name).cloned()
    }

    /// Add a delivery callback for messages addressed to `name`.
    pub fn subscribe<F>(&self, name: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&AgentMessage) -> Result<(), String> + Send + Sync + 'static,
    {
        let mut inner = self.shared.write();
        let id = inner.next_subscription_id;
        inner.next_subscription_id += 1;
        inner
            .subscribers
            .entry(name.to_string())
            .or_default()
            .push(Subscriber {
                id,
                callback: Arc::new(callback),
            });
        tracing::debug!("[MessageBus] {} subscribed (subscription {})", name, id);
        id
    }

    /// Remove one subscription. Returns whether it existed.
    pub fn unsubscribe(&self, name: &str, id: SubscriptionId) -> bool {
        let mut inner = self.shared.write();
        let Some(subs) = inner.subscribers.get_mut(name) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|s| s.id != id);
        let removed = subs.len() != before;
        if subs.is_empty() {
            inner.subscribers.remove(name);
        }
        removed
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.shared
            .read()
            .subscribers
            .get(name)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    // ─── Publish ────────────────────────────────────────────────────────

    /// Enqueue a message for asynchronous delivery.
    pub fn send(&self, message: AgentMessage) {
        self.shared.enqueue(message);
    }

    /// Deliver a message to every subscriber except its sender.
    pub fn broadcast(&self, mut message: AgentMessage) {
        message.recipient = BROADCAST.to_string();
        self.shared.enqueue(message);
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────

    /// Start the delivery loop. Calling it while running is a no-op.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut worker = self.shared.lock_worker();
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return;
        }

        let shutdown = CancellationToken::new();
        let shared = self.shared.clone();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move { shared.run(token).await });
        *worker = Some(Worker { shutdown, handle });
        tracing::info!("[MessageBus] Started");
    }

    /// Stop the delivery loop.
    ///
    /// Agent tasks already spawned keep running; messages still queued are
    /// discarded.
    pub async fn stop(&self) {
        let worker = self.shared.lock_worker().take();
        let Some(worker) = worker else {
            return;
        };

        worker.shutdown.cancel();
        if let Err(e) = worker.handle.await {
            tracing::error!("[MessageBus] Delivery loop ended abnormally: {}", e);
        }

        let mut rx = self.shared.queue_rx.lock().await;
        let mut abandoned = 0usize;
        while rx.try_recv().is_ok() {
            abandoned += 1;
        }
        if abandoned > 0 {
            tracing::warn!("[MessageBus] Abandoned {} undelivered message(s)", abandoned);
        }
        tracing::info!("[MessageBus] Stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared
            .lock_worker()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    // ─── Waiting ────────────────────────────────────────────────────────

    /// Wait for a message addressed to `recipient` that matches the optional
    /// kind and correlation id. Returns `None` once `timeout` elapses.
    pub async fn wait_for(
        &self,
        recipient: &str,
        kind: Option<MessageKind>,
        correlation_id: Option<&str>,
        timeout: Duration,
    ) -> Option<AgentMessage> {
        let filter = MessageFilter {
            kind,
            correlation_id: correlation_id.map(str::to_string),
            ..Default::default()
        };
        self.expect(recipient, filter).wait(timeout).await
    }

    /// Register interest in a message before triggering it.
    ///
    /// The returned [`PendingReply`] holds a one-shot subscription under
    /// `recipient`; it is removed when the reply resolves, times out, or is
    /// dropped.
    pub fn expect(&self, recipient: &str, filter: MessageFilter) -> PendingReply {
        let filter = filter.recipient(recipient);
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let token = CancellationToken::new();
        let matched = token.clone();

        let subscription_id = self.subscribe(recipient, move |message| {
            if matched.is_cancelled() || !filter.matches(message) {
                return Ok(());
            }
            let sender = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(tx) = sender {
                matched.cancel();
                let _ = tx.send(message.clone());
            }
            Ok(())
        });

        PendingReply {
            bus: self.clone(),
            recipient: recipient.to_string(),
            subscription_id,
            token,
            rx,
        }
    }

    // ─── History ────────────────────────────────────────────────────────

    /// Most recent messages matching `filter`, newest last.
    pub fn history(&self, filter: &MessageFilter, limit: usize) -> Vec<AgentMessage> {
        let inner = self.shared.read();
        let matching: Vec<&AgentMessage> =
            inner.history.iter().filter(|m| filter.matches(m)).collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).cloned().collect()
    }

    pub fn clear_history(&self) {
        self.shared.write().history.clear();
        tracing::info!("[MessageBus] Message history cleared");
    }
}

/// A pending one-shot wait created by [`MessageBus::expect`].
pub struct PendingReply {
    bus: MessageBus,
    recipient: String,
    subscription_id: SubscriptionId,
    token: CancellationToken,
    rx: oneshot::Receiver<AgentMessage>,
}

impl PendingReply {
    /// Resolve with the matching message, or `None` after `timeout`.
    pub async fn wait(mut self, timeout: Duration) -> Option<AgentMessage> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(message)) => Some(message),
            Ok(Err(_)) => None,
            Err(_) => {
                tracing::warn!(
                    "[MessageBus] Timeout waiting for message to {}",
                    self.recipient
                );
                None
            }
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.token.cancel();
        self.bus.unsubscribe(&self.recipient, self.subscription_id);
    }
}

// ─── Delivery ───────────────────────────────────────────────────────────

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, MessageBusInner> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MessageBusInner> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_worker(&self) -> std::sync::MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(&self, message: AgentMessage) {
        tracing::debug!(
            sender = %message.sender,
            recipient = %message.recipient,
            kind = %message.kind,
            correlation_id = %message.correlation_id,
            "[MessageBus] message_sent"
        );

        {
            let mut inner = self.write();
            if inner.history.len() >= inner.history_limit {
                inner.history.pop_front();
            }
            inner.history.push_back(message.clone());
        }

        // The receiver lives as long as `Shared`, so this only fails during teardown.
        if self.queue_tx.send(message).is_err() {
            tracing::warn!("[MessageBus] Queue closed, message dropped");
        }
    }

    async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut rx = self.queue_rx.lock().await;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = rx.recv() => match next {
                    Some(message) => self.dispatch(message),
                    None => break,
                },
            }
        }
    }

    fn dispatch(self: &Arc<Self>, message: AgentMessage) {
        let (callbacks, agent) = {
            let inner = self.read();
            if message.is_broadcast() {
                let callbacks: Vec<MessageCallback> = inner
                    .subscribers
                    .iter()
                    .filter(|(name, _)| **name != message.sender)
                    .flat_map(|(_, subs)| subs.iter().map(|s| s.callback.clone()))
                    .collect();
                (callbacks, None)
            } else {
                let callbacks: Vec<MessageCallback> = inner
                    .subscribers
                    .get(&message.recipient)
                    .map(|subs| subs.iter().map(|s| s.callback.clone()).collect())
                    .unwrap_or_default();
                // Agents only take requests; error envelopes go to subscribers.
                let agent = match message.kind {
                    MessageKind::Error => None,
                    _ => inner.agents.get(&message.recipient).cloned(),
                };
                (callbacks, agent)
            }
        };

        if callbacks.is_empty() && agent.is_none() {
            tracing::warn!(
                "[MessageBus] No subscriber found for recipient: {}",
                message.recipient
            );
            if !message.is_broadcast() {
                let error = format!("No subscriber found for recipient: {}", message.recipient);
                self.report_failure(&message, error);
            }
            return;
        }

        for callback in callbacks {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(&message)))
                .unwrap_or_else(|_| Err("subscriber panicked".to_string()));
            if let Err(e) = outcome {
                tracing::error!(
                    "[MessageBus] Error delivering message to {}: {}",
                    message.recipient,
                    e
                );
                self.report_failure(&message, e);
            }
        }

        if let Some(agent) = agent {
            self.spawn_agent(agent, message);
        }
    }

    /// Run an agent on its own task and route its answer back to the sender.
    fn spawn_agent(self: &Arc<Self>, agent: Arc<dyn Agent>, message: AgentMessage) {
        let shared = self.clone();
        tokio::spawn(async move {
            let name = message.recipient.clone();
            let input = message.payload.clone();
            let started = Instant::now();

            // Nested task so a panicking agent surfaces as a JoinError.
            let outcome = tokio::spawn(async move { agent.process(input).await }).await;
            let elapsed = started.elapsed();

            match outcome {
                Ok(Ok(response)) => {
                    shared.record_stats(&name, response.success, elapsed);
                    match serde_json::to_value(&response) {
                        Ok(payload) => {
                            let reply = message.reply(&name, message.kind.reply_kind(), payload);
                            shared.enqueue(reply);
                        }
                        Err(e) => shared.report_failure(&message, e.to_string()),
                    }
                }
                Ok(Err(e)) => {
                    shared.record_stats(&name, false, elapsed);
                    tracing::error!("[MessageBus] Agent {} failed: {}", name, e);
                    shared.report_failure(&message, e);
                }
                Err(e) => {
                    shared.record_stats(&name, false, elapsed);
                    tracing::error!("[MessageBus] Agent {} task aborted: {}", name, e);
                    shared.report_failure(&message, format!("agent task aborted: {}", e));
                }
            }
        });
    }

    fn record_stats(&self, name: &str, success: bool, elapsed: Duration) {
        self.write()
            .agent_stats
            .entry(name.to_string())
            .or_default()
            .record(success, elapsed);
    }

    /// Route an error envelope back to the sender of a failed delivery.
    ///
    /// Failures of error envelopes themselves are only logged.
    fn report_failure(&self, original: &AgentMessage, error: String) {
        if original.sender == BUS_SENDER || original.kind == MessageKind::Error {
            tracing::warn!(
                "[MessageBus] Dropping failure for error message {}: {}",
                original.id,
                error
            );
            return;
        }

        let original_value = serde_json::to_value(original).unwrap_or(serde_json::Value::Null);
        let envelope = original
            .reply(
                BUS_SENDER,
                MessageKind::Error,
                json!({
                    "error": error,
                    "agent": original.recipient,
                    "originalMessage": original_value,
                }),
            );
        self.enqueue(envelope);
    }
}

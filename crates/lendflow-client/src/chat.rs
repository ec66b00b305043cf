use std::sync::{Arc, Mutex};

use futures::StreamExt;
use lendflow_types::{ChatEvent, ChatRequest, NewMessage, SessionSummary};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::compose::annotate_with_document;
use crate::context::{ContextStore, SessionContext};
use crate::directory::DirectoryClient;
use crate::error::Result;
use crate::reducer::{ConversationReducer, Effect};
use crate::sse::SseTransport;
use crate::ws::{ReconnectPolicy, WsSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Sse,
    WebSocket,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub transport: TransportKind,
    pub reconnect: ReconnectPolicy,
    /// Save finalized messages to the server's Session Directory
    pub persist: bool,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            transport: TransportKind::Sse,
            reconnect: ReconnectPolicy::default(),
            persist: true,
        }
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }
}

enum Transport {
    Sse(SseTransport),
    WebSocket(WsSession),
}

/// How a streamed turn ended
enum TurnOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// Cancels whichever turn is currently streaming
#[derive(Clone, Default)]
pub struct TurnCanceller {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl TurnCanceller {
    /// Cancel the streaming turn; returns false when no turn is in flight
    pub fn cancel(&self) -> bool {
        match self.current.lock() {
            Ok(current) => match current.as_ref() {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    pub fn is_turn_active(&self) -> bool {
        self.current
            .lock()
            .map(|current| current.is_some())
            .unwrap_or(false)
    }

    fn next_turn(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Ok(mut current) = self.current.lock() {
            *current = Some(token.clone());
        }
        token
    }

    fn end_turn(&self) {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
    }
}

enum PersistJob {
    Append {
        session_id: String,
        message: NewMessage,
    },
    Flush(oneshot::Sender<()>),
}

/// Single writer for Session Directory appends, so rows land in the order
/// the reducer produced them
struct PersistQueue {
    directory: DirectoryClient,
    jobs: Option<mpsc::UnboundedSender<PersistJob>>,
}

impl PersistQueue {
    fn new(directory: DirectoryClient) -> Self {
        Self {
            directory,
            jobs: None,
        }
    }

    fn sender(&mut self) -> &mpsc::UnboundedSender<PersistJob> {
        let directory = &self.directory;
        self.jobs.get_or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(run_persist_worker(directory.clone(), rx));
            tx
        })
    }

    /// Failures are logged by the worker, never retried
    fn enqueue(&mut self, session_id: &str, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Persist(message) => {
                    let job = PersistJob::Append {
                        session_id: session_id.to_string(),
                        message,
                    };
                    if self.sender().send(job).is_err() {
                        tracing::warn!(session_id, "Persistence worker stopped; message dropped");
                    }
                }
            }
        }
    }

    async fn flush(&mut self) {
        let Some(jobs) = &self.jobs else {
            return;
        };
        let (done_tx, done_rx) = oneshot::channel();
        if jobs.send(PersistJob::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn run_persist_worker(
    directory: DirectoryClient,
    mut jobs: mpsc::UnboundedReceiver<PersistJob>,
) {
    while let Some(job) = jobs.recv().await {
        match job {
            PersistJob::Append {
                session_id,
                message,
            } => {
                if let Err(e) = directory.append_message(&session_id, &message).await {
                    tracing::warn!(session_id = %session_id, "Failed to persist message: {}", e);
                }
            }
            PersistJob::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

/// Drives turns end to end: submit, stream, reduce, persist
pub struct ChatClient {
    config: ClientConfig,
    transport: Transport,
    reducer: ConversationReducer,
    directory: Option<DirectoryClient>,
    persistence: Option<PersistQueue>,
    context: SessionContext,
    context_store: Arc<dyn ContextStore>,
    canceller: TurnCanceller,
    pending_document: Option<(String, String)>,
}

impl ChatClient {
    pub fn new(
        config: ClientConfig,
        context: SessionContext,
        context_store: Arc<dyn ContextStore>,
    ) -> Result<Self> {
        let transport = build_transport(&config, &context.session_id)?;
        let directory = config
            .persist
            .then(|| DirectoryClient::new(config.base_url.clone()));
        let persistence = directory.clone().map(PersistQueue::new);

        let client = Self {
            reducer: ConversationReducer::new(context.session_id.clone()),
            config,
            transport,
            directory,
            persistence,
            context,
            context_store,
            canceller: TurnCanceller::default(),
            pending_document: None,
        };
        client.save_context();
        Ok(client)
    }

    pub fn reducer(&self) -> &ConversationReducer {
        &self.reducer
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn canceller(&self) -> TurnCanceller {
        self.canceller.clone()
    }

    /// Attach an OCR summary to the next outgoing message
    pub fn attach_document(&mut self, label: impl Into<String>, summary: impl Into<String>) {
        self.pending_document = Some((label.into(), summary.into()));
    }

    /// Run one turn, calling `on_event` after each event is applied
    ///
    /// Transport failures end the turn with an inline error message rather
    /// than an `Err`; only a rejected submission is returned as an error.
    /// Once the turn is cancelled no further event reaches the reducer.
    pub async fn send<F>(&mut self, text: &str, mut on_event: F) -> Result<()>
    where
        F: FnMut(&ConversationReducer, &ChatEvent),
    {
        let message = match &self.pending_document {
            Some((label, summary)) => annotate_with_document(text, label, summary),
            None => text.to_string(),
        };

        let effects = self.reducer.submit_user(&message)?;
        self.pending_document = None;
        self.enqueue_effects(effects);

        let request = ChatRequest {
            message,
            session_id: Some(self.context.session_id.clone()),
            customer_id: self.context.customer_id.clone(),
            customer_name: self.context.customer_name.clone(),
        };

        let cancel = self.canceller.next_turn();
        let outcome = self.stream_turn(&request, &cancel, &mut on_event).await;
        self.canceller.end_turn();

        match outcome {
            TurnOutcome::Completed => {}
            TurnOutcome::Cancelled => {
                tracing::info!(session_id = %self.context.session_id, "Turn cancelled");
                self.reducer.abort_turn();
            }
            TurnOutcome::Failed(reason) => self.reducer.transport_failed(&reason),
        }
        Ok(())
    }

    async fn stream_turn<F>(
        &mut self,
        request: &ChatRequest,
        cancel: &CancellationToken,
        on_event: &mut F,
    ) -> TurnOutcome
    where
        F: FnMut(&ConversationReducer, &ChatEvent),
    {
        match &mut self.transport {
            Transport::Sse(sse) => {
                let mut events = sse.stream_turn(request, cancel.clone());
                while let Some(item) = events.next().await {
                    if cancel.is_cancelled() {
                        return TurnOutcome::Cancelled;
                    }
                    match item {
                        Ok(event) => {
                            let terminal = event.is_terminal();
                            let effects = self.reducer.apply(event.clone());
                            on_event(&self.reducer, &event);
                            if let Some(queue) = self.persistence.as_mut() {
                                queue.enqueue(&self.context.session_id, effects);
                            }
                            if terminal {
                                return TurnOutcome::Completed;
                            }
                        }
                        Err(e) => return TurnOutcome::Failed(e.to_string()),
                    }
                }
            }
            Transport::WebSocket(ws) => {
                if let Err(e) = ws.send_turn(request).await {
                    return TurnOutcome::Failed(e.to_string());
                }
                loop {
                    let next = tokio::select! {
                        _ = cancel.cancelled() => None,
                        next = ws.next_event() => Some(next),
                    };
                    // No per-turn cancel on the socket: tear the connection down
                    let Some(next) = next.filter(|_| !cancel.is_cancelled()) else {
                        ws.close().await;
                        return TurnOutcome::Cancelled;
                    };
                    match next {
                        Ok(event) => {
                            let terminal = event.is_terminal();
                            let effects = self.reducer.apply(event.clone());
                            on_event(&self.reducer, &event);
                            if let Some(queue) = self.persistence.as_mut() {
                                queue.enqueue(&self.context.session_id, effects);
                            }
                            if terminal {
                                return TurnOutcome::Completed;
                            }
                        }
                        Err(e) => return TurnOutcome::Failed(e.to_string()),
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            TurnOutcome::Cancelled
        } else {
            TurnOutcome::Failed("Stream ended before the turn completed".to_string())
        }
    }

    /// Wait until every queued persistence write has been attempted
    pub async fn flush(&mut self) {
        if let Some(queue) = self.persistence.as_mut() {
            queue.flush().await;
        }
    }

    /// Start an empty session and make it current
    pub async fn new_session(&mut self) -> Result<String> {
        let session_id = self.context.start_new_session();
        self.switch_transport().await?;
        self.reducer.reset(session_id.clone());
        self.save_context();
        Ok(session_id)
    }

    /// Make a stored session current and hydrate its history
    pub async fn open_session(&mut self, session_id: &str) -> Result<()> {
        self.context.switch_to(session_id);
        self.switch_transport().await?;
        self.reducer.reset(session_id);

        if let Some(directory) = &self.directory {
            match directory.get_session(session_id).await? {
                Some(detail) => self.reducer.hydrate(detail),
                None => tracing::debug!(session_id, "Session not stored yet"),
            }
        }
        self.save_context();
        Ok(())
    }

    /// Sessions visible to the current user
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let Some(directory) = &self.directory else {
            return Ok(Vec::new());
        };
        match &self.context.customer_id {
            Some(customer_id) => directory.list_sessions(Some(customer_id)).await,
            None => {
                directory
                    .list_sessions_by_ids(&self.context.known_sessions)
                    .await
            }
        }
    }

    /// Record a verified identity and claim this device's anonymous sessions
    pub async fn identify(
        &mut self,
        customer_id: &str,
        customer_name: Option<String>,
    ) -> Result<u64> {
        self.context.customer_id = Some(customer_id.to_string());
        self.context.customer_name = customer_name;
        self.save_context();

        match &self.directory {
            Some(directory) => {
                directory
                    .link_sessions(&self.context.known_sessions, customer_id)
                    .await
            }
            None => Ok(0),
        }
    }

    pub async fn shutdown(&mut self) {
        if let Transport::WebSocket(ws) = &mut self.transport {
            ws.close().await;
        }
        self.flush().await;
    }

    fn enqueue_effects(&mut self, effects: Vec<Effect>) {
        if let Some(queue) = self.persistence.as_mut() {
            queue.enqueue(&self.context.session_id, effects);
        }
    }

    async fn switch_transport(&mut self) -> Result<()> {
        if let Transport::WebSocket(ws) = &mut self.transport {
            ws.close().await;
            self.transport = build_transport(&self.config, &self.context.session_id)?;
        }
        Ok(())
    }

    fn save_context(&self) {
        if let Err(e) = self.context_store.save(&self.context) {
            tracing::warn!("Failed to save session context: {}", e);
        }
    }
}

fn build_transport(config: &ClientConfig, session_id: &str) -> Result<Transport> {
    Ok(match config.transport {
        TransportKind::Sse => Transport::Sse(SseTransport::new(config.base_url.clone())),
        TransportKind::WebSocket => Transport::WebSocket(WsSession::new(
            &config.base_url,
            session_id,
            config.reconnect.clone(),
        )?),
    })
}

use std::sync::Arc;
use std::time::Instant;

use lendflow_types::ChatEvent;
use tokio::sync::mpsc;
use tokio::task::JoinError;

use crate::agent::{LoanAgent, TurnInput};
use crate::hooks::{AgentSignal, ChannelHooks};
use crate::rules::{truncate_chars, CheckpointRules};

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Capacity of both the worker→bridge and bridge→transport channels
    pub channel_capacity: usize,
    /// Characters of tool output forwarded in `tool_complete.result`
    pub result_preview_chars: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
            result_preview_chars: 100,
        }
    }
}

impl ProducerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn with_result_preview_chars(mut self, chars: usize) -> Self {
        self.result_preview_chars = chars;
        self
    }
}

/// Runs one blocking agent turn per call and streams its progress as
/// protocol events.
///
/// Event order per turn: `ack`, then `content_start` (once, before the first
/// content or tool event), interleaved `content` / `tool_*` /
/// `agent_decision` / `sanction_letter`, then exactly one `done` or `error`.
pub struct StreamProducer {
    agent: Arc<dyn LoanAgent>,
    rules: Arc<CheckpointRules>,
    config: ProducerConfig,
}

impl StreamProducer {
    pub fn new(agent: Arc<dyn LoanAgent>) -> Self {
        Self {
            agent,
            rules: Arc::new(CheckpointRules::loan_defaults()),
            config: ProducerConfig::default(),
        }
    }

    pub fn with_rules(mut self, rules: CheckpointRules) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    pub fn with_config(mut self, config: ProducerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn agent_name(&self) -> &str {
        self.agent.name()
    }

    /// Spawn execution in background, return event receiver
    pub fn spawn_turn(&self, input: TurnInput) -> mpsc::Receiver<ChatEvent> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);

        let agent = Arc::clone(&self.agent);
        let rules = Arc::clone(&self.rules);
        let config = self.config.clone();

        tokio::spawn(async move {
            Self::drive_turn(input, tx, agent, rules, config).await;
        });

        rx
    }

    async fn drive_turn(
        input: TurnInput,
        event_tx: mpsc::Sender<ChatEvent>,
        agent: Arc<dyn LoanAgent>,
        rules: Arc<CheckpointRules>,
        config: ProducerConfig,
    ) {
        let start_time = Instant::now();
        let session_id = input.session_id.clone();

        if event_tx.send(ChatEvent::ack()).await.is_err() {
            tracing::debug!(session_id = %session_id, "Client gone before turn started");
            return;
        }

        let (signal_tx, mut signal_rx) = mpsc::channel::<AgentSignal>(config.channel_capacity);

        // The blocking call owns the only sender; its return closes the channel.
        let worker = tokio::task::spawn_blocking(move || {
            let mut hooks = ChannelHooks::new(signal_tx);
            agent.run(&input, &mut hooks)
        });

        let mut translator = TurnTranslator::new(rules, config.result_preview_chars);

        while let Some(signal) = signal_rx.recv().await {
            for event in translator.translate(signal) {
                if event_tx.send(event).await.is_err() {
                    tracing::warn!(
                        session_id = %session_id,
                        "Client disconnected mid-turn; agent call continues until it returns"
                    );
                    return;
                }
            }
        }

        let terminal = match worker.await {
            Ok(Ok(())) => translator.finish(),
            Ok(Err(e)) => {
                tracing::error!(session_id = %session_id, "Agent turn failed: {:#}", e);
                ChatEvent::error(e.to_string())
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, "Agent worker aborted: {}", e);
                ChatEvent::error(describe_join_error(&e))
            }
        };

        let outcome = terminal.kind();
        let _ = event_tx.send(terminal).await;

        tracing::info!(
            session_id = %session_id,
            outcome,
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Agent turn finished"
        );
    }
}

fn describe_join_error(e: &JoinError) -> String {
    if e.is_panic() {
        "Agent worker panicked".to_string()
    } else {
        "Agent worker was cancelled".to_string()
    }
}

/// Maps raw agent signals to protocol events for one turn
struct TurnTranslator {
    message_id: String,
    opened: bool,
    rules: Arc<CheckpointRules>,
    preview_chars: usize,
}

impl TurnTranslator {
    fn new(rules: Arc<CheckpointRules>, preview_chars: usize) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            opened: false,
            rules,
            preview_chars,
        }
    }

    fn translate(&mut self, signal: AgentSignal) -> Vec<ChatEvent> {
        if matches!(&signal, AgentSignal::Content { chunk } if chunk.is_empty()) {
            return Vec::new();
        }

        let mut events = Vec::with_capacity(2);
        if !self.opened {
            self.opened = true;
            events.push(ChatEvent::ContentStart {
                message_id: Some(self.message_id.clone()),
            });
        }

        match signal {
            AgentSignal::Content { chunk } => {
                events.push(ChatEvent::content(chunk));
            }
            AgentSignal::ToolStart { tool, agent } => {
                events.push(ChatEvent::tool_start(tool, agent));
            }
            AgentSignal::ToolComplete { tool, agent, result } => {
                let preview = truncate_chars(&result, self.preview_chars);
                let derived = self.rules.evaluate(&tool, agent.as_deref(), &result);
                events.push(ChatEvent::tool_complete(tool, agent, Some(preview)));
                events.extend(derived);
            }
        }

        events
            .into_iter()
            .map(|event| event.with_message_id(&self.message_id))
            .collect()
    }

    fn finish(&self) -> ChatEvent {
        ChatEvent::Done {
            message_id: self.opened.then(|| self.message_id.clone()),
        }
    }
}

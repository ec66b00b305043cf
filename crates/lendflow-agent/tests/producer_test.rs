//! End-to-end ordering tests for the blocking-agent bridge

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use lendflow_agent::{
    LoanAgent, ProducerConfig, RunHooks, ScriptStep, ScriptedAgent, StreamProducer, TurnInput,
};
use lendflow_types::ChatEvent;
use tokio::sync::mpsc;

async fn collect(mut rx: mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn kinds(events: &[ChatEvent]) -> Vec<&'static str> {
    events.iter().map(ChatEvent::kind).collect()
}

struct PanickingAgent;

impl LoanAgent for PanickingAgent {
    fn run(&self, _input: &TurnInput, hooks: &mut dyn RunHooks) -> Result<()> {
        hooks.on_content("about to");
        panic!("tool crashed");
    }
}

/// Records the prompt it was given and flags when the call returns
#[derive(Default)]
struct ObservingAgent {
    prompt: Mutex<Option<String>>,
    finished: Arc<AtomicBool>,
    chunks: usize,
}

impl LoanAgent for ObservingAgent {
    fn run(&self, input: &TurnInput, hooks: &mut dyn RunHooks) -> Result<()> {
        if let Ok(mut prompt) = self.prompt.lock() {
            *prompt = Some(input.prompt());
        }
        for i in 0..self.chunks {
            hooks.on_content(&format!("{i} "));
        }
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_demo_turn_is_ordered_and_terminated_once() {
    let producer = StreamProducer::new(Arc::new(ScriptedAgent::demo()));
    let events = collect(producer.spawn_turn(TurnInput::new("s1", "loan please"))).await;

    let kinds = kinds(&events);
    assert_eq!(kinds[0], "ack");
    assert_eq!(kinds[1], "content_start");
    assert_eq!(*kinds.last().unwrap(), "done");
    assert_eq!(kinds.iter().filter(|k| **k == "done" || **k == "error").count(), 1);
    assert_eq!(kinds.iter().filter(|k| **k == "content_start").count(), 1);

    let message_id = events[1].message_id().map(str::to_string);
    assert!(message_id.is_some());
    for event in &events[1..] {
        if let Some(id) = event.message_id() {
            assert_eq!(Some(id.to_string()), message_id);
        }
    }

    assert!(kinds.contains(&"agent_decision"));
    let sanction = kinds.iter().position(|k| *k == "sanction_letter").unwrap();
    let last_tool_complete = kinds.iter().rposition(|k| *k == "tool_complete").unwrap();
    assert!(sanction > last_tool_complete);

    let text: String = events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::Content { data, .. } => Some(data.as_str()),
            _ => None,
        })
        .collect();
    assert!(text.starts_with("Let me check your pre-approved offer."));
}

#[tokio::test]
async fn test_agent_failure_ends_with_error_not_done() {
    let agent = ScriptedAgent::new(vec![
        ScriptStep::Content("Checking".into()),
        ScriptStep::Fail("CRM unavailable".into()),
    ]);
    let producer = StreamProducer::new(Arc::new(agent));
    let events = collect(producer.spawn_turn(TurnInput::new("s1", "hi"))).await;

    assert_eq!(kinds(&events), vec!["ack", "content_start", "content", "error"]);
    assert_eq!(events[3], ChatEvent::error("CRM unavailable"));
}

#[tokio::test]
async fn test_panicking_agent_yields_error_event() {
    let producer = StreamProducer::new(Arc::new(PanickingAgent));
    let events = collect(producer.spawn_turn(TurnInput::new("s1", "hi"))).await;

    assert_eq!(events.first(), Some(&ChatEvent::ack()));
    assert_eq!(events.last(), Some(&ChatEvent::error("Agent worker panicked")));
    assert!(!kinds(&events).contains(&"done"));
}

#[tokio::test]
async fn test_silent_agent_emits_ack_then_done() {
    let producer = StreamProducer::new(Arc::new(ScriptedAgent::new(Vec::new())));
    let events = collect(producer.spawn_turn(TurnInput::new("s1", "hi"))).await;

    assert_eq!(events, vec![ChatEvent::ack(), ChatEvent::Done { message_id: None }]);
}

#[tokio::test]
async fn test_small_channel_applies_backpressure_without_loss() {
    let agent = ObservingAgent {
        chunks: 200,
        ..Default::default()
    };
    let producer = StreamProducer::new(Arc::new(agent))
        .with_config(ProducerConfig::new().with_channel_capacity(1));

    let events = collect(producer.spawn_turn(TurnInput::new("s1", "count"))).await;
    let contents = kinds(&events).iter().filter(|k| **k == "content").count();
    assert_eq!(contents, 200);
    assert_eq!(events.last().map(ChatEvent::kind), Some("done"));
}

#[tokio::test]
async fn test_dropped_consumer_lets_agent_finish() {
    let finished = Arc::new(AtomicBool::new(false));
    let agent = ObservingAgent {
        chunks: 500,
        finished: Arc::clone(&finished),
        ..Default::default()
    };
    let producer = StreamProducer::new(Arc::new(agent))
        .with_config(ProducerConfig::new().with_channel_capacity(2));

    let mut rx = producer.spawn_turn(TurnInput::new("s1", "bye"));
    assert_eq!(rx.recv().await, Some(ChatEvent::ack()));
    drop(rx);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !finished.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("agent call should run to completion after the consumer leaves");
}

#[tokio::test]
async fn test_customer_context_reaches_agent() {
    let agent = Arc::new(ObservingAgent::default());
    let producer = StreamProducer::new(Arc::clone(&agent) as Arc<dyn LoanAgent>);

    let input = TurnInput::new("s1", "what is my limit?")
        .with_customer(Some("CUST003".into()), Some("Amit Patel".into()));
    collect(producer.spawn_turn(input)).await;

    let prompt = agent.prompt.lock().unwrap().clone().unwrap();
    assert!(prompt.contains("ID: CUST003, Name: Amit Patel"));
    assert!(prompt.ends_with("Customer says: what is my limit?"));
}

use tokio::sync::mpsc;

use crate::agent::RunHooks;

/// Raw framework callback, before it is mapped onto the wire protocol
#[derive(Debug, Clone, PartialEq)]
pub enum AgentSignal {
    Content {
        chunk: String,
    },
    ToolStart {
        tool: String,
        agent: Option<String>,
    },
    ToolComplete {
        tool: String,
        agent: Option<String>,
        result: String,
    },
}

/// `RunHooks` that pushes every callback into a bounded channel
///
/// Runs on the blocking worker, so it uses `blocking_send`. Once the async
/// side hangs up, further callbacks are dropped and the agent runs to its
/// natural end.
pub struct ChannelHooks {
    tx: mpsc::Sender<AgentSignal>,
    closed: bool,
}

impl ChannelHooks {
    pub fn new(tx: mpsc::Sender<AgentSignal>) -> Self {
        Self { tx, closed: false }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn push(&mut self, signal: AgentSignal) {
        if self.closed {
            return;
        }
        if self.tx.blocking_send(signal).is_err() {
            tracing::debug!("Event consumer hung up; discarding remaining agent callbacks");
            self.closed = true;
        }
    }
}

impl RunHooks for ChannelHooks {
    fn on_content(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        self.push(AgentSignal::Content {
            chunk: chunk.to_string(),
        });
    }

    fn on_tool_start(&mut self, tool: &str, agent: Option<&str>) {
        self.push(AgentSignal::ToolStart {
            tool: tool.to_string(),
            agent: agent.map(str::to_string),
        });
    }

    fn on_tool_complete(&mut self, tool: &str, agent: Option<&str>, result: &str) {
        self.push(AgentSignal::ToolComplete {
            tool: tool.to_string(),
            agent: agent.map(str::to_string),
            result: result.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signals_arrive_in_callback_order() {
        let (tx, mut rx) = mpsc::channel(8);

        std::thread::spawn(move || {
            let mut hooks = ChannelHooks::new(tx);
            hooks.on_tool_start("calculate_emi", None);
            hooks.on_content("");
            hooks.on_content("Hi");
            hooks.on_tool_complete("calculate_emi", None, "{}");
        })
        .join()
        .unwrap();

        assert!(matches!(rx.try_recv().unwrap(), AgentSignal::ToolStart { .. }));
        assert_eq!(rx.try_recv().unwrap(), AgentSignal::Content { chunk: "Hi".into() });
        assert!(matches!(rx.try_recv().unwrap(), AgentSignal::ToolComplete { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_receiver_stops_pushing() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let closed = std::thread::spawn(move || {
            let mut hooks = ChannelHooks::new(tx);
            hooks.on_content("lost");
            hooks.on_content("also lost");
            hooks.is_closed()
        })
        .join()
        .unwrap();

        assert!(closed);
    }
}

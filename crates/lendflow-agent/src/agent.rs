use anyhow::Result;

use crate::context::build_context_message;

/// Customer identity supplied by the client for one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerContext {
    pub customer_id: String,
    pub customer_name: Option<String>,
}

/// Everything a single agent turn needs
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub session_id: String,
    pub message: String,
    pub customer: Option<CustomerContext>,
}

impl TurnInput {
    pub fn new(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            message: message.into(),
            customer: None,
        }
    }

    /// Attach customer identity; a name without an id is ignored
    pub fn with_customer(mut self, customer_id: Option<String>, customer_name: Option<String>) -> Self {
        self.customer = customer_id
            .filter(|id| !id.is_empty())
            .map(|customer_id| CustomerContext {
                customer_id,
                customer_name: customer_name.filter(|name| !name.is_empty()),
            });
        self
    }

    /// Text actually handed to the agent, with customer context injected
    pub fn prompt(&self) -> String {
        match &self.customer {
            Some(customer) => build_context_message(
                &self.message,
                Some(&customer.customer_id),
                customer.customer_name.as_deref(),
            ),
            None => self.message.clone(),
        }
    }
}

/// Callback surface the agent drives while it runs
///
/// Implementations must not block for long: they are called on the agent's
/// own worker thread between units of generation.
pub trait RunHooks: Send {
    /// A token or chunk of assistant text
    fn on_content(&mut self, chunk: &str);

    /// A tool (or delegated sub-agent tool) was entered
    fn on_tool_start(&mut self, tool: &str, agent: Option<&str>);

    /// A tool returned; `result` is the full, untruncated output
    fn on_tool_complete(&mut self, tool: &str, agent: Option<&str>, result: &str);
}

/// A multi-agent framework invoked as one blocking call per turn
pub trait LoanAgent: Send + Sync {
    /// Run one turn to completion, reporting progress through `hooks`
    fn run(&self, input: &TurnInput, hooks: &mut dyn RunHooks) -> Result<()>;

    fn name(&self) -> &str {
        "loan-agent"
    }
}

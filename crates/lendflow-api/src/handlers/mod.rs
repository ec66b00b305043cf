pub mod chat;
pub mod sse;
pub mod ws;

use lendflow_agent::TurnInput;
use lendflow_types::ChatEvent;

pub(crate) const MESSAGE_REQUIRED: &str = "Message is required";

/// Validated turn input, or the error event to send instead
pub(crate) fn turn_input(
    session_id: &str,
    message: &str,
    customer_id: Option<String>,
    customer_name: Option<String>,
) -> Result<TurnInput, ChatEvent> {
    if message.trim().is_empty() {
        return Err(ChatEvent::error(MESSAGE_REQUIRED));
    }
    Ok(TurnInput::new(session_id, message).with_customer(customer_id, customer_name))
}

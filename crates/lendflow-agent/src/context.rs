/// Prefix the customer's text with the identity the client already knows,
/// so the agents never ask for a customer id again.
pub fn build_context_message(
    message: &str,
    customer_id: Option<&str>,
    customer_name: Option<&str>,
) -> String {
    match (customer_id, customer_name) {
        (Some(id), Some(name)) => format!(
            "[SYSTEM CONTEXT: Customer identified - ID: {id}, Name: {name}. Do NOT ask for customer ID - you already have it. Use this ID for all tool calls.]\n\nCustomer says: {message}"
        ),
        (Some(id), None) => format!(
            "[SYSTEM CONTEXT: Customer identified - ID: {id}. Do NOT ask for customer ID - you already have it. Use this ID for all tool calls.]\n\nCustomer says: {message}"
        ),
        _ => message.to_string(),
    }
}

//! Domain checkpoints derived from tool results.
//!
//! The agent framework has no notion of "KYC verified" or "loan approved";
//! those are read off tool outputs by a small rules table that lives outside
//! the streaming bridge so the loan rules can change on their own.

use lendflow_types::ChatEvent;
use serde_json::Value;

/// Max characters of raw tool output copied into `details`
const DETAILS_MAX_CHARS: usize = 500;

/// How a rule recognizes a tool result
#[derive(Debug, Clone, PartialEq)]
pub enum ResultMatcher {
    /// Top-level JSON field equals the given value
    FieldEquals { field: String, value: Value },
    /// Top-level JSON field exists and is not null
    FieldPresent(String),
    /// Raw result text contains the keyword (non-JSON results)
    Contains(String),
}

impl ResultMatcher {
    pub fn field_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        ResultMatcher::FieldEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    fn matches(&self, parsed: &Value, raw: &str) -> bool {
        match self {
            ResultMatcher::FieldEquals { field, value } => parsed.get(field) == Some(value),
            ResultMatcher::FieldPresent(field) => {
                parsed.get(field).map_or(false, |v| !v.is_null())
            }
            ResultMatcher::Contains(keyword) => raw.contains(keyword.as_str()),
        }
    }
}

/// Maps one tool/result shape to a decision tag
#[derive(Clone)]
pub struct DecisionRule {
    pub tool: String,
    /// Reported agent when the tool event carries none
    pub default_agent: String,
    pub decision_type: String,
    pub matcher: ResultMatcher,
    pub summarize: fn(&Value) -> String,
}

impl DecisionRule {
    pub fn new(
        tool: impl Into<String>,
        default_agent: impl Into<String>,
        decision_type: impl Into<String>,
        matcher: ResultMatcher,
        summarize: fn(&Value) -> String,
    ) -> Self {
        Self {
            tool: tool.into(),
            default_agent: default_agent.into(),
            decision_type: decision_type.into(),
            matcher,
            summarize,
        }
    }
}

impl std::fmt::Debug for DecisionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionRule")
            .field("tool", &self.tool)
            .field("default_agent", &self.default_agent)
            .field("decision_type", &self.decision_type)
            .field("matcher", &self.matcher)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CheckpointRules {
    decisions: Vec<DecisionRule>,
    sanction_tool: Option<String>,
}

impl CheckpointRules {
    /// Empty table: no decisions, no sanction detection
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: DecisionRule) -> Self {
        self.decisions.push(rule);
        self
    }

    /// Tool whose `{pdf_url, letter_id}` result becomes a `sanction_letter`
    pub fn with_sanction_tool(mut self, tool: impl Into<String>) -> Self {
        self.sanction_tool = Some(tool.into());
        self
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty() && self.sanction_tool.is_none()
    }

    /// Rules for the personal-loan workflow tools
    pub fn loan_defaults() -> Self {
        let mut rules = Self::new().with_sanction_tool("generate_sanction_letter");

        for tool in ["fetch_kyc_from_crm", "get_customer_from_crm"] {
            rules = rules.with_rule(DecisionRule::new(
                tool,
                "Verification Agent",
                "kyc_verified",
                ResultMatcher::field_equals("kyc_verified", true),
                |v| format!("KYC verified for {}", field_text(v, "name")),
            ));
        }

        for tool in ["fetch_credit_score", "get_credit_score"] {
            rules = rules.with_rule(DecisionRule::new(
                tool,
                "Underwriting Agent",
                "credit_checked",
                ResultMatcher::FieldPresent("credit_score".to_string()),
                |v| format!("Credit score {} (range 300-900)", field_text(v, "credit_score")),
            ));
        }

        for tool in ["fetch_preapproved_offer", "get_pre_approved_offer"] {
            rules = rules.with_rule(DecisionRule::new(
                tool,
                "Sales Agent",
                "offer_fetched",
                ResultMatcher::FieldPresent("pre_approved_limit".to_string()),
                |v| {
                    format!(
                        "Pre-approved limit ₹{} at {}%",
                        field_text(v, "pre_approved_limit"),
                        field_text(v, "interest_rate").trim_end_matches('%')
                    )
                },
            ));
        }

        for status in ["approved", "instant_approval"] {
            rules = rules.with_rule(DecisionRule::new(
                "validate_loan_eligibility",
                "Underwriting Agent",
                "loan_approved",
                ResultMatcher::field_equals("status", status),
                |v| format!("Loan approved for ₹{}", field_text(v, "approved_amount")),
            ));
        }

        rules
            .with_rule(DecisionRule::new(
                "validate_loan_eligibility",
                "Underwriting Agent",
                "conditional_approval",
                ResultMatcher::field_equals("status", "conditional_approval"),
                |v| {
                    format!(
                        "Conditionally approved for ₹{}, requires {}",
                        field_text(v, "approved_amount"),
                        field_text(v, "requires").replace('_', " ")
                    )
                },
            ))
            .with_rule(DecisionRule::new(
                "validate_loan_eligibility",
                "Underwriting Agent",
                "loan_rejected",
                ResultMatcher::field_equals("status", "rejected"),
                |v| format!("Loan rejected: {}", field_text(v, "reason")),
            ))
            .with_rule(DecisionRule::new(
                "generate_sanction_letter",
                "Sanction Agent",
                "sanction_generated",
                ResultMatcher::field_equals("status", "generated"),
                |v| format!("Sanction letter {} generated", field_text(v, "letter_id")),
            ))
    }

    /// Derived events for one completed tool call, in table order
    pub fn evaluate(&self, tool: &str, agent: Option<&str>, result: &str) -> Vec<ChatEvent> {
        let parsed: Value =
            serde_json::from_str(result).unwrap_or_else(|_| Value::String(result.to_string()));

        let mut events: Vec<ChatEvent> = self
            .decisions
            .iter()
            .filter(|rule| rule.tool == tool && rule.matcher.matches(&parsed, result))
            .map(|rule| ChatEvent::AgentDecision {
                agent: agent.unwrap_or(&rule.default_agent).to_string(),
                decision_type: rule.decision_type.clone(),
                summary: (rule.summarize)(&parsed),
                details: truncate_chars(result, DETAILS_MAX_CHARS),
            })
            .collect();

        if self.sanction_tool.as_deref() == Some(tool) {
            let pdf_url = parsed.get("pdf_url").and_then(Value::as_str);
            let letter_id = parsed.get("letter_id").and_then(Value::as_str);
            if let (Some(pdf_url), Some(letter_id)) = (pdf_url, letter_id) {
                events.push(ChatEvent::SanctionLetter {
                    pdf_url: pdf_url.to_string(),
                    letter_id: letter_id.to_string(),
                    message_id: None,
                });
            }
        }

        events
    }
}

/// Field rendered without JSON quoting; `?` when missing
fn field_text(value: &Value, field: &str) -> String {
    match value.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "?".to_string(),
        Some(other) => other.to_string(),
    }
}

/// Truncate on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

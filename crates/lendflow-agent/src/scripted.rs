use std::time::Duration;

use anyhow::{bail, Result};

use crate::agent::{LoanAgent, RunHooks, TurnInput};

/// One step of a scripted turn
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    Content(String),
    ToolStart {
        tool: String,
        agent: Option<String>,
    },
    ToolComplete {
        tool: String,
        agent: Option<String>,
        result: String,
    },
    Pause(Duration),
    Fail(String),
}

impl ScriptStep {
    pub fn tool_start(tool: &str, agent: Option<&str>) -> Self {
        ScriptStep::ToolStart {
            tool: tool.to_string(),
            agent: agent.map(str::to_string),
        }
    }

    pub fn tool_complete(tool: &str, agent: Option<&str>, result: &str) -> Self {
        ScriptStep::ToolComplete {
            tool: tool.to_string(),
            agent: agent.map(str::to_string),
            result: result.to_string(),
        }
    }

    /// Split text into word-sized content chunks, keeping the spaces
    pub fn words(text: &str) -> Vec<Self> {
        text.split_inclusive(' ')
            .map(|word| ScriptStep::Content(word.to_string()))
            .collect()
    }
}

/// Deterministic agent that replays a fixed script on every turn
///
/// Stands in for the hosted multi-agent team in demos and tests: it drives
/// the same hooks, from the same blocking worker, as a real framework would.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAgent {
    steps: Vec<ScriptStep>,
    token_delay: Option<Duration>,
}

impl ScriptedAgent {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            token_delay: None,
        }
    }

    /// Sleep between content chunks to mimic model latency
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = Some(delay);
        self
    }

    pub fn steps(&self) -> &[ScriptStep] {
        &self.steps
    }

    /// A full pre-approved loan walkthrough ending in a sanction letter
    pub fn demo() -> Self {
        let mut steps = ScriptStep::words("Let me check your pre-approved offer. ");
        steps.extend([
            ScriptStep::tool_start("fetch_preapproved_offer", Some("Sales Agent")),
            ScriptStep::tool_complete(
                "fetch_preapproved_offer",
                Some("Sales Agent"),
                r#"{"status":"success","pre_approved_limit":500000,"interest_rate":10.5,"max_tenure_months":60}"#,
            ),
            ScriptStep::tool_start("calculate_emi", Some("Sales Agent")),
            ScriptStep::tool_complete(
                "calculate_emi",
                Some("Sales Agent"),
                r#"{"loan_amount":300000,"interest_rate":10.5,"tenure_months":36,"monthly_emi":9750.92,"total_interest":51033.12,"total_payable":351033.12}"#,
            ),
            ScriptStep::tool_start("validate_loan_eligibility", Some("Underwriting Agent")),
            ScriptStep::tool_complete(
                "validate_loan_eligibility",
                Some("Underwriting Agent"),
                r#"{"status":"approved","approval_type":"instant","approved_amount":300000}"#,
            ),
        ]);
        steps.extend(ScriptStep::words(
            "Good news! Your loan of ₹3,00,000 over 36 months is approved with an EMI of about ₹9,751. ",
        ));
        steps.extend([
            ScriptStep::tool_start("generate_sanction_letter", Some("Sanction Agent")),
            ScriptStep::tool_complete(
                "generate_sanction_letter",
                Some("Sanction Agent"),
                r#"{"status":"generated","letter_id":"SL-CUST001-2024","sanctioned_amount":300000,"tenure_months":36,"interest_rate":"10.5%","pdf_url":"/sanction_letters/CUST001.pdf"}"#,
            ),
        ]);
        steps.extend(ScriptStep::words("Your sanction letter is ready to download."));
        Self::new(steps)
    }
}

impl LoanAgent for ScriptedAgent {
    fn run(&self, input: &TurnInput, hooks: &mut dyn RunHooks) -> Result<()> {
        tracing::debug!(
            session_id = %input.session_id,
            steps = self.steps.len(),
            "Replaying scripted turn"
        );

        for step in &self.steps {
            match step {
                ScriptStep::Content(chunk) => {
                    if let Some(delay) = self.token_delay {
                        std::thread::sleep(delay);
                    }
                    hooks.on_content(chunk);
                }
                ScriptStep::ToolStart { tool, agent } => {
                    hooks.on_tool_start(tool, agent.as_deref());
                }
                ScriptStep::ToolComplete { tool, agent, result } => {
                    hooks.on_tool_complete(tool, agent.as_deref(), result);
                }
                ScriptStep::Pause(duration) => std::thread::sleep(*duration),
                ScriptStep::Fail(message) => bail!("{}", message),
            }
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        content: String,
        tools: Vec<String>,
    }

    impl RunHooks for Recorder {
        fn on_content(&mut self, chunk: &str) {
            self.content.push_str(chunk);
        }

        fn on_tool_start(&mut self, tool: &str, _agent: Option<&str>) {
            self.tools.push(format!("start:{tool}"));
        }

        fn on_tool_complete(&mut self, tool: &str, _agent: Option<&str>, _result: &str) {
            self.tools.push(format!("complete:{tool}"));
        }
    }

    #[test]
    fn test_words_rejoin_to_original() {
        let text = "Your EMI is 12000";
        let joined: String = ScriptStep::words(text)
            .into_iter()
            .map(|step| match step {
                ScriptStep::Content(chunk) => chunk,
                other => panic!("Unexpected step {:?}", other),
            })
            .collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_failure_stops_replay() {
        let agent = ScriptedAgent::new(vec![
            ScriptStep::Content("Partial".into()),
            ScriptStep::Fail("upstream timeout".into()),
            ScriptStep::Content("never".into()),
        ]);
        let mut recorder = Recorder::default();

        let err = agent.run(&TurnInput::new("s1", "hi"), &mut recorder).unwrap_err();
        assert_eq!(err.to_string(), "upstream timeout");
        assert_eq!(recorder.content, "Partial");
    }

    #[test]
    fn test_demo_script_pairs_tools() {
        let mut recorder = Recorder::default();
        ScriptedAgent::demo()
            .run(&TurnInput::new("s1", "hi"), &mut recorder)
            .unwrap();

        assert_eq!(recorder.tools.len(), 8);
        assert_eq!(recorder.tools[0], "start:fetch_preapproved_offer");
        assert!(recorder.content.ends_with("ready to download."));
    }
}

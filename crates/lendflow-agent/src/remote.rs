use std::io::{BufRead, BufReader};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;

use crate::agent::{LoanAgent, RunHooks, TurnInput};

/// One newline-delimited frame from the hosted agent team
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RemoteFrame {
    Content {
        data: String,
    },
    ToolStart {
        tool: String,
        #[serde(default)]
        agent: Option<String>,
    },
    ToolComplete {
        tool: String,
        #[serde(default)]
        agent: Option<String>,
        #[serde(default)]
        result: Option<String>,
    },
    Error {
        message: String,
    },
    Done,
    #[serde(other)]
    Other,
}

/// Agent team hosted behind an HTTP endpoint that answers one POST per turn
/// with a newline-delimited JSON stream.
///
/// The HTTP client is blocking and is built per call, on the worker thread
/// the producer hands the turn to.
#[derive(Debug, Clone)]
pub struct RemoteAgent {
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl RemoteAgent {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_client(&self) -> Result<reqwest::blocking::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key))
                    .context("Invalid API key format")?,
            );
        }

        reqwest::blocking::Client::builder()
            .default_headers(headers)
            .timeout(self.timeout)
            .build()
            .context("Failed to create HTTP client")
    }
}

impl LoanAgent for RemoteAgent {
    fn run(&self, input: &TurnInput, hooks: &mut dyn RunHooks) -> Result<()> {
        let client = self.build_client()?;
        let payload = serde_json::json!({
            "session_id": input.session_id,
            "message": input.prompt(),
        });

        let response = client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            bail!("Agent endpoint error ({}): {}", status, error_text);
        }

        for line in BufReader::new(response).lines() {
            let line = line.context("Agent stream interrupted")?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let frame: RemoteFrame = match serde_json::from_str(line) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!("Skipping malformed agent frame: {}", e);
                    continue;
                }
            };

            match frame {
                RemoteFrame::Content { data } => hooks.on_content(&data),
                RemoteFrame::ToolStart { tool, agent } => {
                    hooks.on_tool_start(&tool, agent.as_deref());
                }
                RemoteFrame::ToolComplete { tool, agent, result } => {
                    hooks.on_tool_complete(&tool, agent.as_deref(), result.as_deref().unwrap_or(""));
                }
                RemoteFrame::Error { message } => bail!("{}", message),
                RemoteFrame::Done => return Ok(()),
                RemoteFrame::Other => {}
            }
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl RunHooks for Recorder {
        fn on_content(&mut self, chunk: &str) {
            self.calls.push(format!("content:{chunk}"));
        }

        fn on_tool_start(&mut self, tool: &str, agent: Option<&str>) {
            self.calls.push(format!("start:{tool}:{}", agent.unwrap_or("-")));
        }

        fn on_tool_complete(&mut self, tool: &str, _agent: Option<&str>, result: &str) {
            self.calls.push(format!("complete:{tool}:{result}"));
        }
    }

    #[test]
    fn test_ndjson_frames_drive_hooks() {
        let mut server = mockito::Server::new();
        let body = concat!(
            r#"{"type":"content","data":"Checking "}"#, "\n",
            "\n",
            r#"{"type":"tool_start","tool":"fetch_credit_score","agent":"Underwriting Agent"}"#, "\n",
            "not json\n",
            r#"{"type":"tool_complete","tool":"fetch_credit_score","result":"{\"credit_score\":780}"}"#, "\n",
            r#"{"type":"heartbeat"}"#, "\n",
            r#"{"type":"done"}"#, "\n",
            r#"{"type":"content","data":"after done"}"#, "\n",
        );
        let mock = server
            .mock("POST", "/turn")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_body(body)
            .create();

        let agent = RemoteAgent::new(format!("{}/turn", server.url()))
            .with_api_key(Some("secret".to_string()));
        let mut recorder = Recorder::default();
        agent.run(&TurnInput::new("s1", "score?"), &mut recorder).unwrap();

        mock.assert();
        assert_eq!(
            recorder.calls,
            vec![
                "content:Checking ",
                "start:fetch_credit_score:Underwriting Agent",
                r#"complete:fetch_credit_score:{"credit_score":780}"#,
            ]
        );
    }

    #[test]
    fn test_error_frame_fails_turn() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/turn")
            .with_status(200)
            .with_body("{\"type\":\"error\",\"message\":\"rate limited\"}\n")
            .create();

        let agent = RemoteAgent::new(format!("{}/turn", server.url()));
        let err = agent
            .run(&TurnInput::new("s1", "hi"), &mut Recorder::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn test_http_failure_is_reported() {
        let mut server = mockito::Server::new();
        server.mock("POST", "/turn").with_status(503).with_body("down").create();

        let agent = RemoteAgent::new(format!("{}/turn", server.url()));
        let err = agent
            .run(&TurnInput::new("s1", "hi"), &mut Recorder::default())
            .unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}

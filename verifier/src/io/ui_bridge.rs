//! UI-bridge driver for ui_bridge steps.
//!
//! The UI bridge owns the browser; this side only issues JSON-over-HTTP
//! calls and reads back success plus an element/text dump. Natural-language
//! `instruction` and `target` strings are passed through untouched.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::io::process::tail;
use crate::workflow::{AssertType, UiAction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiBridgeRequest {
    pub step_id: String,
    pub action: UiAction,
    pub url: Option<String>,
    pub instruction: Option<String>,
    pub target: Option<String>,
    pub assert_type: Option<AssertType>,
    pub expected: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiBridgeOutcome {
    pub success: bool,
    pub detail: String,
}

/// Abstraction over the UI bridge.
///
/// `Err` means the bridge could not be reached; an answered request that
/// did not succeed is an `Ok` outcome with `success: false`.
pub trait UiBridgeDriver {
    fn perform(&self, request: &UiBridgeRequest) -> Result<UiBridgeOutcome>;
}

/// Driver backed by the UI bridge's HTTP API.
pub struct HttpUiBridgeDriver {
    base_url: String,
    detail_limit_bytes: usize,
    agent: ureq::Agent,
}

impl HttpUiBridgeDriver {
    pub fn new(base_url: &str, detail_limit_bytes: usize) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            detail_limit_bytes,
            agent: ureq::agent(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn call(&self, request: &UiBridgeRequest) -> Result<ureq::Response, ureq::Error> {
        let field = |value: &Option<String>| value.clone().unwrap_or_default();
        match &request.action {
            UiAction::Navigate => self
                .agent
                .post(&self.endpoint("control/page/navigate"))
                .timeout(request.timeout)
                .send_json(json!({ "url": field(&request.url) })),
            UiAction::Execute => self
                .agent
                .post(&self.endpoint("sdk/ai/execute"))
                .timeout(request.timeout)
                .send_json(json!({ "instruction": field(&request.instruction) })),
            UiAction::Assert => {
                let mut body = json!({
                    "target": field(&request.target),
                    "assertType": request
                        .assert_type
                        .as_ref()
                        .map(|kind| kind.as_str().to_string())
                        .unwrap_or_default(),
                });
                if let Some(expected) = &request.expected {
                    body["expected"] = Value::String(expected.clone());
                }
                self.agent
                    .post(&self.endpoint("sdk/ai/assert"))
                    .timeout(request.timeout)
                    .send_json(body)
            }
            UiAction::Snapshot | UiAction::Other(_) => self
                .agent
                .get(&self.endpoint("control/elements"))
                .timeout(request.timeout)
                .call(),
        }
    }
}

impl UiBridgeDriver for HttpUiBridgeDriver {
    #[instrument(skip_all, fields(step_id = %request.step_id, action = %request.action))]
    fn perform(&self, request: &UiBridgeRequest) -> Result<UiBridgeOutcome> {
        if let UiAction::Other(raw) = &request.action {
            return Err(anyhow!("unsupported ui_bridge action `{raw}`"));
        }
        let response = match self.call(request) {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                warn!(code, "ui bridge rejected request");
                return Ok(UiBridgeOutcome {
                    success: false,
                    detail: format!("HTTP {code}: {}", tail(&body, self.detail_limit_bytes)),
                });
            }
            Err(err) => {
                return Err(err).with_context(|| format!("ui bridge {} request", request.action));
            }
        };

        let body = response.into_string().context("read ui bridge response")?;
        let success = reported_success(&body).unwrap_or(true);
        debug!(success, "ui bridge answered");
        Ok(UiBridgeOutcome {
            success,
            detail: tail(&body, self.detail_limit_bytes).to_string(),
        })
    }
}

/// `success`/`passed` flag of a JSON response body, when it carries one.
fn reported_success(body: &str) -> Option<bool> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["success", "passed", "ok"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_bool))
}

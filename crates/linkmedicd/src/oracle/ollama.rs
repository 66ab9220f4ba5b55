//! Ollama-backed oracle.
//!
//! Endpoints used:
//! - POST /api/generate - non-streaming generation with `format: "json"`
//!
//! The model's text is parsed as JSON and mapped onto `Diagnosis` and
//! `Decision`. Anything that does not fit is an `OracleError`; nothing here
//! panics on model output.

use super::{DecisionOracle, DiagnosisOracle, OracleError};
use async_trait::async_trait;
use linkmedic_common::config::OracleConfig;
use linkmedic_common::{Decision, Diagnosis, IssueType, Metrics, Severity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

const DIAGNOSE_SYSTEM: &str = "You are a Linux network diagnostics assistant. \
Analyze WiFi interface metrics and diagnose issues. \
Respond with JSON only.";

const DECIDE_SYSTEM: &str = "You are a cautious Linux system administrator. \
Pick one remediation action from the allowed list, or \"none\". \
Respond with JSON only.";

/// Request for /api/generate
#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    system: &'a str,
    stream: bool,
    format: &'a str,
    options: GenerateOptions,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

/// Response from /api/generate (non-streaming)
#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct DiagnosisPayload {
    issue_detected: bool,
    #[serde(default = "default_issue_type")]
    issue_type: IssueType,
    #[serde(default = "default_severity")]
    severity: Severity,
}

fn default_issue_type() -> IssueType {
    IssueType::None
}

fn default_severity() -> Severity {
    Severity::None
}

pub struct OllamaOracle {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout_secs: u64,
}

impl OllamaOracle {
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::Http(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
        })
    }

    async fn generate(&self, system: &str, prompt: String) -> Result<Value, OracleError> {
        let url = format!("{}/api/generate", self.endpoint);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            system,
            stream: false,
            format: "json",
            options: GenerateOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout(self.timeout_secs)
                } else {
                    OracleError::Http(format!("request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(OracleError::Http(format!(
                "HTTP {} from Ollama",
                response.status()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| OracleError::InvalidJson(format!("failed to parse response: {}", e)))?;

        debug!("Ollama raw output: {:?}", body.response);
        extract_json(&body.response)
    }
}

#[async_trait]
impl DiagnosisOracle for OllamaOracle {
    async fn diagnose(
        &self,
        metrics: &Metrics,
        known_issues: &str,
    ) -> Result<Diagnosis, OracleError> {
        let value = self
            .generate(DIAGNOSE_SYSTEM, diagnose_prompt(metrics, known_issues))
            .await?;
        parse_diagnosis(value).map_err(|e| {
            error!("Oracle returned no usable diagnosis: {}", e);
            e
        })
    }
}

#[async_trait]
impl DecisionOracle for OllamaOracle {
    async fn decide(
        &self,
        diagnosis: &Diagnosis,
        allowed_actions: &[String],
    ) -> Result<(Decision, String), OracleError> {
        let value = self
            .generate(DECIDE_SYSTEM, decide_prompt(diagnosis, allowed_actions)?)
            .await?;
        parse_decision(value)
    }
}

fn diagnose_prompt(metrics: &Metrics, known_issues: &str) -> String {
    format!(
        "Interface: {}\nState: {}\nRX bitrate: {} Mbit/s\nTX bitrate: {} Mbit/s\nSignal: {} dBm\n\n\
         Known driver bugs:\n{}\n\
         Respond with JSON: {{\"issue_detected\": bool, \
         \"issue_type\": \"none\" | \"interface_down\" | \"wifi_rx_degraded\", \
         \"severity\": \"none\" | \"warning\" | \"critical\"}}",
        metrics.interface,
        metrics.link_state,
        metrics.rx_mbps,
        metrics.tx_mbps,
        metrics.signal_dbm,
        known_issues
    )
}

fn decide_prompt(diagnosis: &Diagnosis, allowed_actions: &[String]) -> Result<String, OracleError> {
    let diagnosis_json =
        serde_json::to_string(diagnosis).map_err(|e| OracleError::InvalidJson(e.to_string()))?;
    let actions_json = serde_json::to_string(allowed_actions)
        .map_err(|e| OracleError::InvalidJson(e.to_string()))?;
    Ok(format!(
        "Diagnosis: {}\nAllowed actions: {}\n\
         Respond with JSON: {{\"action\": one of the allowed actions or \"none\", \
         \"confidence\": number between 0 and 1, \"reasoning\": brief explanation}}",
        diagnosis_json, actions_json
    ))
}

/// Pull the JSON object out of model output.
///
/// Small models sometimes wrap the object in prose or a thinking block, so the
/// outermost `{ ... }` span is used.
pub fn extract_json(text: &str) -> Result<Value, OracleError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(OracleError::EmptyResponse);
    }
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Ok(value);
    }

    let start = text.find('{');
    let end = text.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if s < e => serde_json::from_str(&text[s..=e])
            .map_err(|err| OracleError::InvalidJson(format!("output is not valid JSON: {}", err))),
        _ => Err(OracleError::InvalidJson("no JSON object in output".to_string())),
    }
}

/// Map model JSON to a diagnosis. Accepts the object bare or under "diagnosis".
pub fn parse_diagnosis(value: Value) -> Result<Diagnosis, OracleError> {
    let value = unwrap_field(value, "diagnosis");
    if value.is_null() {
        return Err(OracleError::EmptyResponse);
    }

    let payload: DiagnosisPayload = serde_json::from_value(value)
        .map_err(|e| OracleError::Unusable(format!("diagnosis: {}", e)))?;

    if payload.issue_detected && payload.issue_type == IssueType::None {
        return Err(OracleError::Unusable(
            "issue detected but issue_type is none".to_string(),
        ));
    }

    Ok(Diagnosis {
        issue_detected: payload.issue_detected,
        issue_type: payload.issue_type,
        severity: payload.severity,
    })
}

/// Map model JSON to `(Decision, reasoning)`. Accepts the decision bare or
/// under "decision"; confidence may be a number, numeric string or absent.
pub fn parse_decision(value: Value) -> Result<(Decision, String), OracleError> {
    let reasoning = value
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let decision = unwrap_field(value, "decision");
    let action = decision
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| OracleError::Unusable("decision has no action".to_string()))?
        .trim()
        .to_string();

    let confidence = match decision.get("confidence") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    let reasoning = if reasoning.is_empty() {
        decision
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    } else {
        reasoning
    };

    Ok((Decision::new(action, confidence), reasoning))
}

fn unwrap_field(value: Value, field: &str) -> Value {
    match value {
        Value::Object(mut map) if map.get(field).map_or(false, Value::is_object) => {
            map.remove(field).unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_plain_json() {
        let v = extract_json(r#"{"issue_detected": false}"#).unwrap();
        assert_eq!(v["issue_detected"], false);
    }

    #[test]
    fn test_extract_wrapped_json() {
        let v = extract_json("<think>hmm</think>\n{\"action\": \"wifi_reset\"} done").unwrap();
        assert_eq!(v["action"], "wifi_reset");
    }

    #[test]
    fn test_extract_empty_and_garbage() {
        assert_eq!(extract_json("   "), Err(OracleError::EmptyResponse));
        assert!(matches!(
            extract_json("no json here"),
            Err(OracleError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_parse_diagnosis() {
        let d = parse_diagnosis(json!({
            "issue_detected": true,
            "issue_type": "wifi_rx_degraded",
            "severity": "critical"
        }))
        .unwrap();
        assert_eq!(d, Diagnosis::issue(IssueType::WifiRxDegraded, Severity::Critical));
    }

    #[test]
    fn test_parse_nested_diagnosis() {
        let d = parse_diagnosis(json!({
            "diagnosis": {"issue_detected": false, "issue_type": "none", "severity": "none"}
        }))
        .unwrap();
        assert!(!d.issue_detected);
    }

    #[test]
    fn test_parse_diagnosis_rejects_unknown_vocabulary() {
        let r = parse_diagnosis(json!({
            "issue_detected": true,
            "issue_type": "cosmic_rays",
            "severity": "critical"
        }));
        assert!(matches!(r, Err(OracleError::Unusable(_))));
    }

    #[test]
    fn test_parse_diagnosis_rejects_contradiction() {
        let r = parse_diagnosis(json!({"issue_detected": true, "issue_type": "none"}));
        assert!(matches!(r, Err(OracleError::Unusable(_))));
    }

    #[test]
    fn test_parse_diagnosis_null() {
        assert_eq!(parse_diagnosis(Value::Null), Err(OracleError::EmptyResponse));
    }

    #[test]
    fn test_parse_decision_clamps() {
        let (d, why) = parse_decision(json!({
            "action": "wifi_reset",
            "confidence": 1.7,
            "reasoning": "rx stalled"
        }))
        .unwrap();
        assert_eq!(d.action, "wifi_reset");
        assert_eq!(d.confidence, 1.0);
        assert_eq!(why, "rx stalled");
    }

    #[test]
    fn test_parse_decision_variants() {
        let (d, _) = parse_decision(json!({
            "decision": {"action": "wifi_reset", "confidence": "0.8"},
            "reasoning": "x"
        }))
        .unwrap();
        assert_eq!(d.confidence, 0.8);

        let (d, why) = parse_decision(json!({"action": "none", "confidence": null})).unwrap();
        assert!(d.is_no_action());
        assert_eq!(d.confidence, 0.0);
        assert_eq!(why, "");
    }

    #[test]
    fn test_parse_decision_without_action() {
        assert!(matches!(
            parse_decision(json!({"confidence": 0.9})),
            Err(OracleError::Unusable(_))
        ));
    }

    #[test]
    fn test_prompts_carry_context() {
        let m = Metrics::new("wlP9s9", linkmedic_common::LinkState::Up, 6.0, 258.0, -45);
        let p = diagnose_prompt(&m, "MT7925 bug");
        assert!(p.contains("wlP9s9"));
        assert!(p.contains("MT7925 bug"));

        let p = decide_prompt(
            &Diagnosis::issue(IssueType::InterfaceDown, Severity::Critical),
            &["wifi_reset".to_string()],
        )
        .unwrap();
        assert!(p.contains("\"wifi_reset\""));
        assert!(p.contains("interface_down"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_error() {
        let oracle = OllamaOracle::new(&OracleConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..OracleConfig::default()
        })
        .unwrap();
        let m = Metrics::new("wlP9s9", linkmedic_common::LinkState::Down, 0.0, 0.0, -100);
        assert!(oracle.diagnose(&m, "").await.is_err());
    }
}

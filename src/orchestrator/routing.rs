//! Routing oracle adapter.
//!
//! Turns the oracle's free-text answer into a validated [`Decision`]. The
//! strict path ([`parse_decision`]) and the keyword fallback
//! ([`fallback_decision`]) are separate so each can be tested alone; the
//! adapter always ends up with a usable decision.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::models::{Decision, DecisionSource, Event, HandlerId, Route, SharedRecord};
use crate::phases::{OracleRequest, RoutingOracle, extract_json_block};

/// Confidence assumed when the oracle omits one.
pub const DEFAULT_CONFIDENCE: f32 = 0.8;
/// Confidence of a keyword-fallback handler pick.
pub const FALLBACK_CONFIDENCE: f32 = 0.5;

// ============================================================================
// Strict path
// ============================================================================

/// Why an oracle answer could not be parsed strictly.
#[derive(Debug, thiserror::Error)]
pub enum DecisionParseError {
    #[error("no JSON object found in oracle answer")]
    NoJson,
    #[error("oracle answer is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("oracle answer failed validation: {}", .0.join("; "))]
    Schema(Vec<String>),
    #[error("unknown route '{0}'")]
    UnknownRoute(String),
}

static DECISION_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "required": ["selected_agent", "reasoning", "instructions"],
        "properties": {
            "selected_agent": { "type": "string", "minLength": 1 },
            "reasoning": { "type": "string", "minLength": 10 },
            "instructions": { "type": "string", "minLength": 5 },
            "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 }
        }
    })
});

static DECISION_VALIDATOR: Lazy<jsonschema::Validator> = Lazy::new(|| {
    jsonschema::validator_for(&DECISION_SCHEMA).expect("invalid DECISION_SCHEMA")
});

#[derive(Debug, Deserialize)]
struct RawDecision {
    selected_agent: String,
    reasoning: String,
    instructions: String,
    confidence: Option<f32>,
}

/// Parse and validate an oracle answer.
///
/// Accepts a bare JSON object, one inside a ```json or plain ``` fence, or
/// one surrounded by prose. `selected_agent` is matched case-insensitively
/// and `FINISH` is read as DONE.
pub fn parse_decision(raw: &str) -> Result<Decision, DecisionParseError> {
    let block = extract_json_block(raw).ok_or(DecisionParseError::NoJson)?;
    let value: Value = serde_json::from_str(block)?;

    if !DECISION_VALIDATOR.is_valid(&value) {
        let messages = DECISION_VALIDATOR
            .iter_errors(&value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(DecisionParseError::Schema(messages));
    }

    let parsed: RawDecision = serde_json::from_value(value)?;
    let route = Route::try_from(parsed.selected_agent.clone())
        .map_err(|_| DecisionParseError::UnknownRoute(parsed.selected_agent))?;

    Ok(Decision {
        route,
        rationale: parsed.reasoning.trim().to_string(),
        instructions: parsed.instructions.trim().to_string(),
        confidence: parsed.confidence.unwrap_or(DEFAULT_CONFIDENCE),
        source: DecisionSource::Parsed,
    })
}

// ============================================================================
// Fallback path
// ============================================================================

/// Keyword families in tie-break order.
static FALLBACK_FAMILIES: Lazy<Vec<(HandlerId, Regex)>> = Lazy::new(|| {
    [
        (HandlerId::Writing, r"write|summary|explain"),
        (HandlerId::Code, r"code|function|program"),
        (HandlerId::Research, r"research|search|look up"),
        (HandlerId::Data, r"analyze|calculate|statistic"),
    ]
    .into_iter()
    .map(|(id, pattern)| {
        (
            id,
            Regex::new(pattern).expect("invalid fallback family regex"),
        )
    })
    .collect()
});

/// Pick a route from keywords when the oracle's answer is unusable.
///
/// The family with the most hits wins; ties go to the earlier family
/// (writing, code, research, data). No hits means DONE.
pub fn fallback_decision(raw: &str) -> Decision {
    let lowered = raw.to_lowercase();

    let mut best: Option<(HandlerId, usize)> = None;
    for (id, pattern) in FALLBACK_FAMILIES.iter() {
        let hits = pattern.find_iter(&lowered).count();
        if hits > 0 && best.is_none_or(|(_, top)| hits > top) {
            best = Some((*id, hits));
        }
    }

    match best {
        Some((id, _)) => Decision {
            route: Route::Handler(id),
            rationale: format!("Fallback: Detected {}-related keywords", id),
            instructions: "Handle the user's request".to_string(),
            confidence: FALLBACK_CONFIDENCE,
            source: DecisionSource::Fallback,
        },
        None => Decision::done(
            "Fallback: Unable to parse routing decision",
            DecisionSource::Fallback,
        ),
    }
}

// ============================================================================
// Adapter
// ============================================================================

pub struct RoutingAdapter {
    oracle: Arc<dyn RoutingOracle>,
}

impl RoutingAdapter {
    pub fn new(oracle: Arc<dyn RoutingOracle>) -> Self {
        Self { oracle }
    }

    /// Ask the oracle for the next step and commit the decision to the record.
    ///
    /// Never fails: parse problems fall back to keywords, and an oracle error
    /// is recorded and turned into DONE.
    pub async fn route(&self, record: &mut SharedRecord) -> Decision {
        let request = OracleRequest::from_record(record);

        let decision = match self.oracle.decide(&request).await {
            Ok(raw) => match parse_decision(&raw) {
                Ok(decision) => decision,
                Err(e) => {
                    warn!("Could not parse routing decision ({}), using fallback", e);
                    let decision = fallback_decision(&raw);
                    warn!("Using fallback routing: {}", decision.route);
                    decision
                }
            },
            Err(e) => {
                error!("Routing oracle failed: {}", e);
                record.push_error(format!("Routing oracle error: {}", e));
                Decision::done(
                    format!("Routing oracle unavailable: {}", e),
                    DecisionSource::OracleFailure,
                )
            }
        };

        info!(
            "Iteration {}: routed to {} (confidence {:.2})",
            record.iteration_count(),
            decision.route,
            decision.confidence
        );

        record.record_decision(&decision);
        record.log_event(
            Event::new(
                "delegator",
                format!("Routed to {}: {}", decision.route, decision.rationale),
            )
            .with_meta("confidence", decision.confidence)
            .with_meta("instructions", decision.instructions.clone())
            .with_meta("fallback", decision.source != DecisionSource::Parsed),
        );

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::OracleError;
    use async_trait::async_trait;

    #[test]
    fn test_parse_bare_json() {
        let raw = r#"{"selected_agent": "code", "reasoning": "The user wants a function", "instructions": "Write add()", "confidence": 0.9}"#;
        let decision = parse_decision(raw).unwrap();
        assert_eq!(decision.route, Route::Handler(HandlerId::Code));
        assert_eq!(decision.confidence, 0.9);
        assert_eq!(decision.source, DecisionSource::Parsed);
    }

    #[test]
    fn test_parse_fenced_json_with_prose() {
        let raw = "Sure, here is my decision:\n```json\n{\"selected_agent\": \"FINISH\", \"reasoning\": \"All outputs are present\", \"instructions\": \"Nothing left\"}\n```\nDone.";
        let decision = parse_decision(raw).unwrap();
        assert_eq!(decision.route, Route::Done);
        assert_eq!(decision.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let raw = r#"{"selected_agent": "Writing", "reasoning": "Prose is requested here", "instructions": "Draft it"}"#;
        assert_eq!(
            parse_decision(raw).unwrap().route,
            Route::Handler(HandlerId::Writing)
        );
    }

    #[test]
    fn test_parse_rejects_short_fields() {
        let raw = r#"{"selected_agent": "code", "reasoning": "short", "instructions": "ok"}"#;
        assert!(matches!(
            parse_decision(raw),
            Err(DecisionParseError::Schema(msgs)) if !msgs.is_empty()
        ));
    }

    #[test]
    fn test_parse_rejects_out_of_range_confidence() {
        let raw = r#"{"selected_agent": "code", "reasoning": "long enough reasoning", "instructions": "do it", "confidence": 1.5}"#;
        assert!(matches!(
            parse_decision(raw),
            Err(DecisionParseError::Schema(_))
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_agent() {
        let raw = r#"{"selected_agent": "designer", "reasoning": "long enough reasoning", "instructions": "do it"}"#;
        assert!(matches!(
            parse_decision(raw),
            Err(DecisionParseError::UnknownRoute(name)) if name == "designer"
        ));
    }

    #[test]
    fn test_parse_without_json() {
        assert!(matches!(
            parse_decision("I think the writer should go next."),
            Err(DecisionParseError::NoJson)
        ));
    }

    #[test]
    fn test_fallback_writing_keywords() {
        let decision = fallback_decision("Let's write a summary for the user");
        assert_eq!(decision.route, Route::Handler(HandlerId::Writing));
        assert_eq!(decision.confidence, FALLBACK_CONFIDENCE);
        assert_eq!(decision.source, DecisionSource::Fallback);
    }

    #[test]
    fn test_fallback_most_hits_wins() {
        let decision = fallback_decision("explain this code: the function calls another function");
        assert_eq!(decision.route, Route::Handler(HandlerId::Code));
    }

    #[test]
    fn test_fallback_tie_prefers_writing() {
        let decision = fallback_decision("research then write");
        assert_eq!(decision.route, Route::Handler(HandlerId::Writing));
    }

    #[test]
    fn test_fallback_data_and_research() {
        assert_eq!(
            fallback_decision("we should calculate a statistic").route,
            Route::Handler(HandlerId::Data)
        );
        assert_eq!(
            fallback_decision("please look up sources").route,
            Route::Handler(HandlerId::Research)
        );
    }

    #[test]
    fn test_fallback_nothing_matches() {
        let decision = fallback_decision("¯\\_(ツ)_/¯");
        assert_eq!(decision.route, Route::Done);
        assert_eq!(decision.confidence, 0.3);
    }

    struct FixedOracle(Result<&'static str, &'static str>);

    #[async_trait]
    impl RoutingOracle for FixedOracle {
        async fn decide(&self, _request: &OracleRequest) -> Result<String, OracleError> {
            self.0
                .map(str::to_string)
                .map_err(|e| OracleError::Other(e.to_string()))
        }
    }

    #[tokio::test]
    async fn test_route_commits_decision_and_event() {
        let adapter = RoutingAdapter::new(Arc::new(FixedOracle(Ok(
            r#"{"selected_agent": "research", "reasoning": "Facts are needed first", "instructions": "Find sources", "confidence": 0.75}"#,
        ))));
        let mut record = SharedRecord::new("Research X");
        record.begin_iteration();

        let decision = adapter.route(&mut record).await;

        assert_eq!(decision.route, Route::Handler(HandlerId::Research));
        assert_eq!(
            record.selected_handler(),
            Some(Route::Handler(HandlerId::Research))
        );
        assert_eq!(record.routing_rationale(), Some("Facts are needed first"));

        let event = record.events().last().unwrap();
        assert_eq!(event.actor, "delegator");
        let meta = event.metadata.as_ref().unwrap();
        assert_eq!(meta["instructions"], "Find sources");
        assert_eq!(meta["fallback"], false);
    }

    #[tokio::test]
    async fn test_route_falls_back_on_garbage() {
        let adapter = RoutingAdapter::new(Arc::new(FixedOracle(Ok(
            "the code agent should write a function",
        ))));
        let mut record = SharedRecord::new("make add()");
        record.begin_iteration();

        let decision = adapter.route(&mut record).await;
        assert_eq!(decision.route, Route::Handler(HandlerId::Code));
        assert!(!record.has_errors());
        let meta = record.events().last().unwrap().metadata.clone().unwrap();
        assert_eq!(meta["fallback"], true);
    }

    #[tokio::test]
    async fn test_route_oracle_failure_records_error() {
        let adapter = RoutingAdapter::new(Arc::new(FixedOracle(Err("connection refused"))));
        let mut record = SharedRecord::new("anything");
        record.begin_iteration();

        let decision = adapter.route(&mut record).await;
        assert_eq!(decision.route, Route::Done);
        assert_eq!(decision.source, DecisionSource::OracleFailure);
        assert_eq!(record.errors().len(), 1);
        assert!(record.errors()[0].starts_with("Routing oracle error:"));
        assert!(record.errors()[0].contains("connection refused"));
    }
}

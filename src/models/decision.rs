use std::fmt;

use serde::{Deserialize, Serialize};

use super::outputs::HandlerId;

/// Where a routing decision goes next: a concrete handler or completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Route {
    Handler(HandlerId),
    Done,
}

impl Route {
    pub fn handler(&self) -> Option<HandlerId> {
        match self {
            Route::Handler(id) => Some(*id),
            Route::Done => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Route::Done)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Handler(id) => write!(f, "{}", id),
            Route::Done => f.write_str("DONE"),
        }
    }
}

impl From<Route> for String {
    fn from(route: Route) -> Self {
        route.to_string()
    }
}

impl TryFrom<String> for Route {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_uppercase().as_str() {
            "DONE" | "FINISH" => Ok(Route::Done),
            _ => value
                .parse::<HandlerId>()
                .map(Route::Handler)
                .map_err(|e| e.to_string()),
        }
    }
}

/// How a decision was obtained from the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// The oracle's answer parsed and validated.
    Parsed,
    /// The answer was malformed; keyword fallback picked the route.
    Fallback,
    /// The oracle could not be invoked.
    OracleFailure,
}

/// A validated routing decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub route: Route,
    pub rationale: String,
    pub instructions: String,
    /// Always within [0, 1]
    pub confidence: f32,
    pub source: DecisionSource,
}

impl Decision {
    /// Decision used when nothing usable came back from the oracle.
    pub fn done(rationale: impl Into<String>, source: DecisionSource) -> Self {
        Self {
            route: Route::Done,
            rationale: rationale.into(),
            instructions: "N/A".to_string(),
            confidence: 0.3,
            source,
        }
    }
}

//! Request analysis - decides up front whether a request needs several handlers.
//!
//! Pure keyword matching over the lower-cased request. No side effects.

use crate::models::{Analysis, HandlerId};

/// Phrases that mark a request as multi-step on their own.
const MULTI_STEP_PHRASES: &[&str] = &[
    "research and",
    "analyze and",
    "then",
    "after that",
    "first",
    "second",
    "finally",
    "compare",
];

/// Keywords that select a handler when building a plan.
fn plan_keywords(id: HandlerId) -> &'static [&'static str] {
    match id {
        HandlerId::Research => &["research", "find", "search", "look up"],
        HandlerId::Data => &["analyze", "calculate", "compare", "data"],
        HandlerId::Code => &["code", "function", "program", "script"],
        HandlerId::Writing => &["write", "summary", "summarize", "explain", "document"],
    }
}

/// Handlers whose output usually feeds another handler.
/// A trigger pair needs one of these plus any other handler.
const SOURCE_HANDLERS: &[HandlerId] = &[HandlerId::Research, HandlerId::Data];

fn mentions(text: &str, id: HandlerId) -> bool {
    plan_keywords(id).iter().any(|kw| text.contains(kw))
}

/// Whether the request reads as a multi-step task.
fn is_multi_step(text: &str) -> bool {
    if MULTI_STEP_PHRASES.iter().any(|p| text.contains(p)) {
        return true;
    }

    SOURCE_HANDLERS.iter().any(|source| {
        mentions(text, *source)
            && HandlerId::ALL
                .iter()
                .any(|other| other != source && mentions(text, *other))
    })
}

/// Analyze a request and build a collaboration plan when one is needed.
///
/// The plan lists matching handlers in priority order (research, data, code,
/// writing). A multi-step request with no matching handler keywords yields no
/// plan and is treated as a single-handler request.
pub fn analyze(request: &str) -> Analysis {
    let text = request.to_lowercase();

    if !is_multi_step(&text) {
        return Analysis::single();
    }

    let mut plan: Vec<HandlerId> = Vec::new();
    for id in HandlerId::ALL {
        if mentions(&text, id) && !plan.contains(&id) {
            plan.push(id);
        }
    }

    if plan.is_empty() {
        return Analysis::single();
    }

    Analysis {
        needs_multi_handler: true,
        plan: Some(plan),
    }
}

//! Handler registry and adapter.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use crate::config::SwitchboardConfig;
use crate::models::{Event, HandlerId, SharedRecord};
use crate::phases::{Handler, HandlerContext, HandlerOutput, LlmHandler};

/// Handler instances keyed by the slot they fill.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<HandlerId, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the model-backed handler for every id.
    pub fn from_config(config: &SwitchboardConfig, base_dir: &Path) -> Result<Self> {
        let mut registry = Self::new();
        for id in HandlerId::ALL {
            registry.register(Arc::new(LlmHandler::from_config(id, config, base_dir)?));
        }
        Ok(registry)
    }

    /// Register a handler under its own id, replacing any earlier one.
    pub fn register(&mut self, handler: Arc<dyn Handler>) -> Option<Arc<dyn Handler>> {
        self.handlers.insert(handler.id(), handler)
    }

    pub fn with(mut self, handler: Arc<dyn Handler>) -> Self {
        self.register(handler);
        self
    }

    pub fn get(&self, id: HandlerId) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(&id)
    }
}

/// A handler run that left nothing usable in the record.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{handler} handler error: {message}")]
pub struct HandlerFailure {
    pub handler: HandlerId,
    pub message: String,
}

/// Runs handlers against the record.
pub struct HandlerAdapter {
    registry: HandlerRegistry,
}

impl HandlerAdapter {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self { registry }
    }

    /// Run one handler and store its result in the record.
    ///
    /// A failure is recorded in `errors` with a terminal event and returned;
    /// it never aborts the caller.
    pub async fn invoke(
        &self,
        id: HandlerId,
        instructions: &str,
        record: &mut SharedRecord,
    ) -> Result<(), HandlerFailure> {
        let ctx = build_context(id, instructions, record);

        let outcome = match self.registry.get(id) {
            None => Err(format!("no handler registered for '{}'", id)),
            Some(handler) => match handler.handle(&ctx).await {
                Err(e) => Err(e.to_string()),
                Ok(output) if !output.result.is_usable() => {
                    Err("returned an empty result".to_string())
                }
                Ok(output) => Ok(output),
            },
        };

        // The record rejects a result of the wrong kind.
        let outcome = outcome.and_then(|HandlerOutput { result, summary }| {
            record
                .store_output(id, result)
                .map(|()| summary)
                .map_err(|e| e.to_string())
        });

        match outcome {
            Ok(summary) => {
                info!("{} handler finished: {}", id, summary);
                record.log_event(Event::new(id.as_str(), summary));
                Ok(())
            }
            Err(message) => {
                let failure = HandlerFailure {
                    handler: id,
                    message,
                };
                error!("{}", failure);
                record.push_error(failure.to_string());
                record.log_event(
                    Event::new(id.as_str(), format!("Error occurred: {}", failure.message))
                        .with_meta("terminal", true),
                );
                Err(failure)
            }
        }
    }
}

/// Context for `id`: the request, the routing instructions and the filled
/// slots it consumes.
fn build_context(id: HandlerId, instructions: &str, record: &SharedRecord) -> HandlerContext {
    let mut ctx = HandlerContext::new(record.original_request());
    ctx.instructions = instructions.to_string();
    for source in id.consumes() {
        if let Some(result) = record.output(*source) {
            ctx.supporting.insert(*source, result.clone());
        }
    }
    ctx
}

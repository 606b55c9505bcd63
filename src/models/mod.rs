pub mod decision;
pub mod outputs;
pub mod record;

pub use decision::{Decision, DecisionSource, Route};
pub use outputs::{AnalysisOutput, CodeOutput, HandlerId, HandlerResult, ResearchOutput};
pub use record::{Analysis, Event, HandlerOutputs, LoopSignal, RecordError, SharedRecord};

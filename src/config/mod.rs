mod settings;

pub use settings::{DEFAULT_MODEL, LlmConfig, LoopConfig, OutputConfig, SwitchboardConfig};

pub mod files;

pub use files::*;

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;

use crate::orchestrator::LoopResult;

/// Trait for persisting finished runs
#[async_trait]
pub trait RecordWriter: Send + Sync {
    /// Write one run under `slug`. Returns the directory written to.
    async fn write_run(&self, result: &LoopResult, slug: &str) -> Result<PathBuf>;
}

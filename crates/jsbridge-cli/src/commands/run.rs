//! `jsbridge run` - Run a script file.

use anyhow::Context as _;
use jsbridge_core::RuntimeOptions;
use std::path::Path;

pub fn execute(file: &Path, options: RuntimeOptions) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let file_name = file.display().to_string();
    tracing::debug!(file = %file_name, bytes = source.len(), "running script");
    super::evaluate_and_print(&source, &file_name, options)
}

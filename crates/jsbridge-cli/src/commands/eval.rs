//! `jsbridge eval` - Evaluate an inline snippet.

use jsbridge_core::RuntimeOptions;

/// File name reported for inline source
const EVAL_FILE_NAME: &str = "<eval>";

pub fn execute(code: &str, options: RuntimeOptions) -> anyhow::Result<()> {
    super::evaluate_and_print(code, EVAL_FILE_NAME, options)
}

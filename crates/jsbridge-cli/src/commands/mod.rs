//! Subcommand implementations

pub mod eval;
pub mod run;

use anyhow::Context as _;
use jsbridge_core::{Context, HostCallback, HostError, Runtime, RuntimeOptions, Value};
use std::io::Write;

/// Evaluate `source` in a fresh runtime and print its completion value.
///
/// The context and runtime are closed whether or not the script fails.
pub(crate) fn evaluate_and_print(
    source: &str,
    file_name: &str,
    options: RuntimeOptions,
) -> anyhow::Result<()> {
    let runtime = Runtime::with_options(options).context("failed to start the engine")?;
    let context = runtime.create_context()?;

    let outcome = install_print(&context).and_then(|()| {
        let value = context.evaluate(source, Some(file_name))?;
        if !value.is_undefined() {
            println!("{}", value);
        }
        Ok(())
    });

    context.close()?;
    runtime.close()?;
    outcome
}

/// Expose `print(...)`, writing its arguments space-separated to stdout.
fn install_print(context: &Context) -> anyhow::Result<()> {
    context.register(
        "print",
        HostCallback::void(|_, args| {
            let values = args.to_vec()?;
            let line = values
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            for value in &values {
                value.release()?;
            }
            let mut out = std::io::stdout().lock();
            writeln!(out, "{}", line).map_err(|e| HostError::msg(e.to_string()))
        }),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_releases_its_arguments() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.create_context().unwrap();
        install_print(&context).unwrap();
        let base = context.handle_count();

        context
            .execute_void(
                "for (let i = 0; i < 100; i++) print({ i }, [i], () => i, 'text', i);",
                None,
            )
            .unwrap();
        assert_eq!(context.handle_count(), base);

        context.close().unwrap();
        runtime.close().unwrap();
    }
}

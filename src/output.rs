//! Command output selection.
//!
//! Every command renders its result in one of three formats chosen by the
//! global `--json` / `--quiet` flags. Results go to **stdout**; warnings,
//! text-mode errors, and `tracing` diagnostics go to **stderr** so stdout
//! stays parseable for scripts.
//!
//! | Format | Success | Failure |
//! |--------|---------|---------|
//! | `Text` | tables and labelled fields | `Error: ...` lines on stderr |
//! | `Json` | the result as JSON | `{"success": false, "errors": [...]}` |
//! | `Quiet` | ids only, one per line | `Error: ...` lines on stderr |

use std::io::Write;

use serde::Serialize;
use serde_json::Value;

/// Output format for the CLI.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Quiet,
}

impl OutputFormat {
    /// `--json` wins over `--quiet`.
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if json {
            OutputFormat::Json
        } else if quiet {
            OutputFormat::Quiet
        } else {
            OutputFormat::Text
        }
    }

    pub fn is_text(&self) -> bool {
        *self == OutputFormat::Text
    }

    /// Print a serializable value as pretty JSON on stdout.
    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// A line meant for humans; suppressed in JSON and quiet modes.
    pub fn info(&self, message: &str) {
        if self.is_text() {
            println!("{}", message);
        }
    }

    /// Warnings are printed on stderr in text mode. JSON payloads carry
    /// their own `warnings` array.
    pub fn warnings(&self, warnings: &[String]) {
        if self.is_text() {
            let mut err = std::io::stderr().lock();
            for w in warnings {
                let _ = writeln!(err, "Warning: {}", w);
            }
        }
    }

    /// Report a failed command.
    pub fn failure(&self, errors: &[String], warnings: &[String]) {
        match self {
            OutputFormat::Json => {
                let obj = failure_json(errors, warnings);
                if let Ok(line) = serde_json::to_string_pretty(&obj) {
                    println!("{}", line);
                }
            }
            OutputFormat::Text | OutputFormat::Quiet => {
                self.warnings(warnings);
                let mut err = std::io::stderr().lock();
                for e in errors {
                    let _ = writeln!(err, "Error: {}", e);
                }
                let _ = err.flush();
            }
        }
    }
}

/// A command failure that carries its own error and warning lists, so the
/// JSON form can report every message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}", .errors.join("; "))]
pub struct CommandFailure {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl CommandFailure {
    pub fn new(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self { errors, warnings }
    }
}

/// Print any command error in the selected format.
pub fn report_error(format: OutputFormat, err: &anyhow::Error) {
    match err.downcast_ref::<CommandFailure>() {
        Some(failure) => format.failure(&failure.errors, &failure.warnings),
        None => format.failure(&[format!("{:#}", err)], &[]),
    }
}

/// The JSON body printed for a failed command.
pub fn failure_json(errors: &[String], warnings: &[String]) -> Value {
    let mut obj = serde_json::json!({
        "success": false,
        "errors": errors,
    });
    if !warnings.is_empty() {
        obj["warnings"] = serde_json::json!(warnings);
    }
    obj
}

/// Render a JSON value as a single table cell.
pub fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) if s.is_empty() => "-".to_string(),
        Some(Value::String(s)) => s.replace('\n', " "),
        Some(other) => other.to_string(),
    }
}

/// Truncate to `width` characters, marking cut text with `...`.
pub fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let keep = width.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Install the `tracing` subscriber. `RUST_LOG` overrides the default
/// filter of warnings from this crate only.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("saf_site=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Text);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Json);
    }

    #[test]
    fn test_failure_json_shape() {
        let obj = failure_json(&["Invalid GitHub URL".to_string()], &[]);
        assert_eq!(obj, json!({ "success": false, "errors": ["Invalid GitHub URL"] }));

        let obj = failure_json(&["e".to_string()], &["w".to_string()]);
        assert_eq!(obj["warnings"], json!(["w"]));
    }

    #[test]
    fn test_cell_and_truncate() {
        assert_eq!(cell(None), "-");
        assert_eq!(cell(Some(&json!(""))), "-");
        assert_eq!(cell(Some(&json!(42))), "42");
        assert_eq!(cell(Some(&json!("a\nb"))), "a b");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
        assert_eq!(truncate("abc", 8), "abc");
    }
}

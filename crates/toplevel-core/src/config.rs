//! Shell configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{history::DEFAULT_HISTORY_LIMIT, traits::StorageError};

/// Options for an engine entry call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOptions {
    /// Allow the call to suspend.
    #[serde(rename = "async", default)]
    pub asynchronous: bool,
    /// Run with the debugger enabled.
    #[serde(default)]
    pub debugger: bool,
    /// Hide the call from the debugger.
    #[serde(default)]
    pub nodebug: bool,
}

impl CallOptions {
    /// Options for a side call that must not be traced.
    #[must_use]
    pub const fn nodebug() -> Self {
        Self {
            asynchronous: false,
            debugger: false,
            nodebug: true,
        }
    }
}

/// Configuration of a shell session.
///
/// Unknown fields are rejected; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShellConfig {
    /// Goal that runs the toplevel loop.
    pub toplevel_goal: String,
    /// Options for the toplevel call.
    pub toplevel_options: CallOptions,
    /// Command injected to abort a suspended query.
    pub abort_command: String,
    /// Command used to resume cooperative yields.
    pub yield_command: String,
    /// Side call that prints the abort notice.
    pub abort_notice_goal: String,
    /// Side call that ends a tracer marker line.
    pub trace_newline_goal: String,
    /// Maximum number of history entries.
    pub history_limit: usize,
    /// Directory of program files inside the engine.
    pub file_dir: String,
    /// The file that always exists.
    pub default_file: String,
    /// Extension added to new file names.
    pub file_extension: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            toplevel_goal: "wasm_query_loop".to_string(),
            toplevel_options: CallOptions {
                asynchronous: true,
                debugger: true,
                nodebug: false,
            },
            abort_command: "wasm_abort".to_string(),
            yield_command: "true".to_string(),
            abort_notice_goal: "print_message(informational, unwind(abort))".to_string(),
            trace_newline_goal: "nl(user_error)".to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            file_dir: "/prolog".to_string(),
            default_file: "/prolog/program.pl".to_string(),
            file_extension: ".pl".to_string(),
        }
    }
}

impl ShellConfig {
    /// Parse a JSON configuration.
    ///
    /// # Errors
    /// Returns error if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load a JSON configuration file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| StorageError::Internal(format!("{}: {e}", path.display())))?;
        Self::from_json(&text).map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    /// Override the toplevel goal.
    #[must_use]
    pub fn with_toplevel_goal(mut self, goal: impl Into<String>) -> Self {
        self.toplevel_goal = goal.into();
        self
    }

    /// Override the history bound.
    #[must_use]
    pub const fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Override the file directory and default file.
    #[must_use]
    pub fn with_file_dir(mut self, dir: impl Into<String>, default_name: &str) -> Self {
        let dir = dir.into();
        self.default_file = format!("{}/{default_name}", dir.trim_end_matches('/'));
        self.file_dir = dir;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg = ShellConfig::from_json(r#"{"history_limit": 5}"#).unwrap();
        assert_eq!(cfg.history_limit, 5);
        assert_eq!(cfg.abort_command, "wasm_abort");
        assert!(cfg.toplevel_options.asynchronous);
        assert!(cfg.toplevel_options.debugger);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        assert!(ShellConfig::from_json(r#"{"histroy_limit": 5}"#).is_err());
    }

    #[test]
    fn test_call_options_wire_names() {
        let json = serde_json::to_string(&CallOptions::nodebug()).unwrap();
        assert_eq!(json, r#"{"async":false,"debugger":false,"nodebug":true}"#);
    }

    #[test]
    fn test_with_file_dir() {
        let cfg = ShellConfig::default().with_file_dir("/work/", "main.pl");
        assert_eq!(cfg.default_file, "/work/main.pl");
        assert_eq!(cfg.file_dir, "/work/");
    }
}

//! Named program files known to the shell.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected file name.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FileNameError {
    #[error("No file name given")]
    Empty,
    #[error("Invalid file name: {0}")]
    Invalid(String),
}

/// Rejected file set mutation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FileSetError {
    #[error("Cannot delete the default file")]
    DefaultFile,
    #[error("Unknown file: {0}")]
    Unknown(String),
}

/// Turn an operator-typed name into a file path.
///
/// Accepts letters, digits, space, `.`, `-` and `_`; adds `extension` when
/// missing and places the file in `dir`.
///
/// # Errors
/// Returns error for empty names or names with other characters.
pub fn normalize_name(input: &str, dir: &str, extension: &str) -> Result<String, FileNameError> {
    let name = input.trim();
    if name.is_empty() {
        return Err(FileNameError::Empty);
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '-' | '_'));
    if !valid {
        return Err(FileNameError::Invalid(name.to_string()));
    }

    let mut name = name.to_string();
    if !name.ends_with(extension) {
        name.push_str(extension);
    }
    Ok(format!("{}/{name}", dir.trim_end_matches('/')))
}

/// Last path component.
#[must_use]
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Current file plus the list of known files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSet {
    current: String,
    list: Vec<String>,
    #[serde(skip)]
    default: String,
}

impl FileSet {
    /// A set holding only the default file.
    #[must_use]
    pub fn new(default_file: impl Into<String>) -> Self {
        let default = default_file.into();
        Self {
            current: default.clone(),
            list: vec![default.clone()],
            default,
        }
    }

    /// Attach the default file to a deserialized set and make sure it is
    /// listed first if missing.
    #[must_use]
    pub fn with_default(mut self, default_file: impl Into<String>) -> Self {
        self.default = default_file.into();
        if !self.contains(&self.default) {
            self.list.insert(0, self.default.clone());
        }
        if self.current.is_empty() {
            self.current = self.default.clone();
        }
        self
    }

    /// Make `name` current, adding it to the list if needed.
    ///
    /// Returns the previously current file when it changed, so the caller
    /// can save its buffer.
    pub fn switch_to(&mut self, name: &str) -> Option<String> {
        if !self.contains(name) {
            self.list.push(name.to_string());
        }
        if self.current == name {
            return None;
        }
        Some(std::mem::replace(&mut self.current, name.to_string()))
    }

    /// Remove a file and switch to the default file.
    ///
    /// # Errors
    /// Returns error for the default file or an unknown name.
    pub fn delete(&mut self, name: &str) -> Result<(), FileSetError> {
        if name == self.default {
            return Err(FileSetError::DefaultFile);
        }
        if !self.contains(name) {
            return Err(FileSetError::Unknown(name.to_string()));
        }
        let default = self.default.clone();
        self.switch_to(&default);
        self.list.retain(|n| n != name);
        Ok(())
    }

    /// Keep only files for which `keep` returns true. The default file and
    /// the current file are always kept.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        let (default, current) = (self.default.clone(), self.current.clone());
        self.list
            .retain(|n| *n == default || *n == current || keep(n));
    }

    /// Whether the file is known.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.list.iter().any(|n| n == name)
    }

    /// The current file.
    #[must_use]
    pub fn current(&self) -> &str {
        &self.current
    }

    /// The default file.
    #[must_use]
    pub fn default_file(&self) -> &str {
        &self.default
    }

    /// Known files in display order.
    #[must_use]
    pub fn list(&self) -> &[String] {
        &self.list
    }
}

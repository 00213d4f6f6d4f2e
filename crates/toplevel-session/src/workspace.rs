//! Program files edited alongside the toplevel.
//!
//! The workspace keeps one text buffer per file, knows which file is
//! current and persists files and query history through a
//! [`ShellStorage`]. Consulting hands the current buffer to the engine and
//! loads it with a `consult/1` query.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use toplevel_core::{
    Engine, FileNameError, FileSet, FileSetError, HistoryLog, Mode, ShellConfig, ShellStorage,
    StorageError,
    files::normalize_name,
};

use crate::{
    controller::{SessionController, SessionError},
    storage::{FILES_KEY, HISTORY_KEY},
};

/// Files, their contents and pending storage removals.
#[derive(Debug, Clone)]
pub struct Workspace {
    files: FileSet,
    buffers: BTreeMap<String, String>,
    removed: Vec<String>,
    dir: String,
    extension: String,
}

impl Workspace {
    /// A workspace holding only the empty default file.
    #[must_use]
    pub fn new(config: &ShellConfig) -> Self {
        let mut buffers = BTreeMap::new();
        buffers.insert(config.default_file.clone(), String::new());
        Self {
            files: FileSet::new(config.default_file.clone()),
            buffers,
            removed: Vec::new(),
            dir: config.file_dir.clone(),
            extension: config.file_extension.clone(),
        }
    }

    /// Load files and history from storage.
    ///
    /// Files listed without stored content are dropped, except the default
    /// file, which always exists. Unreadable values are logged and replaced
    /// by defaults.
    ///
    /// # Errors
    /// Returns error if the storage itself fails.
    pub async fn restore<S: ShellStorage + ?Sized>(
        config: &ShellConfig,
        storage: &S,
    ) -> Result<(Self, HistoryLog), SessionError> {
        let history = match storage.get(HISTORY_KEY).await? {
            Some(json) => match serde_json::from_str::<Vec<String>>(&json) {
                Ok(entries) => HistoryLog::from_entries(entries, config.history_limit),
                Err(e) => {
                    warn!(error = %e, "discarding unreadable history");
                    HistoryLog::with_limit(config.history_limit)
                }
            },
            None => HistoryLog::with_limit(config.history_limit),
        };

        let mut workspace = Self::new(config);
        let stored = match storage.get(FILES_KEY).await? {
            Some(json) => match serde_json::from_str::<FileSet>(&json) {
                Ok(files) => Some(files.with_default(config.default_file.clone())),
                Err(e) => {
                    warn!(error = %e, "discarding unreadable file list");
                    None
                }
            },
            None => None,
        };

        if let Some(mut files) = stored {
            for name in files.list().to_vec() {
                match storage.get(&name).await? {
                    Some(text) => {
                        workspace.buffers.insert(name, text);
                    }
                    None if name == config.default_file => {}
                    None => debug!(file = %name, "dropping file without content"),
                }
            }
            let buffers = &workspace.buffers;
            files.retain(|name| buffers.contains_key(name));
            if !buffers.contains_key(files.current()) {
                let default = files.default_file().to_string();
                files.switch_to(&default);
                files.retain(|name| buffers.contains_key(name));
            }
            workspace.files = files;
        }

        info!(
            files = workspace.files.list().len(),
            history = history.len(),
            "restored workspace"
        );
        Ok((workspace, history))
    }

    /// Save files, pending removals and history.
    ///
    /// # Errors
    /// Returns error if the storage fails.
    pub async fn persist<S: ShellStorage + ?Sized>(
        &mut self,
        history: &HistoryLog,
        storage: &S,
    ) -> Result<(), SessionError> {
        let entries: Vec<&str> = history.entries().collect();
        let history_json =
            serde_json::to_string(&entries).map_err(|e| StorageError::Internal(e.to_string()))?;
        let files_json =
            serde_json::to_string(&self.files).map_err(|e| StorageError::Internal(e.to_string()))?;
        storage.set(HISTORY_KEY, &history_json).await?;
        storage.set(FILES_KEY, &files_json).await?;
        for (name, text) in &self.buffers {
            storage.set(name, text).await?;
        }
        for name in self.removed.drain(..) {
            storage.remove(&name).await?;
        }
        debug!(files = self.buffers.len(), "persisted workspace");
        Ok(())
    }

    /// Create a file from an operator-typed name and make it current.
    ///
    /// Returns the normalized path. An existing file is simply selected.
    ///
    /// # Errors
    /// Returns error for an invalid name; nothing changes in that case.
    pub fn create(&mut self, input: &str) -> Result<String, FileNameError> {
        let path = normalize_name(input, &self.dir, &self.extension)?;
        self.buffers.entry(path.clone()).or_default();
        self.removed.retain(|n| *n != path);
        self.files.switch_to(&path);
        info!(file = %path, "selected file");
        Ok(path)
    }

    /// Make a known file current.
    ///
    /// # Errors
    /// Returns error for an unknown file.
    pub fn switch_to(&mut self, name: &str) -> Result<(), FileSetError> {
        if !self.files.contains(name) {
            return Err(FileSetError::Unknown(name.to_string()));
        }
        self.files.switch_to(name);
        Ok(())
    }

    /// Delete a file and fall back to the default file.
    ///
    /// # Errors
    /// Returns error for the default file or an unknown file.
    pub fn delete(&mut self, name: &str) -> Result<(), FileSetError> {
        self.files.delete(name)?;
        self.buffers.remove(name);
        self.removed.push(name.to_string());
        info!(file = %name, "deleted file");
        Ok(())
    }

    /// Hand the current file to the engine and run `consult/1` on it.
    ///
    /// # Errors
    /// Returns error if the session is not at the goal prompt. The engine's
    /// copy of the file is left untouched then.
    pub fn consult<E: Engine>(&self, session: &mut SessionController<E>) -> Result<(), SessionError> {
        if session.mode() != Mode::AwaitingCommand {
            return Err(SessionError::WrongMode {
                expected: Mode::AwaitingCommand,
                actual: session.mode(),
            });
        }
        let file = self.files.current();
        session.engine_mut().store_file(file, self.text());
        session.run_query(&format!("consult('{file}')."))
    }

    /// Text of the current file.
    #[must_use]
    pub fn text(&self) -> &str {
        self.buffers
            .get(self.files.current())
            .map_or("", String::as_str)
    }

    /// Replace the text of the current file.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.buffers
            .insert(self.files.current().to_string(), text.into());
    }

    /// Text of any known file.
    #[must_use]
    pub fn file_text(&self, name: &str) -> Option<&str> {
        self.buffers.get(name).map(String::as_str)
    }

    /// Known files.
    #[must_use]
    pub const fn files(&self) -> &FileSet {
        &self.files
    }

    /// The current file.
    #[must_use]
    pub fn current(&self) -> &str {
        self.files.current()
    }
}

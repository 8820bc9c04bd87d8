//! User-facing error guidance for the leaderboard engine.
//!
//! Wrappers (command line, GUI) hand any `anyhow::Error` to [`ErrorHandler`]
//! and get back a titled message with recovery suggestions.

use anyhow::Error;
use benchboard_core::LeaderboardError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error with a user-friendly message and recovery suggestions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedError {
    pub title: String,
    pub message: String,
    pub suggestions: Vec<String>,
    pub error_type: ErrorType,
    pub context: Option<String>,
}

/// Categories of leaderboard failures
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorType {
    /// Settings files that fail to parse or hold bad values
    Configuration,
    /// The database file is unreadable or was changed underneath us
    Storage,
    /// Analysis input that does not satisfy the summary contract
    Validation,
    /// Entries or models that are not on the leaderboard
    NotFound,
    /// Plain filesystem failures
    Io,
    Unknown,
}

impl EnhancedError {
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        error_type: ErrorType,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            suggestions: Vec::new(),
            error_type,
            context: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions.extend(suggestions);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn into_error(self) -> Error {
        Error::new(self)
    }

    /// JSON form for wrappers that render errors themselves.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({ "title": self.title, "message": self.message })
        })
    }

    pub fn format(&self, verbose: bool) -> String {
        let mut output = String::new();
        output.push_str(&format!("{}: {}\n", self.error_type.emoji(), self.title));
        output.push_str(&format!("  {}\n", self.message));

        if verbose && let Some(context) = &self.context {
            output.push_str(&format!("\n  Context: {}\n", context));
        }

        if !self.suggestions.is_empty() {
            output.push_str("\n  Suggestions:\n");
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("    {}. {}\n", i + 1, suggestion));
            }
        }
        output
    }
}

impl ErrorType {
    pub fn emoji(&self) -> &'static str {
        match self {
            ErrorType::Configuration => "🔧",
            ErrorType::Storage => "💾",
            ErrorType::Validation => "📋",
            ErrorType::NotFound => "🔍",
            ErrorType::Io => "⚡",
            ErrorType::Unknown => "❓",
        }
    }
}

impl fmt::Display for EnhancedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

impl std::error::Error for EnhancedError {}

/// Turns engine and glue errors into user-facing guidance
pub struct ErrorHandler {
    verbose: bool,
    show_suggestions: bool,
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self {
            verbose: false,
            show_suggestions: true,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn show_suggestions(mut self, show: bool) -> Self {
        self.show_suggestions = show;
        self
    }

    /// Formats `error` for display.
    pub fn handle(&self, error: &Error) -> String {
        let mut enhanced = self.enhance(error);
        if !self.show_suggestions {
            enhanced.suggestions.clear();
        }
        enhanced.format(self.verbose)
    }

    /// Classifies `error`, looking through its cause chain for a
    /// [`LeaderboardError`] before falling back to message patterns.
    pub fn enhance(&self, error: &Error) -> EnhancedError {
        if let Some(enhanced) = error.downcast_ref::<EnhancedError>() {
            return enhanced.clone();
        }
        let chain = format!("{error:#}");
        for cause in error.chain() {
            if let Some(engine) = cause.downcast_ref::<LeaderboardError>() {
                return from_leaderboard_error(engine).with_context(chain);
            }
        }
        self.classify_error(&error.to_string()).with_context(chain)
    }

    fn classify_error(&self, error_message: &str) -> EnhancedError {
        let lower_error = error_message.to_lowercase();

        if lower_error.contains("settings")
            || lower_error.contains("config")
            || lower_error.contains("toml")
        {
            return EnhancedError::new(
                "Configuration Error",
                error_message,
                ErrorType::Configuration,
            )
            .with_suggestions(vec![
                "Check .benchboard/settings.json and .benchboard/settings.local.json".to_string(),
                "Check ~/.benchboard/settings.json".to_string(),
            ]);
        }

        if lower_error.contains("permission") || lower_error.contains("denied") {
            return EnhancedError::new("Permission Error", error_message, ErrorType::Io)
                .with_suggestion("Check permissions on the leaderboard directory");
        }

        EnhancedError::new("Error", error_message, ErrorType::Unknown)
            .with_suggestion("Re-run with verbose logging and check .benchboard/observe.log")
    }
}

pub fn from_leaderboard_error(error: &LeaderboardError) -> EnhancedError {
    match error {
        LeaderboardError::StoreCorrupt { path, reason } => {
            errors::store_corrupt(&path.display().to_string(), reason)
        }
        LeaderboardError::ConcurrentModification { path } => {
            errors::concurrent_modification(&path.display().to_string())
        }
        LeaderboardError::AnalysisSourceNotFound(path) => {
            errors::analysis_not_found(&path.display().to_string())
        }
        LeaderboardError::AnalysisParse { source_ref, reason } => {
            errors::invalid_analysis(source_ref, reason)
        }
        LeaderboardError::EntryNotFound(id) => EnhancedError::new(
            "Entry Not Found",
            format!("No leaderboard entry has id '{id}'."),
            ErrorType::NotFound,
        )
        .with_suggestion("List entries to see the ids that exist"),
        LeaderboardError::UnknownModel(name) => errors::unknown_model(name),
        LeaderboardError::InsufficientModels(count) => EnhancedError::new(
            "Not Enough Models",
            format!("A comparison needs at least two distinct models, got {count}."),
            ErrorType::Validation,
        )
        .with_suggestion("Name two or more registered models"),
        LeaderboardError::Io { path, source } => EnhancedError::new(
            "File System Error",
            format!("{}: {source}", path.display()),
            ErrorType::Io,
        )
        .with_suggestions(vec![
            "Check that the leaderboard directory exists and is writable".to_string(),
            "Check free disk space".to_string(),
        ]),
    }
}

/// Constructors for the failures users hit most often
pub mod errors {
    use super::*;

    pub fn store_corrupt(path: &str, reason: &str) -> EnhancedError {
        EnhancedError::new(
            "Leaderboard Database Corrupt",
            format!("The leaderboard database '{path}' could not be read: {reason}."),
            ErrorType::Storage,
        )
        .with_suggestions(vec![
            "Restore the file from a backup if you have one".to_string(),
            "Reset the leaderboard to start over (this discards every entry)".to_string(),
        ])
    }

    pub fn concurrent_modification(path: &str) -> EnhancedError {
        EnhancedError::new(
            "Leaderboard Changed On Disk",
            format!("'{path}' was modified by another writer since it was loaded."),
            ErrorType::Storage,
        )
        .with_suggestions(vec![
            "Reload the leaderboard and retry the change".to_string(),
            "Make sure only one process writes to the leaderboard".to_string(),
        ])
    }

    pub fn analysis_not_found(path: &str) -> EnhancedError {
        EnhancedError::new(
            "Analysis File Not Found",
            format!("The analysis file '{path}' does not exist."),
            ErrorType::NotFound,
        )
        .with_suggestions(vec![
            "Check the file path".to_string(),
            "Run the analysis step before adding results to the leaderboard".to_string(),
        ])
    }

    pub fn invalid_analysis(source_ref: &str, reason: &str) -> EnhancedError {
        EnhancedError::new(
            "Invalid Analysis Summary",
            format!("'{source_ref}': {reason}."),
            ErrorType::Validation,
        )
        .with_suggestions(vec![
            "The summary must carry avg_response_time, api_success_rate, execution_success_rate and test_pass_rate".to_string(),
            "Rates must be fractions between 0 and 1".to_string(),
        ])
    }

    pub fn unknown_model(name: &str) -> EnhancedError {
        EnhancedError::new(
            "Unknown Model",
            format!("'{name}' has no entries on the leaderboard."),
            ErrorType::NotFound,
        )
        .with_suggestion("List models to see the registered names")
    }
}

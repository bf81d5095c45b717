//! Custom error types for chirp.
//!
//! Provides structured error handling with detailed context for better
//! diagnostics and user experience.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for chirp operations.
///
/// Each variant provides specific context about what went wrong,
/// enabling better error messages and programmatic error handling.
#[derive(Error, Debug)]
pub enum ChirpError {
    // =========================================================================
    // User Input Errors
    // =========================================================================
    /// Invalid user input (missing field, bad length, mismatch).
    #[error("{reason}")]
    Validation { reason: String },

    /// A unique field (username, email) is already taken.
    #[error("{field} '{value}' is already taken")]
    Conflict { field: &'static str, value: String },

    /// Bad credentials. Deliberately carries no detail about which part
    /// was wrong, to avoid user enumeration.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// A requested record does not exist.
    #[error("{item_type} '{id}' not found")]
    NotFound { item_type: &'static str, id: String },

    /// A user tried to follow themselves.
    #[error("You cannot follow yourself")]
    SelfFollow,

    // =========================================================================
    // Provider Errors
    // =========================================================================
    /// No provider registered under the given name.
    #[error("Provider '{name}' not found. Known providers: {}", known.join(", "))]
    ProviderNotFound { name: String, known: Vec<String> },

    /// A registered provider failed to construct.
    #[error("Failed to load provider '{name}': {reason}")]
    ProviderLoad { name: String, reason: String },

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    /// Database file not found (not yet initialized).
    #[error("No database found at '{path}'. Run 'chirp init' first.")]
    DatabaseNotFound { path: PathBuf },

    /// Database schema version mismatch.
    #[error("Database schema version mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: i32, found: i32 },

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Password hashing or verification infrastructure failed.
    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    /// File read/write error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file parsing error.
    #[error("Invalid configuration in '{path}': {reason}")]
    Config { path: PathBuf, reason: String },

    /// Wrapped anyhow error for gradual migration.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for chirp operations.
pub type Result<T> = std::result::Result<T, ChirpError>;

impl ChirpError {
    /// Create a validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Create a conflict error for a taken unique field.
    pub fn conflict(field: &'static str, value: impl Into<String>) -> Self {
        Self::Conflict {
            field,
            value: value.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(item_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            item_type,
            id: id.into(),
        }
    }

    /// Create a provider load error.
    pub fn provider_load(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProviderLoad {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is the user's to fix (as opposed to a fault in
    /// the environment or the program itself).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::Conflict { .. }
                | Self::InvalidCredentials
                | Self::NotFound { .. }
                | Self::SelfFollow
                | Self::ProviderNotFound { .. }
        )
    }

    /// Get a suggestion for how to fix this error, if applicable.
    #[must_use]
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::DatabaseNotFound { .. } => {
                Some("Run 'chirp init' to create the database.".to_string())
            }
            Self::SchemaMismatch { .. } => {
                Some("The database was created by an incompatible chirp version.".to_string())
            }
            Self::ProviderNotFound { name, known } => {
                let candidates: Vec<&str> = known.iter().map(String::as_str).collect();
                find_closest_match(name, &candidates, None).map(format_did_you_mean)
            }
            Self::ProviderLoad { reason, .. } if reason.contains("API key") => {
                Some("Set CHIRP_API_KEY or add api_key to the [provider] config table.".to_string())
            }
            _ => None,
        }
    }
}

// =============================================================================
// CLI Error Formatting Utilities
// =============================================================================

use colored::Colorize;

/// Format a structured CLI error with explanation and suggestions.
///
/// # Arguments
/// * `title` - Brief error title (e.g., "Provider not found")
/// * `explanation` - What went wrong and why
/// * `suggestions` - List of actionable suggestions
///
/// # Returns
/// A formatted error string ready for display.
#[must_use]
pub fn format_error(title: &str, explanation: &str, suggestions: &[&str]) -> String {
    use std::fmt::Write;

    let mut output = format!("{} {}", "✗".red().bold(), title.bold());

    if !explanation.is_empty() {
        let _ = write!(output, "\n\n   {explanation}");
    }

    if !suggestions.is_empty() {
        output.push_str("\n\n   ");
        if suggestions.len() == 1 {
            let _ = write!(output, "{} {}", "Hint:".cyan(), suggestions[0]);
        } else {
            let _ = write!(output, "{}:", "Try".cyan());
            for suggestion in suggestions {
                let _ = write!(output, "\n     {} {}", "•".dimmed(), suggestion);
            }
        }
    }

    output
}

/// Calculate the Levenshtein edit distance between two strings.
///
/// This is used for "did you mean?" suggestions when users make typos.
#[must_use]
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    // Use two rows instead of full matrix for space efficiency
    let mut prev_row: Vec<usize> = (0..=b_len).collect();
    let mut curr_row: Vec<usize> = vec![0; b_len + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;

        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }

        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_len]
}

/// Find the best match from a list of candidates for a given input.
///
/// Returns `Some(match)` if a sufficiently close match is found,
/// `None` otherwise.
///
/// # Arguments
/// * `input` - The user's input (possibly a typo)
/// * `candidates` - List of valid options
/// * `max_distance` - Maximum edit distance to consider (default: 2)
#[must_use]
pub fn find_closest_match<'a>(
    input: &str,
    candidates: &[&'a str],
    max_distance: Option<usize>,
) -> Option<&'a str> {
    let max_dist = max_distance.unwrap_or(2);
    let input_lower = input.to_lowercase();

    candidates
        .iter()
        .map(|&candidate| {
            let candidate_lower = candidate.to_lowercase();
            let distance = levenshtein_distance(&input_lower, &candidate_lower);
            (candidate, distance)
        })
        .filter(|(_, distance)| *distance <= max_dist && *distance > 0)
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Format a "did you mean?" suggestion.
#[must_use]
pub fn format_did_you_mean(suggestion: &str) -> String {
    format!("Did you mean '{}'?", suggestion.green())
}

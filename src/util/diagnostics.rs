//! Non-fatal problems recorded while encoding.
//!
//! Lenient runs keep going past malformed tags and rejected track edits,
//! but every such problem lands here with enough context to find the
//! offending upstream object. The batch driver merges these into its
//! end-of-run summary.

use std::fmt;

use super::Error;

/// One recorded problem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// Short name of the container being built.
    pub container: String,
    /// Chunk tag in effect, if any.
    pub chunk: Option<String>,
    /// Operation that reported the problem.
    pub operation: String,
    /// Rendered error message.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", self.container)?;
        if let Some(chunk) = &self.chunk {
            write!(f, "/{}", chunk)?;
        }
        write!(f, "] {}: {}", self.operation, self.message)
    }
}

/// Ordered collection of diagnostics for one container build.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    container: String,
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty collector for the named container.
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            entries: Vec::new(),
        }
    }

    /// Container short name this collector reports for.
    #[inline]
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Record an error against an operation and optional chunk.
    pub fn record(&mut self, chunk: Option<&str>, operation: impl Into<String>, error: &Error) {
        let entry = Diagnostic {
            container: self.container.clone(),
            chunk: chunk.map(str::to_string),
            operation: operation.into(),
            message: error.to_string(),
        };
        tracing::warn!(
            container = %entry.container,
            chunk = entry.chunk.as_deref().unwrap_or("-"),
            operation = %entry.operation,
            "{}",
            entry.message
        );
        self.entries.push(entry);
    }

    /// Record a pre-rendered message.
    pub fn record_message(&mut self, chunk: Option<&str>, operation: impl Into<String>, message: impl Into<String>) {
        self.record(chunk, operation, &Error::other(message));
    }

    /// Apply the strictness policy to a recoverable error.
    ///
    /// In strict mode the error is returned; otherwise it is recorded and
    /// `Ok(())` is returned so the caller can continue.
    pub fn check(&mut self, strict: bool, chunk: Option<&str>, operation: &str, error: Error) -> super::Result<()> {
        if strict || !error.is_recoverable() {
            return Err(error);
        }
        self.record(chunk, operation, &error);
        Ok(())
    }

    /// Move every entry of `other` into this collector.
    pub fn merge(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    /// Recorded entries in order.
    #[inline]
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing was recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume the collector and return its entries.
    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }
}

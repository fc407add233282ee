//! Error types for all phases of the interpreter.

use crate::span::Span;
use thiserror::Error;

/// Lexical errors. These are recoverable: the scanner records them and keeps
/// producing tokens so one pass can surface several diagnostics.
#[derive(Debug, Clone, Error)]
pub enum LexError {
    #[error("Invalid character '{0}'.")]
    InvalidCharacter(char),

    #[error("Unterminated string.")]
    UnterminatedString,

    #[error("Unterminated block comment.")]
    UnterminatedBlockComment,

    #[error("Unterminated scientific notation.")]
    UnterminatedScientificNotation,

    #[error("Invalid escape character '{0}'.")]
    InvalidEscape(char),

    #[error("Invalid {0} escape sequence.")]
    InvalidHexEscape(&'static str),

    #[error("Incomplete {0} escape sequence.")]
    IncompleteHexEscape(&'static str),

    #[error("Invalid unicode code point.")]
    InvalidCodePoint,

    #[error("Number literal was too large.")]
    NumberTooBig,
}

/// A diagnostic recorded during compilation, with enough context to point the
/// user at the offending source.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub span: Span,
    /// Source text of the offending token, when one was available.
    pub token: Option<String>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>, span: Span, token: Option<String>) -> Self {
        Self {
            message: message.into(),
            span,
            token,
        }
    }

    /// Render in the `[path line N] Error at 'tok': message` form used by the
    /// default error sink.
    pub fn render(&self, source_path: &str) -> String {
        match &self.token {
            Some(tok) => format!(
                "[{} line {}] Error at '{}': {}",
                source_path, self.span.line, tok, self.message
            ),
            None => format!(
                "[{} line {}] Error: {}",
                source_path, self.span.line, self.message
            ),
        }
    }
}

/// Compile errors surfaced to the embedding host once parsing finishes.
/// The individual diagnostics go through the configured error sink.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Compilation failed.")]
    Failed,
}

/// Runtime errors surfaced to the embedding host. Inside the VM errors are
/// plain values carried on the failing fiber; this type is the host-facing
/// rendering of an uncaught one.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("{0}")]
    Aborted(String),

    #[error("A fiber can only fail once.")]
    DoubleFault,
}

/// A unified error type for embedding and the CLI.
#[derive(Debug, Error)]
pub enum WispError {
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

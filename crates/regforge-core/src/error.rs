//! Error types for RegForge

use thiserror::Error;

/// Main error type for RegForge operations.
///
/// Parse errors carry the byte offset into the pattern where the problem
/// was detected. The enum is `Clone` so that threads waiting on an
/// in-flight compile can observe the producing thread's failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Malformed pattern not covered by a more specific variant
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    /// Quantifier with no repeatable atom before it (`*a`, `^*`)
    #[error("nothing to repeat at offset {0}")]
    NothingToRepeat(usize),

    /// Quantifier stacked on a quantifier (`a**`, `a{2}{3}`)
    #[error("multiple repeat at offset {0}")]
    MultipleRepeat(usize),

    /// Character-class range with inverted endpoints (`[z-a]`)
    #[error("bad character range at offset {0}")]
    BadCharacterRange(usize),

    /// Unclosed or stray parenthesis
    #[error("unbalanced parenthesis at offset {0}")]
    UnbalancedParenthesis(usize),

    /// Unclosed or empty `[...]`
    #[error("unterminated character set at offset {0}")]
    UnterminatedCharacterSet(usize),

    /// Malformed `{n,m}` quantifier (missing brace or digit, or `m < n`)
    #[error("malformed quantifier at offset {0}")]
    MalformedQuantifier(usize),

    /// Generated IR did not pass the verifier (internal bug class)
    #[error("module verification failed for `{function}`: {details}")]
    Verification { function: String, details: String },

    /// Backend failure while installing the compiled module
    #[error("JIT installation failed: {0}")]
    JitInstall(String),

    /// An awaited in-flight compile of the same pattern failed
    #[error("concurrent compile failed: {0}")]
    ConcurrentCompile(String),
}

/// Result type alias for RegForge operations
pub type Result<T> = std::result::Result<T, Error>;

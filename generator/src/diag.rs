// diag.rs — Error taxonomy for program generation
//
// Three families of failure exist:
//   - configuration errors (bad numeric arguments) → `ConfigError`
//   - invariant violations and failed graph verification → generator
//     defects, reported with a stable code and never retried
//   - resource errors (output files) → `GenError::Io`
//
// Strategy inapplicability is NOT an error; it is an ordinary signal inside
// the resolver and never surfaces here.

use std::fmt;
use std::path::PathBuf;

use crate::id::NodeId;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `V0002`, `I0001`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registered codes. Once assigned, a code keeps its meaning.
pub mod codes {
    use super::DiagCode;

    // Verification (whole-graph checks).
    pub const V0001: DiagCode = DiagCode("V0001"); // placeholder node left in graph
    pub const V0002: DiagCode = DiagCode("V0002"); // phi arity != control predecessors
    pub const V0003: DiagCode = DiagCode("V0003"); // operand mode mismatch
    pub const V0004: DiagCode = DiagCode("V0004"); // operand cycle without phi
    pub const V0005: DiagCode = DiagCode("V0005"); // immature block
    pub const V0006: DiagCode = DiagCode("V0006"); // call does not match callee signature
    pub const V0007: DiagCode = DiagCode("V0007"); // reference to forwarded or missing node

    // Generation invariants.
    pub const I0001: DiagCode = DiagCode("I0001"); // temporaries left unresolved
    pub const I0002: DiagCode = DiagCode("I0002"); // predecessor lookup failed
    pub const I0003: DiagCode = DiagCode("I0003"); // memory chain inconsistent
    pub const I0004: DiagCode = DiagCode("I0004"); // call cycle while cycles disabled
    pub const I0005: DiagCode = DiagCode("I0005"); // malformed control-flow topology
}

// ── Configuration errors ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("--nfuncs must be at least 1")]
    NoFunctions,
    #[error("--cfb-size must be at least 1")]
    ZeroBlockSize,
    #[error("--strid must be a non-empty file stem without path separators, got {0:?}")]
    BadStrid(String),
}

// ── Verification errors ──────────────────────────────────────────────────

/// A whole-graph verification failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct VerifyError {
    pub code: DiagCode,
    pub node: Option<NodeId>,
    pub message: String,
}

impl VerifyError {
    pub fn new(code: DiagCode, node: Option<NodeId>, message: impl Into<String>) -> Self {
        Self {
            code,
            node,
            message: message.into(),
        }
    }
}

// ── Top-level error ──────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum GenError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invariant violated [{code}]: {message}")]
    Invariant { code: DiagCode, message: String },

    #[error("verification of '{function}' failed: {source}")]
    Verify {
        function: String,
        #[source]
        source: VerifyError,
    },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {}", .messages.join("; "))]
    Read { path: String, messages: Vec<String> },
}

impl GenError {
    pub fn invariant(code: DiagCode, message: impl Into<String>) -> Self {
        GenError::Invariant {
            code,
            message: message.into(),
        }
    }

    /// The stable code of a generator defect, if this error is one.
    pub fn code(&self) -> Option<DiagCode> {
        match self {
            GenError::Invariant { code, .. } => Some(*code),
            GenError::Verify { source, .. } => Some(source.code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_error_display_carries_code() {
        let e = VerifyError::new(codes::V0002, Some(NodeId(4)), "phi %4 has 1 input, block has 2");
        assert_eq!(format!("{e}"), "[V0002] phi %4 has 1 input, block has 2");
    }

    #[test]
    fn invariant_display() {
        let e = GenError::invariant(codes::I0001, "3 temporaries pending");
        assert_eq!(
            format!("{e}"),
            "invariant violated [I0001]: 3 temporaries pending"
        );
        assert_eq!(e.code(), Some(codes::I0001));
    }

    #[test]
    fn config_error_converts() {
        let e: GenError = ConfigError::NoFunctions.into();
        assert_eq!(format!("{e}"), "--nfuncs must be at least 1");
        assert_eq!(e.code(), None);
    }

    #[test]
    fn io_error_mentions_path() {
        let e = GenError::Io {
            path: PathBuf::from("/nonexistent/main.ir"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such directory"),
        };
        assert_eq!(format!("{e}"), "/nonexistent/main.ir: no such directory");
    }

    #[test]
    fn read_error_joins_messages() {
        let e = GenError::Read {
            path: "x.ir".into(),
            messages: vec!["bad token".into(), "missing '}'".into()],
        };
        assert_eq!(format!("{e}"), "x.ir: bad token; missing '}'");
    }
}

//! Miette-based error diagnostics for CLI error presentation.
//!
//! Manifest parse failures are rendered with the offending file excerpt and
//! a label at the reported position.

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::error::{Error as StackError, ManifestError};

/// Manifest parse error with source location context.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(stackctl::manifest))]
pub struct ManifestDiagnostic {
    /// Human-readable error message.
    pub message: String,

    /// The manifest file, named by its path.
    #[source_code]
    pub src: NamedSource<String>,

    /// Byte offset and length of the problematic region.
    #[label("here")]
    pub span: Option<SourceSpan>,

    #[help]
    pub help: Option<String>,
}

impl ManifestDiagnostic {
    /// Build a diagnostic for errors that carry source text.
    ///
    /// Returns `None` for every other error, which is printed as a plain line.
    #[must_use]
    pub fn from_error(err: &StackError) -> Option<Self> {
        let StackError::Manifest(ManifestError::Parse {
            path,
            message,
            src,
            span,
        }) = err
        else {
            return None;
        };

        Some(Self {
            message: format!("failed to parse manifest {}", path.display()),
            src: NamedSource::new(path.display().to_string(), src.clone()),
            span: span.map(|(offset, len)| (offset, len.max(1)).into()),
            help: Some(message.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parse_errors_become_diagnostics() {
        let err = StackError::Manifest(ManifestError::Parse {
            path: PathBuf::from("stack.toml"),
            message: "expected `=`".into(),
            src: "[services.api\n".into(),
            span: Some((0, 13)),
        });
        let diagnostic = ManifestDiagnostic::from_error(&err).unwrap();
        assert_eq!(diagnostic.span, Some((0, 13).into()));
        assert_eq!(diagnostic.help.as_deref(), Some("expected `=`"));
    }

    #[test]
    fn other_errors_have_no_diagnostic() {
        let err = StackError::UnknownService("ghost".into());
        assert!(ManifestDiagnostic::from_error(&err).is_none());
    }
}

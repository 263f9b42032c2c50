use thiserror::Error;

use crate::diagnostic::Diagnostic;
use crate::span::Span;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source: {0}")]
    SourceIo(#[from] std::io::Error),
    #[error("{span}: {message}")]
    Lex { message: String, span: Span },
    #[error("{span}: {message}")]
    Syntax {
        message: String,
        span: Span,
        note: Option<String>,
    },
    #[error("{span}: {message}")]
    Type {
        message: String,
        span: Span,
        note: Option<String>,
    },
    #[error("{span}: {message}")]
    Name {
        message: String,
        span: Span,
        note: Option<String>,
    },
    #[error("{span}: {message}")]
    Structural { message: String, span: Span },
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        CoreError::Syntax {
            message: message.into(),
            span,
            note: None,
        }
    }

    /// `unexpected: <what>` at the offending token.
    pub fn unexpected(what: &str, span: Span) -> Self {
        CoreError::syntax(format!("unexpected: {what}"), span)
    }

    /// `expected <what>` at the offending token.
    pub fn expected(what: &str, span: Span) -> Self {
        CoreError::syntax(format!("expected {what}"), span)
    }

    pub fn unexpected_eof(what: &str, span: Span) -> Self {
        CoreError::syntax(format!("unexpected EOF; wanted {what}"), span)
    }

    pub fn type_error(message: impl Into<String>, span: Span) -> Self {
        CoreError::Type {
            message: message.into(),
            span,
            note: None,
        }
    }

    pub fn name_error(message: impl Into<String>, span: Span) -> Self {
        CoreError::Name {
            message: message.into(),
            span,
            note: None,
        }
    }

    pub fn structural(message: impl Into<String>, span: Span) -> Self {
        CoreError::Structural {
            message: message.into(),
            span,
        }
    }

    /// Attach a note. Only syntax, type and name errors carry one; others
    /// are returned unchanged.
    pub fn with_note(mut self, text: impl Into<String>) -> Self {
        match &mut self {
            CoreError::Syntax { note, .. }
            | CoreError::Type { note, .. }
            | CoreError::Name { note, .. } => {
                *note = Some(text.into());
            }
            _ => {}
        }
        self
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            CoreError::SourceIo(_) => None,
            CoreError::Lex { span, .. }
            | CoreError::Syntax { span, .. }
            | CoreError::Type { span, .. }
            | CoreError::Name { span, .. }
            | CoreError::Structural { span, .. } => Some(*span),
        }
    }

    /// The bare message, without position.
    pub fn message(&self) -> String {
        match self {
            CoreError::SourceIo(err) => err.to_string(),
            CoreError::Lex { message, .. }
            | CoreError::Syntax { message, .. }
            | CoreError::Type { message, .. }
            | CoreError::Name { message, .. }
            | CoreError::Structural { message, .. } => message.clone(),
        }
    }

    pub fn note(&self) -> Option<&str> {
        match self {
            CoreError::Syntax { note, .. }
            | CoreError::Type { note, .. }
            | CoreError::Name { note, .. } => note.as_deref(),
            _ => None,
        }
    }
}

impl From<Diagnostic> for CoreError {
    fn from(diag: Diagnostic) -> Self {
        CoreError::Lex {
            message: diag.message,
            span: diag.span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::FileId;

    #[test]
    fn structural_errors_drop_notes() {
        let span = Span::new(FileId(0), 1, 1);
        let err = CoreError::name_error("ambiguous call", span).with_note("Matches were:\n");
        assert_eq!(err.note(), Some("Matches were:\n"));

        let err = CoreError::structural("cannot find 3 levels to break from", span)
            .with_note("ignored");
        assert_eq!(err.note(), None);
        assert_eq!(err.to_string(), "2:2: cannot find 3 levels to break from");

        let err = CoreError::expected("name", span).with_note("hint\n");
        assert_eq!(err.note(), Some("hint\n"));
    }
}

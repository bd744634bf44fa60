use std::fmt;

use crate::span::Span;

/// A compiler diagnostic (error, warning, or internal compiler error).
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub system: System,
    pub message: String,
    pub span: Option<Span>,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
    /// A bug in the compiler itself, such as a backend missing a case.
    InternalError,
}

/// The compiler stage that raised a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum System {
    Program,
    Ir,
    Transform,
    Validator,
    Writer,
}

impl fmt::Display for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            System::Program => "program",
            System::Ir => "ir",
            System::Transform => "transform",
            System::Validator => "validator",
            System::Writer => "writer",
        };
        f.write_str(name)
    }
}

impl Diagnostic {
    pub fn error(system: System, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, system, message.into())
    }

    pub fn warning(system: System, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, system, message.into())
    }

    pub fn internal(system: System, message: impl Into<String>) -> Self {
        Self::new(Severity::InternalError, system, message.into())
    }

    fn new(severity: Severity, system: System, message: String) -> Self {
        Self {
            severity,
            system,
            message,
            span: None,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity >= Severity::Error
    }

    /// Render the diagnostic to stderr using ariadne.
    pub fn render(&self, filename: &str, source: &str) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
            Severity::InternalError => ReportKind::Custom("internal compiler error", Color::Magenta),
        };

        let color = match self.severity {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
            Severity::InternalError => Color::Magenta,
        };

        let span = self.span.unwrap_or_else(Span::dummy);
        let start = (span.start as usize).min(source.len());
        let end = (span.end as usize).clamp(start, source.len());

        let mut report = Report::build(kind, filename, start)
            .with_message(format!("[{}] {}", self.system, self.message));
        if self.span.is_some() {
            report = report.with_label(
                Label::new((filename, start..end))
                    .with_message(&self.message)
                    .with_color(color),
            );
        }

        for note in &self.notes {
            report = report.with_note(note);
        }

        if let Some(help) = &self.help {
            report = report.with_help(help);
        }

        if let Err(err) = report
            .finish()
            .eprint((filename, Source::from(source)))
        {
            eprintln!("{}: {} (render failed: {})", filename, self, err);
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::InternalError => "internal compiler error",
        };
        write!(f, "{} [{}]: {}", severity, self.system, self.message)
    }
}

/// Render a list of diagnostics.
pub fn render_diagnostics(diagnostics: &[Diagnostic], filename: &str, source: &str) {
    for diag in diagnostics {
        diag.render(filename, source);
    }
}

/// True if any diagnostic is an error or internal error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

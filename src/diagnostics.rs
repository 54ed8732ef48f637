mod writer;

pub use writer::*;

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use termcolor::{ColorChoice, StandardStream};

use crate::{source_files::{SourceFiles, Span}, tycheck::{ErrorKind, TypeError}};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Error,
    Warning,
    Info,
    Note,
    Help,
}

/// A single structured record produced by the type checker
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub level: Level,
    /// The error tag, present for every user-facing semantic error
    pub kind: Option<ErrorKind>,
    pub span: Option<Span>,
    pub message: String,
}

/// Collects diagnostics for a compilation and writes them out as they are emitted
pub struct Diagnostics {
    source_files: Arc<RwLock<SourceFiles>>,
    out: Mutex<Box<dyn DiagnosticsWriter + Send>>,
    records: Mutex<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new(source_files: Arc<RwLock<SourceFiles>>, color: ColorChoice) -> Self {
        Self::with_writer(source_files, StandardStream::stderr(color))
    }

    pub fn with_writer<W>(source_files: Arc<RwLock<SourceFiles>>, writer: W) -> Self
        where W: DiagnosticsWriter + Send + 'static,
    {
        Self {
            source_files,
            out: Mutex::new(Box::new(writer)),
            records: Mutex::default(),
        }
    }

    pub fn source_files(&self) -> &Arc<RwLock<SourceFiles>> {
        &self.source_files
    }

    /// Returns the number of errors emitted so far
    pub fn emitted_errors(&self) -> usize {
        self.records.lock().iter().filter(|diag| diag.level == Level::Error).count()
    }

    /// Returns a copy of every diagnostic emitted so far, in emission order
    pub fn records(&self) -> Vec<Diagnostic> {
        self.records.lock().clone()
    }

    /// Returns the tags of every emitted error, in emission order
    pub fn error_kinds(&self) -> Vec<ErrorKind> {
        self.records.lock().iter().filter_map(|diag| diag.kind.clone()).collect()
    }

    pub fn span_error(&self, span: Span, message: impl Into<String>) -> DiagnosticBuilder {
        DiagnosticBuilder::new(self, Level::Error, Some(span), message.into())
    }

    pub fn warning(&self, message: impl Into<String>) -> DiagnosticBuilder {
        DiagnosticBuilder::new(self, Level::Warning, None, message.into())
    }

    /// Starts an error diagnostic for a semantic error raised by the type checker
    pub fn type_error(&self, err: &TypeError) -> DiagnosticBuilder {
        let mut builder = self.span_error(err.span, err.kind.to_string());
        builder.kind = Some(err.kind.clone());
        builder
    }

    fn emit_diagnostic(&self, diag: Diagnostic) {
        {
            let files = self.source_files.read();
            let pos = diag.span.and_then(|span| files.pos(span));
            let mut out = self.out.lock();
            // Failing to write a diagnostic is not itself reportable
            let _ = out.write_diag(diag.level, pos, &diag.message);
        }

        self.records.lock().push(diag);
    }
}

/// Builds a diagnostic with optional attached notes. Nothing is recorded until `emit` is called.
#[must_use = "diagnostics are only recorded when `emit` is called"]
pub struct DiagnosticBuilder<'a> {
    diag: &'a Diagnostics,
    level: Level,
    kind: Option<ErrorKind>,
    span: Option<Span>,
    message: String,
    notes: Vec<(Level, Option<Span>, String)>,
}

impl<'a> DiagnosticBuilder<'a> {
    fn new(diag: &'a Diagnostics, level: Level, span: Option<Span>, message: String) -> Self {
        Self {diag, level, kind: None, span, message, notes: Vec::new()}
    }

    pub fn note(mut self, message: impl Into<String>) -> Self {
        self.notes.push((Level::Note, None, message.into()));
        self
    }

    pub fn help(mut self, message: impl Into<String>) -> Self {
        self.notes.push((Level::Help, None, message.into()));
        self
    }

    pub fn emit(self) {
        let Self {diag, level, kind, span, message, notes} = self;
        diag.emit_diagnostic(Diagnostic {level, kind, span, message});

        for (level, span, message) in notes {
            diag.emit_diagnostic(Diagnostic {level, kind: None, span, message});
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::tycheck::ErrorKind;

    #[test]
    fn records_and_counts_errors() {
        let files = Arc::new(RwLock::new(SourceFiles::default()));
        let handle = files.write().add_source("m.py", "m", b"x = y\n");
        let span = files.read().span(handle);
        let diag = Diagnostics::with_writer(files, BytesWriter::new(ColorChoice::Never));

        diag.warning("unused value").emit();
        assert_eq!(diag.emitted_errors(), 0);

        let err = TypeError {kind: ErrorKind::IdNotFound("y".into()), span: Span {start: span.start + 4, end: span.start + 5}};
        diag.type_error(&err).note("names must be bound before use").emit();

        assert_eq!(diag.emitted_errors(), 1);
        assert_eq!(diag.error_kinds(), vec![ErrorKind::IdNotFound("y".into())]);

        let records = diag.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].message, "name 'y' is not defined");
        assert_eq!(records[2].level, Level::Note);
    }
}

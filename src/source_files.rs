mod span;
mod file_source;
mod line_numbers;

pub use span::*;
pub use file_source::*;

use std::sync::Arc;
use std::path::{Path, PathBuf};

use line_numbers::LineNumbers;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle {
    /// The index of the first byte of the module in `SourceFiles::source`
    start: usize,
    /// The number of bytes in the module
    len: usize,
}

#[derive(Debug)]
struct File {
    path: PathBuf,
    /// The dotted module name this source was registered under
    mod_name: Arc<str>,
    /// The index into `SourceFiles::source` that represents the start of this module
    start_offset: usize,
    /// An index of the line numbers for all offsets in the module
    line_numbers: LineNumbers,
    /// The handle to this module's source
    handle: FileHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePos<'a> {
    pub path: &'a Path,
    pub start_line: usize,
    pub start_offset: usize,
    pub end_line: usize,
    pub end_offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLine<'a> {
    pub path: &'a Path,
    pub line: usize,
    pub bytes: &'a [u8],
}

/// The source text of every module handed to the type checker
///
/// The checker never reads source text itself. Spans on the pre-resolved tree index into the
/// concatenation of all registered sources so that diagnostics can be resolved to lines.
#[derive(Debug, Default)]
pub struct SourceFiles {
    /// The source code of all modules concatenated together.
    ///
    /// This allows span indexes to be uniquely identifiable
    source: Vec<u8>,
    /// Metadata about each module stored in `source`
    ///
    /// Sorted by the offset
    files: Vec<File>,
}

impl SourceFiles {
    /// Adds the given source to the set of source files under the given module name. Returns a
    /// handle to that module's contents.
    pub fn add_source<P: AsRef<Path>>(&mut self, path: P, mod_name: &str, source: &[u8]) -> FileHandle {
        let start = self.source.len();
        self.source.extend(source);

        let handle = FileHandle {start, len: source.len()};
        let line_numbers = LineNumbers::new(self.source(handle));

        self.files.push(File {
            path: path.as_ref().to_path_buf(),
            mod_name: mod_name.into(),
            start_offset: start,
            line_numbers,
            handle,
        });

        handle
    }

    /// Returns the span covering the entire source of the given module
    pub fn span(&self, handle: FileHandle) -> Span {
        Span {start: handle.start, end: handle.start + handle.len}
    }

    /// Returns the resolved file and position information for a span
    ///
    /// Synthesized nodes and trees built without registered source text produce spans that
    /// point nowhere; those resolve to `None`.
    pub fn pos(&self, span: Span) -> Option<FilePos> {
        let File {path, line_numbers, handle, ..} = self.file(span.start)?;
        if span.end > handle.start + handle.len {
            return None;
        }

        let (start_line, start_offset) = line_numbers.number_offset(span.start);
        // Subtract 1 because end actually represents one past the end of the span
        let (end_line, end_offset) = line_numbers.number_offset(span.end.max(span.start + 1) - 1);

        Some(FilePos {path, start_line, start_offset, end_line, end_offset})
    }

    /// Returns resolved file and line info for the line containing the given index
    pub fn line(&self, index: usize) -> Option<FileLine> {
        let File {path, line_numbers, handle, ..} = self.file(index)?;
        let (line, _) = line_numbers.number_offset(index);
        let (start, end) = line_numbers.line_indexes(line);
        let bytes = self.source(*handle).slice(start..end);

        Some(FileLine {path, line, bytes})
    }

    /// Returns the name of the module whose source contains the given index
    pub fn mod_name(&self, index: usize) -> Option<&Arc<str>> {
        self.file(index).map(|file| &file.mod_name)
    }

    /// Returns the source for the given file handle
    pub fn source(&self, handle: FileHandle) -> FileSource {
        let FileHandle {start, len} = handle;
        FileSource {
            bytes: &self.source[start..start+len],
            offset: start,
        }
    }

    fn file(&self, index: usize) -> Option<&File> {
        if index >= self.source.len() {
            return None;
        }

        let file_index = match self.files.binary_search_by_key(&index, |file| file.start_offset) {
            Ok(index) => index,
            Err(0) => return None,
            Err(index) => index - 1,
        };
        self.files.get(file_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_positions_across_modules() {
        let mut files = SourceFiles::default();
        let first = files.add_source("a.py", "a", b"x = 1\ny = x + 2\n");
        let second = files.add_source("b.py", "b", b"z = 3\n");

        let span = Span {start: files.span(first).start + 10, end: files.span(first).start + 15};
        let pos = files.pos(span).unwrap();
        assert_eq!((pos.start_line, pos.start_offset), (2, 5));
        assert_eq!((pos.end_line, pos.end_offset), (2, 9));
        assert_eq!(pos.path, Path::new("a.py"));

        let start = files.span(second).start;
        assert_eq!(&**files.mod_name(start).unwrap(), "b");
        assert_eq!(files.line(start).unwrap().bytes, b"z = 3\n");
    }

    #[test]
    fn dangling_spans_resolve_to_nothing() {
        let files = SourceFiles::default();
        assert_eq!(files.pos(Span::default()), None);
    }
}

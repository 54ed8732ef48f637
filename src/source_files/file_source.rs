use std::ops::Range;

/// The source of one module, represented as a slice of bytes and indexed from `start_index()`
/// onwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileSource<'a> {
    /// A slice of `SourceFiles::source`
    pub(in super) bytes: &'a [u8],
    /// The offset at which the slice of bytes was extracted from `SourceFiles::source`
    pub(in super) offset: usize,
}

impl<'a> FileSource<'a> {
    /// Returns the first index into this slice
    pub fn start_index(&self) -> usize {
        self.offset
    }

    /// Returns the number of bytes in the module
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Slices from the bytes of this module's source using global indexes
    pub fn slice(&self, range: Range<usize>) -> &'a [u8] {
        let Range {start, end} = range;
        &self.bytes[start-self.offset..end-self.offset]
    }

    /// Returns the global index of every byte that starts a new line (excluding the first line)
    pub fn line_starts(&self) -> impl Iterator<Item=usize> + '_ {
        self.bytes.iter().enumerate()
            .filter(|&(_, &byte)| byte == b'\n')
            .map(move |(index, _)| self.offset + index + 1)
    }
}

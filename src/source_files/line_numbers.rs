use super::FileSource;

#[derive(Debug)]
pub struct LineNumbers {
    /// The index in `SourceFiles::source` of the first byte in each line, followed by one past
    /// the end of the module
    offsets: Vec<usize>,
}

impl LineNumbers {
    pub fn new(source: FileSource) -> Self {
        let mut offsets = vec![source.start_index()];
        offsets.extend(source.line_starts());
        offsets.push(source.start_index() + source.len());

        Self {offsets}
    }

    /// Returns the 1-based (line number, column) corresponding to the given index
    pub fn number_offset(&self, index: usize) -> (usize, usize) {
        // Number of line starts at or before `index`
        let line = self.offsets.partition_point(|&start| start <= index).max(1);
        let column = index - self.offsets[line-1] + 1;

        (line, column)
    }

    /// Returns the (start index, end index) of this line
    pub fn line_indexes(&self, line: usize) -> (usize, usize) {
        (self.offsets[line-1], self.offsets[line])
    }
}

/// A span of a module's source text
///
/// Invariants:
/// * Span must be of size >= 0, i.e. `end >= start`
/// * The `start` and `end` indexes MUST remain within the boundaries of a single module. That
///   is, you can never span two modules at the same time.
///
/// Nodes synthesized by the type checker reuse the span of the node they were derived from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    /// The start index of the span (inclusive)
    pub start: usize,
    /// The end index of the span (exclusive)
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        assert!(end >= start, "bug: span should have at least zero size");
        Self {start, end}
    }

    /// Creates a span from the start of `self` to the end of `other`
    pub fn to(self, other: Self) -> Self {
        assert!(other.end >= self.start, "bug: span should have at least zero size");

        Self {
            start: self.start,
            end: other.end,
        }
    }
}

use std::{cmp, fmt, sync::Arc};

use crate::SourceId;

/// A one-based line and column pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineCol {
    pub line: usize,
    pub col: usize,
}

impl fmt::Display for LineCol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A byte range into a shared source text.
///
/// Line and column information is derived from the source on demand, so spans stay cheap to
/// clone and to stamp onto every IR value.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    src: Arc<str>,
    start: usize,
    end: usize,
    source_id: Option<SourceId>,
}

impl Span {
    pub fn new(
        src: Arc<str>,
        start: usize,
        end: usize,
        source_id: Option<SourceId>,
    ) -> Option<Span> {
        src.get(start..end)?;
        Some(Span {
            src,
            start,
            end,
            source_id,
        })
    }

    /// A span covering the whole of `src`.
    pub fn from_string(src: String) -> Span {
        let end = src.len();
        Span {
            src: Arc::from(src),
            start: 0,
            end,
            source_id: None,
        }
    }

    pub fn dummy() -> Span {
        Span {
            src: Arc::from(""),
            start: 0,
            end: 0,
            source_id: None,
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.src.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.src[self.start..self.end]
    }

    pub fn src(&self) -> &Arc<str> {
        &self.src
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn source_id(&self) -> Option<&SourceId> {
        self.source_id.as_ref()
    }

    pub fn start_line_col(&self) -> LineCol {
        line_col_at(&self.src, self.start)
    }

    pub fn end_line_col(&self) -> LineCol {
        line_col_at(&self.src, self.end)
    }

    /// Both ends of the span as line/column pairs.
    pub fn line_col(&self) -> (LineCol, LineCol) {
        (self.start_line_col(), self.end_line_col())
    }

    /// The smallest span covering both `lhs` and `rhs`, which must come from the same source.
    pub fn join(lhs: Span, rhs: &Span) -> Span {
        if lhs.is_dummy() {
            return rhs.clone();
        }
        if rhs.is_dummy() {
            return lhs;
        }
        assert!(
            Arc::ptr_eq(&lhs.src, &rhs.src) || lhs.src == rhs.src,
            "joining spans from different sources"
        );
        Span {
            start: cmp::min(lhs.start, rhs.start),
            end: cmp::max(lhs.end, rhs.end),
            src: lhs.src,
            source_id: lhs.source_id,
        }
    }

    /// Strip leading and trailing whitespace from the span.
    pub fn trim(self) -> Span {
        let text = self.as_str();
        let start_delta = text.len() - text.trim_start().len();
        let end_delta = text.len() - text.trim_end().len();
        if start_delta == text.len() {
            return Span {
                end: self.start,
                ..self
            };
        }
        Span {
            start: self.start + start_delta,
            end: self.end - end_delta,
            ..self
        }
    }
}

fn line_col_at(src: &str, pos: usize) -> LineCol {
    let before = &src[..pos];
    let line = before.matches('\n').count() + 1;
    let col = match before.rfind('\n') {
        Some(nl) => before[nl + 1..].chars().count() + 1,
        None => before.chars().count() + 1,
    };
    LineCol { line, col }
}

impl fmt::Debug for Span {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Span")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("as_str", &self.as_str())
            .finish()
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (start, end) = self.line_col();
        write!(f, "{start}-{end}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_is_one_based() {
        let src: Arc<str> = Arc::from("a = 1\nbb = c\n");
        let span = Span::new(src, 11, 12, None).unwrap();
        assert_eq!(span.as_str(), "c");
        assert_eq!(span.start_line_col(), LineCol { line: 2, col: 6 });
        assert_eq!(span.end_line_col(), LineCol { line: 2, col: 7 });
    }

    #[test]
    fn join_covers_both() {
        let src: Arc<str> = Arc::from("foo(bar)");
        let lhs = Span::new(src.clone(), 0, 3, None).unwrap();
        let rhs = Span::new(src, 4, 7, None).unwrap();
        assert_eq!(Span::join(lhs, &rhs).as_str(), "foo(bar");
    }

    #[test]
    fn out_of_range_is_rejected() {
        assert!(Span::new(Arc::from("ab"), 1, 5, None).is_none());
    }

    #[test]
    fn trim_whitespace() {
        let span = Span::from_string("  x \n".to_string()).trim();
        assert_eq!(span.as_str(), "x");
    }
}

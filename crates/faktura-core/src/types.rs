//! Page geometry, tokens, rows, and segments.
//!
//! Ownership is arena-shaped (spec §9 REDESIGN FLAGS, "cyclic references between
//! layout objects"): a [`Page`] owns its [`Token`]s in a `Vec`; [`Row`] and
//! [`Segment`] hold indices into that vec rather than references or back-pointers.
//! This keeps the graph acyclic and lets every downstream struct be `Clone` without
//! an `Rc`/`Weak` dance.

use serde::{Deserialize, Serialize};

/// A bounding box in page points (72 points per inch), top-left origin unless
/// noted otherwise by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BBox {
    #[must_use]
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    #[must_use]
    pub fn y_center(&self) -> f64 {
        self.y + self.h / 2.0
    }

    /// Union bounding box of two boxes.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Self::new(x, y, right - x, bottom - y)
    }

    /// Union of a non-empty slice of boxes. Panics on an empty slice; callers
    /// must never try to build traceability evidence with zero matched tokens.
    #[must_use]
    pub fn union_all(boxes: &[Self]) -> Self {
        let mut iter = boxes.iter();
        let first = *iter.next().expect("union_all requires at least one bbox");
        iter.fold(first, |acc, b| acc.union(b))
    }

    /// Centroid distance in points, used by the pattern matcher (spec §4.9).
    #[must_use]
    pub fn centroid_distance(&self, other: &Self) -> f64 {
        let (ax, ay) = (self.x + self.w / 2.0, self.y + self.h / 2.0);
        let (bx, by) = (other.x + other.w / 2.0, other.y + other.h / 2.0);
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }
}

/// A word-level text fragment with a bounding box on a page.
///
/// `confidence` is present iff the token came from OCR (spec §3 invariant:
/// "confidence present iff from OCR"); negative OCR confidences are excluded
/// before a `Token` is ever constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub bbox: BBox,
    /// OCR confidence in `[0, 100]`. `None` for embedded-text tokens.
    pub confidence: Option<f32>,
    /// Font name, when the source tokenizer can report it (embedded-text only).
    pub font_name: Option<String>,
    /// Font size in points, when available.
    pub font_size: Option<f32>,
}

impl Token {
    #[must_use]
    pub fn new(text: impl Into<String>, bbox: BBox) -> Self {
        Self {
            text: text.into(),
            bbox,
            confidence: None,
            font_name: None,
            font_size: None,
        }
    }

    #[must_use]
    pub fn with_ocr_confidence(mut self, confidence: f32) -> Self {
        debug_assert!(confidence >= 0.0, "negative OCR confidence must be filtered upstream");
        self.confidence = Some(confidence);
        self
    }
}

/// A row of tokens sharing a Y band, ordered left to right.
///
/// `token_indices` (source of truth) index into `Page::tokens`; `text` is a
/// cached, space-joined convenience string rebuilt whenever the row is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub token_indices: Vec<usize>,
    pub y_center: f64,
    pub x_start: f64,
    pub x_end: f64,
    pub text: String,
}

/// The kind of content a [`Segment`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Header,
    Items,
    Footer,
}

/// A contiguous run of rows on a page, labeled by [`SegmentKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub kind: SegmentKind,
    pub row_indices: Vec<usize>,
    pub y_top: f64,
    pub y_bottom: f64,
}

/// One page of a [`Document`]: geometry plus the tokens discovered on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page index.
    pub index: usize,
    pub width: f64,
    pub height: f64,
    pub tokens: Vec<Token>,
    /// Rows derived from `tokens` by the layout analyzer; populated after layout runs.
    pub rows: Vec<Row>,
    /// Segments derived from `rows`; populated after layout runs.
    pub segments: Vec<Segment>,
}

impl Page {
    #[must_use]
    pub fn new(index: usize, width: f64, height: f64) -> Self {
        assert!(width > 0.0 && height > 0.0, "page dimensions must be positive");
        Self {
            index,
            width,
            height,
            tokens: Vec::new(),
            rows: Vec::new(),
            segments: Vec::new(),
        }
    }

    #[must_use]
    pub fn row_text(&self, row: &Row) -> &str {
        &row.text
    }

    /// Tokens belonging to a row, resolved through the arena.
    #[must_use]
    pub fn row_tokens<'a>(&'a self, row: &Row) -> Vec<&'a Token> {
        row.token_indices.iter().map(|&i| &self.tokens[i]).collect()
    }

    /// Rows belonging to a segment, resolved through the arena.
    #[must_use]
    pub fn segment_rows<'a>(&'a self, segment: &Segment) -> Vec<&'a Row> {
        segment.row_indices.iter().map(|&i| &self.rows[i]).collect()
    }
}

/// An ordered set of pages read from one PDF file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub path: String,
    pub pages: Vec<Page>,
}

impl Document {
    #[must_use]
    pub fn new(path: impl Into<String>, pages: Vec<Page>) -> Self {
        for (i, page) in pages.iter().enumerate() {
            debug_assert_eq!(page.index, i + 1, "page indices must be contiguous starting at 1");
        }
        Self { path: path.into(), pages }
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_union_covers_both() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(5.0, 5.0, 10.0, 10.0);
        let u = a.union(&b);
        assert_eq!(u.x, 0.0);
        assert_eq!(u.y, 0.0);
        assert_eq!(u.right(), 15.0);
        assert_eq!(u.bottom(), 15.0);
    }

    #[test]
    fn bbox_union_all_single() {
        let a = BBox::new(1.0, 1.0, 2.0, 2.0);
        assert_eq!(BBox::union_all(&[a]), a);
    }

    #[test]
    fn centroid_distance_is_symmetric() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(100.0, 0.0, 10.0, 10.0);
        assert_eq!(a.centroid_distance(&b), b.centroid_distance(&a));
        assert!((a.centroid_distance(&b) - 100.0).abs() < 1e-9);
    }

    #[test]
    #[should_panic(expected = "page dimensions must be positive")]
    fn page_rejects_zero_height() {
        let _ = Page::new(1, 612.0, 0.0);
    }

    #[test]
    fn row_tokens_resolve_through_arena() {
        let mut page = Page::new(1, 612.0, 792.0);
        page.tokens.push(Token::new("Hello", BBox::new(0.0, 0.0, 10.0, 10.0)));
        page.tokens.push(Token::new("World", BBox::new(15.0, 0.0, 10.0, 10.0)));
        let row = Row {
            token_indices: vec![0, 1],
            y_center: 5.0,
            x_start: 0.0,
            x_end: 25.0,
            text: "Hello World".to_string(),
        };
        let resolved = page.row_tokens(&row);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].text, "Hello");
        assert_eq!(resolved[1].text, "World");
    }
}

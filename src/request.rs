//! Request parameters and URL templates for the remote image resolver.
//!
//! A [`UrlTemplate`] is parsed once per session. Rendering it against a
//! [`RequestParams`] always substitutes every placeholder: unknown fields are
//! rejected at parse time and every field always carries a value.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;

use crate::error::TemplateError;

/// Tiled addressing on the nb.no resolver: 1024x1024 tiles at level 5.
pub const DEFAULT_TILED_TEMPLATE: &str = "https://www.nb.no/services/image/resolver?url_ver=geneza&urn=URN:NBN:no-nb_{doc_type}_{book_id}_{long_page_nr}&maxLevel=5&level=5&col={col}&row={row}&resX=9999&resY=9999&tileWidth=1024&tileHeight=1024&pg_id={page_nr}";

/// Full-page addressing: one image per page scaled to `{width}`.
pub const DEFAULT_DIRECT_TEMPLATE: &str = "https://www.nb.no/services/image/resolver/URN:NBN:no-nb_{doc_type}_{book_id}_{long_page_nr}/full/{width},/0/native.jpg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DocumentType {
    /// Openly licensed books.
    Digibok,
    /// Legal-deposit monographs; usually need an authenticated session.
    Pliktmonografi,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Digibok => "digibok",
            DocumentType::Pliktmonografi => "pliktmonografi",
        }
    }

    pub fn requires_auth(&self) -> bool {
        matches!(self, DocumentType::Pliktmonografi)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A page of the book as the resolver names it.
///
/// Variants are declared in reading order, so the derived `Ord` sorts a
/// book front cover first and back cover last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PageId {
    FrontCover,
    /// Introduction pages, 1-based.
    Intro(u32),
    Number(u32),
    BackCover,
}

impl PageId {
    pub fn label(&self) -> String {
        match self {
            PageId::Number(n) => n.to_string(),
            PageId::FrontCover => "C1".to_string(),
            PageId::BackCover => "C3".to_string(),
            PageId::Intro(n) => format!("I{}", n),
        }
    }

    /// Form used inside the document URN: numbers are zero-padded to four digits.
    pub fn padded(&self) -> String {
        match self {
            PageId::Number(n) => format!("{:04}", n),
            other => other.label(),
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.jpg", self.label())
    }
}

impl FromStr for PageId {
    type Err = String;

    /// Parses a label as produced by [`PageId::label`]. Indices start at 1.
    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("not a page label: {:?}", label);
        let index = |digits: &str| match digits.parse::<u32>() {
            Ok(0) | Err(_) => Err(invalid()),
            Ok(n) => Ok(n),
        };
        match label {
            "C1" => Ok(PageId::FrontCover),
            "C3" => Ok(PageId::BackCover),
            _ => match label.strip_prefix('I') {
                Some(digits) => index(digits).map(PageId::Intro),
                None => index(label).map(PageId::Number),
            },
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Zero-based tile position within a page grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileCoord {
    pub row: u32,
    pub col: u32,
}

impl TileCoord {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

/// Current values of every template field.
#[derive(Debug, Clone)]
pub struct RequestParams {
    doc_type: DocumentType,
    book_id: String,
    page_nr: String,
    long_page_nr: String,
    tile: TileCoord,
    width: u32,
}

impl RequestParams {
    pub fn new(doc_type: DocumentType, book_id: impl Into<String>, width: u32) -> Self {
        let first = PageId::Number(1);
        Self {
            doc_type,
            book_id: book_id.into(),
            page_nr: first.label(),
            long_page_nr: first.padded(),
            tile: TileCoord::default(),
            width,
        }
    }

    pub fn set_page(&mut self, page: PageId) {
        self.page_nr = page.label();
        self.long_page_nr = page.padded();
    }

    pub fn set_tile(&mut self, tile: TileCoord) {
        self.tile = tile;
    }

    fn value(&self, field: Field) -> String {
        match field {
            Field::DocType => self.doc_type.as_str().to_string(),
            Field::BookId => self.book_id.clone(),
            Field::PageNr => self.page_nr.clone(),
            Field::LongPageNr => self.long_page_nr.clone(),
            Field::Row => self.tile.row.to_string(),
            Field::Col => self.tile.col.to_string(),
            Field::Width => self.width.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    DocType,
    BookId,
    PageNr,
    LongPageNr,
    Row,
    Col,
    Width,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "doc_type" => Field::DocType,
            "book_id" => Field::BookId,
            "page_nr" => Field::PageNr,
            "long_page_nr" => Field::LongPageNr,
            "row" => Field::Row,
            "col" => Field::Col,
            "width" => Field::Width,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl UrlTemplate {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = template;
        let mut offset = 0;

        while let Some(open) = rest.find('{') {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or(TemplateError::Unterminated(offset + open))?;
            let name = &after[..close];
            let field =
                Field::parse(name).ok_or_else(|| TemplateError::UnknownField(name.to_string()))?;
            segments.push(Segment::Field(field));

            let consumed = open + 1 + close + 1;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    pub fn render(&self, params: &RequestParams) -> String {
        let mut url = String::with_capacity(self.source.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => url.push_str(text),
                Segment::Field(field) => url.push_str(&params.value(*field)),
            }
        }
        url
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

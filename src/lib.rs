//! # nb2pdf
//!
//! A CLI utility that rebuilds digitized books from the National Library of
//! Norway's image resolver into PDF files.
//!
//! The resolver exposes no metadata, so the tool discovers the tile grid of a
//! page and the length of the book by probing, stitches every page together
//! from its tiles and binds the pages into one document.
//!
//! ## Usage
//!
//! ```bash
//! nb2pdf download 2012010 --type digibok
//! nb2pdf download 000123456 --type pliktmonografi --cookie "$JSESSIONID"
//! ```

mod assembler;
mod cookies;
mod downloader;
mod error;
mod grid;
mod length;
mod pdf_builder;
mod request;
mod session;
mod source;

#[cfg(test)]
mod test_support;

pub use assembler::{assemble_page, probe_page, PageFetchStrategy, RetryBudget};
pub use cookies::{build_jar, from_argument, load_cookie_file, parse_cookie_string, Cookie};
pub use downloader::{DownloadOptions, DownloadReport, Downloader, PageOutcome, PageRecord};
pub use error::{
    AssemblyError, CookieError, DownloadError, FetchError, PdfError, SessionError, TemplateError,
};
pub use grid::{discover_grid, Grid};
pub use length::find_length;
pub use pdf_builder::PdfBuilder;
pub use request::{
    DocumentType, PageId, RequestParams, TileCoord, UrlTemplate, DEFAULT_DIRECT_TEMPLATE,
    DEFAULT_TILED_TEMPLATE,
};
pub use session::{AddressingMode, BookConfig, BookSession, DEFAULT_DIRECT_WIDTH};
pub use source::{HttpSource, ImageSource};

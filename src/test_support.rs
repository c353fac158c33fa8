//! Synthetic image sources for unit tests.

use std::io::Cursor;
use std::sync::Mutex;

use image::{ImageFormat, Rgb, RgbImage};

use crate::error::FetchError;
use crate::request::DocumentType;
use crate::session::{AddressingMode, BookConfig};
use crate::source::ImageSource;

pub(crate) const MOCK_TEMPLATE: &str =
    "mock://{doc_type}/{book_id}/{page_nr}/{long_page_nr}/{row}/{col}/{width}";

/// A request decoded back from a [`MOCK_TEMPLATE`] URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MockRequest {
    pub page: String,
    pub long_page: String,
    pub row: u32,
    pub col: u32,
    pub width: u32,
}

impl MockRequest {
    pub fn parse(url: &str) -> Self {
        let parts: Vec<&str> = url.trim_start_matches("mock://").split('/').collect();
        Self {
            page: parts[2].to_string(),
            long_page: parts[3].to_string(),
            row: parts[4].parse().unwrap(),
            col: parts[5].parse().unwrap(),
            width: parts[6].parse().unwrap(),
        }
    }
}

/// What the synthetic server answers for one request.
pub(crate) enum Reply {
    Image(Vec<u8>),
    Status(u16),
}

type Responder = Box<dyn Fn(&MockRequest) -> Reply + Send + Sync>;

pub(crate) struct SyntheticSource {
    respond: Responder,
    requests: Mutex<Vec<MockRequest>>,
}

impl SyntheticSource {
    pub fn new(respond: impl Fn(&MockRequest) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A tiled book: pages in `valid_pages`, `rows x cols` tiles of `tile_w x tile_h`.
    pub fn tiled(
        rows: u32,
        cols: u32,
        tile_w: u32,
        tile_h: u32,
        valid_page: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::new(move |req| {
            if valid_page(&req.page) && req.row < rows && req.col < cols {
                Reply::Image(tile_png(tile_w, tile_h, marker(req.row, req.col)))
            } else {
                Reply::Status(404)
            }
        })
    }

    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl ImageSource for SyntheticSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let request = MockRequest::parse(url);
        self.requests.lock().unwrap().push(request.clone());
        match (self.respond)(&request) {
            Reply::Image(body) => Ok(body),
            Reply::Status(status) if status == 401 || status == 403 => Err(FetchError::Auth {
                url: url.to_string(),
                status,
            }),
            Reply::Status(status) => Err(FetchError::Status {
                url: url.to_string(),
                status,
            }),
        }
    }
}

/// Colour that identifies tile `(row, col)`.
pub(crate) fn marker(row: u32, col: u32) -> Rgb<u8> {
    Rgb([(row * 40 + 10) as u8, (col * 40 + 10) as u8, 200])
}

pub(crate) fn tile_png(width: u32, height: u32, colour: Rgb<u8>) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, colour);
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

pub(crate) fn config(mode: AddressingMode) -> BookConfig {
    let mut config = BookConfig::new("000123456", DocumentType::Digibok);
    config.mode = mode;
    config.url_template = Some(MOCK_TEMPLATE.to_string());
    config
}

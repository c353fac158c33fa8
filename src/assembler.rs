//! Page reconstruction.
//!
//! A page is either fetched whole ([`PageFetchStrategy::DirectPage`]) or
//! stitched from its tiles ([`PageFetchStrategy::TiledPage`]). Both share one
//! bounded retry loop driven by a per-page [`RetryBudget`].

use image::{imageops, RgbImage};
use tracing::{debug, warn};

use crate::error::{AssemblyError, FetchError};
use crate::grid::Grid;
use crate::request::{PageId, TileCoord};
use crate::session::BookSession;
use crate::source::ImageSource;

/// Chosen once per session from the addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFetchStrategy {
    DirectPage,
    TiledPage(Grid),
}

/// Failed attempts a page may still absorb before it is abandoned.
///
/// Shared by every tile of one page and never carried over to the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryBudget {
    remaining: u32,
    attempts: u32,
}

impl RetryBudget {
    pub const DEFAULT_RETRIES: u32 = 2;

    pub fn new(retries: u32) -> Self {
        Self {
            remaining: retries,
            attempts: 0,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Requests issued against this budget so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Takes one retry; `false` once the budget is spent.
    fn consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RETRIES)
    }
}

/// Fetches and, in tiled mode, composites one page.
pub async fn assemble_page<S: ImageSource>(
    session: &mut BookSession<S>,
    page: PageId,
    budget: &mut RetryBudget,
) -> Result<RgbImage, AssemblyError> {
    match session.strategy() {
        PageFetchStrategy::DirectPage => {
            let url = session.url_for(page, TileCoord::default());
            fetch_image(session.source(), &url, page, budget).await
        }
        PageFetchStrategy::TiledPage(grid) => assemble_tiles(session, page, grid, budget).await,
    }
}

async fn assemble_tiles<S: ImageSource>(
    session: &mut BookSession<S>,
    page: PageId,
    grid: Grid,
    budget: &mut RetryBudget,
) -> Result<RgbImage, AssemblyError> {
    let mut canvas = RgbImage::new(grid.width, grid.height);
    let mut y_offset = 0u32;

    for row in 0..grid.rows {
        let mut x_offset = 0u32;
        let mut row_height = 0u32;

        for col in 0..grid.cols {
            let url = session.url_for(page, TileCoord::new(row, col));
            let tile = fetch_image(session.source(), &url, page, budget).await?;

            imageops::replace(&mut canvas, &tile, i64::from(x_offset), i64::from(y_offset));
            x_offset += tile.width();
            row_height = tile.height();
        }

        y_offset += row_height;
    }

    debug!(page = %page, tiles = grid.rows * grid.cols, "Page assembled");
    Ok(canvas)
}

/// Fetches and decodes `url`, re-issuing the same request while the budget lasts.
async fn fetch_image<S: ImageSource>(
    source: &S,
    url: &str,
    page: PageId,
    budget: &mut RetryBudget,
) -> Result<RgbImage, AssemblyError> {
    loop {
        budget.record_attempt();
        let result = match source.fetch(url).await {
            Ok(body) => decode(url, &body),
            Err(err) => Err(err),
        };

        match result {
            Ok(image) => return Ok(image),
            Err(err) if err.is_auth() => return Err(AssemblyError::Auth(err)),
            Err(err) => {
                if !budget.consume() {
                    return Err(AssemblyError::Exhausted {
                        page: page.label(),
                        attempts: budget.attempts(),
                        last: err,
                    });
                }
                warn!(
                    page = %page,
                    url,
                    error = %err,
                    "Download error, retrying... {} tries remaining",
                    budget.remaining()
                );
            }
        }
    }
}

fn decode(url: &str, body: &[u8]) -> Result<RgbImage, FetchError> {
    image::load_from_memory(body)
        .map(|img| img.to_rgb8())
        .map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
}

/// Cheap existence check: status only, on tile (0, 0) or the full page.
///
/// `Ok(false)` for any failure except an auth fault.
pub async fn probe_page<S: ImageSource>(
    session: &mut BookSession<S>,
    page: PageId,
) -> Result<bool, FetchError> {
    let url = session.url_for(page, TileCoord::default());
    match session.source().probe(&url).await {
        Ok(()) => Ok(true),
        Err(err) if err.is_auth() => Err(err),
        Err(err) => {
            debug!(page = %page, error = %err, "Page does not resolve");
            Ok(false)
        }
    }
}

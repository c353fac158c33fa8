//! Tile grid discovery.
//!
//! The resolver publishes no metadata, so the grid is found by walking down
//! column 0 and across row 0 of the first page until a tile stops resolving.
//! A failed probe is the boundary, not an error, and nothing is retried here.

use tracing::{debug, warn};

use crate::error::SessionError;
use crate::request::{PageId, RequestParams, TileCoord, UrlTemplate};
use crate::source::ImageSource;

/// Upper bound on probes per axis, in case a server answers every coordinate.
const MAX_TILES_PER_AXIS: u32 = 512;

/// Tile layout of every page of one book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub rows: u32,
    pub cols: u32,
    /// Sum of the widths of the row-0 tiles.
    pub width: u32,
    /// Sum of the heights of the column-0 tiles.
    pub height: u32,
}

#[derive(Clone, Copy)]
enum Axis {
    Rows,
    Cols,
}

/// Probes the grid of page 1. Must run once per book.
pub async fn discover_grid<S: ImageSource>(
    source: &S,
    template: &UrlTemplate,
    params: &mut RequestParams,
) -> Result<Grid, SessionError> {
    params.set_page(PageId::Number(1));

    let (rows, height) = probe_axis(source, template, params, Axis::Rows).await?;
    let (cols, width) = probe_axis(source, template, params, Axis::Cols).await?;

    if rows == 0 || cols == 0 {
        params.set_tile(TileCoord::default());
        return Err(SessionError::EmptyGrid {
            url: template.render(params),
        });
    }

    Ok(Grid {
        rows,
        cols,
        width,
        height,
    })
}

/// Returns the number of tiles found along `axis` and their summed extent.
async fn probe_axis<S: ImageSource>(
    source: &S,
    template: &UrlTemplate,
    params: &mut RequestParams,
    axis: Axis,
) -> Result<(u32, u32), SessionError> {
    let mut count = 0;
    let mut extent = 0;

    while count < MAX_TILES_PER_AXIS {
        let tile = match axis {
            Axis::Rows => TileCoord::new(count, 0),
            Axis::Cols => TileCoord::new(0, count),
        };
        params.set_tile(tile);
        let url = template.render(params);

        let Some((width, height)) = probe_tile(source, &url).await? else {
            return Ok((count, extent));
        };
        extent += match axis {
            Axis::Rows => height,
            Axis::Cols => width,
        };
        count += 1;
    }

    warn!(
        limit = MAX_TILES_PER_AXIS,
        "Tile probe never hit the grid edge, stopping"
    );
    Ok((count, extent))
}

/// Dimensions of the tile at `url`, or `None` once the grid edge is reached.
async fn probe_tile<S: ImageSource>(
    source: &S,
    url: &str,
) -> Result<Option<(u32, u32)>, SessionError> {
    let body = match source.fetch(url).await {
        Ok(body) => body,
        Err(err) if err.is_auth() => return Err(SessionError::Auth(err)),
        Err(err) => {
            debug!(url, error = %err, "Grid edge reached");
            return Ok(None);
        }
    };

    match image::load_from_memory(&body) {
        Ok(tile) => Ok(Some((tile.width(), tile.height()))),
        Err(err) => {
            debug!(url, error = %err, "Undecodable tile, treating as grid edge");
            Ok(None)
        }
    }
}

//! Book session: everything one download run needs, resolved once up front.

use clap::ValueEnum;
use tracing::{debug, info};

use crate::assembler::{PageFetchStrategy, RetryBudget};
use crate::error::SessionError;
use crate::grid::discover_grid;
use crate::request::{
    DocumentType, PageId, RequestParams, TileCoord, UrlTemplate, DEFAULT_DIRECT_TEMPLATE,
    DEFAULT_TILED_TEMPLATE,
};
use crate::source::ImageSource;

pub const DEFAULT_DIRECT_WIDTH: u32 = 4000;

/// How page images are addressed on the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AddressingMode {
    /// Fixed-size tiles in a grid that is discovered per book.
    Tiled,
    /// One full-page image per request.
    Direct,
}

/// What to download.
#[derive(Debug, Clone)]
pub struct BookConfig {
    pub book_id: String,
    pub doc_type: DocumentType,
    /// Last page number; discovered when `None`.
    pub length: Option<u32>,
    pub mode: AddressingMode,
    /// Requested page width in direct mode.
    pub width: u32,
    /// Overrides the default template of `mode`.
    pub url_template: Option<String>,
    /// Extra attempts allowed per page.
    pub retries: u32,
}

impl BookConfig {
    pub fn new(book_id: impl Into<String>, doc_type: DocumentType) -> Self {
        Self {
            book_id: book_id.into(),
            doc_type,
            length: None,
            mode: AddressingMode::Tiled,
            width: DEFAULT_DIRECT_WIDTH,
            url_template: None,
            retries: RetryBudget::DEFAULT_RETRIES,
        }
    }

    pub fn template(&self) -> &str {
        match (&self.url_template, self.mode) {
            (Some(template), _) => template,
            (None, AddressingMode::Tiled) => DEFAULT_TILED_TEMPLATE,
            (None, AddressingMode::Direct) => DEFAULT_DIRECT_TEMPLATE,
        }
    }
}

pub struct BookSession<S> {
    config: BookConfig,
    source: S,
    template: UrlTemplate,
    params: RequestParams,
    strategy: PageFetchStrategy,
}

impl<S: ImageSource> BookSession<S> {
    /// Opens the session, probing the tile grid in tiled mode.
    pub async fn open(config: BookConfig, source: S) -> Result<Self, SessionError> {
        let template = UrlTemplate::parse(config.template())?;
        debug!(template = template.as_str(), mode = ?config.mode, "Opening book session");
        let mut params = RequestParams::new(config.doc_type, config.book_id.clone(), config.width);

        let strategy = match config.mode {
            AddressingMode::Direct => PageFetchStrategy::DirectPage,
            AddressingMode::Tiled => {
                let grid = discover_grid(&source, &template, &mut params).await?;
                info!(
                    rows = grid.rows,
                    cols = grid.cols,
                    width = grid.width,
                    height = grid.height,
                    "Tile grid discovered"
                );
                PageFetchStrategy::TiledPage(grid)
            }
        };

        Ok(Self {
            config,
            source,
            template,
            params,
            strategy,
        })
    }
}

impl<S> BookSession<S> {
    pub fn config(&self) -> &BookConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn strategy(&self) -> PageFetchStrategy {
        self.strategy
    }

    /// A fresh budget for one page.
    pub fn retry_budget(&self) -> RetryBudget {
        RetryBudget::new(self.config.retries)
    }

    /// Points the request parameters at `page`/`tile` and renders the URL.
    pub fn url_for(&mut self, page: PageId, tile: TileCoord) -> String {
        self.params.set_page(page);
        self.params.set_tile(tile);
        self.template.render(&self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::test_support::{config, Reply, SyntheticSource};

    #[test]
    fn test_default_templates_follow_mode() {
        let mut config = BookConfig::new("1", DocumentType::Digibok);
        assert_eq!(config.template(), DEFAULT_TILED_TEMPLATE);
        config.mode = AddressingMode::Direct;
        assert_eq!(config.template(), DEFAULT_DIRECT_TEMPLATE);
        config.url_template = Some("https://example.org/{book_id}".to_string());
        assert_eq!(config.template(), "https://example.org/{book_id}");
    }

    #[tokio::test]
    async fn test_direct_session_issues_no_requests_on_open() {
        let source = SyntheticSource::new(|_| Reply::Status(500));
        let session = BookSession::open(config(AddressingMode::Direct), source)
            .await
            .unwrap();

        assert_eq!(session.strategy(), PageFetchStrategy::DirectPage);
        assert_eq!(session.source().request_count(), 0);
    }

    #[tokio::test]
    async fn test_tiled_session_resolves_grid_once() {
        let source = SyntheticSource::tiled(2, 3, 8, 6, |_| true);
        let mut session = BookSession::open(config(AddressingMode::Tiled), source)
            .await
            .unwrap();
        let probes = session.source().request_count();

        match session.strategy() {
            PageFetchStrategy::TiledPage(grid) => {
                assert_eq!((grid.rows, grid.cols), (2, 3));
            }
            other => panic!("unexpected strategy {:?}", other),
        }

        let url = session.url_for(PageId::Number(5), TileCoord::new(1, 2));
        assert_eq!(url, "mock://digibok/000123456/5/0005/1/2/4000");
        assert_eq!(session.source().request_count(), probes);
    }

    #[tokio::test]
    async fn test_open_rejects_bad_template() {
        let mut config = config(AddressingMode::Direct);
        config.url_template = Some("mock://{page}".to_string());
        let source = SyntheticSource::new(|_| Reply::Status(500));

        assert!(matches!(
            BookSession::open(config, source).await,
            Err(SessionError::Template(_))
        ));
    }

    #[tokio::test]
    async fn test_open_escalates_auth_fault_during_discovery() {
        let source = SyntheticSource::new(|_| Reply::Status(401));
        let result = BookSession::open(config(AddressingMode::Tiled), source).await;

        assert!(matches!(
            result,
            Err(SessionError::Auth(FetchError::Auth { status: 401, .. }))
        ));
    }
}

use colored::*;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use slug::slugify;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::assembler::{assemble_page, probe_page, PageFetchStrategy};
use crate::error::{AssemblyError, DownloadError};
use crate::length::find_length;
use crate::request::PageId;
use crate::session::{BookConfig, BookSession};
use crate::source::ImageSource;
use crate::PdfBuilder;

const JPEG_QUALITY: u8 = 90;

/// Upper bound on introduction pages, in case a server answers every page.
const MAX_INTRO_PAGES: u32 = 100;

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Directory receiving the PDF and the per-book working folder.
    pub out_dir: PathBuf,
    /// Keep the page images after the PDF is written.
    pub preserve_pages: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("."),
            preserve_pages: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Saved(PathBuf),
    /// Retries ran out before the page was complete.
    Abandoned(String),
    /// The page image could not be written or read back.
    WriteFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub page: PageId,
    pub outcome: PageOutcome,
}

impl PageRecord {
    pub fn saved_path(&self) -> Option<&Path> {
        match &self.outcome {
            PageOutcome::Saved(path) => Some(path),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub book_id: String,
    /// Every attempted page, in reading order.
    pub pages: Vec<PageRecord>,
    pub pdf_path: PathBuf,
}

impl DownloadReport {
    pub fn saved_pages(&self) -> impl Iterator<Item = PageId> + '_ {
        self.pages
            .iter()
            .filter(|r| r.saved_path().is_some())
            .map(|r| r.page)
    }

    pub fn missing_pages(&self) -> impl Iterator<Item = PageId> + '_ {
        self.pages
            .iter()
            .filter(|r| r.saved_path().is_none())
            .map(|r| r.page)
    }

    pub fn is_complete(&self) -> bool {
        self.missing_pages().next().is_none()
    }
}

/// Walks a book front cover, intro pages, numbered pages, back cover, then
/// binds every saved page into `{out_dir}/{book_id}.pdf`.
pub struct Downloader {
    options: DownloadOptions,
}

impl Downloader {
    pub fn new(options: DownloadOptions) -> Self {
        Self { options }
    }

    pub fn work_dir(&self, book_id: &str) -> PathBuf {
        self.options
            .out_dir
            .join(format!("{}_temp_image_folder", file_stem(book_id)))
    }

    pub fn pdf_path(&self, book_id: &str) -> PathBuf {
        self.options
            .out_dir
            .join(format!("{}.pdf", file_stem(book_id)))
    }

    pub async fn run<S: ImageSource>(
        &self,
        config: BookConfig,
        source: S,
    ) -> Result<DownloadReport, DownloadError> {
        let book_id = config.book_id.clone();
        info!(
            "Downloading book {} (type: {})",
            book_id.green(),
            config.doc_type
        );

        let mut session = BookSession::open(config, source).await?;
        if let PageFetchStrategy::TiledPage(grid) = session.strategy() {
            info!(
                "Pages are {}x{} tiles, {}x{} pixels",
                grid.cols, grid.rows, grid.width, grid.height
            );
        }

        let length = match session.config().length {
            Some(length) if length > 0 => length,
            _ => {
                info!("Length not specified, calculating book length");
                let length = find_length(&mut session)
                    .await
                    .map_err(DownloadError::Auth)?;
                info!("Book length found: {}", length);
                length
            }
        };

        let work_dir = self.work_dir(&book_id);
        let mut records = Vec::new();

        records.push(
            self.download_page(&mut session, PageId::FrontCover, &work_dir)
                .await?,
        );

        let intro_pages = self.discover_intro_pages(&mut session).await?;
        if !intro_pages.is_empty() {
            info!("Found {} introduction pages", intro_pages.len());
        }
        for page in intro_pages {
            records.push(self.download_page(&mut session, page, &work_dir).await?);
        }

        for number in 1..=length {
            records.push(
                self.download_page(&mut session, PageId::Number(number), &work_dir)
                    .await?,
            );
        }

        records.push(
            self.download_page(&mut session, PageId::BackCover, &work_dir)
                .await?,
        );

        self.bind(book_id, records, &work_dir).await
    }

    /// `I1, I2, ...` up to the first one that does not resolve.
    async fn discover_intro_pages<S: ImageSource>(
        &self,
        session: &mut BookSession<S>,
    ) -> Result<Vec<PageId>, DownloadError> {
        let mut pages = Vec::new();
        for index in 1..=MAX_INTRO_PAGES {
            let page = PageId::Intro(index);
            if !probe_page(session, page)
                .await
                .map_err(DownloadError::Auth)?
            {
                return Ok(pages);
            }
            pages.push(page);
        }

        warn!(
            limit = MAX_INTRO_PAGES,
            "Introduction pages never ran out, stopping"
        );
        Ok(pages)
    }

    async fn download_page<S: ImageSource>(
        &self,
        session: &mut BookSession<S>,
        page: PageId,
        work_dir: &Path,
    ) -> Result<PageRecord, DownloadError> {
        let mut budget = session.retry_budget();

        let outcome = match assemble_page(session, page, &mut budget).await {
            Ok(image) => match write_page(&image, work_dir, page).await {
                Ok(path) => {
                    info!("Page {} download complete", page);
                    PageOutcome::Saved(path)
                }
                Err(e) => {
                    let reason = format!(
                        "failed to write {}: {}",
                        work_dir.join(page.file_name()).display(),
                        e
                    );
                    error!("Failed to save page {}: {}", page, reason);
                    PageOutcome::WriteFailed(reason)
                }
            },
            Err(AssemblyError::Auth(e)) => {
                error!("Authentication error on {}", e.url().red());
                return Err(DownloadError::Auth(e));
            }
            Err(e @ AssemblyError::Exhausted { .. }) => {
                error!("All retries failed: {}", e);
                PageOutcome::Abandoned(e.to_string())
            }
        };

        Ok(PageRecord { page, outcome })
    }

    async fn bind(
        &self,
        book_id: String,
        mut records: Vec<PageRecord>,
        work_dir: &Path,
    ) -> Result<DownloadReport, DownloadError> {
        let mut builder = PdfBuilder::new();
        for record in records.iter_mut() {
            let Some(path) = record.saved_path().map(Path::to_path_buf) else {
                continue;
            };
            if let Err(e) = builder.add_image(&path).await {
                warn!("Skipping page {}: {}", record.page, e);
                record.outcome = PageOutcome::WriteFailed(e.to_string());
            }
        }

        if builder.page_count() == 0 {
            error!("{}", "No pages downloaded, PDF not written".red());
            return Err(DownloadError::NoPages(book_id));
        }

        let pdf_path = self.pdf_path(&book_id);
        builder.save(&pdf_path).await?;

        let report = DownloadReport {
            book_id,
            pages: records,
            pdf_path,
        };

        if report.is_complete() {
            info!(
                "PDF saved of book {} ({} pages): {}",
                report.book_id,
                report.pages.len(),
                report.pdf_path.display().to_string().green()
            );
        } else {
            let missing: Vec<String> = report.missing_pages().map(|p| p.label()).collect();
            warn!(
                "PDF saved with {} of {} pages: {} (missing: {})",
                builder.page_count(),
                report.pages.len(),
                report.pdf_path.display().to_string().yellow(),
                missing.join(", ")
            );
        }

        if !self.options.preserve_pages {
            debug!("Removing {}", work_dir.display());
            if let Err(e) = fs::remove_dir_all(work_dir).await {
                warn!("Failed to remove {}: {}", work_dir.display(), e);
            }
        } else {
            info!(
                "Page images kept in {}",
                work_dir.display().to_string().blue()
            );
        }

        Ok(report)
    }
}

/// The book id itself when it is a safe file name, otherwise its slug.
fn file_stem(book_id: &str) -> String {
    let safe = !book_id.is_empty()
        && !book_id.chars().all(|c| c == '.')
        && book_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if safe {
        return book_id.to_string();
    }

    let stem = slugify(book_id);
    if stem.is_empty() {
        "book".to_string()
    } else {
        stem
    }
}

/// Encodes `image` as `{work_dir}/{page}.jpg`.
async fn write_page(
    image: &RgbImage,
    work_dir: &Path,
    page: PageId,
) -> std::io::Result<PathBuf> {
    fs::create_dir_all(work_dir).await?;

    let mut jpeg = Vec::new();
    image
        .write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY))
        .map_err(std::io::Error::other)?;

    let path = work_dir.join(page.file_name());
    fs::write(&path, jpeg).await?;
    Ok(path)
}

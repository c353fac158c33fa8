use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use colored::*;
use nb2pdf::{
    build_jar, from_argument, load_cookie_file, AddressingMode, BookConfig, Cookie,
    DocumentType, DownloadOptions, Downloader, HttpSource, PageId, PdfBuilder,
    DEFAULT_DIRECT_WIDTH,
};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tokio::fs;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "nb2pdf")]
#[command(about = "CLI utility to download a digitized book from nb.no as a PDF")]
#[command(version = "0.1.0")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Log debug details, including every probed URL
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a book and bind its pages into a PDF
    Download {
        /// Book ID to download
        #[arg(required_unless_present = "id")]
        book: Option<String>,

        /// Book ID to download (alternative to the positional argument)
        #[arg(long = "id", conflicts_with = "book")]
        id: Option<String>,

        /// Document type
        #[arg(short = 'T', long = "type", value_enum, default_value_t = DocumentType::Digibok)]
        doc_type: DocumentType,

        /// Authentication cookie value, or a full "name=value; name=value" string
        #[arg(short = 'c', long = "cookie", env = "NB2PDF_COOKIE", hide_env_values = true)]
        cookie: Option<String>,

        /// Name of the cookie given by --cookie
        #[arg(long = "cookie-name", default_value = "JSESSIONID")]
        cookie_name: String,

        /// File with cookies: a browser JSON export or a "name=value; ..." string
        #[arg(long = "cookie-file")]
        cookie_file: Option<PathBuf>,

        /// Book length (calculated if not provided or 0)
        #[arg(short = 'l', long = "length")]
        length: Option<u32>,

        /// How page images are requested
        #[arg(short = 'm', long = "mode", value_enum, default_value_t = AddressingMode::Tiled)]
        mode: AddressingMode,

        /// Page width in pixels for direct mode
        #[arg(short = 'w', long = "width", default_value_t = DEFAULT_DIRECT_WIDTH)]
        width: u32,

        /// Custom resolver URL with {doc_type}, {book_id}, {page_nr}, {long_page_nr}, {row}, {col}, {width}
        #[arg(long = "url-template")]
        url_template: Option<String>,

        /// Extra attempts per page before it is skipped
        #[arg(short = 'r', long = "retries", default_value_t = 2)]
        retries: u32,

        /// Output directory used to save files
        #[arg(short = 'o', long = "out-dir", default_value = ".")]
        out_dir: PathBuf,

        /// Keep the downloaded page images after the PDF is written
        #[arg(short = 'p', long = "preserve-pages")]
        preserve_pages: bool,

        /// Request timeout in seconds (0 uses no timeout)
        #[arg(short = 't', long = "timeout", default_value = "0", value_parser = parse_timeout)]
        timeout: f64,
    },
    /// Bind previously downloaded page images into a PDF
    Merge {
        /// Directory containing page images (C1.jpg, I1.jpg, 1.jpg, ..., C3.jpg)
        #[arg(short = 'd', long = "dir")]
        input_dir: PathBuf,

        /// Output file path for the PDF
        #[arg(short = 'o', long = "output", default_value = "book.pdf")]
        output_file: PathBuf,
    },
}

fn parse_timeout(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|_| "Not a number.")?;
    if value < 0.0 || !value.is_finite() {
        return Err("Must be zero or positive number.".to_string());
    }
    Ok(value)
}

async fn collect_cookies(
    cookie: Option<&str>,
    cookie_name: &str,
    cookie_file: Option<&PathBuf>,
) -> Result<Vec<Cookie>> {
    let mut cookies = Vec::new();
    if let Some(path) = cookie_file {
        cookies.extend(load_cookie_file(path).await?);
    }
    if let Some(value) = cookie.filter(|v| !v.trim().is_empty()) {
        cookies.extend(from_argument(value, cookie_name)?);
    }
    Ok(cookies)
}

async fn merge_pages(input_dir: &PathBuf, output_file: &PathBuf) -> Result<()> {
    if !input_dir.exists() {
        return Err(anyhow!(
            "Input directory '{}' does not exist",
            input_dir.display()
        ));
    }

    info!("Scanning directory: {}", input_dir.display().to_string().green());

    let mut entries = fs::read_dir(input_dir).await?;
    let mut pages = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jpg") {
            continue;
        }
        let label = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        match label.parse::<PageId>() {
            Ok(page) => pages.push((page, path)),
            Err(e) => warn!("Ignoring {}: {}", path.display(), e),
        }
    }

    if pages.is_empty() {
        return Err(anyhow!(
            "No page images found in '{}'",
            input_dir.display()
        ));
    }

    pages.sort();

    info!("Found {} page images", pages.len());
    let mut builder = PdfBuilder::new();
    for (page, path) in &pages {
        if let Err(e) = builder.add_image(path).await {
            error!("Failed to add page {}: {}", page, e);
        }
    }

    builder.save(output_file).await?;

    info!(
        "Successfully bound {} pages into: {}",
        builder.page_count(),
        output_file.display().to_string().green()
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_level = if args.verbose {
        "nb2pdf=debug"
    } else {
        "nb2pdf=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let result = match args.command {
        Commands::Download {
            book,
            id,
            doc_type,
            cookie,
            cookie_name,
            cookie_file,
            length,
            mode,
            width,
            url_template,
            retries,
            out_dir,
            preserve_pages,
            timeout,
        } => {
            let book_id = id.or(book).unwrap_or_default();
            let mut config = BookConfig::new(book_id, doc_type);
            config.length = length;
            config.mode = mode;
            config.width = width;
            config.url_template = url_template;
            config.retries = retries;

            download(
                config,
                cookie.as_deref(),
                &cookie_name,
                cookie_file.as_ref(),
                DownloadOptions {
                    out_dir,
                    preserve_pages,
                },
                timeout,
            )
            .await
        }
        Commands::Merge {
            input_dir,
            output_file,
        } => merge_pages(&input_dir, &output_file).await,
    };

    if let Err(e) = result {
        error!("{}", format!("Error: {}", e).red());
        process::exit(1);
    }
}

async fn download(
    config: BookConfig,
    cookie: Option<&str>,
    cookie_name: &str,
    cookie_file: Option<&PathBuf>,
    options: DownloadOptions,
    timeout: f64,
) -> Result<()> {
    if config.book_id.trim().is_empty() {
        return Err(anyhow!("Please provide a book ID with --id or as first argument"));
    }

    let cookies = collect_cookies(cookie, cookie_name, cookie_file).await?;
    if config.doc_type.requires_auth() && cookies.is_empty() {
        warn!("{} documents typically require authentication.", config.doc_type);
        warn!("If download fails, please provide an authentication cookie with --cookie or --cookie-file.");
    }

    let jar = build_jar(config.template(), &cookies)?;
    let source = HttpSource::new(jar, Duration::from_secs_f64(timeout))?;

    match Downloader::new(options).run(config, source).await {
        Ok(report) if report.is_complete() => {
            println!(
                "{} {}",
                "PDF written:".green(),
                report.pdf_path.display()
            );
            Ok(())
        }
        Ok(report) => {
            let missing: Vec<String> = report.missing_pages().map(|p| p.label()).collect();
            println!(
                "{} {} (missing pages: {})",
                "PDF partially written:".yellow(),
                report.pdf_path.display(),
                missing.join(", ")
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

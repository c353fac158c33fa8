use std::path::PathBuf;

use thiserror::Error;

/// Outcome of a single request against the remote image service.
#[derive(Error, Debug)]
pub enum FetchError {
    /// 401/403: the session's credentials were refused.
    #[error("access denied (HTTP {status}) for {url}")]
    Auth { url: String, status: u16 },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("could not decode image from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: image::ImageError,
    },

    /// Failure reported by a non-HTTP source.
    #[error("request to {url} failed: {reason}")]
    Other { url: String, reason: String },
}

impl FetchError {
    pub fn is_auth(&self) -> bool {
        matches!(self, FetchError::Auth { .. })
    }

    pub fn url(&self) -> &str {
        match self {
            FetchError::Auth { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::Transport { url, .. }
            | FetchError::Decode { url, .. }
            | FetchError::Other { url, .. } => url,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown placeholder {{{0}}} in URL template")]
    UnknownField(String),

    #[error("unterminated placeholder at byte {0} in URL template")]
    Unterminated(usize),
}

#[derive(Error, Debug)]
pub enum CookieError {
    #[error("malformed cookie pair {0:?}, expected name=value")]
    Malformed(String),

    #[error("cookie name must not be empty")]
    EmptyName,

    #[error("failed to read cookie file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse cookie file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("URL template host cannot carry cookies: {0}")]
    InvalidDomain(String),
}

/// Faults raised while opening a book session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Auth(FetchError),

    #[error("no tiles for page 1 at {url}; check the book id and document type")]
    EmptyGrid { url: String },

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Faults that end the assembly of one page.
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error(transparent)]
    Auth(FetchError),

    #[error("page {page} abandoned after {attempts} attempts: {last}")]
    Exhausted {
        page: String,
        attempts: u32,
        last: FetchError,
    },
}

/// Faults that end the whole run.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("{0}; re-check the authentication cookie")]
    Auth(FetchError),

    #[error(transparent)]
    Session(SessionError),

    #[error("no pages downloaded for book {0}, PDF not written")]
    NoPages(String),

    #[error(transparent)]
    Pdf(#[from] PdfError),
}

impl From<SessionError> for DownloadError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Auth(fetch) => DownloadError::Auth(fetch),
            other => DownloadError::Session(other),
        }
    }
}

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("failed to read page image {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("page image {path} is not a usable JPEG: {reason}")]
    Image { path: PathBuf, reason: String },

    #[error("no pages added to document")]
    Empty,

    #[error("failed to serialize PDF: {0}")]
    Serialize(String),

    #[error("failed to write PDF to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

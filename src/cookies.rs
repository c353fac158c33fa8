//! Session cookies for restricted documents.
//!
//! Cookies come from the command line (a bare value for a named cookie, or a
//! full `name=value; name=value` header string) or from a file holding either
//! a browser JSON export or the same header string.

use std::path::Path;
use std::sync::Arc;

use reqwest::cookie::Jar;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::CookieError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Result<Self, CookieError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(CookieError::EmptyName);
        }
        Ok(Self {
            name,
            value: value.into().trim().to_string(),
        })
    }
}

#[derive(Deserialize)]
struct ExportedCookie {
    name: String,
    value: String,
}

/// Parses a `name=value; name=value` header string.
pub fn parse_cookie_string(raw: &str) -> Result<Vec<Cookie>, CookieError> {
    raw.split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| CookieError::Malformed(pair.to_string()))?;
            Cookie::new(name, value)
        })
        .collect()
}

/// Interprets `--cookie`: a header string when it holds a `;` or a real
/// `name=value` pair, otherwise the value of the cookie called `name`.
///
/// Values that only end in `=` padding (base64) are taken as bare values.
pub fn from_argument(value: &str, name: &str) -> Result<Vec<Cookie>, CookieError> {
    if is_header_string(value) {
        parse_cookie_string(value)
    } else {
        Ok(vec![Cookie::new(name, value)?])
    }
}

fn is_header_string(value: &str) -> bool {
    if value.contains(';') {
        return true;
    }
    match value.trim().split_once('=') {
        Some((name, rest)) => !name.trim().is_empty() && !rest.chars().all(|c| c == '='),
        None => false,
    }
}

pub async fn load_cookie_file(path: &Path) -> Result<Vec<Cookie>, CookieError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CookieError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        let exported: Vec<ExportedCookie> =
            serde_json::from_str(trimmed).map_err(|source| CookieError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        exported
            .into_iter()
            .map(|c| Cookie::new(c.name, c.value))
            .collect()
    } else {
        parse_cookie_string(trimmed)
    }
}

/// Builds the cookie store for every request of the session, scoped to the
/// host of `base_url`.
pub fn build_jar(base_url: &str, cookies: &[Cookie]) -> Result<Arc<Jar>, CookieError> {
    let jar = Jar::default();
    if cookies.is_empty() {
        return Ok(Arc::new(jar));
    }

    let parsed = Url::parse(base_url)
        .map_err(|_| CookieError::InvalidDomain(base_url.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| CookieError::InvalidDomain(base_url.to_string()))?;
    let origin = Url::parse(&format!("{}://{}/", parsed.scheme(), host))
        .map_err(|_| CookieError::InvalidDomain(base_url.to_string()))?;

    for cookie in cookies {
        debug!(name = %cookie.name, host, "Adding session cookie");
        jar.add_cookie_str(
            &format!("{}={}; Path=/", cookie.name, cookie.value),
            &origin,
        );
    }
    Ok(Arc::new(jar))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::cookie::CookieStore;

    #[test]
    fn test_parse_cookie_string() {
        let cookies = parse_cookie_string("JSESSIONID=abc; other = x=y ;").unwrap();
        assert_eq!(
            cookies,
            vec![
                Cookie::new("JSESSIONID", "abc").unwrap(),
                Cookie::new("other", "x=y").unwrap(),
            ]
        );
    }

    #[test]
    fn test_parse_cookie_string_rejects_bare_token() {
        assert!(matches!(
            parse_cookie_string("a=1; broken"),
            Err(CookieError::Malformed(p)) if p == "broken"
        ));
        assert!(matches!(
            parse_cookie_string("=1"),
            Err(CookieError::EmptyName)
        ));
    }

    #[test]
    fn test_from_argument_uses_cookie_name_for_bare_value() {
        assert_eq!(
            from_argument("s3cr3t", "JSESSIONID").unwrap(),
            vec![Cookie::new("JSESSIONID", "s3cr3t").unwrap()]
        );
        assert_eq!(from_argument("a=1; b=2", "ignored").unwrap().len(), 2);
        assert_eq!(
            from_argument("SESSION=abc", "JSESSIONID").unwrap(),
            vec![Cookie::new("SESSION", "abc").unwrap()]
        );
    }

    #[test]
    fn test_from_argument_keeps_base64_padding() {
        assert_eq!(
            from_argument("dGVzdA==", "JSESSIONID").unwrap(),
            vec![Cookie::new("JSESSIONID", "dGVzdA==").unwrap()]
        );
        assert_eq!(
            from_argument("YWI=", "JSESSIONID").unwrap(),
            vec![Cookie::new("JSESSIONID", "YWI=").unwrap()]
        );
        assert_eq!(
            from_argument("=abc", "JSESSIONID").unwrap(),
            vec![Cookie::new("JSESSIONID", "=abc").unwrap()]
        );
    }

    #[tokio::test]
    async fn test_load_cookie_file_json_and_plain() {
        let dir = tempfile::tempdir().unwrap();

        let json = dir.path().join("cookies.json");
        std::fs::write(
            &json,
            r#"[{"name":"JSESSIONID","value":"abc","domain":".nb.no","path":"/"}]"#,
        )
        .unwrap();
        assert_eq!(
            load_cookie_file(&json).await.unwrap(),
            vec![Cookie::new("JSESSIONID", "abc").unwrap()]
        );

        let plain = dir.path().join("cookies.txt");
        std::fs::write(&plain, "a=1; b=2\n").unwrap();
        assert_eq!(load_cookie_file(&plain).await.unwrap().len(), 2);

        let missing = dir.path().join("missing.txt");
        assert!(matches!(
            load_cookie_file(&missing).await,
            Err(CookieError::Io { .. })
        ));
    }

    #[test]
    fn test_build_jar_scopes_cookies_to_template_host() {
        let cookies = vec![Cookie::new("JSESSIONID", "abc").unwrap()];
        let jar = build_jar(
            "https://www.nb.no/services/image/resolver?urn={book_id}",
            &cookies,
        )
        .unwrap();

        let url = Url::parse("https://www.nb.no/services/image/resolver").unwrap();
        let header = jar.cookies(&url).unwrap();
        assert_eq!(header.to_str().unwrap(), "JSESSIONID=abc");

        let elsewhere = Url::parse("https://example.org/").unwrap();
        assert!(jar.cookies(&elsewhere).is_none());
    }
}

//! Code fetcher
//!
//! Retrieves extension source text from an absolute URL or from local storage.
//! The text is returned untouched; syntax problems surface later in the sandbox.

use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

use super::http::{HttpClient, HttpRequest};
use crate::core::error::{FetchStatus, ReelError, Result};

/// Where a source string points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Remote(Url),
    Local(PathBuf),
}

impl SourceLocation {
    /// Classify a source string
    ///
    /// Only `http`/`https` URLs are fetched over the network. `file://` URLs
    /// map to their path; anything that does not parse as a URL is a path.
    pub fn parse(source: &str) -> Self {
        match Url::parse(source) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => SourceLocation::Remote(url),
            Ok(url) if url.scheme() == "file" => match url.to_file_path() {
                Ok(path) => SourceLocation::Local(path),
                Err(_) => SourceLocation::Local(PathBuf::from(source)),
            },
            _ => SourceLocation::Local(PathBuf::from(source)),
        }
    }
}

/// Fetches extension source text
#[derive(Clone)]
pub struct CodeFetcher {
    http: HttpClient,
}

impl CodeFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Retrieve source text from a URL or local path
    pub async fn fetch(&self, source: &str) -> Result<String> {
        match SourceLocation::parse(source) {
            SourceLocation::Remote(url) => self.fetch_remote(source, url).await,
            SourceLocation::Local(path) => Self::read_local(&path).await,
        }
    }

    async fn fetch_remote(&self, source: &str, url: Url) -> Result<String> {
        info!(source = %source, "Fetching extension source");

        let response = self
            .http
            .execute(HttpRequest::get(url.as_str()))
            .await
            .map_err(|e| ReelError::Fetch {
                location: source.to_string(),
                status: FetchStatus::Transport(e.to_string()),
            })?;

        if !response.is_success() {
            return Err(ReelError::Fetch {
                location: source.to_string(),
                status: FetchStatus::Http(response.status),
            });
        }

        debug!(source = %source, bytes = response.body.len(), "Fetched extension source");
        Ok(response.body)
    }

    async fn read_local(path: &Path) -> Result<String> {
        debug!(path = %path.display(), "Reading extension source");
        tokio::fs::read_to_string(path).await.map_err(|e| {
            ReelError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read {}: {}", path.display(), e),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::extension::testing;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fetcher() -> CodeFetcher {
        CodeFetcher::new(HttpClient::new(&Config::default().http).unwrap())
    }

    #[test]
    fn test_source_location() {
        assert!(matches!(
            SourceLocation::parse("https://cdn.example.org/ext/demo.js"),
            SourceLocation::Remote(_)
        ));
        assert_eq!(
            SourceLocation::parse("./extensions/demo.js"),
            SourceLocation::Local(PathBuf::from("./extensions/demo.js"))
        );
        assert_eq!(
            SourceLocation::parse("file:///srv/ext/demo.js"),
            SourceLocation::Local(PathBuf::from("/srv/ext/demo.js"))
        );
        assert!(matches!(
            SourceLocation::parse("ftp://mirror.example/demo.js"),
            SourceLocation::Local(_)
        ));
    }

    #[tokio::test]
    async fn test_fetch_local_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "function createDemo(ctx) {{ return {{}}; }}").unwrap();

        let code = fetcher().fetch(file.path().to_str().unwrap()).await.unwrap();
        assert!(code.contains("createDemo"));
    }

    #[tokio::test]
    async fn test_missing_local_file_is_read_error() {
        let result = fetcher().fetch("/nonexistent/reelhub/demo.js").await;
        match result {
            Err(ReelError::Io(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::NotFound);
                assert!(e.to_string().contains("/nonexistent/reelhub/demo.js"));
            }
            other => panic!("expected read error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_fetch_remote_source() {
        let body = "function createDemo(ctx) { return {}; }";
        let base = testing::serve(vec![testing::http_response(
            "200 OK",
            "application/javascript",
            body,
        )])
        .await;

        let code = fetcher().fetch(&format!("{}/demo.js", base)).await.unwrap();
        assert_eq!(code, body);
    }

    #[tokio::test]
    async fn test_non_success_status_is_fetch_error() {
        let base = testing::serve(vec![testing::http_response("404 Not Found", "text/plain", "")]).await;
        let source = format!("{}/missing.js", base);

        match fetcher().fetch(&source).await {
            Err(err @ ReelError::Fetch { .. }) => {
                let message = err.to_string();
                assert!(message.contains(&source));
                assert!(message.contains("404"));
                assert!(matches!(
                    err,
                    ReelError::Fetch { status: FetchStatus::Http(404), .. }
                ));
            }
            other => panic!("expected fetch error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_unreachable_url_is_fetch_error() {
        let source = "http://127.0.0.1:1/demo.js";
        match fetcher().fetch(source).await {
            Err(ReelError::Fetch { location, status }) => {
                assert_eq!(location, source);
                assert!(matches!(status, FetchStatus::Transport(_)));
            }
            other => panic!("expected fetch error, got {:?}", other.map(|_| ())),
        }
    }
}

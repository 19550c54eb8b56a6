//! Resolves remote file URLs into in-memory archive objects.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::StatusCode;
use url::Url;

use crate::error::{Result, ZiplineError};
use crate::storage::ArchiveObject;

/// Resolves a URL to a byte blob plus filename and fetch timestamp.
#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ArchiveObject>;
}

const MAX_REDIRECT_HOPS: usize = 10;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP fetcher with explicit redirect handling and a Content-Type
/// allow-list.
#[derive(Debug)]
pub struct HttpObjectFetcher {
    client: reqwest::Client,
    valid_content_types: Vec<String>,
}

impl HttpObjectFetcher {
    /// Redirects are disabled on the client and followed manually so each
    /// hop's status code stays visible.
    pub fn new(valid_content_types: Vec<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            valid_content_types,
        })
    }

    fn content_type_allowed(&self, content_type: &str) -> bool {
        self.valid_content_types.is_empty()
            || self.valid_content_types.iter().any(|v| v == content_type)
    }
}

#[async_trait]
impl ObjectFetcher for HttpObjectFetcher {
    async fn fetch(&self, url: &str) -> Result<ArchiveObject> {
        let mut target = Url::parse(url)?;

        for _ in 0..MAX_REDIRECT_HOPS {
            let resp = self.client.get(target.clone()).send().await?;

            match resp.status() {
                StatusCode::MOVED_PERMANENTLY
                | StatusCode::FOUND
                | StatusCode::SEE_OTHER
                | StatusCode::TEMPORARY_REDIRECT
                | StatusCode::PERMANENT_REDIRECT => {
                    let location = resp
                        .headers()
                        .get(LOCATION)
                        .and_then(|v| v.to_str().ok())
                        .ok_or(ZiplineError::RedirectWithoutLocation)?;

                    target = resp.url().join(location)?;
                    continue;
                }

                StatusCode::NOT_FOUND => return Err(ZiplineError::FileNotFound),

                StatusCode::BAD_REQUEST | StatusCode::TOO_MANY_REQUESTS => {
                    return Err(ZiplineError::BadRequest)
                }

                StatusCode::UNAUTHORIZED => return Err(ZiplineError::AuthenticationRequired),

                StatusCode::FORBIDDEN => return Err(ZiplineError::AccessDenied),

                StatusCode::INTERNAL_SERVER_ERROR
                | StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT => return Err(ZiplineError::InternalSourceError),

                _ => {}
            }

            let content_type = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();

            if !self.content_type_allowed(content_type) {
                return Err(ZiplineError::IncorrectFormat(content_type.to_string()));
            }

            let name = filename_from(resp.url());
            let content = resp.bytes().await?.to_vec();

            return Ok(ArchiveObject {
                name,
                time: Utc::now(),
                content,
            });
        }

        Err(ZiplineError::TooManyRedirects)
    }
}

/// Basename of the final URL path; degenerate paths get a timestamped
/// placeholder name.
fn filename_from(url: &Url) -> String {
    let base = Path::new(url.path())
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    if base.is_empty() || base == "." {
        format!("file_{}", Utc::now().format("%Y%m%d%H%M%S"))
    } else {
        base.to_string()
    }
}

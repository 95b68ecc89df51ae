//! HTTP GET of a single item.
//!
//! Fetches are blocking calls (libcurl `Easy` handles). The pool runs each one
//! on tokio's blocking pool, so a `Fetcher` never sees the async runtime.

use std::time::Duration;

use crate::config::PipelineConfig;
use crate::error::FetchError;

/// Fetches the full body of a URL.
///
/// `url` is already normalized. Returns the body on a 2xx response that was
/// read to the end; anything else is an error. Implementations must be
/// callable from many threads at once.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Timeouts and identity for [`CurlFetcher`].
#[derive(Debug, Clone, Copy)]
pub struct CurlOptions {
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub max_redirections: u32,
}

impl Default for CurlOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            timeout: Duration::from_secs(120),
            max_redirections: 10,
        }
    }
}

impl From<&PipelineConfig> for CurlOptions {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            connect_timeout: cfg.connect_timeout(),
            timeout: cfg.request_timeout(),
            ..Self::default()
        }
    }
}

/// Default fetcher: one libcurl `Easy` handle per request, redirects followed.
#[derive(Debug, Clone, Default)]
pub struct CurlFetcher {
    opts: CurlOptions,
}

const USER_AGENT: &str = concat!("fetchpipe/", env!("CARGO_PKG_VERSION"));

impl CurlFetcher {
    pub fn new(opts: CurlOptions) -> Self {
        Self { opts }
    }
}

impl Fetcher for CurlFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };

        let mut easy = curl::easy::Easy::new();
        easy.url(url).map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        easy.get(true).map_err(transport)?;
        easy.follow_location(true).map_err(transport)?;
        easy.max_redirections(self.opts.max_redirections)
            .map_err(transport)?;
        easy.useragent(USER_AGENT).map_err(transport)?;
        easy.connect_timeout(self.opts.connect_timeout)
            .map_err(transport)?;
        easy.timeout(self.opts.timeout).map_err(transport)?;

        let mut body = Vec::new();
        {
            let mut transfer = easy.transfer();
            transfer
                .write_function(|data| {
                    body.extend_from_slice(data);
                    Ok(data.len())
                })
                .map_err(transport)?;
            transfer.perform().map_err(transport)?;
        }

        let code = easy.response_code().map_err(transport)?;
        if !(200..300).contains(&code) {
            return Err(FetchError::Status {
                url: url.to_string(),
                code,
            });
        }
        Ok(body)
    }
}

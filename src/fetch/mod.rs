//! File fetcher collaborator.
//!
//! The change-set applier only needs "put the file at this URL into this
//! local path"; everything about transport, retry, and streaming lives behind
//! the [`FileFetcher`] trait so tests can substitute a mock and so the
//! resolver stays free of network concerns.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::http::HttpClient;
use crate::runtime::Runtime;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// Fetch `url` into the local file at `dest`, returning the byte count.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Production fetcher: streams HTTP downloads through a runtime-created writer.
pub struct HttpFetcher<'a, R: Runtime> {
    runtime: &'a R,
    client: HttpClient,
}

impl<'a, R: Runtime> HttpFetcher<'a, R> {
    pub fn new(runtime: &'a R, client: HttpClient) -> Self {
        Self { runtime, client }
    }
}

#[async_trait]
impl<R: Runtime> FileFetcher for HttpFetcher<'_, R> {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        let dest = dest.to_path_buf();
        self.client
            .download_file(url, || self.runtime.create_file(&dest))
            .await
    }
}

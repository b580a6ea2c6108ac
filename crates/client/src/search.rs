//! Debounced live search.
//!
//! Queries are fed in as the user types. Once the input has been quiet for
//! the debounce period the settled query is searched, unless it equals the
//! last one searched. Starting a search drops any search still running, so
//! only the latest query's result is ever delivered.

use std::future::Future;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use crate::api::NutriClient;
use crate::error::ClientError;
use crate::models::ProductSummary;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// The result of one dispatched search.
#[derive(Debug)]
pub struct SearchOutcome<T> {
    pub query: String,
    pub result: Result<T, ClientError>,
}

/// A running search driver. Dropping it stops the driver.
#[derive(Debug)]
pub struct LiveSearch<T> {
    input: watch::Sender<String>,
    results: mpsc::Receiver<SearchOutcome<T>>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> LiveSearch<T> {
    /// Start a driver that calls `search` for each settled query.
    /// Must be called within a Tokio runtime.
    pub fn spawn<S, Fut>(debounce: Duration, search: S) -> Self
    where
        S: FnMut(String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ClientError>> + Send + 'static,
    {
        let (input, rx) = watch::channel(String::new());
        let (tx, results) = mpsc::channel(16);
        let task = tokio::spawn(drive(rx, tx, debounce, search));

        Self {
            input,
            results,
            task,
        }
    }

    /// Replace the current query text.
    pub fn set_query(&self, query: impl Into<String>) {
        self.input.send_replace(query.into());
    }

    /// Wait for the next delivered result.
    pub async fn next(&mut self) -> Option<SearchOutcome<T>> {
        self.results.recv().await
    }
}

impl<T> Drop for LiveSearch<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn drive<T, S, Fut>(
    mut input: watch::Receiver<String>,
    results: mpsc::Sender<SearchOutcome<T>>,
    debounce: Duration,
    mut search: S,
) where
    S: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, ClientError>> + Send + 'static,
{
    let mut deadline: Option<Instant> = None;
    let mut last_dispatched: Option<String> = None;
    let mut inflight: Option<(String, BoxFuture<'static, Result<T, ClientError>>)> = None;

    loop {
        tokio::select! {
            changed = input.changed() => {
                if changed.is_err() {
                    break;
                }
                deadline = Some(Instant::now() + debounce);
            }
            () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                let query = input.borrow_and_update().trim().to_owned();
                if last_dispatched.as_deref() == Some(query.as_str()) {
                    continue;
                }
                if let Some((stale, _)) = &inflight {
                    tracing::debug!(query = %stale, "Search superseded");
                }
                tracing::debug!(%query, "Searching");
                last_dispatched = Some(query.clone());
                let fut = search(query.clone()).boxed();
                inflight = Some((query, fut));
            }
            result = async {
                match inflight.as_mut() {
                    Some((_, fut)) => fut.await,
                    None => std::future::pending().await,
                }
            }, if inflight.is_some() => {
                if let Some((query, _)) = inflight.take()
                    && results.send(SearchOutcome { query, result }).await.is_err()
                {
                    break;
                }
            }
        }
    }
}

impl NutriClient {
    /// A live search over product names, first page only.
    #[must_use]
    pub fn live_search(&self, debounce: Duration) -> LiveSearch<Vec<ProductSummary>> {
        let client = self.clone();
        LiveSearch::spawn(debounce, move |query| {
            let client = client.clone();
            async move { client.search_products(&query, 1).await }
        })
    }
}

//! Paged list results.
//!
//! A [`Pager`] is a stream of [`Page`]s produced by repeatedly calling a
//! fetch closure with the previous page's continuation token.  The stream
//! ends after the first page that carries no continuation token.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};

use crate::errors::Result;

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Token for the next page; `None` on the last page.
    pub continuation_token: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, continuation_token: Option<String>) -> Self {
        // Services signal the last page with either a missing or an empty marker.
        let continuation_token = continuation_token.filter(|t| !t.is_empty());
        Self {
            items,
            continuation_token,
        }
    }
}

/// Stream of pages.
pub struct Pager<T> {
    pages: BoxStream<'static, Result<Page<T>>>,
}

impl<T: Send + 'static> Pager<T> {
    /// Build a pager that starts at `continuation_token` (or the first page).
    pub fn new<F, Fut>(continuation_token: Option<String>, fetch: F) -> Self
    where
        F: FnMut(Option<String>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Page<T>>> + Send + 'static,
    {
        let pages = futures::stream::unfold(
            (Some(continuation_token), fetch),
            |(next, mut fetch)| async move {
                let token = next?;
                match fetch(token).await {
                    Ok(page) => {
                        let next = page.continuation_token.clone().map(Some);
                        Some((Ok(page), (next, fetch)))
                    }
                    Err(e) => Some((Err(e), (None, fetch))),
                }
            },
        );
        Self {
            pages: pages.boxed(),
        }
    }

    /// A pager over a single, already-fetched page.
    pub fn from_items(items: Vec<T>) -> Self {
        Self {
            pages: futures::stream::once(async move { Ok(Page::new(items, None)) }).boxed(),
        }
    }

    /// Fetch the next page, or `None` when exhausted.
    pub async fn next_page(&mut self) -> Option<Result<Page<T>>> {
        self.pages.next().await
    }

    /// Flatten into a stream of items.
    pub fn into_items(self) -> BoxStream<'static, Result<T>> {
        self.pages
            .map_ok(|page| futures::stream::iter(page.items.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }

    /// Drain every page into a single `Vec`.
    pub async fn collect_items(self) -> Result<Vec<T>> {
        self.into_items().try_collect().await
    }
}

impl<T> Stream for Pager<T> {
    type Item = Result<Page<T>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.pages.as_mut().poll_next(cx)
    }
}

//! Lazy traversal of `nextLink`-paged list responses
//!
//! List operations return `{"value": [...], "nextLink": "..."}`. A
//! [`PagedSequence`] yields items of the first page, then fetches the next
//! page only when the caller asks for an item past the end of what it holds.

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use futures::{FutureExt, Stream};
use serde::{Deserialize, Deserializer};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

/// One page of a list response
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(rename = "value", default = "Vec::new")]
    pub items: Vec<T>,

    /// Absent and empty both mean this is the last page
    #[serde(
        rename = "nextLink",
        default,
        deserialize_with = "deserialize_next_link"
    )]
    pub next_page_link: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_page_link: Option<String>) -> Self {
        Self {
            items,
            next_page_link: next_page_link.filter(|link| !link.is_empty()),
        }
    }
}

fn deserialize_next_link<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let link: Option<String> = Option::deserialize(deserializer)?;
    Ok(link.filter(|link| !link.is_empty()))
}

type FetchPage<T> = Arc<dyn Fn(String) -> BoxFuture<'static, Result<Page<T>>> + Send + Sync>;

/// A forward-only, lazily fetched sequence of items
pub struct PagedSequence<T> {
    buffer: VecDeque<T>,
    next_link: Option<String>,
    fetch: FetchPage<T>,
    pages_fetched: usize,
    finished: bool,
}

impl<T> std::fmt::Debug for PagedSequence<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedSequence")
            .field("buffered", &self.buffer.len())
            .field("next_link", &self.next_link)
            .field("pages_fetched", &self.pages_fetched)
            .field("finished", &self.finished)
            .finish()
    }
}

impl<T: Send + 'static> PagedSequence<T> {
    /// Start from an already fetched first page; `fetch` retrieves the page
    /// behind a `nextLink`
    pub fn new<F, Fut>(first: Page<T>, fetch: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Page<T>>> + Send + 'static,
    {
        Self {
            buffer: first.items.into(),
            next_link: first.next_page_link,
            fetch: Arc::new(move |link| fetch(link).boxed()),
            pages_fetched: 0,
            finished: false,
        }
    }

    /// Number of follow-up pages fetched so far; the first page is not counted
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Next item, fetching a page if the buffer is empty.
    ///
    /// A fetch error is yielded once and ends the sequence.
    pub async fn next(&mut self) -> Option<Result<T>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.finished {
                return None;
            }
            let Some(link) = self.next_link.take() else {
                self.finished = true;
                return None;
            };

            tracing::trace!("Fetching next page: {}", link);
            match (self.fetch)(link.clone()).await {
                Ok(page) => {
                    self.pages_fetched += 1;
                    if page.next_page_link.as_deref() == Some(link.as_str()) {
                        self.finished = true;
                        return Some(Err(Error::Contract(format!(
                            "nextLink points back at the page just fetched: {}",
                            link
                        ))));
                    }
                    self.buffer.extend(page.items);
                    self.next_link = page.next_page_link;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }

    /// Drain every remaining page into a vector, stopping at the first error
    pub async fn try_collect_all(mut self) -> Result<Vec<T>> {
        let mut items = Vec::with_capacity(self.buffer.len());
        while let Some(item) = self.next().await {
            items.push(item?);
        }
        Ok(items)
    }

    /// Adapt into a [`Stream`]
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> + Send {
        futures::stream::unfold(self, |mut sequence| async move {
            let item = sequence.next().await?;
            Some((item, sequence))
        })
    }

    /// Convert each item lazily, including items of pages not yet fetched
    pub fn map<U, F>(self, f: F) -> PagedSequence<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let fetch = self.fetch;
        let buffer = self.buffer.into_iter().map(|item| f(item)).collect();
        PagedSequence {
            buffer,
            next_link: self.next_link,
            fetch: Arc::new(move |link| {
                let page = fetch(link);
                let f = f.clone();
                async move {
                    let page = page.await?;
                    Ok(Page {
                        items: page.items.into_iter().map(|item| f(item)).collect(),
                        next_page_link: page.next_page_link,
                    })
                }
                .boxed()
            }),
            pages_fetched: self.pages_fetched,
            finished: self.finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// `pages` pages of `per_page` consecutive integers
    fn numbered(
        pages: usize,
        per_page: usize,
        fetches: Arc<AtomicUsize>,
    ) -> PagedSequence<usize> {
        let page = move |index: usize| {
            let items = (index * per_page..(index + 1) * per_page).collect();
            let next = (index + 1 < pages).then(|| format!("https://example.test/?page={}", index + 1));
            Page::new(items, next)
        };
        let first = page(0);
        PagedSequence::new(first, move |link: String| {
            fetches.fetch_add(1, Ordering::SeqCst);
            let index: usize = link.rsplit('=').next().unwrap().parse().unwrap();
            let result = page(index);
            async move { Ok(result) }
        })
    }

    #[tokio::test]
    async fn test_collect_fetches_each_page_once() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let sequence = numbered(4, 3, fetches.clone());
        let items = sequence.try_collect_all().await.unwrap();
        assert_eq!(items, (0..12).collect::<Vec<_>>());
        assert_eq!(fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_pages_fetched_lazily() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let mut sequence = numbered(3, 2, fetches.clone());

        assert_eq!(sequence.next().await.unwrap().unwrap(), 0);
        assert_eq!(sequence.next().await.unwrap().unwrap(), 1);
        assert_eq!(sequence.pages_fetched(), 0);

        assert_eq!(sequence.next().await.unwrap().unwrap(), 2);
        assert_eq!(sequence.pages_fetched(), 1);
    }

    #[tokio::test]
    async fn test_independent_traversals_agree() {
        let a = numbered(3, 4, Arc::new(AtomicUsize::new(0)))
            .into_stream()
            .try_collect::<Vec<_>>()
            .await
            .unwrap();
        let b = numbered(3, 4, Arc::new(AtomicUsize::new(0)))
            .try_collect_all()
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_single_page_and_empty_pages() {
        let sequence = PagedSequence::new(Page::new(vec![1, 2], Some(String::new())), |_link| async {
            Err::<Page<i32>, _>(Error::Contract("should not fetch".to_string()))
        });
        assert_eq!(sequence.try_collect_all().await.unwrap(), vec![1, 2]);

        // An empty page in the middle is skipped, not treated as the end
        let sequence = PagedSequence::new(
            Page::new(vec![], Some("https://example.test/2".to_string())),
            |link: String| async move {
                if link.ends_with("/2") {
                    Ok(Page::new(vec![], Some("https://example.test/3".to_string())))
                } else {
                    Ok(Page::new(vec![7], None))
                }
            },
        );
        assert_eq!(sequence.try_collect_all().await.unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn test_error_is_yielded_once() {
        let mut sequence = PagedSequence::new(
            Page::new(vec![1], Some("https://example.test/2".to_string())),
            |_link| async {
                Err::<Page<i32>, _>(Error::Transport("connection reset".to_string()))
            },
        );
        assert_eq!(sequence.next().await.unwrap().unwrap(), 1);
        assert!(matches!(sequence.next().await, Some(Err(Error::Transport(_)))));
        assert!(sequence.next().await.is_none());
    }

    #[tokio::test]
    async fn test_repeated_next_link_is_contract_error() {
        let link = "https://example.test/same".to_string();
        let again = link.clone();
        let sequence = PagedSequence::new(Page::new(vec![1], Some(link)), move |_link| {
            let again = again.clone();
            async move { Ok(Page::new(vec![2], Some(again))) }
        });
        let err = sequence.try_collect_all().await.unwrap_err();
        assert!(matches!(err, Error::Contract(_)));
    }

    #[tokio::test]
    async fn test_map_applies_to_later_pages() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let names = numbered(2, 2, fetches)
            .map(|n| format!("item-{n}"))
            .try_collect_all()
            .await
            .unwrap();
        assert_eq!(names, vec!["item-0", "item-1", "item-2", "item-3"]);
    }

    #[test]
    fn test_page_deserialization() {
        let page: Page<serde_json::Value> =
            serde_json::from_str(r#"{"value": [{"id": "a"}], "nextLink": ""}"#).unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.next_page_link.is_none());

        let page: Page<serde_json::Value> =
            serde_json::from_str(r#"{"nextLink": "https://example.test/2"}"#).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.next_page_link.as_deref(), Some("https://example.test/2"));

        let page: Page<serde_json::Value> =
            serde_json::from_str(r#"{"value": [], "nextLink": null}"#).unwrap();
        assert!(page.next_page_link.is_none());
    }
}

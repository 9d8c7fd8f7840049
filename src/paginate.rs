//! Cursor-driven pagination.
//!
//! A [`PageSource`] knows how to fetch and decode one page at a given
//! cursor and reports the cursor the server handed back for the next page.
//! The [`Paginator`] drives it until one of these holds, checked in order:
//!
//! 1. the next cursor reaches the server-reported total (or there is none),
//! 2. under [`StopPolicy::StopOnEmpty`], a page yields no records,
//! 3. under [`StopPolicy::EmptyStreak`], that many consecutive pages were empty,
//! 4. the optional page cap is hit.
//!
//! Fetch and decode errors end the sequence and are returned to the caller
//! unchanged; nothing is retried. A server cursor that does not move past
//! the current one is a decode error.

use futures::stream::{self, Stream, TryStreamExt};

use crate::error::{PipelineError, Result};
use crate::progress::{PageEvent, ProgressSink, StopReason};

/// One decoded page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub records: Vec<T>,
    /// Cursor for the following page, as reported by the server.
    pub next: Option<u64>,
    /// Total record count, when the server reports one.
    pub total: Option<u64>,
}

pub trait PageSource {
    type Item;

    async fn fetch_page(&mut self, cursor: u64) -> Result<Page<Self::Item>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPolicy {
    /// The first empty page ends the run.
    StopOnEmpty,
    /// Tolerate empty pages until this many arrive back to back.
    EmptyStreak(u32),
}

pub struct Paginator<S, P> {
    source: S,
    progress: P,
    policy: StopPolicy,
    cursor: u64,
    max_pages: Option<u64>,
    pages: u64,
    records: usize,
    empty_streak: u32,
    done: bool,
}

impl<S, P> Paginator<S, P>
where
    S: PageSource,
    P: ProgressSink,
{
    pub fn new(source: S, policy: StopPolicy, progress: P) -> Self {
        Self {
            source,
            progress,
            policy,
            cursor: 0,
            max_pages: None,
            pages: 0,
            records: 0,
            empty_streak: 0,
            done: false,
        }
    }

    pub fn with_max_pages(mut self, max_pages: u64) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    /// Fetch until a page with records arrives or the run terminates.
    ///
    /// Returns `Ok(None)` once terminated; later calls issue no requests.
    pub async fn next_page(&mut self) -> Result<Option<Vec<S::Item>>> {
        loop {
            if self.done {
                return Ok(None);
            }
            if self.max_pages.is_some_and(|max| self.pages >= max) {
                self.finish(StopReason::PageLimit);
                return Ok(None);
            }

            let cursor = self.cursor;
            let page = match self.source.fetch_page(cursor).await {
                Ok(page) => page,
                Err(e) => {
                    self.done = true;
                    return Err(e);
                }
            };
            self.pages += 1;

            if page.records.is_empty() {
                self.empty_streak += 1;
                self.progress.on_event(&PageEvent::Empty {
                    page: self.pages,
                    cursor,
                    streak: self.empty_streak,
                });
                match self.policy {
                    StopPolicy::StopOnEmpty => {
                        self.finish(StopReason::EmptyPage);
                        return Ok(None);
                    }
                    StopPolicy::EmptyStreak(limit) if self.empty_streak >= limit => {
                        self.finish(StopReason::EmptyPageLimit);
                        return Ok(None);
                    }
                    StopPolicy::EmptyStreak(_) => {
                        if !self.advance(cursor, page.next, page.total)? {
                            return Ok(None);
                        }
                        continue;
                    }
                }
            }

            self.empty_streak = 0;
            self.records += page.records.len();
            self.progress.on_event(&PageEvent::Fetched {
                page: self.pages,
                cursor,
                records: page.records.len(),
                total: page.total,
            });
            self.advance(cursor, page.next, page.total)?;
            return Ok(Some(page.records));
        }
    }

    /// Stream of non-empty pages; ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<S::Item>>> {
        stream::unfold(self, |mut pager| async move {
            match pager.next_page().await {
                Ok(Some(records)) => Some((Ok(records), pager)),
                Ok(None) => None,
                Err(e) => Some((Err(e), pager)),
            }
        })
    }

    /// Drain every page into one record list.
    pub async fn collect_all(self) -> Result<Vec<S::Item>> {
        self.into_stream().try_concat().await
    }

    /// Move to the server-supplied cursor. Returns `Ok(false)` when the run is over.
    fn advance(&mut self, cursor: u64, next: Option<u64>, total: Option<u64>) -> Result<bool> {
        match next {
            Some(next) if next <= cursor => {
                self.done = true;
                Err(PipelineError::decode(format!(
                    "cursor did not advance: page at {cursor} pointed to {next}"
                )))
            }
            Some(next) if total.is_none_or(|total| next < total) => {
                self.cursor = next;
                Ok(true)
            }
            _ => {
                self.finish(StopReason::Exhausted);
                Ok(false)
            }
        }
    }

    fn finish(&mut self, reason: StopReason) {
        self.done = true;
        self.progress.on_event(&PageEvent::Finished {
            pages: self.pages,
            records: self.records,
            reason,
        });
    }
}

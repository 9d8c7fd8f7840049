//! Progress events emitted by the paginator.
//!
//! The paginator never formats or prints anything itself; it hands
//! [`PageEvent`]s to a [`ProgressSink`] chosen by the caller.

use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    /// A page produced records.
    Fetched {
        page: u64,
        cursor: u64,
        records: usize,
        /// Server-reported record total, when the source has one.
        total: Option<u64>,
    },
    /// A page produced no records.
    Empty { page: u64, cursor: u64, streak: u32 },
    /// Pagination ended.
    Finished { pages: u64, records: usize, reason: StopReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Cursor reached the server-reported total, or no further cursor.
    Exhausted,
    /// A page came back empty.
    EmptyPage,
    /// Too many consecutive empty pages.
    EmptyPageLimit,
    /// The configured maximum number of pages was fetched.
    PageLimit,
}

pub trait ProgressSink {
    fn on_event(&mut self, event: &PageEvent);
}

/// Ignores every event.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct NullProgress;

#[cfg(test)]
impl ProgressSink for NullProgress {
    fn on_event(&mut self, _event: &PageEvent) {}
}

/// Reports progress through `tracing`, labelled with the source name.
#[derive(Debug)]
pub struct TracingProgress {
    source: String,
    /// Records on the first non-empty page, taken as the page size.
    page_size: Option<usize>,
}

impl TracingProgress {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            page_size: None,
        }
    }

    /// Expected page count for `total` records, judged by the first page.
    fn estimate(&mut self, records: usize, total: Option<u64>) -> Option<u64> {
        let page_size = *self.page_size.get_or_insert(records);
        match total {
            Some(total) if page_size > 0 => Some(total.div_ceil(page_size as u64)),
            _ => None,
        }
    }
}

impl ProgressSink for TracingProgress {
    fn on_event(&mut self, event: &PageEvent) {
        match event {
            PageEvent::Fetched {
                page,
                cursor,
                records,
                total,
            } => match (total, self.estimate(*records, *total)) {
                (Some(total), Some(estimate)) => {
                    info!(source = %self.source, page, cursor, records, total, estimate, "Fetched page")
                }
                _ => info!(source = %self.source, page, cursor, records, "Fetched page"),
            },
            PageEvent::Empty { page, cursor, streak } => {
                debug!(source = %self.source, page, cursor, streak, "Empty page")
            }
            PageEvent::Finished {
                pages,
                records,
                reason,
            } => info!(source = %self.source, pages, records, ?reason, "Pagination finished"),
        }
    }
}

/// Keeps every event, for assertions.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingProgress {
    pub events: Vec<PageEvent>,
}

#[cfg(test)]
impl ProgressSink for RecordingProgress {
    fn on_event(&mut self, event: &PageEvent) {
        self.events.push(event.clone());
    }
}

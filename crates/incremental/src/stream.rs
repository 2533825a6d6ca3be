//! Diff streams and sources.
//!
//! Every operator consumes and produces a [`DiffStream`]. A consumer polls for
//! the next diff; `Poll::Pending` means "not ready" and the registered waker
//! is the "readable" signal. Dropping a stream cancels it.

use crate::delta::DiffRow;
use futures::stream::{self, BoxStream, Stream};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use tributary_core::{Bindings, Error, Result};

/// A pull-based stream of diff rows.
pub type DiffStream = BoxStream<'static, Result<DiffRow>>;

/// Builds a finite stream from a list of diffs.
pub fn from_rows(rows: Vec<DiffRow>) -> DiffStream {
    Box::pin(stream::iter(rows.into_iter().map(Ok)))
}

/// Builds a finite stream of additions.
pub fn from_bindings(rows: Vec<Bindings>) -> DiffStream {
    Box::pin(stream::iter(rows.into_iter().map(|b| Ok(DiffRow::addition(b)))))
}

/// A stream that ends immediately.
pub fn empty() -> DiffStream {
    Box::pin(stream::empty())
}

/// Ends `input` after its first error, dropping the upstream.
pub fn fuse_on_error(input: DiffStream) -> DiffStream {
    Box::pin(FuseOnError { input: Some(input) })
}

struct FuseOnError {
    input: Option<DiffStream>,
}

impl Stream for FuseOnError {
    type Item = Result<DiffRow>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let input = match self.input.as_mut() {
            Some(input) => input,
            None => return Poll::Ready(None),
        };
        match input.as_mut().poll_next(cx) {
            Poll::Ready(Some(Err(e))) => {
                log::error!("diff stream terminated: {}", e);
                self.input = None;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.input = None;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

/// Backpressure capability of a query source.
///
/// While halted, a source stops enumerating new diffs; nothing already
/// emitted is revoked. Halts nest: each `halt` needs a matching `resume`.
pub trait HaltableSource: Send + Sync {
    fn halt(&self);
    fn resume(&self);
}

/// A source the bind join may coordinate with.
#[derive(Clone)]
pub struct QuerySource {
    pub name: String,
    control: Option<Arc<dyn HaltableSource>>,
}

impl QuerySource {
    /// A source that supports halt/resume.
    pub fn haltable(name: impl Into<String>, control: Arc<dyn HaltableSource>) -> Self {
        Self {
            name: name.into(),
            control: Some(control),
        }
    }

    /// A source without backpressure support.
    pub fn passive(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            control: None,
        }
    }

    #[inline]
    pub fn is_haltable(&self) -> bool {
        self.control.is_some()
    }

    /// Halts the source; returns false if it has no backpressure support.
    pub fn halt(&self) -> bool {
        match &self.control {
            Some(control) => {
                control.halt();
                true
            }
            None => false,
        }
    }

    pub fn resume(&self) -> bool {
        match &self.control {
            Some(control) => {
                control.resume();
                true
            }
            None => false,
        }
    }
}

impl core::fmt::Debug for QuerySource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QuerySource")
            .field("name", &self.name)
            .field("haltable", &self.is_haltable())
            .finish()
    }
}

#[derive(Default)]
struct FeedState {
    queue: VecDeque<DiffRow>,
    closed: bool,
    halts: usize,
    consumed: bool,
    waker: Option<Waker>,
}

impl FeedState {
    fn wake(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

/// An in-memory, push-driven source of diffs.
///
/// Producers push diffs through any clone of the feed; the single consumer
/// obtained from [`ChangeFeed::stream`] sees them in push order. The stream
/// ends once the feed is closed and drained. Dropping the consumer lets a
/// new one attach and pick up the undelivered diffs.
#[derive(Clone, Default)]
pub struct ChangeFeed {
    state: Arc<Mutex<FeedState>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues a diff.
    pub fn push(&self, row: DiffRow) {
        let mut state = self.lock();
        if state.closed {
            log::warn!("diff pushed to a closed change feed was dropped");
            return;
        }
        state.queue.push_back(row);
        if state.halts == 0 {
            state.wake();
        }
    }

    /// Enqueues an addition.
    pub fn insert(&self, bindings: Bindings) {
        self.push(DiffRow::addition(bindings));
    }

    /// Enqueues a deletion.
    pub fn delete(&self, bindings: Bindings) {
        self.push(DiffRow::deletion(bindings));
    }

    /// Marks the end of the feed.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.wake();
    }

    /// Returns the number of diffs not yet consumed.
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_halted(&self) -> bool {
        self.lock().halts > 0
    }

    /// Returns the consumer side of the feed.
    ///
    /// While a consumer is attached, further calls return a stream that fails
    /// with `InvalidOperation`.
    pub fn stream(&self) -> DiffStream {
        let mut state = self.lock();
        if state.consumed {
            log::error!("change feed already has a consumer");
            return Box::pin(stream::iter(vec![Err(Error::invalid_operation(
                "change feed already has a consumer",
            ))]));
        }
        state.consumed = true;
        Box::pin(FeedStream { feed: self.clone() })
    }

    /// Returns true while a consumer is attached.
    pub fn has_consumer(&self) -> bool {
        self.lock().consumed
    }
}

impl HaltableSource for ChangeFeed {
    fn halt(&self) {
        let mut state = self.lock();
        state.halts += 1;
        log::debug!("change feed halted (depth {})", state.halts);
    }

    fn resume(&self) {
        let mut state = self.lock();
        state.halts = state.halts.saturating_sub(1);
        log::debug!("change feed resumed (depth {})", state.halts);
        if state.halts == 0 {
            state.wake();
        }
    }
}

struct FeedStream {
    feed: ChangeFeed,
}

impl Stream for FeedStream {
    type Item = Result<DiffRow>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut state = self.feed.lock();
        if state.halts == 0 {
            if let Some(row) = state.queue.pop_front() {
                return Poll::Ready(Some(Ok(row)));
            }
            if state.closed {
                return Poll::Ready(None);
            }
        }
        state.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for FeedStream {
    fn drop(&mut self) {
        let mut state = self.feed.lock();
        state.consumed = false;
        state.waker = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::StreamExt;
    use futures::task::noop_waker;
    use tributary_core::Term;

    fn row(v: i64) -> Bindings {
        Bindings::from([("x", Term::integer(v))])
    }

    #[test]
    fn test_from_rows() {
        let rows = block_on(from_bindings(vec![row(1), row(2)]).collect::<Vec<_>>());
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.as_ref().unwrap().is_addition));
    }

    #[test]
    fn test_feed_delivers_in_order() {
        let feed = ChangeFeed::new();
        feed.insert(row(1));
        feed.delete(row(1));
        feed.close();
        let rows: Vec<DiffRow> = block_on(feed.stream().map(|r| r.unwrap()).collect());
        assert_eq!(rows, vec![DiffRow::addition(row(1)), DiffRow::deletion(row(1))]);
    }

    #[test]
    fn test_feed_pending_until_push() {
        let feed = ChangeFeed::new();
        let mut stream = feed.stream();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        assert!(stream.poll_next_unpin(&mut cx).is_pending());

        feed.insert(row(1));
        match stream.poll_next_unpin(&mut cx) {
            Poll::Ready(Some(Ok(d))) => assert_eq!(d.bindings, row(1)),
            other => panic!("unexpected poll result: {:?}", other.map(|o| o.is_some())),
        }
    }

    #[test]
    fn test_feed_halt_resume_nests() {
        let feed = ChangeFeed::new();
        let mut stream = feed.stream();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);

        feed.insert(row(1));
        feed.halt();
        feed.halt();
        assert!(stream.poll_next_unpin(&mut cx).is_pending());
        feed.resume();
        assert!(feed.is_halted());
        assert!(stream.poll_next_unpin(&mut cx).is_pending());
        feed.resume();
        assert!(matches!(stream.poll_next_unpin(&mut cx), Poll::Ready(Some(Ok(_)))));
    }

    #[test]
    fn test_feed_has_one_consumer() {
        let feed = ChangeFeed::new();
        feed.insert(row(1));
        let first = feed.stream();
        assert!(feed.has_consumer());

        let second: Vec<Result<DiffRow>> = block_on(feed.stream().collect());
        assert!(matches!(second.as_slice(), [Err(tributary_core::Error::InvalidOperation { .. })]));
        assert_eq!(feed.pending(), 1);

        // A replacement consumer picks up what the first never read
        drop(first);
        assert!(!feed.has_consumer());
        feed.close();
        let rows: Vec<DiffRow> = block_on(feed.stream().map(|r| r.unwrap()).collect());
        assert_eq!(rows, vec![DiffRow::addition(row(1))]);
    }

    #[test]
    fn test_push_after_close_is_dropped() {
        let feed = ChangeFeed::new();
        feed.close();
        feed.insert(row(1));
        assert_eq!(feed.pending(), 0);
    }

    #[test]
    fn test_fuse_on_error() {
        let input: DiffStream = Box::pin(stream::iter(vec![
            Ok(DiffRow::addition(row(1))),
            Err(tributary_core::Error::MissingOrderContext),
            Ok(DiffRow::addition(row(2))),
        ]));
        let items = block_on(fuse_on_error(input).collect::<Vec<_>>());
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }

    #[test]
    fn test_query_source() {
        let feed = ChangeFeed::new();
        let source = QuerySource::haltable("feed", Arc::new(feed.clone()));
        assert!(source.halt());
        assert!(feed.is_halted());
        assert!(source.resume());
        assert!(!feed.is_halted());
        assert!(!QuerySource::passive("sparql endpoint").halt());
    }
}

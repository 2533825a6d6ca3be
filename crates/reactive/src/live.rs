//! Live query results.
//!
//! A `LiveQuery` sits at the end of an operator pipeline. It drains the
//! pipeline's diff stream, keeps the current result bag, and turns every
//! drained batch into a `ChangeSet` that is returned to the caller and
//! pushed to subscribers.

use crate::change_set::ChangeSet;
use crate::subscription::{SubscriptionId, SubscriptionManager};
use futures::future;
use futures::stream::{Stream, StreamExt};
use log::{debug, error, trace};
use std::pin::Pin;
use std::task::{Context, Poll};
use tributary_core::{Bindings, CanonicalHasher, Error, Result, SharedHasher};
use tributary_incremental::{DiffRow, DiffStream, Multiset};

/// Rows drained per batch unless configured otherwise.
pub const DEFAULT_BATCH_LIMIT: usize = 1024;

/// Lifecycle of a live query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryState {
    Running,
    /// The input ended; the result is final.
    Finished,
    /// An error was surfaced; the result is the last consistent one.
    Failed,
}

/// A query whose result is kept current as diffs arrive.
///
/// # Example
///
/// ```rust
/// use futures::executor::block_on;
/// use tributary_core::{Bindings, Term};
/// use tributary_incremental::ChangeFeed;
/// use tributary_reactive::LiveQuery;
///
/// let feed = ChangeFeed::new();
/// let mut query = LiveQuery::new(feed.stream());
///
/// feed.insert(Bindings::from([("x", Term::integer(1))]));
/// feed.close();
///
/// block_on(query.run_to_end()).unwrap();
/// assert_eq!(query.len(), 1);
/// ```
pub struct LiveQuery {
    input: Option<DiffStream>,
    hasher: SharedHasher,
    bag: Multiset,
    subscriptions: SubscriptionManager,
    batch_limit: usize,
    pending_error: Option<Error>,
    state: QueryState,
}

impl LiveQuery {
    /// Creates a live query over `input` with default settings.
    pub fn new(input: DiffStream) -> Self {
        LiveQueryBuilder::new(input).build()
    }

    /// Returns the current result, each row repeated by its multiplicity.
    pub fn result(&self) -> Vec<Bindings> {
        self.bag
            .iter()
            .flat_map(|e| std::iter::repeat(e.value.clone()).take(e.count as usize))
            .collect()
    }

    /// Returns the current result as a change set from the empty result, for
    /// subscribers that attach late.
    pub fn snapshot(&self) -> ChangeSet {
        ChangeSet::initial(self.result())
    }

    /// Returns the multiplicity of `row` in the current result.
    pub fn count(&self, row: &Bindings) -> u64 {
        match self.bag.get(self.hasher.hash(row, None)) {
            Some(entry) if entry.value == *row => entry.count,
            _ => 0,
        }
    }

    /// Returns the number of rows in the result, counting multiplicity.
    #[inline]
    pub fn len(&self) -> usize {
        self.bag.total() as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bag.is_empty()
    }

    #[inline]
    pub fn state(&self) -> QueryState {
        self.state
    }

    /// Returns true once the query will produce no further changes.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.state != QueryState::Running
    }

    /// Subscribes to changes with the given callback.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&ChangeSet) + Send + 'static,
    {
        self.subscriptions.subscribe(callback)
    }

    /// Unsubscribes by ID. Returns true if the subscription existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.unsubscribe(id)
    }

    /// Stops notifying a subscriber while keeping its ID reserved.
    pub fn pause_subscription(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.pause(id)
    }

    /// Drops every subscriber.
    pub fn clear_subscriptions(&mut self) {
        self.subscriptions.clear();
    }

    #[inline]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Drains every diff that is ready right now into one change set.
    ///
    /// Returns `Ready(Some(Ok(_)))` per non-empty batch (whose change set may
    /// still be empty when the batch cancels out), `Ready(Some(Err(_)))` once
    /// when the pipeline fails, and `Ready(None)` after the input ends or an
    /// error was surfaced.
    pub fn poll_changes(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<ChangeSet>>> {
        if let Some(e) = self.pending_error.take() {
            return self.fail(e);
        }
        let Some(input) = self.input.as_mut() else {
            return Poll::Ready(None);
        };

        let mut batch = Vec::new();
        let mut ended = false;
        while batch.len() < self.batch_limit {
            match input.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(row))) => batch.push(row),
                Poll::Ready(Some(Err(e))) => {
                    self.pending_error = Some(e);
                    break;
                }
                Poll::Ready(None) => {
                    ended = true;
                    break;
                }
                Poll::Pending => break,
            }
        }

        let mut applied = 0;
        for row in &batch {
            if let Err(e) = self.apply(row) {
                self.pending_error = Some(e);
                break;
            }
            applied += 1;
        }
        batch.truncate(applied);

        if ended && self.pending_error.is_none() {
            debug!("live query input ended with {} rows", self.bag.total());
            self.input = None;
            self.state = QueryState::Finished;
        }

        if !batch.is_empty() {
            let changes = ChangeSet::from_diffs(&batch);
            if !changes.is_empty() {
                self.subscriptions.notify_all(&changes);
            }
            return Poll::Ready(Some(Ok(changes)));
        }
        if let Some(e) = self.pending_error.take() {
            return self.fail(e);
        }
        if ended {
            return Poll::Ready(None);
        }
        Poll::Pending
    }

    /// Waits for the next change set.
    pub async fn next_changes(&mut self) -> Option<Result<ChangeSet>> {
        future::poll_fn(|cx| self.poll_changes(cx)).await
    }

    /// Drains the input until it ends, returning the net change over every
    /// batch, or the first error.
    pub async fn run_to_end(&mut self) -> Result<ChangeSet> {
        let mut net = ChangeSet::new();
        while let Some(changes) = self.next_changes().await {
            net.merge(changes?);
        }
        Ok(net)
    }

    fn apply(&mut self, row: &DiffRow) -> Result<()> {
        trace!("live query applying {:?}", row);
        let key = self.hasher.hash(&row.bindings, None);
        if row.is_addition {
            self.bag.insert(key, row.bindings.clone())?;
        } else {
            self.bag.remove(key, &row.bindings)?;
        }
        Ok(())
    }

    fn fail(&mut self, e: Error) -> Poll<Option<Result<ChangeSet>>> {
        error!("live query terminated: {}", e);
        self.input = None;
        self.state = QueryState::Failed;
        Poll::Ready(Some(Err(e)))
    }
}

impl Stream for LiveQuery {
    type Item = Result<ChangeSet>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_changes(cx)
    }
}

/// Builder for creating live queries.
pub struct LiveQueryBuilder {
    input: DiffStream,
    hasher: Option<SharedHasher>,
    batch_limit: usize,
    subscriptions: SubscriptionManager,
}

impl LiveQueryBuilder {
    pub fn new(input: DiffStream) -> Self {
        Self {
            input,
            hasher: None,
            batch_limit: DEFAULT_BATCH_LIMIT,
            subscriptions: SubscriptionManager::new(),
        }
    }

    pub fn hasher(mut self, hasher: SharedHasher) -> Self {
        self.hasher = Some(hasher);
        self
    }

    /// Caps how many diffs go into one change set. Zero is treated as one.
    pub fn batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    /// Registers a subscriber before the first batch is drained.
    pub fn subscribe<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ChangeSet) + Send + 'static,
    {
        self.subscriptions.subscribe(callback);
        self
    }

    pub fn build(self) -> LiveQuery {
        LiveQuery {
            input: Some(self.input),
            hasher: self.hasher.unwrap_or_else(CanonicalHasher::shared),
            bag: Multiset::new(),
            subscriptions: self.subscriptions,
            batch_limit: self.batch_limit,
            pending_error: None,
            state: QueryState::Running,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::stream;
    use futures::task::noop_waker;
    use std::sync::{Arc, Mutex};
    use tributary_core::{variables, Term};
    use tributary_incremental::{
        from_rows, AggregateExpression, AggregateFunction, ChangeFeed, GroupBy,
        StandardAggregatorFactory,
    };

    fn make_row(id: i64) -> Bindings {
        Bindings::from([("id", Term::integer(id))])
    }

    fn recorder() -> (Arc<Mutex<Vec<ChangeSet>>>, impl Fn(&ChangeSet) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let inner = seen.clone();
        (seen, move |cs: &ChangeSet| inner.lock().unwrap().push(cs.clone()))
    }

    #[test]
    fn test_live_query_collects_result() {
        let mut query = LiveQuery::new(from_rows(vec![
            DiffRow::addition(make_row(1)),
            DiffRow::addition(make_row(2)),
            DiffRow::addition(make_row(2)),
            DiffRow::deletion(make_row(1)),
        ]));

        let net = block_on(query.run_to_end()).unwrap();

        assert_eq!(net.added, vec![make_row(2), make_row(2)]);
        assert!(net.removed.is_empty());
        assert_eq!(query.state(), QueryState::Finished);
        assert_eq!(query.result(), vec![make_row(2), make_row(2)]);
        assert_eq!(LiveQuery::count(&query, &make_row(2)), 2);
        assert_eq!(LiveQuery::count(&query, &make_row(1)), 0);
        assert_eq!(query.snapshot(), ChangeSet::initial(query.result()));
        assert!(query.snapshot().removed.is_empty());
    }

    #[test]
    fn test_live_query_net_change_across_batches() {
        let mut query = LiveQueryBuilder::new(from_rows(vec![
            DiffRow::addition(make_row(1)),
            DiffRow::addition(make_row(2)),
            DiffRow::deletion(make_row(1)),
        ]))
        .batch_limit(1)
        .build();

        let net = block_on(query.run_to_end()).unwrap();
        assert_eq!(net.added, vec![make_row(2)]);
        assert!(net.removed.is_empty());
    }

    #[test]
    fn test_live_query_paused_subscriber() {
        let feed = ChangeFeed::new();
        let (active, on_active) = recorder();
        let (paused, on_paused) = recorder();
        let mut query = LiveQuery::new(feed.stream());
        query.subscribe(on_active);
        let id = query.subscribe(on_paused);
        assert!(query.pause_subscription(id));
        assert!(!query.pause_subscription(id + 1));
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);

        feed.insert(make_row(1));
        assert!(matches!(query.poll_changes(&mut cx), Poll::Ready(Some(Ok(_)))));
        assert_eq!(active.lock().unwrap().len(), 1);
        assert!(paused.lock().unwrap().is_empty());
        assert_eq!(query.subscription_count(), 2);

        query.clear_subscriptions();
        feed.insert(make_row(2));
        assert!(matches!(query.poll_changes(&mut cx), Poll::Ready(Some(Ok(_)))));
        assert_eq!(active.lock().unwrap().len(), 1);
        assert_eq!(query.subscription_count(), 0);
    }

    #[test]
    fn test_live_query_notifies_per_batch() {
        let feed = ChangeFeed::new();
        let (seen, callback) = recorder();
        let mut query = LiveQueryBuilder::new(feed.stream()).subscribe(callback).build();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);

        assert!(query.poll_changes(&mut cx).is_pending());

        feed.insert(make_row(1));
        feed.insert(make_row(2));
        match query.poll_changes(&mut cx) {
            Poll::Ready(Some(Ok(cs))) => assert_eq!(cs.added, vec![make_row(1), make_row(2)]),
            _ => panic!("expected the first batch"),
        }
        assert!(query.poll_changes(&mut cx).is_pending());

        feed.delete(make_row(1));
        match query.poll_changes(&mut cx) {
            Poll::Ready(Some(Ok(cs))) => assert_eq!(cs.removed, vec![make_row(1)]),
            _ => panic!("expected the retraction"),
        }

        feed.close();
        assert!(matches!(query.poll_changes(&mut cx), Poll::Ready(None)));
        assert!(query.is_finished());
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(query.result(), vec![make_row(2)]);
    }

    #[test]
    fn test_live_query_batch_limit() {
        let mut query = LiveQueryBuilder::new(from_rows(vec![
            DiffRow::addition(make_row(1)),
            DiffRow::addition(make_row(2)),
            DiffRow::addition(make_row(3)),
        ]))
        .batch_limit(2)
        .build();

        let first = block_on(query.next_changes()).unwrap().unwrap();
        let second = block_on(query.next_changes()).unwrap().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert!(block_on(query.next_changes()).is_none());
    }

    #[test]
    fn test_live_query_error_surfaces_once() {
        let input: DiffStream = Box::pin(stream::iter(vec![
            Ok(DiffRow::addition(make_row(1))),
            Err(Error::type_error("boom")),
            Ok(DiffRow::addition(make_row(2))),
        ]));
        let mut query = LiveQuery::new(input);

        let first = block_on(query.next_changes()).unwrap().unwrap();
        assert_eq!(first.added, vec![make_row(1)]);
        assert_eq!(
            block_on(query.next_changes()),
            Some(Err(Error::type_error("boom")))
        );
        assert!(block_on(query.next_changes()).is_none());

        assert_eq!(query.state(), QueryState::Failed);
        assert_eq!(query.result(), vec![make_row(1)]);
    }

    #[test]
    fn test_live_query_rejects_unknown_deletion() {
        let mut query = LiveQuery::new(from_rows(vec![DiffRow::deletion(make_row(7))]));

        let err = block_on(query.run_to_end()).unwrap_err();
        assert!(matches!(err, Error::RemovalInvariant { .. }));
        assert!(query.is_empty());
    }

    #[test]
    fn test_live_query_over_group_by() {
        let feed = ChangeFeed::new();
        let group = GroupBy::new(
            feed.stream(),
            variables(&["shop"]),
            vec![AggregateExpression::new(AggregateFunction::Sum, "amount".into(), "total".into())],
            Arc::new(StandardAggregatorFactory::new()),
            CanonicalHasher::shared(),
        );
        let mut query = LiveQuery::new(group.into_stream());
        let shop = |var: &str, amount| {
            Bindings::from([("shop", Term::string("a")), (var, Term::integer(amount))])
        };
        let sale = |amount| shop("amount", amount);
        let total = |amount| shop("total", amount);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);

        feed.insert(sale(3));
        assert!(matches!(query.poll_changes(&mut cx), Poll::Ready(Some(Ok(_)))));
        assert_eq!(query.result(), vec![total(3)]);

        feed.insert(sale(4));
        match query.poll_changes(&mut cx) {
            Poll::Ready(Some(Ok(cs))) => {
                assert_eq!(cs.removed, vec![total(3)]);
                assert_eq!(cs.added, vec![total(7)]);
            }
            _ => panic!("expected the regrouped total"),
        }
        assert_eq!(query.result(), vec![total(7)]);
    }
}

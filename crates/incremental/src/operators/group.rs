//! Incremental GROUP BY with aggregates.
//!
//! Each input diff is routed to the group of its key projection and folded
//! into that group's aggregators. Output is pull-driven: one dirty group is
//! considered per step, and a changed group row is retracted before the new
//! one is asserted.

use crate::aggregate::{AggregateExpression, Aggregator, AggregatorFactory};
use crate::delta::DiffRow;
use crate::stream::DiffStream;
use futures::future::{try_join_all, BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use hashbrown::HashMap;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tributary_core::{Bindings, Error, HashKey, Result, SharedHasher, Variable};

type Aggregators = Vec<Box<dyn Aggregator>>;
type PendingGroup = BoxFuture<'static, (HashKey, Result<Aggregators>)>;

enum GroupState {
    /// Aggregators are being constructed; diffs for the key wait here in
    /// arrival order.
    Initializing { buffered: VecDeque<DiffRow> },
    Ready { aggregators: Aggregators },
}

struct Group {
    key: Bindings,
    state: GroupState,
    previously_emitted: Option<Bindings>,
    count: i64,
    dirty: bool,
}

impl Group {
    fn apply(&mut self, row: &DiffRow) -> Result<()> {
        let aggregators = match &mut self.state {
            GroupState::Initializing { buffered } => {
                buffered.push_back(row.clone());
                return Ok(());
            }
            GroupState::Ready { aggregators } => aggregators,
        };
        if row.is_deletion() && self.count == 0 {
            return Err(Error::removal_invariant(format!(
                "group {} has no rows left to remove",
                self.key
            )));
        }
        for aggregator in aggregators.iter_mut() {
            aggregator.put_bindings(row)?;
        }
        self.count += row.diff();
        Ok(())
    }

    fn compute(&self, aggregates: &[AggregateExpression]) -> Result<Bindings> {
        let mut row = self.key.clone();
        if let GroupState::Ready { aggregators } = &self.state {
            for (expression, aggregator) in aggregates.iter().zip(aggregators) {
                if let Some(term) = aggregator.result()? {
                    row = row.with(expression.output.clone(), term);
                }
            }
        }
        Ok(row)
    }
}

/// GROUP BY over a diff stream.
pub struct GroupBy {
    input: Option<DiffStream>,
    variables: Vec<Variable>,
    aggregates: Vec<AggregateExpression>,
    factory: Arc<dyn AggregatorFactory>,
    hasher: SharedHasher,
    groups: HashMap<HashKey, Group>,
    initializing: FuturesUnordered<PendingGroup>,
    dirty: VecDeque<HashKey>,
    output: VecDeque<DiffRow>,
    seen_input: bool,
    empty_group: EmptyGroup,
    done: bool,
}

/// Progress of the result for grouping without keys over empty input.
enum EmptyGroup {
    Unresolved,
    Building(BoxFuture<'static, Result<Aggregators>>),
    Resolved,
}

impl GroupBy {
    pub fn new(
        input: DiffStream,
        variables: Vec<Variable>,
        aggregates: Vec<AggregateExpression>,
        factory: Arc<dyn AggregatorFactory>,
        hasher: SharedHasher,
    ) -> Self {
        Self {
            input: Some(input),
            variables,
            aggregates,
            factory,
            hasher,
            groups: HashMap::new(),
            initializing: FuturesUnordered::new(),
            dirty: VecDeque::new(),
            output: VecDeque::new(),
            seen_input: false,
            empty_group: EmptyGroup::Unresolved,
            done: false,
        }
    }

    pub fn into_stream(self) -> DiffStream {
        Box::pin(self)
    }

    /// Number of live groups, including ones still initializing.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    fn create_aggregators(&self) -> BoxFuture<'static, Result<Aggregators>> {
        let pending: Vec<_> = self
            .aggregates
            .iter()
            .map(|expression| self.factory.create(expression))
            .collect();
        try_join_all(pending).boxed()
    }

    fn mark_dirty(&mut self, key: HashKey) {
        if let Some(group) = self.groups.get_mut(&key) {
            if !group.dirty {
                group.dirty = true;
                self.dirty.push_back(key);
            }
        }
    }

    fn on_diff(&mut self, row: DiffRow) -> Result<()> {
        self.seen_input = true;
        let key_row = row.bindings.project(&self.variables);
        let key = self.hasher.hash(&key_row, None);
        match self.groups.get_mut(&key) {
            Some(group) => {
                if group.key != key_row {
                    return Err(Error::hash_collision(key, key));
                }
                group.apply(&row)?;
                if matches!(group.state, GroupState::Ready { .. }) {
                    self.mark_dirty(key);
                }
            }
            None if row.is_addition => {
                log::debug!("group {} created", key_row);
                let mut buffered = VecDeque::new();
                buffered.push_back(row);
                self.groups.insert(
                    key,
                    Group {
                        key: key_row,
                        state: GroupState::Initializing { buffered },
                        previously_emitted: None,
                        count: 0,
                        dirty: false,
                    },
                );
                let aggregators = self.create_aggregators();
                self.initializing
                    .push(async move { (key, aggregators.await) }.boxed());
            }
            None => {
                return Err(Error::removal_invariant(format!(
                    "deletion of {} for a group that does not exist",
                    row.bindings
                )))
            }
        }
        Ok(())
    }

    fn on_initialized(&mut self, key: HashKey, aggregators: Aggregators) -> Result<()> {
        let group = match self.groups.get_mut(&key) {
            Some(group) => group,
            None => return Ok(()),
        };
        let state = core::mem::replace(&mut group.state, GroupState::Ready { aggregators });
        if let GroupState::Initializing { buffered } = state {
            for row in buffered {
                group.apply(&row)?;
            }
        }
        self.mark_dirty(key);
        Ok(())
    }

    /// Queues the output of one dirty group.
    fn emit(&mut self, key: HashKey) -> Result<()> {
        let group = match self.groups.get_mut(&key) {
            Some(group) => group,
            None => return Ok(()),
        };
        group.dirty = false;

        if group.count == 0 {
            if let Some(previous) = group.previously_emitted.take() {
                self.output.push_back(DiffRow::deletion(previous));
            }
            log::debug!("group {} destroyed", group.key);
            self.groups.remove(&key);
            return Ok(());
        }

        let current = group.compute(&self.aggregates)?;
        match group.previously_emitted.take() {
            Some(previous) if previous == current => {
                group.previously_emitted = Some(previous);
            }
            Some(previous) => {
                self.output.push_back(DiffRow::deletion(previous));
                self.output.push_back(DiffRow::addition(current.clone()));
                group.previously_emitted = Some(current);
            }
            None => {
                self.output.push_back(DiffRow::addition(current.clone()));
                group.previously_emitted = Some(current);
            }
        }
        Ok(())
    }

    fn empty_input_row(&self, aggregators: &Aggregators) -> Option<Bindings> {
        let mut row = Bindings::new();
        let mut defined = false;
        for (expression, aggregator) in self.aggregates.iter().zip(aggregators) {
            if let Some(term) = aggregator.empty_value_term() {
                row = row.with(expression.output.clone(), term);
                defined = true;
            }
        }
        defined.then_some(row)
    }

    fn release(&mut self) {
        self.done = true;
        self.input = None;
        self.groups.clear();
        self.initializing = FuturesUnordered::new();
        self.dirty.clear();
        self.output.clear();
        self.empty_group = EmptyGroup::Resolved;
    }

    fn step(&mut self, cx: &mut Context<'_>) -> Result<Poll<Option<DiffRow>>> {
        loop {
            if let Some(row) = self.output.pop_front() {
                return Ok(Poll::Ready(Some(row)));
            }
            if let Some(key) = self.dirty.pop_front() {
                self.emit(key)?;
                continue;
            }
            if let Poll::Ready(Some((key, aggregators))) = self.initializing.poll_next_unpin(cx) {
                self.on_initialized(key, aggregators?)?;
                continue;
            }
            if let Some(input) = self.input.as_mut() {
                match input.poll_next_unpin(cx) {
                    Poll::Ready(Some(row)) => {
                        self.on_diff(row?)?;
                        continue;
                    }
                    Poll::Ready(None) => {
                        self.input = None;
                        continue;
                    }
                    Poll::Pending => return Ok(Poll::Pending),
                }
            }
            if !self.initializing.is_empty() {
                return Ok(Poll::Pending);
            }

            // Input ended: grouping without keys over nothing still yields a row
            match &mut self.empty_group {
                EmptyGroup::Unresolved => {
                    let implicit_group = self.variables.is_empty() && !self.aggregates.is_empty();
                    if implicit_group && !self.seen_input {
                        self.empty_group = EmptyGroup::Building(self.create_aggregators());
                    } else {
                        self.empty_group = EmptyGroup::Resolved;
                    }
                }
                EmptyGroup::Building(pending) => match pending.poll_unpin(cx) {
                    Poll::Ready(aggregators) => {
                        let aggregators = aggregators?;
                        self.empty_group = EmptyGroup::Resolved;
                        if let Some(row) = self.empty_input_row(&aggregators) {
                            self.output.push_back(DiffRow::addition(row));
                        }
                    }
                    Poll::Pending => return Ok(Poll::Pending),
                },
                EmptyGroup::Resolved => {
                    self.release();
                    return Ok(Poll::Ready(None));
                }
            }
        }
    }
}

impl Stream for GroupBy {
    type Item = Result<DiffRow>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.done {
            return Poll::Ready(None);
        }
        match this.step(cx) {
            Ok(Poll::Ready(row)) => Poll::Ready(row.map(Ok)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(e) => {
                log::error!("group by terminated: {}", e);
                this.release();
                Poll::Ready(Some(Err(e)))
            }
        }
    }
}

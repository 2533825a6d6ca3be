//! Computational bind join.
//!
//! Every distinct outer row is substituted into the remaining operations,
//! which are evaluated once and kept live. Duplicate outer rows stack on the
//! same record and replay its memory instead of re-evaluating. Retracting an
//! outer row halts every source, re-evaluates the bound operations against
//! the halted snapshot and retracts exactly what that evaluation returns.

use crate::delta::DiffRow;
use crate::memory::Multiset;
use crate::stream::{DiffStream, QuerySource};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{abortable, AbortHandle, BoxStream, SelectAll, Stream, StreamExt};
use hashbrown::HashMap;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tributary_core::{Bindings, Error, HashKey, Operation, Result, SharedHasher};

/// Evaluates a (bound) operation into a diff stream.
pub trait SubQueryEvaluator: Send + Sync {
    fn evaluate(&self, operation: &Operation) -> BoxFuture<'static, Result<DiffStream>>;
}

/// Options of a bind join.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BindJoinOptions {
    /// Deletions of unknown outer rows are ignored instead of raised.
    pub optional: bool,
}

/// State kept per distinct outer row.
struct Record {
    outer: Bindings,
    operation: Operation,
    /// Depth of the instance stack; every instance shares the live stream.
    instances: usize,
    memory: Multiset,
    stop: AbortHandle,
}

enum Phase {
    Idle,
    /// Evaluating the operations bound to a new outer row.
    Binding {
        key: HashKey,
        outer: Bindings,
        operation: Operation,
        pending: BoxFuture<'static, Result<DiffStream>>,
    },
    /// Sources are halted while a fresh evaluation is retracted.
    Retracting {
        outer: Bindings,
        pending: Option<BoxFuture<'static, Result<DiffStream>>>,
        snapshot: Option<DiffStream>,
    },
}

type LiveStream = BoxStream<'static, (HashKey, Result<DiffRow>)>;

/// Bind join of an outer diff stream into a set of operations.
///
/// Outer diffs are handled one at a time; the outer stream is not polled
/// while an evaluation or retraction is in flight.
pub struct ComputationalBindJoin {
    outer: Option<DiffStream>,
    operation: Operation,
    evaluator: Arc<dyn SubQueryEvaluator>,
    sources: Vec<QuerySource>,
    options: BindJoinOptions,
    hasher: SharedHasher,
    records: HashMap<HashKey, Record>,
    live: SelectAll<LiveStream>,
    phase: Phase,
    halted: bool,
    output: VecDeque<DiffRow>,
    done: bool,
}

impl ComputationalBindJoin {
    /// Fails with `UnsupportedOperation` when the operations cannot be bound
    /// into or a source cannot be halted.
    pub fn check_applicable(operations: &[Operation], sources: &[QuerySource]) -> Result<()> {
        if operations.is_empty() {
            return Err(Error::invalid_operation("bind join needs at least one operation"));
        }
        if operations.iter().any(|op| !op.is_bindable()) {
            return Err(Error::unsupported(
                "cannot bind into operations containing GROUP or EXTEND",
            ));
        }
        if let Some(source) = sources.iter().find(|s| !s.is_haltable()) {
            return Err(Error::unsupported(format!(
                "source {} does not support halting",
                source.name
            )));
        }
        Ok(())
    }

    pub fn new(
        outer: DiffStream,
        mut operations: Vec<Operation>,
        evaluator: Arc<dyn SubQueryEvaluator>,
        sources: Vec<QuerySource>,
        options: BindJoinOptions,
        hasher: SharedHasher,
    ) -> Result<Self> {
        Self::check_applicable(&operations, &sources)?;
        let operation = match operations.len() {
            1 => operations.remove(0),
            _ => Operation::Join(operations),
        };
        Ok(Self {
            outer: Some(outer),
            operation,
            evaluator,
            sources,
            options,
            hasher,
            records: HashMap::new(),
            live: SelectAll::new(),
            phase: Phase::Idle,
            halted: false,
            output: VecDeque::new(),
            done: false,
        })
    }

    pub fn into_stream(self) -> DiffStream {
        Box::pin(self)
    }

    /// Number of distinct outer rows with live sub-streams.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    fn halt_sources(&mut self) {
        for source in &self.sources {
            source.halt();
        }
        self.halted = true;
        log::debug!("bind join halted {} sources", self.sources.len());
    }

    fn resume_sources(&mut self) {
        if !self.halted {
            return;
        }
        for source in &self.sources {
            source.resume();
        }
        self.halted = false;
        log::debug!("bind join resumed {} sources", self.sources.len());
    }

    fn on_outer(&mut self, row: DiffRow) -> Result<()> {
        let key = self.hasher.hash(&row.bindings, None);
        let record = self.records.get_mut(&key);
        if let Some(record) = &record {
            if record.outer != row.bindings {
                return Err(Error::hash_collision(key, key));
            }
        }
        match (row.is_addition, record) {
            (true, Some(record)) => {
                record.instances += 1;
                for entry in record.memory.iter() {
                    if let Some(merged) = record.outer.merge(&entry.value) {
                        for _ in 0..entry.count {
                            self.output.push_back(DiffRow::addition(merged.clone()));
                        }
                    }
                }
            }
            (true, None) => {
                let operation = self.operation.materialize(&row.bindings)?;
                let pending = self.evaluator.evaluate(&operation);
                self.phase = Phase::Binding {
                    key,
                    outer: row.bindings,
                    operation,
                    pending,
                };
            }
            (false, Some(record)) => {
                record.instances -= 1;
                let outer = record.outer.clone();
                let operation = record.operation.clone();
                if record.instances == 0 {
                    record.stop.abort();
                    self.records.remove(&key);
                    log::debug!("bind join released {}", outer);
                }
                self.halt_sources();
                self.phase = Phase::Retracting {
                    outer,
                    pending: Some(self.evaluator.evaluate(&operation)),
                    snapshot: None,
                };
            }
            (false, None) if self.options.optional => {
                log::debug!("bind join ignored deletion of unknown {}", row.bindings);
            }
            (false, None) => {
                return Err(Error::removal_invariant(format!(
                    "bind join never saw outer row {}",
                    row.bindings
                )))
            }
        }
        Ok(())
    }

    fn on_live(&mut self, key: HashKey, row: DiffRow) -> Result<()> {
        let record = match self.records.get_mut(&key) {
            Some(record) => record,
            None => return Ok(()),
        };
        let sub_key = self.hasher.hash(&row.bindings, None);
        if row.is_addition {
            record.memory.insert(sub_key, row.bindings.clone())?;
        } else {
            record.memory.remove(sub_key, &row.bindings)?;
        }
        if let Some(merged) = record.outer.merge(&row.bindings) {
            for _ in 0..record.instances {
                self.output.push_back(DiffRow::new(merged.clone(), row.is_addition));
            }
        }
        Ok(())
    }

    fn on_bound(
        &mut self,
        key: HashKey,
        outer: Bindings,
        operation: Operation,
        stream: DiffStream,
    ) {
        let (stream, stop) = abortable(stream);
        self.live.push(stream.map(move |item| (key, item)).boxed());
        self.records.insert(
            key,
            Record {
                outer,
                operation,
                instances: 1,
                memory: Multiset::new(),
                stop,
            },
        );
    }

    fn release(&mut self) {
        self.done = true;
        self.resume_sources();
        for record in self.records.values() {
            record.stop.abort();
        }
        self.records.clear();
        self.live = SelectAll::new();
        self.outer = None;
        self.phase = Phase::Idle;
        self.output.clear();
    }

    fn step(&mut self, cx: &mut Context<'_>) -> Result<Poll<Option<DiffRow>>> {
        loop {
            if let Some(row) = self.output.pop_front() {
                return Ok(Poll::Ready(Some(row)));
            }
            match core::mem::replace(&mut self.phase, Phase::Idle) {
                Phase::Binding {
                    key,
                    outer,
                    operation,
                    mut pending,
                } => match pending.poll_unpin(cx) {
                    Poll::Ready(stream) => {
                        self.on_bound(key, outer, operation, stream?);
                        continue;
                    }
                    Poll::Pending => {
                        self.phase = Phase::Binding {
                            key,
                            outer,
                            operation,
                            pending,
                        };
                        return Ok(Poll::Pending);
                    }
                },
                Phase::Retracting {
                    outer,
                    mut pending,
                    mut snapshot,
                } => {
                    if let Some(future) = pending.as_mut() {
                        match future.poll_unpin(cx) {
                            Poll::Ready(stream) => {
                                snapshot = Some(stream?);
                                pending = None;
                            }
                            Poll::Pending => {
                                self.phase = Phase::Retracting {
                                    outer,
                                    pending,
                                    snapshot,
                                };
                                return Ok(Poll::Pending);
                            }
                        }
                    }
                    let poll = match snapshot.as_mut() {
                        Some(stream) => stream.poll_next_unpin(cx),
                        None => Poll::Ready(None),
                    };
                    match poll {
                        Poll::Ready(Some(row)) => {
                            let row = row?;
                            if let Some(merged) = outer.merge(&row.bindings) {
                                self.output.push_back(DiffRow::new(merged, !row.is_addition));
                            }
                            self.phase = Phase::Retracting {
                                outer,
                                pending,
                                snapshot,
                            };
                        }
                        Poll::Ready(None) => self.resume_sources(),
                        Poll::Pending => {
                            self.phase = Phase::Retracting {
                                outer,
                                pending,
                                snapshot,
                            };
                            return Ok(Poll::Pending);
                        }
                    }
                    continue;
                }
                Phase::Idle => {}
            }

            if let Poll::Ready(Some((key, item))) = self.live.poll_next_unpin(cx) {
                self.on_live(key, item?)?;
                continue;
            }
            if let Some(outer) = self.outer.as_mut() {
                match outer.poll_next_unpin(cx) {
                    Poll::Ready(Some(row)) => {
                        let row = row?;
                        log::trace!("bind join outer diff {:?}", row);
                        self.on_outer(row)?;
                        continue;
                    }
                    Poll::Ready(None) => {
                        self.outer = None;
                        continue;
                    }
                    Poll::Pending => return Ok(Poll::Pending),
                }
            }
            if self.live.is_empty() {
                self.release();
                return Ok(Poll::Ready(None));
            }
            return Ok(Poll::Pending);
        }
    }
}

impl Stream for ComputationalBindJoin {
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
                log::error!("bind join terminated: {}", e);
                this.release();
                Poll::Ready(Some(Err(e)))
            }
        }
    }
}

impl Drop for ComputationalBindJoin {
    fn drop(&mut self) {
        self.resume_sources();
    }
}

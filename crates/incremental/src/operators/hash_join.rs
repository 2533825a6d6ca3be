//! Symmetric incremental hash join.

use crate::delta::DiffRow;
use crate::memory::DualKeyMultiset;
use crate::stream::DiffStream;
use futures::stream::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use tributary_core::{Result, SharedHasher, Variable};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinSide {
    Left,
    Right,
}

impl JoinSide {
    fn other(self) -> JoinSide {
        match self {
            JoinSide::Left => JoinSide::Right,
            JoinSide::Right => JoinSide::Left,
        }
    }
}

/// Join memories for both sides.
///
/// When a row is added or removed on either side, its multiplicity in that
/// side's memory is updated and the row is replayed, with the same polarity,
/// against every live partner on the other side.
pub struct HashJoinState {
    left: DualKeyMultiset,
    right: DualKeyMultiset,
    variables: Vec<Variable>,
    hasher: SharedHasher,
}

impl HashJoinState {
    /// Creates a join on the given variables.
    pub fn new(variables: Vec<Variable>, hasher: SharedHasher) -> Self {
        Self {
            left: DualKeyMultiset::new(),
            right: DualKeyMultiset::new(),
            variables,
            hasher,
        }
    }

    fn memory(&mut self, side: JoinSide) -> &mut DualKeyMultiset {
        match side {
            JoinSide::Left => &mut self.left,
            JoinSide::Right => &mut self.right,
        }
    }

    /// Handles a diff arriving on `side`.
    ///
    /// Returns the join results produced (additions) or retracted
    /// (deletions) by it.
    pub fn on_diff(&mut self, side: JoinSide, row: &DiffRow) -> Result<Vec<DiffRow>> {
        let full_hash = self.hasher.hash(&row.bindings, None);
        let join_hash = self.hasher.hash(&row.bindings, Some(self.variables.as_slice()));

        let memory = self.memory(side);
        if row.is_addition {
            memory.insert(full_hash, join_hash, row.bindings.clone())?;
        } else {
            memory.remove(full_hash, join_hash, &row.bindings)?;
        }

        let partners = match side.other() {
            JoinSide::Left => &self.left,
            JoinSide::Right => &self.right,
        };
        let mut output = Vec::new();
        for partner in partners.matches(join_hash) {
            // Join-key hashes may collide; merging checks the actual values
            if let Some(merged) = row.bindings.merge(&partner.value) {
                for _ in 0..partner.count {
                    output.push(DiffRow::new(merged.clone(), row.is_addition));
                }
            }
        }
        Ok(output)
    }

    /// Handles a left-side diff.
    pub fn on_left(&mut self, row: &DiffRow) -> Result<Vec<DiffRow>> {
        self.on_diff(JoinSide::Left, row)
    }

    /// Handles a right-side diff.
    pub fn on_right(&mut self, row: &DiffRow) -> Result<Vec<DiffRow>> {
        self.on_diff(JoinSide::Right, row)
    }

    /// Returns the number of rows held for the left side.
    pub fn left_count(&self) -> u64 {
        self.left.total()
    }

    /// Returns the number of rows held for the right side.
    pub fn right_count(&self) -> u64 {
        self.right.total()
    }

    pub fn clear(&mut self) {
        self.left.clear();
        self.right.clear();
    }
}

/// Full hash join of two diff streams.
///
/// Both inputs are polled alternately; the join ends once both have ended.
pub struct FullHashJoin {
    left: Option<DiffStream>,
    right: Option<DiffStream>,
    state: HashJoinState,
    output: VecDeque<DiffRow>,
    next_side: JoinSide,
    done: bool,
}

impl FullHashJoin {
    pub fn new(
        left: DiffStream,
        right: DiffStream,
        variables: Vec<Variable>,
        hasher: SharedHasher,
    ) -> Self {
        Self {
            left: Some(left),
            right: Some(right),
            state: HashJoinState::new(variables, hasher),
            output: VecDeque::new(),
            next_side: JoinSide::Left,
            done: false,
        }
    }

    /// Boxes the join as a diff stream.
    pub fn into_stream(self) -> DiffStream {
        Box::pin(self)
    }

    fn input(&mut self, side: JoinSide) -> &mut Option<DiffStream> {
        match side {
            JoinSide::Left => &mut self.left,
            JoinSide::Right => &mut self.right,
        }
    }

    fn release(&mut self) {
        self.done = true;
        self.left = None;
        self.right = None;
        self.output.clear();
        self.state.clear();
    }

    /// Polls one side; Ready(true) if a diff was consumed.
    fn poll_side(&mut self, side: JoinSide, cx: &mut Context<'_>) -> Poll<Result<bool>> {
        let input = match self.input(side) {
            Some(input) => input,
            None => return Poll::Ready(Ok(false)),
        };
        match input.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(row))) => {
                log::trace!("join {:?} diff {:?}", side, row);
                let produced = self.state.on_diff(side, &row)?;
                self.output.extend(produced);
                Poll::Ready(Ok(true))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Err(e)),
            Poll::Ready(None) => {
                *self.input(side) = None;
                Poll::Ready(Ok(false))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Stream for FullHashJoin {
    type Item = Result<DiffRow>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if this.done {
                return Poll::Ready(None);
            }
            if let Some(row) = this.output.pop_front() {
                return Poll::Ready(Some(Ok(row)));
            }
            if this.left.is_none() && this.right.is_none() {
                this.release();
                return Poll::Ready(None);
            }

            let first = this.next_side;
            this.next_side = first.other();
            let mut progressed = false;
            for side in [first, first.other()] {
                match this.poll_side(side, cx) {
                    Poll::Ready(Ok(true)) => {
                        progressed = true;
                        break;
                    }
                    Poll::Ready(Ok(false)) | Poll::Pending => {}
                    Poll::Ready(Err(e)) => {
                        log::error!("hash join terminated: {}", e);
                        this.release();
                        return Poll::Ready(Some(Err(e)));
                    }
                }
            }
            if !progressed && (this.left.is_some() || this.right.is_some()) {
                return Poll::Pending;
            }
        }
    }
}

//! Hooks invoked by the pathfinder once per expanded cell, after the cell is
//! popped from the open list and before its neighbours are examined.
//!
//! Observers only get read access to the search state. Returning
//! [`StepControl::Cancel`] stops the search with `PathResult::Cancelled`.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use derive_new::new;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::{Coordinate, Grid};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StepControl {
    Continue,
    Cancel,
}

pub trait SearchObserver {
    fn on_expand(&mut self, step: &SearchStep<'_>) -> StepControl;

    /// Runs `self` then `other`; the search is cancelled if either asks for it.
    fn chain<B: SearchObserver>(self, other: B) -> Chain<Self, B>
    where
        Self: Sized,
    {
        Chain::new(self, other)
    }
}

/// Pins a closure to the observer signature so its argument type is inferred.
pub fn from_fn<F>(f: F) -> F
where
    F: FnMut(&SearchStep<'_>) -> StepControl,
{
    f
}

impl<F> SearchObserver for F
where
    F: FnMut(&SearchStep<'_>) -> StepControl,
{
    fn on_expand(&mut self, step: &SearchStep<'_>) -> StepControl {
        self(step)
    }
}

/// Read-only view of the search at one expansion.
pub struct SearchStep<'a> {
    grid: &'a Grid,
    current: Coordinate,
    g_cost: u32,
    expanded: usize,
    open: &'a [bool],
    closed: &'a [bool],
}

impl<'a> SearchStep<'a> {
    pub(crate) fn new(
        grid: &'a Grid,
        current: Coordinate,
        g_cost: u32,
        expanded: usize,
        open: &'a [bool],
        closed: &'a [bool],
    ) -> Self {
        Self {
            grid,
            current,
            g_cost,
            expanded,
            open,
            closed,
        }
    }

    pub fn grid(&self) -> &'a Grid {
        self.grid
    }

    /// The cell being expanded. It is neither open nor closed yet.
    pub fn current(&self) -> Coordinate {
        self.current
    }

    pub fn g_cost(&self) -> u32 {
        self.g_cost
    }

    /// Number of expansions so far, this one included.
    pub fn expanded(&self) -> usize {
        self.expanded
    }

    pub fn is_open(&self, coord: &Coordinate) -> bool {
        self.grid.in_bounds(coord) && self.open[self.grid.index(coord)]
    }

    pub fn is_closed(&self, coord: &Coordinate) -> bool {
        self.grid.in_bounds(coord) && self.closed[self.grid.index(coord)]
    }

    pub fn is_blocked(&self, coord: &Coordinate) -> bool {
        self.grid.is_blocked(coord)
    }

    pub fn open_cells(&self) -> impl Iterator<Item = Coordinate> + 'a {
        Self::members(self.grid, self.open)
    }

    pub fn closed_cells(&self) -> impl Iterator<Item = Coordinate> + 'a {
        Self::members(self.grid, self.closed)
    }

    /// Owned copy of the open and closed sets, for handing to another thread.
    pub fn snapshot(&self) -> SearchSnapshot {
        SearchSnapshot {
            current: self.current,
            g_cost: self.g_cost,
            expanded: self.expanded,
            open: self.open_cells().collect(),
            closed: self.closed_cells().collect(),
        }
    }

    fn members(grid: &'a Grid, flags: &'a [bool]) -> impl Iterator<Item = Coordinate> + 'a {
        flags
            .iter()
            .enumerate()
            .filter(|(_, set)| **set)
            .map(move |(index, _)| grid.coordinate(index))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSnapshot {
    pub current: Coordinate,
    pub g_cost: u32,
    pub expanded: usize,
    pub open: Vec<Coordinate>,
    pub closed: Vec<Coordinate>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl SearchObserver for NoopObserver {
    fn on_expand(&mut self, _step: &SearchStep<'_>) -> StepControl {
        StepControl::Continue
    }
}

#[derive(new)]
pub struct Chain<A, B> {
    first: A,
    second: B,
}

impl<A: SearchObserver, B: SearchObserver> SearchObserver for Chain<A, B> {
    fn on_expand(&mut self, step: &SearchStep<'_>) -> StepControl {
        if self.first.on_expand(step) == StepControl::Cancel {
            return StepControl::Cancel;
        }
        self.second.on_expand(step)
    }
}

/// Cancellation signal shared between the search and whoever wants to stop it.
/// Clones share the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl SearchObserver for CancelFlag {
    fn on_expand(&mut self, _step: &SearchStep<'_>) -> StepControl {
        if self.is_cancelled() {
            StepControl::Cancel
        } else {
            StepControl::Continue
        }
    }
}

/// Cancels the search once `Instant::now()` passes the deadline.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub fn at(at: Instant) -> Self {
        Self { at: Some(at) }
    }

    pub fn after(timeout: Duration) -> Self {
        Self::at(Instant::now() + timeout)
    }

    pub fn never() -> Self {
        Self { at: None }
    }

    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map_or_else(Self::never, Self::after)
    }

    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }
}

impl SearchObserver for Deadline {
    fn on_expand(&mut self, step: &SearchStep<'_>) -> StepControl {
        if self.is_expired() {
            debug!("deadline passed after {} expansions", step.expanded());
            return StepControl::Cancel;
        }
        StepControl::Continue
    }
}

/// Forwards a snapshot per step over a bounded channel without blocking.
/// Snapshots are dropped while the channel is full. A disconnected receiver
/// cancels the search.
pub struct ChannelObserver {
    sender: Sender<SearchSnapshot>,
    dropped: usize,
}

impl ChannelObserver {
    pub fn new(sender: Sender<SearchSnapshot>) -> Self {
        Self { sender, dropped: 0 }
    }

    pub fn bounded(capacity: usize) -> (Self, Receiver<SearchSnapshot>) {
        let (sender, receiver) = bounded(capacity);
        (Self::new(sender), receiver)
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl SearchObserver for ChannelObserver {
    fn on_expand(&mut self, step: &SearchStep<'_>) -> StepControl {
        match self.sender.try_send(step.snapshot()) {
            Ok(()) => StepControl::Continue,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                trace!("observer channel full, dropped step {}", step.expanded());
                StepControl::Continue
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("observer channel disconnected, cancelling search");
                StepControl::Cancel
            }
        }
    }
}

/// Logs search progress every `every` expansions.
#[derive(new)]
pub struct ProgressLogger {
    every: usize,
}

impl SearchObserver for ProgressLogger {
    fn on_expand(&mut self, step: &SearchStep<'_>) -> StepControl {
        if self.every > 0 && step.expanded() % self.every == 0 {
            debug!(
                "expanded {} cells, at {} with g:{}",
                step.expanded(),
                step.current(),
                step.g_cost()
            );
        }
        StepControl::Continue
    }
}

#![forbid(unsafe_code)]

//! Caller-side selection logic consulted while a claim walks the unlocked candidates.
//!
//! A claim first asks the selector to `evaluate` every candidate, in the
//! (randomized) order they will be visited, and only then runs the returned
//! decisions one after another. Decisions that share state through the
//! selector therefore observe the outcome of every earlier decision in the
//! same claim, which is what `first` relies on. `begin` is called once at the
//! start of every walk, so such state never leaks from one claim into the next.

use crate::model::Resource;
use std::cell::Cell;
use std::marker::PhantomData;

/// Deferred yes/no answer for one candidate. Run at most once.
pub struct Decision<'a>(Box<dyn FnOnce() -> bool + 'a>);

impl<'a> Decision<'a> {
    pub fn new(decide: impl FnOnce() -> bool + 'a) -> Self {
        Self(Box::new(decide))
    }

    pub fn claim() -> Self {
        Self::new(|| true)
    }

    pub fn skip() -> Self {
        Self::new(|| false)
    }

    pub fn decide(self) -> bool {
        (self.0)()
    }
}

impl std::fmt::Debug for Decision<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Decision(..)")
    }
}

pub trait Selector {
    /// Resets per-walk state. Called before the first `evaluate` of each claim.
    fn begin(&self) {}

    fn evaluate<'a>(&'a self, candidate: &'a Resource) -> Decision<'a>;
}

/// Claims every unlocked candidate. Used when a claim names no selector.
#[derive(Clone, Copy, Debug, Default)]
pub struct All;

impl Selector for All {
    fn evaluate<'a>(&'a self, _candidate: &'a Resource) -> Decision<'a> {
        Decision::claim()
    }
}

pub fn all() -> All {
    All
}

/// Claims every candidate the predicate accepts.
#[derive(Clone, Copy, Debug)]
pub struct Matching<F> {
    predicate: F,
}

impl<F> Selector for Matching<F>
where
    F: Fn(&Resource) -> bool,
{
    fn evaluate<'a>(&'a self, candidate: &'a Resource) -> Decision<'a> {
        Decision::new(move || (self.predicate)(candidate))
    }
}

pub fn matching<F>(predicate: F) -> Matching<F>
where
    F: Fn(&Resource) -> bool,
{
    Matching { predicate }
}

/// Claims the first accepted candidate of the walk and nothing after it.
#[derive(Debug)]
pub struct First<F> {
    predicate: F,
    taken: Cell<bool>,
}

impl<F> Selector for First<F>
where
    F: Fn(&Resource) -> bool,
{
    fn begin(&self) {
        self.taken.set(false);
    }

    fn evaluate<'a>(&'a self, candidate: &'a Resource) -> Decision<'a> {
        Decision::new(move || {
            if self.taken.get() || !(self.predicate)(candidate) {
                return false;
            }
            self.taken.set(true);
            true
        })
    }
}

pub fn first<F>(predicate: F) -> First<F>
where
    F: Fn(&Resource) -> bool,
{
    First {
        predicate,
        taken: Cell::new(false),
    }
}

pub fn first_any() -> First<fn(&Resource) -> bool> {
    fn any(_: &Resource) -> bool {
        true
    }
    first(any as fn(&Resource) -> bool)
}

/// Wraps a caller-built two-stage function: candidate in, deferred decision out.
///
/// Decisions may borrow state that lives for `'f` but not the candidate
/// itself; clone what the decision needs.
pub struct Lazy<'f, F> {
    evaluate: F,
    _decision: PhantomData<fn() -> Decision<'f>>,
}

impl<'f, F> Selector for Lazy<'f, F>
where
    F: Fn(&Resource) -> Decision<'f>,
{
    fn evaluate<'a>(&'a self, candidate: &'a Resource) -> Decision<'a> {
        (self.evaluate)(candidate)
    }
}

pub fn lazy<'f, F>(evaluate: F) -> Lazy<'f, F>
where
    F: Fn(&Resource) -> Decision<'f>,
{
    Lazy {
        evaluate,
        _decision: PhantomData,
    }
}

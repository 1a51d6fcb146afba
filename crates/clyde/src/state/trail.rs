//! The change log that records previous domain shapes so that inferences can
//! be undone in LIFO order when the search backtracks.

use crate::{interval_set::IntervalSet, state::IntVarRef};

#[derive(Clone, Debug, PartialEq, Eq)]
/// A recorded domain mutation, carrying the shape the variable had before.
pub(crate) struct TrailEntry {
	/// The variable whose domain was changed.
	pub(crate) var: IntVarRef,
	/// The exact domain the variable had before the change.
	pub(crate) previous: IntervalSet,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// An append-only log of domain mutations.
///
/// Epochs are not tracked here: a checkpoint is simply the length of the
/// trail at the time it was taken, and rolling back means popping entries
/// until the trail shrinks back to that length.
pub(crate) struct Trail {
	/// The recorded changes, oldest first.
	entries: Vec<TrailEntry>,
}

impl Trail {
	/// The number of recorded changes.
	pub(crate) fn len(&self) -> usize {
		self.entries.len()
	}

	/// Record that `var` had the domain `previous` before the change that is
	/// currently being applied.
	pub(crate) fn record(&mut self, var: IntVarRef, previous: IntervalSet) {
		self.entries.push(TrailEntry { var, previous });
	}

	/// Remove and return the most recent change.
	pub(crate) fn pop(&mut self) -> Option<TrailEntry> {
		self.entries.pop()
	}
}

#[cfg(test)]
mod tests {
	use crate::{
		interval_set::IntervalSet,
		state::{trail::Trail, IntVarRef},
	};

	#[test]
	fn test_lifo_order() {
		let mut trail = Trail::default();
		trail.record(IntVarRef::new(0), IntervalSet::new(1, 5));
		trail.record(IntVarRef::new(1), IntervalSet::new(2, 2));
		trail.record(IntVarRef::new(0), IntervalSet::new(2, 5));
		assert_eq!(trail.len(), 3);

		let e = trail.pop().unwrap();
		assert_eq!(e.var, IntVarRef::new(0));
		assert_eq!(e.previous, IntervalSet::new(2, 5));
		let e = trail.pop().unwrap();
		assert_eq!(e.var, IntVarRef::new(1));
		let e = trail.pop().unwrap();
		assert_eq!(e.previous, IntervalSet::new(1, 5));
		assert!(trail.pop().is_none());
	}
}

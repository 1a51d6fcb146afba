//! The scheduling queue used by the propagation engine.
//!
//! Priority is the propagator index itself: lower-indexed propagators
//! (installed earlier, typically cheaper) always run first, which makes the
//! order of a propagation fixed point deterministic.

use std::collections::BTreeSet;

use crate::propagators::PropRef;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// A queue of scheduled propagators, popped in index order.
///
/// Inserting an already-scheduled propagator is a no-op, so no separate
/// enqueued flags are needed.
pub(crate) struct ScheduleQueue {
	/// The scheduled propagators.
	scheduled: BTreeSet<PropRef>,
}

impl ScheduleQueue {
	/// Schedule a propagator.
	pub(crate) fn insert(&mut self, prop: PropRef) {
		let _ = self.scheduled.insert(prop);
	}

	/// Remove and return the lowest-indexed scheduled propagator.
	pub(crate) fn pop(&mut self) -> Option<PropRef> {
		self.scheduled.pop_first()
	}

	/// Unschedule everything.
	pub(crate) fn clear(&mut self) {
		self.scheduled.clear();
	}

	/// Whether no propagator is scheduled.
	pub(crate) fn is_empty(&self) -> bool {
		self.scheduled.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use crate::propagators::{queue::ScheduleQueue, PropRef};

	#[test]
	fn test_pop_order_is_index_order() {
		let mut queue = ScheduleQueue::default();
		for i in [4_usize, 1, 3, 1, 0] {
			queue.insert(PropRef::from(i));
		}
		let mut order = Vec::new();
		while let Some(p) = queue.pop() {
			order.push(usize::from(p));
		}
		assert_eq!(order, vec![0, 1, 3, 4]);
		assert!(queue.is_empty());
	}
}

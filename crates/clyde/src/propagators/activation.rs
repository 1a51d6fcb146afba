//! Per-variable lists of propagators to wake when the variable's domain
//! changes in a particular way.

use crate::{propagators::PropRef, state::DomainChange};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// The inverted trigger index for one variable.
pub(crate) struct ActivationList {
	/// Woken by any change to the domain.
	on_change: Vec<PropRef>,
	/// Woken when a bound moves.
	on_bounds: Vec<PropRef>,
	/// Woken only when the variable is fixed to a single value.
	on_instantiated: Vec<PropRef>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// The kind of domain event a propagator subscribes to.
pub(crate) enum Trigger {
	/// Any interior or bound change.
	Change,
	/// Bound changes (and fixings).
	Bounds,
	/// Full fixings only.
	Instantiated,
}

impl ActivationList {
	/// Subscribe a propagator to an event kind on this variable.
	pub(crate) fn subscribe(&mut self, trigger: Trigger, prop: PropRef) {
		match trigger {
			Trigger::Change => self.on_change.push(prop),
			Trigger::Bounds => self.on_bounds.push(prop),
			Trigger::Instantiated => self.on_instantiated.push(prop),
		}
	}

	/// The propagators woken by the given change.
	///
	/// A fixing wakes all three sets; a bounds change wakes the bounds and
	/// change sets; an interior change wakes only the change set. The
	/// instantiated set fires only on a full fixing.
	pub(crate) fn activated_by(&self, change: DomainChange) -> impl Iterator<Item = PropRef> + '_ {
		let (change_set, bounds, fixed): (&[PropRef], &[PropRef], &[PropRef]) = match change {
			DomainChange::Unchanged => (&[], &[], &[]),
			DomainChange::Interior => (&self.on_change, &[], &[]),
			DomainChange::Bounds => (&self.on_change, &self.on_bounds, &[]),
			DomainChange::Fixed => (&self.on_change, &self.on_bounds, &self.on_instantiated),
		};
		change_set
			.iter()
			.chain(bounds)
			.chain(fixed)
			.copied()
	}
}

#[cfg(test)]
mod tests {
	use crate::{
		propagators::{
			activation::{ActivationList, Trigger},
			PropRef,
		},
		state::DomainChange,
	};

	#[test]
	fn test_event_dispatch() {
		let mut list = ActivationList::default();
		list.subscribe(Trigger::Change, PropRef::from(0_usize));
		list.subscribe(Trigger::Bounds, PropRef::from(1_usize));
		list.subscribe(Trigger::Instantiated, PropRef::from(2_usize));

		let woken = |change| -> Vec<usize> {
			list.activated_by(change).map(usize::from).collect()
		};
		assert_eq!(woken(DomainChange::Unchanged), Vec::<usize>::new());
		assert_eq!(woken(DomainChange::Interior), vec![0]);
		assert_eq!(woken(DomainChange::Bounds), vec![0, 1]);
		assert_eq!(woken(DomainChange::Fixed), vec![0, 1, 2]);
	}
}

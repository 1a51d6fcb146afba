//! An ordered sequence of disjoint closed integer intervals, used as the
//! mutable in-engine representation of a variable's domain.
//!
//! Erase operations report how they changed the set using [`DomainChange`],
//! which is what lets the propagation engine wake only the propagators that
//! care about the kind of change that happened.

use crate::{state::DomainChange, IntSetVal, IntVal};

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
/// A set of integers stored as sorted, non-adjacent closed intervals.
///
/// Invariant: intervals are strictly increasing, separated by a gap of at
/// least one integer, and `lower ≤ upper` within each interval.
pub struct IntervalSet {
	/// The sorted interval storage.
	ranges: Vec<(IntVal, IntVal)>,
}

impl IntervalSet {
	/// Create a set holding the single closed interval `[lower, upper]`.
	///
	/// An empty set is created when `lower > upper`.
	pub fn new(lower: IntVal, upper: IntVal) -> Self {
		if lower > upper {
			Self::default()
		} else {
			Self {
				ranges: vec![(lower, upper)],
			}
		}
	}

	/// Create a set from a sorted range list.
	pub fn from_ranges(ranges: &IntSetVal) -> Self {
		let mut set = Self::default();
		for r in ranges.iter() {
			set.insert_at_end_range(*r.start(), *r.end());
		}
		set
	}

	/// Whether the set contains no values.
	pub fn is_empty(&self) -> bool {
		self.ranges.is_empty()
	}

	/// The number of values in the set.
	pub fn card(&self) -> IntVal {
		self.ranges.iter().map(|&(l, u)| u - l + 1).sum()
	}

	/// The smallest value in the set.
	///
	/// The set must not be empty.
	pub fn lower(&self) -> IntVal {
		debug_assert!(!self.ranges.is_empty());
		self.ranges[0].0
	}

	/// The largest value in the set.
	///
	/// The set must not be empty.
	pub fn upper(&self) -> IntVal {
		debug_assert!(!self.ranges.is_empty());
		self.ranges[self.ranges.len() - 1].1
	}

	/// Whether `value` is a member of the set.
	pub fn contains(&self, value: IntVal) -> bool {
		for &(l, u) in &self.ranges {
			if l <= value && value <= u {
				return true;
			}
			if l > value {
				return false;
			}
		}
		false
	}

	/// Whether the set consists of more than one interval.
	pub fn has_holes(&self) -> bool {
		self.ranges.len() > 1
	}

	/// Remove all values from the set.
	pub fn clear(&mut self) {
		self.ranges.clear();
	}

	/// Append `value` to the set, which must be greater than the current upper
	/// bound. Used during construction.
	pub fn insert_at_end(&mut self, value: IntVal) {
		self.insert_at_end_range(value, value);
	}

	/// Append the interval `[lower, upper]` to the set, whose values must all
	/// be greater than the current upper bound. Used during construction.
	pub fn insert_at_end_range(&mut self, lower: IntVal, upper: IntVal) {
		if lower > upper {
			return;
		}
		debug_assert!(self.ranges.last().is_none_or(|&(_, u)| u < lower));
		match self.ranges.last_mut() {
			Some(last) if last.1 == lower - 1 => last.1 = upper,
			_ => self.ranges.push((lower, upper)),
		}
	}

	/// Remove a single value, reporting how the set changed.
	///
	/// The result is [`DomainChange::Unchanged`] if the value was not a
	/// member, [`DomainChange::Fixed`] if one value remains,
	/// [`DomainChange::Bounds`] if the value was the smallest or largest
	/// member, and [`DomainChange::Interior`] otherwise. If the last value is
	/// removed the set becomes empty and the caller is expected to treat the
	/// result as a contradiction.
	pub fn erase(&mut self, value: IntVal) -> DomainChange {
		let Some(idx) = self
			.ranges
			.iter()
			.position(|&(l, u)| l <= value && value <= u)
		else {
			return DomainChange::Unchanged;
		};
		let at_bound = value == self.lower() || value == self.upper();
		let (l, u) = self.ranges[idx];
		if l == u {
			let _ = self.ranges.remove(idx);
		} else if value == l {
			self.ranges[idx].0 += 1;
		} else if value == u {
			self.ranges[idx].1 -= 1;
		} else {
			self.ranges[idx].1 = value - 1;
			self.ranges.insert(idx + 1, (value + 1, u));
		}
		if self.card() == 1 {
			DomainChange::Fixed
		} else if at_bound {
			DomainChange::Bounds
		} else {
			DomainChange::Interior
		}
	}

	/// Remove every value strictly below `value`, reporting how the set
	/// changed.
	pub fn erase_less_than(&mut self, value: IntVal) -> DomainChange {
		if self.ranges.is_empty() || value <= self.lower() {
			return DomainChange::Unchanged;
		}
		self.ranges.retain_mut(|r| {
			if r.1 < value {
				false
			} else {
				r.0 = r.0.max(value);
				true
			}
		});
		match self.card() {
			0 => DomainChange::Bounds,
			1 => DomainChange::Fixed,
			_ => DomainChange::Bounds,
		}
	}

	/// Remove every value strictly above `value`, reporting how the set
	/// changed.
	pub fn erase_greater_than(&mut self, value: IntVal) -> DomainChange {
		if self.ranges.is_empty() || value >= self.upper() {
			return DomainChange::Unchanged;
		}
		self.ranges.retain_mut(|r| {
			if r.0 > value {
				false
			} else {
				r.1 = r.1.min(value);
				true
			}
		});
		match self.card() {
			0 => DomainChange::Bounds,
			1 => DomainChange::Fixed,
			_ => DomainChange::Bounds,
		}
	}

	/// Iterate over the values of the set in increasing order.
	pub fn values(&self) -> impl Iterator<Item = IntVal> + '_ {
		self.ranges.iter().flat_map(|&(l, u)| l..=u)
	}

	/// Iterate over the values of the set in decreasing order.
	pub fn values_rev(&self) -> impl Iterator<Item = IntVal> + '_ {
		self.ranges.iter().rev().flat_map(|&(l, u)| (l..=u).rev())
	}

	/// Iterate over the intervals of the set in increasing order.
	pub fn intervals(&self) -> impl Iterator<Item = (IntVal, IntVal)> + '_ {
		self.ranges.iter().copied()
	}

	/// Iterate over the gaps between consecutive intervals, as closed
	/// intervals of absent values.
	pub fn gaps(&self) -> impl Iterator<Item = (IntVal, IntVal)> + '_ {
		self.ranges.windows(2).map(|w| (w[0].1 + 1, w[1].0 - 1))
	}
}

#[cfg(test)]
mod tests {
	use crate::{interval_set::IntervalSet, state::DomainChange};

	#[test]
	fn test_construction() {
		let set = IntervalSet::new(5, 10);
		assert!(!set.is_empty());
		assert_eq!(set.card(), 6);
		assert_eq!(set.lower(), 5);
		assert_eq!(set.upper(), 10);
		assert!(!set.has_holes());
		for i in 0..=15 {
			assert_eq!(set.contains(i), (5..=10).contains(&i));
		}
	}

	#[test]
	fn test_insert_at_end_merges_adjacent() {
		let mut set = IntervalSet::default();
		set.insert_at_end(1);
		set.insert_at_end(2);
		set.insert_at_end(4);
		assert_eq!(set.intervals().collect::<Vec<_>>(), vec![(1, 2), (4, 4)]);
		assert!(set.has_holes());
		set.insert_at_end_range(5, 8);
		assert_eq!(set.intervals().collect::<Vec<_>>(), vec![(1, 2), (4, 8)]);
	}

	#[test]
	fn test_erase_bounds() {
		let mut set = IntervalSet::new(5, 10);
		assert_eq!(set.erase(5), DomainChange::Bounds);
		assert_eq!(set.lower(), 6);
		assert_eq!(set.erase(10), DomainChange::Bounds);
		assert_eq!(set.upper(), 9);
		assert_eq!(set.card(), 4);
		assert_eq!(set.erase(42), DomainChange::Unchanged);
	}

	#[test]
	fn test_erase_interior_creates_hole() {
		let mut set = IntervalSet::new(5, 10);
		assert_eq!(set.erase(7), DomainChange::Interior);
		assert!(set.has_holes());
		assert_eq!(set.intervals().collect::<Vec<_>>(), vec![(5, 6), (8, 10)]);
		assert_eq!(set.gaps().collect::<Vec<_>>(), vec![(7, 7)]);
	}

	#[test]
	fn test_erase_to_singleton_and_empty() {
		let mut set = IntervalSet::new(1, 2);
		assert_eq!(set.erase(1), DomainChange::Fixed);
		assert_eq!(set.erase(2), DomainChange::Bounds);
		assert!(set.is_empty());
	}

	#[test]
	fn test_erase_singleton_interval_at_boundary() {
		let mut set = IntervalSet::default();
		set.insert_at_end(1);
		set.insert_at_end_range(3, 5);
		assert_eq!(set.erase(1), DomainChange::Bounds);
		assert_eq!(set.lower(), 3);
		assert!(!set.has_holes());
	}

	#[test]
	fn test_erase_less_than() {
		let mut set = IntervalSet::new(5, 10);
		assert_eq!(set.erase_less_than(5), DomainChange::Unchanged);
		assert_eq!(set.erase_less_than(7), DomainChange::Bounds);
		assert_eq!(set.lower(), 7);
		assert_eq!(set.erase_less_than(10), DomainChange::Fixed);
		assert_eq!(set.card(), 1);
		assert_eq!(set.erase_less_than(11), DomainChange::Bounds);
		assert!(set.is_empty());
	}

	#[test]
	fn test_erase_less_than_drops_intervals() {
		let mut set = IntervalSet::default();
		set.insert_at_end_range(1, 2);
		set.insert_at_end_range(4, 6);
		set.insert_at_end_range(8, 9);
		assert_eq!(set.erase_less_than(5), DomainChange::Bounds);
		assert_eq!(set.intervals().collect::<Vec<_>>(), vec![(5, 6), (8, 9)]);
	}

	#[test]
	fn test_erase_greater_than() {
		let mut set = IntervalSet::new(5, 10);
		assert_eq!(set.erase_greater_than(10), DomainChange::Unchanged);
		assert_eq!(set.erase_greater_than(6), DomainChange::Bounds);
		assert_eq!(set.upper(), 6);
		assert_eq!(set.erase_greater_than(5), DomainChange::Fixed);
		assert_eq!(set.erase_greater_than(4), DomainChange::Bounds);
		assert!(set.is_empty());
	}

	#[test]
	fn test_erase_then_reinsert_round_trip() {
		let mut set = IntervalSet::new(1, 6);
		let before = set.clone();
		assert_eq!(set.erase(4), DomainChange::Interior);
		let mut rebuilt = IntervalSet::default();
		let mut values: Vec<_> = set.values().collect();
		values.push(4);
		values.sort_unstable();
		for v in values {
			rebuilt.insert_at_end(v);
		}
		assert_eq!(rebuilt, before);
	}

	#[test]
	fn test_value_iteration() {
		let mut set = IntervalSet::new(1, 9);
		let _ = set.erase(3);
		let _ = set.erase(7);
		assert_eq!(set.values().collect::<Vec<_>>(), vec![1, 2, 4, 5, 6, 8, 9]);
		assert_eq!(
			set.values_rev().collect::<Vec<_>>(),
			vec![9, 8, 6, 5, 4, 2, 1]
		);
		assert_eq!(set.gaps().collect::<Vec<_>>(), vec![(3, 3), (7, 7)]);
	}
}

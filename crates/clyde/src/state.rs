//! The trailed domain store and the search state built on top of it.
//!
//! [`DomainStore`] owns one [`IntervalSet`] per stored variable together with
//! the trail that makes every mutation reversible. [`State`] adds the guess
//! stack, the changed-variable set that drives the propagation scheduler, and
//! the queue of proof steps that are buffered when proofs are generated
//! lazily.

pub(crate) mod trail;

use delegate::delegate;
use index_vec::IndexVec;
use tracing::trace;

use crate::{
	inference::PendingStep,
	interval_set::IntervalSet,
	lit::{LitMeaning, SimpleLit},
	state::trail::Trail,
	IntVal, IntView, IntViewInner, Lit,
};

index_vec::define_index_type! {
	/// Identifies an integer variable with state in the [`DomainStore`].
	pub struct IntVarRef = u32;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// How an inference primitive changed a variable's domain.
///
/// The variants are ordered by how much they wake: merging two changes takes
/// the maximum, so a bounds change subsumes an interior change, and a fixing
/// subsumes everything.
pub enum DomainChange {
	/// The domain is exactly as it was.
	Unchanged,
	/// Values were removed strictly between the bounds.
	Interior,
	/// The lower or upper bound moved.
	Bounds,
	/// The domain was reduced to a single value.
	Fixed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Error signalling that an inference would wipe out a domain.
///
/// The domain itself is left untouched; the caller converts this into a
/// propagation conflict (and a proof step, when logging).
pub(crate) struct EmptyDomain;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// What the current domain says about the truth of a literal.
pub enum LitTruth {
	/// The literal holds in every remaining assignment.
	DefinitelyTrue,
	/// The literal fails in every remaining assignment.
	DefinitelyFalse,
	/// The domain supports both outcomes.
	Undecided,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// An opaque checkpoint of the search state.
///
/// Returned by [`State::new_epoch`] and consumed by [`State::backtrack`]. The
/// caller must pair every `new_epoch` with exactly one `backtrack` on every
/// control-flow exit, including conflicts.
pub struct Timestamp {
	/// The length of the trail when the checkpoint was taken.
	trail_len: usize,
	/// The number of guesses made when the checkpoint was taken.
	guess_len: usize,
	/// The number of buffered proof steps when the checkpoint was taken.
	pending_len: usize,
	/// The value of the epoch counter when the checkpoint was taken.
	epoch: u64,
}

#[derive(Clone, Debug, Default)]
/// Per-variable mutable domains plus the trail that can undo every change.
pub struct DomainStore {
	/// The current domain of each stored variable.
	vars: IndexVec<IntVarRef, IntervalSet>,
	/// The log of undone shapes.
	trail: Trail,
	/// Monotonically increasing count of epochs begun, used to stamp
	/// timestamps.
	epochs_begun: u64,
}

#[derive(Debug, Default)]
/// The full search state: the domain store plus guess stack, changed set and
/// pending proof steps.
pub struct State {
	/// The trailed domain storage.
	pub(crate) store: DomainStore,
	/// The literals the search has committed to, oldest first.
	guesses: Vec<Lit>,
	/// The merged change kind per variable since the last drain.
	changed_how: IndexVec<IntVarRef, DomainChange>,
	/// The variables with a recorded change, in first-change order.
	dirty: Vec<IntVarRef>,
	/// Proof steps buffered by the lazy proof-generation mode.
	pub(crate) pending: Vec<PendingStep>,
}

impl DomainChange {
	/// Merge two changes to the same variable into the strongest one.
	pub(crate) fn merge(self, other: DomainChange) -> DomainChange {
		self.max(other)
	}
}

impl DomainStore {
	/// Add a variable with the given initial domain.
	pub(crate) fn new_var(&mut self, set: IntervalSet) -> IntVarRef {
		self.vars.push(set)
	}

	/// The current domain of a stored variable.
	pub(crate) fn set(&self, var: IntVarRef) -> &IntervalSet {
		&self.vars[var]
	}

	/// The number of stored variables.
	pub(crate) fn var_count(&self) -> usize {
		self.vars.len()
	}

	/// The current length of the trail.
	pub(crate) fn trail_len(&self) -> usize {
		self.trail.len()
	}

	/// Apply a literal meaning to a stored variable's domain.
	pub(crate) fn infer_meaning(
		&mut self,
		var: IntVarRef,
		meaning: &LitMeaning,
	) -> Result<DomainChange, EmptyDomain> {
		match *meaning {
			LitMeaning::GreaterEq(v) => self.infer_greater_eq(var, v),
			LitMeaning::Less(v) => self.infer_less_than(var, v),
			LitMeaning::Eq(v) => self.infer_equal(var, v),
			LitMeaning::NotEq(v) => self.infer_not_equal(var, v),
		}
	}

	/// Raise the lower bound of `var` to `v`.
	pub(crate) fn infer_greater_eq(
		&mut self,
		var: IntVarRef,
		v: IntVal,
	) -> Result<DomainChange, EmptyDomain> {
		let set = &mut self.vars[var];
		if set.is_empty() || v <= set.lower() {
			return Ok(DomainChange::Unchanged);
		}
		let previous = set.clone();
		let change = set.erase_less_than(v);
		if set.is_empty() {
			*set = previous;
			return Err(EmptyDomain);
		}
		self.trail.record(var, previous);
		Ok(change)
	}

	/// Lower the upper bound of `var` to `v - 1`.
	pub(crate) fn infer_less_than(
		&mut self,
		var: IntVarRef,
		v: IntVal,
	) -> Result<DomainChange, EmptyDomain> {
		let set = &mut self.vars[var];
		if set.is_empty() || v > set.upper() {
			return Ok(DomainChange::Unchanged);
		}
		let previous = set.clone();
		let change = set.erase_greater_than(v - 1);
		if set.is_empty() {
			*set = previous;
			return Err(EmptyDomain);
		}
		self.trail.record(var, previous);
		Ok(change)
	}

	/// Reduce the domain of `var` to the single value `v`.
	///
	/// Asking for a value outside the current domain is a contradiction, not
	/// a programming error.
	pub(crate) fn infer_equal(
		&mut self,
		var: IntVarRef,
		v: IntVal,
	) -> Result<DomainChange, EmptyDomain> {
		let set = &mut self.vars[var];
		if !set.contains(v) {
			return Err(EmptyDomain);
		}
		if set.card() == 1 {
			return Ok(DomainChange::Unchanged);
		}
		let previous = std::mem::replace(set, IntervalSet::new(v, v));
		self.trail.record(var, previous);
		Ok(DomainChange::Fixed)
	}

	/// Remove the value `v` from the domain of `var`.
	pub(crate) fn infer_not_equal(
		&mut self,
		var: IntVarRef,
		v: IntVal,
	) -> Result<DomainChange, EmptyDomain> {
		let set = &mut self.vars[var];
		if !set.contains(v) {
			return Ok(DomainChange::Unchanged);
		}
		let previous = set.clone();
		let change = set.erase(v);
		if set.is_empty() {
			*set = previous;
			return Err(EmptyDomain);
		}
		self.trail.record(var, previous);
		Ok(change)
	}

	/// Pop trail entries until the trail shrinks back to `len`, restoring
	/// each variable to the exact shape it had.
	pub(crate) fn rewind_to(&mut self, len: usize) {
		debug_assert!(len <= self.trail.len());
		while self.trail.len() > len {
			let entry = self.trail.pop().expect("trail length checked above");
			self.vars[entry.var] = entry.previous;
		}
	}
}

impl State {
	delegate! {
		to self.store {
			/// The current length of the trail.
			pub(crate) fn trail_len(&self) -> usize;
			/// The number of stored variables.
			pub(crate) fn var_count(&self) -> usize;
		}
	}

	/// Add a variable with the given initial domain.
	pub(crate) fn new_var(&mut self, set: IntervalSet) -> IntVarRef {
		let var = self.store.new_var(set);
		let slot = self.changed_how.push(DomainChange::Unchanged);
		debug_assert_eq!(var, slot);
		var
	}

	/// Apply a literal to the store, recording the change for the scheduler.
	pub(crate) fn infer_lit(&mut self, lit: &Lit) -> Result<DomainChange, EmptyDomain> {
		match lit.simplify() {
			SimpleLit::True => Ok(DomainChange::Unchanged),
			SimpleLit::False => Err(EmptyDomain),
			SimpleLit::Cond(cond) => {
				let change = self.store.infer_meaning(cond.var, &cond.meaning)?;
				self.record_change(cond.var, change);
				Ok(change)
			}
		}
	}

	/// Commit to a guessed literal and apply it to the store.
	pub(crate) fn guess(&mut self, lit: Lit) -> Result<DomainChange, EmptyDomain> {
		trace!(lit = %lit, "guess");
		self.guesses.push(lit.clone());
		self.infer_lit(&lit)
	}

	/// The literals the search has committed to, oldest first.
	pub fn guesses(&self) -> &[Lit] {
		&self.guesses
	}

	/// Record a change for the scheduler, merging with any earlier change to
	/// the same variable.
	fn record_change(&mut self, var: IntVarRef, change: DomainChange) {
		if change == DomainChange::Unchanged {
			return;
		}
		if self.changed_how[var] == DomainChange::Unchanged {
			self.dirty.push(var);
		}
		self.changed_how[var] = self.changed_how[var].merge(change);
	}

	/// Take the set of changed variables, in first-change order, with the
	/// merged change kind for each.
	pub(crate) fn drain_changes(&mut self) -> Vec<(IntVarRef, DomainChange)> {
		let mut out = Vec::with_capacity(self.dirty.len());
		for var in std::mem::take(&mut self.dirty) {
			let how = std::mem::replace(&mut self.changed_how[var], DomainChange::Unchanged);
			debug_assert_ne!(how, DomainChange::Unchanged);
			out.push((var, how));
		}
		out
	}

	/// Discard any recorded changes without waking anybody.
	pub(crate) fn clear_changes(&mut self) {
		for var in std::mem::take(&mut self.dirty) {
			self.changed_how[var] = DomainChange::Unchanged;
		}
	}

	/// Begin a new epoch and return the checkpoint to restore it.
	pub fn new_epoch(&mut self) -> Timestamp {
		self.store.epochs_begun += 1;
		Timestamp {
			trail_len: self.store.trail_len(),
			guess_len: self.guesses.len(),
			pending_len: self.pending.len(),
			epoch: self.store.epochs_begun,
		}
	}

	/// Restore the state to the given checkpoint.
	///
	/// Every variable is returned to the exact shape it had when the matching
	/// [`State::new_epoch`] was called; guesses and buffered proof steps made
	/// since are discarded.
	pub fn backtrack(&mut self, timestamp: Timestamp) {
		debug_assert!(timestamp.epoch <= self.store.epochs_begun);
		debug_assert!(timestamp.trail_len <= self.store.trail_len());
		trace!(
			trail_len = timestamp.trail_len,
			guesses = timestamp.guess_len,
			"backtrack"
		);
		self.store.rewind_to(timestamp.trail_len);
		self.guesses.truncate(timestamp.guess_len);
		self.pending.truncate(timestamp.pending_len);
		self.clear_changes();
	}

	/// The smallest value the view can still take.
	pub fn lower_bound(&self, var: IntView) -> IntVal {
		match var.0 {
			IntViewInner::VarRef(v) => self.store.set(v).lower(),
			IntViewInner::Const(c) => c,
			IntViewInner::Offset { transform, var } => {
				let set = self.store.set(var);
				if transform.negate {
					transform.transform(set.upper())
				} else {
					transform.transform(set.lower())
				}
			}
		}
	}

	/// The largest value the view can still take.
	pub fn upper_bound(&self, var: IntView) -> IntVal {
		match var.0 {
			IntViewInner::VarRef(v) => self.store.set(v).upper(),
			IntViewInner::Const(c) => c,
			IntViewInner::Offset { transform, var } => {
				let set = self.store.set(var);
				if transform.negate {
					transform.transform(set.lower())
				} else {
					transform.transform(set.upper())
				}
			}
		}
	}

	/// Both bounds of the view.
	pub fn bounds(&self, var: IntView) -> (IntVal, IntVal) {
		(self.lower_bound(var), self.upper_bound(var))
	}

	/// Whether the view can still take the value `val`.
	pub fn in_domain(&self, var: IntView, val: IntVal) -> bool {
		match var.0 {
			IntViewInner::VarRef(v) => self.store.set(v).contains(val),
			IntViewInner::Const(c) => c == val,
			IntViewInner::Offset { transform, var } => {
				self.store.set(var).contains(transform.rev_transform(val))
			}
		}
	}

	/// The number of values the view can still take.
	pub fn domain_size(&self, var: IntView) -> IntVal {
		match var.0 {
			IntViewInner::VarRef(v) => self.store.set(v).card(),
			IntViewInner::Const(_) => 1,
			IntViewInner::Offset { var, .. } => self.store.set(var).card(),
		}
	}

	/// Whether the view's domain consists of more than one interval.
	pub fn domain_has_holes(&self, var: IntView) -> bool {
		match var.0 {
			IntViewInner::VarRef(v) => self.store.set(v).has_holes(),
			IntViewInner::Const(_) => false,
			IntViewInner::Offset { var, .. } => self.store.set(var).has_holes(),
		}
	}

	/// The unique remaining value of the view, if it has been fixed.
	pub fn optional_single_value(&self, var: IntView) -> Option<IntVal> {
		let (lb, ub) = self.bounds(var);
		if lb == ub {
			Some(lb)
		} else {
			None
		}
	}

	/// Whether the view has been fixed to a single value.
	pub fn has_single_value(&self, var: IntView) -> bool {
		self.optional_single_value(var).is_some()
	}

	/// Call `f` for every value the view can still take, in increasing order.
	///
	/// The domain must not be modified during the enumeration; use
	/// [`State::for_each_value_mutable`] for that.
	pub fn for_each_value(&self, var: IntView, mut f: impl FnMut(IntVal)) {
		let _ = self.for_each_value_while(var, |v| {
			f(v);
			true
		});
	}

	/// Call `f` for every value the view can still take, in increasing order,
	/// stopping early when `f` returns false. Returns whether the enumeration
	/// ran to completion.
	pub fn for_each_value_while(&self, var: IntView, mut f: impl FnMut(IntVal) -> bool) -> bool {
		match var.0 {
			IntViewInner::VarRef(v) => {
				for val in self.store.set(v).values() {
					if !f(val) {
						return false;
					}
				}
				true
			}
			IntViewInner::Const(c) => f(c),
			IntViewInner::Offset { transform, var } => {
				let set = self.store.set(var);
				if transform.negate {
					for val in set.values_rev() {
						if !f(transform.transform(val)) {
							return false;
						}
					}
				} else {
					for val in set.values() {
						if !f(transform.transform(val)) {
							return false;
						}
					}
				}
				true
			}
		}
	}

	/// Snapshot the view's values, then call `f` for each with mutable access
	/// to the state, so that `f` may modify domains.
	pub fn for_each_value_mutable(
		&mut self,
		var: IntView,
		mut f: impl FnMut(&mut State, IntVal),
	) {
		let mut values = Vec::new();
		self.for_each_value(var, |v| values.push(v));
		for v in values {
			f(self, v);
		}
	}

	/// What the current domain says about the truth of a literal.
	pub fn test_literal(&self, lit: &Lit) -> LitTruth {
		match lit.simplify() {
			SimpleLit::True => LitTruth::DefinitelyTrue,
			SimpleLit::False => LitTruth::DefinitelyFalse,
			SimpleLit::Cond(cond) => {
				let set = self.store.set(cond.var);
				match cond.meaning {
					LitMeaning::Eq(i) => {
						if !set.contains(i) {
							LitTruth::DefinitelyFalse
						} else if set.card() == 1 {
							LitTruth::DefinitelyTrue
						} else {
							LitTruth::Undecided
						}
					}
					LitMeaning::NotEq(i) => {
						if !set.contains(i) {
							LitTruth::DefinitelyTrue
						} else if set.card() == 1 {
							LitTruth::DefinitelyFalse
						} else {
							LitTruth::Undecided
						}
					}
					LitMeaning::GreaterEq(i) => {
						if set.lower() >= i {
							LitTruth::DefinitelyTrue
						} else if set.upper() < i {
							LitTruth::DefinitelyFalse
						} else {
							LitTruth::Undecided
						}
					}
					LitMeaning::Less(i) => {
						if set.upper() < i {
							LitTruth::DefinitelyTrue
						} else if set.lower() >= i {
							LitTruth::DefinitelyFalse
						} else {
							LitTruth::Undecided
						}
					}
				}
			}
		}
	}

	/// Whether the literal could still hold under the current domains.
	pub fn literal_is_nonfalsified(&self, lit: &Lit) -> bool {
		self.test_literal(lit) != LitTruth::DefinitelyFalse
	}
}

#[cfg(test)]
mod tests {
	use crate::{
		interval_set::IntervalSet,
		state::{DomainChange, LitTruth, State},
		IntView, Lit,
	};

	fn check_range(state: &State, var: IntView, lower: i64, upper: i64) {
		assert_eq!(state.bounds(var), (lower, upper));
		assert_eq!(state.lower_bound(var), lower);
		assert_eq!(state.upper_bound(var), upper);
		for i in -20..=20 {
			assert_eq!(state.in_domain(var, i), (lower..=upper).contains(&i));
		}
		let mut values = Vec::new();
		state.for_each_value(var, |v| values.push(v));
		assert_eq!(values.len() as i64, upper - lower + 1);
		assert!(values.windows(2).all(|w| w[0] < w[1]));
	}

	fn state_with_var(lower: i64, upper: i64) -> (State, IntView) {
		let mut state = State::default();
		let var = state.new_var(IntervalSet::new(lower, upper));
		(state, IntView::from_ref(var))
	}

	#[test]
	fn test_variable_values_through_views() {
		let (state, var) = state_with_var(1, 10);
		check_range(&state, var, 1, 10);
		check_range(&state, var + 1, 2, 11);
		check_range(&state, var - 1, 0, 9);
		check_range(&state, -var, -10, -1);
		check_range(&state, -var + 1, -9, 0);
	}

	#[test]
	fn test_infer_greater_eq() {
		let (mut state, var) = state_with_var(1, 10);
		assert_eq!(state.infer_lit(&var.geq(3)), Ok(DomainChange::Bounds));
		check_range(&state, var, 3, 10);

		assert_eq!(state.infer_lit(&(var + 1).geq(5)), Ok(DomainChange::Bounds));
		check_range(&state, var, 4, 10);

		assert_eq!(
			state.infer_lit(&(-var + 1).geq(-7)),
			Ok(DomainChange::Bounds)
		);
		check_range(&state, var, 4, 8);
	}

	#[test]
	fn test_infer_less_than() {
		let (mut state, var) = state_with_var(1, 10);
		assert_eq!(state.infer_lit(&var.lt(7)), Ok(DomainChange::Bounds));
		check_range(&state, var, 1, 6);

		assert_eq!(state.infer_lit(&(var + 1).lt(4)), Ok(DomainChange::Bounds));
		check_range(&state, var, 1, 2);
	}

	#[test]
	fn test_infer_not_equal() {
		let (mut state, var) = state_with_var(1, 10);
		assert_eq!(state.infer_lit(&var.ne(7)), Ok(DomainChange::Interior));
		assert_eq!(state.bounds(var), (1, 10));
		assert!(!state.in_domain(var, 7));
		assert!(state.domain_has_holes(var));

		// removing an absent value is a no-op
		assert_eq!(state.infer_lit(&var.ne(7)), Ok(DomainChange::Unchanged));
	}

	#[test]
	fn test_infer_equal() {
		let (mut state, var) = state_with_var(1, 10);
		assert_eq!(state.infer_lit(&var.eq(7)), Ok(DomainChange::Fixed));
		check_range(&state, var, 7, 7);
		assert_eq!(state.optional_single_value(var), Some(7));

		// out-of-domain instantiation is a contradiction, not a panic
		let (mut state, var) = state_with_var(1, 10);
		assert!(state.infer_lit(&var.eq(42)).is_err());
		check_range(&state, var, 1, 10);
	}

	#[test]
	fn test_backtrack_restores_exact_shape() {
		let (mut state, var) = state_with_var(1, 10);
		let _ = state.infer_lit(&var.ne(4)).unwrap();
		let holey = state.domain_has_holes(var);
		assert!(holey);

		let ts = state.new_epoch();
		let _ = state.guess(var.geq(6)).unwrap();
		let _ = state.infer_lit(&var.ne(8)).unwrap();
		assert_eq!(state.bounds(var), (6, 10));
		assert_eq!(state.guesses().len(), 1);

		state.backtrack(ts);
		assert_eq!(state.bounds(var), (1, 10));
		assert!(!state.in_domain(var, 4));
		assert!(state.in_domain(var, 8));
		assert!(state.guesses().is_empty());
	}

	#[test]
	fn test_repeated_epochs_restore_trail() {
		let (mut state, var) = state_with_var(1, 3);
		for val in 1..=3 {
			let ts = state.new_epoch();
			let _ = state.guess(var.eq(val)).unwrap();
			assert_eq!(state.optional_single_value(var), Some(val));
			state.backtrack(ts);
			assert_eq!(state.bounds(var), (1, 3));
		}
		assert_eq!(state.trail_len(), 0);
	}

	#[test]
	fn test_changed_set_merging() {
		let (mut state, var) = state_with_var(1, 10);
		let _ = state.drain_changes();
		let _ = state.infer_lit(&var.ne(5)).unwrap();
		let _ = state.infer_lit(&var.geq(3)).unwrap();
		let changes = state.drain_changes();
		assert_eq!(changes.len(), 1);
		assert_eq!(changes[0].1, DomainChange::Bounds);
		assert!(state.drain_changes().is_empty());
	}

	#[test]
	fn test_literal_testing() {
		let (mut state, var) = state_with_var(1, 10);
		assert_eq!(state.test_literal(&var.geq(1)), LitTruth::DefinitelyTrue);
		assert_eq!(state.test_literal(&var.geq(11)), LitTruth::DefinitelyFalse);
		assert_eq!(state.test_literal(&var.geq(5)), LitTruth::Undecided);
		assert_eq!(state.test_literal(&Lit::True), LitTruth::DefinitelyTrue);

		let _ = state.infer_lit(&var.eq(4)).unwrap();
		assert_eq!(state.test_literal(&var.eq(4)), LitTruth::DefinitelyTrue);
		assert_eq!(state.test_literal(&var.ne(4)), LitTruth::DefinitelyFalse);
		assert!(state.literal_is_nonfalsified(&var.eq(4)));
		assert!(!state.literal_is_nonfalsified(&var.lt(4)));
	}
}

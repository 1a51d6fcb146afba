//! The propagator registry and the fixed-point scheduler.
//!
//! Propagators are opaque callables with typed triggers. The scheduler keeps
//! a queue keyed by propagator index; within one fixed point the execution
//! order is fully determined by registration order, which is what makes the
//! emitted proof reproducible run to run.

pub(crate) mod activation;
pub(crate) mod queue;

use std::sync::atomic::{AtomicBool, Ordering};

use index_vec::IndexVec;
use tracing::{debug, trace};

use crate::{
	inference::{Failure, InferenceTracker, Justification, Reason},
	propagators::{
		activation::{ActivationList, Trigger},
		queue::ScheduleQueue,
	},
	proofs::{Proof, ProofError},
	state::{IntVarRef, State},
	IntView, IntViewInner,
};

index_vec::define_index_type! {
	/// Identifies a propagator in the registry.
	pub struct PropRef = u32;
}

/// The callable form of a propagator.
///
/// All heterogeneous propagators share this one contract; the scheduler
/// treats them as opaque.
pub type PropagationFunction =
	Box<dyn FnMut(&mut InferenceTracker<'_>) -> Result<PropagatorState, Failure>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// What should happen to a propagator after it has run.
pub enum PropagatorState {
	/// Keep rescheduling the propagator whenever its triggers fire.
	Enable,
	/// Skip the propagator until the search backtracks past the depth at
	/// which it asked to be disabled.
	DisableUntilBacktrack,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// The variables that wake a propagator, split by event kind.
pub struct Triggers {
	/// Wake on any interior or bound change.
	pub on_change: Vec<IntView>,
	/// Wake when a bound moves.
	pub on_bounds: Vec<IntView>,
	/// Wake only when the variable is fixed.
	pub on_instantiated: Vec<IntView>,
}

/// One installed propagator.
struct PropagatorRecord {
	/// The propagation function itself.
	func: PropagationFunction,
	/// The name used in trace output.
	name: String,
}

#[derive(Default)]
/// The registry of propagators together with the scheduling state.
pub struct Propagators {
	/// The installed propagators, in installation order.
	propagators: IndexVec<PropRef, PropagatorRecord>,
	/// Functions run exactly once when the proof starts.
	initialisers: Vec<PropagationFunction>,
	/// The inverted trigger index, per variable.
	activation: IndexVec<IntVarRef, ActivationList>,
	/// The scheduled propagators.
	queue: ScheduleQueue,
	/// For each propagator, the depth at which it was disabled, if any.
	disabled_at: IndexVec<PropRef, Option<usize>>,
	/// Number of propagator invocations so far.
	propagation_count: u64,
}

impl std::fmt::Debug for Propagators {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Propagators")
			.field("count", &self.propagators.len())
			.field(
				"names",
				&self
					.propagators
					.iter()
					.map(|p| p.name.as_str())
					.collect::<Vec<_>>(),
			)
			.finish_non_exhaustive()
	}
}

impl Triggers {
	/// Triggers that wake on any change of the given views.
	pub fn on_change<I: IntoIterator<Item = IntView>>(vars: I) -> Self {
		Triggers {
			on_change: vars.into_iter().collect(),
			..Triggers::default()
		}
	}

	/// Triggers that wake on bound changes of the given views.
	pub fn on_bounds<I: IntoIterator<Item = IntView>>(vars: I) -> Self {
		Triggers {
			on_bounds: vars.into_iter().collect(),
			..Triggers::default()
		}
	}

	/// Triggers that wake when one of the given views is fixed.
	pub fn on_instantiated<I: IntoIterator<Item = IntView>>(vars: I) -> Self {
		Triggers {
			on_instantiated: vars.into_iter().collect(),
			..Triggers::default()
		}
	}
}

/// The stored variable a view observes, if any.
fn underlying(view: IntView) -> Option<IntVarRef> {
	match view.0 {
		IntViewInner::VarRef(v) => Some(v),
		IntViewInner::Offset { var, .. } => Some(var),
		IntViewInner::Const(_) => None,
	}
}

impl Propagators {
	/// The number of installed propagators.
	pub fn count(&self) -> usize {
		self.propagators.len()
	}

	/// The number of propagator invocations so far.
	pub(crate) fn propagation_count(&self) -> u64 {
		self.propagation_count
	}

	/// Install a propagator with the given triggers, returning its index.
	///
	/// Triggers through a view observe the stored variable underneath it;
	/// constant views never fire. Installation is only allowed before the
	/// search starts, which keeps the inverted index stable.
	pub(crate) fn install(
		&mut self,
		func: PropagationFunction,
		triggers: Triggers,
		name: &str,
	) -> PropRef {
		let prop = self.propagators.push(PropagatorRecord {
			func,
			name: name.to_owned(),
		});
		let slot = self.disabled_at.push(None);
		debug_assert_eq!(prop, slot);
		debug!(prop = usize::from(prop), name, "install propagator");
		for (views, trigger) in [
			(&triggers.on_change, Trigger::Change),
			(&triggers.on_bounds, Trigger::Bounds),
			(&triggers.on_instantiated, Trigger::Instantiated),
		] {
			for &view in views {
				if let Some(var) = underlying(view) {
					self.activation_mut(var).subscribe(trigger, prop);
				}
			}
		}
		prop
	}

	/// Install a function that runs exactly once at proof start. It may
	/// create further proof lines, but must not be woken again afterwards.
	pub(crate) fn install_initialiser(&mut self, func: PropagationFunction) {
		self.initialisers.push(func);
	}

	/// The activation list for a variable, growing the index if the variable
	/// was created after earlier installations.
	fn activation_mut(&mut self, var: IntVarRef) -> &mut ActivationList {
		while self.activation.len() <= usize::from(var) {
			let _ = self.activation.push(ActivationList::default());
		}
		&mut self.activation[var]
	}

	/// Run the initialiser propagators, exactly once, at proof start.
	///
	/// Returns false if an initialiser derived a contradiction.
	pub(crate) fn run_initialisers(
		&mut self,
		state: &mut State,
		mut proof: Option<&mut Proof>,
	) -> Result<bool, ProofError> {
		for func in &mut self.initialisers {
			let mut tracker = InferenceTracker::new(state, proof.as_deref_mut());
			match func(&mut tracker) {
				Ok(_) => {}
				Err(Failure::Conflict) => return Ok(false),
				Err(Failure::Proof(e)) => return Err(e),
			}
		}
		self.initialisers.clear();
		Ok(true)
	}

	/// Run the propagation fixed point at the current node.
	///
	/// Returns `Ok(true)` when a fixed point was reached (or the abort flag
	/// was raised) and `Ok(false)` on contradiction. When an objective bound
	/// is given, the tightening `objective ≤ bound` is inferred before the
	/// queue is drained.
	pub(crate) fn propagate(
		&mut self,
		state: &mut State,
		mut proof: Option<&mut Proof>,
		objective: Option<(IntView, crate::IntVal)>,
		abort: Option<&AtomicBool>,
		depth: usize,
	) -> Result<bool, ProofError> {
		state.clear_changes();

		if let Some((obj, bound)) = objective {
			let mut tracker = InferenceTracker::new(state, proof.as_deref_mut());
			match tracker.infer_less_than(obj, bound + 1, Justification::Rup, Reason::empty()) {
				Ok(()) => {}
				Err(Failure::Conflict) => {
					state.clear_changes();
					return Ok(false);
				}
				Err(Failure::Proof(e)) => return Err(e),
			}
		}

		for prop in (0..self.propagators.len()).map(PropRef::from) {
			if self.disabled_at[prop].is_none() {
				self.queue.insert(prop);
			}
		}

		while let Some(prop) = self.queue.pop() {
			if abort.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
				self.queue.clear();
				state.clear_changes();
				return Ok(true);
			}

			trace!(
				prop = usize::from(prop),
				name = %self.propagators[prop].name,
				"run propagator"
			);
			self.propagation_count += 1;
			let record = &mut self.propagators[prop];
			let mut tracker = InferenceTracker::new(state, proof.as_deref_mut());
			match (record.func)(&mut tracker) {
				Ok(PropagatorState::Enable) => {}
				Ok(PropagatorState::DisableUntilBacktrack) => {
					trace!(prop = usize::from(prop), depth, "disable until backtrack");
					self.disabled_at[prop] = Some(depth);
				}
				Err(Failure::Conflict) => {
					debug!(
						prop = usize::from(prop),
						name = %self.propagators[prop].name,
						"propagation conflict"
					);
					self.queue.clear();
					state.clear_changes();
					return Ok(false);
				}
				Err(Failure::Proof(e)) => return Err(e),
			}

			for (var, how) in state.drain_changes() {
				if usize::from(var) >= self.activation.len() {
					continue;
				}
				for dep in self.activation[var].activated_by(how) {
					if self.disabled_at[dep].is_none() {
						self.queue.insert(dep);
					}
				}
			}
		}

		debug_assert!(self.queue.is_empty());
		Ok(true)
	}

	/// Re-enable every propagator that was disabled at `depth` or deeper.
	///
	/// Called by the search driver when it backtracks past that depth.
	pub(crate) fn reenable_from(&mut self, depth: usize) {
		for slot in self.disabled_at.iter_mut() {
			if slot.is_some_and(|d| d >= depth) {
				*slot = None;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::{cell::RefCell, rc::Rc};

	use crate::{
		propagators::{PropagatorState, Triggers},
		Justification, Problem, Reason,
	};

	#[test]
	fn test_index_order_and_event_waking() {
		let mut prb = Problem::new();
		let x = prb.new_int_var(1, 10);
		let y = prb.new_int_var(1, 10);

		let log = Rc::new(RefCell::new(Vec::new()));

		// a bounds-only observer of y: must not wake on interior changes
		let log_a = Rc::clone(&log);
		let _ = prb.propagators_mut().install(
			Box::new(move |_| {
				log_a.borrow_mut().push("bounds_watcher");
				Ok(PropagatorState::Enable)
			}),
			Triggers::on_bounds([y]),
			"bounds_watcher",
		);

		// fires once, pokes a hole in y, then goes idle
		let log_b = Rc::clone(&log);
		let mut fired = false;
		let _ = prb.propagators_mut().install(
			Box::new(move |t| {
				log_b.borrow_mut().push("hole_poker");
				if !fired {
					fired = true;
					t.infer_not_equal(y, 5, Justification::NoJustificationNeeded, Reason::empty())?;
				}
				Ok(PropagatorState::Enable)
			}),
			Triggers::on_change([x]),
			"hole_poker",
		);

		let (propagators, state) = prb.parts_for_test();
		assert!(propagators
			.propagate(state, None, None, None, 0)
			.unwrap());

		// both ran once in index order; the interior change to y did not
		// reschedule the bounds-only watcher
		assert_eq!(*log.borrow(), vec!["bounds_watcher", "hole_poker"]);
	}

	#[test]
	fn test_disable_until_backtrack() {
		let mut prb = Problem::new();
		let x = prb.new_int_var(1, 3);

		let runs = Rc::new(RefCell::new(0));
		let runs_inner = Rc::clone(&runs);
		let _ = prb.propagators_mut().install(
			Box::new(move |_| {
				*runs_inner.borrow_mut() += 1;
				Ok(PropagatorState::DisableUntilBacktrack)
			}),
			Triggers::on_change([x]),
			"one_shot",
		);

		let (propagators, state) = prb.parts_for_test();
		assert!(propagators.propagate(state, None, None, None, 1).unwrap());
		assert!(propagators.propagate(state, None, None, None, 1).unwrap());
		assert_eq!(*runs.borrow(), 1);

		propagators.reenable_from(1);
		assert!(propagators.propagate(state, None, None, None, 1).unwrap());
		assert_eq!(*runs.borrow(), 2);
	}

	#[test]
	fn test_conflict_stops_the_fixed_point() {
		let mut prb = Problem::new();
		let x = prb.new_int_var(1, 3);

		let _ = prb.propagators_mut().install(
			Box::new(move |t| {
				t.infer_greater_eq(x, 10, Justification::NoJustificationNeeded, Reason::empty())?;
				Ok(PropagatorState::Enable)
			}),
			Triggers::on_bounds([x]),
			"impossible",
		);

		let (propagators, state) = prb.parts_for_test();
		assert!(!propagators.propagate(state, None, None, None, 0).unwrap());
		// the failed inference left the domain in place
		assert_eq!(state.bounds(x), (1, 3));
	}
}

//! The depth-first search driver.
//!
//! Recursion, branching, guessing, and the optimisation loop live here, as
//! does the proof-level choreography: each node enters proof level
//! `depth + 1` on the way in, and on the way out logs that its guesses are
//! exhausted and deletes everything the abandoned level accumulated.
//! Deletion happens after the solution callback has returned.

use std::{
	fmt,
	sync::atomic::{AtomicBool, Ordering},
	time::{Duration, Instant},
};

use tracing::{debug, trace};

use crate::{
	propagators::Propagators,
	proofs::{Proof, ProofError},
	state::State,
	IntVal, IntView, Lit,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// Statistics of one solve.
pub struct Stats {
	/// Number of search nodes visited.
	pub recursions: u64,
	/// Number of subtrees that contained no solution.
	pub failures: u64,
	/// Number of solutions found.
	pub solutions: u64,
	/// Deepest search depth reached.
	pub max_depth: u64,
	/// Number of propagator invocations.
	pub propagations: u64,
	/// Number of installed propagators.
	pub propagators: usize,
	/// Wall-clock time spent solving.
	pub solve_time: Duration,
}

/// Selects the next variable to branch on, or `None` when all are fixed.
pub type BranchCallback = Box<dyn FnMut(&State) -> Option<IntView>>;
/// Produces the ordered guesses to try on the selected variable.
pub type GuessCallback = Box<dyn FnMut(&State, IntView) -> Vec<Lit>>;
/// Called on every solution; returning false stops the search.
pub type SolutionCallback = Box<dyn FnMut(&State) -> bool>;
/// Called at every node; returning false stops the search.
pub type TraceCallback = Box<dyn FnMut(&State) -> bool>;
/// Called once the proof has started, before any search.
pub type AfterProofStartedCallback = Box<dyn FnMut(&State)>;

#[derive(Default)]
/// The callbacks and limits steering a solve.
pub struct SolveCallbacks {
	/// Variable selection; defaults to smallest domain first.
	pub branch: Option<BranchCallback>,
	/// Value selection; defaults to trying each value in increasing order.
	pub guess: Option<GuessCallback>,
	/// Solution callback.
	pub solution: Option<SolutionCallback>,
	/// Per-node callback.
	pub trace: Option<TraceCallback>,
	/// Runs after the proof header is written.
	pub after_proof_started: Option<AfterProofStartedCallback>,
	/// Give up after this much time, as if cancelled.
	pub timeout: Option<Duration>,
}

impl fmt::Debug for SolveCallbacks {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SolveCallbacks")
			.field("branch", &self.branch.is_some())
			.field("guess", &self.guess.is_some())
			.field("solution", &self.solution.is_some())
			.field("trace", &self.trace.is_some())
			.field("timeout", &self.timeout)
			.finish()
	}
}

/// The default branching strategy: the unfixed variable with the smallest
/// domain, ties broken by variable index.
pub(crate) fn default_branch(state: &State) -> Option<IntView> {
	let mut best: Option<(IntVal, IntView)> = None;
	for v in (0..state.var_count()).map(crate::state::IntVarRef::from) {
		let var = IntView::from_ref(v);
		let size = state.domain_size(var);
		if size > 1 && best.is_none_or(|(s, _)| size < s) {
			best = Some((size, var));
		}
	}
	best.map(|(_, var)| var)
}

/// The default guessing strategy: try each remaining value in increasing
/// order.
pub(crate) fn default_guess(state: &State, var: IntView) -> Vec<Lit> {
	let mut out = Vec::new();
	state.for_each_value(var, |v| out.push(var.eq(v)));
	out
}

/// Everything the recursive search needs in one place.
pub(crate) struct SearchContext<'a> {
	/// The search state.
	pub(crate) state: &'a mut State,
	/// The propagator registry.
	pub(crate) propagators: &'a mut Propagators,
	/// The proof being written, if any.
	pub(crate) proof: Option<&'a mut Proof>,
	/// User callbacks and limits.
	pub(crate) callbacks: &'a mut SolveCallbacks,
	/// The view to minimise, if any.
	pub(crate) objective: Option<IntView>,
	/// The objective value of the best solution so far.
	pub(crate) best: Option<IntVal>,
	/// Statistics being accumulated.
	pub(crate) stats: Stats,
	/// External cancellation flag, polled between branches.
	pub(crate) abort: Option<&'a AtomicBool>,
	/// When to give up, per the timeout.
	pub(crate) deadline: Option<Instant>,
	/// Set when the search unwound because of cancellation or timeout.
	pub(crate) interrupted: bool,
}

/// What one node of the search reported back.
struct NodeOutcome {
	/// Whether the search should keep going.
	keep_going: bool,
	/// Whether this subtree contained a solution.
	contains_solution: bool,
}

impl SearchContext<'_> {
	/// Whether the solve should stop right now.
	fn cancelled(&mut self) -> bool {
		if self.abort.is_some_and(|flag| flag.load(Ordering::Relaxed))
			|| self.deadline.is_some_and(|d| Instant::now() >= d)
		{
			self.interrupted = true;
			true
		} else {
			false
		}
	}

	/// Solve the subtree rooted at the current state.
	pub(crate) fn recurse(&mut self, depth: usize) -> Result<bool, ProofError> {
		Ok(self.node(depth)?.keep_going)
	}

	/// One node of the depth-first search.
	fn node(&mut self, depth: usize) -> Result<NodeOutcome, ProofError> {
		self.stats.max_depth = self.stats.max_depth.max(depth as u64);
		self.stats.recursions += 1;
		trace!(depth, "enter search node");

		if let Some(proof) = self.proof.as_deref_mut() {
			proof.enter_level(depth + 1);
		}

		let mut keep_going = true;
		let mut contains_solution = false;

		let objective_bound = match (self.objective, self.best) {
			(Some(obj), Some(best)) => Some((obj, best - 1)),
			_ => None,
		};
		let consistent = self.propagators.propagate(
			self.state,
			self.proof.as_deref_mut(),
			objective_bound,
			self.abort,
			depth,
		)?;

		if consistent && self.cancelled() {
			keep_going = false;
		} else if consistent {
			let branch_var = match &mut self.callbacks.branch {
				Some(branch) => branch(self.state),
				None => default_branch(self.state),
			};

			match branch_var {
				None => {
					self.stats.solutions += 1;
					contains_solution = true;
					debug!(depth, solutions = self.stats.solutions, "solution found");
					if let Some(proof) = self.proof.as_deref_mut() {
						let _ = proof.log_solution(self.state, self.objective.is_some());
					}
					if let Some(callback) = &mut self.callbacks.solution {
						if !callback(self.state) {
							keep_going = false;
						}
					}
					if let Some(obj) = self.objective {
						self.best = Some(self.state.lower_bound(obj));
					}
				}
				Some(var) => {
					if let Some(trace_cb) = &mut self.callbacks.trace {
						if !trace_cb(self.state) {
							keep_going = false;
						}
					}

					let guesses = if keep_going && self.cancelled() {
						keep_going = false;
						Vec::new()
					} else if keep_going {
						match &mut self.callbacks.guess {
							Some(guess) => guess(self.state, var),
							None => default_guess(self.state, var),
						}
					} else {
						Vec::new()
					};

					for guess in guesses {
						if self.cancelled() {
							keep_going = false;
						}
						if !keep_going {
							break;
						}
						let timestamp = self.state.new_epoch();
						match self.state.guess(guess) {
							Ok(_) => {
								let child = self.node(depth + 1)?;
								if child.contains_solution {
									contains_solution = true;
								} else {
									self.stats.failures += 1;
								}
								if !child.keep_going {
									keep_going = false;
								}
							}
							Err(_) => {
								// a guess outside the domain is simply a
								// failed branch
								self.stats.failures += 1;
							}
						}
						self.state.backtrack(timestamp);
						self.propagators.reenable_from(depth + 1);
					}
				}
			}
		} else if !consistent {
			trace!(depth, "node failed");
		}

		if let Some(proof) = self.proof.as_deref_mut() {
			proof.enter_level(depth);
			// when stopping early there are unexplored branches, so the
			// negation of the guesses is not derivable and nothing is logged
			if keep_going {
				proof.log_backtrack(self.state);
			}
			proof.forget_level(depth + 1);
		}

		Ok(NodeOutcome {
			keep_going,
			contains_solution,
		})
	}
}

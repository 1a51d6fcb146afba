//! End-to-end tests: small problems solved to completion, with the generated
//! model and proof files checked alongside the search results.

use std::{
	cell::RefCell,
	path::PathBuf,
	rc::Rc,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
	time::Duration,
};

use expect_test::expect;
use tracing_test::traced_test;

use crate::{
	linear::{LinearEq, LinearLeq},
	propagators::PropagatorState,
	Constraint, InstallContext, IntView, Justification, ModelError, Problem, ProofOptions,
	SolveCallbacks, Triggers,
};

/// A unique output prefix for a test's proof files.
fn temp_prefix(test: &str) -> PathBuf {
	std::env::temp_dir().join(format!("clyde_{test}_{}", std::process::id()))
}

/// Read a generated proof file back.
fn read_output(prefix: &PathBuf, ext: &str) -> String {
	let mut path = prefix.clone().into_os_string();
	path.push(ext);
	std::fs::read_to_string(PathBuf::from(path)).expect("output file should exist")
}

/// A binary not-equals constraint, written the way an external constraint
/// library would provide one: a model contribution plus a propagator.
struct NotEquals {
	/// The left variable.
	x: IntView,
	/// The right variable.
	y: IntView,
}

impl Constraint for NotEquals {
	fn install(self: Box<Self>, ctx: &mut InstallContext<'_>) -> Result<(), ModelError> {
		let (xl, xu) = ctx.state().bounds(self.x);
		let (yl, yu) = ctx.state().bounds(self.y);
		for v in xl.max(yl)..=xu.min(yu) {
			let _ = ctx.define_cnf("not_equals", &[self.x.ne(v), self.y.ne(v)]);
		}

		let (x, y) = (self.x, self.y);
		let _ = ctx.install_propagator(
			Box::new(move |t| {
				if let Some(v) = t.optional_single_value(x) {
					t.infer_not_equal(y, v, Justification::Rup, x.eq(v))?;
				}
				if let Some(v) = t.optional_single_value(y) {
					t.infer_not_equal(x, v, Justification::Rup, y.eq(v))?;
				}
				Ok(PropagatorState::Enable)
			}),
			Triggers::on_instantiated([x, y]),
			"not_equals",
		);
		Ok(())
	}
}

/// A constraint whose definition needs the clause saying its variable takes
/// at least one of its values, the way counting-style constraints do.
struct CoversDomain {
	/// The variable whose values are covered.
	var: IntView,
}

impl Constraint for CoversDomain {
	fn install(self: Box<Self>, ctx: &mut InstallContext<'_>) -> Result<(), ModelError> {
		let first = ctx.need_at_least_one(self.var);
		// asking again must yield the same constraint, not a second copy
		assert_eq!(first, ctx.need_at_least_one(self.var));
		Ok(())
	}
}

#[test]
fn test_at_least_one_is_introduced_once() {
	let prefix = temp_prefix("at_least_one");
	let mut options = ProofOptions::new(&prefix);
	options.use_friendly_names = true;
	let mut prb = Problem::with_proof(options).unwrap();
	let v = prb.new_int_var_named(1, 3, "v");
	prb.post(CoversDomain { var: v }).unwrap();
	prb.start_proof_for_test().unwrap();

	// the covering clause spans the value literals of the whole domain,
	// using the order-literal shortcuts at the endpoints, and appears once
	let model = read_output(&prefix, ".opb");
	assert_eq!(
		model.matches("1 ~v_ge_2 1 v_eq_2 1 v_ge_3 >= 1 ;").count(),
		1
	);
}

#[test]
fn test_model_file_shape() {
	let prefix = temp_prefix("model_file_shape");
	let mut prb = Problem::with_proof(ProofOptions::new(&prefix)).unwrap();
	let a = prb.new_int_var(0, 2);
	prb.post(LinearLeq {
		terms: vec![(1, a)],
		rhs: 1,
	})
	.unwrap();
	prb.start_proof_for_test().unwrap();

	expect![[r#"
    * #variable= 2 #constraint= 3
    * variable i0 in [0, 2]
    1 x1 2 x2 >= 0 ;
    -1 x1 -2 x2 >= -2 ;
    * posting: linear_leq 1
    -1 x1 -2 x2 >= -1 ;
"#]]
	.assert_eq(&read_output(&prefix, ".opb"));
}

#[test]
#[traced_test]
fn test_trivial_not_equals_unsat() {
	let prefix = temp_prefix("trivial_unsat");
	let mut prb = Problem::with_proof(ProofOptions::new(&prefix)).unwrap();
	let x = prb.new_int_var(1, 1);
	let y = prb.new_int_var(1, 1);
	prb.post(NotEquals { x, y }).unwrap();

	let stats = prb.solve(|_| true).unwrap();
	assert_eq!(stats.solutions, 0);

	let proof = read_output(&prefix, ".pbp");
	assert!(proof.starts_with("pseudo-Boolean proof version 2.0\n"));
	// the propagation contradiction is one empty-clause step
	assert!(proof.lines().any(|l| l == "u >= 1 ;"));
	assert!(proof.contains("conclusion UNSAT"));
	assert!(proof.ends_with("end pseudo-Boolean proof\n"));
}

#[test]
fn test_chained_bounds_tightening() {
	let mut prb = Problem::new();
	let a = prb.new_int_var(0, 10);
	let b = prb.new_int_var(0, 10);
	let c = prb.new_int_var(0, 10);
	prb.post(LinearEq {
		terms: vec![(1, a), (1, b), (1, c)],
		rhs: 5,
	})
	.unwrap();

	let (propagators, state) = prb.parts_for_test();
	assert!(propagators.propagate(state, None, None, None, 0).unwrap());
	for var in [a, b, c] {
		assert_eq!(state.bounds(var), (0, 5));
	}
}

#[test]
#[traced_test]
fn test_chained_bounds_proof_steps() {
	let prefix = temp_prefix("chained_bounds");
	let mut prb = Problem::with_proof(ProofOptions::new(&prefix)).unwrap();
	let a = prb.new_int_var(0, 10);
	let b = prb.new_int_var(0, 10);
	let c = prb.new_int_var(0, 10);
	prb.post(LinearEq {
		terms: vec![(1, a), (1, b), (1, c)],
		rhs: 5,
	})
	.unwrap();
	prb.start_proof_for_test().unwrap();

	{
		let (propagators, state, proof) = prb.proof_parts_for_test();
		assert!(propagators.propagate(state, proof, None, None, 0).unwrap());
		for var in [a, b, c] {
			assert_eq!(state.bounds(var), (0, 5));
		}
	}

	let text = prb.proof_text_for_test().unwrap();
	// one upper-bound inference per variable
	assert_eq!(text.lines().filter(|l| l.starts_with("u ")).count(), 3);
	// each introduces one order literal, defined by a pair of redundance steps
	assert_eq!(text.lines().filter(|l| l.starts_with("red ")).count(), 6);
}

#[test]
fn test_solution_enumeration() {
	let mut prb = Problem::new();
	let x = prb.new_int_var(1, 2);
	let y = prb.new_int_var(1, 2);

	let found = Rc::new(RefCell::new(Vec::new()));
	let log = Rc::clone(&found);
	let stats = prb
		.solve(move |state| {
			log.borrow_mut().push((
				state.optional_single_value(x).unwrap(),
				state.optional_single_value(y).unwrap(),
			));
			true
		})
		.unwrap();

	assert_eq!(stats.solutions, 4);
	assert_eq!(*found.borrow(), vec![(1, 1), (1, 2), (2, 1), (2, 2)]);
}

#[test]
#[traced_test]
fn test_optimisation_tightening() {
	let prefix = temp_prefix("optimisation");
	let mut prb = Problem::with_proof(ProofOptions::new(&prefix)).unwrap();
	let x = prb.new_int_var(0, 9);
	prb.minimise(x);

	let values = Rc::new(RefCell::new(Vec::new()));
	let log = Rc::clone(&values);
	let stats = prb
		.solve_with(
			SolveCallbacks {
				// guess the largest value first, so every solution improves
				guess: Some(Box::new(|state, var| {
					let mut out = Vec::new();
					state.for_each_value(var, |v| out.push(var.eq(v)));
					out.reverse();
					out
				})),
				solution: Some(Box::new(move |state| {
					log.borrow_mut().push(state.optional_single_value(x).unwrap());
					true
				})),
				..SolveCallbacks::default()
			},
			None,
		)
		.unwrap();

	assert_eq!(stats.solutions, 10);
	assert_eq!(*values.borrow(), (0..=9).rev().collect::<Vec<_>>());

	let proof = read_output(&prefix, ".pbp");
	assert_eq!(proof.lines().filter(|l| l.starts_with("soli")).count(), 10);
	assert!(proof.contains("conclusion BOUNDS 0 0"));
}

#[test]
fn test_proof_level_cleanup() {
	let prefix = temp_prefix("level_cleanup");
	let mut prb = Problem::with_proof(ProofOptions::new(&prefix)).unwrap();
	let _ = prb.new_int_var(1, 2);
	let _ = prb.new_int_var(1, 2);
	let _ = prb.new_int_var(1, 2);

	let stats = prb.solve(|_| true).unwrap();
	assert_eq!(stats.solutions, 8);
	assert!(prb.proof_levels_clean_for_test());

	let proof = read_output(&prefix, ".pbp");
	assert!(proof.contains("del id "));
	assert!(proof.contains("conclusion SAT"));
}

#[test]
fn test_cancellation_mid_search() {
	let prefix = temp_prefix("cancellation");
	let mut prb = Problem::with_proof(ProofOptions::new(&prefix)).unwrap();
	let _ = prb.new_int_var(1, 3);

	let flag = Arc::new(AtomicBool::new(false));
	let raise = Arc::clone(&flag);
	let stats = prb
		.solve_with(
			SolveCallbacks {
				solution: Some(Box::new(move |_| {
					raise.store(true, Ordering::Relaxed);
					true
				})),
				..SolveCallbacks::default()
			},
			Some(&flag),
		)
		.unwrap();

	assert_eq!(stats.solutions, 1);
	let proof = read_output(&prefix, ".pbp");
	// no contradiction is asserted; the log ends with an incomplete mark
	assert!(!proof.lines().any(|l| l == "u >= 1 ;"));
	assert!(proof.contains("conclusion NONE"));
}

#[test]
fn test_timeout_behaves_like_cancellation() {
	let prefix = temp_prefix("timeout");
	let mut prb = Problem::with_proof(ProofOptions::new(&prefix)).unwrap();
	let _ = prb.new_int_var(1, 3);

	let stats = prb
		.solve_with(
			SolveCallbacks {
				timeout: Some(Duration::ZERO),
				..SolveCallbacks::default()
			},
			None,
		)
		.unwrap();

	assert_eq!(stats.solutions, 0);
	assert!(read_output(&prefix, ".pbp").contains("conclusion NONE"));
}

#[test]
fn test_singleton_domains_give_one_solution() {
	let mut prb = Problem::new();
	let x = prb.new_int_var(4, 4);
	let seen = Rc::new(RefCell::new(None));
	let log = Rc::clone(&seen);
	let stats = prb
		.solve(move |state| {
			*log.borrow_mut() = state.optional_single_value(x);
			true
		})
		.unwrap();
	assert_eq!(stats.solutions, 1);
	assert_eq!(*seen.borrow(), Some(4));
}

#[test]
fn test_empty_domain_is_model_contradiction() {
	let prefix = temp_prefix("empty_domain");
	let mut prb = Problem::with_proof(ProofOptions::new(&prefix)).unwrap();
	let _ = prb.new_int_var(3, 1);
	let stats = prb.solve(|_| true).unwrap();
	assert_eq!(stats.solutions, 0);
	assert!(read_output(&prefix, ".pbp").contains("conclusion UNSAT"));
}

#[test]
#[traced_test]
fn test_not_equals_enumeration() {
	let mut prb = Problem::new();
	let x = prb.new_int_var(1, 3);
	let y = prb.new_int_var(1, 3);
	prb.post(NotEquals { x, y }).unwrap();

	let stats = prb.solve(|_| true).unwrap();
	assert_eq!(stats.solutions, 6);
	// propagation removes the conflicting value before it can be guessed
	assert_eq!(stats.failures, 0);
}

#[test]
fn test_friendly_names_in_model() {
	let prefix = temp_prefix("friendly_names");
	let mut options = ProofOptions::new(&prefix);
	options.use_friendly_names = true;
	let mut prb = Problem::with_proof(options).unwrap();
	let pos = prb.new_int_var_named(0, 3, "pos");
	prb.post(LinearLeq {
		terms: vec![(1, pos)],
		rhs: 2,
	})
	.unwrap();
	prb.start_proof_for_test().unwrap();

	let model = read_output(&prefix, ".opb");
	assert!(model.contains("pos_b0"));
	assert!(model.contains("pos_b1"));
}

#[test]
fn test_holey_domain_exclusions_in_model() {
	let prefix = temp_prefix("holey_domain");
	let mut prb = Problem::with_proof(ProofOptions::new(&prefix)).unwrap();
	let domain = crate::IntSetVal::from_iter([1..=2, 5..=6]);
	let x = prb.new_int_var_with_domain(&domain);
	prb.start_proof_for_test().unwrap();

	assert!(prb.state().domain_has_holes(x));
	let model = read_output(&prefix, ".opb");
	// the gap [3, 4] is excluded by a clause over two order literals
	assert!(model.lines().any(|l| l.ends_with(">= 1 ;") && l.starts_with("1 ~")));
}

#[test]
fn test_deterministic_proof_output() {
	let run = |prefix: &PathBuf| {
		let mut prb = Problem::with_proof(ProofOptions::new(prefix)).unwrap();
		let a = prb.new_int_var(1, 3);
		let b = prb.new_int_var(1, 3);
		prb.post(NotEquals { x: a, y: b }).unwrap();
		prb.post(LinearLeq {
			terms: vec![(1, a), (1, b)],
			rhs: 4,
		})
		.unwrap();
		let _ = prb.solve(|_| true).unwrap();
		read_output(prefix, ".pbp")
	};

	let first = temp_prefix("determinism_a");
	let second = temp_prefix("determinism_b");
	assert_eq!(run(&first), run(&second));
}

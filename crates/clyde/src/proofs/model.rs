//! The pseudo-Boolean model file: everything that is written before the
//! search starts.
//!
//! Constraint lines are buffered in memory because the OPB header has to
//! state the final variable and constraint counts, which are only known once
//! the model is finalised.

use std::{fmt::Write as _, fs, io::Write as _, path::Path};

use crate::proofs::{ProofError, ProofLine};

#[derive(Clone, Debug)]
/// One buffered entry of the model file.
enum ModelEntry {
	/// A constraint line, carrying an implicit identifier.
	Constraint(String),
	/// A comment line (without the leading `*`).
	Comment(String),
}

#[derive(Clone, Debug, Default)]
/// The buffered model, finalised and written out once the search starts.
pub struct ProofModel {
	/// The buffered lines, in emission order.
	entries: Vec<ModelEntry>,
	/// The objective line, for optimisation problems.
	objective: Option<String>,
	/// The number of constraint lines buffered so far.
	constraints: ProofLine,
	/// Whether the model has been finalised.
	finalised: bool,
}

impl ProofModel {
	/// Emit a comment saying a constraint is about to be defined.
	pub(crate) fn posting(&mut self, text: &str) {
		self.emit_comment(&format!("posting: {text}"));
	}

	/// Emit a comment line.
	pub(crate) fn emit_comment(&mut self, text: &str) {
		self.entries.push(ModelEntry::Comment(text.to_owned()));
	}

	/// Add a constraint line (already in `>= k ;` form) and return its
	/// implicit identifier.
	pub(crate) fn add_line(&mut self, body: String) -> ProofLine {
		debug_assert!(!self.finalised, "constraint added after finalisation");
		self.entries.push(ModelEntry::Constraint(body));
		self.constraints += 1;
		self.constraints
	}

	/// Record the minimisation objective.
	pub(crate) fn set_objective(&mut self, terms: String) {
		self.objective = Some(terms);
	}

	/// The number of constraints in the model; proof line identifiers start
	/// just above this.
	pub(crate) fn number_of_constraints(&self) -> ProofLine {
		self.constraints
	}

	/// Finish the model. No constraint may be added afterwards.
	pub(crate) fn finalise(&mut self) {
		debug_assert!(!self.finalised);
		self.finalised = true;
	}

	/// Write the model to the given path, with the standard OPB header.
	pub(crate) fn write(&self, path: &Path, variable_count: u64) -> Result<(), ProofError> {
		debug_assert!(self.finalised);
		let mut text = String::new();
		writeln!(
			text,
			"* #variable= {variable_count} #constraint= {}",
			self.constraints
		)
		.unwrap();
		if let Some(objective) = &self.objective {
			writeln!(text, "min: {objective} ;").unwrap();
		}
		for entry in &self.entries {
			match entry {
				ModelEntry::Constraint(body) => writeln!(text, "{body}").unwrap(),
				ModelEntry::Comment(comment) => writeln!(text, "* {comment}").unwrap(),
			}
		}
		let mut file = fs::File::create(path)?;
		file.write_all(text.as_bytes())?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use crate::proofs::model::ProofModel;

	#[test]
	fn test_line_numbering() {
		let mut model = ProofModel::default();
		model.posting("example");
		assert_eq!(model.add_line("1 x1 >= 1 ;".to_owned()), 1);
		model.emit_comment("halfway");
		assert_eq!(model.add_line("1 x2 >= 1 ;".to_owned()), 2);
		assert_eq!(model.number_of_constraints(), 2);
	}
}

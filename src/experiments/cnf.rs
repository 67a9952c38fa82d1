//! CNF formulas and random 3-SAT generation.
//!
//! Literals use DIMACS conventions: variable `v` is `v`, its negation `-v`,
//! variables are numbered from 1.

use crate::models::{CodegenieError, Result};
use rand::Rng;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// A formula in conjunctive normal form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cnf {
    pub n_vars: usize,
    pub clauses: Vec<Vec<i32>>,
}

impl Cnf {
    /// Build a formula, checking every literal names a known variable.
    pub fn new(n_vars: usize, clauses: Vec<Vec<i32>>) -> Result<Self> {
        for clause in &clauses {
            if clause.is_empty() {
                return Err(CodegenieError::InvalidInput("empty clause".to_string()));
            }
            if let Some(lit) = clause
                .iter()
                .find(|l| **l == 0 || l.unsigned_abs() as usize > n_vars)
            {
                return Err(CodegenieError::InvalidInput(format!(
                    "literal {lit} out of range for {n_vars} variables"
                )));
            }
        }
        Ok(Self { n_vars, clauses })
    }

    /// True when `assignment[v - 1]` satisfies every clause.
    pub fn is_satisfied_by(&self, assignment: &[bool]) -> bool {
        self.clauses.iter().all(|clause| {
            clause.iter().any(|&lit| {
                let value = assignment
                    .get(lit.unsigned_abs() as usize - 1)
                    .copied()
                    .unwrap_or(false);
                value == (lit > 0)
            })
        })
    }

    /// Clause-to-variable ratio.
    pub fn ratio(&self) -> f64 {
        self.clauses.len() as f64 / self.n_vars as f64
    }

    /// DIMACS text form.
    pub fn to_dimacs(&self) -> String {
        let mut out = format!("p cnf {} {}\n", self.n_vars, self.clauses.len());
        for clause in &self.clauses {
            for lit in clause {
                let _ = write!(out, "{lit} ");
            }
            out.push_str("0\n");
        }
        out
    }
}

/// Random 3-SAT: each clause has three distinct variables with random signs.
pub fn random_3sat<R: Rng>(n_vars: usize, clause_count: usize, rng: &mut R) -> Result<Cnf> {
    if n_vars < 3 {
        return Err(CodegenieError::InvalidInput(
            "random 3-SAT needs at least 3 variables".to_string(),
        ));
    }
    if clause_count == 0 {
        return Err(CodegenieError::InvalidInput(
            "random 3-SAT needs at least 1 clause".to_string(),
        ));
    }
    if n_vars > i32::MAX as usize {
        return Err(CodegenieError::InvalidInput(format!("{n_vars} variables is too many")));
    }

    let clauses = (0..clause_count)
        .map(|_| {
            index::sample(&mut *rng, n_vars, 3)
                .into_iter()
                .map(|v| {
                    let var = v as i32 + 1;
                    if rng.gen_bool(0.5) { var } else { -var }
                })
                .collect()
        })
        .collect();

    Ok(Cnf { n_vars, clauses })
}

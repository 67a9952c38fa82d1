//! DPLL SAT solver.
//!
//! Epistemic foundation:
//! - K_i: Unit propagation runs to fixpoint before every branch
//! - K_i: Branching picks the first unassigned variable of the shortest open clause
//! - K_i: A returned assignment satisfies every clause
//! - I^B: Hard instances may take exponential time → optional decision budget

use super::Cnf;

/// Result of a solve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Solution {
    /// `assignment[v - 1]` is the value of variable `v`
    Satisfiable(Vec<bool>),
    Unsatisfiable,
    /// Decision budget exhausted before an answer
    Aborted,
}

/// Outcome of evaluating a clause under a partial assignment.
enum ClauseState {
    Satisfied,
    Conflict,
    Unit(i32),
    Open(usize),
}

/// Recursive DPLL with an undo trail.
#[derive(Debug, Default)]
pub struct DpllSolver {
    max_decisions: Option<u64>,
    decisions: u64,
    propagations: u64,
}

impl DpllSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decision_limit(max_decisions: u64) -> Self {
        Self {
            max_decisions: Some(max_decisions),
            ..Self::default()
        }
    }

    /// Branching decisions made by the last solve.
    pub fn decisions(&self) -> u64 {
        self.decisions
    }

    /// Literals forced by unit propagation in the last solve.
    pub fn propagations(&self) -> u64 {
        self.propagations
    }

    pub fn solve(&mut self, cnf: &Cnf) -> Solution {
        self.decisions = 0;
        self.propagations = 0;

        // index 0 unused so variables index directly
        let mut assignment: Vec<Option<bool>> = vec![None; cnf.n_vars + 1];
        let mut trail: Vec<usize> = Vec::new();

        match self.search(cnf, &mut assignment, &mut trail) {
            Some(true) => Solution::Satisfiable(
                assignment[1..].iter().map(|v| v.unwrap_or(false)).collect(),
            ),
            Some(false) => Solution::Unsatisfiable,
            None => Solution::Aborted,
        }
    }

    fn value(assignment: &[Option<bool>], lit: i32) -> Option<bool> {
        assignment[lit.unsigned_abs() as usize].map(|v| v == (lit > 0))
    }

    fn assign(assignment: &mut [Option<bool>], trail: &mut Vec<usize>, lit: i32) {
        let var = lit.unsigned_abs() as usize;
        assignment[var] = Some(lit > 0);
        trail.push(var);
    }

    fn undo(assignment: &mut [Option<bool>], trail: &mut Vec<usize>, mark: usize) {
        for var in trail.drain(mark..) {
            assignment[var] = None;
        }
    }

    fn clause_state(assignment: &[Option<bool>], clause: &[i32]) -> ClauseState {
        let mut unassigned = 0;
        let mut last = 0;
        for &lit in clause {
            match Self::value(assignment, lit) {
                Some(true) => return ClauseState::Satisfied,
                Some(false) => {}
                None => {
                    unassigned += 1;
                    last = lit;
                }
            }
        }
        match unassigned {
            0 => ClauseState::Conflict,
            1 => ClauseState::Unit(last),
            n => ClauseState::Open(n),
        }
    }

    /// Propagate units to fixpoint. Returns false on conflict.
    fn propagate(
        &mut self,
        cnf: &Cnf,
        assignment: &mut [Option<bool>],
        trail: &mut Vec<usize>,
    ) -> bool {
        loop {
            let mut changed = false;
            for clause in &cnf.clauses {
                match Self::clause_state(assignment, clause) {
                    ClauseState::Conflict => return false,
                    ClauseState::Unit(lit) => {
                        Self::assign(assignment, trail, lit);
                        self.propagations += 1;
                        changed = true;
                    }
                    ClauseState::Satisfied | ClauseState::Open(_) => {}
                }
            }
            if !changed {
                return true;
            }
        }
    }

    /// Literal to branch on, or None when every clause is satisfied.
    fn pick_branch(cnf: &Cnf, assignment: &[Option<bool>]) -> Option<i32> {
        let mut best: Option<(usize, &[i32])> = None;
        for clause in &cnf.clauses {
            if let ClauseState::Open(n) = Self::clause_state(assignment, clause) {
                if best.map_or(true, |(m, _)| n < m) {
                    best = Some((n, clause.as_slice()));
                }
            }
        }
        best.and_then(|(_, clause)| {
            clause
                .iter()
                .copied()
                .find(|&lit| Self::value(assignment, lit).is_none())
        })
    }

    /// Some(true) = satisfiable, Some(false) = unsatisfiable, None = aborted.
    fn search(
        &mut self,
        cnf: &Cnf,
        assignment: &mut Vec<Option<bool>>,
        trail: &mut Vec<usize>,
    ) -> Option<bool> {
        if !self.propagate(cnf, assignment, trail) {
            return Some(false);
        }

        let Some(lit) = Self::pick_branch(cnf, assignment) else {
            return Some(true);
        };

        for choice in [lit, -lit] {
            if self.max_decisions.is_some_and(|max| self.decisions >= max) {
                return None;
            }
            self.decisions += 1;

            let mark = trail.len();
            Self::assign(assignment, trail, choice);
            match self.search(cnf, assignment, trail) {
                Some(true) => return Some(true),
                Some(false) => Self::undo(assignment, trail, mark),
                None => return None,
            }
        }

        Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiments::random_3sat;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_trivially_satisfiable() {
        let cnf = Cnf::new(3, vec![vec![1, 2, 3]]).unwrap();
        let mut solver = DpllSolver::new();
        match solver.solve(&cnf) {
            Solution::Satisfiable(a) => assert!(cnf.is_satisfied_by(&a)),
            other => panic!("expected SAT, got {other:?}"),
        }
    }

    #[test]
    fn test_unit_propagation_only() {
        let cnf = Cnf::new(3, vec![vec![1], vec![-1, 2], vec![-2, 3]]).unwrap();
        let mut solver = DpllSolver::new();
        assert_eq!(
            solver.solve(&cnf),
            Solution::Satisfiable(vec![true, true, true])
        );
        assert_eq!(solver.decisions(), 0);
        assert_eq!(solver.propagations(), 3);
    }

    #[test]
    fn test_small_unsat() {
        // all eight sign combinations over three variables
        let mut clauses = Vec::new();
        for mask in 0..8 {
            clauses.push(
                (0..3)
                    .map(|bit| {
                        let var = bit + 1;
                        if mask & (1 << bit) == 0 { var } else { -var }
                    })
                    .collect(),
            );
        }
        let cnf = Cnf::new(3, clauses).unwrap();
        let mut solver = DpllSolver::new();
        assert_eq!(solver.solve(&cnf), Solution::Unsatisfiable);
        assert!(solver.decisions() > 0);
    }

    #[test]
    fn test_random_instances_answers_are_sound() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            let cnf = random_3sat(20, 60, &mut rng).unwrap();
            let mut solver = DpllSolver::new();
            match solver.solve(&cnf) {
                Solution::Satisfiable(a) => {
                    assert_eq!(a.len(), 20);
                    assert!(cnf.is_satisfied_by(&a));
                }
                Solution::Unsatisfiable => {}
                Solution::Aborted => panic!("no limit was set"),
            }
        }
    }

    #[test]
    fn test_decision_limit_aborts() {
        let mut clauses = Vec::new();
        for mask in 0..8 {
            clauses.push(
                (0..3)
                    .map(|bit| if mask & (1 << bit) == 0 { bit + 1 } else { -(bit + 1) })
                    .collect(),
            );
        }
        let cnf = Cnf::new(3, clauses).unwrap();
        let mut solver = DpllSolver::with_decision_limit(1);
        assert_eq!(solver.solve(&cnf), Solution::Aborted);
    }
}

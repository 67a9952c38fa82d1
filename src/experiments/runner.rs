//! Experiment runner with ethics approval and a JSONL log.
//!
//! Epistemic foundation:
//! - K_i: Every run gets an approval stamp before anything is generated
//! - K_i: Every run, including solver_failed, is appended to the log
//! - B_i: The log may not exist yet → empty history
//! - I^R: Size limits and decision budget come from config

use super::{DpllSolver, Solution, random_3sat};
use crate::models::{CodegenieError, ExperimentConfig, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Supported solver back ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverKind {
    Dpll,
}

impl FromStr for SolverKind {
    type Err = CodegenieError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dpll" | "python-sat" => Ok(Self::Dpll),
            other => Err(CodegenieError::InvalidInput(format!(
                "unsupported solver: {other}"
            ))),
        }
    }
}

/// How an experiment ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentOutcome {
    Satisfiable,
    Unsatisfiable,
    SolverFailed,
}

impl ExperimentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Satisfiable => "satisfiable",
            Self::Unsatisfiable => "unsatisfiable",
            Self::SolverFailed => "solver_failed",
        }
    }
}

/// Record of who approved a run and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalStamp {
    pub time: DateTime<Utc>,
    pub actor: String,
    pub reason: String,
}

/// Issues and remembers approval stamps.
#[derive(Debug)]
pub struct EthicsGuard {
    actor: String,
    approvals: Mutex<Vec<ApprovalStamp>>,
}

impl EthicsGuard {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            approvals: Mutex::new(Vec::new()),
        }
    }

    pub fn approve(&self, reason: impl Into<String>) -> ApprovalStamp {
        let stamp = ApprovalStamp {
            time: Utc::now(),
            actor: self.actor.clone(),
            reason: reason.into(),
        };
        match self.approvals.lock() {
            Ok(mut approvals) => approvals.push(stamp.clone()),
            Err(poisoned) => poisoned.into_inner().push(stamp.clone()),
        }
        stamp
    }

    /// Stamps issued so far, oldest first.
    pub fn approvals(&self) -> Vec<ApprovalStamp> {
        match self.approvals.lock() {
            Ok(approvals) => approvals.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// One logged experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub task_id: String,
    pub n_vars: usize,
    pub clause_count: usize,
    pub solver: String,
    pub outcome: ExperimentOutcome,
    pub decisions: u64,
    pub elapsed_ms: u64,
    pub approval: ApprovalStamp,
    pub recorded_at: DateTime<Utc>,
}

/// Generates, solves and logs SAT experiments.
pub struct ExperimentRunner {
    config: ExperimentConfig,
    ethics: EthicsGuard,
    log_lock: Mutex<()>,
}

impl ExperimentRunner {
    pub fn new(config: ExperimentConfig) -> Self {
        let ethics = EthicsGuard::new(config.actor.clone());
        Self {
            config,
            ethics,
            log_lock: Mutex::new(()),
        }
    }

    pub fn ethics(&self) -> &EthicsGuard {
        &self.ethics
    }

    fn validate(&self, n_vars: usize, clause_count: usize) -> Result<()> {
        if !(3..=self.config.max_vars).contains(&n_vars) {
            return Err(CodegenieError::InvalidInput(format!(
                "n_vars must be between 3 and {}",
                self.config.max_vars
            )));
        }
        if !(1..=self.config.max_clauses).contains(&clause_count) {
            return Err(CodegenieError::InvalidInput(format!(
                "clause_count must be between 1 and {}",
                self.config.max_clauses
            )));
        }
        Ok(())
    }

    /// Run one random 3-SAT benchmark and append it to the log.
    ///
    /// CPU bound; async callers should use `spawn_blocking`.
    pub fn run_random_3sat(
        &self,
        n_vars: usize,
        clause_count: usize,
        solver: &str,
    ) -> Result<ExperimentRecord> {
        self.validate(n_vars, clause_count)?;

        let approval = self.ethics.approve(format!(
            "random 3-SAT benchmark: {n_vars} vars, {clause_count} clauses, solver {solver}"
        ));
        let task_id = Uuid::new_v4().to_string();
        let cnf = random_3sat(n_vars, clause_count, &mut rand::thread_rng())?;

        let start = Instant::now();
        let (outcome, decisions) = match solver.parse::<SolverKind>() {
            Ok(SolverKind::Dpll) => {
                let mut dpll = DpllSolver::with_decision_limit(self.config.max_decisions);
                let outcome = match dpll.solve(&cnf) {
                    Solution::Satisfiable(_) => ExperimentOutcome::Satisfiable,
                    Solution::Unsatisfiable => ExperimentOutcome::Unsatisfiable,
                    Solution::Aborted => {
                        warn!(task_id = %task_id, "Decision budget exhausted");
                        ExperimentOutcome::SolverFailed
                    }
                };
                (outcome, dpll.decisions())
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "No solver run");
                (ExperimentOutcome::SolverFailed, 0)
            }
        };

        let record = ExperimentRecord {
            task_id,
            n_vars,
            clause_count,
            solver: solver.to_string(),
            outcome,
            decisions,
            elapsed_ms: start.elapsed().as_millis() as u64,
            approval,
            recorded_at: Utc::now(),
        };
        self.append(&record)?;

        info!(
            task_id = %record.task_id,
            outcome = record.outcome.as_str(),
            decisions = record.decisions,
            elapsed_ms = record.elapsed_ms,
            "Experiment recorded"
        );
        Ok(record)
    }

    fn append(&self, record: &ExperimentRecord) -> Result<()> {
        let path = &self.config.log_path;
        let line = serde_json::to_string(record)
            .map_err(|e| CodegenieError::Internal(format!("encoding experiment record: {e}")))?;

        let _guard = self
            .log_lock
            .lock()
            .map_err(|_| CodegenieError::Internal("experiment log lock poisoned".to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| CodegenieError::io("creating log dir", e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| CodegenieError::io("opening experiment log", e))?;
        writeln!(file, "{line}").map_err(|e| CodegenieError::io("appending experiment log", e))
    }

    /// Every logged experiment, oldest first.
    pub fn history(&self) -> Result<Vec<ExperimentRecord>> {
        let path = &self.config.log_path;
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(path).map_err(|e| CodegenieError::io("opening experiment log", e))?;
        let mut records = Vec::new();
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| CodegenieError::io("reading experiment log", e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(line = line_num + 1, error = %e, "Skipping unreadable log line"),
            }
        }
        Ok(records)
    }
}

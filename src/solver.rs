/**************************************************************************/
/*  This file is part of PROTOCNF.                                        */
/*                                                                        */
/*  Copyright (C) 2025                                                    */
/*    CEA (Commissariat à l'énergie atomique et aux énergies              */
/*         alternatives)                                                  */
/*                                                                        */
/*  you can redistribute it and/or modify it under the terms of the GNU   */
/*  Lesser General Public License as published by the Free Software       */
/*  Foundation, version 2.1.                                              */
/*                                                                        */
/*  It is distributed in the hope that it will be useful,                 */
/*  but WITHOUT ANY WARRANTY; without even the implied warranty of        */
/*  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the         */
/*  GNU Lesser General Public License for more details.                   */
/*                                                                        */
/*  See the GNU Lesser General Public License version 2.1                 */
/*  for more details (enclosed in the file licenses/LGPLv2.1).            */
/*                                                                        */
/**************************************************************************/

//! Satisfiability of an encoding under assumptions, by an external DIMACS solver.

use crate::cnf::{write_dimacs, Clause, Cnf, Lit};
use crate::model::Model;
use crate::utils::{try_wait_timeout, LastLines, MaybePersistentTempFile};
use anyhow::Context;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::process::CommandExt;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;
use tracing::{debug, trace};

/// Answer of a satisfiability check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// with a model
    Sat(Model),
    /// no model
    Unsat,
}

impl Outcome {
    /// The model, if satisfiable
    pub fn model(&self) -> Option<&Model> {
        match self {
            Outcome::Sat(m) => Some(m),
            Outcome::Unsat => None,
        }
    }
}

/// Exit code of competition solvers on satisfiable formulas
pub const EXIT_SAT: i32 = 10;
/// Exit code of competition solvers on unsatisfiable formulas
pub const EXIT_UNSAT: i32 = 20;

/// Parses the output of a SAT solver in the format of the SAT competition: a status line
/// `s SATISFIABLE` or `s UNSATISFIABLE`, and for satisfiable formulas `v` lines listing
/// literals up to a terminating `0`. Without status line, the exit code decides.
///
/// Variables missing from the `v` lines are false in the returned model.
/// # Example
/// ```
/// use protocnf::solver::{parse_solver_output, Outcome};
/// use protocnf::cnf::Lit;
/// let out = "c comment\ns SATISFIABLE\nv -1 2\nv 3 0\n";
/// let res = parse_solver_output(out.as_bytes(), Some(10), 3).unwrap();
/// let model = res.model().unwrap();
/// assert!(!model[Lit::from_dimacs(1)] && model[Lit::from_dimacs(2)] && model[Lit::from_dimacs(3)]);
/// ```
pub fn parse_solver_output<R: BufRead>(
    output: R,
    code: Option<i32>,
    var_count: usize,
) -> anyhow::Result<Outcome> {
    let mut status: Option<bool> = None;
    let mut lits = Vec::new();
    let mut terminated = false;
    for (number, line) in output.lines().enumerate() {
        let line = line.context("reading solver output")?;
        let mut words = line.split_whitespace();
        match words.next() {
            Some("s") => {
                let answer: Vec<&str> = words.collect();
                status = match answer.as_slice() {
                    ["SATISFIABLE"] => Some(true),
                    ["UNSATISFIABLE"] => Some(false),
                    _ => anyhow::bail!("solver answered {:?}", line),
                };
            }
            Some("v") => {
                for word in words {
                    let lit: isize = word.parse().with_context(|| {
                        format!("line {} of solver output: bad literal {:?}", number + 1, word)
                    })?;
                    if lit == 0 {
                        terminated = true;
                    } else {
                        anyhow::ensure!(
                            !terminated,
                            "line {} of solver output: literal {} after end of model",
                            number + 1,
                            lit
                        );
                        anyhow::ensure!(
                            lit.unsigned_abs() <= var_count,
                            "line {} of solver output: literal {} but the formula has {} variables",
                            number + 1,
                            lit,
                            var_count
                        );
                        lits.push(Lit::from_dimacs(lit));
                    }
                }
            }
            _ => (),
        }
    }
    let sat = match (status, code) {
        (Some(sat), Some(EXIT_SAT)) | (Some(sat), Some(EXIT_UNSAT)) => {
            anyhow::ensure!(
                sat == (code == Some(EXIT_SAT)),
                "solver status line contradicts its exit code {:?}",
                code
            );
            sat
        }
        (Some(sat), _) => sat,
        (None, Some(EXIT_SAT)) => true,
        (None, Some(EXIT_UNSAT)) => false,
        (None, code) => anyhow::bail!("solver gave no answer and exit code {:?}", code),
    };
    if !sat {
        return Ok(Outcome::Unsat);
    }
    anyhow::ensure!(terminated, "solver answered SATISFIABLE without a complete model");
    Ok(Outcome::Sat(Model::from_lits(&lits, var_count)))
}

/// A SAT solver executable taking a DIMACS file as last argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalSolver {
    /// the executable
    pub command: String,
    /// arguments before the file name
    pub args: Vec<String>,
}

/// Kills the tool if we bail out early.
struct ToolProcess(Option<Child>);

impl Drop for ToolProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.0.take() {
            let _ignore = child.kill();
            let _ignore = child.wait();
        }
    }
}

/// Writes `cnf` over `var_count` variables to a temporary DIMACS file, with one unit clause
/// per assumption. Returns the file and the clauses written.
pub(crate) fn write_with_units(
    cnf: &Cnf,
    var_count: usize,
    assumptions: &[Lit],
) -> anyhow::Result<(MaybePersistentTempFile, Cnf)> {
    let mut file = MaybePersistentTempFile::new(".cnf").context("creating dimacs input")?;
    let mut with_units = cnf.clone();
    for &lit in assumptions {
        with_units.push(Clause::new(vec![lit]));
    }
    write_dimacs(&mut file, &with_units.to_dimacs_formula(var_count))
        .context("writing dimacs input")?;
    file.flush().context("writing dimacs input")?;
    Ok((file, with_units))
}

/// What a DIMACS tool printed
pub(crate) struct ToolOutput {
    /// lines of stdout selected by the caller
    pub lines: Vec<String>,
    pub status: ExitStatus,
    pub stderr: LastLines,
}

impl ToolOutput {
    /// Describes how `command` ended, for error messages.
    pub fn describe(&self, command: &str) -> String {
        format!(
            "{} failed with code {:?} signal {:?}: {}",
            command,
            self.status.code(),
            self.status.signal(),
            self.stderr.text_at_end(Duration::from_secs(1))
        )
    }
}

/// Runs `command args... input`, keeping the lines of stdout for which `keep` holds.
///
/// The child gets a death signal so that it does not survive us, and is killed if it does not
/// exit within 2 seconds of closing its stdout.
pub(crate) fn run_tool(
    command: &str,
    args: &[String],
    input: &Path,
    keep: impl Fn(&str) -> bool,
) -> anyhow::Result<ToolOutput> {
    let mut cmd = Command::new(command);
    cmd.args(args)
        .arg(input)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    unsafe {
        cmd.pre_exec(|| prctl::set_death_signal(9).map_err(std::io::Error::from_raw_os_error))
    };
    trace!(?cmd, "starting external tool");
    let _span = tracing::trace_span!("external_tool", timing = true).entered();
    let mut process = ToolProcess(Some(
        cmd.spawn()
            .with_context(|| format!("failed to run {}", command))?,
    ));
    let child = process.0.as_mut().context("tool process")?;
    let stderr = LastLines::new(child.stderr.take().context("tool stderr")?);
    let stdout = child.stdout.take().context("tool stdout")?;
    // the exit code is only known after the output is consumed
    let mut lines = Vec::new();
    for line in BufReader::new(stdout).lines() {
        let line = line.with_context(|| format!("reading output of {}", command))?;
        if keep(&line) {
            lines.push(line);
        }
    }
    // stdout is closed: the tool is exiting, or hangs after closing it
    let status = match try_wait_timeout(child, Duration::from_secs(2))
        .with_context(|| format!("waiting for {}", command))?
    {
        Some(status) => status,
        None => {
            child.kill().with_context(|| format!("killing {}", command))?;
            child.wait().with_context(|| format!("waiting for {}", command))?
        }
    };
    process.0 = None;
    debug!(command, code = ?status.code(), signal = ?status.signal(), "external tool exited");
    Ok(ToolOutput {
        lines,
        status,
        stderr,
    })
}

impl ExternalSolver {
    /// A solver without extra arguments
    pub fn new(command: &str) -> Self {
        ExternalSolver {
            command: command.to_owned(),
            args: Vec::new(),
        }
    }

    /// Decides `cnf` over `var_count` variables with the `assumptions` as unit clauses.
    ///
    /// The returned model is checked against the clauses and the assumptions.
    pub fn solve(&self, cnf: &Cnf, var_count: usize, assumptions: &[Lit]) -> anyhow::Result<Outcome> {
        let var_count = std::cmp::max(var_count, cnf.var_count());
        let (file, with_units) =
            write_with_units(cnf, var_count, assumptions).context("preparing solver input")?;
        let output = run_tool(&self.command, &self.args, file.as_ref(), |line| {
            line.starts_with("s ") || line.starts_with("v ") || line == "v"
        })?;
        let text = output.lines.join("\n");
        let outcome = parse_solver_output(text.as_bytes(), output.status.code(), var_count)
            .with_context(|| output.describe(&self.command))?;
        if let Outcome::Sat(model) = &outcome {
            anyhow::ensure!(
                model.satisfies(&with_units),
                "{} returned a model which is not a model: {:?}",
                self.command,
                model
            );
        }
        Ok(outcome)
    }
}

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

//! Model counting of an encoding by an external #SAT solver.

use crate::cnf::{Cnf, Lit};
use crate::solver::{run_tool, write_with_units, EXIT_SAT, EXIT_UNSAT};
use anyhow::Context;
use num_bigint::BigUint;
use num_traits::Zero;
use std::io::BufRead;
use tracing::trace;

/// Parses the output of a model counter. Recognized count lines are
/// - `s mc <count>` and `c s exact arb int <count>` (model counting competition)
/// - `s <count>` (d4)
/// - `# solutions` followed by a line `<count>` (sharpSAT)
///
/// A counter which only says `s UNSATISFIABLE` counted 0 models.
/// # Example
/// ```
/// use protocnf::counter::parse_counter_output;
/// let out = "c o comment\ns SATISFIABLE\nc s type mc\nc s log10-estimate 1.2\nc s exact arb int 16\n";
/// assert_eq!(parse_counter_output(out.as_bytes()).unwrap(), 16u32.into());
/// assert_eq!(parse_counter_output("s 3\n".as_bytes()).unwrap(), 3u32.into());
/// ```
pub fn parse_counter_output<R: BufRead>(output: R) -> anyhow::Result<BigUint> {
    let mut count: Option<BigUint> = None;
    let mut unsat = false;
    let mut sharpsat_header = false;
    for (number, line) in output.lines().enumerate() {
        let line = line.context("reading counter output")?;
        let words: Vec<&str> = line.split_whitespace().collect();
        let value = match words.as_slice() {
            ["s", "UNSATISFIABLE"] => {
                unsat = true;
                continue;
            }
            ["s", "SATISFIABLE"] => continue,
            ["#", "solutions"] => {
                sharpsat_header = true;
                continue;
            }
            ["s", "mc", n] | ["s", n] | ["c", "s", "exact", _, "int", n] => *n,
            [n] if sharpsat_header => {
                sharpsat_header = false;
                *n
            }
            _ => continue,
        };
        let value: BigUint = value.parse().with_context(|| {
            format!("line {} of counter output: bad count {:?}", number + 1, value)
        })?;
        if let Some(previous) = &count {
            anyhow::ensure!(
                previous == &value,
                "counter reported two counts: {} and {}",
                previous,
                value
            );
        }
        count = Some(value);
    }
    match count {
        Some(c) => {
            anyhow::ensure!(
                !unsat || c.is_zero(),
                "counter answered UNSATISFIABLE and {} models",
                c
            );
            Ok(c)
        }
        None if unsat => Ok(BigUint::zero()),
        None => anyhow::bail!("counter gave no model count"),
    }
}

/// A #SAT solver executable taking a DIMACS file as last argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCounter {
    /// the executable
    pub command: String,
    /// arguments before the file name
    pub args: Vec<String>,
}

impl ExternalCounter {
    /// A counter without extra arguments
    pub fn new(command: &str) -> Self {
        ExternalCounter {
            command: command.to_owned(),
            args: Vec::new(),
        }
    }

    /// Counts the models of `cnf` over `var_count` variables with the `assumptions` as unit
    /// clauses.
    ///
    /// The counter must exit with code 0, 10 or 20.
    pub fn count(&self, cnf: &Cnf, var_count: usize, assumptions: &[Lit]) -> anyhow::Result<BigUint> {
        let var_count = std::cmp::max(var_count, cnf.var_count());
        let (file, _) =
            write_with_units(cnf, var_count, assumptions).context("preparing counter input")?;
        let output = run_tool(&self.command, &self.args, file.as_ref(), |line| {
            !line.starts_with('c') || line.starts_with("c s ")
        })?;
        anyhow::ensure!(
            matches!(output.status.code(), Some(0) | Some(EXIT_SAT) | Some(EXIT_UNSAT)),
            "{}",
            output.describe(&self.command)
        );
        let text = output.lines.join("\n");
        let count = parse_counter_output(text.as_bytes())
            .with_context(|| output.describe(&self.command))?;
        trace!(command = %self.command, %count, "external count");
        Ok(count)
    }
}

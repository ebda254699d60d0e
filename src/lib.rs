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

#![warn(missing_docs)]

//! Selector-guarded CNF encoding of proto-CNF formulas
//!
//! A proto-CNF formula is a conjunction of arbitrary formulas. Each conjunct is converted to
//! CNF locally, guarded by its own selector variable, so that individual conjuncts can later
//! be enabled, negated or dropped by SAT solver assumptions.

pub mod cnf;
pub mod counter;
pub mod distribute;
pub mod encode;
pub mod error;
pub mod format;
pub mod formula;
pub mod model;
pub mod solver;
pub mod stats;
pub mod utils;

use anyhow::Context;
use counter::ExternalCounter;
use chrono::Duration;
use encode::EncodingSummary;
use format::Formats;
use formula::VariableMap;
use serde::Serialize;
use solver::{ExternalSolver, Outcome};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use structopt::clap::arg_enum;
use structopt::StructOpt;

arg_enum! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Goal {
        Encode,
        Check,
        Solve,
        Count,
    }
}

fn parse_duration(txt: &str) -> anyhow::Result<Duration> {
    let n = txt.parse()?;
    Ok(Duration::milliseconds(n))
}

/// Writes results as json to a file.
#[derive(Debug)]
struct ResultWriter {
    file: File,
    path: PathBuf,
}

impl ResultWriter {
    fn create(path: &Path) -> anyhow::Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("opening {} to write results", path.display()))?;
        Ok(ResultWriter {
            file,
            path: path.to_owned(),
        })
    }

    fn write<R: Serialize>(&mut self, result: &R) -> anyhow::Result<()> {
        serde_json::to_writer_pretty(&mut self.file, result)
            .with_context(|| format!("writing result to {}", self.path.display()))
    }
}

/// Configuration options
#[derive(Debug, StructOpt)]
#[structopt(
    name = "protocnf",
    about = "Encodes proto-CNF formulas to CNF with one selector variable per conjunct"
)]
pub struct Opt {
    /// Input file: .formula or .txt for one formula per line, .cnf or .dimacs for DIMACS
    #[structopt(parse(from_os_str))]
    input: PathBuf,

    /// Input format (formula or dimacs), instead of guessing from the extension
    #[structopt(short = "F", long)]
    format: Option<String>,

    #[structopt(possible_values = &Goal::variants(), case_insensitive = true, default_value="encode", short, long)]
    /// What to do with the encoding.
    ///
    /// encode writes it in DIMACS format, check and solve decide its satisfiability under
    /// assumptions on selectors, by brute force or with an external solver. count counts the
    /// assignments of input variables satisfying the constraints on conjuncts, by brute force
    /// or with --counter.
    goal: Goal,

    /// Where to write the DIMACS encoding. Standard output by default.
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// Conjuncts (numbered from 1) which must be false, for check, solve and count
    #[structopt(short, long)]
    negated: Vec<usize>,

    /// Conjuncts (numbered from 1) which are left unconstrained, for check, solve and count.
    /// Other conjuncts must be true.
    #[structopt(short, long)]
    free: Vec<usize>,

    /// SAT solver executable for solve. It gets a DIMACS file as last argument and must answer
    /// in the format of the SAT competition.
    #[structopt(long, default_value = "kissat")]
    solver: String,

    /// Argument to the SAT solver, before the file name
    #[structopt(long, number_of_values = 1, allow_hyphen_values = true)]
    solver_arg: Vec<String>,

    /// Model counter executable for count, instead of brute force. It gets a DIMACS file as
    /// last argument and must print the count like sharpSAT, d4 or in the format of the model
    /// counting competition.
    #[structopt(long)]
    counter: Option<String>,

    /// Argument to the model counter, before the file name
    #[structopt(long, number_of_values = 1, allow_hyphen_values = true)]
    counter_arg: Vec<String>,

    /// JSON output to the specified file
    #[structopt(short, long, parse(from_os_str))]
    json: Option<PathBuf>,

    /// Timeout, in milliseconds. Return code is 42 on timeout.
    #[structopt(short="T", long, parse(try_from_str = parse_duration))]
    timeout: Option<Duration>,

    /// Enable debug output and persist temporary files for inspection.
    #[structopt(short, long)]
    debug: bool,

    /// Output some stats to this file
    #[structopt(long, parse(from_os_str))]
    stats: Option<PathBuf>,
}

/// Result of check and solve
#[derive(Debug, Serialize)]
struct SatResult {
    satisfiable: bool,
    /// values of input variables
    model: Option<BTreeMap<String, bool>>,
    encoding: EncodingSummary,
}

/// Result of count
#[derive(Debug, Serialize)]
struct CountResult {
    /// decimal, as it may not fit in a json number
    count: String,
    encoding: EncodingSummary,
}

fn setup_tracing(opt: &Opt) -> anyhow::Result<Option<stats::StatsLayer>> {
    use tracing::Level;
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::prelude::*;
    let min_level = if opt.debug { Level::TRACE } else { Level::INFO };
    // stdout may carry the encoding
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(LevelFilter::from_level(min_level));
    let subscriber = tracing_subscriber::Registry::default().with(fmt_layer);
    #[cfg(feature = "tracy")]
    let subscriber = subscriber.with(tracing_tracy::TracyLayer::new());
    let subscriber_with_stats: Box<dyn tracing::Subscriber + 'static + Send + Sync>;
    let stats_layer = match opt.stats.as_ref() {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot open {} for writing stats", path.display()))?;
            let stats_layer = stats::StatsLayer::new(file);
            subscriber_with_stats = Box::new(subscriber.with(stats_layer.clone()));
            Some(stats_layer)
        }
        None => {
            subscriber_with_stats = Box::new(subscriber);
            None
        }
    };
    tracing::subscriber::set_global_default(subscriber_with_stats)
        .context("setting default tracing collector")?;
    Ok(stats_layer)
}

/// Reads, encodes and processes the formula as configured by `opt`, reading input with
/// `formats`.
///
/// Does not install any tracing subscriber nor timeout, see [`run`].
pub fn run_with(opt: &Opt, formats: &Formats) -> anyhow::Result<()> {
    let mut vars = VariableMap::new();
    let formula = formats.parse_file(&opt.input, opt.format.as_deref(), &mut vars)?;
    let encoding = encode::encode(&formula, &mut vars)
        .with_context(|| format!("encoding {}", opt.input.display()))?;
    let summary = encoding.summary(&vars);
    let mut json = opt.json.as_deref().map(ResultWriter::create).transpose()?;
    match opt.goal {
        Goal::Encode => {
            anyhow::ensure!(
                opt.negated.is_empty() && opt.free.is_empty(),
                "--negated and --free only apply to check, solve and count"
            );
            match &opt.output {
                Some(path) => {
                    let file = File::create(path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    let mut out = std::io::BufWriter::new(file);
                    cnf::write_named_dimacs(&mut out, &encoding.cnf, &vars)?;
                    out.flush()
                        .with_context(|| format!("writing {}", path.display()))?;
                }
                None => {
                    let stdout = std::io::stdout();
                    let mut out = stdout.lock();
                    cnf::write_named_dimacs(&mut out, &encoding.cnf, &vars)?;
                    out.flush().context("writing to standard output")?;
                }
            }
            match json.as_mut() {
                Some(writer) => writer.write(&summary)?,
                None => eprintln!("{}", summary),
            }
        }
        Goal::Check | Goal::Solve => {
            let assumptions = encoding.assumptions(&opt.negated, &opt.free)?;
            let outcome = if opt.goal == Goal::Check {
                match cnf::brute_force_solve(&encoding.cnf, vars.len(), &assumptions)? {
                    Some(model) => Outcome::Sat(model),
                    None => Outcome::Unsat,
                }
            } else {
                let solver = ExternalSolver {
                    command: opt.solver.clone(),
                    args: opt.solver_arg.clone(),
                };
                solver.solve(&encoding.cnf, vars.len(), &assumptions)?
            };
            tracing::trace!(
                satisfiable = outcome.model().is_some(),
                stats = true
            );
            match json.as_mut() {
                Some(writer) => writer.write(&SatResult {
                    satisfiable: outcome.model().is_some(),
                    model: outcome.model().map(|m| m.named_values(&vars)),
                    encoding: summary,
                })?,
                None => match &outcome {
                    Outcome::Sat(model) => {
                        println!("Satisfiable: {}", model.display_named(&vars))
                    }
                    Outcome::Unsat => println!("Unsatisfiable"),
                },
            }
        }
        Goal::Count => {
            let assumptions = encoding.counting_assumptions(&opt.negated, &opt.free)?;
            let count = match &opt.counter {
                None => cnf::brute_force_count(&encoding.cnf, vars.len(), &assumptions)?,
                Some(command) => {
                    let counter = ExternalCounter {
                        command: command.clone(),
                        args: opt.counter_arg.clone(),
                    };
                    counter.count(&encoding.cnf, vars.len(), &assumptions)?
                }
            };
            tracing::trace!(model_count = %count, stats = true);
            match json.as_mut() {
                Some(writer) => writer.write(&CountResult {
                    count: count.to_string(),
                    encoding: summary,
                })?,
                None => println!("Models: {}", count),
            }
        }
    }
    Ok(())
}

/// entrypoint of the binary
pub fn run() -> anyhow::Result<()> {
    let opt = Opt::from_args();
    let start_time = Instant::now();
    let stats = setup_tracing(&opt)?;
    let timer_stats = stats.clone();
    let global_stats = move || {
        tracing::trace!(
            wall_time_ms = start_time.elapsed().as_millis() as u64,
            stats = true
        );
    };
    let timer = opt.timeout.map(|duration| {
        let timer = timer::Timer::new();
        let giveup = move || {
            global_stats();
            tracing::warn!(timeout = true, stats = true);
            if let Some(s) = &timer_stats {
                s.dump();
            }
            std::process::exit(42)
        };
        // dropping the guard would cancel the timeout
        timer.schedule_with_delay(duration, giveup).ignore();
        // same for the timer
        timer
    });
    let res = run_with(&opt, &Formats::default());
    drop(timer);
    global_stats();
    tracing::trace!(timeout = false, stats = true);
    if let Some(s) = stats {
        s.dump();
    }
    res
}

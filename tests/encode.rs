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

//! Drives the library end to end, from input files to DIMACS and json results.

use protocnf::cnf::{Cnf, DimacsParser};
use protocnf::format::Formats;
use protocnf::model::Model;
use protocnf::{run_with, Opt};
use std::path::{Path, PathBuf};
use structopt::StructOpt;

fn write(dir: &Path, name: &str, content: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, content)?;
    Ok(path)
}

fn run(args: &[&str]) -> anyhow::Result<()> {
    let mut all = vec!["protocnf"];
    all.extend_from_slice(args);
    let opt = Opt::from_iter_safe(all)?;
    run_with(&opt, &Formats::default())
}

fn json(path: &Path) -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
}

/// x | y, !z, x & z
const FORMULA: &str = "# three conjuncts\nx | y\n!z\nx & z\n";

#[test]
fn encode_writes_named_dimacs() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = write(dir.path(), "f.formula", FORMULA)?;
    let output = dir.path().join("f.cnf");
    let summary = dir.path().join("summary.json");
    run(&[
        input.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
        "-j",
        summary.to_str().unwrap(),
    ])?;
    let text = std::fs::read_to_string(&output)?;
    let comments: Vec<&str> = text.lines().filter(|l| l.starts_with("c ")).collect();
    assert_eq!(
        comments,
        vec![
            "c 1 x",
            "c 2 y",
            "c 3 z",
            "c 4 __selector_1",
            "c 5 __selector_2",
            "c 6 __selector_3",
            "c 7 __root"
        ]
    );
    let cnf = Cnf::from(&DimacsParser::parse(text.as_bytes())?);
    let summary = json(&summary)?;
    assert_eq!(summary["conjuncts"], 3);
    assert_eq!(summary["root"], 7);
    assert_eq!(summary["selectors"]["2"], 5);
    assert_eq!(summary["clauses"], cnf.len());
    // x, !y, !z with selectors 1 and 2 true, 3 false
    let mut m = Model::empty(7);
    for &i in &[0, 3, 4] {
        m.set_index(i, true);
    }
    assert!(m.satisfies(&cnf));
    // selector 3 cannot be true when x & z is false
    m.set_index(5, true);
    assert!(!m.satisfies(&cnf));
    Ok(())
}

#[test]
fn check_respects_assumptions() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = write(dir.path(), "f.txt", FORMULA)?;
    let result = dir.path().join("result.json");
    let result_str = result.to_str().unwrap();
    let input_str = input.to_str().unwrap();
    // !z and x & z together are contradictory
    run(&[input_str, "-g", "check", "-j", result_str])?;
    let res = json(&result)?;
    assert_eq!(res["satisfiable"], false);
    assert!(res["model"].is_null());
    // dropping the third conjunct
    run(&[input_str, "-g", "check", "-f", "3", "-j", result_str])?;
    let res = json(&result)?;
    assert_eq!(res["satisfiable"], true);
    assert_eq!(res["model"]["z"], false);
    // negating the second one
    run(&[input_str, "-g", "check", "-n", "2", "-j", result_str])?;
    let res = json(&result)?;
    assert_eq!(res["satisfiable"], true);
    assert_eq!(res["model"]["x"], true);
    assert_eq!(res["model"]["z"], true);
    assert!(res["model"].get("__root").is_none());
    assert_eq!(res["encoding"]["conjuncts"], 3);
    Ok(())
}

#[test]
fn bad_assumptions_are_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = write(dir.path(), "f.txt", FORMULA)?;
    let input_str = input.to_str().unwrap();
    assert!(run(&[input_str, "-g", "check", "-n", "4"]).is_err());
    assert!(run(&[input_str, "-g", "check", "-n", "0"]).is_err());
    assert!(run(&[input_str, "-g", "check", "-n", "1", "-f", "1"]).is_err());
    // assumptions make no sense without a solver
    assert!(run(&[input_str, "-n", "1"]).is_err());
    Ok(())
}

#[test]
fn dimacs_input() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = write(dir.path(), "f.cnf", "p cnf 2 3\n1 2 0\n-1 0\n-2 0\n")?;
    let result = dir.path().join("result.json");
    let input_str = input.to_str().unwrap();
    let result_str = result.to_str().unwrap();
    run(&[input_str, "-g", "check", "-j", result_str])?;
    assert_eq!(json(&result)?["satisfiable"], false);
    run(&[input_str, "-g", "check", "-f", "3", "-j", result_str])?;
    let res = json(&result)?;
    assert_eq!(res["satisfiable"], true);
    assert_eq!(res["model"]["1"], false);
    assert_eq!(res["model"]["2"], true);
    Ok(())
}

#[test]
fn solve_with_external_solver() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = write(dir.path(), "f.formula", "a\n")?;
    let result = dir.path().join("result.json");
    // a, then selector 1 and root: the only model with the unit clause on the selector
    let script = "grep -qx '2 0' \"$1\" && echo 's SATISFIABLE' && echo 'v 1 2 -3 0' && exit 10; exit 1";
    run(&[
        input.to_str().unwrap(),
        "-g",
        "solve",
        "--solver",
        "sh",
        "--solver-arg",
        "-c",
        "--solver-arg",
        script,
        "--solver-arg",
        "fake-solver",
        "-j",
        result.to_str().unwrap(),
    ])?;
    let res = json(&result)?;
    assert_eq!(res["satisfiable"], true);
    assert_eq!(res["model"]["a"], true);
    Ok(())
}

#[test]
fn unknown_inputs() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = write(dir.path(), "f.smt2", "(assert true)\n")?;
    assert!(run(&[input.to_str().unwrap()]).is_err());
    let missing = dir.path().join("missing.formula");
    assert!(run(&[missing.to_str().unwrap()]).is_err());
    let garbage = write(dir.path(), "g.formula", "a &&\n")?;
    let err = run(&[garbage.to_str().unwrap()]).expect_err("parse error");
    assert!(format!("{:#}", err).contains("line 1"));
    Ok(())
}

#[test]
fn count_solutions() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = write(dir.path(), "f.formula", FORMULA)?;
    let result = dir.path().join("result.json");
    let input_str = input.to_str().unwrap();
    let result_str = result.to_str().unwrap();
    let count = |args: &[&str]| -> anyhow::Result<serde_json::Value> {
        let mut all = vec![input_str, "-g", "count", "-j", result_str];
        all.extend_from_slice(args);
        run(&all)?;
        Ok(json(&result)?["count"].clone())
    };
    assert_eq!(count(&[])?, "0");
    // (x | y) & !z
    assert_eq!(count(&["-f", "3"])?, "3");
    // !z & !(x & z), x and y are free
    assert_eq!(count(&["-f", "1", "-n", "3"])?, "4");
    // all conjuncts dropped
    assert_eq!(count(&["-f", "1", "-f", "2", "-f", "3"])?, "8");
    // the counter sees the root disabled as a unit clause
    let script = "grep -qx -e '-7 0' \"$1\" && echo 's mc 5' && exit 0; exit 1";
    let external = count(&[
        "--counter",
        "sh",
        "--counter-arg",
        "-c",
        "--counter-arg",
        script,
        "--counter-arg",
        "fake-counter",
    ])?;
    assert_eq!(external, "5");
    assert_eq!(json(&result)?["encoding"]["root"], 7);
    Ok(())
}

#[test]
fn deep_nesting_is_an_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let deep = format!("{}a{}\n", "(".repeat(100_000), ")".repeat(100_000));
    let input = write(dir.path(), "deep.formula", &deep)?;
    let err = run(&[input.to_str().unwrap(), "-g", "check"]).expect_err("too deep");
    assert!(format!("{:#}", err).contains("line 1"));
    Ok(())
}

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

//! Input formats for proto-CNF formulas, chosen by file extension.

use crate::cnf::{DimacsParser, Lit};
use crate::formula::{Formula, VariableMap};
use anyhow::Context;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{char, multispace0};
use nom::combinator::{all_consuming, map, opt};
use nom::error::ErrorKind;
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded};
use nom::IResult;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::debug;

/// A way to read a proto-CNF formula.
pub trait FormulaFormat {
    /// Name of the format, as accepted by [`Formats::by_name`]
    fn name(&self) -> &'static str;

    /// File extensions of the format, without leading dot
    fn extensions(&self) -> &'static [&'static str];

    /// Reads a formula. Its root is a conjunction of formulas in negation normal form.
    /// Variables are allocated in `vars`, in order of first occurrence.
    fn parse(&self, input: &mut dyn Read, vars: &mut VariableMap) -> anyhow::Result<Formula>;
}

/// A set of formats.
///
/// [`Formats::default`] contains [`TextFormat`] and [`DimacsFormat`].
pub struct Formats {
    formats: Vec<Box<dyn FormulaFormat>>,
}

impl Default for Formats {
    fn default() -> Self {
        let mut res = Formats::new();
        res.register(Box::new(TextFormat));
        res.register(Box::new(DimacsFormat));
        res
    }
}

impl Formats {
    /// No format at all
    pub fn new() -> Self {
        Formats {
            formats: Vec::new(),
        }
    }

    /// Adds a format. Later formats take precedence for shared extensions.
    pub fn register(&mut self, format: Box<dyn FormulaFormat>) {
        self.formats.insert(0, format);
    }

    /// The format called `name`
    pub fn by_name(&self, name: &str) -> Option<&dyn FormulaFormat> {
        self.formats
            .iter()
            .find(|f| f.name() == name)
            .map(|f| f.as_ref())
    }

    /// The format of `path`, according to its extension
    pub fn for_path(&self, path: &Path) -> anyhow::Result<&dyn FormulaFormat> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match self
            .formats
            .iter()
            .find(|f| f.extensions().iter().any(|&e| e == ext))
        {
            Some(format) => Ok(format.as_ref()),
            None => anyhow::bail!(
                "don't know what to do with {}: known formats are {}",
                path.display(),
                self.names().join(", ")
            ),
        }
    }

    /// Names of the registered formats
    pub fn names(&self) -> Vec<&'static str> {
        self.formats.iter().map(|f| f.name()).collect()
    }

    /// Reads the file at `path`, in the format called `format` or guessed from the extension.
    pub fn parse_file(
        &self,
        path: &Path,
        format: Option<&str>,
        vars: &mut VariableMap,
    ) -> anyhow::Result<Formula> {
        let format = match format {
            Some(name) => self
                .by_name(name)
                .with_context(|| format!("unknown format {}", name))?,
            None => self.for_path(path)?,
        };
        debug!(path = %path.display(), format = format.name(), "reading formula");
        let mut file = std::fs::File::open(path)
            .with_context(|| format!("opening input file {}", path.display()))?;
        format
            .parse(&mut file, vars)
            .with_context(|| format!("parsing {} as {}", path.display(), format.name()))
    }
}

/// Text format: one conjunct per line.
///
/// Empty lines are ignored and `#` starts a comment. Operators, by increasing precedence:
/// `<->` (left associative), `->` (right associative), `|`, `&`, and negation `!`, `~` or
/// `-`. Constants are `true` and `false`; variable names are made of ascii letters, digits,
/// `_`, `.` and `$`.
/// # Example
/// ```
/// use protocnf::format::{FormulaFormat, TextFormat};
/// use protocnf::formula::VariableMap;
/// let mut vars = VariableMap::new();
/// let text = "# two conjuncts\na | b & c\n!(a -> c)\n";
/// let f = TextFormat.parse(&mut text.as_bytes(), &mut vars).unwrap();
/// assert_eq!(f.display(&vars).to_string(), "((a | (b & c)) & (a & !c))");
/// ```
pub struct TextFormat;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Const(bool),
    Var(String),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Implies(Box<Expr>, Box<Expr>),
    Iff(Box<Expr>, Box<Expr>),
}

impl Expr {
    fn lower(&self, vars: &mut VariableMap) -> anyhow::Result<Formula> {
        Ok(match self {
            Expr::Const(true) => Formula::top(),
            Expr::Const(false) => Formula::bottom(),
            Expr::Var(name) => Formula::var(vars.var(name)?, true),
            Expr::Not(e) => e.lower(vars)?.negate(),
            Expr::And(es) => Formula::And(es.iter().map(|e| e.lower(vars)).collect::<Result<_, _>>()?),
            Expr::Or(es) => Formula::Or(es.iter().map(|e| e.lower(vars)).collect::<Result<_, _>>()?),
            Expr::Implies(a, b) => Formula::Or(vec![a.lower(vars)?.negate(), b.lower(vars)?]),
            Expr::Iff(a, b) => {
                let a = a.lower(vars)?;
                let b = b.lower(vars)?;
                Formula::And(vec![
                    Formula::Or(vec![a.clone().negate(), b.clone()]),
                    Formula::Or(vec![a, b.negate()]),
                ])
            }
        })
    }
}

fn ws<'a, O>(
    inner: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    delimited(multispace0, inner, multispace0)
}

fn identifier(i: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || "_.$".contains(c))(i)
}

/// Deepest nesting of parentheses, negations, implications or equivalences accepted on one
/// line of [`TextFormat`]
pub const MAX_NESTING: usize = 128;

fn too_deep(i: &str) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Failure(nom::error::Error::new(i, ErrorKind::TooLarge))
}

fn atom(i: &str, depth: usize) -> IResult<&str, Expr> {
    alt((
        delimited(
            ws(char('(')),
            move |i| equivalence(i, depth + 1),
            ws(char(')')),
        ),
        map(ws(identifier), |name| match name {
            "true" => Expr::Const(true),
            "false" => Expr::Const(false),
            _ => Expr::Var(name.to_owned()),
        }),
    ))(i)
}

fn negation(i: &str, depth: usize) -> IResult<&str, Expr> {
    if depth > MAX_NESTING {
        return Err(too_deep(i));
    }
    alt((
        map(
            preceded(ws(alt((char('!'), char('~'), char('-')))), move |i| {
                negation(i, depth + 1)
            }),
            |e| Expr::Not(Box::new(e)),
        ),
        move |i| atom(i, depth),
    ))(i)
}

/// `first (op first)*` as a flat node built by `node`, or `first` alone
fn chain<'a>(
    operand: impl Fn(&'a str) -> IResult<&'a str, Expr> + Copy,
    op: char,
    node: fn(Vec<Expr>) -> Expr,
) -> impl FnMut(&'a str) -> IResult<&'a str, Expr> {
    map(
        pair(operand, many0(preceded(ws(char(op)), operand))),
        move |(first, rest)| {
            if rest.is_empty() {
                first
            } else {
                let mut all = vec![first];
                all.extend(rest);
                node(all)
            }
        },
    )
}

fn conjunction(i: &str, depth: usize) -> IResult<&str, Expr> {
    chain(move |i| negation(i, depth), '&', Expr::And)(i)
}

fn disjunction(i: &str, depth: usize) -> IResult<&str, Expr> {
    chain(move |i| conjunction(i, depth), '|', Expr::Or)(i)
}

fn implication(i: &str, depth: usize) -> IResult<&str, Expr> {
    if depth > MAX_NESTING {
        return Err(too_deep(i));
    }
    map(
        pair(
            move |i| disjunction(i, depth),
            opt(preceded(ws(tag("->")), move |i| implication(i, depth + 1))),
        ),
        |(premise, conclusion)| match conclusion {
            Some(c) => Expr::Implies(Box::new(premise), Box::new(c)),
            None => premise,
        },
    )(i)
}

fn equivalence(i: &str, depth: usize) -> IResult<&str, Expr> {
    if depth > MAX_NESTING {
        return Err(too_deep(i));
    }
    let (remaining, (first, rest)) = pair(
        move |i| implication(i, depth),
        many0(preceded(ws(tag("<->")), move |i| implication(i, depth))),
    )(i)?;
    // the chain is left nested
    if depth + rest.len() > MAX_NESTING {
        return Err(too_deep(i));
    }
    let e = rest
        .into_iter()
        .fold(first, |acc, e| Expr::Iff(Box::new(acc), Box::new(e)));
    Ok((remaining, e))
}

fn parse_line(line: &str) -> anyhow::Result<Expr> {
    match all_consuming(|i| equivalence(i, 0))(line) {
        Ok((_, e)) => Ok(e),
        Err(nom::Err::Failure(e)) if e.code == ErrorKind::TooLarge => {
            anyhow::bail!("formula nested deeper than {} levels", MAX_NESTING)
        }
        Err(e) => anyhow::bail!("cannot parse {:?}: {}", line, e),
    }
}

impl FormulaFormat for TextFormat {
    fn name(&self) -> &'static str {
        "formula"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["formula", "txt"]
    }

    fn parse(&self, input: &mut dyn Read, vars: &mut VariableMap) -> anyhow::Result<Formula> {
        let mut conjuncts = Vec::new();
        for (number, line) in BufReader::new(input).lines().enumerate() {
            let line = line.context("reading formula")?;
            let content = match line.find('#') {
                Some(start) => &line[..start],
                None => &line[..],
            };
            if content.trim().is_empty() {
                continue;
            }
            let conjunct = parse_line(content)
                .and_then(|e| e.lower(vars))
                .with_context(|| format!("line {}", number + 1))?;
            conjuncts.push(conjunct.nnf());
        }
        Ok(Formula::And(conjuncts))
    }
}

/// DIMACS CNF: each clause is one conjunct, variable `k` is called `k`.
pub struct DimacsFormat;

impl FormulaFormat for DimacsFormat {
    fn name(&self) -> &'static str {
        "dimacs"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["cnf", "dimacs"]
    }

    fn parse(&self, input: &mut dyn Read, vars: &mut VariableMap) -> anyhow::Result<Formula> {
        let cnf = DimacsParser::parse(input).context("parsing dimacs")?;
        let mut by_number = Vec::with_capacity(cnf.var_count());
        for number in 1..=cnf.var_count() {
            by_number.push(vars.var(&number.to_string())?);
        }
        let conjuncts = cnf
            .iter()
            .map(|clause| {
                Formula::Or(
                    clause
                        .iter()
                        .map(|lit| {
                            Formula::Lit(Lit::from_var(by_number[lit.var().index()], lit.is_positive()))
                        })
                        .collect(),
                )
            })
            .collect();
        Ok(Formula::And(conjuncts))
    }
}

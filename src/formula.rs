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

//! Propositional formulas, their negation normal form, and variable allocation

use crate::cnf::{Lit, Var};
use crate::error::EncodingError;
use crate::model::Model;
use fixedbitset::FixedBitSet;
use std::collections::BTreeMap;
use std::fmt;

/// A propositional formula, as a tree.
///
/// Negation normal form (NNF) is the subset without [`Formula::Not`]: negations only appear in
/// the polarity of literals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    /// A possibly negated variable
    Lit(Lit),
    /// Negation of a subformula
    Not(Box<Formula>),
    /// Conjunction. The empty conjunction is true.
    And(Vec<Formula>),
    /// Disjunction. The empty disjunction is false.
    Or(Vec<Formula>),
}

impl Formula {
    /// The literal `var` with the given polarity
    pub fn var(var: Var, polarity: bool) -> Formula {
        Formula::Lit(Lit::from_var(var, polarity))
    }

    /// Constant true
    pub fn top() -> Formula {
        Formula::And(Vec::new())
    }

    /// Constant false
    pub fn bottom() -> Formula {
        Formula::Or(Vec::new())
    }

    /// Wraps the formula in a negation.
    pub fn negate(self) -> Formula {
        Formula::Not(Box::new(self))
    }

    /// Name of the connective at the root, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Formula::Lit(_) => "literal",
            Formula::Not(_) => "negation",
            Formula::And(_) => "conjunction",
            Formula::Or(_) => "disjunction",
        }
    }

    /// Returns an equivalent formula in negation normal form.
    /// # Example
    /// ```
    /// use protocnf::formula::Formula;
    /// use protocnf::cnf::Var;
    /// let x = Formula::var(Var::from_index(0), true);
    /// let y = Formula::var(Var::from_index(1), true);
    /// let f = Formula::And(vec![x.clone(), y.clone()]).negate();
    /// assert_eq!(
    ///     f.nnf(),
    ///     Formula::Or(vec![x.negate().nnf(), y.negate().nnf()])
    /// );
    /// assert!(f.nnf().is_nnf());
    /// ```
    pub fn nnf(&self) -> Formula {
        self.nnf_with(false)
    }

    /// Returns the negation normal form of the negation of this formula.
    pub fn negated_nnf(&self) -> Formula {
        self.nnf_with(true)
    }

    fn nnf_with(&self, negate: bool) -> Formula {
        match self {
            Formula::Lit(lit) => Formula::Lit(if negate { !*lit } else { *lit }),
            Formula::Not(inner) => inner.nnf_with(!negate),
            Formula::And(children) => {
                let children = children.iter().map(|c| c.nnf_with(negate)).collect();
                if negate {
                    Formula::Or(children)
                } else {
                    Formula::And(children)
                }
            }
            Formula::Or(children) => {
                let children = children.iter().map(|c| c.nnf_with(negate)).collect();
                if negate {
                    Formula::And(children)
                } else {
                    Formula::Or(children)
                }
            }
        }
    }

    /// true when no negation node occurs in the formula
    pub fn is_nnf(&self) -> bool {
        match self {
            Formula::Lit(_) => true,
            Formula::Not(_) => false,
            Formula::And(children) | Formula::Or(children) => children.iter().all(Formula::is_nnf),
        }
    }

    /// Truth value of the formula under a total assignment.
    pub fn eval(&self, model: &Model) -> bool {
        match self {
            Formula::Lit(lit) => model[*lit],
            Formula::Not(inner) => !inner.eval(model),
            Formula::And(children) => children.iter().all(|c| c.eval(model)),
            Formula::Or(children) => children.iter().any(|c| c.eval(model)),
        }
    }

    /// Calls `f` on every literal, left to right.
    pub fn for_each_lit(&self, f: &mut impl FnMut(Lit)) {
        match self {
            Formula::Lit(lit) => f(*lit),
            Formula::Not(inner) => inner.for_each_lit(f),
            Formula::And(children) | Formula::Or(children) => {
                for child in children {
                    child.for_each_lit(f)
                }
            }
        }
    }

    /// One more than the largest variable index used in the formula.
    pub fn var_count(&self) -> usize {
        let mut count = 0;
        self.for_each_lit(&mut |lit| count = std::cmp::max(count, lit.var().index() + 1));
        count
    }

    /// Displays the formula with variable names taken from `vars`.
    pub fn display<'a>(&'a self, vars: &'a VariableMap) -> Named<'a> {
        Named {
            formula: self,
            vars,
        }
    }

    fn write(
        &self,
        f: &mut fmt::Formatter,
        name: &dyn Fn(Var, &mut fmt::Formatter) -> fmt::Result,
    ) -> fmt::Result {
        match self {
            Formula::Lit(lit) => {
                if lit.is_negative() {
                    write!(f, "!")?;
                }
                name(lit.var(), f)
            }
            Formula::Not(inner) => {
                write!(f, "!")?;
                inner.write(f, name)
            }
            Formula::And(children) | Formula::Or(children) => {
                let (constant, op) = match self {
                    Formula::And(_) => ("true", " & "),
                    _ => ("false", " | "),
                };
                if children.is_empty() {
                    return write!(f, "{}", constant);
                }
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", op)?;
                    }
                    child.write(f, name)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Variables are shown by their dimacs number.
impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.write(f, &|var, f| write!(f, "{}", var.to_dimacs()))
    }
}

/// A formula displayed with variable names, see [`Formula::display`].
pub struct Named<'a> {
    formula: &'a Formula,
    vars: &'a VariableMap,
}

impl fmt::Display for Named<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let vars = self.vars;
        self.formula.write(f, &|var, f| match vars.name(var) {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "{}", var.to_dimacs()),
        })
    }
}

/// Default capacity of a [`VariableMap`].
pub const DEFAULT_VARIABLE_LIMIT: usize = 1 << 27;

/// Allocates variables and remembers their names.
///
/// Variables are allocated densely from index 0. Names are unique. Variables created by
/// [`VariableMap::fresh`] are auxiliary: they do not come from the input formula.
#[derive(Debug, Clone)]
pub struct VariableMap {
    /// name of variable of index i
    names: Vec<String>,
    by_name: BTreeMap<String, Var>,
    auxiliary: FixedBitSet,
    limit: usize,
}

impl Default for VariableMap {
    fn default() -> Self {
        Self::with_limit(DEFAULT_VARIABLE_LIMIT)
    }
}

impl VariableMap {
    /// An empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty map which refuses to allocate more than `limit` variables.
    pub fn with_limit(limit: usize) -> Self {
        VariableMap {
            names: Vec::new(),
            by_name: BTreeMap::new(),
            auxiliary: FixedBitSet::with_capacity(0),
            limit,
        }
    }

    /// Number of allocated variables
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// true when no variable was allocated
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns the variable called `name`, allocating it if needed.
    /// # Example
    /// ```
    /// use protocnf::formula::VariableMap;
    /// let mut vars = VariableMap::new();
    /// let a = vars.var("a").unwrap();
    /// assert_eq!(vars.var("a").unwrap(), a);
    /// assert_ne!(vars.var("b").unwrap(), a);
    /// ```
    pub fn var(&mut self, name: &str) -> Result<Var, EncodingError> {
        match self.by_name.get(name) {
            Some(&var) => Ok(var),
            None => self.allocate(name.to_owned(), false),
        }
    }

    /// Allocates a new auxiliary variable. Its name is `hint`, with a numeric suffix if `hint`
    /// is already taken.
    pub fn fresh(&mut self, hint: &str) -> Result<Var, EncodingError> {
        let name = self.unique_name(hint);
        self.allocate(name, true)
    }

    /// Makes sure all variables of `formula` are allocated, so that fresh variables are
    /// distinct from them. Unknown variables are named after their dimacs number.
    pub fn cover(&mut self, formula: &Formula) -> Result<(), EncodingError> {
        while self.len() < formula.var_count() {
            let hint = format!("x{}", self.len() + 1);
            let name = self.unique_name(&hint);
            self.allocate(name, false)?;
        }
        Ok(())
    }

    /// The variable called `name`, if any
    pub fn get(&self, name: &str) -> Option<Var> {
        self.by_name.get(name).copied()
    }

    /// The name of `var`, if it was allocated here
    pub fn name(&self, var: Var) -> Option<&str> {
        self.names.get(var.index()).map(String::as_str)
    }

    /// true if `var` was created by [`VariableMap::fresh`]
    pub fn is_auxiliary(&self, var: Var) -> bool {
        self.auxiliary.contains(var.index())
    }

    /// All variables and their names, by increasing index
    pub fn iter(&self) -> impl Iterator<Item = (Var, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (Var::from_index(i), name.as_str()))
    }

    fn unique_name(&self, hint: &str) -> String {
        if !self.by_name.contains_key(hint) {
            return hint.to_owned();
        }
        (2..)
            .map(|i| format!("{}_{}", hint, i))
            .find(|name| !self.by_name.contains_key(name))
            .unwrap_or_else(|| unreachable!("infinitely many candidate names"))
    }

    fn allocate(&mut self, name: String, auxiliary: bool) -> Result<Var, EncodingError> {
        if self.names.len() >= self.limit {
            return Err(EncodingError::VariableAllocationExhausted {
                hint: name,
                limit: self.limit,
            });
        }
        let var = Var::from_index(self.names.len());
        if auxiliary {
            self.auxiliary.grow(var.index() + 1);
            self.auxiliary.insert(var.index());
        }
        self.by_name.insert(name.clone(), var);
        self.names.push(name);
        Ok(var)
    }
}

/// a random formula in NNF over `nvars` variables
#[cfg(test)]
pub fn random_nnf(rng: &mut impl rand::Rng, nvars: usize, depth: usize) -> Formula {
    if depth == 0 || rng.gen_ratio(1, 4) {
        return Formula::var(Var::from_index(rng.gen_range(0..nvars)), rng.gen());
    }
    let children = (0..rng.gen_range(0..4))
        .map(|_| random_nnf(rng, nvars, depth - 1))
        .collect();
    if rng.gen() {
        Formula::And(children)
    } else {
        Formula::Or(children)
    }
}

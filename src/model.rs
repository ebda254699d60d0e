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

//! Total assignments of variables
use fixedbitset::FixedBitSet;

use crate::cnf::{Cnf, Lit, Var};
use crate::formula::VariableMap;
use std::collections::BTreeMap;
use std::ops::Index;

#[derive(Clone, PartialOrd, Ord, PartialEq, Eq)]
/// Represents a model by the set of true variables
/// Can be indexed by `usize` (0-based), `cnf::Var` or `cnf::Lit`. In the last case,
/// returns whether the literal is true.
pub struct Model(pub FixedBitSet);

impl std::fmt::Debug for Model {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_set()
            .entries(self.0.ones().map(Var::from_index))
            .finish()
    }
}

impl Model {
    /// creates a model for a formula of `nvars` variables with all variables false
    pub fn empty(nvars: usize) -> Model {
        Self(FixedBitSet::with_capacity(nvars))
    }

    /// creates a model for `nvars` variables where exactly the positive literals of `lits` are
    /// true. Variables out of range are ignored.
    pub fn from_lits(lits: &[Lit], nvars: usize) -> Model {
        let mut x = Model::empty(nvars);
        for lit in lits.iter().filter(|l| l.is_positive() && l.var().index() < nvars) {
            x.set(lit.var(), true);
        }
        x
    }

    /// number of variables for the whole formula
    pub fn nvars(&self) -> usize {
        self.0.len()
    }

    /// set the specified variable to the specified value
    pub fn set_index(&mut self, index: usize, value: bool) {
        self.0.set(index, value)
    }

    /// set the specified variable to the specified value
    pub fn set(&mut self, var: Var, value: bool) {
        self.0.set(var.index(), value)
    }

    /// The value of non auxiliary variables of `vars`, as `name` or `-name`, separated by spaces.
    pub fn display_named(&self, vars: &VariableMap) -> String {
        vars.iter()
            .filter(|&(var, _)| !vars.is_auxiliary(var) && var.index() < self.nvars())
            .map(|(var, name)| {
                if self[var] {
                    name.to_owned()
                } else {
                    format!("-{}", name)
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The value of non auxiliary variables of `vars`, by name.
    pub fn named_values(&self, vars: &VariableMap) -> BTreeMap<String, bool> {
        vars.iter()
            .filter(|&(var, _)| !vars.is_auxiliary(var) && var.index() < self.nvars())
            .map(|(var, name)| (name.to_owned(), self[var]))
            .collect()
    }
}

impl Index<usize> for Model {
    type Output = bool;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl Index<Var> for Model {
    type Output = bool;

    fn index(&self, var: Var) -> &Self::Output {
        &self.0[var.index()]
    }
}

static TRUE: bool = true;
static FALSE: bool = false;
impl Index<Lit> for Model {
    type Output = bool;

    fn index(&self, literal: Lit) -> &Self::Output {
        let v = self[literal.var()];
        let res = v ^ literal.is_negative();
        if res {
            &TRUE
        } else {
            &FALSE
        }
    }
}

impl Model {
    /// returns the first model to iterate over all possible models with `next_model`
    pub fn first_model(nvars: usize) -> Model {
        Model::empty(nvars)
    }

    /// modifies a model in place to get to the next one, returns wether there are further models
    /// # Example
    /// ```
    /// use protocnf::model::Model;
    /// use protocnf::cnf::Lit;
    /// // iterate on and collect all models of 1 variable
    /// let mut model = Model::first_model(1);
    /// let mut all_models = Vec::new();
    /// loop {
    ///     // use the model
    ///     all_models.push(model.clone());
    ///     // iterate to next
    ///     if !model.next_model() {
    ///         break
    ///     }
    /// }
    /// assert_eq!(all_models, vec![Model::empty(1), Model::from_lits(&[Lit::from_dimacs(1)], 1)]);
    /// ```
    pub fn next_model(&mut self) -> bool {
        let l = self.0.len();
        if l == 0 {
            // the only model of no variables
            return false;
        }
        let s = self.0.as_mut_slice();
        let extra = l % 32;
        let blocks = l / 32 + if extra == 0 { 0 } else { 1 };
        let sentinel_for_last_block = if extra == 0 { 0 } else { 1 << extra };
        for (i, block) in s.iter_mut().enumerate() {
            *block = block.wrapping_add(1);
            let value = *block;
            if i == blocks - 1 {
                if value == sentinel_for_last_block {
                    *block = 0;
                    return false;
                } else {
                    return true;
                }
            } else if value != 0 {
                return true;
            }
        }
        unreachable!()
    }

    /// Checks wether the model satisfies a formula.
    pub fn satisfies(&self, formula: &Cnf) -> bool {
        formula
            .iter()
            .all(|clause| clause.literals().iter().any(|&lit| self[lit]))
    }
}

#[test]
fn test_satisfies() -> anyhow::Result<()> {
    let f = b"p cnf 3 3
-1 3 -2 0
-2 1 3 0
3 -1 -2 0
";
    let formula = Cnf::from(&varisat_dimacs::DimacsParser::parse(f as &[u8])?);
    let mut model = crate::model::Model::empty(3);
    assert!(model.satisfies(&formula));
    model.0.insert(0);
    model.0.insert(1);
    assert!(!model.satisfies(&formula));
    Ok(())
}

#[test]
fn no_variables() {
    let mut m = Model::first_model(0);
    assert!(m.satisfies(&Cnf::new()));
    assert!(!m.next_model());
}

#[test]
fn display_named_skips_auxiliary() -> anyhow::Result<()> {
    let mut vars = VariableMap::new();
    let a = vars.var("a")?;
    vars.fresh("s")?;
    vars.var("b")?;
    let mut m = Model::empty(3);
    m.set(a, true);
    m.set_index(1, true);
    assert_eq!(m.display_named(&vars), "a -b");
    let values = m.named_values(&vars);
    assert_eq!(values.len(), 2);
    assert_eq!(values["a"], true);
    assert_eq!(values["b"], false);
    Ok(())
}

#[test]
fn next_model_counts() {
    let mut m = Model::first_model(3);
    let mut n = 1;
    while m.next_model() {
        n += 1;
    }
    assert_eq!(n, 8);
    assert_eq!(m, Model::empty(3));
}

#[test]
fn next_model_carries_across_blocks() {
    let mut m = Model::empty(33);
    for i in 0..32 {
        m.set_index(i, true);
    }
    assert!(m.next_model());
    assert_eq!(m.0.ones().collect::<Vec<_>>(), vec![32]);
    assert!(m.next_model());
    assert_eq!(m.0.ones().collect::<Vec<_>>(), vec![0, 32]);
}

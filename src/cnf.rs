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

//! CNF formulas

use crate::formula::{Formula, VariableMap};
use crate::model::Model;
use anyhow::Context;
use fixedbitset::FixedBitSet;
use num_bigint::BigUint;
use num_traits::{One, Zero};
use std::io::Write;
pub use varisat_dimacs::{write_dimacs, DimacsParser};
pub use varisat_formula::{CnfFormula, ExtendFormula, Lit, Var};

/// A disjunction of literals.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Clause(Vec<Lit>);

impl Clause {
    /// Clause of these literals, in this order.
    pub fn new(lits: Vec<Lit>) -> Clause {
        Clause(lits)
    }

    /// The literals of the clause
    pub fn literals(&self) -> &[Lit] {
        &self.0
    }

    /// Number of literals
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The empty clause is false.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// true if the clause contains a literal and its negation
    pub fn is_tautology(&self) -> bool {
        self.0.iter().any(|&lit| self.0.contains(&!lit))
    }

    /// Disjunction of `self` and `other`, without duplicate literals.
    /// Returns None when the result is a tautology.
    /// `self` must not contain duplicates nor complementary literals.
    /// # Example
    /// ```
    /// use protocnf::cnf::{Clause, Lit};
    /// let c = |lits: &[isize]| Clause::new(lits.iter().map(|&l| Lit::from_dimacs(l)).collect());
    /// assert_eq!(c(&[1, -2]).merge(&c(&[3, 1])), Some(c(&[1, -2, 3])));
    /// assert_eq!(c(&[1, -2]).merge(&c(&[2])), None);
    /// ```
    pub fn merge(&self, other: &Clause) -> Option<Clause> {
        let mut lits = self.0.clone();
        for &lit in other.0.iter() {
            if lits.contains(&!lit) {
                return None;
            }
            if !lits.contains(&lit) {
                lits.push(lit);
            }
        }
        Some(Clause(lits))
    }

    /// Appends a literal at the end of the clause.
    #[must_use]
    pub fn with(mut self, lit: Lit) -> Clause {
        self.0.push(lit);
        self
    }
}

/// A conjunction of clauses.
///
/// Unlike [`Formula`], this type can only represent formulas in conjunctive normal form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cnf(Vec<Clause>);

impl Cnf {
    /// The empty conjunction, which is true.
    pub fn new() -> Cnf {
        Cnf(Vec::new())
    }

    /// The conjunction of these clauses, in this order.
    pub fn from_clauses(clauses: Vec<Clause>) -> Cnf {
        Cnf(clauses)
    }

    /// The clauses, in order
    pub fn clauses(&self) -> &[Clause] {
        &self.0
    }

    /// Iterates over clauses.
    pub fn iter(&self) -> std::slice::Iter<'_, Clause> {
        self.0.iter()
    }

    /// Number of clauses
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// true if there are no clauses
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Adds a clause at the end.
    pub fn push(&mut self, clause: Clause) {
        self.0.push(clause)
    }

    /// Adds all clauses of `other` at the end.
    pub fn extend(&mut self, other: Cnf) {
        self.0.extend(other.0)
    }

    /// Adds `lit` to every clause.
    ///
    /// When `lit` is assumed false, the result is equivalent to `self`. When it is assumed
    /// true, the result holds trivially.
    #[must_use]
    pub fn guarded(self, lit: Lit) -> Cnf {
        Cnf(self.0.into_iter().map(|c| c.with(lit)).collect())
    }

    /// One more than the largest variable index used in the clauses.
    pub fn var_count(&self) -> usize {
        self.0
            .iter()
            .flat_map(|c| c.0.iter())
            .map(|lit| lit.var().index() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Total number of literal occurrences
    pub fn literal_count(&self) -> usize {
        self.0.iter().map(Clause::len).sum()
    }

    /// The formula as a tree: an `And` of `Or` of literals.
    pub fn to_tree(&self) -> Formula {
        Formula::And(
            self.0
                .iter()
                .map(|c| Formula::Or(c.0.iter().map(|&lit| Formula::Lit(lit)).collect()))
                .collect(),
        )
    }

    /// Converts to the formula type of the dimacs backend, with at least `var_count` variables.
    pub fn to_dimacs_formula(&self, var_count: usize) -> CnfFormula {
        let mut f = CnfFormula::new();
        f.set_var_count(std::cmp::max(var_count, self.var_count()));
        for clause in self.0.iter() {
            f.add_clause(clause.literals());
        }
        f
    }
}

impl IntoIterator for Cnf {
    type Item = Clause;
    type IntoIter = std::vec::IntoIter<Clause>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Cnf {
    type Item = &'a Clause;
    type IntoIter = std::slice::Iter<'a, Clause>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<&CnfFormula> for Cnf {
    fn from(f: &CnfFormula) -> Cnf {
        Cnf(f.iter().map(|c| Clause(c.to_vec())).collect())
    }
}

/// Writes `cnf` in dimacs format, preceded by one comment line `c <dimacs> <name>` per
/// variable of `vars`.
pub fn write_named_dimacs<W: Write>(
    mut out: W,
    cnf: &Cnf,
    vars: &VariableMap,
) -> anyhow::Result<()> {
    for (var, name) in vars.iter() {
        writeln!(out, "c {} {}", var.to_dimacs(), name).context("writing variable names")?;
    }
    write_dimacs(&mut out, &cnf.to_dimacs_formula(vars.len())).context("writing dimacs clauses")?;
    Ok(())
}

/// Maximum number of unassumed variables for [`brute_force_solve`] and [`brute_force_count`]
pub const BRUTE_FORCE_MAX_FREE_VARS: usize = 24;

/// Calls `visit` on the models of `cnf` over `var_count` variables where all `assumptions`
/// hold, in counter order of the unassumed variables, until it returns false.
fn brute_force_models(
    cnf: &Cnf,
    var_count: usize,
    assumptions: &[Lit],
    mut visit: impl FnMut(&Model) -> bool,
) -> anyhow::Result<()> {
    let var_count = std::cmp::max(var_count, cnf.var_count());
    let mut base = Model::empty(var_count);
    let mut assumed = FixedBitSet::with_capacity(var_count);
    for &lit in assumptions {
        let index = lit.var().index();
        anyhow::ensure!(
            index < var_count,
            "assumption {} on a formula of {} variables",
            lit,
            var_count
        );
        if assumed[index] && base[lit.var()] != lit.is_positive() {
            // contradictory assumptions
            return Ok(());
        }
        assumed.insert(index);
        base.set(lit.var(), lit.is_positive());
    }
    let free: Vec<usize> = (0..var_count).filter(|&i| !assumed[i]).collect();
    anyhow::ensure!(
        free.len() <= BRUTE_FORCE_MAX_FREE_VARS,
        "{} unassumed variables, brute force is limited to {}",
        free.len(),
        BRUTE_FORCE_MAX_FREE_VARS
    );
    let mut counter = Model::first_model(free.len());
    loop {
        let mut m = base.clone();
        for (bit, &index) in free.iter().enumerate() {
            m.set_index(index, counter[bit]);
        }
        if m.satisfies(cnf) && !visit(&m) {
            return Ok(());
        }
        if !counter.next_model() {
            return Ok(());
        }
    }
}

/// Looks for a model of `cnf` over `var_count` variables where all `assumptions` hold, by
/// testing all assignments of the other variables sequentially.
///
/// Returns the first model found, or None if there is none. Errors out when more than
/// [`BRUTE_FORCE_MAX_FREE_VARS`] variables are left unassumed.
pub fn brute_force_solve(
    cnf: &Cnf,
    var_count: usize,
    assumptions: &[Lit],
) -> anyhow::Result<Option<Model>> {
    let mut found = None;
    brute_force_models(cnf, var_count, assumptions, |m| {
        found = Some(m.clone());
        false
    })?;
    Ok(found)
}

/// Counts the models of `cnf` over `var_count` variables where all `assumptions` hold, by
/// testing all assignments of the other variables.
///
/// Errors out when more than [`BRUTE_FORCE_MAX_FREE_VARS`] variables are left unassumed.
/// # Example
/// ```
/// use protocnf::cnf::{brute_force_count, Clause, Cnf, Lit};
/// // 1 | 2
/// let cnf = Cnf::from_clauses(vec![Clause::new(vec![Lit::from_dimacs(1), Lit::from_dimacs(2)])]);
/// assert_eq!(brute_force_count(&cnf, 2, &[]).unwrap(), 3u32.into());
/// assert_eq!(brute_force_count(&cnf, 3, &[Lit::from_dimacs(-1)]).unwrap(), 2u32.into());
/// ```
pub fn brute_force_count(
    cnf: &Cnf,
    var_count: usize,
    assumptions: &[Lit],
) -> anyhow::Result<BigUint> {
    let mut count = BigUint::zero();
    brute_force_models(cnf, var_count, assumptions, |_| {
        count += BigUint::one();
        true
    })?;
    Ok(count)
}

/// returns a random 3sat cnf formula with specified number of variables and clauses
#[cfg(test)]
pub fn generate_random_3sat(nvars: usize, nclauses: usize) -> Cnf {
    let mut rng = rand::thread_rng();
    let mut f = Cnf::new();
    for _ in 0..nclauses {
        let chosen = rand::seq::index::sample(&mut rng, nvars, 3);
        f.push(Clause(
            chosen
                .iter()
                .map(|v| Lit::from_var(Var::from_index(v), rand::random()))
                .collect(),
        ));
    }
    f
}

#[cfg(test)]
mod test {
    use super::*;

    fn lits(l: &[isize]) -> Vec<Lit> {
        l.iter().map(|&x| Lit::from_dimacs(x)).collect()
    }

    #[test]
    fn dimacs_roundtrip_keeps_clause_order() -> anyhow::Result<()> {
        let f = b"p cnf 3 3
-1 3 -2 0
-2 1 3 0
3 -1 -2 0
";
        let formula = DimacsParser::parse(f as &[u8])?;
        let cnf = Cnf::from(&formula);
        assert_eq!(cnf.len(), 3);
        assert_eq!(cnf.clauses()[1].literals(), &lits(&[-2, 1, 3])[..]);
        assert_eq!(cnf.to_dimacs_formula(3), formula);
        Ok(())
    }

    #[test]
    fn named_dimacs() -> anyhow::Result<()> {
        let mut vars = VariableMap::new();
        vars.var("a")?;
        vars.fresh("s")?;
        let cnf = Cnf::from_clauses(vec![Clause::new(lits(&[1, -2]))]);
        let mut out = Vec::new();
        write_named_dimacs(&mut out, &cnf, &vars)?;
        assert_eq!(
            String::from_utf8(out)?,
            "c 1 a\nc 2 s\np cnf 2 1\n1 -2 0\n"
        );
        Ok(())
    }

    #[test]
    fn guarded_appends_last() {
        let cnf = Cnf::from_clauses(vec![Clause::new(lits(&[1])), Clause::new(lits(&[2, 3]))]);
        let g = cnf.guarded(Lit::from_dimacs(-4));
        assert_eq!(g.clauses()[0].literals(), &lits(&[1, -4])[..]);
        assert_eq!(g.clauses()[1].literals(), &lits(&[2, 3, -4])[..]);
        assert_eq!(g.literal_count(), 5);
    }

    #[test]
    fn brute_force_with_assumptions() -> anyhow::Result<()> {
        // (1 | 2) & (!1 | 3)
        let cnf = Cnf::from_clauses(vec![Clause::new(lits(&[1, 2])), Clause::new(lits(&[-1, 3]))]);
        let m = brute_force_solve(&cnf, 3, &lits(&[1]))?.expect("satisfiable");
        assert!(m[Var::from_dimacs(1)] && m[Var::from_dimacs(3)]);
        assert!(brute_force_solve(&cnf, 3, &lits(&[1, -3]))?.is_none());
        assert!(brute_force_solve(&cnf, 3, &lits(&[1, -1]))?.is_none());
        // all variables assumed
        assert!(brute_force_solve(&cnf, 3, &lits(&[-1, 2, -3]))?.is_some());
        assert!(brute_force_solve(&cnf, 3, &lits(&[4])).is_err());
        Ok(())
    }

    #[test]
    fn brute_force_agrees_with_exhaustive_check() -> anyhow::Result<()> {
        for _ in 0..20 {
            let cnf = generate_random_3sat(5, 25);
            let found = brute_force_solve(&cnf, 5, &[])?;
            let mut m = Model::first_model(5);
            let mut exists = false;
            loop {
                exists |= m.satisfies(&cnf);
                if !m.next_model() {
                    break;
                }
            }
            assert_eq!(found.is_some(), exists);
            if let Some(model) = found {
                assert!(model.satisfies(&cnf));
            }
        }
        Ok(())
    }

    #[test]
    fn brute_force_counts() -> anyhow::Result<()> {
        // (1 | 2) & (!1 | 3)
        let cnf = Cnf::from_clauses(vec![Clause::new(lits(&[1, 2])), Clause::new(lits(&[-1, 3]))]);
        assert_eq!(brute_force_count(&cnf, 3, &[])?, 4u32.into());
        assert_eq!(brute_force_count(&cnf, 3, &lits(&[1]))?, 2u32.into());
        assert_eq!(brute_force_count(&cnf, 4, &lits(&[1]))?, 4u32.into());
        assert_eq!(brute_force_count(&cnf, 3, &lits(&[1, -1]))?, BigUint::zero());
        assert_eq!(brute_force_count(&Cnf::new(), 0, &[])?, BigUint::one());
        assert!(brute_force_count(&cnf, BRUTE_FORCE_MAX_FREE_VARS + 1, &[]).is_err());
        Ok(())
    }

    #[test]
    fn tautology() {
        assert!(Clause::new(lits(&[1, 2, -1])).is_tautology());
        assert!(!Clause::new(lits(&[1, 2])).is_tautology());
    }
}

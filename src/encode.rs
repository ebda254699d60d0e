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

//! Selector-guarded CNF encoding of proto-CNF formulas.
//!
//! A proto-CNF formula is a conjunction of arbitrary formulas in negation normal form. Each
//! conjunct `C_i` gets a fresh selector variable `a_i` and is encoded as the clauses of `C_i`
//! guarded by `!a_i` followed by the clauses of `!C_i` guarded by `a_i`. Together they make
//! `a_i` equivalent to `C_i`, so that an assumption on `a_i` enables (`a_i`), negates (`!a_i`)
//! or drops (no assumption) the conjunct without encoding the formula again.

use crate::cnf::{Clause, Cnf, Lit, Var};
use crate::distribute::distribute;
use crate::error::EncodingError;
use crate::formula::{Formula, VariableMap};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::trace;

/// Selector variable of each conjunct, by 1-based conjunct index
pub type Selectors = BTreeMap<usize, Var>;

/// Prefix of the names of selector variables
pub const SELECTOR_PREFIX: &str = "__selector_";
/// Name of the root variable
pub const ROOT_NAME: &str = "__root";

/// The clauses encoding one conjunct
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardedConjunct {
    /// clauses of the conjunct, each with the negative selector literal appended
    pub holds: Cnf,
    /// clauses of the negation of the conjunct, each with the positive selector literal appended
    pub fails: Cnf,
}

impl GuardedConjunct {
    /// Number of clauses
    pub fn len(&self) -> usize {
        self.holds.len() + self.fails.len()
    }

    /// true if neither the conjunct nor its negation produced a clause
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Encodes one conjunct, which must be in negation normal form, guarded by `selector`.
///
/// Allocates no variable. Fails only when the conjunct is not in negation normal form.
pub fn encode_conjunct(conjunct: &Formula, selector: Var) -> Result<GuardedConjunct, EncodingError> {
    let holds = distribute(conjunct)?.guarded(Lit::from_var(selector, false));
    let fails = distribute(&conjunct.negated_nnf())?.guarded(Lit::from_var(selector, true));
    Ok(GuardedConjunct { holds, fails })
}

/// Result of [`encode`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoding {
    /// The clauses
    pub cnf: Cnf,
    /// The selector of each conjunct
    pub selectors: Selectors,
    /// Assuming this variable true enables all conjuncts
    pub root: Var,
}

/// Encodes a proto-CNF formula: `root` must be a conjunction of formulas in negation normal
/// form.
///
/// Allocates from `vars` one selector per conjunct, in order, then the root variable. Clauses
/// come conjunct by conjunct, those of the conjunct before those of its negation, then one
/// clause `!root | a_i` per selector. Nothing forces the selectors: they are only pinned by
/// assumptions of the caller.
///
/// On error, no clause is returned, and `vars` may contain variables allocated for the failed
/// encoding.
///
/// Like [`distribute`], this recurses once per nesting level of each conjunct.
pub fn encode(root: &Formula, vars: &mut VariableMap) -> Result<Encoding, EncodingError> {
    let conjuncts = match root {
        Formula::And(conjuncts) => conjuncts,
        other => {
            return Err(EncodingError::NotProtoCnf {
                kind: other.kind(),
                root: other.clone(),
            })
        }
    };
    let encode_span = tracing::trace_span!("encode", timing = true).entered();
    vars.cover(root)?;
    let mut selectors = Selectors::new();
    for index in 1..=conjuncts.len() {
        let selector = vars.fresh(&format!("{}{}", SELECTOR_PREFIX, index))?;
        selectors.insert(index, selector);
    }
    let root_var = vars.fresh(ROOT_NAME)?;
    let mut cnf = Cnf::new();
    for ((&index, &selector), conjunct) in selectors.iter().zip(conjuncts.iter()) {
        let guarded = encode_conjunct(conjunct, selector).map_err(|e| e.in_conjunct(index))?;
        trace!(
            conjunct = index,
            holds_clauses = guarded.holds.len() as u64,
            fails_clauses = guarded.fails.len() as u64,
            stats = true
        );
        cnf.extend(guarded.holds);
        cnf.extend(guarded.fails);
    }
    for &selector in selectors.values() {
        cnf.push(Clause::new(vec![
            Lit::from_var(root_var, false),
            Lit::from_var(selector, true),
        ]));
    }
    drop(encode_span);
    trace!(
        conjuncts = conjuncts.len() as u64,
        clauses = cnf.len() as u64,
        literals = cnf.literal_count() as u64,
        variables = vars.len() as u64,
        stats = true
    );
    Ok(Encoding {
        cnf,
        selectors,
        root: root_var,
    })
}

impl Encoding {
    /// Number of conjuncts of the encoded formula
    pub fn conjuncts(&self) -> usize {
        self.selectors.len()
    }

    /// Assumptions on selectors: conjuncts listed in `negated` must be false, those in `free`
    /// are unconstrained, all others must be true. Indices are 1-based.
    /// # Example
    /// ```
    /// use protocnf::formula::{Formula, VariableMap};
    /// use protocnf::encode::encode;
    /// let mut vars = VariableMap::new();
    /// let x = Formula::var(vars.var("x").unwrap(), true);
    /// let y = Formula::var(vars.var("y").unwrap(), false);
    /// let e = encode(&Formula::And(vec![x, y]), &mut vars).unwrap();
    /// let a1 = e.selector_lit(1).unwrap();
    /// let a2 = e.selector_lit(2).unwrap();
    /// assert_eq!(e.assumptions(&[2], &[]).unwrap(), vec![a1, !a2]);
    /// assert_eq!(e.assumptions(&[], &[1]).unwrap(), vec![a2]);
    /// ```
    pub fn assumptions(&self, negated: &[usize], free: &[usize]) -> anyhow::Result<Vec<Lit>> {
        for &index in negated.iter().chain(free.iter()) {
            anyhow::ensure!(
                self.selectors.contains_key(&index),
                "no conjunct {}: conjuncts are numbered from 1 to {}",
                index,
                self.conjuncts()
            );
        }
        if let Some(index) = negated.iter().find(|i| free.contains(i)) {
            anyhow::bail!("conjunct {} cannot be both negated and free", index);
        }
        Ok(self
            .selectors
            .iter()
            .filter(|(index, _)| !free.contains(index))
            .map(|(index, &selector)| Lit::from_var(selector, !negated.contains(index)))
            .collect())
    }

    /// [`Encoding::assumptions`] followed by the negative root literal.
    ///
    /// Every selector is equivalent to its conjunct and a false root satisfies all root
    /// clauses, so models of the encoding under these assumptions are in one to one
    /// correspondence with the assignments of the input variables satisfying the constraints
    /// on conjuncts. Without it, the root would double the count when all selectors hold.
    pub fn counting_assumptions(&self, negated: &[usize], free: &[usize]) -> anyhow::Result<Vec<Lit>> {
        let mut res = self.assumptions(negated, free)?;
        res.push(Lit::from_var(self.root, false));
        Ok(res)
    }

    /// The positive literal of the selector of conjunct `index`
    pub fn selector_lit(&self, index: usize) -> Option<Lit> {
        self.selectors
            .get(&index)
            .map(|&selector| Lit::from_var(selector, true))
    }

    /// A serializable description of the encoding, with variables as dimacs numbers.
    pub fn summary(&self, vars: &VariableMap) -> EncodingSummary {
        EncodingSummary {
            conjuncts: self.conjuncts(),
            clauses: self.cnf.len(),
            literals: self.cnf.literal_count(),
            variables: vars.len(),
            selectors: self
                .selectors
                .iter()
                .map(|(&index, var)| (index, var.to_dimacs()))
                .collect(),
            root: self.root.to_dimacs(),
        }
    }
}

/// Size and selectors of an encoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodingSummary {
    /// number of conjuncts
    pub conjuncts: usize,
    /// number of clauses
    pub clauses: usize,
    /// number of literal occurrences
    pub literals: usize,
    /// number of variables, including selectors and root
    pub variables: usize,
    /// dimacs number of the selector of each conjunct
    pub selectors: BTreeMap<usize, isize>,
    /// dimacs number of the root variable
    pub root: isize,
}

impl std::fmt::Display for EncodingSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Conjuncts: {}, Clauses: {}, Literals: {}, Variables: {}, Root: {}",
            self.conjuncts, self.clauses, self.literals, self.variables, self.root
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cnf::{brute_force_count, brute_force_solve};
    use crate::formula::random_nnf;
    use crate::model::Model;

    /// x, y, z and the formula (x | y) & !z
    fn scenario() -> (VariableMap, Formula) {
        let mut vars = VariableMap::new();
        let x = Formula::var(vars.var("x").unwrap(), true);
        let y = Formula::var(vars.var("y").unwrap(), true);
        let z = Formula::var(vars.var("z").unwrap(), true);
        let f = Formula::And(vec![Formula::Or(vec![x, y]), z.negate()]);
        (vars, f.nnf())
    }

    #[test]
    fn concrete_scenario() -> anyhow::Result<()> {
        let (mut vars, f) = scenario();
        let e = encode(&f, &mut vars)?;
        assert_eq!(e.selectors.len(), 2);
        assert_eq!(vars.len(), 6);
        assert_eq!(vars.name(e.selectors[&1]), Some("__selector_1"));
        assert_eq!(vars.name(e.root), Some("__root"));
        let mut inputs = Model::first_model(3);
        loop {
            let mut m = Model::empty(vars.len());
            for i in 0..3 {
                m.set_index(i, inputs[i]);
            }
            m.set(e.selectors[&1], true);
            m.set(e.selectors[&2], true);
            let expected = (inputs[0] || inputs[1]) && !inputs[2];
            assert_eq!(m.satisfies(&e.cnf), expected, "{:?}", &inputs);
            if !inputs.next_model() {
                break;
            }
        }
        Ok(())
    }

    #[test]
    fn clause_order() -> anyhow::Result<()> {
        let (mut vars, f) = scenario();
        let e = encode(&f, &mut vars)?;
        // x | y, then !x and !y, then !z, then z, then root clauses
        let expected = "((1 | 2 | !4) & (!1 | 4) & (!2 | 4) & (!3 | !5) & (3 | 5) & (!6 | 4) & (!6 | 5))";
        assert_eq!(e.cnf.to_tree().to_string(), expected);
        Ok(())
    }

    #[test]
    fn rejects_non_conjunction() {
        let (mut vars, f) = scenario();
        let or = match f {
            Formula::And(children) => Formula::Or(children),
            _ => unreachable!(),
        };
        let before = vars.len();
        match encode(&or, &mut vars) {
            Err(EncodingError::NotProtoCnf { kind, root }) => {
                assert_eq!(kind, "disjunction");
                assert_eq!(root, or);
            }
            other => panic!("expected NotProtoCnf, got {:?}", other),
        }
        assert_eq!(vars.len(), before);
    }

    #[test]
    fn reports_failing_conjunct() {
        let (mut vars, f) = scenario();
        let bad = f.clone().negate();
        let root = Formula::And(vec![f.clone(), bad.clone()]);
        assert_eq!(
            encode(&root, &mut vars),
            Err(EncodingError::DistributionFailed {
                conjunct: Some(2),
                formula: bad
            })
        );
    }

    #[test]
    fn selectors_exhaust_the_allocator() -> anyhow::Result<()> {
        let (_, f) = scenario();
        // room for x, y, z and one selector
        let mut vars = VariableMap::with_limit(4);
        vars.cover(&f)?;
        assert_eq!(
            encode(&f, &mut vars),
            Err(EncodingError::VariableAllocationExhausted {
                hint: "__selector_2".to_owned(),
                limit: 4
            })
        );
        // one more is still too few for the root
        let mut vars = VariableMap::with_limit(5);
        match encode(&f, &mut vars) {
            Err(EncodingError::VariableAllocationExhausted { hint, limit: 5 }) => {
                assert_eq!(hint, ROOT_NAME)
            }
            other => panic!("expected VariableAllocationExhausted, got {:?}", other),
        }
        assert!(encode(&f, &mut VariableMap::with_limit(6)).is_ok());
        Ok(())
    }

    #[test]
    fn empty_conjunction() -> anyhow::Result<()> {
        let mut vars = VariableMap::new();
        let e = encode(&Formula::top(), &mut vars)?;
        assert!(e.cnf.is_empty());
        assert!(e.selectors.is_empty());
        assert_eq!(vars.len(), 1);
        Ok(())
    }

    #[test]
    fn deterministic() -> anyhow::Result<()> {
        let mut rng = rand::thread_rng();
        let f = Formula::And((0..5).map(|_| random_nnf(&mut rng, 4, 3)).collect());
        let mut vars1 = VariableMap::new();
        let mut vars2 = VariableMap::new();
        assert_eq!(encode(&f, &mut vars1)?, encode(&f, &mut vars2)?);
        Ok(())
    }

    #[test]
    fn selectors_are_equivalent_to_their_conjunct() -> anyhow::Result<()> {
        let mut rng = rand::thread_rng();
        let nvars = 4;
        for _ in 0..30 {
            let conjuncts: Vec<Formula> = (0..3).map(|_| random_nnf(&mut rng, nvars, 3)).collect();
            let mut vars = VariableMap::new();
            for i in 0..nvars {
                vars.var(&format!("v{}", i))?;
            }
            let e = encode(&Formula::And(conjuncts.clone()), &mut vars)?;
            let mut inputs = Model::first_model(nvars);
            loop {
                // a_i = C_i is the only satisfying choice of selectors
                let values: Vec<bool> = conjuncts.iter().map(|c| c.eval(&inputs)).collect();
                let mut choice = Model::first_model(conjuncts.len());
                loop {
                    let mut m = Model::empty(vars.len());
                    for i in 0..nvars {
                        m.set_index(i, inputs[i]);
                    }
                    for (i, &selector) in e.selectors.values().enumerate() {
                        m.set(selector, choice[i]);
                    }
                    let expected = (0..conjuncts.len()).all(|i| choice[i] == values[i]);
                    assert_eq!(m.satisfies(&e.cnf), expected);
                    if !choice.next_model() {
                        break;
                    }
                }
                if !inputs.next_model() {
                    break;
                }
            }
        }
        Ok(())
    }

    #[test]
    fn asserting_a_selector_is_equisatisfiable() -> anyhow::Result<()> {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let c = random_nnf(&mut rng, 4, 4);
            let mut vars = VariableMap::new();
            let e = encode(&Formula::And(vec![c.clone()]), &mut vars)?;
            let a = e.selector_lit(1).expect("one conjunct");
            let mut sat = false;
            let mut unsat_negation = true;
            let mut m = Model::first_model(4);
            loop {
                sat |= c.eval(&m);
                unsat_negation &= c.eval(&m);
                if !m.next_model() {
                    break;
                }
            }
            assert_eq!(brute_force_solve(&e.cnf, vars.len(), &[a])?.is_some(), sat);
            assert_eq!(
                brute_force_solve(&e.cnf, vars.len(), &[!a])?.is_some(),
                !unsat_negation
            );
        }
        Ok(())
    }

    #[test]
    fn size_does_not_depend_on_siblings() -> anyhow::Result<()> {
        let mut rng = rand::thread_rng();
        let c = random_nnf(&mut rng, 6, 4);
        let single = encode_conjunct(&c, Var::from_index(100))?.len();
        for n in [1usize, 2, 8, 32].iter().copied() {
            let mut vars = VariableMap::new();
            let e = encode(&Formula::And(vec![c.clone(); n]), &mut vars)?;
            assert_eq!(e.cnf.len(), n * (single + 1));
        }
        Ok(())
    }

    #[test]
    fn root_enables_everything() -> anyhow::Result<()> {
        let (mut vars, f) = scenario();
        let e = encode(&f, &mut vars)?;
        let root = Lit::from_var(e.root, true);
        let m = brute_force_solve(&e.cnf, vars.len(), &[root])?.expect("satisfiable");
        assert!(f.eval(&m));
        // selectors are not forced without assumptions
        let negated = e.assumptions(&[1, 2], &[])?;
        assert!(brute_force_solve(&e.cnf, vars.len(), &negated)?.is_some());
        let mut with_root = negated.clone();
        with_root.push(root);
        assert!(brute_force_solve(&e.cnf, vars.len(), &with_root)?.is_none());
        Ok(())
    }

    #[test]
    fn assumptions() -> anyhow::Result<()> {
        let (mut vars, f) = scenario();
        let e = encode(&f, &mut vars)?;
        let a1 = e.selector_lit(1).expect("conjunct 1");
        let a2 = e.selector_lit(2).expect("conjunct 2");
        assert_eq!(e.assumptions(&[], &[])?, vec![a1, a2]);
        assert_eq!(e.assumptions(&[1], &[2])?, vec![!a1]);
        assert!(e.assumptions(&[3], &[]).is_err());
        assert!(e.assumptions(&[], &[0]).is_err());
        assert!(e.assumptions(&[1], &[1]).is_err());
        Ok(())
    }

    #[test]
    fn counts_match_the_formula() -> anyhow::Result<()> {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let conjuncts: Vec<Formula> = (0..3).map(|_| random_nnf(&mut rng, 4, 3)).collect();
            let f = Formula::And(conjuncts.clone());
            let mut vars = VariableMap::new();
            vars.cover(&Formula::var(Var::from_index(3), true))?;
            let e = encode(&f, &mut vars)?;
            // conjunct 2 negated, conjunct 3 free
            let assumptions = e.counting_assumptions(&[2], &[3])?;
            let mut expected = 0u32;
            let mut m = Model::first_model(4);
            loop {
                if conjuncts[0].eval(&m) && !conjuncts[1].eval(&m) {
                    expected += 1;
                }
                if !m.next_model() {
                    break;
                }
            }
            assert_eq!(
                brute_force_count(&e.cnf, vars.len(), &assumptions)?,
                expected.into(),
                "{}",
                f
            );
        }
        // all conjuncts enabled: the root does not double the count
        let (mut vars, f) = scenario();
        let e = encode(&f, &mut vars)?;
        // (x | y) & !z
        assert_eq!(
            brute_force_count(&e.cnf, vars.len(), &e.counting_assumptions(&[], &[])?)?,
            3u32.into()
        );
        assert_eq!(
            brute_force_count(&e.cnf, vars.len(), &e.assumptions(&[], &[])?)?,
            6u32.into()
        );
        Ok(())
    }

    #[test]
    fn summary() -> anyhow::Result<()> {
        let (mut vars, f) = scenario();
        let e = encode(&f, &mut vars)?;
        let s = e.summary(&vars);
        assert_eq!(s.selectors.get(&2), Some(&5));
        assert_eq!(s.root, 6);
        assert_eq!(
            serde_json::to_string(&s)?,
            r#"{"conjuncts":2,"clauses":7,"literals":15,"variables":6,"selectors":{"1":4,"2":5},"root":6}"#
        );
        Ok(())
    }
}

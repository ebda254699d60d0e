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

//! Local CNF conversion by distribution of disjunctions over conjunctions.
//!
//! The size of the result is exponential in the number of disjunctions nested above
//! conjunctions. It is meant for one conjunct of a proto-CNF formula at a time, never for a
//! whole formula.

use crate::cnf::{Clause, Cnf};
use crate::error::EncodingError;
use crate::formula::Formula;
use itertools::Itertools;

/// Converts a formula in negation normal form to an equivalent CNF formula.
///
/// Clauses come out in the order of the formula: children of a conjunction one after the
/// other, and for a disjunction the cross product of the clauses of its children, leftmost
/// child varying slowest. Duplicate literals inside a clause are removed and tautological
/// clauses are dropped.
///
/// Fails with [`EncodingError::DistributionFailed`] if the formula contains a negation node.
///
/// Recursion depth is the nesting depth of the formula, which callers must bound. Formulas
/// read by [`crate::format::TextFormat`] nest at most a small multiple of
/// [`crate::format::MAX_NESTING`] levels.
/// # Example
/// ```
/// use protocnf::formula::Formula;
/// use protocnf::cnf::Lit;
/// use protocnf::distribute::distribute;
/// let l = |i| Formula::Lit(Lit::from_dimacs(i));
/// // 1 | (2 & 3)
/// let f = Formula::Or(vec![l(1), Formula::And(vec![l(2), l(3)])]);
/// let cnf = distribute(&f).unwrap();
/// assert_eq!(cnf.to_tree().to_string(), "((1 | 2) & (1 | 3))");
/// ```
pub fn distribute(formula: &Formula) -> Result<Cnf, EncodingError> {
    Ok(Cnf::from_clauses(clauses(formula)?))
}

fn clauses(formula: &Formula) -> Result<Vec<Clause>, EncodingError> {
    match formula {
        Formula::Lit(lit) => Ok(vec![Clause::new(vec![*lit])]),
        Formula::And(children) => {
            let mut res = Vec::new();
            for child in children {
                res.extend(clauses(child)?);
            }
            Ok(res)
        }
        Formula::Or(children) => {
            // the empty disjunction is the empty clause
            let mut res = vec![Clause::default()];
            for child in children {
                let alternatives = clauses(child)?;
                res = res
                    .iter()
                    .cartesian_product(alternatives.iter())
                    .filter_map(|(left, right)| left.merge(right))
                    .collect();
            }
            Ok(res)
        }
        Formula::Not(_) => Err(EncodingError::DistributionFailed {
            conjunct: None,
            formula: formula.clone(),
        }),
    }
}

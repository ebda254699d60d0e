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

//! Errors of the proto-CNF encoder

use crate::formula::Formula;
use thiserror::Error;

/// Why encoding a formula failed.
///
/// Every variant carries what is needed to reproduce the failure: the offending (sub)formula,
/// the conjunct it comes from, or the allocation that could not be served.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// The root of the formula is not a conjunction.
    #[error("expected a conjunction at the root of a proto-CNF formula, found a {kind}: {root}")]
    NotProtoCnf {
        /// what was found instead of a conjunction
        kind: &'static str,
        /// the rejected root
        root: Formula,
    },
    /// A subformula outside of {and, or, literal} reached the distributor.
    #[error("cannot distribute {formula}: not in negation normal form{}", conjunct_suffix(.conjunct))]
    DistributionFailed {
        /// 1-based index of the conjunct, when known
        conjunct: Option<usize>,
        /// the subformula that could not be distributed
        formula: Formula,
    },
    /// The variable allocator is full.
    #[error("cannot allocate variable {hint}: all {limit} variables are used")]
    VariableAllocationExhausted {
        /// name requested for the variable
        hint: String,
        /// maximum number of variables of the allocator
        limit: usize,
    },
}

fn conjunct_suffix(conjunct: &Option<usize>) -> String {
    match conjunct {
        Some(index) => format!(" (conjunct {})", index),
        None => String::new(),
    }
}

impl EncodingError {
    /// Attributes a distribution failure to the conjunct with this 1-based index.
    /// Other errors are returned unchanged.
    pub fn in_conjunct(self, index: usize) -> Self {
        match self {
            EncodingError::DistributionFailed { formula, .. } => {
                EncodingError::DistributionFailed {
                    conjunct: Some(index),
                    formula,
                }
            }
            e => e,
        }
    }
}

#[test]
fn messages() {
    use crate::cnf::{Lit, Var};
    let x = Formula::Lit(Lit::from_var(Var::from_index(0), true));
    let e = EncodingError::DistributionFailed {
        conjunct: None,
        formula: Formula::Not(Box::new(x)),
    }
    .in_conjunct(3);
    assert_eq!(
        e.to_string(),
        "cannot distribute !1: not in negation normal form (conjunct 3)"
    );
}

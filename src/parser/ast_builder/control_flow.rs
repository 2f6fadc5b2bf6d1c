/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Operand-shape building for BRA/FCA (register-or-expression target, with
//! an optional explicit base register) and BRR/FCR (PC-relative label
//! target). RET carries no operands and is built directly by the dispatcher.

use crate::ast::{Location, OperandBag};
use crate::errors::AssemblyError;

use super::operand_builders::RawOperand;
use super::validators::*;

/// `BRA|FCA [Rx,] Vy` -- a bare target defaults `Rx` to `ZERO` at encode
/// time (absolute addressing); giving `Rx` makes it register-relative.
pub fn build_branch(raws: &[RawOperand], loc: &Location) -> Result<OperandBag, AssemblyError> {
    want_arity_range(raws, 1, 2, loc)?;
    let (rx, vy) = if raws.len() == 1 {
        (None, want_reg_or_expr(&raws[0], loc)?)
    } else {
        (Some(want_reg(&raws[0], loc)?), want_reg_or_expr(&raws[1], loc)?)
    };
    Ok(OperandBag { rx, vy: Some(vy), ..Default::default() })
}

/// `BRR|FCR Label` -- always a single PC-relative expression.
pub fn build_branch_rel(raws: &[RawOperand], loc: &Location) -> Result<OperandBag, AssemblyError> {
    want_arity(raws, 1, loc)?;
    let target = want_expr(&raws[0], loc)?;
    Ok(OperandBag { target: Some(target), ..Default::default() })
}

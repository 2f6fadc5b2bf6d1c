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

//! Operand-shape building for XOR/AND/ORR and the pseudo `INV`.

use crate::ast::{Location, OperandBag};
use crate::errors::AssemblyError;

use super::operand_builders::RawOperand;
use super::validators::*;

/// `[Rd,] Rx, Vy` -- same shape as ADD/SUB, without the INC/DEC fold.
pub fn build_bitwise(raws: &[RawOperand], loc: &Location) -> Result<OperandBag, AssemblyError> {
    want_arity_range(raws, 2, 3, loc)?;
    let (rd, rx, vy) = if raws.len() == 2 {
        (None, want_reg(&raws[0], loc)?, want_reg_or_expr(&raws[1], loc)?)
    } else {
        (Some(want_reg(&raws[0], loc)?), want_reg(&raws[1], loc)?, want_reg_or_expr(&raws[2], loc)?)
    };
    Ok(OperandBag { rd, rx: Some(rx), vy: Some(vy), ..Default::default() })
}

/// `INV Rx` -- lowers to `XOR Rx, -1`.
pub fn build_inv(raws: &[RawOperand], loc: &Location) -> Result<OperandBag, AssemblyError> {
    want_arity(raws, 1, loc)?;
    let rx = want_reg(&raws[0], loc)?;
    Ok(OperandBag { rx: Some(rx), ..Default::default() })
}

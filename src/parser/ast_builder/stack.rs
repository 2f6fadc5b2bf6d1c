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

//! Operand-shape building for PSH/POP (register set, optional explicit
//! stack-pointer override) and the pseudo `SWP`.

use crate::ast::{Location, OperandBag};
use crate::errors::AssemblyError;

use super::operand_builders::RawOperand;
use super::validators::*;

/// `PSH|POP [Rd,] {regset}` -- `Rd` defaults to `SP` when omitted.
pub fn build_psh_pop(raws: &[RawOperand], loc: &Location) -> Result<OperandBag, AssemblyError> {
    want_arity_range(raws, 1, 2, loc)?;
    let (rd, regset_op) = if raws.len() == 1 {
        (None, &raws[0])
    } else {
        (Some(want_reg(&raws[0], loc)?), &raws[1])
    };
    let RawOperand::RegSet(regs, cross) = regset_op else {
        return Err(AssemblyError::SyntaxError { loc: loc.clone(), reason: "expected a register set '{...}' here".into() });
    };
    Ok(OperandBag { rd, regset: Some(regs.clone()), regset_cross: *cross, ..Default::default() })
}

/// `SWP Ra, Rb` -- lowers to three XOR steps.
pub fn build_swp(raws: &[RawOperand], loc: &Location) -> Result<OperandBag, AssemblyError> {
    want_arity(raws, 2, loc)?;
    let ra = want_reg(&raws[0], loc)?;
    let rb = want_reg(&raws[1], loc)?;
    Ok(OperandBag { ra: Some(ra), rb: Some(rb), ..Default::default() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BaseReg, RegRef};

    fn reg(num: u8) -> RawOperand {
        RawOperand::Reg(BaseReg::Gpr(RegRef { num, cross: false }))
    }

    fn regset(nums: &[u8]) -> RawOperand {
        RawOperand::RegSet(nums.iter().map(|&num| RegRef { num, cross: false }).collect(), false)
    }

    fn loc() -> Location {
        Location::new("t".into(), 1, 1, "".into())
    }

    #[test]
    fn bare_regset_leaves_rd_empty() {
        let bag = build_psh_pop(&[regset(&[2, 3, 4])], &loc()).unwrap();
        assert!(bag.rd.is_none());
        assert_eq!(bag.regset.unwrap().len(), 3);
    }

    #[test]
    fn explicit_rd_overrides_default_stack_pointer() {
        let bag = build_psh_pop(&[reg(7), regset(&[2])], &loc()).unwrap();
        assert_eq!(bag.rd.unwrap().num(), 7);
    }

    #[test]
    fn swp_takes_two_registers() {
        let bag = build_swp(&[reg(1), reg(2)], &loc()).unwrap();
        assert_eq!(bag.ra.unwrap().num(), 1);
        assert_eq!(bag.rb.unwrap().num(), 2);
    }
}

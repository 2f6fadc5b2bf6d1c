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

//! Operand-shape building for ADD/SUB/ADC/SBC, the wide MLU/MLS/DVU/DVS
//! family, the shift family, and INC/DEC/NEG.

use crate::ast::{Expr, Location, OperandBag};
use crate::errors::AssemblyError;

use super::operand_builders::RawOperand;
use super::validators::*;

/// `[Rd,] Rx, Vy` -- two operands omits `Rd`; three gives it explicitly.
/// Shared by ADD/SUB (which fold into INC/DEC) and ADC/SBC (which never do).
pub fn build_add_sub(raws: &[RawOperand], loc: &Location) -> Result<OperandBag, AssemblyError> {
    want_arity_range(raws, 2, 3, loc)?;
    let (rd, rx, vy) = if raws.len() == 2 {
        (None, want_reg(&raws[0], loc)?, want_reg_or_expr(&raws[1], loc)?)
    } else {
        (Some(want_reg(&raws[0], loc)?), want_reg(&raws[1], loc)?, want_reg_or_expr(&raws[2], loc)?)
    };
    Ok(OperandBag { rd, rx: Some(rx), vy: Some(vy), ..Default::default() })
}

/// `[Rdx:Rd,] Rx, Vy` -- MLU/MLS/DVU/DVS may additionally take the wide
/// destination pair in place of a single `Rd`.
pub fn build_wide(raws: &[RawOperand], loc: &Location) -> Result<OperandBag, AssemblyError> {
    want_arity_range(raws, 2, 3, loc)?;
    if raws.len() == 2 {
        let rx = want_reg(&raws[0], loc)?;
        let vy = want_reg_or_expr(&raws[1], loc)?;
        return Ok(OperandBag { rx: Some(rx), vy: Some(vy), ..Default::default() });
    }
    if let Ok((rdx, rd)) = want_reg_pair(&raws[0], loc) {
        let rx = want_reg(&raws[1], loc)?;
        let vy = want_reg_or_expr(&raws[2], loc)?;
        return Ok(OperandBag { rdx: Some(rdx), rd: Some(rd), rx: Some(rx), vy: Some(vy), ..Default::default() });
    }
    let rd = want_reg(&raws[0], loc)?;
    let rx = want_reg(&raws[1], loc)?;
    let vy = want_reg_or_expr(&raws[2], loc)?;
    Ok(OperandBag { rd: Some(rd), rx: Some(rx), vy: Some(vy), ..Default::default() })
}

/// `[Rd,] Rx, V8` -- SHL/SRU/SRS, same shape as ADD/SUB but the shift
/// amount is encoded as an 8-bit operand.
pub fn build_shift(raws: &[RawOperand], loc: &Location) -> Result<OperandBag, AssemblyError> {
    want_arity_range(raws, 2, 3, loc)?;
    let (rd, rx, v8) = if raws.len() == 2 {
        (None, want_reg(&raws[0], loc)?, want_reg_or_expr(&raws[1], loc)?)
    } else {
        (Some(want_reg(&raws[0], loc)?), want_reg(&raws[1], loc)?, want_reg_or_expr(&raws[2], loc)?)
    };
    Ok(OperandBag { rd, rx: Some(rx), v8: Some(v8), ..Default::default() })
}

/// `INC|DEC [Rd,] Rx[, SImm4]` -- `SImm4` defaults to 1 when omitted, and
/// the 2-operand form disambiguates `Rd, Rx` from `Rx, SImm4` by the shape
/// of the second operand.
pub fn build_inc_dec(raws: &[RawOperand], loc: &Location) -> Result<OperandBag, AssemblyError> {
    want_arity_range(raws, 1, 3, loc)?;
    let (rd, rx, simm4) = match raws.len() {
        1 => (None, want_reg(&raws[0], loc)?, None),
        2 => match &raws[1] {
            RawOperand::Reg(_) => (Some(want_reg(&raws[0], loc)?), want_reg(&raws[1], loc)?, None),
            RawOperand::Expr(_) => (None, want_reg(&raws[0], loc)?, Some(want_expr(&raws[1], loc)?)),
            _ => return Err(AssemblyError::SyntaxError { loc: loc.clone(), reason: "invalid INC/DEC operand".into() }),
        },
        3 => (Some(want_reg(&raws[0], loc)?), want_reg(&raws[1], loc)?, Some(want_expr(&raws[2], loc)?)),
        _ => unreachable!(),
    };
    Ok(OperandBag { rd, rx: Some(rx), simm4: Some(simm4.unwrap_or(Expr::Num(1))), ..Default::default() })
}

/// `NEG Rx` -- the sole unary-register pseudo-instruction shape.
pub fn build_unary_reg(raws: &[RawOperand], loc: &Location) -> Result<OperandBag, AssemblyError> {
    want_arity(raws, 1, loc)?;
    let rx = want_reg(&raws[0], loc)?;
    Ok(OperandBag { rx: Some(rx), ..Default::default() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BaseReg, RegOrExpr, RegRef};

    fn reg(num: u8) -> RawOperand {
        RawOperand::Reg(BaseReg::Gpr(RegRef { num, cross: false }))
    }

    fn loc() -> Location {
        Location::new("t".into(), 1, 1, "".into())
    }

    #[test]
    fn add_sub_two_operand_form_leaves_rd_empty() {
        let bag = build_add_sub(&[reg(3), RawOperand::Expr(Expr::Num(1))], &loc()).unwrap();
        assert!(bag.rd.is_none());
        assert_eq!(bag.rx.unwrap().num(), 3);
    }

    #[test]
    fn add_sub_three_operand_form_sets_rd() {
        let bag = build_add_sub(&[reg(7), reg(2), reg(10)], &loc()).unwrap();
        assert_eq!(bag.rd.unwrap().num(), 7);
        assert_eq!(bag.rx.unwrap().num(), 2);
        assert!(matches!(bag.vy, Some(RegOrExpr::Reg(_))));
    }

    #[test]
    fn wide_accepts_register_pair_destination() {
        let pair = RawOperand::RegPair(
            BaseReg::Gpr(RegRef { num: 3, cross: false }),
            BaseReg::Gpr(RegRef { num: 2, cross: false }),
        );
        let bag = build_wide(&[pair, reg(1), reg(4)], &loc()).unwrap();
        assert_eq!(bag.rdx.unwrap().num(), 3);
        assert_eq!(bag.rd.unwrap().num(), 2);
    }

    #[test]
    fn inc_dec_defaults_simm4_to_one() {
        let bag = build_inc_dec(&[reg(4)], &loc()).unwrap();
        assert_eq!(bag.simm4.unwrap().try_const_value(), Some(1));
    }

    #[test]
    fn inc_dec_two_operand_register_form_sets_rd() {
        let bag = build_inc_dec(&[reg(7), reg(4)], &loc()).unwrap();
        assert_eq!(bag.rd.unwrap().num(), 7);
        assert_eq!(bag.simm4.unwrap().try_const_value(), Some(1));
    }

    #[test]
    fn inc_dec_two_operand_expr_form_sets_simm4() {
        let bag = build_inc_dec(&[reg(4), RawOperand::Expr(Expr::Num(8))], &loc()).unwrap();
        assert!(bag.rd.is_none());
        assert_eq!(bag.simm4.unwrap().try_const_value(), Some(8));
    }
}

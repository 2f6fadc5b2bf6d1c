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

//! Operand-shape building for MOV/CMP/RDC/WRC, the LDW/STW/LDB/STB
//! addressing forms, the pseudo `ADR`, and RDB/WRB port I/O.
//!
//! LDW/STW/LDB/STB's bracketed address splits across the operand bag as:
//! the in-bracket base register becomes `rd` (defaulting to `ZERO`, carried
//! only through the optional `DR(Rd)` prefix byte), the offset/absolute part
//! becomes `vy`, and the value register outside the brackets becomes `rx`.
//! `[Rd - Expr]` is sugar for a negated `vy`.

use crate::ast::{Expr, Location, OperandBag, UnOp};
use crate::errors::AssemblyError;

use super::operand_builders::{MemOperand, RawOperand};
use super::validators::*;

/// `MOV|CMP|RDC|WRC Rx, Vy` -- exactly two operands; RDC/WRC's `Vy` may
/// itself be a control register, which `want_reg_or_expr` already accepts
/// since register parsing tries the control-register bank too.
pub fn build_rxy(raws: &[RawOperand], loc: &Location) -> Result<OperandBag, AssemblyError> {
    want_arity(raws, 2, loc)?;
    let rx = want_reg(&raws[0], loc)?;
    let vy = want_reg_or_expr(&raws[1], loc)?;
    Ok(OperandBag { rx: Some(rx), vy: Some(vy), ..Default::default() })
}

/// `LDW|STW|LDB|STB Rx, [Rd + Vy | Rd - Expr | Vy]`.
pub fn build_mem(raws: &[RawOperand], loc: &Location) -> Result<OperandBag, AssemblyError> {
    want_arity(raws, 2, loc)?;
    let rx = want_reg(&raws[0], loc)?;
    let RawOperand::Mem(mem) = &raws[1] else {
        return Err(AssemblyError::SyntaxError {
            loc: loc.clone(),
            reason: "expected a bracketed memory address here".into(),
        });
    };
    let (rd, vy) = match mem {
        MemOperand::Plus(base, offset) => (Some(*base), offset.clone()),
        MemOperand::Minus(base, expr) => {
            let negated = Expr::Unary(UnOp::Neg, Box::new(expr.clone()));
            (Some(*base), crate::ast::RegOrExpr::Expr(negated))
        }
        MemOperand::Bare(offset) => (None, offset.clone()),
    };
    Ok(OperandBag { rd, rx: Some(rx), vy: Some(vy), ..Default::default() })
}

/// `ADR Rx, Label` -- lowers to `ADD Rx, PC, (Label - @PC@)`.
pub fn build_adr(raws: &[RawOperand], loc: &Location) -> Result<OperandBag, AssemblyError> {
    want_arity(raws, 2, loc)?;
    let rx = want_reg(&raws[0], loc)?;
    let target = want_expr(&raws[1], loc)?;
    Ok(OperandBag { rx: Some(rx), target: Some(target), ..Default::default() })
}

/// `RDB Rx[, (Port)]` -- port defaults to 0 when omitted.
pub fn build_rdb(raws: &[RawOperand], loc: &Location) -> Result<OperandBag, AssemblyError> {
    want_arity_range(raws, 1, 2, loc)?;
    let rx = want_reg(&raws[0], loc)?;
    let port = match raws.get(1) {
        Some(RawOperand::Port(expr)) => Some(expr.clone()),
        Some(_) => return Err(AssemblyError::SyntaxError { loc: loc.clone(), reason: "expected a '(Port)' operand".into() }),
        None => None,
    };
    Ok(OperandBag { rx: Some(rx), port, ..Default::default() })
}

/// `WRB [(Port),] V8` -- port defaults to 0 when omitted.
pub fn build_wrb(raws: &[RawOperand], loc: &Location) -> Result<OperandBag, AssemblyError> {
    want_arity_range(raws, 1, 2, loc)?;
    let (port, v8) = if raws.len() == 1 {
        (None, want_reg_or_expr(&raws[0], loc)?)
    } else {
        let RawOperand::Port(expr) = &raws[0] else {
            return Err(AssemblyError::SyntaxError { loc: loc.clone(), reason: "expected a '(Port)' operand".into() });
        };
        (Some(expr.clone()), want_reg_or_expr(&raws[1], loc)?)
    };
    Ok(OperandBag { port, v8: Some(v8), ..Default::default() })
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
    fn bare_address_leaves_rd_empty() {
        let bag = build_mem(&[reg(3), RawOperand::Mem(MemOperand::Bare(RegOrExpr::Expr(Expr::Num(0x10))))], &loc()).unwrap();
        assert!(bag.rd.is_none());
        assert_eq!(bag.rx.unwrap().num(), 3);
    }

    #[test]
    fn plus_address_sets_rd_from_base() {
        let base = BaseReg::Gpr(RegRef { num: 7, cross: false });
        let bag = build_mem(&[reg(3), RawOperand::Mem(MemOperand::Plus(base, RegOrExpr::Reg(reg_base(1))))], &loc()).unwrap();
        assert_eq!(bag.rd.unwrap().num(), 7);
    }

    #[test]
    fn minus_address_negates_the_offset() {
        let base = BaseReg::Gpr(RegRef { num: 7, cross: false });
        let bag = build_mem(&[reg(3), RawOperand::Mem(MemOperand::Minus(base, Expr::Num(4)))], &loc()).unwrap();
        match bag.vy {
            Some(RegOrExpr::Expr(Expr::Unary(UnOp::Neg, _))) => {}
            other => panic!("expected a negated expression, got {other:?}"),
        }
    }

    fn reg_base(num: u8) -> BaseReg {
        BaseReg::Gpr(RegRef { num, cross: false })
    }
}

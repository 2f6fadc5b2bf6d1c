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

//! Shared operand-shape checks used by every instruction-family builder.

use crate::ast::{BaseReg, Expr, Location, RegOrExpr};
use crate::errors::AssemblyError;

use super::operand_builders::RawOperand;

fn syntax_err(loc: &Location, reason: impl Into<String>) -> AssemblyError {
    AssemblyError::SyntaxError { loc: loc.clone(), reason: reason.into() }
}

pub fn want_arity(raws: &[RawOperand], expected: usize, loc: &Location) -> Result<(), AssemblyError> {
    if raws.len() != expected {
        return Err(syntax_err(
            loc,
            format!("expected {expected} operand(s), found {}", raws.len()),
        ));
    }
    Ok(())
}

pub fn want_arity_range(raws: &[RawOperand], lo: usize, hi: usize, loc: &Location) -> Result<(), AssemblyError> {
    if raws.len() < lo || raws.len() > hi {
        return Err(syntax_err(
            loc,
            format!("expected {lo} to {hi} operand(s), found {}", raws.len()),
        ));
    }
    Ok(())
}

pub fn want_reg(op: &RawOperand, loc: &Location) -> Result<BaseReg, AssemblyError> {
    match op {
        RawOperand::Reg(r) => Ok(*r),
        _ => Err(syntax_err(loc, "expected a register here")),
    }
}

pub fn want_reg_pair(op: &RawOperand, loc: &Location) -> Result<(BaseReg, BaseReg), AssemblyError> {
    match op {
        RawOperand::RegPair(rdx, rd) => Ok((*rdx, *rd)),
        _ => Err(syntax_err(loc, "expected a 'Rdx:Rd' register pair here")),
    }
}

pub fn want_expr(op: &RawOperand, loc: &Location) -> Result<Expr, AssemblyError> {
    match op {
        RawOperand::Expr(e) => Ok(e.clone()),
        _ => Err(syntax_err(loc, "expected an expression here")),
    }
}

pub fn want_reg_or_expr(op: &RawOperand, loc: &Location) -> Result<RegOrExpr, AssemblyError> {
    match op {
        RawOperand::Reg(r) => Ok(RegOrExpr::Reg(*r)),
        RawOperand::Expr(e) => Ok(RegOrExpr::Expr(e.clone())),
        _ => Err(syntax_err(loc, "expected a register or an expression here")),
    }
}

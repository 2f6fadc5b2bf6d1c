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

//! Turns a single pest `operand` pair (a register, register set, port,
//! bracketed memory reference, or bare expression) into a [`RawOperand`],
//! the shape-blind intermediate the instruction-family builders downstream
//! switch on.

use std::rc::Rc;

use pest::iterators::Pair;

use crate::ast::{BaseReg, CRegRef, Expr, Location, RegOrExpr, RegRef};
use crate::errors::AssemblyError;
use crate::isa;

use super::location;
use super::utility_functions::build_expr;
use super::Rule;

#[derive(Debug, Clone)]
pub enum MemOperand {
    Plus(BaseReg, RegOrExpr),
    Minus(BaseReg, Expr),
    Bare(RegOrExpr),
}

#[derive(Debug, Clone)]
pub enum RawOperand {
    Reg(BaseReg),
    RegPair(BaseReg, BaseReg),
    RegSet(Vec<RegRef>, bool),
    Port(Expr),
    Mem(MemOperand),
    Expr(Expr),
}

fn syntax_err(loc: &Location, reason: impl Into<String>) -> AssemblyError {
    AssemblyError::SyntaxError { loc: loc.clone(), reason: reason.into() }
}

fn parse_single_reg(word: &str, loc: &Location) -> Result<BaseReg, AssemblyError> {
    let (cross, bare) = match word.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, word),
    };
    if let Some(num) = isa::register_number(bare) {
        return Ok(BaseReg::Gpr(RegRef { num, cross }));
    }
    if let Some(num) = isa::control_register_number(bare) {
        return Ok(BaseReg::Creg(CRegRef { num, cross }));
    }
    Err(syntax_err(loc, format!("unknown register '{word}'")))
}

/// `register` is atomic in the grammar (no sub-pairs), so the optional
/// `Rdx:Rd` wide-destination form is split out of the raw text here.
pub fn build_register(pair: Pair<Rule>, file: &Rc<str>) -> Result<RawOperand, AssemblyError> {
    let loc = location(file, &pair);
    let text = pair.as_str();
    if let Some((lhs, rhs)) = text.split_once(':') {
        let rdx = parse_single_reg(lhs, &loc)?;
        let rd = parse_single_reg(rhs, &loc)?;
        Ok(RawOperand::RegPair(rdx, rd))
    } else {
        Ok(RawOperand::Reg(parse_single_reg(text, &loc)?))
    }
}

fn as_reg_or_expr(op: RawOperand, loc: &Location) -> Result<RegOrExpr, AssemblyError> {
    match op {
        RawOperand::Reg(r) => Ok(RegOrExpr::Reg(r)),
        RawOperand::Expr(e) => Ok(RegOrExpr::Expr(e)),
        _ => Err(syntax_err(loc, "expected a register or an expression here")),
    }
}

pub fn build_mem_addr(pair: Pair<Rule>, file: &Rc<str>) -> Result<RawOperand, AssemblyError> {
    let loc = location(file, &pair);
    let inner = pair.into_inner().next().expect("mem_addr always wraps a variant");
    let mem = match inner.as_rule() {
        Rule::mem_plus => {
            let mut parts = inner.into_inner();
            let base_pair = parts.next().unwrap();
            let RawOperand::Reg(base) = build_register(base_pair, file)? else {
                return Err(syntax_err(&loc, "base of [Rd + ...] must be a single register"));
            };
            let tail = parts.next().unwrap();
            let offset = match tail.as_rule() {
                Rule::register => as_reg_or_expr(build_register(tail, file)?, &loc)?,
                Rule::expr => RegOrExpr::Expr(build_expr(tail, file)?),
                other => unreachable!("mem_plus tail: unexpected rule {other:?}"),
            };
            MemOperand::Plus(base, offset)
        }
        Rule::mem_minus => {
            let mut parts = inner.into_inner();
            let base_pair = parts.next().unwrap();
            let RawOperand::Reg(base) = build_register(base_pair, file)? else {
                return Err(syntax_err(&loc, "base of [Rd - ...] must be a single register"));
            };
            let expr = build_expr(parts.next().unwrap(), file)?;
            MemOperand::Minus(base, expr)
        }
        Rule::mem_bare => {
            let tail = inner.into_inner().next().unwrap();
            let offset = match tail.as_rule() {
                Rule::register => as_reg_or_expr(build_register(tail, file)?, &loc)?,
                Rule::expr => RegOrExpr::Expr(build_expr(tail, file)?),
                other => unreachable!("mem_bare: unexpected rule {other:?}"),
            };
            MemOperand::Bare(offset)
        }
        other => unreachable!("mem_addr: unexpected rule {other:?}"),
    };
    Ok(RawOperand::Mem(mem))
}

pub fn build_port(pair: Pair<Rule>, file: &Rc<str>) -> Result<RawOperand, AssemblyError> {
    let expr_pair = pair.into_inner().next().expect("port always wraps an expr");
    Ok(RawOperand::Port(build_expr(expr_pair, file)?))
}

pub fn build_regset(pair: Pair<Rule>, file: &Rc<str>) -> Result<RawOperand, AssemblyError> {
    let loc = location(file, &pair);
    let cross = pair.as_str().starts_with('!');
    let mut regs = Vec::new();
    for item in pair.into_inner() {
        let mut names = item.into_inner();
        let lo = isa::register_number(names.next().unwrap().as_str())
            .ok_or_else(|| syntax_err(&loc, "register set members must be general-purpose registers"))?;
        if let Some(hi_pair) = names.next() {
            let hi = isa::register_number(hi_pair.as_str())
                .ok_or_else(|| syntax_err(&loc, "register set members must be general-purpose registers"))?;
            if lo > hi {
                return Err(syntax_err(&loc, "register range must be given low-to-high"));
            }
            for num in lo..=hi {
                regs.push(RegRef { num, cross });
            }
        } else {
            regs.push(RegRef { num: lo, cross });
        }
    }
    Ok(RawOperand::RegSet(regs, cross))
}

pub fn build_operand(pair: Pair<Rule>, file: &Rc<str>) -> Result<RawOperand, AssemblyError> {
    match pair.as_rule() {
        Rule::mem_addr => build_mem_addr(pair, file),
        Rule::regset => build_regset(pair, file),
        Rule::register => build_register(pair, file),
        Rule::port => build_port(pair, file),
        Rule::expr => Ok(RawOperand::Expr(build_expr(pair, file)?)),
        other => unreachable!("operand: unexpected rule {other:?}"),
    }
}

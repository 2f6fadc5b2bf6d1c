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

//! Turns pest's `instruction`/`directive` pairs into [`Item`]s. One module
//! per instruction family, matching the grouping the instruction set itself
//! uses; `operand_builders` and `utility_functions` hold the pieces shared
//! across all of them.

pub mod arithmetic;
pub mod bitwise;
pub mod control_flow;
pub mod directive;
pub mod load_store;
pub mod operand_builders;
pub mod stack;
pub mod utility_functions;
pub mod validators;

use std::rc::Rc;

use pest::iterators::Pair;

use crate::ast::{Directive, Instruction, Location, Opcode, OperandBag};
use crate::errors::AssemblyError;

use super::Rule;
use operand_builders::{build_operand, RawOperand};
use utility_functions::resolve_mnemonic;

/// Build a [`Location`] for `pair`, pointing at its start position.
pub fn location(file: &Rc<str>, pair: &Pair<Rule>) -> Location {
    let pos = pair.as_span().start_pos();
    let (line, column) = pos.line_col();
    Location::new(file.clone(), line, column, Rc::from(pos.line_of()))
}

fn collect_operands(pair: Pair<Rule>, file: &Rc<str>) -> Result<Vec<RawOperand>, AssemblyError> {
    pair.into_inner().map(|p| build_operand(p, file)).collect()
}

/// Build an [`Instruction`] from an `instruction` pair.
pub fn build_instruction(pair: Pair<Rule>, file: &Rc<str>) -> Result<Instruction, AssemblyError> {
    let loc = location(file, &pair);
    let mut parts = pair.into_inner();
    let mnemonic_pair = parts.next().expect("instruction always has a mnemonic");
    let (opcode, cc, toggle_flags, write_flags) = resolve_mnemonic(mnemonic_pair.as_str(), &loc)?;

    let raws = match parts.next() {
        Some(operand_list) => collect_operands(operand_list, file)?,
        None => Vec::new(),
    };

    let operands = build_operands(opcode, &raws, &loc)?;
    Ok(Instruction { opcode, cc, toggle_flags, write_flags, operands, loc, no_fold: false })
}

fn build_operands(opcode: Opcode, raws: &[RawOperand], loc: &Location) -> Result<OperandBag, AssemblyError> {
    use Opcode::*;
    match opcode {
        Add | Sub | Adc | Sbc => arithmetic::build_add_sub(raws, loc),
        Mlu | Mls | Dvu | Dvs => arithmetic::build_wide(raws, loc),
        Shl | Sru | Srs => arithmetic::build_shift(raws, loc),
        Inc | Dec => arithmetic::build_inc_dec(raws, loc),
        Neg => arithmetic::build_unary_reg(raws, loc),
        Xor | And | Orr => bitwise::build_bitwise(raws, loc),
        Inv => bitwise::build_inv(raws, loc),
        Mov | Cmp | Rdc | Wrc => load_store::build_rxy(raws, loc),
        Ldw | Stw | Ldb | Stb => load_store::build_mem(raws, loc),
        Adr => load_store::build_adr(raws, loc),
        Rdb => load_store::build_rdb(raws, loc),
        Wrb => load_store::build_wrb(raws, loc),
        Bra | Fca => control_flow::build_branch(raws, loc),
        Brr | Fcr => control_flow::build_branch_rel(raws, loc),
        Ret => {
            validators::want_arity(raws, 0, loc)?;
            Ok(OperandBag::default())
        }
        Psh | Pop => stack::build_psh_pop(raws, loc),
        Swp => stack::build_swp(raws, loc),
        Bpt | Hlt | Nop => {
            validators::want_arity(raws, 0, loc)?;
            Ok(OperandBag::default())
        }
    }
}

/// Build a [`Directive`] from a `directive` pair.
pub fn build_directive(pair: Pair<Rule>, file: &Rc<str>) -> Result<(Directive, Location), AssemblyError> {
    let loc = location(file, &pair);
    let inner = pair.into_inner().next().expect("directive always wraps one variant");
    let directive = directive::build(inner, file, &loc)?;
    Ok((directive, loc))
}

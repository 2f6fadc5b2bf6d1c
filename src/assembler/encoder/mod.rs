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

//! Ties the opcode table, byte packers and prefix/fold/lowering logic
//! together into the two entry points the assembler's two passes need:
//! [`encoded_len`] (pass 1 sizing) and [`emit`] (pass 2 byte generation).

mod components;
mod constants;
mod utility_functions;

use crate::ast::*;
use crate::errors::AssemblyError;
use crate::isa;

use components::*;
use constants::{is_pseudo, real_opcode_byte};
use utility_functions::{addsub_fold, compute_prefixes, lower};

pub use components::{check_fits_i16, check_fits_u8};
pub use constants::mnemonic_opcode;

/// Number of bytes a single `Instruction` occupies, after ADD/SUB -> INC/DEC
/// folding and pseudo-instruction lowering are taken into account. Does not
/// depend on any symbol table: every length-affecting operand (fold range,
/// SImm4 literal-vs-zero, register-vs-expression shape) is resolvable from
/// the AST alone.
pub fn encoded_len(insn: &Instruction) -> Result<u32, AssemblyError> {
    if is_pseudo(insn.opcode) {
        let mut total = 0u32;
        for sub in lower(insn) {
            total += encoded_len(&sub)?;
        }
        return Ok(total);
    }
    if let Some(folded) = addsub_fold(insn) {
        return encoded_len(&folded);
    }
    if let Some(rewritten) = inc_zero_rewrite(insn) {
        return encoded_len(&rewritten);
    }
    let prefixes = compute_prefixes(insn);
    let body = body_bytes(insn, None, 0, 0)?;
    Ok(prefixes.len() + body.len() as u32)
}

/// Emit the final bytes for `insn`, placed at `here` with byte stride `dpc`.
/// `resolver` supplies symbol values for any expression operand, including
/// the synthetic `@PC@` targets produced by pseudo-instruction lowering.
pub fn emit(
    insn: &Instruction,
    resolver: &dyn SymbolResolver,
    here: u32,
    dpc: u32,
) -> Result<Vec<u8>, AssemblyError> {
    if is_pseudo(insn.opcode) {
        let mut bytes = Vec::new();
        let mut cursor = here;
        for sub in lower(insn) {
            bytes.extend(emit(&sub, resolver, cursor, dpc)?);
            cursor += encoded_len(&sub)? * (1 + dpc);
        }
        return Ok(bytes);
    }
    if let Some(folded) = addsub_fold(insn) {
        return emit(&folded, resolver, here, dpc);
    }
    if let Some(rewritten) = inc_zero_rewrite(insn) {
        return emit(&rewritten, resolver, here, dpc);
    }

    let prefixes = compute_prefixes(insn);
    let mut bytes = prefixes.bytes();
    bytes.extend(body_bytes(insn, Some(resolver), here, dpc)?);
    Ok(bytes)
}

/// `INC`/`DEC` written with a literal zero immediate re-expand into the
/// equivalent `ADD`/`SUB` with `Vy = ZERO`, since the wire encoding has no
/// representation for a zero `SImm4` (see [`components::simm4_nibble`]).
fn inc_zero_rewrite(insn: &Instruction) -> Option<Instruction> {
    if insn.opcode != Opcode::Inc {
        return None;
    }
    let simm4 = insn.operands.simm4.as_ref()?;
    if simm4.try_const_value()? != 0 {
        return None;
    }
    let rx = insn.operands.rx?;
    let mut rewritten = insn.clone();
    rewritten.opcode = Opcode::Add;
    rewritten.no_fold = true;
    rewritten.operands.simm4 = None;
    rewritten.operands.vy = Some(RegOrExpr::Reg(zero_reg(rx)));
    Some(rewritten)
}

fn zero_reg(like: BaseReg) -> BaseReg {
    match like {
        BaseReg::Gpr(_) => BaseReg::Gpr(RegRef { num: 0, cross: false }),
        BaseReg::Creg(_) => BaseReg::Creg(CRegRef { num: 0, cross: false }),
    }
}

/// Default base register used when an instruction's shape allows the base
/// to be omitted (absent `Rd` on load/store defaults to `ZERO`; absent `Rx`
/// on `BRA`/`FCA` defaults to `ZERO` so a bare label is an absolute target).
fn implicit_zero() -> BaseReg {
    BaseReg::Gpr(RegRef { num: 0, cross: false })
}

/// Resolve a `RegOrExpr` into its wire low nibble plus any trailing
/// immediate bytes. In length-only mode (`resolver = None`) the returned
/// bytes are zero-valued placeholders of the correct count; callers must
/// never inspect their value, only `.len()`. `loc` is used for range-check
/// diagnostics and is always the owning instruction's location, since
/// operand expressions don't carry their own.
fn reg_or_expr_bytes(
    v: &RegOrExpr,
    resolver: Option<&dyn SymbolResolver>,
    width: u8,
    loc: &Location,
) -> Result<(u8, Vec<u8>), AssemblyError> {
    match v {
        RegOrExpr::Reg(r) => Ok((r.num(), vec![])),
        RegOrExpr::Expr(expr) => {
            let lo = isa::DPC_SENTINEL;
            let bytes = match (resolver, width) {
                (None, 16) => vec![0, 0],
                (None, 8) => vec![0],
                (Some(resolver), 16) => {
                    let value = expr.value(resolver)?;
                    check_fits_i16(value, loc)?;
                    imm16_le(value).to_vec()
                }
                (Some(resolver), 8) => {
                    let value = expr.value(resolver)?;
                    vec![check_fits_u8(value, loc)?]
                }
                _ => unreachable!("reg_or_expr_bytes: width must be 8 or 16"),
            };
            Ok((lo, bytes))
        }
    }
}

/// Compute the body bytes (opcode byte through trailing immediates) for a
/// real (non-pseudo, non-folded) instruction. Shared between `encoded_len`
/// (resolver = None) and `emit` (resolver = Some(..)).
fn body_bytes(
    insn: &Instruction,
    resolver: Option<&dyn SymbolResolver>,
    here: u32,
    dpc: u32,
) -> Result<Vec<u8>, AssemblyError> {
    let opcode_val =
        real_opcode_byte(insn.opcode).expect("body_bytes called on a pseudo opcode");
    let op_byte = opcode_byte(insn.cc, opcode_val);

    use Opcode::*;
    match insn.opcode {
        Bpt | Hlt | Nop => Ok(vec![op_byte]),

        // Rxy16-shaped: Rx plus a 16-bit Vy (register or expression).
        Add | Sub | Mlu | Mls | Dvu | Dvs | Xor | And | Orr | Mov | Cmp | Rdc | Wrc | Ldw | Stw
        | Ldb | Stb => {
            let rx = insn.operands.rx.unwrap_or_else(implicit_zero);
            let vy = insn
                .operands
                .vy
                .as_ref()
                .expect("Rxy16-shaped instruction missing Vy operand");
            let (lo, imm) = reg_or_expr_bytes(vy, resolver, 16, &insn.loc)?;
            let mut out = vec![op_byte, regpair_byte(rx.num(), lo)];
            out.extend(imm);
            Ok(out)
        }

        // Rxy8-shaped: Rx plus an 8-bit V8 (register or expression).
        Shl | Sru | Srs => {
            let rx = insn.operands.rx.unwrap_or_else(implicit_zero);
            let v8 = insn
                .operands
                .v8
                .as_ref()
                .expect("Rxy8-shaped instruction missing V8 operand");
            let (lo, imm) = reg_or_expr_bytes(v8, resolver, 8, &insn.loc)?;
            let mut out = vec![op_byte, regpair_byte(rx.num(), lo)];
            out.extend(imm);
            Ok(out)
        }

        Bra | Fca => {
            let rx = insn.operands.rx.unwrap_or_else(implicit_zero);
            let vy = insn
                .operands
                .vy
                .as_ref()
                .expect("BRA/FCA missing target operand");
            let (lo, imm) = reg_or_expr_bytes(vy, resolver, 16, &insn.loc)?;
            let mut out = vec![op_byte, regpair_byte(rx.num(), lo)];
            out.extend(imm);
            Ok(out)
        }

        Brr | Fcr => {
            let target = insn
                .operands
                .target
                .as_ref()
                .expect("BRR/FCR missing target operand");
            let imm = match resolver {
                None => vec![0, 0],
                Some(resolver) => {
                    let absolute = target.value(resolver)?;
                    let pc_after = (here + encoded_len(insn)? * (1 + dpc)) as i64;
                    let rel = absolute - pc_after;
                    check_fits_i16(rel, &insn.loc)?;
                    imm16_le(rel).to_vec()
                }
            };
            let mut out = vec![op_byte];
            out.extend(imm);
            Ok(out)
        }

        Rdb => {
            let rx = insn.operands.rx.unwrap_or_else(implicit_zero);
            let port_nibble = match (&insn.operands.port, resolver) {
                (None, _) => 0,
                (Some(_), None) => 0,
                (Some(expr), Some(resolver)) => check_port(expr.value(resolver)?, &insn.loc)?,
            };
            Ok(vec![op_byte, regpair_byte(rx.num(), port_nibble)])
        }

        Wrb => {
            let port_nibble = match (&insn.operands.port, resolver) {
                (None, _) => 0,
                (Some(_), None) => 0,
                (Some(expr), Some(resolver)) => check_port(expr.value(resolver)?, &insn.loc)?,
            };
            let v8 = insn.operands.v8.as_ref().expect("WRB missing V8 operand");
            let (lo, imm) = reg_or_expr_bytes(v8, resolver, 8, &insn.loc)?;
            let mut out = vec![op_byte, regpair_byte(port_nibble, lo)];
            out.extend(imm);
            Ok(out)
        }

        Psh | Pop => {
            let nums: Vec<u8> = insn
                .operands
                .regset
                .as_ref()
                .expect("PSH/POP missing register set")
                .iter()
                .map(|r| r.num)
                .collect();
            let mask = regset_bitmask(&nums);
            let [lo, hi] = mask.to_le_bytes();
            Ok(vec![op_byte, lo, hi])
        }

        Inc => {
            let rx = insn.operands.rx.unwrap_or_else(implicit_zero);
            let simm4_expr = insn
                .operands
                .simm4
                .as_ref()
                .expect("INC/DEC missing SImm4 operand");
            let value = simm4_expr
                .try_const_value()
                .expect("SImm4 must be a compile-time constant");
            check_simm4(value, &insn.loc)?;
            let nibble = simm4_nibble(value);
            Ok(vec![op_byte, regpair_byte(rx.num(), nibble)])
        }

        // Pseudo opcodes never reach here; `encoded_len`/`emit` intercept
        // them before calling `body_bytes`.
        Ret | Dec | Neg | Inv | Adr | Swp | Adc | Sbc => {
            unreachable!("pseudo opcode reached body_bytes")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Location {
        Location {
            file: std::rc::Rc::from("test.asm"),
            line: 1,
            column: 1,
            source_line: std::rc::Rc::from(""),
        }
    }

    fn reg(num: u8) -> BaseReg {
        BaseReg::Gpr(RegRef { num, cross: false })
    }

    struct NoSymbols;
    impl SymbolResolver for NoSymbols {
        fn resolve(&self, name: &str, loc: &Location) -> Result<i64, AssemblyError> {
            Err(AssemblyError::NameError {
                loc: loc.clone(),
                reason: format!("undefined symbol {name}"),
            })
        }
        fn resolve_dpc(&self, name: &str, loc: &Location) -> Result<i64, AssemblyError> {
            self.resolve(name, loc)
        }
    }

    #[test]
    fn add_reg_reg_matches_reference_fixture() {
        // ADD R3,R4 -> e034
        let insn = Instruction::real(
            Opcode::Add,
            isa::DEFAULT_CC_INDEX,
            OperandBag {
                rx: Some(reg(3)),
                vy: Some(RegOrExpr::Reg(reg(4))),
                ..Default::default()
            },
            loc(),
        );
        let bytes = emit(&insn, &NoSymbols, 0, 0).unwrap();
        assert_eq!(bytes, vec![0xe0, 0x34]);
    }

    #[test]
    fn add_cross_register_matches_reference_fixture() {
        // ADD S0,A1,R10 -> d7e02a
        let insn = Instruction::real(
            Opcode::Add,
            isa::DEFAULT_CC_INDEX,
            OperandBag {
                rd: Some(reg(7)),
                rx: Some(reg(2)),
                vy: Some(RegOrExpr::Reg(reg(10))),
                ..Default::default()
            },
            loc(),
        );
        let bytes = emit(&insn, &NoSymbols, 0, 0).unwrap();
        assert_eq!(bytes, vec![0xd7, 0xe0, 0x2a]);
    }

    #[test]
    fn inc_literal_matches_reference_fixtures() {
        // INC R4,8 -> fc47 ; INC R4,-8 -> fc48
        let pos = Instruction::real(
            Opcode::Inc,
            isa::DEFAULT_CC_INDEX,
            OperandBag {
                rx: Some(reg(4)),
                simm4: Some(Expr::Num(8)),
                ..Default::default()
            },
            loc(),
        );
        assert_eq!(emit(&pos, &NoSymbols, 0, 0).unwrap(), vec![0xfc, 0x47]);

        let neg = Instruction::real(
            Opcode::Inc,
            isa::DEFAULT_CC_INDEX,
            OperandBag {
                rx: Some(reg(4)),
                simm4: Some(Expr::Num(-8)),
                ..Default::default()
            },
            loc(),
        );
        assert_eq!(emit(&neg, &NoSymbols, 0, 0).unwrap(), vec![0xfc, 0x48]);
    }

    #[test]
    fn rdc_membase_matches_reference_fixture() {
        // RDC R4,MEMBASE_R -> ee48
        let insn = Instruction::real(
            Opcode::Rdc,
            isa::DEFAULT_CC_INDEX,
            OperandBag {
                rx: Some(reg(4)),
                vy: Some(RegOrExpr::Reg(BaseReg::Creg(CRegRef { num: 8, cross: false }))),
                ..Default::default()
            },
            loc(),
        );
        assert_eq!(emit(&insn, &NoSymbols, 0, 0).unwrap(), vec![0xee, 0x48]);
    }

    #[test]
    fn ret_lowers_and_encodes_as_bra_rd_ra() {
        let insn = Instruction::real(Opcode::Ret, isa::DEFAULT_CC_INDEX, OperandBag::default(), loc());
        let len = encoded_len(&insn).unwrap();
        let bytes = emit(&insn, &NoSymbols, 0, 0).unwrap();
        assert_eq!(len, bytes.len() as u32);
        assert_eq!(bytes[0] & 0x1F, isa::OP_BRA);
    }

    #[test]
    fn add_with_symbolic_vy_does_not_fold() {
        let insn = Instruction::real(
            Opcode::Add,
            isa::DEFAULT_CC_INDEX,
            OperandBag {
                rx: Some(reg(1)),
                vy: Some(RegOrExpr::Expr(Expr::Symbol("LABEL".into(), loc()))),
                ..Default::default()
            },
            loc(),
        );
        assert_eq!(encoded_len(&insn).unwrap(), 3);
    }
}

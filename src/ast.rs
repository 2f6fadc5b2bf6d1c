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

//! AST types: source locations, expressions, symbols, directives and
//! instructions produced by the parser and consumed by the assembler.

use std::rc::Rc;

use crate::errors::AssemblyError;

/// A point in a source file, carried by every AST node for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: Rc<str>,
    pub line: usize,
    pub column: usize,
    pub source_line: Rc<str>,
}

impl Location {
    pub fn new(file: Rc<str>, line: usize, column: usize, source_line: Rc<str>) -> Self {
        Location { file, line, column, source_line }
    }

    /// Render as `file:line:column` followed by the source line and a caret,
    /// tab-expanding the indent the way the reference implementation does.
    pub fn render(&self) -> String {
        let mut caret_pos = 0usize;
        for ch in self.source_line.chars().take(self.column.saturating_sub(1)) {
            caret_pos = if ch == '\t' { (caret_pos + 8) & !7 } else { caret_pos + 1 };
        }
        format!(
            "{}:{}:{}\n{}\n{}^",
            self.file,
            self.line,
            self.column,
            self.source_line,
            " ".repeat(caret_pos.saturating_sub(3)) + "~~~"
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    And,
    Xor,
    Or,
}

/// An expression tree. Leaves are numeric literals, plain symbol references,
/// and call-DPC references (`name.DPC@`).
#[derive(Debug, Clone)]
pub enum Expr {
    Num(i64),
    Symbol(String, Location),
    Dpc(String, Location),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

/// Floor division and floor modulo, matching the reference implementation's
/// host-language semantics for negative operands (Rust's `/` and `%`
/// truncate toward zero instead).
pub fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    let r = a % b;
    if (r != 0) && ((r < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

pub fn floor_mod(a: i64, b: i64) -> i64 {
    let r = a % b;
    if (r != 0) && ((r < 0) != (b < 0)) {
        r + b
    } else {
        r
    }
}

/// Arithmetic (sign-extending) right shift, matching the reference
/// implementation's behavior for negative operands.
pub fn arith_shr(a: i64, b: i64) -> i64 {
    if b <= 0 {
        a
    } else if b >= 64 {
        if a < 0 { -1 } else { 0 }
    } else {
        a >> b
    }
}

/// Anything that can resolve a bare symbol name (and its call-DPC form) to a
/// value during expression evaluation. Implemented by the assembler's
/// `Context` during both passes.
pub trait SymbolResolver {
    fn resolve(&self, name: &str, loc: &Location) -> Result<i64, AssemblyError>;
    fn resolve_dpc(&self, name: &str, loc: &Location) -> Result<i64, AssemblyError>;
}

impl Expr {
    /// Evaluate against a resolver. Used in pass 2 (and for equates,
    /// memoized by the caller).
    pub fn value(&self, resolver: &dyn SymbolResolver) -> Result<i64, AssemblyError> {
        match self {
            Expr::Num(n) => Ok(*n),
            Expr::Symbol(name, loc) => resolver.resolve(name, loc),
            Expr::Dpc(name, loc) => resolver.resolve_dpc(name, loc),
            Expr::Unary(op, inner) => {
                let v = inner.value(resolver)?;
                Ok(match op {
                    UnOp::Neg => v.wrapping_neg(),
                    UnOp::Not => !v,
                })
            }
            Expr::Binary(op, lhs, rhs) => {
                let a = lhs.value(resolver)?;
                let b = rhs.value(resolver)?;
                Ok(match op {
                    BinOp::Add => a.wrapping_add(b),
                    BinOp::Sub => a.wrapping_sub(b),
                    BinOp::Mul => a.wrapping_mul(b),
                    BinOp::Div => floor_div(a, b),
                    BinOp::Mod => floor_mod(a, b),
                    BinOp::Shl => a.wrapping_shl(b as u32),
                    BinOp::Shr => arith_shr(a, b),
                    BinOp::And => a & b,
                    BinOp::Xor => a ^ b,
                    BinOp::Or => a | b,
                })
            }
        }
    }

    /// Evaluate without any symbol table, succeeding only if the expression
    /// is a pure constant (no `Symbol`/`Dpc` leaves). Used in pass 1 for the
    /// ADD/SUB -> INC/DEC fold decision, which must not depend on whether a
    /// symbol happens to be resolvable yet.
    pub fn try_const_value(&self) -> Option<i64> {
        match self {
            Expr::Num(n) => Some(*n),
            Expr::Symbol(..) | Expr::Dpc(..) => None,
            Expr::Unary(op, inner) => {
                let v = inner.try_const_value()?;
                Some(match op {
                    UnOp::Neg => v.wrapping_neg(),
                    UnOp::Not => !v,
                })
            }
            Expr::Binary(op, lhs, rhs) => {
                let a = lhs.try_const_value()?;
                let b = rhs.try_const_value()?;
                Some(match op {
                    BinOp::Add => a.wrapping_add(b),
                    BinOp::Sub => a.wrapping_sub(b),
                    BinOp::Mul => a.wrapping_mul(b),
                    BinOp::Div => floor_div(a, b),
                    BinOp::Mod => floor_mod(a, b),
                    BinOp::Shl => a.wrapping_shl(b as u32),
                    BinOp::Shr => arith_shr(a, b),
                    BinOp::And => a & b,
                    BinOp::Xor => a ^ b,
                    BinOp::Or => a | b,
                })
            }
        }
    }
}

/// A general-purpose register operand, optionally marked "cross" (`!`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegRef {
    pub num: u8,
    pub cross: bool,
}

/// A control register operand, optionally marked "cross".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CRegRef {
    pub num: u8,
    pub cross: bool,
}

/// Either a general-purpose or control register; equality/encoding only
/// care about which bank the register number lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseReg {
    Gpr(RegRef),
    Creg(CRegRef),
}

impl BaseReg {
    pub fn num(&self) -> u8 {
        match self {
            BaseReg::Gpr(r) => r.num,
            BaseReg::Creg(r) => r.num,
        }
    }

    pub fn is_cross(&self) -> bool {
        match self {
            BaseReg::Gpr(r) => r.cross,
            BaseReg::Creg(r) => r.cross,
        }
    }
}

/// The second operand of an Rxy-shaped instruction: either a register
/// (possibly cross) or an expression emitted as a 16/8-bit immediate.
#[derive(Debug, Clone)]
pub enum RegOrExpr {
    Reg(BaseReg),
    Expr(Expr),
}

impl RegOrExpr {
    pub fn is_cross(&self) -> bool {
        matches!(self, RegOrExpr::Reg(r) if r.is_cross())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn apply(&self, a: i64, b: i64) -> bool {
        match self {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Directive {
    Db(Vec<Expr>),
    Dw(Vec<Expr>),
    LeString(Vec<u8>),
    Loc { pc: Expr, dpc: Option<Expr> },
    Align(Expr),
    Segment(String),
    Scope,
    Export { name: String, exported_name: Option<String> },
    Import(String),
    Assert { lhs: Expr, op: CmpOp, rhs: Expr, loc: Location },
}

/// The tagged sum of every real and pseudo opcode. Operand shapes live in
/// the shared `OperandBag` rather than per-variant payloads, so encoding
/// logic dispatches on `Opcode` and reads whichever bag fields apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Add,
    Sub,
    Mlu,
    Mls,
    Dvu,
    Dvs,
    Xor,
    And,
    Orr,
    Shl,
    Sru,
    Srs,
    Mov,
    Cmp,
    Rdc,
    Wrc,
    Ldw,
    Stw,
    Ldb,
    Stb,
    Bra,
    Brr,
    Fca,
    Fcr,
    Rdb,
    Wrb,
    Psh,
    Pop,
    Inc,
    Bpt,
    Hlt,
    Nop,
    Ret,
    Dec,
    Neg,
    Inv,
    Adr,
    Swp,
    Adc,
    Sbc,
}

#[derive(Debug, Clone, Default)]
pub struct OperandBag {
    pub rd: Option<BaseReg>,
    pub rdx: Option<BaseReg>,
    pub rx: Option<BaseReg>,
    pub vy: Option<RegOrExpr>,
    pub v8: Option<RegOrExpr>,
    pub port: Option<Expr>,
    pub simm4: Option<Expr>,
    pub target: Option<Expr>,
    pub regset: Option<Vec<RegRef>>,
    pub regset_cross: bool,
    pub ra: Option<BaseReg>,
    pub rb: Option<BaseReg>,
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: Opcode,
    pub cc: u8,
    pub toggle_flags: bool,
    pub write_flags: Option<bool>,
    pub operands: OperandBag,
    pub loc: Location,
    /// Set on instructions synthesized by pseudo-instruction lowering whose
    /// length must stay fixed (e.g. the `ADD` inside a lowered `ADR`); skips
    /// the generic ADD/SUB -> INC/DEC fold pre-pass.
    pub no_fold: bool,
}

impl Instruction {
    pub fn real(opcode: Opcode, cc: u8, operands: OperandBag, loc: Location) -> Self {
        Instruction {
            opcode,
            cc,
            toggle_flags: false,
            write_flags: None,
            operands,
            loc,
            no_fold: false,
        }
    }
}

/// A top-level item produced by the parser, in source order.
#[derive(Debug, Clone)]
pub enum Item {
    Label { name: String, loc: Location },
    Equate { name: String, expr: Expr, loc: Location },
    Directive(Directive, Location),
    Instruction(Instruction),
}

impl Item {
    pub fn loc(&self) -> &Location {
        match self {
            Item::Label { loc, .. } => loc,
            Item::Equate { loc, .. } => loc,
            Item::Directive(_, loc) => loc,
            Item::Instruction(insn) => &insn.loc,
        }
    }
}

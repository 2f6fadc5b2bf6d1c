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

//! Expression precedence climbing over the grammar's flat `expr` rule,
//! numeric/char/string literal decoding, and mnemonic/condition-code/flag
//! suffix splitting.

use std::rc::Rc;

use pest::iterators::Pair;

use crate::ast::{BinOp, Expr, Location, Opcode, UnOp};
use crate::errors::AssemblyError;
use crate::isa;

use crate::assembler::encoder::mnemonic_opcode;

use super::location;
use super::Rule;

fn precedence(op: BinOp) -> u8 {
    match op {
        BinOp::Mul | BinOp::Div | BinOp::Mod => 5,
        BinOp::Add | BinOp::Sub => 4,
        BinOp::Shl | BinOp::Shr => 3,
        BinOp::And => 2,
        BinOp::Xor => 1,
        BinOp::Or => 0,
    }
}

fn bin_op_of(rule: Rule) -> BinOp {
    match rule {
        Rule::op_add => BinOp::Add,
        Rule::op_sub => BinOp::Sub,
        Rule::op_mul => BinOp::Mul,
        Rule::op_div => BinOp::Div,
        Rule::op_mod => BinOp::Mod,
        Rule::op_shl => BinOp::Shl,
        Rule::op_shr => BinOp::Shr,
        Rule::op_and => BinOp::And,
        Rule::op_xor => BinOp::Xor,
        Rule::op_or => BinOp::Or,
        other => unreachable!("bin_operator: unexpected rule {other:?}"),
    }
}

/// Climb the flat `(op, rhs)` list starting at `lhs`, consuming every term
/// whose operator binds at least as tightly as `min_prec`.
fn climb(lhs: Expr, terms: &[(BinOp, Expr)], idx: &mut usize, min_prec: u8) -> Expr {
    let mut lhs = lhs;
    while *idx < terms.len() && precedence(terms[*idx].0) >= min_prec {
        let op = terms[*idx].0;
        let mut rhs = terms[*idx].1.clone();
        *idx += 1;
        while *idx < terms.len() && precedence(terms[*idx].0) > precedence(op) {
            rhs = climb(rhs, terms, idx, precedence(op) + 1);
        }
        lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
    }
    lhs
}

/// Build an [`Expr`] from an `expr` pair (`unary (bin_operator unary)*`).
/// The grammar is deliberately precedence-blind; precedence climbing over
/// the flat term list happens entirely here.
pub fn build_expr(pair: Pair<Rule>, file: &Rc<str>) -> Result<Expr, AssemblyError> {
    let mut parts = pair.into_inner();
    let first = build_unary(parts.next().expect("expr always has a leading unary"), file)?;
    let mut terms = Vec::new();
    loop {
        let Some(op_pair) = parts.next() else { break };
        let op = bin_op_of(op_pair.as_rule());
        let rhs = build_unary(parts.next().expect("bin_operator always followed by unary"), file)?;
        terms.push((op, rhs));
    }
    let mut idx = 0;
    Ok(climb(first, &terms, &mut idx, 0))
}

fn build_unary(pair: Pair<Rule>, file: &Rc<str>) -> Result<Expr, AssemblyError> {
    let mut ops = Vec::new();
    let mut parts = pair.into_inner();
    let primary_pair = loop {
        let p = parts.next().expect("unary always ends in a primary");
        if p.as_rule() == Rule::unary_op {
            ops.push(if p.as_str() == "-" { UnOp::Neg } else { UnOp::Not });
        } else {
            break p;
        }
    };
    let mut expr = build_primary(primary_pair, file)?;
    for op in ops.into_iter().rev() {
        expr = Expr::Unary(op, Box::new(expr));
    }
    Ok(expr)
}

fn build_primary(pair: Pair<Rule>, file: &Rc<str>) -> Result<Expr, AssemblyError> {
    match pair.as_rule() {
        Rule::number => Ok(Expr::Num(parse_number(pair.as_str()))),
        Rule::char_lit => Ok(Expr::Num(parse_char_lit(pair.as_str()))),
        Rule::equate_ref => Ok(Expr::Symbol(pair.as_str().to_string(), location(file, &pair))),
        Rule::symbol_ref => {
            let text = pair.as_str();
            let loc = location(file, &pair);
            if let Some(name) = text.strip_suffix(".DPC@") {
                Ok(Expr::Dpc(name.to_string(), loc))
            } else {
                Ok(Expr::Symbol(text.to_string(), loc))
            }
        }
        Rule::expr => build_expr(pair, file),
        other => unreachable!("primary: unexpected rule {other:?}"),
    }
}

fn parse_number(text: &str) -> i64 {
    if let Some(digits) = text.strip_prefix("0x") {
        i64::from_str_radix(digits, 16).expect("grammar guarantees valid hex digits")
    } else if let Some(digits) = text.strip_prefix("0b") {
        i64::from_str_radix(digits, 2).expect("grammar guarantees valid binary digits")
    } else if let Some(digits) = text.strip_prefix("0o") {
        i64::from_str_radix(digits, 8).expect("grammar guarantees valid octal digits")
    } else {
        text.parse().expect("grammar guarantees valid decimal digits")
    }
}

fn decode_escape(c: char) -> u8 {
    match c {
        '\\' => b'\\',
        '\'' => b'\'',
        '"' => b'"',
        '0' => 0,
        'a' => 7,
        'f' => 12,
        'v' => 11,
        't' => 9,
        'r' => 13,
        'n' => 10,
        other => other as u8,
    }
}

fn parse_char_lit(text: &str) -> i64 {
    let inner = &text[1..text.len() - 1];
    let mut chars = inner.chars();
    let c = chars.next().expect("grammar guarantees a char_lit body");
    let value = if c == '\\' {
        decode_escape(chars.next().expect("grammar guarantees an escape target"))
    } else {
        c as u8
    };
    value as i64
}

/// Decode a `string` token's body (quotes stripped, escapes resolved) into
/// raw bytes, used by `.lestring` and `.export`'s optional exported name.
pub fn parse_string_lit(text: &str) -> Vec<u8> {
    let inner = &text[1..text.len() - 1];
    let mut out = Vec::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push(decode_escape(chars.next().expect("grammar guarantees an escape target")));
        } else {
            out.push(c as u8);
        }
    }
    out
}

/// Split a mnemonic token (e.g. `ADD.NG.Y`, `NOP.F`) into its opcode,
/// condition-code index, and the toggle/force-write-flags suffix. Each of
/// the base word and the condition-code word may independently carry a
/// trailing `F`/`Y`/`N` flag-write suffix; when both carry one, the
/// condition-code word's suffix wins.
pub fn resolve_mnemonic(
    text: &str,
    loc: &Location,
) -> Result<(Opcode, u8, bool, Option<bool>), AssemblyError> {
    let (base, cc_word) = match text.split_once('.') {
        Some((b, c)) => (b, Some(c)),
        None => (text, None),
    };

    let (base_word, base_suffix) = strip_flag_suffix(base);
    let opcode = mnemonic_opcode(base_word)
        .ok_or_else(|| AssemblyError::SyntaxError { loc: loc.clone(), reason: format!("unknown mnemonic '{base_word}'") })?;

    let (cc_index, cc_suffix) = match cc_word {
        Some(word) => {
            let (cc_word, cc_suffix) = strip_flag_suffix(word);
            let idx = isa::condition_code_index(cc_word).ok_or_else(|| AssemblyError::SyntaxError {
                loc: loc.clone(),
                reason: format!("unknown condition code '{cc_word}'"),
            })?;
            (idx, cc_suffix)
        }
        None => (isa::DEFAULT_CC_INDEX, None),
    };

    let suffix = cc_suffix.or(base_suffix);
    let (toggle_flags, write_flags) = match suffix {
        Some('Y') => (false, Some(true)),
        Some('N') => (false, Some(false)),
        Some('F') => (true, None),
        _ => (false, None),
    };

    Ok((opcode, cc_index, toggle_flags, write_flags))
}

/// Strip a trailing `F`/`Y`/`N` flag suffix from `word`, if doing so still
/// leaves a word this table or the condition-code table recognizes.
fn strip_flag_suffix(word: &str) -> (&str, Option<char>) {
    if let Some(last) = word.chars().last() {
        if matches!(last, 'F' | 'Y' | 'N') {
            let stem = &word[..word.len() - 1];
            if mnemonic_opcode(stem).is_some() || isa::condition_code_index(stem).is_some() {
                return (stem, Some(last));
            }
        }
    }
    (word, None)
}

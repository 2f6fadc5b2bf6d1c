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

//! Builds every [`Directive`] variant from its `*_dir` pest pair.

use std::rc::Rc;

use pest::iterators::Pair;

use crate::ast::{CmpOp, Directive, Location};
use crate::errors::AssemblyError;

use super::utility_functions::{build_expr, parse_string_lit};
use super::Rule;

fn segment_name(ident_text: &str) -> String {
    format!("@{ident_text}")
}

fn cmp_op_of(text: &str, loc: &Location) -> Result<CmpOp, AssemblyError> {
    Ok(match text {
        "==" => CmpOp::Eq,
        "!=" => CmpOp::Ne,
        "<=" => CmpOp::Le,
        ">=" => CmpOp::Ge,
        "<" => CmpOp::Lt,
        ">" => CmpOp::Gt,
        other => {
            return Err(AssemblyError::SyntaxError {
                loc: loc.clone(),
                reason: format!("unknown comparison operator '{other}'"),
            })
        }
    })
}

pub fn build(pair: Pair<Rule>, file: &Rc<str>, loc: &Location) -> Result<Directive, AssemblyError> {
    match pair.as_rule() {
        Rule::db_dir => {
            let exprs = pair.into_inner().map(|p| build_expr(p, file)).collect::<Result<Vec<_>, _>>()?;
            Ok(Directive::Db(exprs))
        }
        Rule::dw_dir => {
            let exprs = pair.into_inner().map(|p| build_expr(p, file)).collect::<Result<Vec<_>, _>>()?;
            Ok(Directive::Dw(exprs))
        }
        Rule::lestring_dir => {
            let string_pair = pair.into_inner().next().expect(".lestring always has a string operand");
            Ok(Directive::LeString(parse_string_lit(string_pair.as_str())))
        }
        Rule::loc_dir => {
            let mut parts = pair.into_inner();
            let pc = build_expr(parts.next().expect(".loc always has a pc expression"), file)?;
            let dpc = parts.next().map(|p| build_expr(p, file)).transpose()?;
            Ok(Directive::Loc { pc, dpc })
        }
        Rule::align_dir => {
            let expr = build_expr(pair.into_inner().next().expect(".align always has an expression"), file)?;
            Ok(Directive::Align(expr))
        }
        Rule::segment_dir => {
            let ident = pair.into_inner().next().expect(".segment always names a segment");
            Ok(Directive::Segment(segment_name(ident.as_str())))
        }
        Rule::scope_dir => Ok(Directive::Scope),
        Rule::export_dir => {
            let mut parts = pair.into_inner();
            let ident = parts.next().expect(".export always names a symbol");
            let exported_name = parts.next().map(|p| String::from_utf8_lossy(&parse_string_lit(p.as_str())).into_owned());
            Ok(Directive::Export { name: segment_name(ident.as_str()), exported_name })
        }
        Rule::import_dir => {
            let string_pair = pair.into_inner().next().expect(".import always has a path string");
            let path = String::from_utf8_lossy(&parse_string_lit(string_pair.as_str())).into_owned();
            Ok(Directive::Import(path))
        }
        Rule::assert_dir => {
            let mut parts = pair.into_inner();
            let lhs = build_expr(parts.next().expect(".assert always has a left-hand expression"), file)?;
            let op_pair = parts.next().expect(".assert always has a comparison operator");
            let op = cmp_op_of(op_pair.as_str(), loc)?;
            let rhs = build_expr(parts.next().expect(".assert always has a right-hand expression"), file)?;
            Ok(Directive::Assert { lhs, op, rhs, loc: loc.clone() })
        }
        other => unreachable!("directive: unexpected rule {other:?}"),
    }
}

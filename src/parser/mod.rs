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

//! Binds the pest grammar to [`Rule`] and walks its parse tree into a flat
//! [`Vec<Item>`] in source order, ready for the assembler's two passes.

pub mod ast_builder;

use std::rc::Rc;

use pest::Parser;
use pest_derive::Parser;

use crate::ast::Item;
use crate::errors::AssemblyError;

#[derive(Parser)]
#[grammar = "./grammar.pest"]
pub struct EarParser;

fn build_item(pair: pest::iterators::Pair<Rule>, file: &Rc<str>) -> Result<Item, AssemblyError> {
    let loc = ast_builder::location(file, &pair);
    match pair.as_rule() {
        Rule::label_def => {
            let ident = pair.into_inner().next().expect("label_def always names a label");
            Ok(Item::Label { name: format!("@{}", ident.as_str()), loc })
        }
        Rule::equate_def => {
            let mut parts = pair.into_inner();
            let ident = parts.next().expect("equate_def always names an equate");
            let expr_pair = parts.next().expect("equate_def always has a value expression");
            let expr = ast_builder::utility_functions::build_expr(expr_pair, file)?;
            Ok(Item::Equate { name: format!("${}", ident.as_str()), expr, loc })
        }
        Rule::directive => {
            let (directive, loc) = ast_builder::build_directive(pair, file)?;
            Ok(Item::Directive(directive, loc))
        }
        Rule::instruction => Ok(Item::Instruction(ast_builder::build_instruction(pair, file)?)),
        other => unreachable!("line item: unexpected rule {other:?}"),
    }
}

/// Parse a whole source file into its items, in source order. `file` names
/// the source for diagnostics; it need not be a real filesystem path (the
/// assembler passes `"<stdin>"` when reading from standard input).
pub fn parse_source(file: &str, source: &str) -> Result<Vec<Item>, AssemblyError> {
    let file: Rc<str> = Rc::from(file);
    let mut top = EarParser::parse(Rule::program, source)?;
    let program = top.next().expect("program rule always produces one pair");

    let mut items = Vec::new();
    for pair in program.into_inner() {
        if pair.as_rule() != Rule::line {
            continue; // blank NEWLINE lines and EOI carry no items
        }
        for item_pair in pair.into_inner() {
            items.push(build_item(item_pair, &file)?);
        }
    }
    Ok(items)
}

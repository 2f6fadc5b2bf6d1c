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

//! Per-segment assembly state: the HERE/DPC cursor, the sequence of local
//! scopes advanced by `.scope`, and a [`SymbolResolver`] that layers the
//! auto names (`@`, `@PC@`, ...) over the current scope and the assembler's
//! global table. One `Context` exists per declared segment and is reused,
//! unmodified in shape, across both passes -- pass 2 replays exactly the
//! same `.scope`/`.loc`/`.align` side effects pass 1 made, so the same
//! scopes line up with the same item positions.

use crate::ast::{Location, SymbolResolver};
use crate::errors::AssemblyError;

use super::symbol_table::SymbolTable;

pub struct Context {
    pub segment_name: String,
    pub base_addr: u32,
    pub here: u32,
    pub dpc: u32,
    pub max_addr: u32,
    pub end_addr: u32,
    pub scopes: Vec<SymbolTable>,
    pub scope_idx: usize,
    /// `HERE` one past the end of whichever item is currently being sized
    /// or emitted; this is what `@PC@`/`@AFTER@` resolve to.
    pub item_pc: u32,
}

impl Context {
    pub fn new(segment_name: String, base_addr: u32) -> Self {
        Context {
            segment_name,
            base_addr,
            here: base_addr,
            dpc: 0,
            max_addr: base_addr,
            end_addr: base_addr,
            scopes: vec![SymbolTable::new()],
            scope_idx: 0,
            item_pc: base_addr,
        }
    }

    /// Rewind the cursor for pass 2 without discarding the scopes pass 1
    /// populated -- label/equate lookups during pass 2 must see the same
    /// bindings pass 1 recorded.
    pub fn reset_for_pass2(&mut self) {
        self.here = self.base_addr;
        self.dpc = 0;
        self.scope_idx = 0;
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(SymbolTable::new());
        self.scope_idx = self.scopes.len() - 1;
    }

    /// Step to the next local scope in sequence for a `.scope` directive.
    /// Pass 1 has no next scope yet and creates one; pass 2 replay finds
    /// the one pass 1 already built at this position and reuses it, so
    /// pass-2 lookups see pass-1's bindings instead of an empty table.
    pub fn advance_scope(&mut self) {
        if self.scope_idx + 1 < self.scopes.len() {
            self.scope_idx += 1;
        } else {
            self.push_scope();
        }
    }

    pub fn current_scope(&self) -> &SymbolTable {
        &self.scopes[self.scope_idx]
    }

    pub fn current_scope_mut(&mut self) -> &mut SymbolTable {
        &mut self.scopes[self.scope_idx]
    }

    pub fn touch_max(&mut self) {
        if self.here > self.max_addr {
            self.max_addr = self.here;
        }
    }

    /// Advance `here` past an item of `len` logical bytes at the current
    /// DPC stride, tracking `max_addr` as we go.
    pub fn advance(&mut self, len: u32) {
        self.here += len * (1 + self.dpc);
        self.touch_max();
    }
}

/// Resolves auto names against a live [`Context`], falling back to the
/// context's current scope and then the assembler-wide global table, per
/// the lookup order in the data model.
pub struct Resolver<'a> {
    pub ctx: &'a Context,
    pub globals: &'a SymbolTable,
}

fn is_local_name(name: &str) -> bool {
    name.starts_with("@.") || name.starts_with("$.")
}

impl<'a> SymbolResolver for Resolver<'a> {
    fn resolve(&self, name: &str, loc: &Location) -> Result<i64, AssemblyError> {
        match name {
            "@" => Ok(self.ctx.here as i64),
            "@@" => Ok(self.ctx.base_addr as i64),
            "@PC@" | "@AFTER@" => Ok(self.ctx.item_pc as i64),
            "@DPC@" => Ok(self.ctx.dpc as i64),
            "@END@" => Ok(self.ctx.end_addr as i64),
            _ if is_local_name(name) => self.ctx.current_scope().resolve(name, loc, self),
            _ => self.globals.resolve(name, loc, self),
        }
    }

    fn resolve_dpc(&self, name: &str, loc: &Location) -> Result<i64, AssemblyError> {
        if is_local_name(name) {
            self.ctx.current_scope().resolve_dpc(name, loc)
        } else {
            self.globals.resolve_dpc(name, loc)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use std::rc::Rc;

    fn loc() -> Location {
        Location { file: Rc::from("t.asm"), line: 1, column: 1, source_line: Rc::from("") }
    }

    #[test]
    fn auto_names_resolve_against_the_live_cursor() {
        let mut ctx = Context::new("@TEXT".to_string(), 0x100);
        ctx.here = 0x110;
        ctx.dpc = 2;
        ctx.item_pc = 0x113;
        let globals = SymbolTable::new();
        let resolver = Resolver { ctx: &ctx, globals: &globals };
        assert_eq!(resolver.resolve("@", &loc()).unwrap(), 0x110);
        assert_eq!(resolver.resolve("@@", &loc()).unwrap(), 0x100);
        assert_eq!(resolver.resolve("@PC@", &loc()).unwrap(), 0x113);
        assert_eq!(resolver.resolve("@DPC@", &loc()).unwrap(), 2);
    }

    #[test]
    fn local_names_only_see_the_current_scope() {
        let mut ctx = Context::new("@TEXT".to_string(), 0);
        ctx.current_scope_mut().define_label("@.inner".to_string(), 0x42, 0, &loc()).unwrap();
        ctx.push_scope();
        let globals = SymbolTable::new();
        let resolver = Resolver { ctx: &ctx, globals: &globals };
        assert!(resolver.resolve("@.inner", &loc()).is_err());
    }

    #[test]
    fn global_names_fall_through_to_the_assembler_table() {
        let ctx = Context::new("@TEXT".to_string(), 0);
        let mut globals = SymbolTable::new();
        globals.define_label("@shared".to_string(), 0x55, 0, &loc()).unwrap();
        let resolver = Resolver { ctx: &ctx, globals: &globals };
        assert_eq!(resolver.resolve("@shared", &loc()).unwrap(), 0x55);
    }

    #[test]
    fn expression_leaning_on_symbol_table_self_reference_still_detects_cycles() {
        let ctx = Context::new("@TEXT".to_string(), 0);
        let mut globals = SymbolTable::new();
        globals.define_equate("$X".to_string(), Expr::Symbol("$X".to_string(), loc()), &loc()).unwrap();
        let resolver = Resolver { ctx: &ctx, globals: &globals };
        assert!(resolver.resolve("$X", &loc()).is_err());
    }
}

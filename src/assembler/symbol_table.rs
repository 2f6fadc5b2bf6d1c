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

//! Global symbol table: labels bind directly to an address, equates bind to
//! an expression evaluated lazily (and memoized) the first time something
//! references them, since an equate may be defined before the symbols its
//! expression depends on.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::ast::{Expr, Location, SymbolResolver};
use crate::errors::AssemblyError;

#[derive(Debug)]
enum SymbolKind {
    Label { addr: u32, dpc: u32 },
    Equate(Expr),
}

#[derive(Debug)]
struct SymbolEntry {
    kind: SymbolKind,
    def_loc: Location,
    exported_name: Option<String>,
    cache: RefCell<Option<i64>>,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    entries: HashMap<String, SymbolEntry>,
    resolving: RefCell<HashSet<String>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_unbound(&self, name: &str, loc: &Location) -> Result<(), AssemblyError> {
        if let Some(existing) = self.entries.get(name) {
            return Err(AssemblyError::NameError {
                loc: loc.clone(),
                reason: format!(
                    "symbol '{name}' already defined at {}",
                    existing.def_loc.render()
                ),
            });
        }
        Ok(())
    }

    pub fn define_label(
        &mut self,
        name: String,
        address: u32,
        dpc: u32,
        loc: &Location,
    ) -> Result<(), AssemblyError> {
        self.check_unbound(&name, loc)?;
        self.entries.insert(
            name,
            SymbolEntry {
                kind: SymbolKind::Label { addr: address, dpc },
                def_loc: loc.clone(),
                exported_name: None,
                cache: RefCell::new(None),
            },
        );
        Ok(())
    }

    pub fn define_equate(&mut self, name: String, expr: Expr, loc: &Location) -> Result<(), AssemblyError> {
        self.check_unbound(&name, loc)?;
        self.entries.insert(
            name,
            SymbolEntry {
                kind: SymbolKind::Equate(expr),
                def_loc: loc.clone(),
                exported_name: None,
                cache: RefCell::new(None),
            },
        );
        Ok(())
    }

    pub fn mark_exported(
        &mut self,
        name: &str,
        exported_name: Option<String>,
        loc: &Location,
    ) -> Result<(), AssemblyError> {
        let entry = self.entries.get_mut(name).ok_or_else(|| AssemblyError::NameError {
            loc: loc.clone(),
            reason: format!("cannot export undefined symbol '{name}'"),
        })?;
        entry.exported_name = Some(exported_name.unwrap_or_else(|| name.to_string()));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn resolve(
        &self,
        name: &str,
        loc: &Location,
        resolver: &dyn SymbolResolver,
    ) -> Result<i64, AssemblyError> {
        let entry = self.entries.get(name).ok_or_else(|| AssemblyError::NameError {
            loc: loc.clone(),
            reason: format!("undefined symbol '{name}'"),
        })?;
        match &entry.kind {
            SymbolKind::Label { addr, .. } => Ok(*addr as i64),
            SymbolKind::Equate(expr) => {
                if let Some(v) = *entry.cache.borrow() {
                    return Ok(v);
                }
                if !self.resolving.borrow_mut().insert(name.to_string()) {
                    return Err(AssemblyError::NameError {
                        loc: loc.clone(),
                        reason: format!("equate '{name}' is defined in terms of itself"),
                    });
                }
                let result = expr.value(resolver);
                self.resolving.borrow_mut().remove(name);
                let v = result?;
                *entry.cache.borrow_mut() = Some(v);
                Ok(v)
            }
        }
    }

    /// Resolve the call-DPC value recorded alongside a label's definition,
    /// for `<name>.DPC@` references. Only labels carry a call-DPC; naming an
    /// equate here is a `NameError`.
    pub fn resolve_dpc(&self, name: &str, loc: &Location) -> Result<i64, AssemblyError> {
        let entry = self.entries.get(name).ok_or_else(|| AssemblyError::NameError {
            loc: loc.clone(),
            reason: format!("undefined symbol '{name}'"),
        })?;
        match &entry.kind {
            SymbolKind::Label { dpc, .. } => Ok(*dpc as i64),
            SymbolKind::Equate(_) => Err(AssemblyError::NameError {
                loc: loc.clone(),
                reason: format!("'{name}' is an equate, not a label; it has no call-DPC"),
            }),
        }
    }

    /// Names and resolved values of every symbol marked `.export`, used by
    /// the linker to populate the PEGASUS symbol table load command.
    pub fn exports(&self, resolver: &dyn SymbolResolver) -> Result<Vec<(String, i64)>, AssemblyError> {
        let mut out = Vec::new();
        for (name, entry) in &self.entries {
            if let Some(exported_name) = &entry.exported_name {
                let value = self.resolve(name, &entry.def_loc, resolver)?;
                out.push((exported_name.clone(), value));
            }
        }
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn loc() -> Location {
        Location {
            file: Rc::from("t.asm"),
            line: 1,
            column: 1,
            source_line: Rc::from(""),
        }
    }

    struct Empty;
    impl SymbolResolver for Empty {
        fn resolve(&self, name: &str, loc: &Location) -> Result<i64, AssemblyError> {
            Err(AssemblyError::NameError { loc: loc.clone(), reason: name.to_string() })
        }
        fn resolve_dpc(&self, name: &str, loc: &Location) -> Result<i64, AssemblyError> {
            self.resolve(name, loc)
        }
    }

    #[test]
    fn redefining_a_symbol_is_a_name_error() {
        let mut table = SymbolTable::new();
        table.define_label("X".into(), 10, 0, &loc()).unwrap();
        assert!(table.define_label("X".into(), 20, 0, &loc()).is_err());
    }

    #[test]
    fn equate_self_reference_is_rejected() {
        let mut table = SymbolTable::new();
        table
            .define_equate("X".into(), Expr::Symbol("X".into(), loc()), &loc())
            .unwrap();
        assert!(table.resolve("X", &loc(), &Empty).is_err());
    }

    #[test]
    fn label_resolves_to_its_address() {
        let mut table = SymbolTable::new();
        table.define_label("START".into(), 0x100, 0, &loc()).unwrap();
        assert_eq!(table.resolve("START", &loc(), &Empty).unwrap(), 0x100);
    }

    #[test]
    fn label_call_dpc_is_recorded() {
        let mut table = SymbolTable::new();
        table.define_label("L".into(), 0x10, 3, &loc()).unwrap();
        assert_eq!(table.resolve_dpc("L", &loc()).unwrap(), 3);
    }

    #[test]
    fn equate_has_no_call_dpc() {
        let mut table = SymbolTable::new();
        table.define_equate("E".into(), Expr::Num(1), &loc()).unwrap();
        assert!(table.resolve_dpc("E", &loc()).is_err());
    }
}

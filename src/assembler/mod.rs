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

//! Two-pass assembler: turns a set of source units (plus their transitive
//! `.import`s) into one byte buffer per declared segment, alongside the
//! resolved export table and entrypoint registers the linker needs.

mod context;
pub(crate) mod encoder;
mod symbol_table;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, info};

use crate::ast::{Directive, Expr, Item, Location, SymbolResolver};
use crate::errors::AssemblyError;
use crate::file_reader::FileReader;
use crate::isa;
use crate::layout::{Layout, SegmentDecl};
use crate::parser;

use context::{Context, Resolver};
use symbol_table::SymbolTable;

fn is_local_name(name: &str) -> bool {
    name.starts_with("@.") || name.starts_with("$.")
}

fn internal_loc(file: &str) -> Location {
    Location::new(Rc::from(file), 0, 0, Rc::from(""))
}

/// A byte-length that doesn't depend on any symbol value, shared by pass 1
/// (to advance the cursor) and pass 2 (to know where the next item starts).
fn item_len(item: &Item) -> Result<u32, AssemblyError> {
    Ok(match item {
        Item::Label { .. } | Item::Equate { .. } => 0,
        Item::Directive(dir, _) => directive_len(dir),
        Item::Instruction(insn) => encoder::encoded_len(insn)?,
    })
}

fn directive_len(dir: &Directive) -> u32 {
    match dir {
        Directive::Db(exprs) => exprs.len() as u32,
        Directive::Dw(exprs) => exprs.len() as u32 * 2,
        Directive::LeString(bytes) => isa::encode_lestring(bytes).len() as u32,
        _ => 0,
    }
}

/// One fully assembled segment, ready for the linker.
pub struct AssembledSegment {
    pub name: String,
    pub vmaddr: u32,
    pub vmsize: u32,
    pub bytes: Vec<u8>,
}

pub struct AssembleOutput {
    pub segments: Vec<AssembledSegment>,
    /// Exported symbol name -> resolved value, sorted by name.
    pub symbols: Vec<(String, i64)>,
    /// The first layout entrypoint name that resolved, as (pc, call-dpc).
    pub entry: Option<(i64, i64)>,
}

/// Splits a flat, import-expanded item list on `.segment` directives,
/// merging non-contiguous references to the same segment name. Items before
/// the first `.segment` directive land in `default_segment`.
fn split_segments(items: Vec<Item>, default_segment: &str) -> Vec<(String, Vec<Item>)> {
    let mut out: Vec<(String, Vec<Item>)> = vec![(default_segment.to_string(), Vec::new())];
    let mut current = default_segment.to_string();
    for item in items {
        if let Item::Directive(Directive::Segment(name), _) = &item {
            current = name.clone();
            if !out.iter().any(|(n, _)| n == &current) {
                out.push((current.clone(), Vec::new()));
            }
            continue;
        }
        if let Some((_, bucket)) = out.iter_mut().find(|(n, _)| n == &current) {
            bucket.push(item);
        }
    }
    out
}

/// Prepend the synthetic `.loc @AFTER@, 0` every separately-compiled unit
/// (a top-level input or an import) carries, resetting DPC to 0 without
/// moving HERE.
fn wrap_unit(items: Vec<Item>, file: &Rc<str>) -> Vec<Item> {
    let loc = Location::new(file.clone(), 0, 0, Rc::from(""));
    let reset = Item::Directive(
        Directive::Loc { pc: Expr::Symbol("@AFTER@".to_string(), loc.clone()), dpc: Some(Expr::Num(0)) },
        loc,
    );
    let mut out = Vec::with_capacity(items.len() + 1);
    out.push(reset);
    out.extend(items);
    out
}

pub struct Assembler<F: FileReader> {
    layout: Layout,
    search_paths: Vec<PathBuf>,
    file_reader: F,
    units: Vec<(String, String)>,
}

impl<F: FileReader> Assembler<F> {
    pub fn new(layout: Layout, search_paths: Vec<PathBuf>, file_reader: F) -> Self {
        Assembler { layout, search_paths, file_reader, units: Vec::new() }
    }

    pub fn add_input(&mut self, source: String, filename: Option<String>) {
        let label = filename.unwrap_or_else(|| format!("<input {}>", self.units.len()));
        self.units.push((label, source));
    }

    fn resolve_import_path(&self, raw: &str, importer_dir: Option<&Path>, loc: &Location) -> Result<PathBuf, AssemblyError> {
        let mut candidates = Vec::new();
        if let Some(dir) = importer_dir {
            candidates.push(dir.join(raw));
        }
        for sp in &self.search_paths {
            candidates.push(sp.join(raw));
        }
        if candidates.is_empty() {
            candidates.push(PathBuf::from(raw));
        }
        for candidate in &candidates {
            if self.file_reader.read_to_string(candidate).is_ok() {
                return Ok(candidate.clone());
            }
        }
        Err(AssemblyError::IOError {
            loc: loc.clone(),
            reason: format!("could not resolve import \"{raw}\" in any search path"),
        })
    }

    fn expand_imports(
        &self,
        items: Vec<Item>,
        importer_dir: Option<&Path>,
        imported: &mut HashSet<PathBuf>,
    ) -> Result<Vec<Item>, AssemblyError> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            if let Item::Directive(Directive::Import(path), loc) = &item {
                let resolved = self.resolve_import_path(path, importer_dir, loc)?;
                if imported.insert(resolved.clone()) {
                    debug!("importing {}", resolved.display());
                    let text = self.file_reader.read_to_string(&resolved).map_err(|e| AssemblyError::IOError {
                        loc: loc.clone(),
                        reason: e.to_string(),
                    })?;
                    let file_label: Rc<str> = Rc::from(resolved.to_string_lossy().as_ref());
                    let imported_items = parser::parse_source(&file_label, &text)?;
                    let wrapped = wrap_unit(imported_items, &file_label);
                    let nested = self.expand_imports(wrapped, resolved.parent(), imported)?;
                    out.extend(nested);
                }
                continue;
            }
            out.push(item);
        }
        Ok(out)
    }

    pub fn assemble(self) -> Result<AssembleOutput, AssemblyError> {
        info!("assembling {} input unit(s)", self.units.len());
        let mut imported: HashSet<PathBuf> = HashSet::new();
        let mut all_items = Vec::new();
        for (label, source) in &self.units {
            let file: Rc<str> = Rc::from(label.as_str());
            let items = parser::parse_source(label, source)?;
            let wrapped = wrap_unit(items, &file);
            let expanded = self.expand_imports(wrapped, Path::new(label).parent(), &mut imported)?;
            all_items.extend(expanded);
        }

        let grouped = split_segments(all_items, &self.layout.default);
        for (name, items) in &grouped {
            if !items.is_empty() && !self.layout.segments.iter().any(|s| &s.name == name) {
                let loc = items[0].loc();
                return Err(AssemblyError::NameError {
                    loc: loc.clone(),
                    reason: format!("segment '{name}' is not declared in the layout"),
                });
            }
        }

        let mut globals = SymbolTable::new();
        let mut pending_exports: Vec<(String, Option<String>, Location)> = Vec::new();
        let mut staged: Vec<(SegmentDecl, Context, Vec<Item>)> = Vec::new();
        let mut prev_end = 0u32;

        for seg in &self.layout.segments {
            let base = seg.vmaddr.unwrap_or_else(|| isa::page_ceil(prev_end));
            let mut ctx = Context::new(seg.name.clone(), base);
            let items = grouped
                .iter()
                .find(|(n, _)| n == &seg.name)
                .map(|(_, v)| v.clone())
                .unwrap_or_default();

            for item in &items {
                self.pass1_item(item, &mut ctx, &mut globals, &mut pending_exports)?;
            }

            ctx.end_addr = match seg.vmsize {
                Some(sz) => base + sz,
                None => isa::page_ceil(ctx.max_addr.max(base)),
            };
            prev_end = ctx.end_addr;

            debug!("segment {} laid out at {:#06x}..{:#06x}", seg.name, base, ctx.end_addr);

            let loc = internal_loc("<layout>");
            globals.define_label(format!("{}@", seg.name), base, 0, &loc)?;
            globals.define_label(format!("{}.END@", seg.name), ctx.end_addr, 0, &loc)?;

            staged.push((seg.clone(), ctx, items));
        }

        for (name, exported_name, loc) in pending_exports {
            globals.mark_exported(&name, exported_name, &loc)?;
        }

        let mut segments = Vec::with_capacity(staged.len());
        for (seg, mut ctx, items) in staged {
            let bytes = self.pass2_segment(&mut ctx, &items, &globals)?;
            segments.push(AssembledSegment {
                name: seg.name.clone(),
                vmaddr: ctx.base_addr,
                vmsize: ctx.end_addr - ctx.base_addr,
                bytes,
            });
        }

        let dummy_ctx = Context::new("<entry>".to_string(), 0);
        let resolver = Resolver { ctx: &dummy_ctx, globals: &globals };
        let entry_loc = internal_loc("<layout>");
        let mut entry = None;
        for name in &self.layout.entrypoints {
            if let Ok(pc) = resolver.resolve(name, &entry_loc) {
                let dpc = resolver.resolve_dpc(name, &entry_loc).unwrap_or(0);
                entry = Some((pc, dpc));
                break;
            }
        }

        let symbols = globals.exports(&resolver)?;
        info!("assembly complete: {} segment(s), {} exported symbol(s)", segments.len(), symbols.len());
        Ok(AssembleOutput { segments, symbols, entry })
    }

    fn pass1_item(
        &self,
        item: &Item,
        ctx: &mut Context,
        globals: &mut SymbolTable,
        pending_exports: &mut Vec<(String, Option<String>, Location)>,
    ) -> Result<(), AssemblyError> {
        let len = item_len(item)?;
        ctx.item_pc = ctx.here + len * (1 + ctx.dpc);

        match item {
            Item::Label { name, loc } => {
                if is_local_name(name) {
                    let (here, dpc) = (ctx.here, ctx.dpc);
                    ctx.current_scope_mut().define_label(name.clone(), here, dpc, loc)?;
                } else {
                    globals.define_label(name.clone(), ctx.here, ctx.dpc, loc)?;
                }
            }
            Item::Equate { name, expr, loc } => {
                if is_local_name(name) {
                    ctx.current_scope_mut().define_equate(name.clone(), expr.clone(), loc)?;
                } else {
                    globals.define_equate(name.clone(), expr.clone(), loc)?;
                }
            }
            Item::Directive(dir, loc) => self.pass1_directive(dir, loc, ctx, globals, pending_exports)?,
            Item::Instruction(_) => {}
        }

        ctx.advance(len);
        Ok(())
    }

    fn pass1_directive(
        &self,
        dir: &Directive,
        loc: &Location,
        ctx: &mut Context,
        globals: &mut SymbolTable,
        pending_exports: &mut Vec<(String, Option<String>, Location)>,
    ) -> Result<(), AssemblyError> {
        match dir {
            Directive::Scope => ctx.advance_scope(),
            Directive::Loc { pc, dpc } => self.replay_loc(pc, dpc.as_ref(), ctx, globals)?,
            Directive::Align(expr) => self.replay_align(expr, ctx, globals)?,
            Directive::Db(_) | Directive::Dw(_) | Directive::LeString(_) => {}
            Directive::Export { name, exported_name } => {
                pending_exports.push((name.clone(), exported_name.clone(), loc.clone()));
            }
            Directive::Assert { .. } => {}
            Directive::Segment(_) => {
                return Err(AssemblyError::SyntaxError {
                    loc: loc.clone(),
                    reason: "internal error: segment directive survived pre-split".into(),
                })
            }
            Directive::Import(_) => {
                return Err(AssemblyError::SyntaxError {
                    loc: loc.clone(),
                    reason: "internal error: import directive survived expansion".into(),
                })
            }
        }
        Ok(())
    }

    fn replay_loc(
        &self,
        pc: &Expr,
        dpc: Option<&Expr>,
        ctx: &mut Context,
        globals: &SymbolTable,
    ) -> Result<(), AssemblyError> {
        let pc_val = {
            let resolver = Resolver { ctx: &*ctx, globals };
            pc.value(&resolver)?
        };
        let dpc_val = match dpc {
            Some(d) => {
                let resolver = Resolver { ctx: &*ctx, globals };
                d.value(&resolver)?
            }
            None => 0,
        };
        ctx.here = pc_val as u32;
        ctx.dpc = dpc_val as u32;
        ctx.touch_max();
        Ok(())
    }

    fn replay_align(&self, expr: &Expr, ctx: &mut Context, globals: &SymbolTable) -> Result<(), AssemblyError> {
        let align = {
            let resolver = Resolver { ctx: &*ctx, globals };
            expr.value(&resolver)?
        } as u32;
        if align > 1 {
            let rem = ctx.here % align;
            if rem != 0 {
                ctx.here += align - rem;
            }
        }
        ctx.touch_max();
        Ok(())
    }

    fn pass2_segment(&self, ctx: &mut Context, items: &[Item], globals: &SymbolTable) -> Result<Vec<u8>, AssemblyError> {
        ctx.reset_for_pass2();
        let mut out: Vec<u8> = Vec::new();

        for item in items {
            let len = item_len(item)?;
            ctx.item_pc = ctx.here + len * (1 + ctx.dpc);

            match item {
                Item::Label { .. } | Item::Equate { .. } => {}
                Item::Directive(dir, loc) => self.pass2_directive(dir, loc, ctx, globals, &mut out)?,
                Item::Instruction(insn) => {
                    pad_to(&mut out, ctx);
                    let resolver = Resolver { ctx: &*ctx, globals };
                    let bytes = encoder::emit(insn, &resolver, ctx.here, ctx.dpc)?;
                    out.extend(bytes);
                }
            }

            ctx.advance(len);
        }
        Ok(out)
    }

    fn pass2_directive(
        &self,
        dir: &Directive,
        loc: &Location,
        ctx: &mut Context,
        globals: &SymbolTable,
        out: &mut Vec<u8>,
    ) -> Result<(), AssemblyError> {
        match dir {
            Directive::Scope => ctx.advance_scope(),
            Directive::Loc { pc, dpc } => self.replay_loc(pc, dpc.as_ref(), ctx, globals)?,
            Directive::Align(expr) => self.replay_align(expr, ctx, globals)?,
            Directive::Db(exprs) => {
                pad_to(out, ctx);
                let resolver = Resolver { ctx: &*ctx, globals };
                for e in exprs {
                    let v = e.value(&resolver)?;
                    out.push(encoder::check_fits_u8(v, loc)?);
                }
            }
            Directive::Dw(exprs) => {
                pad_to(out, ctx);
                let resolver = Resolver { ctx: &*ctx, globals };
                for e in exprs {
                    let v = e.value(&resolver)?;
                    encoder::check_fits_i16(v, loc)?;
                    out.extend((v as u16).to_le_bytes());
                }
            }
            Directive::LeString(bytes) => {
                pad_to(out, ctx);
                out.extend(isa::encode_lestring(bytes));
            }
            Directive::Export { .. } => {}
            Directive::Assert { lhs, op, rhs, loc } => {
                let resolver = Resolver { ctx: &*ctx, globals };
                let a = lhs.value(&resolver)?;
                let b = rhs.value(&resolver)?;
                if !op.apply(a, b) {
                    return Err(AssemblyError::AssertionFailure {
                        loc: loc.clone(),
                        reason: format!("assertion failed: {a:?} {op:?} {b:?} does not hold"),
                    });
                }
            }
            Directive::Segment(_) | Directive::Import(_) => {
                return Err(AssemblyError::SyntaxError {
                    loc: loc.clone(),
                    reason: "internal error: segment/import directive survived pass 1".into(),
                })
            }
        }
        Ok(())
    }
}

/// Zero-fill `out` up to the byte offset `ctx.here` currently names, so a
/// forward `.loc`/`.align` jump leaves a real gap in the segment buffer.
fn pad_to(out: &mut Vec<u8>, ctx: &Context) {
    let offset = (ctx.here - ctx.base_addr) as usize;
    if out.len() < offset {
        out.resize(offset, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_reader::MockFileReader;
    use crate::layout::default_layout;

    fn asm(source: &str) -> AssembleOutput {
        let mut a = Assembler::new(default_layout(), vec![], MockFileReader::default());
        a.add_input(source.to_string(), Some("t.asm".to_string()));
        a.assemble().unwrap()
    }

    fn segment<'a>(out: &'a AssembleOutput, name: &str) -> &'a AssembledSegment {
        out.segments.iter().find(|s| s.name == name).unwrap()
    }

    #[test]
    fn a_bare_nop_assembles_into_the_default_segment() {
        let out = asm("NOP\n");
        assert_eq!(segment(&out, "@TEXT").bytes, vec![0xff]);
    }

    #[test]
    fn labels_resolve_to_their_defined_address() {
        let out = asm("@start: NOP\nBRR @start\n");
        let bytes = &segment(&out, "@TEXT").bytes;
        assert_eq!(bytes[0], 0xff);
        assert_eq!(bytes[1] & 0x1F, isa::OP_BRR);
    }

    #[test]
    fn explicit_segment_directive_routes_bytes_there() {
        let out = asm(".segment @CONST\n.db 1, 2, 3\n");
        assert_eq!(segment(&out, "@CONST").bytes, vec![1, 2, 3]);
    }

    #[test]
    fn export_makes_a_symbol_visible_in_the_output() {
        let out = asm("@start: NOP\n.export @start\n");
        assert!(out.symbols.iter().any(|(name, _)| name == "@start"));
    }

    #[test]
    fn default_entrypoint_resolves_when_start_is_defined() {
        let out = asm("@start: NOP\n");
        assert!(out.entry.is_some());
    }

    #[test]
    fn passing_assert_emits_no_bytes() {
        let out = asm(".assert 1 == 1\nNOP\n");
        assert_eq!(segment(&out, "@TEXT").bytes, vec![0xff]);
    }

    #[test]
    fn failing_assert_is_an_assembly_error() {
        let mut a = Assembler::new(default_layout(), vec![], MockFileReader::default());
        a.add_input(".assert 1 == 2\n".to_string(), Some("t.asm".to_string()));
        assert!(matches!(a.assemble(), Err(AssemblyError::AssertionFailure { .. })));
    }

    #[test]
    fn repeated_import_of_the_same_file_has_no_duplicate_effect() {
        let mut reader = MockFileReader::default();
        reader.add_file("lib.asm", "$SIZE := 4\n");
        let mut a = Assembler::new(default_layout(), vec![], reader);
        a.add_input(".import \"lib.asm\"\n.import \"lib.asm\"\nNOP\n".to_string(), Some("t.asm".to_string()));
        let out = a.assemble().unwrap();
        assert_eq!(segment(&out, "@TEXT").bytes, vec![0xff]);
    }

    #[test]
    fn align_directive_pads_the_segment_buffer_with_zeros() {
        let out = asm("NOP\n.align 4\nNOP\n");
        let bytes = &segment(&out, "@TEXT").bytes;
        assert_eq!(bytes, &vec![0xff, 0, 0, 0, 0xff]);
    }
}

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

//! Builds a PEGASUS container from assembled segments: a fixed header, a
//! sequence of load commands (segment, entrypoint, symbols, relocations),
//! then the page-aligned segment bytes themselves.

use log::debug;
use thiserror::Error;

use crate::isa::{self, PAGE_SIZE};
use crate::layout::Layout;

#[derive(Error, Debug, PartialEq)]
pub enum LinkError {
    #[error("unknown segment '{0}' in layout")]
    UnknownSegment(String),

    #[error("vmaddr {0:#06x} for segment '{1}' is not page-aligned")]
    Unaligned(u32, String),

    #[error("layout declares no header segment")]
    NoHeaderSegment,

    #[error("segment '{0}' is emitted but was never assigned a virtual address")]
    SegmentNotPlaced(String),

    #[error("unknown symbol '{0}' referenced by a relocation")]
    UnknownSymbol(String),
}

/// The fixed register order of the Entrypoint load command.
const ENTRY_REGISTERS: [&str; 15] =
    ["A0", "A1", "A2", "A3", "A4", "A5", "S0", "S1", "S2", "FP", "SP", "RA", "RD", "PC", "DPC"];

const DEFAULT_A5: u16 = 0xEA23;
const DEFAULT_RA: u16 = 0xFF00;

fn cmd_header(cmd_type: u16, mut payload: Vec<u8>) -> Vec<u8> {
    let mut cmdsize = 2 + 2 + payload.len();
    if cmdsize % 2 != 0 {
        cmdsize += 1;
    }
    let mut out = Vec::with_capacity(cmdsize);
    out.extend((cmdsize as u16).to_le_bytes());
    out.extend(cmd_type.to_le_bytes());
    out.append(&mut payload);
    if out.len() % 2 != 0 {
        out.push(0xEA);
    }
    out
}

fn pack_symbol_name(name: &str) -> Vec<u8> {
    isa::encode_lestring(name.as_bytes())
}

struct LinkSegment {
    name: String,
    prot: u8,
    vmaddr: Option<u32>,
    vmsize: Option<u32>,
    emit: bool,
    header: bool,
    contents: Vec<u8>,
}

impl LinkSegment {
    fn declared_len(&self) -> u32 {
        self.vmsize.unwrap_or_else(|| trimmed(&self.contents).len() as u32)
    }
}

fn trimmed(bytes: &[u8]) -> &[u8] {
    let mut end = bytes.len();
    while end > 0 && bytes[end - 1] == 0 {
        end -= 1;
    }
    &bytes[..end]
}

struct PendingSymbol {
    name: String,
    value: u16,
}

struct PendingReloc {
    symbol_index: u16,
    file_offset: u16,
}

/// Assembles a PEGASUS container from the layout's declared segments, a set
/// of resolved entrypoint registers, exported symbols, and relocations.
pub struct Linker {
    segments: Vec<LinkSegment>,
    entries: Vec<[u16; ENTRY_REGISTERS.len()]>,
    symbols: Vec<PendingSymbol>,
    relocs: Vec<PendingReloc>,
    arch: [u8; 4],
}

impl Linker {
    pub fn new(layout: &Layout) -> Self {
        let segments = layout
            .segments
            .iter()
            .map(|decl| LinkSegment {
                name: decl.name.clone(),
                prot: decl.protection_bits(),
                vmaddr: decl.vmaddr,
                vmsize: decl.vmsize,
                emit: decl.emit,
                header: decl.header,
                contents: Vec::new(),
            })
            .collect();
        Linker { segments, entries: Vec::new(), symbols: Vec::new(), relocs: Vec::new(), arch: *b"EAR3" }
    }

    fn segment_mut(&mut self, name: &str) -> Result<&mut LinkSegment, LinkError> {
        self.segments.iter_mut().find(|s| s.name == name).ok_or_else(|| LinkError::UnknownSegment(name.to_string()))
    }

    pub fn add_segment(&mut self, name: &str, vmaddr: u32, vmsize: u32, bytes: Vec<u8>) -> Result<(), LinkError> {
        if vmaddr % PAGE_SIZE != 0 {
            return Err(LinkError::Unaligned(vmaddr, name.to_string()));
        }
        let seg = self.segment_mut(name)?;
        seg.vmaddr = Some(vmaddr);
        seg.vmsize = Some(vmsize);
        seg.contents = bytes;
        Ok(())
    }

    /// Registers an entrypoint. `overrides` gives explicit register values
    /// in `ENTRY_REGISTERS` order (`None` = unset); SP/FP fall back to the
    /// top of `@STACK` when that segment has a fixed size and the caller
    /// left them unset.
    pub fn add_entrypoint(&mut self, mut overrides: [Option<u16>; ENTRY_REGISTERS.len()]) {
        let sp_idx = ENTRY_REGISTERS.iter().position(|r| *r == "SP").unwrap();
        let fp_idx = ENTRY_REGISTERS.iter().position(|r| *r == "FP").unwrap();
        if overrides[sp_idx].is_none() {
            if let Some(stack) = self.segments.iter().find(|s| s.name == "@STACK") {
                if let (Some(vmaddr), Some(vmsize)) = (stack.vmaddr, stack.vmsize) {
                    let sp = (vmaddr + vmsize).wrapping_sub(2) as u16;
                    overrides[sp_idx] = Some(sp);
                    if overrides[fp_idx].is_none() {
                        overrides[fp_idx] = Some(sp);
                    }
                }
            }
        }

        let a5_idx = ENTRY_REGISTERS.iter().position(|r| *r == "A5").unwrap();
        let ra_idx = ENTRY_REGISTERS.iter().position(|r| *r == "RA").unwrap();
        let mut regs = [0u16; ENTRY_REGISTERS.len()];
        regs[a5_idx] = DEFAULT_A5;
        regs[ra_idx] = DEFAULT_RA;
        for (i, v) in overrides.into_iter().enumerate() {
            if let Some(v) = v {
                regs[i] = v;
            }
        }
        self.entries.push(regs);
    }

    pub fn add_symbol(&mut self, name: &str, value: i64) {
        self.symbols.push(PendingSymbol { name: name.to_string(), value: value as u16 });
    }

    pub fn add_relocation(&mut self, symbol_name: &str, file_offset: u16) -> Result<(), LinkError> {
        let index = self
            .symbols
            .iter()
            .position(|s| s.name == symbol_name)
            .ok_or_else(|| LinkError::UnknownSymbol(symbol_name.to_string()))?;
        self.relocs.push(PendingReloc { symbol_index: index as u16, file_offset });
        Ok(())
    }

    fn entrypoint_cmds(&self) -> Vec<Vec<u8>> {
        self.entries
            .iter()
            .map(|regs| {
                let mut payload = Vec::with_capacity(regs.len() * 2);
                for r in regs {
                    payload.extend(r.to_le_bytes());
                }
                cmd_header(2, payload)
            })
            .collect()
    }

    fn symbol_table_cmd(&self) -> Option<Vec<u8>> {
        if self.symbols.is_empty() {
            return None;
        }
        let mut payload = Vec::new();
        payload.extend((self.symbols.len() as u16).to_le_bytes());
        for sym in &self.symbols {
            payload.extend(sym.value.to_le_bytes());
            payload.extend(pack_symbol_name(&sym.name));
        }
        Some(cmd_header(3, payload))
    }

    fn reloc_table_cmd(&self) -> Option<Vec<u8>> {
        if self.relocs.is_empty() {
            return None;
        }
        let mut payload = Vec::new();
        payload.extend((self.relocs.len() as u16).to_le_bytes());
        for reloc in &self.relocs {
            payload.extend(reloc.symbol_index.to_le_bytes());
            payload.extend(reloc.file_offset.to_le_bytes());
        }
        Some(cmd_header(4, payload))
    }

    fn segment_cmd(seg: &LinkSegment, virtual_page: u8, file_page: u8, present_pages: u8, absent_pages: u8) -> Vec<u8> {
        let mut payload = vec![virtual_page, file_page, present_pages, absent_pages, seg.prot];
        payload.extend(isa::encode_lestring(seg.name.as_bytes()));
        cmd_header(1, payload)
    }

    /// Lays out the header and every segment, then serializes the whole
    /// container. Segments with no emitted bytes (and `vmsize` trimmed to
    /// zero) are dropped from the file entirely; the header always keeps
    /// every page it declares.
    pub fn link_binary(&self) -> Result<Vec<u8>, LinkError> {
        let header_idx = self.segments.iter().position(|s| s.header).ok_or(LinkError::NoHeaderSegment)?;
        if self.segments[header_idx].vmaddr.is_none() {
            return Err(LinkError::SegmentNotPlaced(self.segments[header_idx].name.clone()));
        }

        let extra_cmds: Vec<Vec<u8>> = self
            .entrypoint_cmds()
            .into_iter()
            .chain(self.symbol_table_cmd())
            .chain(self.reloc_table_cmd())
            .collect();

        let emitting_segment_count = self.segments.iter().filter(|s| s.emit).count();
        let cmd_count = emitting_segment_count as u16 + extra_cmds.len() as u16;

        let mut header_payload = Vec::new();
        header_payload.extend(b"\xe4PEGASUS");
        header_payload.extend(self.arch);
        header_payload.extend(cmd_count.to_le_bytes());

        // Assign each segment (including the header) a page-aligned file
        // offset in declared order, mirroring how they'll be serialized.
        let mut foff = 0u32;
        let mut file_pages = vec![0u32; self.segments.len()];
        let mut segment_cmds = Vec::new();
        for (i, seg) in self.segments.iter().enumerate() {
            foff = isa::page_ceil(foff);
            file_pages[i] = foff / PAGE_SIZE;
            let len = seg.declared_len();
            foff += len;

            if !seg.emit {
                debug!("link: segment {} excluded from the container", seg.name);
                continue;
            }
            if seg.vmaddr.is_none() {
                return Err(LinkError::SegmentNotPlaced(seg.name.clone()));
            }

            let total_pages = isa::page_ceil(len) / PAGE_SIZE;
            let trimmed_len = trimmed(&seg.contents).len() as u32;
            let present_file_pages = isa::page_ceil(trimmed_len) / PAGE_SIZE;
            let (present_pages, absent_pages) =
                if i == header_idx { (total_pages, 0) } else { (present_file_pages, total_pages - present_file_pages) };

            let virtual_page = seg.vmaddr.unwrap() / PAGE_SIZE;
            debug!(
                "link: segment {} vpage {} fpage {} present {} absent {} prot {:#05b}",
                seg.name, virtual_page, file_pages[i], present_pages, absent_pages, seg.prot
            );

            segment_cmds.push(Self::segment_cmd(
                seg,
                virtual_page as u8,
                file_pages[i] as u8,
                present_pages as u8,
                absent_pages as u8,
            ));
        }

        for cmd in segment_cmds.into_iter().chain(extra_cmds) {
            header_payload.extend(cmd);
        }

        let mut out = Vec::new();
        for (i, seg) in self.segments.iter().enumerate() {
            if i != header_idx && !seg.emit {
                continue;
            }
            let body: &[u8] = if i == header_idx { &header_payload } else { trimmed(&seg.contents) };
            if body.is_empty() {
                debug!("link: segment {} contributes no bytes", seg.name);
                continue;
            }
            let pos = out.len() as u32;
            let pad = isa::page_ceil(pos) - pos;
            out.extend(std::iter::repeat(0u8).take(pad as usize));
            out.extend(body);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{default_layout, Layout, SegmentDecl};

    fn no_overrides() -> [Option<u16>; ENTRY_REGISTERS.len()] {
        [None; ENTRY_REGISTERS.len()]
    }

    /// A header-only layout, for tests that don't care about `@TEXT`/`@CONST`/`@DATA`.
    fn header_only_layout() -> Layout {
        Layout {
            default: "@PEG".to_string(),
            segments: vec![SegmentDecl {
                name: "@PEG".to_string(),
                prot: "r".to_string(),
                vmaddr: Some(0),
                vmsize: None,
                emit: true,
                header: true,
                sections: vec![],
            }],
            entrypoints: vec![],
        }
    }

    #[test]
    fn container_starts_with_the_pegasus_magic_and_arch_tag() {
        let layout = header_only_layout();
        let linker = Linker::new(&layout);
        let bytes = linker.link_binary().unwrap();
        assert_eq!(&bytes[0..8], b"\xe4PEGASUS");
        assert_eq!(&bytes[8..12], b"EAR3");
    }

    #[test]
    fn a_segment_with_only_zero_bytes_is_entirely_trimmed() {
        let mut layout = header_only_layout();
        layout.segments.push(SegmentDecl {
            name: "@TEXT".to_string(),
            prot: "rx".to_string(),
            vmaddr: None,
            vmsize: None,
            emit: true,
            header: false,
            sections: vec![],
        });
        let mut linker = Linker::new(&layout);
        linker.add_segment("@TEXT", 0x200, 0x100, vec![0; 0x100]).unwrap();
        let bytes = linker.link_binary().unwrap();
        // The all-zero @TEXT segment contributes no trailing bytes at all.
        assert!(bytes.len() < PAGE_SIZE as usize);
    }

    #[test]
    fn an_emitted_segment_with_no_assigned_address_is_a_link_error() {
        let mut layout = header_only_layout();
        layout.segments.push(SegmentDecl {
            name: "@TEXT".to_string(),
            prot: "rx".to_string(),
            vmaddr: None,
            vmsize: None,
            emit: true,
            header: false,
            sections: vec![],
        });
        let linker = Linker::new(&layout);
        assert_eq!(linker.link_binary(), Err(LinkError::SegmentNotPlaced("@TEXT".to_string())));
    }

    #[test]
    fn entrypoint_defaults_a5_and_ra_when_unset() {
        let layout = header_only_layout();
        let mut linker = Linker::new(&layout);
        let mut overrides = no_overrides();
        overrides[ENTRY_REGISTERS.iter().position(|r| *r == "PC").unwrap()] = Some(0x200);
        linker.add_entrypoint(overrides);
        assert_eq!(linker.entries[0][ENTRY_REGISTERS.iter().position(|r| *r == "A5").unwrap()], DEFAULT_A5);
        assert_eq!(linker.entries[0][ENTRY_REGISTERS.iter().position(|r| *r == "RA").unwrap()], DEFAULT_RA);
        assert_eq!(linker.entries[0][ENTRY_REGISTERS.iter().position(|r| *r == "PC").unwrap()], 0x200);
    }

    #[test]
    fn sp_and_fp_default_to_top_of_a_fixed_size_stack() {
        let layout = default_layout();
        let mut linker = Linker::new(&layout);
        linker.add_segment("@STACK", 0xFA00, 0x400, vec![]).unwrap();
        linker.add_entrypoint(no_overrides());
        let sp_idx = ENTRY_REGISTERS.iter().position(|r| *r == "SP").unwrap();
        let fp_idx = ENTRY_REGISTERS.iter().position(|r| *r == "FP").unwrap();
        assert_eq!(linker.entries[0][sp_idx], 0xFA00 + 0x400 - 2);
        assert_eq!(linker.entries[0][fp_idx], linker.entries[0][sp_idx]);
    }

    #[test]
    fn unknown_segment_name_is_a_link_error() {
        let layout = default_layout();
        let mut linker = Linker::new(&layout);
        assert_eq!(linker.add_segment("@NOPE", 0, 0, vec![]), Err(LinkError::UnknownSegment("@NOPE".to_string())));
    }

    #[test]
    fn symbol_table_cmd_is_absent_when_no_symbols_were_added() {
        let layout = default_layout();
        let linker = Linker::new(&layout);
        assert!(linker.symbol_table_cmd().is_none());
    }

    #[test]
    fn relocation_against_an_unknown_symbol_is_a_link_error() {
        let layout = default_layout();
        let mut linker = Linker::new(&layout);
        assert_eq!(linker.add_relocation("@missing", 0), Err(LinkError::UnknownSymbol("@missing".to_string())));
    }
}

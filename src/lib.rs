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

pub mod assembler;
pub mod ast;
pub mod errors;
pub mod file_reader;
pub mod isa;
pub mod layout;
pub mod linker;
pub mod parser;

use std::path::PathBuf;

use anyhow::{Context, Result};

use assembler::{AssembleOutput, Assembler};
use file_reader::FileReader;
use layout::Layout;
use linker::Linker;

extern crate pest;
extern crate pest_derive;

/// Drives the assembler then the linker over a set of already-loaded
/// sources, producing the final PEGASUS container bytes. `inputs` pairs
/// each source's text with an optional name used for diagnostics and
/// relative `.import` resolution.
pub fn assemble_and_link<F: FileReader>(
    layout: Layout,
    search_paths: Vec<PathBuf>,
    inputs: Vec<(String, Option<String>)>,
    reader: F,
) -> Result<Vec<u8>> {
    let mut asm = Assembler::new(layout.clone(), search_paths, reader);
    for (source, name) in inputs {
        asm.add_input(source, name);
    }
    let AssembleOutput { segments, symbols, entry } = asm
        .assemble()
        .map_err(|e| anyhow::anyhow!(e.to_string()))
        .context("assembly failed")?;

    let mut linker = Linker::new(&layout);
    for seg in &segments {
        linker
            .add_segment(&seg.name, seg.vmaddr, seg.vmsize, seg.bytes.clone())
            .with_context(|| format!("linking segment {}", seg.name))?;
    }
    for (name, value) in &symbols {
        linker.add_symbol(name, *value);
    }
    if let Some((pc, dpc)) = entry {
        let mut overrides = [None; 15];
        overrides[entry_register_index("PC")] = Some(pc as u16);
        overrides[entry_register_index("DPC")] = Some(dpc as u16);
        linker.add_entrypoint(overrides);
    }

    linker.link_binary().context("linking failed")
}

fn entry_register_index(name: &str) -> usize {
    const REGS: [&str; 15] =
        ["A0", "A1", "A2", "A3", "A4", "A5", "S0", "S1", "S2", "FP", "SP", "RA", "RD", "PC", "DPC"];
    REGS.iter().position(|r| *r == name).expect("register name is always one of the fixed 15")
}

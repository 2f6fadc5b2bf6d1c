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

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use pegasm::assembler::{AssembleOutput, Assembler};
use pegasm::file_reader::{AsmFileReader, FileReader};
use pegasm::isa;
use pegasm::layout::{default_layout, Layout};
use pegasm::linker::Linker;

/// Assembler and linker front end for EAR, producing PEGASUS containers.
#[derive(Parser)]
#[clap(version, author = "Connor Nolan")]
struct Opts {
    /// Source files to assemble, in order; "-" reads standard input.
    #[clap(required = true)]
    inputs: Vec<String>,

    /// Output path; "-" (the default) writes to standard output.
    #[clap(short, long, default_value = "-")]
    output: String,

    /// Additional import search directory; repeatable.
    #[clap(short = 'I', long = "include", value_name = "DIR")]
    search_paths: Vec<PathBuf>,

    /// JSON layout configuration; the built-in default layout is used if omitted.
    #[clap(long, value_name = "FILE")]
    layout: Option<PathBuf>,

    /// Emit a flat, headerless, page-padded concatenation of the named
    /// segments instead of a PEGASUS container; repeatable.
    #[clap(short = 's', long = "segment", value_name = "SEG")]
    segments: Vec<String>,

    /// Dump every exported global symbol's resolved value; "-" (the
    /// default when the flag is bare) writes to standard output.
    #[clap(long, value_name = "FILE", num_args = 0..=1, default_missing_value = "-")]
    dump_symbols: Option<String>,
}

fn read_input(reader: &AsmFileReader, name: &str) -> Result<String> {
    if name == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("reading standard input")?;
        Ok(buf)
    } else {
        reader.read_to_string(std::path::Path::new(name)).with_context(|| format!("reading {name}"))
    }
}

fn write_output(path: &str, bytes: &[u8]) -> Result<()> {
    if path == "-" {
        std::io::stdout().write_all(bytes).context("writing standard output")
    } else {
        std::fs::write(path, bytes).with_context(|| format!("writing {path}"))
    }
}

fn load_layout(path: Option<&PathBuf>) -> Result<Layout> {
    match path {
        None => Ok(default_layout()),
        Some(p) => {
            let text = std::fs::read_to_string(p).with_context(|| format!("reading layout {}", p.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing layout {}", p.display()))
        }
    }
}

fn entry_register_index(name: &str) -> usize {
    const REGS: [&str; 15] =
        ["A0", "A1", "A2", "A3", "A4", "A5", "S0", "S1", "S2", "FP", "SP", "RA", "RD", "PC", "DPC"];
    REGS.iter().position(|r| *r == name).expect("register name is always one of the fixed 15")
}

fn flat_dump(output: &AssembleOutput, names: &[String]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for name in names {
        let seg = output
            .segments
            .iter()
            .find(|s| &s.name == name)
            .ok_or_else(|| anyhow::anyhow!("no such segment '{name}' in assembler output"))?;
        out.extend(&seg.bytes);
        let pos = out.len() as u32;
        let pad = isa::page_ceil(pos) - pos;
        out.extend(std::iter::repeat(0u8).take(pad as usize));
    }
    Ok(out)
}

fn dump_symbols(output: &AssembleOutput, dest: &str) -> Result<()> {
    let mut text = String::new();
    for (name, value) in &output.symbols {
        text.push_str(&format!("{name} = {value:#06x}\n"));
    }
    write_output(dest, text.as_bytes())
}

fn run() -> Result<()> {
    let opts = Opts::parse();
    let layout = load_layout(opts.layout.as_ref())?;
    let reader = AsmFileReader;

    let mut asm = Assembler::new(layout.clone(), opts.search_paths.clone(), reader);
    for name in &opts.inputs {
        let source = read_input(&AsmFileReader, name)?;
        let label = if name == "-" { "<stdin>".to_string() } else { name.clone() };
        asm.add_input(source, Some(label));
    }

    let output = asm
        .assemble()
        .map_err(|e| anyhow::anyhow!(e.to_string()))
        .context("assembly failed")?;
    info!("assembled {} segment(s)", output.segments.len());

    if let Some(dest) = &opts.dump_symbols {
        dump_symbols(&output, dest)?;
    }

    let bytes = if !opts.segments.is_empty() {
        flat_dump(&output, &opts.segments)?
    } else {
        let mut linker = Linker::new(&layout);
        for seg in &output.segments {
            linker
                .add_segment(&seg.name, seg.vmaddr, seg.vmsize, seg.bytes.clone())
                .with_context(|| format!("linking segment {}", seg.name))?;
        }
        for (name, value) in &output.symbols {
            linker.add_symbol(name, *value);
        }
        if let Some((pc, dpc)) = output.entry {
            let mut overrides = [None; 15];
            overrides[entry_register_index("PC")] = Some(pc as u16);
            overrides[entry_register_index("DPC")] = Some(dpc as u16);
            linker.add_entrypoint(overrides);
        }
        linker.link_binary().context("linking failed")?
    };

    write_output(&opts.output, &bytes)?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    if let Err(err) = run() {
        for cause in err.chain() {
            eprintln!("{cause}");
        }
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

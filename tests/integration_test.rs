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

//! End-to-end coverage driving the full assembler -> linker pipeline
//! through the crate's public API, rather than either stage in
//! isolation.

use pegasm::assemble_and_link;
use pegasm::assembler::{AssembleOutput, AssembledSegment, Assembler};
use pegasm::errors::AssemblyError;
use pegasm::file_reader::MockFileReader;
use pegasm::isa;
use pegasm::layout::{default_layout, Layout, SegmentDecl};
use pegasm::linker::Linker;

fn assemble(source: &str) -> AssembleOutput {
    let mut asm = Assembler::new(default_layout(), vec![], MockFileReader::default());
    asm.add_input(source.to_string(), Some("t.asm".to_string()));
    asm.assemble().expect("assembly should succeed")
}

fn segment<'a>(out: &'a AssembleOutput, name: &str) -> &'a AssembledSegment {
    out.segments.iter().find(|s| s.name == name).unwrap_or_else(|| panic!("no segment {name} in output"))
}

fn link(source: &str) -> Vec<u8> {
    assemble_and_link(default_layout(), vec![], vec![(source.to_string(), Some("t.asm".to_string()))], MockFileReader::default())
        .expect("link should succeed")
}

// Minimal PEGASUS decoder used only to check round-tripping; it mirrors
// the container layout described for the linker without pulling in any
// production code, so the check is independent of how the linker itself
// wrote the bytes.
struct DecodedCmd {
    cmdtype: u16,
    payload: Vec<u8>,
}

fn decode_commands(bytes: &[u8]) -> (u16, Vec<DecodedCmd>) {
    assert_eq!(&bytes[0..8], b"\xe4PEGASUS");
    assert_eq!(&bytes[8..12], b"EAR3");
    let cmd_count = u16::from_le_bytes([bytes[12], bytes[13]]);
    let mut cmds = Vec::new();
    let mut off = 14usize;
    for _ in 0..cmd_count {
        let cmdsize = u16::from_le_bytes([bytes[off], bytes[off + 1]]) as usize;
        let cmdtype = u16::from_le_bytes([bytes[off + 2], bytes[off + 3]]);
        let payload = bytes[off + 4..off + cmdsize].to_vec();
        cmds.push(DecodedCmd { cmdtype, payload });
        off += cmdsize;
    }
    (cmd_count, cmds)
}

// --- S1-S14: full-pipeline scenarios from the spec's worked examples ----

#[test]
fn s1_bare_nop_encodes_to_ff() {
    let out = assemble("NOP\n");
    assert_eq!(segment(&out, "@TEXT").bytes, vec![0xff]);
}

#[test]
fn s2_conditional_nop_carries_its_condition_code() {
    let out = assemble("NOP.EQ\n");
    assert_eq!(segment(&out, "@TEXT").bytes, vec![0x1f]);
}

#[test]
fn s3_flag_suppressing_nop_gets_an_xc_prefix() {
    let out = assemble("NOP.NG\n");
    assert_eq!(segment(&out, "@TEXT").bytes, vec![0xc0, 0x1f]);
}

#[test]
fn s4_register_form_add_is_two_bytes() {
    let out = assemble("ADD R3, R4\n");
    assert_eq!(segment(&out, "@TEXT").bytes, vec![0xe0, 0x34]);
}

#[test]
fn s5_immediate_add_carries_the_dpc_sentinel_and_a_word() {
    let out = assemble("ADD R3, 0x1234\n");
    assert_eq!(segment(&out, "@TEXT").bytes, vec![0xe0, 0x3f, 0x34, 0x12]);
}

#[test]
fn s6_relative_branch_to_here_encodes_a_negative_offset() {
    let out = assemble(".loc 0x0100\nBRR @\n");
    assert_eq!(segment(&out, "@TEXT").bytes, vec![0xf5, 0xfd, 0xff]);
}

#[test]
fn s7_zero_increment_folds_into_add_with_zero() {
    let out = assemble("INC R4, 0\n");
    assert_eq!(segment(&out, "@TEXT").bytes, vec![0xe0, 0x40]);
}

#[test]
fn s8_push_a_mixed_register_set() {
    let out = assemble("PSH {R2-R4, R6, R8-FP, RA, RD}\n");
    assert_eq!(segment(&out, "@TEXT").bytes, vec![0xfa, 0x5c, 0x37]);
}

#[test]
fn s9_cross_register_marker_adds_an_xy_prefix() {
    let out = assemble("MOV R1, !R2\n");
    assert_eq!(segment(&out, "@TEXT").bytes, vec![isa::PREFIX_XY, 0xec, 0x12]);
}

#[test]
fn s10_passing_assert_is_silent_and_failing_assert_errors() {
    let out = assemble(".assert 1 == 1\nNOP\n");
    assert_eq!(segment(&out, "@TEXT").bytes, vec![0xff]);

    let mut asm = Assembler::new(default_layout(), vec![], MockFileReader::default());
    asm.add_input(".assert 1 == 42\n".to_string(), Some("t.asm".to_string()));
    assert!(matches!(asm.assemble(), Err(AssemblyError::AssertionFailure { .. })));
}

#[test]
fn s11_three_register_add_gets_a_dr_prefix_when_rd_differs_from_rx() {
    let out = assemble("ADD S0, A1, R10\n");
    assert_eq!(segment(&out, "@TEXT").bytes, vec![0xd7, 0xe0, 0x2a]);
}

#[test]
fn s12_signed_immediate_increments_store_val_minus_one_when_positive() {
    let out = assemble("INC R4, 8\n");
    assert_eq!(segment(&out, "@TEXT").bytes, vec![0xfc, 0x47]);

    let out = assemble("INC R4, -8\n");
    assert_eq!(segment(&out, "@TEXT").bytes, vec![0xfc, 0x48]);
}

#[test]
fn s13_control_register_read_packs_the_register_number_in_the_low_nibble() {
    let out = assemble("RDC R4, MEMBASE_R\n");
    assert_eq!(segment(&out, "@TEXT").bytes, vec![0xee, 0x48]);
}

#[test]
fn s14_reimporting_the_same_file_has_no_duplicate_effect() {
    let mut reader = MockFileReader::default();
    reader.add_file("consts.asm", "$SIZE := 4\n");
    let mut asm = Assembler::new(default_layout(), vec![], reader);
    asm.add_input(
        ".import \"consts.asm\"\n.import \"consts.asm\"\n.db $SIZE\n".to_string(),
        Some("t.asm".to_string()),
    );
    let out = asm.assemble().expect("a file imported twice is not a duplicate-definition error");
    assert_eq!(segment(&out, "@TEXT").bytes, vec![4]);
}

// --- end-to-end PEGASUS container scenarios ------------------------------

#[test]
fn p6_decoded_container_reproduces_the_segment_and_symbol_data_given_to_the_linker() {
    let bytes = link("@start:\nADD R1, R2\n.export @start\n");
    let (cmd_count, cmds) = decode_commands(&bytes);
    assert_eq!(cmd_count as usize, cmds.len());

    // One segment command per emitting segment in the default layout
    // (@PEG, @TEXT, @CONST, @DATA), one entrypoint, one symbol table.
    let segment_cmds: Vec<&DecodedCmd> = cmds.iter().filter(|c| c.cmdtype == 1).collect();
    assert_eq!(segment_cmds.len(), 4);

    let entry_cmds: Vec<&DecodedCmd> = cmds.iter().filter(|c| c.cmdtype == 2).collect();
    assert_eq!(entry_cmds.len(), 1);
    assert_eq!(entry_cmds[0].payload.len(), 15 * 2);

    let symbol_cmds: Vec<&DecodedCmd> = cmds.iter().filter(|c| c.cmdtype == 3).collect();
    assert_eq!(symbol_cmds.len(), 1);
    let count = u16::from_le_bytes([symbol_cmds[0].payload[0], symbol_cmds[0].payload[1]]);
    assert_eq!(count, 1);
}

#[test]
fn container_with_no_exports_and_no_entry_still_links() {
    let bytes = link(".segment @DATA\n.db 1, 2, 3\n");
    let (_, cmds) = decode_commands(&bytes);
    assert!(cmds.iter().all(|c| c.cmdtype != 2));
    assert!(cmds.iter().all(|c| c.cmdtype != 3));
}

#[test]
fn trailing_zero_pages_of_a_segment_are_not_written_to_the_file() {
    // `.align 0x400` after the last byte of @TEXT grows its declared
    // vmsize without adding any bytes to the assembled buffer; the
    // linker only ever writes up to the buffer's last non-zero byte,
    // so the container is the same size either way.
    let plain = link(".db 1\n").len();
    let with_trailing_align = link(".db 1\n.align 0x400\n").len();
    assert_eq!(plain, with_trailing_align);
}

#[test]
fn multi_unit_assembly_merges_segments_by_name() {
    let mut asm = Assembler::new(default_layout(), vec![], MockFileReader::default());
    asm.add_input(".segment @CONST\n.db 1\n".to_string(), Some("a.asm".to_string()));
    asm.add_input(".segment @CONST\n.db 2\n".to_string(), Some("b.asm".to_string()));
    let out = asm.assemble().unwrap();
    assert_eq!(segment(&out, "@CONST").bytes, vec![1, 2]);
}

#[test]
fn import_pulls_in_code_from_a_search_path() {
    let mut reader = MockFileReader::default();
    reader.add_file("lib/helpers.asm", "@helper:\nNOP\nRET\n");
    let search_paths = vec![std::path::PathBuf::from("lib")];
    let mut asm = Assembler::new(default_layout(), search_paths, reader);
    asm.add_input(".import \"helpers.asm\"\n@start:\nBRR @helper\n".to_string(), Some("main.asm".to_string()));
    let out = asm.assemble().expect("import should resolve via the search path");
    assert!(segment(&out, "@TEXT").bytes.len() > 1);
}

#[test]
fn undeclared_segment_reference_is_a_name_error() {
    let mut asm = Assembler::new(default_layout(), vec![], MockFileReader::default());
    asm.add_input(".segment @NOPE\nNOP\n".to_string(), Some("t.asm".to_string()));
    assert!(matches!(asm.assemble(), Err(AssemblyError::NameError { .. })));
}

#[test]
fn import_of_a_missing_file_is_an_io_error() {
    let mut asm = Assembler::new(default_layout(), vec![], MockFileReader::default());
    asm.add_input(".import \"missing.asm\"\n".to_string(), Some("t.asm".to_string()));
    assert!(matches!(asm.assemble(), Err(AssemblyError::IOError { .. })));
}

#[test]
fn value_out_of_range_for_an_8_bit_db_is_a_value_error() {
    let mut asm = Assembler::new(default_layout(), vec![], MockFileReader::default());
    asm.add_input(".db 300\n".to_string(), Some("t.asm".to_string()));
    assert!(matches!(asm.assemble(), Err(AssemblyError::ValueError { .. })));
}

#[test]
fn entrypoint_registers_reflect_the_resolved_start_label_when_linked() {
    let bytes = link("@start:\nNOP\n");
    let (_, cmds) = decode_commands(&bytes);
    let entry = cmds.iter().find(|c| c.cmdtype == 2).expect("default layout declares @start as an entrypoint");
    let pc = u16::from_le_bytes([entry.payload[13 * 2], entry.payload[13 * 2 + 1]]);
    assert_eq!(pc, 0); // @TEXT's base address in the default layout
}

// --- layout-driven linking ------------------------------------------------

fn custom_layout() -> Layout {
    Layout {
        default: "@CODE".to_string(),
        segments: vec![
            SegmentDecl {
                name: "@HDR".to_string(),
                prot: "r".to_string(),
                vmaddr: Some(0),
                vmsize: None,
                emit: true,
                header: true,
                sections: vec![],
            },
            SegmentDecl {
                name: "@CODE".to_string(),
                prot: "rx".to_string(),
                vmaddr: None,
                vmsize: None,
                emit: true,
                header: false,
                sections: vec![],
            },
        ],
        entrypoints: vec!["@entry".to_string()],
    }
}

#[test]
fn a_custom_layout_drives_segment_and_entrypoint_resolution() {
    let layout = custom_layout();
    let mut asm = Assembler::new(layout.clone(), vec![], MockFileReader::default());
    asm.add_input("@entry:\nNOP\n".to_string(), Some("t.asm".to_string()));
    let out = asm.assemble().unwrap();
    assert!(out.entry.is_some());

    let mut linker = Linker::new(&layout);
    for seg in &out.segments {
        linker.add_segment(&seg.name, seg.vmaddr, seg.vmsize, seg.bytes.clone()).unwrap();
    }
    let bytes = linker.link_binary().unwrap();
    let (_, cmds) = decode_commands(&bytes);
    assert_eq!(cmds.iter().filter(|c| c.cmdtype == 1).count(), 2);
}

#[test]
fn layout_parses_from_json_and_round_trips_through_the_linker() {
    let json = r#"{
        "default": "@CODE",
        "segments": [
            {"name": "@HDR", "prot": "r", "vmaddr": 0, "header": true},
            {"name": "@CODE", "prot": "rx"}
        ],
        "entrypoints": ["@entry"]
    }"#;
    let layout: Layout = serde_json::from_str(json).unwrap();
    let bytes = assemble_and_link(
        layout,
        vec![],
        vec![("@entry:\nNOP\n".to_string(), Some("t.asm".to_string()))],
        MockFileReader::default(),
    )
    .unwrap();
    assert_eq!(&bytes[0..8], b"\xe4PEGASUS");
}

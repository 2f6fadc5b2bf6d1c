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

use crate::ast::Opcode;

/// Mnemonic word (no condition/flag suffix) to its opcode tag. This is the
/// "small table that maps mnemonic string -> constructor" the encoding
/// redesign calls for; the constructor itself is just the enum variant
/// since operand shapes live in the shared bag, not per-variant payloads.
pub fn mnemonic_opcode(word: &str) -> Option<Opcode> {
    Some(match word {
        "ADD" => Opcode::Add,
        "SUB" => Opcode::Sub,
        "MLU" => Opcode::Mlu,
        "MLS" => Opcode::Mls,
        "DVU" => Opcode::Dvu,
        "DVS" => Opcode::Dvs,
        "XOR" => Opcode::Xor,
        "AND" => Opcode::And,
        "ORR" => Opcode::Orr,
        "SHL" => Opcode::Shl,
        "SRU" => Opcode::Sru,
        "SRS" => Opcode::Srs,
        "MOV" => Opcode::Mov,
        "CMP" => Opcode::Cmp,
        "RDC" => Opcode::Rdc,
        "WRC" => Opcode::Wrc,
        "LDW" => Opcode::Ldw,
        "STW" => Opcode::Stw,
        "LDB" => Opcode::Ldb,
        "STB" => Opcode::Stb,
        "BRA" => Opcode::Bra,
        "BRR" => Opcode::Brr,
        "FCA" => Opcode::Fca,
        "FCR" => Opcode::Fcr,
        "RDB" => Opcode::Rdb,
        "WRB" => Opcode::Wrb,
        "PSH" => Opcode::Psh,
        "POP" => Opcode::Pop,
        "INC" => Opcode::Inc,
        "BPT" => Opcode::Bpt,
        "HLT" => Opcode::Hlt,
        "NOP" => Opcode::Nop,
        "RET" => Opcode::Ret,
        "DEC" => Opcode::Dec,
        "NEG" => Opcode::Neg,
        "INV" => Opcode::Inv,
        "ADR" => Opcode::Adr,
        "SWP" => Opcode::Swp,
        "ADC" => Opcode::Adc,
        "SBC" => Opcode::Sbc,
        _ => return None,
    })
}

pub fn real_opcode_byte(opcode: Opcode) -> Option<u8> {
    use crate::isa::*;
    Some(match opcode {
        Opcode::Add => OP_ADD,
        Opcode::Sub => OP_SUB,
        Opcode::Mlu => OP_MLU,
        Opcode::Mls => OP_MLS,
        Opcode::Dvu => OP_DVU,
        Opcode::Dvs => OP_DVS,
        Opcode::Xor => OP_XOR,
        Opcode::And => OP_AND,
        Opcode::Orr => OP_ORR,
        Opcode::Shl => OP_SHL,
        Opcode::Sru => OP_SRU,
        Opcode::Srs => OP_SRS,
        Opcode::Mov => OP_MOV,
        Opcode::Cmp => OP_CMP,
        Opcode::Rdc => OP_RDC,
        Opcode::Wrc => OP_WRC,
        Opcode::Ldw => OP_LDW,
        Opcode::Stw => OP_STW,
        Opcode::Ldb => OP_LDB,
        Opcode::Stb => OP_STB,
        Opcode::Bra => OP_BRA,
        Opcode::Brr => OP_BRR,
        Opcode::Fca => OP_FCA,
        Opcode::Fcr => OP_FCR,
        Opcode::Rdb => OP_RDB,
        Opcode::Wrb => OP_WRB,
        Opcode::Psh => OP_PSH,
        Opcode::Pop => OP_POP,
        Opcode::Inc => OP_INC,
        Opcode::Bpt => OP_BPT,
        Opcode::Hlt => OP_HLT,
        Opcode::Nop => OP_NOP,
        _ => return None, // pseudo opcodes have no direct opcode byte
    })
}

/// Inclusive bounds of the ADD/SUB -> INC/DEC fold range.
pub const FOLD_RANGE: (i64, i64) = (-8, 8);

pub fn is_pseudo(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::Ret
            | Opcode::Dec
            | Opcode::Neg
            | Opcode::Inv
            | Opcode::Adr
            | Opcode::Swp
            | Opcode::Adc
            | Opcode::Sbc
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_real_opcode_has_a_byte() {
        for word in [
            "ADD", "SUB", "MLU", "MLS", "DVU", "DVS", "XOR", "AND", "ORR", "SHL", "SRU", "SRS",
            "MOV", "CMP", "RDC", "WRC", "LDW", "STW", "LDB", "STB", "BRA", "BRR", "FCA", "FCR",
            "RDB", "WRB", "PSH", "POP", "INC", "BPT", "HLT", "NOP",
        ] {
            let op = mnemonic_opcode(word).unwrap();
            assert!(real_opcode_byte(op).is_some(), "{word} missing opcode byte");
        }
    }

    #[test]
    fn pseudo_mnemonics_have_no_opcode_byte() {
        for word in ["RET", "DEC", "NEG", "INV", "ADR", "SWP", "ADC", "SBC"] {
            let op = mnemonic_opcode(word).unwrap();
            assert!(is_pseudo(op));
            assert!(real_opcode_byte(op).is_none());
        }
    }
}

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

//! JSON layout configuration: which segments exist, where they sit in
//! virtual memory, and which symbols are candidate entrypoints.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentDecl {
    pub name: String,
    #[serde(default = "default_prot")]
    pub prot: String,
    #[serde(default)]
    pub vmaddr: Option<u32>,
    #[serde(default)]
    pub vmsize: Option<u32>,
    #[serde(default = "default_true")]
    pub emit: bool,
    #[serde(default)]
    pub header: bool,
    #[serde(default)]
    pub sections: Vec<String>,
}

fn default_prot() -> String {
    "rw".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct Layout {
    pub default: String,
    pub segments: Vec<SegmentDecl>,
    #[serde(default)]
    pub entrypoints: Vec<String>,
}

impl SegmentDecl {
    pub fn protection_bits(&self) -> u8 {
        let mut bits = 0u8;
        for c in self.prot.chars() {
            bits |= match c {
                'r' => 1,
                'w' => 2,
                'x' => 4,
                _ => 0,
            };
        }
        bits
    }
}

/// The built-in layout used whenever `--layout` is not given: a header
/// segment, code, read-only constants, initialized data, a stack, and a
/// reserved system segment, mirroring the reference implementation's own
/// example configuration.
pub fn default_layout() -> Layout {
    Layout {
        default: "@TEXT".to_string(),
        segments: vec![
            SegmentDecl {
                name: "@PEG".to_string(),
                prot: "r".to_string(),
                vmaddr: Some(0),
                vmsize: None,
                emit: true,
                header: true,
                sections: vec![],
            },
            SegmentDecl {
                name: "@TEXT".to_string(),
                prot: "rx".to_string(),
                vmaddr: None,
                vmsize: None,
                emit: true,
                header: false,
                sections: vec![],
            },
            SegmentDecl {
                name: "@CONST".to_string(),
                prot: "r".to_string(),
                vmaddr: None,
                vmsize: None,
                emit: true,
                header: false,
                sections: vec![],
            },
            SegmentDecl {
                name: "@DATA".to_string(),
                prot: "rw".to_string(),
                vmaddr: None,
                vmsize: None,
                emit: true,
                header: false,
                sections: vec![],
            },
            SegmentDecl {
                name: "@STACK".to_string(),
                prot: "rw".to_string(),
                vmaddr: None,
                vmsize: Some(0x1000),
                emit: false,
                header: false,
                sections: vec![],
            },
            SegmentDecl {
                name: "@SYS".to_string(),
                prot: "rw".to_string(),
                vmaddr: None,
                vmsize: None,
                emit: false,
                header: false,
                sections: vec![],
            },
        ],
        entrypoints: vec!["@start".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_declares_exactly_one_header_segment() {
        let layout = default_layout();
        assert_eq!(layout.segments.iter().filter(|s| s.header).count(), 1);
    }

    #[test]
    fn protection_bits_pack_rwx() {
        let seg = SegmentDecl {
            name: "@X".to_string(),
            prot: "rwx".to_string(),
            vmaddr: None,
            vmsize: None,
            emit: true,
            header: false,
            sections: vec![],
        };
        assert_eq!(seg.protection_bits(), 0b111);
    }

    #[test]
    fn layout_json_deserializes() {
        let json = r#"{
            "default": "@TEXT",
            "segments": [
                {"name": "@TEXT", "prot": "rx", "emit": true}
            ],
            "entrypoints": ["@start"]
        }"#;
        let layout: Layout = serde_json::from_str(json).unwrap();
        assert_eq!(layout.segments.len(), 1);
        assert_eq!(layout.segments[0].protection_bits(), 0b101);
    }
}

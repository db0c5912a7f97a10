//! Shared helpers: a label-based assembler that round-trips through the
//! crate's own opcode tables, and code-object builders.
#![allow(dead_code)]

use std::collections::HashMap;

use pyrev::{cache_entries, opcode_of, CodeFlags, CodeObject, Const, Opcode, Version};

/// Reverse-resolve the encoding byte for `opcode` under `version`.
pub fn byte_for(version: Version, opcode: Opcode) -> u8 {
    (0..=u8::MAX)
        .find(|&byte| opcode_of(version, byte) == Some(opcode))
        .unwrap_or_else(|| panic!("{opcode:?} is not encodable under {version}"))
}

/// One assembly item.
#[derive(Debug, Clone, Copy)]
pub enum Ins {
    Op(Opcode, u32),
    /// A jump whose argument is resolved from the named label.
    Jump(Opcode, &'static str),
    Label(&'static str),
}

pub use Ins::{Jump, Label, Op};

fn instruction_size(version: Version, opcode: Opcode, byte: u8) -> u32 {
    if version.word_coded() {
        2 + 2 * u32::from(cache_entries(opcode, version))
    } else if byte >= 90 {
        3
    } else {
        1
    }
}

/// Assemble, returning the bytecode and the byte offset of every label.
pub fn assemble_with_labels(
    version: Version,
    items: &[Ins],
) -> (Vec<u8>, HashMap<&'static str, u32>) {
    // First pass: layout.
    let mut offsets = Vec::with_capacity(items.len());
    let mut labels = HashMap::new();
    let mut offset = 0u32;
    for item in items {
        offsets.push(offset);
        match item {
            Ins::Label(name) => {
                labels.insert(*name, offset);
            }
            Ins::Op(op, _) | Ins::Jump(op, _) => {
                offset += instruction_size(version, *op, byte_for(version, *op));
            }
        }
    }

    // Second pass: encode.
    let mut bytes = Vec::new();
    for (item, &start) in items.iter().zip(&offsets) {
        let (op, arg) = match item {
            Ins::Label(_) => continue,
            Ins::Op(op, arg) => (*op, *arg),
            Ins::Jump(op, label) => {
                let target = labels[label];
                let byte = byte_for(version, *op);
                let next = start + instruction_size(version, *op, byte);
                let scale = if version.word_scaled_jumps() { 2 } else { 1 };
                let probe = pyrev::Instruction {
                    opcode: *op,
                    arg: 0,
                    offset: start,
                    size: instruction_size(version, *op, byte),
                    cache_entries: cache_entries(*op, version),
                };
                use pyrev::opcodes::JumpDirection;
                let arg = match probe
                    .jump(version)
                    .expect("jump opcode has jump info")
                    .direction
                {
                    JumpDirection::Absolute => target / scale,
                    JumpDirection::Forward => (target - next) / scale,
                    JumpDirection::Backward => (next - target) / scale,
                };
                (*op, arg)
            }
        };
        let byte = byte_for(version, op);
        assert!(arg <= 0xff, "assembler does not emit EXTENDED_ARG ({op:?} {arg})");
        if version.word_coded() {
            bytes.push(byte);
            bytes.push(arg as u8);
            bytes.extend(std::iter::repeat_n(0u8, usize::from(cache_entries(op, version)) * 2));
        } else if byte >= 90 {
            bytes.push(byte);
            bytes.extend((arg as u16).to_le_bytes());
        } else {
            bytes.push(byte);
        }
    }
    (bytes, labels)
}

pub fn assemble(version: Version, items: &[Ins]) -> Vec<u8> {
    assemble_with_labels(version, items).0
}

/// Encode exception-table entries given in byte offsets.
pub fn encode_exception_table(entries: &[(u32, u32, u32, u32, bool)]) -> Vec<u8> {
    fn varint(mut value: u32, first: bool, out: &mut Vec<u8>) {
        let mut chunks = vec![(value & 0x3f) as u8];
        value >>= 6;
        while value != 0 {
            chunks.push((value & 0x3f) as u8 | 0x40);
            value >>= 6;
        }
        chunks.reverse();
        if first {
            chunks[0] |= 0x80;
        }
        out.extend(chunks);
    }
    let mut out = Vec::new();
    for &(start, end, target, depth, lasti) in entries {
        assert!(start % 2 == 0 && end % 2 == 0 && target % 2 == 0);
        varint(start / 2, true, &mut out);
        varint((end - start) / 2, false, &mut out);
        varint(target / 2, false, &mut out);
        varint(depth << 1 | u32::from(lasti), false, &mut out);
    }
    out
}

pub struct CodeBuilder {
    code: CodeObject,
}

impl CodeBuilder {
    pub fn new(name: &str, version: Version, bytecode: Vec<u8>) -> Self {
        Self {
            code: CodeObject {
                name: name.to_owned(),
                qualname: name.to_owned(),
                code: bytecode,
                consts: Vec::new(),
                names: Vec::new(),
                varnames: Vec::new(),
                freevars: Vec::new(),
                cellvars: Vec::new(),
                argcount: 0,
                posonlyargcount: 0,
                kwonlyargcount: 0,
                flags: CodeFlags::empty(),
                firstlineno: 1,
                linetable: Vec::new(),
                exceptiontable: Vec::new(),
                version,
            },
        }
    }

    pub fn consts(mut self, consts: Vec<Const>) -> Self {
        self.code.consts = consts;
        self
    }

    pub fn names(mut self, names: &[&str]) -> Self {
        self.code.names = names.iter().map(|s| (*s).to_owned()).collect();
        self
    }

    pub fn varnames(mut self, varnames: &[&str]) -> Self {
        self.code.varnames = varnames.iter().map(|s| (*s).to_owned()).collect();
        self
    }

    pub fn argcount(mut self, argcount: u32) -> Self {
        self.code.argcount = argcount;
        self
    }

    pub fn flags(mut self, flags: CodeFlags) -> Self {
        self.code.flags = flags;
        self
    }

    pub fn exceptiontable(mut self, table: Vec<u8>) -> Self {
        self.code.exceptiontable = table;
        self
    }

    pub fn build(self) -> CodeObject {
        self.code
    }
}

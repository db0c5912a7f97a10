//! Bytecode decoding.
//!
//! Turns the raw `co_code` byte stream into canonical [`Instruction`]s:
//! `EXTENDED_ARG` prefixes are folded into the following instruction,
//! inline cache words are absorbed into the instruction size, and jump
//! targets are computed behind one version-aware helper.

use std::{error, fmt};

use crate::opcodes::{self, JumpDirection, JumpInfo, Opcode, HAVE_ARGUMENT};
use crate::version::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    UnknownOpcode(u8),
    TruncatedInstruction,
    TruncatedCache,
    DanglingExtendedArg,
    JumpOutOfRange { target: u32 },
}

/// Malformed bytecode, with the byte offset of the offending instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeError {
    pub offset: u32,
    pub kind: DecodeErrorKind,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DecodeErrorKind::UnknownOpcode(byte) => {
                write!(f, "unknown opcode 0x{byte:02x} at offset {}", self.offset)
            }
            DecodeErrorKind::TruncatedInstruction => {
                write!(f, "truncated instruction at offset {}", self.offset)
            }
            DecodeErrorKind::TruncatedCache => {
                write!(f, "truncated inline cache at offset {}", self.offset)
            }
            DecodeErrorKind::DanglingExtendedArg => {
                write!(f, "dangling EXTENDED_ARG at offset {}", self.offset)
            }
            DecodeErrorKind::JumpOutOfRange { target } => {
                write!(
                    f,
                    "jump at offset {} targets {target}, outside the code object",
                    self.offset
                )
            }
        }
    }
}

impl error::Error for DecodeError {}

/// One decoded unit. `offset + size` is always the next instruction's
/// offset; `EXTENDED_ARG` prefixes and inline caches are part of `size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub arg: u32,
    pub offset: u32,
    pub size: u32,
    pub cache_entries: u8,
}

impl Instruction {
    /// Offset of the instruction that follows this one.
    #[must_use]
    pub fn next_offset(&self) -> u32 {
        self.offset + self.size
    }

    #[must_use]
    pub fn jump(&self, version: Version) -> Option<JumpInfo> {
        opcodes::jump_info(self.opcode, version)
    }

    /// The byte offset this instruction transfers control to, for jumps
    /// and `SETUP_*` targets.
    #[must_use]
    pub fn jump_target(&self, version: Version) -> Option<u32> {
        let info = self.jump(version)?;
        let scale = if version.word_scaled_jumps() { 2 } else { 1 };
        let arg = self.arg * scale;
        Some(match info.direction {
            JumpDirection::Absolute => arg,
            JumpDirection::Forward => self.next_offset() + arg,
            JumpDirection::Backward => self.next_offset().saturating_sub(arg),
        })
    }

    #[must_use]
    pub fn is_conditional_jump(&self, version: Version) -> bool {
        self.jump(version).is_some_and(JumpInfo::is_conditional)
    }

    #[must_use]
    pub fn is_unconditional_jump(&self, version: Version) -> bool {
        self.jump(version)
            .is_some_and(|info| matches!(info.kind, opcodes::JumpKind::Unconditional))
    }

    /// Whether control never falls through to the next instruction.
    #[must_use]
    pub fn ends_block(&self, version: Version) -> bool {
        matches!(
            self.opcode,
            Opcode::ReturnValue
                | Opcode::ReturnConst
                | Opcode::RaiseVarargs
                | Opcode::Reraise
                | Opcode::BreakLoop
                | Opcode::ContinueLoop
        ) || self.is_unconditional_jump(version)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>6} {}", self.offset, self.opcode.mnemonic())?;
        if self.arg != 0 || self.size > 1 {
            write!(f, " {}", self.arg)?;
        }
        Ok(())
    }
}

/// Iterator over decoded instructions.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    bytes: &'a [u8],
    version: Version,
    pos: usize,
    ext_arg: u32,
    ext_start: Option<u32>,
}

/// Decode `bytes` lazily under `version`.
#[must_use]
pub fn decode(bytes: &[u8], version: Version) -> Decoder<'_> {
    Decoder {
        bytes,
        version,
        pos: 0,
        ext_arg: 0,
        ext_start: None,
    }
}

/// Decode the whole stream eagerly.
pub fn decode_all(bytes: &[u8], version: Version) -> Result<Vec<Instruction>, DecodeError> {
    decode(bytes, version).collect()
}

impl Decoder<'_> {
    fn next_word_coded(&mut self) -> Option<Result<Instruction, DecodeError>> {
        loop {
            if self.pos >= self.bytes.len() {
                return self.ext_start.take().map(|offset| {
                    Err(DecodeError {
                        offset,
                        kind: DecodeErrorKind::DanglingExtendedArg,
                    })
                });
            }
            let start = self.ext_start.unwrap_or(self.pos as u32);
            if self.pos + 2 > self.bytes.len() {
                self.pos = self.bytes.len();
                return Some(Err(DecodeError {
                    offset: start,
                    kind: DecodeErrorKind::TruncatedInstruction,
                }));
            }
            let byte = self.bytes[self.pos];
            let arg_byte = self.bytes[self.pos + 1];
            self.pos += 2;

            let Some(opcode) = opcodes::opcode_of(self.version, byte) else {
                return Some(Err(DecodeError {
                    offset: start,
                    kind: DecodeErrorKind::UnknownOpcode(byte),
                }));
            };
            if opcode == Opcode::ExtendedArg {
                self.ext_arg = (self.ext_arg << 8) | u32::from(arg_byte);
                self.ext_start.get_or_insert(start);
                continue;
            }
            let arg = (self.ext_arg << 8) | u32::from(arg_byte);
            self.ext_arg = 0;
            self.ext_start = None;

            let cache_entries = opcodes::cache_entries(opcode, self.version);
            let cache_bytes = usize::from(cache_entries) * 2;
            if self.pos + cache_bytes > self.bytes.len() {
                self.pos = self.bytes.len();
                return Some(Err(DecodeError {
                    offset: start,
                    kind: DecodeErrorKind::TruncatedCache,
                }));
            }
            self.pos += cache_bytes;

            return Some(Ok(Instruction {
                opcode,
                arg,
                offset: start,
                size: self.pos as u32 - start,
                cache_entries,
            }));
        }
    }

    fn next_variable_length(&mut self) -> Option<Result<Instruction, DecodeError>> {
        loop {
            if self.pos >= self.bytes.len() {
                return self.ext_start.take().map(|offset| {
                    Err(DecodeError {
                        offset,
                        kind: DecodeErrorKind::DanglingExtendedArg,
                    })
                });
            }
            let start = self.ext_start.unwrap_or(self.pos as u32);
            let byte = self.bytes[self.pos];
            let Some(opcode) = opcodes::opcode_of(self.version, byte) else {
                return Some(Err(DecodeError {
                    offset: start,
                    kind: DecodeErrorKind::UnknownOpcode(byte),
                }));
            };
            if byte < HAVE_ARGUMENT {
                self.pos += 1;
                self.ext_arg = 0;
                self.ext_start = None;
                return Some(Ok(Instruction {
                    opcode,
                    arg: 0,
                    offset: start,
                    size: self.pos as u32 - start,
                    cache_entries: 0,
                }));
            }
            if self.pos + 3 > self.bytes.len() {
                self.pos = self.bytes.len();
                return Some(Err(DecodeError {
                    offset: start,
                    kind: DecodeErrorKind::TruncatedInstruction,
                }));
            }
            let word =
                u32::from(self.bytes[self.pos + 1]) | (u32::from(self.bytes[self.pos + 2]) << 8);
            self.pos += 3;
            if opcode == Opcode::ExtendedArg {
                self.ext_arg = (self.ext_arg << 16) | word;
                self.ext_start.get_or_insert(start);
                continue;
            }
            let arg = (self.ext_arg << 16) | word;
            self.ext_arg = 0;
            self.ext_start = None;
            return Some(Ok(Instruction {
                opcode,
                arg,
                offset: start,
                size: self.pos as u32 - start,
                cache_entries: 0,
            }));
        }
    }
}

impl Iterator for Decoder<'_> {
    type Item = Result<Instruction, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.version.word_coded() {
            self.next_word_coded()
        } else {
            self.next_variable_length()
        }
    }
}

/// Reject malformed bytecode without building anything.
///
/// Beyond per-instruction checks this verifies every jump target lands on
/// a decoded instruction boundary inside the code object.
pub fn validate(bytes: &[u8], version: Version) -> Result<(), DecodeError> {
    let instructions = decode_all(bytes, version)?;
    let starts: Vec<u32> = instructions.iter().map(|i| i.offset).collect();
    for instruction in &instructions {
        if let Some(target) = instruction.jump_target(version) {
            if target as usize >= bytes.len() || starts.binary_search(&target).is_err() {
                return Err(DecodeError {
                    offset: instruction.offset,
                    kind: DecodeErrorKind::JumpOutOfRange { target },
                });
            }
        }
    }
    Ok(())
}

//! Decoder-layer tests: version gates, the exception-table varint parser,
//! the per-version opcode tables, and instruction decoding.

mod common;

use common::byte_for;
use pyrev::ast::{BinOp, CmpOp};
use pyrev::code::{parse_exception_table, ExceptionTableError};
use pyrev::decode::DecodeErrorKind;
use pyrev::opcodes::{compare_from_arg, jump_info, BinaryOpArg, JumpDirection, JumpKind};
use pyrev::{cache_entries, decode_all, validate, ExceptionEntry, Instruction, Opcode, Version};

#[test]
fn version_comparators() {
    assert!(Version::V3_11.gte(3, 11));
    assert!(Version::V3_11.gte(3, 6));
    assert!(Version::V3_11.lt(3, 12));
    assert!(Version::V2_7.lt(3, 0));
    assert!(!Version::V2_7.word_coded());
    assert!(Version::V3_6.word_coded());
    assert!(!Version::V3_9.word_scaled_jumps());
    assert!(Version::V3_10.word_scaled_jumps());
    assert!(!Version::V3_10.has_exception_table());
    assert!(Version::V3_11.has_exception_table());
}

#[test]
fn extended_arg_width() {
    assert_eq!(16, Version::V2_7.extended_arg_shift());
    assert_eq!(8, Version::V3_12.extended_arg_shift());
}

fn encode_varint(mut value: u32, first: bool, out: &mut Vec<u8>) {
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

fn encode_entry(start: u32, size: u32, target: u32, depth: u32, lasti: bool) -> Vec<u8> {
    let mut out = Vec::new();
    encode_varint(start, true, &mut out);
    encode_varint(size, false, &mut out);
    encode_varint(target, false, &mut out);
    encode_varint(depth << 1 | u32::from(lasti), false, &mut out);
    out
}

#[test]
fn exception_table_parses_single_entry() {
    let raw = encode_entry(2, 3, 10, 1, false);
    let entries = parse_exception_table(&raw).unwrap();
    assert_eq!(
        entries,
        vec![ExceptionEntry {
            start: 4,
            end: 10,
            target: 20,
            depth: 1,
            push_lasti: false,
        }]
    );
    assert!(entries[0].covers(4));
    assert!(entries[0].covers(8));
    assert!(!entries[0].covers(10));
}

#[test]
fn exception_table_parses_multibyte_values() {
    // start = 100 code units needs two varint bytes
    let raw = encode_entry(100, 1, 101, 0, true);
    let entries = parse_exception_table(&raw).unwrap();
    assert_eq!(entries[0].start, 200);
    assert_eq!(entries[0].end, 202);
    assert_eq!(entries[0].target, 202);
    assert!(entries[0].push_lasti);
}

#[test]
fn exception_table_rejects_missing_marker() {
    assert_eq!(
        parse_exception_table(&[0x01]),
        Err(ExceptionTableError::MissingEntryMarker { position: 0 })
    );
}

#[test]
fn exception_table_rejects_truncated_entry() {
    let mut raw = encode_entry(2, 3, 10, 0, false);
    raw.truncate(raw.len() - 1);
    raw.push(0x40); // continuation with nothing after it
    assert_eq!(parse_exception_table(&raw), Err(ExceptionTableError::Truncated));
}

#[test]
fn empty_exception_table_is_empty() {
    assert!(parse_exception_table(&[]).unwrap().is_empty());
}

#[test]
fn canonical_names_are_stable() {
    assert_eq!("LOAD_CONST", Opcode::LoadConst.mnemonic());
    assert_eq!("POP_JUMP_IF_FALSE", Opcode::PopJumpIfFalse.mnemonic());
}

#[test]
fn same_byte_resolves_per_version() {
    // 121 is SETUP_EXCEPT in 2.7, JUMP_IF_NOT_EXC_MATCH in 3.9,
    // RETURN_CONST in 3.12.
    assert_eq!(Some(Opcode::SetupExcept), pyrev::opcode_of(Version::V2_7, 121));
    assert_eq!(
        Some(Opcode::JumpIfNotExcMatch),
        pyrev::opcode_of(Version::V3_9, 121)
    );
    assert_eq!(Some(Opcode::ReturnConst), pyrev::opcode_of(Version::V3_12, 121));
}

#[test]
fn unknown_bytes_are_rejected() {
    assert_eq!(None, pyrev::opcode_of(Version::V3_11, 255));
    assert_eq!(None, pyrev::opcode_of(Version::V2_7, 0));
}

#[test]
fn jump_semantics_shift_at_3_11() {
    let pre = jump_info(Opcode::PopJumpIfFalse, Version::V3_10).unwrap();
    assert_eq!(pre.direction, JumpDirection::Absolute);
    let post = jump_info(Opcode::PopJumpIfFalse, Version::V3_12).unwrap();
    assert_eq!(post.direction, JumpDirection::Forward);
    let fwd = jump_info(Opcode::PopJumpForwardIfTrue, Version::V3_11).unwrap();
    assert_eq!(fwd.kind, JumpKind::IfTrue);
    assert_eq!(fwd.direction, JumpDirection::Forward);
}

#[test]
fn setup_targets_are_not_branches() {
    let setup = jump_info(Opcode::SetupFinally, Version::V3_8).unwrap();
    assert!(!setup.is_branch());
    assert!(!setup.is_conditional());
}

#[test]
fn caches_only_after_3_10() {
    assert_eq!(0, cache_entries(Opcode::LoadAttr, Version::V3_10));
    assert_eq!(4, cache_entries(Opcode::LoadAttr, Version::V3_11));
    assert_eq!(9, cache_entries(Opcode::LoadAttr, Version::V3_12));
}

#[test]
fn compare_arg_scaling() {
    assert_eq!(Some(CmpOp::Lt), compare_from_arg(0, Version::V3_9));
    assert_eq!(Some(CmpOp::Eq), compare_from_arg((2 << 4) | 0b1000, Version::V3_12));
    assert_eq!(Some(CmpOp::Gt), compare_from_arg(4 << 5, Version::V3_13));
    assert_eq!(Some(CmpOp::Is), compare_from_arg(8, Version::V2_7));
    // exception-match pseudo comparison never lowers
    assert_eq!(None, compare_from_arg(10, Version::V2_7));
}

#[test]
fn binary_op_args_map_to_ast() {
    assert_eq!(Some(BinOp::Add), BinaryOpArg::Add.ast_op());
    assert!(BinaryOpArg::InplaceAdd.is_inplace());
    assert_eq!(BinaryOpArg::try_from(10u8), Ok(BinaryOpArg::Subtract));
    assert!(BinaryOpArg::try_from(200u8).is_err());
}

#[test]
fn decodes_word_coded_stream() {
    let v = Version::V3_9;
    let code = [
        byte_for(v, Opcode::LoadConst),
        0,
        byte_for(v, Opcode::ReturnValue),
        0,
    ];
    let instructions = decode_all(&code, v).unwrap();
    assert_eq!(2, instructions.len());
    assert_eq!(Opcode::LoadConst, instructions[0].opcode);
    assert_eq!(0, instructions[0].offset);
    assert_eq!(2, instructions[0].size);
    assert_eq!(2, instructions[1].offset);
    assert_eq!(instructions[0].next_offset(), instructions[1].offset);
}

#[test]
fn folds_extended_arg() {
    let v = Version::V3_9;
    let code = [
        byte_for(v, Opcode::ExtendedArg),
        1,
        byte_for(v, Opcode::LoadConst),
        2,
        byte_for(v, Opcode::ReturnValue),
        0,
    ];
    let instructions = decode_all(&code, v).unwrap();
    assert_eq!(2, instructions.len());
    assert_eq!(Opcode::LoadConst, instructions[0].opcode);
    assert_eq!(0x0102, instructions[0].arg);
    assert_eq!(0, instructions[0].offset);
    assert_eq!(4, instructions[0].size);
    assert_eq!(4, instructions[1].offset);
}

#[test]
fn folds_extended_arg_pre_3_6() {
    let v = Version::V2_7;
    let code = [
        byte_for(v, Opcode::ExtendedArg),
        1,
        0,
        byte_for(v, Opcode::LoadConst),
        2,
        0,
        byte_for(v, Opcode::ReturnValue),
    ];
    let instructions = decode_all(&code, v).unwrap();
    assert_eq!(2, instructions.len());
    assert_eq!((1 << 16) | 2, instructions[0].arg);
    assert_eq!(6, instructions[0].size);
    assert_eq!(Opcode::ReturnValue, instructions[1].opcode);
    assert_eq!(1, instructions[1].size);
}

#[test]
fn rejects_dangling_extended_arg() {
    let v = Version::V3_9;
    let code = [byte_for(v, Opcode::ExtendedArg), 1];
    let err = decode_all(&code, v).unwrap_err();
    assert_eq!(DecodeErrorKind::DanglingExtendedArg, err.kind);
}

#[test]
fn rejects_unknown_opcode() {
    let err = decode_all(&[255, 0], Version::V3_11).unwrap_err();
    assert_eq!(DecodeErrorKind::UnknownOpcode(255), err.kind);
}

#[test]
fn rejects_truncated_cache() {
    let v = Version::V3_11;
    // LOAD_GLOBAL carries five cache words in 3.11; provide none.
    let code = [byte_for(v, Opcode::LoadGlobal), 0];
    let err = decode_all(&code, v).unwrap_err();
    assert_eq!(DecodeErrorKind::TruncatedCache, err.kind);
}

#[test]
fn skips_inline_caches() {
    let v = Version::V3_11;
    let mut code = vec![byte_for(v, Opcode::LoadGlobal), 0];
    code.extend([0u8; 10]); // five cache words
    code.extend([byte_for(v, Opcode::ReturnValue), 0]);
    let instructions = decode_all(&code, v).unwrap();
    assert_eq!(2, instructions.len());
    assert_eq!(5, instructions[0].cache_entries);
    assert_eq!(12, instructions[0].size);
    assert_eq!(12, instructions[1].offset);
}

#[test]
fn jump_targets_scale_per_version() {
    // Pre-3.10: byte-offset args.
    let pre = Instruction {
        opcode: Opcode::JumpForward,
        arg: 6,
        offset: 10,
        size: 2,
        cache_entries: 0,
    };
    assert_eq!(Some(18), pre.jump_target(Version::V3_9));
    // 3.10+: word-scaled.
    assert_eq!(Some(24), pre.jump_target(Version::V3_10));
    // Absolute pre-3.11 conditional.
    let abs = Instruction {
        opcode: Opcode::PopJumpIfFalse,
        arg: 7,
        offset: 30,
        size: 2,
        cache_entries: 0,
    };
    assert_eq!(Some(7), abs.jump_target(Version::V3_9));
    assert_eq!(Some(14), abs.jump_target(Version::V3_10));
    // 3.11 backward form.
    let back = Instruction {
        opcode: Opcode::JumpBackward,
        arg: 3,
        offset: 20,
        size: 2,
        cache_entries: 0,
    };
    assert_eq!(Some(16), back.jump_target(Version::V3_11));
}

#[test]
fn validate_rejects_out_of_range_jump() {
    let v = Version::V3_9;
    let code = [
        byte_for(v, Opcode::JumpForward),
        40,
        byte_for(v, Opcode::ReturnValue),
        0,
    ];
    let err = validate(&code, v).unwrap_err();
    assert!(matches!(err.kind, DecodeErrorKind::JumpOutOfRange { .. }));
}

#[test]
fn validate_accepts_well_formed_stream() {
    let v = Version::V3_9;
    let code = [
        byte_for(v, Opcode::LoadConst),
        0,
        byte_for(v, Opcode::PopJumpIfFalse),
        6, // absolute byte offset
        byte_for(v, Opcode::LoadConst),
        1,
        byte_for(v, Opcode::ReturnValue),
        0,
    ];
    validate(&code, v).unwrap();
}

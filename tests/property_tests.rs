//! Property tests over the decoder and CFG builder: totality, offset
//! coverage and edge mirroring must hold for every stream the decoder
//! accepts, and decoding must be deterministic on arbitrary bytes.

mod common;

use common::{assemble, Jump, Label, Op};
use proptest::prelude::*;
use pyrev::{decode_all, validate, Cfg, Opcode, Version};

fn straight_line_opcode() -> impl Strategy<Value = (Opcode, u32)> {
    prop_oneof![
        (Just(Opcode::LoadConst), 0u32..8),
        (Just(Opcode::LoadName), 0u32..8),
        (Just(Opcode::StoreName), 0u32..8),
        (Just(Opcode::BinaryAdd), Just(0u32)),
        (Just(Opcode::PopTop), Just(0u32)),
        (Just(Opcode::Nop), Just(0u32)),
        (Just(Opcode::DupTop), Just(0u32)),
        (Just(Opcode::BuildTuple), 0u32..4),
    ]
}

proptest! {
    /// Decoding never panics and is deterministic on arbitrary input.
    #[test]
    fn decode_is_total_and_deterministic(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let first = decode_all(&bytes, Version::V3_9);
        let second = decode_all(&bytes, Version::V3_9);
        prop_assert_eq!(first, second);
        // 3.11 differs only in tables and caches, not in totality.
        let _ = decode_all(&bytes, Version::V3_11);
        let _ = decode_all(&bytes, Version::V2_7);
    }

    /// Well-formed streams decode to contiguous instructions.
    #[test]
    fn assembled_streams_decode_contiguously(
        ops in proptest::collection::vec(straight_line_opcode(), 1..64),
    ) {
        let v = Version::V3_9;
        let mut items: Vec<common::Ins> = ops
            .iter()
            .map(|&(op, arg)| Op(op, arg))
            .collect();
        items.push(Op(Opcode::ReturnValue, 0));
        let bytes = assemble(v, &items);
        let instructions = decode_all(&bytes, v).unwrap();
        prop_assert_eq!(instructions.len(), items.len());
        let mut offset = 0;
        for instruction in &instructions {
            prop_assert_eq!(instruction.offset, offset);
            offset = instruction.next_offset();
        }
        prop_assert_eq!(offset as usize, bytes.len());
        validate(&bytes, v).unwrap();
    }

    /// CFG totality and mirrored edges on straight-line programs split by
    /// a conditional.
    #[test]
    fn cfg_invariants_hold(
        prefix in proptest::collection::vec(straight_line_opcode(), 1..16),
        suffix in proptest::collection::vec(straight_line_opcode(), 1..16),
    ) {
        let v = Version::V3_9;
        let mut items: Vec<common::Ins> = vec![
            Op(Opcode::LoadName, 0),
            Jump(Opcode::PopJumpIfFalse, "other"),
        ];
        items.extend(prefix.iter().map(|&(op, arg)| Op(op, arg)));
        items.push(Op(Opcode::LoadConst, 0));
        items.push(Op(Opcode::ReturnValue, 0));
        items.push(Label("other"));
        items.extend(suffix.iter().map(|&(op, arg)| Op(op, arg)));
        items.push(Op(Opcode::LoadConst, 0));
        items.push(Op(Opcode::ReturnValue, 0));
        let bytes = assemble(v, &items);
        let cfg = Cfg::build(&bytes, v).unwrap();

        // Every instruction offset lies in exactly one block.
        for instruction in &cfg.instructions {
            let containing = cfg
                .blocks
                .iter()
                .filter(|b| b.start_offset <= instruction.offset && instruction.offset < b.end_offset)
                .count();
            prop_assert_eq!(1, containing);
        }
        // Predecessor and successor lists mirror each other.
        for block in &cfg.blocks {
            for edge in &block.successors {
                prop_assert!(cfg.blocks[edge.target as usize]
                    .predecessors
                    .contains(&block.id));
            }
            for &pred in &block.predecessors {
                prop_assert!(cfg.blocks[pred as usize]
                    .successors
                    .iter()
                    .any(|e| e.target == block.id));
            }
        }
    }
}

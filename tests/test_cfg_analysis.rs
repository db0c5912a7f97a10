//! Graph-layer tests: CFG construction, dominator and post-dominator
//! analysis, loop membership, and pattern recognition.

mod common;

use common::{assemble, Ins, Op};
use pyrev::cfg::EdgeKind;
use pyrev::dom::{DomTree, LoopInfo, PostDomTree};
use pyrev::patterns::{Analysis, DetectOpts, Pattern, Recognizer};
use pyrev::{Cfg, ExceptionEntry, Opcode, Version};

fn asm(version: Version, ops: &[(Opcode, u32)]) -> Vec<u8> {
    let items: Vec<Ins> = ops.iter().map(|&(op, arg)| Op(op, arg)).collect();
    assemble(version, &items)
}

fn analyze(version: Version, ops: &[(Opcode, u32)]) -> Analysis {
    Analysis::analyze(Cfg::build(&asm(version, ops), version).unwrap())
}

// ---------------------------------------------------------------------
// CFG construction
// ---------------------------------------------------------------------

#[test]
fn straight_line_is_one_block() {
    let v = Version::V3_9;
    let code = asm(
        v,
        &[
            (Opcode::LoadConst, 0),
            (Opcode::StoreName, 0),
            (Opcode::LoadConst, 1),
            (Opcode::ReturnValue, 0),
        ],
    );
    let cfg = Cfg::build(&code, v).unwrap();
    assert_eq!(1, cfg.blocks.len());
    assert_eq!(4, cfg.instructions_of(0).len());
    assert!(cfg.block(0).successors.is_empty());
}

#[test]
fn conditional_splits_into_diamond() {
    let v = Version::V3_9;
    // 0: LOAD_NAME x; 2: POP_JUMP_IF_FALSE 8; 4: LOAD_CONST 0;
    // 6: RETURN_VALUE; 8: LOAD_CONST 1; 10: RETURN_VALUE
    let code = asm(
        v,
        &[
            (Opcode::LoadName, 0),
            (Opcode::PopJumpIfFalse, 8),
            (Opcode::LoadConst, 0),
            (Opcode::ReturnValue, 0),
            (Opcode::LoadConst, 1),
            (Opcode::ReturnValue, 0),
        ],
    );
    let cfg = Cfg::build(&code, v).unwrap();
    assert_eq!(3, cfg.blocks.len());
    let entry = cfg.block(0);
    assert!(entry.has_conditional_exit());
    assert_eq!(Some(1), entry.successor_by_kind(EdgeKind::ConditionalTrue));
    assert_eq!(Some(2), entry.successor_by_kind(EdgeKind::ConditionalFalse));
    assert_eq!(&[0u32][..], &cfg.block(1).predecessors[..]);
    assert_eq!(&[0u32][..], &cfg.block(2).predecessors[..]);
}

#[test]
fn backward_jump_marks_loop_header() {
    let v = Version::V3_9;
    let code = asm(
        v,
        &[
            (Opcode::LoadName, 0),
            (Opcode::PopJumpIfFalse, 8),
            (Opcode::PopTop, 0),
            (Opcode::JumpAbsolute, 0),
            (Opcode::LoadConst, 0),
            (Opcode::ReturnValue, 0),
        ],
    );
    let cfg = Cfg::build(&code, v).unwrap();
    assert!(cfg.block(0).is_loop_header);
    let body = cfg.block(1);
    assert_eq!(
        Some(EdgeKind::LoopBack),
        body.successors.first().map(|e| e.kind)
    );
}

#[test]
fn every_offset_is_covered_once() {
    let v = Version::V3_9;
    let code = asm(
        v,
        &[
            (Opcode::LoadName, 0),
            (Opcode::PopJumpIfFalse, 8),
            (Opcode::LoadConst, 0),
            (Opcode::ReturnValue, 0),
            (Opcode::LoadConst, 1),
            (Opcode::ReturnValue, 0),
        ],
    );
    let cfg = Cfg::build(&code, v).unwrap();
    for instruction in &cfg.instructions {
        let containing: Vec<_> = cfg
            .blocks
            .iter()
            .filter(|b| {
                b.start_offset <= instruction.offset && instruction.offset < b.end_offset
            })
            .collect();
        assert_eq!(1, containing.len(), "offset {}", instruction.offset);
    }
}

#[test]
fn predecessors_mirror_successors() {
    let v = Version::V3_9;
    let code = asm(
        v,
        &[
            (Opcode::LoadName, 0),
            (Opcode::PopJumpIfFalse, 8),
            (Opcode::LoadConst, 0),
            (Opcode::JumpForward, 2),
            (Opcode::LoadConst, 1),
            (Opcode::ReturnValue, 0),
        ],
    );
    let cfg = Cfg::build(&code, v).unwrap();
    for block in &cfg.blocks {
        for edge in &block.successors {
            assert!(cfg.block(edge.target).predecessors.contains(&block.id));
        }
        for &pred in &block.predecessors {
            assert!(cfg
                .block(pred)
                .successors
                .iter()
                .any(|e| e.target == block.id));
        }
    }
}

#[test]
fn exception_table_adds_handler_edges() {
    let v = Version::V3_11;
    // 0: NOP; 2: NOP; 4: RETURN_VALUE | handler at 6: POP_TOP; 8: RETURN_VALUE
    let code = asm(
        v,
        &[
            (Opcode::Nop, 0),
            (Opcode::Nop, 0),
            (Opcode::ReturnValue, 0),
            (Opcode::PopTop, 0),
            (Opcode::ReturnValue, 0),
        ],
    );
    let entries = vec![ExceptionEntry {
        start: 0,
        end: 4,
        target: 6,
        depth: 0,
        push_lasti: false,
    }];
    let cfg = Cfg::build_with_exceptions(&code, &entries, v).unwrap();
    let handler = cfg.block_at_offset(6).unwrap();
    assert!(cfg.block(handler).is_exception_handler);
    let covered = cfg.block_containing(0).unwrap();
    assert!(covered.exception_successors().any(|t| t == handler));
}

#[test]
fn block_lookup_by_offset() {
    let v = Version::V3_9;
    let code = asm(
        v,
        &[
            (Opcode::LoadName, 0),
            (Opcode::PopJumpIfFalse, 6),
            (Opcode::Nop, 0),
            (Opcode::ReturnValue, 0),
        ],
    );
    let cfg = Cfg::build(&code, v).unwrap();
    assert_eq!(Some(0), cfg.block_at_offset(0));
    assert_eq!(None, cfg.block_at_offset(2));
    let inside = cfg.block_containing(2).unwrap();
    assert_eq!(0, inside.id);
    assert!(cfg.block_containing(100).is_none());
}

// ---------------------------------------------------------------------
// Dominators and loops
// ---------------------------------------------------------------------

fn diamond() -> Cfg {
    let v = Version::V3_9;
    // 0: cond; 1: then; 2: else; 3: merge
    let code = asm(
        v,
        &[
            (Opcode::LoadName, 0),
            (Opcode::PopJumpIfFalse, 10),
            (Opcode::LoadConst, 0),
            (Opcode::StoreName, 1),
            (Opcode::JumpForward, 4),
            (Opcode::LoadConst, 1),
            (Opcode::StoreName, 1),
            (Opcode::LoadConst, 2),
            (Opcode::ReturnValue, 0),
        ],
    );
    Cfg::build(&code, v).unwrap()
}

#[test]
fn entry_dominates_everything() {
    let cfg = diamond();
    let dom = DomTree::dominators(&cfg);
    for block in &cfg.blocks {
        assert!(dom.dominates(0, block.id), "block {}", block.id);
    }
}

#[test]
fn branch_blocks_do_not_dominate_merge() {
    let cfg = diamond();
    assert_eq!(4, cfg.blocks.len());
    let dom = DomTree::dominators(&cfg);
    assert!(!dom.dominates(1, 3));
    assert!(!dom.dominates(2, 3));
    assert_eq!(Some(0), dom.immediate_dom(3));
}

#[test]
fn merge_point_of_diamond() {
    let cfg = diamond();
    let post = PostDomTree::post_dominators(&cfg);
    assert_eq!(Some(3), post.merge(1, 2));
    assert_eq!(Some(3), post.immediate_post_dom(1));
}

#[test]
fn merge_of_two_terminal_branches_is_none() {
    let v = Version::V3_9;
    let code = asm(
        v,
        &[
            (Opcode::LoadName, 0),
            (Opcode::PopJumpIfFalse, 8),
            (Opcode::LoadConst, 0),
            (Opcode::ReturnValue, 0),
            (Opcode::LoadConst, 1),
            (Opcode::ReturnValue, 0),
        ],
    );
    let cfg = Cfg::build(&code, v).unwrap();
    let post = PostDomTree::post_dominators(&cfg);
    assert_eq!(None, post.merge(1, 2));
}

#[test]
fn natural_loop_membership() {
    let v = Version::V3_9;
    // 0: header (cond); 1: body; 2: exit
    let code = asm(
        v,
        &[
            (Opcode::LoadName, 0),
            (Opcode::PopJumpIfFalse, 8),
            (Opcode::PopTop, 0),
            (Opcode::JumpAbsolute, 0),
            (Opcode::LoadConst, 0),
            (Opcode::ReturnValue, 0),
        ],
    );
    let cfg = Cfg::build(&code, v).unwrap();
    let dom = DomTree::dominators(&cfg);
    let loops = LoopInfo::compute(&cfg, &dom);
    assert_eq!(&[0u32][..], loops.headers());
    assert!(loops.is_in_loop(0, 0));
    assert!(loops.is_in_loop(1, 0));
    assert!(!loops.is_in_loop(2, 0));
    assert_eq!(Some(0), loops.innermost_containing(1));
    assert_eq!(None, loops.innermost_containing(2));
}

// ---------------------------------------------------------------------
// Pattern recognition
// ---------------------------------------------------------------------

#[test]
fn plain_if_with_else() {
    let a = analyze(
        Version::V3_9,
        &[
            (Opcode::LoadName, 0),
            (Opcode::PopJumpIfFalse, 10),
            (Opcode::LoadConst, 0),
            (Opcode::StoreName, 1),
            (Opcode::JumpForward, 4),
            (Opcode::LoadConst, 1),
            (Opcode::StoreName, 1),
            (Opcode::LoadConst, 2),
            (Opcode::ReturnValue, 0),
        ],
    );
    let mut rec = Recognizer::new();
    match rec.detect(&a, 0, DetectOpts::default()) {
        Pattern::If(p) => {
            assert_eq!(0, p.cond);
            assert_eq!(1, p.then);
            assert_eq!(Some(2), p.orelse);
            assert_eq!(Some(3), p.merge);
            assert!(!p.is_elif);
        }
        other => panic!("expected if, got {other:?}"),
    }
}

#[test]
fn if_without_else() {
    let a = analyze(
        Version::V3_9,
        &[
            (Opcode::LoadName, 0),
            (Opcode::PopJumpIfFalse, 8),
            (Opcode::LoadConst, 0),
            (Opcode::StoreName, 1),
            (Opcode::LoadConst, 1),
            (Opcode::ReturnValue, 0),
        ],
    );
    let mut rec = Recognizer::new();
    match rec.detect(&a, 0, DetectOpts::default()) {
        Pattern::If(p) => {
            assert_eq!(None, p.orelse);
            assert_eq!(Some(2), p.merge);
        }
        other => panic!("expected if, got {other:?}"),
    }
}

#[test]
fn elif_chain_is_classified() {
    // if a: x = 1 elif b: x = 2 ; return
    let a = analyze(
        Version::V3_9,
        &[
            (Opcode::LoadName, 0),        // 0
            (Opcode::PopJumpIfFalse, 10), // 2
            (Opcode::LoadConst, 0),       // 4
            (Opcode::StoreName, 2),       // 6
            (Opcode::JumpForward, 8),     // 8 -> 18
            (Opcode::LoadName, 1),        // 10
            (Opcode::PopJumpIfFalse, 18), // 12
            (Opcode::LoadConst, 1),       // 14
            (Opcode::StoreName, 2),       // 16
            (Opcode::LoadConst, 2),       // 18
            (Opcode::ReturnValue, 0),     // 20
        ],
    );
    let mut rec = Recognizer::new();
    match rec.detect(&a, 0, DetectOpts::default()) {
        Pattern::If(p) => assert!(p.is_elif, "else branch should classify as elif"),
        other => panic!("expected if, got {other:?}"),
    }
}

#[test]
fn while_loop_header() {
    let a = analyze(
        Version::V3_9,
        &[
            (Opcode::LoadName, 0),
            (Opcode::PopJumpIfFalse, 8),
            (Opcode::PopTop, 0),
            (Opcode::JumpAbsolute, 0),
            (Opcode::LoadConst, 0),
            (Opcode::ReturnValue, 0),
        ],
    );
    let mut rec = Recognizer::new();
    match rec.detect(&a, 0, DetectOpts::default()) {
        Pattern::While(p) => {
            assert_eq!(0, p.header);
            assert_eq!(1, p.body);
            assert_eq!(Some(2), p.exit);
            assert!(!p.infinite);
        }
        other => panic!("expected while, got {other:?}"),
    }
}

#[test]
fn while_priority_beats_if() {
    // The same shape as `while_loop_header`: if-detection must not claim
    // a loop header.
    let a = analyze(
        Version::V3_9,
        &[
            (Opcode::LoadName, 0),
            (Opcode::PopJumpIfFalse, 8),
            (Opcode::PopTop, 0),
            (Opcode::JumpAbsolute, 0),
            (Opcode::LoadConst, 0),
            (Opcode::ReturnValue, 0),
        ],
    );
    let mut rec = Recognizer::new();
    assert!(matches!(
        rec.detect(&a, 0, DetectOpts::default()),
        Pattern::While(_)
    ));
    // Re-entry with the header marked exposes the inner shape instead.
    let inner = rec.detect(
        &a,
        0,
        DetectOpts {
            in_loop: Some(0),
            ..DetectOpts::default()
        },
    );
    assert!(!matches!(inner, Pattern::While(_)));
}

#[test]
fn for_loop_shape() {
    let a = analyze(
        Version::V3_9,
        &[
            (Opcode::LoadName, 0),     // 0: iterable
            (Opcode::GetIter, 0),      // 2
            (Opcode::ForIter, 4),      // 4 -> exhausted at 10
            (Opcode::StoreName, 1),    // 6
            (Opcode::JumpAbsolute, 4), // 8 -> back to the header
            (Opcode::LoadConst, 0),    // 10: exit
            (Opcode::ReturnValue, 0),  // 12
        ],
    );
    let mut rec = Recognizer::new();
    let header = a.cfg.block_containing(4).unwrap().id;
    match rec.detect(&a, header, DetectOpts::default()) {
        Pattern::For(p) => {
            assert_eq!(header, p.header);
            assert!(!p.is_async);
            assert!(p.setup.is_some());
            assert!(p.exit.is_some());
            assert_eq!(None, p.orelse);
        }
        other => panic!("expected for, got {other:?}"),
    }
}

fn legacy_finally() -> Analysis {
    // try: x  finally: ...  on the 3.8 SETUP_FINALLY encoding
    analyze(
        Version::V3_8,
        &[
            (Opcode::SetupFinally, 4), // 0 -> finally copy at 6
            (Opcode::LoadName, 0),     // 2
            (Opcode::PopBlock, 0),     // 4
            (Opcode::LoadConst, 0),    // 6
            (Opcode::ReturnValue, 0),  // 8
        ],
    )
}

#[test]
fn legacy_try_finally() {
    let a = legacy_finally();
    let mut rec = Recognizer::new();
    match rec.detect(&a, 0, DetectOpts::default()) {
        Pattern::Try(p) => {
            assert!(p.handlers.is_empty());
            assert!(p.finally.is_some());
        }
        other => panic!("expected try, got {other:?}"),
    }
}

#[test]
fn try_detection_is_memoized() {
    let a = legacy_finally();
    let mut rec = Recognizer::new();
    let first = rec.detect(&a, 0, DetectOpts::default());
    let second = rec.detect(&a, 0, DetectOpts::default());
    assert_eq!(first, second);
}

#[test]
fn skip_try_suppresses_try() {
    let a = legacy_finally();
    let mut rec = Recognizer::new();
    let p = rec.detect(
        &a,
        0,
        DetectOpts {
            skip_try: true,
            ..DetectOpts::default()
        },
    );
    assert!(!matches!(p, Pattern::Try(_)));
}

#[test]
fn ternary_arms_must_be_expression_only() {
    // Arms containing stores fall through to if-detection.
    let a = analyze(
        Version::V3_9,
        &[
            (Opcode::LoadName, 0),
            (Opcode::PopJumpIfFalse, 10),
            (Opcode::LoadConst, 0),
            (Opcode::StoreName, 1),
            (Opcode::JumpForward, 4),
            (Opcode::LoadConst, 1),
            (Opcode::StoreName, 1),
            (Opcode::LoadConst, 2),
            (Opcode::ReturnValue, 0),
        ],
    );
    let mut rec = Recognizer::new();
    assert!(matches!(
        rec.detect(&a, 0, DetectOpts::default()),
        Pattern::If(_)
    ));
}

#[test]
fn ternary_shape_detected() {
    // x = (1 if c else 2): arms only load, the store sits at the merge.
    let a = analyze(
        Version::V3_9,
        &[
            (Opcode::LoadName, 0),       // 0
            (Opcode::PopJumpIfFalse, 8), // 2 -> else arm at 8
            (Opcode::LoadConst, 0),      // 4: then arm
            (Opcode::JumpForward, 2),    // 6 -> merge at 10
            (Opcode::LoadConst, 1),      // 8: else arm
            (Opcode::StoreName, 1),      // 10: merge consumes the value
            (Opcode::LoadConst, 2),      // 12
            (Opcode::ReturnValue, 0),    // 14
        ],
    );
    let mut rec = Recognizer::new();
    match rec.detect(&a, 0, DetectOpts::default()) {
        Pattern::Ternary(p) => {
            assert_eq!(0, p.cond);
            assert_eq!(Some(p.merge), a.cfg.block_at_offset(10));
        }
        other => panic!("expected ternary, got {other:?}"),
    }
}

#[test]
fn boolchain_detected_on_or_pop() {
    let a = analyze(
        Version::V3_9,
        &[
            (Opcode::LoadName, 0),         // 0
            (Opcode::JumpIfFalseOrPop, 6), // 2 -> 6
            (Opcode::LoadName, 1),         // 4
            (Opcode::StoreName, 2),        // 6
            (Opcode::LoadConst, 0),
            (Opcode::ReturnValue, 0),
        ],
    );
    let mut rec = Recognizer::new();
    match rec.detect(&a, 0, DetectOpts::default()) {
        Pattern::BoolChain(p) => {
            assert!(p.is_and);
            assert_eq!(Some(p.target), a.cfg.block_at_offset(6));
        }
        other => panic!("expected boolchain, got {other:?}"),
    }
}

#[test]
fn straight_line_is_sequential() {
    let a = analyze(
        Version::V3_9,
        &[
            (Opcode::LoadConst, 0),
            (Opcode::StoreName, 0),
            (Opcode::LoadConst, 1),
            (Opcode::ReturnValue, 0),
        ],
    );
    let mut rec = Recognizer::new();
    assert_eq!(Pattern::Sequential, rec.detect(&a, 0, DetectOpts::default()));
}

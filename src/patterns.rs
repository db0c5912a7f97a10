//! Structured control-flow recognition.
//!
//! [`Recognizer::detect`] classifies the sub-graph rooted at a block into
//! one structured construct, under a fixed priority order (match > while >
//! with > ternary > if > for > try). Detection never fails: anything
//! unclassifiable comes back [`Pattern::Unknown`] and the driver emits the
//! block linearly.

use std::collections::HashMap;

use bitvec::prelude::*;
use log::trace;

use crate::cfg::{BlockId, Cfg, EdgeKind};
use crate::decode::Instruction;
use crate::dom::{DomTree, LoopInfo, PostDomTree};
use crate::opcodes::{JumpKind, Opcode};

/// Immutable analysis bundle for one code object.
#[derive(Debug)]
pub struct Analysis {
    pub cfg: Cfg,
    pub dom: DomTree,
    pub post: PostDomTree,
    pub loops: LoopInfo,
}

impl Analysis {
    #[must_use]
    pub fn analyze(cfg: Cfg) -> Self {
        let dom = DomTree::dominators(&cfg);
        let post = PostDomTree::post_dominators(&cfg);
        let loops = LoopInfo::compute(&cfg, &dom);
        Self {
            cfg,
            dom,
            post,
            loops,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfPattern {
    pub cond: BlockId,
    pub then: BlockId,
    pub orelse: Option<BlockId>,
    pub merge: Option<BlockId>,
    pub is_elif: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhilePattern {
    pub header: BlockId,
    pub body: BlockId,
    pub exit: Option<BlockId>,
    /// `while True:` shape — no conditional exit at the header.
    pub infinite: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForPattern {
    pub setup: Option<BlockId>,
    pub header: BlockId,
    pub body: BlockId,
    pub orelse: Option<BlockId>,
    pub exit: Option<BlockId>,
    pub is_async: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerInfo {
    pub block: BlockId,
    pub is_bare: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryPattern {
    pub body: BlockId,
    /// One past the last offset of the protected region (3.11+ only,
    /// straight from the exception table).
    pub body_end: Option<u32>,
    pub handlers: Vec<HandlerInfo>,
    pub orelse: Option<BlockId>,
    pub finally: Option<BlockId>,
    pub exit: Option<BlockId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithPattern {
    pub setup: BlockId,
    pub body: BlockId,
    pub cleanup: Option<BlockId>,
    pub exit: Option<BlockId>,
    pub is_async: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPattern {
    pub subject: BlockId,
    /// Case-test blocks in source order; the first test shares the
    /// subject block.
    pub cases: Vec<BlockId>,
    pub wildcard: Option<BlockId>,
    pub exit: Option<BlockId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TernaryPattern {
    pub cond: BlockId,
    pub then: BlockId,
    pub orelse: BlockId,
    pub merge: BlockId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoolChainPattern {
    pub first: BlockId,
    /// `and` chains short-circuit on false, `or` chains on true.
    pub is_and: bool,
    /// The shared short-circuit target.
    pub target: BlockId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Match(MatchPattern),
    While(WhilePattern),
    With(WithPattern),
    Ternary(TernaryPattern),
    If(IfPattern),
    For(ForPattern),
    Try(TryPattern),
    BoolChain(BoolChainPattern),
    /// Straight-line block; emit linearly.
    Sequential,
    Unknown,
}

/// Knobs the driver sets when re-entering detection.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectOpts {
    /// Suppress try recognition once the driver is inside a try body.
    pub skip_try: bool,
    /// The innermost loop header, so `if` shapes inside loop headers can
    /// be exposed on recursive calls.
    pub in_loop: Option<BlockId>,
}

/// Stateful recognizer; scratch and memo tables are reused across calls.
#[derive(Debug, Default)]
pub struct Recognizer {
    try_cache: HashMap<BlockId, Option<TryPattern>>,
    loop_region_cache: HashMap<BlockId, BitVec>,
    scratch: BitVec,
}

fn is_boolean_kind(kind: JumpKind) -> bool {
    matches!(
        kind,
        JumpKind::IfTrue | JumpKind::IfFalse | JumpKind::IfNone | JumpKind::IfNotNone
    )
}

/// A block usable as an inner clause of a compound condition: expression
/// instructions only, ending in a boolean conditional.
pub(crate) fn is_condition_block(cfg: &Cfg, block: BlockId) -> bool {
    let instructions = cfg.instructions_of(block);
    let Some((last, rest)) = instructions.split_last() else {
        return false;
    };
    last.jump(cfg.version)
        .is_some_and(|j| is_boolean_kind(j.kind))
        && !rest.iter().any(|i| is_statement_opcode(i.opcode))
}

/// The maximal condition chain rooted at `block`, and its two external
/// continuations `(then, orelse)` in source order.
///
/// Clauses of one `and`/`or` condition form a single-entry sub-graph of
/// condition-only blocks with exactly two exits; grow the chain greedily
/// while that invariant holds. A lone conditional block degenerates to a
/// one-element chain.
pub(crate) fn condition_chain(
    cfg: &Cfg,
    block: BlockId,
) -> Option<(Vec<BlockId>, BlockId, BlockId)> {
    if !cfg
        .terminator(block)
        .jump(cfg.version)
        .is_some_and(|j| is_boolean_kind(j.kind))
    {
        return None;
    }
    let externals = |chain: &[BlockId]| -> Vec<BlockId> {
        let mut out: Vec<BlockId> = Vec::new();
        for &member in chain {
            for edge in &cfg.block(member).successors {
                if edge.kind == EdgeKind::Exception {
                    continue;
                }
                if !chain.contains(&edge.target) && !out.contains(&edge.target) {
                    out.push(edge.target);
                }
            }
        }
        out
    };

    let mut chain = vec![block];
    loop {
        let current = externals(&chain);
        let candidate = current.iter().copied().find(|&s| {
            is_condition_block(cfg, s)
                && cfg
                    .block(s)
                    .predecessors
                    .iter()
                    .all(|p| chain.contains(p))
        });
        let Some(candidate) = candidate else { break };
        chain.push(candidate);
        if externals(&chain).len() > 2 {
            chain.pop();
            break;
        }
    }
    let mut exits = externals(&chain);
    if exits.len() != 2 {
        return None;
    }
    exits.sort_by_key(|&b| cfg.block(b).start_offset);
    // Both branches of a forward condition lie after it; a smaller-offset
    // exit means this is a loop tail, not an if/ternary condition.
    if cfg.block(exits[0]).start_offset <= cfg.block(block).start_offset {
        return None;
    }
    Some((chain, exits[0], exits[1]))
}

fn block_contains(instructions: &[Instruction], opcode: Opcode) -> bool {
    instructions.iter().any(|i| i.opcode == opcode)
}

/// Opcodes that terminate a statement; their presence disqualifies a block
/// from expression-only roles (ternary arms, elif shims, case tests).
fn is_statement_opcode(opcode: Opcode) -> bool {
    use Opcode::*;
    matches!(
        opcode,
        StoreName
            | StoreGlobal
            | StoreFast
            | StoreFastLoadFast
            | StoreDeref
            | StoreAttr
            | StoreSubscr
            | StoreSlice
            | StoreSlicePy2
            | DeleteName
            | DeleteGlobal
            | DeleteFast
            | DeleteDeref
            | DeleteAttr
            | DeleteSubscr
            | DeleteSlicePy2
            | ReturnValue
            | ReturnConst
            | RaiseVarargs
            | Reraise
            | ImportName
            | ImportFrom
            | ImportStar
            | PrintItem
            | PrintNewline
            | PrintItemTo
            | PrintNewlineTo
            | ExecStmt
            | UnpackSequence
            | UnpackEx
    )
}

impl Recognizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify the construct rooted at `block`.
    pub fn detect(&mut self, a: &Analysis, block: BlockId, opts: DetectOpts) -> Pattern {
        if let Some(p) = self.detect_match(a, block) {
            return Pattern::Match(p);
        }
        if opts.in_loop != Some(block) {
            if let Some(p) = self.detect_while(a, block) {
                return Pattern::While(p);
            }
        }
        if let Some(p) = self.detect_with(a, block) {
            return Pattern::With(p);
        }
        if !opts.skip_try {
            if let Some(p) = self.detect_try(a, block) {
                return Pattern::Try(p);
            }
        }
        if let Some(p) = self.detect_boolchain(a, block) {
            return Pattern::BoolChain(p);
        }
        if let Some(p) = self.detect_ternary(a, block) {
            return Pattern::Ternary(p);
        }
        if let Some(p) = self.detect_if(a, block) {
            return Pattern::If(p);
        }
        if let Some(p) = self.detect_for(a, block) {
            return Pattern::For(p);
        }
        let terminator = a.cfg.terminator(block);
        if terminator.is_conditional_jump(a.cfg.version) {
            trace!("block {block} has a conditional exit but no structure matched");
            return Pattern::Unknown;
        }
        Pattern::Sequential
    }

    /// Membership set for the loop at `header`, memoized.
    pub fn loop_region(&mut self, a: &Analysis, header: BlockId) -> &BitVec {
        self.loop_region_cache.entry(header).or_insert_with(|| {
            a.loops
                .body(header)
                .cloned()
                .unwrap_or_else(|| bitvec![0; a.cfg.blocks.len()])
        })
    }

    fn detect_match(&mut self, a: &Analysis, block: BlockId) -> Option<MatchPattern> {
        if a.cfg.version.lt(3, 10) {
            return None;
        }
        let instructions = a.cfg.instructions_of(block);
        let terminator = instructions.last()?;
        let kind = terminator.jump(a.cfg.version)?.kind;
        if !is_boolean_kind(kind) {
            return None;
        }
        if !Self::is_case_test(a, block) {
            return None;
        }
        // Subject blocks either carry a structural matcher or copy the
        // subject before a literal comparison; plain if-chains do neither.
        let has_copy = block_contains(instructions, Opcode::Copy)
            || block_contains(instructions, Opcode::DupTop);
        let has_matcher = [
            Opcode::MatchClass,
            Opcode::MatchSequence,
            Opcode::MatchMapping,
            Opcode::MatchKeys,
        ]
        .iter()
        .any(|&op| block_contains(instructions, op));
        if !has_copy && !has_matcher {
            return None;
        }

        let mut cases = vec![block];
        let mut wildcard = None;
        let mut cursor = block;
        loop {
            let next = a
                .cfg
                .block(cursor)
                .successor_by_kind(EdgeKind::ConditionalFalse)?;
            let next_block = a.cfg.block(next);
            let next_instrs = a.cfg.instructions_of(next);
            let nop_only = next_instrs
                .iter()
                .all(|i| matches!(i.opcode, Opcode::Nop | Opcode::PopTop | Opcode::Cache));
            if nop_only || !next_block.has_conditional_exit() {
                // Wildcard arm, or the fall-off continuation of a match
                // with no `case _:`.
                if nop_only
                    || next_instrs
                        .first()
                        .is_some_and(|i| i.opcode == Opcode::PopTop)
                {
                    wildcard = Some(next);
                }
                break;
            }
            if !Self::is_case_test(a, next) {
                break;
            }
            cases.push(next);
            cursor = next;
        }

        let then = a.cfg.block(block).successor_by_kind(EdgeKind::ConditionalTrue)?;
        let last = *cases.last().expect("at least one case");
        let last_false = a
            .cfg
            .block(last)
            .successor_by_kind(EdgeKind::ConditionalFalse);
        let exit = match (wildcard, last_false) {
            (Some(w), _) => a.post.merge(then, w),
            (None, Some(f)) => a.post.merge(then, f),
            _ => None,
        };
        Some(MatchPattern {
            subject: block,
            cases,
            wildcard,
            exit,
        })
    }

    fn is_case_test(a: &Analysis, block: BlockId) -> bool {
        let instructions = a.cfg.instructions_of(block);
        let structural = [
            Opcode::MatchClass,
            Opcode::MatchSequence,
            Opcode::MatchMapping,
            Opcode::MatchKeys,
        ]
        .iter()
        .any(|&op| block_contains(instructions, op));
        // Chained comparisons also copy the pivot, but they shuffle it
        // below the operands first; case tests never rotate.
        let shuffles = [Opcode::RotTwo, Opcode::RotThree, Opcode::Swap]
            .iter()
            .any(|&op| block_contains(instructions, op));
        let copied_compare = (block_contains(instructions, Opcode::Copy)
            || block_contains(instructions, Opcode::DupTop))
            && block_contains(instructions, Opcode::CompareOp)
            && !shuffles;
        structural || copied_compare
    }

    fn detect_while(&mut self, a: &Analysis, block: BlockId) -> Option<WhilePattern> {
        if !a.loops.headers().contains(&block) {
            return None;
        }
        let terminator = a.cfg.terminator(block);
        let version = a.cfg.version;
        match terminator.jump(version).map(|j| j.kind) {
            Some(kind) if is_boolean_kind(kind) => {
                let cfg_block = a.cfg.block(block);
                let true_succ = cfg_block.successor_by_kind(EdgeKind::ConditionalTrue)?;
                let false_succ = cfg_block.successor_by_kind(EdgeKind::ConditionalFalse)?;
                let (body, exit) = if a.loops.is_in_loop(true_succ, block) {
                    (true_succ, false_succ)
                } else if a.loops.is_in_loop(false_succ, block) {
                    (false_succ, true_succ)
                } else {
                    // Guard inside a `while True:` — the header condition
                    // belongs to the body, not the loop.
                    return None;
                };
                Some(WhilePattern {
                    header: block,
                    body,
                    exit: Some(exit),
                    infinite: false,
                })
            }
            None | Some(JumpKind::Unconditional) => {
                // Unconditional header: `while True:`.
                let exit = self.loop_exit(a, block);
                Some(WhilePattern {
                    header: block,
                    body: block,
                    exit,
                    infinite: true,
                })
            }
            _ => None,
        }
    }

    /// The lowest-offset block outside the loop reached from inside it.
    fn loop_exit(&mut self, a: &Analysis, header: BlockId) -> Option<BlockId> {
        let body = self.loop_region(a, header).clone();
        let mut exit: Option<BlockId> = None;
        for index in body.iter_ones() {
            for edge in &a.cfg.block(index as BlockId).successors {
                if edge.kind == EdgeKind::Exception {
                    continue;
                }
                if !body.get(edge.target as usize).map(|b| *b).unwrap_or(false) {
                    let offset = a.cfg.block(edge.target).start_offset;
                    if exit.is_none_or(|e| offset < a.cfg.block(e).start_offset) {
                        exit = Some(edge.target);
                    }
                }
            }
        }
        exit
    }

    fn detect_with(&mut self, a: &Analysis, block: BlockId) -> Option<WithPattern> {
        let instructions = a.cfg.instructions_of(block);
        let is_async = block_contains(instructions, Opcode::BeforeAsyncWith)
            || block_contains(instructions, Opcode::SetupAsyncWith);
        let is_with = is_async
            || block_contains(instructions, Opcode::BeforeWith)
            || block_contains(instructions, Opcode::SetupWith)
            || (a.cfg.version.gte(3, 14) && block_contains(instructions, Opcode::LoadSpecial));
        if !is_with {
            return None;
        }
        let cfg_block = a.cfg.block(block);
        let body = cfg_block.normal_successor()?;
        let cleanup = cfg_block.exception_successors().find(|&handler| {
            let handler_instrs = a.cfg.instructions_of(handler);
            block_contains(handler_instrs, Opcode::WithExceptStart)
                || block_contains(handler_instrs, Opcode::WithCleanup)
                || block_contains(handler_instrs, Opcode::WithCleanupStart)
        });
        let exit = cleanup
            .and_then(|c| a.cfg.block(c).normal_successor())
            .or_else(|| a.post.merge(body, block));
        Some(WithPattern {
            setup: block,
            body,
            cleanup,
            exit,
            is_async,
        })
    }

    fn detect_ternary(&mut self, a: &Analysis, block: BlockId) -> Option<TernaryPattern> {
        let (chain, then, orelse) = condition_chain(&a.cfg, block)?;
        if then == orelse {
            return None;
        }
        let merge = a.post.merge(then, orelse)?;
        if merge == then || merge == orelse {
            return None;
        }
        // Both arms must be single expression-only blocks, entered only
        // from the condition chain, flowing straight into the merge; the
        // consuming store lives at the merge.
        for arm in [then, orelse] {
            let arm_block = a.cfg.block(arm);
            if !arm_block.predecessors.iter().all(|p| chain.contains(p)) {
                return None;
            }
            let instructions = a.cfg.instructions_of(arm);
            let (last, rest) = instructions.split_last()?;
            if rest.iter().any(|i| is_statement_opcode(i.opcode)) {
                return None;
            }
            let flows_to_merge = match last.jump(a.cfg.version).map(|j| j.kind) {
                Some(JumpKind::Unconditional) => {
                    last.jump_target(a.cfg.version)
                        .and_then(|t| a.cfg.block_at_offset(t))
                        == Some(merge)
                }
                None if !is_statement_opcode(last.opcode) => {
                    arm_block.normal_successor() == Some(merge)
                }
                _ => false,
            };
            if !flows_to_merge {
                return None;
            }
        }
        Some(TernaryPattern {
            cond: block,
            then,
            orelse,
            merge,
        })
    }

    fn detect_boolchain(&mut self, a: &Analysis, block: BlockId) -> Option<BoolChainPattern> {
        let terminator = a.cfg.terminator(block);
        let kind = terminator.jump(a.cfg.version)?.kind;
        let is_and = match kind {
            JumpKind::OrPopFalse => true,
            JumpKind::OrPopTrue => false,
            _ => return None,
        };
        let target = terminator
            .jump_target(a.cfg.version)
            .and_then(|t| a.cfg.block_at_offset(t))?;
        Some(BoolChainPattern {
            first: block,
            is_and,
            target,
        })
    }

    fn detect_if(&mut self, a: &Analysis, block: BlockId) -> Option<IfPattern> {
        let (then, orelse) = match condition_chain(&a.cfg, block) {
            Some((_, then, orelse)) => (then, orelse),
            None => {
                // ExcMismatch conditionals never chain but still branch.
                let terminator = a.cfg.terminator(block);
                if terminator.jump(a.cfg.version)?.kind != JumpKind::ExcMismatch {
                    return None;
                }
                let cfg_block = a.cfg.block(block);
                (
                    cfg_block.successor_by_kind(EdgeKind::ConditionalTrue)?,
                    cfg_block.successor_by_kind(EdgeKind::ConditionalFalse)?,
                )
            }
        };
        let merge = a.post.merge(then, orelse);
        if let Some(merge) = merge {
            // The merge must lie beyond the condition and must not close
            // a loop, otherwise this conditional is a loop test.
            if a.cfg.block(merge).start_offset <= a.cfg.block(block).start_offset
                || a.cfg.block(merge).is_loop_header
            {
                return None;
            }
        }
        let orelse = (Some(orelse) != merge).then_some(orelse);
        let is_elif = orelse.is_some_and(|e| self.is_elif_shape(a, block, then, e));
        Some(IfPattern {
            cond: block,
            then,
            orelse,
            merge,
            is_elif,
        })
    }

    fn is_elif_shape(&self, a: &Analysis, cond: BlockId, then: BlockId, orelse: BlockId) -> bool {
        let else_block = a.cfg.block(orelse);
        if !else_block.has_conditional_exit() {
            return false;
        }
        // One predecessor: the original condition, or a jump-only shim.
        if else_block.predecessors.len() != 1 {
            return false;
        }
        let pred = else_block.predecessors[0];
        if pred != cond {
            let shim = a.cfg.instructions_of(pred);
            let jump_only = shim.len() == 1 && shim[0].is_unconditional_jump(a.cfg.version);
            if !jump_only || a.cfg.block(pred).predecessors[..] != [cond] {
                return false;
            }
        }
        // Expression-only prefix before the nested conditional.
        let instructions = a.cfg.instructions_of(orelse);
        let (last, rest) = match instructions.split_last() {
            Some(pair) => pair,
            None => return false,
        };
        if !last.is_conditional_jump(a.cfg.version) {
            return false;
        }
        if rest.iter().any(|i| is_statement_opcode(i.opcode)) {
            return false;
        }
        // The elif arm must not re-enter the then-branch.
        if self.reaches(a, orelse, then) {
            return false;
        }
        // Raise-only then-branches only signal an elif when the compiler
        // left its unreachable gap jump behind.
        let then_instrs = a.cfg.instructions_of(then);
        let raise_only = then_instrs
            .last()
            .is_some_and(|i| matches!(i.opcode, Opcode::RaiseVarargs | Opcode::Reraise));
        if raise_only {
            let has_gap_jump = a
                .cfg
                .block_at_offset(a.cfg.block(then).end_offset)
                .map(|after| a.cfg.instructions_of(after))
                .and_then(|instrs| instrs.first().copied())
                .is_some_and(|i| i.is_unconditional_jump(a.cfg.version));
            if !has_gap_jump {
                return false;
            }
        }
        true
    }

    /// Forward reachability over non-exception edges.
    fn reaches(&self, a: &Analysis, from: BlockId, to: BlockId) -> bool {
        let n = a.cfg.blocks.len();
        let mut seen = bitvec![0; n];
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if seen[current as usize] {
                continue;
            }
            seen.set(current as usize, true);
            for edge in &a.cfg.block(current).successors {
                if edge.kind != EdgeKind::Exception {
                    stack.push(edge.target);
                }
            }
        }
        false
    }

    fn detect_for(&mut self, a: &Analysis, block: BlockId) -> Option<ForPattern> {
        let terminator = a.cfg.terminator(block);
        if !matches!(terminator.opcode, Opcode::ForIter | Opcode::ForLoop) {
            return None;
        }
        let cfg_block = a.cfg.block(block);
        let body = cfg_block.normal_successor()?;
        let natural_exit = cfg_block.successor_by_kind(EdgeKind::ConditionalFalse);

        // Setup: the non-back-edge predecessor chain up to GET_ITER.
        let mut setup = None;
        let mut cursor = block;
        for _ in 0..a.cfg.blocks.len() {
            let preds: Vec<BlockId> = a
                .cfg
                .block(cursor)
                .predecessors
                .iter()
                .copied()
                .filter(|&p| a.cfg.block(p).start_offset < a.cfg.block(block).start_offset)
                .collect();
            let [single] = preds[..] else { break };
            let instrs = a.cfg.instructions_of(single);
            if block_contains(instrs, Opcode::GetIter) || block_contains(instrs, Opcode::GetAiter)
            {
                setup = Some(single);
                break;
            }
            cursor = single;
        }

        let is_async = setup
            .map(|s| block_contains(a.cfg.instructions_of(s), Opcode::GetAiter))
            .unwrap_or(false)
            || block_contains(a.cfg.instructions_of(block), Opcode::GetAnext);

        // An else-clause exists when breaks leave the loop somewhere other
        // than the natural exit.
        let mut orelse = None;
        let mut exit = natural_exit;
        if let (Some(natural), Some(body_set)) = (natural_exit, a.loops.body(block)) {
            let mut break_target: Option<BlockId> = None;
            for index in body_set.iter_ones() {
                let member = index as BlockId;
                if member == block {
                    continue;
                }
                for edge in &a.cfg.block(member).successors {
                    if edge.kind == EdgeKind::Exception {
                        continue;
                    }
                    let outside = !body_set
                        .get(edge.target as usize)
                        .map(|b| *b)
                        .unwrap_or(false);
                    if outside && edge.target != natural {
                        let candidate = edge.target;
                        if break_target.is_none_or(|t| {
                            a.cfg.block(candidate).start_offset > a.cfg.block(t).start_offset
                        }) {
                            break_target = Some(candidate);
                        }
                    }
                }
            }
            if let Some(target) = break_target {
                if a.cfg.block(target).start_offset > a.cfg.block(natural).start_offset {
                    orelse = Some(natural);
                    exit = Some(target);
                }
            }
        }

        Some(ForPattern {
            setup,
            header: block,
            body,
            orelse,
            exit,
            is_async,
        })
    }

    fn detect_try(&mut self, a: &Analysis, block: BlockId) -> Option<TryPattern> {
        if let Some(cached) = self.try_cache.get(&block) {
            return cached.clone();
        }
        let pattern = if a.cfg.version.has_exception_table() {
            self.detect_try_tableized(a, block)
        } else {
            self.detect_try_legacy(a, block)
        };
        self.try_cache.insert(block, pattern.clone());
        pattern
    }

    /// Pre-3.11: `SETUP_EXCEPT`/`SETUP_FINALLY` name the handler directly.
    fn detect_try_legacy(&mut self, a: &Analysis, block: BlockId) -> Option<TryPattern> {
        let terminator = a.cfg.terminator(block);
        let setup = match terminator.opcode {
            Opcode::SetupExcept | Opcode::SetupFinally => terminator,
            _ => return None,
        };
        let handler_start = setup
            .jump_target(a.cfg.version)
            .and_then(|t| a.cfg.block_at_offset(t))?;
        // The pattern is rooted at the SETUP_* block; the driver emits its
        // statement prefix and enters the body through the normal edge.
        let body = block;

        if setup.opcode == Opcode::SetupFinally {
            let exit = a.cfg.block(handler_start).normal_successor();
            return Some(TryPattern {
                body,
                body_end: None,
                handlers: Vec::new(),
                orelse: None,
                finally: Some(handler_start),
                exit,
            });
        }

        let handlers = self.collect_handler_chain(a, handler_start);
        if handlers.is_empty() {
            return None;
        }
        // else: the try body's jump around the handlers, when it differs
        // from where the handlers converge.
        let exit = handlers
            .iter()
            .filter_map(|h| a.cfg.block(h.block).normal_successor())
            .fold(None, |acc: Option<BlockId>, succ| match acc {
                None => Some(succ),
                Some(existing) => a.post.merge(existing, succ),
            });
        Some(TryPattern {
            body,
            body_end: None,
            handlers,
            orelse: None,
            finally: None,
            exit,
        })
    }

    /// 3.11+: recover structure from exception-table coverage.
    fn detect_try_tableized(&mut self, a: &Analysis, block: BlockId) -> Option<TryPattern> {
        let start = a.cfg.block(block).start_offset;
        // The innermost entry starting exactly at this block opens a try.
        let entry = a
            .cfg
            .exception_entries
            .iter()
            .filter(|e| e.start == start && e.target > start)
            .min_by_key(|e| e.end - e.start)
            .copied()?;
        let handler_start = a.cfg.block_at_offset(entry.target)?;
        let handler_instrs = a.cfg.instructions_of(handler_start);
        if Self::is_synthetic_cleanup(handler_instrs) {
            return None;
        }

        let mut handlers = self.collect_handler_chain(a, handler_start);
        let mut finally = None;
        if handlers.len() == 1 && handlers[0].is_bare {
            // A bare handler that reraises after its body is a `finally`
            // copy, not `except:`.
            let instrs = a.cfg.instructions_of(handlers[0].block);
            let reraises = instrs
                .last()
                .is_some_and(|i| i.opcode == Opcode::Reraise)
                || a.cfg.block(handlers[0].block).normal_successor().is_some_and(|next| {
                    a.cfg
                        .instructions_of(next)
                        .last()
                        .is_some_and(|i| i.opcode == Opcode::Reraise)
                });
            if reraises && !block_contains(instrs, Opcode::PopExcept) {
                finally = Some(handlers.remove(0).block);
            }
        }

        // try/except/finally nests its coverage: an outer entry sharing
        // the start but reaching further is the finally protector.
        if finally.is_none() {
            finally = a
                .cfg
                .exception_entries
                .iter()
                .filter(|outer| {
                    outer.start == start && outer.end > entry.end && outer.target > start
                })
                .max_by_key(|outer| outer.end - outer.start)
                .and_then(|outer| a.cfg.block_at_offset(outer.target))
                .filter(|&fin| {
                    let instrs = a.cfg.instructions_of(fin);
                    !Self::is_synthetic_cleanup(instrs)
                        && !block_contains(instrs, Opcode::CheckExcMatch)
                });
        }

        let exit = a.post.merge(block, handler_start);
        Some(TryPattern {
            body: block,
            body_end: Some(entry.end),
            handlers,
            orelse: None,
            finally,
            exit,
        })
    }

    /// Walk the conditional-false chain of typed handlers, stopping at a
    /// bare handler or a non-handler block.
    fn collect_handler_chain(&mut self, a: &Analysis, first: BlockId) -> Vec<HandlerInfo> {
        let mut handlers = Vec::new();
        let mut cursor = Some(first);
        while let Some(block) = cursor {
            let instructions = a.cfg.instructions_of(block);
            if Self::is_synthetic_cleanup(instructions) {
                break;
            }
            let typed = block_contains(instructions, Opcode::CheckExcMatch)
                || block_contains(instructions, Opcode::JumpIfNotExcMatch)
                || instructions.iter().any(|i| {
                    i.opcode == Opcode::CompareOp
                        && crate::opcodes::compare_from_arg(i.arg, a.cfg.version).is_none()
                });
            handlers.push(HandlerInfo {
                block,
                is_bare: !typed,
            });
            if !typed {
                break;
            }
            cursor = a
                .cfg
                .block(block)
                .successor_by_kind(EdgeKind::ConditionalFalse)
                .filter(|&next| {
                    let next_instrs = a.cfg.instructions_of(next);
                    // The chain ends at the implicit reraise block.
                    !(next_instrs.len() <= 2
                        && next_instrs
                            .last()
                            .is_some_and(|i| i.opcode == Opcode::Reraise))
                });
        }
        handlers
    }

    /// Handlers the compiler synthesized for `with`, generators,
    /// comprehension spills, `as`-binding resets and `except*` plumbing;
    /// never user code.
    fn is_synthetic_cleanup(instructions: &[Instruction]) -> bool {
        if instructions.iter().any(|i| {
            matches!(
                i.opcode,
                Opcode::WithExceptStart
                    | Opcode::WithCleanup
                    | Opcode::WithCleanupStart
                    | Opcode::CleanupThrow
                    | Opcode::EndAsyncFor
                    | Opcode::CheckEgMatch
                    | Opcode::PrepReraiseStar
            )
        }) {
            return true;
        }
        // Comprehension spill restores.
        if instructions.len() <= 3
            && instructions
                .iter()
                .all(|i| matches!(i.opcode, Opcode::Swap | Opcode::PopTop | Opcode::Reraise))
        {
            return true;
        }
        // The `except ... as e` epilogue: rebind to None, delete, reraise.
        instructions
            .last()
            .is_some_and(|i| i.opcode == Opcode::Reraise)
            && instructions
                .iter()
                .any(|i| matches!(i.opcode, Opcode::DeleteFast | Opcode::DeleteName))
    }

    /// Drop memoized state between code objects.
    pub fn reset(&mut self) {
        self.try_cache.clear();
        self.loop_region_cache.clear();
        self.scratch.clear();
    }
}

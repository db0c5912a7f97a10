//! Control-flow graph construction.
//!
//! Blocks are stored densely and cross-reference each other by id, so the
//! cyclic graph needs no pointer juggling. Construction is leader-based:
//! offset 0, every jump target, every post-terminator instruction and
//! every exception-handler start begin a block.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;

use smallvec::SmallVec;

use crate::code::ExceptionEntry;
use crate::decode::{self, DecodeError, Instruction};
use crate::opcodes::{JumpKind, Opcode};
use crate::version::Version;

pub type BlockId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Normal,
    ConditionalTrue,
    ConditionalFalse,
    LoopBack,
    Exception,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub target: BlockId,
    pub kind: EdgeKind,
}

impl Edge {
    const fn new(target: BlockId, kind: EdgeKind) -> Self {
        Self { target, kind }
    }
}

/// A maximal straight-line instruction run with one entry and one exit.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub start_offset: u32,
    /// One past the last byte of the last instruction.
    pub end_offset: u32,
    /// Index range into [`Cfg::instructions`].
    pub instructions: Range<usize>,
    pub predecessors: SmallVec<[BlockId; 2]>,
    pub successors: SmallVec<[Edge; 2]>,
    pub is_loop_header: bool,
    pub is_exception_handler: bool,
}

impl BasicBlock {
    /// The single successor reached by falling off the end, if any.
    #[must_use]
    pub fn normal_successor(&self) -> Option<BlockId> {
        self.successors
            .iter()
            .find(|e| matches!(e.kind, EdgeKind::Normal | EdgeKind::LoopBack))
            .map(|e| e.target)
    }

    #[must_use]
    pub fn successor_by_kind(&self, kind: EdgeKind) -> Option<BlockId> {
        self.successors
            .iter()
            .find(|e| e.kind == kind)
            .map(|e| e.target)
    }

    #[must_use]
    pub fn exception_successors(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.successors
            .iter()
            .filter(|e| e.kind == EdgeKind::Exception)
            .map(|e| e.target)
    }

    #[must_use]
    pub fn has_conditional_exit(&self) -> bool {
        self.successor_by_kind(EdgeKind::ConditionalTrue).is_some()
            && self.successor_by_kind(EdgeKind::ConditionalFalse).is_some()
    }
}

/// The control-flow graph of one code object. Block 0 is the entry.
#[derive(Debug, Clone)]
pub struct Cfg {
    pub blocks: Vec<BasicBlock>,
    pub instructions: Vec<Instruction>,
    /// Sorted block start offsets, parallel to `blocks`.
    block_starts: Vec<u32>,
    pub exception_entries: Vec<ExceptionEntry>,
    pub version: Version,
}

impl Cfg {
    /// Build without exception metadata (pre-3.11 or synthetic streams).
    pub fn build(bytes: &[u8], version: Version) -> Result<Self, DecodeError> {
        Self::build_with_exceptions(bytes, &[], version)
    }

    /// Build honoring the 3.11+ exception table.
    pub fn build_with_exceptions(
        bytes: &[u8],
        exception_table: &[ExceptionEntry],
        version: Version,
    ) -> Result<Self, DecodeError> {
        let instructions = decode::decode_all(bytes, version)?;
        let mut cfg = Self {
            blocks: Vec::new(),
            instructions,
            block_starts: Vec::new(),
            exception_entries: exception_table.to_vec(),
            version,
        };
        if cfg.instructions.is_empty() {
            return Ok(cfg);
        }
        let leaders = cfg.find_leaders();
        cfg.partition(&leaders);
        cfg.wire_successors();
        cfg.wire_exception_edges();
        cfg.mirror_predecessors();
        cfg.mark_loop_headers();
        Ok(cfg)
    }

    /// The id of the block starting exactly at `offset`.
    #[must_use]
    pub fn block_at_offset(&self, offset: u32) -> Option<BlockId> {
        self.block_starts
            .binary_search(&offset)
            .ok()
            .map(|index| index as BlockId)
    }

    /// The block whose instruction range covers `offset`.
    #[must_use]
    pub fn block_containing(&self, offset: u32) -> Option<&BasicBlock> {
        let index = self.block_starts.partition_point(|&start| start <= offset);
        let block = self.blocks.get(index.checked_sub(1)?)?;
        (offset < block.end_offset).then_some(block)
    }

    #[must_use]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id as usize]
    }

    #[must_use]
    pub fn instructions_of(&self, id: BlockId) -> &[Instruction] {
        &self.instructions[self.block(id).instructions.clone()]
    }

    /// The terminating instruction of a block.
    #[must_use]
    pub fn terminator(&self, id: BlockId) -> &Instruction {
        self.instructions_of(id)
            .last()
            .expect("blocks are non-empty")
    }

    fn find_leaders(&self) -> BTreeSet<u32> {
        let mut leaders = BTreeSet::new();
        leaders.insert(0);
        for instruction in &self.instructions {
            if let Some(target) = instruction.jump_target(self.version) {
                leaders.insert(target);
            }
            let terminates = instruction.ends_block(self.version)
                || instruction.is_conditional_jump(self.version)
                || instruction
                    .jump(self.version)
                    .is_some_and(|j| j.kind == JumpKind::Setup);
            if terminates {
                leaders.insert(instruction.next_offset());
            }
        }
        for entry in &self.exception_entries {
            leaders.insert(entry.target);
            leaders.insert(entry.start);
            leaders.insert(entry.end);
        }
        // Only offsets that begin a real instruction can lead a block.
        let starts: BTreeSet<u32> = self.instructions.iter().map(|i| i.offset).collect();
        leaders.retain(|offset| starts.contains(offset));
        leaders
    }

    fn partition(&mut self, leaders: &BTreeSet<u32>) {
        let mut bounds = leaders.iter().copied().peekable();
        let mut index = 0usize;
        while let Some(start) = bounds.next() {
            let end = bounds
                .peek()
                .copied()
                .unwrap_or(u32::MAX);
            let first = index;
            while index < self.instructions.len() && self.instructions[index].offset < end {
                index += 1;
            }
            let end_offset = self.instructions[index - 1].next_offset();
            let id = self.blocks.len() as BlockId;
            self.blocks.push(BasicBlock {
                id,
                start_offset: start,
                end_offset,
                instructions: first..index,
                predecessors: SmallVec::new(),
                successors: SmallVec::new(),
                is_loop_header: false,
                is_exception_handler: false,
            });
            self.block_starts.push(start);
        }
    }

    fn wire_successors(&mut self) {
        let version = self.version;
        for id in 0..self.blocks.len() as BlockId {
            let terminator = *self.terminator(id);
            let fallthrough = self.block_at_offset(terminator.next_offset());
            let target = terminator
                .jump_target(version)
                .and_then(|offset| self.block_at_offset(offset));
            let mut edges: SmallVec<[Edge; 2]> = SmallVec::new();
            match terminator.jump(version).map(|j| j.kind) {
                Some(JumpKind::Unconditional) => {
                    if let Some(target) = target {
                        let kind = if self.blocks[target as usize].start_offset
                            <= terminator.offset
                        {
                            EdgeKind::LoopBack
                        } else {
                            EdgeKind::Normal
                        };
                        edges.push(Edge::new(target, kind));
                    }
                }
                Some(
                    kind @ (JumpKind::IfTrue
                    | JumpKind::IfFalse
                    | JumpKind::IfNone
                    | JumpKind::IfNotNone
                    | JumpKind::OrPopTrue
                    | JumpKind::OrPopFalse
                    | JumpKind::ExcMismatch),
                ) => {
                    // IF_TRUE families jump when the condition holds, so
                    // the jump target is the true branch; IF_FALSE
                    // families are the mirror image.
                    let jump_is_true = matches!(
                        kind,
                        JumpKind::IfTrue
                            | JumpKind::IfNone
                            | JumpKind::IfNotNone
                            | JumpKind::OrPopTrue
                    );
                    let (target_kind, fall_kind) = if jump_is_true {
                        (EdgeKind::ConditionalTrue, EdgeKind::ConditionalFalse)
                    } else {
                        (EdgeKind::ConditionalFalse, EdgeKind::ConditionalTrue)
                    };
                    if let Some(target) = target {
                        edges.push(Edge::new(target, target_kind));
                    }
                    if let Some(fallthrough) = fallthrough {
                        edges.push(Edge::new(fallthrough, fall_kind));
                    }
                }
                Some(JumpKind::IterExhausted) => {
                    if let Some(fallthrough) = fallthrough {
                        edges.push(Edge::new(fallthrough, EdgeKind::Normal));
                    }
                    if let Some(target) = target {
                        edges.push(Edge::new(target, EdgeKind::ConditionalFalse));
                    }
                }
                Some(JumpKind::Setup) => {
                    if let Some(fallthrough) = fallthrough {
                        edges.push(Edge::new(fallthrough, EdgeKind::Normal));
                    }
                    if matches!(
                        terminator.opcode,
                        Opcode::SetupExcept
                            | Opcode::SetupFinally
                            | Opcode::SetupWith
                            | Opcode::SetupAsyncWith
                    ) {
                        if let Some(target) = target {
                            edges.push(Edge::new(target, EdgeKind::Exception));
                            self.blocks[target as usize].is_exception_handler = true;
                        }
                    }
                }
                None => {
                    let is_exit = matches!(
                        terminator.opcode,
                        Opcode::ReturnValue
                            | Opcode::ReturnConst
                            | Opcode::RaiseVarargs
                            | Opcode::Reraise
                            | Opcode::BreakLoop
                    );
                    if !is_exit {
                        if let Some(fallthrough) = fallthrough {
                            edges.push(Edge::new(fallthrough, EdgeKind::Normal));
                        }
                    }
                }
            }
            self.blocks[id as usize].successors = edges;
        }
    }

    fn wire_exception_edges(&mut self) {
        let entries = self.exception_entries.clone();
        for entry in entries {
            let Some(handler) = self.block_at_offset(entry.target) else {
                continue;
            };
            self.blocks[handler as usize].is_exception_handler = true;
            for id in 0..self.blocks.len() {
                let block = &self.blocks[id];
                let intersects =
                    block.start_offset < entry.end && entry.start < block.end_offset;
                if intersects && block.id != handler {
                    let already = block
                        .successors
                        .iter()
                        .any(|e| e.kind == EdgeKind::Exception && e.target == handler);
                    if !already {
                        self.blocks[id]
                            .successors
                            .push(Edge::new(handler, EdgeKind::Exception));
                    }
                }
            }
        }
    }

    fn mirror_predecessors(&mut self) {
        let edges: Vec<(BlockId, BlockId)> = self
            .blocks
            .iter()
            .flat_map(|b| b.successors.iter().map(move |e| (b.id, e.target)))
            .collect();
        for (source, target) in edges {
            let preds = &mut self.blocks[target as usize].predecessors;
            if !preds.contains(&source) {
                preds.push(source);
            }
        }
    }

    fn fmt_block(&self, f: &mut fmt::Formatter<'_>, block: &BasicBlock) -> fmt::Result {
        write!(f, "block {} [{}..{})", block.id, block.start_offset, block.end_offset)?;
        if block.is_loop_header {
            f.write_str(" loop-header")?;
        }
        if block.is_exception_handler {
            f.write_str(" handler")?;
        }
        writeln!(f, ":")?;
        for instruction in self.instructions_of(block.id) {
            writeln!(f, "{instruction}")?;
        }
        for edge in &block.successors {
            writeln!(f, "        -> {} ({:?})", edge.target, edge.kind)?;
        }
        Ok(())
    }

    fn mark_loop_headers(&mut self) {
        let back_targets: Vec<BlockId> = self
            .blocks
            .iter()
            .flat_map(|b| {
                b.successors.iter().filter_map(move |e| {
                    let target_start = e.target;
                    (e.kind != EdgeKind::Exception).then_some((b.start_offset, target_start))
                })
            })
            .filter_map(|(source_start, target)| {
                (self.blocks[target as usize].start_offset <= source_start).then_some(target)
            })
            .collect();
        for target in back_targets {
            self.blocks[target as usize].is_loop_header = true;
        }
    }
}

/// A `dis`-style listing of blocks, instructions and edges.
impl fmt::Display for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in &self.blocks {
            self.fmt_block(f, block)?;
        }
        Ok(())
    }
}

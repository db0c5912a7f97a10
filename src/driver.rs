//! The decompilation driver.
//!
//! Walks the CFG in structural order: the recognizer decides the shape
//! rooted at each block, the simulator replays instructions to produce
//! expressions, and this module stitches the results into nested
//! statement bodies. Recoverable failures degrade the affected statement
//! and keep going; only malformed bytecode and internal invariant
//! violations abort.

use std::sync::Arc;

use log::{debug, trace};

use crate::ast::{
    Alias, Arg, Arguments, ComprehensionClause, ComprehensionKind, Expr, ExceptHandler, MatchCase,
    MatchPattern as AstMatchPattern, Module, Stmt, WithItem,
};
use crate::cfg::{BlockId, Cfg, EdgeKind};
use crate::code::{CodeFlags, CodeObject, Const};
use crate::decode::Instruction;
use crate::error::{DecompileError, ErrorContext};
use crate::opcodes::{JumpKind, Opcode};
use crate::patterns::{
    Analysis, DetectOpts, ForPattern, HandlerInfo, Pattern, Recognizer, TryPattern, WhilePattern,
};
use crate::stack::{ClassParts, FunctionParts, StackValue, SymStack};
use crate::version::Version;

/// Decompile a module-level code object into a [`Module`].
pub fn decompile_module(code: &CodeObject) -> Result<Module, DecompileError> {
    let mut decompiler = Decompiler::new(code)?;
    let mut body = decompiler.run()?;
    let docstring = take_module_docstring(&mut body);
    Ok(Module { body, docstring })
}

fn take_module_docstring(body: &mut Vec<Stmt>) -> Option<String> {
    let is_doc = matches!(
        body.first(),
        Some(Stmt::Assign { targets, value: Expr::Literal(Const::Str(_)) })
            if targets.len() == 1 && targets[0] == Expr::name("__doc__")
    );
    if is_doc {
        let Stmt::Assign { value: Expr::Literal(Const::Str(doc)), .. } = body.remove(0) else {
            unreachable!("shape checked above");
        };
        return Some(doc);
    }
    None
}

/// Loop context threaded through body emission so jumps classify as
/// `break`/`continue`/natural back-edges.
#[derive(Debug, Clone, Copy, Default)]
struct LoopCtx {
    header: Option<BlockId>,
    exit: Option<BlockId>,
    /// Highest end offset of a loop-body block; the back jump there is
    /// the natural end, anywhere else it is a `continue`.
    last_offset: u32,
}

/// Where linear emission left control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Fall(Option<BlockId>),
    Jump(BlockId),
    Stop,
}

#[derive(Debug)]
struct UnpackState {
    targets: Vec<Expr>,
    remaining: usize,
    star_index: Option<usize>,
    value: StackValue,
}

/// One decompilation; owns every intermediate structure for one code
/// object and is consumed by a single thread.
pub struct Decompiler<'a> {
    code: &'a CodeObject,
    analysis: Analysis,
    recognizer: Recognizer,
    stack: SymStack<'a>,
    version: Version,
    /// Branch-reconciliation slot: an expression produced by reducing a
    /// loop (inline comprehension) waiting for its consuming store.
    pending: Option<Expr>,
    chain: Vec<Expr>,
    unpack: Option<UnpackState>,
    for_target: Option<Expr>,
    with_target: Option<Expr>,
    print_items: Vec<Expr>,
    print_dest: Option<Expr>,
    prev_opcode: Option<Opcode>,
}

impl<'a> Decompiler<'a> {
    pub fn new(code: &'a CodeObject) -> Result<Self, DecompileError> {
        let entries = code.exception_entries().unwrap_or_default();
        let cfg = Cfg::build_with_exceptions(&code.code, &entries, code.version)?;
        Ok(Self {
            code,
            analysis: Analysis::analyze(cfg),
            recognizer: Recognizer::new(),
            stack: SymStack::new(code),
            version: code.version,
            pending: None,
            chain: Vec::new(),
            unpack: None,
            for_target: None,
            with_target: None,
            print_items: Vec::new(),
            print_dest: None,
            prev_opcode: None,
        })
    }

    /// Decompile the whole code object into a statement list.
    pub fn run(&mut self) -> Result<Vec<Stmt>, DecompileError> {
        if self.analysis.cfg.blocks.is_empty() {
            return Ok(Vec::new());
        }
        let mut body = Vec::new();
        self.emit_range(0, None, None, LoopCtx::default(), None, &mut body)?;
        elide_trailing_return_none(&mut body);
        Ok(body)
    }

    fn context_at(&self, block: BlockId) -> ErrorContext {
        let ctx = ErrorContext::new(&self.code.name);
        let instruction = self.analysis.cfg.instructions_of(block).last();
        match instruction {
            Some(i) => ctx.at(block, i.offset, i.opcode.mnemonic()),
            None => ctx,
        }
    }

    /// Structured emission over `[start, stop)`.
    ///
    /// `boundary` is an offset fence: a jump at or past it ends the range
    /// and the landing block is returned so the caller can continue there
    /// (try bodies escaping over their handlers use this).
    fn emit_range(
        &mut self,
        start: BlockId,
        stop: Option<BlockId>,
        boundary: Option<u32>,
        ctx: LoopCtx,
        suppress_try_at: Option<BlockId>,
        out: &mut Vec<Stmt>,
    ) -> Result<Option<BlockId>, DecompileError> {
        let mut cursor = Some(start);
        let mut first = true;
        let mut steps = 0usize;
        while let Some(block) = cursor {
            if Some(block) == stop {
                return Ok(None);
            }
            if !first {
                if let Some(fence) = boundary {
                    if self.analysis.cfg.block(block).start_offset >= fence {
                        return Ok(Some(block));
                    }
                }
                if ctx.header == Some(block) {
                    // Wrapped around the loop.
                    return Ok(None);
                }
            }
            steps += 1;
            if steps > self.analysis.cfg.blocks.len() * 4 + 16 {
                return Err(DecompileError::UnexpectedEmptyWorklist(
                    self.context_at(block),
                ));
            }
            let opts = DetectOpts {
                skip_try: suppress_try_at == Some(block),
                in_loop: ctx.header,
            };
            let pattern = self.recognizer.detect(&self.analysis, block, opts);
            trace!("block {block}: {pattern:?}");
            cursor = match pattern {
                Pattern::Sequential | Pattern::Unknown => {
                    match self.emit_linear(block, 0, ctx, out)? {
                        Flow::Fall(next) => next,
                        Flow::Jump(target) => Some(target),
                        Flow::Stop => None,
                    }
                }
                Pattern::If(p) => self.emit_if(p, ctx, suppress_try_at, out)?,
                Pattern::Ternary(p) => self.emit_ternary(p, ctx, out)?,
                Pattern::BoolChain(p) => {
                    self.emit_boolchain(p, ctx, suppress_try_at, out)?
                }
                Pattern::While(p) => self.emit_while(p, ctx, out)?,
                Pattern::For(p) => self.emit_for(p, ctx, out)?,
                Pattern::With(p) => self.emit_with(p, ctx, out)?,
                Pattern::Try(p) => self.emit_try(p, ctx, out)?,
                Pattern::Match(p) => self.emit_match(p, ctx, out)?,
            };
            first = false;
        }
        Ok(None)
    }

    // ------------------------------------------------------------------
    // Linear emission
    // ------------------------------------------------------------------

    fn instructions_of(&self, block: BlockId) -> Vec<Instruction> {
        self.analysis.cfg.instructions_of(block).to_vec()
    }

    /// Emit one block's instructions starting at `from_index`, including
    /// its terminator, and report where control went.
    fn emit_linear(
        &mut self,
        block: BlockId,
        from_index: usize,
        ctx: LoopCtx,
        out: &mut Vec<Stmt>,
    ) -> Result<Flow, DecompileError> {
        let instructions = self.instructions_of(block);
        for (index, instruction) in instructions.iter().enumerate().skip(from_index) {
            let is_terminator = index + 1 == instructions.len();
            if is_terminator {
                if let Some(flow) = self.dispatch_terminator(block, instruction, ctx, out) {
                    return Ok(flow);
                }
            }
            self.dispatch(instruction, out);
            self.prev_opcode = Some(instruction.opcode);
        }
        Ok(Flow::Fall(self.analysis.cfg.block(block).normal_successor()))
    }

    /// Emit everything before the terminator, leaving its operands on the
    /// symbolic stack.
    fn emit_prefix(
        &mut self,
        block: BlockId,
        _ctx: LoopCtx,
        out: &mut Vec<Stmt>,
    ) -> Result<(), DecompileError> {
        let instructions = self.instructions_of(block);
        let Some((_, prefix)) = instructions.split_last() else {
            return Ok(());
        };
        for instruction in prefix {
            self.dispatch(instruction, out);
            self.prev_opcode = Some(instruction.opcode);
        }
        Ok(())
    }

    /// Terminator-specific control flow; `None` means the instruction is
    /// an ordinary statement/expression op and falls through to dispatch.
    fn dispatch_terminator(
        &mut self,
        block: BlockId,
        instruction: &Instruction,
        ctx: LoopCtx,
        out: &mut Vec<Stmt>,
    ) -> Option<Flow> {
        let version = self.version;
        let target = instruction
            .jump_target(version)
            .and_then(|t| self.analysis.cfg.block_at_offset(t));
        match instruction.jump(version).map(|j| j.kind) {
            Some(JumpKind::Unconditional) => {
                let target = target?;
                if ctx.header == Some(target) {
                    let natural = self.analysis.cfg.block(block).end_offset >= ctx.last_offset;
                    if !natural {
                        out.push(Stmt::Continue);
                    }
                    return Some(Flow::Stop);
                }
                if ctx.exit == Some(target) && ctx.header.is_some() {
                    out.push(Stmt::Break);
                    return Some(Flow::Stop);
                }
                Some(Flow::Jump(target))
            }
            Some(JumpKind::Setup) => Some(Flow::Fall(
                self.analysis.cfg.block(block).normal_successor(),
            )),
            Some(_) => {
                // A conditional that no pattern claimed: take the false
                // edge after dropping the condition.
                let _ = self.stack.pop();
                debug!("unstructured conditional at block {block}");
                Some(Flow::Fall(
                    self.analysis
                        .cfg
                        .block(block)
                        .successor_by_kind(EdgeKind::ConditionalFalse),
                ))
            }
            None => match instruction.opcode {
                Opcode::ReturnValue => {
                    let value = self.pop_expr_or_unknown();
                    out.push(Stmt::Return(Some(value)));
                    Some(Flow::Stop)
                }
                Opcode::ReturnConst => {
                    let value = self
                        .code
                        .const_at(instruction.arg)
                        .cloned()
                        .unwrap_or(Const::None);
                    out.push(Stmt::Return(Some(Expr::Literal(value))));
                    Some(Flow::Stop)
                }
                Opcode::RaiseVarargs => {
                    let (exc, cause) = match instruction.arg {
                        0 => (None, None),
                        1 => (Some(self.pop_expr_or_unknown()), None),
                        _ => {
                            let cause = self.pop_expr_or_unknown();
                            (Some(self.pop_expr_or_unknown()), Some(cause))
                        }
                    };
                    out.push(Stmt::Raise { exc, cause });
                    Some(Flow::Stop)
                }
                Opcode::Reraise => Some(Flow::Stop),
                Opcode::BreakLoop => {
                    out.push(Stmt::Break);
                    Some(Flow::Stop)
                }
                _ => None,
            },
        }
    }

    fn pop_expr_or_unknown(&mut self) -> Expr {
        if let Some(pending) = self.pending.take() {
            return pending;
        }
        match self.stack.pop() {
            Ok(value) => value.to_expression().unwrap_or(Expr::Unknown),
            Err(_) => Expr::Unknown,
        }
    }

    /// Statement-or-expression dispatch for one instruction.
    fn dispatch(&mut self, instruction: &Instruction, out: &mut Vec<Stmt>) {
        use Opcode::*;
        let arg = instruction.arg;
        match instruction.opcode {
            StoreName | StoreGlobal => {
                let target = Expr::name(self.code.name_at(arg));
                self.handle_store(target, out);
            }
            StoreFast => {
                let target = Expr::name(self.code.varname_at(arg));
                self.handle_store(target, out);
            }
            StoreFastLoadFast => {
                let target = Expr::name(self.code.varname_at(arg >> 4));
                self.handle_store(target, out);
                self.stack
                    .push_expr(Expr::name(self.code.varname_at(arg & 0xf)));
            }
            StoreDeref => {
                let target = Expr::name(self.code.derefname_at(arg));
                self.handle_store(target, out);
            }
            StoreAttr => {
                let object = self.pop_expr_quiet();
                let target = Expr::attribute(object, self.code.name_at(arg));
                self.handle_store(target, out);
            }
            StoreSubscr => {
                let index = self.pop_expr_quiet();
                let object = self.pop_expr_quiet();
                let target = Expr::Subscript {
                    value: Box::new(object),
                    index: Box::new(index),
                };
                self.handle_store(target, out);
            }
            StoreSlice => {
                let upper = self.pop_expr_quiet();
                let lower = self.pop_expr_quiet();
                let object = self.pop_expr_quiet();
                let target = Expr::Subscript {
                    value: Box::new(object),
                    index: Box::new(Expr::Slice {
                        lower: Some(Box::new(lower)),
                        upper: Some(Box::new(upper)),
                        step: None,
                    }),
                };
                self.handle_store(target, out);
            }
            StoreSlicePy2 => {
                let object = self.pop_expr_quiet();
                let target = Expr::Subscript {
                    value: Box::new(object),
                    index: Box::new(Expr::Slice {
                        lower: None,
                        upper: None,
                        step: None,
                    }),
                };
                self.handle_store(target, out);
            }
            DeleteName | DeleteGlobal => {
                out.push(Stmt::Delete(vec![Expr::name(self.code.name_at(arg))]));
            }
            DeleteFast => {
                out.push(Stmt::Delete(vec![Expr::name(self.code.varname_at(arg))]));
            }
            DeleteDeref => {
                out.push(Stmt::Delete(vec![Expr::name(self.code.derefname_at(arg))]));
            }
            DeleteAttr => {
                let object = self.pop_expr_quiet();
                out.push(Stmt::Delete(vec![Expr::attribute(
                    object,
                    self.code.name_at(arg),
                )]));
            }
            DeleteSubscr => {
                let index = self.pop_expr_quiet();
                let object = self.pop_expr_quiet();
                out.push(Stmt::Delete(vec![Expr::Subscript {
                    value: Box::new(object),
                    index: Box::new(index),
                }]));
            }
            DeleteSlicePy2 => {
                let object = self.pop_expr_quiet();
                out.push(Stmt::Delete(vec![Expr::Subscript {
                    value: Box::new(object),
                    index: Box::new(Expr::Slice {
                        lower: None,
                        upper: None,
                        step: None,
                    }),
                }]));
            }
            UnpackSequence => {
                let value = self.stack.pop().unwrap_or(StackValue::Unknown);
                self.unpack = Some(UnpackState {
                    targets: Vec::with_capacity(arg as usize),
                    remaining: arg as usize,
                    star_index: None,
                    value,
                });
            }
            UnpackEx => {
                let before = arg as usize & 0xff;
                let after = (arg >> 8) as usize & 0xff;
                let value = self.stack.pop().unwrap_or(StackValue::Unknown);
                self.unpack = Some(UnpackState {
                    targets: Vec::with_capacity(before + after + 1),
                    remaining: before + after + 1,
                    star_index: Some(before),
                    value,
                });
            }
            PopTop => self.handle_pop_top(out),
            PrintItem | PrintItemTo => {
                if instruction.opcode == PrintItemTo {
                    // TOS is the stream, the item sits beneath.
                    let stream = self.pop_expr_quiet();
                    self.print_dest = Some(stream);
                }
                let item = self.pop_expr_quiet();
                self.print_items.push(item);
            }
            PrintNewline | PrintNewlineTo => {
                if instruction.opcode == PrintNewlineTo {
                    let stream = self.pop_expr_quiet();
                    if self.print_dest.is_none() {
                        self.print_dest = Some(stream);
                    }
                }
                out.push(Stmt::Print {
                    dest: self.print_dest.take(),
                    values: std::mem::take(&mut self.print_items),
                    newline: true,
                });
            }
            PrintExpr => {
                let value = self.pop_expr_quiet();
                out.push(Stmt::Expr(value));
            }
            ExecStmt => {
                let locals = self.pop_expr_quiet();
                let globals = self.pop_expr_quiet();
                let body = self.pop_expr_quiet();
                let (globals, locals) = match (globals, locals) {
                    (Expr::Literal(Const::None), Expr::Literal(Const::None)) => (None, None),
                    (g, Expr::Literal(Const::None)) => (Some(g), None),
                    (g, l) => (Some(g), Some(l)),
                };
                out.push(Stmt::Exec {
                    body,
                    globals,
                    locals,
                });
            }
            ImportStar => {
                if let Ok(StackValue::Import { module, level, .. }) = self.stack.pop() {
                    out.push(Stmt::ImportFrom {
                        module: Some(module),
                        names: vec![Alias {
                            name: "*".into(),
                            asname: None,
                        }],
                        level,
                    });
                }
            }
            // Exception bookkeeping with no source counterpart.
            PopBlock | PopExcept | PushExcInfo | EndFinally | BeginFinally | PopFinally
            | EndFor | EndAsyncFor | CheckExcMatch | CheckEgMatch | PrepReraiseStar
            | WithExceptStart | WithCleanup | WithCleanupStart | WithCleanupFinish | Send
            | CleanupThrow | ReturnGenerator | BeforeWith | BeforeAsyncWith | SetupWith
            | SetupAsyncWith | AsyncGenWrap => {
                trace!("skipping {}", instruction.opcode.mnemonic());
            }
            _ => self.simulate_tolerant(instruction),
        }
    }

    fn simulate_tolerant(&mut self, instruction: &Instruction) {
        if let Err(err) = self.stack.simulate(instruction) {
            trace!(
                "simulation of {} degraded: {err}",
                instruction.opcode.mnemonic()
            );
            self.stack.push(StackValue::Unknown);
        }
        self.reify_top();
    }

    fn pop_expr_quiet(&mut self) -> Expr {
        match self.stack.pop() {
            Ok(value) => value.to_expression().unwrap_or(Expr::Unknown),
            Err(_) => Expr::Unknown,
        }
    }

    /// Replace freshly-created lambda / comprehension values with their
    /// reconstructed expressions.
    fn reify_top(&mut self) {
        let replacement = match self.stack.peek() {
            Some(StackValue::Function(parts)) if parts.code.name == "<lambda>" => {
                Some(self.reify_lambda(parts.clone()))
            }
            Some(StackValue::ComprehensionCall { code, iterable }) => {
                Some(self.reify_comprehension(code.clone(), iterable.clone()))
            }
            _ => None,
        };
        if let Some(expr) = replacement {
            let _ = self.stack.pop();
            self.stack.push_expr(expr);
        }
    }

    fn reify_lambda(&self, parts: FunctionParts) -> Expr {
        let args = build_arguments(&parts.code, &parts);
        match Decompiler::new(&parts.code).and_then(|mut d| d.run()) {
            Ok(stmts) => match stmts.as_slice() {
                [Stmt::Return(Some(expr))] => Expr::Lambda {
                    args: Box::new(args),
                    body: Box::new(expr.clone()),
                },
                _ => Expr::Unknown,
            },
            Err(err) => {
                debug!("lambda body failed to decompile: {err}");
                Expr::Unknown
            }
        }
    }

    fn reify_comprehension(&self, code: Arc<CodeObject>, iterable: Expr) -> Expr {
        let stmts = match Decompiler::new(&code).and_then(|mut d| d.run()) {
            Ok(stmts) => stmts,
            Err(err) => {
                debug!("comprehension body failed to decompile: {err}");
                return Expr::Unknown;
            }
        };
        let mut expr = match stmts.as_slice() {
            [Stmt::Return(Some(expr @ Expr::Comprehension { .. }))] => expr.clone(),
            // Generator bodies survive as a bare loop around a yield.
            [Stmt::For {
                target,
                iter,
                body,
                ..
            }] => {
                let element = match body.as_slice() {
                    [Stmt::Expr(Expr::Yield(Some(element)))] => (**element).clone(),
                    _ => return Expr::Unknown,
                };
                Expr::Comprehension {
                    kind: ComprehensionKind::Generator,
                    element: Box::new(element),
                    value: None,
                    clauses: vec![ComprehensionClause {
                        target: target.clone(),
                        iter: iter.clone(),
                        ifs: Vec::new(),
                        is_async: false,
                    }],
                }
            }
            _ => return Expr::Unknown,
        };
        if let Expr::Comprehension { clauses, .. } = &mut expr {
            if let Some(first) = clauses.first_mut() {
                if first.iter == Expr::name(".0") || first.iter == Expr::Unknown {
                    first.iter = iterable;
                }
            }
        }
        expr
    }

    fn handle_pop_top(&mut self, out: &mut Vec<Stmt>) {
        if let Some(pending) = self.pending.take() {
            out.push(Stmt::Expr(pending));
            return;
        }
        match self.stack.pop() {
            Ok(StackValue::Expr(Expr::Literal(_))) => {
                // Dropped literal: docstring slot or compiler artifact.
            }
            Ok(StackValue::Expr(expr)) => out.push(Stmt::Expr(expr)),
            Ok(StackValue::Import { .. }) => {
                // End of a from-import sequence; aliases were emitted at
                // their stores.
            }
            Ok(_) | Err(_) => {}
        }
    }

    fn handle_store(&mut self, target: Expr, out: &mut Vec<Stmt>) {
        // Unpack targets collect before any value logic runs.
        if let Some(unpack) = &mut self.unpack {
            let wrapped = if unpack.star_index == Some(unpack.targets.len()) {
                Expr::Starred(Box::new(target))
            } else {
                target
            };
            unpack.targets.push(wrapped);
            unpack.remaining -= 1;
            if unpack.remaining == 0 {
                let state = self.unpack.take().expect("checked above");
                let tuple = Expr::Tuple(state.targets);
                match state.value {
                    StackValue::IterItem => self.for_target = Some(tuple),
                    value => {
                        let value = value.to_expression().unwrap_or(Expr::Unknown);
                        out.push(Stmt::Assign {
                            targets: vec![tuple],
                            value,
                        });
                    }
                }
            }
            return;
        }

        if let Some(pending) = self.pending.take() {
            out.push(Stmt::Assign {
                targets: vec![target],
                value: pending,
            });
            return;
        }

        let value = match self.stack.pop() {
            Ok(value) => value,
            Err(_) => StackValue::Unknown,
        };
        match value {
            StackValue::IterItem => {
                self.for_target = Some(target);
            }
            StackValue::WithResult => {
                self.with_target = Some(target);
            }
            StackValue::Function(parts) => {
                out.push(self.build_function_def(target, parts));
            }
            StackValue::Class(parts) => {
                out.push(self.build_class_def(target, parts));
            }
            StackValue::Import { module, level, .. } => {
                let target_name = match &target {
                    Expr::Name(name) => name.clone(),
                    _ => module.clone(),
                };
                let top_level = module.split('.').next().unwrap_or(&module);
                let asname = (target_name != module && target_name != top_level)
                    .then_some(target_name);
                out.push(Stmt::Import {
                    names: vec![Alias {
                        name: module,
                        asname,
                    }],
                });
            }
            StackValue::ImportFrom { module, name } => {
                let asname = match &target {
                    Expr::Name(t) if *t != name => Some(t.clone()),
                    _ => None,
                };
                let level = match self.stack.peek() {
                    Some(StackValue::Import { level, .. }) => *level,
                    _ => 0,
                };
                // Merge consecutive from-imports of the same module.
                let alias = Alias { name, asname };
                if let Some(Stmt::ImportFrom {
                    module: Some(m),
                    names,
                    ..
                }) = out.last_mut()
                {
                    if *m == module {
                        names.push(alias);
                        return;
                    }
                }
                out.push(Stmt::ImportFrom {
                    module: Some(module),
                    names: vec![alias],
                    level,
                });
            }
            StackValue::SavedLocal(_) => {
                // Restoring a spilled local; no source counterpart.
            }
            other => {
                let value = other.to_expression().unwrap_or(Expr::Unknown);
                // Chain assignments: a copy precedes every target but the
                // last, so this store consumed the duplicate.
                if matches!(self.prev_opcode, Some(Opcode::DupTop | Opcode::Copy)) {
                    self.chain.push(target);
                    return;
                }
                if !self.chain.is_empty() {
                    let mut targets = std::mem::take(&mut self.chain);
                    targets.push(target);
                    out.push(Stmt::Assign { targets, value });
                    return;
                }
                // Augmented assignment: `t = t op v`.
                if let Expr::BinOp { left, op, right } = &value {
                    if **left == target {
                        out.push(Stmt::AugAssign {
                            target,
                            op: *op,
                            value: (**right).clone(),
                        });
                        return;
                    }
                }
                out.push(Stmt::Assign {
                    targets: vec![target],
                    value,
                });
            }
        }
    }

    // ------------------------------------------------------------------
    // Conditions and branches
    // ------------------------------------------------------------------

    /// The raw truth value a conditional terminator tests; the value is
    /// already popped by the caller.
    fn tested_condition(&self, cond: Expr, terminator: &Instruction) -> Expr {
        match terminator.jump(self.version).map(|j| j.kind) {
            Some(JumpKind::IfNone) => Expr::Compare {
                left: Box::new(cond),
                ops: vec![crate::ast::CmpOp::Is],
                comparators: vec![Expr::none()],
            },
            Some(JumpKind::IfNotNone) => Expr::Compare {
                left: Box::new(cond),
                ops: vec![crate::ast::CmpOp::IsNot],
                comparators: vec![Expr::none()],
            },
            _ => cond,
        }
    }

    /// The expression that holds on the fallthrough path of `terminator`.
    fn branch_test(&mut self, terminator: &Instruction) -> Expr {
        let cond = self.pop_expr_quiet();
        let tested = self.tested_condition(cond, terminator);
        match terminator.jump(self.version).map(|j| j.kind) {
            // Jump taken when truthy: the fallthrough sees the negation.
            Some(JumpKind::IfTrue | JumpKind::OrPopTrue | JumpKind::IfNone
                | JumpKind::IfNotNone) => tested.negate(),
            _ => tested,
        }
    }

    /// The `(true successor, false successor)` of a conditional block in
    /// terms of the tested condition.
    fn polarity_successors(&self, block: BlockId) -> Option<(BlockId, BlockId)> {
        let terminator = self.analysis.cfg.terminator(block);
        let target = terminator
            .jump_target(self.version)
            .and_then(|t| self.analysis.cfg.block_at_offset(t))?;
        let fallthrough = self
            .analysis
            .cfg
            .block_at_offset(terminator.next_offset())?;
        match terminator.jump(self.version)?.kind {
            JumpKind::IfFalse | JumpKind::OrPopFalse => Some((fallthrough, target)),
            JumpKind::IfTrue | JumpKind::OrPopTrue | JumpKind::IfNone | JumpKind::IfNotNone => {
                Some((target, fallthrough))
            }
            _ => None,
        }
    }

    /// Recursively assemble the boolean expression a condition chain
    /// computes, relative to its `then`/`orelse` continuations. The root
    /// call passes `simulate_prefix: false` because the driver already
    /// emitted the root block's prefix as statements.
    fn chain_expression(
        &mut self,
        block: BlockId,
        then: BlockId,
        orelse: BlockId,
        chain: &[BlockId],
        visited: &mut Vec<BlockId>,
        simulate_prefix: bool,
    ) -> Expr {
        if visited.contains(&block) {
            return Expr::Unknown;
        }
        visited.push(block);
        let instructions = self.instructions_of(block);
        let (terminator, prefix) = instructions.split_last().expect("blocks are non-empty");
        if simulate_prefix {
            for instruction in prefix {
                self.simulate_tolerant(instruction);
            }
        }
        let raw = self.pop_expr_quiet();
        let cond = self.tested_condition(raw, terminator);
        let Some((on_true, on_false)) = self.polarity_successors(block) else {
            return cond;
        };
        // Leaf clauses resolve directly against the continuations, even
        // when a continuation is itself a chain block of an enclosing
        // conjunct.
        if on_true == then && on_false == orelse {
            return cond;
        }
        if on_true == orelse && on_false == then {
            return cond.negate();
        }
        match (chain.contains(&on_true), chain.contains(&on_false)) {
            (false, false) => cond,
            (true, false) => {
                if on_false == orelse {
                    and(
                        cond,
                        self.chain_expression(on_true, then, orelse, chain, visited, true),
                    )
                } else {
                    // Falls to the then-side: `not c or rest`.
                    or(
                        cond.negate(),
                        self.chain_expression(on_true, then, orelse, chain, visited, true),
                    )
                }
            }
            (false, true) => {
                if on_true == then {
                    or(
                        cond,
                        self.chain_expression(on_false, then, orelse, chain, visited, true),
                    )
                } else {
                    and(
                        cond.negate(),
                        self.chain_expression(on_false, then, orelse, chain, visited, true),
                    )
                }
            }
            (true, true) => {
                // `(c and rest) or alternative`: the true side chains with
                // the false side as its short-circuit target.
                let conj = and(
                    cond,
                    self.chain_expression(on_true, then, on_false, chain, visited, true),
                );
                or(
                    conj,
                    self.chain_expression(on_false, then, orelse, chain, visited, true),
                )
            }
        }
    }

    /// Build the full test of a conditional block, folding `and`/`or`
    /// chains. Returns the test plus the (then, else) continuation
    /// blocks, with the test true on the then side.
    fn build_condition(
        &mut self,
        block: BlockId,
        ctx: LoopCtx,
        out: &mut Vec<Stmt>,
    ) -> Result<(Expr, BlockId, BlockId), DecompileError> {
        self.emit_prefix(block, ctx, out)?;
        match crate::patterns::condition_chain(&self.analysis.cfg, block) {
            Some((chain, then, orelse)) => {
                let mut visited = Vec::new();
                let test =
                    self.chain_expression(block, then, orelse, &chain, &mut visited, false);
                Ok((test, then, orelse))
            }
            None => {
                // Unchainable conditional (legacy exception-match or a
                // loop tail); fall back to raw polarity.
                let terminator = *self
                    .instructions_of(block)
                    .last()
                    .expect("blocks are non-empty");
                let test = self.branch_test(&terminator);
                let cfg_block = self.analysis.cfg.block(block);
                let then = cfg_block
                    .successor_by_kind(EdgeKind::ConditionalTrue)
                    .ok_or_else(|| DecompileError::InvalidBlock(self.context_at(block)))?;
                let orelse = cfg_block
                    .successor_by_kind(EdgeKind::ConditionalFalse)
                    .ok_or_else(|| DecompileError::InvalidBlock(self.context_at(block)))?;
                Ok((test, then, orelse))
            }
        }
    }

    fn emit_if(
        &mut self,
        p: crate::patterns::IfPattern,
        ctx: LoopCtx,
        suppress_try_at: Option<BlockId>,
        out: &mut Vec<Stmt>,
    ) -> Result<Option<BlockId>, DecompileError> {
        let (test, then, orelse_block) = self.build_condition(p.cond, ctx, out)?;
        let merge = p.merge;
        let snapshot = self.stack.clone_values();

        let mut body = Vec::new();
        self.emit_range(then, merge, None, ctx, suppress_try_at, &mut body)?;
        if body.is_empty() {
            body.push(Stmt::Pass);
        }

        let mut orelse = Vec::new();
        if p.orelse.is_some() && Some(orelse_block) != merge {
            self.stack.restore(snapshot.clone());
            self.emit_range(orelse_block, merge, None, ctx, suppress_try_at, &mut orelse)?;
        }
        self.stack.restore(snapshot);

        // A guard duplicated out of a rotated `while` collapses into the
        // loop itself.
        let guard_of_rotated_loop = orelse.is_empty()
            && body.len() == 1
            && matches!(&body[0], Stmt::While { test: loop_test, .. } if *loop_test == test);
        if guard_of_rotated_loop {
            out.push(body.pop().expect("length checked"));
            return Ok(merge);
        }
        out.push(Stmt::If {
            test,
            body,
            orelse,
        });
        Ok(merge)
    }

    fn emit_ternary(
        &mut self,
        p: crate::patterns::TernaryPattern,
        ctx: LoopCtx,
        out: &mut Vec<Stmt>,
    ) -> Result<Option<BlockId>, DecompileError> {
        let (test, then, orelse) = self.build_condition(p.cond, ctx, out)?;
        let snapshot = self.stack.clone_values();

        let body_expr = self.replay_expression_arm(then);
        self.stack.restore(snapshot.clone());
        let else_expr = self.replay_expression_arm(orelse);
        self.stack.restore(snapshot);

        self.stack.push_expr(Expr::IfExp {
            test: Box::new(test),
            body: Box::new(body_expr),
            orelse: Box::new(else_expr),
        });
        Ok(Some(p.merge))
    }

    /// Replay an expression-only arm and return the value it leaves.
    fn replay_expression_arm(&mut self, block: BlockId) -> Expr {
        let instructions = self.instructions_of(block);
        let end = instructions
            .last()
            .is_some_and(|i| i.is_unconditional_jump(self.version))
            .then(|| instructions.len() - 1)
            .unwrap_or(instructions.len());
        for instruction in &instructions[..end] {
            self.simulate_tolerant(instruction);
        }
        self.pop_expr_quiet()
    }

    /// Emit an `OR_POP` short-circuit chain. The chain either produces a
    /// value (`x = a and b`) or feeds a final conditional jump, in which
    /// case it is an `if`/chained-comparison test.
    fn emit_boolchain(
        &mut self,
        p: crate::patterns::BoolChainPattern,
        ctx: LoopCtx,
        suppress_try_at: Option<BlockId>,
        out: &mut Vec<Stmt>,
    ) -> Result<Option<BlockId>, DecompileError> {
        self.emit_prefix(p.first, ctx, out)?;
        let mut values = vec![self.pop_expr_quiet()];
        let continuation = |d: &Self, block: BlockId| {
            d.analysis.cfg.block(block).successor_by_kind(if p.is_and {
                EdgeKind::ConditionalTrue
            } else {
                EdgeKind::ConditionalFalse
            })
        };
        let mut cursor = continuation(self, p.first);
        let mut final_cond: Option<(BlockId, Instruction)> = None;
        let mut guard = 0;
        while let Some(block) = cursor {
            guard += 1;
            if guard > self.analysis.cfg.blocks.len() || block == p.target {
                break;
            }
            let instructions = self.instructions_of(block);
            let (last, rest) = instructions.split_last().expect("non-empty");
            for instruction in rest {
                self.simulate_tolerant(instruction);
            }
            match last.jump(self.version).map(|j| j.kind) {
                Some(JumpKind::OrPopFalse | JumpKind::OrPopTrue) => {
                    values.push(self.pop_expr_quiet());
                    cursor = continuation(self, block);
                }
                Some(
                    JumpKind::IfTrue | JumpKind::IfFalse | JumpKind::IfNone | JumpKind::IfNotNone,
                ) => {
                    // The chain is the test of a statement-level branch.
                    final_cond = Some((block, *last));
                    break;
                }
                _ => {
                    if last.jump(self.version).is_none() && !last.ends_block(self.version) {
                        self.simulate_tolerant(last);
                    }
                    values.push(self.pop_expr_quiet());
                    cursor = None;
                }
            }
        }

        let Some((cond_block, terminator)) = final_cond else {
            // Value form: the chain result flows to the short-circuit
            // target as an expression.
            self.stack.push_expr(fold_chain(values, p.is_and));
            return Ok(Some(p.target));
        };

        values.push(self.branch_test(&terminator));
        let test = fold_chain(values, p.is_and);
        let (then, orelse) = self
            .polarity_successors(cond_block)
            .ok_or_else(|| DecompileError::InvalidBlock(self.context_at(cond_block)))?;
        // The short-circuit cleanup block pops the retained value and
        // rejoins; when it rejoins exactly at the else side there is no
        // real else branch.
        let shim_after = self.shim_target(p.target);
        if shim_after == Some(orelse) {
            let snapshot = self.stack.clone_values();
            let mut body = Vec::new();
            self.emit_range(then, Some(orelse), None, ctx, suppress_try_at, &mut body)?;
            if body.is_empty() {
                body.push(Stmt::Pass);
            }
            self.stack.restore(snapshot);
            out.push(Stmt::If {
                test,
                body,
                orelse: Vec::new(),
            });
            return Ok(Some(orelse));
        }
        let merge = self.analysis.post.merge(then, orelse);
        let snapshot = self.stack.clone_values();
        let mut body = Vec::new();
        self.emit_range(then, merge, None, ctx, suppress_try_at, &mut body)?;
        if body.is_empty() {
            body.push(Stmt::Pass);
        }
        let mut orelse_body = Vec::new();
        if Some(orelse) != merge {
            self.stack.restore(snapshot.clone());
            self.emit_range(orelse, merge, None, ctx, suppress_try_at, &mut orelse_body)?;
        }
        self.stack.restore(snapshot);
        out.push(Stmt::If {
            test,
            body,
            orelse: orelse_body,
        });
        Ok(merge)
    }

    /// Where a pop/jump-only shim block transfers control, if it is one.
    fn shim_target(&self, block: BlockId) -> Option<BlockId> {
        let instructions = self.analysis.cfg.instructions_of(block);
        let shim_only = instructions.iter().all(|i| {
            matches!(i.opcode, Opcode::PopTop | Opcode::Nop)
                || i.is_unconditional_jump(self.version)
        });
        if !shim_only {
            return None;
        }
        self.analysis.cfg.block(block).normal_successor()
    }

    // ------------------------------------------------------------------
    // Loops
    // ------------------------------------------------------------------

    fn loop_last_offset(&mut self, header: BlockId) -> u32 {
        let region = self.recognizer.loop_region(&self.analysis, header).clone();
        region
            .iter_ones()
            .map(|b| self.analysis.cfg.block(b as BlockId).end_offset)
            .max()
            .unwrap_or(0)
    }

    fn emit_while(
        &mut self,
        p: WhilePattern,
        outer: LoopCtx,
        out: &mut Vec<Stmt>,
    ) -> Result<Option<BlockId>, DecompileError> {
        let last_offset = self.loop_last_offset(p.header);
        let ctx = LoopCtx {
            header: Some(p.header),
            exit: p.exit,
            last_offset,
        };
        let snapshot = self.stack.clone_values();
        if p.infinite {
            let mut body = Vec::new();
            self.emit_range(p.body, None, None, ctx, None, &mut body)?;
            if body.is_empty() {
                body.push(Stmt::Pass);
            }
            self.stack.restore(snapshot);
            out.push(Stmt::While {
                test: Expr::Literal(Const::Bool(true)),
                body,
                orelse: Vec::new(),
            });
            return Ok(p.exit);
        }

        if p.body == p.header {
            // Rotated loop: the test sits at the bottom of a self-looping
            // block and the jump taken continues the loop.
            let mut body = Vec::new();
            self.emit_prefix(p.header, ctx, &mut body)?;
            let terminator = *self
                .instructions_of(p.header)
                .last()
                .expect("blocks are non-empty");
            let test = self.branch_test(&terminator).negate();
            if body.is_empty() {
                body.push(Stmt::Pass);
            }
            self.stack.restore(snapshot);
            out.push(Stmt::While {
                test,
                body,
                orelse: Vec::new(),
            });
            return Ok(p.exit);
        }

        let (test, then, orelse) = self.build_condition(p.header, outer, out)?;
        // The chain walk may have re-resolved the body/exit pair.
        let (body_block, exit) = if self
            .recognizer
            .loop_region(&self.analysis, p.header)
            .get(then as usize)
            .map(|b| *b)
            .unwrap_or(false)
        {
            (then, Some(orelse))
        } else {
            (p.body, p.exit)
        };
        let ctx = LoopCtx {
            header: Some(p.header),
            exit,
            last_offset,
        };
        let mut body = Vec::new();
        self.emit_range(body_block, None, None, ctx, None, &mut body)?;
        if body.is_empty() {
            body.push(Stmt::Pass);
        }
        self.stack.restore(snapshot);
        out.push(Stmt::While {
            test,
            body,
            orelse: Vec::new(),
        });
        Ok(exit)
    }

    fn emit_for(
        &mut self,
        p: ForPattern,
        outer: LoopCtx,
        out: &mut Vec<Stmt>,
    ) -> Result<Option<BlockId>, DecompileError> {
        // The header block may carry a prefix before FOR_ITER (rare; the
        // iterable usually arrives on the stack from the setup block).
        self.emit_prefix(p.header, outer, out)?;
        let iter_expr = self.pop_expr_quiet();

        if let Some(expr) = self.try_inline_comprehension(&p, &iter_expr) {
            // The whole loop reduces to one expression. With a live
            // operand stack it rides there so the exit block's epilogue
            // shuffles stay coherent; otherwise it waits in the pending
            // slot for the consuming store.
            if self.stack.is_empty() {
                self.pending = Some(expr);
            } else {
                self.stack.push_expr(expr);
            }
            return Ok(p.exit);
        }

        let last_offset = self.loop_last_offset(p.header);
        let ctx = LoopCtx {
            header: Some(p.header),
            exit: p.exit,
            last_offset,
        };
        let snapshot = self.stack.clone_values();
        self.stack.push(StackValue::IterItem);
        let saved_target = self.for_target.take();
        let mut body = Vec::new();
        self.emit_range(p.body, None, None, ctx, None, &mut body)?;
        if body.is_empty() {
            body.push(Stmt::Pass);
        }
        let target = self.for_target.take().unwrap_or(Expr::Unknown);
        self.for_target = saved_target;
        self.stack.restore(snapshot);

        let mut orelse = Vec::new();
        if let Some(orelse_block) = p.orelse {
            self.emit_range(orelse_block, p.exit, None, outer, None, &mut orelse)?;
        }
        out.push(Stmt::For {
            target,
            iter: iter_expr,
            body,
            orelse,
            is_async: p.is_async,
        });
        Ok(p.exit)
    }

    /// Reduce an accumulator loop to a comprehension expression.
    ///
    /// Fires for the 3.12+ inline form and, when recursing into a
    /// synthesized `<listcomp>` code object, for the classic form. The
    /// accumulator literal must already sit beneath the iterable.
    fn try_inline_comprehension(&mut self, p: &ForPattern, iter_expr: &Expr) -> Option<Expr> {
        let kind = match self.stack.peek() {
            Some(StackValue::Expr(Expr::List(items))) if items.is_empty() => {
                ComprehensionKind::List
            }
            Some(StackValue::Expr(Expr::Set(items))) if items.is_empty() => ComprehensionKind::Set,
            Some(StackValue::Expr(Expr::Dict { keys, .. })) if keys.is_empty() => {
                ComprehensionKind::Dict
            }
            _ => return None,
        };
        let body_set = self.analysis.loops.body(p.header)?.clone();
        let mut blocks: Vec<BlockId> = body_set
            .iter_ones()
            .map(|b| b as BlockId)
            .filter(|&b| b != p.header)
            .collect();
        blocks.sort_by_key(|&b| self.analysis.cfg.block(b).start_offset);
        if blocks.is_empty() {
            return None;
        }

        let snapshot = self.stack.clone_values();
        let mut target: Option<Expr> = None;
        let mut ifs: Vec<Expr> = Vec::new();
        let mut element: Option<Expr> = None;
        let mut value: Option<Expr> = None;
        self.stack.push(StackValue::IterItem);

        'outer: for &block in &blocks {
            let instructions = self.instructions_of(block);
            for instruction in &instructions {
                match instruction.opcode {
                    Opcode::StoreFast | Opcode::StoreName | Opcode::StoreDeref
                        if target.is_none() =>
                    {
                        let _ = self.stack.pop();
                        let name = match instruction.opcode {
                            Opcode::StoreFast => self.code.varname_at(instruction.arg),
                            Opcode::StoreName => self.code.name_at(instruction.arg),
                            _ => self.code.derefname_at(instruction.arg),
                        };
                        target = Some(Expr::name(name));
                    }
                    Opcode::UnpackSequence if target.is_none() => {
                        let _ = self.stack.pop();
                        let count = instruction.arg as usize;
                        // Collect the next `count` stores as the tuple
                        // target; they follow immediately.
                        target = Some(Expr::Tuple(Vec::with_capacity(count)));
                    }
                    Opcode::StoreFast | Opcode::StoreName => {
                        if let Some(Expr::Tuple(items)) = &mut target {
                            let name = if instruction.opcode == Opcode::StoreFast {
                                self.code.varname_at(instruction.arg)
                            } else {
                                self.code.name_at(instruction.arg)
                            };
                            items.push(Expr::name(name));
                        }
                    }
                    Opcode::ListAppend | Opcode::SetAdd => {
                        element = Some(self.pop_expr_quiet());
                    }
                    Opcode::MapAdd => {
                        // TOS is the value, the key sits beneath.
                        let v = self.pop_expr_quiet();
                        let k = self.pop_expr_quiet();
                        element = Some(k);
                        value = Some(v);
                    }
                    _ if instruction.is_conditional_jump(self.version)
                        && element.is_none() =>
                    {
                        let test = self.branch_test(instruction);
                        ifs.push(test);
                    }
                    _ if instruction.is_unconditional_jump(self.version) => break 'outer,
                    _ => {
                        if self.stack.simulate(instruction).is_err() {
                            // Not a comprehension body after all.
                            self.stack.restore(snapshot);
                            return None;
                        }
                    }
                }
            }
        }

        let (target, element) = match (target, element) {
            (Some(t), Some(e)) => (t, e),
            _ => {
                self.stack.restore(snapshot);
                return None;
            }
        };
        self.stack.restore(snapshot);
        let _ = self.stack.pop(); // the empty accumulator literal
        Some(Expr::Comprehension {
            kind,
            element: Box::new(element),
            value: value.map(Box::new),
            clauses: vec![ComprehensionClause {
                target,
                iter: iter_expr.clone(),
                ifs,
                is_async: false,
            }],
        })
    }

    // ------------------------------------------------------------------
    // With / try / match
    // ------------------------------------------------------------------

    fn emit_with(
        &mut self,
        p: crate::patterns::WithPattern,
        outer: LoopCtx,
        out: &mut Vec<Stmt>,
    ) -> Result<Option<BlockId>, DecompileError> {
        // Emit up to (not including) the setup opcode; the context
        // expression is then on top.
        let instructions = self.instructions_of(p.setup);
        let setup_index = instructions
            .iter()
            .position(|i| {
                matches!(
                    i.opcode,
                    Opcode::BeforeWith
                        | Opcode::BeforeAsyncWith
                        | Opcode::SetupWith
                        | Opcode::SetupAsyncWith
                        | Opcode::LoadSpecial
                )
            })
            .unwrap_or(instructions.len().saturating_sub(1));
        for instruction in &instructions[..setup_index] {
            self.dispatch(instruction, out);
            self.prev_opcode = Some(instruction.opcode);
        }
        let context = self.pop_expr_quiet();

        let snapshot = self.stack.clone_values();
        self.stack.push(StackValue::WithResult);
        let saved = self.with_target.take();
        let mut body = Vec::new();
        let stop = p.cleanup.or(p.exit);
        // The body's jump over the cleanup marks where the statement ends.
        let fence = stop.map(|b| self.analysis.cfg.block(b).start_offset);
        let escape = self.emit_range(p.body, stop, fence, outer, None, &mut body)?;
        if body.is_empty() {
            body.push(Stmt::Pass);
        }
        let optional_vars = self.with_target.take();
        self.with_target = saved;
        self.stack.restore(snapshot);

        out.push(Stmt::With {
            items: vec![WithItem {
                context,
                optional_vars,
            }],
            body,
            is_async: p.is_async,
        });
        Ok(escape.or(p.exit))
    }

    fn emit_try(
        &mut self,
        p: TryPattern,
        outer: LoopCtx,
        out: &mut Vec<Stmt>,
    ) -> Result<Option<BlockId>, DecompileError> {
        let version = self.version;
        let legacy = !version.has_exception_table();

        // Legacy setup blocks carry a statement prefix before SETUP_*.
        let body_start = if legacy {
            self.emit_prefix(p.body_setup_block(), outer, out)?;
            self.analysis
                .cfg
                .block(p.body_setup_block())
                .normal_successor()
                .unwrap_or(p.body)
        } else {
            p.body
        };

        let first_handler = p.handlers.first().map(|h| h.block).or(p.finally);
        let handler_offset = first_handler.map(|b| self.analysis.cfg.block(b).start_offset);
        // Fence the body at the protected-region boundary when the
        // exception table gives one; legacy bodies end at their jump over
        // the handlers.
        let body_fence = p.body_end.or(handler_offset);

        let snapshot = self.stack.clone_values();
        let mut body = Vec::new();
        let escape = self.emit_range(
            body_start,
            first_handler,
            body_fence,
            outer,
            Some(body_start),
            &mut body,
        )?;
        if body.is_empty() {
            body.push(Stmt::Pass);
        }

        // An escape landing before the handlers is the else-clause; one
        // landing past them is the plain continuation.
        let mut orelse = Vec::new();
        let after = match (escape, p.exit) {
            (Some(escaped), exit)
                if handler_offset.is_some_and(|h| {
                    self.analysis.cfg.block(escaped).start_offset < h
                }) && !p.handlers.is_empty() =>
            {
                self.stack.restore(snapshot.clone());
                self.emit_range(
                    escaped,
                    first_handler,
                    handler_offset,
                    outer,
                    None,
                    &mut orelse,
                )?;
                exit
            }
            (Some(escaped), Some(exit)) if escaped != exit && !p.handlers.is_empty() => {
                self.stack.restore(snapshot.clone());
                self.emit_range(escaped, Some(exit), None, outer, None, &mut orelse)?;
                Some(exit)
            }
            (Some(escaped), None) => Some(escaped),
            (_, exit) => exit,
        };

        let mut handlers = Vec::new();
        for info in &p.handlers {
            self.stack.restore(snapshot.clone());
            handlers.push(self.emit_handler(info, &p, outer)?);
        }

        let mut finalbody = Vec::new();
        if let Some(finally_block) = p.finally {
            self.stack.restore(snapshot.clone());
            let start = self.handler_prelude_len(finally_block);
            let mut stmts = Vec::new();
            match self.emit_linear(finally_block, start, LoopCtx::default(), &mut stmts)? {
                Flow::Fall(Some(next)) | Flow::Jump(next) => {
                    if Some(next) != p.exit {
                        self.emit_range(next, p.exit, None, outer, None, &mut stmts)?;
                    }
                }
                _ => {}
            }
            finalbody = stmts;
        }
        self.stack.restore(snapshot);

        // 3.11 duplicates the function epilogue and the finally body
        // inline on every normal path; strip the copies so each appears
        // once.
        if self.version.has_exception_table() {
            elide_trailing_return_none(&mut body);
            elide_trailing_return_none(&mut orelse);
            for handler in &mut handlers {
                elide_trailing_return_none(&mut handler.body);
            }
        }
        if !finalbody.is_empty() {
            strip_trailing(&mut body, &finalbody);
            strip_trailing(&mut orelse, &finalbody);
            for handler in &mut handlers {
                strip_trailing(&mut handler.body, &finalbody);
            }
        }

        let stmt = merge_try(Stmt::Try {
            body,
            handlers,
            orelse,
            finalbody,
        });
        out.push(stmt);
        Ok(after)
    }

    /// Instructions a handler block spends unpacking the exception before
    /// user code starts.
    fn handler_prelude_len(&self, block: BlockId) -> usize {
        let instructions = self.analysis.cfg.instructions_of(block);
        let mut index = 0;
        while index < instructions.len()
            && matches!(
                instructions[index].opcode,
                Opcode::PushExcInfo | Opcode::PopTop | Opcode::DupTop
            )
        {
            index += 1;
        }
        index
    }

    fn emit_handler(
        &mut self,
        info: &HandlerInfo,
        p: &TryPattern,
        outer: LoopCtx,
    ) -> Result<ExceptHandler, DecompileError> {
        let instructions = self.instructions_of(info.block);
        let version = self.version;
        let mut typ: Option<Expr> = None;
        let mut name: Option<String> = None;
        let mut body_start_index = 0;
        let mut body_block = info.block;

        if info.is_bare {
            // Prelude is a run of pops.
            let mut index = 0;
            while index < instructions.len()
                && matches!(
                    instructions[index].opcode,
                    Opcode::PopTop | Opcode::PushExcInfo | Opcode::DupTop
                )
            {
                index += 1;
            }
            body_start_index = index;
        } else {
            // Typed prelude: loads build the exception type, the match
            // check branches, then the binding stores or pops.
            let mut index = 0;
            // Skip exception bookkeeping, simulate type loads.
            while index < instructions.len() {
                let instruction = instructions[index];
                match instruction.opcode {
                    Opcode::PushExcInfo | Opcode::DupTop => {}
                    Opcode::CheckExcMatch | Opcode::JumpIfNotExcMatch => {
                        typ = Some(self.pop_expr_quiet());
                        index += 1;
                        break;
                    }
                    Opcode::CompareOp
                        if crate::opcodes::compare_from_arg(instruction.arg, version)
                            .is_none() =>
                    {
                        typ = Some(self.pop_expr_quiet());
                        index += 1;
                        break;
                    }
                    _ => {
                        self.simulate_tolerant(&instruction);
                    }
                }
                index += 1;
            }
            // The branch to the next handler.
            if index < instructions.len()
                && instructions[index].is_conditional_jump(version)
            {
                index += 1;
            }
            // Binding or pops. When the check and the binding straddle a
            // block boundary, continue in the true successor.
            if index >= instructions.len() {
                if let Some(next) = self
                    .analysis
                    .cfg
                    .block(info.block)
                    .successor_by_kind(EdgeKind::ConditionalTrue)
                {
                    body_block = next;
                }
                index = 0;
            }
            let binding_instrs = self.instructions_of(body_block);
            while index < binding_instrs.len() {
                match binding_instrs[index].opcode {
                    Opcode::PopTop => index += 1,
                    Opcode::StoreName | Opcode::StoreFast => {
                        let arg = binding_instrs[index].arg;
                        name = Some(if binding_instrs[index].opcode == Opcode::StoreName {
                            self.code.name_at(arg)
                        } else {
                            self.code.varname_at(arg)
                        });
                        index += 1;
                        break;
                    }
                    _ => break,
                }
            }
            body_start_index = index;
        }

        let mut body = Vec::new();
        match self.emit_linear(body_block, body_start_index, outer, &mut body)? {
            Flow::Fall(Some(next)) | Flow::Jump(next) => {
                if Some(next) != p.exit {
                    let fence = p.exit.map(|e| self.analysis.cfg.block(e).start_offset);
                    self.emit_range(next, p.exit, fence, outer, None, &mut body)?;
                }
            }
            _ => {}
        }
        if let Some(bound) = &name {
            strip_handler_cleanup(&mut body, bound);
        }
        if body.is_empty() {
            body.push(Stmt::Pass);
        }
        Ok(ExceptHandler {
            typ,
            name,
            body,
        })
    }

    fn emit_match(
        &mut self,
        p: crate::patterns::MatchPattern,
        outer: LoopCtx,
        out: &mut Vec<Stmt>,
    ) -> Result<Option<BlockId>, DecompileError> {
        // Subject: everything before the first copy/matcher op.
        let instructions = self.instructions_of(p.subject);
        let split = instructions
            .iter()
            .position(|i| {
                matches!(
                    i.opcode,
                    Opcode::Copy
                        | Opcode::DupTop
                        | Opcode::MatchClass
                        | Opcode::MatchSequence
                        | Opcode::MatchMapping
                        | Opcode::MatchKeys
                )
            })
            .unwrap_or(0);
        for instruction in &instructions[..split] {
            self.dispatch(instruction, out);
            self.prev_opcode = Some(instruction.opcode);
        }
        let subject = self.pop_expr_quiet();

        let snapshot = self.stack.clone_values();
        let mut cases = Vec::new();
        for &case_block in &p.cases {
            self.stack.restore(snapshot.clone());
            let pattern = self.extract_case_pattern(case_block, &subject);
            let body_block = self
                .analysis
                .cfg
                .block(case_block)
                .successor_by_kind(EdgeKind::ConditionalTrue);
            let mut body = Vec::new();
            if let Some(body_block) = body_block {
                self.stack.restore(snapshot.clone());
                let start = self
                    .instructions_of(body_block)
                    .first()
                    .is_some_and(|i| i.opcode == Opcode::PopTop) as usize;
                match self.emit_linear(body_block, start, outer, &mut body)? {
                    Flow::Fall(Some(next)) | Flow::Jump(next) => {
                        if Some(next) != p.exit {
                            self.emit_range(next, p.exit, None, outer, None, &mut body)?;
                        }
                    }
                    _ => {}
                }
            }
            if body.is_empty() {
                body.push(Stmt::Pass);
            }
            cases.push(MatchCase {
                pattern,
                guard: None,
                body,
            });
        }
        if let Some(wildcard) = p.wildcard {
            self.stack.restore(snapshot.clone());
            let start = self
                .instructions_of(wildcard)
                .iter()
                .take_while(|i| matches!(i.opcode, Opcode::PopTop | Opcode::Nop))
                .count();
            let mut body = Vec::new();
            match self.emit_linear(wildcard, start, outer, &mut body)? {
                Flow::Fall(Some(next)) | Flow::Jump(next) => {
                    if Some(next) != p.exit {
                        self.emit_range(next, p.exit, None, outer, None, &mut body)?;
                    }
                }
                _ => {}
            }
            if body.is_empty() {
                body.push(Stmt::Pass);
            }
            cases.push(MatchCase {
                pattern: AstMatchPattern::As {
                    pattern: None,
                    name: None,
                },
                guard: None,
                body,
            });
        }
        self.stack.restore(snapshot);
        out.push(Stmt::Match { subject, cases });
        Ok(p.exit)
    }

    /// Recover the pattern a case-test block checks. Literal comparisons
    /// reconstruct exactly; structural matchers degrade to wildcards so
    /// the emitted match stays well-formed.
    fn extract_case_pattern(&mut self, block: BlockId, subject: &Expr) -> AstMatchPattern {
        let instructions = self.instructions_of(block);
        for (index, instruction) in instructions.iter().enumerate() {
            if instruction.opcode == Opcode::CompareOp {
                // The comparator was loaded just before.
                for prior in instructions[..index].iter().rev() {
                    if prior.opcode == Opcode::LoadConst {
                        let value = self
                            .code
                            .const_at(prior.arg)
                            .cloned()
                            .unwrap_or(Const::None);
                        return match value {
                            Const::None | Const::Bool(_) => AstMatchPattern::Singleton(value),
                            other => AstMatchPattern::Value(Expr::Literal(other)),
                        };
                    }
                }
            }
        }
        let _ = subject;
        AstMatchPattern::As {
            pattern: None,
            name: None,
        }
    }

    // ------------------------------------------------------------------
    // Nested code objects
    // ------------------------------------------------------------------

    fn build_function_def(&self, target: Expr, parts: FunctionParts) -> Stmt {
        let name = match target {
            Expr::Name(name) => name,
            other => {
                // Attribute/subscript targets of a function value only
                // occur for degraded input.
                return Stmt::Assign {
                    targets: vec![other],
                    value: Expr::Unknown,
                };
            }
        };
        let args = build_arguments(&parts.code, &parts);
        let returns = parts
            .annotations
            .iter()
            .find(|(key, _)| key == "return")
            .map(|(_, value)| value.clone());
        let is_async = parts.code.is_coroutine();
        let (body, docstring) = match Decompiler::new(&parts.code).and_then(|mut d| d.run()) {
            Ok(mut body) => {
                let docstring = take_body_docstring(&parts.code, &mut body);
                elide_trailing_return_none(&mut body);
                if body.is_empty() {
                    body.push(Stmt::Pass);
                }
                (body, docstring)
            }
            Err(err) => {
                debug!("nested function `{}` degraded: {err}", parts.code.name);
                (vec![Stmt::Pass], None)
            }
        };
        let mut decorators = parts.decorators;
        decorators.reverse();
        Stmt::FunctionDef {
            name,
            args,
            body,
            decorators,
            returns,
            is_async,
            docstring,
        }
    }

    fn build_class_def(&self, target: Expr, parts: ClassParts) -> Stmt {
        let name = match target {
            Expr::Name(name) => name,
            _ => parts.name.clone(),
        };
        let (body, docstring) = match Decompiler::new(&parts.body).and_then(|mut d| d.run()) {
            Ok(mut body) => {
                strip_class_prelude(&mut body);
                let docstring = take_class_docstring(&mut body);
                elide_trailing_return_none(&mut body);
                if body.is_empty() {
                    body.push(Stmt::Pass);
                }
                (body, docstring)
            }
            Err(err) => {
                debug!("class body `{}` degraded: {err}", parts.name);
                (vec![Stmt::Pass], None)
            }
        };
        let mut decorators = parts.decorators;
        decorators.reverse();
        Stmt::ClassDef {
            name,
            bases: parts.bases,
            keywords: parts.keywords,
            body,
            decorators,
            docstring,
        }
    }
}

impl TryPattern {
    /// Legacy try patterns are rooted at the `SETUP_*` block itself.
    fn body_setup_block(&self) -> BlockId {
        self.body
    }
}

/// Combine chain values into one expression, merging consecutive
/// comparisons into a chained `Compare` (`a < b < c`) when each clause
/// continues from the previous comparator.
fn fold_chain(values: Vec<Expr>, is_and: bool) -> Expr {
    if is_and && values.len() >= 2 {
        if let Some(chained) = fold_compare_chain(&values) {
            return chained;
        }
    }
    let mut iter = values.into_iter();
    let first = iter.next().unwrap_or(Expr::Unknown);
    iter.fold(first, |acc, value| {
        if is_and {
            and(acc, value)
        } else {
            or(acc, value)
        }
    })
}

fn fold_compare_chain(values: &[Expr]) -> Option<Expr> {
    let Expr::Compare {
        left,
        ops,
        comparators,
    } = &values[0]
    else {
        return None;
    };
    let mut ops = ops.clone();
    let mut comparators = comparators.clone();
    for value in &values[1..] {
        match value {
            Expr::Compare {
                left: next_left,
                ops: next_ops,
                comparators: next_comparators,
            } if comparators.last() == Some(next_left) => {
                ops.extend(next_ops.iter().copied());
                comparators.extend(next_comparators.iter().cloned());
            }
            _ => return None,
        }
    }
    Some(Expr::Compare {
        left: left.clone(),
        ops,
        comparators,
    })
}

fn and(left: Expr, right: Expr) -> Expr {
    match left {
        Expr::BoolOp {
            op: crate::ast::BoolOpKind::And,
            mut values,
        } => {
            values.push(right);
            Expr::BoolOp {
                op: crate::ast::BoolOpKind::And,
                values,
            }
        }
        other => Expr::BoolOp {
            op: crate::ast::BoolOpKind::And,
            values: vec![other, right],
        },
    }
}

fn or(left: Expr, right: Expr) -> Expr {
    match left {
        Expr::BoolOp {
            op: crate::ast::BoolOpKind::Or,
            mut values,
        } => {
            values.push(right);
            Expr::BoolOp {
                op: crate::ast::BoolOpKind::Or,
                values,
            }
        }
        other => Expr::BoolOp {
            op: crate::ast::BoolOpKind::Or,
            values: vec![other, right],
        },
    }
}

/// Build the signature from argument counts, names, defaults and
/// annotations.
fn build_arguments(code: &CodeObject, parts: &FunctionParts) -> Arguments {
    let mut arguments = Arguments::default();
    let argcount = code.argcount as usize;
    let posonly = code.posonlyargcount as usize;
    let kwonly = code.kwonlyargcount as usize;

    let arg_at = |index: usize| -> Arg {
        let name = code
            .varnames
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("arg{index}"));
        let annotation = parts
            .annotations
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.clone());
        Arg { name, annotation }
    };

    for index in 0..argcount {
        if index < posonly {
            arguments.posonlyargs.push(arg_at(index));
        } else {
            arguments.args.push(arg_at(index));
        }
    }
    for index in argcount..argcount + kwonly {
        let arg = arg_at(index);
        let default = parts
            .kw_defaults
            .iter()
            .find(|(key, _)| *key == arg.name)
            .map(|(_, value)| value.clone());
        arguments.kw_defaults.push(default);
        arguments.kwonlyargs.push(arg);
    }
    let mut next = argcount + kwonly;
    if code.flags.contains(CodeFlags::VARARGS) {
        arguments.vararg = Some(arg_at(next));
        next += 1;
    }
    if code.flags.contains(CodeFlags::VARKEYWORDS) {
        arguments.kwarg = Some(arg_at(next));
    }
    arguments.defaults = parts.defaults.clone();
    arguments
}

fn elide_trailing_return_none(body: &mut Vec<Stmt>) {
    if matches!(
        body.last(),
        Some(Stmt::Return(None) | Stmt::Return(Some(Expr::Literal(Const::None))))
    ) {
        body.pop();
    }
}

fn take_body_docstring(code: &CodeObject, _body: &mut [Stmt]) -> Option<String> {
    match code.consts.first() {
        Some(Const::Str(doc)) => Some(doc.clone()),
        _ => None,
    }
}

fn take_class_docstring(body: &mut Vec<Stmt>) -> Option<String> {
    let is_doc = matches!(
        body.first(),
        Some(Stmt::Assign { targets, value: Expr::Literal(Const::Str(_)) })
            if targets.len() == 1 && targets[0] == Expr::name("__doc__")
    );
    if is_doc {
        let Stmt::Assign { value: Expr::Literal(Const::Str(doc)), .. } = body.remove(0) else {
            unreachable!("shape checked above");
        };
        return Some(doc);
    }
    None
}

/// Drop the `__qualname__`/`__module__` assignments every class body
/// starts with.
fn strip_class_prelude(body: &mut Vec<Stmt>) {
    body.retain(|stmt| {
        !matches!(
            stmt,
            Stmt::Assign { targets, .. }
                if targets.len() == 1
                    && matches!(
                        &targets[0],
                        Expr::Name(name) if name == "__qualname__" || name == "__module__"
                    )
        )
    });
}

/// Remove the compiler's `name = None; del name` handler epilogue.
fn strip_handler_cleanup(body: &mut Vec<Stmt>, bound: &str) {
    let len = body.len();
    if len >= 2 {
        let is_cleanup = matches!(
            (&body[len - 2], &body[len - 1]),
            (
                Stmt::Assign { targets, value: Expr::Literal(Const::None) },
                Stmt::Delete(deleted),
            ) if targets.len() == 1
                && targets[0] == Expr::name(bound)
                && deleted.len() == 1
                && deleted[0] == Expr::name(bound)
        );
        if is_cleanup {
            body.truncate(len - 2);
        }
    }
}

/// Remove a duplicated `finally` copy from the tail of a branch body.
fn strip_trailing(body: &mut Vec<Stmt>, finalbody: &[Stmt]) {
    if finalbody.is_empty() || body.len() < finalbody.len() {
        return;
    }
    let start = body.len() - finalbody.len();
    if &body[start..] == finalbody {
        body.truncate(start);
    }
}

/// Collapse `try: try: … except: … finally: …` into one statement, the
/// shape the legacy block-stack encoding produces.
fn merge_try(stmt: Stmt) -> Stmt {
    let Stmt::Try {
        body,
        handlers,
        orelse,
        finalbody,
    } = stmt
    else {
        return stmt;
    };
    if handlers.is_empty() && orelse.is_empty() && !finalbody.is_empty() && body.len() == 1 {
        if let Stmt::Try {
            body: inner_body,
            handlers: inner_handlers,
            orelse: inner_orelse,
            finalbody: inner_final,
        } = &body[0]
        {
            if inner_final.is_empty() {
                return Stmt::Try {
                    body: inner_body.clone(),
                    handlers: inner_handlers.clone(),
                    orelse: inner_orelse.clone(),
                    finalbody,
                };
            }
        }
    }
    Stmt::Try {
        body,
        handlers,
        orelse,
        finalbody,
    }
}

//! Symbolic operand stack.
//!
//! Replays the stack effect of expression-level instructions, building AST
//! fragments in place of runtime values. Statement-level opcodes (stores,
//! jumps, returns) are the driver's business; handing one to
//! [`SymStack::simulate`] yields [`SimError::Unsupported`] so the caller
//! can pick a fallback.
//!
//! The stack is authoritative for expression ordering: the driver pops at
//! statement boundaries, so operands come off in source order.

use std::sync::Arc;
use std::{error, fmt};

use log::trace;

use crate::ast::{BinOp, CmpOp, Expr, Keyword, UnaryOp};
use crate::code::{CodeObject, Const};
use crate::opcodes::{self, BinaryOpArg, Intrinsic1, Opcode};
use crate::version::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    /// The operand stack ran dry.
    StackUnderflow,
    /// A non-expression value reached a position that must hold one.
    NotAnExpression,
    /// The instruction is not an expression-level opcode.
    Unsupported(Opcode),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackUnderflow => f.write_str("operand stack underflow"),
            Self::NotAnExpression => f.write_str("expected an expression on the stack"),
            Self::Unsupported(op) => write!(f, "{} has no expression lowering", op.mnemonic()),
        }
    }
}

impl error::Error for SimError {}

/// Pieces of a function object accumulated by `MAKE_FUNCTION`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionParts {
    pub code: Arc<CodeObject>,
    pub qualname: Option<String>,
    pub defaults: Vec<Expr>,
    pub kw_defaults: Vec<(String, Expr)>,
    pub annotations: Vec<(String, Expr)>,
    pub has_closure: bool,
    /// Decorators applied through call-wrapping, innermost first.
    pub decorators: Vec<Expr>,
}

/// Pieces of a class assembled from a `LOAD_BUILD_CLASS` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassParts {
    pub body: Arc<CodeObject>,
    pub name: String,
    pub bases: Vec<Expr>,
    pub keywords: Vec<Keyword>,
    pub decorators: Vec<Expr>,
}

/// A symbolic value on the operand stack. Only `Expr` flows into emitted
/// statements; the rest drive `def`/`class`/`import` lowering.
#[derive(Debug, Clone, PartialEq)]
pub enum StackValue {
    Expr(Expr),
    Function(FunctionParts),
    Class(ClassParts),
    Import {
        module: String,
        fromlist: Vec<String>,
        level: u32,
    },
    ImportFrom {
        module: String,
        name: String,
    },
    /// A pre-3.12 comprehension code object applied to its iterable.
    ComprehensionCall {
        code: Arc<CodeObject>,
        iterable: Expr,
    },
    /// A local saved aside by handler cleanup.
    SavedLocal(String),
    /// `LOAD_BUILD_CLASS` marker.
    BuildClassMarker,
    /// `PUSH_NULL` marker.
    Null,
    /// The value `FOR_ITER` produces each iteration; the first store in a
    /// loop body consuming it names the loop target.
    IterItem,
    /// The result of `__enter__`; a store consuming it is the `as` clause.
    WithResult,
    Unknown,
}

impl StackValue {
    fn into_expr(self) -> Result<Expr, SimError> {
        match self {
            Self::Expr(expr) => Ok(expr),
            Self::Import { module, .. } => Ok(Expr::name(module)),
            Self::ImportFrom { name, .. } => Ok(Expr::name(name)),
            Self::SavedLocal(name) => Ok(Expr::name(name)),
            Self::Unknown | Self::IterItem | Self::WithResult => Ok(Expr::Unknown),
            _ => Err(SimError::NotAnExpression),
        }
    }

    /// Public view of [`StackValue::into_expr`] for the driver.
    pub fn to_expression(self) -> Result<Expr, SimError> {
        self.into_expr()
    }
}

/// The simulator state for one code object.
#[derive(Debug)]
pub struct SymStack<'a> {
    values: Vec<StackValue>,
    code: &'a CodeObject,
    version: Version,
    /// Keyword names latched by `KW_NAMES` for the next `CALL`.
    kw_names: Vec<String>,
}

impl<'a> SymStack<'a> {
    #[must_use]
    pub fn new(code: &'a CodeObject) -> Self {
        Self {
            values: Vec::new(),
            code,
            version: code.version,
            kw_names: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push(&mut self, value: StackValue) {
        self.values.push(value);
    }

    pub fn push_expr(&mut self, expr: Expr) {
        self.values.push(StackValue::Expr(expr));
    }

    pub fn pop(&mut self) -> Result<StackValue, SimError> {
        self.values.pop().ok_or(SimError::StackUnderflow)
    }

    pub fn pop_expr(&mut self) -> Result<Expr, SimError> {
        self.pop()?.into_expr()
    }

    #[must_use]
    pub fn peek(&self) -> Option<&StackValue> {
        self.values.last()
    }

    pub fn peek_mut(&mut self) -> Option<&mut StackValue> {
        self.values.last_mut()
    }

    /// Snapshot for forking into branch replays.
    #[must_use]
    pub fn clone_values(&self) -> Vec<StackValue> {
        self.values.clone()
    }

    pub fn restore(&mut self, values: Vec<StackValue>) {
        self.values = values;
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.kw_names.clear();
    }

    fn pop_n_values(&mut self, n: usize) -> Result<Vec<StackValue>, SimError> {
        if self.values.len() < n {
            return Err(SimError::StackUnderflow);
        }
        Ok(self.values.split_off(self.values.len() - n))
    }

    fn pop_n_exprs(&mut self, n: usize) -> Result<Vec<Expr>, SimError> {
        self.pop_n_values(n)?
            .into_iter()
            .map(StackValue::into_expr)
            .collect()
    }

    fn const_at(&self, index: u32) -> Const {
        self.code.const_at(index).cloned().unwrap_or(Const::None)
    }

    /// Pop the callee under already-popped arguments, absorbing the
    /// `PUSH_NULL` marker 3.11+ places beneath it.
    fn pop_callee(&mut self) -> Result<StackValue, SimError> {
        let callee = self.pop()?;
        if matches!(self.peek(), Some(StackValue::Null)) {
            self.values.pop();
        }
        Ok(callee)
    }

    fn finish_call(
        &mut self,
        callee: StackValue,
        raw_args: Vec<StackValue>,
        keywords: Vec<Keyword>,
    ) -> Result<(), SimError> {
        match callee {
            StackValue::BuildClassMarker => {
                // __build_class__(body, name, *bases, **kwds)
                let mut iter = raw_args.into_iter();
                let body = match iter.next() {
                    Some(StackValue::Function(parts)) => parts.code,
                    _ => return Err(SimError::NotAnExpression),
                };
                let name = match iter.next() {
                    Some(StackValue::Expr(Expr::Literal(Const::Str(name)))) => name,
                    _ => body.name.clone(),
                };
                let bases = iter
                    .map(StackValue::into_expr)
                    .collect::<Result<Vec<_>, _>>()?;
                self.push(StackValue::Class(ClassParts {
                    body,
                    name,
                    bases,
                    keywords,
                    decorators: Vec::new(),
                }));
                Ok(())
            }
            StackValue::Function(parts)
                if is_comprehension_name(&parts.code.name) && raw_args.len() == 1 =>
            {
                let iterable = raw_args
                    .into_iter()
                    .next()
                    .expect("length checked")
                    .into_expr()?;
                self.push(StackValue::ComprehensionCall {
                    code: parts.code,
                    iterable,
                });
                Ok(())
            }
            StackValue::Expr(func) => {
                // A single function or class operand is a decorator
                // application wrapping the pending definition.
                if keywords.is_empty() && raw_args.len() == 1 {
                    match raw_args.into_iter().next().expect("length checked") {
                        StackValue::Function(mut parts) => {
                            parts.decorators.push(func);
                            self.push(StackValue::Function(parts));
                            return Ok(());
                        }
                        StackValue::Class(mut parts) => {
                            parts.decorators.push(func);
                            self.push(StackValue::Class(parts));
                            return Ok(());
                        }
                        other => {
                            let arg = other.into_expr()?;
                            self.push_expr(Expr::Call {
                                func: Box::new(func),
                                args: vec![arg],
                                keywords: Vec::new(),
                            });
                            return Ok(());
                        }
                    }
                }
                let args = raw_args
                    .into_iter()
                    .map(StackValue::into_expr)
                    .collect::<Result<Vec<_>, _>>()?;
                self.push_expr(Expr::Call {
                    func: Box::new(func),
                    args,
                    keywords,
                });
                Ok(())
            }
            other => {
                trace!("call on non-expression callee {other:?}");
                Err(SimError::NotAnExpression)
            }
        }
    }

    /// Apply one expression-level instruction's stack effect.
    pub fn simulate(&mut self, instruction: &crate::decode::Instruction) -> Result<(), SimError> {
        use Opcode::*;
        let arg = instruction.arg;
        let version = self.version;
        match instruction.opcode {
            // No stack effect we care about.
            Nop | Cache | Resume | Precall | MakeCell | CopyFreeVars | GenStart
            | SetupAnnotations | ToBool => Ok(()),

            // Loads.
            LoadConst => {
                let value = self.const_at(arg);
                if let Const::Code(code) = value {
                    self.push(StackValue::Function(FunctionParts {
                        code,
                        qualname: None,
                        defaults: Vec::new(),
                        kw_defaults: Vec::new(),
                        annotations: Vec::new(),
                        has_closure: false,
                        decorators: Vec::new(),
                    }));
                } else {
                    self.push_expr(Expr::Literal(value));
                }
                Ok(())
            }
            LoadSmallInt => {
                self.push_expr(Expr::Literal(Const::Int(i64::from(arg))));
                Ok(())
            }
            LoadCommonConstant => {
                let name = match arg {
                    0 => "AssertionError",
                    1 => "NotImplementedError",
                    _ => "BuiltinConstant",
                };
                self.push_expr(Expr::name(name));
                Ok(())
            }
            LoadName => {
                self.push_expr(Expr::name(self.code.name_at(arg)));
                Ok(())
            }
            LoadGlobal => {
                // 3.11+ packs a push-NULL flag into the low bit.
                let (index, push_null) = if version.gte(3, 11) {
                    (arg >> 1, arg & 1 != 0)
                } else {
                    (arg, false)
                };
                if push_null {
                    self.push(StackValue::Null);
                }
                self.push_expr(Expr::name(self.code.name_at(index)));
                Ok(())
            }
            LoadFast | LoadFastCheck => {
                self.push_expr(Expr::name(self.code.varname_at(arg)));
                Ok(())
            }
            // Spills the named local for the duration of an inline
            // comprehension; a later store restores it.
            LoadFastAndClear => {
                self.push(StackValue::SavedLocal(self.code.varname_at(arg)));
                Ok(())
            }
            LoadFastLoadFast => {
                self.push_expr(Expr::name(self.code.varname_at(arg >> 4)));
                self.push_expr(Expr::name(self.code.varname_at(arg & 0xf)));
                Ok(())
            }
            LoadDeref | LoadClassDeref => {
                self.push_expr(Expr::name(self.code.derefname_at(arg)));
                Ok(())
            }
            LoadClosure => {
                self.push(StackValue::Unknown);
                Ok(())
            }
            LoadAttr => {
                let (index, is_method) = if version.gte(3, 12) {
                    (arg >> 1, arg & 1 != 0)
                } else {
                    (arg, false)
                };
                let _ = is_method; // the callee shape is uniform here
                let value = self.pop_expr()?;
                self.push_expr(Expr::attribute(value, self.code.name_at(index)));
                Ok(())
            }
            LoadMethod => {
                let value = self.pop_expr()?;
                self.push_expr(Expr::attribute(value, self.code.name_at(arg)));
                Ok(())
            }
            LoadSuperAttr => {
                let index = arg >> 2;
                let _self_expr = self.pop_expr()?;
                let _class = self.pop_expr()?;
                let _super = self.pop_callee()?;
                let call = Expr::Call {
                    func: Box::new(Expr::name("super")),
                    args: Vec::new(),
                    keywords: Vec::new(),
                };
                self.push_expr(Expr::attribute(call, self.code.name_at(index)));
                Ok(())
            }
            LoadBuildClass => {
                self.push(StackValue::BuildClassMarker);
                Ok(())
            }
            LoadAssertionError => {
                self.push_expr(Expr::name("AssertionError"));
                Ok(())
            }
            LoadLocals => {
                self.push(StackValue::Unknown);
                Ok(())
            }
            LoadSpecial => {
                let name = match arg {
                    0 => "__enter__",
                    1 => "__exit__",
                    2 => "__aenter__",
                    3 => "__aexit__",
                    _ => "__special__",
                };
                let value = self.pop_expr()?;
                self.push_expr(Expr::attribute(value, name));
                Ok(())
            }
            PushNull => {
                self.push(StackValue::Null);
                Ok(())
            }

            // Stack shuffling.
            PopTop | PopIter => {
                self.pop()?;
                Ok(())
            }
            DupTop => {
                let top = self.peek().cloned().ok_or(SimError::StackUnderflow)?;
                self.push(top);
                Ok(())
            }
            DupTopTwo => {
                if self.values.len() < 2 {
                    return Err(SimError::StackUnderflow);
                }
                let pair = self.values[self.values.len() - 2..].to_vec();
                self.values.extend(pair);
                Ok(())
            }
            Copy => {
                let index = self
                    .values
                    .len()
                    .checked_sub((arg as usize).max(1))
                    .ok_or(SimError::StackUnderflow)?;
                let value = self.values[index].clone();
                self.push(value);
                Ok(())
            }
            Swap => {
                let top = self.values.len().checked_sub(1).ok_or(SimError::StackUnderflow)?;
                let other = self
                    .values
                    .len()
                    .checked_sub((arg as usize).max(2))
                    .ok_or(SimError::StackUnderflow)?;
                self.values.swap(top, other);
                Ok(())
            }
            RotTwo => self.rotate(2),
            RotThree => self.rotate(3),
            RotFour => self.rotate(4),
            RotN => self.rotate(arg as usize),

            // Unary operators.
            UnaryPositive => self.unary(UnaryOp::UAdd),
            UnaryNegative => self.unary(UnaryOp::USub),
            UnaryNot => self.unary(UnaryOp::Not),
            UnaryInvert => self.unary(UnaryOp::Invert),
            UnaryConvert => {
                let value = self.pop_expr()?;
                self.push_expr(Expr::Call {
                    func: Box::new(Expr::name("repr")),
                    args: vec![value],
                    keywords: Vec::new(),
                });
                Ok(())
            }

            // Binary operators.
            BinaryPower => self.binary(BinOp::Pow),
            BinaryMultiply => self.binary(BinOp::Mult),
            BinaryMatrixMultiply => self.binary(BinOp::MatMult),
            BinaryDivide | BinaryTrueDivide => self.binary(BinOp::Div),
            BinaryModulo => self.binary(BinOp::Mod),
            BinaryAdd => self.binary(BinOp::Add),
            BinarySubtract => self.binary(BinOp::Sub),
            BinaryFloorDivide => self.binary(BinOp::FloorDiv),
            BinaryLshift => self.binary(BinOp::LShift),
            BinaryRshift => self.binary(BinOp::RShift),
            BinaryAnd => self.binary(BinOp::BitAnd),
            BinaryXor => self.binary(BinOp::BitXor),
            BinaryOr => self.binary(BinOp::BitOr),
            InplacePower => self.binary(BinOp::Pow),
            InplaceMultiply => self.binary(BinOp::Mult),
            InplaceMatrixMultiply => self.binary(BinOp::MatMult),
            InplaceDivide | InplaceTrueDivide => self.binary(BinOp::Div),
            InplaceModulo => self.binary(BinOp::Mod),
            InplaceAdd => self.binary(BinOp::Add),
            InplaceSubtract => self.binary(BinOp::Sub),
            InplaceFloorDivide => self.binary(BinOp::FloorDiv),
            InplaceLshift => self.binary(BinOp::LShift),
            InplaceRshift => self.binary(BinOp::RShift),
            InplaceAnd => self.binary(BinOp::BitAnd),
            InplaceXor => self.binary(BinOp::BitXor),
            InplaceOr => self.binary(BinOp::BitOr),
            BinaryOp => match BinaryOpArg::try_from(arg as u8) {
                Ok(op) => match op.ast_op() {
                    Some(ast_op) => self.binary(ast_op),
                    None => self.subscript(),
                },
                Err(_) => Err(SimError::Unsupported(Opcode::BinaryOp)),
            },
            BinarySubscr => self.subscript(),
            BinarySlice => {
                let upper = self.pop_expr()?;
                let lower = self.pop_expr()?;
                let value = self.pop_expr()?;
                self.push_expr(Expr::Subscript {
                    value: Box::new(value),
                    index: Box::new(Expr::Slice {
                        lower: Some(Box::new(lower)),
                        upper: Some(Box::new(upper)),
                        step: None,
                    }),
                });
                Ok(())
            }
            Slice0 | Slice1 | Slice2 | Slice3 => {
                let (has_lower, has_upper) = match instruction.opcode {
                    Slice0 => (false, false),
                    Slice1 => (true, false),
                    Slice2 => (false, true),
                    _ => (true, true),
                };
                let upper = if has_upper { Some(Box::new(self.pop_expr()?)) } else { None };
                let lower = if has_lower { Some(Box::new(self.pop_expr()?)) } else { None };
                let value = self.pop_expr()?;
                self.push_expr(Expr::Subscript {
                    value: Box::new(value),
                    index: Box::new(Expr::Slice {
                        lower,
                        upper,
                        step: None,
                    }),
                });
                Ok(())
            }

            // Comparisons.
            CompareOp => {
                let right = self.pop_expr()?;
                let left = self.pop_expr()?;
                match opcodes::compare_from_arg(arg, version) {
                    Some(op) => self.push_expr(Expr::Compare {
                        left: Box::new(left),
                        ops: vec![op],
                        comparators: vec![right],
                    }),
                    // Legacy exception-match: keep the type expression for
                    // the handler-prelude extractor.
                    None => self.push_expr(right),
                }
                Ok(())
            }
            IsOp => {
                let op = if arg == 0 { CmpOp::Is } else { CmpOp::IsNot };
                self.compare(op)
            }
            ContainsOp => {
                let op = if arg == 0 { CmpOp::In } else { CmpOp::NotIn };
                self.compare(op)
            }

            // Collection builders.
            BuildTuple => {
                let items = self.pop_n_exprs(arg as usize)?;
                self.push_expr(Expr::Tuple(items));
                Ok(())
            }
            BuildList => {
                let items = self.pop_n_exprs(arg as usize)?;
                self.push_expr(Expr::List(items));
                Ok(())
            }
            BuildSet => {
                let items = self.pop_n_exprs(arg as usize)?;
                self.push_expr(Expr::Set(items));
                Ok(())
            }
            BuildMap => {
                let mut flat = self.pop_n_exprs(arg as usize * 2)?;
                let mut keys = Vec::with_capacity(arg as usize);
                let mut values = Vec::with_capacity(arg as usize);
                for pair in flat.chunks_exact_mut(2) {
                    keys.push(Some(std::mem::replace(&mut pair[0], Expr::Unknown)));
                    values.push(std::mem::replace(&mut pair[1], Expr::Unknown));
                }
                self.push_expr(Expr::Dict { keys, values });
                Ok(())
            }
            StoreMap => {
                // py2: dict literal built pairwise onto a BUILD_MAP result.
                let key = self.pop_expr()?;
                let value = self.pop_expr()?;
                match self.peek_mut() {
                    Some(StackValue::Expr(Expr::Dict { keys, values })) => {
                        keys.push(Some(key));
                        values.push(value);
                        Ok(())
                    }
                    _ => Err(SimError::NotAnExpression),
                }
            }
            BuildConstKeyMap => {
                let keys_const = self.pop_expr()?;
                let values = self.pop_n_exprs(arg as usize)?;
                let keys = match keys_const {
                    Expr::Literal(Const::Tuple(items)) => items
                        .into_iter()
                        .map(|c| Some(Expr::Literal(c)))
                        .collect(),
                    other => vec![Some(other)],
                };
                self.push_expr(Expr::Dict { keys, values });
                Ok(())
            }
            BuildString => {
                let parts = self.pop_n_exprs(arg as usize)?;
                self.push_expr(Expr::JoinedStr(parts));
                Ok(())
            }
            BuildSlice => {
                let step = if arg == 3 { Some(Box::new(self.pop_expr()?)) } else { None };
                let upper = self.pop_expr()?;
                let lower = self.pop_expr()?;
                self.push_expr(Expr::Slice {
                    lower: Some(Box::new(lower)),
                    upper: Some(Box::new(upper)),
                    step,
                });
                Ok(())
            }
            ListExtend | SetUpdate => {
                let iterable = self.pop_expr()?;
                let items = self.spread_items(iterable);
                match self.peek_mut() {
                    Some(StackValue::Expr(Expr::List(existing) | Expr::Set(existing))) => {
                        existing.extend(items);
                        Ok(())
                    }
                    _ => Err(SimError::NotAnExpression),
                }
            }
            DictUpdate | DictMerge => {
                let mapping = self.pop_expr()?;
                match self.peek_mut() {
                    Some(StackValue::Expr(Expr::Dict { keys, values })) => {
                        if let Expr::Dict {
                            keys: inner_keys,
                            values: inner_values,
                        } = mapping
                        {
                            keys.extend(inner_keys);
                            values.extend(inner_values);
                        } else {
                            keys.push(None);
                            values.push(mapping);
                        }
                        Ok(())
                    }
                    _ => Err(SimError::NotAnExpression),
                }
            }
            ListToTuple => {
                let value = self.pop_expr()?;
                match value {
                    Expr::List(items) => self.push_expr(Expr::Tuple(items)),
                    other => self.push_expr(other),
                }
                Ok(())
            }

            // f-strings.
            FormatValue => {
                let spec = if arg & 0x4 != 0 {
                    Some(Box::new(self.pop_expr()?))
                } else {
                    None
                };
                let value = self.pop_expr()?;
                self.push_expr(Expr::FormattedValue {
                    value: Box::new(value),
                    conversion: conversion_char(arg & 0x3),
                    format_spec: spec,
                });
                Ok(())
            }
            ConvertValue => {
                let value = self.pop_expr()?;
                self.push_expr(Expr::FormattedValue {
                    value: Box::new(value),
                    conversion: conversion_char(arg),
                    format_spec: None,
                });
                Ok(())
            }
            FormatSimple => {
                let value = self.pop_expr()?;
                let formatted = match value {
                    already @ Expr::FormattedValue { .. } => already,
                    other => Expr::FormattedValue {
                        value: Box::new(other),
                        conversion: None,
                        format_spec: None,
                    },
                };
                self.push_expr(formatted);
                Ok(())
            }
            FormatWithSpec => {
                let spec = self.pop_expr()?;
                let value = self.pop_expr()?;
                let (value, conversion) = match value {
                    Expr::FormattedValue {
                        value, conversion, ..
                    } => (*value, conversion),
                    other => (other, None),
                };
                self.push_expr(Expr::FormattedValue {
                    value: Box::new(value),
                    conversion,
                    format_spec: Some(Box::new(spec)),
                });
                Ok(())
            }

            // Iteration helpers; the iterable expression stays put.
            GetIter | GetYieldFromIter | GetAiter => Ok(()),
            GetAnext => {
                self.push(StackValue::Unknown);
                Ok(())
            }
            GetAwaitable => {
                let value = self.pop_expr()?;
                self.push_expr(Expr::Await(Box::new(value)));
                Ok(())
            }
            GetLen => {
                let top = self.peek().cloned().ok_or(SimError::StackUnderflow)?;
                let value = top.into_expr()?;
                self.push_expr(Expr::Call {
                    func: Box::new(Expr::name("len")),
                    args: vec![value],
                    keywords: Vec::new(),
                });
                Ok(())
            }
            EndSend => {
                let result = self.pop()?;
                self.pop()?;
                self.push(result);
                Ok(())
            }

            // Yields.
            YieldValue => {
                let value = self.pop_expr()?;
                let inner = match value {
                    Expr::Literal(Const::None) => None,
                    other => Some(Box::new(other)),
                };
                self.push_expr(Expr::Yield(inner));
                Ok(())
            }
            YieldFrom => {
                // Stack: [iterable, None]; an awaited value keeps its
                // Await wrapper from GET_AWAITABLE.
                self.pop()?;
                let inner = self.pop_expr()?;
                match inner {
                    awaited @ Expr::Await(_) => self.push_expr(awaited),
                    other => self.push_expr(Expr::YieldFrom(Box::new(other))),
                }
                Ok(())
            }

            // Calls.
            CallFunction => {
                let kw_count = (arg >> 8) as usize & 0xff;
                let pos_count = arg as usize & 0xff;
                let mut keywords = Vec::with_capacity(kw_count);
                for _ in 0..kw_count {
                    let value = self.pop_expr()?;
                    let key = self.pop_expr()?;
                    let name = match key {
                        Expr::Literal(Const::Str(s)) => Some(s),
                        _ => None,
                    };
                    keywords.push(Keyword { arg: name, value });
                }
                keywords.reverse();
                let args = self.pop_n_values(pos_count)?;
                let callee = self.pop_callee()?;
                self.finish_call(callee, args, keywords)
            }
            CallFunctionVar | CallFunctionVarKw => {
                let kwargs = if instruction.opcode == CallFunctionVarKw {
                    Some(self.pop_expr()?)
                } else {
                    None
                };
                let varargs = self.pop_expr()?;
                let kw_count = (arg >> 8) as usize & 0xff;
                let pos_count = arg as usize & 0xff;
                let mut keywords = Vec::with_capacity(kw_count);
                for _ in 0..kw_count {
                    let value = self.pop_expr()?;
                    let key = self.pop_expr()?;
                    let name = match key {
                        Expr::Literal(Const::Str(s)) => Some(s),
                        _ => None,
                    };
                    keywords.push(Keyword { arg: name, value });
                }
                keywords.reverse();
                let mut args = self.pop_n_values(pos_count)?;
                args.push(StackValue::Expr(Expr::Starred(Box::new(varargs))));
                if let Some(kwargs) = kwargs {
                    keywords.push(Keyword {
                        arg: None,
                        value: kwargs,
                    });
                }
                let callee = self.pop_callee()?;
                self.finish_call(callee, args, keywords)
            }
            CallFunctionKw => {
                let names = match self.pop_expr()? {
                    Expr::Literal(Const::Tuple(items)) => items
                        .into_iter()
                        .filter_map(|c| match c {
                            Const::Str(s) => Some(s),
                            _ => None,
                        })
                        .collect::<Vec<_>>(),
                    _ => Vec::new(),
                };
                let total = arg as usize;
                let mut all = self.pop_n_values(total)?;
                let split = total - names.len().min(total);
                let kw_values = all
                    .split_off(split)
                    .into_iter()
                    .map(StackValue::into_expr)
                    .collect::<Result<Vec<_>, _>>()?;
                let keywords = names
                    .into_iter()
                    .zip(kw_values)
                    .map(|(name, value)| Keyword {
                        arg: Some(name),
                        value,
                    })
                    .collect();
                let callee = self.pop_callee()?;
                self.finish_call(callee, all, keywords)
            }
            CallFunctionEx => {
                let kwargs = if arg & 1 != 0 {
                    Some(self.pop_expr()?)
                } else {
                    None
                };
                let varargs = self.pop_expr()?;
                let callee = self.pop_callee()?;
                let args: Vec<StackValue> = match varargs {
                    Expr::Tuple(items) => items.into_iter().map(StackValue::Expr).collect(),
                    other => vec![StackValue::Expr(Expr::Starred(Box::new(other)))],
                };
                let mut keywords = Vec::new();
                match kwargs {
                    Some(Expr::Dict { keys, values }) => {
                        for (key, value) in keys.into_iter().zip(values) {
                            let name = match key {
                                Some(Expr::Literal(Const::Str(s))) => Some(s),
                                _ => None,
                            };
                            keywords.push(Keyword { arg: name, value });
                        }
                    }
                    Some(other) => keywords.push(Keyword {
                        arg: None,
                        value: other,
                    }),
                    None => {}
                }
                self.finish_call(callee, args, keywords)
            }
            CallMethod => {
                let args = self.pop_n_values(arg as usize)?;
                let callee = self.pop_callee()?;
                self.finish_call(callee, args, Vec::new())
            }
            Call => {
                let mut args = self.pop_n_values(arg as usize)?;
                let kw_names = std::mem::take(&mut self.kw_names);
                let split = args.len() - kw_names.len().min(args.len());
                let kw_values = args
                    .split_off(split)
                    .into_iter()
                    .map(StackValue::into_expr)
                    .collect::<Result<Vec<_>, _>>()?;
                let keywords = kw_names
                    .into_iter()
                    .zip(kw_values)
                    .map(|(name, value)| Keyword {
                        arg: Some(name),
                        value,
                    })
                    .collect::<Vec<_>>();
                let callee = self.pop_callee()?;
                self.finish_call(callee, args, keywords)
            }
            CallKw => {
                let names = match self.pop_expr()? {
                    Expr::Literal(Const::Tuple(items)) => items
                        .into_iter()
                        .filter_map(|c| match c {
                            Const::Str(s) => Some(s),
                            _ => None,
                        })
                        .collect::<Vec<_>>(),
                    _ => Vec::new(),
                };
                let mut args = self.pop_n_values(arg as usize)?;
                let split = args.len() - names.len().min(args.len());
                let kw_values = args
                    .split_off(split)
                    .into_iter()
                    .map(StackValue::into_expr)
                    .collect::<Result<Vec<_>, _>>()?;
                let keywords = names
                    .into_iter()
                    .zip(kw_values)
                    .map(|(name, value)| Keyword {
                        arg: Some(name),
                        value,
                    })
                    .collect();
                let callee = self.pop_callee()?;
                self.finish_call(callee, args, keywords)
            }
            KwNames => {
                self.kw_names = match self.const_at(arg) {
                    Const::Tuple(items) => items
                        .into_iter()
                        .filter_map(|c| match c {
                            Const::Str(s) => Some(s),
                            _ => None,
                        })
                        .collect(),
                    _ => Vec::new(),
                };
                Ok(())
            }
            CallIntrinsic1 => match Intrinsic1::try_from(arg as u8).ok() {
                Some(Intrinsic1::UnaryPositive) => self.unary(UnaryOp::UAdd),
                Some(Intrinsic1::ListToTuple) => {
                    let value = self.pop_expr()?;
                    match value {
                        Expr::List(items) => self.push_expr(Expr::Tuple(items)),
                        other => self.push_expr(other),
                    }
                    Ok(())
                }
                // Identity at the stack level.
                _ => Ok(()),
            },
            CallIntrinsic2 => {
                let right = self.pop()?;
                let _ = right;
                Ok(())
            }

            // Function assembly.
            MakeFunction | MakeClosure => self.make_function(instruction.opcode, arg),
            SetFunctionAttribute => {
                let attr = self.pop()?;
                let function = self.values.last_mut().ok_or(SimError::StackUnderflow)?;
                let StackValue::Function(parts) = function else {
                    return Err(SimError::NotAnExpression);
                };
                apply_function_attribute(parts, arg, attr);
                Ok(())
            }

            // Imports.
            ImportName => {
                let fromlist = self.pop_expr()?;
                let level = self.pop_expr()?;
                let module = self.code.name_at(arg);
                let level = match level {
                    Expr::Literal(Const::Int(n)) if n >= 0 => n as u32,
                    _ => 0,
                };
                let fromlist = match fromlist {
                    Expr::Literal(Const::Tuple(items)) => items
                        .into_iter()
                        .filter_map(|c| match c {
                            Const::Str(s) => Some(s),
                            _ => None,
                        })
                        .collect(),
                    _ => Vec::new(),
                };
                self.push(StackValue::Import {
                    module,
                    fromlist,
                    level,
                });
                Ok(())
            }
            ImportFrom => {
                let module = match self.peek() {
                    Some(StackValue::Import { module, .. }) => module.clone(),
                    _ => String::new(),
                };
                self.push(StackValue::ImportFrom {
                    module,
                    name: self.code.name_at(arg),
                });
                Ok(())
            }

            // Pattern-matching scaffolding the match driver inspects
            // through instructions, not values.
            MatchSequence | MatchMapping => {
                self.push(StackValue::Unknown);
                Ok(())
            }
            MatchKeys => {
                self.push(StackValue::Unknown);
                Ok(())
            }
            MatchClass => {
                self.pop()?;
                self.pop()?;
                self.pop()?;
                self.push(StackValue::Unknown);
                Ok(())
            }
            CopyDictWithoutKeys => {
                self.push(StackValue::Unknown);
                Ok(())
            }

            other => Err(SimError::Unsupported(other)),
        }
    }

    fn rotate(&mut self, n: usize) -> Result<(), SimError> {
        if n < 2 {
            return Ok(());
        }
        if self.values.len() < n {
            return Err(SimError::StackUnderflow);
        }
        let top = self.values.pop().expect("length checked");
        let index = self.values.len() + 1 - n;
        self.values.insert(index, top);
        Ok(())
    }

    fn unary(&mut self, op: UnaryOp) -> Result<(), SimError> {
        let operand = self.pop_expr()?;
        self.push_expr(Expr::UnaryOp {
            op,
            operand: Box::new(operand),
        });
        Ok(())
    }

    fn binary(&mut self, op: BinOp) -> Result<(), SimError> {
        let right = self.pop_expr()?;
        let left = self.pop_expr()?;
        self.push_expr(Expr::BinOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        });
        Ok(())
    }

    fn subscript(&mut self) -> Result<(), SimError> {
        let index = self.pop_expr()?;
        let value = self.pop_expr()?;
        self.push_expr(Expr::Subscript {
            value: Box::new(value),
            index: Box::new(index),
        });
        Ok(())
    }

    fn compare(&mut self, op: CmpOp) -> Result<(), SimError> {
        let right = self.pop_expr()?;
        let left = self.pop_expr()?;
        self.push_expr(Expr::Compare {
            left: Box::new(left),
            ops: vec![op],
            comparators: vec![right],
        });
        Ok(())
    }

    fn spread_items(&self, iterable: Expr) -> Vec<Expr> {
        match iterable {
            Expr::Literal(Const::Tuple(items)) => {
                items.into_iter().map(Expr::Literal).collect()
            }
            Expr::Tuple(items) | Expr::List(items) => items,
            other => vec![Expr::Starred(Box::new(other))],
        }
    }

    fn make_function(&mut self, opcode: Opcode, arg: u32) -> Result<(), SimError> {
        let version = self.version;
        // 3.3–3.10 push a qualname string above the code object.
        let (code, qualname) = if version.gte(3, 3) && version.lt(3, 11) {
            let qualname = match self.pop_expr()? {
                Expr::Literal(Const::Str(s)) => Some(s),
                _ => None,
            };
            (self.pop()?, qualname)
        } else {
            (self.pop()?, None)
        };
        let code = match code {
            StackValue::Function(parts) => parts.code,
            StackValue::Expr(Expr::Literal(Const::Code(code))) => code,
            _ => return Err(SimError::NotAnExpression),
        };
        let mut parts = FunctionParts {
            code,
            qualname,
            defaults: Vec::new(),
            kw_defaults: Vec::new(),
            annotations: Vec::new(),
            has_closure: false,
            decorators: Vec::new(),
        };
        if version.word_coded() {
            // Flag-driven operand layout.
            if arg & 0x08 != 0 || opcode == Opcode::MakeClosure {
                self.pop()?;
                parts.has_closure = true;
            }
            if arg & 0x04 != 0 {
                let annotations = self.pop_expr()?;
                parts.annotations = annotation_pairs(annotations);
            }
            if arg & 0x02 != 0 {
                if let Expr::Dict { keys, values } = self.pop_expr()? {
                    for (key, value) in keys.into_iter().zip(values) {
                        if let Some(Expr::Literal(Const::Str(name))) = key {
                            parts.kw_defaults.push((name, value));
                        }
                    }
                }
            }
            if arg & 0x01 != 0 {
                match self.pop_expr()? {
                    Expr::Tuple(items) => parts.defaults = items,
                    Expr::Literal(Const::Tuple(items)) => {
                        parts.defaults = items.into_iter().map(Expr::Literal).collect();
                    }
                    other => parts.defaults = vec![other],
                }
            }
        } else {
            // Count-driven operand layout.
            if opcode == Opcode::MakeClosure {
                self.pop()?;
                parts.has_closure = true;
            }
            let default_count = arg as usize & 0xff;
            let kw_count = (arg >> 8) as usize & 0xff;
            for _ in 0..kw_count {
                let value = self.pop_expr()?;
                let key = self.pop_expr()?;
                if let Expr::Literal(Const::Str(name)) = key {
                    parts.kw_defaults.push((name, value));
                }
            }
            parts.kw_defaults.reverse();
            let mut defaults = self.pop_n_exprs(default_count)?;
            parts.defaults.append(&mut defaults);
        }
        self.push(StackValue::Function(parts));
        Ok(())
    }
}

fn conversion_char(flag: u32) -> Option<char> {
    match flag {
        1 => Some('s'),
        2 => Some('r'),
        3 => Some('a'),
        _ => None,
    }
}

fn annotation_pairs(annotations: Expr) -> Vec<(String, Expr)> {
    match annotations {
        Expr::Dict { keys, values } => keys
            .into_iter()
            .zip(values)
            .filter_map(|(key, value)| match key {
                Some(Expr::Literal(Const::Str(name))) => Some((name, value)),
                _ => None,
            })
            .collect(),
        Expr::Literal(Const::Tuple(items)) => {
            // 3.10+ flat (name, value, name, value, …) tuple form is only
            // seen with constant annotations.
            let mut out = Vec::new();
            let mut iter = items.into_iter();
            while let (Some(Const::Str(name)), Some(value)) = (iter.next(), iter.next()) {
                out.push((name, Expr::Literal(value)));
            }
            out
        }
        _ => Vec::new(),
    }
}

fn apply_function_attribute(parts: &mut FunctionParts, flag: u32, value: StackValue) {
    let Ok(expr) = value.into_expr() else {
        parts.has_closure |= flag == 0x08;
        return;
    };
    match flag {
        0x01 => match expr {
            Expr::Tuple(items) => parts.defaults = items,
            Expr::Literal(Const::Tuple(items)) => {
                parts.defaults = items.into_iter().map(Expr::Literal).collect();
            }
            other => parts.defaults = vec![other],
        },
        0x02 => {
            if let Expr::Dict { keys, values } = expr {
                for (key, value) in keys.into_iter().zip(values) {
                    if let Some(Expr::Literal(Const::Str(name))) = key {
                        parts.kw_defaults.push((name, value));
                    }
                }
            }
        }
        0x04 => parts.annotations = annotation_pairs(expr),
        0x08 => parts.has_closure = true,
        _ => {}
    }
}

/// Names the compiler gives synthesized comprehension code objects.
#[must_use]
pub fn is_comprehension_name(name: &str) -> bool {
    matches!(name, "<listcomp>" | "<setcomp>" | "<dictcomp>" | "<genexpr>")
}

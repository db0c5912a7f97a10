//! Canonical opcode table.
//!
//! Every supported interpreter version maps its opcode bytes onto the single
//! version-independent [`Opcode`] enum here. The rest of the crate never
//! sees raw bytes: the decoder resolves them through [`opcode_of`] and all
//! later stages match on the canonical names. Per-version behavior that is
//! a property of the opcode itself (argument presence, inline cache size,
//! jump shape) also lives in this module so version checks stay
//! concentrated.

use num_enum::TryFromPrimitive;

use crate::ast::{BinOp, CmpOp};
use crate::version::Version;

/// Pre-3.6 boundary between argless and argumented opcode bytes.
pub const HAVE_ARGUMENT: u8 = 90;

macro_rules! define_opcodes {
    ($($variant:ident => $mnemonic:literal,)*) => {
        /// Version-independent opcode names, covering 2.7 through 3.14.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        pub enum Opcode {
            $($variant,)*
        }

        impl Opcode {
            /// The interpreter's mnemonic for `dis`-style listings.
            #[must_use]
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Self::$variant => $mnemonic,)*
                }
            }
        }
    };
}

define_opcodes! {
    // Stack manipulation
    Cache => "CACHE",
    PopTop => "POP_TOP",
    PopIter => "POP_ITER",
    RotTwo => "ROT_TWO",
    RotThree => "ROT_THREE",
    RotFour => "ROT_FOUR",
    RotN => "ROT_N",
    DupTop => "DUP_TOP",
    DupTopTwo => "DUP_TOP_TWO",
    DupTopX => "DUP_TOPX",
    Copy => "COPY",
    Swap => "SWAP",
    PushNull => "PUSH_NULL",
    Nop => "NOP",
    Resume => "RESUME",
    ExtendedArg => "EXTENDED_ARG",

    // Unary operators
    UnaryPositive => "UNARY_POSITIVE",
    UnaryNegative => "UNARY_NEGATIVE",
    UnaryNot => "UNARY_NOT",
    UnaryInvert => "UNARY_INVERT",
    UnaryConvert => "UNARY_CONVERT",
    ToBool => "TO_BOOL",

    // Binary operators (pre-3.11 dedicated forms)
    BinaryPower => "BINARY_POWER",
    BinaryMultiply => "BINARY_MULTIPLY",
    BinaryMatrixMultiply => "BINARY_MATRIX_MULTIPLY",
    BinaryDivide => "BINARY_DIVIDE",
    BinaryModulo => "BINARY_MODULO",
    BinaryAdd => "BINARY_ADD",
    BinarySubtract => "BINARY_SUBTRACT",
    BinaryFloorDivide => "BINARY_FLOOR_DIVIDE",
    BinaryTrueDivide => "BINARY_TRUE_DIVIDE",
    BinaryLshift => "BINARY_LSHIFT",
    BinaryRshift => "BINARY_RSHIFT",
    BinaryAnd => "BINARY_AND",
    BinaryXor => "BINARY_XOR",
    BinaryOr => "BINARY_OR",
    BinarySubscr => "BINARY_SUBSCR",
    BinarySlice => "BINARY_SLICE",

    // In-place operators (pre-3.11)
    InplacePower => "INPLACE_POWER",
    InplaceMultiply => "INPLACE_MULTIPLY",
    InplaceMatrixMultiply => "INPLACE_MATRIX_MULTIPLY",
    InplaceDivide => "INPLACE_DIVIDE",
    InplaceModulo => "INPLACE_MODULO",
    InplaceAdd => "INPLACE_ADD",
    InplaceSubtract => "INPLACE_SUBTRACT",
    InplaceFloorDivide => "INPLACE_FLOOR_DIVIDE",
    InplaceTrueDivide => "INPLACE_TRUE_DIVIDE",
    InplaceLshift => "INPLACE_LSHIFT",
    InplaceRshift => "INPLACE_RSHIFT",
    InplaceAnd => "INPLACE_AND",
    InplaceXor => "INPLACE_XOR",
    InplaceOr => "INPLACE_OR",

    // 3.11 unified binary operator
    BinaryOp => "BINARY_OP",

    // Comparison
    CompareOp => "COMPARE_OP",
    IsOp => "IS_OP",
    ContainsOp => "CONTAINS_OP",

    // Py2 slice family
    Slice0 => "SLICE+0",
    Slice1 => "SLICE+1",
    Slice2 => "SLICE+2",
    Slice3 => "SLICE+3",
    StoreSlicePy2 => "STORE_SLICE+",
    DeleteSlicePy2 => "DELETE_SLICE+",
    StoreSlice => "STORE_SLICE",

    // Loads
    LoadConst => "LOAD_CONST",
    LoadSmallInt => "LOAD_SMALL_INT",
    LoadCommonConstant => "LOAD_COMMON_CONSTANT",
    LoadName => "LOAD_NAME",
    LoadGlobal => "LOAD_GLOBAL",
    LoadFast => "LOAD_FAST",
    LoadFastCheck => "LOAD_FAST_CHECK",
    LoadFastAndClear => "LOAD_FAST_AND_CLEAR",
    LoadFastLoadFast => "LOAD_FAST_LOAD_FAST",
    LoadDeref => "LOAD_DEREF",
    LoadClassDeref => "LOAD_CLASSDEREF",
    LoadClosure => "LOAD_CLOSURE",
    LoadAttr => "LOAD_ATTR",
    LoadMethod => "LOAD_METHOD",
    LoadSuperAttr => "LOAD_SUPER_ATTR",
    LoadBuildClass => "LOAD_BUILD_CLASS",
    LoadAssertionError => "LOAD_ASSERTION_ERROR",
    LoadLocals => "LOAD_LOCALS",
    LoadSpecial => "LOAD_SPECIAL",

    // Stores and deletes
    StoreName => "STORE_NAME",
    StoreGlobal => "STORE_GLOBAL",
    StoreFast => "STORE_FAST",
    StoreFastLoadFast => "STORE_FAST_LOAD_FAST",
    StoreDeref => "STORE_DEREF",
    StoreAttr => "STORE_ATTR",
    StoreSubscr => "STORE_SUBSCR",
    StoreMap => "STORE_MAP",
    DeleteName => "DELETE_NAME",
    DeleteGlobal => "DELETE_GLOBAL",
    DeleteFast => "DELETE_FAST",
    DeleteDeref => "DELETE_DEREF",
    DeleteAttr => "DELETE_ATTR",
    DeleteSubscr => "DELETE_SUBSCR",

    // Collections
    BuildTuple => "BUILD_TUPLE",
    BuildList => "BUILD_LIST",
    BuildSet => "BUILD_SET",
    BuildMap => "BUILD_MAP",
    BuildConstKeyMap => "BUILD_CONST_KEY_MAP",
    BuildString => "BUILD_STRING",
    BuildSlice => "BUILD_SLICE",
    ListAppend => "LIST_APPEND",
    SetAdd => "SET_ADD",
    MapAdd => "MAP_ADD",
    ListExtend => "LIST_EXTEND",
    SetUpdate => "SET_UPDATE",
    DictUpdate => "DICT_UPDATE",
    DictMerge => "DICT_MERGE",
    ListToTuple => "LIST_TO_TUPLE",
    UnpackSequence => "UNPACK_SEQUENCE",
    UnpackEx => "UNPACK_EX",
    CopyDictWithoutKeys => "COPY_DICT_WITHOUT_KEYS",

    // String formatting
    FormatValue => "FORMAT_VALUE",
    FormatSimple => "FORMAT_SIMPLE",
    FormatWithSpec => "FORMAT_WITH_SPEC",
    ConvertValue => "CONVERT_VALUE",

    // Jumps
    JumpForward => "JUMP_FORWARD",
    JumpAbsolute => "JUMP_ABSOLUTE",
    JumpBackward => "JUMP_BACKWARD",
    JumpBackwardNoInterrupt => "JUMP_BACKWARD_NO_INTERRUPT",
    PopJumpIfFalse => "POP_JUMP_IF_FALSE",
    PopJumpIfTrue => "POP_JUMP_IF_TRUE",
    PopJumpIfNone => "POP_JUMP_IF_NONE",
    PopJumpIfNotNone => "POP_JUMP_IF_NOT_NONE",
    PopJumpForwardIfFalse => "POP_JUMP_FORWARD_IF_FALSE",
    PopJumpForwardIfTrue => "POP_JUMP_FORWARD_IF_TRUE",
    PopJumpForwardIfNone => "POP_JUMP_FORWARD_IF_NONE",
    PopJumpForwardIfNotNone => "POP_JUMP_FORWARD_IF_NOT_NONE",
    PopJumpBackwardIfFalse => "POP_JUMP_BACKWARD_IF_FALSE",
    PopJumpBackwardIfTrue => "POP_JUMP_BACKWARD_IF_TRUE",
    PopJumpBackwardIfNone => "POP_JUMP_BACKWARD_IF_NONE",
    PopJumpBackwardIfNotNone => "POP_JUMP_BACKWARD_IF_NOT_NONE",
    JumpIfFalseOrPop => "JUMP_IF_FALSE_OR_POP",
    JumpIfTrueOrPop => "JUMP_IF_TRUE_OR_POP",
    JumpIfNotExcMatch => "JUMP_IF_NOT_EXC_MATCH",

    // Iteration
    GetIter => "GET_ITER",
    GetYieldFromIter => "GET_YIELD_FROM_ITER",
    ForIter => "FOR_ITER",
    ForLoop => "FOR_LOOP",
    EndFor => "END_FOR",
    Send => "SEND",
    EndSend => "END_SEND",

    // Async
    GetAiter => "GET_AITER",
    GetAnext => "GET_ANEXT",
    GetAwaitable => "GET_AWAITABLE",
    EndAsyncFor => "END_ASYNC_FOR",
    BeforeAsyncWith => "BEFORE_ASYNC_WITH",
    SetupAsyncWith => "SETUP_ASYNC_WITH",
    AsyncGenWrap => "ASYNC_GEN_WRAP",
    CleanupThrow => "CLEANUP_THROW",

    // Functions and calls
    MakeFunction => "MAKE_FUNCTION",
    MakeClosure => "MAKE_CLOSURE",
    SetFunctionAttribute => "SET_FUNCTION_ATTRIBUTE",
    CallFunction => "CALL_FUNCTION",
    CallFunctionVar => "CALL_FUNCTION_VAR",
    CallFunctionKw => "CALL_FUNCTION_KW",
    CallFunctionVarKw => "CALL_FUNCTION_VAR_KW",
    CallFunctionEx => "CALL_FUNCTION_EX",
    CallMethod => "CALL_METHOD",
    Call => "CALL",
    CallKw => "CALL_KW",
    KwNames => "KW_NAMES",
    Precall => "PRECALL",
    CallIntrinsic1 => "CALL_INTRINSIC_1",
    CallIntrinsic2 => "CALL_INTRINSIC_2",
    MakeCell => "MAKE_CELL",
    CopyFreeVars => "COPY_FREE_VARS",
    ReturnGenerator => "RETURN_GENERATOR",

    // Control
    ReturnValue => "RETURN_VALUE",
    ReturnConst => "RETURN_CONST",
    YieldValue => "YIELD_VALUE",
    YieldFrom => "YIELD_FROM",
    RaiseVarargs => "RAISE_VARARGS",
    Reraise => "RERAISE",
    BreakLoop => "BREAK_LOOP",
    ContinueLoop => "CONTINUE_LOOP",

    // Exception machinery
    PopBlock => "POP_BLOCK",
    PopExcept => "POP_EXCEPT",
    EndFinally => "END_FINALLY",
    BeginFinally => "BEGIN_FINALLY",
    PopFinally => "POP_FINALLY",
    CallFinally => "CALL_FINALLY",
    SetupLoop => "SETUP_LOOP",
    SetupExcept => "SETUP_EXCEPT",
    SetupFinally => "SETUP_FINALLY",
    SetupWith => "SETUP_WITH",
    PushExcInfo => "PUSH_EXC_INFO",
    CheckExcMatch => "CHECK_EXC_MATCH",
    CheckEgMatch => "CHECK_EG_MATCH",
    PrepReraiseStar => "PREP_RERAISE_STAR",
    WithCleanup => "WITH_CLEANUP",
    WithCleanupStart => "WITH_CLEANUP_START",
    WithCleanupFinish => "WITH_CLEANUP_FINISH",
    WithExceptStart => "WITH_EXCEPT_START",
    BeforeWith => "BEFORE_WITH",
    GenStart => "GEN_START",

    // Pattern matching
    MatchClass => "MATCH_CLASS",
    MatchMapping => "MATCH_MAPPING",
    MatchSequence => "MATCH_SEQUENCE",
    MatchKeys => "MATCH_KEYS",
    GetLen => "GET_LEN",

    // Imports
    ImportName => "IMPORT_NAME",
    ImportFrom => "IMPORT_FROM",
    ImportStar => "IMPORT_STAR",

    // Namespace statements
    SetupAnnotations => "SETUP_ANNOTATIONS",
    BuildClass => "BUILD_CLASS",
    PrintExpr => "PRINT_EXPR",
    PrintItem => "PRINT_ITEM",
    PrintNewline => "PRINT_NEWLINE",
    PrintItemTo => "PRINT_ITEM_TO",
    PrintNewlineTo => "PRINT_NEWLINE_TO",
    ExecStmt => "EXEC_STMT",
}

/// How a jump argument is interpreted when computing the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpDirection {
    Absolute,
    Forward,
    Backward,
}

/// What a jump tests, from the perspective of the taken edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    Unconditional,
    /// Taken when top-of-stack is truthy (value popped).
    IfTrue,
    /// Taken when top-of-stack is falsey (value popped).
    IfFalse,
    IfNone,
    IfNotNone,
    /// Taken when falsey, value retained on the taken path.
    OrPopFalse,
    /// Taken when truthy, value retained on the taken path.
    OrPopTrue,
    /// `FOR_ITER`/`FOR_LOOP`/`SEND`: taken on iterator exhaustion.
    IterExhausted,
    /// Legacy `JUMP_IF_NOT_EXC_MATCH`.
    ExcMismatch,
    /// `SETUP_*`: the argument is a handler/cleanup target, not a branch.
    Setup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpInfo {
    pub kind: JumpKind,
    pub direction: JumpDirection,
}

impl JumpInfo {
    const fn new(kind: JumpKind, direction: JumpDirection) -> Self {
        Self { kind, direction }
    }

    /// True for kinds that transfer control (everything but `Setup`).
    #[must_use]
    pub fn is_branch(self) -> bool {
        !matches!(self.kind, JumpKind::Setup)
    }

    /// True when the jump pops a condition and picks one of two successors.
    #[must_use]
    pub fn is_conditional(self) -> bool {
        !matches!(self.kind, JumpKind::Unconditional | JumpKind::Setup)
    }
}

/// Jump shape for `opcode` under `version`, or `None` for non-jumps.
#[must_use]
pub fn jump_info(opcode: Opcode, version: Version) -> Option<JumpInfo> {
    use JumpDirection::*;
    use JumpKind::*;
    let info = match opcode {
        Opcode::JumpForward => JumpInfo::new(Unconditional, Forward),
        Opcode::JumpAbsolute | Opcode::ContinueLoop => JumpInfo::new(Unconditional, Absolute),
        Opcode::JumpBackward | Opcode::JumpBackwardNoInterrupt => {
            JumpInfo::new(Unconditional, Backward)
        }
        Opcode::PopJumpIfFalse => {
            if version.gte(3, 12) {
                JumpInfo::new(IfFalse, Forward)
            } else {
                JumpInfo::new(IfFalse, Absolute)
            }
        }
        Opcode::PopJumpIfTrue => {
            if version.gte(3, 12) {
                JumpInfo::new(IfTrue, Forward)
            } else {
                JumpInfo::new(IfTrue, Absolute)
            }
        }
        Opcode::PopJumpIfNone => JumpInfo::new(IfNone, Forward),
        Opcode::PopJumpIfNotNone => JumpInfo::new(IfNotNone, Forward),
        Opcode::PopJumpForwardIfFalse => JumpInfo::new(IfFalse, Forward),
        Opcode::PopJumpForwardIfTrue => JumpInfo::new(IfTrue, Forward),
        Opcode::PopJumpForwardIfNone => JumpInfo::new(IfNone, Forward),
        Opcode::PopJumpForwardIfNotNone => JumpInfo::new(IfNotNone, Forward),
        Opcode::PopJumpBackwardIfFalse => JumpInfo::new(IfFalse, Backward),
        Opcode::PopJumpBackwardIfTrue => JumpInfo::new(IfTrue, Backward),
        Opcode::PopJumpBackwardIfNone => JumpInfo::new(IfNone, Backward),
        Opcode::PopJumpBackwardIfNotNone => JumpInfo::new(IfNotNone, Backward),
        Opcode::JumpIfFalseOrPop => {
            if version.gte(3, 11) {
                JumpInfo::new(OrPopFalse, Forward)
            } else {
                JumpInfo::new(OrPopFalse, Absolute)
            }
        }
        Opcode::JumpIfTrueOrPop => {
            if version.gte(3, 11) {
                JumpInfo::new(OrPopTrue, Forward)
            } else {
                JumpInfo::new(OrPopTrue, Absolute)
            }
        }
        Opcode::JumpIfNotExcMatch => JumpInfo::new(ExcMismatch, Absolute),
        Opcode::ForIter | Opcode::ForLoop | Opcode::Send => JumpInfo::new(IterExhausted, Forward),
        Opcode::SetupLoop
        | Opcode::SetupExcept
        | Opcode::SetupFinally
        | Opcode::SetupWith
        | Opcode::SetupAsyncWith
        | Opcode::CallFinally => JumpInfo::new(Setup, Forward),
        _ => return None,
    };
    Some(info)
}

/// Whether the decoded argument carries meaning for `opcode`.
///
/// Word-coded versions always encode an argument byte; this reports
/// whether that byte is semantically an operand.
#[must_use]
pub fn has_arg(opcode: Opcode, version: Version) -> bool {
    use Opcode::*;
    match opcode {
        LoadConst | LoadSmallInt | LoadCommonConstant | LoadName | LoadGlobal | LoadFast
        | LoadFastCheck | LoadFastAndClear | LoadFastLoadFast | LoadDeref | LoadClassDeref
        | LoadClosure | LoadAttr | LoadMethod | LoadSuperAttr | LoadSpecial | StoreName
        | StoreGlobal | StoreFast | StoreFastLoadFast | StoreDeref | StoreAttr | DeleteName
        | DeleteGlobal | DeleteFast | DeleteDeref | DeleteAttr | BuildTuple | BuildList
        | BuildSet | BuildMap | BuildConstKeyMap | BuildString | BuildSlice | ListAppend
        | SetAdd | MapAdd | ListExtend | SetUpdate | DictUpdate | DictMerge | UnpackSequence
        | UnpackEx | FormatValue | ConvertValue | CompareOp | IsOp | ContainsOp | BinaryOp
        | JumpForward | JumpAbsolute | JumpBackward | JumpBackwardNoInterrupt | PopJumpIfFalse
        | PopJumpIfTrue | PopJumpIfNone | PopJumpIfNotNone | PopJumpForwardIfFalse
        | PopJumpForwardIfTrue | PopJumpForwardIfNone | PopJumpForwardIfNotNone
        | PopJumpBackwardIfFalse | PopJumpBackwardIfTrue | PopJumpBackwardIfNone
        | PopJumpBackwardIfNotNone | JumpIfFalseOrPop | JumpIfTrueOrPop | JumpIfNotExcMatch
        | ForIter | ForLoop | Send | MakeFunction | MakeClosure | SetFunctionAttribute
        | CallFunction | CallFunctionVar | CallFunctionKw | CallFunctionVarKw | CallFunctionEx
        | CallMethod | Call | CallKw | KwNames | Precall | CallIntrinsic1 | CallIntrinsic2
        | MakeCell | CopyFreeVars | RaiseVarargs | ContinueLoop | SetupLoop | SetupExcept
        | SetupFinally | SetupWith | SetupAsyncWith | CallFinally | ImportName | ImportFrom
        | MatchClass | RotN | Copy | Swap | DupTopX | Reraise | Resume | GenStart
        | ReturnConst | ExtendedArg | CopyDictWithoutKeys | GetAwaitable | PopExcept => {
            // A handful of these grew or lost a meaningful operand over
            // time; the differences that matter downstream are gated here.
            match opcode {
                GetAwaitable => version.gte(3, 11),
                PopExcept | Reraise => version.gte(3, 11) && version.lt(3, 12),
                _ => true,
            }
        }
        YieldValue => version.gte(3, 12),
        LoadBuildClass | LoadAssertionError | LoadLocals | StoreSubscr | StoreMap | StoreSlice
        | StoreSlicePy2 | DeleteSubscr | DeleteSlicePy2 | Slice0 | Slice1 | Slice2 | Slice3
        | Cache | PopTop | PopIter | RotTwo | RotThree | RotFour | DupTop | DupTopTwo
        | PushNull | Nop | UnaryPositive | UnaryNegative | UnaryNot | UnaryInvert
        | UnaryConvert | ToBool | BinaryPower | BinaryMultiply | BinaryMatrixMultiply
        | BinaryDivide | BinaryModulo | BinaryAdd | BinarySubtract | BinaryFloorDivide
        | BinaryTrueDivide | BinaryLshift | BinaryRshift | BinaryAnd | BinaryXor | BinaryOr
        | BinarySubscr | BinarySlice | InplacePower | InplaceMultiply
        | InplaceMatrixMultiply | InplaceDivide | InplaceModulo | InplaceAdd
        | InplaceSubtract | InplaceFloorDivide | InplaceTrueDivide | InplaceLshift
        | InplaceRshift | InplaceAnd | InplaceXor | InplaceOr | FormatSimple
        | FormatWithSpec | GetIter | GetYieldFromIter | EndFor | EndSend | GetAiter
        | GetAnext | EndAsyncFor | BeforeAsyncWith | AsyncGenWrap | CleanupThrow
        | ReturnGenerator | ReturnValue | YieldFrom | BreakLoop | PopBlock | EndFinally
        | BeginFinally | PopFinally | PushExcInfo | CheckExcMatch | CheckEgMatch
        | PrepReraiseStar | WithCleanup | WithCleanupStart | WithCleanupFinish
        | WithExceptStart | BeforeWith | MatchMapping | MatchSequence | MatchKeys | GetLen
        | ImportStar | SetupAnnotations | BuildClass | PrintExpr | PrintItem | PrintNewline
        | PrintItemTo | PrintNewlineTo | ExecStmt | ListToTuple => false,
    }
}

/// Inline cache entries following `opcode` (3.11+ only).
#[must_use]
pub fn cache_entries(opcode: Opcode, version: Version) -> u8 {
    use Opcode::*;
    if !version.has_inline_caches() {
        return 0;
    }
    if version.lt(3, 12) {
        return match opcode {
            BinaryOp | Precall | StoreSubscr | UnpackSequence => 1,
            CompareOp => 2,
            BinarySubscr | LoadAttr | StoreAttr | Call => 4,
            LoadGlobal => 5,
            LoadMethod => 10,
            _ => 0,
        };
    }
    if version.lt(3, 13) {
        return match opcode {
            BinaryOp | BinarySubscr | CompareOp | ForIter | Send | StoreSubscr
            | UnpackSequence | JumpBackward | LoadSuperAttr => 1,
            Call => 3,
            LoadGlobal | StoreAttr => 4,
            LoadAttr => 9,
            _ => 0,
        };
    }
    // 3.13 and 3.14
    match opcode {
        BinaryOp | BinarySubscr | CompareOp | ForIter | Send | StoreSubscr | UnpackSequence
        | JumpBackward | LoadSuperAttr | ContainsOp | PopJumpIfFalse | PopJumpIfTrue
        | PopJumpIfNone | PopJumpIfNotNone => 1,
        ToBool | Call | CallKw => 3,
        LoadGlobal | StoreAttr => 4,
        LoadAttr => 9,
        _ => 0,
    }
}

/// `BINARY_OP` operand values (3.11+), `NB_*` in the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum BinaryOpArg {
    Add = 0,
    And = 1,
    FloorDivide = 2,
    Lshift = 3,
    MatrixMultiply = 4,
    Multiply = 5,
    Remainder = 6,
    Or = 7,
    Power = 8,
    Rshift = 9,
    Subtract = 10,
    TrueDivide = 11,
    Xor = 12,
    InplaceAdd = 13,
    InplaceAnd = 14,
    InplaceFloorDivide = 15,
    InplaceLshift = 16,
    InplaceMatrixMultiply = 17,
    InplaceMultiply = 18,
    InplaceRemainder = 19,
    InplaceOr = 20,
    InplacePower = 21,
    InplaceRshift = 22,
    InplaceSubtract = 23,
    InplaceTrueDivide = 24,
    InplaceXor = 25,
    /// 3.14 folded `BINARY_SUBSCR` into `BINARY_OP`.
    Subscr = 26,
}

impl BinaryOpArg {
    #[must_use]
    pub fn is_inplace(self) -> bool {
        matches!(
            self,
            Self::InplaceAdd
                | Self::InplaceAnd
                | Self::InplaceFloorDivide
                | Self::InplaceLshift
                | Self::InplaceMatrixMultiply
                | Self::InplaceMultiply
                | Self::InplaceRemainder
                | Self::InplaceOr
                | Self::InplacePower
                | Self::InplaceRshift
                | Self::InplaceSubtract
                | Self::InplaceTrueDivide
                | Self::InplaceXor
        )
    }

    /// The AST operator, or `None` for `Subscr`.
    #[must_use]
    pub fn ast_op(self) -> Option<BinOp> {
        Some(match self {
            Self::Add | Self::InplaceAdd => BinOp::Add,
            Self::And | Self::InplaceAnd => BinOp::BitAnd,
            Self::FloorDivide | Self::InplaceFloorDivide => BinOp::FloorDiv,
            Self::Lshift | Self::InplaceLshift => BinOp::LShift,
            Self::MatrixMultiply | Self::InplaceMatrixMultiply => BinOp::MatMult,
            Self::Multiply | Self::InplaceMultiply => BinOp::Mult,
            Self::Remainder | Self::InplaceRemainder => BinOp::Mod,
            Self::Or | Self::InplaceOr => BinOp::BitOr,
            Self::Power | Self::InplacePower => BinOp::Pow,
            Self::Rshift | Self::InplaceRshift => BinOp::RShift,
            Self::Subtract | Self::InplaceSubtract => BinOp::Sub,
            Self::TrueDivide | Self::InplaceTrueDivide => BinOp::Div,
            Self::Xor | Self::InplaceXor => BinOp::BitXor,
            Self::Subscr => return None,
        })
    }
}

/// Pre-3.9 `COMPARE_OP` operand values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum LegacyCompareArg {
    Lt = 0,
    Le = 1,
    Eq = 2,
    Ne = 3,
    Gt = 4,
    Ge = 5,
    In = 6,
    NotIn = 7,
    Is = 8,
    IsNot = 9,
    ExceptionMatch = 10,
    Bad = 11,
}

/// Decode a `COMPARE_OP` argument into an AST comparison operator.
///
/// Returns `None` for the legacy `exception match` / `BAD` pseudo-ops,
/// which never lower to a source-level comparison.
#[must_use]
pub fn compare_from_arg(arg: u32, version: Version) -> Option<CmpOp> {
    let index = if version.gte(3, 13) {
        arg >> 5
    } else if version.gte(3, 12) {
        arg >> 4
    } else {
        arg
    };
    if version.gte(3, 9) {
        return match index {
            0 => Some(CmpOp::Lt),
            1 => Some(CmpOp::LtE),
            2 => Some(CmpOp::Eq),
            3 => Some(CmpOp::NotEq),
            4 => Some(CmpOp::Gt),
            5 => Some(CmpOp::GtE),
            _ => None,
        };
    }
    match LegacyCompareArg::try_from(u8::try_from(index).ok()?).ok()? {
        LegacyCompareArg::Lt => Some(CmpOp::Lt),
        LegacyCompareArg::Le => Some(CmpOp::LtE),
        LegacyCompareArg::Eq => Some(CmpOp::Eq),
        LegacyCompareArg::Ne => Some(CmpOp::NotEq),
        LegacyCompareArg::Gt => Some(CmpOp::Gt),
        LegacyCompareArg::Ge => Some(CmpOp::GtE),
        LegacyCompareArg::In => Some(CmpOp::In),
        LegacyCompareArg::NotIn => Some(CmpOp::NotIn),
        LegacyCompareArg::Is => Some(CmpOp::Is),
        LegacyCompareArg::IsNot => Some(CmpOp::IsNot),
        LegacyCompareArg::ExceptionMatch | LegacyCompareArg::Bad => None,
    }
}

/// `CALL_INTRINSIC_1` operand values (3.12+).
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum Intrinsic1 {
    Invalid = 0,
    Print = 1,
    ImportStar = 2,
    StopIterationError = 3,
    AsyncGenWrap = 4,
    UnaryPositive = 5,
    ListToTuple = 6,
    TypeVar = 7,
    ParamSpec = 8,
    TypeVarTuple = 9,
    SubscriptGeneric = 10,
    TypeAlias = 11,
}

/// Resolve one opcode byte under `version`.
#[must_use]
pub fn opcode_of(version: Version, byte: u8) -> Option<Opcode> {
    if version.is_py2() {
        table_py27(byte)
    } else if version.lt(3, 6) {
        table_py35(byte)
    } else if version.lt(3, 9) {
        table_py36_38(version, byte)
    } else if version.lt(3, 11) {
        table_py39_310(version, byte)
    } else if version.lt(3, 12) {
        table_py311(byte)
    } else if version.lt(3, 13) {
        table_py312(byte)
    } else if version.lt(3, 14) {
        table_py313(byte)
    } else {
        table_py314(byte)
    }
}

fn table_py27(byte: u8) -> Option<Opcode> {
    use Opcode::*;
    Some(match byte {
        1 => PopTop,
        2 => RotTwo,
        3 => RotThree,
        4 => DupTop,
        5 => RotFour,
        9 => Nop,
        10 => UnaryPositive,
        11 => UnaryNegative,
        12 => UnaryNot,
        13 => UnaryConvert,
        15 => UnaryInvert,
        19 => BinaryPower,
        20 => BinaryMultiply,
        21 => BinaryDivide,
        22 => BinaryModulo,
        23 => BinaryAdd,
        24 => BinarySubtract,
        25 => BinarySubscr,
        26 => BinaryFloorDivide,
        27 => BinaryTrueDivide,
        28 => InplaceFloorDivide,
        29 => InplaceTrueDivide,
        30 => Slice0,
        31 => Slice1,
        32 => Slice2,
        33 => Slice3,
        40..=43 => StoreSlicePy2,
        50..=53 => DeleteSlicePy2,
        54 => StoreMap,
        55 => InplaceAdd,
        56 => InplaceSubtract,
        57 => InplaceMultiply,
        58 => InplaceDivide,
        59 => InplaceModulo,
        60 => StoreSubscr,
        61 => DeleteSubscr,
        62 => BinaryLshift,
        63 => BinaryRshift,
        64 => BinaryAnd,
        65 => BinaryXor,
        66 => BinaryOr,
        67 => InplacePower,
        68 => GetIter,
        70 => PrintExpr,
        71 => PrintItem,
        72 => PrintNewline,
        73 => PrintItemTo,
        74 => PrintNewlineTo,
        75 => InplaceLshift,
        76 => InplaceRshift,
        77 => InplaceAnd,
        78 => InplaceXor,
        79 => InplaceOr,
        80 => BreakLoop,
        81 => WithCleanup,
        82 => LoadLocals,
        83 => ReturnValue,
        84 => ImportStar,
        85 => ExecStmt,
        86 => YieldValue,
        87 => PopBlock,
        88 => EndFinally,
        89 => BuildClass,
        90 => StoreName,
        91 => DeleteName,
        92 => UnpackSequence,
        93 => ForIter,
        94 => ListAppend,
        95 => StoreAttr,
        96 => DeleteAttr,
        97 => StoreGlobal,
        98 => DeleteGlobal,
        99 => DupTopX,
        100 => LoadConst,
        101 => LoadName,
        102 => BuildTuple,
        103 => BuildList,
        104 => BuildSet,
        105 => BuildMap,
        106 => LoadAttr,
        107 => CompareOp,
        108 => ImportName,
        109 => ImportFrom,
        110 => JumpForward,
        111 => JumpIfFalseOrPop,
        112 => JumpIfTrueOrPop,
        113 => JumpAbsolute,
        114 => PopJumpIfFalse,
        115 => PopJumpIfTrue,
        116 => LoadGlobal,
        119 => ContinueLoop,
        120 => SetupLoop,
        121 => SetupExcept,
        122 => SetupFinally,
        124 => LoadFast,
        125 => StoreFast,
        126 => DeleteFast,
        130 => RaiseVarargs,
        131 => CallFunction,
        132 => MakeFunction,
        133 => BuildSlice,
        134 => MakeClosure,
        135 => LoadClosure,
        136 => LoadDeref,
        137 => StoreDeref,
        140 => CallFunctionVar,
        141 => CallFunctionKw,
        142 => CallFunctionVarKw,
        143 => SetupWith,
        145 => ExtendedArg,
        146 => SetAdd,
        147 => MapAdd,
        _ => return None,
    })
}

/// 3.0–3.5 share this table; the handful of opcodes added mid-series
/// simply never occur in older streams.
fn table_py35(byte: u8) -> Option<Opcode> {
    use Opcode::*;
    Some(match byte {
        1 => PopTop,
        2 => RotTwo,
        3 => RotThree,
        4 => DupTop,
        5 => DupTopTwo,
        9 => Nop,
        10 => UnaryPositive,
        11 => UnaryNegative,
        12 => UnaryNot,
        15 => UnaryInvert,
        16 => BinaryMatrixMultiply,
        17 => InplaceMatrixMultiply,
        19 => BinaryPower,
        20 => BinaryMultiply,
        22 => BinaryModulo,
        23 => BinaryAdd,
        24 => BinarySubtract,
        25 => BinarySubscr,
        26 => BinaryFloorDivide,
        27 => BinaryTrueDivide,
        28 => InplaceFloorDivide,
        29 => InplaceTrueDivide,
        50 => GetAiter,
        51 => GetAnext,
        52 => BeforeAsyncWith,
        55 => InplaceAdd,
        56 => InplaceSubtract,
        57 => InplaceMultiply,
        59 => InplaceModulo,
        60 => StoreSubscr,
        61 => DeleteSubscr,
        62 => BinaryLshift,
        63 => BinaryRshift,
        64 => BinaryAnd,
        65 => BinaryXor,
        66 => BinaryOr,
        67 => InplacePower,
        68 => GetIter,
        69 => GetYieldFromIter,
        70 => PrintExpr,
        71 => LoadBuildClass,
        72 => YieldFrom,
        73 => GetAwaitable,
        75 => InplaceLshift,
        76 => InplaceRshift,
        77 => InplaceAnd,
        78 => InplaceXor,
        79 => InplaceOr,
        80 => BreakLoop,
        81 => WithCleanupStart,
        82 => WithCleanupFinish,
        83 => ReturnValue,
        84 => ImportStar,
        86 => YieldValue,
        87 => PopBlock,
        88 => EndFinally,
        89 => PopExcept,
        90 => StoreName,
        91 => DeleteName,
        92 => UnpackSequence,
        93 => ForIter,
        94 => UnpackEx,
        95 => StoreAttr,
        96 => DeleteAttr,
        97 => StoreGlobal,
        98 => DeleteGlobal,
        100 => LoadConst,
        101 => LoadName,
        102 => BuildTuple,
        103 => BuildList,
        104 => BuildSet,
        105 => BuildMap,
        106 => LoadAttr,
        107 => CompareOp,
        108 => ImportName,
        109 => ImportFrom,
        110 => JumpForward,
        111 => JumpIfFalseOrPop,
        112 => JumpIfTrueOrPop,
        113 => JumpAbsolute,
        114 => PopJumpIfFalse,
        115 => PopJumpIfTrue,
        116 => LoadGlobal,
        119 => ContinueLoop,
        120 => SetupLoop,
        121 => SetupExcept,
        122 => SetupFinally,
        124 => LoadFast,
        125 => StoreFast,
        126 => DeleteFast,
        130 => RaiseVarargs,
        131 => CallFunction,
        132 => MakeFunction,
        133 => BuildSlice,
        134 => MakeClosure,
        135 => LoadClosure,
        136 => LoadDeref,
        137 => StoreDeref,
        138 => DeleteDeref,
        140 => CallFunctionVar,
        141 => CallFunctionKw,
        142 => CallFunctionVarKw,
        143 => SetupWith,
        144 => ExtendedArg,
        145 => ListAppend,
        146 => SetAdd,
        147 => MapAdd,
        148 => LoadClassDeref,
        154 => SetupAsyncWith,
        _ => return None,
    })
}

fn table_py36_38(version: Version, byte: u8) -> Option<Opcode> {
    use Opcode::*;
    Some(match byte {
        1 => PopTop,
        2 => RotTwo,
        3 => RotThree,
        4 => DupTop,
        5 => DupTopTwo,
        6 if version.gte(3, 8) => RotFour,
        9 => Nop,
        10 => UnaryPositive,
        11 => UnaryNegative,
        12 => UnaryNot,
        15 => UnaryInvert,
        16 => BinaryMatrixMultiply,
        17 => InplaceMatrixMultiply,
        19 => BinaryPower,
        20 => BinaryMultiply,
        22 => BinaryModulo,
        23 => BinaryAdd,
        24 => BinarySubtract,
        25 => BinarySubscr,
        26 => BinaryFloorDivide,
        27 => BinaryTrueDivide,
        28 => InplaceFloorDivide,
        29 => InplaceTrueDivide,
        50 => GetAiter,
        51 => GetAnext,
        52 => BeforeAsyncWith,
        53 if version.gte(3, 8) => BeginFinally,
        54 if version.gte(3, 8) => EndAsyncFor,
        55 => InplaceAdd,
        56 => InplaceSubtract,
        57 => InplaceMultiply,
        59 => InplaceModulo,
        60 => StoreSubscr,
        61 => DeleteSubscr,
        62 => BinaryLshift,
        63 => BinaryRshift,
        64 => BinaryAnd,
        65 => BinaryXor,
        66 => BinaryOr,
        67 => InplacePower,
        68 => GetIter,
        69 => GetYieldFromIter,
        70 => PrintExpr,
        71 => LoadBuildClass,
        72 => YieldFrom,
        73 => GetAwaitable,
        75 => InplaceLshift,
        76 => InplaceRshift,
        77 => InplaceAnd,
        78 => InplaceXor,
        79 => InplaceOr,
        80 if version.lt(3, 8) => BreakLoop,
        81 => WithCleanupStart,
        82 => WithCleanupFinish,
        83 => ReturnValue,
        84 => ImportStar,
        85 => SetupAnnotations,
        86 => YieldValue,
        87 => PopBlock,
        88 => EndFinally,
        89 => PopExcept,
        90 => StoreName,
        91 => DeleteName,
        92 => UnpackSequence,
        93 => ForIter,
        94 => UnpackEx,
        95 => StoreAttr,
        96 => DeleteAttr,
        97 => StoreGlobal,
        98 => DeleteGlobal,
        100 => LoadConst,
        101 => LoadName,
        102 => BuildTuple,
        103 => BuildList,
        104 => BuildSet,
        105 => BuildMap,
        106 => LoadAttr,
        107 => CompareOp,
        108 => ImportName,
        109 => ImportFrom,
        110 => JumpForward,
        111 => JumpIfFalseOrPop,
        112 => JumpIfTrueOrPop,
        113 => JumpAbsolute,
        114 => PopJumpIfFalse,
        115 => PopJumpIfTrue,
        116 => LoadGlobal,
        119 if version.lt(3, 8) => ContinueLoop,
        120 if version.lt(3, 8) => SetupLoop,
        121 if version.lt(3, 8) => SetupExcept,
        122 => SetupFinally,
        124 => LoadFast,
        125 => StoreFast,
        126 => DeleteFast,
        130 => RaiseVarargs,
        131 => CallFunction,
        132 => MakeFunction,
        133 => BuildSlice,
        135 => LoadClosure,
        136 => LoadDeref,
        137 => StoreDeref,
        138 => DeleteDeref,
        141 => CallFunctionKw,
        142 => CallFunctionEx,
        143 => SetupWith,
        144 => ExtendedArg,
        145 => ListAppend,
        146 => SetAdd,
        147 => MapAdd,
        148 => LoadClassDeref,
        154 => SetupAsyncWith,
        155 => FormatValue,
        156 => BuildConstKeyMap,
        157 => BuildString,
        160 if version.gte(3, 7) => LoadMethod,
        161 if version.gte(3, 7) => CallMethod,
        162 if version.gte(3, 8) => CallFinally,
        163 if version.gte(3, 8) => PopFinally,
        _ => return None,
    })
}

fn table_py39_310(version: Version, byte: u8) -> Option<Opcode> {
    use Opcode::*;
    Some(match byte {
        1 => PopTop,
        2 => RotTwo,
        3 => RotThree,
        4 => DupTop,
        5 => DupTopTwo,
        6 => RotFour,
        9 => Nop,
        10 => UnaryPositive,
        11 => UnaryNegative,
        12 => UnaryNot,
        15 => UnaryInvert,
        16 => BinaryMatrixMultiply,
        17 => InplaceMatrixMultiply,
        19 => BinaryPower,
        20 => BinaryMultiply,
        22 => BinaryModulo,
        23 => BinaryAdd,
        24 => BinarySubtract,
        25 => BinarySubscr,
        26 => BinaryFloorDivide,
        27 => BinaryTrueDivide,
        28 => InplaceFloorDivide,
        29 => InplaceTrueDivide,
        30 if version.gte(3, 10) => GetLen,
        31 if version.gte(3, 10) => MatchMapping,
        32 if version.gte(3, 10) => MatchSequence,
        33 if version.gte(3, 10) => MatchKeys,
        34 if version.gte(3, 10) => CopyDictWithoutKeys,
        48 => Reraise,
        49 => WithExceptStart,
        50 => GetAiter,
        51 => GetAnext,
        52 => BeforeAsyncWith,
        54 => EndAsyncFor,
        55 => InplaceAdd,
        56 => InplaceSubtract,
        57 => InplaceMultiply,
        59 => InplaceModulo,
        60 => StoreSubscr,
        61 => DeleteSubscr,
        62 => BinaryLshift,
        63 => BinaryRshift,
        64 => BinaryAnd,
        65 => BinaryXor,
        66 => BinaryOr,
        67 => InplacePower,
        68 => GetIter,
        69 => GetYieldFromIter,
        70 => PrintExpr,
        71 => LoadBuildClass,
        72 => YieldFrom,
        73 => GetAwaitable,
        74 => LoadAssertionError,
        75 => InplaceLshift,
        76 => InplaceRshift,
        77 => InplaceAnd,
        78 => InplaceXor,
        79 => InplaceOr,
        82 => ListToTuple,
        83 => ReturnValue,
        84 => ImportStar,
        85 => SetupAnnotations,
        86 => YieldValue,
        87 => PopBlock,
        89 => PopExcept,
        90 => StoreName,
        91 => DeleteName,
        92 => UnpackSequence,
        93 => ForIter,
        94 => UnpackEx,
        95 => StoreAttr,
        96 => DeleteAttr,
        97 => StoreGlobal,
        98 => DeleteGlobal,
        99 if version.gte(3, 10) => RotN,
        100 => LoadConst,
        101 => LoadName,
        102 => BuildTuple,
        103 => BuildList,
        104 => BuildSet,
        105 => BuildMap,
        106 => LoadAttr,
        107 => CompareOp,
        108 => ImportName,
        109 => ImportFrom,
        110 => JumpForward,
        111 => JumpIfFalseOrPop,
        112 => JumpIfTrueOrPop,
        113 => JumpAbsolute,
        114 => PopJumpIfFalse,
        115 => PopJumpIfTrue,
        116 => LoadGlobal,
        117 => IsOp,
        118 => ContainsOp,
        121 => JumpIfNotExcMatch,
        122 => SetupFinally,
        124 => LoadFast,
        125 => StoreFast,
        126 => DeleteFast,
        129 if version.gte(3, 10) => GenStart,
        130 => RaiseVarargs,
        131 => CallFunction,
        132 => MakeFunction,
        133 => BuildSlice,
        135 => LoadClosure,
        136 => LoadDeref,
        137 => StoreDeref,
        138 => DeleteDeref,
        141 => CallFunctionKw,
        142 => CallFunctionEx,
        143 => SetupWith,
        144 => ExtendedArg,
        145 => ListAppend,
        146 => SetAdd,
        147 => MapAdd,
        148 => LoadClassDeref,
        152 if version.gte(3, 10) => MatchClass,
        154 => SetupAsyncWith,
        155 => FormatValue,
        156 => BuildConstKeyMap,
        157 => BuildString,
        160 => LoadMethod,
        161 => CallMethod,
        162 => ListExtend,
        163 => SetUpdate,
        164 => DictMerge,
        165 => DictUpdate,
        _ => return None,
    })
}

fn table_py311(byte: u8) -> Option<Opcode> {
    use Opcode::*;
    Some(match byte {
        0 => Cache,
        1 => PopTop,
        2 => PushNull,
        9 => Nop,
        10 => UnaryPositive,
        11 => UnaryNegative,
        12 => UnaryNot,
        15 => UnaryInvert,
        25 => BinarySubscr,
        30 => GetLen,
        31 => MatchMapping,
        32 => MatchSequence,
        33 => MatchKeys,
        35 => PushExcInfo,
        36 => CheckExcMatch,
        37 => CheckEgMatch,
        49 => WithExceptStart,
        50 => GetAiter,
        51 => GetAnext,
        52 => BeforeAsyncWith,
        53 => BeforeWith,
        54 => EndAsyncFor,
        60 => StoreSubscr,
        61 => DeleteSubscr,
        68 => GetIter,
        69 => GetYieldFromIter,
        70 => PrintExpr,
        71 => LoadBuildClass,
        74 => LoadAssertionError,
        75 => ReturnGenerator,
        82 => ListToTuple,
        83 => ReturnValue,
        84 => ImportStar,
        85 => SetupAnnotations,
        86 => YieldValue,
        87 => AsyncGenWrap,
        88 => PrepReraiseStar,
        89 => PopExcept,
        90 => StoreName,
        91 => DeleteName,
        92 => UnpackSequence,
        93 => ForIter,
        94 => UnpackEx,
        95 => StoreAttr,
        96 => DeleteAttr,
        97 => StoreGlobal,
        98 => DeleteGlobal,
        99 => Swap,
        100 => LoadConst,
        101 => LoadName,
        102 => BuildTuple,
        103 => BuildList,
        104 => BuildSet,
        105 => BuildMap,
        106 => LoadAttr,
        107 => CompareOp,
        108 => ImportName,
        109 => ImportFrom,
        110 => JumpForward,
        111 => JumpIfFalseOrPop,
        112 => JumpIfTrueOrPop,
        114 => PopJumpForwardIfFalse,
        115 => PopJumpForwardIfTrue,
        116 => LoadGlobal,
        117 => IsOp,
        118 => ContainsOp,
        119 => Reraise,
        120 => Copy,
        122 => BinaryOp,
        123 => Send,
        124 => LoadFast,
        125 => StoreFast,
        126 => DeleteFast,
        128 => PopJumpForwardIfNotNone,
        129 => PopJumpForwardIfNone,
        130 => RaiseVarargs,
        131 => GetAwaitable,
        132 => MakeFunction,
        133 => BuildSlice,
        134 => JumpBackwardNoInterrupt,
        135 => MakeCell,
        136 => LoadClosure,
        137 => LoadDeref,
        138 => StoreDeref,
        139 => DeleteDeref,
        140 => JumpBackward,
        142 => CallFunctionEx,
        144 => ExtendedArg,
        145 => ListAppend,
        146 => SetAdd,
        147 => MapAdd,
        148 => LoadClassDeref,
        149 => CopyFreeVars,
        151 => Resume,
        152 => MatchClass,
        155 => FormatValue,
        156 => BuildConstKeyMap,
        157 => BuildString,
        160 => LoadMethod,
        162 => ListExtend,
        163 => SetUpdate,
        164 => DictMerge,
        165 => DictUpdate,
        166 => Precall,
        171 => Call,
        172 => KwNames,
        173 => PopJumpBackwardIfNotNone,
        174 => PopJumpBackwardIfNone,
        175 => PopJumpBackwardIfFalse,
        176 => PopJumpBackwardIfTrue,
        _ => return None,
    })
}

fn table_py312(byte: u8) -> Option<Opcode> {
    use Opcode::*;
    Some(match byte {
        0 => Cache,
        1 => PopTop,
        2 => PushNull,
        4 => EndFor,
        5 => EndSend,
        9 => Nop,
        11 => UnaryNegative,
        12 => UnaryNot,
        15 => UnaryInvert,
        25 => BinarySubscr,
        26 => BinarySlice,
        27 => StoreSlice,
        30 => GetLen,
        31 => MatchMapping,
        32 => MatchSequence,
        33 => MatchKeys,
        35 => PushExcInfo,
        36 => CheckExcMatch,
        37 => CheckEgMatch,
        49 => WithExceptStart,
        50 => GetAiter,
        51 => GetAnext,
        52 => BeforeAsyncWith,
        53 => BeforeWith,
        54 => EndAsyncFor,
        55 => CleanupThrow,
        60 => StoreSubscr,
        61 => DeleteSubscr,
        68 => GetIter,
        69 => GetYieldFromIter,
        70 => PrintExpr,
        71 => LoadBuildClass,
        74 => LoadAssertionError,
        75 => ReturnGenerator,
        83 => ReturnValue,
        85 => SetupAnnotations,
        87 => LoadLocals,
        89 => PopExcept,
        90 => StoreName,
        91 => DeleteName,
        92 => UnpackSequence,
        93 => ForIter,
        94 => UnpackEx,
        95 => StoreAttr,
        96 => DeleteAttr,
        97 => StoreGlobal,
        98 => DeleteGlobal,
        99 => Swap,
        100 => LoadConst,
        101 => LoadName,
        102 => BuildTuple,
        103 => BuildList,
        104 => BuildSet,
        105 => BuildMap,
        106 => LoadAttr,
        107 => CompareOp,
        108 => ImportName,
        109 => ImportFrom,
        110 => JumpForward,
        114 => PopJumpIfFalse,
        115 => PopJumpIfTrue,
        116 => LoadGlobal,
        117 => IsOp,
        118 => ContainsOp,
        119 => Reraise,
        120 => Copy,
        121 => ReturnConst,
        122 => BinaryOp,
        123 => Send,
        124 => LoadFast,
        125 => StoreFast,
        126 => DeleteFast,
        127 => LoadFastCheck,
        128 => PopJumpIfNotNone,
        129 => PopJumpIfNone,
        130 => RaiseVarargs,
        131 => GetAwaitable,
        132 => MakeFunction,
        133 => BuildSlice,
        134 => JumpBackwardNoInterrupt,
        135 => MakeCell,
        136 => LoadClosure,
        137 => LoadDeref,
        138 => StoreDeref,
        139 => DeleteDeref,
        140 => JumpBackward,
        141 => LoadSuperAttr,
        142 => CallFunctionEx,
        143 => LoadFastAndClear,
        144 => ExtendedArg,
        145 => ListAppend,
        146 => SetAdd,
        147 => MapAdd,
        149 => CopyFreeVars,
        150 => YieldValue,
        151 => Resume,
        152 => MatchClass,
        155 => FormatValue,
        156 => BuildConstKeyMap,
        157 => BuildString,
        162 => ListExtend,
        163 => SetUpdate,
        164 => DictMerge,
        165 => DictUpdate,
        171 => Call,
        172 => KwNames,
        173 => CallIntrinsic1,
        174 => CallIntrinsic2,
        _ => return None,
    })
}

fn table_py313(byte: u8) -> Option<Opcode> {
    use Opcode::*;
    Some(match byte {
        0 => Cache,
        1 => BeforeAsyncWith,
        2 => BeforeWith,
        3 => BinarySlice,
        4 => BinarySubscr,
        5 => CheckEgMatch,
        6 => CheckExcMatch,
        7 => CleanupThrow,
        8 => DeleteSubscr,
        9 => EndAsyncFor,
        10 => EndFor,
        11 => EndSend,
        14 => FormatSimple,
        15 => FormatWithSpec,
        16 => GetAiter,
        17 => GetAnext,
        18 => GetIter,
        19 => GetLen,
        20 => GetYieldFromIter,
        22 => LoadAssertionError,
        23 => LoadBuildClass,
        24 => LoadLocals,
        25 => MakeFunction,
        26 => MatchKeys,
        27 => MatchMapping,
        28 => MatchSequence,
        29 => Nop,
        30 => PopExcept,
        31 => PopTop,
        32 => PushExcInfo,
        33 => PushNull,
        34 => ReturnGenerator,
        35 => ReturnValue,
        36 => SetupAnnotations,
        37 => StoreSlice,
        38 => StoreSubscr,
        39 => ToBool,
        40 => UnaryInvert,
        41 => UnaryNegative,
        42 => UnaryNot,
        43 => WithExceptStart,
        44 => BinaryOp,
        45 => BuildConstKeyMap,
        46 => BuildList,
        47 => BuildMap,
        48 => BuildSet,
        49 => BuildSlice,
        50 => BuildString,
        51 => BuildTuple,
        52 => Call,
        53 => CallFunctionEx,
        54 => CallIntrinsic1,
        55 => CallIntrinsic2,
        56 => CallKw,
        57 => CompareOp,
        58 => ContainsOp,
        59 => ConvertValue,
        60 => Copy,
        61 => CopyFreeVars,
        62 => DeleteAttr,
        63 => DeleteDeref,
        64 => DeleteFast,
        65 => DeleteGlobal,
        66 => DeleteName,
        67 => DictMerge,
        68 => DictUpdate,
        72 => ForIter,
        74 => GetAwaitable,
        75 => ImportFrom,
        76 => ImportName,
        77 => IsOp,
        78 => JumpBackward,
        79 => JumpBackwardNoInterrupt,
        80 => JumpForward,
        81 => ListAppend,
        82 => ListExtend,
        83 => LoadAttr,
        84 => LoadConst,
        85 => LoadDeref,
        86 => LoadFast,
        87 => LoadFastAndClear,
        88 => LoadFastCheck,
        89 => LoadFastLoadFast,
        92 => LoadGlobal,
        93 => LoadName,
        94 => LoadSuperAttr,
        95 => MakeCell,
        96 => MapAdd,
        97 => MatchClass,
        98 => PopJumpIfFalse,
        99 => PopJumpIfNone,
        100 => PopJumpIfNotNone,
        101 => PopJumpIfTrue,
        102 => RaiseVarargs,
        103 => Reraise,
        104 => ReturnConst,
        105 => Send,
        106 => SetAdd,
        107 => SetFunctionAttribute,
        108 => SetUpdate,
        109 => StoreAttr,
        110 => StoreDeref,
        111 => StoreFast,
        112 => StoreFastLoadFast,
        113 => StoreGlobal,
        114 => StoreName,
        115 => Swap,
        116 => UnpackEx,
        117 => UnpackSequence,
        118 => YieldValue,
        119 => ExtendedArg,
        149 => Resume,
        _ => return None,
    })
}

fn table_py314(byte: u8) -> Option<Opcode> {
    use Opcode::*;
    Some(match byte {
        0 => Cache,
        1 => BinarySlice,
        2 => CheckEgMatch,
        3 => CheckExcMatch,
        4 => CleanupThrow,
        5 => DeleteSubscr,
        6 => EndAsyncFor,
        7 => EndFor,
        8 => EndSend,
        11 => FormatSimple,
        12 => FormatWithSpec,
        13 => GetAiter,
        14 => GetAnext,
        15 => GetIter,
        16 => GetLen,
        17 => GetYieldFromIter,
        19 => LoadBuildClass,
        20 => LoadLocals,
        21 => MakeFunction,
        22 => MatchKeys,
        23 => MatchMapping,
        24 => MatchSequence,
        25 => Nop,
        27 => PopExcept,
        28 => PopIter,
        29 => PopTop,
        30 => PushExcInfo,
        31 => PushNull,
        32 => ReturnGenerator,
        33 => ReturnValue,
        34 => SetupAnnotations,
        35 => StoreSlice,
        36 => StoreSubscr,
        37 => ToBool,
        38 => UnaryInvert,
        39 => UnaryNegative,
        40 => UnaryNot,
        41 => WithExceptStart,
        42 => BinaryOp,
        43 => BuildConstKeyMap,
        44 => BuildList,
        45 => BuildMap,
        46 => BuildSet,
        47 => BuildSlice,
        48 => BuildString,
        49 => BuildTuple,
        50 => Call,
        51 => CallFunctionEx,
        52 => CallIntrinsic1,
        53 => CallIntrinsic2,
        54 => CallKw,
        55 => CompareOp,
        56 => ContainsOp,
        57 => ConvertValue,
        58 => Copy,
        59 => CopyFreeVars,
        60 => DeleteAttr,
        61 => DeleteDeref,
        62 => DeleteFast,
        63 => DeleteGlobal,
        64 => DeleteName,
        65 => DictMerge,
        66 => DictUpdate,
        70 => ForIter,
        72 => GetAwaitable,
        73 => ImportFrom,
        74 => ImportName,
        75 => IsOp,
        76 => JumpBackward,
        77 => JumpBackwardNoInterrupt,
        78 => JumpForward,
        79 => ListAppend,
        80 => ListExtend,
        81 => LoadAttr,
        82 => LoadCommonConstant,
        83 => LoadConst,
        84 => LoadDeref,
        85 => LoadFast,
        86 => LoadFastAndClear,
        87 => LoadFastCheck,
        88 => LoadFastLoadFast,
        90 => LoadGlobal,
        91 => LoadName,
        92 => LoadSmallInt,
        93 => LoadSpecial,
        94 => LoadSuperAttr,
        95 => MakeCell,
        96 => MapAdd,
        97 => MatchClass,
        98 => PopJumpIfFalse,
        99 => PopJumpIfNone,
        100 => PopJumpIfNotNone,
        101 => PopJumpIfTrue,
        102 => RaiseVarargs,
        103 => Reraise,
        104 => Send,
        105 => SetAdd,
        106 => SetFunctionAttribute,
        107 => SetUpdate,
        108 => StoreAttr,
        109 => StoreDeref,
        110 => StoreFast,
        111 => StoreFastLoadFast,
        112 => StoreGlobal,
        113 => StoreName,
        114 => Swap,
        115 => UnpackEx,
        116 => UnpackSequence,
        117 => YieldValue,
        118 => ExtendedArg,
        149 => Resume,
        _ => return None,
    })
}

use std::{error, fmt};

use crate::decode::DecodeError;

/// Location captured at the deepest frame when a fatal error is raised.
///
/// Nested decompilations propagate the original context unchanged, so the
/// caller always sees the innermost code object that failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// `co_name` of the code object being decompiled
    pub code_name: String,
    pub block: Option<u32>,
    pub offset: Option<u32>,
    pub opcode: Option<&'static str>,
}

impl ErrorContext {
    #[must_use]
    pub fn new(code_name: &str) -> Self {
        Self {
            code_name: code_name.to_owned(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn at(mut self, block: u32, offset: u32, opcode: &'static str) -> Self {
        self.block = Some(block);
        self.offset = Some(offset);
        self.opcode = Some(opcode);
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in `{}`", self.code_name)?;
        if let Some(block) = self.block {
            write!(f, ", block {block}")?;
        }
        if let Some(offset) = self.offset {
            write!(f, ", offset {offset}")?;
        }
        if let Some(opcode) = self.opcode {
            write!(f, " ({opcode})")?;
        }
        Ok(())
    }
}

/// Fatal errors surfaced to the caller of [`crate::Decompiler`].
///
/// Recoverable conditions (a stack underflow inside one block, a
/// comprehension that cannot be pieced together) stay inside the driver,
/// which degrades the affected statement and keeps going; they never
/// reach this type.
#[derive(Debug, Clone)]
pub enum DecompileError {
    /// Malformed bytecode rejected by the decoder. Fatal for the affected
    /// code object.
    InvalidBytecode(DecodeError),
    /// Structured reconstruction of a nested region failed fatally.
    InvalidBlock(ErrorContext),
    /// Internal invariant violation: a traversal worklist drained before
    /// covering every reachable block.
    UnexpectedEmptyWorklist(ErrorContext),
}

impl DecompileError {
    /// The context captured at first throw, if the error carries one.
    #[must_use]
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::InvalidBytecode(_) => None,
            Self::InvalidBlock(ctx) | Self::UnexpectedEmptyWorklist(ctx) => Some(ctx),
        }
    }
}

impl fmt::Display for DecompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBytecode(err) => err.fmt(f),
            Self::InvalidBlock(ctx) => write!(f, "unable to reconstruct block {ctx}"),
            Self::UnexpectedEmptyWorklist(ctx) => {
                write!(f, "worklist drained unexpectedly {ctx}")
            }
        }
    }
}

impl error::Error for DecompileError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::InvalidBytecode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DecodeError> for DecompileError {
    fn from(err: DecodeError) -> Self {
        Self::InvalidBytecode(err)
    }
}

//! Python bytecode decompiler core
//!
//! Lifts a decoded code object (2.7 through 3.14) into a typed source
//! AST: decode → control-flow graph → dominators → pattern recognition →
//! symbolic stack simulation → statement emission. Container parsing and
//! source formatting live outside this crate.

/// Source AST produced by the driver
pub mod ast;
/// Basic blocks and edges
pub mod cfg;
/// Code-object input model
pub mod code;
/// Instruction decoding
pub mod decode;
/// Dominator and post-dominator analysis
pub mod dom;
mod driver;
/// Error kinds and contexts
pub mod error;
/// Canonical opcode tables
pub mod opcodes;
/// Control-flow pattern recognition
pub mod patterns;
/// Symbolic operand stack
pub mod stack;
mod version;

pub use self::ast::Module;
pub use self::cfg::Cfg;
pub use self::code::{CodeFlags, CodeObject, Const, ExceptionEntry};
pub use self::decode::{decode, decode_all, validate, Instruction};
pub use self::driver::{decompile_module, Decompiler};
pub use self::error::{DecompileError, ErrorContext};
pub use self::opcodes::{cache_entries, has_arg, opcode_of, Opcode};
pub use self::version::Version;

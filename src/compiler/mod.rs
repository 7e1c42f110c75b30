//! Compiler handles and the build pipeline.
//!
//! # Example
//! ```ignore
//! use paravirt_compiler::compiler::{CompilerHandle, CreateArgs};
//!
//! let providers = paravirt_compiler::resolve()?;
//! let mut compiler = CompilerHandle::create(providers, CreateArgs::Legacy)?;
//! let reply = compiler.build(&options, flags, module)?;
//! let metallib = compiler.reply_bytes();
//! compiler.release_reply();
//! ```

pub mod handle;
mod pipeline;
pub mod reply;

pub use handle::{CompilerHandle, CreateArgs, TargetInfo, TARGET_INFO_SIZE};
pub use reply::BuildReply;

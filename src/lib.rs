//! Paravirtualized GPU compiler bridge.
//!
//! A guest that has to produce GPU-executable code, but has no compiler
//! toolchain of its own, sends its IR module and build options to this shim.
//! The shim runs where the toolchain is installed, resolves the toolchain's
//! libraries at runtime, and proxies the compile: downgrade the module, wrap
//! it as a shared module, extract the requested functions, assemble them
//! into an executable library, and hand back the serialized bytes.
//!
//! # Primary Usage
//!
//! ```ignore
//! use paravirt_compiler::compiler::{CompilerHandle, CreateArgs};
//!
//! let providers = paravirt_compiler::resolve()?;
//! let mut compiler = CompilerHandle::create(providers, CreateArgs::Legacy)?;
//! let reply = compiler.build(&options, flags, module)?;
//! send_to_guest(compiler.reply_bytes().unwrap());
//! compiler.release_reply();
//! ```
//!
//! # Architecture
//!
//! - [`symbols`] - Capability catalog and the resolved symbol table
//! - [`provider`] - Capability-provider traits and their native implementation
//! - [`compiler`] - Compiler handles, the build pipeline, reply tracking
//! - [`ffi`] - The `AppleParavirtCompiler` C entry points
//! - [`core`] - Errors and configuration

pub mod bridge;
pub mod compiler;
pub mod core;
pub mod ffi;
pub mod provider;
pub mod symbols;

pub use bridge::{install, providers, resolve, resolve_with};
pub use compiler::{BuildReply, CompilerHandle, CreateArgs, TargetInfo};
pub use crate::core::{
    BridgeConfig, BuildError, ConfigError, ConstructorAbi, CreateError, ProviderError,
    ResolveError,
};
pub use provider::{GpuCompilerServices, IrServices, ModuleRef, OutputSlot, Providers};
pub use symbols::{Capability, Provider, SymbolTable};

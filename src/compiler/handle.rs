// This module provides CompilerHandle, the owning wrapper around one native GPU compiler
// instance. A handle is only obtainable through `create`, which checks the request
// against the constructor ABI fixed at resolution time and validates versioned target
// info (exactly eight bytes) before the provider is ever called; there is no empty or
// default handle. Dropping the handle releases its outstanding reply and then destroys
// the native instance exactly once. Builds take `&mut self`, so a single handle cannot be
// driven from two places at once, and each handle tracks at most one outstanding reply:
// starting a new build disposes the previous unreleased buffer. The last build error is
// kept as a C string so the C boundary can hand out a pointer that stays valid until the
// reply is released.

//! Compiler handle lifecycle and reply tracking.

use std::ffi::{CStr, CString};
use std::fmt;
use std::sync::Arc;

use super::pipeline;
use super::reply::{BuildReply, OutstandingReply};
use crate::core::{BuildError, BuildResult, ConstructorAbi, CreateError};
use crate::provider::{CompilerInstanceRef, GpuCompilerServices, ModuleRef, Providers};

/// Required size of versioned target info.
pub const TARGET_INFO_SIZE: usize = 8;

/// Opaque 8-byte token describing the target host/ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetInfo([u8; TARGET_INFO_SIZE]);

impl TargetInfo {
    pub const fn new(bytes: [u8; TARGET_INFO_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CreateError> {
        let bytes: [u8; TARGET_INFO_SIZE] =
            bytes.try_into().map_err(|_| CreateError::InvalidTargetInfoSize {
                expected: TARGET_INFO_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; TARGET_INFO_SIZE] {
        &self.0
    }
}

impl TryFrom<&[u8]> for TargetInfo {
    type Error = CreateError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}

/// Constructor arguments for the two ABI variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateArgs<'a> {
    Legacy,
    Versioned(&'a [u8]),
}

impl CreateArgs<'_> {
    pub fn abi(&self) -> ConstructorAbi {
        match self {
            CreateArgs::Legacy => ConstructorAbi::Legacy,
            CreateArgs::Versioned(_) => ConstructorAbi::Versioned,
        }
    }
}

/// Native compiler instance, destroyed on drop.
struct CompilerInstance {
    gpu: Arc<dyn GpuCompilerServices>,
    raw: CompilerInstanceRef,
}

impl Drop for CompilerInstance {
    fn drop(&mut self) {
        log::debug!("Destroying GPU compiler {:?}", self.raw);
        self.gpu.destroy_compiler(self.raw);
    }
}

/// One native compiler instance plus its outstanding reply.
pub struct CompilerHandle {
    providers: Providers,
    instance: CompilerInstance,
    reply: Option<OutstandingReply>,
    last_error: Option<CString>,
}

impl CompilerHandle {
    /// Construct a compiler through the provider's active constructor.
    ///
    /// Fails without calling the provider when the target info is not
    /// [`TARGET_INFO_SIZE`] bytes or `args` is for the other ABI variant.
    pub fn create(providers: &Providers, args: CreateArgs<'_>) -> Result<Self, CreateError> {
        let target_info = match args {
            CreateArgs::Legacy => None,
            CreateArgs::Versioned(bytes) => Some(TargetInfo::from_bytes(bytes)?),
        };

        let active = providers.constructor_abi();
        if active != args.abi() {
            return Err(CreateError::AbiMismatch {
                active,
                requested: args.abi(),
            });
        }

        let gpu = &providers.gpu;
        let raw = match target_info {
            None => gpu.create_compiler(),
            Some(info) => gpu.create_compiler_for_target(info.as_bytes()),
        }
        .ok_or(CreateError::ProviderRejected)?;
        log::debug!("Created GPU compiler {:?} ({} ABI)", raw, active);

        Ok(Self {
            providers: providers.clone(),
            instance: CompilerInstance {
                gpu: Arc::clone(gpu),
                raw,
            },
            reply: None,
            last_error: None,
        })
    }

    /// Compile `module` and keep the serialized result as this handle's reply.
    ///
    /// An unreleased reply from an earlier build is disposed first. On
    /// failure every intermediate object has been released and the error is
    /// also available from [`CompilerHandle::last_error`].
    pub fn build(&mut self, options: &[u8], flags: u32, module: ModuleRef) -> BuildResult<BuildReply> {
        if self.reply.is_some() {
            log::warn!("Build issued with an unreleased reply; releasing it");
        }
        self.release_reply();

        match pipeline::run(&self.providers, options, flags, module) {
            Ok(outstanding) => {
                let reply = outstanding.reply;
                self.reply = Some(outstanding);
                Ok(reply)
            }
            Err(err) => {
                log::debug!("Build failed: {}", err);
                self.last_error = Some(error_message(&err.to_string()));
                Err(err)
            }
        }
    }

    /// Record a request rejected before it reached the pipeline.
    pub(crate) fn reject(&mut self, err: BuildError) -> BuildError {
        self.release_reply();
        log::error!("Build request rejected: {}", err);
        self.last_error = Some(error_message(&err.to_string()));
        err
    }

    /// Dispose the outstanding reply, if any, and clear the last error.
    pub fn release_reply(&mut self) {
        if let Some(outstanding) = self.reply.take() {
            log::trace!("Releasing {:?}", outstanding.buffer);
        }
        self.last_error = None;
    }

    pub fn has_outstanding_reply(&self) -> bool {
        self.reply.is_some()
    }

    pub fn reply(&self) -> Option<BuildReply> {
        self.reply.as_ref().map(|outstanding| outstanding.reply)
    }

    /// Bytes of the outstanding reply's primary slot.
    pub fn reply_bytes(&self) -> Option<&[u8]> {
        self.reply.as_ref().map(|outstanding| {
            let primary = outstanding.reply.primary;
            // SAFETY: the buffer stays alive while `self` is borrowed.
            unsafe { std::slice::from_raw_parts(primary.as_ptr(), primary.len()) }
        })
    }

    /// Message of the most recent failed build, until released.
    pub fn last_error(&self) -> Option<&CStr> {
        self.last_error.as_deref()
    }

    pub fn constructor_abi(&self) -> ConstructorAbi {
        self.providers.constructor_abi()
    }
}

// SAFETY: the native instance and reply buffer are owned exclusively by the
// handle and only touched through `&mut self` or on drop; providers are
// `Send + Sync`.
unsafe impl Send for CompilerHandle {}

impl Drop for CompilerHandle {
    fn drop(&mut self) {
        self.release_reply();
    }
}

impl fmt::Debug for CompilerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerHandle")
            .field("instance", &self.instance.raw)
            .field("reply", &self.reply)
            .field("last_error", &self.last_error)
            .finish()
    }
}

fn error_message(message: &str) -> CString {
    CString::new(message.replace('\0', " ")).unwrap_or_default()
}

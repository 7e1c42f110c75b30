// This module defines the capability-provider interfaces the build pipeline talks to.
// Instead of handing raw function pointers around, each provider is a trait with one
// method per logical operation: IrServices for the LLVM side (module target triple,
// memory buffer contents and disposal) and GpuCompilerServices for the GPU compiler side
// (compiler instance lifecycle, module downgrade, shared module wrapping, function
// extraction, executable library assembly and serialization). Native objects cross the
// interface as typed, non-null opaque references (ModuleRef, SharedModuleRef, FunctionRef,
// LibraryRef, MemoryBufferRef, CompilerInstanceRef) so one kind cannot be passed where
// another is expected. Providers bundles both services behind Arcs; the native
// implementation lives in the `native` submodule and test stand-ins implement the same
// traits.

//! Capability-provider interfaces.

pub mod native;
pub mod options;

use std::ffi::{c_void, CStr};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::core::{ConstructorAbi, ProviderError};

macro_rules! opaque_ref {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(transparent)]
        pub struct $name(NonNull<c_void>);

        impl $name {
            /// Wrap a raw native pointer; `None` if null.
            pub fn from_raw(ptr: *mut c_void) -> Option<Self> {
                NonNull::new(ptr).map(Self)
            }

            pub fn as_raw(self) -> *mut c_void {
                self.0.as_ptr()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:p})"), self.0)
            }
        }
    };
}

opaque_ref!(
    /// Borrowed IR module. Owned by the caller; never freed by the bridge.
    ModuleRef
);
opaque_ref!(
    /// Reference-counted module wrapper from the GPU compiler.
    SharedModuleRef
);
opaque_ref!(
    /// Compiled function extracted from a shared module.
    FunctionRef
);
opaque_ref!(
    /// Executable library container.
    LibraryRef
);
opaque_ref!(
    /// Serialized library bytes.
    MemoryBufferRef
);
opaque_ref!(
    /// Native GPU compiler instance.
    CompilerInstanceRef
);

/// A (pointer, length) output pair.
///
/// The pointer is never null: an empty slot points at a dangling, aligned
/// address with length 0.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct OutputSlot {
    ptr: NonNull<u8>,
    len: usize,
}

impl OutputSlot {
    pub const fn empty() -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
        }
    }

    /// Slot over `len` bytes at `ptr`; a null pointer yields an empty slot.
    pub fn new(ptr: *const u8, len: usize) -> Self {
        match NonNull::new(ptr as *mut u8) {
            Some(ptr) => Self { ptr, len },
            None => Self::empty(),
        }
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for OutputSlot {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for OutputSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutputSlot({:p}, {})", self.ptr, self.len)
    }
}

/// IR services: module queries and memory buffer ownership.
pub trait IrServices: Send + Sync {
    /// The module's target triple, copied out of the module.
    fn module_target(&self, module: ModuleRef) -> Option<String>;

    /// Start and length of a memory buffer's contents.
    fn buffer_contents(&self, buffer: MemoryBufferRef) -> OutputSlot;

    fn dispose_buffer(&self, buffer: MemoryBufferRef);
}

/// GPU compiler services: everything from downgrade to serialization.
pub trait GpuCompilerServices: Send + Sync {
    /// Constructor signature exposed by this provider, fixed at resolution.
    fn constructor_abi(&self) -> ConstructorAbi;

    fn create_compiler(&self) -> Option<CompilerInstanceRef>;

    /// Versioned constructor; `target_info` is already size-checked.
    fn create_compiler_for_target(&self, target_info: &[u8]) -> Option<CompilerInstanceRef>;

    fn destroy_compiler(&self, compiler: CompilerInstanceRef);

    /// Names of the functions a request asks for, in request order.
    fn requested_functions(&self, options: &[u8]) -> Result<Vec<String>, ProviderError>;

    /// Rewrite `module` in place to `version`.
    fn downgrade_module(&self, module: ModuleRef, version: u64) -> Result<(), ProviderError>;

    fn make_shared_module(&self, module: ModuleRef) -> Option<SharedModuleRef>;

    fn dispose_shared_module(&self, shared: SharedModuleRef);

    fn create_function(&self, shared: SharedModuleRef, name: &CStr) -> Option<FunctionRef>;

    /// Drop the caller's reference to an extracted function.
    fn release_function(&self, function: FunctionRef);

    fn create_library(&self, triple: &CStr) -> Option<LibraryRef>;

    fn insert_function(&self, library: LibraryRef, function: FunctionRef);

    fn destroy_library(&self, library: LibraryRef);

    fn write_library(&self, library: LibraryRef) -> Option<MemoryBufferRef>;

    /// Additional output pairs produced alongside the library buffer.
    ///
    /// Forwarded to the reply verbatim; valid until the buffer is released.
    fn auxiliary_outputs(&self, _library: LibraryRef) -> [OutputSlot; 3] {
        [OutputSlot::empty(); 3]
    }
}

/// Both capability providers, shared by every compiler handle.
#[derive(Clone)]
pub struct Providers {
    pub ir: Arc<dyn IrServices>,
    pub gpu: Arc<dyn GpuCompilerServices>,
}

impl Providers {
    pub fn new(ir: Arc<dyn IrServices>, gpu: Arc<dyn GpuCompilerServices>) -> Self {
        Self { ir, gpu }
    }

    pub fn constructor_abi(&self) -> ConstructorAbi {
        self.gpu.constructor_abi()
    }
}

impl fmt::Debug for Providers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Providers")
            .field("constructor_abi", &self.constructor_abi())
            .finish_non_exhaustive()
    }
}

//! Build replies and the serialized buffer backing them.

use std::fmt;
use std::sync::Arc;

use crate::provider::{IrServices, MemoryBufferRef, OutputSlot};

/// Output of one successful build.
///
/// The slots point into memory owned by the compiler handle that produced
/// them and stay valid until that handle's reply is released, the next build
/// is issued on it, or it is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildReply {
    pub primary: OutputSlot,
    pub auxiliary: [OutputSlot; 3],
}

impl BuildReply {
    /// All four slots, primary first.
    pub fn slots(&self) -> [OutputSlot; 4] {
        [self.primary, self.auxiliary[0], self.auxiliary[1], self.auxiliary[2]]
    }
}

/// Serialized library buffer; disposed through the IR provider on drop.
pub(crate) struct ReplyBuffer {
    ir: Arc<dyn IrServices>,
    buffer: MemoryBufferRef,
}

impl ReplyBuffer {
    pub(crate) fn new(ir: Arc<dyn IrServices>, buffer: MemoryBufferRef) -> Self {
        Self { ir, buffer }
    }

    pub(crate) fn contents(&self) -> OutputSlot {
        self.ir.buffer_contents(self.buffer)
    }
}

impl Drop for ReplyBuffer {
    fn drop(&mut self) {
        log::trace!("Disposing reply buffer {:?}", self.buffer);
        self.ir.dispose_buffer(self.buffer);
    }
}

impl fmt::Debug for ReplyBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReplyBuffer").field(&self.buffer).finish()
    }
}

/// A reply together with the buffer that keeps its primary slot alive.
#[derive(Debug)]
pub(crate) struct OutstandingReply {
    pub(crate) buffer: ReplyBuffer,
    pub(crate) reply: BuildReply,
}

//! Scoped handle acquisition with guaranteed, exactly-once release.
//!
//! A [`Handle`] carries a back-reference to the [`Context`](crate::context::Context)
//! it came from (via a shared, ref-counted TPM context — the Rust answer
//! to the source project's cleanup-attribute idiom) and a [`ReleaseMode`]
//! fixed at construction time, never inferred from how the handle is
//! used later. Release happens exactly once, on drop, on every exit path
//! including unwinding; release failures are logged at debug and
//! swallowed, since nothing further can be done about a handle the TPM
//! itself refuses to give up.

#![cfg(feature = "hardware-tpm")]

use std::cell::RefCell;
use std::rc::Rc;
use tss_esapi::handles::ObjectHandle;
use tss_esapi::Context as EsysContext;

/// How a handle is released when it goes out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseMode {
    /// Transient objects the engine created: `FlushContext`.
    Flush,
    /// Persistent objects and externally-referenced handles: `TR_Close`
    /// only — the object itself is untouched in the TPM.
    Close,
}

/// A TPM object handle, released exactly once when dropped.
pub struct Handle {
    context: Rc<RefCell<EsysContext>>,
    object: ObjectHandle,
    mode: ReleaseMode,
    released: bool,
}

impl Handle {
    pub(crate) fn new(
        context: Rc<RefCell<EsysContext>>,
        object: ObjectHandle,
        mode: ReleaseMode,
    ) -> Self {
        Self { context, object, mode, released: false }
    }

    /// The raw handle, for use in TPM operations.
    pub fn object(&self) -> ObjectHandle {
        self.object
    }

    /// Release early, observing the result instead of swallowing it.
    /// Subsequent drop becomes a no-op.
    pub fn release(mut self) -> tpmseal_core::Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> tpmseal_core::Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let mut ctx = self.context.borrow_mut();
        let result = match self.mode {
            ReleaseMode::Flush => ctx.flush_context(self.object),
            ReleaseMode::Close => {
                let mut object = self.object;
                ctx.tr_close(&mut object)
            }
        };
        result.map_err(|e| tpmseal_core::Error::Unrecoverable(format!("releasing TPM handle: {e}")))
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            tracing::debug!(error = %e, mode = ?self.mode, "failed to release TPM handle on drop");
        }
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("object", &self.object)
            .field("mode", &self.mode)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_mode_is_fixed_at_construction_not_inferred() {
        // A compile-time sanity check that the two modes are distinct
        // values a caller must choose explicitly.
        assert_ne!(ReleaseMode::Flush, ReleaseMode::Close);
    }
}

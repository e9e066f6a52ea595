//! Inline-or-heap payload storage.

use crate::config::{INLINE_ALIGN, INLINE_CAPACITY};
use crate::dispatch::Dispatch;
use crate::error::AnyError;
use std::alloc::{self, Layout};
use std::mem::MaybeUninit;
use std::ptr::NonNull;

#[repr(C, align(16))]
#[derive(Clone, Copy)]
pub(crate) struct InlineBuf([MaybeUninit<u8>; INLINE_CAPACITY]);

const _: () = assert!(std::mem::align_of::<InlineBuf>() == INLINE_ALIGN);

impl InlineBuf {
    fn new() -> Self {
        Self([MaybeUninit::uninit(); INLINE_CAPACITY])
    }
}

/// Raw bytes for one payload. Dropping `Heap` releases the allocation but
/// never runs the payload's destructor; the owner does that first.
pub(crate) enum Storage {
    Inline(InlineBuf),
    Heap { ptr: NonNull<u8>, layout: Layout },
}

impl Storage {
    pub(crate) fn inline() -> Self {
        Storage::Inline(InlineBuf::new())
    }

    /// Uninitialized storage suited to the type behind `dispatch`.
    pub(crate) fn for_type(dispatch: Dispatch) -> Result<Self, AnyError> {
        if dispatch.fits_inline() {
            return Ok(Self::inline());
        }
        let layout = dispatch.layout();
        if layout.size() == 0 {
            // Over-aligned zero-sized types: any aligned non-null address will do.
            let ptr = NonNull::new(std::ptr::without_provenance_mut::<u8>(layout.align())).ok_or(
                AnyError::AllocationFailure {
                    size: 0,
                    align: layout.align(),
                },
            )?;
            return Ok(Storage::Heap { ptr, layout });
        }
        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { allocate(layout) };
        let ptr = NonNull::new(raw).ok_or(AnyError::AllocationFailure {
            size: layout.size(),
            align: layout.align(),
        })?;
        log::trace!(
            "[storage] heap allocated {} bytes for `{}`",
            layout.size(),
            dispatch.descriptor()
        );
        Ok(Storage::Heap { ptr, layout })
    }

    pub(crate) fn is_inline(&self) -> bool {
        matches!(self, Storage::Inline(_))
    }

    pub(crate) fn as_ptr(&self) -> *const u8 {
        match self {
            Storage::Inline(buf) => buf.0.as_ptr().cast(),
            Storage::Heap { ptr, .. } => ptr.as_ptr(),
        }
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        match self {
            Storage::Inline(buf) => buf.0.as_mut_ptr().cast(),
            Storage::Heap { ptr, .. } => ptr.as_ptr(),
        }
    }
}

/// # Safety
/// `layout` must have a non-zero size.
unsafe fn allocate(layout: Layout) -> *mut u8 {
    #[cfg(test)]
    if tests::FAIL_NEXT_ALLOC.with(|fail| fail.replace(false)) {
        return std::ptr::null_mut();
    }
    unsafe { alloc::alloc(layout) }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if let Storage::Heap { ptr, layout } = self {
            if layout.size() != 0 {
                log::trace!("[storage] heap released {} bytes", layout.size());
                // SAFETY: allocated in `for_type` with this exact layout.
                unsafe { alloc::dealloc(ptr.as_ptr(), *layout) };
            }
        }
    }
}

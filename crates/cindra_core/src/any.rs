//! Dynamic value container.
//!
//! [`Any`] holds one value of a type chosen at the call site. Small payloads
//! live in an inline buffer, larger ones on the heap. The container stores
//! only the storage and the type's [`Dispatch`]; every lifecycle step and
//! every type query goes through that dispatch function.

use crate::dispatch::{Dispatch, Operation, TypeDescriptor};
use crate::error::{AnyError, messages};
use crate::registry::{self, RegistryId, TypeRegistry};
use crate::storage::Storage;
use std::fmt;

const EMPTY_NAME: &str = "<empty>";

pub struct Any {
    storage: Storage,
    // `None` means empty; the storage is then unused.
    dispatch: Option<Dispatch>,
}

impl Any {
    pub fn empty() -> Self {
        Self {
            storage: Storage::inline(),
            dispatch: None,
        }
    }

    /// Box `value`.
    pub fn new<T: Clone + 'static>(value: T) -> Result<Self, AnyError> {
        Self::construct(Dispatch::of::<T>(), || value)
    }

    /// Box a value built directly in the container's storage.
    pub fn new_with<T: Clone + 'static, F: FnOnce() -> T>(make: F) -> Result<Self, AnyError> {
        Self::construct(Dispatch::of::<T>(), make)
    }

    /// Box a copy of `value`, produced by the type's copy operation.
    pub fn from_ref<T: Clone + 'static>(value: &T) -> Result<Self, AnyError> {
        let dispatch = Dispatch::of::<T>();
        let mut storage = Storage::for_type(dispatch)?;
        // SAFETY: `value` is a live `T`; the storage was laid out for `T`.
        unsafe {
            dispatch.copy_construct((value as *const T).cast(), storage.as_mut_ptr())?;
        }
        Ok(Self {
            storage,
            dispatch: Some(dispatch),
        })
    }

    /// Box a value without requiring `Clone`. Copyability belongs to the
    /// type: the result copies if `T` has been boxed through a `Clone`-bounded
    /// constructor, and fails with [`AnyError::NotCopyable`] otherwise.
    pub fn new_unique<T: 'static>(value: T) -> Result<Self, AnyError> {
        Self::construct(Dispatch::unique::<T>(), || value)
    }

    fn construct<T: 'static, F: FnOnce() -> T>(
        dispatch: Dispatch,
        make: F,
    ) -> Result<Self, AnyError> {
        // First use registers the type; running out of ids aborts here.
        registry::id_of::<T>();
        let mut storage = Storage::for_type(dispatch)?;
        // SAFETY: the storage is uninitialized and laid out for `T`.
        unsafe { storage.as_mut_ptr().cast::<T>().write(make()) };
        Ok(Self {
            storage,
            dispatch: Some(dispatch),
        })
    }

    fn live(&self) -> Result<Dispatch, AnyError> {
        self.dispatch
            .ok_or(AnyError::InvalidState(messages::EMPTY_CONTAINER))
    }

    fn live_operand(&self) -> Result<Dispatch, AnyError> {
        self.dispatch
            .ok_or(AnyError::InvalidState(messages::EMPTY_OPERAND))
    }

    /// Copy the held value into a new container.
    pub fn try_clone(&self) -> Result<Self, AnyError> {
        let dispatch = self.live()?;
        let mut storage = Storage::for_type(dispatch)?;
        // SAFETY: source is the live payload, destination fresh storage of
        // the same type.
        unsafe { dispatch.copy_construct(self.storage.as_ptr(), storage.as_mut_ptr())? };
        Ok(Self {
            storage,
            dispatch: Some(dispatch),
        })
    }

    /// Move the held value into a new container, leaving this one empty.
    ///
    /// Heap payloads change owner without touching the value; inline payloads
    /// go through the type's move operation.
    pub fn take(&mut self) -> Self {
        let Some(dispatch) = self.dispatch.take() else {
            return Self::empty();
        };
        if !self.storage.is_inline() {
            let storage = std::mem::replace(&mut self.storage, Storage::inline());
            return Self {
                storage,
                dispatch: Some(dispatch),
            };
        }
        let mut storage = Storage::inline();
        // SAFETY: the source is a live inline payload and the destination an
        // inline buffer for the same type. Moves of Rust values cannot fail
        // once both pointers are non-null.
        let _ = unsafe { dispatch.move_construct(self.storage.as_mut_ptr(), storage.as_mut_ptr()) };
        Self {
            storage,
            dispatch: Some(dispatch),
        }
    }

    /// Destroy the held value, if any.
    pub fn reset(&mut self) {
        if let Some(dispatch) = self.dispatch.take() {
            // SAFETY: the payload is live; the dispatch pointer is already
            // cleared so it cannot be destroyed twice.
            unsafe { dispatch.destruct(self.storage.as_mut_ptr()) };
            self.storage = Storage::inline();
        }
    }

    /// Destroy the held value and box `value` instead.
    pub fn replace<T: Clone + 'static>(&mut self, value: T) -> Result<(), AnyError> {
        let next = Self::new(value)?;
        *self = next;
        Ok(())
    }

    /// Copy-assign from `other`. Values of the same type are assigned in
    /// place; otherwise the current value is replaced by a copy.
    pub fn assign(&mut self, other: &Any) -> Result<(), AnyError> {
        let source = other.live_operand()?;
        if let Some(dispatch) = self.dispatch {
            if dispatch.type_id() == source.type_id() {
                // SAFETY: both payloads are live values of the same type.
                return unsafe {
                    dispatch.assign_copy(other.storage.as_ptr(), self.storage.as_mut_ptr())
                };
            }
        }
        let copy = other.try_clone()?;
        *self = copy;
        Ok(())
    }

    /// Move-assign from `other`, which is left empty.
    pub fn assign_move(&mut self, other: &mut Any) -> Result<(), AnyError> {
        let Some(source) = other.dispatch else {
            self.reset();
            return Ok(());
        };
        if let Some(dispatch) = self.dispatch {
            if dispatch.type_id() == source.type_id()
                && self.storage.is_inline()
                && other.storage.is_inline()
            {
                other.dispatch = None;
                // SAFETY: both payloads are live inline values of the same
                // type; the source is dead afterwards and no longer tracked.
                return unsafe {
                    dispatch.assign_move(other.storage.as_mut_ptr(), self.storage.as_mut_ptr())
                };
            }
        }
        *self = other.take();
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.dispatch.is_none()
    }

    /// Registry id of the held type.
    pub fn type_id(&self) -> Result<RegistryId, AnyError> {
        Ok(self.live()?.type_id())
    }

    pub fn descriptor(&self) -> Result<TypeDescriptor, AnyError> {
        Ok(self.live()?.descriptor())
    }

    pub fn type_name(&self) -> Result<&'static str, AnyError> {
        Ok(self.live()?.descriptor().name())
    }

    /// Whether the payload sits in the inline buffer.
    pub fn is_inline(&self) -> Result<bool, AnyError> {
        self.live()?;
        Ok(self.storage.is_inline())
    }

    pub fn is_same<T: 'static>(&self) -> Result<bool, AnyError> {
        let held = self.type_id()?;
        // A type that was never registered cannot be held.
        Ok(TypeRegistry::global().lookup::<T>() == Some(held))
    }

    pub fn is_not_same<T: 'static>(&self) -> Result<bool, AnyError> {
        self.is_same::<T>().map(|same| !same)
    }

    /// Whether both containers hold the same type. Both must be non-empty.
    pub fn is_same_as(&self, other: &Any) -> Result<bool, AnyError> {
        let held = self.type_id()?;
        Ok(held == other.live_operand()?.type_id())
    }

    pub fn is_not_same_as(&self, other: &Any) -> Result<bool, AnyError> {
        self.is_same_as(other).map(|same| !same)
    }

    fn check_holds<T: 'static>(&self) -> Result<(), AnyError> {
        let expected = std::any::type_name::<T>();
        let Some(dispatch) = self.dispatch else {
            return Err(AnyError::TypeMismatch {
                expected,
                found: EMPTY_NAME,
            });
        };
        if TypeRegistry::global().lookup::<T>() == Some(dispatch.type_id()) {
            Ok(())
        } else {
            Err(AnyError::TypeMismatch {
                expected,
                found: dispatch.descriptor().name(),
            })
        }
    }

    pub fn downcast_ref<T: 'static>(&self) -> Result<&T, AnyError> {
        self.check_holds::<T>()?;
        // SAFETY: the held type was just checked to be `T`.
        Ok(unsafe { &*self.storage.as_ptr().cast::<T>() })
    }

    pub fn downcast_mut<T: 'static>(&mut self) -> Result<&mut T, AnyError> {
        self.check_holds::<T>()?;
        // SAFETY: as in `downcast_ref`; `&mut self` gives exclusive access.
        Ok(unsafe { &mut *self.storage.as_mut_ptr().cast::<T>() })
    }

    /// Conversion to the held type. Unlike [`cast_to`], an empty container
    /// is reported as [`AnyError::InvalidState`].
    pub fn cast<T: Clone + 'static>(&self) -> Result<T, AnyError> {
        self.live()?;
        cast_to(self)
    }

    /// Move the value out. On a type mismatch the container is handed back.
    pub fn into_inner<T: 'static>(mut self) -> Result<T, Self> {
        if self.check_holds::<T>().is_err() {
            return Err(self);
        }
        self.dispatch = None;
        // SAFETY: the payload is a live `T`; clearing the dispatch first means
        // it is never destroyed here, and dropping `self` only frees storage.
        Ok(unsafe { self.storage.as_ptr().cast::<T>().read() })
    }

    /// Run the operator in `slot` with this value as receiver.
    ///
    /// Binary operators need `rhs`, which must hold the same type.
    pub fn apply(&mut self, slot: usize, rhs: Option<&Any>) -> Result<(), AnyError> {
        let dispatch = self.live()?;
        let op = dispatch
            .operator(slot)
            .ok_or(AnyError::OperatorSlotUnregistered { slot })?;
        let rhs = match rhs {
            None => None,
            Some(other) => {
                let theirs = other.live_operand()?;
                if theirs.type_id() != dispatch.type_id() {
                    return Err(AnyError::TypeMismatch {
                        expected: dispatch.descriptor().name(),
                        found: theirs.descriptor().name(),
                    });
                }
                Some(other.storage.as_ptr())
            }
        };
        // SAFETY: both operands are live values of the type the operator was
        // registered for.
        unsafe { op.invoke(slot, self.storage.as_mut_ptr(), rhs) }
    }

    /// [`Any::apply`] addressed by an arithmetic or comparison code.
    pub fn apply_operation(&mut self, op: Operation, rhs: Option<&Any>) -> Result<(), AnyError> {
        let slot = op
            .operator_slot()
            .ok_or(AnyError::UnsupportedOperation(op.code()))?;
        self.apply(slot, rhs)
    }

    /// The held type's dispatch function.
    pub fn dispatch(&self) -> Option<Dispatch> {
        self.dispatch
    }

    /// Untyped pointer to the payload.
    pub fn as_ptr(&self) -> Option<*const u8> {
        self.dispatch.map(|_| self.storage.as_ptr())
    }
}

impl Default for Any {
    fn default() -> Self {
        Self::empty()
    }
}

impl Drop for Any {
    fn drop(&mut self) {
        self.reset();
    }
}

impl fmt::Debug for Any {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dispatch {
            Some(dispatch) => write!(f, "Any({})", dispatch.descriptor()),
            None => write!(f, "Any(empty)"),
        }
    }
}

/// Copy of the held value. Empty containers and other types are a
/// [`AnyError::TypeMismatch`].
pub fn cast_to<T: Clone + 'static>(any: &Any) -> Result<T, AnyError> {
    any.downcast_ref::<T>().cloned()
}

pub fn cast_to_ref<T: 'static>(any: &Any) -> Result<&T, AnyError> {
    any.downcast_ref::<T>()
}

pub fn cast_to_mut<T: 'static>(any: &mut Any) -> Result<&mut T, AnyError> {
    any.downcast_mut::<T>()
}

//! Per-type dispatch functions.
//!
//! Every boxed type gets exactly one monomorphized function that knows how to
//! destroy, copy, move and describe values of that type. The container keeps
//! nothing but a pointer to it; all lifecycle work is routed through the
//! function with an [`Operation`] code and untyped source and destination
//! pointers.

use crate::config;
use crate::error::{AnyError, messages};
use crate::operator::{OperatorFn, OperatorRegistry};
use crate::registry::{self, RegistryId, TypeRegistry};
use std::alloc::Layout;
use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr;

/// Operation codes understood by a dispatch function.
///
/// The arithmetic and comparison codes name operator slots. They are never
/// executed by the dispatch function itself; see [`Operation::operator_slot`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Destruct,
    Move,
    Copy,
    AssignCopy,
    AssignMove,
    Plus,
    Minus,
    Multiply,
    Divide,
    PlusAssign,
    MinusAssign,
    MultiplyAssign,
    DivideAssign,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Cast,
    Id,
    RuntimeType,
    InlineEligible,
    SizeOf,
    AlignOf,
    Register,
}

impl Operation {
    pub const ALL: [Operation; 26] = [
        Operation::Destruct,
        Operation::Move,
        Operation::Copy,
        Operation::AssignCopy,
        Operation::AssignMove,
        Operation::Plus,
        Operation::Minus,
        Operation::Multiply,
        Operation::Divide,
        Operation::PlusAssign,
        Operation::MinusAssign,
        Operation::MultiplyAssign,
        Operation::DivideAssign,
        Operation::Equal,
        Operation::NotEqual,
        Operation::Less,
        Operation::LessEqual,
        Operation::Greater,
        Operation::GreaterEqual,
        Operation::Cast,
        Operation::Id,
        Operation::RuntimeType,
        Operation::InlineEligible,
        Operation::SizeOf,
        Operation::AlignOf,
        Operation::Register,
    ];

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Result<Self, AnyError> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or(AnyError::UnsupportedOperation(code))
    }

    /// Operator slot conventionally used for an arithmetic or comparison
    /// code (`Plus` is slot 0 through `GreaterEqual` at slot 13).
    pub fn operator_slot(self) -> Option<usize> {
        let code = self.code();
        let first = Operation::Plus.code();
        let last = Operation::GreaterEqual.code();
        (first..=last)
            .contains(&code)
            .then(|| (code - first) as usize)
    }
}

/// Signature shared by all dispatch functions: operation, source, destination
/// and an auxiliary argument (the operator slot for [`Operation::Register`]).
pub type DispatchFn = unsafe fn(Operation, *mut u8, *mut u8, usize) -> Result<(), AnyError>;

/// Diagnostic handle for a type. Equality follows the type, not the name.
#[derive(Clone, Copy, Debug)]
pub struct TypeDescriptor {
    type_id: TypeId,
    name: &'static str,
}

impl TypeDescriptor {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Type-erased clone of one type, recorded in the type registry the first
/// time the type is boxed through a `Clone`-bounded constructor.
#[derive(Clone, Copy)]
pub(crate) struct CopyFns {
    construct: unsafe fn(*const u8, *mut u8),
    assign: unsafe fn(*const u8, *mut u8),
}

impl CopyFns {
    pub(crate) fn of<T: Clone>() -> Self {
        Self {
            construct: clone_construct::<T>,
            assign: clone_assign::<T>,
        }
    }
}

unsafe fn clone_construct<T: Clone>(src: *const u8, dst: *mut u8) {
    unsafe { dst.cast::<T>().write((*src.cast::<T>()).clone()) };
}

unsafe fn clone_assign<T: Clone>(src: *const u8, dst: *mut u8) {
    unsafe { (*dst.cast::<T>()).clone_from(&*src.cast::<T>()) };
}

fn copy_fns<T: 'static>() -> Result<CopyFns, AnyError> {
    let registry = TypeRegistry::global();
    registry
        .copy_fns(registry.id_of::<T>())
        .ok_or(AnyError::NotCopyable(std::any::type_name::<T>()))
}

fn non_null(p: *mut u8, what: &'static str) -> Result<*mut u8, AnyError> {
    if p.is_null() {
        Err(AnyError::InvalidState(what))
    } else {
        Ok(p)
    }
}

/// The dispatch function for `T`.
///
/// # Safety
/// For lifecycle operations `src` must point at a live `T` (or be null for
/// `Destruct`) and `dst` at storage laid out for `T`: uninitialized for
/// `Move`/`Copy`, live for the assignments. For report operations `dst` must
/// point at the output type documented on [`Dispatch`].
unsafe fn dispatch<T: 'static>(
    op: Operation,
    src: *mut u8,
    dst: *mut u8,
    other: usize,
) -> Result<(), AnyError> {
    let layout = Layout::new::<T>();
    match op {
        Operation::Destruct => {
            if !src.is_null() {
                unsafe { ptr::drop_in_place(src.cast::<T>()) };
            }
            Ok(())
        }
        Operation::Move => {
            let src = non_null(src, messages::NULL_SOURCE)?.cast::<T>();
            let dst = non_null(dst, messages::NULL_DESTINATION)?.cast::<T>();
            // The source is logically dead afterwards and must not be dropped.
            unsafe { dst.write(src.read()) };
            Ok(())
        }
        Operation::Copy => {
            let src = non_null(src, messages::NULL_SOURCE)?.cast_const();
            let dst = non_null(dst, messages::NULL_DESTINATION)?;
            let fns = copy_fns::<T>()?;
            unsafe { (fns.construct)(src, dst) };
            Ok(())
        }
        Operation::AssignCopy => {
            let src = non_null(src, messages::NULL_SOURCE)?.cast_const();
            let dst = non_null(dst, messages::NULL_DESTINATION)?;
            let fns = copy_fns::<T>()?;
            unsafe { (fns.assign)(src, dst) };
            Ok(())
        }
        Operation::AssignMove => {
            let src = non_null(src, messages::NULL_SOURCE)?.cast::<T>();
            let dst = non_null(dst, messages::NULL_DESTINATION)?.cast::<T>();
            unsafe { *dst = src.read() };
            Ok(())
        }
        Operation::InlineEligible => {
            let dst = non_null(dst, messages::NULL_DESTINATION)?;
            unsafe {
                dst.cast::<bool>()
                    .write(config::fits_inline(layout.size(), layout.align()))
            };
            Ok(())
        }
        Operation::SizeOf => {
            let dst = non_null(dst, messages::NULL_DESTINATION)?;
            unsafe { dst.cast::<usize>().write(layout.size()) };
            Ok(())
        }
        Operation::AlignOf => {
            let dst = non_null(dst, messages::NULL_DESTINATION)?;
            unsafe { dst.cast::<usize>().write(layout.align()) };
            Ok(())
        }
        Operation::Id => {
            let dst = non_null(dst, messages::NULL_DESTINATION)?;
            unsafe { dst.cast::<RegistryId>().write(registry::id_of::<T>()) };
            Ok(())
        }
        Operation::RuntimeType => {
            let dst = non_null(dst, messages::NULL_DESTINATION)?;
            unsafe { dst.cast::<TypeDescriptor>().write(TypeDescriptor::of::<T>()) };
            Ok(())
        }
        Operation::Register => {
            let dst = non_null(dst, messages::NULL_DESTINATION)?;
            let entry = OperatorRegistry::global().get(registry::id_of::<T>(), other);
            unsafe { dst.cast::<Option<OperatorFn>>().write(entry) };
            Ok(())
        }
        unsupported => Err(AnyError::UnsupportedOperation(unsupported.code())),
    }
}

/// Handle to the dispatch function of one type.
///
/// Report outputs: `InlineEligible` writes `bool`, `SizeOf`/`AlignOf` write
/// `usize`, `Id` writes [`RegistryId`], `RuntimeType` writes
/// [`TypeDescriptor`], `Register` writes `Option<OperatorFn>`.
#[derive(Clone, Copy)]
pub struct Dispatch(DispatchFn);

impl Dispatch {
    /// Dispatch for a copyable type. Registers `T` and records its clone,
    /// so copies work whichever constructor boxed the value.
    pub fn of<T: Clone + 'static>() -> Self {
        let registry = TypeRegistry::global();
        registry.record_copy(registry.id_of::<T>(), CopyFns::of::<T>());
        Self(dispatch::<T>)
    }

    /// Dispatch for `T` without requiring `Clone`. It is the same function
    /// [`Dispatch::of`] returns; copies fail with `NotCopyable` unless a
    /// clone of `T` has been recorded.
    pub fn unique<T: 'static>() -> Self {
        Self(dispatch::<T>)
    }

    /// Invoke the raw dispatch function.
    ///
    /// # Safety
    /// See the pointer contract on the operation being invoked.
    pub unsafe fn call(
        self,
        op: Operation,
        src: *mut u8,
        dst: *mut u8,
        other: usize,
    ) -> Result<(), AnyError> {
        unsafe { (self.0)(op, src, dst, other) }
    }

    fn report<R>(self, op: Operation, mut out: R, other: usize) -> R {
        // Report operations only write an `R` through `dst`; with a non-null
        // destination they cannot fail.
        let _ = unsafe { (self.0)(op, ptr::null_mut(), (&mut out as *mut R).cast(), other) };
        out
    }

    pub fn size(self) -> usize {
        self.report(Operation::SizeOf, 0usize, 0)
    }

    pub fn align(self) -> usize {
        self.report(Operation::AlignOf, 1usize, 0)
    }

    pub fn layout(self) -> Layout {
        // SAFETY: size and align were produced by `Layout::new` for a real type.
        unsafe { Layout::from_size_align_unchecked(self.size(), self.align()) }
    }

    pub fn fits_inline(self) -> bool {
        self.report(Operation::InlineEligible, false, 0)
    }

    pub fn type_id(self) -> RegistryId {
        self.report(Operation::Id, RegistryId(u16::MAX), 0)
    }

    pub fn descriptor(self) -> TypeDescriptor {
        self.report(Operation::RuntimeType, TypeDescriptor::of::<()>(), 0)
    }

    /// The operator registered in `slot` for this type, if any.
    pub fn operator(self, slot: usize) -> Option<OperatorFn> {
        self.report(Operation::Register, None, slot)
    }

    /// # Safety
    /// `ptr` must be null or point at a live value of this dispatch's type,
    /// which is dead afterwards.
    pub unsafe fn destruct(self, ptr: *mut u8) {
        let _ = unsafe { (self.0)(Operation::Destruct, ptr, ptr::null_mut(), 0) };
    }

    /// # Safety
    /// `src` points at a live value, `dst` at uninitialized storage with this
    /// type's layout.
    pub unsafe fn copy_construct(self, src: *const u8, dst: *mut u8) -> Result<(), AnyError> {
        unsafe { (self.0)(Operation::Copy, src.cast_mut(), dst, 0) }
    }

    /// # Safety
    /// As [`Dispatch::copy_construct`]; `src` is dead afterwards.
    pub unsafe fn move_construct(self, src: *mut u8, dst: *mut u8) -> Result<(), AnyError> {
        unsafe { (self.0)(Operation::Move, src, dst, 0) }
    }

    /// # Safety
    /// Both pointers address live values of this type.
    pub unsafe fn assign_copy(self, src: *const u8, dst: *mut u8) -> Result<(), AnyError> {
        unsafe { (self.0)(Operation::AssignCopy, src.cast_mut(), dst, 0) }
    }

    /// # Safety
    /// Both pointers address live values of this type; `src` is dead afterwards.
    pub unsafe fn assign_move(self, src: *mut u8, dst: *mut u8) -> Result<(), AnyError> {
        unsafe { (self.0)(Operation::AssignMove, src, dst, 0) }
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Dispatch")
            .field(&self.descriptor().name())
            .finish()
    }
}

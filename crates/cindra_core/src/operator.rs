//! Operator registry.
//!
//! Each boxed type owns a table of operator slots. A slot holds a unary
//! function (`self` only) or a binary one (`self` plus another operand of the
//! same type); a bit vector records which slots are populated so a lookup is a
//! single bit test. The container only forwards slot indices and never knows
//! which operators exist.

use crate::bitset::DynamicBitSet;
use crate::config::{self, RegistryConfig};
use crate::error::{AnyError, messages};
use crate::registry::{self, RegistryId, TypeRegistry};
use std::fmt;
use std::sync::{OnceLock, PoisonError, RwLock};

pub type UnaryFn = unsafe fn(*mut u8);
pub type BinaryFn = unsafe fn(*mut u8, *const u8);

#[derive(Clone, Copy)]
pub enum OperatorFn {
    Unary(UnaryFn),
    Binary(BinaryFn),
}

impl OperatorFn {
    pub fn arity(self) -> usize {
        match self {
            OperatorFn::Unary(_) => 1,
            OperatorFn::Binary(_) => 2,
        }
    }

    /// Call the operator, checking operands against its arity.
    ///
    /// # Safety
    /// `lhs` (and `rhs` when given) must point at live values of the type the
    /// operator was registered for.
    pub unsafe fn invoke(
        self,
        slot: usize,
        lhs: *mut u8,
        rhs: Option<*const u8>,
    ) -> Result<(), AnyError> {
        if lhs.is_null() {
            return Err(AnyError::InvalidState(messages::NULL_SOURCE));
        }
        let rhs = rhs.filter(|p| !p.is_null());
        match (self, rhs) {
            (OperatorFn::Unary(f), None) => {
                unsafe { f(lhs) };
                Ok(())
            }
            (OperatorFn::Binary(f), Some(rhs)) => {
                unsafe { f(lhs, rhs) };
                Ok(())
            }
            (op, rhs) => Err(AnyError::ArityMismatch {
                slot,
                expected: op.arity(),
                supplied: 1 + rhs.is_some() as usize,
            }),
        }
    }
}

impl fmt::Debug for OperatorFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorFn::Unary(_) => f.write_str("Unary"),
            OperatorFn::Binary(_) => f.write_str("Binary"),
        }
    }
}

/// Operator slots of one type.
#[derive(Clone, Debug)]
pub struct OperatorTable {
    mask: DynamicBitSet,
    slots: Vec<Option<OperatorFn>>,
}

impl OperatorTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            mask: DynamicBitSet::new(capacity),
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of populated slots.
    pub fn len(&self) -> usize {
        self.mask.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn contains(&self, slot: usize) -> bool {
        self.mask.test(slot)
    }

    pub fn register(&mut self, slot: usize, f: OperatorFn) -> Result<(), AnyError> {
        if slot >= self.capacity() {
            return Err(AnyError::OperatorSlotOutOfRange {
                slot,
                capacity: self.capacity(),
            });
        }
        if self.contains(slot) {
            return Err(AnyError::OperatorSlotOccupied { slot });
        }
        self.slots[slot] = Some(f);
        self.mask.set(slot);
        Ok(())
    }

    pub fn get(&self, slot: usize) -> Option<OperatorFn> {
        if !self.contains(slot) {
            return None;
        }
        self.slots.get(slot).copied().flatten()
    }

    /// # Safety
    /// See [`OperatorFn::invoke`].
    pub unsafe fn invoke(
        &self,
        slot: usize,
        lhs: *mut u8,
        rhs: Option<*const u8>,
    ) -> Result<(), AnyError> {
        let f = self
            .get(slot)
            .ok_or(AnyError::OperatorSlotUnregistered { slot })?;
        unsafe { f.invoke(slot, lhs, rhs) }
    }

    pub fn registered_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.mask.iter_ones()
    }
}

/// Operator tables of every registered type, indexed by registry id.
pub struct OperatorRegistry {
    slots_per_type: usize,
    type_capacity: usize,
    tables: RwLock<Vec<OperatorTable>>,
}

impl OperatorRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            slots_per_type: config.operator_slots,
            type_capacity: config.type_capacity,
            tables: RwLock::new(Vec::new()),
        }
    }

    pub fn global() -> &'static OperatorRegistry {
        static GLOBAL: OnceLock<OperatorRegistry> = OnceLock::new();
        GLOBAL.get_or_init(|| OperatorRegistry::new(config::current()))
    }

    pub fn slots_per_type(&self) -> usize {
        self.slots_per_type
    }

    pub fn register(&self, id: RegistryId, slot: usize, f: OperatorFn) -> Result<(), AnyError> {
        if id.index() >= self.type_capacity {
            return Err(AnyError::CapacityExceeded {
                capacity: self.type_capacity,
            });
        }
        {
            let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
            if tables.len() <= id.index() {
                let slots = self.slots_per_type;
                tables.resize_with(id.index() + 1, || OperatorTable::new(slots));
            }
            tables[id.index()].register(slot, f)?;
        }
        log::debug!("[operator] type {id} slot {slot} registered ({f:?})");
        Ok(())
    }

    pub fn get(&self, id: RegistryId, slot: usize) -> Option<OperatorFn> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id.index())
            .and_then(|table| table.get(slot))
    }

    pub fn contains(&self, id: RegistryId, slot: usize) -> bool {
        self.get(id, slot).is_some()
    }

    /// Snapshot of the table for `id`.
    pub fn table(&self, id: RegistryId) -> Option<OperatorTable> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id.index())
            .cloned()
    }
}

/// Register `f` as the unary operator in `slot` for `T`.
pub fn register_unary<T: 'static>(slot: usize, f: fn(&mut T)) -> Result<(), AnyError> {
    // SAFETY: `&mut T` and `*mut u8` are ABI-compatible pointer arguments for
    // sized `T`; the table only ever calls this with a pointer to a live `T`.
    let erased = unsafe { std::mem::transmute::<fn(&mut T), UnaryFn>(f) };
    OperatorRegistry::global().register(registry::id_of::<T>(), slot, OperatorFn::Unary(erased))
}

/// Register `f` as the binary operator in `slot` for `T`. The first argument
/// is the receiver, the second the other operand.
pub fn register_binary<T: 'static>(slot: usize, f: fn(&mut T, &T)) -> Result<(), AnyError> {
    // SAFETY: as in `register_unary`; both operands are live `T`s.
    let erased = unsafe { std::mem::transmute::<fn(&mut T, &T), BinaryFn>(f) };
    OperatorRegistry::global().register(registry::id_of::<T>(), slot, OperatorFn::Binary(erased))
}

/// Whether `T` has an operator in `slot`. Never assigns an id.
pub fn is_registered<T: 'static>(slot: usize) -> bool {
    TypeRegistry::global()
        .lookup::<T>()
        .is_some_and(|id| OperatorRegistry::global().contains(id, slot))
}

//! Core types for the Cindra runtime.
//!
//! This crate contains the dynamic value machinery:
//! - `Any` - Type-erased value container with inline small-value storage
//! - `Dispatch` - Per-type lifecycle and introspection dispatch functions
//! - `TypeRegistry` - Dense process-wide type ids
//! - `OperatorRegistry` - Per-type operator slots
//! - `DynamicBitSet` - Growable bit vector

pub mod any;
pub mod bitset;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod operator;
pub mod registry;
mod storage;

pub use any::{Any, cast_to, cast_to_mut, cast_to_ref};
pub use bitset::DynamicBitSet;
pub use config::{INLINE_ALIGN, INLINE_CAPACITY, RegistryConfig};
pub use dispatch::{Dispatch, DispatchFn, Operation, TypeDescriptor};
pub use error::AnyError;
pub use operator::{OperatorFn, OperatorRegistry, OperatorTable, register_binary, register_unary};
pub use registry::{RegistryId, TypeRegistry, id_of};

//! Capacities of the container and the process-wide registries.

use crate::error::AnyError;
use std::sync::OnceLock;

/// Bytes available for a payload stored directly inside the container.
pub const INLINE_CAPACITY: usize = 8;

/// Alignment of the inline buffer. Payloads needing more go to the heap.
pub const INLINE_ALIGN: usize = 16;

/// Whether a payload of this layout is stored inline.
#[inline]
pub const fn fits_inline(size: usize, align: usize) -> bool {
    size <= INLINE_CAPACITY && align <= INLINE_ALIGN
}

/// Registry configuration options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Maximum number of distinct types that may ever be boxed.
    pub type_capacity: usize,
    /// Operator slots available to each type.
    pub operator_slots: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            type_capacity: 32,
            operator_slots: 16,
        }
    }
}

impl RegistryConfig {
    pub fn type_capacity(mut self, capacity: usize) -> Self {
        // Registry ids are u16.
        self.type_capacity = capacity.min(u16::MAX as usize);
        self
    }

    pub fn operator_slots(mut self, slots: usize) -> Self {
        self.operator_slots = slots;
        self
    }
}

static CONFIG: OnceLock<RegistryConfig> = OnceLock::new();

/// Install the process-wide configuration.
///
/// Must run before the first value is boxed; afterwards the configuration is
/// frozen and this returns [`AnyError::AlreadyConfigured`].
pub fn configure(config: RegistryConfig) -> Result<(), AnyError> {
    let mut installed = false;
    CONFIG.get_or_init(|| {
        installed = true;
        config
    });
    if installed {
        log::debug!(
            "[config] registry capacity {} types, {} operator slots",
            config.type_capacity,
            config.operator_slots
        );
        Ok(())
    } else {
        Err(AnyError::AlreadyConfigured)
    }
}

/// The active configuration. The first call freezes the default if
/// [`configure`] was never called.
pub fn current() -> RegistryConfig {
    *CONFIG.get_or_init(RegistryConfig::default)
}

//! Lock-free primitives shared between the control side and the audio thread.

use atomic_float::{AtomicF32, AtomicF64};
use std::sync::atomic::{AtomicBool, Ordering};

macro_rules! atomic_real {
    ($(#[$meta:meta])* $name:ident, $inner:ty, $t:ty) => {
        $(#[$meta])*
        #[derive(Debug)]
        #[repr(align(64))]
        pub struct $name {
            value: $inner,
        }

        impl $name {
            pub fn new(value: $t) -> Self {
                Self {
                    value: <$inner>::new(value),
                }
            }

            #[inline]
            pub fn get(&self) -> $t {
                self.value.load(Ordering::Acquire)
            }

            #[inline]
            pub fn get_relaxed(&self) -> $t {
                self.value.load(Ordering::Relaxed)
            }

            #[inline]
            pub fn set(&self, value: $t) {
                self.value.store(value, Ordering::Release);
            }

            #[inline]
            pub fn swap(&self, value: $t) -> $t {
                self.value.swap(value, Ordering::AcqRel)
            }

            /// Raise the stored value to `value` if larger. Returns the previous value.
            #[inline]
            pub fn fetch_max(&self, value: $t) -> $t {
                self.value.fetch_max(value, Ordering::AcqRel)
            }

            #[inline]
            pub fn fetch_add(&self, value: $t) -> $t {
                self.value.fetch_add(value, Ordering::AcqRel)
            }
        }

        impl Clone for $name {
            fn clone(&self) -> Self {
                Self::new(self.get())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new(0.0)
            }
        }
    };
}

atomic_real!(
    /// Cache-line aligned atomic f32. Used for meter ports and tempo.
    AtomicFloat,
    AtomicF32,
    f32
);

atomic_real!(
    /// Cache-line aligned atomic f64.
    AtomicDouble,
    AtomicF64,
    f64
);

/// Cache-line aligned atomic bool.
#[derive(Debug, Default)]
#[repr(align(64))]
pub struct AtomicFlag {
    value: AtomicBool,
}

impl AtomicFlag {
    pub fn new(value: bool) -> Self {
        Self {
            value: AtomicBool::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: bool) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: bool) -> bool {
        self.value.swap(value, Ordering::AcqRel)
    }
}

impl Clone for AtomicFlag {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

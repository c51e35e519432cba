//! Shared value handles passed between stages.
//!
//! Deliveries move [`Shared<T>`] handles rather than owned values, so a
//! stage can mutate its input in place while the caller (and, in a
//! broadcast group, every other registrant) observes the change through
//! its own handle. `clone` aliases the handle; [`Shared::deep_copy`] is
//! the isolating duplication used by broadcast copy mode.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

/// A shared, interior-mutable handle to a pipeline value.
pub struct Shared<T>(Rc<RefCell<T>>);

impl<T> Shared<T> {
    /// Wrap a value in a fresh handle.
    pub fn new(value: T) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    /// Immutably borrow the value.
    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.borrow()
    }

    /// Mutably borrow the value.
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }

    /// Whether two handles alias the same value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Duplicate the value into an independent handle.
    pub fn deep_copy(&self) -> Self
    where
        T: Clone,
    {
        Self::new(self.0.borrow().clone())
    }

    /// Recover the value if this is the last handle to it.
    pub fn try_unwrap(self) -> Result<T, Self> {
        Rc::try_unwrap(self.0).map(RefCell::into_inner).map_err(Self)
    }
}

/// Aliasing clone: both handles refer to the same value.
impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T> From<T> for Shared<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(value) => value.fmt(f),
            Err(_) => f.write_str("<borrowed>"),
        }
    }
}

impl<T: PartialEq> PartialEq for Shared<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0.borrow() == *other.0.borrow()
    }
}

impl<T: Eq> Eq for Shared<T> {}

#[cfg(feature = "serde")]
impl<T: serde::Serialize> serde::Serialize for Shared<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.borrow().serialize(serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de, T: serde::Deserialize<'de>> serde::Deserialize<'de> for Shared<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Self::new)
    }
}

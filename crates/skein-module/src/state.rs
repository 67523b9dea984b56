//! Explicit per-module state carried through the lifecycle.
//!
//! A module that needs to remember something between phases (a file name
//! computed in `initialize`, an accumulator read in `finalize`) stores it
//! here instead of in a global. `initialize` sets it, `main` reads it
//! through a shared reference, `finalize` may take it back by value.

use std::any::Any;
use std::fmt;

/// Type-erased slot for one value of module-defined type.
#[derive(Default)]
pub struct ModuleState {
    value: Option<Box<dyn Any + Send + Sync>>,
}

impl ModuleState {
    /// Empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value`, replacing any previous value.
    pub fn set<T: Any + Send + Sync>(&mut self, value: T) {
        self.value = Some(Box::new(value));
    }

    /// Borrow the stored value if it has type `T`.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.value.as_ref().and_then(|v| v.downcast_ref::<T>())
    }

    /// Remove and return the stored value if it has type `T`.
    ///
    /// A value of a different type is left in place.
    pub fn take<T: Any>(&mut self) -> Option<T> {
        match self.value.take()?.downcast::<T>() {
            Ok(v) => Some(*v),
            Err(other) => {
                self.value = Some(other);
                None
            }
        }
    }

    /// Whether a value is stored.
    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Drop the stored value.
    pub fn clear(&mut self) {
        self.value = None;
    }
}

impl fmt::Debug for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleState")
            .field("is_set", &self.is_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_take_round_trip() {
        let mut s = ModuleState::new();
        assert!(!s.is_set());
        s.set(String::from("euler"));
        assert_eq!(s.get::<String>().map(String::as_str), Some("euler"));
        assert_eq!(s.take::<String>(), Some("euler".to_string()));
        assert!(!s.is_set());
    }

    #[test]
    fn wrong_type_is_left_in_place() {
        let mut s = ModuleState::new();
        s.set(42u32);
        assert!(s.get::<i64>().is_none());
        assert!(s.take::<i64>().is_none());
        assert_eq!(s.get::<u32>(), Some(&42));
    }
}

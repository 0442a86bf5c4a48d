//! Fuzzy key model.
//!
//! A fuzzy key is a user-defined value that reports a similarity score in
//! `[0, 1]` against another key of the same *fuzzy type*, or signals that
//! the comparison does not apply. Fuzzy keys are hashed by identity: two
//! distinct instances never compare equal as keys, even if they carry the
//! same data. The fuzzy type is the key's concrete Rust type, recovered at
//! runtime through [`std::any::Any`] rather than a hand-assigned tag.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::error::CorrelateError;

/// A user-supplied similarity oracle for one family of keys.
///
/// Implementors compare themselves against another key of a type they
/// recognize. Returning `None` signals "not applicable"; the engine then
/// tries the comparison with arguments swapped before falling back to a
/// similarity of zero. `compare` is never called with `other` pointing at
/// `self` (the engine short-circuits identical keys to a similarity of
/// `1.0` without invoking user code).
pub trait FuzzyKey: Any + fmt::Debug {
    /// Compare against another fuzzy key. Return `Some(similarity)` with
    /// `similarity` in `[0, 1]`, or `None` if this key cannot judge the
    /// other one (for example, because `other` is not the type this key
    /// expects).
    fn compare(&self, other: &dyn FuzzyKey) -> Option<f64>;
}

/// A reference-counted, type-erased fuzzy key, shareable across multiple
/// `Dataset::set_fuzzy` calls for the same logical key instance.
#[derive(Clone)]
pub struct FuzzyKeyHandle(Rc<dyn FuzzyKey>);

impl FuzzyKeyHandle {
    pub fn new<T: FuzzyKey + 'static>(key: T) -> Self {
        Self(Rc::new(key))
    }

    /// The fuzzy type this key belongs to (keys only compare within the
    /// same type).
    #[must_use]
    pub fn fuzzy_type(&self) -> TypeId {
        (*self.0).type_id()
    }

    /// Identity of this specific key instance, stable for the lifetime of
    /// the `Rc` and unique per instance regardless of the data it carries.
    #[must_use]
    pub fn id(&self) -> FuzzyKeyId {
        FuzzyKeyId {
            ptr: Rc::as_ptr(&self.0).cast::<()>() as usize,
            ty: self.fuzzy_type(),
        }
    }

    /// Symmetric comparison: tries `self.compare(other)`, then
    /// `other.compare(self)`, defaulting to zero if neither applies.
    /// Identical instances short-circuit to `1.0`. Errors if a `compare`
    /// implementation returns a value outside `[0, 1]`.
    pub fn similarity(&self, other: &Self) -> Result<f64, CorrelateError> {
        if self.id() == other.id() {
            return Ok(1.0);
        }
        let raw = self
            .0
            .compare(other.0.as_ref())
            .or_else(|| other.0.compare(self.0.as_ref()));
        match raw {
            None => Ok(0.0),
            Some(s) if (0.0..=1.0).contains(&s) => Ok(s),
            Some(s) => Err(CorrelateError::invalid_argument(format!(
                "fuzzy compare() returned {s}, expected a value in [0, 1]"
            ))),
        }
    }
}

impl fmt::Debug for FuzzyKeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// Stable identity for a [`FuzzyKeyHandle`], suitable for use as a hash map
/// key. Two handles compare equal iff they wrap the same underlying
/// instance.
#[derive(Clone, Copy)]
pub struct FuzzyKeyId {
    ptr: usize,
    ty: TypeId,
}

impl PartialEq for FuzzyKeyId {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr && self.ty == other.ty
    }
}

impl Eq for FuzzyKeyId {}

impl Hash for FuzzyKeyId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr.hash(state);
        self.ty.hash(state);
    }
}

impl fmt::Debug for FuzzyKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FuzzyKeyId({:#x})", self.ptr)
    }
}

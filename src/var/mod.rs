mod holders;
mod payload;

use std::any::{Any, TypeId};
use std::fmt;

use crate::pool::{Handle, PoolError};

pub use holders::{live_holders, HOLDER_CAPACITY};
pub use payload::{
    fx_hash, null_hash, Boolean, Capability, Character, Floating, Integer, Literal, Payload,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VarError {
    #[error("access to an unusable (null) value")]
    Unusable,
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: &'static str },
    #[error("type '{type_name}' does not support {capability}")]
    MissingCapability { type_name: &'static str, capability: Capability },
    #[error("{type_name} holders: {source}")]
    Pool { type_name: &'static str, source: PoolError },
}

pub type VarResult<T> = Result<T, VarError>;

// ── Holder ───────────────────────────────────────────────────────────

trait Holder {
    fn payload_type(&self) -> TypeId;
    fn payload_name(&self) -> &'static str;
    fn duplicate(&self) -> VarResult<Box<dyn Holder>>;
    fn equals(&self, other: &dyn Holder) -> VarResult<bool>;
    fn hash_code(&self) -> VarResult<u64>;
    fn stringify(&self) -> VarResult<String>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A payload together with the slot it occupies in its type's holder pool.
struct TypedHolder<T: Payload> {
    value: T,
    slot: Handle<T>,
}

impl<T: Payload> TypedHolder<T> {
    fn new(value: T) -> VarResult<Box<dyn Holder>> {
        let slot = holders::acquire::<T>().map_err(|source| VarError::Pool { type_name: T::TYPE_NAME, source })?;
        let holder: Box<dyn Holder> = Box::new(TypedHolder { value, slot });
        Ok(holder)
    }

    fn missing(&self, capability: Capability) -> VarError {
        VarError::MissingCapability { type_name: T::TYPE_NAME, capability }
    }
}

impl<T: Payload> Holder for TypedHolder<T> {
    fn payload_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn payload_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn duplicate(&self) -> VarResult<Box<dyn Holder>> {
        TypedHolder::new(self.value.clone())
    }

    fn equals(&self, other: &dyn Holder) -> VarResult<bool> {
        // Differing types are unequal without consulting the capability.
        let Some(other) = other.as_any().downcast_ref::<TypedHolder<T>>() else {
            return Ok(false);
        };
        self.value.payload_eq(&other.value).ok_or_else(|| self.missing(Capability::Equality))
    }

    fn hash_code(&self) -> VarResult<u64> {
        self.value.payload_hash().ok_or_else(|| self.missing(Capability::Hashing))
    }

    fn stringify(&self) -> VarResult<String> {
        self.value.payload_to_string().ok_or_else(|| self.missing(Capability::ToString))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<T: Payload> Drop for TypedHolder<T> {
    fn drop(&mut self) {
        holders::release(self.slot);
    }
}

// ── Var ──────────────────────────────────────────────────────────────

/// A dynamically typed value.
///
/// A `Var` owns at most one payload, kept in a holder drawn from the
/// payload type's pool ([`HOLDER_CAPACITY`] slots per type); dropping or
/// reassigning the `Var` returns the holder. The default `Var` holds nothing
/// and is called unusable or null: it equals only other nulls, hashes to
/// [`null_hash`], and prints as `"Null"`. Copies are deep.
#[derive(Default)]
pub struct Var {
    holder: Option<Box<dyn Holder>>,
}

impl Var {
    pub fn null() -> Self {
        Var { holder: None }
    }

    /// Fails with [`VarError::Pool`] when every holder of `T` is in use.
    pub fn make<T: Payload>(value: T) -> VarResult<Self> {
        Ok(Var { holder: Some(TypedHolder::new(value)?) })
    }

    pub fn is_usable(&self) -> bool {
        self.holder.is_some()
    }

    pub fn type_tag(&self) -> Option<TypeId> {
        self.holder.as_ref().map(|h| h.payload_type())
    }

    pub fn type_name(&self) -> &'static str {
        self.holder.as_ref().map_or("null", |h| h.payload_name())
    }

    pub fn is<T: Payload>(&self) -> bool {
        self.type_tag() == Some(TypeId::of::<T>())
    }

    /// Deep copy into a fresh holder of the same type.
    pub fn copy(&self) -> VarResult<Self> {
        let holder = self.holder.as_ref().map(|h| h.duplicate()).transpose()?;
        Ok(Var { holder })
    }

    pub fn to_string(&self) -> VarResult<String> {
        match &self.holder {
            None => Ok("Null".to_string()),
            Some(h) => h.stringify(),
        }
    }

    pub fn hash(&self) -> VarResult<u64> {
        match &self.holder {
            None => Ok(null_hash()),
            Some(h) => h.hash_code(),
        }
    }

    pub fn equals(&self, other: &Var) -> VarResult<bool> {
        match (&self.holder, &other.holder) {
            (None, None) => Ok(true),
            (Some(a), Some(b)) => a.equals(&**b),
            _ => Ok(false),
        }
    }

    pub fn not_equals(&self, other: &Var) -> VarResult<bool> {
        self.equals(other).map(|eq| !eq)
    }

    pub fn val<T: Payload>(&self) -> VarResult<&T> {
        let holder = self.holder.as_ref().ok_or(VarError::Unusable)?;
        holder
            .as_any()
            .downcast_ref::<TypedHolder<T>>()
            .map(|h| &h.value)
            .ok_or(VarError::TypeMismatch { expected: T::TYPE_NAME, found: holder.payload_name() })
    }

    pub fn val_mut<T: Payload>(&mut self) -> VarResult<&mut T> {
        let holder = self.holder.as_mut().ok_or(VarError::Unusable)?;
        let found = holder.payload_name();
        holder
            .as_any_mut()
            .downcast_mut::<TypedHolder<T>>()
            .map(|h| &mut h.value)
            .ok_or(VarError::TypeMismatch { expected: T::TYPE_NAME, found })
    }

    /// Replaces the payload. The previous holder goes back to its pool
    /// before the new one is drawn; if that fails the `Var` is left null.
    pub fn assign<T: Payload>(&mut self, value: T) -> VarResult<()> {
        self.holder = None;
        self.holder = Some(TypedHolder::new(value)?);
        Ok(())
    }

    /// Moves the payload out, leaving `self` unusable.
    pub fn take(&mut self) -> Var {
        std::mem::take(self)
    }

    pub fn swap(&mut self, other: &mut Var) {
        std::mem::swap(&mut self.holder, &mut other.holder);
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_string() {
            Ok(text) => write!(f, "Var<{}>({})", self.type_name(), text),
            Err(_) => write!(f, "Var<{}>(..)", self.type_name()),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug)]
    struct Blob(Vec<u8>);
    crate::payload!(Blob => "blob" []);

    #[derive(Clone, PartialEq)]
    struct Tagged(u32);
    crate::payload!(Tagged => "tagged" [eq]);

    #[derive(Clone, PartialEq, Hash)]
    struct Ticket(usize);
    crate::payload!(Ticket => "ticket" [eq, hash]);

    fn make<T: Payload>(value: T) -> Var {
        Var::make(value).unwrap()
    }

    #[test]
    fn null_sentinel_laws() {
        assert!(Var::null().equals(&Var::null()).unwrap());
        assert!(Var::default().not_equals(&make(0i64)).unwrap());
        assert!(make(0i64).not_equals(&Var::null()).unwrap());
        assert_eq!(Var::null().to_string().unwrap(), "Null");
        assert_eq!(Var::null().hash().unwrap(), null_hash());
        assert_eq!(Var::null().type_name(), "null");
        assert!(!Var::null().is_usable());
        assert!(!Var::null().copy().unwrap().is_usable());
    }

    #[test]
    fn to_string_per_type() {
        assert_eq!(make(42i64).to_string().unwrap(), "42");
        assert_eq!(make(true).to_string().unwrap(), "true");
        assert_eq!(make('c').to_string().unwrap(), "c");
        assert_eq!(make(String::from("hello")).to_string().unwrap(), "hello");
        assert_eq!(make(2.5f64).to_string().unwrap(), "2.5");
    }

    #[test]
    fn equal_values_hash_equal() {
        let a = make(String::from("key"));
        let b = make(String::from("key"));
        assert!(a.equals(&b).unwrap());
        assert_eq!(a.hash().unwrap(), b.hash().unwrap());
        assert_eq!(make(0.0f64).hash().unwrap(), make(-0.0f64).hash().unwrap());
    }

    #[test]
    fn copy_is_independent() {
        let a = make(41i64);
        let mut b = a.copy().unwrap();
        assert!(a.equals(&b).unwrap());
        *b.val_mut::<i64>().unwrap() += 1;
        assert_eq!(*a.val::<i64>().unwrap(), 41);
        assert_eq!(*b.val::<i64>().unwrap(), 42);
        assert!(a.not_equals(&b).unwrap());

        let s = make(String::from("x"));
        let mut t = s.copy().unwrap();
        t.val_mut::<String>().unwrap().push('y');
        assert_eq!(s.val::<String>().unwrap().as_str(), "x");
        assert_eq!(t.val::<String>().unwrap().as_str(), "xy");
    }

    #[test]
    fn mismatched_types_are_unequal_even_without_equality() {
        let blob = make(Blob(vec![1]));
        let int = make(1i64);
        assert_eq!(blob.equals(&int), Ok(false));
        assert_eq!(int.equals(&blob), Ok(false));
        assert_eq!(blob.not_equals(&int), Ok(true));
    }

    #[test]
    fn missing_capabilities_fail_at_use() {
        let blob = make(Blob(vec![1, 2, 3]));
        assert_eq!(
            blob.equals(&blob.copy().unwrap()),
            Err(VarError::MissingCapability { type_name: "blob", capability: Capability::Equality })
        );
        assert!(matches!(
            blob.hash(),
            Err(VarError::MissingCapability { capability: Capability::Hashing, .. })
        ));
        assert!(matches!(
            blob.to_string(),
            Err(VarError::MissingCapability { capability: Capability::ToString, .. })
        ));
        // Reading the payload needs no capability.
        assert_eq!(blob.val::<Blob>().unwrap().0, vec![1, 2, 3]);
    }

    #[test]
    fn partial_capabilities() {
        let t = make(Tagged(3));
        assert!(t.equals(&make(Tagged(3))).unwrap());
        assert!(t.hash().is_err());
    }

    #[test]
    fn val_checks_usability_then_type() {
        let null = Var::null();
        assert_eq!(null.val::<i64>().err(), Some(VarError::Unusable));
        let v = make(String::from("s"));
        assert_eq!(
            v.val::<i64>().err(),
            Some(VarError::TypeMismatch { expected: "integer", found: "literal" })
        );
        let mut m = make(1i64);
        assert!(matches!(m.val_mut::<bool>(), Err(VarError::TypeMismatch { .. })));
    }

    #[test]
    fn assign_replaces_payload_and_type() {
        let mut v = make(1i64);
        v.assign(String::from("now text")).unwrap();
        assert!(v.is::<String>());
        assert!(!v.is::<i64>());
        assert_eq!(v.to_string().unwrap(), "now text");
    }

    #[test]
    fn take_and_swap() {
        let mut a = make('a');
        let moved = a.take();
        assert!(!a.is_usable());
        assert_eq!(*moved.val::<char>().unwrap(), 'a');

        let mut x = make(1i64);
        let mut y = Var::null();
        x.swap(&mut y);
        assert!(!x.is_usable());
        assert_eq!(*y.val::<i64>().unwrap(), 1);
    }

    #[test]
    fn debug_output() {
        let v = make(5i64);
        assert_eq!(v.type_name(), "integer");
        assert_eq!(format!("{v:?}"), "Var<integer>(5)");
        assert_eq!(format!("{:?}", make(Blob(vec![]))), "Var<blob>(..)");
    }

    // --- Holder pools ---

    #[test]
    fn holder_pool_is_bounded_per_type() {
        let mut held: Vec<Var> = (0..HOLDER_CAPACITY).map(|i| make(Ticket(i))).collect();
        assert_eq!(live_holders::<Ticket>(), HOLDER_CAPACITY);

        let err = Var::make(Ticket(999)).unwrap_err();
        assert_eq!(
            err,
            VarError::Pool { type_name: "ticket", source: PoolError::Exhausted { capacity: HOLDER_CAPACITY } }
        );
        assert!(matches!(held[0].copy(), Err(VarError::Pool { .. })));
        // Other payload types draw from their own pools.
        assert!(Var::make(Tagged(1)).is_ok());

        held.pop();
        assert_eq!(live_holders::<Ticket>(), HOLDER_CAPACITY - 1);
        let again = make(Ticket(1000));
        assert_eq!(again.val::<Ticket>().unwrap().0, 1000);
        assert!(Var::make(Ticket(1001)).is_err());

        drop(held);
        drop(again);
        assert_eq!(live_holders::<Ticket>(), 0);
    }

    #[test]
    fn assign_returns_the_old_holder() {
        let mut v = make(Ticket(1));
        let other = make(Ticket(2));
        assert_eq!(live_holders::<Ticket>(), 2);

        v.assign(String::from("text")).unwrap();
        assert_eq!(live_holders::<Ticket>(), 1);
        v.assign(Ticket(3)).unwrap();
        assert_eq!(live_holders::<Ticket>(), 2);

        let taken = v.take();
        assert_eq!(live_holders::<Ticket>(), 2);
        drop(taken);
        drop(other);
        assert_eq!(live_holders::<Ticket>(), 0);
    }

    #[test]
    fn copy_draws_a_new_holder() {
        let a = make(Ticket(7));
        let b = a.copy().unwrap();
        assert_eq!(live_holders::<Ticket>(), 2);
        assert!(a.equals(&b).unwrap());
        drop(a);
        assert_eq!(live_holders::<Ticket>(), 1);
        assert_eq!(b.val::<Ticket>().unwrap().0, 7);
    }
}

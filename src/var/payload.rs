use std::any::Any;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

pub type Integer = i64;
pub type Floating = f64;
pub type Character = char;
pub type Boolean = bool;
pub type Literal = String;

/// An optional operation a payload type may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Equality,
    Hashing,
    ToString,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Equality => write!(f, "equality"),
            Capability::Hashing => write!(f, "hashing"),
            Capability::ToString => write!(f, "string conversion"),
        }
    }
}

/// A concrete type that can live inside a [`Var`](super::Var).
///
/// Every capability defaults to "unsupported" (`None`). A type opts in by
/// overriding the matching method, usually through [`payload!`](crate::payload).
/// Nothing is checked when a `Var` is built; a missing capability only
/// surfaces when that operation is invoked.
pub trait Payload: Any + Clone {
    const TYPE_NAME: &'static str;

    fn payload_eq(&self, _other: &Self) -> Option<bool> {
        None
    }

    fn payload_hash(&self) -> Option<u64> {
        None
    }

    fn payload_to_string(&self) -> Option<String> {
        None
    }
}

/// Deterministic hash used for every hashable payload.
pub fn fx_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Hash of a null pointer; what an unusable `Var` hashes to.
pub fn null_hash() -> u64 {
    fx_hash(&std::ptr::null::<()>())
}

/// Registers a payload type and the capabilities it supports.
///
/// ```
/// #[derive(Clone, PartialEq, Hash)]
/// struct Point(i32, i32);
/// strand::payload!(Point => "point" [eq, hash]);
///
/// let a = strand::Var::make(Point(1, 2)).unwrap();
/// assert!(a.equals(&a.copy().unwrap()).unwrap());
/// assert!(a.to_string().is_err());
/// ```
#[macro_export]
macro_rules! payload {
    (@cap eq) => {
        fn payload_eq(&self, other: &Self) -> Option<bool> {
            Some(self == other)
        }
    };
    (@cap hash) => {
        fn payload_hash(&self) -> Option<u64> {
            Some($crate::var::fx_hash(self))
        }
    };
    (@cap display) => {
        fn payload_to_string(&self) -> Option<String> {
            Some(self.to_string())
        }
    };
    ($ty:ty => $name:literal [$($cap:ident),* $(,)?]) => {
        impl $crate::Payload for $ty {
            const TYPE_NAME: &'static str = $name;
            $($crate::payload!(@cap $cap);)*
        }
    };
}

crate::payload!(Integer => "integer" [eq, hash, display]);
crate::payload!(Character => "character" [eq, hash, display]);
crate::payload!(Boolean => "boolean" [eq, hash, display]);
crate::payload!(Literal => "literal" [eq, hash, display]);

impl Payload for Floating {
    const TYPE_NAME: &'static str = "floating";

    fn payload_eq(&self, other: &Self) -> Option<bool> {
        Some(self == other)
    }

    /// Hashes the bit pattern; both zeroes hash alike since they compare equal.
    fn payload_hash(&self) -> Option<u64> {
        let bits = if *self == 0.0 { 0 } else { self.to_bits() };
        Some(fx_hash(&bits))
    }

    fn payload_to_string(&self) -> Option<String> {
        Some(self.to_string())
    }
}

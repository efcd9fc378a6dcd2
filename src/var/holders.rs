use std::any::{Any, TypeId};
use std::cell::RefCell;

use rustc_hash::FxHashMap;

use super::Payload;
use crate::pool::{Handle, Pool, PoolError};

/// Holder slots available to each payload type, per native thread.
pub const HOLDER_CAPACITY: usize = 96;

thread_local! {
    // One `Pool<T>` per payload type, created on first use.
    static HOLDERS: RefCell<FxHashMap<TypeId, Box<dyn Any>>> = RefCell::new(FxHashMap::default());
}

/// Runs `f` on the holder pool of `T`. `None` once the registry has been
/// torn down at thread exit.
fn with_pool<T: Payload, R>(f: impl FnOnce(&mut Pool<T>) -> R) -> Option<R> {
    HOLDERS
        .try_with(|cell| {
            let mut pools = cell.try_borrow_mut().ok()?;
            let pool = pools
                .entry(TypeId::of::<T>())
                .or_insert_with(|| Box::new(Pool::<T>::with_capacity(HOLDER_CAPACITY)) as Box<dyn Any>);
            pool.downcast_mut::<Pool<T>>().map(f)
        })
        .ok()
        .flatten()
}

/// Claims a holder slot of `T`. The payload itself stays with the holder.
pub(super) fn acquire<T: Payload>() -> Result<Handle<T>, PoolError> {
    with_pool::<T, _>(Pool::reserve).unwrap_or(Err(PoolError::Exhausted { capacity: 0 }))
}

pub(super) fn release<T: Payload>(slot: Handle<T>) {
    if let Some(Err(e)) = with_pool::<T, _>(|pool| pool.release(slot)) {
        tracing::warn!(type_name = T::TYPE_NAME, slot = ?slot, error = %e, "holder release failed");
    }
}

/// Number of live holders of `T` on the current native thread.
pub fn live_holders<T: Payload>() -> usize {
    with_pool::<T, _>(|pool| pool.len()).unwrap_or(0)
}

use parking_lot::RwLock;
use parking_lot::RwLockReadGuard;
use parking_lot::RwLockWriteGuard;
use std::sync::Arc;

/// A convenience type alias for [Arc<RwLock<T>>].
///
/// All IR objects (ops, operations, values, blocks, regions) are shared via
/// this type so that a value can be pointed at by its defining op and by all
/// of its users at the same time.
///
/// # Example
///
/// ```
/// use torchconv::shared::Shared;
///
/// let lock = Shared::new(42.into());
/// assert_eq!(*lock.try_read().unwrap(), 42);
/// ```
pub type Shared<T> = Arc<RwLock<T>>;

/// A convenience trait around [RwLock].
///
/// The IR is only ever mutated from a single thread, so a lock that cannot be
/// taken immediately means that the same thread still holds a guard. Blocking
/// would hang forever in that case, so these methods crash instead.
///
/// # Example
///
/// ```
/// use torchconv::shared::Shared;
/// use torchconv::shared::SharedExt;
///
/// let lock: Shared<i64> = Shared::new(42.into());
/// *lock.wr() += 1;
/// assert_eq!(*lock.rd(), 43);
/// ```
pub trait SharedExt<T: ?Sized> {
    /// Convenience method for reading.
    fn rd(&self) -> RwLockReadGuard<'_, T>;
    /// Convenience method for writing.
    fn wr(&self) -> RwLockWriteGuard<'_, T>;
}

impl<T: ?Sized> SharedExt<T> for Shared<T> {
    fn rd(&self) -> RwLockReadGuard<'_, T> {
        match self.try_read() {
            Some(guard) => guard,
            None => panic!("shared object is already locked for writing"),
        }
    }
    fn wr(&self) -> RwLockWriteGuard<'_, T> {
        match self.try_write() {
            Some(guard) => guard,
            None => panic!("shared object is already locked"),
        }
    }
}

#[test]
fn test_shared() {
    let lock: Shared<Vec<i64>> = Shared::new(vec![1].into());
    lock.wr().push(2);
    assert_eq!(*lock.rd(), vec![1, 2]);
    let first = lock.rd();
    let second = lock.rd();
    assert_eq!(first.len(), second.len());
}

//! Fast lock for completion queue state
//!
//! A spinlock for short critical sections (ring cursor updates, list
//! edits). Each lock carries a `LockClass` and, for the queue locks, the
//! fid of the queue it belongs to. With debug assertions (or the
//! `lock-order` feature) every thread keeps a stack of the locks it holds
//! and panics on an ordering violation:
//!
//! - A queue's `EndpointList` lock may be held while taking its
//!   `Completion` lock (an endpoint's progress routine writes completions).
//! - A queue's `Completion` lock must never be held while taking the same
//!   queue's `EndpointList` lock, nor while that queue runs a progress hook.
//! - No lock may be taken twice by the same thread.
//!
//! Locks of different queues don't constrain each other, so an endpoint
//! of one queue may read another queue from its progress routine.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use fabric_core::id::FidId;

/// Lock domains with an ordering rule between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LockClass {
    /// Not part of the ordering discipline.
    Plain = 0,
    /// Guards a queue's ring, error list and source addresses.
    Completion = 1 << 0,
    /// Guards a queue's bound-endpoint list.
    EndpointList = 1 << 1,
}

#[cfg(any(debug_assertions, feature = "lock-order"))]
mod order {
    use super::LockClass;
    use fabric_core::id::FidId;
    use std::cell::RefCell;

    struct Held {
        class: LockClass,
        addr: usize,
        owner: FidId,
    }

    thread_local! {
        static HELD: RefCell<Vec<Held>> = const { RefCell::new(Vec::new()) };
    }

    enum Violation {
        Recursive,
        Inverted,
    }

    pub(super) fn acquire(class: LockClass, addr: usize, owner: FidId) {
        if class == LockClass::Plain {
            return;
        }
        let violation = HELD
            .try_with(|held| {
                let mut held = held.borrow_mut();
                if held.iter().any(|h| h.addr == addr) {
                    return Some(Violation::Recursive);
                }
                if class == LockClass::EndpointList
                    && !owner.is_none()
                    && held.iter().any(|h| h.class == LockClass::Completion && h.owner == owner)
                {
                    return Some(Violation::Inverted);
                }
                held.push(Held { class, addr, owner });
                None
            })
            .ok()
            .flatten();
        match violation {
            Some(Violation::Recursive) => panic!("{:?} lock taken recursively", class),
            Some(Violation::Inverted) => {
                panic!("endpoint-list lock taken while holding the completion lock")
            }
            None => {}
        }
    }

    pub(super) fn release(class: LockClass, addr: usize) {
        if class == LockClass::Plain {
            return;
        }
        let _ = HELD.try_with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|h| h.addr == addr) {
                held.remove(pos);
            }
        });
    }

    pub(super) fn is_held(addr: usize) -> bool {
        HELD.try_with(|held| held.borrow().iter().any(|h| h.addr == addr))
            .unwrap_or(false)
    }
}

#[cfg(not(any(debug_assertions, feature = "lock-order")))]
mod order {
    use super::LockClass;
    use fabric_core::id::FidId;

    #[inline(always)]
    pub(super) fn acquire(_class: LockClass, _addr: usize, _owner: FidId) {}

    #[inline(always)]
    pub(super) fn release(_class: LockClass, _addr: usize) {}

    #[inline(always)]
    pub(super) fn is_held(_addr: usize) -> bool {
        false
    }
}

/// A spinlock tagged with a `LockClass`.
pub struct FastLock<T> {
    locked: AtomicBool,
    class: LockClass,
    owner: FidId,
    data: UnsafeCell<T>,
}

// Safety: FastLock provides exclusive access to T
unsafe impl<T: Send> Send for FastLock<T> {}
unsafe impl<T: Send> Sync for FastLock<T> {}

impl<T> FastLock<T> {
    #[inline]
    pub const fn new(class: LockClass, value: T) -> Self {
        Self::with_owner(class, FidId::NONE, value)
    }

    /// A lock belonging to the queue `owner`; the ordering rule between
    /// classes only applies to locks with the same owner.
    #[inline]
    pub const fn with_owner(class: LockClass, owner: FidId, value: T) -> Self {
        FastLock {
            locked: AtomicBool::new(false),
            class,
            owner,
            data: UnsafeCell::new(value),
        }
    }

    #[inline]
    fn addr(&self) -> usize {
        self as *const Self as *const () as usize
    }

    /// Acquire the lock, spinning until it's available
    #[inline]
    pub fn lock(&self) -> FastLockGuard<'_, T> {
        order::acquire(self.class, self.addr(), self.owner);
        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return FastLockGuard { lock: self };
            }

            // Spin with backoff until it looks free, then retry the CAS
            let mut spin_count = 0u32;
            while self.locked.load(Ordering::Relaxed) {
                spin_count = spin_count.wrapping_add(1);
                for _ in 0..spin_count.min(64) {
                    core::hint::spin_loop();
                }
                if spin_count > 1024 {
                    std::thread::yield_now();
                }
            }
        }
    }

    /// Panic (in checked builds) if the calling thread holds this lock.
    ///
    /// Called before invoking a progress hook.
    #[inline]
    pub fn assert_not_held(&self) {
        assert!(
            !order::is_held(self.addr()),
            "{:?} lock held across a progress call",
            self.class
        );
    }

    #[inline]
    pub fn class(&self) -> LockClass {
        self.class
    }

    #[inline]
    pub fn owner(&self) -> FidId {
        self.owner
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

/// Guard that releases the lock when dropped
pub struct FastLockGuard<'a, T> {
    lock: &'a FastLock<T>,
}

impl<T> Deref for FastLockGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // Safety: We hold the lock
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for FastLockGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // Safety: We hold the lock
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for FastLockGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
        order::release(self.lock.class, self.lock.addr());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_lock_basic() {
        let lock = FastLock::new(LockClass::Plain, 0u32);
        {
            let mut guard = lock.lock();
            *guard = 42;
            assert!(lock.is_locked());
        }
        assert!(!lock.is_locked());
        assert_eq!(*lock.lock(), 42);
    }

    #[test]
    fn test_lock_concurrent() {
        let lock = Arc::new(FastLock::new(LockClass::Completion, 0u32));
        let mut handles = vec![];

        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    let mut guard = lock.lock();
                    *guard += 1;
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.lock(), 4000);
    }

    #[test]
    fn test_endpoint_then_completion_is_allowed() {
        let owner = FidId::next();
        let eps = FastLock::with_owner(LockClass::EndpointList, owner, ());
        let comp = FastLock::with_owner(LockClass::Completion, owner, ());
        let _e = eps.lock();
        let _c = comp.lock();
    }

    #[test]
    fn test_other_queue_locks_nest() {
        let (a, b) = (FidId::next(), FidId::next());
        let eps_a = FastLock::with_owner(LockClass::EndpointList, a, ());
        let comp_a = FastLock::with_owner(LockClass::Completion, a, ());
        let eps_b = FastLock::with_owner(LockClass::EndpointList, b, ());
        let comp_b = FastLock::with_owner(LockClass::Completion, b, ());

        // a's endpoint progresses b, which progresses its own endpoints
        let _ea = eps_a.lock();
        let _cb = comp_b.lock();
        drop(_cb);
        let _eb = eps_b.lock();
        let _cb = comp_b.lock();

        // holding a's completion lock says nothing about b
        drop(_ea);
        let _ca = comp_a.lock();
        comp_b.assert_not_held();
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "endpoint-list lock taken while holding the completion lock")]
    fn test_completion_then_endpoint_panics() {
        let owner = FidId::next();
        let eps = FastLock::with_owner(LockClass::EndpointList, owner, ());
        let comp = FastLock::with_owner(LockClass::Completion, owner, ());
        let _c = comp.lock();
        let _e = eps.lock();
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "lock taken recursively")]
    fn test_relock_panics() {
        let comp = FastLock::new(LockClass::Completion, ());
        let _c = comp.lock();
        let _again = comp.lock();
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "held across a progress call")]
    fn test_assert_not_held() {
        let comp = FastLock::new(LockClass::Completion, ());
        let _c = comp.lock();
        comp.assert_not_held();
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_release_clears_tracking() {
        let comp = FastLock::new(LockClass::Completion, ());
        drop(comp.lock());
        comp.assert_not_held();
    }
}

//! Ordered callback lists for lifecycle events.
//!
//! Callbacks are invoked from a snapshot taken under the lock, with the lock
//! released, so a callback may register further callbacks without
//! deadlocking. A panicking callback is logged and the remaining callbacks
//! still run.
//!
//! One-shot lists are drained with [`CallbackList::take_and_invoke`]; the
//! list is sealed afterwards and later registrations are dropped, so a
//! callback capturing its owner cannot keep the owner alive.

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use log::error;

use crate::panic::call_guarded;

type Callback<A> = Arc<dyn Fn(&A) + Send + Sync>;

/// List of callbacks receiving a `&A`.
pub struct CallbackList<A: ?Sized> {
    callbacks: Mutex<Slots<A>>,
}

struct Slots<A: ?Sized> {
    list: Vec<Callback<A>>,
    sealed: bool,
}

impl<A: ?Sized> Default for CallbackList<A> {
    fn default() -> Self {
        Self {
            callbacks: Mutex::new(Slots {
                list: Vec::new(),
                sealed: false,
            }),
        }
    }
}

impl<A: ?Sized> CallbackList<A> {
    /// Append a callback.
    ///
    /// Returns `false`, dropping the callback, once the list has been
    /// drained by [`CallbackList::take_and_invoke`].
    pub fn add<F>(&self, callback: F) -> bool
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        let mut slots = self.lock();
        if slots.sealed {
            return false;
        }
        slots.list.push(Arc::new(callback));
        true
    }

    /// Invoke every registered callback with `arg`, in registration order.
    pub fn invoke(&self, arg: &A) {
        let snapshot = self.lock().list.clone();
        run_all(&snapshot, arg);
    }

    /// Remove every callback, seal the list and invoke the removed
    /// callbacks with `arg`.
    ///
    /// Only the first call finds anything to run.
    pub fn take_and_invoke(&self, arg: &A) {
        let taken = self.drain();
        run_all(&taken, arg);
    }

    /// Remove every callback without running it and seal the list.
    pub fn seal(&self) { drop(self.drain()); }

    fn drain(&self) -> Vec<Callback<A>> {
        let mut slots = self.lock();
        slots.sealed = true;
        std::mem::take(&mut slots.list)
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize { self.lock().list.len() }

    /// Returns `true` if no callback is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.lock().list.is_empty() }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots<A>> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn run_all<A: ?Sized>(callbacks: &[Callback<A>], arg: &A) {
    for callback in callbacks {
        if let Err(panic) = call_guarded(|| callback(arg)) {
            error!("callback panicked: panic={panic}");
        }
    }
}

impl<A: ?Sized> fmt::Debug for CallbackList<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackList")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use super::CallbackList;

    #[test]
    fn callbacks_run_in_registration_order() {
        let list = CallbackList::<u8>::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in 0..3_u8 {
            let seen = Arc::clone(&seen);
            list.add(move |arg: &u8| seen.lock().expect("lock").push(tag + arg));
        }
        list.invoke(&10);
        assert_eq!(*seen.lock().expect("lock"), vec![10, 11, 12]);
    }

    #[test]
    fn callback_may_register_another_callback() {
        let list = Arc::new(CallbackList::<()>::default());
        let inner = Arc::clone(&list);
        list.add(move |()| {
            inner.add(|()| {});
        });
        list.invoke(&());
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn take_and_invoke_drains_and_seals() {
        let list = Arc::new(CallbackList::<()>::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let inner = Arc::clone(&list);
        list.add(move |()| {
            counter.fetch_add(1, Ordering::SeqCst);
            assert!(!inner.add(|()| {}));
        });

        list.take_and_invoke(&());
        list.take_and_invoke(&());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(list.is_empty());
        assert!(!list.add(|()| {}));
    }

    #[test]
    fn drained_callbacks_release_captured_state() {
        let list = CallbackList::<()>::default();
        let owner = Arc::new(());
        let captured = Arc::clone(&owner);
        list.add(move |()| {
            let _ = &captured;
        });
        assert_eq!(Arc::strong_count(&owner), 2);
        list.take_and_invoke(&());
        assert_eq!(Arc::strong_count(&owner), 1);
    }

    #[test]
    fn panicking_callback_does_not_stop_the_rest() {
        let list = CallbackList::<()>::default();
        let hits = Arc::new(AtomicUsize::new(0));
        list.add(|()| panic!("first callback fails"));
        let counter = Arc::clone(&hits);
        list.add(move |()| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        list.invoke(&());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}

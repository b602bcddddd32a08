//! Subscriber lists for chain events.

use std::sync::Mutex;

/// A list of callbacks invoked synchronously when an event fires.
///
/// Subscribers run in registration order, after the originating mutation
/// has committed. Callbacks must not take the chain lock.
pub struct Observable<T> {
    subscribers: Mutex<Vec<Box<dyn Fn(&T) + Send + Sync>>>,
}

impl<T> Observable<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a callback.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) {
        self.subscribers.lock().unwrap().push(Box::new(callback));
    }

    /// Invokes every subscriber with the event value.
    pub fn notify(&self, value: &T) {
        let subscribers = self.subscribers.lock().unwrap();
        for subscriber in subscribers.iter() {
            subscriber(value);
        }
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Observable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn notify_reaches_all_subscribers() {
        let observable: Observable<u32> = Observable::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = Arc::clone(&count);
            observable.subscribe(move |value| {
                count.fetch_add(*value as usize, Ordering::SeqCst);
            });
        }

        observable.notify(&7);
        assert_eq!(count.load(Ordering::SeqCst), 21);
    }

    #[test]
    fn subscribers_run_in_registration_order() {
        let observable: Observable<()> = Observable::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..4 {
            let order = Arc::clone(&order);
            observable.subscribe(move |_| {
                order.lock().unwrap().push(i);
            });
        }

        observable.notify(&());
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn empty_observable_notifies_nobody() {
        let observable: Observable<String> = Observable::new();
        assert!(observable.is_empty());
        observable.notify(&"ignored".to_string());
    }
}

//! In-flight bracketing for observable state.

use tokio::sync::watch;

/// State that counts operations in flight.
pub(crate) trait InFlight {
    fn in_flight_mut(&mut self) -> &mut usize;
}

/// Marks an operation in flight for as long as it lives.
///
/// The count is restored on drop, so the loading flag clears on every exit
/// path, including `?` and panics.
pub(crate) struct LoadingGuard<'a, T: InFlight> {
    state: &'a watch::Sender<T>,
}

impl<'a, T: InFlight> LoadingGuard<'a, T> {
    pub(crate) fn new(state: &'a watch::Sender<T>) -> Self {
        state.send_modify(|s| *s.in_flight_mut() += 1);
        Self { state }
    }
}

impl<T: InFlight> Drop for LoadingGuard<'_, T> {
    fn drop(&mut self) {
        self.state.send_modify(|s| {
            let count = s.in_flight_mut();
            *count = count.saturating_sub(1);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter(usize);

    impl InFlight for Counter {
        fn in_flight_mut(&mut self) -> &mut usize {
            &mut self.0
        }
    }

    #[test]
    fn test_guard_brackets_count() {
        let (tx, rx) = watch::channel(Counter::default());
        {
            let _outer = LoadingGuard::new(&tx);
            let inner = LoadingGuard::new(&tx);
            assert_eq!(rx.borrow().0, 2);
            drop(inner);
            assert_eq!(rx.borrow().0, 1);
        }
        assert_eq!(rx.borrow().0, 0);
    }

    #[test]
    fn test_guard_clears_on_early_return() {
        fn fails(tx: &watch::Sender<Counter>) -> Result<(), &'static str> {
            let _loading = LoadingGuard::new(tx);
            Err("boom")
        }

        let (tx, rx) = watch::channel(Counter::default());
        assert!(fails(&tx).is_err());
        assert_eq!(rx.borrow().0, 0);
    }
}

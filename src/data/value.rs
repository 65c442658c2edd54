//! Reactive data values attached to data states.

use super::{DataError, StateData};
use crate::core::StateKey;
use futures_util::Stream;
use parking_lot::Mutex;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

struct DataInner<D> {
    value: D,
    version: u64,
    error: Option<String>,
    closed: bool,
    observers: Vec<mpsc::UnboundedSender<D>>,
}

/// Typed value owned by an active data state.
///
/// A `DataValue` is created when its state is entered and closed when the
/// state exits. Once closed, every read, update and subscription fails with
/// [`DataError::Disposed`], and existing subscriptions complete.
///
/// Updates are synchronous read-modify-write operations; observers are
/// notified before the update call returns.
pub struct DataValue<D> {
    key: StateKey,
    inner: Mutex<DataInner<D>>,
}

impl<D: StateData> DataValue<D> {
    pub(crate) fn new(key: StateKey, value: D) -> Self {
        Self {
            key,
            inner: Mutex::new(DataInner {
                value,
                version: 0,
                error: None,
                closed: false,
                observers: Vec::new(),
            }),
        }
    }

    /// Key of the state that owns this value.
    pub fn key(&self) -> &StateKey {
        &self.key
    }

    /// Current value.
    pub fn value(&self) -> Result<D, DataError> {
        self.with(Clone::clone)
    }

    /// Borrow the current value without cloning it. The value is locked
    /// while `f` runs, so `f` must not access this value again.
    pub fn with<R>(&self, f: impl FnOnce(&D) -> R) -> Result<R, DataError> {
        let inner = self.inner.lock();
        if inner.closed {
            return Err(self.disposed());
        }
        Ok(f(&inner.value))
    }

    /// Replace the value with the result of `f` and notify observers.
    ///
    /// `f` works on a copy and runs unlocked, so it may read this value.
    pub fn update(&self, f: impl FnOnce(&D) -> D) -> Result<D, DataError> {
        let next = f(&self.value()?);
        self.replace(next.clone())?;
        Ok(next)
    }

    /// Mutate a copy of the value, then store it and notify observers.
    pub fn modify(&self, f: impl FnOnce(&mut D)) -> Result<(), DataError> {
        let mut next = self.value()?;
        f(&mut next);
        self.replace(next)
    }

    pub fn set(&self, value: D) -> Result<(), DataError> {
        self.replace(value)
    }

    fn replace(&self, value: D) -> Result<(), DataError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(self.disposed());
        }
        inner.value = value;
        Self::publish(&mut inner);
        Ok(())
    }

    /// Record an error against this value. The value itself is kept.
    pub fn set_error(&self, error: impl Into<String>) -> Result<(), DataError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(self.disposed());
        }
        inner.error = Some(error.into());
        Ok(())
    }

    pub fn error(&self) -> Option<String> {
        self.inner.lock().error.clone()
    }

    /// Number of updates applied since the value was created.
    pub fn version(&self) -> u64 {
        self.inner.lock().version
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Subscribe to this value.
    ///
    /// The subscription yields the current value immediately, then every
    /// subsequent update, and ends when the owning state exits.
    pub fn subscribe(&self) -> Result<DataSubscription<D>, DataError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(self.disposed());
        }
        let (tx, rx) = mpsc::unbounded_channel();
        // A fresh receiver cannot be closed yet.
        let _ = tx.send(inner.value.clone());
        inner.observers.push(tx);
        Ok(DataSubscription { rx })
    }

    /// Close the value. Dropping the observer senders completes every
    /// subscription.
    pub(crate) fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.observers.clear();
    }

    fn publish(inner: &mut DataInner<D>) {
        inner.version += 1;
        let value = &inner.value;
        inner
            .observers
            .retain(|observer| observer.send(value.clone()).is_ok());
    }

    fn disposed(&self) -> DataError {
        DataError::Disposed {
            key: self.key.clone(),
        }
    }
}

impl<D> fmt::Debug for DataValue<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("DataValue")
            .field("key", &self.key)
            .field("type", &std::any::type_name::<D>())
            .field("version", &inner.version)
            .field("closed", &inner.closed)
            .finish()
    }
}

/// Read-only view of a state's data, as handed out by machine handles.
///
/// Only handlers running inside the machine can change a value; a view
/// can read it and follow its updates.
///
/// ```compile_fail
/// # fn run(machine: treestate::TreeStateMachine) {
/// let view = machine.data_value(&treestate::DataStateKey::<u32>::new("counter")).unwrap();
/// view.set(99);
/// # }
/// ```
pub struct DataView<D> {
    value: Arc<DataValue<D>>,
}

impl<D: StateData> DataView<D> {
    pub(crate) fn new(value: Arc<DataValue<D>>) -> Self {
        Self { value }
    }

    pub fn key(&self) -> &StateKey {
        self.value.key()
    }

    pub fn value(&self) -> Result<D, DataError> {
        self.value.value()
    }

    pub fn with<R>(&self, f: impl FnOnce(&D) -> R) -> Result<R, DataError> {
        self.value.with(f)
    }

    pub fn error(&self) -> Option<String> {
        self.value.error()
    }

    pub fn version(&self) -> u64 {
        self.value.version()
    }

    pub fn is_closed(&self) -> bool {
        self.value.is_closed()
    }

    pub fn subscribe(&self) -> Result<DataSubscription<D>, DataError> {
        self.value.subscribe()
    }
}

impl<D> Clone for DataView<D> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
        }
    }
}

impl<D> fmt::Debug for DataView<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DataView").field(&self.value).finish()
    }
}

/// Stream of values observed on a [`DataValue`].
pub struct DataSubscription<D> {
    rx: mpsc::UnboundedReceiver<D>,
}

impl<D> DataSubscription<D> {
    /// Next value, or `None` once the owning state has exited.
    pub async fn next(&mut self) -> Option<D> {
        self.rx.recv().await
    }

    /// Next value if one is already available.
    pub fn try_next(&mut self) -> Option<D> {
        self.rx.try_recv().ok()
    }
}

impl<D> Stream for DataSubscription<D> {
    type Item = D;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<D>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> DataValue<u32> {
        DataValue::new(StateKey::new("counter"), 0)
    }

    #[test]
    fn update_replaces_value_and_bumps_version() {
        let value = counter();
        assert_eq!(value.update(|n| n + 2).unwrap(), 2);
        value.modify(|n| *n *= 10).unwrap();
        assert_eq!(value.value().unwrap(), 20);
        assert_eq!(value.version(), 2);
    }

    #[test]
    fn closed_value_rejects_access() {
        let value = counter();
        value.close();

        assert!(matches!(value.value(), Err(DataError::Disposed { .. })));
        assert!(matches!(value.set(3), Err(DataError::Disposed { .. })));
        assert!(value.subscribe().is_err());
    }

    #[tokio::test]
    async fn subscription_sees_current_then_updates_then_completes() {
        let value = counter();
        value.set(7).unwrap();

        let mut subscription = value.subscribe().unwrap();
        value.set(8).unwrap();
        value.update(|n| n + 1).unwrap();
        value.close();

        assert_eq!(subscription.next().await, Some(7));
        assert_eq!(subscription.next().await, Some(8));
        assert_eq!(subscription.next().await, Some(9));
        assert_eq!(subscription.next().await, None);
    }

    #[test]
    fn update_closure_may_read_the_same_value() {
        let value = counter();
        value.set(4).unwrap();
        let doubled = value.update(|n| n + value.value().unwrap()).unwrap();
        assert_eq!(doubled, 8);
        value.modify(|n| *n += value.version() as u32).unwrap();
        assert_eq!(value.value().unwrap(), 10);
    }

    #[test]
    fn view_reads_without_exposing_updates() {
        let value = Arc::new(counter());
        let view = DataView::new(Arc::clone(&value));
        value.set(5).unwrap();
        assert_eq!(view.value().unwrap(), 5);
        assert_eq!(view.version(), 1);

        value.close();
        assert!(view.is_closed());
        assert!(matches!(view.subscribe(), Err(DataError::Disposed { .. })));
    }

    #[test]
    fn error_slot_keeps_value() {
        let value = counter();
        value.set_error("sensor unavailable").unwrap();
        assert_eq!(value.error().as_deref(), Some("sensor unavailable"));
        assert_eq!(value.value().unwrap(), 0);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let value = counter();
        let subscription = value.subscribe().unwrap();
        drop(subscription);
        value.set(1).unwrap();
        assert!(value.inner.lock().observers.is_empty());
    }
}

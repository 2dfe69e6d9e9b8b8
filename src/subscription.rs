//! Subscription handles and shared subscription state.

use std::sync::{Arc, Mutex};

/// Handle returned from subscribing, used to stop receiving values.
///
/// `unsubscribe` consumes the handle: a subscription can only be disposed
/// once, and disposal is the only way a subject's subscriber count decreases.
pub trait Subscription {
  fn unsubscribe(self);

  fn is_closed(&self) -> bool;
}

/// State of a single subscription entry.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SubscriptionState {
  Active,
  Cancelled,
}

/// A small `Copy` value behind `Arc<Mutex<_>>`, shared between a subscription
/// handle and the subscriber list it belongs to.
///
/// Cancelling a subscription only flips this cell; the entry itself is pruned
/// by whoever next holds the subject lock. That keeps `unsubscribe` from ever
/// blocking on an in-flight broadcast.
pub struct CellArc<T>(Arc<Mutex<T>>);

impl<T: Copy + Eq> CellArc<T> {
  pub fn new(value: T) -> Self { Self(Arc::new(Mutex::new(value))) }

  pub fn get(&self) -> T { *self.0.lock().unwrap() }

  pub fn set(&self, value: T) { *self.0.lock().unwrap() = value; }

  /// Replace `current` with `new`; on mismatch returns the actual value.
  pub fn compare_exchange(&self, current: T, new: T) -> Result<T, T> {
    let mut guard = self.0.lock().unwrap();
    if *guard == current {
      *guard = new;
      Ok(current)
    } else {
      Err(*guard)
    }
  }
}

impl<T> Clone for CellArc<T> {
  #[inline]
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

/// Unsubscribes the wrapped subscription when dropped.
pub struct SubscriptionGuard<S: Subscription>(Option<S>);

impl<S: Subscription> SubscriptionGuard<S> {
  pub fn new(subscription: S) -> Self { Self(Some(subscription)) }

  pub fn is_closed(&self) -> bool {
    self.0.as_ref().map_or(true, Subscription::is_closed)
  }
}

impl<S: Subscription> Drop for SubscriptionGuard<S> {
  fn drop(&mut self) {
    if let Some(subscription) = self.0.take() {
      subscription.unsubscribe();
    }
  }
}

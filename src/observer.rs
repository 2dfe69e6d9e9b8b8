//! Observer trait and adapters.
//!
//! An [`Observer`] consumes the values a subject pushes. `error` and
//! `complete` are terminal: they consume the observer, after which no more
//! values can be delivered.

use std::convert::Infallible;

/// The consumer side of a subject.
pub trait Observer<Item, Err> {
  /// Receive the next value.
  fn next(&mut self, value: Item);

  /// Receive a terminal error. Consumes the observer.
  fn error(self, err: Err);

  /// Receive the completion signal. Consumes the observer.
  fn complete(self);

  /// Returns `true` if the observer will not accept more values.
  fn is_closed(&self) -> bool;
}

// ============================================================================
// DynObserver - object-safe mirror
// ============================================================================

/// Object-safe mirror of [`Observer`].
///
/// `Observer` is not object-safe because its terminal methods take `self` by
/// value. `DynObserver` adapts the same interface for vtables, so observers of
/// heterogeneous concrete types can live in one subscriber list.
pub trait DynObserver<Item, Err> {
  fn box_next(&mut self, value: Item);
  fn box_error(self: Box<Self>, err: Err);
  fn box_complete(self: Box<Self>);
  fn box_is_closed(&self) -> bool;
}

impl<T, Item, Err> DynObserver<Item, Err> for T
where
  T: Observer<Item, Err>,
{
  fn box_next(&mut self, value: Item) { self.next(value); }
  fn box_error(self: Box<Self>, err: Err) { self.error(err); }
  fn box_complete(self: Box<Self>) { self.complete(); }
  fn box_is_closed(&self) -> bool { self.is_closed() }
}

/// A boxed, thread-safe observer.
pub type BoxedObserverSend<Item, Err> = Box<dyn DynObserver<Item, Err> + Send>;

impl<Item, Err> Observer<Item, Err> for BoxedObserverSend<Item, Err> {
  #[inline]
  fn next(&mut self, value: Item) { (**self).box_next(value) }

  #[inline]
  fn error(self, err: Err) { self.box_error(err) }

  #[inline]
  fn complete(self) { self.box_complete() }

  #[inline]
  fn is_closed(&self) -> bool { (**self).box_is_closed() }
}

// ============================================================================
// FnMutObserver - closure adapter
// ============================================================================

/// Closure adapter: the closure becomes the `next` handler, terminal events
/// are ignored.
///
/// This is what makes `subject.subscribe(|v| ...)` work.
#[derive(Clone)]
pub struct FnMutObserver<F>(pub F);

impl<F, Item> Observer<Item, Infallible> for FnMutObserver<F>
where
  F: FnMut(Item),
{
  #[inline]
  fn next(&mut self, v: Item) { (self.0)(v); }

  #[inline]
  fn error(self, _err: Infallible) {}

  #[inline]
  fn complete(self) {}

  #[inline]
  fn is_closed(&self) -> bool { false }
}

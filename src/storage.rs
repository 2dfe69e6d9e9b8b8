//! Storage collaborator contracts.
//!
//! The provider core is generic over two capability sets it consumes but
//! never implements: a local (durable) store and a remote (authoritative)
//! store. Both are asynchronous-callback-style: every operation must invoke
//! its callback exactly once, on the scheduler handle it was given. There is
//! no failure channel: a collaborator resolves its own failures into a
//! result value (an absent or partial result), so "read failed" and "read
//! succeeded with absence" are indistinguishable here by design.

use crate::scheduler::SerialHandle;

/// One-shot result callback of a storage operation.
pub type StorageCallback<R> = Box<dyn FnOnce(R) + Send + 'static>;

/// Durable local persistence of entities.
pub trait LocalStorage<K, T>: Send + Sync {
  /// Fetch the entity for `key`, or `None` if absent.
  fn read(&self, key: K, queue: SerialHandle, callback: StorageCallback<Option<T>>);

  /// Fetch the entities for `keys`; missing keys are simply omitted.
  fn read_many(&self, keys: Vec<K>, queue: SerialHandle, callback: StorageCallback<Vec<T>>);

  /// Persist one entity and return its persisted form.
  fn write(&self, item: T, queue: SerialHandle, callback: StorageCallback<T>);

  /// Persist several entities and return their persisted forms.
  fn write_many(&self, items: Vec<T>, queue: SerialHandle, callback: StorageCallback<Vec<T>>);

  /// Remove one entity and return its removed form.
  fn delete(&self, item: T, queue: SerialHandle, callback: StorageCallback<T>);
}

/// Synchronization with a remote authority.
///
/// Mirrors the [`LocalStorage`] operation shapes. How a remote collaborator
/// interleaves with local storage (read-through, write-through, background
/// sync) is entirely its own concern: the provider core delegates its public
/// operations to local storage only and hands the remote collaborator to
/// richer specializations untouched (see [`Provider::remote`]).
///
/// [`Provider::remote`]: crate::provider::Provider::remote
pub trait RemoteStorage<K, T>: Send + Sync {
  fn read(&self, key: K, queue: SerialHandle, callback: StorageCallback<Option<T>>);

  fn read_many(&self, keys: Vec<K>, queue: SerialHandle, callback: StorageCallback<Vec<T>>);

  fn write(&self, item: T, queue: SerialHandle, callback: StorageCallback<T>);

  fn write_many(&self, items: Vec<T>, queue: SerialHandle, callback: StorageCallback<Vec<T>>);

  fn delete(&self, item: T, queue: SerialHandle, callback: StorageCallback<T>);
}

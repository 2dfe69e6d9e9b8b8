//! The queue-confined provider core.
//!
//! A [`Provider`] sits between callers, a [`LocalStorage`] collaborator, and
//! a [`RemoteStorage`] collaborator. It owns the only shared mutable state in
//! this crate, the subject cache, and serializes every touch of it onto one
//! [`SerialScheduler`] worker. Storage callbacks may fire on any context; the
//! provider re-enters its worker before notifying subjects, and separately
//! dispatches the caller's callback onto whatever scheduler the caller asked
//! for. Those two deliveries are independent and unordered relative to each
//! other.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::mpsc::channel;
use std::sync::{Arc, Mutex, Weak};

use smallvec::{smallvec, SmallVec};
use tracing::{debug, trace};

use crate::scheduler::{Scheduler, SerialScheduler};
use crate::storage::{LocalStorage, RemoteStorage, StorageCallback};
use crate::subject::BehaviorSubject;

/// Key projection: every entity names the logical record it belongs to.
///
/// The projection must be total and stable: two entities with the same key
/// denote the same record, and an entity's key never changes. Provider
/// behavior is undefined otherwise.
pub trait Keyed {
  type Key: Clone + Eq + Hash + Send + 'static;

  fn key(&self) -> Self::Key;
}

/// The `(key, value)` cache updates implied by one storage result.
type Changes<T> = SmallVec<[(<T as Keyed>::Key, Option<T>); 1]>;

type SubjectFactory<T> = Box<dyn Fn() -> BehaviorSubject<T> + Send + Sync>;

struct ProviderCore<T: Keyed> {
  local: Arc<dyn LocalStorage<T::Key, T>>,
  remote: Arc<dyn RemoteStorage<T::Key, T>>,
  worker: SerialScheduler,
  subjects: Mutex<HashMap<T::Key, BehaviorSubject<T>>>,
  factory: SubjectFactory<T>,
}

/// A reactive data provider for one entity type.
///
/// Reads, writes, and deletes are fire-and-forget: results arrive via the
/// given callback on the given scheduler, and additionally fan out to every
/// live subscriber of the affected keys. [`subscribe`] hands out the one hot
/// behavior stream per key, created lazily and evicted once unobserved.
///
/// [`subscribe`]: Provider::subscribe
pub struct Provider<T: Keyed> {
  core: Arc<ProviderCore<T>>,
}

impl<T> Provider<T>
where
  T: Keyed + Clone + Send + 'static,
{
  /// A provider whose subjects start absent-valued.
  ///
  /// `name` labels the confinement worker thread.
  pub fn new(
    name: &str,
    local: Arc<dyn LocalStorage<T::Key, T>>,
    remote: Arc<dyn RemoteStorage<T::Key, T>>,
  ) -> Self {
    Self::with_subject_factory(name, local, remote, BehaviorSubject::new)
  }

  /// A provider with a custom subject factory, the specialization hook for
  /// concrete providers that seed or instrument their streams.
  pub fn with_subject_factory(
    name: &str,
    local: Arc<dyn LocalStorage<T::Key, T>>,
    remote: Arc<dyn RemoteStorage<T::Key, T>>,
    factory: impl Fn() -> BehaviorSubject<T> + Send + Sync + 'static,
  ) -> Self {
    Self {
      core: Arc::new(ProviderCore {
        local,
        remote,
        worker: SerialScheduler::new(name),
        subjects: Mutex::new(HashMap::new()),
        factory: Box::new(factory),
      }),
    }
  }

  /// The local storage collaborator.
  pub fn local(&self) -> &Arc<dyn LocalStorage<T::Key, T>> { &self.core.local }

  /// The remote storage collaborator.
  ///
  /// The core never invokes it: remote synchronization is the local
  /// collaborator's internal concern. It is threaded through here so richer
  /// specializations can route operations through it with the same wrapping
  /// discipline.
  pub fn remote(&self) -> &Arc<dyn RemoteStorage<T::Key, T>> { &self.core.remote }

  // ==================== Basic ORM ====================

  /// Fetch the entity for `key`; an absent result is also delivered to the
  /// key's subscribers, so watching a nonexistent key observes `None`, not
  /// silence.
  pub fn read<S, F>(&self, key: T::Key, queue: S, callback: F)
  where
    S: Scheduler + Send + 'static,
    F: FnOnce(Option<T>) + Send + 'static,
  {
    let core = self.core.clone();
    let wrapped = self.wrap(queue, Some(key.clone()), false, changes_of_optional, callback);
    self.core.worker.schedule(Box::new(move || {
      core.local.read(key, core.worker.handle(), wrapped);
    }));
  }

  /// Fetch the entities for `keys`; every found entity is fanned out to its
  /// subscribers.
  pub fn read_many<S, F>(&self, keys: Vec<T::Key>, queue: S, callback: F)
  where
    S: Scheduler + Send + 'static,
    F: FnOnce(Vec<T>) + Send + 'static,
  {
    let core = self.core.clone();
    let wrapped = self.wrap(queue, None, false, changes_of_many, callback);
    self.core.worker.schedule(Box::new(move || {
      core.local.read_many(keys, core.worker.handle(), wrapped);
    }));
  }

  /// Persist one entity.
  pub fn write<S, F>(&self, item: T, queue: S, callback: F)
  where
    S: Scheduler + Send + 'static,
    F: FnOnce(T) + Send + 'static,
  {
    let core = self.core.clone();
    let wrapped = self.wrap(queue, None, false, changes_of_one, callback);
    self.core.worker.schedule(Box::new(move || {
      core.local.write(item, core.worker.handle(), wrapped);
    }));
  }

  /// Persist several entities.
  pub fn write_many<S, F>(&self, items: Vec<T>, queue: S, callback: F)
  where
    S: Scheduler + Send + 'static,
    F: FnOnce(Vec<T>) + Send + 'static,
  {
    let core = self.core.clone();
    let wrapped = self.wrap(queue, None, false, changes_of_many, callback);
    self.core.worker.schedule(Box::new(move || {
      core.local.write_many(items, core.worker.handle(), wrapped);
    }));
  }

  /// Remove one entity. Subscribers of its key observe `None` afterwards:
  /// the deleted form goes to the caller, absence goes to the cache.
  pub fn delete<S, F>(&self, item: T, queue: S, callback: F)
  where
    S: Scheduler + Send + 'static,
    F: FnOnce(T) + Send + 'static,
  {
    let core = self.core.clone();
    let wrapped = self.wrap(queue, None, true, changes_of_one, callback);
    self.core.worker.schedule(Box::new(move || {
      core.local.delete(item, core.worker.handle(), wrapped);
    }));
  }

  // ==================== Subscriptions ====================

  /// The behavior stream for `key`, created absent-valued if nobody is
  /// watching it yet.
  ///
  /// This performs a synchronous, bounded hand-off to the confinement worker
  /// (cache lookup only, never I/O).
  ///
  /// # Panics
  ///
  /// Panics if the confinement worker is gone. That state is unreachable
  /// while the provider is alive; keep the provider alive for as long as any
  /// caller may subscribe.
  pub fn subscribe(&self, key: T::Key) -> BehaviorSubject<T> {
    let (sender, receiver) = channel();
    let core = self.core.clone();
    self.core.worker.schedule(Box::new(move || {
      let subject = core.find_or_create_subject(&key);
      let _ = sender.send(subject);
    }));
    receiver
      .recv()
      .expect("rxstore: subscribe on a provider whose confinement queue has shut down")
  }

  /// Number of live cache entries; a diagnostic with the same bounded
  /// hand-off as [`subscribe`](Provider::subscribe).
  pub fn subject_count(&self) -> usize {
    let (sender, receiver) = channel();
    let core = self.core.clone();
    self.core.worker.schedule(Box::new(move || {
      let _ = sender.send(core.subjects.lock().unwrap().len());
    }));
    receiver
      .recv()
      .expect("rxstore: subject_count on a provider whose confinement queue has shut down")
  }

  // ==================== Callback wrapping ====================

  /// Turn a storage callback into one that also feeds the subject cache.
  ///
  /// Whatever context the storage collaborator fires on, the wrapped callback
  /// dispatches the caller's callback onto `queue` and re-enters the
  /// confinement worker once per implied cache update. Neither delivery
  /// suppresses or waits for the other. `fallback` is the requested key of a
  /// by-key read: an empty result still pushes `None` to that key.
  /// `tombstone` flips every update to absence (deletes).
  fn wrap<R, S, F>(
    &self,
    queue: S,
    fallback: Option<T::Key>,
    tombstone: bool,
    changes: fn(&R) -> Changes<T>,
    callback: F,
  ) -> StorageCallback<R>
  where
    R: Send + 'static,
    S: Scheduler + Send + 'static,
    F: FnOnce(R) + Send + 'static,
  {
    let weak = Arc::downgrade(&self.core);
    let worker = self.core.worker.handle();
    Box::new(move |result: R| {
      let mut updates = changes(&result);
      if updates.is_empty() {
        if let Some(key) = fallback {
          updates.push((key, None));
        }
      }
      if tombstone {
        for update in updates.iter_mut() {
          update.1 = None;
        }
      }
      // Fan-out is enqueued before the caller's delivery is dispatched, so
      // once the caller has its result the cache update is already in line.
      for (key, value) in updates {
        let weak = Weak::clone(&weak);
        worker.schedule(Box::new(move || {
          if let Some(core) = weak.upgrade() {
            core.notify(&key, value);
          }
        }));
      }
      queue.schedule(Box::new(move || callback(result)));
    })
  }
}

fn changes_of_one<T: Keyed + Clone>(result: &T) -> Changes<T> {
  smallvec![(result.key(), Some(result.clone()))]
}

fn changes_of_optional<T: Keyed + Clone>(result: &Option<T>) -> Changes<T> {
  match result {
    Some(item) => changes_of_one(item),
    None => SmallVec::new(),
  }
}

fn changes_of_many<T: Keyed + Clone>(results: &Vec<T>) -> Changes<T> {
  results
    .iter()
    .map(|item| (item.key(), Some(item.clone())))
    .collect()
}

impl<T> ProviderCore<T>
where
  T: Keyed + Clone + Send + 'static,
{
  /// Runs on the confinement worker only.
  fn find_or_create_subject(self: &Arc<Self>, key: &T::Key) -> BehaviorSubject<T> {
    let mut subjects = self.subjects.lock().unwrap();
    if let Some(existing) = subjects.get(key) {
      return existing.clone();
    }
    let subject = (self.factory)();
    let weak = Arc::downgrade(self);
    let worker = self.worker.handle();
    let hook_key = key.clone();
    // The hook must not keep the provider alive: entries never own the core.
    subject.set_on_empty(move || {
      let weak = Weak::clone(&weak);
      let key = hook_key.clone();
      worker.schedule(Box::new(move || {
        if let Some(core) = weak.upgrade() {
          core.clear_unused_subject(&key);
        }
      }));
    });
    subjects.insert(key.clone(), subject.clone());
    debug!(subjects = subjects.len(), "created subject for newly watched key");
    subject
  }

  /// Runs on the confinement worker only. Re-checks the live subscriber
  /// count: a subscriber arriving between the empty signal and this cleanup
  /// keeps the entry.
  fn clear_unused_subject(&self, key: &T::Key) {
    let mut subjects = self.subjects.lock().unwrap();
    if let Some(subject) = subjects.get(key) {
      if subject.is_empty() {
        subjects.remove(key);
        debug!(subjects = subjects.len(), "evicted unobserved subject");
      }
    }
  }

  /// Runs on the confinement worker only. A key nobody watches is a no-op;
  /// no subject is ever created speculatively.
  fn notify(&self, key: &T::Key, value: Option<T>) {
    let subject = self.subjects.lock().unwrap().get(key).cloned();
    if let Some(subject) = subject {
      trace!(absent = value.is_none(), "notifying subscribers");
      subject.next(value);
    }
  }
}

impl<T: Keyed> Drop for ProviderCore<T> {
  fn drop(&mut self) {
    // Subscribers outliving the provider observe completion, not silence.
    let subjects: Vec<_> = self
      .subjects
      .lock()
      .unwrap()
      .drain()
      .map(|(_, subject)| subject)
      .collect();
    for subject in subjects {
      subject.complete();
    }
  }
}

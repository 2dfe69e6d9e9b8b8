//! Hot, replay-latest behavior subjects.
//!
//! A [`BehaviorSubject`] multicasts the current value of one entity, or its
//! absence, to every subscriber. New subscribers immediately receive the
//! latest known value, then every subsequent pushed value in arrival order.
//! The provider keeps one subject per watched key.

use std::convert::Infallible;
use std::mem;
use std::sync::{Arc, Mutex};

use smallvec::SmallVec;

use crate::observer::{BoxedObserverSend, FnMutObserver, Observer};
use crate::subscription::{CellArc, Subscription, SubscriptionState};

type OnEmpty = Box<dyn Fn() + Send>;

// ============================================================================
// Subscribers
// ============================================================================

struct Entry<Ob> {
  state: CellArc<SubscriptionState>,
  observer: Ob,
}

/// The subscriber list of one subject.
///
/// Entries carry the shared state cell of their subscription handle, so a
/// cancelled entry can linger until whoever next holds the subject lock
/// prunes it. Broadcast clones the value for all live observers but the last,
/// which receives it moved.
pub(crate) struct Subscribers<Ob> {
  entries: SmallVec<[Entry<Ob>; 2]>,
}

impl<Ob> Default for Subscribers<Ob> {
  fn default() -> Self { Self { entries: SmallVec::new() } }
}

impl<Ob> Subscribers<Ob> {
  fn add(&mut self, observer: Ob, state: CellArc<SubscriptionState>) {
    self.entries.push(Entry { state, observer });
  }

  fn append(&mut self, other: Subscribers<Ob>) { self.entries.extend(other.entries); }

  /// Drop cancelled entries; returns how many were removed.
  fn prune(&mut self) -> usize {
    let before = self.entries.len();
    self
      .entries
      .retain(|e| e.state.get() == SubscriptionState::Active);
    before - self.entries.len()
  }

  fn live_count(&self) -> usize {
    self
      .entries
      .iter()
      .filter(|e| e.state.get() == SubscriptionState::Active)
      .count()
  }

  fn drain(&mut self) -> impl Iterator<Item = Ob> + '_ {
    self
      .entries
      .drain(..)
      .filter(|e| e.state.get() == SubscriptionState::Active)
      .map(|e| e.observer)
  }

  fn broadcast_value<Item, Err>(&mut self, value: Item)
  where
    Ob: Observer<Item, Err>,
    Item: Clone,
  {
    let mut remaining = self.live_count();
    if remaining == 0 {
      return;
    }
    for entry in self.entries.iter_mut() {
      if entry.state.get() != SubscriptionState::Active {
        continue;
      }
      remaining -= 1;
      if remaining == 0 {
        entry.observer.next(value);
        break;
      }
      entry.observer.next(value.clone());
    }
  }
}

// ============================================================================
// BehaviorSubject
// ============================================================================

struct BehaviorCore<Item, Err> {
  latest: Option<Item>,
  subscribers: Subscribers<BoxedObserverSend<Option<Item>, Err>>,
  stopped: bool,
  broadcasting: bool,
  on_empty: Option<OnEmpty>,
}

/// A hot stream that always holds the latest known value of one entity.
///
/// The emitted item is `Option<Item>`: `None` means the entity is absent
/// (unknown, never written, or deleted). A fresh subject holds `None`.
///
/// Handles are cheap clones of the same underlying stream; see [`ptr_eq`].
///
/// Emissions must come from a single serialized context at a time; the
/// provider confines them to its worker queue. Pushing into the subject from
/// within one of its own callbacks panics.
///
/// [`ptr_eq`]: BehaviorSubject::ptr_eq
pub struct BehaviorSubject<Item, Err = Infallible> {
  core: Arc<Mutex<BehaviorCore<Item, Err>>>,
}

impl<Item, Err> Clone for BehaviorSubject<Item, Err> {
  #[inline]
  fn clone(&self) -> Self { Self { core: self.core.clone() } }
}

impl<Item, Err> Default for BehaviorSubject<Item, Err> {
  fn default() -> Self { Self::new() }
}

impl<Item, Err> BehaviorSubject<Item, Err> {
  /// A fresh, absent-valued subject.
  pub fn new() -> Self { Self::seeded(None) }

  /// A subject whose initial value is already known.
  pub fn with_value(value: Item) -> Self { Self::seeded(Some(value)) }

  fn seeded(latest: Option<Item>) -> Self {
    Self {
      core: Arc::new(Mutex::new(BehaviorCore {
        latest,
        subscribers: Subscribers::default(),
        stopped: false,
        broadcasting: false,
        on_empty: None,
      })),
    }
  }

  /// Number of live subscribers.
  pub fn subscriber_count(&self) -> usize {
    self.core.lock().unwrap().subscribers.live_count()
  }

  pub fn is_empty(&self) -> bool { self.subscriber_count() == 0 }

  pub fn is_stopped(&self) -> bool { self.core.lock().unwrap().stopped }

  /// `true` if both handles refer to the same underlying stream.
  pub fn ptr_eq(&self, other: &Self) -> bool { Arc::ptr_eq(&self.core, &other.core) }

  /// Hook fired when pruning leaves the subject without live subscribers.
  ///
  /// The hook runs while the subject lock is held and must not block; the
  /// provider uses it to schedule cache cleanup onto its confinement queue.
  pub(crate) fn set_on_empty(&self, hook: impl Fn() + Send + 'static) {
    self.core.lock().unwrap().on_empty = Some(Box::new(hook));
  }

  /// Stop the subject and complete every live subscriber.
  pub fn complete(&self) {
    let observers: Vec<_> = {
      let mut core = self.core.lock().unwrap();
      if core.stopped {
        return;
      }
      core.stopped = true;
      core.on_empty = None;
      core.subscribers.drain().collect()
    };
    for observer in observers {
      observer.complete();
    }
  }
}

impl<Item: Clone, Err> BehaviorSubject<Item, Err> {
  /// The latest value the subject holds, `None` for absent.
  pub fn value(&self) -> Option<Item> { self.core.lock().unwrap().latest.clone() }

  /// Push a new value (or absence) to all live subscribers.
  ///
  /// Subscribers arriving mid-broadcast get the new value replayed but are
  /// not part of the in-flight emission; subscribers cancelled mid-broadcast
  /// may still receive it.
  pub fn next(&self, value: Option<Item>) {
    let mut taken = {
      let mut core = self.core.lock().unwrap();
      if core.stopped {
        return;
      }
      if core.broadcasting {
        drop(core);
        panic!("re-entrant BehaviorSubject emission: push from within a subscriber callback");
      }
      core.broadcasting = true;
      core.latest = value.clone();
      mem::take(&mut core.subscribers)
    };

    // Callbacks run without holding the subject lock, so subscribing and
    // cancelling from other threads stay unblocked during fan-out.
    taken.broadcast_value(value);

    let mut core = self.core.lock().unwrap();
    core.broadcasting = false;
    taken.append(mem::take(&mut core.subscribers));
    let removed = taken.prune();
    core.subscribers = taken;
    if removed > 0 && core.subscribers.live_count() == 0 {
      if let Some(hook) = core.on_empty.as_ref() {
        hook();
      }
    }
  }
}

impl<Item: Clone + 'static, Err: 'static> BehaviorSubject<Item, Err> {
  /// Subscribe with a full [`Observer`]. The latest value is replayed to the
  /// observer immediately, atomically with registration.
  ///
  /// The replay happens under the subject lock: do not push into the same
  /// subject from inside it, and do not unsubscribe another of its
  /// subscriptions from inside it.
  pub fn subscribe_with<O>(&self, mut observer: O) -> SubjectSubscription<Item, Err>
  where
    O: Observer<Option<Item>, Err> + Send + 'static,
  {
    let mut core = self.core.lock().unwrap();
    if core.stopped {
      observer.complete();
      let state = CellArc::new(SubscriptionState::Cancelled);
      return SubjectSubscription { core: self.core.clone(), state };
    }
    observer.next(core.latest.clone());
    let state = CellArc::new(SubscriptionState::Active);
    core.subscribers.add(Box::new(observer), state.clone());
    SubjectSubscription { core: self.core.clone(), state }
  }
}

impl<Item: Clone + 'static> BehaviorSubject<Item> {
  /// Subscribe with a closure receiving `Option<Item>`.
  pub fn subscribe<F>(&self, f: F) -> SubjectSubscription<Item>
  where
    F: FnMut(Option<Item>) + Send + 'static,
  {
    self.subscribe_with(FnMutObserver(f))
  }
}

// ============================================================================
// SubjectSubscription
// ============================================================================

/// Subscription handle for one observer of a [`BehaviorSubject`].
pub struct SubjectSubscription<Item, Err = Infallible> {
  core: Arc<Mutex<BehaviorCore<Item, Err>>>,
  state: CellArc<SubscriptionState>,
}

impl<Item, Err> Subscription for SubjectSubscription<Item, Err> {
  fn unsubscribe(self) {
    if self
      .state
      .compare_exchange(SubscriptionState::Active, SubscriptionState::Cancelled)
      .is_err()
    {
      return;
    }
    // Fan-out runs with the lock released, so this only waits on short
    // lock holders like readers and registration.
    let mut core = self.core.lock().unwrap();
    if core.broadcasting {
      // The in-flight broadcast's merge step prunes this entry and fires
      // the empty hook instead.
      return;
    }
    core.subscribers.prune();
    if !core.stopped && core.subscribers.live_count() == 0 {
      if let Some(hook) = core.on_empty.as_ref() {
        hook();
      }
    }
  }

  fn is_closed(&self) -> bool { self.state.get() == SubscriptionState::Cancelled }
}

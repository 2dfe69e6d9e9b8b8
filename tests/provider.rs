//! End-to-end provider behavior against an in-memory local store.

use std::collections::HashMap;
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use futures::executor::block_on;
use futures::StreamExt;
use rxstore::prelude::*;
use rxstore::scheduler::Job;

#[derive(Clone, Debug, PartialEq)]
struct Playlist {
  id: String,
  name: String,
}

impl Playlist {
  fn new(id: &str, name: &str) -> Self { Self { id: id.into(), name: name.into() } }
}

impl Keyed for Playlist {
  type Key = String;

  fn key(&self) -> String { self.id.clone() }
}

#[derive(Default)]
struct MemoryStore {
  rows: Arc<Mutex<HashMap<String, Playlist>>>,
}

impl LocalStorage<String, Playlist> for MemoryStore {
  fn read(&self, key: String, queue: SerialHandle, callback: StorageCallback<Option<Playlist>>) {
    let rows = self.rows.clone();
    queue.schedule(Box::new(move || callback(rows.lock().unwrap().get(&key).cloned())));
  }

  fn read_many(
    &self,
    keys: Vec<String>,
    queue: SerialHandle,
    callback: StorageCallback<Vec<Playlist>>,
  ) {
    let rows = self.rows.clone();
    queue.schedule(Box::new(move || {
      let rows = rows.lock().unwrap();
      callback(keys.iter().filter_map(|k| rows.get(k).cloned()).collect())
    }));
  }

  fn write(&self, item: Playlist, queue: SerialHandle, callback: StorageCallback<Playlist>) {
    let rows = self.rows.clone();
    queue.schedule(Box::new(move || {
      rows.lock().unwrap().insert(item.key(), item.clone());
      callback(item)
    }));
  }

  fn write_many(
    &self,
    items: Vec<Playlist>,
    queue: SerialHandle,
    callback: StorageCallback<Vec<Playlist>>,
  ) {
    let rows = self.rows.clone();
    queue.schedule(Box::new(move || {
      let mut rows = rows.lock().unwrap();
      for item in &items {
        rows.insert(item.key(), item.clone());
      }
      callback(items)
    }));
  }

  fn delete(&self, item: Playlist, queue: SerialHandle, callback: StorageCallback<Playlist>) {
    let rows = self.rows.clone();
    queue.schedule(Box::new(move || {
      rows.lock().unwrap().remove(&item.key());
      callback(item)
    }));
  }
}

/// Satisfies the remote contract; the minimal provider flow never calls it.
struct NullRemote;

impl RemoteStorage<String, Playlist> for NullRemote {
  fn read(&self, _: String, queue: SerialHandle, callback: StorageCallback<Option<Playlist>>) {
    queue.schedule(Box::new(move || callback(None)));
  }

  fn read_many(
    &self,
    _: Vec<String>,
    queue: SerialHandle,
    callback: StorageCallback<Vec<Playlist>>,
  ) {
    queue.schedule(Box::new(move || callback(Vec::new())));
  }

  fn write(&self, item: Playlist, queue: SerialHandle, callback: StorageCallback<Playlist>) {
    queue.schedule(Box::new(move || callback(item)));
  }

  fn write_many(
    &self,
    items: Vec<Playlist>,
    queue: SerialHandle,
    callback: StorageCallback<Vec<Playlist>>,
  ) {
    queue.schedule(Box::new(move || callback(items)));
  }

  fn delete(&self, item: Playlist, queue: SerialHandle, callback: StorageCallback<Playlist>) {
    queue.schedule(Box::new(move || callback(item)));
  }
}

/// Delays every job on a fresh thread; stands in for a congested caller
/// context.
struct SlowScheduler(Duration);

impl Scheduler for SlowScheduler {
  fn schedule(&self, job: Job) {
    let delay = self.0;
    thread::spawn(move || {
      thread::sleep(delay);
      job()
    });
  }
}

fn provider(name: &str) -> Provider<Playlist> {
  Provider::new(name, Arc::new(MemoryStore::default()), Arc::new(NullRemote))
}

/// Queue barrier: returns after every task scheduled before it has run.
fn flush(provider: &Provider<Playlist>) { let _ = provider.subject_count(); }

fn watch(
  subject: &BehaviorSubject<Playlist>,
) -> (Arc<Mutex<Vec<Option<Playlist>>>>, SubjectSubscription<Playlist>) {
  let seen = Arc::new(Mutex::new(Vec::new()));
  let c_seen = seen.clone();
  let sub = subject.subscribe(move |v| c_seen.lock().unwrap().push(v));
  (seen, sub)
}

#[test]
fn single_stream_per_key() {
  let provider = provider("single-stream");
  let first = provider.subscribe("k".to_owned());
  let second = provider.subscribe("k".to_owned());
  assert!(first.ptr_eq(&second));
  assert!(!first.ptr_eq(&provider.subscribe("other".to_owned())));
}

#[test]
fn creation_is_lazy() {
  let provider = provider("lazy");
  assert_eq!(provider.subject_count(), 0);

  // Reads and writes never create cache entries on their own.
  let (done, wait) = channel();
  provider.write(Playlist::new("k", "a"), InlineScheduler, move |w| done.send(w).unwrap());
  wait.recv().unwrap();
  flush(&provider);
  assert_eq!(provider.subject_count(), 0);

  let _subject = provider.subscribe("k".to_owned());
  assert_eq!(provider.subject_count(), 1);
}

#[test]
fn cleanup_after_last_unsubscribe_yields_fresh_state() {
  let provider = provider("cleanup");
  let subject = provider.subscribe("k".to_owned());
  let (seen, sub) = watch(&subject);

  let (done, wait) = channel();
  provider.write(Playlist::new("k", "x"), InlineScheduler, move |w| done.send(w).unwrap());
  wait.recv().unwrap();
  flush(&provider);
  assert_eq!(
    *seen.lock().unwrap(),
    vec![None, Some(Playlist::new("k", "x"))]
  );

  sub.unsubscribe();
  flush(&provider);
  assert_eq!(provider.subject_count(), 0);

  // A later subscriber gets a freshly-initialized absent stream, not the
  // stale one.
  let fresh = provider.subscribe("k".to_owned());
  assert!(!fresh.ptr_eq(&subject));
  assert_eq!(fresh.value(), None);
}

#[test]
fn entry_survives_dispose_while_another_subscriber_is_live() {
  let provider = provider("race");
  let subject = provider.subscribe("k".to_owned());
  let (_, sub_a) = watch(&subject);
  let (seen_b, _sub_b) = watch(&provider.subscribe("k".to_owned()));

  sub_a.unsubscribe();
  flush(&provider);
  assert_eq!(provider.subject_count(), 1);

  let (done, wait) = channel();
  provider.write(Playlist::new("k", "still-here"), InlineScheduler, move |w| {
    done.send(w).unwrap()
  });
  wait.recv().unwrap();
  flush(&provider);
  assert_eq!(
    seen_b.lock().unwrap().last().unwrap(),
    &Some(Playlist::new("k", "still-here"))
  );
}

#[test]
fn fan_out_preserves_per_key_write_order() {
  let provider = provider("ordering");
  let subject = provider.subscribe("k".to_owned());
  let (seen, _sub) = watch(&subject);

  let (done, wait) = channel();
  let d1 = done.clone();
  provider.write(Playlist::new("k", "first"), InlineScheduler, move |w| d1.send(w).unwrap());
  provider.write(Playlist::new("k", "second"), InlineScheduler, move |w| done.send(w).unwrap());
  wait.recv().unwrap();
  wait.recv().unwrap();
  flush(&provider);

  assert_eq!(
    *seen.lock().unwrap(),
    vec![
      None,
      Some(Playlist::new("k", "first")),
      Some(Playlist::new("k", "second")),
    ]
  );
}

#[test]
fn reading_a_missing_key_delivers_absence() {
  let provider = provider("absent");
  let subject = provider.subscribe("ghost".to_owned());
  let (seen, _sub) = watch(&subject);

  let (done, wait) = channel();
  provider.read("ghost".to_owned(), InlineScheduler, move |r| done.send(r).unwrap());
  assert_eq!(wait.recv().unwrap(), None);
  flush(&provider);

  // Replayed absence at subscribe time, then the read's absent result:
  // absence is delivered, never silence.
  assert_eq!(*seen.lock().unwrap(), vec![None, None]);
}

#[test]
fn caller_delivery_and_fan_out_are_independent() {
  let provider = provider("independent");
  let subject = provider.subscribe("k".to_owned());
  let (seen, _sub) = watch(&subject);

  let (done, wait) = channel();
  provider.write(
    Playlist::new("k", "x"),
    SlowScheduler(Duration::from_millis(300)),
    move |w| done.send(w).unwrap(),
  );

  // One barrier per queue hop: dispatch to storage, the storage job itself,
  // then the fan-out it scheduled.
  flush(&provider);
  flush(&provider);
  flush(&provider);
  // Subscribers already saw the write even though the caller's callback is
  // still stuck behind its slow scheduler.
  assert_eq!(seen.lock().unwrap().last().unwrap(), &Some(Playlist::new("k", "x")));
  assert_eq!(wait.try_recv(), Err(std::sync::mpsc::TryRecvError::Empty));

  // And the delayed delivery still happens.
  match wait.recv_timeout(Duration::from_secs(5)) {
    Ok(written) => assert_eq!(written, Playlist::new("k", "x")),
    Err(RecvTimeoutError::Timeout) => panic!("caller callback never arrived"),
    Err(RecvTimeoutError::Disconnected) => panic!("caller callback dropped"),
  }
}

#[test]
fn batch_operations_fan_out_per_entity() {
  let provider = provider("batch");
  let (seen_a, _sa) = watch(&provider.subscribe("a".to_owned()));
  let (seen_b, _sb) = watch(&provider.subscribe("b".to_owned()));

  let (done, wait) = channel();
  provider.write_many(
    vec![Playlist::new("a", "one"), Playlist::new("b", "two")],
    InlineScheduler,
    move |written| done.send(written).unwrap(),
  );
  assert_eq!(wait.recv().unwrap().len(), 2);
  flush(&provider);

  assert_eq!(seen_a.lock().unwrap().last().unwrap(), &Some(Playlist::new("a", "one")));
  assert_eq!(seen_b.lock().unwrap().last().unwrap(), &Some(Playlist::new("b", "two")));

  let (done, wait) = channel();
  provider.read_many(
    vec!["a".to_owned(), "b".to_owned(), "missing".to_owned()],
    InlineScheduler,
    move |found| done.send(found).unwrap(),
  );
  assert_eq!(
    wait.recv().unwrap(),
    vec![Playlist::new("a", "one"), Playlist::new("b", "two")]
  );
}

#[test]
fn end_to_end_write_then_delete() {
  let provider = provider("end-to-end");
  let subject = provider.subscribe("k1".to_owned());
  let (seen, _sub) = watch(&subject);
  assert_eq!(*seen.lock().unwrap(), vec![None]);

  let (done, wait) = channel();
  provider.write(Playlist::new("k1", "x"), InlineScheduler, move |w| done.send(w).unwrap());
  assert_eq!(wait.recv().unwrap(), Playlist::new("k1", "x"));
  flush(&provider);
  assert_eq!(seen.lock().unwrap().last().unwrap(), &Some(Playlist::new("k1", "x")));

  let (done, wait) = channel();
  provider.delete(Playlist::new("k1", "x"), InlineScheduler, move |d| done.send(d).unwrap());
  assert_eq!(wait.recv().unwrap(), Playlist::new("k1", "x"));
  flush(&provider);

  // Deletion surfaces to subscribers as absence.
  assert_eq!(
    *seen.lock().unwrap(),
    vec![None, Some(Playlist::new("k1", "x")), None]
  );

  // And the store agrees: a fresh read finds nothing.
  let (done, wait) = channel();
  provider.read("k1".to_owned(), InlineScheduler, move |r| done.send(r).unwrap());
  assert_eq!(wait.recv().unwrap(), None);
}

#[test]
fn dropping_the_provider_completes_streams() {
  let provider = provider("drop");
  let subject = provider.subscribe("k".to_owned());
  let stream = subject.to_stream();
  drop(provider);

  // The stream ends instead of hanging; the only item is the replayed
  // absence from subscription time.
  let seen: Vec<_> = block_on(stream.collect());
  assert_eq!(seen, vec![None]);
}

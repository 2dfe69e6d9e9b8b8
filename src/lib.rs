//! # rxstore: a queue-confined reactive data provider
//!
//! A [`Provider`] sits between a caller, a local (durable) store, and a
//! remote (authoritative) store, and exposes both one-shot asynchronous
//! reads/writes and continuous subscriptions to the current value of an
//! entity identified by a key.
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Provider`] | The queue-confined core: cache, fan-out, storage dispatch |
//! | [`Keyed`] | Key projection every entity type supplies |
//! | [`BehaviorSubject`] | Hot, replay-latest stream of one entity's value |
//! | [`LocalStorage`] / [`RemoteStorage`] | Pluggable storage collaborators |
//! | [`Scheduler`] | Execution context for callback delivery |
//!
//! ## Quick Start
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::{Arc, Mutex};
//!
//! use rxstore::prelude::*;
//!
//! #[derive(Clone)]
//! struct Note {
//!   id: String,
//!   body: String,
//! }
//!
//! impl Keyed for Note {
//!   type Key = String;
//!   fn key(&self) -> String { self.id.clone() }
//! }
//!
//! // A toy local store; real collaborators would persist and sync.
//! #[derive(Default)]
//! struct MemoryStore {
//!   rows: Arc<Mutex<HashMap<String, Note>>>,
//! }
//!
//! impl LocalStorage<String, Note> for MemoryStore {
//!   fn read(&self, key: String, queue: SerialHandle, callback: StorageCallback<Option<Note>>) {
//!     let rows = self.rows.clone();
//!     queue.schedule(Box::new(move || callback(rows.lock().unwrap().get(&key).cloned())));
//!   }
//!
//!   fn read_many(&self, keys: Vec<String>, queue: SerialHandle, callback: StorageCallback<Vec<Note>>) {
//!     let rows = self.rows.clone();
//!     queue.schedule(Box::new(move || {
//!       let rows = rows.lock().unwrap();
//!       callback(keys.iter().filter_map(|k| rows.get(k).cloned()).collect())
//!     }));
//!   }
//!
//!   fn write(&self, item: Note, queue: SerialHandle, callback: StorageCallback<Note>) {
//!     let rows = self.rows.clone();
//!     queue.schedule(Box::new(move || {
//!       rows.lock().unwrap().insert(item.key(), item.clone());
//!       callback(item)
//!     }));
//!   }
//!
//!   fn write_many(&self, items: Vec<Note>, queue: SerialHandle, callback: StorageCallback<Vec<Note>>) {
//!     let rows = self.rows.clone();
//!     queue.schedule(Box::new(move || {
//!       let mut rows = rows.lock().unwrap();
//!       for item in &items {
//!         rows.insert(item.key(), item.clone());
//!       }
//!       callback(items)
//!     }));
//!   }
//!
//!   fn delete(&self, item: Note, queue: SerialHandle, callback: StorageCallback<Note>) {
//!     let rows = self.rows.clone();
//!     queue.schedule(Box::new(move || {
//!       rows.lock().unwrap().remove(&item.key());
//!       callback(item)
//!     }));
//!   }
//! }
//!
//! // Remote sync is the local collaborator's concern in the minimal flow;
//! // a no-op remote satisfies the contract.
//! struct NullRemote;
//! impl RemoteStorage<String, Note> for NullRemote {
//!   fn read(&self, _: String, queue: SerialHandle, callback: StorageCallback<Option<Note>>) {
//!     queue.schedule(Box::new(move || callback(None)));
//!   }
//!   fn read_many(&self, _: Vec<String>, queue: SerialHandle, callback: StorageCallback<Vec<Note>>) {
//!     queue.schedule(Box::new(move || callback(Vec::new())));
//!   }
//!   fn write(&self, item: Note, queue: SerialHandle, callback: StorageCallback<Note>) {
//!     queue.schedule(Box::new(move || callback(item)));
//!   }
//!   fn write_many(&self, items: Vec<Note>, queue: SerialHandle, callback: StorageCallback<Vec<Note>>) {
//!     queue.schedule(Box::new(move || callback(items)));
//!   }
//!   fn delete(&self, item: Note, queue: SerialHandle, callback: StorageCallback<Note>) {
//!     queue.schedule(Box::new(move || callback(item)));
//!   }
//! }
//!
//! let provider = Provider::new("notes", Arc::new(MemoryStore::default()), Arc::new(NullRemote));
//!
//! // Watching a key that does not exist yet observes absence, not silence.
//! let subject = provider.subscribe("n1".to_owned());
//! let _watch = subject.subscribe(|note| match note {
//!   Some(note) => println!("n1 is now {:?}", note.body),
//!   None => println!("n1 is absent"),
//! });
//!
//! let (done, wait) = std::sync::mpsc::channel();
//! provider.write(
//!   Note { id: "n1".into(), body: "hello".into() },
//!   InlineScheduler,
//!   move |written| { done.send(written.body).unwrap(); },
//! );
//! assert_eq!(wait.recv().unwrap(), "hello");
//! ```
//!
//! ## Design
//!
//! The provider owns exactly one serialized execution context and passes
//! every cache read and write through it: cooperative single-writer
//! confinement instead of lock juggling. Storage collaborators run wherever
//! they like; their callbacks are wrapped so the result reaches the caller on
//! the caller's scheduler *and* re-enters the confinement queue to fan out to
//! subscribers, independently. Subjects are created lazily on first
//! subscription and evicted when their last subscriber leaves, with the
//! subscriber count re-checked on the queue so a racing new subscriber keeps
//! the entry.

pub mod observer;
pub mod prelude;
pub mod provider;
pub mod scheduler;
pub mod storage;
pub mod stream;
pub mod subject;
pub mod subscription;

pub use prelude::*;

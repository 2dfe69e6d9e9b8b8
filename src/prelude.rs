//! The rxstore prelude.

pub use crate::observer::{FnMutObserver, Observer};
pub use crate::provider::{Keyed, Provider};
pub use crate::scheduler::{
  InlineScheduler, PoolScheduler, Scheduler, SerialHandle, SerialScheduler,
};
pub use crate::storage::{LocalStorage, RemoteStorage, StorageCallback};
pub use crate::stream::SubjectStream;
pub use crate::subject::{BehaviorSubject, SubjectSubscription};
pub use crate::subscription::{Subscription, SubscriptionGuard};

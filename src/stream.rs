//! Async interop: consume a subject as a `futures` stream.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::mpsc::{unbounded, UnboundedReceiver};
use futures::Stream;

use crate::subject::{BehaviorSubject, SubjectSubscription};
use crate::subscription::SubscriptionGuard;

pin_project_lite::pin_project! {
  /// A `Stream` of `Option<Item>` values mirrored from a [`BehaviorSubject`].
  ///
  /// The first item is the subject's latest value at subscription time.
  /// The stream ends when the subject completes; dropping the stream
  /// unsubscribes.
  pub struct SubjectStream<Item> {
    #[pin]
    receiver: UnboundedReceiver<Option<Item>>,
    guard: SubscriptionGuard<SubjectSubscription<Item>>,
  }
}

impl<Item> Stream for SubjectStream<Item> {
  type Item = Option<Item>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    self.project().receiver.poll_next(cx)
  }
}

impl<Item: Clone + Send + 'static> BehaviorSubject<Item> {
  /// Mirror this subject into a [`SubjectStream`] for `async` consumers.
  pub fn to_stream(&self) -> SubjectStream<Item> {
    let (sender, receiver) = unbounded();
    let subscription = self.subscribe(move |value| {
      let _ = sender.unbounded_send(value);
    });
    SubjectStream { receiver, guard: SubscriptionGuard::new(subscription) }
  }
}

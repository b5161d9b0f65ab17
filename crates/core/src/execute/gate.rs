//! Claim/join coordination for multiply-reachable execution items.
//!
//! A diamond-shaped graph lets several branches reach the same item. Each
//! item carries a gate sized to the number of distinct paths that will visit
//! it: the first path to claim performs the work, every path signals its
//! arrival, and the join releases once the fan-in count reaches zero. An
//! atomic claim plus a counter, not a lock, so racing branches cannot
//! deadlock on the node.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::Notify;

#[derive(Debug)]
pub(crate) struct ArrivalGate {
  claimed: AtomicBool,
  remaining: AtomicUsize,
  released: Notify,
}

impl ArrivalGate {
  /// `expected` is the number of paths that will visit this gate.
  pub(crate) fn new(expected: usize) -> Self {
    Self {
      claimed: AtomicBool::new(false),
      remaining: AtomicUsize::new(expected),
      released: Notify::new(),
    }
  }

  /// True for exactly the first caller.
  pub(crate) fn claim(&self) -> bool {
    !self.claimed.swap(true, Ordering::AcqRel)
  }

  /// Signal that one visiting path is done with this item.
  pub(crate) fn arrive(&self) {
    if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
      self.released.notify_waiters();
    }
  }

  /// Wait until every expected path has arrived.
  pub(crate) async fn join(&self) {
    loop {
      let notified = self.released.notified();
      tokio::pin!(notified);
      // register before re-checking, or a release between the check and the
      // await would be lost
      notified.as_mut().enable();
      if self.remaining.load(Ordering::Acquire) == 0 {
        return;
      }
      notified.await;
    }
  }
}

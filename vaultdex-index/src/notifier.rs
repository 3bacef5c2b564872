//! Throttled change notification
//!
//! Rapid successive scans produce a burst of `notify_change` calls. The
//! notifier delivers the first one straight away when the throttle window has
//! elapsed, and folds the rest of the burst into a single trailing delivery at
//! the end of the window. User-triggered mutations use [`ChangeNotifier::notify_now`]
//! and skip the throttle.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::revision::Revision;
use crate::timer::Timer;

/// What listeners receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotice {
    /// Index revision at delivery time
    pub revision: Revision,
    /// True when delivered through the unthrottled path
    pub immediate: bool,
}

/// Handle returned by [`ChangeNotifier::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Listener callback
pub type Listener = Box<dyn FnMut(&ChangeNotice) + Send>;

/// Publish/subscribe hub with a leading-and-trailing throttle
pub struct ChangeNotifier {
    listeners: Vec<(SubscriptionId, Listener)>,
    next_id: u64,
    window: Duration,
    last_delivery: Option<Duration>,
    trailing: Timer,
    pending: Option<Revision>,
    deliveries: u64,
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("listeners", &self.listeners.len())
            .field("window", &self.window)
            .field("last_delivery", &self.last_delivery)
            .field("trailing", &self.trailing)
            .field("deliveries", &self.deliveries)
            .finish()
    }
}

impl ChangeNotifier {
    /// Create a notifier delivering at most once per `window`
    pub fn new(window: Duration) -> Self {
        ChangeNotifier {
            listeners: Vec::new(),
            next_id: 1,
            window,
            last_delivery: None,
            trailing: Timer::new(),
            pending: None,
            deliveries: 0,
        }
    }

    /// Register a listener
    pub fn subscribe(&mut self, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Remove a listener; returns false if it was not registered
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    /// Number of deliveries made so far
    pub fn delivery_count(&self) -> u64 {
        self.deliveries
    }

    /// Throttled notification
    ///
    /// Returns true if listeners were called during this call.
    pub fn notify_change(&mut self, now: Duration, revision: Revision) -> bool {
        if self.trailing.is_pending() {
            self.pending = Some(revision);
            return false;
        }

        match self.last_delivery {
            Some(last) if now < last + self.window => {
                self.pending = Some(revision);
                self.trailing.schedule_after(last, self.window);
                tracing::trace!("Change notification deferred to {:?}", last + self.window);
                false
            }
            _ => {
                self.deliver(now, revision, false);
                true
            }
        }
    }

    /// Unthrottled notification; supersedes any pending trailing delivery
    pub fn notify_now(&mut self, now: Duration, revision: Revision) {
        self.trailing.cancel();
        self.pending = None;
        self.deliver(now, revision, true);
    }

    /// Deliver the trailing notification if its deadline has passed
    pub fn poll(&mut self, now: Duration) -> bool {
        if !self.trailing.fire_if_due(now) {
            return false;
        }
        match self.pending.take() {
            Some(revision) => {
                self.deliver(now, revision, false);
                true
            }
            None => false,
        }
    }

    /// When the trailing delivery is due, if one is pending
    pub fn next_deadline(&self) -> Option<Duration> {
        self.trailing.deadline()
    }

    fn deliver(&mut self, now: Duration, revision: Revision, immediate: bool) {
        self.last_delivery = Some(now);
        self.deliveries += 1;
        let notice = ChangeNotice {
            revision,
            immediate,
        };
        tracing::debug!(
            "Delivering change notice {} to {} listener(s)",
            revision,
            self.listeners.len()
        );
        for (_, listener) in self.listeners.iter_mut() {
            listener(&notice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recording(notifier: &mut ChangeNotifier) -> (SubscriptionId, Arc<Mutex<Vec<ChangeNotice>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = notifier.subscribe(Box::new(move |notice| sink.lock().push(*notice)));
        (id, seen)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_burst_is_coalesced() {
        let mut notifier = ChangeNotifier::new(ms(250));
        let (_, seen) = recording(&mut notifier);

        assert!(notifier.notify_change(ms(0), Revision(1)));
        assert!(!notifier.notify_change(ms(10), Revision(2)));
        assert!(!notifier.notify_change(ms(20), Revision(3)));
        assert_eq!(notifier.next_deadline(), Some(ms(250)));

        assert!(!notifier.poll(ms(249)));
        assert!(notifier.poll(ms(250)));
        assert!(!notifier.poll(ms(400)));

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].revision, Revision(1));
        assert_eq!(seen[1].revision, Revision(3));
    }

    #[test]
    fn test_leading_delivery_after_quiet_window() {
        let mut notifier = ChangeNotifier::new(ms(250));
        let (_, seen) = recording(&mut notifier);

        notifier.notify_change(ms(0), Revision(1));
        assert!(notifier.notify_change(ms(300), Revision(2)));
        assert_eq!(seen.lock().len(), 2);
        assert_eq!(notifier.next_deadline(), None);
    }

    #[test]
    fn test_immediate_path_cancels_trailing() {
        let mut notifier = ChangeNotifier::new(ms(250));
        let (_, seen) = recording(&mut notifier);

        notifier.notify_change(ms(0), Revision(1));
        notifier.notify_change(ms(10), Revision(2));
        notifier.notify_now(ms(20), Revision(3));
        assert!(!notifier.poll(ms(1000)));

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].immediate);
        assert_eq!(seen[1].revision, Revision(3));
    }

    #[test]
    fn test_unsubscribe() {
        let mut notifier = ChangeNotifier::new(ms(250));
        let (id, seen) = recording(&mut notifier);
        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        notifier.notify_now(ms(0), Revision(1));
        assert!(seen.lock().is_empty());
        assert_eq!(notifier.delivery_count(), 1);
    }
}

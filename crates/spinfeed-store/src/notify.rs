//! Change notification handle for push-notified ingestion.
//!
//! [`crate::outcomes::OutcomeRepo::insert`] calls
//! [`ChangeNotifier::notify`] after committing a new outcome; the
//! ingester awaits [`ChangeNotifier::notified`] instead of sleeping a
//! full poll interval. A notification sent while nobody is waiting is
//! retained, so a wake-up is never lost between loop turns.

use std::sync::Arc;

use tokio::sync::Notify;

/// Cloneable wake-up handle shared between the store writer and the
/// ingester.
#[derive(Clone, Debug, Default)]
pub struct ChangeNotifier {
    inner: Arc<Notify>,
}

impl ChangeNotifier {
    /// Create a fresh notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal that new outcomes were committed.
    pub fn notify(&self) {
        self.inner.notify_one();
    }

    /// Wait until the next notification (or return immediately if one
    /// arrived since the last wait).
    pub async fn notified(&self) {
        self.inner.notified().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

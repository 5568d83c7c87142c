// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Desktop notifications for loop completion.

/// Adapter for sending notifications.
pub trait Notifier: Send + Sync {
    /// Send a notification with a title and message body. Best-effort;
    /// failures are logged, never surfaced.
    fn notify(&self, title: &str, message: &str);
}

/// Desktop notification adapter using notify-rust.
///
/// On macOS, `notify-rust` uses `mac-notification-sys` (Cocoa bindings) to
/// send notifications via the Notification Center. The first notification
/// triggers `ensure_application_set()` which runs an AppleScript to look up
/// a bundle identifier; without Automation permissions that AppleScript
/// blocks forever. We pre-set the bundle identifier at construction time to
/// bypass the lookup entirely.
#[derive(Clone, Copy, Debug, Default)]
pub struct DesktopNotifier;

impl DesktopNotifier {
    pub fn new() -> Self {
        #[cfg(target_os = "macos")]
        {
            let _ = mac_notification_sys::set_application("com.apple.Terminal");
        }
        Self
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, message: &str) {
        let title = title.to_string();
        let message = message.to_string();
        // Fire-and-forget on a short-lived thread; showing a notification
        // can block on the session bus.
        std::thread::spawn(move || {
            match notify_rust::Notification::new().summary(&title).body(&message).show() {
                Ok(_) => tracing::debug!(%title, "desktop notification sent"),
                Err(e) => tracing::warn!(%title, error = %e, "desktop notification failed"),
            }
        });
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::Notifier;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Recorded notification
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct NotifyCall {
        pub title: String,
        pub message: String,
    }

    /// Fake notifier for testing
    #[derive(Clone, Default)]
    pub struct FakeNotifier {
        calls: Arc<Mutex<Vec<NotifyCall>>>,
    }

    impl FakeNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<NotifyCall> {
            self.calls.lock().clone()
        }
    }

    impl Notifier for FakeNotifier {
        fn notify(&self, title: &str, message: &str) {
            self.calls
                .lock()
                .push(NotifyCall { title: title.to_string(), message: message.to_string() });
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeNotifier, NotifyCall};

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;

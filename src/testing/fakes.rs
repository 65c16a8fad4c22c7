//! Recording collaborators for tests and harnesses.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::{self, BoxFuture};

use crate::alerts::{NotificationIntent, NotificationKind};
use crate::engine::backend::{LiveStatusDisplay, NotificationService, PermissionService, PermissionStatus};
use crate::error::NotificationError;

/// Notification service that records every call
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    scheduled: Mutex<Vec<(NotificationIntent, Duration, bool)>>,
    cancellations: AtomicUsize,
    failures: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    /// Make the next `schedule` call fail with `reason`
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.failures.lock().unwrap().push(reason.into());
    }

    pub fn scheduled(&self) -> Vec<(NotificationIntent, Duration, bool)> {
        self.scheduled.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.scheduled
            .lock()
            .unwrap()
            .iter()
            .map(|(intent, _, _)| intent.kind)
            .collect()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }

    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }
}

impl NotificationService for RecordingNotifier {
    fn schedule(
        &self,
        intent: &NotificationIntent,
        delay: Duration,
        repeats: bool,
    ) -> Result<(), NotificationError> {
        if let Some(reason) = self.failures.lock().unwrap().pop() {
            return Err(NotificationError::ScheduleFailed { reason });
        }
        self.scheduled
            .lock()
            .unwrap()
            .push((intent.clone(), delay, repeats));
        Ok(())
    }

    fn cancel_all(&self) {
        self.cancellations.fetch_add(1, Ordering::SeqCst);
    }
}

/// One call received by a [`RecordingDisplay`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayCall {
    Start { is_first_start: bool },
    Update { is_active: bool },
    Stop,
}

#[derive(Debug, Default)]
pub struct RecordingDisplay {
    calls: Mutex<Vec<DisplayCall>>,
}

impl RecordingDisplay {
    pub fn calls(&self) -> Vec<DisplayCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl LiveStatusDisplay for RecordingDisplay {
    fn on_start(&self, is_first_start: bool) {
        self.calls
            .lock()
            .unwrap()
            .push(DisplayCall::Start { is_first_start });
    }

    fn on_update(&self, is_active: bool) {
        self.calls
            .lock()
            .unwrap()
            .push(DisplayCall::Update { is_active });
    }

    fn on_stop(&self) {
        self.calls.lock().unwrap().push(DisplayCall::Stop);
    }
}

/// Permission service with a scripted answer to the prompt
///
/// Answering the prompt with a grant flips the status to `Granted`, like a
/// real OS prompt.
#[derive(Debug)]
pub struct ScriptedPermissions {
    status: Mutex<PermissionStatus>,
    grant_on_request: bool,
    requests: AtomicUsize,
}

impl ScriptedPermissions {
    pub fn new(status: PermissionStatus, grant_on_request: bool) -> Self {
        Self {
            status: Mutex::new(status),
            grant_on_request,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn granted() -> Self {
        Self::new(PermissionStatus::Granted, true)
    }

    /// Not asked yet; the prompt will grant access
    pub fn undetermined() -> Self {
        Self::new(PermissionStatus::Undetermined, true)
    }

    pub fn denied() -> Self {
        Self::new(PermissionStatus::Denied, false)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl PermissionService for ScriptedPermissions {
    fn status(&self) -> PermissionStatus {
        *self.status.lock().unwrap()
    }

    fn request(&self) -> BoxFuture<'_, bool> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let granted = self.grant_on_request;
        *self.status.lock().unwrap() = if granted {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        };
        Box::pin(future::ready(granted))
    }
}

use std::cell::RefCell;
use std::rc::Rc;

use super::{EmailDispatcher, NotificationError, Notifier, OutboundEmail};

/// Keeps every email it is asked to send. Clones share the same log.
#[derive(Clone, Default)]
pub(crate) struct RecordingDispatcher(Rc<RefCell<Vec<OutboundEmail>>>);

impl RecordingDispatcher {
    pub(crate) fn sent(&self) -> Vec<OutboundEmail> {
        self.0.borrow().clone()
    }

    /// A notifier wired to this recorder.
    pub(crate) fn notifier(&self) -> Notifier {
        Notifier::new(Box::new(self.clone()), "crm@firm.test", "ops@firm.test")
    }
}

impl EmailDispatcher for RecordingDispatcher {
    fn send(&self, email: &OutboundEmail) -> Result<String, NotificationError> {
        self.0.borrow_mut().push(email.clone());
        Ok(format!("rec-{}", self.0.borrow().len()))
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

pub(crate) struct FailingDispatcher;

impl EmailDispatcher for FailingDispatcher {
    fn send(&self, _email: &OutboundEmail) -> Result<String, NotificationError> {
        Err(NotificationError::Transport("connection refused".into()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

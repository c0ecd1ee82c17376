//! Verdict policies for permission-class events.

use fanwatch_common::types::Verdict;

use crate::event::Event;

/// Decides the verdict for a permission-class event.
///
/// Called exactly once per permission event, before the event is reported.
/// Any `FnMut(&Event) -> Verdict` closure is a policy.
pub trait Policy {
    /// Returns the verdict to send for `event`.
    fn decide(&mut self, event: &Event) -> Verdict;
}

/// Observe-only policy: every queried operation is allowed.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Policy for AllowAll {
    fn decide(&mut self, _event: &Event) -> Verdict {
        Verdict::Allow
    }
}

impl<F> Policy for F
where
    F: FnMut(&Event) -> Verdict,
{
    fn decide(&mut self, event: &Event) -> Verdict {
        self(event)
    }
}

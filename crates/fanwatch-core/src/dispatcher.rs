//! The read, reply, report, close loop.
//!
//! Each event goes through the same steps in order: it is received, then
//! answered if it is a permission event, then reported, then closed. A
//! permission reply is written before anything else happens to the event.
//! Reply and read failures end the loop; the event's descriptor is closed
//! first on every path.

use std::os::fd::BorrowedFd;
use std::sync::atomic::{AtomicBool, Ordering};

use fanwatch_common::error::{FanwatchError, Result};
use fanwatch_common::flags::EventMask;
use fanwatch_common::types::Verdict;
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, poll};

use crate::channel::Channel;
use crate::event::Event;
use crate::policy::Policy;

/// Something the dispatcher can wait on, read events from, and reply to.
pub trait EventSource {
    /// Descriptor polled for readability.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is closed.
    fn descriptor(&self) -> Result<BorrowedFd<'_>>;

    /// Reads one event.
    ///
    /// # Errors
    ///
    /// Returns a read error; `WouldBlock` means the queue is empty.
    fn read_event(&mut self) -> Result<Event>;

    /// Writes a verdict for a permission event.
    ///
    /// # Errors
    ///
    /// Returns a reply error if the verdict could not be delivered.
    fn respond(&mut self, event: &Event, verdict: Verdict) -> Result<()>;
}

impl EventSource for Channel {
    fn descriptor(&self) -> Result<BorrowedFd<'_>> {
        Self::descriptor(self)
    }

    fn read_event(&mut self) -> Result<Event> {
        Self::read_event(self)
    }

    fn respond(&mut self, event: &Event, verdict: Verdict) -> Result<()> {
        Self::respond(self, event, verdict)
    }
}

/// Receives every event after any verdict has been sent.
///
/// The event's descriptor is open for the duration of the call and is
/// closed by the dispatcher afterwards, whatever the call returns.
pub trait Reporter {
    /// Reports one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the report could not be written.
    fn report(&mut self, event: &Event) -> Result<()>;
}

impl<F> Reporter for F
where
    F: FnMut(&Event) -> Result<()>,
{
    fn report(&mut self, event: &Event) -> Result<()> {
        self(event)
    }
}

/// Outcome of one readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// An event can be read.
    Readable,
    /// The descriptor signalled `POLLERR`.
    Error,
    /// Nothing happened before the timeout.
    Timeout,
}

/// What happened to one fully processed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disposition {
    /// Condition bits of the event.
    pub mask: EventMask,
    /// Process that triggered it.
    pub pid: i32,
    /// Verdict sent, if it was a permission event.
    pub verdict: Option<Verdict>,
}

/// Running totals kept by a [`Dispatcher`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events fully processed.
    pub events: u64,
    /// Verdicts written.
    pub replies: u64,
    /// Verdicts that were [`Verdict::Deny`].
    pub denials: u64,
    /// Events carrying `Q_OVERFLOW`.
    pub overflows: u64,
    /// Wake-ups that reported `POLLERR`.
    pub error_wakeups: u64,
}

/// Drives one event source on the calling thread.
#[derive(Debug)]
pub struct Dispatcher<S, P, R> {
    source: S,
    policy: P,
    reporter: R,
    poll_timeout_ms: u16,
    stats: DispatchStats,
}

impl<S, P, R> Dispatcher<S, P, R>
where
    S: EventSource,
    P: Policy,
    R: Reporter,
{
    /// Creates a dispatcher with the default readiness timeout.
    pub fn new(source: S, policy: P, reporter: R) -> Self {
        Self {
            source,
            policy,
            reporter,
            poll_timeout_ms: fanwatch_common::constants::DEFAULT_POLL_TIMEOUT_MS,
            stats: DispatchStats::default(),
        }
    }

    /// Sets the bound on each readiness wait.
    #[must_use]
    pub fn with_poll_timeout(mut self, timeout_ms: u16) -> Self {
        self.poll_timeout_ms = timeout_ms;
        self
    }

    /// Waits for the source to become readable or report an error.
    ///
    /// An interrupted wait counts as a timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FanwatchError::Read`] if `poll(2)` fails or the descriptor
    /// is invalid.
    pub fn wait(&self) -> Result<Readiness> {
        let fd = self.source.descriptor()?;
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN | PollFlags::POLLERR)];

        match poll(&mut fds, self.poll_timeout_ms) {
            Ok(0) | Err(Errno::EINTR) => return Ok(Readiness::Timeout),
            Ok(_) => {}
            Err(errno) => return Err(FanwatchError::Read { source: errno.into() }),
        }

        let revents = fds[0].revents().unwrap_or_else(PollFlags::empty);
        if revents.contains(PollFlags::POLLNVAL) {
            return Err(FanwatchError::Read {
                source: Errno::EBADF.into(),
            });
        }
        if revents.contains(PollFlags::POLLERR) {
            return Ok(Readiness::Error);
        }
        // A hang-up is surfaced by the next read.
        if revents.intersects(PollFlags::POLLIN | PollFlags::POLLHUP) {
            return Ok(Readiness::Readable);
        }
        Ok(Readiness::Timeout)
    }

    /// Reads and fully processes one event.
    ///
    /// Returns `Ok(None)` if a non-blocking read found the queue empty.
    ///
    /// # Errors
    ///
    /// Returns the read, reply, or report error that stopped processing.
    pub fn handle_next(&mut self) -> Result<Option<Disposition>> {
        let event = match self.source.read_event() {
            Ok(event) => event,
            Err(err) if err.is_would_block() => {
                tracing::trace!("woken with an empty queue");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        self.process(event).map(Some)
    }

    /// Waits once and processes at most one event.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Dispatcher::wait`] or
    /// [`Dispatcher::handle_next`].
    pub fn run_once(&mut self) -> Result<Option<Disposition>> {
        match self.wait()? {
            Readiness::Readable => self.handle_next(),
            Readiness::Error => {
                self.stats.error_wakeups += 1;
                tracing::error!("error condition on fanotify descriptor");
                Ok(None)
            }
            Readiness::Timeout => Ok(None),
        }
    }

    /// Processes events until `stop` is set, checking it after every wait.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error. Totals up to that point stay readable
    /// through [`Dispatcher::stats`].
    pub fn run(&mut self, stop: &AtomicBool) -> Result<DispatchStats> {
        tracing::info!(timeout_ms = self.poll_timeout_ms, "dispatch loop started");
        while !stop.load(Ordering::Relaxed) {
            let _ = self.run_once()?;
        }
        tracing::info!(
            events = self.stats.events,
            replies = self.stats.replies,
            overflows = self.stats.overflows,
            "dispatch loop stopped"
        );
        Ok(self.stats)
    }

    /// Totals so far.
    pub const fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Gives back the source, policy, and reporter.
    pub fn into_parts(self) -> (S, P, R) {
        (self.source, self.policy, self.reporter)
    }

    fn process(&mut self, event: Event) -> Result<Disposition> {
        self.stats.events += 1;
        if event.is_overflow() {
            self.stats.overflows += 1;
            tracing::warn!("fanotify queue overflowed, events were dropped by the kernel");
        }

        let verdict = if event.is_permission() {
            let verdict = self.policy.decide(&event);
            if let Err(err) = self.source.respond(&event, verdict) {
                tracing::error!(fd = event.raw_fd(), pid = event.pid(), error = %err, "permission reply failed");
                event.close();
                return Err(err);
            }
            self.stats.replies += 1;
            if verdict == Verdict::Deny {
                self.stats.denials += 1;
            }
            Some(verdict)
        } else {
            None
        };

        let disposition = Disposition {
            mask: event.mask(),
            pid: event.pid(),
            verdict,
        };
        let reported = self.reporter.report(&event);
        event.close();
        reported?;
        Ok(disposition)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::fs::File;
    use std::io::Write;
    use std::os::fd::{AsFd, OwnedFd, RawFd};
    use std::rc::Rc;

    use super::*;
    use crate::policy::AllowAll;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Step {
        Reply(i32, Verdict),
        Report(i32),
    }

    type Log = Rc<RefCell<Vec<Step>>>;

    /// Far above any descriptor limit, so never open.
    const UNOPENED_FD: RawFd = 1 << 30;

    /// Write end of a pipe whose read end is owned by an event.
    struct Sentinel(File);

    impl Sentinel {
        fn released(&mut self) -> bool {
            matches!(self.0.write_all(b"x"), Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe)
        }
    }

    fn tracked_event(mask: EventMask, pid: i32) -> (Event, Sentinel) {
        let (read_end, write_end) = nix::unistd::pipe().expect("pipe");
        (Event::new(mask, pid, Some(read_end)), Sentinel(File::from(write_end)))
    }

    struct FakeSource {
        queue: VecDeque<Result<Event>>,
        log: Log,
        fail_reply: bool,
        stale_descriptor: Option<RawFd>,
        ready: OwnedFd,
        ready_writer: File,
    }

    impl FakeSource {
        fn new(log: &Log) -> Self {
            let (ready, ready_writer) = nix::unistd::pipe().expect("pipe");
            Self {
                queue: VecDeque::new(),
                log: Rc::clone(log),
                fail_reply: false,
                stale_descriptor: None,
                ready,
                ready_writer: File::from(ready_writer),
            }
        }

        fn push(&mut self, event: Event) {
            self.queue.push_back(Ok(event));
        }

        fn make_readable(&mut self) {
            self.ready_writer.write_all(b"r").expect("signal readiness");
        }
    }

    impl EventSource for FakeSource {
        fn descriptor(&self) -> Result<BorrowedFd<'_>> {
            if let Some(raw) = self.stale_descriptor {
                // SAFETY: the number only reaches poll(2), which reports it
                // as POLLNVAL without touching any descriptor.
                return Ok(unsafe { BorrowedFd::borrow_raw(raw) });
            }
            Ok(self.ready.as_fd())
        }

        fn read_event(&mut self) -> Result<Event> {
            self.queue.pop_front().unwrap_or_else(|| {
                Err(FanwatchError::Read {
                    source: std::io::ErrorKind::WouldBlock.into(),
                })
            })
        }

        fn respond(&mut self, event: &Event, verdict: Verdict) -> Result<()> {
            if self.fail_reply {
                return Err(FanwatchError::Reply {
                    fd: event.raw_fd(),
                    source: std::io::Error::from_raw_os_error(libc::ENOENT),
                });
            }
            self.log.borrow_mut().push(Step::Reply(event.pid(), verdict));
            Ok(())
        }
    }

    struct RecordingReporter {
        log: Log,
        fail: bool,
    }

    impl Reporter for RecordingReporter {
        fn report(&mut self, event: &Event) -> Result<()> {
            assert!(event.descriptor().is_some() || event.is_overflow());
            self.log.borrow_mut().push(Step::Report(event.pid()));
            if self.fail {
                return Err(FanwatchError::Report {
                    source: std::io::ErrorKind::BrokenPipe.into(),
                });
            }
            Ok(())
        }
    }

    fn dispatcher(log: &Log) -> Dispatcher<FakeSource, AllowAll, RecordingReporter> {
        Dispatcher::new(
            FakeSource::new(log),
            AllowAll,
            RecordingReporter {
                log: Rc::clone(log),
                fail: false,
            },
        )
        .with_poll_timeout(1)
    }

    #[test]
    fn permission_event_replied_once_before_report_and_close() {
        let log = Log::default();
        let mut dispatcher = dispatcher(&log);
        let (event, mut sentinel) = tracked_event(EventMask::OPEN_PERM, 10);
        dispatcher.source.push(event);

        let disposition = dispatcher.handle_next().expect("handle").expect("event");
        assert_eq!(disposition.verdict, Some(Verdict::Allow));
        assert_eq!(*log.borrow(), vec![Step::Reply(10, Verdict::Allow), Step::Report(10)]);
        assert!(sentinel.released());
        assert_eq!(dispatcher.stats().replies, 1);
    }

    #[test]
    fn notification_event_gets_no_reply() {
        let log = Log::default();
        let mut dispatcher = dispatcher(&log);
        let (event, mut sentinel) = tracked_event(EventMask::CLOSE_WRITE | EventMask::CLOSE_NOWRITE, 11);
        dispatcher.source.push(event);

        let disposition = dispatcher.handle_next().expect("handle").expect("event");
        assert_eq!(disposition.verdict, None);
        assert_eq!(*log.borrow(), vec![Step::Report(11)]);
        assert!(sentinel.released());
        assert_eq!(dispatcher.stats().replies, 0);
    }

    #[test]
    fn unrecognized_mask_is_reported_and_closed() {
        let log = Log::default();
        let mut dispatcher = dispatcher(&log);
        let (event, mut sentinel) = tracked_event(EventMask::from_raw(0x1_0000_0000), 12);
        dispatcher.source.push(event);

        let disposition = dispatcher.handle_next().expect("handle").expect("event");
        assert_eq!(disposition.mask.bits(), 0x1_0000_0000);
        assert_eq!(*log.borrow(), vec![Step::Report(12)]);
        assert!(sentinel.released());
    }

    #[test]
    fn overflow_is_reported_without_reply() {
        let log = Log::default();
        let mut dispatcher = dispatcher(&log);
        dispatcher.source.push(Event::new(EventMask::Q_OVERFLOW, 0, None));

        let disposition = dispatcher.handle_next().expect("handle").expect("event");
        assert_eq!(disposition.verdict, None);
        assert_eq!(*log.borrow(), vec![Step::Report(0)]);
        assert_eq!(dispatcher.stats().overflows, 1);
    }

    #[test]
    fn reply_failure_is_fatal_and_still_closes() {
        let log = Log::default();
        let mut dispatcher = dispatcher(&log);
        dispatcher.source.fail_reply = true;
        let (event, mut sentinel) = tracked_event(EventMask::ACCESS_PERM, 13);
        dispatcher.source.push(event);

        let err = dispatcher.handle_next().expect_err("reply failure");
        assert!(matches!(err, FanwatchError::Reply { .. }));
        assert!(log.borrow().is_empty());
        assert!(sentinel.released());
    }

    #[test]
    fn report_failure_still_closes() {
        let log = Log::default();
        let mut dispatcher = dispatcher(&log);
        dispatcher.reporter.fail = true;
        let (event, mut sentinel) = tracked_event(EventMask::OPEN_PERM, 14);
        dispatcher.source.push(event);

        let err = dispatcher.handle_next().expect_err("report failure");
        assert!(matches!(err, FanwatchError::Report { .. }));
        assert_eq!(*log.borrow(), vec![Step::Reply(14, Verdict::Allow), Step::Report(14)]);
        assert!(sentinel.released());
    }

    #[test]
    fn empty_nonblocking_queue_is_not_an_error() {
        let log = Log::default();
        let mut dispatcher = dispatcher(&log);
        assert_eq!(dispatcher.handle_next().expect("empty"), None);
        assert_eq!(dispatcher.stats().events, 0);
    }

    #[test]
    fn read_failure_is_fatal() {
        let log = Log::default();
        let mut dispatcher = dispatcher(&log);
        dispatcher.source.queue.push_back(Err(FanwatchError::Read {
            source: std::io::Error::from_raw_os_error(libc::EIO),
        }));
        assert!(matches!(dispatcher.handle_next(), Err(FanwatchError::Read { .. })));
    }

    #[test]
    fn policy_verdict_is_sent_and_counted() {
        let log = Log::default();
        let mut dispatcher = Dispatcher::new(
            FakeSource::new(&log),
            |_: &Event| Verdict::Deny,
            RecordingReporter {
                log: Rc::clone(&log),
                fail: false,
            },
        );
        let (event, _sentinel) = tracked_event(EventMask::OPEN_PERM, 15);
        dispatcher.source.push(event);

        let disposition = dispatcher.handle_next().expect("handle").expect("event");
        assert_eq!(disposition.verdict, Some(Verdict::Deny));
        assert_eq!(dispatcher.stats().denials, 1);
    }

    #[test]
    fn events_are_handled_in_delivery_order() {
        let log = Log::default();
        let mut dispatcher = dispatcher(&log);
        let mut sentinels = Vec::new();
        for (pid, mask) in [(1, EventMask::OPEN_PERM), (2, EventMask::CLOSE_WRITE), (3, EventMask::OPEN_PERM)] {
            let (event, sentinel) = tracked_event(mask, pid);
            dispatcher.source.push(event);
            sentinels.push(sentinel);
        }

        while dispatcher.handle_next().expect("handle").is_some() {}

        assert_eq!(
            *log.borrow(),
            vec![
                Step::Reply(1, Verdict::Allow),
                Step::Report(1),
                Step::Report(2),
                Step::Reply(3, Verdict::Allow),
                Step::Report(3),
            ]
        );
        assert!(sentinels.iter_mut().all(Sentinel::released));
    }

    #[test]
    fn wait_times_out_when_idle() {
        let log = Log::default();
        let dispatcher = dispatcher(&log);
        assert_eq!(dispatcher.wait().expect("wait"), Readiness::Timeout);
    }

    #[test]
    fn run_once_processes_readable_event() {
        let log = Log::default();
        let mut dispatcher = dispatcher(&log);
        dispatcher.source.make_readable();
        let (event, _sentinel) = tracked_event(EventMask::CLOSE_NOWRITE, 16);
        dispatcher.source.push(event);

        let disposition = dispatcher.run_once().expect("run once").expect("event");
        assert_eq!(disposition.pid, 16);
    }

    #[test]
    fn error_wakeup_is_counted_without_reading() {
        let log = Log::default();
        let mut dispatcher = dispatcher(&log);
        let (read_end, write_end) = nix::unistd::pipe().expect("pipe");
        drop(read_end);
        dispatcher.source.ready = write_end;
        let (event, _sentinel) = tracked_event(EventMask::OPEN_PERM, 17);
        dispatcher.source.push(event);

        assert_eq!(dispatcher.wait().expect("wait"), Readiness::Error);
        assert_eq!(dispatcher.run_once().expect("run once"), None);

        let stats = dispatcher.stats();
        assert_eq!(stats.error_wakeups, 1);
        assert_eq!(stats.events, 0);
        assert_eq!(dispatcher.source.queue.len(), 1);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn invalid_descriptor_is_fatal_read_error() {
        let log = Log::default();
        let mut dispatcher = dispatcher(&log);
        dispatcher.source.stale_descriptor = Some(UNOPENED_FD);

        match dispatcher.wait().expect_err("invalid descriptor") {
            FanwatchError::Read { source } => assert_eq!(source.raw_os_error(), Some(libc::EBADF)),
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(dispatcher.run_once(), Err(FanwatchError::Read { .. })));
        assert_eq!(dispatcher.stats().error_wakeups, 0);
    }

    #[test]
    fn into_parts_hands_back_unread_events() {
        let log = Log::default();
        let mut dispatcher = dispatcher(&log);
        let (first, _s1) = tracked_event(EventMask::CLOSE_WRITE, 30);
        let (second, _s2) = tracked_event(EventMask::CLOSE_WRITE, 31);
        dispatcher.source.push(first);
        dispatcher.source.push(second);
        let handled = dispatcher.handle_next().expect("handle").expect("event");
        assert_eq!(handled.pid, 30);

        let (source, AllowAll, reporter) = dispatcher.into_parts();
        assert_eq!(source.queue.len(), 1);
        assert_eq!(*reporter.log.borrow(), vec![Step::Report(30)]);
    }

    #[test]
    fn run_stops_when_flag_is_set() {
        let log = Log::default();
        let stop = AtomicBool::new(false);
        let mut source = FakeSource::new(&log);
        source.make_readable();
        let (first, _s1) = tracked_event(EventMask::OPEN_PERM, 20);
        let (second, _s2) = tracked_event(EventMask::CLOSE_WRITE, 21);
        source.push(first);
        source.push(second);

        let mut seen = 0;
        let reporter = |_: &Event| -> Result<()> {
            seen += 1;
            if seen == 2 {
                stop.store(true, Ordering::Relaxed);
            }
            Ok(())
        };
        let mut dispatcher = Dispatcher::new(source, AllowAll, reporter).with_poll_timeout(1);

        let stats = dispatcher.run(&stop).expect("run");
        assert_eq!(stats.events, 2);
        assert_eq!(stats.replies, 1);
    }

    #[test]
    fn run_returns_immediately_when_already_stopped() {
        let log = Log::default();
        let mut dispatcher = dispatcher(&log);
        let stats = dispatcher.run(&AtomicBool::new(true)).expect("run");
        assert_eq!(stats, DispatchStats::default());
    }
}

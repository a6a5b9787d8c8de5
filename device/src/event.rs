//! Completion tokens and futures.
//!
//! An [`Event`] tracks one enqueued command through queued → running →
//! complete (or failed). Waiting blocks on a `parking_lot` condvar until the
//! backend publishes a terminal status. A [`Future`] pairs a host value with
//! the event whose completion makes that value valid.
//!
//! ```ignore
//! let event = queue.enqueue_1d_range(&kernel, 0, n, None)?;
//! event.wait()?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::handle::Shared;

/// Execution state of an enqueued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::IntoStaticStr)]
pub enum EventStatus {
    Queued,
    Running,
    Complete,
    Failed,
}

impl EventStatus {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// Work to run once an event reaches a terminal status.
struct Callback(Box<dyn FnOnce() + Send>);

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback")
    }
}

#[derive(Debug)]
struct State {
    status: EventStatus,
    error: Option<Error>,
    started: Option<Instant>,
    finished: Option<Instant>,
    callbacks: Vec<Callback>,
}

/// Backend-visible signal behind an [`Event`].
#[derive(Debug)]
pub struct EventSignal {
    command: &'static str,
    queued: Instant,
    state: Mutex<State>,
    condvar: Condvar,
}

impl EventSignal {
    fn new(command: &'static str, status: EventStatus) -> Self {
        let now = Instant::now();
        let finished = status.is_terminal().then_some(now);
        Self {
            command,
            queued: now,
            state: Mutex::new(State { status, error: None, started: finished, finished, callbacks: Vec::new() }),
            condvar: Condvar::new(),
        }
    }

    fn finish(&self, status: EventStatus, error: Option<Error>) {
        let mut state = self.state.lock();
        if state.status.is_terminal() {
            return;
        }
        let now = Instant::now();
        state.started.get_or_insert(now);
        state.finished = Some(now);
        state.status = status;
        state.error = error;
        let callbacks = std::mem::take(&mut state.callbacks);
        drop(state);
        self.condvar.notify_all();
        for Callback(callback) in callbacks {
            callback();
        }
    }
}

/// Completion token for one enqueued command.
#[derive(Clone)]
pub struct Event {
    signal: Shared<EventSignal>,
}

impl Event {
    /// A queued event for `command` (e.g. `"ndrange"`, `"read"`).
    pub fn new(command: &'static str) -> Self {
        Self { signal: Shared::new(EventSignal::new(command, EventStatus::Queued)) }
    }

    /// An event that is already complete.
    pub fn completed() -> Self {
        Self { signal: Shared::new(EventSignal::new("user", EventStatus::Complete)) }
    }

    pub fn id(&self) -> u64 {
        self.signal.id()
    }

    pub fn command(&self) -> &'static str {
        self.signal.command
    }

    pub fn status(&self) -> EventStatus {
        self.signal.state.lock().status
    }

    pub fn is_complete(&self) -> bool {
        self.status().is_terminal()
    }

    /// Blocks until the command finishes; a failed command returns its error.
    pub fn wait(&self) -> Result<()> {
        let mut state = self.signal.state.lock();
        while !state.status.is_terminal() {
            self.signal.condvar.wait(&mut state);
        }
        match &state.error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    /// Like [`Event::wait`], giving up after `timeout`. Returns `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let mut state = self.signal.state.lock();
        while !state.status.is_terminal() {
            if self.signal.condvar.wait_until(&mut state, deadline).timed_out() && !state.status.is_terminal() {
                return Ok(false);
            }
        }
        match &state.error {
            Some(error) => Err(error.clone()),
            None => Ok(true),
        }
    }

    /// Runs `f` once the command completes or fails; immediately if it
    /// already has.
    pub fn on_complete(&self, f: impl FnOnce() + Send + 'static) {
        let mut state = self.signal.state.lock();
        if state.status.is_terminal() {
            drop(state);
            f();
        } else {
            state.callbacks.push(Callback(Box::new(f)));
        }
    }

    /// Time between the command starting and finishing.
    pub fn duration(&self) -> Option<Duration> {
        let state = self.signal.state.lock();
        Some(state.finished?.duration_since(state.started?))
    }

    /// Time between enqueue and completion.
    pub fn latency(&self) -> Option<Duration> {
        Some(self.signal.state.lock().finished?.duration_since(self.signal.queued))
    }

    pub fn set_running(&self) {
        let mut state = self.signal.state.lock();
        if state.status == EventStatus::Queued {
            state.status = EventStatus::Running;
            state.started = Some(Instant::now());
        }
    }

    pub fn complete(&self) {
        self.signal.finish(EventStatus::Complete, None);
    }

    pub fn fail(&self, error: Error) {
        tracing::debug!(event.id = self.id(), event.command = self.command(), %error, "command failed");
        self.signal.finish(EventStatus::Failed, Some(error));
    }

    /// Records the outcome of running a command.
    pub fn resolve(&self, outcome: Result<()>) {
        match outcome {
            Ok(()) => self.complete(),
            Err(error) => self.fail(error),
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.signal == other.signal
    }
}

impl Eq for Event {}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event").field("id", &self.id()).field("command", &self.command()).field("status", &self.status()).finish()
    }
}

/// Events a command must wait for before it starts.
#[derive(Debug, Clone, Default)]
pub struct WaitList {
    events: SmallVec<[Event; 2]>,
}

impl WaitList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Waits for every event; the first failure is returned after all have finished.
    pub fn wait(&self) -> Result<()> {
        let mut first_error = None;
        for event in &self.events {
            if let Err(error) = event.wait() {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl From<Event> for WaitList {
    fn from(event: Event) -> Self {
        let mut list = Self::new();
        list.push(event);
        list
    }
}

impl FromIterator<Event> for WaitList {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        Self { events: iter.into_iter().collect() }
    }
}

impl Extend<Event> for WaitList {
    fn extend<I: IntoIterator<Item = Event>>(&mut self, iter: I) {
        self.events.extend(iter);
    }
}

type Producer<T> = Arc<dyn Fn() -> Result<T> + Send + Sync>;

enum Payload<T> {
    Ready(T),
    Deferred(Producer<T>),
}

impl<T: Clone> Clone for Payload<T> {
    fn clone(&self) -> Self {
        match self {
            Payload::Ready(value) => Payload::Ready(value.clone()),
            Payload::Deferred(producer) => Payload::Deferred(Arc::clone(producer)),
        }
    }
}

/// A host value that becomes valid once its event completes.
///
/// Clones share the event; each clone yields its own copy of the value.
pub struct Future<T> {
    event: Event,
    payload: Payload<T>,
}

impl<T: Clone> Future<T> {
    /// A value known at enqueue time (e.g. an end iterator) guarded by `event`.
    pub fn new(value: T, event: Event) -> Self {
        Self { event, payload: Payload::Ready(value) }
    }

    /// A value produced after `event` completes (e.g. decoding read-back bytes).
    pub fn deferred(event: Event, producer: impl Fn() -> Result<T> + Send + Sync + 'static) -> Self {
        Self { event, payload: Payload::Deferred(Arc::new(producer)) }
    }

    pub fn ready(value: T) -> Self {
        Self::new(value, Event::completed())
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn is_ready(&self) -> bool {
        self.event.is_complete()
    }

    pub fn wait(&self) -> Result<()> {
        self.event.wait()
    }

    /// Blocks until the event completes and returns the value.
    pub fn get(&self) -> Result<T> {
        self.event.wait()?;
        match &self.payload {
            Payload::Ready(value) => Ok(value.clone()),
            Payload::Deferred(producer) => producer(),
        }
    }

    /// Maps the value once it is available.
    pub fn map<U: Clone>(self, f: impl Fn(T) -> U + Send + Sync + 'static) -> Future<U>
    where
        T: Send + Sync + 'static,
    {
        let Future { event, payload } = self;
        match payload {
            Payload::Ready(value) => Future { event, payload: Payload::Ready(f(value)) },
            Payload::Deferred(producer) => Future::deferred(event, move || producer().map(&f)),
        }
    }
}

impl<T: Clone> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self { event: self.event.clone(), payload: self.payload.clone() }
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future").field("event", &self.event).finish_non_exhaustive()
    }
}

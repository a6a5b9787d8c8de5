use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crate::{Error, ErrorCode, Event, EventStatus, Future, WaitList};

#[test]
fn completed_event_is_terminal() {
    let event = Event::completed();
    assert_eq!(event.status(), EventStatus::Complete);
    assert!(event.wait().is_ok());
}

#[test]
fn wait_blocks_until_completion_from_another_thread() {
    let event = Event::new("ndrange");
    let remote = event.clone();
    let worker = thread::spawn(move || {
        remote.set_running();
        thread::sleep(Duration::from_millis(10));
        remote.complete();
    });
    event.wait().unwrap();
    worker.join().unwrap();
    assert_eq!(event.status(), EventStatus::Complete);
    assert!(event.duration().is_some());
    assert!(event.latency().unwrap() >= event.duration().unwrap());
}

#[test]
fn failure_is_reported_to_every_waiter() {
    let event = Event::new("read");
    event.fail(Error::runtime(ErrorCode::OutOfResources, "boom"));
    let first = event.wait().unwrap_err();
    let second = event.clone().wait().unwrap_err();
    assert_eq!(first.code(), ErrorCode::OutOfResources);
    assert_eq!(second.to_string(), first.to_string());
}

#[test]
fn completion_callbacks_run_once() {
    let event = Event::new("write");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    event.on_complete(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    event.fail(Error::runtime(ErrorCode::OutOfResources, "boom"));
    event.complete();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let counter = Arc::clone(&calls);
    event.on_complete(move || {
        counter.fetch_add(10, Ordering::SeqCst);
    });
    assert_eq!(calls.load(Ordering::SeqCst), 11);
}

#[test]
fn terminal_status_is_sticky() {
    let event = Event::new("write");
    event.complete();
    event.fail(Error::runtime(ErrorCode::InvalidValue, "late"));
    assert_eq!(event.status(), EventStatus::Complete);
    assert!(event.wait().is_ok());
}

#[test]
fn wait_timeout_reports_pending() {
    let event = Event::new("marker");
    assert!(!event.wait_timeout(Duration::from_millis(5)).unwrap());
    event.complete();
    assert!(event.wait_timeout(Duration::from_millis(5)).unwrap());
}

#[test]
fn wait_list_returns_first_error_after_all_finish() {
    let ok = Event::new("copy");
    let bad = Event::new("copy");
    ok.complete();
    bad.fail(Error::runtime(ErrorCode::InvalidMemObject, "gone"));
    let list: WaitList = [ok, bad].into_iter().collect();
    assert_eq!(list.len(), 2);
    assert_eq!(list.wait().unwrap_err().code(), ErrorCode::InvalidMemObject);
}

#[test]
fn deferred_future_produces_after_event() {
    let event = Event::new("read");
    let future = Future::deferred(event.clone(), || Ok(vec![1u8, 2, 3])).map(|bytes| bytes.len());
    assert!(!future.is_ready());
    event.complete();
    assert_eq!(future.get().unwrap(), 3);
    assert_eq!(future.clone().get().unwrap(), 3);
}

#[test]
fn ready_future_needs_no_event() {
    let future = Future::ready(41).map(|v| v + 1);
    assert!(future.is_ready());
    assert_eq!(future.get().unwrap(), 42);
}

use std::time::Duration;

use tessera_device::{Error, ErrorCode, Event, EventStatus, Geometry, KernelArg, QueueProperties, WaitList};
use tessera_dtype::{decode_slice, encode_slice};

use super::Rig;
use crate::HostConfig;

const INCREMENT: &str = "__kernel void inc(__global int *v) { v[get_global_id(0)] += 1; }";

fn out_of_order() -> Rig {
    Rig::with_properties(
        HostConfig::builder().compute_units(2).build(),
        QueueProperties::builder().out_of_order(true).build(),
    )
}

#[test]
fn in_order_commands_observe_each_other() {
    let rig = Rig::cpu();
    let buffer = rig.zeroed::<i32>(16);
    let program = rig.context.build_program(INCREMENT, "").unwrap();
    let kernel = program.create_kernel("inc").unwrap();
    kernel.set_arg(0, KernelArg::Buffer(buffer.clone())).unwrap();

    let write = rig.queue.enqueue_write_buffer_async(&buffer, 0, encode_slice(&[10i32; 16]), &WaitList::new()).unwrap();
    for _ in 0..3 {
        rig.queue.enqueue_1d_range(&kernel, 0, 16, Some(4)).unwrap();
    }
    let read = rig.queue.enqueue_read_buffer_async(&buffer, 0, 16 * 4, &WaitList::new()).unwrap();

    assert_eq!(decode_slice::<i32>(&read.get().unwrap()), vec![13; 16]);
    assert!(write.is_complete());
}

#[test]
fn out_of_order_command_waits_for_its_wait_list() {
    let rig = out_of_order();
    let buffer = rig.zeroed::<i32>(4);
    let gate = Event::new("user");

    let write = rig
        .queue
        .enqueue_write_buffer_async(&buffer, 0, encode_slice(&[1i32, 2, 3, 4]), &WaitList::from(gate.clone()))
        .unwrap();
    assert!(!write.wait_timeout(Duration::from_millis(50)).unwrap());
    assert_eq!(write.status(), EventStatus::Queued);

    gate.complete();
    write.wait().unwrap();
    assert_eq!(rig.download::<i32>(&buffer, 4), vec![1, 2, 3, 4]);
}

#[test]
fn failed_dependency_fails_dependents() {
    let rig = out_of_order();
    let buffer = rig.zeroed::<i32>(4);
    let gate = Event::new("user");
    let fill = rig.queue.enqueue_fill_buffer(&buffer, &7i32.to_le_bytes(), 0, 16, &WaitList::from(gate.clone())).unwrap();

    gate.fail(Error::runtime(ErrorCode::InvalidEvent, "cancelled"));
    let error = fill.wait().unwrap_err();
    assert_eq!(error.code(), ErrorCode::InvalidEvent);
    assert_eq!(fill.status(), EventStatus::Failed);
    assert_eq!(rig.download::<i32>(&buffer, 4), vec![0; 4]);
}

#[test]
fn marker_without_wait_list_waits_for_everything() {
    let rig = out_of_order();
    let buffer = rig.zeroed::<i32>(64);
    let gate = Event::new("user");
    let first = rig.queue.enqueue_fill(&buffer, 5i32, 0, 32).unwrap();
    let second = rig.queue.enqueue_fill_buffer(&buffer, &6i32.to_le_bytes(), 128, 128, &WaitList::from(gate.clone())).unwrap();

    let marker = rig.queue.enqueue_marker(&WaitList::new()).unwrap();
    assert!(!marker.wait_timeout(Duration::from_millis(50)).unwrap());
    gate.complete();
    marker.wait().unwrap();
    assert!(first.is_complete() && second.is_complete());

    let values = rig.download::<i32>(&buffer, 64);
    assert!(values[..32].iter().all(|&v| v == 5));
    assert!(values[32..].iter().all(|&v| v == 6));
}

#[test]
fn copy_and_fill() {
    let rig = Rig::cpu();
    let src = rig.upload(&[1u32, 2, 3, 4, 5, 6]);
    let dst = rig.zeroed::<u32>(6);
    rig.queue.enqueue_fill(&dst, 9u32, 0, 6).unwrap().wait().unwrap();
    rig.queue.enqueue_copy_buffer(&src, &dst, 4, 8, 12, &WaitList::new()).unwrap().wait().unwrap();
    assert_eq!(rig.download::<u32>(&dst, 6), vec![9, 9, 2, 3, 4, 9]);
}

#[test]
fn overlapping_copy_is_rejected() {
    let rig = Rig::cpu();
    let buffer = rig.zeroed::<u32>(8);
    let error = rig.queue.enqueue_copy_buffer(&buffer, &buffer, 0, 4, 8, &WaitList::new()).unwrap_err();
    assert_eq!(error.code(), ErrorCode::MemCopyOverlap);
}

#[test]
fn out_of_range_transfer_is_rejected_before_submission() {
    let rig = Rig::cpu();
    let buffer = rig.zeroed::<u32>(2);
    let error = rig.queue.enqueue_write_buffer(&buffer, 4, &[0u8; 8]).unwrap_err();
    assert_eq!(error.code(), ErrorCode::InvalidValue);
}

#[test]
fn kernel_fault_fails_only_its_event() {
    let rig = Rig::cpu();
    let buffer = rig.zeroed::<i32>(4);
    let program = rig
        .context
        .build_program("__kernel void crash(__global int *v) { v[get_global_id(0) * 100] = 1; }", "")
        .unwrap();
    let kernel = program.create_kernel("crash").unwrap();
    kernel.set_arg(0, KernelArg::Buffer(buffer.clone())).unwrap();

    let launch = rig.queue.enqueue_nd_range(&kernel, &Geometry::new_1d(0, 4, None), &WaitList::new()).unwrap();
    let after = rig.queue.enqueue_fill(&buffer, 3i32, 0, 4).unwrap();
    assert!(matches!(launch.wait(), Err(Error::Execution { .. })));
    after.wait().unwrap();
    rig.queue.finish().unwrap();
    assert_eq!(rig.download::<i32>(&buffer, 4), vec![3; 4]);
}

#[test]
fn finish_drains_pending_work() {
    let rig = out_of_order();
    let buffer = rig.zeroed::<i32>(256);
    let events: Vec<_> = (0..8).map(|i| rig.queue.enqueue_fill(&buffer, i, i as usize * 32, 32).unwrap()).collect();
    rig.queue.finish().unwrap();
    assert!(events.iter().all(Event::is_complete));
    let values = rig.download::<i32>(&buffer, 256);
    assert_eq!(values[255], 7);
}

#[test]
fn finish_reports_a_failed_out_of_order_command() {
    let rig = out_of_order();
    let buffer = rig.zeroed::<i32>(4);
    let gate = Event::new("user");
    let fill = rig.queue.enqueue_fill(&buffer, 1i32, 0, 4).unwrap();
    fill.wait().unwrap();
    let blocked = rig.queue.enqueue_fill_buffer(&buffer, &2i32.to_le_bytes(), 0, 16, &WaitList::from(gate.clone())).unwrap();

    let remote = gate.clone();
    let failer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        remote.fail(Error::runtime(ErrorCode::OutOfResources, "upstream failed"));
    });
    let error = rig.queue.finish().unwrap_err();
    failer.join().unwrap();
    assert_eq!(error.code(), ErrorCode::OutOfResources);
    assert_eq!(blocked.status(), EventStatus::Failed);
}

#[test]
fn long_out_of_order_dependency_chain_completes() {
    let rig = out_of_order();
    let buffer = rig.zeroed::<i32>(1);
    let program = rig.context.build_program(INCREMENT, "").unwrap();
    let kernel = program.create_kernel("inc").unwrap();
    kernel.set_arg(0, KernelArg::Buffer(buffer.clone())).unwrap();

    let gate = Event::new("user");
    let mut previous = gate.clone();
    for _ in 0..64 {
        previous = rig.queue.enqueue_nd_range(&kernel, &Geometry::task(), &WaitList::from(previous)).unwrap();
    }
    gate.complete();
    previous.wait().unwrap();
    assert_eq!(rig.download::<i32>(&buffer, 1), vec![64]);
}

#[test]
fn event_timestamps() {
    let rig = Rig::cpu();
    let buffer = rig.zeroed::<i32>(4);
    let event = rig.queue.enqueue_fill(&buffer, 1i32, 0, 4).unwrap();
    event.wait().unwrap();
    assert_eq!(event.command(), "fill");
    assert!(event.duration().is_some());
    assert!(event.latency().unwrap() >= event.duration().unwrap());
}

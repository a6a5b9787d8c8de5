use std::time::Duration;

use tessera_device::{Error, Geometry, KernelArg, WaitList};

use super::Rig;

const GROUP_SUM: &str = r#"
__kernel void group_sum(__global const int *input, __global int *output, __local int *scratch) {
    const uint lid = get_local_id(0);
    scratch[lid] = input[get_global_id(0)];
    barrier(CLK_LOCAL_MEM_FENCE);
    for (uint stride = get_local_size(0) / 2; stride > 0; stride >>= 1) {
        if (lid < stride) {
            scratch[lid] += scratch[lid + stride];
        }
        barrier(CLK_LOCAL_MEM_FENCE);
    }
    if (lid == 0) {
        output[get_group_id(0)] = scratch[0];
    }
}
"#;

#[test]
fn tree_reduction_in_local_memory() {
    let rig = Rig::cpu();
    let values: Vec<i32> = (1..=64).collect();
    let input = rig.upload(&values);
    let output = rig.zeroed::<i32>(4);
    rig.run(
        GROUP_SUM,
        "group_sum",
        vec![KernelArg::Buffer(input), KernelArg::Buffer(output.clone()), KernelArg::Local(16 * 4)],
        Geometry::new_1d(0, 64, Some(16)),
    )
    .unwrap();
    let expected: Vec<i32> = values.chunks(16).map(|c| c.iter().sum()).collect();
    assert_eq!(rig.download::<i32>(&output, 4), expected);
}

#[test]
fn local_memory_is_private_to_each_group() {
    let rig = Rig::cpu();
    let output = rig.zeroed::<u32>(8);
    rig.run(
        r#"
        __kernel void stamp(__global uint *output, __local uint *shared) {
            if (get_local_id(0) == 0) { shared[0] = get_group_id(0) * 10; }
            barrier(CLK_LOCAL_MEM_FENCE);
            output[get_global_id(0)] = shared[0] + get_local_id(0);
        }"#,
        "stamp",
        vec![KernelArg::Buffer(output.clone()), KernelArg::Local(4)],
        Geometry::new_1d(0, 8, Some(2)),
    )
    .unwrap();
    assert_eq!(rig.download::<u32>(&output, 8), vec![0, 1, 10, 11, 20, 21, 30, 31]);
}

#[test]
fn early_return_does_not_stall_the_group() {
    let rig = Rig::cpu();
    let output = rig.zeroed::<u32>(8);
    rig.run(
        r#"
        __kernel void partial(__global uint *output, __local uint *shared) {
            const uint lid = get_local_id(0);
            if (lid >= 4) { return; }
            shared[lid] = lid;
            barrier(CLK_LOCAL_MEM_FENCE);
            output[lid] = shared[3 - lid];
        }"#,
        "partial",
        vec![KernelArg::Buffer(output.clone()), KernelArg::Local(8 * 4)],
        Geometry::new_1d(0, 8, Some(8)),
    )
    .unwrap();
    assert_eq!(rig.download::<u32>(&output, 4), vec![3, 2, 1, 0]);
}

#[test]
fn fault_in_one_work_item_releases_the_others() {
    let rig = Rig::cpu();
    let output = rig.zeroed::<i32>(8);
    let program = rig
        .context
        .build_program(
            r#"
            __kernel void crash(__global int *output, __local int *shared) {
                const int lid = (int)get_local_id(0);
                shared[lid] = 10 / (lid - 5);
                barrier(CLK_LOCAL_MEM_FENCE);
                output[lid] = shared[7 - lid];
            }"#,
            "",
        )
        .unwrap();
    let kernel = program.create_kernel("crash").unwrap();
    kernel.set_arg(0, KernelArg::Buffer(output)).unwrap();
    kernel.set_arg(1, KernelArg::Local(8 * 4)).unwrap();
    let event = rig.queue.enqueue_nd_range(&kernel, &Geometry::new_1d(0, 8, Some(8)), &WaitList::new()).unwrap();

    assert!(event.wait_timeout(Duration::from_secs(30)).unwrap_or(true), "group deadlocked");
    let error = event.wait().unwrap_err();
    let Error::Execution { kernel, message } = error else { panic!("expected an execution fault") };
    assert_eq!(kernel, "crash");
    assert!(message.contains("division by zero"), "{message}");
}

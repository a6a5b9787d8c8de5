use test_case::test_case;

use crate::{DeviceInfo, ErrorCode, Geometry, clamp_work_group};

fn device(max_work_group_size: usize) -> DeviceInfo {
    DeviceInfo::builder().name("test").max_work_group_size(max_work_group_size).build()
}

#[test_case(256, 256, 256)]
#[test_case(300, 1024, 256; "rounds down to power of two")]
#[test_case(512, 128, 128; "clamped to device")]
#[test_case(0, 64, 1; "zero becomes one")]
#[test_case(7, 64, 4)]
fn clamp(requested: usize, max: usize, expected: usize) {
    assert_eq!(clamp_work_group(requested, max), expected);
}

#[test]
fn padded_1d_rounds_global_up() {
    let geometry = Geometry::padded_1d(1000, 256, 1024);
    assert_eq!(geometry.global[0], 1024);
    assert_eq!(geometry.local, Some([256, 1, 1]));
    assert_eq!(geometry.num_groups()[0], 4);
    assert!(geometry.validate(&device(1024)).is_ok());
}

#[test]
fn two_dimensional_counts() {
    let geometry = Geometry::new_2d([0, 0], [8, 4], Some([4, 2]));
    assert_eq!(geometry.work_items(), 32);
    assert_eq!(geometry.work_group_size(), Some(8));
    assert_eq!(geometry.num_groups(), [2, 2, 1]);
}

#[test_case(Geometry::new_1d(0, 0, None), ErrorCode::InvalidGlobalWorkSize; "empty global")]
#[test_case(Geometry::new_1d(0, 10, Some(4)), ErrorCode::InvalidWorkGroupSize; "not a multiple")]
#[test_case(Geometry::new_1d(0, 1024, Some(512)), ErrorCode::InvalidWorkGroupSize; "over device limit")]
#[test_case(Geometry { dims: 4, offset: [0; 3], global: [1; 3], local: None }, ErrorCode::InvalidWorkDimension; "too many dims")]
fn validate_rejects(geometry: Geometry, code: ErrorCode) {
    assert_eq!(geometry.validate(&device(256)).unwrap_err().code(), code);
}

#[test_case(Geometry::new_1d(0, 100, Some(64)), 256, [4, 1, 1]; "uneven global")]
#[test_case(Geometry::new_1d(0, 1024, Some(512)), 256, [256, 1, 1]; "over device limit")]
#[test_case(Geometry::new_2d([0, 0], [64, 64], Some([32, 32])), 256, [32, 8, 1]; "budget shared across dims")]
#[test_case(Geometry::new_2d([0, 0], [6, 10], Some([4, 4])), 64, [2, 2, 1]; "per dimension divisor")]
fn fitted_geometry_is_valid(geometry: Geometry, max: usize, local: [usize; 3]) {
    let global = geometry.global;
    let fitted = geometry.fitted(max);
    assert_eq!(fitted.global, global);
    assert_eq!(fitted.local, Some(local));
    assert!(fitted.validate(&device(max)).is_ok());
}

#[test]
fn fitting_leaves_unset_local_alone() {
    assert_eq!(Geometry::new_1d(0, 100, None).fitted(64).local, None);
}

#[test]
fn task_is_single_item() {
    let geometry = Geometry::task();
    assert_eq!(geometry.work_items(), 1);
    assert!(geometry.validate(&device(1)).is_ok());
}

proptest::proptest! {
    #[test]
    fn padded_geometry_is_always_valid(count in 1usize..100_000, local in 1usize..2048, max in 1usize..1024) {
        let geometry = Geometry::padded_1d(count, local, max);
        proptest::prop_assert!(geometry.global[0] >= count);
        proptest::prop_assert!(geometry.global[0] - count < geometry.local.unwrap()[0]);
        proptest::prop_assert!(geometry.validate(&device(max)).is_ok());
    }

    #[test]
    fn fitted_geometry_is_always_valid(global in 1usize..100_000, local in 1usize..2048, max in 1usize..1024) {
        let geometry = Geometry::new_1d(0, global, Some(local)).fitted(max);
        proptest::prop_assert_eq!(geometry.global[0], global);
        proptest::prop_assert!(geometry.validate(&device(max)).is_ok());
    }
}

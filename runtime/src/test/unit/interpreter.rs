use test_case::test_case;

use tessera_device::{Error, Geometry, ImageFormat, KernelArg};
use tessera_dtype::encode_slice;

use super::Rig;

/// Runs `body` once per element of `input` with `x` bound to the element and
/// `out[i]` as the destination.
fn map_i32(body: &str, input: &[i32]) -> Vec<i32> {
    let rig = Rig::cpu();
    let source = format!(
        "__kernel void map(__global const int *in, __global int *out) {{\n\
            const uint i = get_global_id(0);\n\
            const int x = in[i];\n\
            {body}\n\
        }}"
    );
    let input_buf = rig.upload(input);
    let output = rig.zeroed::<i32>(input.len());
    rig.run(
        &source,
        "map",
        vec![KernelArg::Buffer(input_buf), KernelArg::Buffer(output.clone())],
        Geometry::new_1d(0, input.len(), None),
    )
    .unwrap();
    rig.download(&output, input.len())
}

#[test_case("out[i] = x * 3 - 1;", vec![0, 1, -4], vec![-1, 2, -13]; "arithmetic")]
#[test_case("out[i] = x / 2 + x % 3;", vec![7, -7, 9], vec![4, -4, 4]; "truncating division")]
#[test_case("out[i] = (x > 0) + (x == 0) * 2;", vec![5, 0, -5], vec![1, 2, 0]; "comparisons yield one")]
#[test_case("out[i] = x > 2 ? x : -x;", vec![1, 3], vec![-1, 3]; "ternary")]
#[test_case("out[i] = (x << 4) >> 2 | 1;", vec![1, 2], vec![5, 9]; "shifts")]
#[test_case("out[i] = min(max(x, 0), 10);", vec![-3, 4, 12], vec![0, 4, 10]; "min max")]
#[test_case("out[i] = clamp(x, -1, 1) + abs(x);", vec![-5, 0, 5], vec![4, 0, 6]; "clamp abs")]
#[test_case("uint u = x; out[i] = u > 10u;", vec![-1, 3], vec![1, 0]; "unsigned wraparound")]
#[test_case("char c = x; out[i] = c;", vec![127, 128, 300], vec![127, -128, 44]; "narrowing")]
#[test_case("out[i] = convert_char_sat(x);", vec![127, 128, -300], vec![127, 127, -128]; "saturating conversion")]
#[test_case("out[i] = convert_int_rte(x + 0.5f);", vec![0, 1, 2], vec![0, 2, 2]; "round to nearest even")]
#[test_case("out[i] = as_int(as_float(x) * 2.0f);", vec![0x3f80_0000], vec![0x4000_0000]; "reinterpret")]
#[test_case("int a = x; a += 2; a *= 3; a -= 1; a ^= 1; out[i] = a;", vec![1], vec![9]; "compound assignment")]
#[test_case("int a = x; int b = a++; int c = ++a; out[i] = b * 100 + c;", vec![4], vec![406]; "increments")]
fn scalar_expressions(body: &str, input: Vec<i32>, expected: Vec<i32>) {
    assert_eq!(map_i32(body, &input), expected);
}

#[test_case("int s = 0; for (int k = 0; k < x; ++k) { s += k; } out[i] = s;", vec![0, 4], vec![0, 6]; "for")]
#[test_case("int s = 0; int k = x; while (k > 0) { s += k; k -= 2; } out[i] = s;", vec![5], vec![9]; "while")]
#[test_case("int k = 0; do { k++; } while (k < x); out[i] = k;", vec![0, 3], vec![1, 3]; "do while runs once")]
#[test_case(
    "int s = 0; for (int k = 0; k < 10; k++) { if (k == x) break; if (k % 2) continue; s += k; } out[i] = s;",
    vec![5, 100], vec![6, 20]; "break continue"
)]
#[test_case("int a[4]; for (int k = 0; k < 4; k++) a[k] = k * x; out[i] = a[3] - a[1];", vec![2], vec![4]; "private array")]
#[test_case("int a[2]; int *p = a + 1; *p = 9; out[i] = a[1] + x;", vec![1], vec![10]; "pointer into private array")]
#[test_case("__global int *p = out + i; *p = x + 1;", vec![1, 2], vec![2, 3]; "pointer arithmetic")]
fn control_flow(body: &str, input: Vec<i32>, expected: Vec<i32>) {
    assert_eq!(map_i32(body, &input), expected);
}

#[test]
fn helpers_and_recursion() {
    let rig = Rig::cpu();
    let output = rig.zeroed::<u32>(8);
    rig.run(
        r#"
        uint fib(uint n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); }
        void store(__global uint *out, uint i, uint v) { out[i] = v; }
        __kernel void run(__global uint *out) {
            const uint i = get_global_id(0);
            store(out, i, fib(i));
        }"#,
        "run",
        vec![KernelArg::Buffer(output.clone())],
        Geometry::new_1d(0, 8, Some(4)),
    )
    .unwrap();
    assert_eq!(rig.download::<u32>(&output, 8), vec![0, 1, 1, 2, 3, 5, 8, 13]);
}

#[test]
fn runaway_recursion_faults() {
    let rig = Rig::cpu();
    let output = rig.zeroed::<i32>(1);
    let error = rig
        .run(
            "int down(int n) { return down(n + 1); }\n__kernel void k(__global int *o) { o[0] = down(0); }",
            "k",
            vec![KernelArg::Buffer(output)],
            Geometry::new_1d(0, 1, None),
        )
        .unwrap_err();
    assert!(matches!(error, Error::Execution { .. }), "{error}");
}

#[test]
fn vectors_and_swizzles() {
    let rig = Rig::cpu();
    let input = rig.upload(&[[1.0f32, 2.0, 3.0, 4.0], [5.0, 6.0, 7.0, 8.0]]);
    let output = rig.zeroed::<[f32; 4]>(2);
    rig.run(
        r#"
        __kernel void shuffle(__global const float4 *in, __global float4 *out) {
            const uint i = get_global_id(0);
            float4 v = in[i];
            float4 r = v.wzyx * 2.0f;
            r.xy = v.lo + (float2)(0.5f, 0.25f);
            r.s3 = v.x * v.y + v.z * v.w;
            out[i] = r;
        }"#,
        "shuffle",
        vec![KernelArg::Buffer(input), KernelArg::Buffer(output.clone())],
        Geometry::new_1d(0, 2, None),
    )
    .unwrap();
    assert_eq!(rig.download::<[f32; 4]>(&output, 2), vec![[1.5, 2.25, 4.0, 14.0], [5.5, 6.25, 12.0, 86.0]]);
}

#[test]
fn vector_comparison_yields_masks() {
    let rig = Rig::cpu();
    let output = rig.zeroed::<[i32; 4]>(1);
    rig.run(
        r#"
        __kernel void mask(__global int4 *out) {
            const int4 a = (int4)(1, 5, 3, 7);
            const int4 b = (int4)(4);
            out[0] = a > b;
        }"#,
        "mask",
        vec![KernelArg::Buffer(output.clone())],
        Geometry::task(),
    )
    .unwrap();
    assert_eq!(rig.download::<[i32; 4]>(&output, 1), vec![[0, -1, 0, -1]]);
}

#[test]
fn select_picks_by_mask_msb() {
    let rig = Rig::cpu();
    let output = rig.zeroed::<[i32; 4]>(1);
    rig.run(
        r#"
        __kernel void pick(__global int4 *out) {
            const int4 a = (int4)(1, 2, 3, 4);
            const int4 b = (int4)(10, 20, 30, 40);
            out[0] = select(a, b, a > (int4)(2));
        }"#,
        "pick",
        vec![KernelArg::Buffer(output.clone())],
        Geometry::task(),
    )
    .unwrap();
    assert_eq!(rig.download::<[i32; 4]>(&output, 1), vec![[1, 2, 30, 40]]);
}

#[test]
fn structs_through_pointers() {
    let rig = Rig::cpu();
    let pairs = rig.upload(&[(1i32, 0.5f32), (2, 1.5), (3, -2.0)]);
    rig.run(
        r#"
        typedef struct __attribute__((packed)) { int key; float weight; } pair_t;

        pair_t bump(pair_t p) {
            p.key += 10;
            return p;
        }

        __kernel void update(__global pair_t *pairs) {
            const uint i = get_global_id(0);
            pair_t p = bump(pairs[i]);
            p.weight *= 2.0f;
            pairs[i] = p;
            (pairs + i)->weight += 1.0f;
        }"#,
        "update",
        vec![KernelArg::Buffer(pairs.clone())],
        Geometry::new_1d(0, 3, None),
    )
    .unwrap();
    assert_eq!(rig.download::<(i32, f32)>(&pairs, 3), vec![(11, 2.0), (12, 4.0), (13, -3.0)]);
}

#[test]
fn struct_literals_and_sizeof() {
    let rig = Rig::cpu();
    let output = rig.zeroed::<(i32, f32)>(1);
    let sizes = rig.zeroed::<u64>(2);
    rig.run(
        r#"
        typedef struct { int key; float weight; } pair_t;
        __kernel void make(__global pair_t *out, __global ulong *sizes) {
            out[0] = (pair_t){ 7, 0.25f };
            sizes[0] = sizeof(pair_t);
            sizes[1] = sizeof(double4);
        }"#,
        "make",
        vec![KernelArg::Buffer(output.clone()), KernelArg::Buffer(sizes.clone())],
        Geometry::task(),
    )
    .unwrap();
    assert_eq!(rig.download::<(i32, f32)>(&output, 1), vec![(7, 0.25)]);
    assert_eq!(rig.download::<u64>(&sizes, 2), vec![8, 32]);
}

#[test]
fn work_item_functions_in_two_dimensions() {
    let rig = Rig::cpu();
    let output = rig.zeroed::<u32>(6 * 4);
    rig.run(
        r#"
        __kernel void ids(__global uint *out) {
            const uint x = get_global_id(0) - get_global_offset(0);
            const uint y = get_global_id(1);
            const uint width = get_global_size(0);
            out[y * width + x] = get_work_dim() * 1000 + get_group_id(1) * 100 + get_local_id(0) * 10 + get_num_groups(0);
        }"#,
        "ids",
        vec![KernelArg::Buffer(output.clone())],
        Geometry::new_2d([2, 0], [4, 6], Some([2, 3])),
    )
    .unwrap();
    let values = rig.download::<u32>(&output, 24);
    assert_eq!(&values[..4], &[2002, 2012, 2002, 2012]);
    assert_eq!(&values[20..], &[2102, 2112, 2102, 2112]);
}

#[test]
fn by_value_arguments() {
    let rig = Rig::cpu();
    let output = rig.zeroed::<f32>(4);
    rig.run(
        r#"
        __kernel void axpy(__global float *out, const float a, const float2 offset, const uint n) {
            const uint i = get_global_id(0);
            if (i < n) { out[i] = a * i + offset.y; }
        }"#,
        "axpy",
        vec![
            KernelArg::Buffer(output.clone()),
            KernelArg::value(&2.0f32),
            KernelArg::value(&[0.0f32, 1.0]),
            KernelArg::value(&3u32),
        ],
        Geometry::new_1d(0, 4, None),
    )
    .unwrap();
    assert_eq!(rig.download::<f32>(&output, 4), vec![1.0, 3.0, 5.0, 0.0]);
}

#[test]
fn math_builtins() {
    let rig = Rig::cpu();
    let output = rig.zeroed::<f32>(6);
    rig.run(
        r#"
        __kernel void maths(__global float *out) {
            out[0] = sqrt(16.0f);
            out[1] = floor(-1.5f);
            out[2] = fmax(2.0f, NAN);
            out[3] = mad(2.0f, 3.0f, 1.0f);
            out[4] = isnan(NAN) ? 1.0f : 0.0f;
            out[5] = pow(2.0f, 10.0f);
        }"#,
        "maths",
        vec![KernelArg::Buffer(output.clone())],
        Geometry::task(),
    )
    .unwrap();
    assert_eq!(rig.download::<f32>(&output, 6), vec![4.0, -2.0, 2.0, 7.0, 1.0, 1024.0]);
}

#[test]
fn division_by_zero_reports_position() {
    let rig = Rig::cpu();
    let output = rig.zeroed::<i32>(4);
    let error = rig
        .run(
            "__kernel void k(__global int *o) {\n    o[get_global_id(0)] = 10 / (int)get_global_id(0);\n}",
            "k",
            vec![KernelArg::Buffer(output)],
            Geometry::new_1d(0, 4, None),
        )
        .unwrap_err();
    let Error::Execution { kernel, message } = error else { panic!("expected an execution fault") };
    assert_eq!(kernel, "k");
    assert!(message.starts_with("2:"), "{message}");
    assert!(message.contains("integer division by zero"), "{message}");
}

#[test]
fn out_of_bounds_access_faults() {
    let rig = Rig::cpu();
    let output = rig.zeroed::<i32>(4);
    let error = rig
        .run(
            "__kernel void k(__global int *o) { o[get_global_id(0) + 4] = 1; }",
            "k",
            vec![KernelArg::Buffer(output.clone())],
            Geometry::new_1d(0, 1, None),
        )
        .unwrap_err();
    assert!(matches!(error, Error::Execution { .. }), "{error}");
    assert_eq!(rig.download::<i32>(&output, 4), vec![0; 4]);
}

#[test]
fn argument_count_is_checked_at_launch() {
    let rig = Rig::cpu();
    let error = rig
        .run("__kernel void k(__global int *o, const int n) { }", "k", vec![], Geometry::task())
        .unwrap_err();
    assert!(matches!(error, Error::Bind { .. } | Error::Runtime { .. }), "{error}");
}

#[test]
fn images_read_with_clamped_coordinates() {
    let rig = Rig::cpu();
    let image = rig.context.create_image2d(ImageFormat::RgbaFloat, 2, 2).unwrap();
    let pixels: Vec<f32> = (0..16).map(|v| v as f32).collect();
    rig.queue.enqueue_write_image(&image, encode_slice(&pixels)).unwrap().wait().unwrap();

    let output = rig.zeroed::<[f32; 4]>(3);
    rig.run(
        r#"
        __constant sampler_t nearest = CLK_NORMALIZED_COORDS_FALSE | CLK_ADDRESS_CLAMP_TO_EDGE | CLK_FILTER_NEAREST;
        __kernel void sample(__read_only image2d_t img, __global float4 *out) {
            out[0] = read_imagef(img, nearest, (int2)(1, 0));
            out[1] = read_imagef(img, nearest, (int2)(5, 5));
            out[2] = (float4)(get_image_width(img), get_image_height(img), 0.0f, 0.0f);
        }"#,
        "sample",
        vec![KernelArg::Image(image), KernelArg::Buffer(output.clone())],
        Geometry::task(),
    )
    .unwrap();
    assert_eq!(
        rig.download::<[f32; 4]>(&output, 3),
        vec![[4.0, 5.0, 6.0, 7.0], [12.0, 13.0, 14.0, 15.0], [2.0, 2.0, 0.0, 0.0]]
    );
}

#[test]
fn sampler_addressing_modes() {
    let rig = Rig::cpu();
    let image = rig.context.create_image2d(ImageFormat::RgbaUInt, 3, 1).unwrap();
    let pixels: Vec<u32> = (0..3).flat_map(|p| [p * 10, 0, 0, 1]).collect();
    rig.queue.enqueue_write_image(&image, encode_slice(&pixels)).unwrap().wait().unwrap();

    let output = rig.zeroed::<u32>(8);
    rig.run(
        r#"
        __constant sampler_t repeat = CLK_NORMALIZED_COORDS_FALSE | CLK_ADDRESS_REPEAT | CLK_FILTER_NEAREST;
        __constant sampler_t mirror = CLK_NORMALIZED_COORDS_FALSE | CLK_ADDRESS_MIRRORED_REPEAT | CLK_FILTER_NEAREST;
        __constant sampler_t border = CLK_NORMALIZED_COORDS_FALSE | CLK_ADDRESS_CLAMP | CLK_FILTER_NEAREST;
        __constant sampler_t scaled = CLK_NORMALIZED_COORDS_TRUE | CLK_ADDRESS_CLAMP_TO_EDGE | CLK_FILTER_NEAREST;
        __kernel void sample(__read_only image2d_t img, __global uint *out) {
            out[0] = read_imageui(img, repeat, (int2)(4, 0)).x;
            out[1] = read_imageui(img, repeat, (int2)(-1, 0)).x;
            out[2] = read_imageui(img, mirror, (int2)(3, 0)).x;
            out[3] = read_imageui(img, mirror, (int2)(-1, 0)).x;
            out[4] = read_imageui(img, border, (int2)(7, 0)).w;
            out[5] = read_imageui(img, border, (int2)(2, 0)).w;
            out[6] = read_imageui(img, scaled, (float2)(0.5f, 0.5f)).x;
            out[7] = read_imageui(img, scaled, (float2)(0.99f, 0.0f)).x;
        }"#,
        "sample",
        vec![KernelArg::Image(image), KernelArg::Buffer(output.clone())],
        Geometry::task(),
    )
    .unwrap();
    assert_eq!(rig.download::<u32>(&output, 8), vec![10, 20, 20, 0, 0, 1, 10, 20]);
}

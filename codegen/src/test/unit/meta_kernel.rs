use tessera_device::{Geometry, KernelArg, WaitList};
use tessera_dtype::{AddrSpace, DType, Element, Field, ScalarType, decode_slice, encode_slice};

use test_case::test_case;
use tessera_runtime::HostConfig;

use super::{host_queue, queue_with};
use crate::error::Error;
use crate::expr::Expr;
use crate::meta_kernel::MetaKernel;
use crate::program_cache::ProgramCacheRegistry;

fn download<T: Element>(queue: &tessera_device::Queue, buffer: &tessera_device::Buffer, count: usize) -> Vec<T> {
    let mut bytes = vec![0u8; count * T::size()];
    queue.enqueue_read_buffer(buffer, 0, &mut bytes).unwrap();
    decode_slice(&bytes)
}

#[test]
fn source_layout() {
    let pair = DType::structure("pair_t", vec![Field::new("key", DType::INT), Field::new("weight", DType::FLOAT)]);
    let mut k = MetaKernel::new("layout");
    k.add_arg(AddrSpace::Global, pair.clone(), "items");
    k.add_arg(AddrSpace::Private, DType::UINT, "count");
    k.add_function("helper", "int helper(int x) { return x + 1; }");
    k.add_function("helper", "int helper(int x) { return x + 2; }");
    k.add_sampler("nearest", "CLK_NORMALIZED_COORDS_FALSE | CLK_FILTER_NEAREST");
    k.add_pragma("#pragma OPENCL EXTENSION cl_khr_fp64 : enable");
    k.line("if (get_global_id(0) < count) {");
    k.line("items[get_global_id(0)].key = helper(1);");
    k.line("}");

    let source = k.source();
    let pragma = source.find("#pragma").unwrap();
    let declaration = source.find("typedef struct __attribute__((packed)) {").unwrap();
    let sampler = source.find("const sampler_t nearest").unwrap();
    let helper = source.find("int helper(int x) { return x + 1; }").unwrap();
    let kernel = source.find("__kernel void layout(__global pair_t *items, const uint count)").unwrap();
    assert!(pragma < declaration && declaration < sampler && sampler < helper && helper < kernel);
    assert!(!source.contains("x + 2"));
    assert!(source.contains("\n        items[get_global_id(0)].key = helper(1);\n    }\n}"));
    assert_eq!(source.matches("typedef struct").count(), 1);
}

#[test]
fn nested_aggregates_are_declared_in_dependency_order() {
    let inner = DType::tuple(&[DType::INT, DType::FLOAT]);
    let outer = DType::structure("outer_t", vec![Field::new("a", inner.clone()), Field::new("b", inner.clone())]);
    let mut k = MetaKernel::new("nested");
    k.add_arg(AddrSpace::Global, outer, "data");
    let source = k.source();
    let inner_at = source.find(&format!("}} {};", inner.name())).unwrap();
    let outer_at = source.find("} outer_t;").unwrap();
    assert!(inner_at < outer_at);
    assert_eq!(source.matches("typedef struct").count(), 2);
}

#[test]
fn doubles_pull_in_the_fp64_pragma() {
    let mut k = MetaKernel::new("d");
    let text = k.expr(&Expr::lit(1.0f64).cast(DType::Scalar(ScalarType::Double)));
    assert_eq!(text, "((double)(1.0))");
    assert!(k.source().starts_with("#pragma OPENCL EXTENSION cl_khr_fp64 : enable\n"));
}

#[test]
fn fresh_variables_are_unique() {
    let mut k = MetaKernel::new("vars");
    let a = k.var("tmp");
    let b = k.var("tmp");
    assert_ne!(a, b);
}

#[test]
fn compiles_and_runs_on_the_host() {
    let queue = host_queue();
    let input = queue.context().create_buffer(8 * 4).unwrap();
    queue.enqueue_write_buffer(&input, 0, &encode_slice(&(0..8).collect::<Vec<i32>>())).unwrap();
    let output = queue.context().create_buffer(8 * 4).unwrap();

    let mut k = MetaKernel::new("scale");
    let src = k.add_buffer_arg(AddrSpace::Global, DType::INT, &input);
    let dst = k.add_buffer_arg(AddrSpace::Global, DType::INT, &output);
    let factor = k.add_value_arg("factor", 3i32);
    let scratch = k.add_local_arg(DType::INT, 4);
    k.line("const uint i = get_global_id(0);");
    k.line(format!("{scratch}[get_local_id(0)] = {src}[i] * {factor};"));
    k.line("barrier(CLK_LOCAL_MEM_FENCE);");
    k.line(format!("{dst}[i] = {scratch}[get_local_id(0)] + 1;"));
    k.exec_1d(&queue, 0, 8, Some(4)).unwrap().wait().unwrap();

    assert_eq!(download::<i32>(&queue, &output, 8), vec![1, 4, 7, 10, 13, 16, 19, 22]);
}

#[test_case(100, 64, 256; "global not a multiple of local")]
#[test_case(1024, 512, 256; "local over device limit")]
#[test_case(37, 1024, 64; "prime global")]
fn any_local_size_launches_every_item_once(global: usize, local: usize, max_work_group_size: usize) {
    let queue = queue_with(HostConfig::builder().max_work_group_size(max_work_group_size).build());
    let output = queue.context().create_buffer(global * 4).unwrap();
    queue.enqueue_write_buffer(&output, 0, &vec![0u8; global * 4]).unwrap();

    let mut k = MetaKernel::new("mark");
    let dst = k.add_buffer_arg(AddrSpace::Global, DType::UINT, &output);
    k.line(format!("{dst}[get_global_id(0)] += get_global_id(0) + 1;"));
    k.exec_1d(&queue, 0, global, Some(local)).unwrap().wait().unwrap();

    assert_eq!(download::<u32>(&queue, &output, global), (1..=global as u32).collect::<Vec<_>>());
}

#[test]
fn nd_launch_fits_each_dimension() {
    let queue = queue_with(HostConfig::builder().max_work_group_size(16).build());
    let output = queue.context().create_buffer(6 * 10 * 4).unwrap();

    let mut k = MetaKernel::new("grid");
    let dst = k.add_buffer_arg(AddrSpace::Global, DType::UINT, &output);
    k.line(format!("{dst}[get_global_id(1) * 6 + get_global_id(0)] = get_global_id(1) * 100 + get_global_id(0);"));
    let geometry = Geometry::new_2d([0, 0], [6, 10], Some([8, 8]));
    k.exec_nd(&queue, &geometry, &WaitList::new()).unwrap().wait().unwrap();

    let expected: Vec<u32> = (0..10).flat_map(|y| (0..6).map(move |x| y * 100 + x)).collect();
    assert_eq!(download::<u32>(&queue, &output, 60), expected);
}

#[test]
fn declared_argument_must_be_bound() {
    let queue = host_queue();
    let mut k = MetaKernel::new("unbound");
    let n = k.add_arg(AddrSpace::Private, DType::UINT, "n");
    k.line("(void)n;");
    let error = k.exec(&queue).unwrap_err();
    assert!(matches!(error, Error::UnboundArg { index: 0, ref name, .. } if name == "n"), "{error}");

    k.set_arg_value(n, 5u32).unwrap();
    let error = k.set_arg(3, KernelArg::value(&1u32)).unwrap_err();
    assert!(matches!(error, Error::UndeclaredArg { index: 3, .. }));
}

#[test]
fn rebinding_reuses_the_cached_program() {
    let queue = host_queue();
    let registry = ProgramCacheRegistry::new(2, 4);
    let output = queue.context().create_buffer(4).unwrap();

    let mut k = MetaKernel::new("store");
    let out = k.add_buffer_arg(AddrSpace::Global, DType::UINT, &output);
    let value = k.add_arg(AddrSpace::Private, DType::UINT, "value");
    k.line(format!("{out}[0] = value;"));

    for v in [7u32, 9] {
        k.set_arg_value(value, v).unwrap();
        let kernel = k.compile_with(queue.context(), &registry).unwrap();
        queue.enqueue_nd_range(&kernel, &tessera_device::Geometry::task(), &WaitList::new()).unwrap().wait().unwrap();
        assert_eq!(download::<u32>(&queue, &output, 1), vec![v]);
    }
    let stats = registry.peek(queue.context()).unwrap().stats();
    assert_eq!((stats.misses, stats.hits, stats.entries), (1, 1, 1));
}

#[test]
fn build_failure_exposes_the_log() {
    let queue = host_queue();
    let mut k = MetaKernel::new("broken");
    k.line("int x = ;");
    let error = k.exec(&queue).unwrap_err();
    let log = error.build_log().unwrap();
    assert!(log.contains("expected an expression"), "{log}");
}

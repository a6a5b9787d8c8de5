use test_case::test_case;

use tessera_device::{Error, ErrorCode};

use super::Rig;
use crate::HostConfig;
use crate::host::parser::parse;

const HELPERS: &str = r#"
typedef struct __attribute__((packed)) {
    int key;
    float weight;
} pair_t;

__constant sampler_t nearest = CLK_NORMALIZED_COORDS_FALSE | CLK_ADDRESS_CLAMP_TO_EDGE | CLK_FILTER_NEAREST;

inline float scale(float x, float k) { return x * k; }

__kernel void first(__global pair_t *pairs, const uint count) {
    const uint i = get_global_id(0);
    if (i < count) { pairs[i].weight = scale(pairs[i].weight, 2.0f); }
}

__kernel void second(__global int *out) { out[0] = 1; }
"#;

#[test]
fn kernels_are_listed_in_declaration_order() {
    let rig = Rig::cpu();
    let program = rig.context.build_program(HELPERS, "").unwrap();
    assert_eq!(program.kernel_names(), vec!["first".to_string(), "second".to_string()]);
    assert_eq!(program.create_kernel("first").unwrap().arg_count(), 2);
}

#[test]
fn unknown_kernel_name() {
    let rig = Rig::cpu();
    let program = rig.context.build_program(HELPERS, "").unwrap();
    assert_eq!(program.create_kernel("third").unwrap_err().code(), ErrorCode::InvalidKernelName);
}

#[test]
fn build_options_are_noted_in_the_log() {
    let rig = Rig::cpu();
    assert_eq!(rig.context.build_program(HELPERS, "").unwrap().build_log(), "");
    let program = rig.context.build_program(HELPERS, "-cl-fast-relaxed-math").unwrap();
    assert!(program.build_log().contains("-cl-fast-relaxed-math"));
}

#[test_case("__kernel void k() { int x = ; }", "1:29"; "missing operand")]
#[test_case("__kernel void k() {\n  y = 1;\n}", "2:3"; "undeclared identifier")]
#[test_case("__kernel void k() { int x; int x; }", "1:32"; "redefinition")]
#[test_case("__kernel void k() { 1 = 2; }", "1:21"; "not assignable")]
#[test_case("__kernel void k() { foo(); }", "1:21"; "undeclared function")]
#[test_case("__kernel void k() { int a[0]; }", "1:27"; "zero sized array")]
fn syntax_errors_carry_positions(source: &str, position: &str) {
    let error = parse(source).unwrap_err();
    assert!(error.starts_with(position), "{error}");
}

#[test]
fn compile_error_has_build_failure_code_and_log() {
    let rig = Rig::cpu();
    let error = rig.context.build_program("__kernel void k( { }", "").unwrap_err();
    assert_eq!(error.code(), ErrorCode::BuildProgramFailure);
    let Error::Compile { log } = error else { panic!("expected a compile error") };
    assert!(log.starts_with("1:"), "{log}");
}

#[test]
fn prototype_without_definition_is_rejected() {
    let error = parse("int helper(int x);\n__kernel void k(__global int *o) { o[0] = helper(1); }").unwrap_err();
    assert!(error.contains("never defined"), "{error}");
}

#[test]
fn barrier_use_propagates_through_helpers() {
    let program = parse(
        "void sync(void) { barrier(CLK_LOCAL_MEM_FENCE); }\n\
         void outer(void) { sync(); }\n\
         __kernel void k(__global int *o) { outer(); }\n\
         __kernel void plain(__global int *o) { o[0] = 1; }",
    )
    .unwrap();
    let index = |name: &str| program.functions.iter().position(|f| f.name == name).unwrap();
    let (k, plain) = (index("k"), index("plain"));
    assert!(program.functions[k].uses_barrier);
    assert!(!program.functions[plain].uses_barrier);
}

#[test]
fn doubles_need_fp64() {
    let source = "#pragma OPENCL EXTENSION cl_khr_fp64 : enable\n__kernel void k(__global double *o) { o[0] = 1.5; }";
    let with = Rig::cpu();
    assert!(with.context.build_program(source, "").is_ok());

    let without = Rig::new(HostConfig::builder().fp64(false).build());
    let error = without.context.build_program(source, "").unwrap_err();
    assert!(matches!(error, Error::ExtensionUnsupported { ref extension } if extension == "cl_khr_fp64"));
    assert_eq!(error.code(), ErrorCode::InvalidOperation);
}

#[test]
fn double_parameter_without_pragma_still_needs_fp64() {
    let rig = Rig::new(HostConfig::builder().fp64(false).build());
    let error = rig.context.build_program("__kernel void k(__global double *o) { }", "").unwrap_err();
    assert!(matches!(error, Error::ExtensionUnsupported { .. }));
}

#[test]
fn unsuffixed_float_literals_are_single_precision_without_fp64() {
    let rig = Rig::new(HostConfig::builder().fp64(false).build());
    assert!(rig.context.build_program("__kernel void k(__global float *o) { o[0] = 0.5 * o[0]; }", "").is_ok());
}

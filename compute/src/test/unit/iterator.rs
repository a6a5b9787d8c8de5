use tessera_codegen::{Expr, MetaKernel};
use tessera_device::ImageFormat;
use tessera_dtype::encode_slice;

use super::{Class, queue, upload};
use crate::algorithm::{copy, copy_to_host, count_if, reduce};
use crate::functional::{Function, Minus, Plus};
use crate::iterator::{
    AdjacentTransform, Constant, Counting, DeviceIterator, PixelInput, SourceEmittable, Strided, Swizzle, Transform, Zip2,
};
use crate::lambda::{_1, _2, Lambda};
use crate::vector::Vector;

#[test]
fn adaptor_chain_renders_one_expression() {
    let queue = queue(Class::Cpu);
    let v = upload(&[1, 2, 3], &queue);
    let chain = Transform::new(AdjacentTransform::new(v.begin(), Minus), _1 * 2);

    let mut k = MetaKernel::new("render");
    let element = chain.emit_index(Expr::var("i"), &mut k);
    let rendered = k.expr(&element);
    assert_eq!(rendered, "((_buf0[i] - _buf1[(i + 1u)]) * 2)");
    assert_eq!(k.arg_count(), 2);
}

#[test]
fn offset_iterators_bind_their_start() {
    let queue = queue(Class::Cpu);
    let v = upload(&[0u32; 8], &queue);
    let mut k = MetaKernel::new("render");
    let element = v.begin().advance(3).emit_index(Expr::var("i"), &mut k);
    assert_eq!(k.expr(&element), "_buf0[(_off1 + i)]");
}

#[test]
fn lambda_arity_and_instantiation() {
    let expression = (_1 + _2) * 3;
    assert_eq!(expression.arity(), 2);
    assert_eq!(_1.lt(5).arity(), 1);
    assert_eq!(Lambda::lit(1.5f32).arity(), 0);

    let mut k = MetaKernel::new("render");
    let rendered = expression.instantiate(&[Expr::var("a"), Expr::var("b")]);
    assert_eq!(k.expr(&rendered), "((a + b) * 3)");

    let picked = Lambda::select(_1.gt(0), _1, -_1).instantiate(&[Expr::var("x")]);
    assert!(k.expr(&picked).contains("(x > 0)"));
}

#[test]
fn user_function_is_declared_once() {
    let queue = queue(Class::Gpu);
    let v = upload(&[1, 2, 3, 4, 5, 6], &queue);
    let odd = Function::<(i32,), i32>::from_source("is_odd", "int is_odd(int x) { return x & 1; }");
    assert_eq!(count_if(&v.begin(), &v.end(), odd.clone(), &queue).unwrap(), 3);

    let mut k = MetaKernel::new("render");
    let both = AdjacentTransform::new(Transform::new(v.begin(), odd), Plus);
    let _ = both.emit_index(Expr::var("i"), &mut k);
    assert_eq!(k.source().matches("int is_odd(int x)").count(), 1);
}

#[test]
fn counting_and_constant_sequences() {
    let queue = queue(Class::Gpu);
    let numbers = Counting::new(5i32);
    assert_eq!(numbers.advance(3).distance(&numbers.advance(10)), 7);
    assert_eq!(copy_to_host(&numbers.advance(2), &numbers.advance(6), &queue).unwrap(), vec![7, 8, 9, 10]);
    assert_eq!(reduce(&numbers, &numbers.advance(100), 0, Plus, &queue).unwrap(), (5..105).sum::<i32>());

    let sevens = Constant::new(7u64);
    assert_eq!(sevens.value(), 7);
    assert_eq!(copy_to_host(&sevens, &sevens.advance(3), &queue).unwrap(), vec![7, 7, 7]);
    assert!(sevens.storage().is_err());
}

#[test]
fn strided_view() {
    let queue = queue(Class::Cpu);
    let v = upload(&(0..10).collect::<Vec<i32>>(), &queue);
    let first = Strided::new(v.begin(), 3);
    let last = Strided::end_of(&v.begin(), &v.end(), 3);
    assert_eq!(first.distance(&last), 4);
    assert_eq!(copy_to_host(&first, &last, &queue).unwrap(), vec![0, 3, 6, 9]);
    assert_eq!(copy_to_host(&first.advance(1), &last, &queue).unwrap(), vec![3, 6, 9]);
}

#[test]
fn zip_builds_tuples() {
    let queue = queue(Class::Gpu);
    let keys = upload(&[1, 2, 3], &queue);
    let weights = upload(&[0.5f32, 1.5, 2.5], &queue);
    let pairs = Zip2::new(keys.begin(), weights.begin());
    let out = Vector::<(i32, f32)>::with_len(3, queue.context()).unwrap();
    copy(&pairs, &pairs.advance(3), &out.begin(), &queue).unwrap();
    assert_eq!(out.to_vec(&queue).unwrap(), vec![(1, 0.5), (2, 1.5), (3, 2.5)]);
}

#[test]
fn image_pixels_in_row_major_order() {
    let queue = queue(Class::Cpu);
    let image = queue.context().create_image2d(ImageFormat::RgbaUInt, 3, 2).unwrap();
    let pixels: Vec<[u32; 4]> = (0..6).map(|i| [i * 10, i, 0, 1]).collect();
    queue.enqueue_write_image(&image, encode_slice(&pixels)).unwrap().wait().unwrap();

    let first = PixelInput::<[u32; 4]>::new(&image);
    let last = PixelInput::<[u32; 4]>::end(&image);
    assert_eq!(first.distance(&last), 6);
    assert_eq!(copy_to_host(&first, &last, &queue).unwrap(), pixels);

    let red = Swizzle::<_, u32>::new(first.clone(), "x");
    assert_eq!(copy_to_host(&red, &red.advance(6), &queue).unwrap(), vec![0, 10, 20, 30, 40, 50]);
}

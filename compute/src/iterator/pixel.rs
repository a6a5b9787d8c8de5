use std::marker::PhantomData;

use tessera_codegen::{Expr, MetaKernel};
use tessera_device::{ContextId, Image2d};
use tessera_dtype::{DType, Element, ScalarType};

use super::{DeviceIterator, SourceEmittable};

const SAMPLER: &str = "_pixel_sampler";
const SAMPLER_FLAGS: &str = "CLK_NORMALIZED_COORDS_FALSE | CLK_ADDRESS_CLAMP_TO_EDGE | CLK_FILTER_NEAREST";

/// Host type of one pixel as returned by a `read_image*` built-in.
pub trait Pixel: Element {
    const READ: &'static str;
}

impl Pixel for [f32; 4] {
    const READ: &'static str = "read_imagef";
}

impl Pixel for [u32; 4] {
    const READ: &'static str = "read_imageui";
}

impl Pixel for [i32; 4] {
    const READ: &'static str = "read_imagei";
}

/// Pixels of a 2D image in row-major order.
pub struct PixelInput<P> {
    image: Image2d,
    index: usize,
    _pixel: PhantomData<fn() -> P>,
}

impl<P: Pixel> PixelInput<P> {
    pub fn new(image: &Image2d) -> Self {
        debug_assert_eq!(
            image.format().read_suffix(),
            P::READ.trim_start_matches("read_image"),
            "pixel type does not match the image format"
        );
        Self { image: image.clone(), index: 0, _pixel: PhantomData }
    }

    /// One past the last pixel.
    pub fn end(image: &Image2d) -> Self {
        Self { image: image.clone(), index: image.pixels(), _pixel: PhantomData }
    }
}

impl<P> Clone for PixelInput<P> {
    fn clone(&self) -> Self {
        Self { image: self.image.clone(), index: self.index, _pixel: PhantomData }
    }
}

impl<P> std::fmt::Debug for PixelInput<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelInput").field("image", &self.image).field("index", &self.index).finish()
    }
}

impl<P: Pixel> SourceEmittable for PixelInput<P> {
    type Item = P;

    fn emit_index(&self, index: Expr, kernel: &mut MetaKernel) -> Expr {
        let image = kernel.add_image_arg(&self.image);
        kernel.add_sampler(SAMPLER, SAMPLER_FLAGS);
        let linear = if self.index > 0 { Expr::uint(self.index as u64) + index } else { index };
        let linear = linear.cast(DType::INT);
        let width = Expr::call("get_image_width", [Expr::var(image.clone())]);
        let coord = Expr::construct(DType::vector(ScalarType::Int, 2), [linear.clone() % width.clone(), linear / width]);
        Expr::call(P::READ, [Expr::var(image), Expr::var(SAMPLER), coord])
    }
}

impl<P: Pixel> DeviceIterator for PixelInput<P> {
    fn position(&self) -> usize {
        self.index
    }

    fn advance(&self, n: isize) -> Self {
        Self { image: self.image.clone(), index: self.index.saturating_add_signed(n), _pixel: PhantomData }
    }

    fn context_id(&self) -> Option<ContextId> {
        Some(self.image.context_id())
    }
}

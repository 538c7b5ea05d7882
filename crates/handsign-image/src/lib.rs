//! Pixel containers and geometry for the handsign gesture pipeline.
//!
//! # Overview
//!
//! ## Frames and Views
//!
//! Camera frames are held in owned [`Image`]s (8-bit sRGB with alpha). An [`ImageView`] borrows a
//! rectangular, axis-aligned part of an [`Image`]. Views are always clipped to the image they
//! borrow from, so no operation in this crate ever reads pixels outside of a frame.
//!
//! The [`AsImageView`] trait abstracts over [`Image`]s and [`ImageView`]s and should be used by any
//! code that only needs to read pixel data.
//!
//! ## Single-channel planes
//!
//! [`GrayImage`] is an 8-bit single-channel plane. It is produced by isolating one [`Channel`] of a
//! color image and supports the thresholding and resampling operations the classifier's input
//! normalization is built from.
//!
//! ## Drawing
//!
//! A few primitive drawing operations are available in the [`draw`] module. They exist to visualize
//! tracking state and are not meant to be exhaustive.

pub mod draw;
pub mod rect;

mod color;
mod gray;
mod image;
mod resolution;

#[cfg(test)]
mod tests;

pub use crate::image::*;
pub use color::{Channel, Color};
pub use gray::{GrayImage, Interpolation};
pub use rect::Rect;
pub use resolution::Resolution;

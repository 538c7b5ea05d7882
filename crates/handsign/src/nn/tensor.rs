//! Dense `f32` tensors.
//!
//! Tensors are the inputs and outputs of the networks used by the pipeline: the classifier takes a
//! `[1, 1, H, W]` plane and returns a `[1, C]` class distribution, the region detector takes an
//! RGB `[1, 3, H, W]` image and returns `[1, N, 5]` box rows.

use std::fmt;

use tinyvec::TinyVec;

use crate::iter::zip_exact;

/// Shape and row-major strides, stored inline for the common case of <= 4 dimensions.
#[derive(Clone, PartialEq, Eq)]
struct Layout {
    shape: TinyVec<[usize; 4]>,
    strides: TinyVec<[usize; 4]>,
}

impl Layout {
    fn from_shape(shape: &[usize]) -> Self {
        let mut strides: TinyVec<[usize; 4]> = shape.iter().map(|_| 0).collect();
        let mut stride = 1;
        for (out, &size) in zip_exact(strides.iter_mut().rev(), shape.iter().rev()) {
            *out = stride;
            stride *= size;
        }

        Self {
            shape: shape.iter().copied().collect(),
            strides,
        }
    }

    fn elements(&self) -> usize {
        self.shape.iter().product()
    }

    fn without_prefix(&self, num: usize) -> Layout {
        assert!(num <= self.shape.len());
        Layout {
            shape: self.shape[num..].iter().copied().collect(),
            strides: self.strides[num..].iter().copied().collect(),
        }
    }
}

/// Advances a row-major multi-index. Returns `false` once every index has been visited.
fn advance(index: &mut [usize], shape: &[usize]) -> bool {
    for (i, &len) in zip_exact(index.iter_mut().rev(), shape.iter().rev()) {
        *i += 1;
        if *i < len {
            return true;
        }
        *i = 0;
    }
    false
}

/// An owned, row-major, N-dimensional array of `f32`.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    layout: Layout,
    data: Box<[f32]>,
}

impl Tensor {
    /// Creates an `N`-dimensional tensor of the given shape by calling `f` for each element.
    ///
    /// `f` is invoked in row-major order, starting at `[0, ..., 0]`.
    pub fn from_array_shape_fn<const N: usize, F: FnMut([usize; N]) -> f32>(
        shape: [usize; N],
        mut f: F,
    ) -> Self {
        let layout = Layout::from_shape(&shape);
        let mut data = Vec::with_capacity(layout.elements());
        if layout.elements() != 0 {
            let mut index = [0; N];
            loop {
                data.push(f(index));
                if !advance(&mut index, &shape) {
                    break;
                }
            }
        }
        Self {
            layout,
            data: data.into_boxed_slice(),
        }
    }

    /// Creates a tensor of the given shape by pulling elements from an iterator.
    ///
    /// # Panics
    ///
    /// `iter` must yield exactly as many elements as `shape` describes, otherwise this method will
    /// panic.
    pub fn from_iter<I: IntoIterator<Item = f32>>(shape: &[usize], iter: I) -> Self {
        let layout = Layout::from_shape(shape);
        let data: Box<[f32]> = iter.into_iter().collect();
        assert_eq!(
            data.len(),
            layout.elements(),
            "element count does not match tensor shape {:?}",
            shape
        );
        Self { layout, data }
    }

    pub(super) fn from_tract(tract: &tract_onnx::prelude::Tensor) -> anyhow::Result<Self> {
        let data = tract.as_slice::<f32>()?;
        Ok(Self::from_iter(tract.shape(), data.iter().copied()))
    }

    pub(super) fn to_tract(&self) -> anyhow::Result<tract_onnx::prelude::Tensor> {
        Ok(tract_onnx::prelude::Tensor::from_shape(
            self.shape(),
            &self.data,
        )?)
    }

    /// Returns the number of entries in each dimension.
    pub fn shape(&self) -> &[usize] {
        &self.layout.shape
    }

    /// Returns the number of dimensions of this tensor.
    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    /// Returns all elements in row-major order, regardless of the tensor's rank.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Indexes a prefix of the tensor's dimensions.
    ///
    /// Indexing a `[2, 3, 4]` tensor with `[a]` yields a `[3, 4]` view, indexing it with
    /// `[a, b, c]` yields a single value.
    ///
    /// # Panics
    ///
    /// Panics if `indices` has more entries than `self` has dimensions, or if any index is out of
    /// bounds.
    #[track_caller]
    pub fn index<const N: usize>(&self, indices: [usize; N]) -> TensorView<'_> {
        self.as_view().index(indices)
    }

    /// Iterates over the outermost dimension.
    ///
    /// # Panics
    ///
    /// `self` must have at least one dimension.
    #[track_caller]
    pub fn iter(&self) -> impl Iterator<Item = TensorView<'_>> {
        assert!(self.rank() > 0, "attempted to iterate over a scalar tensor");
        (0..self.shape()[0]).map(|i| self.index([i]))
    }

    /// Returns the values stored in a 1-dimensional tensor as a slice.
    ///
    /// # Panics
    ///
    /// `self` must have exactly 1 dimension.
    #[track_caller]
    pub fn as_slice(&self) -> &[f32] {
        self.as_view().as_slice()
    }

    fn as_view(&self) -> TensorView<'_> {
        TensorView {
            layout: self.layout.clone(),
            data: &self.data,
        }
    }
}

impl<'a> From<&'a [f32]> for Tensor {
    fn from(slice: &'a [f32]) -> Self {
        Tensor::from_iter(&[slice.len()], slice.iter().copied())
    }
}

impl<const N: usize> From<[f32; N]> for Tensor {
    fn from(arr: [f32; N]) -> Self {
        Tensor::from_iter(&[N], arr)
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape())
            .finish()
    }
}

/// A borrowed suffix of a [`Tensor`].
#[derive(Clone)]
pub struct TensorView<'a> {
    layout: Layout,
    data: &'a [f32],
}

impl<'a> TensorView<'a> {
    pub fn shape(&self) -> &[usize] {
        &self.layout.shape
    }

    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    /// Indexes a prefix of the view's dimensions. See [`Tensor::index`].
    #[track_caller]
    pub fn index<const N: usize>(&self, indices: [usize; N]) -> TensorView<'a> {
        assert!(
            N <= self.rank(),
            "attempted to index tensor of shape {:?} with {:?}",
            self.shape(),
            indices
        );

        let mut data = self.data;
        for ((&len, &stride), &index) in self
            .layout
            .shape
            .iter()
            .zip(&self.layout.strides)
            .zip(&indices)
        {
            assert!(
                index < len,
                "attempted to index tensor of shape {:?} with {:?}",
                self.shape(),
                indices
            );
            data = &data[index * stride..(index + 1) * stride];
        }
        TensorView {
            layout: self.layout.without_prefix(N),
            data,
        }
    }

    /// Iterates over the outermost dimension.
    #[track_caller]
    pub fn iter(&self) -> impl Iterator<Item = TensorView<'a>> + '_ {
        assert!(self.rank() > 0, "attempted to iterate over a scalar view");
        (0..self.shape()[0]).map(|i| self.index([i]))
    }

    /// Returns the values stored in a 1-dimensional view as a slice.
    ///
    /// # Panics
    ///
    /// `self` must have exactly 1 dimension.
    #[track_caller]
    pub fn as_slice(&self) -> &'a [f32] {
        assert_eq!(
            self.rank(),
            1,
            "attempted to access tensor of shape {:?} as slice",
            self.shape()
        );
        self.data
    }

    /// Returns the value stored in a 0-dimensional view.
    #[track_caller]
    pub fn as_singular(&self) -> f32 {
        assert_eq!(
            self.rank(),
            0,
            "attempted to access tensor of shape {:?} as a single value",
            self.shape()
        );
        self.data[0]
    }
}

impl fmt::Debug for TensorView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorView")
            .field("shape", &self.shape())
            .finish()
    }
}

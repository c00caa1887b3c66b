//! Model input, wrapper over [`Array<f32, Ix4>`] in NHWC order.

use ndarray::{Array, ArrayView2, Ix4, IxDyn};

#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor(pub Array<f32, Ix4>);

impl From<Array<f32, Ix4>> for InputTensor {
    fn from(x: Array<f32, Ix4>) -> Self {
        Self(x)
    }
}

impl std::ops::Deref for InputTensor {
    type Target = Array<f32, Ix4>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl InputTensor {
    pub fn from_shape_vec(shape: (usize, usize, usize, usize), xs: Vec<f32>) -> crate::Result<Self> {
        Ok(Self::from(Array::from_shape_vec(shape, xs)?))
    }

    pub fn height(&self) -> usize {
        self.0.shape()[1]
    }

    pub fn width(&self) -> usize {
        self.0.shape()[2]
    }

    /// The single grayscale plane of the first batch entry.
    pub fn plane(&self) -> ArrayView2<'_, f32> {
        self.0.slice(ndarray::s![0, .., .., 0])
    }

    pub fn to_dyn(&self) -> Array<f32, IxDyn> {
        self.0.clone().into_dyn()
    }
}

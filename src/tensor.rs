//! Fixed-precision dense tensor façade used throughout the TDN core.
//!
//! Every value that flows through the network is row-major `(batch, features)`,
//! so this wraps `ndarray::Array2<f32>` directly rather than the rank-N
//! `ArrayD` a general autodiff framework would use (see DESIGN.md). Storage
//! is reference-counted so that [`crate::state::NetworkState::dup`] can hand
//! out a new variable map without copying array contents: a write always
//! replaces the map entry with a freshly computed `Tensor` rather than
//! mutating one in place, so `Rc::make_mut`'s copy-on-write never has to
//! trigger unless two states genuinely still share a value.

use std::rc::Rc;

use ndarray::{concatenate, s, Array2, Axis};
use ndarray_rand::rand_distr::{Normal, Uniform};
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Tensor(Rc<Array2<f32>>);

fn broadcast_shape(a: (usize, usize), b: (usize, usize)) -> Option<(usize, usize)> {
    let rows = match (a.0, b.0) {
        (x, y) if x == y => x,
        (1, y) => y,
        (x, 1) => x,
        _ => return None,
    };
    let cols = match (a.1, b.1) {
        (x, y) if x == y => x,
        (1, y) => y,
        (x, 1) => x,
        _ => return None,
    };
    Some((rows, cols))
}

impl Tensor {
    pub fn from_array2(data: Array2<f32>) -> Self {
        Tensor(Rc::new(data))
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::from_array2(Array2::zeros((rows, cols)))
    }

    pub fn ones(rows: usize, cols: usize) -> Self {
        Self::from_array2(Array2::ones((rows, cols)))
    }

    pub fn add_scalar(&self, v: f32) -> Tensor {
        Tensor::from_array2(self.0.mapv(|x| x + v))
    }

    pub fn from_scalar(value: f32) -> Self {
        Self::from_array2(Array2::from_elem((1, 1), value))
    }

    pub fn from_rows(data: Vec<Vec<f32>>) -> CoreResult<Self> {
        let rows = data.len();
        let cols = data.first().map(|r| r.len()).unwrap_or(0);
        if data.iter().any(|r| r.len() != cols) {
            return Err(CoreError::SpecInvalid(
                "ragged row data passed to Tensor::from_rows".into(),
            ));
        }
        let flat: Vec<f32> = data.into_iter().flatten().collect();
        Array2::from_shape_vec((rows, cols), flat)
            .map(Self::from_array2)
            .map_err(|_| CoreError::shape_mismatch(vec![rows, cols], vec![]))
    }

    pub fn as_array2(&self) -> &Array2<f32> {
        &self.0
    }

    pub fn to_array2(&self) -> Array2<f32> {
        (*self.0).clone()
    }

    pub fn shape(&self) -> (usize, usize) {
        let dim = self.0.dim();
        (dim.0, dim.1)
    }

    pub fn rows(&self) -> usize {
        self.shape().0
    }

    pub fn cols(&self) -> usize {
        self.shape().1
    }

    fn check_broadcast(&self, other: &Tensor) -> CoreResult<(usize, usize)> {
        broadcast_shape(self.shape(), other.shape()).ok_or_else(|| {
            CoreError::shape_mismatch(
                vec![self.rows(), self.cols()],
                vec![other.rows(), other.cols()],
            )
        })
    }

    pub fn add(&self, other: &Tensor) -> CoreResult<Tensor> {
        self.check_broadcast(other)?;
        Ok(Tensor::from_array2(&*self.0 + &*other.0))
    }

    pub fn sub(&self, other: &Tensor) -> CoreResult<Tensor> {
        self.check_broadcast(other)?;
        Ok(Tensor::from_array2(&*self.0 - &*other.0))
    }

    pub fn mul(&self, other: &Tensor) -> CoreResult<Tensor> {
        self.check_broadcast(other)?;
        Ok(Tensor::from_array2(&*self.0 * &*other.0))
    }

    pub fn div(&self, other: &Tensor) -> CoreResult<Tensor> {
        self.check_broadcast(other)?;
        Ok(Tensor::from_array2(&*self.0 / &*other.0))
    }

    pub fn add_in_place(&mut self, other: &Tensor) -> CoreResult<()> {
        self.check_broadcast(other)?;
        if self.shape() == other.shape() {
            *Rc::make_mut(&mut self.0) += &*other.0;
        } else {
            self.0 = Rc::new(&*self.0 + &*other.0);
        }
        Ok(())
    }

    pub fn scale_in_place(&mut self, factor: f32) {
        *Rc::make_mut(&mut self.0) *= factor;
    }

    pub fn scale(&self, factor: f32) -> Tensor {
        Tensor::from_array2(&*self.0 * factor)
    }

    pub fn matmul(&self, other: &Tensor) -> CoreResult<Tensor> {
        if self.cols() != other.rows() {
            return Err(CoreError::shape_mismatch(
                vec![self.rows(), self.cols()],
                vec![other.rows(), other.cols()],
            ));
        }
        Ok(Tensor::from_array2(self.0.dot(&*other.0)))
    }

    pub fn transpose(&self) -> Tensor {
        Tensor::from_array2(self.0.t().to_owned())
    }

    pub fn reshape(&self, rows: usize, cols: usize) -> CoreResult<Tensor> {
        if rows * cols != self.rows() * self.cols() {
            return Err(CoreError::shape_mismatch(
                vec![rows, cols],
                vec![self.rows(), self.cols()],
            ));
        }
        (*self.0)
            .clone()
            .into_shape((rows, cols))
            .map(Self::from_array2)
            .map_err(|_| CoreError::shape_mismatch(vec![rows, cols], vec![self.rows(), self.cols()]))
    }

    /// Slices columns `[start, end)`, keeping every row.
    pub fn slice_cols(&self, start: usize, end: usize) -> CoreResult<Tensor> {
        if end > self.cols() || start > end {
            return Err(CoreError::shape_mismatch(
                vec![self.rows(), end.saturating_sub(start)],
                vec![self.rows(), self.cols()],
            ));
        }
        Ok(Tensor::from_array2(self.0.slice(s![.., start..end]).to_owned()))
    }

    pub fn row(&self, index: usize) -> CoreResult<Tensor> {
        if index >= self.rows() {
            return Err(CoreError::shape_mismatch(vec![1, self.cols()], vec![self.rows(), self.cols()]));
        }
        Ok(Tensor::from_array2(self.0.slice(s![index..index + 1, ..]).to_owned()))
    }

    pub fn max_scalar(&self, v: f32) -> Tensor {
        Tensor::from_array2(self.0.mapv(|x| x.max(v)))
    }

    pub fn min_scalar(&self, v: f32) -> Tensor {
        Tensor::from_array2(self.0.mapv(|x| x.min(v)))
    }

    pub fn clip(&self, lo: f32, hi: f32) -> Tensor {
        Tensor::from_array2(self.0.mapv(|x| x.clamp(lo, hi)))
    }

    pub fn clip_in_place(&mut self, lo: f32, hi: f32) {
        Rc::make_mut(&mut self.0).mapv_inplace(|x| x.clamp(lo, hi));
    }

    pub fn tanh(&self) -> Tensor {
        Tensor::from_array2(self.0.mapv(f32::tanh))
    }

    pub fn exp(&self) -> Tensor {
        Tensor::from_array2(self.0.mapv(f32::exp))
    }

    pub fn ln(&self) -> Tensor {
        Tensor::from_array2(self.0.mapv(f32::ln))
    }

    pub fn gt_scalar(&self, v: f32) -> Tensor {
        Tensor::from_array2(self.0.mapv(|x| if x > v { 1.0 } else { 0.0 }))
    }

    pub fn lt_scalar(&self, v: f32) -> Tensor {
        Tensor::from_array2(self.0.mapv(|x| if x < v { 1.0 } else { 0.0 }))
    }

    pub fn le_scalar(&self, v: f32) -> Tensor {
        Tensor::from_array2(self.0.mapv(|x| if x <= v { 1.0 } else { 0.0 }))
    }

    pub fn eye(n: usize) -> Tensor {
        Tensor::from_array2(Array2::eye(n))
    }

    pub fn hstack(parts: &[Tensor]) -> CoreResult<Tensor> {
        if parts.is_empty() {
            return Err(CoreError::SpecInvalid("hstack of zero tensors".into()));
        }
        let views: Vec<_> = parts.iter().map(|t| t.0.view()).collect();
        concatenate(Axis(1), &views)
            .map(Self::from_array2)
            .map_err(|e| CoreError::SpecInvalid(format!("hstack failed: {e}")))
    }

    pub fn vstack(parts: &[Tensor]) -> CoreResult<Tensor> {
        if parts.is_empty() {
            return Err(CoreError::SpecInvalid("vstack of zero tensors".into()));
        }
        let views: Vec<_> = parts.iter().map(|t| t.0.view()).collect();
        concatenate(Axis(0), &views)
            .map(Self::from_array2)
            .map_err(|e| CoreError::SpecInvalid(format!("vstack failed: {e}")))
    }

    /// Sums along axis 0 (rows), keeping a `(1, cols)` shape.
    pub fn sum_rows(&self) -> Tensor {
        let summed = self.0.sum_axis(Axis(0));
        Tensor::from_array2(summed.insert_axis(Axis(0)))
    }

    /// Sums along axis 1 (columns), keeping a `(rows, 1)` shape.
    pub fn sum_cols(&self) -> Tensor {
        let summed = self.0.sum_axis(Axis(1));
        Tensor::from_array2(summed.insert_axis(Axis(1)))
    }

    pub fn sum(&self) -> f32 {
        self.0.sum()
    }

    pub fn mean(&self) -> f32 {
        self.0.mean().unwrap_or(0.0)
    }

    pub fn max_abs(&self) -> f32 {
        self.0.iter().fold(0.0f32, |acc, x| acc.max(x.abs()))
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|x| x.is_finite())
    }

    pub fn to_scalar(&self) -> CoreResult<f32> {
        if self.shape() == (1, 1) {
            Ok(self.0[[0, 0]])
        } else {
            Err(CoreError::shape_mismatch(vec![1, 1], vec![self.rows(), self.cols()]))
        }
    }

    pub fn fill_gaussian(rows: usize, cols: usize, rng: &mut StdRng) -> Tensor {
        let dist = Normal::new(0.0f32, 1.0f32).expect("unit normal is always constructible");
        Tensor::from_array2(Array2::random_using((rows, cols), dist, rng))
    }

    pub fn fill_uniform(rows: usize, cols: usize, rng: &mut StdRng) -> Tensor {
        let dist = Uniform::new(0.0f32, 1.0f32);
        Tensor::from_array2(Array2::random_using((rows, cols), dist, rng))
    }

    /// A `{0,1}` mask, `1` with probability `retain_prob` per element.
    pub fn bernoulli_mask(rows: usize, cols: usize, retain_prob: f32, rng: &mut StdRng) -> Tensor {
        Self::fill_uniform(rows, cols, rng).lt_scalar(retain_prob)
    }

    pub fn argmax_row0(&self) -> CoreResult<usize> {
        if self.rows() != 1 {
            return Err(CoreError::shape_mismatch(vec![1, self.cols()], vec![self.rows(), self.cols()]));
        }
        self.0
            .row(0)
            .iter()
            .enumerate()
            .fold(None, |best, (i, &v)| match best {
                Some((_, bv)) if bv >= v => best,
                _ => Some((i, v)),
            })
            .map(|(i, _)| i)
            .ok_or_else(|| CoreError::SpecInvalid("argmax of empty row".into()))
    }
}

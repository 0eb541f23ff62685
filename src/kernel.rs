/// A square table of blur weights, sampled around each texel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaussianKernel<const N: usize> {
    weights: [[f32; N]; N],
}

impl<const N: usize> GaussianKernel<N> {
    /// Width and height of the table.
    pub const SIZE: usize = N;

    pub const fn new(weights: [[f32; N]; N]) -> Self {
        Self { weights }
    }

    /// All weights, row major. This is the layout uploaded to the blur program.
    pub fn weights(&self) -> &[f32] {
        self.weights.as_flattened()
    }

    pub fn at(&self, row: usize, col: usize) -> Option<f32> {
        self.weights.get(row).and_then(|r| r.get(col)).copied()
    }

    pub fn sum(&self) -> f32 {
        self.weights().iter().sum()
    }
}

/// Weights of the 11x11 bloom blur, normalized so they add up to one.
#[rustfmt::skip]
pub const GAUSSIAN_KERNEL_11: GaussianKernel<11> = GaussianKernel::new([
    [0.006849, 0.007239, 0.007559, 0.007795, 0.007941, 0.007990, 0.007941, 0.007795, 0.007559, 0.007239, 0.006849],
    [0.007239, 0.007653, 0.007990, 0.008240, 0.008394, 0.008446, 0.008394, 0.008240, 0.007990, 0.007653, 0.007239],
    [0.007559, 0.007990, 0.008342, 0.008604, 0.008764, 0.008819, 0.008764, 0.008604, 0.008342, 0.007990, 0.007559],
    [0.007795, 0.008240, 0.008604, 0.008873, 0.009039, 0.009095, 0.009039, 0.008873, 0.008604, 0.008240, 0.007795],
    [0.007941, 0.008394, 0.008764, 0.009039, 0.009208, 0.009265, 0.009208, 0.009039, 0.008764, 0.008394, 0.007941],
    [0.007990, 0.008446, 0.008819, 0.009095, 0.009265, 0.009322, 0.009265, 0.009095, 0.008819, 0.008446, 0.007990],
    [0.007941, 0.008394, 0.008764, 0.009039, 0.009208, 0.009265, 0.009208, 0.009039, 0.008764, 0.008394, 0.007941],
    [0.007795, 0.008240, 0.008604, 0.008873, 0.009039, 0.009095, 0.009039, 0.008873, 0.008604, 0.008240, 0.007795],
    [0.007559, 0.007990, 0.008342, 0.008604, 0.008764, 0.008819, 0.008764, 0.008604, 0.008342, 0.007990, 0.007559],
    [0.007239, 0.007653, 0.007990, 0.008240, 0.008394, 0.008446, 0.008394, 0.008240, 0.007990, 0.007653, 0.007239],
    [0.006849, 0.007239, 0.007559, 0.007795, 0.007941, 0.007990, 0.007941, 0.007795, 0.007559, 0.007239, 0.006849],
]);

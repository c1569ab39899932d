use serde::{Deserialize, Serialize};

/// Encoded profile: one slot per schema attribute, in schema order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vector {
    data: Vec<f32>,
}

impl Vector {
    #[inline]
    #[must_use]
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }

    #[inline]
    #[must_use]
    pub fn zeros(dim: usize) -> Self {
        Self { data: vec![0.0; dim] }
    }

    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn get(&self, slot: usize) -> Option<f32> {
        self.data.get(slot).copied()
    }

    #[inline]
    pub fn norm(&self) -> f32 {
        crate::kernels::norm(&self.data)
    }

    /// Cosine similarity in [-1, 1].
    /// An all-zero vector has similarity 0 with everything, itself included.
    #[inline]
    pub fn cosine_similarity(&self, other: &Vector) -> f32 {
        if self.dim() != other.dim() {
            return 0.0;
        }

        let norm_a = self.norm();
        let norm_b = other.norm();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        let dot = crate::kernels::dot_product(&self.data, &other.data);
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

impl From<Vec<f32>> for Vector {
    fn from(data: Vec<f32>) -> Self {
        Self::new(data)
    }
}

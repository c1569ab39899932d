// Scalar kernels for the short dense vectors produced by the encoder.
// Two accumulators keep the adds independent so the loop pipelines well.

/// Dot product; vectors of different length yield 0
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot0 = 0.0f32;
    let mut dot1 = 0.0f32;

    let chunks = a.chunks_exact(4);
    let remainder = chunks.remainder().len();
    for (a_chunk, b_chunk) in chunks.zip(b.chunks_exact(4)) {
        dot0 += a_chunk[0] * b_chunk[0] + a_chunk[1] * b_chunk[1];
        dot1 += a_chunk[2] * b_chunk[2] + a_chunk[3] * b_chunk[3];
    }

    for i in (a.len() - remainder)..a.len() {
        dot0 += a[i] * b[i];
    }

    dot0 + dot1
}

#[inline]
pub fn norm_squared(v: &[f32]) -> f32 {
    dot_product(v, v)
}

#[inline]
pub fn norm(v: &[f32]) -> f32 {
    norm_squared(v).sqrt()
}

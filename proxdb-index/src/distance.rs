// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Distance kernels.
//!
//! Every kernel returns a *distance*: lower is closer, for every metric.
//! Inner product is negated so the same min-heap machinery serves all
//! three metrics. L2 stays squared; ordering is what matters on the hot
//! path and the square root adds nothing to it.

use proxdb_core::DistanceMetric;

/// Squared Euclidean distance.
#[inline]
pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut sum = 0.0f32;
    for i in 0..a.len() {
        let d = a[i] - b[i];
        sum += d * d;
    }
    sum
}

/// Raw inner product.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut sum = 0.0f32;
    for i in 0..a.len() {
        sum += a[i] * b[i];
    }
    sum
}

/// Cosine distance: `1 - (a·b) / (|a||b|)`. Zero-norm inputs score as the
/// farthest possible (distance 1.0) rather than NaN.
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot_sum = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..a.len() {
        dot_sum += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }
    let norm = norm_a.sqrt() * norm_b.sqrt();
    if norm == 0.0 {
        1.0
    } else {
        1.0 - dot_sum / norm
    }
}

/// Distance between two vectors under the collection's metric.
#[inline]
pub fn metric_distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::L2 => l2_squared(a, b),
        DistanceMetric::Cosine => cosine_distance(a, b),
        DistanceMetric::InnerProduct => -dot(a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_squared() {
        let a = [0.0, 0.0, 0.0, 0.0];
        let b = [1.0, 0.0, 0.0, 0.0];
        assert!((l2_squared(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_and_parallel() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        let c = [2.0, 0.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
        assert!(cosine_distance(&a, &c).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_norm_is_farthest() {
        let a = [0.0, 0.0];
        let b = [1.0, 0.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_inner_product_negated() {
        let a = [1.0, 2.0];
        let b = [3.0, 4.0];
        // Higher dot product => smaller (more negative) distance.
        assert!(
            metric_distance(DistanceMetric::InnerProduct, &a, &b)
                < metric_distance(DistanceMetric::InnerProduct, &a, &[0.1, 0.1])
        );
    }
}

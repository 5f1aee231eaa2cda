//! Execution backends for score combination.
//!
//! This module provides:
//! - [`ScoreBackend`] - Trait for joint score construction
//! - [`SequentialBackend`] - Host implementation over flat buffers
//! - [`TensorBackend`] - Candle implementation, offloaded to CUDA when available
//!
//! Both implementations share the same contract: the output has the shape
//! of the primary matrix, the primary is scaled by its weight, the previous
//! cumulative cost is added once per row, and every other matrix is added
//! scaled by its own weight.

use crate::config::BackendKind;
use crate::error::{BeamlineError, Result};
use crate::matrix::ScoreMatrix;
use candle_core::{Device, Tensor};
use std::sync::Arc;

/// Backend that builds the joint score matrix for one step.
pub trait ScoreBackend: Send + Sync + std::fmt::Debug {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Combine the primary matrix, per-row costs and weighted auxiliary matrices.
    fn combine(
        &self,
        primary: &ScoreMatrix,
        primary_weight: f32,
        costs: &[f32],
        others: &[(&ScoreMatrix, f32)],
    ) -> Result<ScoreMatrix>;

    /// Single-scorer fast path.
    ///
    /// Optional: backends that do not provide it fail immediately instead of
    /// falling back to a partial computation.
    fn combine_single(&self, probs: &ScoreMatrix, weight: f32, costs: &[f32]) -> Result<ScoreMatrix> {
        let _ = (probs, weight, costs);
        Err(BeamlineError::Unimplemented("single-scorer fast path"))
    }
}

/// Create the backend selected in the configuration.
pub fn backend_for(kind: BackendKind) -> Result<Arc<dyn ScoreBackend>> {
    Ok(match kind {
        BackendKind::Sequential => Arc::new(SequentialBackend),
        BackendKind::Tensor => Arc::new(TensorBackend::cuda_if_available()?),
    })
}

fn check_inputs(primary: &ScoreMatrix, costs: &[f32], others: &[(&ScoreMatrix, f32)]) -> Result<()> {
    if costs.len() != primary.rows() {
        return Err(BeamlineError::ShapeMismatch(format!(
            "{} previous costs for {} score rows",
            costs.len(),
            primary.rows()
        )));
    }
    for (m, _) in others {
        primary.check_same_shape(m)?;
    }
    Ok(())
}

/// Host backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialBackend;

impl ScoreBackend for SequentialBackend {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn combine(
        &self,
        primary: &ScoreMatrix,
        primary_weight: f32,
        costs: &[f32],
        others: &[(&ScoreMatrix, f32)],
    ) -> Result<ScoreMatrix> {
        check_inputs(primary, costs, others)?;

        let mut joint = primary.clone();
        joint.scale(primary_weight);
        joint.add_row_bias(costs)?;
        for (m, w) in others {
            joint.add_scaled(m, *w)?;
        }
        Ok(joint)
    }

    fn combine_single(&self, probs: &ScoreMatrix, weight: f32, costs: &[f32]) -> Result<ScoreMatrix> {
        self.combine(probs, weight, costs, &[])
    }
}

/// Candle backend.
///
/// Scaling and addition are dispatched as tensor ops on the device; reading
/// the result back to the host blocks until the device work has finished,
/// which is the barrier before selection.
#[derive(Debug, Clone)]
pub struct TensorBackend {
    device: Device,
}

impl TensorBackend {
    /// Create a backend on `device`.
    pub fn new(device: Device) -> Self {
        Self { device }
    }

    /// Create a host-side tensor backend.
    pub fn cpu() -> Self {
        Self::new(Device::Cpu)
    }

    /// Use the first CUDA device, or the CPU if none is available.
    pub fn cuda_if_available() -> Result<Self> {
        Ok(Self::new(Device::cuda_if_available(0)?))
    }

    /// Device in use.
    pub fn device(&self) -> &Device {
        &self.device
    }

    fn upload(&self, m: &ScoreMatrix) -> Result<Tensor> {
        Ok(Tensor::from_slice(m.as_slice(), (m.rows(), m.columns()), &self.device)?)
    }
}

impl ScoreBackend for TensorBackend {
    fn name(&self) -> &'static str {
        "tensor"
    }

    fn combine(
        &self,
        primary: &ScoreMatrix,
        primary_weight: f32,
        costs: &[f32],
        others: &[(&ScoreMatrix, f32)],
    ) -> Result<ScoreMatrix> {
        check_inputs(primary, costs, others)?;
        if primary.is_empty() {
            return Ok(ScoreMatrix::zeros(primary.rows(), primary.columns()));
        }

        let bias = Tensor::from_slice(costs, (costs.len(), 1), &self.device)?;
        let mut joint = self
            .upload(primary)?
            .affine(primary_weight as f64, 0.0)?
            .broadcast_add(&bias)?;
        for (m, w) in others {
            let scaled = self.upload(m)?.affine(*w as f64, 0.0)?;
            joint = joint.add(&scaled)?;
        }

        let data: Vec<f32> = joint.flatten_all()?.to_vec1()?;
        ScoreMatrix::from_vec(primary.rows(), primary.columns(), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> (ScoreMatrix, ScoreMatrix) {
        let tm = ScoreMatrix::from_rows(&[[0.1, 0.9, 0.2], [0.05, 0.05, 0.05]]).unwrap();
        let lm = ScoreMatrix::from_rows(&[[-1.0, -2.0, -3.0], [-0.5, -0.5, -0.5]]).unwrap();
        (tm, lm)
    }

    fn assert_close(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-5, "{} vs {}", x, y);
        }
    }

    #[test]
    fn sequential_adds_cost_once_per_row() {
        let (tm, _) = scenario();
        let joint = SequentialBackend.combine(&tm, 1.0, &[0.0, -1.0], &[]).unwrap();
        assert_close(joint.as_slice(), &[0.1, 0.9, 0.2, -0.95, -0.95, -0.95]);
    }

    #[test]
    fn sequential_weights_every_scorer() {
        let (tm, lm) = scenario();
        let joint = SequentialBackend
            .combine(&tm, 2.0, &[0.0, -1.0], &[(&lm, 0.5)])
            .unwrap();
        assert_close(
            joint.as_slice(),
            &[-0.3, 0.8, -1.1, -1.15, -1.15, -1.15],
        );
    }

    #[test]
    fn tensor_matches_sequential() {
        let (tm, lm) = scenario();
        let costs = [0.25, -1.0];
        let expected = SequentialBackend
            .combine(&tm, 0.7, &costs, &[(&lm, 0.3)])
            .unwrap();
        let actual = TensorBackend::cpu()
            .combine(&tm, 0.7, &costs, &[(&lm, 0.3)])
            .unwrap();
        assert_close(actual.as_slice(), expected.as_slice());
    }

    #[test]
    fn cost_length_must_match_rows() {
        let (tm, _) = scenario();
        assert!(matches!(
            SequentialBackend.combine(&tm, 1.0, &[0.0], &[]),
            Err(BeamlineError::ShapeMismatch(_))
        ));
        assert!(matches!(
            TensorBackend::cpu().combine(&tm, 1.0, &[0.0], &[]),
            Err(BeamlineError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn auxiliary_shape_must_match() {
        let (tm, _) = scenario();
        let wrong = ScoreMatrix::zeros(2, 4);
        assert!(SequentialBackend
            .combine(&tm, 1.0, &[0.0, 0.0], &[(&wrong, 1.0)])
            .is_err());
    }

    #[test]
    fn tensor_fast_path_fails_fast() {
        let (tm, _) = scenario();
        let result = TensorBackend::cpu().combine_single(&tm, 1.0, &[0.0, 0.0]);
        assert!(matches!(result, Err(BeamlineError::Unimplemented(_))));

        assert!(SequentialBackend.combine_single(&tm, 1.0, &[0.0, 0.0]).is_ok());
    }

    #[test]
    fn cpu_tensor_backend_stays_on_host() {
        let backend = TensorBackend::cpu();
        assert!(matches!(backend.device(), Device::Cpu));
        assert_eq!(backend.name(), "tensor");
    }

    #[test]
    fn tensor_handles_empty_batch() {
        let empty = ScoreMatrix::zeros(0, 5);
        let joint = TensorBackend::cpu().combine(&empty, 1.0, &[], &[]).unwrap();
        assert_eq!(joint.rows(), 0);
        assert_eq!(joint.columns(), 5);
    }
}

// stance_core/src/estimation/measurement_model.rs

use nalgebra::{DMatrix, DVector};
use tracing::trace;

use crate::error::{ConfigError, EstimationError};
use crate::kinematics::KinematicTree;
use crate::messages::{SensorReadings, SensorSample};
use crate::models::measurement::{MeasurementContext, MeasurementElement, MeasurementModelElement};
use crate::state::{GlobalState, StateLayout, BLOCK_DIM};
use crate::types::{BodyId, SensorId};
use crate::utils::matrix::{add_block3, set_block3};

/// The stacked linearization of every element that has data this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct StackedMeasurement {
    /// Observation matrix `H`, rows in element insertion order.
    pub h: DMatrix<f64>,
    /// Block-diagonal measurement noise `R`.
    pub r: DMatrix<f64>,
    /// Stacked residual `z - h(x)`.
    pub residual: DVector<f64>,
    /// The sensors that contributed rows, in row order.
    pub active: Vec<SensorId>,
}

impl StackedMeasurement {
    pub fn rows(&self) -> usize {
        self.residual.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

/// Registered measurement elements, keyed by sensor.
#[derive(Debug, Clone)]
pub struct MeasurementModel {
    estimation_body: BodyId,
    elements: Vec<(SensorId, MeasurementElement)>,
}

impl MeasurementModel {
    pub fn new(estimation_body: BodyId) -> Self {
        Self {
            estimation_body,
            elements: Vec::new(),
        }
    }

    /// Registers an element; its dependencies must already be in `layout`.
    pub fn add_element(
        &mut self,
        layout: &StateLayout,
        sensor: SensorId,
        element: MeasurementElement,
    ) -> Result<(), ConfigError> {
        if let Some(block) = element.dependencies().into_iter().find(|b| !layout.contains(*b)) {
            return Err(ConfigError::MissingBlock {
                element: element.name().to_string(),
                block: block.to_string(),
            });
        }
        self.elements.push((sensor, element));
        Ok(())
    }

    pub fn estimation_body(&self) -> BodyId {
        self.estimation_body
    }

    pub fn elements(&self) -> &[(SensorId, MeasurementElement)] {
        &self.elements
    }

    pub fn element(&self, sensor: SensorId) -> Option<&MeasurementElement> {
        self.elements.iter().find(|(id, _)| *id == sensor).map(|(_, e)| e)
    }

    /// Stacks `H`, `R` and the residual of every element with a sample in
    /// `readings`. Elements without a sample contribute no rows.
    pub fn linearize(
        &self,
        state: &GlobalState,
        tree: &dyn KinematicTree,
        readings: &SensorReadings,
    ) -> Result<StackedMeasurement, EstimationError> {
        let ctx = MeasurementContext {
            state,
            tree,
            estimation_body: self.estimation_body,
        };

        let active: Vec<(SensorId, &MeasurementElement, &SensorSample)> = self
            .elements
            .iter()
            .filter_map(|(sensor, element)| match readings.get(*sensor) {
                Some(sample) => Some((*sensor, element, sample)),
                None => {
                    trace!(sensor = element.name(), "no sample this tick, excluded");
                    None
                }
            })
            .collect();

        let rows = active.len() * BLOCK_DIM;
        let n = state.dim();
        let mut h = DMatrix::zeros(rows, n);
        let mut r = DMatrix::zeros(rows, rows);
        let mut residual = DVector::zeros(rows);

        for (i, (_, element, sample)) in active.iter().enumerate() {
            let row = i * BLOCK_DIM;
            residual
                .fixed_rows_mut::<3>(row)
                .copy_from(&element.residual(&ctx, sample)?);
            for (block, jacobian) in element.jacobian_blocks(&ctx, sample)? {
                add_block3(&mut h, row, state.layout.offset(block), &jacobian);
            }
            set_block3(&mut r, row, row, element.noise_covariance());
        }

        Ok(StackedMeasurement {
            h,
            r,
            residual,
            active: active.into_iter().map(|(sensor, _, _)| sensor).collect(),
        })
    }
}

// stance_core/src/estimation/engine.rs

use nalgebra::{DMatrix, DVector};
use tracing::{debug, error, info, warn};

use super::measurement_model::{MeasurementModel, StackedMeasurement};
use super::process_model::{LinearizedProcess, ProcessModel};
use super::PostStateChange;
use crate::error::{ConfigError, EstimationError};
use crate::kinematics::KinematicTree;
use crate::messages::{ProcessInputs, SensorReadings};
use crate::state::GlobalState;
use crate::types::SensorId;
use crate::utils::matrix::{all_finite_matrix, all_finite_vector, is_positive_semidefinite, is_symmetric, symmetrize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineParameters {
    /// Control period in seconds.
    pub dt: f64,
    pub riccati_iterations: usize,
    pub covariance_inflation: f64,
}

impl Default for EngineParameters {
    fn default() -> Self {
        Self {
            dt: 0.005,
            riccati_iterations: 50,
            covariance_inflation: 100.0,
        }
    }
}

/// What the correction of one tick used.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub active_sensors: Vec<SensorId>,
    pub measurement_rows: usize,
    /// Norm of the stacked residual before the update.
    pub innovation_norm: f64,
}

/// A Kalman filter over a block-structured state.
///
/// Each tick runs Configure (relinearize), Predict and Correct in that order.
/// Every registered post-state-change hook runs after Predict and again after
/// Correct. A fatal fault leaves the engine faulted until `set_state`.
#[derive(Debug, Clone)]
pub struct EstimationEngine {
    state: GlobalState,
    process: ProcessModel,
    measurement: MeasurementModel,
    hooks: Vec<Box<dyn PostStateChange>>,
    parameters: EngineParameters,
    linearized: Option<LinearizedProcess>,
    initialized: bool,
    faulted: bool,
}

impl EstimationEngine {
    pub fn new(
        state: GlobalState,
        process: ProcessModel,
        measurement: MeasurementModel,
        parameters: EngineParameters,
    ) -> Result<Self, ConfigError> {
        if !(parameters.dt.is_finite() && parameters.dt > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "dt",
                reason: format!("must be positive, got {}", parameters.dt),
            });
        }
        if parameters.riccati_iterations == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "riccati_iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(parameters.covariance_inflation.is_finite() && parameters.covariance_inflation >= 1.0) {
            return Err(ConfigError::InvalidParameter {
                name: "covariance_inflation",
                reason: format!("must be >= 1, got {}", parameters.covariance_inflation),
            });
        }

        Ok(Self {
            state,
            process,
            measurement,
            hooks: Vec::new(),
            parameters,
            linearized: None,
            initialized: false,
            faulted: false,
        })
    }

    pub fn add_hook(&mut self, hook: Box<dyn PostStateChange>) {
        self.hooks.push(hook);
    }

    pub fn state(&self) -> &GlobalState {
        &self.state
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.state.covariance
    }

    pub fn parameters(&self) -> &EngineParameters {
        &self.parameters
    }

    pub fn measurement_model(&self) -> &MeasurementModel {
        &self.measurement
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// Replaces mean and covariance. The covariance must be finite, symmetric
    /// and positive semi-definite. Clears a fault and marks the engine
    /// initialized.
    pub fn set_state(&mut self, vector: DVector<f64>, covariance: DMatrix<f64>) -> Result<(), EstimationError> {
        let n = self.state.dim();
        if vector.len() != n {
            return Err(EstimationError::DimensionMismatch {
                expected: n,
                actual: vector.len(),
            });
        }
        if covariance.nrows() != n || covariance.ncols() != n {
            return Err(EstimationError::DimensionMismatch {
                expected: n,
                actual: covariance.nrows().max(covariance.ncols()),
            });
        }
        if !all_finite_vector(&vector) {
            return Err(EstimationError::NonFinite("restored state"));
        }
        if !all_finite_matrix(&covariance) {
            return Err(EstimationError::NonFinite("restored covariance"));
        }
        if !is_symmetric(&covariance) {
            return Err(EstimationError::AsymmetricCovariance);
        }
        if !is_positive_semidefinite(&covariance) {
            return Err(EstimationError::IndefiniteCovariance);
        }

        self.state.vector = vector;
        self.state.covariance = covariance;
        self.initialized = true;
        self.faulted = false;
        Ok(())
    }

    /// Edits the mean in place, then runs the hooks so downstream consumers
    /// see the change.
    pub fn update_state<F>(&mut self, tree: &mut dyn KinematicTree, edit: F) -> Result<(), EstimationError>
    where
        F: FnOnce(&mut GlobalState),
    {
        edit(&mut self.state);
        self.run_hooks(tree)
    }

    // --- Initialization ---

    /// Iterates the Riccati recursion from `P = I` with zero input, then
    /// inflates the result. `readings` selects which sensors contribute.
    pub fn initialize(&mut self, readings: &SensorReadings, tree: &dyn KinematicTree) -> Result<(), EstimationError> {
        let lin = self.process.linearize(&self.state, self.parameters.dt);
        let stacked = self.measurement.linearize(&self.state, tree, readings)?;

        let n = self.state.dim();
        let mut p = DMatrix::identity(n, n);
        for _ in 0..self.parameters.riccati_iterations {
            p = &lin.a * &p * lin.a.transpose() + &lin.q;
            if !stacked.is_empty() {
                let gain = kalman_gain(&p, &stacked)?;
                p = joseph_update(&p, &gain, &stacked);
            }
            symmetrize(&mut p);
        }
        p *= self.parameters.covariance_inflation;

        if !all_finite_matrix(&p) {
            return Err(EstimationError::NonFinite("initial covariance"));
        }
        info!(
            iterations = self.parameters.riccati_iterations,
            sensors = stacked.active.len(),
            trace = p.trace(),
            "initialized covariance from steady-state Riccati recursion"
        );
        self.state.covariance = p;
        self.initialized = true;
        Ok(())
    }

    // --- Tick phases ---

    /// Relinearizes `A`, `B` and `Q` at the current state.
    pub fn configure(&mut self) {
        self.linearized = Some(self.process.linearize(&self.state, self.parameters.dt));
    }

    /// `x = f(x, u)`, `P = A P A^T + Q`, then the hooks.
    pub fn predict(&mut self, inputs: &ProcessInputs, tree: &mut dyn KinematicTree) -> Result<(), EstimationError> {
        let lin = match self.linearized.take() {
            Some(lin) => lin,
            None => self.process.linearize(&self.state, self.parameters.dt),
        };

        let mut posterior = self.process.propagate(&self.state, inputs, self.parameters.dt);
        let mut p = &lin.a * &self.state.covariance * lin.a.transpose() + &lin.q;
        symmetrize(&mut p);
        posterior.covariance = p;
        self.linearized = Some(lin);
        check_finite(&posterior, "predicted state", "predicted covariance")?;

        self.state = posterior;
        self.run_hooks(tree)
    }

    /// Kalman update with every sensor present in `readings`, then the hooks.
    /// `H` is evaluated at the predicted state against the reconciled tree.
    pub fn correct(&mut self, readings: &SensorReadings, tree: &mut dyn KinematicTree) -> Result<TickReport, EstimationError> {
        let stacked = self.measurement.linearize(&self.state, &*tree, readings)?;
        if stacked.is_empty() {
            debug!("no measurements this tick");
            self.run_hooks(tree)?;
            return Ok(TickReport::default());
        }

        let p = &self.state.covariance;
        let gain = kalman_gain(p, &stacked)?;
        let delta = &gain * &stacked.residual;
        let mut updated = joseph_update(p, &gain, &stacked);
        symmetrize(&mut updated);

        self.process.correct(&mut self.state, &delta);
        self.state.covariance = updated;
        check_finite(&self.state, "corrected state", "corrected covariance")?;

        let report = TickReport {
            measurement_rows: stacked.rows(),
            innovation_norm: stacked.residual.norm(),
            active_sensors: stacked.active,
        };
        debug!(
            rows = report.measurement_rows,
            innovation = report.innovation_norm,
            "corrected"
        );
        self.run_hooks(tree)?;
        Ok(report)
    }

    /// One full control tick. Initializes lazily on the first call.
    pub fn tick(
        &mut self,
        inputs: &ProcessInputs,
        readings: &SensorReadings,
        tree: &mut dyn KinematicTree,
    ) -> Result<TickReport, EstimationError> {
        if self.faulted {
            warn!("tick requested on a faulted estimator");
            return Err(EstimationError::Faulted);
        }

        let result = self.run_tick(inputs, readings, tree);
        if let Err(e) = &result {
            self.fault(e);
        }
        result
    }

    /// Latches a fatal fault raised by this engine or by the caller's part of
    /// the tick.
    pub fn fault(&mut self, error: &EstimationError) {
        error!(error = %error, "estimator faulted");
        self.faulted = true;
    }

    fn run_tick(
        &mut self,
        inputs: &ProcessInputs,
        readings: &SensorReadings,
        tree: &mut dyn KinematicTree,
    ) -> Result<TickReport, EstimationError> {
        if !self.initialized {
            self.initialize(readings, &*tree)?;
        }
        self.configure();
        self.predict(inputs, tree)?;
        self.correct(readings, tree)
    }

    fn run_hooks(&mut self, tree: &mut dyn KinematicTree) -> Result<(), EstimationError> {
        for hook in &mut self.hooks {
            hook.on_state_change(&self.state, tree)?;
        }
        Ok(())
    }
}

/// `K = P H^T (H P H^T + R)^-1`, solved through a Cholesky factor of the
/// innovation covariance.
fn kalman_gain(p: &DMatrix<f64>, stacked: &StackedMeasurement) -> Result<DMatrix<f64>, EstimationError> {
    let h = &stacked.h;
    let ph_t = p * h.transpose();
    let mut s = h * &ph_t + &stacked.r;
    symmetrize(&mut s);
    let cholesky = s
        .cholesky()
        .ok_or(EstimationError::SingularInnovation { rows: stacked.rows() })?;
    // K^T = S^-1 (P H^T)^T
    Ok(cholesky.solve(&ph_t.transpose()).transpose())
}

/// `P = (I - K H) P (I - K H)^T + K R K^T`.
fn joseph_update(p: &DMatrix<f64>, gain: &DMatrix<f64>, stacked: &StackedMeasurement) -> DMatrix<f64> {
    let n = p.nrows();
    let i_kh = DMatrix::identity(n, n) - gain * &stacked.h;
    &i_kh * p * i_kh.transpose() + gain * &stacked.r * gain.transpose()
}

fn check_finite(
    state: &GlobalState,
    vector_stage: &'static str,
    covariance_stage: &'static str,
) -> Result<(), EstimationError> {
    if !all_finite_vector(&state.vector) {
        return Err(EstimationError::NonFinite(vector_stage));
    }
    if !all_finite_matrix(&state.covariance) {
        return Err(EstimationError::NonFinite(covariance_stage));
    }
    Ok(())
}

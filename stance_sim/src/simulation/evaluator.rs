// stance_sim/src/simulation/evaluator.rs

use serde::Serialize;
use stance_core::estimator::{EstimatorTelemetry, OrientationAndComEstimator};
use stance_core::kinematics::{KinematicTree, RigidBodyTree};
use tracing::{debug, info};

use super::config::ScenarioConfig;
use super::prng::SimulationRng;
use super::robot::DemoBiped;
use super::sensors::SensorSynthesizer;
use super::trajectory::{GroundTruth, Trajectory};
use super::SimulationError;

/// Root-mean-square estimation errors over a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub ticks: usize,
    pub orientation_rms_deg: f64,
    pub angular_velocity_rms: f64,
    pub com_position_rms: f64,
    pub com_velocity_rms: f64,
    pub telemetry: EstimatorTelemetry,
}

impl EvaluationReport {
    pub fn log(&self) {
        info!(
            ticks = self.ticks,
            orientation_deg = self.orientation_rms_deg,
            angular_velocity = self.angular_velocity_rms,
            com_position = self.com_position_rms,
            com_velocity = self.com_velocity_rms,
            "estimation RMS error"
        );
    }
}

/// Running sums of squared errors.
#[derive(Debug, Default)]
struct ErrorAccumulator {
    count: usize,
    orientation: f64,
    angular_velocity: f64,
    com_position: f64,
    com_velocity: f64,
}

impl ErrorAccumulator {
    fn add(&mut self, truth: &GroundTruth, estimator: &OrientationAndComEstimator<RigidBodyTree>) -> Errors {
        let errors = Errors {
            orientation: (truth.orientation.inverse() * estimator.orientation()).angle(),
            angular_velocity: (truth.angular_velocity - estimator.angular_velocity()).norm(),
            com_position: (truth.com.position - estimator.com_position()).norm(),
            com_velocity: (truth.com.velocity - estimator.com_velocity()).norm(),
        };
        self.count += 1;
        self.orientation += errors.orientation.powi(2);
        self.angular_velocity += errors.angular_velocity.powi(2);
        self.com_position += errors.com_position.powi(2);
        self.com_velocity += errors.com_velocity.powi(2);
        errors
    }

    fn rms(sum: f64, count: usize) -> f64 {
        if count == 0 {
            0.0
        } else {
            (sum / count as f64).sqrt()
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Errors {
    orientation: f64,
    angular_velocity: f64,
    com_position: f64,
    com_velocity: f64,
}

/// Runs one scenario end to end.
///
/// The estimator starts at the true orientation and CoM position with zero
/// rates, then ticks once per control period against synthesized samples.
/// An estimator fault aborts the run.
pub fn evaluate(config: &ScenarioConfig) -> Result<EvaluationReport, SimulationError> {
    config.validate()?;
    let dt = config.estimator.control_dt;
    let ticks = config.tick_count();

    let trajectory = Trajectory::new(config.trajectory.clone())?;
    let mut truth_robot = DemoBiped::new()?;
    let initial = trajectory.apply(0.0, &mut truth_robot)?;

    let mut synthesizer = SensorSynthesizer::new(
        &config.sensors,
        &config.noise,
        &truth_robot.tree,
        SimulationRng::new(config.simulation.seed),
    )?;

    // The estimator's tree starts at the first encoder sample so the root
    // pass places the root consistently with the initial estimate.
    let mut estimator_robot = DemoBiped::new()?;
    for reading in synthesizer.joint_readings(&initial) {
        estimator_robot.tree.set_joint_state(reading.joint, reading.state)?;
    }
    estimator_robot.tree.update_frames();

    let mut builder = OrientationAndComEstimator::builder(estimator_robot.tree, config.estimator.clone());
    for sensor in &config.sensors {
        builder.add_sensor(sensor.clone())?;
    }
    let mut estimator = builder.build()?;
    estimator.set_orientation(initial.orientation)?;
    estimator.set_com_position(initial.com.position)?;

    info!(ticks, dt, sensors = config.sensors.len(), "starting evaluation run");

    let mut accumulator = ErrorAccumulator::default();
    for k in 1..=ticks {
        let t = k as f64 * dt;
        let truth = trajectory.apply(t, &mut truth_robot)?;

        let joints = synthesizer.joint_readings(&truth);
        let inputs = synthesizer.process_inputs(&truth);
        let readings = synthesizer.readings(&truth_robot.tree)?;
        estimator.tick(&joints, &inputs, &readings)?;

        let errors = accumulator.add(&truth, &estimator);
        if k % 200 == 0 {
            debug!(
                t,
                orientation_deg = errors.orientation.to_degrees(),
                angular_velocity = errors.angular_velocity,
                com_position = errors.com_position,
                com_velocity = errors.com_velocity,
                "tracking error"
            );
        }
    }

    let n = accumulator.count;
    Ok(EvaluationReport {
        ticks: n,
        orientation_rms_deg: ErrorAccumulator::rms(accumulator.orientation, n).to_degrees(),
        angular_velocity_rms: ErrorAccumulator::rms(accumulator.angular_velocity, n),
        com_position_rms: ErrorAccumulator::rms(accumulator.com_position, n),
        com_velocity_rms: ErrorAccumulator::rms(accumulator.com_velocity, n),
        telemetry: estimator.telemetry().clone(),
    })
}

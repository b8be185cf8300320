// stance_core/tests/estimator_scenarios.rs

use approx::assert_relative_eq;
use nalgebra::{DMatrix, Isometry3, UnitQuaternion, Vector3};
use stance_core::config::{
    AngularVelocitySensorConfiguration, LinearAccelerationSensorConfiguration, OrientationSensorConfiguration,
    PointSensorConfiguration,
};
use stance_core::prelude::*;

// --- Fixtures ---

/// Pelvis root, torso on a waist joint, one leg ending in a foot.
fn biped_tree() -> (RigidBodyTree, Vec<JointId>, BodyId) {
    let mut tree = RigidBodyTree::new("pelvis", 8.0, Vector3::new(0.0, 0.0, 0.02));
    let pelvis = tree.root_body();
    let (_, waist) = tree
        .add_body(
            pelvis,
            "torso",
            JointKind::Revolute(Vector3::y_axis()),
            Isometry3::translation(0.0, 0.0, 0.12),
            14.0,
            Vector3::new(0.0, 0.0, 0.2),
        )
        .unwrap();
    let (thigh, hip) = tree
        .add_body(
            pelvis,
            "thigh",
            JointKind::Revolute(Vector3::y_axis()),
            Isometry3::translation(0.0, 0.1, -0.05),
            4.0,
            Vector3::new(0.0, 0.0, -0.2),
        )
        .unwrap();
    let (shin, knee) = tree
        .add_body(
            thigh,
            "shin",
            JointKind::Revolute(Vector3::y_axis()),
            Isometry3::translation(0.0, 0.0, -0.4),
            2.5,
            Vector3::new(0.0, 0.0, -0.2),
        )
        .unwrap();
    let (foot, _) = tree
        .add_body(shin, "foot", JointKind::Fixed, Isometry3::translation(0.0, 0.0, -0.4), 0.8, Vector3::zeros())
        .unwrap();
    tree.update_frames();

    let joints = [waist, hip, knee].into_iter().flatten().collect();
    (tree, joints, foot)
}

fn orientation(name: &str, noise: f64) -> SensorConfiguration {
    SensorConfiguration::Orientation(OrientationSensorConfiguration {
        name: name.to_string(),
        body: "pelvis".to_string(),
        mounting: Pose::default(),
        noise: NoiseSpec::StdDev(noise),
    })
}

fn gyro(name: &str, noise: f64, bias_noise: Option<f64>) -> SensorConfiguration {
    SensorConfiguration::AngularVelocity(AngularVelocitySensorConfiguration {
        name: name.to_string(),
        body: "pelvis".to_string(),
        mounting: Pose::default(),
        noise: NoiseSpec::StdDev(noise),
        bias_noise: bias_noise.map(NoiseSpec::StdDev),
    })
}

fn accelerometer(name: &str, noise: f64, bias_noise: Option<f64>) -> SensorConfiguration {
    SensorConfiguration::LinearAcceleration(LinearAccelerationSensorConfiguration {
        name: name.to_string(),
        body: "pelvis".to_string(),
        mounting: Pose::default(),
        noise: NoiseSpec::StdDev(noise),
        bias_noise: bias_noise.map(NoiseSpec::StdDev),
        gravity_z: 9.81,
    })
}

fn point_velocity(name: &str, noise: f64) -> SensorConfiguration {
    SensorConfiguration::PointVelocity(PointSensorConfiguration {
        name: name.to_string(),
        noise: NoiseSpec::StdDev(noise),
    })
}

fn standing(joints: &[JointId]) -> Vec<JointReading> {
    joints
        .iter()
        .map(|&joint| JointReading {
            joint,
            state: JointState::new(0.0, 0.0, 0.0),
        })
        .collect()
}

fn assert_symmetric_psd(p: &DMatrix<f64>) {
    let scale = p.amax().max(1.0);
    assert!((p - p.transpose()).amax() <= 1e-9 * scale, "covariance is not symmetric");
    let min_eigenvalue = p.clone().symmetric_eigenvalues().min();
    assert!(min_eigenvalue >= -1e-9 * scale, "negative eigenvalue {min_eigenvalue}");
}

// --- Construction ---

#[test]
fn test_layout_blocks_are_disjoint_and_cover_the_state() {
    let (tree, _, _) = biped_tree();
    let estimator = OrientationAndComEstimator::builder(tree, EstimatorParameters::default())
        .with_sensor(orientation("imu_orientation", 0.01))
        .unwrap()
        .with_sensor(gyro("imu_gyro", 0.01, Some(1e-4)))
        .unwrap()
        .with_sensor(accelerometer("imu_accel", 0.1, Some(1e-3)))
        .unwrap()
        .with_sensor(point_velocity("foot_velocity", 0.01))
        .unwrap()
        .build()
        .unwrap();

    let layout = &estimator.state().layout;
    let mut next = 0;
    for (_, block) in layout.iter() {
        assert_eq!(block.range.start, next, "block '{}' is not contiguous", block.name);
        next = block.range.end;
    }
    assert_eq!(next, layout.dim());
    assert_eq!(estimator.state().vector.len(), layout.dim());
    assert_eq!(estimator.covariance().nrows(), layout.dim());

    // Bias blocks follow the six physical blocks in sensor order.
    let names: Vec<&str> = layout.iter().map(|(_, b)| b.name.as_str()).skip(6).collect();
    assert_eq!(names, ["imu_gyro.bias", "imu_accel.bias"]);
}

#[test]
fn test_orientation_source_count_must_be_one() {
    let (tree, _, _) = biped_tree();
    let none = OrientationAndComEstimator::builder(tree.clone(), EstimatorParameters::default())
        .with_sensor(gyro("imu_gyro", 0.01, None))
        .unwrap()
        .build();
    assert!(matches!(none, Err(ConfigError::OrientationSourceCount(0))));

    let two = OrientationAndComEstimator::builder(tree, EstimatorParameters::default())
        .with_sensor(orientation("imu_a", 0.01))
        .unwrap()
        .with_sensor(orientation("imu_b", 0.01))
        .unwrap()
        .build();
    assert!(matches!(two, Err(ConfigError::OrientationSourceCount(2))));
}

#[test]
fn test_non_positive_definite_noise_is_rejected() {
    let (tree, _, _) = biped_tree();
    let bad = SensorConfiguration::Orientation(OrientationSensorConfiguration {
        name: "imu_orientation".to_string(),
        body: "pelvis".to_string(),
        mounting: Pose::default(),
        noise: NoiseSpec::Covariance([[1e-4, 0.0, 0.0], [0.0, -1e-4, 0.0], [0.0, 0.0, 1e-4]]),
    });
    let result = OrientationAndComEstimator::builder(tree, EstimatorParameters::default())
        .with_sensor(bad)
        .unwrap()
        .build();
    assert!(matches!(result, Err(ConfigError::NoiseNotPositiveDefinite { .. })));
}

#[test]
fn test_negative_gravity_is_rejected() {
    let (tree, _, _) = biped_tree();
    let mut accel = LinearAccelerationSensorConfiguration {
        name: "imu_accel".to_string(),
        body: "pelvis".to_string(),
        mounting: Pose::default(),
        noise: NoiseSpec::StdDev(0.1),
        bias_noise: None,
        gravity_z: 9.81,
    };
    accel.gravity_z = -9.81;
    let result = OrientationAndComEstimator::builder(tree, EstimatorParameters::default())
        .with_sensor(orientation("imu_orientation", 0.01))
        .unwrap()
        .with_sensor(SensorConfiguration::LinearAcceleration(accel))
        .unwrap()
        .build();
    assert!(matches!(result, Err(ConfigError::InvalidGravity(g)) if g < 0.0));
}

#[test]
fn test_sensor_list_parses_from_toml() {
    #[derive(serde::Deserialize)]
    struct Sensors {
        sensors: Vec<SensorConfiguration>,
    }

    let text = r#"
        [[sensors]]
        kind = "Orientation"
        name = "imu_orientation"
        body = "pelvis"
        noise = 0.01

        [[sensors]]
        kind = "AngularVelocity"
        name = "imu_gyro"
        body = "pelvis"
        noise = [0.01, 0.01, 0.02]
        bias_noise = 1e-4

        [[sensors]]
        kind = "PointVelocity"
        name = "foot_velocity"
        noise = 0.02
    "#;
    let parsed: Sensors = toml::from_str(text).unwrap();

    let (tree, _, _) = biped_tree();
    let mut builder = OrientationAndComEstimator::builder(tree, EstimatorParameters::default());
    for sensor in parsed.sensors {
        builder.add_sensor(sensor).unwrap();
    }
    let estimator = builder.build().unwrap();
    assert_eq!(estimator.state().dim(), 21);
    assert_eq!(estimator.sensor_id("foot_velocity"), Some(SensorId(2)));
}

// --- Scenarios ---

#[test]
fn test_static_robot_converges_and_holds() {
    let (tree, joints, foot) = biped_tree();
    let parameters = EstimatorParameters {
        angular_acceleration_noise: NoiseSpec::StdDev(1e-3),
        com_acceleration_noise: NoiseSpec::StdDev(1e-3),
        ..Default::default()
    };
    let mut estimator = OrientationAndComEstimator::builder(tree, parameters)
        .with_sensor(orientation("imu_orientation", 1e-3))
        .unwrap()
        .with_sensor(gyro("imu_gyro", 1e-3, None))
        .unwrap()
        .with_sensor(point_velocity("foot_velocity", 1e-3))
        .unwrap()
        .build()
        .unwrap();

    let start = Vector3::new(0.0, 0.0, 0.9);
    estimator.set_com_position(start).unwrap();
    estimator.set_angular_velocity(Vector3::new(0.1, -0.05, 0.1)).unwrap();

    let readings = SensorReadings::new()
        .with(
            estimator.sensor_id("imu_orientation").unwrap(),
            SensorSample::Orientation(UnitQuaternion::identity()),
        )
        .with(
            estimator.sensor_id("imu_gyro").unwrap(),
            SensorSample::AngularVelocity(Vector3::zeros()),
        )
        .with(
            estimator.sensor_id("foot_velocity").unwrap(),
            SensorSample::PointVelocity {
                body: foot,
                point: Vector3::zeros(),
                velocity: Vector3::zeros(),
            },
        );
    let joint_readings = standing(&joints);

    for _ in 0..500 {
        estimator
            .tick(&joint_readings, &ProcessInputs::default(), &readings)
            .unwrap();
    }
    assert!(estimator.angular_velocity().norm() < 1e-3);
    assert!(estimator.com_velocity().norm() < 1e-3);
    assert!(estimator.orientation().angle() < 1e-2);
    let settled = estimator.com_position();
    assert!((settled - start).norm() < 1e-2);

    // And it stays there.
    for _ in 0..200 {
        estimator
            .tick(&joint_readings, &ProcessInputs::default(), &readings)
            .unwrap();
    }
    assert!(estimator.angular_velocity().norm() < 1e-3);
    assert!((estimator.com_position() - settled).norm() < 1e-3);
}

#[test]
fn test_static_robot_without_gyro_converges_and_holds() {
    let (tree, joints, foot) = biped_tree();
    let parameters = EstimatorParameters {
        angular_acceleration_noise: NoiseSpec::StdDev(1e-3),
        com_acceleration_noise: NoiseSpec::StdDev(1e-3),
        ..Default::default()
    };
    let mut estimator = OrientationAndComEstimator::builder(tree, parameters)
        .with_sensor(orientation("imu_orientation", 1e-3))
        .unwrap()
        .with_sensor(point_velocity("foot_velocity", 1e-3))
        .unwrap()
        .build()
        .unwrap();

    let start = Vector3::new(0.0, 0.0, 0.9);
    estimator.set_com_position(start).unwrap();
    estimator.set_angular_velocity(Vector3::new(0.1, -0.05, 0.1)).unwrap();

    let readings = SensorReadings::new()
        .with(
            estimator.sensor_id("imu_orientation").unwrap(),
            SensorSample::Orientation(UnitQuaternion::identity()),
        )
        .with(
            estimator.sensor_id("foot_velocity").unwrap(),
            SensorSample::PointVelocity {
                body: foot,
                point: Vector3::zeros(),
                velocity: Vector3::zeros(),
            },
        );
    let joint_readings = standing(&joints);
    let root = estimator.tree().root_body();

    for _ in 0..1000 {
        estimator
            .tick(&joint_readings, &ProcessInputs::default(), &readings)
            .unwrap();
        let root_rotation = estimator.tree().body_pose(root).unwrap().rotation;
        assert_relative_eq!(root_rotation.norm(), 1.0, epsilon = 1e-9);
    }
    assert!(estimator.angular_velocity().norm() < 1e-3);
    assert!(estimator.com_velocity().norm() < 1e-3);
    assert!(estimator.orientation().angle() < 1e-2);
    let settled = estimator.com_position();
    assert!((settled - start).norm() < 5e-2);

    for _ in 0..500 {
        estimator
            .tick(&joint_readings, &ProcessInputs::default(), &readings)
            .unwrap();
    }
    assert!(!estimator.is_faulted());
    assert!(estimator.angular_velocity().norm() < 1e-3);
    assert!(estimator.com_velocity().norm() < 1e-3);
    assert!(estimator.orientation().angle() < 1e-2);
    assert!((estimator.com_position() - settled).norm() < 1e-3);
    assert_symmetric_psd(estimator.covariance());
}

#[test]
fn test_orientation_estimator_estimates_gyro_bias() {
    let (tree, joints, _) = biped_tree();
    let parameters = EstimatorParameters {
        angular_acceleration_noise: NoiseSpec::StdDev(0.05),
        ..Default::default()
    };
    let mut estimator = OrientationEstimator::builder(tree, parameters)
        .with_sensor(orientation("imu_orientation", 1e-3))
        .unwrap()
        .with_sensor(gyro("imu_gyro", 1e-3, Some(1e-3)))
        .unwrap()
        .build_orientation()
        .unwrap();
    let bias_block = estimator.state().layout.find("imu_gyro.bias").unwrap();

    let bias = Vector3::new(0.02, -0.01, 0.03);
    let readings = SensorReadings::new()
        .with(
            estimator.sensor_id("imu_orientation").unwrap(),
            SensorSample::Orientation(UnitQuaternion::identity()),
        )
        .with(
            estimator.sensor_id("imu_gyro").unwrap(),
            SensorSample::AngularVelocity(bias),
        );
    let joint_readings = standing(&joints);

    for _ in 0..2000 {
        estimator
            .tick(&joint_readings, &ProcessInputs::default(), &readings)
            .unwrap();
    }
    assert!(estimator.angular_velocity().norm() < 1e-3);
    assert!(estimator.orientation().angle() < 1e-3);
    assert_relative_eq!(estimator.state().vector3(bias_block), bias, epsilon = 1e-3);
    assert_symmetric_psd(estimator.covariance());
}

#[test]
fn test_covariance_stays_psd_while_moving() {
    let (tree, joints, foot) = biped_tree();
    let mut estimator = OrientationAndComEstimator::builder(tree, EstimatorParameters::default())
        .with_sensor(orientation("imu_orientation", 0.01))
        .unwrap()
        .with_sensor(gyro("imu_gyro", 0.02, Some(1e-4)))
        .unwrap()
        .with_sensor(accelerometer("imu_accel", 0.1, Some(1e-3)))
        .unwrap()
        .with_sensor(point_velocity("foot_velocity", 0.05))
        .unwrap()
        .build()
        .unwrap();
    let ids: Vec<SensorId> = ["imu_orientation", "imu_gyro", "imu_accel", "foot_velocity"]
        .iter()
        .map(|name| estimator.sensor_id(name).unwrap())
        .collect();

    let dt = 0.005;
    let rate = 0.5;
    for k in 0..400 {
        let t = k as f64 * dt;
        let attitude = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), rate * t);
        let mut readings = SensorReadings::new()
            .with(ids[0], SensorSample::Orientation(attitude))
            .with(ids[1], SensorSample::AngularVelocity(Vector3::new(0.0, 0.0, rate)))
            .with(ids[2], SensorSample::LinearAcceleration(Vector3::new(0.0, 0.0, 9.81)));
        // Foot contact only on alternate half-seconds.
        if (t * 2.0) as usize % 2 == 0 {
            readings.insert(
                ids[3],
                SensorSample::PointVelocity {
                    body: foot,
                    point: Vector3::zeros(),
                    velocity: Vector3::zeros(),
                },
            );
        }
        let joint_readings: Vec<JointReading> = joints
            .iter()
            .enumerate()
            .map(|(i, &joint)| {
                let phase = t * 3.0 + i as f64;
                JointReading {
                    joint,
                    state: JointState::new(0.2 * phase.sin(), 0.6 * phase.cos(), -1.8 * phase.sin()),
                }
            })
            .collect();

        estimator
            .tick(&joint_readings, &ProcessInputs::default(), &readings)
            .unwrap();

        assert_symmetric_psd(estimator.covariance());
        assert_relative_eq!(estimator.orientation().quaternion().norm(), 1.0, epsilon = 1e-9);
    }
}

#[test]
fn test_missing_samples_contribute_no_rows() {
    let (tree, joints, _) = biped_tree();
    let mut estimator = OrientationAndComEstimator::builder(tree, EstimatorParameters::default())
        .with_sensor(orientation("imu_orientation", 0.01))
        .unwrap()
        .with_sensor(gyro("imu_gyro", 0.01, None))
        .unwrap()
        .build()
        .unwrap();
    let gyro_id = estimator.sensor_id("imu_gyro").unwrap();

    let only_gyro = SensorReadings::new().with(gyro_id, SensorSample::AngularVelocity(Vector3::zeros()));
    let report = estimator
        .tick(&standing(&joints), &ProcessInputs::default(), &only_gyro)
        .unwrap();
    assert_eq!(report.active_sensors, vec![gyro_id]);
    assert_eq!(report.measurement_rows, 3);

    let report = estimator
        .tick(&standing(&joints), &ProcessInputs::default(), &SensorReadings::new())
        .unwrap();
    assert_eq!(report.measurement_rows, 0);
    assert!(estimator.telemetry().active_sensors.is_empty());
}

#[test]
fn test_non_finite_sample_faults_until_restored() {
    let (tree, joints, _) = biped_tree();
    let mut estimator = OrientationAndComEstimator::builder(tree, EstimatorParameters::default())
        .with_sensor(orientation("imu_orientation", 0.01))
        .unwrap()
        .with_sensor(gyro("imu_gyro", 0.01, None))
        .unwrap()
        .build()
        .unwrap();
    let gyro_id = estimator.sensor_id("imu_gyro").unwrap();
    let joint_readings = standing(&joints);

    let good = SensorReadings::new().with(gyro_id, SensorSample::AngularVelocity(Vector3::zeros()));
    estimator
        .tick(&joint_readings, &ProcessInputs::default(), &good)
        .unwrap();
    let snapshot_vector = estimator.state().vector.clone();
    let snapshot_covariance = estimator.covariance().clone();

    let poisoned = SensorReadings::new().with(gyro_id, SensorSample::AngularVelocity(Vector3::new(f64::NAN, 0.0, 0.0)));
    let result = estimator.tick(&joint_readings, &ProcessInputs::default(), &poisoned);
    assert!(matches!(result, Err(EstimationError::NonFinite(_))));
    assert!(estimator.is_faulted());
    assert!(estimator.telemetry().faulted);
    assert_eq!(
        estimator.tick(&joint_readings, &ProcessInputs::default(), &good),
        Err(EstimationError::Faulted)
    );

    estimator.set_state(snapshot_vector, snapshot_covariance).unwrap();
    assert!(!estimator.is_faulted());
    assert!(estimator
        .tick(&joint_readings, &ProcessInputs::default(), &good)
        .is_ok());
}

#[test]
fn test_unknown_joint_faults_the_tick() {
    let (tree, _, _) = biped_tree();
    let mut estimator = OrientationAndComEstimator::builder(tree, EstimatorParameters::default())
        .with_sensor(orientation("imu_orientation", 0.01))
        .unwrap()
        .build()
        .unwrap();
    let bogus = [JointReading {
        joint: JointId(99),
        state: JointState::new(0.0, 0.0, 0.0),
    }];
    let result = estimator.tick(&bogus, &ProcessInputs::default(), &SensorReadings::new());
    assert!(matches!(
        result,
        Err(EstimationError::Kinematics(KinematicsError::UnknownJoint(JointId(99))))
    ));
    assert!(estimator.is_faulted());
}

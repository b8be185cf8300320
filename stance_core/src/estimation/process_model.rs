// stance_core/src/estimation/process_model.rs

use nalgebra::{DMatrix, DVector};
use std::collections::HashMap;

use crate::error::ConfigError;
use crate::messages::ProcessInputs;
use crate::models::process::{ProcessElement, ProcessModelElement, TimeDomain, INPUT_DIM};
use crate::state::{GlobalState, StateLayout, BLOCK_DIM};
use crate::types::BlockId;
use crate::utils::matrix::{add_block3, symmetrize};

/// The discrete system `x_k+1 = A x_k + B u_k + w_k`, `w_k ~ N(0, Q)`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearizedProcess {
    pub a: DMatrix<f64>,
    pub b: DMatrix<f64>,
    pub q: DMatrix<f64>,
}

/// Assembles the global process model from per-block elements.
///
/// Continuous-time elements form one sub-system that is discretized with the
/// matrix exponential; discrete-time elements are placed directly. Both are
/// scattered into the global matrices at their blocks' offsets.
#[derive(Debug, Clone)]
pub struct ProcessModel {
    elements: Vec<ProcessElement>,
    /// Continuous blocks in layout order, with their local offset in the
    /// continuous sub-system.
    continuous: Vec<BlockId>,
    continuous_offsets: HashMap<BlockId, usize>,
}

impl ProcessModel {
    /// Validates the wiring: every block has exactly one element, and no
    /// element depends on a missing block or on a block of the other domain.
    pub fn new(layout: &StateLayout, elements: Vec<ProcessElement>) -> Result<Self, ConfigError> {
        if layout.is_empty() {
            return Err(ConfigError::EmptyState);
        }

        let mut domains: HashMap<BlockId, TimeDomain> = HashMap::new();
        for element in &elements {
            let block = element.block();
            if !layout.contains(block) {
                return Err(ConfigError::MissingBlock {
                    element: format!("process element for {block}"),
                    block: block.to_string(),
                });
            }
            if domains.insert(block, element.time_domain()).is_some() {
                return Err(ConfigError::DuplicateProcessElement(layout.name(block).to_string()));
            }
        }

        for (id, block) in layout.iter() {
            if !domains.contains_key(&id) {
                return Err(ConfigError::UnmodelledBlock(block.name.clone()));
            }
        }

        for element in &elements {
            let owner = layout.name(element.block()).to_string();
            for dependency in element.dependencies() {
                match domains.get(&dependency) {
                    None => {
                        return Err(ConfigError::MissingBlock {
                            element: owner,
                            block: dependency.to_string(),
                        })
                    }
                    Some(domain) if *domain != element.time_domain() => {
                        return Err(ConfigError::CrossDomainCoupling {
                            element: owner,
                            block: layout.name(dependency).to_string(),
                        })
                    }
                    Some(_) => {}
                }
            }
        }

        let continuous: Vec<BlockId> = layout
            .iter()
            .map(|(id, _)| id)
            .filter(|id| domains[id] == TimeDomain::Continuous)
            .collect();
        let continuous_offsets = continuous
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i * BLOCK_DIM))
            .collect();

        Ok(Self {
            elements,
            continuous,
            continuous_offsets,
        })
    }

    pub fn elements(&self) -> &[ProcessElement] {
        &self.elements
    }

    /// Builds the global `A`, `B` and `Q` for a step of `dt` at `state`.
    pub fn linearize(&self, state: &GlobalState, dt: f64) -> LinearizedProcess {
        let layout = &state.layout;
        let n = layout.dim();
        let mut a = DMatrix::zeros(n, n);
        let mut b = DMatrix::zeros(n, INPUT_DIM);
        let mut q = DMatrix::zeros(n, n);

        // --- Continuous sub-system ---
        let nc = self.continuous.len() * BLOCK_DIM;
        if nc > 0 {
            let mut f = DMatrix::zeros(nc, nc);
            let mut g = DMatrix::zeros(nc, INPUT_DIM);
            let mut qc = DMatrix::zeros(nc, nc);

            for element in self.elements.iter().filter(|e| e.time_domain() == TimeDomain::Continuous) {
                let row = self.continuous_offsets[&element.block()];
                let rows = element.linearize(state);
                for (dependency, block) in &rows.state {
                    add_block3(&mut f, row, self.continuous_offsets[dependency], block);
                }
                for (input, block) in &rows.input {
                    add_block3(&mut g, row, input.offset(), block);
                }
                if let Some(noise) = &rows.noise {
                    add_block3(&mut qc, row, row, noise);
                }
            }

            let (phi, bd, qd) = discretize(&f, &g, &qc, dt);
            for (i, bi) in self.continuous.iter().enumerate() {
                let gi = layout.offset(*bi);
                for (j, bj) in self.continuous.iter().enumerate() {
                    let gj = layout.offset(*bj);
                    a.fixed_view_mut::<3, 3>(gi, gj)
                        .copy_from(&phi.fixed_view::<3, 3>(i * BLOCK_DIM, j * BLOCK_DIM));
                    q.fixed_view_mut::<3, 3>(gi, gj)
                        .copy_from(&qd.fixed_view::<3, 3>(i * BLOCK_DIM, j * BLOCK_DIM));
                }
                b.rows_mut(gi, BLOCK_DIM)
                    .copy_from(&bd.rows(i * BLOCK_DIM, BLOCK_DIM));
            }
        }

        // --- Discrete elements ---
        for element in self.elements.iter().filter(|e| e.time_domain() == TimeDomain::Discrete) {
            let row = layout.offset(element.block());
            let rows = element.linearize(state);
            for (dependency, block) in &rows.state {
                add_block3(&mut a, row, layout.offset(*dependency), block);
            }
            for (input, block) in &rows.input {
                add_block3(&mut b, row, input.offset(), block);
            }
            if let Some(noise) = &rows.noise {
                add_block3(&mut q, row, row, noise);
            }
        }

        LinearizedProcess { a, b, q }
    }

    /// The propagated mean. Every element reads the prior and writes its own
    /// block of the posterior.
    pub fn propagate(&self, prior: &GlobalState, inputs: &ProcessInputs, dt: f64) -> GlobalState {
        let mut posterior = prior.clone();
        for element in &self.elements {
            element.propagate(prior, inputs, dt, &mut posterior);
        }
        posterior.last_update_timestamp = prior.last_update_timestamp + dt;
        posterior
    }

    /// Applies a full-length tangent-space correction block by block.
    pub fn correct(&self, state: &mut GlobalState, delta: &DVector<f64>) {
        for element in &self.elements {
            let slice = state.block_slice(element.block(), delta);
            element.correct(&slice, state);
        }
    }
}

/// Van Loan discretization of `x_dot = F x + G u + w`, `w ~ N(0, Qc)`.
///
/// Returns `(Phi, B_d, Q_d)` with
/// `exp([[F, G], [0, 0]] dt) = [[Phi, B_d], [0, I]]` and
/// `exp([[-F, Qc], [0, F^T]] dt) = [[.., Phi^-1 Q_d], [0, Phi^T]]`.
pub fn discretize(
    f: &DMatrix<f64>,
    g: &DMatrix<f64>,
    qc: &DMatrix<f64>,
    dt: f64,
) -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>) {
    let n = f.nrows();
    let m = g.ncols();

    let mut augmented = DMatrix::zeros(n + m, n + m);
    augmented.view_mut((0, 0), (n, n)).copy_from(&(f * dt));
    augmented.view_mut((0, n), (n, m)).copy_from(&(g * dt));
    let transition = augmented.exp();
    let phi = transition.view((0, 0), (n, n)).into_owned();
    let bd = transition.view((0, n), (n, m)).into_owned();

    let mut van_loan = DMatrix::zeros(2 * n, 2 * n);
    van_loan.view_mut((0, 0), (n, n)).copy_from(&(-f * dt));
    van_loan.view_mut((0, n), (n, n)).copy_from(&(qc * dt));
    van_loan.view_mut((n, n), (n, n)).copy_from(&(f.transpose() * dt));
    let noise = van_loan.exp();
    let e12 = noise.view((0, n), (n, n));
    let e22 = noise.view((n, n), (n, n));
    let mut qd = e22.transpose() * e12;
    symmetrize(&mut qd);

    (phi, bd, qd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NoiseCovariance;
    use crate::models::process::{
        AngularAccelerationElement, AngularVelocityElement, ComPositionElement, ComVelocityElement,
        OrientationElement, ProcessInput,
    };
    use crate::state::BlockKind;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Vector3};

    fn noise(std_dev: f64) -> NoiseCovariance {
        NoiseCovariance::from_std_dev("test", std_dev).unwrap()
    }

    #[test]
    fn test_discretize_double_integrator() {
        let dt = 0.01;
        let q = 0.5;
        let f = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]);
        let g = DMatrix::from_row_slice(2, 1, &[0.0, 1.0]);
        let qc = DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 0.0, q]);

        let (phi, bd, qd) = discretize(&f, &g, &qc, dt);
        assert_relative_eq!(phi, DMatrix::from_row_slice(2, 2, &[1.0, dt, 0.0, 1.0]), epsilon = 1e-12);
        assert_relative_eq!(bd, DMatrix::from_row_slice(2, 1, &[0.5 * dt * dt, dt]), epsilon = 1e-12);
        let expected = DMatrix::from_row_slice(
            2,
            2,
            &[q * dt.powi(3) / 3.0, q * dt * dt / 2.0, q * dt * dt / 2.0, q * dt],
        );
        assert_relative_eq!(qd, expected, epsilon = 1e-12);
    }

    struct AngularModel {
        model: ProcessModel,
        state: GlobalState,
        orientation: BlockId,
        omega: BlockId,
        alpha: BlockId,
    }

    fn angular_model() -> AngularModel {
        let mut layout = StateLayout::new();
        let orientation = layout.add_block("orientation", BlockKind::Orientation).unwrap();
        let omega = layout.add_block("angular_velocity", BlockKind::AngularVelocity).unwrap();
        let alpha = layout
            .add_block("angular_acceleration", BlockKind::AngularAcceleration)
            .unwrap();
        let model = ProcessModel::new(
            &layout,
            vec![
                OrientationElement::new(orientation, omega).into(),
                AngularVelocityElement::new(omega, noise(2.0)).into(),
                AngularAccelerationElement::new(alpha, noise(2.0)).into(),
            ],
        )
        .unwrap();
        AngularModel {
            model,
            state: GlobalState::new(layout),
            orientation,
            omega,
            alpha,
        }
    }

    #[test]
    fn test_linearize_places_blocks_at_offsets() {
        let AngularModel {
            model,
            state,
            orientation,
            omega,
            alpha,
        } = angular_model();
        let dt = 0.005;
        let lin = model.linearize(&state, dt);
        let (o, w, al) = (
            state.layout.offset(orientation),
            state.layout.offset(omega),
            state.layout.offset(alpha),
        );
        let u = ProcessInput::DesiredAngularAcceleration.offset();

        let block = |m: &DMatrix<f64>, r: usize, c: usize| -> Matrix3<f64> { m.fixed_view::<3, 3>(r, c).into_owned() };
        assert_relative_eq!(block(&lin.a, o, o), Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(block(&lin.a, o, w), Matrix3::identity() * dt, epsilon = 1e-12);
        assert_relative_eq!(block(&lin.a, w, w), Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(block(&lin.a, al, al), Matrix3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(block(&lin.b, al, u), Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(block(&lin.b, w, u), Matrix3::identity() * dt, epsilon = 1e-12);
        assert_relative_eq!(block(&lin.q, al, al), Matrix3::identity() * 4.0, epsilon = 1e-12);
        assert_relative_eq!(block(&lin.q, w, w), Matrix3::identity() * 4.0 * dt, epsilon = 1e-12);
        // No noise crosses the time domains.
        assert_relative_eq!(block(&lin.q, w, al), Matrix3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(lin.q.clone(), lin.q.transpose(), epsilon = 1e-15);
    }

    #[test]
    fn test_propagate_follows_inputs() {
        let AngularModel {
            model,
            mut state,
            omega,
            alpha,
            ..
        } = angular_model();
        state.set_vector3(omega, &Vector3::new(0.0, 0.0, 1.0));
        let inputs = ProcessInputs {
            desired_angular_acceleration: Vector3::new(2.0, 0.0, 0.0),
            ..Default::default()
        };
        let next = model.propagate(&state, &inputs, 0.1);
        assert_relative_eq!(next.vector3(omega), Vector3::new(0.2, 0.0, 1.0), epsilon = 1e-12);
        assert_relative_eq!(next.vector3(alpha), Vector3::new(2.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(next.last_update_timestamp, 0.1);
    }

    #[test]
    fn test_wiring_errors() {
        let mut layout = StateLayout::new();
        let p = layout.add_block("com_position", BlockKind::CenterOfMassPosition).unwrap();
        let v = layout.add_block("com_velocity", BlockKind::CenterOfMassVelocity).unwrap();

        // Velocity block without an element.
        let missing = ProcessModel::new(&layout, vec![ComPositionElement::new(p, v).into()]);
        assert!(matches!(missing, Err(ConfigError::UnmodelledBlock(_))));

        // Position integrating a discrete-time block.
        let crossed = ProcessModel::new(
            &layout,
            vec![
                ComPositionElement::new(p, v).into(),
                crate::models::process::ComAccelerationElement::new(v, noise(1.0)).into(),
            ],
        );
        assert!(matches!(crossed, Err(ConfigError::CrossDomainCoupling { .. })));

        let duplicated = ProcessModel::new(
            &layout,
            vec![
                ComPositionElement::new(p, v).into(),
                ComVelocityElement::new(v, noise(1.0)).into(),
                ComVelocityElement::new(v, noise(1.0)).into(),
            ],
        );
        assert!(matches!(duplicated, Err(ConfigError::DuplicateProcessElement(_))));

        assert!(ProcessModel::new(&StateLayout::new(), Vec::new()).is_err());
    }
}

// stance_sim/src/simulation/prng.rs

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

/// The single deterministic noise source of a run.
pub struct SimulationRng(pub ChaCha8Rng);

impl SimulationRng {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => {
                info!("no seed configured, drawing one from the OS");
                ChaCha8Rng::from_entropy()
            }
        };
        Self(rng)
    }
}

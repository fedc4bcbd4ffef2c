//! Seeds for experiment cells.
//!
//! An experiment is a grid of (model, data fraction, trial) units. Each
//! (data fraction, trial) cell gets one seed, hashed with BLAKE3 from the
//! master seed, the fraction's bit pattern, and the trial index. The model is
//! not part of the key: the constrained model and every baseline in a cell
//! draw the same training set and the same candidate/safety split seed.

/// Domain separator for cell seeds.
const CELL_DOMAIN: &[u8] = b"seldonlab/cell";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedTree {
    master_seed: u64,
}

impl SeedTree {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Seed of the cell at `data_frac` and `trial`.
    ///
    /// A pure function of its inputs, so the worker that runs a cell and the
    /// order cells are scheduled in never change it.
    pub fn cell_seed(&self, data_frac: f64, trial: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(CELL_DOMAIN);
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(&data_frac.to_bits().to_le_bytes());
        hasher.update(&trial.to_le_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hasher.finalize().as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }
}

//! Seed management for planet generation
//!
//! Each randomized stage gets its own seed so one stage can be varied while
//! the others stay fixed.

/// Seeds for the randomized stages.
///
/// Derived from a master seed by default; any of them can be overridden.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorldSeeds {
    /// Master seed (used for display/reference)
    pub master: u64,
    /// Noise octaves that seed the initial plates
    pub plates: u64,
    /// Rotation axes and speeds drawn when the rules supply none
    pub kinematics: u64,
    /// Continental height jitter
    pub altitude: u64,
}

impl WorldSeeds {
    /// Create seeds from a master seed, deriving all sub-seeds deterministically.
    pub fn from_master(master: u64) -> Self {
        Self {
            master,
            plates: derive_seed(master, "plates"),
            kinematics: derive_seed(master, "kinematics"),
            altitude: derive_seed(master, "altitude"),
        }
    }

    pub fn builder(master: u64) -> WorldSeedsBuilder {
        WorldSeedsBuilder::new(master)
    }
}

impl Default for WorldSeeds {
    fn default() -> Self {
        Self::from_master(rand::random())
    }
}

/// Overrides individual seeds while deriving the rest from the master.
pub struct WorldSeedsBuilder {
    seeds: WorldSeeds,
}

impl WorldSeedsBuilder {
    pub fn new(master: u64) -> Self {
        Self {
            seeds: WorldSeeds::from_master(master),
        }
    }

    pub fn plates(mut self, seed: u64) -> Self {
        self.seeds.plates = seed;
        self
    }

    pub fn kinematics(mut self, seed: u64) -> Self {
        self.seeds.kinematics = seed;
        self
    }

    pub fn altitude(mut self, seed: u64) -> Self {
        self.seeds.altitude = seed;
        self
    }

    pub fn build(self) -> WorldSeeds {
        self.seeds
    }
}

/// Mix the master seed with an FNV-1a hash of the stage name. Fixed
/// arithmetic, so seeds do not change between toolchains.
fn derive_seed(master: u64, stage: &str) -> u64 {
    let salt = stage
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3));
    splitmix64(master ^ salt)
}

/// One SplitMix64 output for state `x`.
fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

impl std::fmt::Display for WorldSeeds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "WorldSeeds {{ master: {}, plates: {}, kinematics: {}, altitude: {} }}",
            self.master, self.plates, self.kinematics, self.altitude,
        )
    }
}

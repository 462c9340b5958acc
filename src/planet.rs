//! Whole-planet pipeline
//!
//! Runs the stages in order: plate generation, plate movement, altitude,
//! seasonal rainfall and water routing. Each stage still validates its own
//! rules, so a collaborator can also drive them one by one.

use std::fmt;

use log::info;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::climate::{simulate_rainfall, SeasonalRainfall};
use crate::erosion::{route_water, ErosionResult};
use crate::error::{invalid_config, Result};
use crate::heightmap::synthesize_altitude;
use crate::plates::{generate_plates, move_plates, PlateKinematics, StepReport};
use crate::rules::{AltitudeRules, BaseRules, ErosionRules, GenerateRules, MoveRules, RainfallRules};
use crate::seeds::WorldSeeds;
use crate::tilemap::Tilemap;
use crate::world::PlateWorld;

/// Fastest random plate, in latitude cells per unit of time.
const MAX_RANDOM_CELLS_PER_STEP: f64 = 1.5;

/// Rules for every stage, sharing one grid and plate count.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanetRules {
    pub base: BaseRules,
    pub generate: GenerateRules,
    pub movement: MoveRules,
    pub altitude: AltitudeRules,
    pub rainfall: RainfallRules,
    pub erosion: ErosionRules,
}

impl PlanetRules {
    /// Default stage parameters on a different grid. The seeding cut-off
    /// keeps the default 70% quantile.
    pub fn for_grid(half_width: usize, height: usize, plate_count: usize) -> Self {
        let base = BaseRules::new(plate_count, half_width, height);
        let mut rules = Self {
            generate: GenerateRules {
                cut_off: base.cell_count() * 7 / 10,
                ..Default::default()
            },
            base,
            ..Default::default()
        };
        rules.sync_base();
        rules
    }

    /// Copy the shared base into every stage.
    pub fn sync_base(&mut self) {
        self.generate.base = self.base.clone();
        self.movement.base = self.base.clone();
        self.altitude.base = self.base.clone();
        self.rainfall.base = self.base.clone();
        self.erosion.base = self.base.clone();
    }

    /// Validate every stage. Empty kinematics are allowed here; the pipeline
    /// draws them from the kinematics seed.
    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        let bases = [
            ("generate", &self.generate.base),
            ("movement", &self.movement.base),
            ("altitude", &self.altitude.base),
            ("rainfall", &self.rainfall.base),
            ("erosion", &self.erosion.base),
        ];
        for (stage, base) in bases {
            if *base != self.base {
                return Err(invalid_config(format!(
                    "{} rules describe {} plates on {}x{}, planet has {} on {}x{}",
                    stage,
                    base.plate_count,
                    2 * base.grid_half_width,
                    base.grid_height,
                    self.base.plate_count,
                    2 * self.base.grid_half_width,
                    self.base.grid_height
                )));
            }
        }
        self.generate.validate()?;
        if self.movement.kinematics.is_empty() {
            let mut movement = self.movement.clone();
            movement.kinematics = vec![PlateKinematics::default(); self.base.plate_count];
            movement.validate()?;
        } else {
            self.movement.validate()?;
        }
        self.altitude.validate()?;
        self.rainfall.validate()?;
        self.erosion.validate()
    }
}

/// Output of [`generate_planet`].
#[derive(Clone, Debug)]
pub struct Planet {
    pub seeds: WorldSeeds,
    pub world: PlateWorld,
    /// Altitude before water routing.
    pub heights: Tilemap<f32>,
    pub rainfall: SeasonalRainfall,
    pub erosion: ErosionResult,
    /// Totals over every movement step.
    pub movement: StepReport,
}

/// Run every stage with `seeds` overriding the stage seeds in `rules`.
pub fn generate_planet(rules: &PlanetRules, seeds: &WorldSeeds) -> Result<Planet> {
    rules.validate()?;
    info!("Generating planet with seeds {}", seeds);

    let mut rules = rules.clone();
    rules.generate.seed = seeds.plates;
    rules.altitude.seed = seeds.altitude;

    let mut world = generate_plates(&rules.generate)?;
    if rules.movement.kinematics.is_empty() {
        let max_speed = MAX_RANDOM_CELLS_PER_STEP * world.grid().d_phi() / rules.movement.time_step;
        let mut rng = ChaCha8Rng::seed_from_u64(seeds.kinematics);
        rules.movement.kinematics = (0..rules.base.plate_count)
            .map(|_| PlateKinematics::random(&mut rng, max_speed))
            .collect();
    }

    let movement = move_plates(&mut world, &rules.movement)?;
    let heights = synthesize_altitude(&world, &rules.altitude)?;
    let rainfall = simulate_rainfall(world.grid(), &heights, &rules.rainfall)?;
    let erosion = route_water(world.grid(), &heights, Some(&rainfall), &rules.erosion)?;

    Ok(Planet {
        seeds: seeds.clone(),
        world,
        heights,
        rainfall,
        erosion,
        movement,
    })
}

/// Summary numbers for a generated planet.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlanetStats {
    pub plate_areas: Vec<usize>,
    pub continental_fraction: f64,
    /// Share of cells above sea level after erosion.
    pub land_fraction: f64,
    pub min_height: f32,
    pub max_height: f32,
    pub mean_rainfall: f64,
    pub lake_cells: usize,
    pub water_fraction: f64,
    pub subductions: usize,
    pub new_crust: usize,
    pub time: u32,
}

impl Planet {
    pub fn stats(&self) -> PlanetStats {
        let heights = &self.erosion.heights;
        let (min_height, max_height) = heights.range();
        let land = heights.values().filter(|&&h| h > 0.0).count();
        let mean_rainfall = self
            .rainfall
            .annual_mean()
            .map(|m| m.values().map(|&r| r as f64).sum::<f64>() / m.len().max(1) as f64)
            .unwrap_or(0.0);

        PlanetStats {
            plate_areas: self.world.plate_areas(),
            continental_fraction: self.world.continental_fraction(),
            land_fraction: land as f64 / heights.len().max(1) as f64,
            min_height,
            max_height,
            mean_rainfall,
            lake_cells: self.erosion.lake_cells(),
            water_fraction: self.erosion.water_fraction(),
            subductions: self.movement.subductions,
            new_crust: self.movement.new_crust,
            time: self.world.time(),
        }
    }
}

impl fmt::Display for PlanetStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Plates: {} (areas {:?})", self.plate_areas.len(), self.plate_areas)?;
        writeln!(f, "Simulated time: {} steps", self.time)?;
        writeln!(f, "Subductions: {}, new crust cells: {}", self.subductions, self.new_crust)?;
        writeln!(f, "Continental crust: {:.1}%", 100.0 * self.continental_fraction)?;
        writeln!(
            f,
            "Heights: {:.1} to {:.1} ({:.1}% land)",
            self.min_height,
            self.max_height,
            100.0 * self.land_fraction
        )?;
        writeln!(f, "Mean rainfall: {:.3}", self.mean_rainfall)?;
        write!(f, "Water: {:.1}% of cells, {} lake cells", 100.0 * self.water_fraction, self.lake_cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_rules() -> PlanetRules {
        let mut rules = PlanetRules::for_grid(16, 16, 4);
        rules.generate.radius = vec![4.0, 2.0];
        rules.generate.magnitude = vec![2.0, 1.0];
        rules.generate.concentration = vec![0.99, 0.95];
        rules.movement.number_steps = 3;
        rules.erosion.bands = 4;
        rules
    }

    #[test]
    fn test_for_grid_resizes_every_stage() {
        let rules = PlanetRules::for_grid(20, 10, 5);
        assert_eq!(rules.generate.base, BaseRules::new(5, 20, 10));
        assert_eq!(rules.erosion.base, rules.base);
        assert_eq!(rules.generate.cut_off, 400 * 7 / 10);
        assert!(rules.validate().is_ok());
    }

    #[test]
    fn test_validate_catches_stage_mismatch() {
        let mut rules = PlanetRules::for_grid(8, 8, 3);
        rules.rainfall.base.grid_height = 9;
        assert!(matches!(rules.validate(), Err(crate::error::PlanetError::InvalidConfiguration(_))));
        rules.sync_base();
        assert!(rules.validate().is_ok());
    }

    #[test]
    fn test_generate_planet_end_to_end() {
        let rules = small_rules();
        let planet = generate_planet(&rules, &WorldSeeds::from_master(7)).unwrap();
        planet.world.check_coverage().unwrap();
        assert_eq!(planet.world.time(), 3);
        assert_eq!(planet.rainfall.season_count(), rules.rainfall.seasons);
        assert!(planet.erosion.heights.all_finite());

        let stats = planet.stats();
        assert_eq!(stats.plate_areas.iter().sum::<usize>(), 32 * 16);
        assert!((0.0..=1.0).contains(&stats.land_fraction));
        assert!((0.0..=1.0).contains(&stats.water_fraction));
        assert!(!stats.to_string().is_empty());
    }

    #[test]
    fn test_same_seeds_same_planet() {
        let rules = small_rules();
        let seeds = WorldSeeds::from_master(99);
        let a = generate_planet(&rules, &seeds).unwrap();
        let b = generate_planet(&rules, &seeds).unwrap();
        assert_eq!(a.heights, b.heights);
        assert_eq!(a.erosion.heights, b.erosion.heights);
        assert_eq!(a.world.ownership(), b.world.ownership());
    }

    #[test]
    fn test_rules_load_from_partial_json() {
        let rules: PlanetRules = serde_json::from_str(r#"{"movement": {"number_steps": 2}}"#).unwrap();
        assert_eq!(rules.movement.number_steps, 2);
        assert_eq!(rules.base, BaseRules::default());

        let json = serde_json::to_string(&small_rules()).unwrap();
        let back: PlanetRules = serde_json::from_str(&json).unwrap();
        assert_eq!(back.base, small_rules().base);
        assert_eq!(back.generate.cut_off, small_rules().generate.cut_off);
        assert_eq!(back.erosion.bands, 4);
    }

    #[test]
    fn test_rejects_bad_kinematics_count() {
        let mut rules = small_rules();
        rules.movement.kinematics = vec![PlateKinematics::default(); 2];
        assert!(generate_planet(&rules, &WorldSeeds::from_master(1)).is_err());
    }
}

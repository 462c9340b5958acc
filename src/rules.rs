//! Stage rules
//!
//! Every operation takes its own rules struct built on the shared
//! [`BaseRules`]. Rules are plain data loaded by collaborators (serde), and
//! each struct validates itself before any computation starts.

use std::f64::consts::FRAC_PI_2;

use serde::{Deserialize, Serialize};

use crate::error::{invalid_config, invalid_input, Result};
use crate::plates::types::{PlateId, PlateKinematics};
use crate::sphere::SphereGrid;

/// Fields shared by every stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseRules {
    pub plate_count: usize,
    pub grid_half_width: usize,
    pub grid_height: usize,
}

impl Default for BaseRules {
    fn default() -> Self {
        Self {
            plate_count: 12,
            grid_half_width: 128,
            grid_height: 128,
        }
    }
}

impl BaseRules {
    pub fn new(plate_count: usize, grid_half_width: usize, grid_height: usize) -> Self {
        Self { plate_count, grid_half_width, grid_height }
    }

    pub fn cell_count(&self) -> usize {
        2 * self.grid_half_width * self.grid_height
    }

    pub fn validate(&self) -> Result<()> {
        if self.grid_half_width == 0 || self.grid_height == 0 {
            return Err(invalid_config(format!(
                "grid_half_width and grid_height must be at least 1 (got {} x {})",
                self.grid_half_width, self.grid_height
            )));
        }
        if self.plate_count == 0 {
            return Err(invalid_config("plate_count must be at least 1"));
        }
        if self.plate_count > self.cell_count() {
            return Err(invalid_config(format!(
                "plate_count {} exceeds the {} grid cells",
                self.plate_count,
                self.cell_count()
            )));
        }
        if self.plate_count > PlateId::MAX_PLATES {
            return Err(invalid_config(format!(
                "plate_count {} exceeds the supported maximum {}",
                self.plate_count,
                PlateId::MAX_PLATES
            )));
        }
        Ok(())
    }

    /// Input grids must have been built for these rules.
    pub fn check_grid(&self, grid: &SphereGrid) -> Result<()> {
        if grid.half_width() != self.grid_half_width || grid.height() != self.grid_height {
            return Err(invalid_input(format!(
                "grid is {}x{} but the rules describe {}x{}",
                grid.width(),
                grid.height(),
                2 * self.grid_half_width,
                self.grid_height
            )));
        }
        Ok(())
    }
}

fn check_finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid_config(format!("{} must be finite (got {})", name, value)))
    }
}

fn check_fraction(name: &str, value: f64) -> Result<()> {
    check_finite(name, value)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid_config(format!("{} must lie in [0, 1] (got {})", name, value)));
    }
    Ok(())
}

fn check_non_negative(name: &str, value: f64) -> Result<()> {
    check_finite(name, value)?;
    if value < 0.0 {
        return Err(invalid_config(format!("{} must not be negative (got {})", name, value)));
    }
    Ok(())
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    check_finite(name, value)?;
    if value <= 0.0 {
        return Err(invalid_config(format!("{} must be positive (got {})", name, value)));
    }
    Ok(())
}

// =============================================================================
// PLATE GENERATION
// =============================================================================

/// Noise octaves and threshold for seeding plates.
///
/// The three octave arrays are parallel: octave `i` scatters centers with
/// acceptance `concentration[i]` and adds `magnitude[i]` within
/// `radius[i]` rows of each center.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateRules {
    #[serde(flatten)]
    pub base: BaseRules,
    pub seed: u64,
    /// Octave radius, in rows (multiples of the latitude step).
    pub radius: Vec<f64>,
    pub magnitude: Vec<f64>,
    /// Acceptance threshold fed to the momentum test, in (0, 1].
    pub concentration: Vec<f64>,
    /// Order statistic (ascending, 0-based) that cells must exceed to seed.
    pub cut_off: usize,
}

impl Default for GenerateRules {
    fn default() -> Self {
        let base = BaseRules::default();
        let cut_off = base.cell_count() * 7 / 10;
        Self {
            base,
            seed: 0,
            radius: vec![10.0, 5.0, 2.5],
            magnitude: vec![4.0, 2.0, 1.0],
            concentration: vec![0.9995, 0.998, 0.99],
            cut_off,
        }
    }
}

impl GenerateRules {
    pub fn octave_count(&self) -> usize {
        self.radius.len()
    }

    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        let octaves = self.radius.len();
        if octaves == 0 {
            return Err(invalid_config("at least one noise octave is required"));
        }
        if self.magnitude.len() != octaves || self.concentration.len() != octaves {
            return Err(invalid_config(format!(
                "octave arrays differ in length: radius {}, magnitude {}, concentration {}",
                octaves,
                self.magnitude.len(),
                self.concentration.len()
            )));
        }
        for i in 0..octaves {
            check_positive(&format!("radius[{}]", i), self.radius[i])?;
            check_finite(&format!("magnitude[{}]", i), self.magnitude[i])?;
            if self.magnitude[i] == 0.0 {
                return Err(invalid_config(format!("magnitude[{}] must not be zero", i)));
            }
            check_positive(&format!("concentration[{}]", i), self.concentration[i])?;
            if self.concentration[i] > 1.0 {
                return Err(invalid_config(format!(
                    "concentration[{}] must not exceed 1 (got {})",
                    i, self.concentration[i]
                )));
            }
        }
        if self.cut_off >= self.base.cell_count() {
            return Err(invalid_config(format!(
                "cut_off {} must be below the cell count {}",
                self.cut_off,
                self.base.cell_count()
            )));
        }
        Ok(())
    }
}

// =============================================================================
// PLATE MOVEMENT
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoveRules {
    #[serde(flatten)]
    pub base: BaseRules,
    pub number_steps: u32,
    /// Multiplier applied to every plate's angular speed per step.
    pub time_step: f64,
    /// One entry per plate, in plate id order.
    pub kinematics: Vec<PlateKinematics>,
}

impl Default for MoveRules {
    fn default() -> Self {
        Self {
            base: BaseRules::default(),
            number_steps: 12,
            time_step: 1.0,
            kinematics: Vec::new(),
        }
    }
}

impl MoveRules {
    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        if self.number_steps == 0 {
            return Err(invalid_config("number_steps must be at least 1"));
        }
        check_positive("time_step", self.time_step)?;
        if self.kinematics.len() != self.base.plate_count {
            return Err(invalid_config(format!(
                "{} plate kinematics supplied for {} plates",
                self.kinematics.len(),
                self.base.plate_count
            )));
        }
        for (i, k) in self.kinematics.iter().enumerate() {
            check_finite(&format!("kinematics[{}].axis_theta", i), k.axis_theta)?;
            check_finite(&format!("kinematics[{}].speed", i), k.speed)?;
            check_finite(&format!("kinematics[{}].axis_phi", i), k.axis_phi)?;
            if k.axis_phi.abs() > FRAC_PI_2 {
                return Err(invalid_config(format!(
                    "kinematics[{}].axis_phi must lie in [-pi/2, pi/2] (got {})",
                    i, k.axis_phi
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// ALTITUDE
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AltitudeRules {
    #[serde(flatten)]
    pub base: BaseRules,
    pub seed: u64,
    /// Height of undisturbed continental crust.
    pub base_height: f32,
    /// Upper bound of the uniform jitter added to continental cells.
    pub jitter: f32,
}

impl Default for AltitudeRules {
    fn default() -> Self {
        Self {
            base: BaseRules::default(),
            seed: 0,
            base_height: 10.0,
            jitter: 4.0,
        }
    }
}

impl AltitudeRules {
    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        check_positive("base_height", self.base_height as f64)?;
        check_non_negative("jitter", self.jitter as f64)?;
        Ok(())
    }
}

// =============================================================================
// RAINFALL
// =============================================================================

/// Pressure belts, wind and moisture parameters for seasonal rainfall.
/// Angles are in radians.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RainfallRules {
    #[serde(flatten)]
    pub base: BaseRules,
    pub seasons: usize,
    pub axial_tilt: f64,
    /// ITC score added per ocean row walked away from the equator.
    pub ocean_itc_weight: f64,
    /// ITC score added per land row; lower values let the ITC drift further.
    pub land_itc_weight: f64,
    pub polar_low: f64,
    pub subtropical_high: f64,
    pub itc_low: f64,
    /// Extra ITC depression over summer land.
    pub land_contrast: f64,
    /// Seasonal land/ocean pressure deviation.
    pub land_deviation: f64,
    pub belt_width: f64,
    /// Weight of the center cell in each smoothing pass.
    pub smoothing_weight: f64,
    pub coriolis_deflection: f64,
    pub wind_scale: f64,
    /// Largest fraction of moisture a cell can pass on per substep.
    pub max_transport: f64,
    /// Moisture added to every ocean cell per substep.
    pub evaporation: f64,
    /// Deposit fraction at sea level.
    pub rain_base: f64,
    /// Additional deposit fraction at the highest land.
    pub rain_height: f64,
}

impl Default for RainfallRules {
    fn default() -> Self {
        Self {
            base: BaseRules::default(),
            seasons: 4,
            axial_tilt: 0.41,
            ocean_itc_weight: 1.0,
            land_itc_weight: 0.5,
            polar_low: 0.3,
            subtropical_high: 0.4,
            itc_low: 0.5,
            land_contrast: 0.5,
            land_deviation: 0.1,
            belt_width: 0.25,
            smoothing_weight: 4.0,
            coriolis_deflection: 0.5,
            wind_scale: 1.0,
            max_transport: 0.8,
            evaporation: 1.0,
            rain_base: 0.05,
            rain_height: 0.5,
        }
    }
}

impl RainfallRules {
    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        if self.seasons == 0 {
            return Err(invalid_config("seasons must be at least 1"));
        }
        check_finite("axial_tilt", self.axial_tilt)?;
        if self.axial_tilt.abs() > FRAC_PI_2 {
            return Err(invalid_config(format!(
                "axial_tilt must lie in [-pi/2, pi/2] (got {})",
                self.axial_tilt
            )));
        }
        check_positive("ocean_itc_weight", self.ocean_itc_weight)?;
        check_positive("land_itc_weight", self.land_itc_weight)?;
        check_non_negative("polar_low", self.polar_low)?;
        check_non_negative("subtropical_high", self.subtropical_high)?;
        check_non_negative("itc_low", self.itc_low)?;
        check_non_negative("land_contrast", self.land_contrast)?;
        check_finite("land_deviation", self.land_deviation)?;
        check_positive("belt_width", self.belt_width)?;
        check_non_negative("smoothing_weight", self.smoothing_weight)?;
        check_finite("coriolis_deflection", self.coriolis_deflection)?;
        check_non_negative("wind_scale", self.wind_scale)?;
        check_fraction("max_transport", self.max_transport)?;
        check_non_negative("evaporation", self.evaporation)?;
        check_fraction("rain_base", self.rain_base)?;
        check_non_negative("rain_height", self.rain_height)?;
        Ok(())
    }
}

// =============================================================================
// EROSION
// =============================================================================

/// Water routing thresholds. Thresholds are per unit of cell area and are
/// scaled by each cell's area weight before comparison.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErosionRules {
    #[serde(flatten)]
    pub base: BaseRules,
    /// Longitude bands routed in parallel.
    pub bands: usize,
    /// Rain per cell when no seasonal rainfall is supplied.
    pub uniform_rain: f32,
    /// Water a local minimum must hold before it is raised into a lake.
    pub water_threshold: f32,
    /// Accumulated flow that marks a river cell.
    pub flow_threshold: f32,
    /// Contained water that marks a lake cell.
    pub lake_threshold: f32,
    pub erosion_rate: f32,
}

impl Default for ErosionRules {
    fn default() -> Self {
        Self {
            base: BaseRules::default(),
            bands: 8,
            uniform_rain: 1.0,
            water_threshold: 0.5,
            flow_threshold: 40.0,
            lake_threshold: 2.0,
            erosion_rate: 0.002,
        }
    }
}

impl ErosionRules {
    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        if self.bands == 0 {
            return Err(invalid_config("bands must be at least 1"));
        }
        check_non_negative("uniform_rain", self.uniform_rain as f64)?;
        check_positive("water_threshold", self.water_threshold as f64)?;
        check_positive("flow_threshold", self.flow_threshold as f64)?;
        check_positive("lake_threshold", self.lake_threshold as f64)?;
        check_non_negative("erosion_rate", self.erosion_rate as f64)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlanetError;

    fn small_base() -> BaseRules {
        BaseRules::new(2, 4, 4)
    }

    #[test]
    fn test_defaults_validate() {
        assert!(BaseRules::default().validate().is_ok());
        assert!(GenerateRules::default().validate().is_ok());
        assert!(AltitudeRules::default().validate().is_ok());
        assert!(RainfallRules::default().validate().is_ok());
        assert!(ErosionRules::default().validate().is_ok());
    }

    #[test]
    fn test_base_rejects_zero_sizes() {
        for base in [BaseRules::new(0, 4, 4), BaseRules::new(2, 0, 4), BaseRules::new(2, 4, 0)] {
            assert!(matches!(base.validate(), Err(PlanetError::InvalidConfiguration(_))));
        }
        assert!(BaseRules::new(33, 4, 4).validate().is_err());
    }

    #[test]
    fn test_octave_arrays_must_match() {
        let rules = GenerateRules {
            base: small_base(),
            radius: vec![1.0, 2.0],
            magnitude: vec![1.0],
            concentration: vec![0.5, 0.5],
            cut_off: 3,
            ..Default::default()
        };
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_octave_values_must_be_non_zero() {
        let mut rules = GenerateRules {
            base: small_base(),
            radius: vec![1.0],
            magnitude: vec![1.0],
            concentration: vec![0.5],
            cut_off: 3,
            ..Default::default()
        };
        assert!(rules.validate().is_ok());
        rules.magnitude[0] = 0.0;
        assert!(rules.validate().is_err());
        rules.magnitude[0] = 1.0;
        rules.concentration[0] = 0.0;
        assert!(rules.validate().is_err());
        rules.concentration[0] = 0.5;
        rules.cut_off = 32;
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_move_rules_need_one_kinematics_per_plate() {
        let mut rules = MoveRules {
            base: small_base(),
            kinematics: vec![PlateKinematics::default()],
            ..Default::default()
        };
        assert!(rules.validate().is_err());
        rules.kinematics.push(PlateKinematics::default());
        assert!(rules.validate().is_ok());
        rules.time_step = 0.0;
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_check_grid_reports_input_mismatch() {
        let grid = SphereGrid::new(4, 5).unwrap();
        assert!(matches!(
            small_base().check_grid(&grid),
            Err(PlanetError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rules_deserialize_with_defaults() {
        let rules: ErosionRules =
            serde_json::from_str(r#"{ "plate_count": 3, "grid_half_width": 8, "bands": 2 }"#).unwrap();
        assert_eq!(rules.base.plate_count, 3);
        assert_eq!(rules.base.grid_half_width, 8);
        assert_eq!(rules.base.grid_height, BaseRules::default().grid_height);
        assert_eq!(rules.bands, 2);
        assert_eq!(rules.lake_threshold, ErosionRules::default().lake_threshold);
    }
}

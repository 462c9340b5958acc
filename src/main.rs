use std::error::Error;
use std::fs;

use clap::Parser;

use tectonic_planet::{generate_planet, PlanetRules, WorldSeeds};

#[derive(Parser, Debug)]
#[command(name = "tectonic_planet")]
#[command(about = "Generate a planet from moving tectonic plates, rainfall and erosion")]
struct Args {
    /// JSON rules file (missing fields take their defaults)
    #[arg(short, long)]
    rules: Option<String>,

    /// Master seed (uses random seed if not specified)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Half the number of grid columns
    #[arg(short = 'W', long)]
    half_width: Option<usize>,

    /// Number of grid rows
    #[arg(short = 'H', long)]
    height: Option<usize>,

    /// Number of tectonic plates
    #[arg(short = 'p', long)]
    plates: Option<usize>,

    /// Number of plate movement steps
    #[arg(long)]
    steps: Option<u32>,

    /// Print the effective rules as JSON and exit
    #[arg(long)]
    dump_rules: bool,
}

fn load_rules(args: &Args) -> Result<PlanetRules, Box<dyn Error>> {
    let mut rules = match &args.rules {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => PlanetRules::default(),
    };

    if args.half_width.is_some() || args.height.is_some() || args.plates.is_some() {
        let half_width = args.half_width.unwrap_or(rules.base.grid_half_width);
        let height = args.height.unwrap_or(rules.base.grid_height);
        let plates = args.plates.unwrap_or(rules.base.plate_count);
        let resized = PlanetRules::for_grid(half_width, height, plates);
        rules.base = resized.base;
        rules.generate.cut_off = resized.generate.cut_off;
        if rules.movement.kinematics.len() != plates {
            rules.movement.kinematics.clear();
        }
    }
    rules.sync_base();
    if let Some(steps) = args.steps {
        rules.movement.number_steps = steps;
    }
    Ok(rules)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    let rules = load_rules(&args)?;
    if args.dump_rules {
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }

    let seed = args.seed.unwrap_or_else(rand::random);
    let seeds = WorldSeeds::from_master(seed);

    println!("Generating planet with seed: {}", seed);
    println!(
        "Grid: {}x{}, {} plates, {} steps",
        2 * rules.base.grid_half_width,
        rules.base.grid_height,
        rules.base.plate_count,
        rules.movement.number_steps
    );

    let planet = generate_planet(&rules, &seeds)?;
    println!("{}", planet.stats());
    Ok(())
}

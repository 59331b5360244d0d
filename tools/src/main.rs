use std::path::{Path, PathBuf};

use character_body::{CharacterBody, CharacterBodyError};
use character_motor::{CharacterMotor, GroundTransition, MotorConfig};
use clap::{Parser, Subcommand, ValueEnum};
use physics_rapier::PhysicsWorld;
use rapier3d::prelude::{vector, ColliderBuilder, Real, Vector};

const EXIT_SUCCESS: i32 = 0;
const EXIT_CONFIG: i32 = 10;
const EXIT_SIMULATION: i32 = 11;

const SIM_DT: Real = 1.0 / 60.0;

#[derive(Parser)]
#[command(name = "motor-tools", version, about = "Character motor tools CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a motor config, print it sanitized with the derived ground distances.
    CheckConfig {
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
    /// Run a headless scenario and print ground transitions.
    Simulate(SimulateArgs),
}

#[derive(Parser)]
struct SimulateArgs {
    #[arg(long, value_enum, default_value = "drop")]
    scenario: Scenario,

    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 180)]
    steps: u32,

    /// Feet height the character starts at.
    #[arg(long, default_value_t = 2.0)]
    height: Real,

    /// Horizontal target speed along +x.
    #[arg(long, default_value_t = 4.0)]
    speed: Real,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Scenario {
    /// Fall onto a wide floor.
    Drop,
    /// Walk towards the edge of a small floor.
    Walk,
    /// Stand on a platform moving along +x.
    Platform,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::CheckConfig { config } => run_check_config(config.as_deref()),
        Commands::Simulate(args) => run_simulate(args),
    };
    std::process::exit(exit_code);
}

fn load_config(path: Option<&Path>) -> Result<MotorConfig, i32> {
    let Some(path) = path else {
        return Ok(MotorConfig::default());
    };
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("config read failed ({}): {}", path.display(), err);
            return Err(EXIT_CONFIG);
        }
    };
    MotorConfig::parse_toml(&text).map_err(|err| {
        eprintln!("config parse failed ({}): {}", path.display(), err);
        EXIT_CONFIG
    })
}

fn run_check_config(path: Option<&Path>) -> i32 {
    let config = match load_config(path) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let motor = CharacterMotor::new(config);
    let text = match motor.config().to_toml() {
        Ok(text) => text,
        Err(err) => {
            eprintln!("config serialize failed: {}", err);
            return EXIT_CONFIG;
        }
    };
    let geometry = motor.geometry();
    let thresholds = motor.thresholds();
    println!("{}", text);
    println!("# derived");
    println!("capsule_height = {:.4}", geometry.capsule_height);
    println!("capsule_radius = {:.4}", geometry.radius);
    println!("center_offset_y = {:.4}", geometry.center_offset.y);
    println!(
        "desired_ground_distance = {:.4}",
        thresholds.desired_ground_distance
    );
    println!(
        "extra_ground_threshold = {:.4}",
        thresholds.extra_ground_threshold
    );
    println!("total_probe_distance = {:.4}", thresholds.total_probe_distance);
    EXIT_SUCCESS
}

#[derive(Debug, PartialEq)]
struct SimulationReport {
    transitions: Vec<(u32, GroundTransition, Vector<Real>)>,
    final_position: Vector<Real>,
    on_ground: bool,
}

fn simulate(
    config: MotorConfig,
    args: &SimulateArgs,
) -> Result<SimulationReport, CharacterBodyError> {
    let mut world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
    let floor_extent = match args.scenario {
        Scenario::Walk => 2.0,
        Scenario::Drop | Scenario::Platform => 50.0,
    };
    let floor = ColliderBuilder::cuboid(floor_extent, 0.1, floor_extent)
        .translation(vector![0.0, -0.1, 0.0]);
    let platform = match args.scenario {
        Scenario::Platform => Some(
            world
                .insert_kinematic_platform(floor.build(), Vector::zeros())
                .0,
        ),
        Scenario::Drop | Scenario::Walk => {
            world.insert_static_collider(floor.build());
            None
        }
    };
    world.update_queries();

    let start = match args.scenario {
        Scenario::Drop => vector![0.0, args.height, 0.0],
        Scenario::Walk | Scenario::Platform => Vector::zeros(),
    };
    let mut character = CharacterBody::spawn(&mut world, CharacterMotor::new(config), start);
    if args.scenario == Scenario::Walk {
        character
            .motor_mut()
            .move_by_velocity_target(vector![args.speed, 0.0, 0.0]);
    }

    let mut transitions = Vec::new();
    let mut platform_x = 0.0;
    for step in 0..args.steps {
        if let Some(platform) = platform {
            platform_x += args.speed * SIM_DT;
            world.set_kinematic_translation(platform, vector![platform_x, 0.0, 0.0]);
        }
        let output = character.step(&mut world, SIM_DT)?;
        if let Some(transition) = output.transition {
            transitions.push((step, transition, character.position(&world)?));
        }
        world.step(SIM_DT);
    }

    Ok(SimulationReport {
        transitions,
        final_position: character.position(&world)?,
        on_ground: character.motor().is_on_ground(),
    })
}

fn run_simulate(args: SimulateArgs) -> i32 {
    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let report = match simulate(config, &args) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("simulation failed: {}", err);
            return EXIT_SIMULATION;
        }
    };
    for (step, transition, position) in &report.transitions {
        println!(
            "step {:>5}: {:?} at ({:.3}, {:.3}, {:.3})",
            step, transition, position.x, position.y, position.z
        );
    }
    let position = report.final_position;
    println!(
        "final: ({:.3}, {:.3}, {:.3}) on_ground={} transitions={}",
        position.x,
        position.y,
        position.z,
        report.on_ground,
        report.transitions.len()
    );
    EXIT_SUCCESS
}

use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::{info, warn};

use splash_sph::{counters::write_statistics, FluidSolverTrait, SimulationParams, Solver};

use super::{
    scene::{add_particle_block, apply_scripted_interactions, SceneConfig},
    svg_exporter::SvgExporter,
};

const CARGO_PKG_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
const CARGO_PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

pub fn start() -> Result<()> {
    let matches = App::new("Splash SPH")
        .version(CARGO_PKG_VERSION)
        .author(CARGO_PKG_AUTHORS)
        .about(CARGO_PKG_DESCRIPTION)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .global(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Run simulation with given config")
                .arg(
                    Arg::with_name("SIMULATION_CONFIG")
                        .help("Sets the simulation parameters")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("SCENE_CONFIG")
                        .help("Scene setup")
                        .required(true)
                        .index(2),
                )
                .arg(
                    Arg::with_name("OVERWRITE_CONFIG_FILE")
                        .long("overwrite-config-file")
                        .short("c")
                        .takes_value(true)
                        .help("Overwrite single simulation parameters"),
                )
                .arg(
                    Arg::with_name("FRAMES")
                        .long("frames")
                        .short("f")
                        .takes_value(true)
                        .help("Number of frames to simulate (overrides the scene)"),
                )
                .arg(
                    Arg::with_name("SVG_DIR")
                        .long("svg-dir")
                        .short("s")
                        .takes_value(true)
                        .help("Write SVG snapshots into this directory"),
                )
                .arg(
                    Arg::with_name("SVG_EVERY")
                        .long("svg-every")
                        .takes_value(true)
                        .default_value("10")
                        .help("Write an SVG snapshot every N frames"),
                )
                .arg(
                    Arg::with_name("STATISTICS_ENABLED")
                        .help("Track performance of individual steps")
                        .short("p")
                        .long("statistics-enabled")
                        .takes_value(false),
                )
                .arg(
                    Arg::with_name("STATISTICS_PATH")
                        .long("statistics-path")
                        .short("w")
                        .takes_value(true)
                        .help("Where to write statistics to"),
                ),
        )
        .subcommand(SubCommand::with_name("print-default-config").about("Print the default simulation parameters"))
        .get_matches();

    init_logging(matches.occurrences_of("v"));

    match matches.subcommand() {
        ("run", Some(run_matches)) => run(run_matches),
        ("print-default-config", Some(_)) => {
            print!("{}", serde_yaml::to_string(&SimulationParams::default())?);
            Ok(())
        }
        (name, _) => Err(anyhow!("unknown subcommand `{}`", name)),
    }
}

fn init_logging(verbosity: u64) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Load the simulation parameters. Every key of the optional override file replaces the key of the
/// same name in the parameter file; unknown keys are an error.
fn load_simulation_params(parameter_file: &str, overwrite_file: Option<&str>) -> Result<SimulationParams> {
    let params_yaml = std::fs::read_to_string(parameter_file)
        .with_context(|| format!("failed reading parameter file `{}`", parameter_file))?;
    let mut simulation_params_serde: serde_yaml::Value = serde_yaml::from_str(&params_yaml)
        .with_context(|| format!("failed parsing simulation config file `{}`", parameter_file))?;

    if let Some(overwrite_file) = overwrite_file {
        let overwrite_config_str = std::fs::read_to_string(overwrite_file)
            .with_context(|| format!("failed reading override file `{}`", overwrite_file))?;
        let overwrite_config: serde_yaml::Mapping = serde_yaml::from_str(&overwrite_config_str)
            .with_context(|| format!("failed parsing override file `{}`", overwrite_file))?;

        let mapping = simulation_params_serde
            .as_mapping_mut()
            .ok_or_else(|| anyhow!("simulation parameters in `{}` are not a mapping", parameter_file))?;
        for (k, v) in overwrite_config {
            let slot = mapping
                .get_mut(&k)
                .ok_or_else(|| anyhow!("not able to find attribute {:?} in `{}`", k, parameter_file))?;
            *slot = v;
        }
    }

    let simulation_params: SimulationParams =
        serde_yaml::from_value(simulation_params_serde).context("failed to unpack simulation parameters")?;
    simulation_params
        .validate()
        .with_context(|| format!("invalid simulation parameters in `{}`", parameter_file))?;
    Ok(simulation_params)
}

fn load_scene(scene_file: &str) -> Result<SceneConfig> {
    let scene_yaml =
        std::fs::read_to_string(scene_file).with_context(|| format!("failed reading scene file `{}`", scene_file))?;
    serde_yaml::from_str(&scene_yaml).with_context(|| format!("failed parsing scene config file `{}`", scene_file))
}

fn parse_arg<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    matches
        .value_of(name)
        .map(|x| x.parse::<T>())
        .transpose()
        .with_context(|| format!("invalid value for {}", name))
}

fn run(run_matches: &ArgMatches) -> Result<()> {
    let parameter_file = run_matches
        .value_of("SIMULATION_CONFIG")
        .ok_or_else(|| anyhow!("missing simulation config"))?;
    let simulation_params = load_simulation_params(parameter_file, run_matches.value_of("OVERWRITE_CONFIG_FILE"))?;
    info!("{:?}", simulation_params);

    let scene_file = run_matches
        .value_of("SCENE_CONFIG")
        .ok_or_else(|| anyhow!("missing scene config"))?;
    let scene_config = load_scene(scene_file)?;
    info!("{:?}", scene_config);

    let frames = parse_arg::<usize>(run_matches, "FRAMES")?.unwrap_or(scene_config.frames);
    let svg_every = parse_arg::<usize>(run_matches, "SVG_EVERY")?.unwrap_or(10).max(1);
    let counters_enabled = run_matches.is_present("STATISTICS_ENABLED");
    let statistics_path = run_matches.value_of("STATISTICS_PATH");

    let svg_exporter = run_matches.value_of("SVG_DIR").map(SvgExporter::new).transpose()?;

    let mut solver = Solver::new(
        scene_config.solver,
        simulation_params,
        scene_config.grid,
        scene_config.width,
        scene_config.height,
    )?;

    if let Some(simulation) = solver.as_particles_mut() {
        simulation.enable_counters(counters_enabled);
        for block in &scene_config.particle_blocks {
            let added = add_particle_block(simulation, block);
            info!("added {} particles from block {:?}", added, block);
        }
    } else if !scene_config.particle_blocks.is_empty() {
        warn!("particle blocks are ignored by the grid solver");
    }

    let mut total_duration = Duration::from_nanos(0);

    for frame_number in 0..frames {
        apply_scripted_interactions(&mut solver, &scene_config.interactions, frame_number);

        let a = Instant::now();
        solver.step(scene_config.dt);
        let b = Instant::now();
        total_duration += b - a;

        let num_particles = solver.as_particles().map(|s| s.num_particles()).unwrap_or(0);
        info!(
            "{:05}: {} particles {}msec ({}msec AVG)",
            frame_number,
            num_particles,
            (b - a).as_secs_f32() * 1000.,
            (total_duration / (frame_number as u32 + 1)).as_secs_f32() * 1000.
        );

        if let Some(svg_exporter) = &svg_exporter {
            if frame_number % svg_every == 0 {
                let path = svg_exporter.write_frame(frame_number, &solver)?;
                info!("wrote {}", path.display());
            }
        }
    }

    println!(
        "simulated {} frames ({}s simulation time) in {}ms",
        frames,
        solver.time(),
        total_duration.as_secs_f64() * 1000.
    );

    if counters_enabled {
        match solver.as_particles() {
            Some(simulation) => {
                let s = write_statistics(simulation.counters());
                print!("{}", s);
                if let Some(statistics_path) = statistics_path {
                    std::fs::write(statistics_path, s)
                        .with_context(|| format!("failed writing statistics to `{}`", statistics_path))?;
                }
            }
            None => warn!("statistics are only recorded by the particle solver"),
        }
    }

    Ok(())
}

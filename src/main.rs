use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rs_tsr::tsr_from_file::{read_region_file, RegionFile};
use rs_tsr::tsr_traits::TaskSpaceRegion;
use rs_tsr::utils::{dump_pose, dump_xyzrpy, xyzrpy_from_slice, xyzrpy_to_pose, xyzypr_to_pose};

/// Sample TSRs and TSR chains, and measure distances to them.
/// Set RUST_LOG=debug to see the minimizer progress.
#[derive(Parser)]
#[command(name = "rs-tsr", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print random chart coordinates and end-effector poses of the region
    Sample {
        /// TSR or TSR chain, JSON (.json) or YAML
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Seed for repeatable output
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print distance from the pose to the region and the closest chart coordinates
    Distance {
        /// TSR or TSR chain, JSON (.json) or YAML
        file: PathBuf,
        /// x,y,z,roll,pitch,yaw of the pose, meters and radians
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        pose: Vec<f64>,
        /// Read --pose as x,y,z,yaw,pitch,roll
        #[arg(long)]
        ypr: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Sample { file, count, seed } => {
            let region = load(&file)?;
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            for _ in 0..count {
                match &region {
                    RegionFile::Single(tsr) => {
                        let xyzrpy = tsr.sample_xyzrpy(None, &mut rng)?;
                        dump_xyzrpy(&xyzrpy);
                        dump_pose(&tsr.to_transform(&xyzrpy)?);
                    }
                    RegionFile::Chain(chain) => {
                        let xyzrpy = chain.sample_xyzrpy(None, &mut rng)?;
                        for element in &xyzrpy {
                            dump_xyzrpy(element);
                        }
                        dump_pose(&chain.to_transform(&xyzrpy)?);
                    }
                }
            }
        }
        Command::Distance { file, pose, ypr } => {
            let region = load(&file)?;
            let values = xyzrpy_from_slice(&pose).context("--pose needs six values")?;
            let pose = if ypr { xyzypr_to_pose(&values) } else { xyzrpy_to_pose(&values) };
            let (distance, closest, converged) = match &region {
                RegionFile::Single(tsr) => {
                    let projection = tsr.distance(&pose);
                    (projection.distance, vec![projection.xyzrpy], projection.converged)
                }
                RegionFile::Chain(chain) => {
                    let projection = chain.distance(&pose);
                    (projection.distance, projection.xyzrpy, projection.converged)
                }
            };
            println!("distance: {:.6}{}", distance, if converged { "" } else { " (not converged)" });
            for element in &closest {
                dump_xyzrpy(element);
            }
        }
    }
    Ok(())
}

fn load(file: &Path) -> Result<RegionFile> {
    let region = read_region_file(file).with_context(|| format!("Failed to read {}", file.display()))?;
    match &region {
        RegionFile::Single(_) => info!("Loaded TSR from {}", file.display()),
        RegionFile::Chain(chain) => info!("Loaded TSR chain of {} from {}", chain.len(), file.display()),
    }
    Ok(region)
}

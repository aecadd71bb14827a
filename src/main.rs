// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hypoloc::arrival::{distinct_stations, Arrival};
use hypoloc::io;
use hypoloc::ttime::{
    ConstantVelocity, FlatSurface, GridField, NoTopography, Topography, TravelTimeField,
};
use hypoloc::{locate, LocateConfig, Vec3};

#[derive(Parser)]
#[command(name = "hypoloc", about = "Probabilistic earthquake hypocenter location")]
struct Cli {
    /// Event file: JSON object with an `arrivals` array
    #[arg(short = 'e', long)]
    event: PathBuf,

    /// Location configuration (JSON)
    #[arg(short = 'c', long)]
    config: PathBuf,

    /// Velocity model: "uniform:<vp>" or "velocity-file:<path>" (.npy or .mat,
    /// P velocity on the grid given by --model-*)
    #[arg(long, default_value = "uniform:6.0")]
    velocity: String,

    /// Vp/Vs ratio used to derive S velocities
    #[arg(long, default_value = "1.73")]
    vp_vs: f64,

    /// Model grid origin, comma-separated (velocity-file mode)
    #[arg(long, default_value = "0,0,0")]
    model_origin: String,

    /// Model grid size, comma-separated (velocity-file mode)
    #[arg(long)]
    model_size: Option<String>,

    /// Model grid spacing (velocity-file mode)
    #[arg(long, default_value = "1.0")]
    model_spacing: f64,

    /// Depth of a flat free surface; points above it are not searched
    #[arg(long)]
    surface_z: Option<f64>,

    /// Override the configured random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Write scatter samples (N x 4 .npy: x, y, z, ln_prob)
    #[arg(long)]
    scatter_out: Option<PathBuf>,

    /// Write the grid-search log-PDF volume (.npy)
    #[arg(long)]
    pdf_out: Option<PathBuf>,
}

#[derive(Deserialize)]
struct EventFile {
    arrivals: Vec<Arrival>,
}

fn parse_triple<T>(s: &str, what: &str) -> Result<[T; 3]>
where
    T: std::str::FromStr + Copy,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let parts: Vec<T> = s
        .split(',')
        .map(|p| p.trim().parse::<T>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("invalid --{}: expected three comma-separated values", what))?;
    if parts.len() != 3 {
        bail!("--{} has {} components, expected 3", what, parts.len());
    }
    Ok([parts[0], parts[1], parts[2]])
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn build_field(cli: &Cli, arrivals: &[Arrival]) -> Result<Box<dyn TravelTimeField>> {
    if !(cli.vp_vs.is_finite() && cli.vp_vs > 0.0) {
        bail!("--vp-vs must be positive, got {}", cli.vp_vs);
    }
    if let Some(val) = cli.velocity.strip_prefix("uniform:") {
        let vp: f64 = val.parse().context("invalid uniform velocity value")?;
        if !vp.is_finite() || vp <= 0.0 {
            bail!("uniform velocity must be positive and finite, got {}", vp);
        }
        return Ok(Box::new(ConstantVelocity::from_vp_vs(vp, cli.vp_vs)));
    }

    if let Some(path) = cli.velocity.strip_prefix("velocity-file:") {
        let size = cli
            .model_size
            .as_deref()
            .context("--model-size is required with a velocity file")?;
        let shape: [usize; 3] = parse_triple(size, "model-size")?;
        let origin = Vec3::from(parse_triple::<f64>(&cli.model_origin, "model-origin")?);
        let p_model = io::load_velocity_model(Path::new(path), origin, cli.model_spacing, shape)
            .with_context(|| format!("loading velocity model {}", path))?;
        let s_model = p_model.scaled(cli.vp_vs)?;

        let mut field = GridField::new();
        for station in distinct_stations(arrivals) {
            info!(station = %station.label, "computing travel-time grids");
            field.insert(&station.label, "P", p_model.travel_times_from(station.position)?);
            field.insert(&station.label, "S", s_model.travel_times_from(station.position)?);
        }
        return Ok(Box::new(field));
    }

    bail!(
        "unknown --velocity mode: '{}'. Expected 'uniform:<vp>' or 'velocity-file:<path>'",
        cli.velocity
    );
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let event: EventFile = read_json(&cli.event)?;
    let mut config: LocateConfig = read_json(&cli.config)?;
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }

    let field = build_field(&cli, &event.arrivals)?;
    let topo: Box<dyn Topography> = match cli.surface_z {
        Some(surface_z) => Box::new(FlatSurface { surface_z }),
        None => Box::new(NoTopography),
    };

    let location = match locate(&event.arrivals, field.as_ref(), topo.as_ref(), &config) {
        Ok(loc) => loc,
        Err(e) => {
            let code = e.status_code();
            return Err(anyhow::Error::new(e).context(format!("location failed (status {})", code)));
        }
    };

    println!("{}", serde_json::to_string_pretty(&location.hypocenter)?);

    if let Some(path) = &cli.scatter_out {
        io::save_scatter_npy(&location.scatter, path)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    if let Some(path) = &cli.pdf_out {
        match &location.pdf_grid {
            Some(pdf) => io::save_pdf_grid_npy(pdf, path)
                .with_context(|| format!("writing {}", path.display()))?,
            None => bail!("--pdf-out needs the grid search"),
        }
    }

    Ok(())
}

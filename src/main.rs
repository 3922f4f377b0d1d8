use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use hexstrata::engine::{countries, driver};
use hexstrata::server::{self, ServerState};
use hexstrata::{config, database, persistence, tile};

/// Ring depth used when extending countries over coastal no-man's-land.
const COAST_FILL: u32 = 1;

#[derive(Debug, Parser)]
#[command(name = "hexstrata", version, about = "Population-aware hierarchical region levels over the hexagonal Earth grid")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build country maps and all region levels from a countries GeoJSON file.
    Generate {
        /// Path to the countries GeoJSON file
        countries: PathBuf,

        /// Hex resolution used to generate regions
        #[arg(short, long, default_value_t = 5)]
        resolution: u8,

        /// Path to a population map file (json)
        #[arg(short, long)]
        popmap: Option<PathBuf>,

        /// Path to an engine config file (json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Data output directory (default ./resolution<N>-data/)
        #[arg(short, long)]
        outdir: Option<PathBuf>,

        /// Run the pipeline serially and write each level as soon as it
        /// completes instead of keeping the whole stack in memory; slower
        /// but prevents crashes at higher resolutions (typically >= 7)
        #[arg(short, long)]
        memsafe: bool,
    },

    /// Serve region queries over HTTP from a generated data directory.
    Serve {
        /// Directory produced by the generate subcommand
        data_dir: PathBuf,

        /// Serving port
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },

    /// Bulk-load generated levels into Postgres.
    Dbwrite {
        /// Postgres connection string
        connect: String,

        /// Path to h3ToCountry.json
        h3_to_country: PathBuf,

        /// Comma-separated level file paths, in level order
        levels: String,
    },

    /// Re-aggregate a population map to a coarser resolution.
    ConvertPopmap {
        /// Path to the source population map (json)
        popmap: PathBuf,

        /// Target resolution
        resolution: u8,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hexstrata=info,info".into()),
        )
        .init();

    let started = Instant::now();
    // The batch subcommands stay off the async runtime: their input loaders
    // may issue blocking HTTP fetches for URL paths.
    match Cli::parse().command {
        Command::Generate {
            countries,
            resolution,
            popmap,
            config,
            outdir,
            memsafe,
        } => generate(countries, resolution, popmap, config, outdir, memsafe)?,
        Command::Serve { data_dir, port } => runtime()?.block_on(serve(data_dir, port))?,
        Command::Dbwrite {
            connect,
            h3_to_country,
            levels,
        } => runtime()?.block_on(dbwrite(connect, h3_to_country, levels))?,
        Command::ConvertPopmap { popmap, resolution } => convert_popmap(popmap, resolution)?,
    }
    info!("done in {:?}", started.elapsed());
    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Runtime::new()?)
}

fn generate(
    countries_path: PathBuf,
    resolution: u8,
    popmap_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
    outdir: Option<PathBuf>,
    memsafe: bool,
) -> Result<()> {
    let resolution = tile::resolution(resolution)?;
    let out_dir =
        outdir.unwrap_or_else(|| PathBuf::from(format!("./resolution{}-data/", u8::from(resolution))));

    let options = match config_path {
        Some(path) => persistence::load_options(&path)?,
        None => config::default_options(resolution).ok_or_else(|| {
            anyhow!("no built-in defaults for resolution {}; supply a config file with -c", u8::from(resolution))
        })?,
    };

    info!("loading countries geojson data");
    let country_polygons = persistence::load_countries(&countries_path)?;

    info!("generating country maps");
    let (tile_to_country, country_to_tiles) =
        countries::generate_country_maps(&country_polygons, resolution, COAST_FILL)?;

    info!("writing country maps to json");
    persistence::write_country_maps(
        &country_polygons,
        &country_to_tiles,
        &tile_to_country,
        &out_dir,
    )?;

    info!("loading popmap");
    let pop_map = persistence::load_pop_map(popmap_path.as_deref(), resolution)?;
    let (mean, stddev) = persistence::pop_map_stats(&pop_map);
    info!("popmap mean: {:.3}, standard deviation: {:.3}", mean, stddev);

    info!("generating levels");
    driver::generate_and_write_levels(&pop_map, &country_to_tiles, &out_dir, &options, memsafe)?;
    Ok(())
}

async fn serve(data_dir: PathBuf, port: u16) -> Result<()> {
    info!("reading country maps from json");
    let (_, country_to_tiles, tile_to_country) = persistence::read_country_maps(&data_dir)?;

    info!("reading levels and parents from json files");
    let (levels, parents) = persistence::read_levels(&data_dir)?;

    let state = ServerState {
        levels,
        parents,
        tile_to_country,
        country_to_tiles,
    };
    server::run(state, port).await?;
    Ok(())
}

async fn dbwrite(connect: String, h3_to_country: PathBuf, levels: String) -> Result<()> {
    let level_paths: Vec<PathBuf> = levels.split(',').map(PathBuf::from).collect();

    info!("reading country map from json");
    // The country map path may be a URL; keep the blocking fetch off the
    // async runtime.
    let tile_to_country =
        tokio::task::spawn_blocking(move || persistence::read_json(&h3_to_country)).await??;

    database::bulk_load(&connect, &tile_to_country, &level_paths).await?;
    Ok(())
}

fn convert_popmap(popmap_path: PathBuf, resolution: u8) -> Result<()> {
    let resolution = tile::resolution(resolution)?;

    info!("reading popmap");
    let pop_map = persistence::read_json(&popmap_path)?;

    info!("aggregating to resolution {}", u8::from(resolution));
    let converted = persistence::convert_pop_map(&pop_map, resolution)?;

    let out = PathBuf::from(format!("./popmap{}.json", u8::from(resolution)));
    persistence::write_json(&converted, &out)?;
    info!("wrote {}", out.display());
    Ok(())
}

mod cli;
mod result;

use crate::{
    cli::{Cli, RenderBar},
    result::{CliError, CliResult},
};
use bevy::{
    log::{info, tracing_subscriber, warn},
    utils::HashSet,
};
use bevy_taws::{prelude::*, terrain_data::visible_cells};
use itertools::Itertools;
use std::{path::PathBuf, sync::Arc, time::Instant};

pub mod prelude {
    pub use crate::{
        cli::{Cli, ModeArg, NotFoundArg},
        init_logging, render,
        result::{CliError, CliResult},
        RenderContext,
    };
}

/// Logs to stderr, filtered by `RUST_LOG` and `info` by default.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // a second call, e.g. from tests, keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Everything needed to render a single frame from the command line.
pub struct RenderContext {
    pub config: MapConfig,
    pub frame: FrameConfig,
    pub source: DirectoryTileSource,
    pub output_path: PathBuf,
    pub save_config: Option<PathBuf>,
    pub passes: bool,
}

impl RenderContext {
    pub fn from_cli(args: Cli) -> CliResult<Self> {
        let mut config = match &args.config {
            Some(path) => MapConfig::load_file(path)?,
            None => MapConfig::default(),
        };
        args.apply(&mut config);
        config.validate()?;

        if !(-90.0..=90.0).contains(&args.lat) {
            return Err(CliError::LatitudeOutOfRange(args.lat));
        }
        if args.resolution == 0 {
            return Err(CliError::ZeroResolution);
        }

        let source = DirectoryTileSource::new(&args.tile_path, config.tile_size)?;

        if source.existing_tiles().is_empty() {
            return Err(CliError::NoTiles(args.tile_path));
        }

        let mut frame = FrameConfig::for_range(
            GeoCoordinate::from_degrees(args.lat, args.lon),
            args.heading.to_radians(),
            args.altitude,
            args.range,
            args.mode.into(),
            args.resolution,
        );
        frame.sun = config.sun;

        Ok(Self {
            config,
            frame,
            source,
            output_path: args.output_path,
            save_config: args.save_config,
            passes: args.passes,
        })
    }
}

/// Loads the visible tiles, renders the frame and writes it to the output image.
pub fn render(context: RenderContext) -> CliResult<()> {
    let RenderContext {
        config,
        frame,
        source,
        output_path,
        save_config,
        passes,
    } = context;

    let start_rendering = Instant::now();

    if let Some(path) = &save_config {
        config.save_file(path)?;
        info!("Saved the map configuration to {}.", path.display());
    }

    let existing: HashSet<TileGridCell> = source.existing_tiles().into_iter().collect();

    // a pass over the empty atlas signals every tile the frame samples
    let usage = TileUsage::new();
    {
        let mut atlas = TileAtlas::new(config.atlas_format(), source.tile_size(), 1);
        atlas.set_existing(existing.iter().copied());

        MapRenderer::new(TerrainSampler::from_tile_atlas(&atlas, &usage), &frame, &config)
            .render_frame();
    }

    let cells = visible_cells(&frame.camera(config.flags), frame.resolution, source.tile_size())
        .into_iter()
        .chain(usage.used_cells())
        .filter(|cell| existing.contains(cell))
        .sorted()
        .dedup()
        .collect_vec();

    info!(
        "Rendering {}×{} pixels, {} of the visible tiles exist.",
        frame.resolution.x,
        frame.resolution.y,
        cells.len()
    );

    let mut atlas = TileAtlas::new(config.atlas_format(), source.tile_size(), cells.len());
    atlas.set_existing(existing);

    let loader = TileLoader::new(Arc::new(source), config.max_loading_tiles);

    let progress_bar = RenderBar::new("Loading", cells.len() as u64)?;
    for chunk in cells.chunks(rayon::current_num_threads().max(1)) {
        loader.load_all(&mut atlas, chunk);
        progress_bar.inc(chunk.len());
    }
    progress_bar.finish();

    let start_frame = Instant::now();

    let usage = TileUsage::new();
    let renderer = MapRenderer::new(
        TerrainSampler::from_tile_atlas(&atlas, &usage),
        &frame,
        &config,
    );
    let image = if passes {
        renderer.render_passes()
    } else {
        renderer.render_frame()
    };

    println!("Rendering took: {:?}", start_frame.elapsed());

    let missing = usage
        .used_cells()
        .filter(|&cell| atlas.exists(cell) && !atlas.is_resident(cell))
        .count();
    if missing > 0 {
        warn!("{missing} sampled tiles could not be loaded.");
    }

    image.save(&output_path)?;

    println!(
        "Saved {} in: {:?}",
        output_path.display(),
        start_rendering.elapsed()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;

    #[test]
    fn render_a_tile_directory() {
        let path = std::env::temp_dir().join(format!("taws_cli_{}", std::process::id()));
        fs::create_dir_all(&path).unwrap();

        let bytes = (0..16i16)
            .flat_map(|height| (1000 + 100 * height).to_le_bytes())
            .collect_vec();
        fs::write(path.join("N47E011.bin"), bytes).unwrap();

        let output = path.join("map.png");
        let config = path.join("config.ron");

        let args = Cli::parse_from([
            "taws",
            path.to_str().unwrap(),
            output.to_str().unwrap(),
            "--lat",
            "47.5",
            "--lon",
            "11.5",
            "--ts",
            "4",
            "--res",
            "32",
            "--range",
            "10",
            "--passes",
            "--save-config",
            config.to_str().unwrap(),
        ]);

        let context = RenderContext::from_cli(args).unwrap();
        assert_eq!(context.frame.resolution.y, 32);
        render(context).unwrap();

        let image = image::open(&output).unwrap().into_rgba8();
        assert_eq!(image.height(), 32);
        // the whole map lies inside the tile, nothing is drawn as loading
        assert!(image.pixels().all(|pixel| pixel.0 != [0, 0, 0, 255]));

        assert_eq!(MapConfig::load_file(&config).unwrap().tile_size, 4);

        fs::remove_dir_all(&path).unwrap();
    }

    #[test]
    fn reject_empty_directories() {
        let path = std::env::temp_dir().join(format!("taws_cli_empty_{}", std::process::id()));
        fs::create_dir_all(&path).unwrap();

        let args = Cli::parse_from(["taws", path.to_str().unwrap(), "--lat", "0", "--lon", "0"]);

        assert!(matches!(
            RenderContext::from_cli(args),
            Err(CliError::NoTiles(_))
        ));

        fs::remove_dir_all(&path).unwrap();
    }
}

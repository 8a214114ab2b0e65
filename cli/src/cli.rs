use bevy_taws::prelude::*;
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::{path::PathBuf, time::Duration};

use crate::result::CliResult;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Half,
    Full,
}

impl From<ModeArg> for DisplayMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Half => DisplayMode::HalfPage,
            ModeArg::Full => DisplayMode::FullPage,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum NotFoundArg {
    Water,
    Unknown,
}

impl From<NotFoundArg> for NotFoundStyle {
    fn from(style: NotFoundArg) -> Self {
        match style {
            NotFoundArg::Water => NotFoundStyle::Water,
            NotFoundArg::Unknown => NotFoundStyle::Unknown,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "taws", author, version, about)]
pub struct Cli {
    /// The directory containing the elevation tiles, named like `N47E011.bin`.
    #[arg(required = true)]
    pub tile_path: PathBuf,
    #[arg(default_value = "map.png")]
    pub output_path: PathBuf,

    /// The latitude of the aircraft in degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub lat: f64,
    /// The longitude of the aircraft in degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub lon: f64,
    /// The heading in degrees, clockwise from north.
    #[arg(long, default_value_t = 0.0)]
    pub heading: f64,
    /// The altitude in feet.
    #[arg(short, long = "alt", default_value_t = 10_000.0, allow_negative_numbers = true)]
    pub altitude: f32,
    /// The display range in nautical miles.
    #[arg(short, long, default_value = "40")]
    pub range: Range,
    #[arg(short, long, value_enum, default_value = "full")]
    pub mode: ModeArg,
    /// The height of the output image in pixels.
    #[arg(long = "res", default_value_t = 512)]
    pub resolution: u32,

    /// A map configuration in the ron format.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Writes the effective map configuration to this file.
    #[arg(long)]
    pub save_config: Option<PathBuf>,
    #[arg(long = "ts")]
    pub tile_size: Option<u32>,
    #[arg(long, value_enum)]
    pub not_found: Option<NotFoundArg>,

    /// Renders the height, shade and composite passes one after another.
    #[arg(short, long, default_value_t = false)]
    pub passes: bool,
    #[arg(long, default_value_t = false)]
    pub north_up: bool,
    #[arg(long, default_value_t = false)]
    pub nearest: bool,
    #[arg(long, default_value_t = false)]
    pub no_hillshade: bool,
}

impl Cli {
    /// Applies the command line overrides to the map configuration.
    pub fn apply(&self, config: &mut MapConfig) {
        if let Some(tile_size) = self.tile_size {
            config.tile_size = tile_size;
        }
        if let Some(not_found) = self.not_found {
            config.not_found = not_found.into();
        }

        config.flags.set(PipelineFlags::HEADING_UP, !self.north_up);
        config.flags.set(PipelineFlags::BILINEAR, !self.nearest);
        config.flags.set(PipelineFlags::HILLSHADE, !self.no_hillshade);
    }
}

pub(crate) struct RenderBar {
    name: String,
    bar: ProgressBar,
}

impl RenderBar {
    pub(crate) fn new(name: &str, length: u64) -> CliResult<Self> {
        let bar = ProgressBar::new(length).with_style(ProgressStyle::with_template(
            &(name.to_string() + " tiles: {wide_bar} {pos}/{len} [{elapsed}/{duration}]"),
        )?);
        bar.enable_steady_tick(Duration::from_millis(100));

        Ok(Self {
            name: name.to_string(),
            bar,
        })
    }

    pub(crate) fn inc(&self, delta: usize) {
        self.bar.inc(delta as u64);
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
        println!("{} took: {:?}", self.name, self.bar.elapsed());
    }
}

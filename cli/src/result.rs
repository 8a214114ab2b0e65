use indicatif::style::TemplateError;
use image::ImageError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("no elevation tiles found in {0}")]
    NoTiles(PathBuf),
    #[error("the latitude {0} lies outside of [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("the output resolution must not be zero")]
    ZeroResolution,
    #[error("failed to write the map image")]
    Image(#[from] ImageError),
    #[error("invalid progress bar template")]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Taws(#[from] anyhow::Error),
}

pub type CliResult<T> = Result<T, CliError>;

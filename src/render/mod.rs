//! This module contains the software pipeline that renders the terrain awareness map.
//!
//! # Explanation
//! Each output pixel is processed independently of all others:
//! its screen position is projected onto the earth, the elevation at that location is
//! sampled from the atlas by the [`TerrainSampler`], classified into a color relative to
//! the aircraft altitude, shaded by the slope of the surrounding terrain and finally
//! gamma encoded by the compositor.
//!
//! The [`MapRenderer`] runs this pipeline either in a single pass or split into a
//! [`HeightPass`], a [`ShadePass`] and a [`CompositePass`], each of which completes before
//! the next one reads its output.

mod classify;
mod composite;
mod hillshade;
mod passes;
mod sampler;

pub use crate::render::{
    classify::{
        classify, Terrain, BANDS, CAUTION_MARGIN_FEET, HAZARD_CAUTION, HAZARD_HIGH,
        HIGH_MARGIN_FEET, L500, LOADING, UNKNOWN_TERRAIN, WATER,
    },
    composite::{composite, to_srgba8, ShadeRange},
    hillshade::{shade, Gradient, Sun},
    passes::{CompositePass, HeightImage, HeightPass, MapRenderer, ShadeImage, ShadePass},
    sampler::TerrainSampler,
};

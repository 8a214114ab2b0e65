use crate::{
    config::{FrameConfig, MapConfig, NotFoundStyle, PipelineFlags},
    math::{project, CameraState},
    render::{
        classify, composite, shade, to_srgba8, Gradient, ShadeRange, Sun, Terrain,
        TerrainSampler,
    },
    terrain_data::{Elevation, HeightSample, PackedElevation, Sentinel},
};
use bevy::{
    color::LinearRgba,
    math::{DVec2, UVec2},
};
use image::{ImageBuffer, Luma, Pixel, RgbaImage};
use rayon::prelude::*;

/// The packed elevations of the height pass.
pub type HeightImage = ImageBuffer<Luma<u16>, Vec<u16>>;
/// The shading factors of the shade pass.
pub type ShadeImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Fills an image row by row in parallel.
fn par_fill<P>(
    size: UVec2,
    pixel: impl Fn(u32, u32) -> P + Sync,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + Send + Sync,
    P::Subpixel: Send + Sync,
{
    let size = size.max(UVec2::ONE);
    let channels = P::CHANNEL_COUNT as usize;
    let mut image = ImageBuffer::new(size.x, size.y);

    image
        .par_chunks_mut(size.x as usize * channels)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, target) in row.chunks_exact_mut(channels).enumerate() {
                target.copy_from_slice(pixel(x as u32, y as u32).channels());
            }
        });

    image
}

/// Renders the map of a frame.
///
/// The map is either rendered in a single pass, in which every pixel runs the whole pipeline,
/// or split into a [`HeightPass`], a [`ShadePass`] and a [`CompositePass`].
/// Both agree on the classification of each pixel, since samples are rounded to whole meters
/// as the height pass stores them.
pub struct MapRenderer<'a> {
    sampler: TerrainSampler<'a>,
    config: &'a MapConfig,
    camera: CameraState,
    sun: Sun,
    resolution: UVec2,
    altitude: i32,
    meters_per_pixel: f32,
}

impl<'a> MapRenderer<'a> {
    pub fn new(sampler: TerrainSampler<'a>, frame: &FrameConfig, config: &'a MapConfig) -> Self {
        Self {
            sampler,
            config,
            camera: frame.camera(config.flags),
            sun: frame.sun,
            resolution: frame.resolution.max(UVec2::ONE),
            altitude: frame.altitude_feet(),
            meters_per_pixel: frame.meters_per_pixel(),
        }
    }

    pub fn resolution(&self) -> UVec2 {
        self.resolution
    }

    /// Samples the elevation at the center of a pixel, which may lie outside of the image.
    pub fn sample(&self, x: f64, y: f64) -> HeightSample {
        let uv = DVec2::new(
            (x + 0.5) / self.resolution.x as f64,
            (y + 0.5) / self.resolution.y as f64,
        );
        let coordinate = project(uv, &self.camera);

        let sample = if self.config.flags.contains(PipelineFlags::BILINEAR) {
            self.sampler.sample_bilinear(coordinate)
        } else {
            self.sampler.sample(coordinate)
        };

        whole_meters(sample)
    }

    /// Runs the whole pipeline for a single pixel.
    pub fn render_pixel(&self, x: u32, y: u32) -> LinearRgba {
        let (x, y) = (x as f64, y as f64);
        let sample = self.sample(x, y);

        let color = classify(
            Terrain::from_sample(sample, self.config.not_found),
            self.altitude,
        );

        let shade = match sample.elevation() {
            Some(center) if self.hillshade() && !center.water => {
                let mut samples = [[center.meters; 3]; 3];

                for (row, dy) in samples.iter_mut().zip(-1..=1) {
                    for (value, dx) in row.iter_mut().zip(-1..=1) {
                        if (dx, dy) == (0, 0) {
                            continue;
                        }

                        let neighbour = self.sample(x + dx as f64, y + dy as f64);
                        if let Some(elevation) = neighbour.elevation() {
                            *value = elevation.meters;
                        }
                    }
                }

                shade(Gradient::sobel(&samples, self.meters_per_pixel), self.sun)
            }
            _ => 1.0,
        };

        composite(color, shade, self.config.shade)
    }

    /// Renders the map in a single pass.
    pub fn render_frame(&self) -> RgbaImage {
        par_fill(self.resolution, |x, y| {
            image::Rgba(to_srgba8(self.render_pixel(x, y)))
        })
    }

    /// Renders the map with the height, shade and composite passes.
    pub fn render_passes(&self) -> RgbaImage {
        let heights = HeightPass::new(self).run();

        let shades = self
            .hillshade()
            .then(|| ShadePass::new(self.sun, self.meters_per_pixel).run(&heights));

        CompositePass::new(self.altitude, self.config.shade).run(&heights, shades.as_ref())
    }

    fn hillshade(&self) -> bool {
        self.config.flags.contains(PipelineFlags::HILLSHADE)
    }
}

/// Rounds the elevation the way [`PackedElevation`] stores it.
fn whole_meters(sample: HeightSample) -> HeightSample {
    match sample {
        HeightSample::Elevation(elevation) => PackedElevation::from_elevation(elevation).unpack(),
        sentinel => sentinel,
    }
}

/// Samples the elevation of each pixel and packs it into 16 bits.
///
/// Cells without data are resolved according to the [`NotFoundStyle`], all other sentinels
/// are stored as reserved magnitudes.
pub struct HeightPass<'a, 'b> {
    renderer: &'b MapRenderer<'a>,
}

impl<'a, 'b> HeightPass<'a, 'b> {
    pub fn new(renderer: &'b MapRenderer<'a>) -> Self {
        Self { renderer }
    }

    pub fn run(&self) -> HeightImage {
        let not_found = self.renderer.config.not_found;

        par_fill(self.renderer.resolution, |x, y| {
            let sample: HeightSample = match self.renderer.sample(x as f64, y as f64) {
                HeightSample::Sentinel(Sentinel::NotFound) => match not_found {
                    NotFoundStyle::Water => Elevation::water().into(),
                    NotFoundStyle::Unknown => Sentinel::NoData.into(),
                },
                sample => sample,
            };

            Luma([PackedElevation::from(sample).0])
        })
    }
}

/// Computes the shading factor of each pixel from the packed elevations of its neighbours.
///
/// Neighbours beyond the image edge are clamped to it, neighbours without elevation take
/// the elevation of the center. Pixels without land are not shaded.
pub struct ShadePass {
    sun: Sun,
    meters_per_pixel: f32,
}

impl ShadePass {
    pub fn new(sun: Sun, meters_per_pixel: f32) -> Self {
        Self {
            sun,
            meters_per_pixel,
        }
    }

    pub fn run(&self, heights: &HeightImage) -> ShadeImage {
        let size = UVec2::new(heights.width(), heights.height());
        let max = size.as_ivec2() - 1;

        let elevation = |x: i32, y: i32| {
            let x = x.clamp(0, max.x) as u32;
            let y = y.clamp(0, max.y) as u32;
            PackedElevation(heights.get_pixel(x, y).0[0]).unpack().elevation()
        };

        par_fill(size, |x, y| {
            let (x, y) = (x as i32, y as i32);

            let center = match elevation(x, y) {
                Some(center) if !center.water => center.meters,
                _ => return Luma([1.0]),
            };

            let mut samples = [[center; 3]; 3];

            for (row, dy) in samples.iter_mut().zip(-1..=1) {
                for (value, dx) in row.iter_mut().zip(-1..=1) {
                    if let Some(neighbour) = elevation(x + dx, y + dy) {
                        *value = neighbour.meters;
                    }
                }
            }

            Luma([shade(
                Gradient::sobel(&samples, self.meters_per_pixel),
                self.sun,
            )])
        })
    }
}

/// Classifies the packed elevations and applies the shading factors.
pub struct CompositePass {
    altitude: i32,
    shade: ShadeRange,
}

impl CompositePass {
    pub fn new(altitude: i32, shade: ShadeRange) -> Self {
        Self { altitude, shade }
    }

    /// Composites the final image, without shading factors every pixel is fully lit.
    pub fn run(&self, heights: &HeightImage, shades: Option<&ShadeImage>) -> RgbaImage {
        let size = UVec2::new(heights.width(), heights.height());

        par_fill(size, |x, y| {
            let sample = PackedElevation(heights.get_pixel(x, y).0[0]).unpack();
            let shade = shades.map_or(1.0, |shades| shades.get_pixel(x, y).0[0]);

            // not-found cells were resolved by the height pass
            let color = classify(
                Terrain::from_sample(sample, NotFoundStyle::Unknown),
                self.altitude,
            );

            image::Rgba(to_srgba8(composite(color, shade, self.shade)))
        })
    }
}

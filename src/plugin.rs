use crate::{
    config::{FrameConfig, MapConfig},
    render::{MapRenderer, TerrainSampler},
    terrain_data::{visible_cells, TileAtlas, TileLoader, TileSource, TileUsage},
};
use bevy::{
    prelude::*,
    render::{
        render_asset::RenderAssetUsages,
        render_resource::{Extent3d, TextureDimension, TextureFormat, TextureUsages},
    },
};
use std::{sync::Arc, time::Instant};

/// The tiles of the map together with the signals of the tiles used by the last frame.
#[derive(Resource)]
pub struct TerrainAtlas {
    pub atlas: TileAtlas,
    pub usage: TileUsage,
    pub loader: TileLoader,
}

/// The image the map is rendered into.
#[derive(Clone, Resource)]
pub struct MapImage(pub Handle<Image>);

/// The plugin for the terrain awareness map.
///
/// Each frame the map is rendered according to the [`FrameConfig`] resource into the
/// [`MapImage`], while the tiles sampled by the renderer are streamed in from the source.
pub struct TawsPlugin {
    pub config: MapConfig,
    pub source: Arc<dyn TileSource>,
}

impl TawsPlugin {
    pub fn new(config: MapConfig, source: impl TileSource) -> Self {
        Self {
            config,
            source: Arc::new(source),
        }
    }
}

impl Plugin for TawsPlugin {
    fn build(&self, app: &mut App) {
        let tile_size = self.source.tile_size();

        if tile_size != self.config.tile_size {
            warn!(
                "The tile source provides tiles of size {tile_size}, instead of the configured {}.",
                self.config.tile_size
            );
        }

        let mut atlas = TileAtlas::new(
            self.config.atlas_format(),
            tile_size,
            self.config.atlas_capacity(),
        );
        atlas.set_existing(self.source.existing_tiles());

        info!("Created a tile atlas with room for {} tiles.", atlas.capacity());

        app.insert_resource(MapConfig {
            tile_size,
            ..self.config.clone()
        })
        .init_resource::<FrameConfig>()
        .insert_resource(TerrainAtlas {
            atlas,
            usage: TileUsage::new(),
            loader: TileLoader::new(self.source.clone(), self.config.max_loading_tiles),
        })
        .add_systems(Startup, create_map_image)
        .add_systems(First, clear_tile_usage)
        .add_systems(Update, render_map)
        .add_systems(Last, update_tile_atlas);
    }
}

fn new_map_image(resolution: UVec2) -> Image {
    let mut image = Image::new_fill(
        Extent3d {
            width: resolution.x,
            height: resolution.y,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        &[0, 0, 0, 255],
        TextureFormat::Rgba8UnormSrgb,
        RenderAssetUsages::default(),
    );

    image.texture_descriptor.usage =
        TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST | TextureUsages::COPY_SRC;

    image
}

pub fn create_map_image(
    mut commands: Commands,
    mut images: ResMut<Assets<Image>>,
    frame: Res<FrameConfig>,
) {
    let handle = images.add(new_map_image(frame.resolution.max(UVec2::ONE)));
    commands.insert_resource(MapImage(handle));
}

pub fn clear_tile_usage(mut terrain: ResMut<TerrainAtlas>) {
    terrain.usage.clear();
}

pub fn render_map(
    terrain: Res<TerrainAtlas>,
    config: Res<MapConfig>,
    frame: Res<FrameConfig>,
    map_image: Option<Res<MapImage>>,
    mut images: ResMut<Assets<Image>>,
) {
    let Some(map_image) = map_image else {
        return;
    };
    let Some(image) = images.get_mut(&map_image.0) else {
        return;
    };

    let start = Instant::now();

    let sampler = TerrainSampler::from_tile_atlas(&terrain.atlas, &terrain.usage);
    let renderer = MapRenderer::new(sampler, &frame, &config);
    let rendered = renderer.render_frame();

    if image.size() != renderer.resolution() {
        *image = new_map_image(renderer.resolution());
    }

    image.data = rendered.into_raw();

    debug!("Rendered the map in {:?}.", start.elapsed());
}

pub fn update_tile_atlas(
    mut terrain: ResMut<TerrainAtlas>,
    config: Res<MapConfig>,
    frame: Res<FrameConfig>,
) {
    let TerrainAtlas {
        atlas,
        usage,
        loader,
    } = &mut *terrain;

    let mut requests = atlas.update(usage);

    // prefetch the tiles that will be visible after turning
    requests.extend(
        visible_cells(&frame.camera(config.flags), frame.resolution, atlas.tile_size())
            .into_iter()
            .filter(|&cell| atlas.request(cell)),
    );

    if !requests.is_empty() {
        debug!("Requested {} tiles.", requests.len());
    }

    loader.request(requests);
    loader.finish_loading(atlas);
    loader.start_loading();
}

use bevy::{math::UVec2, utils::HashSet};
use bevy_taws::{
    prelude::*,
    render::{composite, to_srgba8, HeightPass, ShadePass, HAZARD_HIGH, UNKNOWN_TERRAIN, WATER},
    terrain_data::{visible_cells, WATER_ELEVATION},
};
use itertools::{iproduct, Itertools};
use std::sync::Arc;

const TILE_SIZE: u32 = 32;

fn cell(lat: i16, lon: i16) -> TileGridCell {
    TileGridCell::from_degrees(lat, lon)
}

/// A ridge running north-south through the alps, the sea to the south.
fn source() -> MemoryTileSource {
    let land = [cell(47, 10), cell(47, 11), cell(46, 10), cell(46, 11)];

    MemoryTileSource::from_fn(TILE_SIZE, land, |cell, x, y| {
        if cell.south_west().0 == 46 && y > TILE_SIZE / 2 {
            WATER_ELEVATION
        } else {
            let ridge = (x as i32 - TILE_SIZE as i32 / 2).abs();
            (2500 - 100 * ridge + 10 * y as i32) as i16
        }
    })
}

fn config(flags: PipelineFlags) -> MapConfig {
    MapConfig {
        flags,
        tile_size: TILE_SIZE,
        ..Default::default()
    }
}

fn frame(altitude: f32) -> FrameConfig {
    FrameConfig::for_range(
        GeoCoordinate::from_degrees(47.0, 11.0),
        30f64.to_radians(),
        altitude,
        Range::Nm40,
        DisplayMode::FullPage,
        64,
    )
}

fn loaded_atlas(config: &MapConfig, frame: &FrameConfig) -> TileAtlas {
    let source = source();
    let mut atlas = TileAtlas::new(config.atlas_format(), TILE_SIZE, config.atlas_capacity());
    atlas.set_existing(source.existing_tiles());

    let loader = TileLoader::new(Arc::new(source), 4);
    let cells = visible_cells(&frame.camera(config.flags), frame.resolution, TILE_SIZE);
    loader.load_all(&mut atlas, &cells);

    atlas
}

#[test]
fn rendering_is_deterministic() {
    let config = config(PipelineFlags::default());
    let frame = frame(8_000.0);
    let atlas = loaded_atlas(&config, &frame);

    let render = || {
        let usage = TileUsage::new();
        let sampler = TerrainSampler::from_tile_atlas(&atlas, &usage);
        let image = MapRenderer::new(sampler, &frame, &config).render_frame();

        (image, usage.used_cells().collect_vec())
    };

    let (first_image, first_usage) = render();
    let (second_image, second_usage) = render();

    assert_eq!(first_image, second_image);
    assert_eq!(first_usage, second_usage);
    assert!(first_usage.contains(&cell(47, 11)));

    // the signalled tiles do not depend on the order of the pixels
    let usage = TileUsage::new();
    let renderer =
        MapRenderer::new(TerrainSampler::from_tile_atlas(&atlas, &usage), &frame, &config);

    let pixels = iproduct!(0..frame.resolution.y, 0..frame.resolution.x).collect_vec();

    for &(y, x) in pixels.iter().rev() {
        renderer.render_pixel(x, y);
    }

    assert_eq!(usage.used_cells().collect_vec(), first_usage);
}

#[test]
fn tiles_not_loaded_are_black() {
    let config = config(PipelineFlags::default());
    let frame = frame(8_000.0);

    let mut atlas = TileAtlas::new(config.atlas_format(), TILE_SIZE, config.atlas_capacity());
    atlas.set_existing(source().existing_tiles());

    let usage = TileUsage::new();
    let sampler = TerrainSampler::from_tile_atlas(&atlas, &usage);
    let image = MapRenderer::new(sampler, &frame, &config).render_frame();

    // the map center lies on the corner of four existing tiles
    let center = image.get_pixel(image.width() / 2, image.height() / 2);
    assert_eq!(center.0, [0, 0, 0, 255]);

    // every sampled tile is signalled to be loaded
    let requests = atlas.update(&usage);
    assert!(requests.contains(&cell(47, 11)));
    assert!(requests.contains(&cell(46, 10)));
}

#[test]
fn terrain_above_the_aircraft_is_a_hazard() {
    let config = config(PipelineFlags::empty());
    let frame = frame(2_000.0);
    let atlas = loaded_atlas(&config, &frame);
    let usage = TileUsage::new();

    let renderer =
        MapRenderer::new(TerrainSampler::from_tile_atlas(&atlas, &usage), &frame, &config);

    let hazard = to_srgba8(composite(HAZARD_HIGH, 1.0, ShadeRange::default()));
    let water = to_srgba8(composite(WATER, 1.0, ShadeRange::default()));

    let image = renderer.render_frame();
    let pixels = image.pixels().map(|pixel| pixel.0).collect_vec();

    // the ridge is over 5000 ft high, the sea lies to the south
    assert!(pixels.contains(&hazard));
    assert!(pixels.contains(&water));
    assert!(pixels.iter().all(|pixel| pixel[3] == 255));
}

#[test]
fn missing_tiles_follow_the_style() {
    let frame = FrameConfig::for_range(
        GeoCoordinate::from_degrees(-30.5, -150.5),
        0.0,
        5_000.0,
        Range::Nm10,
        DisplayMode::FullPage,
        16,
    );

    for (style, color) in [
        (NotFoundStyle::Water, WATER),
        (NotFoundStyle::Unknown, UNKNOWN_TERRAIN),
    ] {
        let config = MapConfig {
            not_found: style,
            ..config(PipelineFlags::default())
        };
        let atlas = loaded_atlas(&config, &frame);
        let usage = TileUsage::new();

        let renderer =
            MapRenderer::new(TerrainSampler::from_tile_atlas(&atlas, &usage), &frame, &config);

        let expected = to_srgba8(composite(color, 1.0, config.shade));

        assert!(renderer.render_frame().pixels().all(|pixel| pixel.0 == expected));
        assert!(renderer.render_passes().pixels().all(|pixel| pixel.0 == expected));
    }
}

#[test]
fn single_pass_matches_the_passes() {
    for flags in [
        PipelineFlags::empty(),
        PipelineFlags::WATER_MASK,
        PipelineFlags::BILINEAR,
        PipelineFlags::BILINEAR | PipelineFlags::WATER_MASK,
    ] {
        let config = config(flags);
        let frame = frame(6_000.0);
        let atlas = loaded_atlas(&config, &frame);
        let usage = TileUsage::new();

        let renderer =
            MapRenderer::new(TerrainSampler::from_tile_atlas(&atlas, &usage), &frame, &config);

        assert_eq!(renderer.render_frame(), renderer.render_passes());
    }
}

#[test]
fn opposite_flanks_of_a_ridge_are_shaded_differently() {
    let config = config(PipelineFlags::HILLSHADE | PipelineFlags::BILINEAR);
    let frame = FrameConfig::for_range(
        GeoCoordinate::from_degrees(47.5, 11.5),
        0.0,
        30_000.0,
        Range::Nm10,
        DisplayMode::FullPage,
        64,
    );
    let atlas = loaded_atlas(&config, &frame);
    let usage = TileUsage::new();

    let renderer =
        MapRenderer::new(TerrainSampler::from_tile_atlas(&atlas, &usage), &frame, &config);
    let heights = HeightPass::new(&renderer).run();
    let shades = ShadePass::new(frame.sun, frame.meters_per_pixel()).run(&heights);

    // the ridge runs north-south through the center column
    let (x, y) = (shades.width() / 2, shades.height() / 2);
    let west = shades.get_pixel(x - 4, y).0[0];
    let east = shades.get_pixel(x + 4, y).0[0];

    assert!(west < east, "west {west}, east {east}");
    assert!(heights.get_pixel(x, y).0[0] > heights.get_pixel(x - 4, y).0[0]);
    assert!(heights.get_pixel(x, y).0[0] > heights.get_pixel(x + 4, y).0[0]);
}

#[test]
fn output_size_follows_the_display_mode() {
    let config = config(PipelineFlags::default());
    let atlas = TileAtlas::new(config.atlas_format(), TILE_SIZE, 4);
    let usage = TileUsage::new();

    for (mode, size) in [
        (DisplayMode::FullPage, UVec2::new(91, 64)),
        (DisplayMode::HalfPage, UVec2::new(46, 64)),
    ] {
        let frame = FrameConfig::for_range(
            GeoCoordinate::from_degrees(0.0, 0.0),
            0.0,
            0.0,
            Range::Nm10,
            mode,
            64,
        );
        let renderer =
            MapRenderer::new(TerrainSampler::from_tile_atlas(&atlas, &usage), &frame, &config);

        assert_eq!(renderer.resolution(), size);
        assert_eq!(renderer.render_frame().dimensions(), (size.x, size.y));
    }
}

#[test]
fn every_sampled_tile_is_visible() {
    const WORLD_TILE_SIZE: u32 = 2;

    let config = MapConfig {
        flags: PipelineFlags::all(),
        tile_size: WORLD_TILE_SIZE,
        ..Default::default()
    };

    // every cell of the world holds land, so the hillshade reads all neighbours
    let cells = TileGridCell::iter_all().collect_vec();
    let mut atlas = TileAtlas::new(config.atlas_format(), WORLD_TILE_SIZE, cells.len());
    atlas.set_existing(cells.iter().copied());

    for &cell in &cells {
        let height = 100 * (cell.lat_index % 7) as i16 + 10 * (cell.lon_index % 5) as i16;
        atlas.insert_tile(cell, &[height; 4]).unwrap();
    }

    for (lat, lon, heading, range) in [
        (78.5, 15.5, 0.0, Range::Nm40),
        (78.0, -120.0, 1.0, Range::Nm160),
        (47.3, 11.4, 0.3, Range::Nm640),
    ] {
        let frame = FrameConfig::for_range(
            GeoCoordinate::from_degrees(lat, lon),
            heading,
            0.0,
            range,
            DisplayMode::FullPage,
            128,
        );
        let usage = TileUsage::new();

        MapRenderer::new(TerrainSampler::from_tile_atlas(&atlas, &usage), &frame, &config)
            .render_frame();

        let visible: HashSet<TileGridCell> =
            visible_cells(&frame.camera(config.flags), frame.resolution, WORLD_TILE_SIZE)
                .into_iter()
                .collect();
        let hidden = usage
            .used_cells()
            .filter(|cell| !visible.contains(cell))
            .collect_vec();

        assert!(usage.used_count() > 0);
        assert!(hidden.is_empty(), "{lat}° {range:?}: {hidden:?}");
    }
}

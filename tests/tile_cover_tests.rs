#[cfg(test)]
mod tile_cover_tests {
    use mapcam::core::geo::lat_from_mercator_y;
    use mapcam::{
        CoveringTilesOptions, LatLng, OverscaledTileID, PaddingOptions, Point, ProjectionSpec, Transform,
        TransformOptions,
    };

    fn transform(width: f64, height: f64, zoom: f64, center: LatLng) -> Transform {
        let mut tr = Transform::new(TransformOptions::default()).unwrap();
        tr.resize(width, height);
        tr.set_zoom(zoom);
        tr.set_center(center);
        tr
    }

    fn assert_no_overlap(tiles: &[OverscaledTileID]) {
        for (i, a) in tiles.iter().enumerate() {
            for b in &tiles[i + 1..] {
                assert_ne!(a, b, "duplicate tile {:?}", a);
                assert!(!a.is_child_of(b) && !b.is_child_of(a), "{:?} overlaps {:?}", a, b);
            }
        }
    }

    /// A flat view of the whole world at zoom 2 needs exactly the four
    /// central tiles
    #[test]
    fn test_four_central_tiles_at_zoom_two() {
        let tr = transform(1024.0, 768.0, 2.0, LatLng::new(0.0, 0.0));
        let tiles = tr.covering_tiles(&CoveringTilesOptions::new(512.0));

        let mut xy: Vec<(u32, u32)> = tiles.iter().map(|t| (t.canonical.x, t.canonical.y)).collect();
        xy.sort();
        assert_eq!(xy, vec![(1, 1), (1, 2), (2, 1), (2, 2)]);
        assert!(tiles.iter().all(|t| t.overscaled_z == 2 && t.canonical.z == 2 && t.wrap == 0));
    }

    /// Every ground point on screen lies in one of the returned tiles
    #[test]
    fn test_cover_is_complete() {
        let mut tr = transform(1024.0, 768.0, 3.0, LatLng::new(20.0, 10.0));
        tr.set_render_world_copies(false);
        let tiles = tr.covering_tiles(&CoveringTilesOptions::new(512.0));
        let n = 8.0;

        for i in 0..=8 {
            for j in 0..=6 {
                let point = Point::new(1.0 + i as f64 * 127.5, 1.0 + j as f64 * 127.6);
                let coord = tr.point_coordinate(&point, None);
                let x = (coord.x * n).floor() as u32;
                let y = (coord.y * n).floor() as u32;
                assert!(
                    tiles.iter().any(|t| t.canonical.x == x && t.canonical.y == y),
                    "no tile for {:?} at {}/{}",
                    point,
                    x,
                    y
                );
            }
        }
    }

    /// A pitched view mixes zoom levels without covering any area twice
    #[test]
    fn test_pitched_cover_has_no_overlap() {
        let mut tr = transform(1024.0, 768.0, 10.0, LatLng::new(37.77, -122.42));
        tr.set_max_pitch(85.0);
        tr.set_pitch(75.0);
        tr.set_bearing(30.0);
        let tiles = tr.covering_tiles(&CoveringTilesOptions::new(512.0));

        assert!(!tiles.is_empty());
        assert!(tiles.iter().all(|t| t.canonical.z <= 10));
        assert!(tiles.iter().any(|t| t.canonical.z < 10));
        assert_no_overlap(&tiles);
    }

    /// Tiles come back nearest to the center first
    #[test]
    fn test_cover_starts_at_the_center_tile() {
        let lat = lat_from_mercator_y(4.5 / 8.0);
        let tr = transform(1024.0, 768.0, 3.0, LatLng::new(lat, 22.5));
        let tiles = tr.covering_tiles(&CoveringTilesOptions::new(512.0));

        assert_eq!(tiles[0], OverscaledTileID::new(3, 0, 3, 4, 4));
        assert_eq!(tiles.len(), 9);
    }

    /// A flat padded view returns tiles ordered by distance from the center
    #[test]
    fn test_cover_is_sorted_nearest_first() {
        let mut tr = transform(1024.0, 768.0, 4.0, LatLng::new(20.0, 10.0));
        tr.set_padding(PaddingOptions {
            bottom: Some(200.0),
            right: Some(100.0),
            ..Default::default()
        });
        let tiles = tr.covering_tiles(&CoveringTilesOptions::new(512.0));
        assert!(tiles.len() > 1);
        assert!(tiles.iter().all(|t| t.canonical.z == 4));

        let center = tr.location_coordinate(&tr.center(), None);
        let (cx, cy) = (center.x * 16.0, center.y * 16.0);
        let distances: Vec<f64> = tiles
            .iter()
            .map(|t| {
                let dx = cx - (0.5 + t.canonical.x as f64 + t.wrap as f64 * 16.0);
                let dy = cy - (0.5 + t.canonical.y as f64);
                dx * dx + dy * dy
            })
            .collect();
        for pair in distances.windows(2) {
            assert!(pair[0] <= pair[1] + 1e-9, "{:?}", distances);
        }
    }

    /// Top and left padding on a pitched view can put a coarser tile nearest
    /// the center; the cover stays valid
    #[test]
    fn test_padded_pitched_cover() {
        let mut tr = transform(1024.0, 768.0, 10.2, LatLng::new(84.9, 179.0));
        tr.set_pitch(60.0);
        tr.set_bearing(170.0);
        tr.set_padding(PaddingOptions {
            top: Some(300.0),
            left: Some(100.0),
            ..Default::default()
        });
        let tiles = tr.covering_tiles(&CoveringTilesOptions::new(512.0));
        assert!(!tiles.is_empty());
        assert_no_overlap(&tiles);

        for pitch in [0.0, 30.0, 60.0] {
            for bearing in [0.0, -45.0, 120.0] {
                for zoom in [2.5, 6.0, 13.7] {
                    let mut tr = transform(800.0, 600.0, zoom, LatLng::new(-33.9, 151.2));
                    tr.set_pitch(pitch);
                    tr.set_bearing(bearing);
                    tr.set_padding(PaddingOptions {
                        top: Some(250.0),
                        left: Some(150.0),
                        ..Default::default()
                    });
                    let tiles = tr.covering_tiles(&CoveringTilesOptions::new(512.0));
                    assert!(!tiles.is_empty(), "empty cover at z{zoom} pitch {pitch} bearing {bearing}");
                    assert_no_overlap(&tiles);
                }
            }
        }
    }

    /// Looking at the whole world from the antimeridian symmetry point shows
    /// the same number of tiles in both neighbouring copies
    #[test]
    fn test_world_copies_are_symmetric() {
        let tr = transform(2048.0, 512.0, 1.0, LatLng::new(0.0, 0.0));
        let tiles = tr.covering_tiles(&CoveringTilesOptions::new(512.0));

        let west = tiles.iter().filter(|t| t.wrap == -1).count();
        let east = tiles.iter().filter(|t| t.wrap == 1).count();
        assert!(west > 0);
        assert_eq!(west, east);
        assert_eq!(tiles.iter().filter(|t| t.wrap == 0).count(), 4);

        let mut flat = tr.clone();
        flat.set_render_world_copies(false);
        let tiles = flat.covering_tiles(&CoveringTilesOptions::new(512.0));
        assert!(tiles.iter().all(|t| t.wrap == 0));
    }

    /// The source zoom range caps and gates the cover
    #[test]
    fn test_source_zoom_range() {
        let tr = transform(1024.0, 768.0, 6.0, LatLng::new(0.0, 0.0));

        let capped = tr.covering_tiles(&CoveringTilesOptions::new(512.0).with_max_zoom(4));
        assert!(!capped.is_empty());
        assert!(capped.iter().all(|t| t.canonical.z == 4));

        let gated = tr.covering_tiles(&CoveringTilesOptions::new(512.0).with_min_zoom(7));
        assert!(gated.is_empty());

        // Smaller tiles mean one more zoom level
        let small = tr.covering_tiles(&CoveringTilesOptions::new(256.0));
        assert!(small.iter().all(|t| t.canonical.z == 7));
    }

    /// A globe seen from above the pole at low zoom still needs tiles
    #[test]
    fn test_globe_cover_near_the_pole() {
        let options = TransformOptions::default().with_projection(ProjectionSpec::new("globe"));
        let mut tr = Transform::new(options).unwrap();
        tr.resize(1024.0, 768.0);
        tr.set_zoom(1.5);
        tr.set_center(LatLng::new(90.0, 0.0));

        let tiles = tr.covering_tiles(&CoveringTilesOptions::new(512.0));
        assert!(!tiles.is_empty());
        assert!(tiles.iter().any(|t| t.canonical.y == 0));
        assert!(tiles.iter().all(|t| t.wrap == 0));
        assert_no_overlap(&tiles);
    }

    /// Equirectangular views produce a valid cover through the reprojected
    /// tile boxes
    #[test]
    fn test_equirectangular_cover() {
        let options = TransformOptions::default().with_projection(ProjectionSpec::new("equirectangular"));
        let mut tr = Transform::new(options).unwrap();
        tr.resize(1024.0, 768.0);
        tr.set_zoom(3.0);
        tr.set_center(LatLng::new(30.0, 10.0));
        tr.set_pitch(40.0);

        let tiles = tr.covering_tiles(&CoveringTilesOptions::new(512.0));
        assert!(!tiles.is_empty());
        assert_no_overlap(&tiles);
    }
}

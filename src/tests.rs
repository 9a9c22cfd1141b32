use approx::assert_relative_eq;
use std::io::Write;

use crate::blockage::{
    BeamBlockConfig, beam_block, beam_block_flags, cumulative_beam_block, threshold_flags,
};
use crate::error::BlockageError;
use crate::geo::{LatLon, beam_height_and_arc, destination, latlon_to_webmercator,
    webmercator_to_latlon};
use crate::grid::{Grid2, linspace};
use crate::io::{RadarVolume, gate_ranges, pbb_field};
use crate::physics::beam::{half_power_radius, partial_block_fraction};
use crate::physics::refraction::RefractionParams;
use crate::solver::{ElevationSearch, locate_block, locate_no_block, lowest_unblocked_elevation};
use crate::terrain::{RasterCrs, RasterStore, TerrainRaster};

const SITE: LatLon = LatLon {
    latitude: 45.0,
    longitude: 5.0,
    altitude: 200.0,
};

/// Constant-height raster covering a 2x2 degree box around the test site.
fn flat_raster(height: f64) -> TerrainRaster {
    let size = 201;
    TerrainRaster::new(
        size,
        size,
        4.0,  // west edge
        46.0, // north edge
        0.01,
        0.01,
        RasterCrs::Geographic,
        vec![height; size * size],
    )
    .unwrap()
}

/// Flat raster with a tall north-south ridge between `lon_from` and
/// `lon_to` degrees.
fn ridge_raster(ridge_height: f64, lon_from: f64, lon_to: f64) -> TerrainRaster {
    let size = 201;
    let mut values = vec![0.0; size * size];
    for row in 0..size {
        for col in 0..size {
            let lon = 4.0 + col as f64 * 0.01;
            if lon >= lon_from && lon <= lon_to {
                values[row * size + col] = ridge_height;
            }
        }
    }
    TerrainRaster::new(size, size, 4.0, 46.0, 0.01, 0.01, RasterCrs::Geographic, values).unwrap()
}

fn grid_from(nrows: usize, ncols: usize, data: &[f64]) -> Grid2 {
    Grid2::from_vec(nrows, ncols, data.to_vec()).unwrap()
}

#[test]
fn test_linspace_endpoints() {
    let v = linspace(0.0, 90.0, 90);
    assert_eq!(v.len(), 90);
    assert_relative_eq!(v[0], 0.0);
    assert_relative_eq!(v[89], 90.0);
    assert_eq!(linspace(1.0, 2.0, 1), vec![1.0]);
    assert!(linspace(0.0, 1.0, 0).is_empty());
}

#[test]
fn test_grid_concat_and_shape_check() {
    let a = grid_from(1, 3, &[1.0, 2.0, 3.0]);
    let b = grid_from(2, 3, &[4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
    let c = Grid2::concat_rows(&[a.clone(), b]).unwrap();
    assert_eq!(c.shape(), (3, 3));
    assert_relative_eq!(c.get(0, 2), 3.0);
    assert_relative_eq!(c.get(2, 0), 7.0);

    let bad = grid_from(1, 2, &[0.0, 0.0]);
    assert!(matches!(
        Grid2::concat_rows(&[a, bad]),
        Err(BlockageError::ShapeMismatch(_))
    ));
    assert!(Grid2::from_vec(2, 2, vec![0.0; 3]).is_err());
}

#[test]
fn test_destination_one_degree_north() {
    let p = destination(SITE, 0.0, 111_319.0);
    // 1 degree of latitude is ~111.3 km on the spherical model.
    assert_relative_eq!(p.latitude, 46.0, epsilon = 5e-3);
    assert_relative_eq!(p.longitude, 5.0, epsilon = 1e-6);
}

#[test]
fn test_beam_height_grows_with_elevation() {
    let refraction = RefractionParams::default();
    let (alt_low, arc_low) = beam_height_and_arc(50_000.0, 0.0, 200.0, refraction);
    let (alt_high, arc_high) = beam_height_and_arc(50_000.0, 10.0, 200.0, refraction);

    // At zero elevation the beam still climbs from earth curvature:
    // roughly r^2 / (2 * 4/3 * R) above the site.
    assert_relative_eq!(alt_low - 200.0, 147.0, epsilon = 5.0);
    assert!(alt_high > alt_low);
    assert!(arc_high < arc_low);
    // Ground arc is close to slant range at low elevation.
    assert_relative_eq!(arc_low, 50_000.0, epsilon = 100.0);
}

#[test]
fn test_webmercator_round_trip() {
    let p = LatLon {
        latitude: 43.3,
        longitude: 5.7,
        altitude: 0.0,
    };
    let back = webmercator_to_latlon(latlon_to_webmercator(p));
    assert_relative_eq!(back.latitude, p.latitude, epsilon = 1e-9);
    assert_relative_eq!(back.longitude, p.longitude, epsilon = 1e-9);
}

#[test]
fn test_half_power_radius() {
    let radii = half_power_radius(&[0.0, 1000.0, 2000.0], 1.0);
    assert_relative_eq!(radii[0], 0.0);
    assert_relative_eq!(radii[1], 8.727, epsilon = 1e-3);
    // Monotonically increasing with range.
    assert!(radii[2] > radii[1]);
}

#[test]
fn test_partial_block_fraction_extremes() {
    // Beam center level with the terrain top: half the lobe is blocked.
    assert_relative_eq!(partial_block_fraction(100.0, 100.0, 50.0), 0.5);
    // Entirely above terrain: exactly unblocked, not NaN.
    assert_relative_eq!(partial_block_fraction(0.0, 5000.0, 50.0), 0.0);
    // Entirely below terrain: exactly blocked.
    assert_relative_eq!(partial_block_fraction(5000.0, 0.0, 50.0), 1.0);
    // Invalid inputs stay invalid.
    assert!(partial_block_fraction(f64::NAN, 100.0, 50.0).is_nan());
    assert!(partial_block_fraction(100.0, f64::NAN, 50.0).is_nan());
    assert!(partial_block_fraction(100.0, 100.0, 0.0).is_nan());
}

#[test]
fn test_cumulative_reference_ray() {
    let pbb = grid_from(1, 5, &[0.0, 0.2, 0.8, 0.3, 0.1]);
    let cbb = cumulative_beam_block(&pbb);
    let expected = [0.0, 0.2, 0.8, 0.8, 0.8];
    for (gate, &want) in expected.iter().enumerate() {
        assert_relative_eq!(cbb.get(0, gate), want);
    }
}

#[test]
fn test_cumulative_skips_invalid_gates() {
    let pbb = grid_from(1, 5, &[f64::NAN, 0.2, f64::NAN, 0.5, 0.1]);
    let cbb = cumulative_beam_block(&pbb);
    assert!(cbb.get(0, 0).is_nan());
    assert_relative_eq!(cbb.get(0, 1), 0.2);
    // Unknown gate reports the worst obstruction confirmed so far.
    assert_relative_eq!(cbb.get(0, 2), 0.2);
    assert_relative_eq!(cbb.get(0, 3), 0.5);
    assert_relative_eq!(cbb.get(0, 4), 0.5);
}

#[test]
fn test_cumulative_all_invalid_ray() {
    let pbb = Grid2::invalid(2, 4);
    let cbb = cumulative_beam_block(&pbb);
    for gate in 0..4 {
        assert!(cbb.get(0, gate).is_nan());
        assert!(cbb.get(1, gate).is_nan());
    }
}

#[test]
fn test_cumulative_is_prefix_maximum() {
    // Interior peak at gate 3, plus a second smaller bump.
    let values = [0.1, 0.05, 0.4, 0.9, 0.2, 0.6, 0.0, 0.3];
    let pbb = grid_from(1, values.len(), &values);
    let cbb = cumulative_beam_block(&pbb);

    let mut prefix_max = f64::MIN;
    for (gate, &v) in values.iter().enumerate() {
        prefix_max = prefix_max.max(v);
        // Strict definition: CBB equals max(PBB[0..=gate]).
        assert_relative_eq!(cbb.get(0, gate), prefix_max);
        // CBB dominates PBB and never decreases.
        assert!(cbb.get(0, gate) >= v);
        if gate > 0 {
            assert!(cbb.get(0, gate) >= cbb.get(0, gate - 1));
        }
    }
}

#[test]
fn test_flag_boundaries() {
    let sample = [0.0, 0.005, 0.01, 0.5, 0.95, 0.96, 1.0];
    let grid = grid_from(1, sample.len(), &sample);
    let (pbb_flags, cbb_flags) = beam_block_flags(&grid, &grid, 0.01, 0.95).unwrap();

    // Equality rule: exactly at no_block is partial, exactly at complete
    // is complete.
    let expected = [0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 2.0];
    for (gate, &want) in expected.iter().enumerate() {
        assert_relative_eq!(pbb_flags.get(0, gate), want);
        assert_relative_eq!(cbb_flags.get(0, gate), want);
    }
}

#[test]
fn test_flags_propagate_invalid_and_reject_bad_thresholds() {
    let grid = grid_from(1, 2, &[f64::NAN, 0.5]);
    let (flags, _) = beam_block_flags(&grid, &grid, 0.01, 0.95).unwrap();
    assert!(flags.get(0, 0).is_nan());
    assert_relative_eq!(flags.get(0, 1), 1.0);

    assert!(beam_block_flags(&grid, &grid, 0.95, 0.01).is_err());
}

#[test]
fn test_single_threshold_flags() {
    let grid = grid_from(1, 4, &[0.0, 0.01, 0.02, f64::NAN]);
    let flags = threshold_flags(&grid, 0.01);
    assert_relative_eq!(flags.get(0, 0), 0.0);
    // Equality is unflagged under the strict > rule.
    assert_relative_eq!(flags.get(0, 1), 0.0);
    assert_relative_eq!(flags.get(0, 2), 1.0);
    assert!(flags.get(0, 3).is_nan());
}

#[test]
fn test_flat_terrain_is_unblocked() {
    let raster = flat_raster(0.0);
    let volume = RadarVolume::ppi(SITE, gate_ranges(10, 1000.0, 1000.0), 8, vec![0.5, 1.5]);
    let (pbb, cbb) = beam_block(&volume, &raster, &BeamBlockConfig::default()).unwrap();

    assert_eq!(pbb.shape(), (16, 10));
    assert_eq!(cbb.shape(), (16, 10));
    for &v in pbb.values().iter().chain(cbb.values()) {
        assert_relative_eq!(v, 0.0, epsilon = 1e-9);
    }
}

#[test]
fn test_ridge_pins_cumulative_block() {
    // Ridge ~2.4-3.1 km east of the site, far taller than the beam.
    let raster = ridge_raster(3000.0, 5.03, 5.04);
    let volume = RadarVolume::rhi(SITE, gate_ranges(10, 1000.0, 1000.0), 90.0, vec![0.0]);
    let (pbb, cbb) = beam_block(&volume, &raster, &BeamBlockConfig::default()).unwrap();

    // Before the ridge: clear.
    assert!(pbb.get(0, 0) < 0.01);
    assert_relative_eq!(cbb.get(0, 0), pbb.get(0, 0));
    // Past the ridge the terrain is flat again, so PBB recovers...
    assert!(pbb.get(0, 9) < 0.01);
    // ...but CBB stays pinned at the worst obstruction on the path.
    assert!(cbb.get(0, 9) > 0.95);
    for gate in 1..10 {
        assert!(cbb.get(0, gate) >= cbb.get(0, gate - 1));
    }
}

#[test]
fn test_clip_outside_raster_fails_hard() {
    let raster = flat_raster(0.0);
    let far_site = LatLon {
        latitude: 10.0,
        longitude: 100.0,
        altitude: 0.0,
    };
    let volume = RadarVolume::ppi(far_site, gate_ranges(5, 1000.0, 1000.0), 4, vec![0.5]);
    assert!(matches!(
        beam_block(&volume, &raster, &BeamBlockConfig::default()),
        Err(BlockageError::ClipOutOfBounds { .. })
    ));
}

#[test]
fn test_json_and_object_volumes_match() {
    let volume = RadarVolume::ppi(SITE, gate_ranges(8, 1000.0, 500.0), 6, vec![0.4, 1.2]);

    // The document form stores arrays as JSON-encoded strings, as the
    // X-SAPR exports do.
    let encode = |values: &[f64]| serde_json::to_string(values).unwrap();
    let starts: Vec<f64> = volume.sweep_start_ray_index.iter().map(|&i| i as f64).collect();
    let ends: Vec<f64> = volume.sweep_end_ray_index.iter().map(|&i| i as f64).collect();
    let doc = serde_json::json!({
        "variables": {
            "longitude": {"data": SITE.longitude},
            "latitude": {"data": SITE.latitude},
            "altitude": {"data": SITE.altitude},
            "range": {"data": encode(&volume.range)},
            "azimuth": {"data": encode(&volume.azimuth)},
            "elevation": {"data": encode(&volume.elevation)},
            "sweep_start_ray_index": {"data": encode(&starts)},
            "sweep_end_ray_index": {"data": encode(&ends)},
            "fixed_angle": {"data": encode(&volume.fixed_angle)},
        }
    });
    let parsed = RadarVolume::from_json(&doc.to_string()).unwrap();

    let raster = ridge_raster(1500.0, 5.02, 5.04);
    let config = BeamBlockConfig::default();
    let (pbb_a, cbb_a) = beam_block(&volume, &raster, &config).unwrap();
    let (pbb_b, cbb_b) = beam_block(&parsed, &raster, &config).unwrap();

    assert_eq!(pbb_a.shape(), pbb_b.shape());
    for (&a, &b) in pbb_a.values().iter().zip(cbb_a.values()) {
        // CBB dominates PBB everywhere, as a sanity check on the scenario.
        assert!(b >= a);
    }
    for (&a, &b) in pbb_a.values().iter().zip(pbb_b.values()) {
        assert_relative_eq!(a, b, epsilon = 1e-3);
    }
    for (&a, &b) in cbb_a.values().iter().zip(cbb_b.values()) {
        assert_relative_eq!(a, b, epsilon = 1e-3);
    }
}

#[test]
fn test_json_volume_rejects_garbage() {
    assert!(RadarVolume::from_json("{}").is_err());
    let doc = serde_json::json!({
        "variables": {
            "longitude": {"data": 5.0},
            "latitude": {"data": 45.0},
            "altitude": {"data": 200.0},
            "range": {"data": "[1000.0]"},
            "azimuth": {"data": "[0.0]"},
            "elevation": {"data": "[0.5]"},
            "sweep_start_ray_index": {"data": "[0]"},
            "sweep_end_ray_index": {"data": "[4]"},
        }
    });
    // End index past the last ray.
    assert!(matches!(
        RadarVolume::from_json(&doc.to_string()),
        Err(BlockageError::BadVolume(_))
    ));
}

#[test]
fn test_volume_validate() {
    let mut volume = RadarVolume::ppi(SITE, gate_ranges(4, 1000.0, 1000.0), 4, vec![0.5]);
    assert!(volume.validate().is_ok());
    volume.sweep_end_ray_index[0] = 99;
    assert!(volume.validate().is_err());
}

#[test]
fn test_solver_flat_terrain_reports_lowest_angle() {
    let raster = flat_raster(0.0);
    let volume = RadarVolume::ppi(SITE, gate_ranges(5, 1000.0, 1000.0), 4, vec![0.5]);
    let search = ElevationSearch {
        az_count: 4,
        elev_count: 10,
        elev_end: 9.0,
        ..ElevationSearch::default()
    };
    let low_el =
        lowest_unblocked_elevation(&volume, &raster, &BeamBlockConfig::default(), &search).unwrap();

    assert_eq!(low_el.shape(), (4, 5));
    for &v in low_el.values() {
        assert_relative_eq!(v, 0.0);
    }
}

#[test]
fn test_solver_fully_blocked_gate_is_invalid() {
    // Terrain towers over every elevation in the search grid: no angle
    // qualifies, so the result must be the NaN sentinel, not elev_start.
    let raster = flat_raster(50_000.0);
    let volume = RadarVolume::ppi(SITE, gate_ranges(4, 1000.0, 500.0), 2, vec![0.5]);
    let search = ElevationSearch {
        az_count: 2,
        elev_count: 30,
        elev_end: 29.0,
        ..ElevationSearch::default()
    };
    let low_el =
        lowest_unblocked_elevation(&volume, &raster, &BeamBlockConfig::default(), &search).unwrap();

    for &v in low_el.values() {
        assert!(v.is_nan());
    }
}

#[test]
fn test_solver_ridge_requires_steeper_angle_behind_it() {
    let raster = ridge_raster(3000.0, 5.03, 5.04);
    let volume = RadarVolume::ppi(SITE, gate_ranges(10, 1000.0, 1000.0), 4, vec![0.0]);
    let search = ElevationSearch {
        az_start: 90.0,
        az_end: 90.0,
        az_count: 1,
        elev_count: 91,
        ..ElevationSearch::default()
    };
    let low_el =
        lowest_unblocked_elevation(&volume, &raster, &BeamBlockConfig::default(), &search).unwrap();

    // In front of the ridge the lowest scan is already clear.
    assert_relative_eq!(low_el.get(0, 0), 0.0);
    // Behind it the beam must climb over ~3 km of terrain ~2 km out.
    let behind = low_el.get(0, 9);
    assert!(behind > 30.0, "expected steep angle, got {behind}");
    assert!(behind < 90.0);
}

#[test]
fn test_locate_block_indices() {
    let grid = grid_from(2, 3, &[0.0, 0.5, f64::NAN, 0.02, 0.0, 0.9]);
    assert_eq!(locate_block(&grid, 0.01), vec![(0, 1), (1, 0), (1, 2)]);
    assert_eq!(locate_no_block(&grid, 0.01), vec![(0, 0), (1, 1)]);
}

#[test]
fn test_field_metadata() {
    let field = pbb_field(Grid2::invalid(1, 1));
    assert_eq!(field.standard_name, "partial_beam_block");
    assert_eq!(field.long_name, "Partial Beam Block Fraction");
    assert_eq!(field.units, "unitless");
    assert_eq!(field.coordinates, "elevation, azimuth, range");
}

#[test]
fn test_hgt_loader_and_store() {
    let size = crate::terrain::SRTM3_SIZE;
    let mut data = vec![0u8; size * size * 2];
    // Value 500 at (row 0, col 0), a void at (row 0, col 1).
    data[0] = 0x01;
    data[1] = 0xF4;
    data[2] = 0x80;
    data[3] = 0x00;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("N45E005.hgt");
    std::fs::File::create(&path)
        .unwrap()
        .write_all(&data)
        .unwrap();

    let raster = TerrainRaster::from_hgt(&path).unwrap();
    assert_eq!(raster.shape(), (size, size));
    assert_eq!(raster.crs(), RasterCrs::Geographic);

    // NW corner of tile N45E005 is (46N, 5E); sample there hits (0, 0).
    let window = raster
        .window(&crate::terrain::Bbox {
            x_min: 5.0,
            y_min: 45.9,
            x_max: 5.1,
            y_max: 46.0,
        })
        .unwrap();
    assert_relative_eq!(window.sample(5.0, 46.0), 500.0);
    // The void pixel poisons interpolation next to it.
    assert!(window.sample(5.0004, 46.0).is_nan());

    let store = RasterStore::new(4);
    let first = store.open(&path).unwrap();
    let second = store.open(&path).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
}

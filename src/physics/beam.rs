//! Antenna beam geometry and the partial-blockage fraction of
//! Bech et al. 2003 (J. Atmos. Oceanic Technol., 20, 845-855).

/// Half-power radius of the main lobe at each range, for a half-power
/// beam width in degrees. Monotonically increasing with range; computed
/// once per volume and shared by all sweeps.
pub fn half_power_radius(range_m: &[f64], beam_width_deg: f64) -> Vec<f64> {
    let half = (beam_width_deg.to_radians() / 2.0).tan();
    range_m.iter().map(|r| r * half).collect()
}

/// Fraction of beam power blocked by terrain at one gate.
///
/// `y = terrain - beam_alt` is clamped to `[-radius, radius]`: a beam
/// entirely above terrain is exactly 0.0, entirely below is exactly 1.0.
/// Any NaN input (no-data terrain sample, invalid geometry) yields NaN;
/// invalid never collapses to "unblocked".
pub fn partial_block_fraction(terrain_height: f64, beam_alt: f64, radius: f64) -> f64 {
    if terrain_height.is_nan() || beam_alt.is_nan() || radius.is_nan() || radius <= 0.0 {
        return f64::NAN;
    }
    let y = (terrain_height - beam_alt).clamp(-radius, radius);
    let a2 = radius * radius;
    let numer = y * (a2 - y * y).sqrt() + a2 * (y / radius).asin()
        + std::f64::consts::PI * a2 / 2.0;
    let denom = std::f64::consts::PI * a2;
    (numer / denom).clamp(0.0, 1.0)
}

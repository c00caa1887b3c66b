//! Jet pseudo-color: 0 is dark blue, 255 is dark red.

use image::Rgb;

pub fn jet(value: u8) -> Rgb<u8> {
    let v = value as f32 / 255.0;
    let channel = |offset: f32| ((1.5 - (4.0 * v - offset).abs()).clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

/// Lookup table over all 256 intensities.
pub fn jet_lut() -> [Rgb<u8>; 256] {
    let mut lut = [Rgb([0u8; 3]); 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        *entry = jet(i as u8);
    }
    lut
}

//! Shared helpers for the multi-rank integration tests

#![allow(dead_code)]

use ksprop_formats::{Color, ColorVector, Complex, LatticeShape, WorkingReal};
use ksprop_io::SiteMap;

/// Deterministic vector for `site` of `color`, exact at single precision
pub fn vector(site: usize, color: Color) -> ColorVector<f32> {
    let s = site as f32;
    let c = color.index() as f32;
    ColorVector::new(std::array::from_fn(|k| {
        let k = k as f32;
        Complex::new(s * 0.5 + c + k * 0.125, -s / 8.0 - k)
    }))
}

/// Whole field of `color` in natural order
pub fn global_field(shape: LatticeShape, color: Color) -> Vec<ColorVector<f32>> {
    (0..shape.volume()).map(|site| vector(site, color)).collect()
}

/// The part of a natural-order field held by `rank`
pub fn local_part<R: WorkingReal>(
    global: &[ColorVector<R>],
    shape: LatticeShape,
    map: &dyn SiteMap,
    rank: usize,
) -> Vec<ColorVector<R>> {
    let mut local = vec![ColorVector::default(); map.sites_on(rank)];
    for (site, v) in global.iter().enumerate() {
        let coord = shape.coord(site);
        if map.owner_of(coord) == rank {
            local[map.local_slot(coord)] = *v;
        }
    }
    local
}

/// Reassemble a natural-order field from every rank's part
pub fn assemble<R: WorkingReal>(
    parts: &[Vec<ColorVector<R>>],
    shape: LatticeShape,
    map: &dyn SiteMap,
) -> Vec<ColorVector<R>> {
    (0..shape.volume())
        .map(|site| {
            let coord = shape.coord(site);
            parts[map.owner_of(coord)][map.local_slot(coord)]
        })
        .collect()
}

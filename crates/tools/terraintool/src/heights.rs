use crate::config::GeneratorConfig;
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};

/// Row-major `size * size` height map from fractal Perlin noise
pub fn generate(size: u32, config: &GeneratorConfig) -> Vec<f32> {
    let fbm = Fbm::<Perlin>::new(config.seed)
        .set_octaves(config.octaves)
        .set_frequency(config.frequency);

    let mut heights = Vec::with_capacity((size * size) as usize);
    for z in 0..size {
        for x in 0..size {
            // Fbm output is roughly in [-1, 1]
            let n = fbm.get([x as f64, z as f64]) as f32;
            heights.push((n * 0.5 + 0.5) * config.amplitude);
        }
    }
    heights
}

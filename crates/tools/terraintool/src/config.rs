use anyhow::{Context, Result};
use glam::Vec3;
use serde::Deserialize;
use std::path::Path;
use terrain::TerrainConfig;

/// Configuration loaded from a terraintool TOML file
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ToolConfig {
    #[serde(default)]
    pub terrain: TerrainConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub flythrough: FlythroughConfig,
}

/// Fractal noise used to fill the height map
#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    #[serde(default = "default_seed")]
    pub seed: u32,
    #[serde(default = "default_octaves")]
    pub octaves: usize,
    /// Noise frequency per height sample
    #[serde(default = "default_frequency")]
    pub frequency: f64,
    /// Peak height in sample units
    #[serde(default = "default_amplitude")]
    pub amplitude: f32,
}

fn default_seed() -> u32 {
    42
}

fn default_octaves() -> usize {
    6
}

fn default_frequency() -> f64 {
    0.004
}

fn default_amplitude() -> f32 {
    40.0
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            octaves: default_octaves(),
            frequency: default_frequency(),
            amplitude: default_amplitude(),
        }
    }
}

/// Straight viewpoint flight used by the `flythrough` command
#[derive(Debug, Deserialize, Clone)]
pub struct FlythroughConfig {
    #[serde(default = "default_start")]
    pub start: Vec3,
    #[serde(default = "default_end")]
    pub end: Vec3,
    #[serde(default = "default_frames")]
    pub frames: u32,
}

fn default_start() -> Vec3 {
    Vec3::new(-256.0, 60.0, -256.0)
}

fn default_end() -> Vec3 {
    Vec3::new(256.0, 60.0, 256.0)
}

fn default_frames() -> u32 {
    120
}

impl Default for FlythroughConfig {
    fn default() -> Self {
        Self {
            start: default_start(),
            end: default_end(),
            frames: default_frames(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<ToolConfig> {
    let config_str = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: ToolConfig = toml::from_str(&config_str)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    config
        .terrain
        .validate()
        .context("Invalid [terrain] section")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config() {
        let config: ToolConfig = toml::from_str(
            "[terrain]\ntotal_size = 257\n\n[flythrough]\nframes = 10\nend = [0.0, 5.0, 0.0]\n",
        )
        .unwrap();
        assert_eq!(config.terrain.total_size, 257);
        assert_eq!(config.terrain.patch_size, 65);
        assert_eq!(config.generator.octaves, 6);
        assert_eq!(config.flythrough.frames, 10);
        assert_eq!(config.flythrough.end, Vec3::new(0.0, 5.0, 0.0));
        assert_eq!(config.flythrough.start, default_start());
    }

    #[test]
    fn test_bundled_config_parses() {
        let text = include_str!("../terraintool.toml");
        let config: ToolConfig = toml::from_str(text).unwrap();
        assert!(config.terrain.validate().is_ok());
    }
}

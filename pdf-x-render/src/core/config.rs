//! Render configuration.
//!
//! Read once from `key = value` properties when a render context is created.
//! Unknown keys are ignored; malformed values keep their default and log a
//! warning.

use super::error::{PDFError, PDFResult};
use std::str::FromStr;

/// Anti-aliasing choice for pattern tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileAntialias {
    On,
    #[default]
    Off,
    /// Same as the page setting
    Default,
}

/// Sampling quality for scaled rasters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Nearest,
    Bilinear,
    Bicubic,
}

impl FromStr for TileAntialias {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" | "true" => Ok(TileAntialias::On),
            "off" | "false" => Ok(TileAntialias::Off),
            "default" => Ok(TileAntialias::Default),
            _ => Err(()),
        }
    }
}

impl FromStr for Interpolation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" | "nearest_neighbor" => Ok(Interpolation::Nearest),
            "bilinear" => Ok(Interpolation::Bilinear),
            "bicubic" => Ok(Interpolation::Bicubic),
            _ => Err(()),
        }
    }
}

/// Configuration for one render context.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Decode images on the worker pool (`pdf.image.proxy`)
    pub image_proxy: bool,

    /// Worker pool size (`pdf.image.proxy.threads`), at least 1
    pub image_proxy_threads: usize,

    /// Decoded images kept by the pool (`pdf.image.pool.capacity`)
    pub image_pool_capacity: usize,

    /// Page anti-aliasing (`pdf.render.antialiasing`)
    pub antialiasing: bool,

    /// Tile anti-aliasing (`pdf.tiling.antialiasing`)
    pub tiling_antialiasing: TileAntialias,

    /// Tile image sampling (`pdf.tiling.interpolation`)
    pub tiling_interpolation: Interpolation,

    /// Page image sampling (`pdf.image.interpolation`)
    pub image_interpolation: Interpolation,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            image_proxy: true,
            image_proxy_threads: 4,
            image_pool_capacity: 256,
            antialiasing: true,
            tiling_antialiasing: TileAntialias::Off,
            tiling_interpolation: Interpolation::Nearest,
            image_interpolation: Interpolation::Bilinear,
        }
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> PDFResult<T> {
    value.trim().parse::<T>().map_err(|_| PDFError::Config {
        key: key.to_string(),
        value: value.to_string(),
    })
}

impl RenderConfig {
    /// Builds a configuration from properties.
    ///
    /// # Example
    /// ```
    /// use pdf_x_render::core::RenderConfig;
    /// let config = RenderConfig::from_properties([("pdf.image.proxy", "false")]);
    /// assert!(!config.image_proxy);
    /// ```
    pub fn from_properties<K, V>(properties: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = RenderConfig::default();
        for (key, value) in properties {
            if let Err(e) = config.set(key.as_ref(), value.as_ref()) {
                log::warn!("{}, keeping default", e);
            }
        }
        config
    }

    /// Applies one property. Unknown keys are accepted and ignored.
    pub fn set(&mut self, key: &str, value: &str) -> PDFResult<()> {
        match key {
            "pdf.image.proxy" => self.image_proxy = parse_value(key, value)?,
            "pdf.image.proxy.threads" => {
                self.image_proxy_threads = parse_value::<usize>(key, value)?.max(1)
            }
            "pdf.image.pool.capacity" => {
                self.image_pool_capacity = parse_value::<usize>(key, value)?.max(1)
            }
            "pdf.render.antialiasing" => self.antialiasing = parse_value(key, value)?,
            "pdf.tiling.antialiasing" => self.tiling_antialiasing = parse_value(key, value)?,
            "pdf.tiling.interpolation" => self.tiling_interpolation = parse_value(key, value)?,
            "pdf.image.interpolation" => self.image_interpolation = parse_value(key, value)?,
            _ => log::debug!("ignoring unknown render property {}", key),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RenderConfig::default();
        assert!(config.image_proxy);
        assert_eq!(config.image_proxy_threads, 4);
        assert_eq!(config.tiling_antialiasing, TileAntialias::Off);
        assert_eq!(config.tiling_interpolation, Interpolation::Nearest);
    }

    #[test]
    fn test_from_properties() {
        let config = RenderConfig::from_properties([
            ("pdf.image.proxy", "false"),
            ("pdf.image.proxy.threads", "0"),
            ("pdf.tiling.antialiasing", "ON"),
            ("pdf.tiling.interpolation", "bicubic"),
            ("some.other.key", "x"),
        ]);
        assert!(!config.image_proxy);
        assert_eq!(config.image_proxy_threads, 1);
        assert_eq!(config.tiling_antialiasing, TileAntialias::On);
        assert_eq!(config.tiling_interpolation, Interpolation::Bicubic);
    }

    #[test]
    fn test_malformed_value_keeps_default() {
        let config = RenderConfig::from_properties([
            ("pdf.image.pool.capacity", "lots"),
            ("pdf.render.antialiasing", "maybe"),
        ]);
        assert_eq!(config.image_pool_capacity, 256);
        assert!(config.antialiasing);

        let mut config = RenderConfig::default();
        assert_eq!(
            config.set("pdf.image.interpolation", "sinc"),
            Err(PDFError::Config {
                key: "pdf.image.interpolation".into(),
                value: "sinc".into()
            })
        );
    }
}

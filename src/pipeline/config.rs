//! Pipeline configuration.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::image::{Normalization, MODEL_IMAGE_SIZE, RGB_CHANNELS};
use crate::model::SPATIAL_REDUCTION;

/// Configuration for the colorization pipeline.
///
/// Every field has a default, so a JSON config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Spatial size the model runs at. Must match the size it was trained at.
    pub input_resolution: u32,

    /// Whether to sharpen the resized output.
    pub enhance_sharpness: bool,

    /// Sharpness factor. 1.0 leaves the image unchanged.
    pub sharpness_factor: f32,

    /// Constants mapping pixels to model values and back.
    pub normalization: Normalization,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_resolution: MODEL_IMAGE_SIZE,
            enhance_sharpness: true,
            sharpness_factor: 1.5,
            normalization: Normalization::default(),
        }
    }
}

impl Config {
    /// Read a JSON config file. Missing keys take their default values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_reader(std::io::BufReader::new(file)).map_err(|source| {
            Error::ConfigParse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Sharpness factor to apply, if enhancement is enabled.
    #[must_use]
    pub fn sharpness(&self) -> Option<f32> {
        self.enhance_sharpness.then_some(self.sharpness_factor)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        let reduction = u32::try_from(SPATIAL_REDUCTION).unwrap_or(u32::MAX);
        if self.input_resolution == 0 || self.input_resolution % reduction != 0 {
            return Err(Error::InvalidParameter {
                name: "input_resolution".to_string(),
                reason: format!("must be a positive multiple of {SPATIAL_REDUCTION}"),
            });
        }

        if !self.sharpness_factor.is_finite() || self.sharpness_factor < 0.0 {
            return Err(Error::InvalidParameter {
                name: "sharpness_factor".to_string(),
                reason: "must be a finite value >= 0.0".to_string(),
            });
        }

        for c in 0..RGB_CHANNELS {
            if !self.normalization.mean[c].is_finite() {
                return Err(Error::InvalidParameter {
                    name: format!("normalization.mean[{c}]"),
                    reason: "must be finite".to_string(),
                });
            }

            let std = self.normalization.std[c];
            if !std.is_finite() || std <= 0.0 {
                return Err(Error::InvalidParameter {
                    name: format!("normalization.std[{c}]"),
                    reason: "must be finite and greater than 0.0".to_string(),
                });
            }
        }

        Ok(())
    }
}

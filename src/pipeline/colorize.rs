//! The colorization service.

use std::path::Path;

use ::image::{DynamicImage, RgbImage};

use crate::error::Result;
use crate::image;
use crate::model::{load_model, ColorizationModel, WeightsSource};

use super::{Config, Response};

/// A loaded colorization model plus the configuration around it.
///
/// Built once at startup and immutable afterwards. Every method takes
/// `&self`, so a single instance can be shared across threads.
pub struct Colorizer {
    config: Config,
    model: ColorizationModel,
}

impl Colorizer {
    /// Validate `config` and load the model weights from `weights`.
    ///
    /// This will download the weights if `weights` is a URL that is not cached yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the model cannot be loaded.
    pub fn load(weights: &WeightsSource, config: Config) -> Result<Self> {
        config.validate()?;

        tracing::info!("Initializing colorizer with config: {config:?}");

        let path = weights.resolve()?;
        let model = load_model(&path)?;

        tracing::info!("Colorizer initialized successfully");

        Ok(Self { config, model })
    }

    /// Wrap an already constructed model.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(model: ColorizationModel, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, model })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Colorize a decoded image. The result has the same dimensions as `img`.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    pub fn colorize_image(&self, img: &DynamicImage) -> Result<RgbImage> {
        let norm = &self.config.normalization;

        let (input, original_dims) = image::preprocess(img, self.config.input_resolution, norm);

        tracing::debug!("Running inference on {:?} tensor", input.shape());
        let output = self.model.colorize(&input)?;

        image::postprocess(&output, original_dims, norm, self.config.sharpness())
    }

    /// Colorize an encoded image and return it encoded as PNG.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be decoded, inference fails, or
    /// the result cannot be encoded.
    pub fn colorize_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let img = image::decode_image(bytes)?;
        let colorized = self.colorize_image(&img)?;
        image::encode_png(&colorized)
    }

    /// Colorize an encoded image, converting any failure into a [`Response`].
    #[must_use]
    pub fn respond(&self, bytes: &[u8]) -> Response {
        Response::from_result(self.colorize_bytes(bytes))
    }

    /// Colorize an image file and write the result as PNG.
    ///
    /// # Arguments
    ///
    /// * `input_path` - Path to the input image
    /// * `output_path` - Path to save the colorized image
    ///
    /// # Errors
    ///
    /// Returns an error if processing fails.
    pub fn process<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        output_path: Q,
    ) -> Result<()> {
        let input_path = input_path.as_ref();
        let output_path = output_path.as_ref();

        tracing::info!("Processing image: {}", input_path.display());

        let img = image::load_image(input_path)?;
        let colorized = self.colorize_image(&img)?;
        let png = image::encode_png(&colorized)?;

        tracing::info!("Saving output to: {}", output_path.display());
        std::fs::write(output_path, png)?;

        tracing::info!("Processing complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use candle_core::{DType, Device};
    use candle_nn::{VarBuilder, VarMap};
    use ::image::Rgb;

    use super::*;
    use crate::error::{Error, ErrorKind};

    fn small_colorizer(varmap: &VarMap, enhance_sharpness: bool) -> Colorizer {
        let vb = VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu);
        let model = ColorizationModel::new(vb).unwrap();
        let config = Config {
            input_resolution: 16,
            enhance_sharpness,
            ..Config::default()
        };
        Colorizer::new(model, config).unwrap()
    }

    fn stripes(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let v = if (x / 3 + y / 5) % 2 == 0 { 40 } else { 210 };
            Rgb([v, v, v])
        }))
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = ColorizationModel::new(vb).unwrap();
        let config = Config {
            input_resolution: 10,
            ..Config::default()
        };

        assert!(matches!(
            Colorizer::new(model, config),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_load_missing_weights() {
        let dir = tempfile::tempdir().unwrap();
        let source = WeightsSource::Path(dir.path().join("missing.safetensors"));

        let err = Colorizer::load(&source, Config::default()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ModelLoad);
    }

    #[test]
    fn test_colorize_image_keeps_dimensions() {
        let varmap = VarMap::new();
        let colorizer = small_colorizer(&varmap, true);

        let out = colorizer.colorize_image(&stripes(37, 23)).unwrap();
        assert_eq!(out.dimensions(), (37, 23));
    }

    #[test]
    fn test_respond_reports_decode_failure() {
        let varmap = VarMap::new();
        let colorizer = small_colorizer(&varmap, false);

        match colorizer.respond(b"\x00\x01garbage") {
            Response::Failed { kind, .. } => assert_eq!(kind, ErrorKind::Decode),
            Response::Colorized { .. } => panic!("garbage input must not colorize"),
        }

        // The model stays usable after a failed request.
        let png = image::encode_png(&stripes(8, 8).to_rgb8()).unwrap();
        assert!(colorizer.respond(&png).is_success());
    }

    #[test]
    fn test_process_writes_png() {
        let varmap = VarMap::new();
        let colorizer = small_colorizer(&varmap, true);

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.png");
        let output = dir.path().join("output.png");
        stripes(20, 12).save(&input).unwrap();

        colorizer.process(&input, &output).unwrap();

        let written = ::image::open(&output).unwrap();
        assert_eq!(written.width(), 20);
        assert_eq!(written.height(), 12);
    }

    #[test]
    fn test_colorizer_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Colorizer>();
    }
}

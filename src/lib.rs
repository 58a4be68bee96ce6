//! # colorizer
//!
//! Turn grayscale photographs into plausible color images.
//!
//! Input images are desaturated to luminance, resized to the model's fixed
//! resolution and run through a convolutional encoder, a self-attention
//! bottleneck over spatial positions and a convolutional decoder. The result
//! is resized back to the original geometry, optionally sharpened and
//! returned as PNG.
//!
//! ## Example
//!
//! ```no_run
//! use colorizer::{Colorizer, Config, WeightsSource};
//!
//! # fn main() -> colorizer::Result<()> {
//! let weights = WeightsSource::default();
//! let colorizer = Colorizer::load(&weights, Config::default())?;
//!
//! colorizer.process("grayscale.jpg", "colorized.png")?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod image;
pub mod model;
pub mod pipeline;

pub use error::{Error, ErrorKind, Phase, Result};
pub use model::{ColorizationModel, WeightsSource};
pub use pipeline::{Colorizer, Config, Response};

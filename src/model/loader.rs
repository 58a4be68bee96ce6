//! Model weight resolution, downloading and loading.

use std::convert::Infallible;
use std::fmt;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{Error, Result};

use super::ColorizationModel;

/// Default checkpoint location, relative to the working directory.
pub const DEFAULT_WEIGHTS: &str = "best_colorization_model.safetensors";

/// Filename used when a URL does not end in a usable path segment.
const FALLBACK_FILENAME: &str = "colorization_model.safetensors";

/// Where the model weights come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightsSource {
    /// A safetensors file on disk.
    Path(PathBuf),
    /// An `http(s)` URL, downloaded once into the [`ModelCache`].
    Url(String),
}

impl WeightsSource {
    /// Get a local path to the weights, downloading them if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be created or the download fails.
    pub fn resolve(&self) -> Result<PathBuf> {
        match self {
            Self::Path(path) => Ok(path.clone()),
            Self::Url(url) => ModelCache::new()?.get_weights_path(url),
        }
    }
}

impl Default for WeightsSource {
    fn default() -> Self {
        Self::Path(PathBuf::from(DEFAULT_WEIGHTS))
    }
}

impl FromStr for WeightsSource {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.starts_with("http://") || s.starts_with("https://") {
            Ok(Self::Url(s.to_string()))
        } else {
            Ok(Self::Path(PathBuf::from(s)))
        }
    }
}

impl fmt::Display for WeightsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// Manages the model cache directory and downloads.
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a new model cache.
    ///
    /// Uses the platform-appropriate cache directory:
    /// - Windows: `%LOCALAPPDATA%\colorizer\models`
    /// - Linux: `~/.cache/colorizer/models`
    /// - macOS: `~/Library/Caches/colorizer/models`
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created.
    pub fn new() -> Result<Self> {
        let base = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::with_dir(base.join("colorizer").join("models"))
    }

    /// Create a cache rooted at `cache_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn with_dir(cache_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&cache_dir).map_err(|source| Error::CacheDir {
            path: cache_dir.clone(),
            source,
        })?;

        Ok(Self { cache_dir })
    }

    /// Local path the weights at `url` are cached under.
    #[must_use]
    pub fn cached_path(&self, url: &str) -> PathBuf {
        self.cache_dir.join(filename_from_url(url))
    }

    /// Get the path to the weights at `url`, downloading if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the weights cannot be downloaded or accessed.
    pub fn get_weights_path(&self, url: &str) -> Result<PathBuf> {
        let path = self.cached_path(url);

        if !path.exists() {
            download_file(url, &path, &filename_from_url(url))?;
        }

        Ok(path)
    }
}

/// Load the colorization network from a safetensors checkpoint on the CPU.
///
/// # Errors
///
/// Returns [`Error::ModelLoad`] if the file is missing, unreadable, or
/// does not contain every tensor the network needs with the right shape.
pub fn load_model(path: &Path) -> Result<ColorizationModel> {
    tracing::info!("Attempting to load model from: {}", path.display());

    if !path.is_file() {
        return Err(Error::ModelLoad {
            path: path.to_path_buf(),
            reason: "model file not found".to_string(),
        });
    }

    let device = Device::Cpu;

    let data = fs::read(path).map_err(|source| Error::ModelLoad {
        path: path.to_path_buf(),
        reason: source.to_string(),
    })?;
    let vb = VarBuilder::from_buffered_safetensors(data, DType::F32, &device).map_err(|source| {
        Error::ModelLoad {
            path: path.to_path_buf(),
            reason: source.to_string(),
        }
    })?;

    let model = ColorizationModel::new(vb).map_err(|source| Error::ModelLoad {
        path: path.to_path_buf(),
        reason: source.to_string(),
    })?;

    tracing::info!("Model loaded successfully from {} on {device:?}", path.display());
    Ok(model)
}

/// Last non-empty path segment of a URL, without query or fragment.
fn filename_from_url(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').find(|segment| !segment.is_empty()))
        .filter(|segment| !segment.contains(':'))
        .map_or_else(|| FALLBACK_FILENAME.to_string(), str::to_string)
}

/// Download a file from a URL to a path with progress indication.
fn download_file(url: &str, path: &Path, name: &str) -> Result<()> {
    tracing::info!("Downloading {name} from {url}");

    let client = reqwest::blocking::Client::new();
    let response = client
        .get(url)
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .map_err(|source| Error::ModelDownload {
            name: name.to_string(),
            source,
        })?;

    let pb = match response.content_length() {
        Some(total_size) => ProgressBar::new(total_size),
        None => ProgressBar::new_spinner(),
    };
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(format!("Downloading {name}"));

    store_download(response, path, name, &pb)?;
    pb.finish_with_message(format!("Downloaded {name}"));

    Ok(())
}

/// Stream `reader` into `path` through a temporary file.
///
/// Any I/O failure is a [`Error::ModelFetch`] and leaves `path` untouched.
fn store_download<R: Read>(mut reader: R, path: &Path, name: &str, pb: &ProgressBar) -> Result<()> {
    let fetch_err = |source| Error::ModelFetch {
        name: name.to_string(),
        source,
    };

    // Write to a temporary file first, then rename for atomicity
    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path).map_err(fetch_err)?;

    let mut downloaded = 0u64;
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader.read(&mut buffer).map_err(fetch_err)?;
        if bytes_read == 0 {
            break;
        }
        file.write_all(&buffer[..bytes_read]).map_err(fetch_err)?;
        downloaded += bytes_read as u64;
        pb.set_position(downloaded);
    }

    file.flush().map_err(fetch_err)?;
    fs::rename(&temp_path, path).map_err(fetch_err)
}

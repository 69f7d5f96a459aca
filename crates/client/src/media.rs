//! Product photo materialization.
//!
//! Turns the image reference a picker hands back into bytes plus a content
//! type, ready for upload. Accepted references:
//!
//! - `file://` URIs
//! - plain filesystem paths
//! - `data:<mime>;base64,<payload>` URIs

use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use pocket_catalog_core::UserId;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";
const DEFAULT_EXTENSION: &str = "jpg";

/// Errors turning an image reference into bytes.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Unsupported image URI: {0}")]
    UnsupportedUri(String),

    #[error("Invalid data URI: {0}")]
    InvalidDataUri(String),

    #[error("Failed to read image {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Image is empty")]
    Empty,
}

/// Where the image bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    File(PathBuf),
    Inline { content_type: String, bytes: Vec<u8> },
}

impl ImageSource {
    /// Classify an image reference.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::UnsupportedUri` for remote or unknown schemes and
    /// `MediaError::InvalidDataUri` for a malformed `data:` URI.
    pub fn parse(uri: &str) -> Result<Self, MediaError> {
        let uri = uri.trim();

        if let Some(rest) = uri.strip_prefix("data:") {
            return parse_data_uri(rest);
        }

        if uri.starts_with("file:") {
            let url = Url::parse(uri).map_err(|_| MediaError::UnsupportedUri(uri.to_string()))?;
            let path = url
                .to_file_path()
                .map_err(|()| MediaError::UnsupportedUri(uri.to_string()))?;
            return Ok(Self::File(path));
        }

        // Anything else with a scheme (http, content, ph, ...) cannot be read locally.
        if Url::parse(uri).is_ok_and(|url| url.scheme().len() > 1) {
            return Err(MediaError::UnsupportedUri(uri.to_string()));
        }

        if uri.is_empty() {
            return Err(MediaError::UnsupportedUri(uri.to_string()));
        }

        Ok(Self::File(PathBuf::from(uri)))
    }
}

fn parse_data_uri(rest: &str) -> Result<ImageSource, MediaError> {
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| MediaError::InvalidDataUri("missing ',' separator".to_string()))?;

    let content_type = meta
        .strip_suffix(";base64")
        .ok_or_else(|| MediaError::InvalidDataUri("only base64 payloads are supported".to_string()))?;

    if !content_type.starts_with("image/") {
        return Err(MediaError::InvalidDataUri(format!(
            "not an image type: '{content_type}'"
        )));
    }

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| MediaError::InvalidDataUri(e.to_string()))?;

    Ok(ImageSource::Inline {
        content_type: content_type.to_string(),
        bytes,
    })
}

/// Image bytes ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub extension: String,
}

impl MaterializedImage {
    /// Object path for this image under `owner`'s prefix.
    #[must_use]
    pub fn object_path(&self, owner: &UserId) -> String {
        object_path(owner, &self.extension)
    }
}

/// Read the bytes behind an image reference.
///
/// # Errors
///
/// Returns `MediaError` if the reference cannot be parsed or read, or points
/// at zero bytes.
pub async fn materialize(uri: &str) -> Result<MaterializedImage, MediaError> {
    let image = match ImageSource::parse(uri)? {
        ImageSource::File(path) => {
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|source| MediaError::Read {
                    path: path.clone(),
                    source,
                })?;
            let extension = extension_of(&path);
            MaterializedImage {
                bytes,
                content_type: content_type_for_extension(&extension).to_string(),
                extension,
            }
        }
        ImageSource::Inline {
            content_type,
            bytes,
        } => MaterializedImage {
            bytes,
            extension: extension_for_content_type(&content_type).to_string(),
            content_type,
        },
    };

    if image.bytes.is_empty() {
        return Err(MediaError::Empty);
    }

    tracing::debug!(
        size = image.bytes.len(),
        content_type = %image.content_type,
        "Image materialized"
    );
    Ok(image)
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or_else(|| DEFAULT_EXTENSION.to_string(), str::to_ascii_lowercase)
}

/// MIME type for a file extension; unknown extensions are treated as JPEG.
#[must_use]
pub fn content_type_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        "heif" => "image/heif",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

/// File extension for an image MIME type.
#[must_use]
pub fn extension_for_content_type(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/heic" => "heic",
        "image/heif" => "heif",
        _ => DEFAULT_EXTENSION,
    }
}

/// Fresh object path: `{owner}/{uuid}.{ext}`.
#[must_use]
pub fn object_path(owner: &UserId, extension: &str) -> String {
    format!("{owner}/{}.{extension}", Uuid::new_v4())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_uri_and_plain_path() {
        assert_eq!(
            ImageSource::parse("file:///tmp/x.jpg").unwrap(),
            ImageSource::File(PathBuf::from("/tmp/x.jpg"))
        );
        assert_eq!(
            ImageSource::parse("/var/mobile/photo.PNG").unwrap(),
            ImageSource::File(PathBuf::from("/var/mobile/photo.PNG"))
        );
    }

    #[test]
    fn test_parse_rejects_remote_schemes() {
        assert!(matches!(
            ImageSource::parse("https://cdn.test/x.jpg"),
            Err(MediaError::UnsupportedUri(_))
        ));
        assert!(matches!(
            ImageSource::parse("  "),
            Err(MediaError::UnsupportedUri(_))
        ));
    }

    #[test]
    fn test_parse_data_uri() {
        let source = ImageSource::parse("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(
            source,
            ImageSource::Inline {
                content_type: "image/png".to_string(),
                bytes: b"hello".to_vec(),
            }
        );

        assert!(matches!(
            ImageSource::parse("data:text/plain;base64,aGVsbG8="),
            Err(MediaError::InvalidDataUri(_))
        ));
        assert!(matches!(
            ImageSource::parse("data:image/png,raw"),
            Err(MediaError::InvalidDataUri(_))
        ));
        assert!(matches!(
            ImageSource::parse("data:image/png;base64,@@@"),
            Err(MediaError::InvalidDataUri(_))
        ));
    }

    #[test]
    fn test_content_type_mapping() {
        assert_eq!(content_type_for_extension("JPG"), "image/jpeg");
        assert_eq!(content_type_for_extension("heic"), "image/heic");
        assert_eq!(content_type_for_extension("bmp"), "image/jpeg");
        assert_eq!(extension_for_content_type("image/webp"), "webp");
        assert_eq!(extension_for_content_type("image/jpeg"), "jpg");
    }

    #[test]
    fn test_object_path_is_owner_prefixed() {
        let owner = UserId::new("u1");
        let first = object_path(&owner, "png");
        let second = object_path(&owner, "png");
        assert!(first.starts_with("u1/"));
        assert!(first.ends_with(".png"));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_materialize_file() {
        let path = std::env::temp_dir().join(format!("pc-media-{}.png", Uuid::new_v4()));
        tokio::fs::write(&path, b"\x89PNG").await.unwrap();

        let image = materialize(path.to_str().unwrap()).await.unwrap();
        assert_eq!(image.bytes, b"\x89PNG");
        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.extension, "png");

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_materialize_missing_and_empty() {
        let missing = std::env::temp_dir().join(format!("pc-missing-{}.jpg", Uuid::new_v4()));
        assert!(matches!(
            materialize(missing.to_str().unwrap()).await,
            Err(MediaError::Read { .. })
        ));

        assert!(matches!(
            materialize("data:image/jpeg;base64,").await,
            Err(MediaError::Empty)
        ));
    }
}

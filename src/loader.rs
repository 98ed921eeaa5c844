use std::future::Future;
use std::path::Path;
use std::time::Duration;

use reqwest::{StatusCode, Url};
use tracing::debug;

use crate::error::LoadError;
use crate::manifest::Manifest;

/// An image that finished downloading and decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadedImage {
    pub url: Url,
    pub width: u32,
    pub height: u32,
}

/// Fetches manifests and preloads slide images for a panel.
pub trait ResourceLoader: Send + Sync + 'static {
    fn fetch_manifest(
        &self,
        source: &Url,
    ) -> impl Future<Output = Result<Manifest, LoadError>> + Send;

    fn preload(
        &self,
        url: &Url,
    ) -> impl Future<Output = Result<PreloadedImage, LoadError>> + Send;
}

/// Resolves a manifest source given as an absolute URL or a filesystem path.
pub fn resolve_source(raw: &str) -> Result<Url, LoadError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(LoadError::InvalidUrl(raw.to_owned()));
    }
    match Url::parse(raw) {
        Ok(url) if url.scheme().len() > 1 => Ok(url),
        // Anything without a scheme, or a Windows drive letter, is a path.
        _ => {
            let absolute = std::path::absolute(Path::new(raw))?;
            Url::from_file_path(&absolute).map_err(|()| LoadError::InvalidUrl(raw.to_owned()))
        }
    }
}

/// Resolves an image reference (`master_path + src`) against the manifest
/// source it came from.
pub fn resolve_image(base: &Url, reference: &str) -> Result<Url, LoadError> {
    base.join(reference)
        .map_err(|err| LoadError::InvalidUrl(format!("{reference}: {err}")))
}

/// Default loader: http(s) through `reqwest`, `file://` from disk, images
/// decoded with the `image` crate.
#[derive(Debug, Clone)]
pub struct MediaLoader {
    client: reqwest::Client,
}

impl MediaLoader {
    pub fn new(timeout: Duration) -> Result<Self, LoadError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn read(&self, url: &Url) -> Result<Vec<u8>, LoadError> {
        match url.scheme() {
            "http" | "https" => {
                let response = self.client.get(url.clone()).send().await?;
                let status = response.status();
                if status != StatusCode::OK {
                    return Err(LoadError::Status {
                        url: url.to_string(),
                        status,
                    });
                }
                Ok(response.bytes().await?.to_vec())
            }
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|()| LoadError::InvalidUrl(url.to_string()))?;
                Ok(tokio::fs::read(path).await?)
            }
            other => Err(LoadError::UnsupportedScheme(other.to_owned())),
        }
    }
}

impl ResourceLoader for MediaLoader {
    async fn fetch_manifest(&self, source: &Url) -> Result<Manifest, LoadError> {
        let body = self.read(source).await?;
        debug!(url = %source, bytes = body.len(), "manifest fetched");
        Ok(Manifest::from_json(&body)?)
    }

    async fn preload(&self, url: &Url) -> Result<PreloadedImage, LoadError> {
        let bytes = self.read(url).await?;
        // Decoding proves the pixel data is usable before the fade starts.
        let (width, height) = tokio::task::spawn_blocking(move || {
            image::load_from_memory(&bytes).map(|img| (img.width(), img.height()))
        })
        .await??;
        debug!(url = %url, width, height, "image preloaded");
        Ok(PreloadedImage {
            url: url.clone(),
            width,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_accept_urls_and_paths() {
        let url = resolve_source("https://example.org/show/manifest.json").unwrap();
        assert_eq!(url.scheme(), "https");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let url = resolve_source(path.to_str().unwrap()).unwrap();
        assert_eq!(url.scheme(), "file");
        assert_eq!(url.to_file_path().unwrap(), path);

        assert!(resolve_source("   ").is_err());
    }

    #[test]
    fn images_resolve_against_manifest() {
        let base = Url::parse("https://example.org/show/manifest.json").unwrap();
        assert_eq!(
            resolve_image(&base, "/img/a.jpg").unwrap().as_str(),
            "https://example.org/img/a.jpg"
        );
        assert_eq!(
            resolve_image(&base, "photos/b.jpg").unwrap().as_str(),
            "https://example.org/show/photos/b.jpg"
        );
        assert_eq!(
            resolve_image(&base, "https://cdn.example.net/c.jpg")
                .unwrap()
                .as_str(),
            "https://cdn.example.net/c.jpg"
        );
    }

    #[tokio::test]
    async fn file_preload_decodes_and_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        image::RgbaImage::new(3, 2).save(&good).unwrap();
        let bad = dir.path().join("bad.png");
        std::fs::write(&bad, b"definitely not a png").unwrap();

        let loader = MediaLoader::new(Duration::from_secs(5)).unwrap();
        let ok = loader
            .preload(&Url::from_file_path(&good).unwrap())
            .await
            .unwrap();
        assert_eq!((ok.width, ok.height), (3, 2));

        let err = loader
            .preload(&Url::from_file_path(&bad).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Decode(_)), "{err:?}");

        let missing = loader
            .preload(&Url::from_file_path(dir.path().join("missing.png")).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(missing, LoadError::Io(_)), "{missing:?}");
    }

    #[tokio::test]
    async fn file_manifest_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(
            &path,
            br#"{"slides":[{"src":"a.png"}],"masterPath":"img/"}"#,
        )
        .unwrap();

        let loader = MediaLoader::new(Duration::from_secs(5)).unwrap();
        let manifest = loader
            .fetch_manifest(&Url::from_file_path(&path).unwrap())
            .await
            .unwrap();
        assert!(matches!(manifest, Manifest::Envelope(ref env) if env.slides.len() == 1));

        std::fs::write(&path, b"[").unwrap();
        let err = loader
            .fetch_manifest(&Url::from_file_path(&path).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Manifest(_)));
    }

    #[tokio::test]
    async fn unknown_scheme_is_rejected() {
        let loader = MediaLoader::new(Duration::from_secs(5)).unwrap();
        let err = loader
            .preload(&Url::parse("ftp://example.org/a.jpg").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedScheme(ref s) if s == "ftp"));
    }
}

use std::path::{Path, PathBuf};

use reqwest::Url;

use crate::error::RecognitionError;
use crate::model::{LayersModel, ModelJson};

const MODEL_DIR: &str = "digits_recognition";
const MODEL_FILENAME: &str = "model.json";
const SOURCE_FILENAME: &str = "source.url";

/// Where the model is read from, derived from the configured models base.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    /// URL of `model.json`; shards are fetched relative to it.
    Remote(Url),
    /// Directory holding `model.json` and its shards.
    Local(PathBuf),
}

impl ModelSource {
    pub fn from_base(base: &str) -> Result<Self, RecognitionError> {
        let base = base.trim().trim_end_matches('/');
        if base.starts_with("http://") || base.starts_with("https://") {
            let url = format!("{base}/{MODEL_DIR}/{MODEL_FILENAME}");
            Url::parse(&url)
                .map(ModelSource::Remote)
                .map_err(|e| RecognitionError::ModelLoad(format!("invalid model URL {url}: {e}")))
        } else {
            let dir = base.strip_prefix("file://").unwrap_or(base);
            Ok(ModelSource::Local(PathBuf::from(dir).join(MODEL_DIR)))
        }
    }
}

impl std::fmt::Display for ModelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelSource::Remote(url) => write!(f, "{url}"),
            ModelSource::Local(dir) => write!(f, "{}", dir.join(MODEL_FILENAME).display()),
        }
    }
}

/// Directory for downloaded models: ~/.local/share/digits-recognition/models/digits_recognition/
pub fn cache_dir() -> PathBuf {
    let mut p = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    p.push("digits-recognition");
    p.push("models");
    p.push(MODEL_DIR);
    p
}

/// `model.json` is written last, so its presence means the download finished.
/// The cache only counts when it was fetched from `url`.
pub fn cached_model_exists(url: &Url) -> bool {
    cached_model_in(&cache_dir(), url)
}

fn cached_model_in(dir: &Path, url: &Url) -> bool {
    if !dir.join(MODEL_FILENAME).exists() {
        return false;
    }
    match std::fs::read_to_string(dir.join(SOURCE_FILENAME)) {
        Ok(source) if source.trim() == url.as_str() => true,
        Ok(source) => {
            log::info!("Cached model came from {}, configured source is {url}", source.trim());
            false
        }
        Err(_) => false,
    }
}

/// Drop the cached download so the next load fetches it again. Local
/// sources are never touched.
pub fn discard_cache(source: &ModelSource) -> std::io::Result<()> {
    discard_cache_in(source, &cache_dir())
}

fn discard_cache_in(source: &ModelSource, dir: &Path) -> std::io::Result<()> {
    if let ModelSource::Local(_) = source {
        return Ok(());
    }
    match std::fs::remove_dir_all(dir) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Download `model.json` and its weight shards into the cache directory.
/// `on_progress(bytes_downloaded, bytes_expected)` fires for every chunk of
/// weight data; the expected total comes from the manifest.
pub async fn download_model<F>(url: &Url, on_progress: F) -> Result<(), RecognitionError>
where
    F: Fn(u64, u64) + Send + 'static,
{
    download_model_to(url, &cache_dir(), on_progress).await
}

async fn download_model_to<F>(url: &Url, dest: &Path, on_progress: F) -> Result<(), RecognitionError>
where
    F: Fn(u64, u64) + Send + 'static,
{
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;

    let client = reqwest::Client::new();

    log::info!("Fetching {url}");
    let manifest_bytes = client
        .get(url.clone())
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    let manifest = ModelJson::parse(&manifest_bytes)?;

    tokio::fs::create_dir_all(dest).await?;
    let manifest_path = dest.join(MODEL_FILENAME);
    if tokio::fs::try_exists(&manifest_path).await? {
        tokio::fs::remove_file(&manifest_path).await?;
    }

    let total = manifest.expected_weight_bytes();
    let mut downloaded: u64 = 0;

    for shard in manifest.shard_paths() {
        let shard_url = url
            .join(shard)
            .map_err(|e| RecognitionError::ModelLoad(format!("invalid shard path {shard}: {e}")))?;
        let target = dest.join(shard);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = client.get(shard_url).send().await?.error_for_status()?;
        let mut file = tokio::fs::File::create(&target).await?;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            on_progress(downloaded, total);
        }

        file.flush().await?;
    }

    tokio::fs::write(dest.join(SOURCE_FILENAME), url.as_str()).await?;
    tokio::fs::write(&manifest_path, &manifest_bytes).await?;
    log::info!("Model downloaded to {}", dest.display());
    Ok(())
}

/// Load and build the model from a directory. CPU-bound; call from a blocking context.
pub fn load_model(dir: &Path) -> Result<LayersModel, RecognitionError> {
    let manifest_path = dir.join(MODEL_FILENAME);
    let bytes = read_file(&manifest_path)?;
    let manifest = ModelJson::parse(&bytes)?;

    let mut group_data = Vec::with_capacity(manifest.weights_manifest.len());
    for group in &manifest.weights_manifest {
        let mut data = Vec::new();
        for shard in &group.paths {
            data.extend(read_file(&dir.join(shard))?);
        }
        group_data.push(data);
    }

    let model = LayersModel::from_artifacts(&manifest, &group_data)?;
    log::info!(
        "Model {} loaded from {} (format {}, generated by {}, converted by {})",
        model.name().unwrap_or("<unnamed>"),
        dir.display(),
        manifest.format.as_deref().unwrap_or("unknown"),
        manifest.generated_by.as_deref().unwrap_or("unknown"),
        manifest.converted_by.as_deref().unwrap_or("unknown")
    );
    Ok(model)
}

fn read_file(path: &Path) -> Result<Vec<u8>, RecognitionError> {
    std::fs::read(path).map_err(|e| RecognitionError::ModelLoad(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InputShape, Model};
    use crate::pipeline;

    /// A 28x28 -> 10 network whose bias alone decides the answer.
    fn write_biased_model(dir: &Path, winner: usize) {
        let json = r#"{
            "format": "layers-model",
            "convertedBy": "TensorFlow.js Converter v2.7.0",
            "modelTopology": {
                "class_name": "Sequential",
                "config": {
                    "name": "digits",
                    "layers": [
                        {"class_name": "InputLayer", "config": {"name": "input", "batch_input_shape": [null, 28, 28]}},
                        {"class_name": "Flatten", "config": {"name": "flatten"}},
                        {"class_name": "Dense", "config": {"name": "dense", "units": 10, "activation": "softmax"}}
                    ]
                }
            },
            "weightsManifest": [{
                "paths": ["group1-shard1of2.bin", "group1-shard2of2.bin"],
                "weights": [
                    {"name": "dense/kernel", "shape": [784, 10], "dtype": "float32"},
                    {"name": "dense/bias", "shape": [10], "dtype": "float32"}
                ]
            }]
        }"#;
        std::fs::write(dir.join(MODEL_FILENAME), json).unwrap();

        let mut bias = [0.0f32; 10];
        bias[winner] = 5.0;
        let mut weights: Vec<u8> = vec![0; 784 * 10 * 4];
        weights.extend(bias.iter().flat_map(|v| v.to_le_bytes()));

        // Split across two shards at an arbitrary byte offset.
        let (a, b) = weights.split_at(1000);
        std::fs::write(dir.join("group1-shard1of2.bin"), a).unwrap();
        std::fs::write(dir.join("group1-shard2of2.bin"), b).unwrap();
    }

    #[test]
    fn loads_model_from_directory_and_predicts() {
        let dir = tempfile::tempdir().unwrap();
        write_biased_model(dir.path(), 3);

        let model = load_model(dir.path()).unwrap();
        assert_eq!(model.name(), Some("digits"));
        assert_eq!(model.input_shape(), InputShape { height: 28, width: 28 });

        let image = pipeline::tests::vertical_stroke(200);
        assert_eq!(pipeline::predict(&image, &model).unwrap(), 3);
    }

    #[test]
    fn missing_shard_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        write_biased_model(dir.path(), 0);
        std::fs::remove_file(dir.path().join("group1-shard2of2.bin")).unwrap();

        let err = load_model(dir.path()).unwrap_err();
        assert!(matches!(err, RecognitionError::ModelLoad(_)));
        assert!(err.to_string().contains("group1-shard2of2.bin"));
    }

    #[test]
    fn missing_manifest_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_model(dir.path()),
            Err(RecognitionError::ModelLoad(_))
        ));
    }

    #[test]
    fn cache_is_tied_to_its_source_url() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::parse("https://example.com/models/digits_recognition/model.json").unwrap();
        let other = Url::parse("https://mirror.example.org/digits_recognition/model.json").unwrap();

        write_biased_model(dir.path(), 1);
        // Caches without a recorded source are never trusted.
        assert!(!cached_model_in(dir.path(), &url));

        std::fs::write(dir.path().join(SOURCE_FILENAME), url.as_str()).unwrap();
        assert!(cached_model_in(dir.path(), &url));
        assert!(!cached_model_in(dir.path(), &other));
    }

    #[test]
    fn discarding_cache_skips_local_sources() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache");
        std::fs::create_dir(&cache).unwrap();
        write_biased_model(&cache, 0);

        let local = ModelSource::Local(cache.clone());
        discard_cache_in(&local, &cache).unwrap();
        assert!(cache.join(MODEL_FILENAME).exists());

        let remote = ModelSource::from_base("https://example.com/models").unwrap();
        discard_cache_in(&remote, &cache).unwrap();
        assert!(!cache.exists());
        // Already gone is fine.
        discard_cache_in(&remote, &cache).unwrap();
    }

    #[test]
    fn source_from_base() {
        let remote = ModelSource::from_base("https://example.com/models/").unwrap();
        assert_eq!(
            remote,
            ModelSource::Remote(
                Url::parse("https://example.com/models/digits_recognition/model.json").unwrap()
            )
        );
        if let ModelSource::Remote(url) = remote {
            assert_eq!(
                url.join("group1-shard1of1.bin").unwrap().as_str(),
                "https://example.com/models/digits_recognition/group1-shard1of1.bin"
            );
        }

        assert_eq!(
            ModelSource::from_base("file:///opt/models").unwrap(),
            ModelSource::Local(PathBuf::from("/opt/models/digits_recognition"))
        );
        assert_eq!(
            ModelSource::from_base("./models").unwrap(),
            ModelSource::Local(PathBuf::from("./models/digits_recognition"))
        );
    }
}

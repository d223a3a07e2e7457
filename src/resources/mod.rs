use std::path::{Path, PathBuf};

use anyhow::{Context, bail};

/**
 * This module contains all logic for loading glTF assets from external files.
 */
pub mod animation;
pub mod io;

/// A parsed glTF document together with its resolved buffers.
pub struct GltfAsset {
    /// File name without directories, used in reports.
    pub name: String,
    pub path: PathBuf,
    pub document: gltf::Document,
    pub buffers: Vec<gltf::buffer::Data>,
}

impl GltfAsset {
    /// Buffer lookup in the shape `gltf`'s accessor readers expect.
    pub fn buffer(&self, buffer: gltf::Buffer<'_>) -> Option<&[u8]> {
        self.buffers.get(buffer.index()).map(|data| data.0.as_slice())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/**
 * Parses `.gltf` or `.glb` bytes and checks the document.
 *
 * Extensions listed in `extensionsRequired` that `gltf` cannot interpret
 * are accepted: the inspector only reads structure (meshes, skins, clips,
 * nodes), which those extensions do not change. Every other validation
 * error still rejects the asset.
 */
fn parse_document(bytes: &[u8], name: &str) -> anyhow::Result<(gltf::Document, Option<Vec<u8>>)> {
    use gltf::json::validation::{Error, Validate};

    let gltf::Gltf { document, blob } = gltf::Gltf::from_slice_without_validation(bytes)
        .with_context(|| format!("failed to parse glTF: {name}"))?;
    let root = document.into_json();
    let mut errors = Vec::new();
    root.validate(&root, gltf::json::Path::new, &mut |path, error| {
        let path = path();
        if error == Error::Unsupported && path.as_str().starts_with("extensionsRequired") {
            log::debug!("{name}: ignoring unsupported required extension {path}");
            return;
        }
        errors.push(format!("{path}: {error}"));
    });
    if !errors.is_empty() {
        bail!("failed to parse glTF: {name}: invalid glTF: {}", errors.join(", "));
    }
    Ok((gltf::Document::from_json_without_validation(root), blob))
}

/**
 * Loads a `.gltf` or `.glb` file.
 *
 * The file itself is read asynchronously. Buffers referenced by URI are
 * resolved relative to the file's directory on the blocking pool, data URIs
 * are decoded and the GLB binary chunk is used for `Source::Bin` buffers.
 */
pub async fn load_asset(path: impl AsRef<Path>) -> anyhow::Result<GltfAsset> {
    let path = path.as_ref();
    let bytes = io::load_binary(path).await?;
    let (document, blob) = parse_document(&bytes, &path.display().to_string())?;
    let base = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();
    let (document, buffers) = tokio::task::spawn_blocking(move || {
        let buffers = gltf::import_buffers(&document, Some(&base), blob);
        (document, buffers)
    })
    .await
    .with_context(|| format!("buffer import of {} did not finish", path.display()))?;
    let buffers =
        buffers.with_context(|| format!("failed to load buffers of {}", path.display()))?;
    log::debug!(
        "loaded {} ({} bytes, {} buffers)",
        path.display(),
        bytes.len(),
        buffers.len()
    );
    Ok(GltfAsset {
        name: file_name(path),
        path: path.to_path_buf(),
        document,
        buffers,
    })
}

/// Parses an asset that is already in memory. Only embedded buffers can be resolved.
pub fn load_asset_from_slice(name: &str, bytes: &[u8]) -> anyhow::Result<GltfAsset> {
    let (document, blob) = parse_document(bytes, name)?;
    let buffers = gltf::import_buffers(&document, None, blob)
        .with_context(|| format!("failed to load buffers of {name}"))?;
    Ok(GltfAsset {
        name: file_name(Path::new(name)),
        path: PathBuf::from(name),
        document,
        buffers,
    })
}

//! Reference gallery: a directory of identities, each a folder of face images.
//!
//! ```text
//! train/
//!   alice/1.jpg
//!   alice/2.jpg
//!   bob/portrait.png
//! ```
//!
//! Every image is embedded once when indexed. The directory is fingerprinted
//! (path, size and modification time of every image) and re-indexed when it
//! changes,
//! so the reference set can be edited while the monitor runs.

use crate::alignment;
use crate::detector::DetectorError;
use crate::recognizer::{Embedder, RecognizerError};
use crate::types::{Embedding, FaceLocator, IdentityMatcher, MatchResult};
use image::RgbImage;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];
const EMBED_CHUNK: usize = 16;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("reference directory not found: {0}")]
    NotFound(PathBuf),
    #[error("no usable reference images under {0}")]
    Empty(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("recognizer returned {got} embeddings for {expected} crops")]
    EmbeddingCount { expected: usize, got: usize },
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// One reference image found on disk.
#[derive(Debug, Clone)]
pub struct ReferenceImage {
    pub identity: String,
    pub path: PathBuf,
    /// `<reference-dir-name>/<identity>/<file>`, the form match results carry.
    pub identity_path: String,
}

/// One embedded reference image.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub identity: String,
    pub identity_path: String,
    pub embedding: Embedding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FileStamp {
    path: PathBuf,
    len: u64,
    modified: Option<SystemTime>,
}

/// Per-image stamps in scan order; any added, removed, resized or touched
/// image changes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Fingerprint {
    files: Vec<FileStamp>,
}

impl Fingerprint {
    fn observe(&mut self, path: &Path) {
        let metadata = std::fs::metadata(path).ok();
        self.files.push(FileStamp {
            path: path.to_path_buf(),
            len: metadata.as_ref().map_or(0, |m| m.len()),
            modified: metadata.and_then(|m| m.modified().ok()),
        });
    }
}

/// List reference images under `root`, sorted by identity then file name.
pub fn scan(root: &Path) -> Result<Vec<ReferenceImage>, GalleryError> {
    scan_with_fingerprint(root).map(|(images, _)| images)
}

fn scan_with_fingerprint(root: &Path) -> Result<(Vec<ReferenceImage>, Fingerprint), GalleryError> {
    if !root.is_dir() {
        return Err(GalleryError::NotFound(root.to_path_buf()));
    }

    let root_label = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.to_string_lossy().trim_end_matches('/').to_string());

    let mut fingerprint = Fingerprint::default();

    let mut images = Vec::new();
    for identity_dir in sorted_entries(root)? {
        if !identity_dir.is_dir() {
            continue;
        }
        let Some(identity) = identity_dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };

        for path in sorted_entries(&identity_dir)? {
            if !path.is_file() || !has_image_extension(&path) {
                continue;
            }
            fingerprint.observe(&path);

            let file = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            images.push(ReferenceImage {
                identity_path: format!("{root_label}/{identity}/{file}"),
                identity: identity.clone(),
                path,
            });
        }
    }

    Ok((images, fingerprint))
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, GalleryError> {
    let io_err = |source| GalleryError::Io { path: dir.to_path_buf(), source };
    let mut paths = std::fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    paths.sort();
    Ok(paths)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|known| e.eq_ignore_ascii_case(known)))
}

/// Embedded reference set.
#[derive(Debug)]
pub struct Gallery {
    root: PathBuf,
    entries: Vec<GalleryEntry>,
    fingerprint: Fingerprint,
}

impl Gallery {
    /// Scan `root` and embed every reference image.
    ///
    /// Each image contributes its most confident detected face, or the whole
    /// image when no face is found. Images that fail to decode are skipped.
    pub fn index<L, E>(root: &Path, locator: &mut L, embedder: &mut E) -> Result<Self, GalleryError>
    where
        L: FaceLocator + ?Sized,
        E: Embedder + ?Sized,
    {
        let (images, fingerprint) = scan_with_fingerprint(root)?;

        let mut refs = Vec::with_capacity(images.len());
        let mut crops = Vec::with_capacity(images.len());
        for reference in images {
            let image = match image::open(&reference.path) {
                Ok(img) => img.to_rgb8(),
                Err(e) => {
                    tracing::warn!(
                        path = %reference.path.display(),
                        error = %e,
                        "skipping unreadable reference image"
                    );
                    continue;
                }
            };
            crops.push(reference_crop(&image, locator)?);
            refs.push(reference);
        }

        let mut entries = Vec::with_capacity(refs.len());
        for (chunk_refs, chunk_crops) in refs.chunks(EMBED_CHUNK).zip(crops.chunks(EMBED_CHUNK)) {
            let embeddings = embedder.embed_batch(chunk_crops)?;
            if embeddings.len() != chunk_crops.len() {
                return Err(GalleryError::EmbeddingCount {
                    expected: chunk_crops.len(),
                    got: embeddings.len(),
                });
            }
            entries.extend(chunk_refs.iter().zip(embeddings).map(|(r, embedding)| GalleryEntry {
                identity: r.identity.clone(),
                identity_path: r.identity_path.clone(),
                embedding,
            }));
        }

        if entries.is_empty() {
            return Err(GalleryError::Empty(root.to_path_buf()));
        }

        let gallery = Self { root: root.to_path_buf(), entries, fingerprint };
        tracing::info!(
            root = %root.display(),
            references = gallery.len(),
            identities = gallery.identities().len(),
            "indexed reference gallery"
        );
        Ok(gallery)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    /// Reference image count per identity, sorted by name.
    pub fn identities(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.identity.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Closest reference by cosine distance. Ties keep the first entry.
    pub fn best_match(&self, probe: &Embedding) -> Option<MatchResult> {
        let mut best: Option<(&GalleryEntry, f32)> = None;
        for entry in &self.entries {
            let distance = probe.cosine_distance(&entry.embedding);
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((entry, distance));
            }
        }
        best.map(|(entry, distance)| MatchResult {
            identity_path: entry.identity_path.clone(),
            distance,
        })
    }
}

fn reference_crop<L>(image: &RgbImage, locator: &mut L) -> Result<RgbImage, GalleryError>
where
    L: FaceLocator + ?Sized,
{
    let face = locator.locate(image)?.into_iter().next();
    Ok(match face {
        Some(face) => face.crop,
        None => alignment::whole_image(image),
    })
}

/// [`IdentityMatcher`] backed by a reference gallery.
///
/// Owns its own locator for indexing reference images, separate from the one
/// the monitor loop uses on camera frames.
pub struct GalleryMatcher<L, E> {
    locator: L,
    embedder: E,
    gallery: Gallery,
}

impl<L: FaceLocator, E: Embedder> GalleryMatcher<L, E> {
    /// Index `root` and build the matcher.
    pub fn new(root: &Path, mut locator: L, mut embedder: E) -> Result<Self, GalleryError> {
        let gallery = Gallery::index(root, &mut locator, &mut embedder)?;
        Ok(Self { locator, embedder, gallery })
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    /// Re-index when the reference directory changed since the last index.
    ///
    /// A failed re-index keeps the previous entries and is not retried until
    /// the directory changes again.
    fn refresh(&mut self) {
        let root = self.gallery.root.clone();
        let current = match scan_with_fingerprint(&root) {
            Ok((_, fingerprint)) => fingerprint,
            Err(e) => {
                tracing::warn!(error = %e, "reference directory scan failed; keeping current gallery");
                return;
            }
        };
        if current == self.gallery.fingerprint {
            return;
        }

        tracing::info!(root = %root.display(), "reference directory changed, re-indexing");
        match Gallery::index(&root, &mut self.locator, &mut self.embedder) {
            Ok(gallery) => self.gallery = gallery,
            Err(e) => {
                tracing::warn!(error = %e, "re-index failed; keeping previous gallery");
                self.gallery.fingerprint = current;
            }
        }
    }
}

impl<L: FaceLocator, E: Embedder> IdentityMatcher for GalleryMatcher<L, E> {
    fn match_faces(&mut self, crops: &[RgbImage]) -> Result<Vec<MatchResult>, GalleryError> {
        self.refresh();

        let embeddings = self.embedder.embed_batch(crops)?;
        if embeddings.len() != crops.len() {
            return Err(GalleryError::EmbeddingCount {
                expected: crops.len(),
                got: embeddings.len(),
            });
        }

        embeddings
            .iter()
            .map(|e| {
                self.gallery
                    .best_match(e)
                    .ok_or_else(|| GalleryError::Empty(self.gallery.root.clone()))
            })
            .collect()
    }
}

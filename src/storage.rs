//
// storage.rs
// Dicom-Redact-rs
//
// Artifact sink contract and the local directory sink with path sanitization.
//
// Thales Matheus Mendonça Santos - November 2025

use std::borrow::Cow;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::warn;

/// A finished slice, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// `{series}/{instance filename}`.
    pub relative_path: String,
    pub bytes: Vec<u8>,
}

/// Downstream persistence (local disk, object storage...). Blocking; no retry.
pub trait ArtifactSink: Sync {
    fn emit(&self, artifact: &Artifact) -> Result<()>;
}

/// Writes artifacts under `{root}/{folder}/`.
#[derive(Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl AsRef<Path>, folder: Option<&str>) -> Result<Self> {
        let mut root = root.as_ref().to_path_buf();
        if let Some(folder) = folder.map(checked_segment).filter(|f| !f.is_empty()) {
            root.push(folder.as_ref());
        }
        // Create the output directory eagerly so the first emit does not fail on a missing parent.
        fs::create_dir_all(&root).context("Failed to create output directory")?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Destination of a relative artifact path, rejecting anything that escapes the root.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for segment in relative.split('/') {
            let clean = checked_segment(segment);
            if clean.is_empty() {
                continue;
            }
            match Path::new(clean.as_ref()).components().next() {
                Some(Component::Normal(_)) => path.push(clean.as_ref()),
                _ => bail!("Invalid path segment {:?} in {:?}", segment, relative),
            }
        }
        if path == self.root {
            bail!("Empty artifact path");
        }
        Ok(path)
    }
}

impl ArtifactSink for DirectorySink {
    fn emit(&self, artifact: &Artifact) -> Result<()> {
        let path = self.resolve(&artifact.relative_path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        fs::write(&path, &artifact.bytes)
            .with_context(|| format!("Failed to persist artifact {:?}", path))?;
        Ok(())
    }
}

fn sanitize_segment(input: &str) -> Cow<'_, str> {
    // Keep ASCII word characters and a few safe separators; DICOM UIDs keep their dots.
    let keep = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '^');
    if input.chars().all(|c| c == '.') {
        // Segments made only of dots would walk the tree.
        return Cow::Owned(String::new());
    }
    if input.chars().all(keep) {
        return Cow::Borrowed(input);
    }
    let cleaned: String = input.chars().filter(|&c| keep(c)).collect();
    if cleaned.chars().all(|c| c == '.') {
        Cow::Owned(String::new())
    } else {
        Cow::Owned(cleaned)
    }
}

/// Sanitized segment. Alterations are logged: distinct titles can collapse onto one directory.
fn checked_segment(input: &str) -> Cow<'_, str> {
    let clean = sanitize_segment(input);
    if let Cow::Owned(ref altered) = clean {
        if !input.is_empty() {
            warn!(segment = input, written_as = %altered, "output path segment altered");
        }
    }
    clean
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sanitize_strips_dangerous_characters() {
        assert_eq!(sanitize_segment("weird name 123.dcm"), "weirdname123.dcm");
        assert_eq!(sanitize_segment(".."), "");
        assert_eq!(sanitize_segment("1.2.840.113619.dcm"), "1.2.840.113619.dcm");
    }

    #[test]
    fn only_altered_segments_are_rewritten() {
        assert!(matches!(sanitize_segment("CT-HEAD_01"), Cow::Borrowed("CT-HEAD_01")));
        assert!(matches!(sanitize_segment("1.2.3.dcm"), Cow::Borrowed(_)));

        // Distinct titles that differ only in dropped characters land on the same directory.
        let spaced = sanitize_segment("CT HEAD");
        assert!(matches!(spaced, Cow::Owned(_)));
        assert_eq!(spaced, sanitize_segment("CT:HEAD"));
        assert_eq!(checked_segment("CT HEAD"), "CTHEAD");
        assert!(matches!(sanitize_segment(".."), Cow::Owned(ref s) if s.is_empty()));
    }

    #[test]
    fn resolve_stays_inside_root() {
        let root = tempdir().expect("tmpdir");
        let sink = DirectorySink::new(root.path(), Some("Pixel-redaction-complete")).expect("sink");

        let resolved = sink.resolve("../../etc/1.2.3.dcm").expect("resolve");
        assert!(resolved.starts_with(sink.root()));
        assert_eq!(resolved, sink.root().join("etc").join("1.2.3.dcm"));
        assert!(sink.resolve("../..").is_err());
    }

    #[test]
    fn emit_writes_under_folder_and_series() {
        let root = tempdir().expect("tmpdir");
        let sink = DirectorySink::new(root.path(), Some("redacted")).expect("sink");
        sink.emit(&Artifact {
            relative_path: "CT-HEAD/1.2.3.dcm".to_string(),
            bytes: b"abc".to_vec(),
        })
        .expect("emit");

        let written = fs::read(root.path().join("redacted/CT-HEAD/1.2.3.dcm")).expect("read back");
        assert_eq!(written, b"abc");
    }
}

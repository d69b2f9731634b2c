//! Temporary audio artifacts: unique paths, atomic writes and grace-delayed deletion.
//!
//! Every file written here is owned by an [`ArtifactGuard`]. Releasing or dropping the guard
//! schedules deletion after the store's grace period; `discard` deletes right away. Once the
//! guard is gone nothing else holds the path, so a deleted artifact cannot be referenced.

use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Label of a spoken reply to a text command.
pub const LABEL_SPOKEN_REPLY: &str = "raymundo";
/// Label of a downloaded voice note awaiting upload.
pub const LABEL_VOICE_INPUT: &str = "voice";
/// Label of the spoken answer to a voice note.
pub const LABEL_VOICE_REPLY: &str = "respuesta";

const LABELS: [&str; 3] = [LABEL_SPOKEN_REPLY, LABEL_VOICE_INPUT, LABEL_VOICE_REPLY];

/// Audio container, derived from the backend's content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
    Ogg,
}

impl AudioFormat {
    /// `mp3` when the content type mentions mp3 or mpeg, otherwise `wav`.
    pub fn from_content_type(content_type: &str) -> Self {
        let ct = content_type.to_ascii_lowercase();
        if ct.contains("mp3") || ct.contains("mpeg") {
            AudioFormat::Mp3
        } else {
            AudioFormat::Wav
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Ogg => "ogg",
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "wav" => Some(AudioFormat::Wav),
            "mp3" => Some(AudioFormat::Mp3),
            "ogg" => Some(AudioFormat::Ogg),
            _ => None,
        }
    }
}

/// Artifact failures. Cleanup failures are only ever logged.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("writing artifact {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("deleting artifact {path}: {source}")]
    CleanupFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An audio file on disk, created for exactly one flow.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    pub path: PathBuf,
    pub format: AudioFormat,
    pub created_at: DateTime<Utc>,
    pub owner_chat_id: String,
}

/// Allocates and writes artifacts under one directory.
pub struct ArtifactStore {
    dir: PathBuf,
    grace: Duration,
    seq: AtomicU64,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, grace: Duration) -> Self {
        Self {
            dir: dir.into(),
            grace,
            seq: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Unique path `{label}_{unix_ms}_{seq}.{ext}`. Never fails.
    pub fn allocate_path(&self, label: &str, format: AudioFormat) -> PathBuf {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let ms = Utc::now().timestamp_millis();
        self.dir
            .join(format!("{}_{}_{}.{}", label, ms, seq, format.extension()))
    }

    /// Write `bytes` to a fresh path (temp file + rename) and hand back its guard.
    pub async fn persist(
        &self,
        bytes: &[u8],
        format: AudioFormat,
        label: &str,
        owner_chat_id: &str,
    ) -> Result<ArtifactGuard, ArtifactError> {
        let path = self.allocate_path(label, format);
        let partial = path.with_extension(format!("{}.part", format.extension()));
        let write = async {
            tokio::fs::create_dir_all(&self.dir).await?;
            tokio::fs::write(&partial, bytes).await?;
            tokio::fs::rename(&partial, &path).await
        };
        if let Err(source) = write.await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(ArtifactError::Write { path, source });
        }
        log::debug!("artifacts: wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(ArtifactGuard {
            artifact: AudioArtifact {
                path,
                format,
                created_at: Utc::now(),
                owner_chat_id: owner_chat_id.to_string(),
            },
            grace: self.grace,
            armed: true,
        })
    }

    /// Remove artifact files left behind by a previous run. Returns how many were removed.
    /// Only names this store produces are touched; anything else in the directory is left alone.
    pub async fn sweep_stale(&self) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(e) => e,
            Err(_) => return 0,
        };
        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let is_artifact = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(is_artifact_file_name)
                .unwrap_or(false);
            if !is_artifact {
                continue;
            }
            match delete_now(&path).await {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("artifacts: {}", e),
            }
        }
        if removed > 0 {
            log::info!("artifacts: removed {} stale file(s) from {}", removed, self.dir.display());
        }
        removed
    }
}

/// `{label}_{unix_ms}_{seq}.{ext}` with a known label and audio extension, optionally `.part`.
fn is_artifact_file_name(name: &str) -> bool {
    let name = name.strip_suffix(".part").unwrap_or(name);
    let Some((stem, ext)) = name.rsplit_once('.') else {
        return false;
    };
    if AudioFormat::from_extension(ext).is_none() {
        return false;
    }
    let mut parts = stem.rsplitn(3, '_');
    let (Some(seq), Some(ms), Some(label)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    digits(seq) && digits(ms) && LABELS.contains(&label)
}

/// Exclusive owner of one artifact. Deletion is scheduled when the guard is released or dropped.
#[derive(Debug)]
pub struct ArtifactGuard {
    artifact: AudioArtifact,
    grace: Duration,
    armed: bool,
}

impl ArtifactGuard {
    pub fn artifact(&self) -> &AudioArtifact {
        &self.artifact
    }

    pub fn path(&self) -> &Path {
        &self.artifact.path
    }

    /// Schedule deletion after the grace period. The handle resolves once deletion was attempted.
    pub fn release(mut self) -> Option<JoinHandle<()>> {
        self.armed = false;
        schedule_delete(self.artifact.path.clone(), self.grace)
    }

    /// Delete now (used for inputs that are done the moment they have been uploaded).
    pub async fn discard(mut self) {
        self.armed = false;
        if let Err(e) = delete_now(&self.artifact.path).await {
            log::warn!("artifacts: {}", e);
        }
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = schedule_delete(self.artifact.path.clone(), self.grace);
        }
    }
}

async fn delete_now(path: &Path) -> Result<(), ArtifactError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ArtifactError::CleanupFailed {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Spawn the delayed delete on the current runtime; without a runtime, delete synchronously.
fn schedule_delete(path: PathBuf, grace: Duration) -> Option<JoinHandle<()>> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Some(handle.spawn(async move {
            tokio::time::sleep(grace).await;
            match delete_now(&path).await {
                Ok(()) => log::debug!("artifacts: deleted {}", path.display()),
                Err(e) => log::warn!("artifacts: {}", e),
            }
        })),
        Err(_) => {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    log::warn!("artifacts: deleting {}: {}", path.display(), e);
                }
            }
            None
        }
    }
}

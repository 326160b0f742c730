use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// URI scheme prefix for local file locators.
const FILE_SCHEME: &str = "file://";

/// Stable identity of one logical upload.
///
/// The id keys the persisted checkpoint, the in-flight session and the
/// status topic. Two uploads with the same id must refer to the same source
/// content for as long as a checkpoint exists.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UploadId({})", self.0)
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UploadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UploadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque locator of an upload source.
///
/// Local files use `file://<absolute path>`; a bare path is accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRef(String);

impl SourceRef {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    /// Builds a `file://` locator for `path`. The path is used as given;
    /// callers wanting a stable identity should canonicalize it first.
    pub fn from_path(path: &Path) -> Self {
        Self(format!("{FILE_SCHEME}{}", path.display()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem path named by this locator, with any `file://` prefix
    /// stripped.
    pub fn to_path(&self) -> PathBuf {
        PathBuf::from(self.0.strip_prefix(FILE_SCHEME).unwrap_or(&self.0))
    }

    /// Human-readable name of the source: the file name when the locator
    /// names a path, otherwise the locator itself.
    pub fn display_name(&self) -> String {
        self.to_path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.0.clone())
    }

    /// Derives the upload identity from the locator itself.
    pub fn upload_id(&self) -> UploadId {
        UploadId(self.0.clone())
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted confirmed offset of an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub upload_id: UploadId,
    pub bytes_confirmed: u64,
}

/// Lifecycle state of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TransferState {
    /// Returns `true` once no further events follow for the current run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A progress notification for one upload. Immutable once published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub upload_id: UploadId,
    /// Whole percent in `0..=100`.
    pub percent: u8,
    pub state: TransferState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ProgressEvent {
    pub fn new(upload_id: UploadId, percent: u8, state: TransferState) -> Self {
        Self {
            upload_id,
            percent,
            state,
            error_message: None,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// `floor(done * 100 / total)`, clamped to 100.
///
/// An empty source counts as complete.
pub fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (u128::from(done) * 100) / u128::from(total);
    pct.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_ref_strips_file_scheme() {
        let r = SourceRef::new("file:///data/video.mp4");
        assert_eq!(r.to_path(), PathBuf::from("/data/video.mp4"));

        let bare = SourceRef::new("/data/video.mp4");
        assert_eq!(bare.to_path(), PathBuf::from("/data/video.mp4"));
    }

    #[test]
    fn upload_id_is_the_locator() {
        let r = SourceRef::from_path(Path::new("/tmp/a.bin"));
        assert_eq!(r.as_str(), "file:///tmp/a.bin");
        assert_eq!(r.upload_id().as_str(), "file:///tmp/a.bin");
    }

    #[test]
    fn display_name_is_file_name() {
        let r = SourceRef::new("file:///data/clips/holiday.mov");
        assert_eq!(r.display_name(), "holiday.mov");
        assert_eq!(SourceRef::new("/").display_name(), "/");
    }

    #[test]
    fn percent_floors() {
        assert_eq!(percent_of(65536, 150_000), 43);
        assert_eq!(percent_of(131_072, 150_000), 87);
        assert_eq!(percent_of(150_000, 150_000), 100);
        assert_eq!(percent_of(0, 150_000), 0);
    }

    #[test]
    fn percent_zero_total_is_complete() {
        assert_eq!(percent_of(0, 0), 100);
    }

    #[test]
    fn percent_large_sizes_do_not_overflow() {
        assert_eq!(percent_of(u64::MAX / 2, u64::MAX), 49);
    }

    #[test]
    fn terminal_states() {
        assert!(!TransferState::Pending.is_terminal());
        assert!(!TransferState::Running.is_terminal());
        assert!(TransferState::Succeeded.is_terminal());
        assert!(TransferState::Failed.is_terminal());
        assert!(TransferState::Cancelled.is_terminal());
    }

    #[test]
    fn progress_event_field_names() {
        let ev = ProgressEvent::new("u1".into(), 43, TransferState::Running);
        let json = serde_json::to_string(&ev).unwrap();
        assert_eq!(json, r#"{"uploadId":"u1","percent":43,"state":"running"}"#);

        let failed = ProgressEvent::new("u1".into(), 43, TransferState::Failed)
            .with_error("source changed");
        let json = serde_json::to_string(&failed).unwrap();
        assert!(json.contains(r#""errorMessage":"source changed""#));
    }
}

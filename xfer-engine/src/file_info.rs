use serde::{Deserialize, Serialize};

/// The `FILE_INFO` wire payload (§3/§6): a UTF-8 JSON object describing
/// the file about to be streamed, sent once per transfer right before
/// the first `FILE_DATA` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub mtime: Option<u64>,
}

impl FileInfo {
    pub fn new(name: impl Into<String>, size: u64, mtime: Option<u64>) -> Self {
        FileInfo { name: name.into(), size, mtime }
    }
}

//! File selection for chat attachments and bulk document ingest.

use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use bytes::Bytes;
use regex::Regex;

use crate::error::{ClientError, Result};

pub const MAX_CHAT_ATTACHMENTS: usize = 3;

/// Where a file is being attached; each context has its own allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentContext {
    /// Tabular files sent along with a question
    Chat,
    /// Source documents uploaded for indexing
    Ingest,
}

impl AttachmentContext {
    fn pattern(&self) -> &'static Regex {
        static CHAT: OnceLock<Regex> = OnceLock::new();
        static INGEST: OnceLock<Regex> = OnceLock::new();
        match self {
            AttachmentContext::Chat => {
                CHAT.get_or_init(|| Regex::new(r"(?i)\.(csv|xlsx|xls)$").expect("valid regex"))
            }
            AttachmentContext::Ingest => INGEST.get_or_init(|| {
                Regex::new(r"(?i)\.(pdf|docx|doc|html|txt|md|png|jpg|jpeg|tiff|bmp)$")
                    .expect("valid regex")
            }),
        }
    }

    pub fn accepts(&self, name: &str) -> bool {
        self.pattern().is_match(name)
    }

    pub fn cap(&self) -> Option<usize> {
        match self {
            AttachmentContext::Chat => Some(MAX_CHAT_ATTACHMENTS),
            AttachmentContext::Ingest => None,
        }
    }

    /// Message shown when some files did not match the allow-list.
    pub fn rejection_notice(&self, rejected: usize) -> String {
        match self {
            AttachmentContext::Chat => {
                format!("{} file(s) ignored - only CSV/XLS/XLSX allowed.", rejected)
            }
            AttachmentContext::Ingest => format!(
                "{} file(s) ignored - only PDF/DOC/DOCX/HTML/TXT/MD/PNG/JPG/JPEG/TIFF/BMP allowed.",
                rejected
            ),
        }
    }
}

/// A selected file with its contents already read.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub name: String,
    pub size: u64,
    pub bytes: Bytes,
}

impl Attachment {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            bytes,
        }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|source| ClientError::File {
            path: path.display().to_string(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, bytes))
    }
}

/// Result of merging a new batch into an existing selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    /// `None` when nothing is selected
    pub files: Option<Vec<Attachment>>,
    /// Files dropped for having a disallowed extension; cap truncation is not counted
    pub rejected: usize,
}

/// Filter `raw` by the context's allow-list, append to `existing`, drop
/// duplicate `(name, size)` keys keeping the first, then apply the cap.
pub fn merge(
    existing: Option<Vec<Attachment>>,
    raw: Vec<Attachment>,
    context: AttachmentContext,
) -> Merged {
    let total = raw.len();
    let accepted: Vec<Attachment> = raw.into_iter().filter(|f| context.accepts(&f.name)).collect();
    let rejected = total - accepted.len();

    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for file in existing.unwrap_or_default().into_iter().chain(accepted) {
        if seen.insert((file.name.clone(), file.size)) {
            unique.push(file);
        }
    }

    if let Some(cap) = context.cap() {
        unique.truncate(cap);
    }

    Merged {
        files: non_empty(unique),
        rejected,
    }
}

/// Remove the entry at `index`; out-of-range indices leave the set unchanged.
pub fn remove(existing: Option<Vec<Attachment>>, index: usize) -> Option<Vec<Attachment>> {
    let mut files = existing?;
    if index < files.len() {
        files.remove(index);
    }
    non_empty(files)
}

fn non_empty(files: Vec<Attachment>) -> Option<Vec<Attachment>> {
    if files.is_empty() {
        None
    } else {
        Some(files)
    }
}

/// A selection bound to one context.
#[derive(Debug, Clone)]
pub struct AttachmentSet {
    context: AttachmentContext,
    files: Option<Vec<Attachment>>,
}

impl AttachmentSet {
    pub fn new(context: AttachmentContext) -> Self {
        Self { context, files: None }
    }

    /// Returns the number of files rejected for their extension.
    pub fn add(&mut self, raw: Vec<Attachment>) -> usize {
        let merged = merge(self.files.take(), raw, self.context);
        self.files = merged.files;
        merged.rejected
    }

    pub fn remove(&mut self, index: usize) {
        self.files = remove(self.files.take(), index);
    }

    pub fn clear(&mut self) {
        self.files = None;
    }

    pub fn files(&self) -> Option<&[Attachment]> {
        self.files.as_deref()
    }

    pub fn len(&self) -> usize {
        self.files.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn file(name: &str, size: usize) -> Attachment {
        Attachment::new(name, vec![b'x'; size])
    }

    fn names(files: &Option<Vec<Attachment>>) -> Vec<&str> {
        files
            .as_ref()
            .map(|f| f.iter().map(|a| a.name.as_str()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_dedup_by_name_and_size() {
        let merged = merge(
            None,
            vec![file("a.csv", 1), file("a.csv", 1), file("b.xls", 2)],
            AttachmentContext::Chat,
        );
        assert_eq!(names(&merged.files), vec!["a.csv", "b.xls"]);
        assert_eq!(merged.rejected, 0);
    }

    #[test]
    fn test_same_name_different_size_is_kept() {
        let merged = merge(
            None,
            vec![file("a.csv", 1), file("a.csv", 2)],
            AttachmentContext::Chat,
        );
        assert_eq!(merged.files.map(|f| f.len()), Some(2));
    }

    #[test]
    fn test_chat_cap_is_not_a_rejection() {
        let merged = merge(
            None,
            vec![file("1.csv", 1), file("2.csv", 1), file("3.xlsx", 1), file("4.xls", 1)],
            AttachmentContext::Chat,
        );
        assert_eq!(names(&merged.files), vec!["1.csv", "2.csv", "3.xlsx"]);
        assert_eq!(merged.rejected, 0);
    }

    #[test]
    fn test_existing_entries_win_over_new_ones() {
        let existing = Some(vec![file("a.csv", 1), file("b.csv", 1)]);
        let merged = merge(
            existing,
            vec![file("c.csv", 1), file("d.csv", 1), file("a.csv", 1)],
            AttachmentContext::Chat,
        );
        assert_eq!(names(&merged.files), vec!["a.csv", "b.csv", "c.csv"]);
    }

    #[test]
    fn test_extension_filter_is_case_insensitive() {
        let merged = merge(
            None,
            vec![file("REPORT.CSV", 1), file("notes.txt", 1), file("archive.csv.zip", 1)],
            AttachmentContext::Chat,
        );
        assert_eq!(names(&merged.files), vec!["REPORT.CSV"]);
        assert_eq!(merged.rejected, 2);
    }

    #[test]
    fn test_all_rejected_yields_none() {
        let merged = merge(None, vec![file("x.exe", 1)], AttachmentContext::Chat);
        assert!(merged.files.is_none());
        assert_eq!(merged.rejected, 1);
    }

    #[test]
    fn test_ingest_is_unbounded() {
        let raw: Vec<Attachment> = (0..10).map(|i| file(&format!("doc{}.pdf", i), 1)).collect();
        let merged = merge(None, raw, AttachmentContext::Ingest);
        assert_eq!(merged.files.map(|f| f.len()), Some(10));
    }

    #[test]
    fn test_ingest_allow_list() {
        let merged = merge(
            None,
            vec![file("a.PDF", 1), file("b.md", 1), file("c.jpeg", 1), file("d.csv", 1)],
            AttachmentContext::Ingest,
        );
        assert_eq!(names(&merged.files), vec!["a.PDF", "b.md", "c.jpeg"]);
        assert_eq!(merged.rejected, 1);
    }

    #[test]
    fn test_remove_last_entry_yields_none() {
        let files = remove(Some(vec![file("a.csv", 1)]), 0);
        assert!(files.is_none());
    }

    #[test]
    fn test_remove_by_position() {
        let files = remove(Some(vec![file("a.csv", 1), file("b.csv", 1), file("c.csv", 1)]), 1);
        assert_eq!(names(&files), vec!["a.csv", "c.csv"]);
    }

    #[test]
    fn test_remove_out_of_range() {
        let files = remove(Some(vec![file("a.csv", 1)]), 5);
        assert_eq!(names(&files), vec!["a.csv"]);
        assert!(remove(None, 0).is_none());
    }

    #[test]
    fn test_set_add_and_remove() {
        let mut set = AttachmentSet::new(AttachmentContext::Chat);
        assert_eq!(set.add(vec![file("a.csv", 1), file("b.doc", 1)]), 1);
        assert_eq!(set.len(), 1);
        set.remove(0);
        assert!(set.is_empty());
        assert!(set.files().is_none());
    }

    #[tokio::test]
    async fn test_load_reads_name_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        std::fs::write(&path, b"a,b\n1,2\n").unwrap();

        let attachment = Attachment::load(&path).await.unwrap();
        assert_eq!(attachment.name, "table.csv");
        assert_eq!(attachment.size, 8);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Attachment::load(&dir.path().join("nope.csv")).await.unwrap_err();
        assert!(matches!(err, ClientError::File { .. }));
    }
}

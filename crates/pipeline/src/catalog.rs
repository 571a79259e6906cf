//! Dataset catalog: which samples exist and where their videos are.
//!
//! A dataset is the directory `<root>/<subset>`; each immediate
//! sub-directory is one sample, processed in name order.

use std::path::{Path, PathBuf};

use v2t_core::error::CoreError;
use v2t_core::types::validate_path_component;

/// Default video file name prefix inside a sample directory.
pub const DEFAULT_VIDEO_PREFIX: &str = "Frame_";

/// Default video file extension.
pub const DEFAULT_VIDEO_EXTENSION: &str = "mp4";

/// One configured dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSpec {
    pub root: PathBuf,
    pub subset: String,
}

impl DatasetSpec {
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(&self.subset)
    }
}

/// Parse the `DATASETS` list.
///
/// Entries are separated by `;`. Each entry is either `root:subset` or a
/// path whose last component is the subset and whose parent is the root.
pub fn parse_datasets(spec: &str) -> Result<Vec<DatasetSpec>, CoreError> {
    spec.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_dataset_entry)
        .collect()
}

fn parse_dataset_entry(entry: &str) -> Result<DatasetSpec, CoreError> {
    let (root, subset) = match entry.split_once(':') {
        Some((root, subset)) => (PathBuf::from(root.trim()), subset.trim().to_string()),
        None => {
            let path = Path::new(entry);
            let subset = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
            (root, subset)
        }
    };

    validate_path_component("subset", &subset)
        .map_err(|_| CoreError::Validation(format!("invalid dataset entry '{entry}'")))?;
    Ok(DatasetSpec { root, subset })
}

/// How a sample's video file is recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoLocator {
    pub prefix: String,
    pub extension: String,
}

impl Default for VideoLocator {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_VIDEO_PREFIX.to_string(),
            extension: DEFAULT_VIDEO_EXTENSION.to_string(),
        }
    }
}

impl VideoLocator {
    fn matches(&self, file_name: &str) -> bool {
        file_name.starts_with(&self.prefix)
            && Path::new(file_name)
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(self.extension.as_str()))
    }

    /// First matching file (by name) directly inside `sample_dir`.
    pub async fn find_video(&self, sample_dir: &Path) -> Option<PathBuf> {
        let mut names = list_entries(sample_dir, EntryKind::File).await;
        names.retain(|name| self.matches(name));
        names.sort();
        names.into_iter().next().map(|name| sample_dir.join(name))
    }
}

/// A dataset with its discovered sample ids.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub spec: DatasetSpec,
    pub sample_ids: Vec<String>,
}

impl Dataset {
    /// List sample directories. A missing data directory yields no samples.
    pub async fn discover(spec: DatasetSpec) -> Self {
        let data_dir = spec.data_dir();
        if !data_dir.is_dir() {
            tracing::warn!(
                subset = %spec.subset,
                data_dir = %data_dir.display(),
                "Dataset directory not found; no samples",
            );
        }

        let mut sample_ids = list_entries(&data_dir, EntryKind::Dir).await;
        sample_ids.retain(|id| validate_path_component("sample_id", id).is_ok());
        sample_ids.sort();
        Self { spec, sample_ids }
    }

    pub fn subset(&self) -> &str {
        &self.spec.subset
    }

    pub fn sample_dir(&self, sample_id: &str) -> PathBuf {
        self.spec.data_dir().join(sample_id)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Dir,
}

/// Names of entries of one kind directly inside `dir`; unreadable
/// directories and entries are skipped.
async fn list_entries(dir: &Path, kind: EntryKind) -> Vec<String> {
    let mut names = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return names;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        let wanted = match kind {
            EntryKind::File => file_type.is_file(),
            EntryKind::Dir => file_type.is_dir(),
        };
        if wanted {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_root_subset_pairs() {
        let specs = parse_datasets(" /data:kitchen ; /mnt/raw:lab_2;").unwrap();

        assert_eq!(
            specs,
            vec![
                DatasetSpec { root: "/data".into(), subset: "kitchen".into() },
                DatasetSpec { root: "/mnt/raw".into(), subset: "lab_2".into() },
            ]
        );
    }

    #[test]
    fn parses_bare_paths() {
        let specs = parse_datasets("/data/kitchen").unwrap();

        assert_eq!(specs[0].root, PathBuf::from("/data"));
        assert_eq!(specs[0].subset, "kitchen");
        assert_eq!(specs[0].data_dir(), PathBuf::from("/data/kitchen"));
    }

    #[test]
    fn empty_list_is_empty() {
        assert!(parse_datasets("").unwrap().is_empty());
        assert!(parse_datasets(" ; ").unwrap().is_empty());
    }

    #[test]
    fn rejects_unusable_subset() {
        assert!(parse_datasets("/data:").is_err());
        assert!(parse_datasets("/data:a/b").is_err());
    }

    #[test]
    fn locator_matches_prefix_and_extension() {
        let locator = VideoLocator::default();

        assert!(locator.matches("Frame_0001.mp4"));
        assert!(locator.matches("Frame_cam.MP4"));
        assert!(!locator.matches("frame_0001.mp4"));
        assert!(!locator.matches("Frame_0001.mkv"));
        assert!(!locator.matches("Depth_0001.mp4"));
    }

    #[tokio::test]
    async fn discovers_sorted_samples_and_first_video() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("ds");
        for sample in ["s2", "s1", "s3"] {
            std::fs::create_dir_all(data.join(sample)).unwrap();
        }
        std::fs::write(data.join("notes.txt"), "").unwrap();
        std::fs::write(data.join("s1/Frame_b.mp4"), "").unwrap();
        std::fs::write(data.join("s1/Frame_a.mp4"), "").unwrap();
        std::fs::write(data.join("s2/other.mp4"), "").unwrap();

        let dataset = Dataset::discover(DatasetSpec {
            root: dir.path().to_path_buf(),
            subset: "ds".into(),
        })
        .await;

        assert_eq!(dataset.sample_ids, vec!["s1", "s2", "s3"]);
        let locator = VideoLocator::default();
        assert_eq!(
            locator.find_video(&dataset.sample_dir("s1")).await,
            Some(data.join("s1/Frame_a.mp4"))
        );
        assert_eq!(locator.find_video(&dataset.sample_dir("s2")).await, None);
    }

    #[tokio::test]
    async fn missing_data_dir_has_no_samples() {
        let dataset = Dataset::discover(DatasetSpec {
            root: "/nonexistent/root".into(),
            subset: "ds".into(),
        })
        .await;

        assert!(dataset.sample_ids.is_empty());
    }
}

use crate::CONTAINER_EXTENSION;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One subject × signal conversion task.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConversionUnit {
    pub subject_id: String,
    pub signal_name: String,
    pub source: PathBuf,
    pub table: PathBuf,
}

impl ConversionUnit {
    /// `subject/signal`, the ledger sort key.
    pub fn unit_id(&self) -> String {
        format!("{}/{}", self.subject_id, self.signal_name)
    }

    pub fn sidecar(&self) -> PathBuf {
        crate::table::sidecar_path(&self.table)
    }

    /// Both the table and its sidecar exist.
    pub fn is_converted(&self) -> bool {
        self.table.is_file() && self.sidecar().is_file()
    }
}

/// Immediate subdirectories of `root` as `(subject_id, path)`, sorted by name.
/// Hidden directories are ignored.
pub fn list_subject_dirs(root: &Path) -> Result<Vec<(String, PathBuf)>, walkdir::Error> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        dirs.push((name, entry.into_path()));
    }
    Ok(dirs)
}

/// Files directly inside `dir` whose extension matches (case-insensitive), sorted.
pub fn list_files_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, walkdir::Error> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext));
        if matches {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Cross product of subjects (optionally filtered) and their container files.
pub fn discover_units(
    input_root: &Path,
    output_root: &Path,
    subjects: Option<&BTreeSet<String>>,
) -> Result<Vec<ConversionUnit>, walkdir::Error> {
    let mut units = Vec::new();

    for (subject_id, dir) in list_subject_dirs(input_root)? {
        if let Some(filter) = subjects {
            if !filter.contains(&subject_id) {
                continue;
            }
        }

        let sources = list_files_with_extension(&dir, CONTAINER_EXTENSION)?;
        log::debug!("Subject {}: {} signal files", subject_id, sources.len());

        for source in sources {
            let signal_name = source
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let table = output_root
                .join(&subject_id)
                .join(format!("{}.csv", signal_name));
            units.push(ConversionUnit {
                subject_id: subject_id.clone(),
                signal_name,
                source,
                table,
            });
        }
    }

    units.sort();
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_discovers_cross_product() {
        let input = tempfile::tempdir().unwrap();
        touch(&input.path().join("002/heart_rate.wav"));
        touch(&input.path().join("001/breathing_rate.WAV"));
        touch(&input.path().join("001/heart_rate.wav"));
        touch(&input.path().join("001/notes.txt"));
        touch(&input.path().join("stray.wav"));
        std::fs::create_dir_all(input.path().join(".cache")).unwrap();

        let units = discover_units(input.path(), Path::new("/out"), None).unwrap();
        let ids: Vec<String> = units.iter().map(|u| u.unit_id()).collect();
        assert_eq!(ids, vec!["001/breathing_rate", "001/heart_rate", "002/heart_rate"]);
        assert_eq!(units[1].table, PathBuf::from("/out/001/heart_rate.csv"));
    }

    #[test]
    fn test_subject_filter() {
        let input = tempfile::tempdir().unwrap();
        touch(&input.path().join("001/heart_rate.wav"));
        touch(&input.path().join("002/heart_rate.wav"));

        let only: BTreeSet<String> = ["002".to_string(), "999".to_string()].into_iter().collect();
        let units = discover_units(input.path(), Path::new("/out"), Some(&only)).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].subject_id, "002");
    }

    #[test]
    fn test_is_converted_needs_sidecar() {
        let out = tempfile::tempdir().unwrap();
        let unit = ConversionUnit {
            subject_id: "001".into(),
            signal_name: "heart_rate".into(),
            source: PathBuf::from("in/001/heart_rate.wav"),
            table: out.path().join("001/heart_rate.csv"),
        };
        assert!(!unit.is_converted());
        touch(&unit.table);
        assert!(!unit.is_converted());
        touch(&unit.sidecar());
        assert!(unit.is_converted());
    }
}

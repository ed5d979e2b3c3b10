use crate::extractor::extract;
use crate::models::EntityKind;
use crate::reader::DumpReader;
use anyhow::{Context, Result};
use glob::glob;
use std::path::{Path, PathBuf};

/// A dump file found under the input folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpFile {
    pub path: PathBuf,
    pub size: u64,
    /// Kind suggested by the file name (`Posts.xml` -> Posts)
    pub kind_hint: Option<EntityKind>,
}

/// Find all `*.xml` files below `root`, sorted by path.
pub fn find_dump_files(root: &Path) -> Result<Vec<DumpFile>> {
    if !root.is_dir() {
        anyhow::bail!("Input folder does not exist: {}", root.display());
    }

    let pattern = root.join("**").join("*.xml");
    let mut files: Vec<DumpFile> = glob(&pattern.to_string_lossy())
        .with_context(|| format!("Invalid search pattern: {}", pattern.display()))?
        .flatten()
        .filter(|p| p.is_file())
        .map(|path| {
            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            let kind_hint = kind_from_file_name(&path);
            DumpFile {
                path,
                size,
                kind_hint,
            }
        })
        .collect();

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Kind named by a dump's file stem, if any.
pub fn kind_from_file_name(path: &Path) -> Option<EntityKind> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(EntityKind::from_name)
}

/// First record-bearing line of a dump, with its line number.
///
/// XML declarations, container tags and blank lines are passed over.
pub fn read_first_record(path: &Path) -> Result<Option<(u64, String)>> {
    let reader = DumpReader::open(path)?;
    for line in reader {
        let line = line?;
        if extract(&line.text).is_some() {
            return Ok(Some((line.number, line.text.trim().to_string())));
        }
    }
    Ok(None)
}

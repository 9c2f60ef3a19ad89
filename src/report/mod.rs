use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub mod archive;
pub mod histogram;
pub mod table;

fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}.tmp", name))
}

/// Writes `path` through a sibling `.tmp` file that is renamed into place
/// only after `f` and the flush succeed. On failure the temp file is removed
/// and `path` is left untouched.
pub fn write_atomic<F>(path: &Path, f: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let tmp = tmp_path(path);
    let file =
        File::create(&tmp).with_context(|| format!("failed to create {}", tmp.display()))?;
    let mut w = BufWriter::new(file);
    let result = f(&mut w).and_then(|_| {
        w.flush()
            .with_context(|| format!("failed to flush {}", tmp.display()))
    });

    match result {
        Ok(()) => {
            drop(w);
            fs::rename(&tmp, path)
                .with_context(|| format!("failed to move output to {}", path.display()))?;
            Ok(())
        }
        Err(e) => {
            drop(w);
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    fn success_renames_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_atomic(&path, |w| {
            w.write_all(b"a,b\n")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a,b\n");
        assert!(!tmp_path(&path).exists());
    }

    #[rstest]
    fn failure_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let err = write_atomic(&path, |w| {
            w.write_all(b"partial")?;
            bail!("boom")
        });
        assert!(err.is_err());
        assert!(!path.exists());
        assert!(!tmp_path(&path).exists());
    }
}

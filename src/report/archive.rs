use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub fn archive_path(out_dir: &Path, name: &str) -> PathBuf {
    out_dir.join(format!("{}_expression.zip", name))
}

/// Bundles `files` under a `<name>_expression/` folder in
/// `<out_dir>/<name>_expression.zip`. Entry timestamps are fixed so the
/// archive depends only on file contents.
pub fn write_zip(out_dir: &Path, name: &str, files: &[PathBuf]) -> Result<PathBuf> {
    let root = format!("{}_expression", name);
    let zip_path = archive_path(out_dir, name);
    let tmp_path = out_dir.join(format!("{}_expression.zip.tmp", name));

    let file = File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;
    let mut zip = ZipWriter::new(file);
    let result = write_zip_entries(&mut zip, &root, files);

    match result.and_then(|_| zip.finish().with_context(|| "failed to finalize zip")) {
        Ok(_) => {
            fs::rename(&tmp_path, &zip_path)
                .with_context(|| format!("failed to move zip to {}", zip_path.display()))?;
            Ok(zip_path)
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            Err(e)
        }
    }
}

fn write_zip_entries(zip: &mut ZipWriter<File>, root: &str, files: &[PathBuf]) -> Result<()> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    zip.add_directory(format!("{}/", root), options)
        .with_context(|| "failed to add directory entry to zip")?;

    for src_path in files {
        let name = src_path
            .file_name()
            .and_then(|s| s.to_str())
            .with_context(|| format!("invalid file name {}", src_path.display()))?;
        let zip_path = format!("{}/{}", root, name);
        add_file(zip, src_path, &zip_path, options)
            .with_context(|| format!("failed to add {} to zip", name))?;
    }
    Ok(())
}

fn add_file(
    zip: &mut ZipWriter<File>,
    src_path: &Path,
    zip_path: &str,
    options: SimpleFileOptions,
) -> Result<()> {
    let mut file =
        File::open(src_path).with_context(|| format!("failed to open {}", src_path.display()))?;
    zip.start_file(zip_path, options)?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        zip.write_all(&buf[..n])?;
    }
    Ok(())
}

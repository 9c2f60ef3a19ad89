use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use memmap2::Mmap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read};
use std::path::Path;

const GZIP_READ_BUF: usize = 8 * 1024 * 1024;
const STDIN_READ_BUF: usize = 1024 * 1024;

pub struct MmapSource {
    mmap: Mmap,
}

impl MmapSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        // SAFETY: read-only file mapping.
        let mmap = unsafe { Mmap::map(&file) }.with_context(|| "mmap failed")?;
        Ok(Self { mmap })
    }
}

impl AsRef<[u8]> for MmapSource {
    fn as_ref(&self) -> &[u8] {
        &self.mmap
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InputKind {
    Stdin,
    Plain,
    Gzip,
}

pub fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == "-"
}

/// Opens `path` as a buffered byte stream. `-` is standard input; gzip input
/// is decoded on the fly.
pub fn open_input(path: &Path) -> Result<(Box<dyn BufRead>, InputKind)> {
    let kind = detect_input_kind(path)?;
    let reader: Box<dyn BufRead> = match kind {
        InputKind::Stdin => Box::new(BufReader::with_capacity(
            STDIN_READ_BUF,
            io::stdin().lock(),
        )),
        InputKind::Plain => {
            let len = std::fs::metadata(path)
                .with_context(|| format!("failed to stat {}", path.display()))?
                .len();
            if len == 0 {
                Box::new(Cursor::new(Vec::new()))
            } else {
                Box::new(Cursor::new(MmapSource::open(path)?))
            }
        }
        InputKind::Gzip => {
            let file =
                File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
            Box::new(BufReader::with_capacity(
                GZIP_READ_BUF,
                MultiGzDecoder::new(BufReader::new(file)),
            ))
        }
    };
    Ok((reader, kind))
}

pub fn detect_input_kind(path: &Path) -> Result<InputKind> {
    if is_stdin(path) {
        return Ok(InputKind::Stdin);
    }
    if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
        if ext.eq_ignore_ascii_case("gz") {
            return Ok(InputKind::Gzip);
        }
    }
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut magic = [0u8; 2];
    let n = file
        .read(&mut magic)
        .with_context(|| "failed to read magic bytes")?;
    if n == 2 && magic == [0x1f, 0x8b] {
        Ok(InputKind::Gzip)
    } else {
        Ok(InputKind::Plain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::io::Write;

    const BODY: &str = "genes\tS1\nA\t1\n";

    fn read_all(path: &Path) -> (String, InputKind) {
        let (mut r, kind) = open_input(path).unwrap();
        let mut s = String::new();
        r.read_to_string(&mut s).unwrap();
        (s, kind)
    }

    #[rstest]
    fn plain_file_is_mapped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.tsv");
        std::fs::write(&path, BODY).unwrap();
        assert_eq!(read_all(&path), (BODY.to_string(), InputKind::Plain));
    }

    #[rstest]
    fn empty_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.tsv");
        std::fs::write(&path, "").unwrap();
        assert_eq!(read_all(&path), (String::new(), InputKind::Plain));
    }

    #[rstest]
    #[case("m.tsv.gz")]
    #[case("no_extension")]
    fn gzip_is_detected_by_extension_or_magic(#[case] name: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(BODY.as_bytes()).unwrap();
        enc.finish().unwrap();
        assert_eq!(read_all(&path), (BODY.to_string(), InputKind::Gzip));
    }

    #[rstest]
    fn dash_means_stdin() {
        assert_eq!(
            detect_input_kind(Path::new("-")).unwrap(),
            InputKind::Stdin
        );
    }
}

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use gzp::deflate::{Bgzf, Mgzip};
use gzp::par::decompress::ParDecompressBuilder;
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

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

    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InputKind {
    Plain,
    Gzip,
}

/// Raw sequence lines of one input file, symbols not yet mapped.
#[derive(Clone, Debug, Default)]
pub struct RawSequences {
    pub lines: Vec<Vec<u8>>,
    pub bytes: usize,
}

/// Reads a line-oriented sequence file: one sequence per line, blank lines
/// and lines starting with `>` or `#` skipped, `\r\n` accepted.
pub fn read_sequences(path: &Path, threads: usize) -> Result<RawSequences> {
    match detect_input_kind(path)? {
        InputKind::Plain => {
            let file_len = std::fs::metadata(path)
                .with_context(|| format!("failed to stat {}", path.display()))?
                .len();
            if file_len == 0 {
                return Ok(RawSequences::default());
            }
            let source = MmapSource::open(path)?;
            Ok(split_lines(source.bytes()))
        }
        InputKind::Gzip => {
            let mut reader = open_gzip_reader(path, threads)?;
            let mut buf = Vec::new();
            reader
                .read_to_end(&mut buf)
                .with_context(|| format!("gzip decompression error in {}", path.display()))?;
            Ok(split_lines(&buf))
        }
    }
}

pub fn split_lines(data: &[u8]) -> RawSequences {
    let mut out = RawSequences {
        lines: Vec::new(),
        bytes: data.len(),
    };
    let mut start = 0usize;
    while start < data.len() {
        let end = memchr::memchr(b'\n', &data[start..])
            .map(|i| start + i)
            .unwrap_or(data.len());
        let mut line = &data[start..end];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        if !line.is_empty() && line[0] != b'>' && line[0] != b'#' {
            out.lines.push(line.to_vec());
        }
        start = end + 1;
    }
    out
}

pub fn detect_input_kind(path: &Path) -> Result<InputKind> {
    if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
        let ext = ext.to_ascii_lowercase();
        if ext == "gz" {
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

#[derive(Clone, Copy, Debug)]
enum GzipVariant {
    Standard,
    Mgzip,
    Bgzf,
}

fn detect_gzip_variant(path: &Path) -> Result<GzipVariant> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut header = [0u8; 20];
    let n = file
        .read(&mut header)
        .with_context(|| "failed to read gzip header")?;
    if n < 14 || header[0] != 0x1f || header[1] != 0x8b || header[3] & 4 == 0 {
        return Ok(GzipVariant::Standard);
    }
    match (header[12], header[13]) {
        (b'B', b'C') => Ok(GzipVariant::Bgzf),
        (b'I', b'G') => Ok(GzipVariant::Mgzip),
        _ => Ok(GzipVariant::Standard),
    }
}

pub fn open_gzip_reader(path: &Path, threads: usize) -> Result<Box<dyn Read + Send>> {
    let variant = detect_gzip_variant(path)?;
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let reader = BufReader::new(file);
    let reader: Box<dyn Read + Send> = match variant {
        GzipVariant::Bgzf if threads > 1 => Box::new(
            ParDecompressBuilder::<Bgzf>::new()
                .num_threads(threads)
                .with_context(|| "invalid gzip decompression thread count")?
                .from_reader(reader),
        ),
        GzipVariant::Mgzip if threads > 1 => Box::new(
            ParDecompressBuilder::<Mgzip>::new()
                .num_threads(threads)
                .with_context(|| "invalid gzip decompression thread count")?
                .from_reader(reader),
        ),
        _ => Box::new(MultiGzDecoder::new(reader)),
    };
    Ok(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_split_lines_skips_headers_and_blanks() {
        let raw = split_lines(b">seq1\nACGT\r\n\n# note\nTTGA");
        assert_eq!(raw.lines, vec![b"ACGT".to_vec(), b"TTGA".to_vec()]);
    }

    #[test]
    fn test_read_plain_file() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"ACGT\nGGCC\n").unwrap();
        let raw = read_sequences(f.path(), 1).unwrap();
        assert_eq!(raw.lines.len(), 2);
        assert_eq!(raw.bytes, 10);
    }

    #[test]
    fn test_read_empty_file() {
        let f = NamedTempFile::new().unwrap();
        assert!(read_sequences(f.path(), 1).unwrap().lines.is_empty());
    }

    #[test]
    fn test_read_gzip_file() {
        let mut f = NamedTempFile::new().unwrap();
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"ACGT\nAAAA\n").unwrap();
        f.write_all(&enc.finish().unwrap()).unwrap();
        assert_eq!(detect_input_kind(f.path()).unwrap(), InputKind::Gzip);
        let raw = read_sequences(f.path(), 1).unwrap();
        assert_eq!(raw.lines, vec![b"ACGT".to_vec(), b"AAAA".to_vec()]);
    }
}

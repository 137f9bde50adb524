use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Chain, Cursor, Read};
use std::path::Path;

type ChainReader = Chain<Cursor<Vec<u8>>, File>;
type GzipReader = BufReader<MultiGzDecoder<ChainReader>>;
type PlainReader = BufReader<ChainReader>;

/// Streaming reader over a crash artifact that implements BufRead
///
/// Artifacts named `*.gz` are always gunzipped. Other files are sniffed for
/// the gzip magic bytes (1F 8B 08) so a compressed dump that lost its suffix
/// still reads as text.
pub enum ArtifactReader {
    Gzip(GzipReader),
    Plain(PlainReader),
}

impl std::fmt::Debug for ArtifactReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactReader::Gzip(_) => write!(f, "ArtifactReader::Gzip"),
            ArtifactReader::Plain(_) => write!(f, "ArtifactReader::Plain"),
        }
    }
}

impl BufRead for ArtifactReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            ArtifactReader::Gzip(reader) => reader.fill_buf(),
            ArtifactReader::Plain(reader) => reader.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            ArtifactReader::Gzip(reader) => reader.consume(amt),
            ArtifactReader::Plain(reader) => reader.consume(amt),
        }
    }
}

impl Read for ArtifactReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ArtifactReader::Gzip(reader) => reader.read(buf),
            ArtifactReader::Plain(reader) => reader.read(buf),
        }
    }
}

/// True when the file name carries a `.gz` suffix.
pub fn has_gzip_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

impl ArtifactReader {
    /// Open `path`, choosing gzip by extension first and by magic bytes second.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path_ref = path.as_ref();
        let mut file = File::open(path_ref)?;

        let mut head = [0u8; 3];
        let n = read_head(&mut file, &mut head)?;

        // Put the read bytes back in front using a cursor chain
        let prefix = Cursor::new(head[..n].to_vec());
        let chained = prefix.chain(file);

        let is_gzip_magic = n == 3 && head[0] == 0x1F && head[1] == 0x8B && head[2] == 0x08;

        if has_gzip_extension(path_ref) || is_gzip_magic {
            Ok(ArtifactReader::Gzip(BufReader::new(MultiGzDecoder::new(
                chained,
            ))))
        } else {
            Ok(ArtifactReader::Plain(BufReader::new(chained)))
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, ArtifactReader::Gzip(_))
    }
}

// A single read() may return fewer bytes than asked for; loop until the
// header is filled or the file ends.
fn read_head(file: &mut File, head: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < head.len() {
        match file.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

//! Feed file reader with automatic gzip decompression
//!
//! Feed files ending in `.gz` are decompressed on the fly; anything else is
//! read as-is. The path `-` reads from stdin.
//!
//! ```rust,no_run
//! use geoglot::file_reader;
//! use std::io::Read;
//!
//! let mut reader = file_reader::open("GeoLite2-City-Blocks-IPv4.csv.gz")?;
//! let mut header = String::new();
//! reader.read_to_string(&mut header)?;
//! # Ok::<(), std::io::Error>(())
//! ```

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, stdin, BufReader, Read};
use std::path::Path;

/// Buffer size for file reading (128KB)
const BUFFER_SIZE: usize = 128 * 1024;

/// Open a feed file, decompressing `.gz` files
///
/// # Errors
///
/// Returns an error if the file does not exist or cannot be opened. Invalid
/// gzip data surfaces as an error on the first read.
pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn Read + Send>> {
    let path = path.as_ref();

    if path.to_str() == Some("-") {
        return Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, stdin())));
    }

    let file = File::open(path)?;
    Ok(from_file(file, is_gzip(path)))
}

/// Wrap an already open file, decompressing when `gzip` is set
pub fn from_file(file: File, gzip: bool) -> Box<dyn Read + Send> {
    if gzip {
        Box::new(GzDecoder::new(BufReader::with_capacity(BUFFER_SIZE, file)))
    } else {
        Box::new(BufReader::with_capacity(BUFFER_SIZE, file))
    }
}

/// Whether the path names a gzip file (by extension)
pub fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

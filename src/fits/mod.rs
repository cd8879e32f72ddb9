//! Minimal FITS container access.
//!
//! Only what the extraction pipeline needs: enumerate HDUs, read header
//! keywords, and decode `BINTABLE` extensions into columns. A writer for the
//! same subset is provided for sample data and tests.
//!
//! FITS layout:
//! - 2880-byte blocks
//! - header of 80-character keyword cards terminated by `END`
//! - big-endian data, padded to a block boundary

pub mod header;
pub mod table;
pub mod writer;

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use thiserror::Error;

pub use header::{Header, HeaderValue};
pub use table::{BinTable, Column, ColumnData};
pub use writer::{write_fits, TableHdu};

use header::BLOCK_SIZE;

#[derive(Debug, Error)]
pub enum FitsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid FITS format: {0}")]
    InvalidFormat(String),

    #[error("missing required keyword {0}")]
    MissingKeyword(String),

    #[error("HDU {0} does not exist")]
    NoSuchHdu(usize),

    #[error("HDU {0} is not a binary table")]
    NotATable(usize),

    #[error("column {name}: unsupported format '{tform}'")]
    UnsupportedColumn { name: String, tform: String },

    #[error("column {name} is not numeric: {reason}")]
    NotNumeric { name: String, reason: String },
}

// ---------------------------------------------------------------------------
// Hdu – one header/data unit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Hdu {
    pub index: usize,
    pub header: Header,
    data_offset: u64,
    data_len: u64,
}

impl Hdu {
    /// `EXTNAME`, or `PRIMARY` for the first HDU.
    pub fn name(&self) -> &str {
        match self.header.get_str("EXTNAME") {
            Some(name) => name,
            None if self.index == 0 => "PRIMARY",
            None => "",
        }
    }

    pub fn is_bintable(&self) -> bool {
        self.header
            .get_str("XTENSION")
            .is_some_and(|x| x.trim().eq_ignore_ascii_case("BINTABLE"))
    }

    /// Row count of a table HDU (0 otherwise).
    pub fn nrows(&self) -> usize {
        if self.is_bintable() {
            self.header.get_int("NAXIS2").unwrap_or(0).max(0) as usize
        } else {
            0
        }
    }
}

// ---------------------------------------------------------------------------
// FitsFile – an open file with its HDU directory
// ---------------------------------------------------------------------------

/// An open FITS file. The handle is released when the value is dropped.
pub struct FitsFile {
    reader: BufReader<File>,
    hdus: Vec<Hdu>,
}

impl FitsFile {
    /// Open a file and scan all its headers.
    pub fn open(path: &Path) -> Result<Self, FitsError> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let hdus = scan_hdus(&mut reader, file_len)?;
        Ok(Self {
            reader,
            hdus,
        })
    }

    pub fn hdus(&self) -> &[Hdu] {
        &self.hdus
    }

    /// First value of `key` found while walking the HDUs in order.
    pub fn header_value(&self, key: &str) -> Option<&HeaderValue> {
        self.hdus.iter().find_map(|hdu| hdu.header.get(key))
    }

    /// Decode the binary table stored in HDU `index`.
    pub fn read_table(&mut self, index: usize) -> Result<BinTable, FitsError> {
        let hdu = self.hdus.get(index).ok_or(FitsError::NoSuchHdu(index))?;
        if !hdu.is_bintable() {
            return Err(FitsError::NotATable(index));
        }
        let header = hdu.header.clone();
        let (offset, len) = (hdu.data_offset, hdu.data_len);

        let main_len = (header.get_int("NAXIS1").unwrap_or(0).max(0) as u64)
            .checked_mul(header.get_int("NAXIS2").unwrap_or(0).max(0) as u64)
            .filter(|&n| n <= len)
            .ok_or_else(|| invalid("table larger than its data unit"))?;
        let mut raw = vec![0u8; main_len as usize];
        self.reader.seek(SeekFrom::Start(offset))?;
        self.reader.read_exact(&mut raw)?;
        table::decode(&header, &raw)
    }
}

fn invalid(reason: &str) -> FitsError {
    FitsError::InvalidFormat(reason.to_string())
}

/// Walk the headers of a file of `file_len` bytes. Every data unit must lie
/// inside the file.
fn scan_hdus<R: Read + Seek>(reader: &mut R, file_len: u64) -> Result<Vec<Hdu>, FitsError> {
    let mut hdus = Vec::new();
    let mut offset: u64 = 0;
    let mut block = [0u8; BLOCK_SIZE];

    loop {
        reader.seek(SeekFrom::Start(offset))?;
        match reader.read_exact(&mut block) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof && !hdus.is_empty() => break,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(FitsError::InvalidFormat("file shorter than one block".into()))
            }
            Err(e) => return Err(e.into()),
        }
        offset += BLOCK_SIZE as u64;

        let mut header = Header::new();
        let mut complete = header.read_block(&block);
        while !complete {
            reader.read_exact(&mut block).map_err(|e| match e.kind() {
                ErrorKind::UnexpectedEof => {
                    FitsError::InvalidFormat("header not terminated by END".into())
                }
                _ => FitsError::Io(e),
            })?;
            offset += BLOCK_SIZE as u64;
            complete = header.read_block(&block);
        }

        if hdus.is_empty() && header.get("SIMPLE").is_none() {
            return Err(FitsError::InvalidFormat("missing SIMPLE keyword".into()));
        }

        let data_len = data_size(&header)?;
        let data_end = offset
            .checked_add(data_len)
            .filter(|&end| end <= file_len)
            .ok_or_else(|| invalid("data unit extends past the end of the file"))?;
        let index = hdus.len();
        hdus.push(Hdu {
            index,
            header,
            data_offset: offset,
            data_len,
        });
        offset = data_end.div_ceil(BLOCK_SIZE as u64) * BLOCK_SIZE as u64;
    }

    Ok(hdus)
}

/// Bytes in the data unit: |BITPIX|/8 · GCOUNT · (PCOUNT + NAXIS1 · … · NAXISn).
fn data_size(header: &Header) -> Result<u64, FitsError> {
    let naxis = header
        .get_int("NAXIS")
        .ok_or_else(|| FitsError::MissingKeyword("NAXIS".into()))?;
    if naxis <= 0 {
        return Ok(0);
    }
    let bitpix = header
        .get_int("BITPIX")
        .ok_or_else(|| FitsError::MissingKeyword("BITPIX".into()))?;
    let overflow = || invalid("data unit size overflows");
    let mut elements: u64 = 1;
    for i in 1..=naxis {
        let n = header
            .get_int(&format!("NAXIS{i}"))
            .ok_or_else(|| FitsError::MissingKeyword(format!("NAXIS{i}")))?;
        elements = elements.checked_mul(n.max(0) as u64).ok_or_else(overflow)?;
    }
    let pcount = header.get_int("PCOUNT").unwrap_or(0).max(0) as u64;
    let gcount = header.get_int("GCOUNT").unwrap_or(1).max(1) as u64;
    pcount
        .checked_add(elements)
        .and_then(|n| n.checked_mul(gcount))
        .and_then(|n| n.checked_mul(bitpix.unsigned_abs() / 8))
        .ok_or_else(overflow)
}

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::header::{end_card, format_card, Header, HeaderValue, BLOCK_SIZE, CARD_SIZE};
use super::table::{Column, ColumnData};
use super::FitsError;

/// Keywords the writer derives itself; user-supplied values for them are ignored.
const STRUCTURAL_KEYWORDS: &[&str] = &[
    "SIMPLE", "XTENSION", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "EXTEND", "PCOUNT", "GCOUNT",
    "TFIELDS", "EXTNAME",
];

/// One binary-table extension to be written.
#[derive(Debug, Clone, Default)]
pub struct TableHdu {
    pub name: String,
    pub header: Header,
    pub columns: Vec<Column>,
}

impl TableHdu {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_card(mut self, key: &str, value: HeaderValue) -> Self {
        self.header.set(key, value);
        self
    }
}

/// Write a FITS file: an empty primary HDU carrying `primary` cards, followed
/// by one `BINTABLE` per entry of `tables`. Numeric columns are stored as `D`,
/// text columns as fixed-width `A`.
pub fn write_fits(path: &Path, primary: &Header, tables: &[TableHdu]) -> Result<(), FitsError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_fits_to(&mut writer, primary, tables)?;
    writer.flush()?;
    Ok(())
}

pub fn write_fits_to<W: Write>(
    writer: &mut W,
    primary: &Header,
    tables: &[TableHdu],
) -> Result<(), FitsError> {
    let mut header = Header::new()
        .with("SIMPLE", HeaderValue::Bool(true))
        .with("BITPIX", HeaderValue::Int(8))
        .with("NAXIS", HeaderValue::Int(0))
        .with("EXTEND", HeaderValue::Bool(true));
    copy_user_cards(&mut header, primary);
    write_header(writer, &header)?;

    for table in tables {
        write_table(writer, table)?;
    }
    Ok(())
}

fn write_table<W: Write>(writer: &mut W, table: &TableHdu) -> Result<(), FitsError> {
    let nrows = table.columns.first().map(Column::len).unwrap_or(0);
    if let Some(bad) = table.columns.iter().find(|c| c.len() != nrows) {
        return Err(FitsError::InvalidFormat(format!(
            "column {} has {} rows, expected {nrows}",
            bad.name,
            bad.len()
        )));
    }

    let widths: Vec<usize> = table
        .columns
        .iter()
        .map(|c| match &c.data {
            ColumnData::Numeric(_) => Ok(8),
            ColumnData::Text(cells) => Ok(cells.iter().map(String::len).max().unwrap_or(0).max(1)),
            ColumnData::Unsupported(tform) => Err(FitsError::UnsupportedColumn {
                name: c.name.clone(),
                tform: tform.clone(),
            }),
        })
        .collect::<Result<_, _>>()?;
    let row_len: usize = widths.iter().sum();

    let mut header = Header::new()
        .with("XTENSION", HeaderValue::Str("BINTABLE".into()))
        .with("BITPIX", HeaderValue::Int(8))
        .with("NAXIS", HeaderValue::Int(2))
        .with("NAXIS1", HeaderValue::Int(row_len as i64))
        .with("NAXIS2", HeaderValue::Int(nrows as i64))
        .with("PCOUNT", HeaderValue::Int(0))
        .with("GCOUNT", HeaderValue::Int(1))
        .with("TFIELDS", HeaderValue::Int(table.columns.len() as i64));
    for (i, (column, width)) in table.columns.iter().zip(&widths).enumerate() {
        let tform = match column.data {
            ColumnData::Text(_) => format!("{width}A"),
            _ => "D".to_string(),
        };
        header.set(&format!("TTYPE{}", i + 1), HeaderValue::Str(column.name.clone()));
        header.set(&format!("TFORM{}", i + 1), HeaderValue::Str(tform));
    }
    if !table.name.is_empty() {
        header.set("EXTNAME", HeaderValue::Str(table.name.clone()));
    }
    copy_user_cards(&mut header, &table.header);
    write_header(writer, &header)?;

    let mut data = Vec::with_capacity(row_len * nrows);
    for row in 0..nrows {
        for (column, width) in table.columns.iter().zip(&widths) {
            match &column.data {
                ColumnData::Numeric(values) => data.extend_from_slice(&values[row].to_be_bytes()),
                ColumnData::Text(cells) => {
                    let mut cell = cells[row].as_bytes().to_vec();
                    cell.resize(*width, b' ');
                    data.extend_from_slice(&cell);
                }
                ColumnData::Unsupported(_) => {}
            }
        }
    }
    writer.write_all(&data)?;
    pad(writer, data.len(), 0u8)
}

fn copy_user_cards(target: &mut Header, source: &Header) {
    for (key, value) in source.iter() {
        if !STRUCTURAL_KEYWORDS.contains(&key) {
            target.set(key, value.clone());
        }
    }
}

fn write_header<W: Write>(writer: &mut W, header: &Header) -> Result<(), FitsError> {
    for (key, value) in header.iter() {
        writer.write_all(&format_card(key, value))?;
    }
    writer.write_all(&end_card())?;
    pad(writer, (header.len() + 1) * CARD_SIZE, b' ')
}

fn pad<W: Write>(writer: &mut W, written: usize, fill: u8) -> Result<(), FitsError> {
    let padding = (BLOCK_SIZE - written % BLOCK_SIZE) % BLOCK_SIZE;
    writer.write_all(&vec![fill; padding])?;
    Ok(())
}

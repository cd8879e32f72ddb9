use super::header::Header;
use super::FitsError;

// ---------------------------------------------------------------------------
// Column formats (TFORMn)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormCode {
    Logical,
    Bit,
    Byte,
    Int16,
    Int32,
    Int64,
    Char,
    Float32,
    Float64,
    Complex32,
    Complex64,
    DescriptorP,
    DescriptorQ,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnFormat {
    repeat: usize,
    code: FormCode,
}

impl ColumnFormat {
    /// Parse `rTa` (repeat, type code, ignored trailing descriptor).
    fn parse(tform: &str) -> Option<Self> {
        let tform = tform.trim();
        let digits: String = tform.chars().take_while(|c| c.is_ascii_digit()).collect();
        let repeat = if digits.is_empty() {
            1
        } else {
            digits.parse().ok()?
        };
        let code = match tform[digits.len()..].chars().next()? {
            'L' => FormCode::Logical,
            'X' => FormCode::Bit,
            'B' => FormCode::Byte,
            'I' => FormCode::Int16,
            'J' => FormCode::Int32,
            'K' => FormCode::Int64,
            'A' => FormCode::Char,
            'E' => FormCode::Float32,
            'D' => FormCode::Float64,
            'C' => FormCode::Complex32,
            'M' => FormCode::Complex64,
            'P' => FormCode::DescriptorP,
            'Q' => FormCode::DescriptorQ,
            _ => return None,
        };
        Some(Self { repeat, code })
    }

    /// Bytes occupied in one row; `None` when the repeat count overflows.
    fn width(&self) -> Option<usize> {
        match self.code {
            FormCode::Bit => Some(self.repeat.div_ceil(8)),
            FormCode::Logical | FormCode::Byte | FormCode::Char => Some(self.repeat),
            FormCode::Int16 => self.repeat.checked_mul(2),
            FormCode::Int32 | FormCode::Float32 => self.repeat.checked_mul(4),
            FormCode::Int64 | FormCode::Float64 | FormCode::Complex32 | FormCode::DescriptorP => {
                self.repeat.checked_mul(8)
            }
            FormCode::Complex64 | FormCode::DescriptorQ => self.repeat.checked_mul(16),
        }
    }

    fn is_integer(&self) -> bool {
        matches!(
            self.code,
            FormCode::Byte | FormCode::Int16 | FormCode::Int32 | FormCode::Int64
        )
    }
}

// ---------------------------------------------------------------------------
// Column / BinTable – decoded binary table
// ---------------------------------------------------------------------------

/// Decoded cells of one table column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Scalar numeric cells, scaled by TSCAL/TZERO, TNULL mapped to NaN.
    Numeric(Vec<f64>),
    /// Fixed-width character cells with trailing blanks removed.
    Text(Vec<String>),
    /// Cells this reader does not decode (vector, complex, variable length).
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn numeric(name: &str, values: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            data: ColumnData::Numeric(values),
        }
    }

    pub fn text<S: Into<String>>(name: &str, values: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.to_string(),
            data: ColumnData::Text(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::Unsupported(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_text(&self) -> Option<&[String]> {
        match &self.data {
            ColumnData::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Coerce the column to floating point. Text cells must all parse.
    pub fn to_f64(&self) -> Result<Vec<f64>, FitsError> {
        match &self.data {
            ColumnData::Numeric(v) => Ok(v.clone()),
            ColumnData::Text(cells) => cells
                .iter()
                .map(|cell| {
                    cell.trim().parse::<f64>().map_err(|_| FitsError::NotNumeric {
                        name: self.name.clone(),
                        reason: format!("'{cell}' is not a number"),
                    })
                })
                .collect(),
            ColumnData::Unsupported(tform) => Err(FitsError::UnsupportedColumn {
                name: self.name.clone(),
                tform: tform.clone(),
            }),
        }
    }
}

/// A fully decoded `BINTABLE` extension.
#[derive(Debug, Clone, PartialEq)]
pub struct BinTable {
    pub name: String,
    pub nrows: usize,
    pub columns: Vec<Column>,
}

impl BinTable {
    /// Look a column up by exact name, then case-insensitively.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .or_else(|| self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name)))
    }

    pub fn is_empty(&self) -> bool {
        self.nrows == 0
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

struct ColumnLayout {
    name: String,
    tform: String,
    format: Option<ColumnFormat>,
    offset: usize,
    width: usize,
    scale: f64,
    zero: f64,
    null: Option<i64>,
}

/// Upper bound of `TFIELDS` in a binary table.
const MAX_FIELDS: usize = 999;

/// Decode the main data array of a binary table extension.
pub(crate) fn decode(header: &Header, raw: &[u8]) -> Result<BinTable, FitsError> {
    let row_len = required(header, "NAXIS1")? as usize;
    let nrows = required(header, "NAXIS2")? as usize;
    let tfields = required(header, "TFIELDS")? as usize;

    if tfields > MAX_FIELDS {
        return Err(FitsError::InvalidFormat(format!("TFIELDS {tfields} exceeds {MAX_FIELDS}")));
    }
    if row_len == 0 && nrows > 0 && tfields > 0 {
        return Err(FitsError::InvalidFormat(format!("{nrows} rows of zero width")));
    }
    if row_len.checked_mul(nrows).map_or(true, |needed| raw.len() < needed) {
        return Err(FitsError::InvalidFormat(format!(
            "table data truncated: {} bytes for {nrows} rows of {row_len}",
            raw.len()
        )));
    }

    let mut layouts = Vec::with_capacity(tfields);
    let mut offset = 0usize;
    for i in 1..=tfields {
        let tform = header
            .get_str(&format!("TFORM{i}"))
            .ok_or_else(|| FitsError::MissingKeyword(format!("TFORM{i}")))?
            .to_string();
        let name = header
            .get_str(&format!("TTYPE{i}"))
            .map(str::to_string)
            .unwrap_or_else(|| format!("COL{i}"));
        let format = ColumnFormat::parse(&tform);
        let width = format
            .and_then(|f| f.width())
            .ok_or_else(|| FitsError::InvalidFormat(format!("bad TFORM{i} '{tform}'")))?;
        layouts.push(ColumnLayout {
            name,
            tform,
            format,
            offset,
            width,
            scale: header.get_float(&format!("TSCAL{i}")).unwrap_or(1.0),
            zero: header.get_float(&format!("TZERO{i}")).unwrap_or(0.0),
            null: header.get_int(&format!("TNULL{i}")),
        });
        offset = offset
            .checked_add(width)
            .filter(|&end| end <= row_len)
            .ok_or_else(|| FitsError::InvalidFormat(format!("columns overrun rows of {row_len} bytes")))?;
    }
    let columns = layouts
        .iter()
        .map(|layout| Column {
            name: layout.name.clone(),
            data: decode_column(layout, raw, row_len, nrows),
        })
        .collect();

    Ok(BinTable {
        name: header.get_str("EXTNAME").unwrap_or_default().to_string(),
        nrows,
        columns,
    })
}

fn required(header: &Header, key: &str) -> Result<i64, FitsError> {
    header
        .get_int(key)
        .filter(|v| *v >= 0)
        .ok_or_else(|| FitsError::MissingKeyword(key.to_string()))
}

fn decode_column(layout: &ColumnLayout, raw: &[u8], row_len: usize, nrows: usize) -> ColumnData {
    let Some(format) = layout.format else {
        return ColumnData::Unsupported(layout.tform.clone());
    };
    let cell = |row: usize| {
        let start = row * row_len + layout.offset;
        &raw[start..start + layout.width]
    };

    if format.code == FormCode::Char {
        return ColumnData::Text(
            (0..nrows)
                .map(|row| {
                    String::from_utf8_lossy(cell(row))
                        .trim_end_matches(['\0', ' '])
                        .to_string()
                })
                .collect(),
        );
    }

    if format.repeat != 1 {
        return ColumnData::Unsupported(layout.tform.clone());
    }

    let values = (0..nrows).map(|row| {
        let bytes = cell(row);
        let raw_int = match format.code {
            FormCode::Byte => Some(bytes[0] as i64),
            FormCode::Int16 => Some(i16::from_be_bytes([bytes[0], bytes[1]]) as i64),
            FormCode::Int32 => Some(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64),
            FormCode::Int64 => Some(i64::from_be_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ])),
            _ => None,
        };
        let value = match (raw_int, format.code) {
            (Some(v), _) if format.is_integer() && layout.null == Some(v) => return Some(f64::NAN),
            (Some(v), _) => v as f64,
            (None, FormCode::Float32) => {
                f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
            }
            (None, FormCode::Float64) => f64::from_be_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]),
            (None, FormCode::Logical) => match bytes[0] {
                b'T' => 1.0,
                b'F' => 0.0,
                _ => return Some(f64::NAN),
            },
            _ => return None,
        };
        Some(value * layout.scale + layout.zero)
    });

    match values.collect::<Option<Vec<f64>>>() {
        Some(v) => ColumnData::Numeric(v),
        None => ColumnData::Unsupported(layout.tform.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fits::header::HeaderValue;

    fn table_header(row_len: i64, nrows: i64, forms: &[(&str, &str)]) -> Header {
        let mut header = Header::new()
            .with("XTENSION", HeaderValue::Str("BINTABLE".into()))
            .with("NAXIS1", HeaderValue::Int(row_len))
            .with("NAXIS2", HeaderValue::Int(nrows))
            .with("TFIELDS", HeaderValue::Int(forms.len() as i64));
        for (i, (name, form)) in forms.iter().enumerate() {
            header.set(&format!("TTYPE{}", i + 1), HeaderValue::Str(name.to_string()));
            header.set(&format!("TFORM{}", i + 1), HeaderValue::Str(form.to_string()));
        }
        header
    }

    #[test]
    fn tform_widths() {
        assert_eq!(ColumnFormat::parse("D").and_then(|f| f.width()), Some(8));
        assert_eq!(ColumnFormat::parse("26A").and_then(|f| f.width()), Some(26));
        assert_eq!(ColumnFormat::parse("12X").and_then(|f| f.width()), Some(2));
        assert_eq!(ColumnFormat::parse("1PE(100)").and_then(|f| f.width()), Some(8));
        assert_eq!(ColumnFormat::parse("2305843009213693952D").and_then(|f| f.width()), None);
        assert_eq!(ColumnFormat::parse("Z"), None);
    }

    #[test]
    fn decodes_scaled_integers_with_nulls() {
        let mut header = table_header(2, 3, &[("COUNTS", "I")]);
        header.set("TSCAL1", HeaderValue::Float(0.5));
        header.set("TZERO1", HeaderValue::Float(10.0));
        header.set("TNULL1", HeaderValue::Int(-1));
        let mut raw = Vec::new();
        for v in [4i16, -1, 8] {
            raw.extend_from_slice(&v.to_be_bytes());
        }

        let table = decode(&header, &raw).unwrap();
        let values = table.column("counts").unwrap().to_f64().unwrap();
        assert_eq!(values[0], 12.0);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 14.0);
    }

    #[test]
    fn text_and_vector_columns() {
        let header = table_header(6 + 8, 1, &[("UTC_TIME", "6A"), ("VEC", "2E")]);
        let mut raw = b"2022  ".to_vec();
        raw.extend_from_slice(&1.0f32.to_be_bytes());
        raw.extend_from_slice(&2.0f32.to_be_bytes());

        let table = decode(&header, &raw).unwrap();
        assert_eq!(
            table.column("UTC_TIME").unwrap().as_text(),
            Some(&["2022".to_string()][..])
        );
        assert_eq!(table.column("UTC_TIME").unwrap().to_f64().unwrap(), vec![2022.0]);
        assert!(matches!(
            table.column("VEC").unwrap().to_f64(),
            Err(FitsError::UnsupportedColumn { .. })
        ));
    }

    #[test]
    fn hostile_layouts_are_rejected() {
        let header = table_header(8, 1, &[("BIG", "2305843009213693952D")]);
        assert!(matches!(decode(&header, &[0u8; 8]), Err(FitsError::InvalidFormat(_))));

        let header = table_header(16, 1, &[("A", "1152921504606846975D"), ("B", "1152921504606846975D")]);
        assert!(matches!(decode(&header, &[0u8; 16]), Err(FitsError::InvalidFormat(_))));

        let header = table_header(i64::MAX, 2, &[("FLUX", "D")]);
        assert!(matches!(decode(&header, &[0u8; 16]), Err(FitsError::InvalidFormat(_))));

        let header = table_header(0, 1 << 40, &[("EMPTY", "0D")]);
        assert!(matches!(decode(&header, &[]), Err(FitsError::InvalidFormat(_))));

        let mut header = table_header(8, 1, &[("FLUX", "D")]);
        header.set("TFIELDS", HeaderValue::Int(1 << 40));
        assert!(matches!(decode(&header, &[0u8; 8]), Err(FitsError::InvalidFormat(_))));
    }

    #[test]
    fn truncated_data_is_rejected() {
        let header = table_header(8, 4, &[("FLUX", "D")]);
        assert!(matches!(
            decode(&header, &[0u8; 16]),
            Err(FitsError::InvalidFormat(_))
        ));
    }
}

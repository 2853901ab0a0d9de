use std::fmt;
use voxdown_core::{Error, Result};

/// Encoding of the record block that follows the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Ascii,
    Binary,
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataFormat::Ascii => "ascii",
            DataFormat::Binary => "binary",
        })
    }
}

/// Scalar type of a field, the `TYPE` column of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Float,
    Signed,
    Unsigned,
}

impl FieldKind {
    fn parse(token: &str) -> Result<Self> {
        match token {
            "F" => Ok(FieldKind::Float),
            "I" => Ok(FieldKind::Signed),
            "U" => Ok(FieldKind::Unsigned),
            other => Err(Error::format(format!("unsupported field TYPE {other:?}"))),
        }
    }

    fn letter(self) -> char {
        match self {
            FieldKind::Float => 'F',
            FieldKind::Signed => 'I',
            FieldKind::Unsigned => 'U',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    /// Bytes per element.
    pub size: usize,
    /// Elements per point.
    pub count: usize,
    /// Byte offset of the first element within a binary record.
    pub offset: usize,
    /// Token index of the first element within an ASCII record.
    pub value_index: usize,
}

impl Field {
    fn new(name: &str, kind: FieldKind, size: usize, count: usize) -> Result<Self> {
        let valid = match kind {
            FieldKind::Float => matches!(size, 4 | 8),
            FieldKind::Signed | FieldKind::Unsigned => matches!(size, 1 | 2 | 4 | 8),
        };
        if !valid {
            return Err(Error::format(format!(
                "field {name}: unsupported TYPE {} with SIZE {size}",
                kind.letter()
            )));
        }
        if count == 0 {
            return Err(Error::format(format!("field {name}: COUNT must be >= 1")));
        }
        Ok(Self {
            name: name.to_string(),
            kind,
            size,
            count,
            offset: 0,
            value_index: 0,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PcdHeader {
    pub version: Option<String>,
    pub fields: Vec<Field>,
    pub width: usize,
    pub height: usize,
    pub viewpoint: Option<[f64; 7]>,
    pub points: usize,
    pub data: DataFormat,
    stride: usize,
    values: usize,
}

impl PcdHeader {
    /// Parses the header at the start of `raw`.
    ///
    /// Returns the header and the byte offset of the first record, which
    /// is just past the newline that ends the `DATA` line.
    pub fn parse(raw: &[u8]) -> Result<(Self, usize)> {
        let mut version = None;
        let mut names: Option<Vec<String>> = None;
        let mut sizes: Option<Vec<usize>> = None;
        let mut kinds: Option<Vec<FieldKind>> = None;
        let mut counts: Option<Vec<usize>> = None;
        let mut width: Option<usize> = None;
        let mut height: Option<usize> = None;
        let mut points: Option<usize> = None;
        let mut viewpoint = None;

        let mut pos = 0usize;
        while pos < raw.len() {
            let end = raw[pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(raw.len(), |i| pos + i);
            let next = (end + 1).min(raw.len());
            let line = std::str::from_utf8(&raw[pos..end])
                .map_err(|_| Error::format("header is not valid UTF-8"))?
                .trim();
            pos = next;

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.split_whitespace();
            let keyword = parts.next().unwrap_or_default();
            let values: Vec<&str> = parts.collect();

            match keyword {
                "VERSION" => version = values.first().map(|v| v.to_string()),
                "FIELDS" => {
                    if values.is_empty() {
                        return Err(Error::format("FIELDS line lists no fields"));
                    }
                    names = Some(values.iter().map(|v| v.to_string()).collect());
                }
                "SIZE" => sizes = Some(parse_list(keyword, &values)?),
                "TYPE" => {
                    kinds = Some(
                        values
                            .iter()
                            .map(|v| FieldKind::parse(v))
                            .collect::<Result<_>>()?,
                    )
                }
                "COUNT" => counts = Some(parse_list(keyword, &values)?),
                "WIDTH" => width = Some(parse_single(keyword, &values)?),
                "HEIGHT" => height = Some(parse_single(keyword, &values)?),
                "POINTS" => points = Some(parse_single(keyword, &values)?),
                "VIEWPOINT" => viewpoint = Some(parse_viewpoint(&values)?),
                "DATA" => {
                    let data = match values.first().copied() {
                        Some("ascii") => DataFormat::Ascii,
                        Some("binary") => DataFormat::Binary,
                        Some("binary_compressed") => {
                            return Err(Error::format(
                                "unsupported DATA format binary_compressed",
                            ))
                        }
                        Some(other) => {
                            return Err(Error::format(format!(
                                "unsupported DATA format {other:?}"
                            )))
                        }
                        None => return Err(Error::format("DATA line names no format")),
                    };

                    let (fields, stride, values) = assemble_fields(names, sizes, kinds, counts)?;
                    let height = height.unwrap_or(1);
                    let (width, points) = match (width, points) {
                        (Some(w), Some(p)) => {
                            let declared = w.checked_mul(height);
                            if declared != Some(p) {
                                log::warn!(
                                    "PCD header: POINTS {p} disagrees with WIDTH {w} x HEIGHT {height}, using POINTS"
                                );
                            }
                            (w, p)
                        }
                        (Some(w), None) => {
                            let p = w.checked_mul(height).ok_or_else(|| {
                                Error::format("WIDTH x HEIGHT overflows the point count")
                            })?;
                            (w, p)
                        }
                        (None, Some(p)) => (p, p),
                        (None, None) => {
                            return Err(Error::format("header has neither WIDTH nor POINTS"))
                        }
                    };

                    let header = PcdHeader {
                        version,
                        fields,
                        width,
                        height,
                        viewpoint,
                        points,
                        data,
                        stride,
                        values,
                    };
                    log::debug!(
                        "PCD header: {} points, fields [{}], DATA {}",
                        header.points,
                        header
                            .fields
                            .iter()
                            .map(|f| f.name.as_str())
                            .collect::<Vec<_>>()
                            .join(" "),
                        header.data
                    );
                    return Ok((header, next));
                }
                other => log::warn!("PCD header: ignoring unknown keyword {other:?}"),
            }
        }

        Err(Error::format("missing DATA line"))
    }

    /// Bytes per binary record.
    pub fn point_stride(&self) -> usize {
        self.stride
    }

    /// Tokens per ASCII record.
    pub fn values_per_point(&self) -> usize {
        self.values
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

fn parse_single(keyword: &str, values: &[&str]) -> Result<usize> {
    match values {
        [v] => v
            .parse::<usize>()
            .map_err(|e| Error::format(format!("invalid {keyword} value {v:?}: {e}"))),
        _ => Err(Error::format(format!(
            "{keyword} expects one value, got {}",
            values.len()
        ))),
    }
}

fn parse_list(keyword: &str, values: &[&str]) -> Result<Vec<usize>> {
    values
        .iter()
        .map(|v| {
            v.parse::<usize>()
                .map_err(|e| Error::format(format!("invalid {keyword} value {v:?}: {e}")))
        })
        .collect()
}

fn parse_viewpoint(values: &[&str]) -> Result<[f64; 7]> {
    if values.len() != 7 {
        return Err(Error::format(format!(
            "VIEWPOINT expects 7 values, got {}",
            values.len()
        )));
    }
    let mut vp = [0.0; 7];
    for (slot, v) in vp.iter_mut().zip(values) {
        *slot = v
            .parse::<f64>()
            .map_err(|e| Error::format(format!("invalid VIEWPOINT value {v:?}: {e}")))?;
    }
    Ok(vp)
}

/// Lays the fields out in declaration order. Also returns the binary record
/// size in bytes and the ASCII token count per record.
fn assemble_fields(
    names: Option<Vec<String>>,
    sizes: Option<Vec<usize>>,
    kinds: Option<Vec<FieldKind>>,
    counts: Option<Vec<usize>>,
) -> Result<(Vec<Field>, usize, usize)> {
    let names = names.ok_or_else(|| Error::format("missing FIELDS line"))?;
    let sizes = sizes.ok_or_else(|| Error::format("missing SIZE line"))?;
    let kinds = kinds.ok_or_else(|| Error::format("missing TYPE line"))?;
    let counts = counts.unwrap_or_else(|| vec![1; names.len()]);

    for (keyword, len) in [("SIZE", sizes.len()), ("TYPE", kinds.len()), ("COUNT", counts.len())] {
        if len != names.len() {
            return Err(Error::format(format!(
                "{keyword} has {len} entries for {} fields",
                names.len()
            )));
        }
    }

    let mut fields = Vec::with_capacity(names.len());
    let mut offset = 0usize;
    let mut value_index = 0usize;
    for (((name, size), kind), count) in names.iter().zip(sizes).zip(kinds).zip(counts) {
        let mut field = Field::new(name, kind, size, count)?;
        field.offset = offset;
        field.value_index = value_index;
        offset = size
            .checked_mul(count)
            .and_then(|bytes| offset.checked_add(bytes))
            .ok_or_else(|| Error::format(format!("field {name}: record size overflows")))?;
        value_index = value_index
            .checked_add(count)
            .ok_or_else(|| Error::format(format!("field {name}: value count overflows")))?;
        fields.push(field);
    }
    Ok((fields, offset, value_index))
}

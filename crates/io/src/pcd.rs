use crate::header::{DataFormat, Field, FieldKind, PcdHeader};
use std::fs;
use std::io::Write as _;
use std::path::Path;
use tempfile::NamedTempFile;
use voxdown_core::{Colors, Error, Normals, PointCloud, Result};

/// Reads a PCD file (ASCII or binary format).
pub fn read_pcd(path: impl AsRef<Path>) -> Result<PointCloud> {
    let path = path.as_ref();
    let raw = fs::read(path).map_err(|e| Error::io(path, e))?;
    decode(&raw)
}

/// Writes a PCD file, replacing `path` atomically.
///
/// The cloud is encoded before the filesystem is touched, then written to
/// a temporary file next to `path` and renamed over it.
pub fn write_pcd(path: impl AsRef<Path>, cloud: &PointCloud, format: DataFormat) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode(cloud, format)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(path, e))?;
    tmp.write_all(&bytes).map_err(|e| Error::io(path, e))?;
    // Temp files are created 0600; keep the replaced file's mode, or 0644.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(path).map_or(0o644, |m| m.permissions().mode());
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(mode))
            .map_err(|e| Error::io(path, e))?;
    }
    tmp.as_file().sync_all().map_err(|e| Error::io(path, e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}

/// Decodes a whole PCD file held in memory.
pub fn decode(raw: &[u8]) -> Result<PointCloud> {
    let (header, body_offset) = PcdHeader::parse(raw)?;
    let layout = Layout::resolve(&header)?;
    let body = &raw[body_offset..];

    let mut cloud = layout.empty_cloud(header.points);
    match header.data {
        DataFormat::Ascii => decode_ascii(body, &header, &layout, &mut cloud)?,
        DataFormat::Binary => decode_binary(body, &header, &layout, &mut cloud)?,
    }
    Ok(cloud)
}

/// Encodes a cloud as PCD v0.7.
///
/// Coordinates, normals and intensity are written as `F 4`; colors as a
/// packed `rgb` float, the convention PCL uses.
pub fn encode(cloud: &PointCloud, format: DataFormat) -> Result<Vec<u8>> {
    cloud.validate()?;

    let mut names = vec!["x", "y", "z"];
    if cloud.normals.is_some() {
        names.extend(["normal_x", "normal_y", "normal_z"]);
    }
    if cloud.colors.is_some() {
        names.push("rgb");
    }
    if cloud.intensity.is_some() {
        names.push("intensity");
    }
    let columns = |item: &str| vec![item; names.len()].join(" ");

    let mut header = String::new();
    header.push_str("# .PCD v0.7 - Point Cloud Data file format\n");
    header.push_str("VERSION 0.7\n");
    header.push_str(&format!("FIELDS {}\n", names.join(" ")));
    header.push_str(&format!("SIZE {}\n", columns("4")));
    header.push_str(&format!("TYPE {}\n", columns("F")));
    header.push_str(&format!("COUNT {}\n", columns("1")));
    header.push_str(&format!("WIDTH {}\n", cloud.len()));
    header.push_str("HEIGHT 1\n");
    header.push_str("VIEWPOINT 0 0 0 1 0 0 0\n");
    header.push_str(&format!("POINTS {}\n", cloud.len()));
    header.push_str(&format!("DATA {format}\n"));

    let mut buf = header.into_bytes();
    match format {
        DataFormat::Ascii => encode_ascii(cloud, &mut buf),
        DataFormat::Binary => encode_binary(cloud, &mut buf, names.len()),
    }
    Ok(buf)
}

// --- Internal helpers ---

/// Positions, in `PcdHeader::fields`, of the fields the cloud stores.
struct Layout {
    xyz: [usize; 3],
    normals: Option<[usize; 3]>,
    rgb: Option<usize>,
    intensity: Option<usize>,
}

impl Layout {
    fn resolve(header: &PcdHeader) -> Result<Self> {
        let find = |names: &[&str]| -> Result<Option<usize>> {
            let mut found = None;
            for (idx, field) in header.fields.iter().enumerate() {
                if !names.contains(&field.name.as_str()) {
                    continue;
                }
                if found.is_some() {
                    return Err(Error::format(format!("duplicate field {}", field.name)));
                }
                if field.count != 1 {
                    return Err(Error::format(format!(
                        "field {} must have COUNT 1, got {}",
                        field.name, field.count
                    )));
                }
                found = Some(idx);
            }
            Ok(found)
        };

        let x = find(&["x"])?;
        let y = find(&["y"])?;
        let z = find(&["z"])?;
        let xyz = match (x, y, z) {
            (Some(x), Some(y), Some(z)) => [x, y, z],
            _ => return Err(Error::format("PCD file missing x, y, z fields")),
        };

        let normals = match (
            find(&["normal_x", "nx"])?,
            find(&["normal_y", "ny"])?,
            find(&["normal_z", "nz"])?,
        ) {
            (Some(nx), Some(ny), Some(nz)) => Some([nx, ny, nz]),
            (None, None, None) => None,
            _ => {
                log::warn!("PCD file has an incomplete set of normal fields, ignoring normals");
                None
            }
        };

        let rgb = find(&["rgb", "rgba"])?;
        if let Some(idx) = rgb {
            let field = &header.fields[idx];
            if field.size != 4 {
                return Err(Error::format(format!(
                    "field {} must be 4 bytes, got {}",
                    field.name, field.size
                )));
            }
        }

        let intensity = find(&["intensity"])?;

        Ok(Self {
            xyz,
            normals,
            rgb,
            intensity,
        })
    }

    fn empty_cloud(&self, capacity: usize) -> PointCloud {
        // A corrupt POINTS value must not trigger a huge allocation up front.
        let capacity = capacity.min(1 << 20);
        let mut cloud = PointCloud::new();
        cloud.x.reserve(capacity);
        cloud.y.reserve(capacity);
        cloud.z.reserve(capacity);
        cloud.normals = self.normals.map(|_| Normals::with_capacity(capacity));
        cloud.colors = self.rgb.map(|_| Colors::with_capacity(capacity));
        cloud.intensity = self.intensity.map(|_| Vec::with_capacity(capacity));
        cloud
    }
}

/// One point's worth of raw field data.
trait Record {
    fn scalar(&self, field: &Field) -> Result<f64>;
    fn packed(&self, field: &Field) -> Result<u32>;
}

struct BinaryRecord<'a>(&'a [u8]);

impl BinaryRecord<'_> {
    fn bytes<const N: usize>(&self, field: &Field) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.0[field.offset..field.offset + N]);
        out
    }
}

impl Record for BinaryRecord<'_> {
    fn scalar(&self, field: &Field) -> Result<f64> {
        Ok(match (field.kind, field.size) {
            (FieldKind::Float, 4) => f64::from(f32::from_le_bytes(self.bytes(field))),
            (FieldKind::Float, 8) => f64::from_le_bytes(self.bytes(field)),
            (FieldKind::Unsigned, 1) => f64::from(self.0[field.offset]),
            (FieldKind::Unsigned, 2) => f64::from(u16::from_le_bytes(self.bytes(field))),
            (FieldKind::Unsigned, 4) => f64::from(u32::from_le_bytes(self.bytes(field))),
            (FieldKind::Unsigned, 8) => u64::from_le_bytes(self.bytes(field)) as f64,
            (FieldKind::Signed, 1) => f64::from(self.0[field.offset] as i8),
            (FieldKind::Signed, 2) => f64::from(i16::from_le_bytes(self.bytes(field))),
            (FieldKind::Signed, 4) => f64::from(i32::from_le_bytes(self.bytes(field))),
            (FieldKind::Signed, 8) => i64::from_le_bytes(self.bytes(field)) as f64,
            (kind, size) => {
                return Err(Error::format(format!(
                    "field {}: cannot read {kind:?} of size {size}",
                    field.name
                )))
            }
        })
    }

    fn packed(&self, field: &Field) -> Result<u32> {
        // Float-typed rgb is the same 32 bits reinterpreted.
        Ok(u32::from_le_bytes(self.bytes(field)))
    }
}

struct AsciiRecord<'a> {
    tokens: Vec<&'a str>,
    line: usize,
}

impl AsciiRecord<'_> {
    fn token(&self, field: &Field) -> &str {
        self.tokens[field.value_index]
    }

    fn invalid(&self, field: &Field, detail: impl std::fmt::Display) -> Error {
        Error::format(format!(
            "line {}: invalid {} value {:?}: {detail}",
            self.line,
            field.name,
            self.token(field)
        ))
    }
}

impl Record for AsciiRecord<'_> {
    fn scalar(&self, field: &Field) -> Result<f64> {
        let token = self.token(field);
        match field.kind {
            // Parsing 4-byte floats directly keeps f32 text bit-exact.
            FieldKind::Float if field.size == 4 => token
                .parse::<f32>()
                .map(f64::from)
                .map_err(|e| self.invalid(field, e)),
            FieldKind::Float => token.parse::<f64>().map_err(|e| self.invalid(field, e)),
            FieldKind::Unsigned => token
                .parse::<u64>()
                .map(|v| v as f64)
                .map_err(|e| self.invalid(field, e)),
            FieldKind::Signed => token
                .parse::<i64>()
                .map(|v| v as f64)
                .map_err(|e| self.invalid(field, e)),
        }
    }

    fn packed(&self, field: &Field) -> Result<u32> {
        let token = self.token(field);
        match field.kind {
            FieldKind::Float => token
                .parse::<f32>()
                .map(f32::to_bits)
                .map_err(|e| self.invalid(field, e)),
            FieldKind::Unsigned => token.parse::<u32>().map_err(|e| self.invalid(field, e)),
            FieldKind::Signed => token
                .parse::<i32>()
                .map(|v| v as u32)
                .map_err(|e| self.invalid(field, e)),
        }
    }
}

fn push_record(
    record: &impl Record,
    header: &PcdHeader,
    layout: &Layout,
    cloud: &mut PointCloud,
) -> Result<()> {
    let fields = &header.fields;
    let [ix, iy, iz] = layout.xyz;
    cloud.x.push(record.scalar(&fields[ix])? as f32);
    cloud.y.push(record.scalar(&fields[iy])? as f32);
    cloud.z.push(record.scalar(&fields[iz])? as f32);

    if let (Some([inx, iny, inz]), Some(normals)) = (layout.normals, cloud.normals.as_mut()) {
        normals.push([
            record.scalar(&fields[inx])? as f32,
            record.scalar(&fields[iny])? as f32,
            record.scalar(&fields[inz])? as f32,
        ]);
    }

    if let (Some(irgb), Some(colors)) = (layout.rgb, cloud.colors.as_mut()) {
        colors.push(unpack_rgb(record.packed(&fields[irgb])?));
    }

    if let (Some(ii), Some(intensity)) = (layout.intensity, cloud.intensity.as_mut()) {
        intensity.push(record.scalar(&fields[ii])? as f32);
    }

    Ok(())
}

fn decode_ascii(
    body: &[u8],
    header: &PcdHeader,
    layout: &Layout,
    cloud: &mut PointCloud,
) -> Result<()> {
    let text = std::str::from_utf8(body)
        .map_err(|e| Error::format(format!("ASCII body is not valid UTF-8: {e}")))?;
    let expected = header.values_per_point();

    let mut records = 0usize;
    let mut extra = 0usize;
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if records == header.points {
            extra += 1;
            continue;
        }

        let record = AsciiRecord {
            tokens: line.split_whitespace().collect(),
            line: lineno + 1,
        };
        if record.tokens.len() != expected {
            return Err(Error::format(format!(
                "record {} has {} values, expected {}",
                records,
                record.tokens.len(),
                expected
            )));
        }
        push_record(&record, header, layout, cloud)?;
        records += 1;
    }

    if records < header.points {
        return Err(Error::format(format!(
            "truncated ASCII data: {} of {} points present",
            records, header.points
        )));
    }
    if extra > 0 {
        log::warn!("PCD body: ignoring {extra} records beyond POINTS {}", header.points);
    }
    Ok(())
}

fn decode_binary(
    body: &[u8],
    header: &PcdHeader,
    layout: &Layout,
    cloud: &mut PointCloud,
) -> Result<()> {
    let stride = header.point_stride();
    let expected = header
        .points
        .checked_mul(stride)
        .ok_or_else(|| Error::format("POINTS x record size overflows"))?;

    if body.len() < expected {
        return Err(Error::format(format!(
            "truncated binary data: have {} bytes, expected {} ({} points x {} bytes)",
            body.len(),
            expected,
            header.points,
            stride
        )));
    }

    if stride > 0 {
        for row in body[..expected].chunks_exact(stride) {
            push_record(&BinaryRecord(row), header, layout, cloud)?;
        }
    }
    Ok(())
}

fn pack_rgb(c: [u8; 3]) -> u32 {
    (u32::from(c[0]) << 16) | (u32::from(c[1]) << 8) | u32::from(c[2])
}

fn unpack_rgb(packed: u32) -> [u8; 3] {
    [(packed >> 16) as u8, (packed >> 8) as u8, packed as u8]
}

fn encode_ascii(cloud: &PointCloud, out: &mut Vec<u8>) {
    let mut line = String::new();
    for i in 0..cloud.len() {
        line.clear();
        line.push_str(&format!("{} {} {}", cloud.x[i], cloud.y[i], cloud.z[i]));

        if let Some(normals) = &cloud.normals {
            line.push_str(&format!(
                " {} {} {}",
                normals.nx[i], normals.ny[i], normals.nz[i]
            ));
        }

        if let Some(colors) = &cloud.colors {
            // Packed colors are tiny floats; scientific notation keeps them short.
            let packed = f32::from_bits(pack_rgb(colors.get(i)));
            line.push_str(&format!(" {packed:e}"));
        }

        if let Some(intensity) = &cloud.intensity {
            line.push_str(&format!(" {}", intensity[i]));
        }

        line.push('\n');
        out.extend_from_slice(line.as_bytes());
    }
}

fn encode_binary(cloud: &PointCloud, out: &mut Vec<u8>, num_fields: usize) {
    out.reserve(cloud.len() * num_fields * 4);
    for i in 0..cloud.len() {
        out.extend_from_slice(&cloud.x[i].to_le_bytes());
        out.extend_from_slice(&cloud.y[i].to_le_bytes());
        out.extend_from_slice(&cloud.z[i].to_le_bytes());

        if let Some(normals) = &cloud.normals {
            out.extend_from_slice(&normals.nx[i].to_le_bytes());
            out.extend_from_slice(&normals.ny[i].to_le_bytes());
            out.extend_from_slice(&normals.nz[i].to_le_bytes());
        }

        if let Some(colors) = &cloud.colors {
            out.extend_from_slice(&pack_rgb(colors.get(i)).to_le_bytes());
        }

        if let Some(intensity) = &cloud.intensity {
            out.extend_from_slice(&intensity[i].to_le_bytes());
        }
    }
}

use hashbrown::HashMap;
use voxdown_core::{Colors, Error, Normals, PointCloud, Result};

/// Integer cell coordinates of the voxel containing a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VoxelKey {
    pub i: i64,
    pub j: i64,
    pub k: i64,
}

impl VoxelKey {
    /// Floors each coordinate divided by `voxel_size`.
    ///
    /// Returns `None` when a coordinate is not finite or its cell index
    /// does not fit in an `i64`.
    pub fn of(point: [f32; 3], voxel_size: f64) -> Option<Self> {
        let cell = |v: f32| -> Option<i64> {
            let q = (f64::from(v) / voxel_size).floor();
            // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
            (q.is_finite() && q >= i64::MIN as f64 && q < i64::MAX as f64).then_some(q as i64)
        };
        Some(Self {
            i: cell(point[0])?,
            j: cell(point[1])?,
            k: cell(point[2])?,
        })
    }
}

pub fn check_voxel_size(voxel_size: f32) -> Result<()> {
    if voxel_size.is_finite() && voxel_size > 0.0 {
        Ok(())
    } else {
        Err(Error::invalid_parameter(format!(
            "voxel_size must be > 0 and finite, got {voxel_size}"
        )))
    }
}

#[derive(Default)]
struct VoxelAccum {
    sx: f64,
    sy: f64,
    sz: f64,
    normal: [f64; 3],
    color: [f64; 3],
    intensity: f64,
    n: usize,
    members: Vec<usize>,
}

/// Replaces the points inside each occupied voxel with their centroid.
///
/// Output order is ascending [`VoxelKey`]. Normals, colors and intensity
/// are averaged when the input carries them. Points with a non-finite
/// coordinate are dropped.
pub fn voxel_downsample(cloud: &PointCloud, voxel_size: f32) -> Result<PointCloud> {
    reduce(cloud, voxel_size, false).map(|(out, _)| out)
}

/// Like [`voxel_downsample`], also returning for each output point the
/// ascending indices of the input points merged into it.
pub fn voxel_downsample_with_trace(
    cloud: &PointCloud,
    voxel_size: f32,
) -> Result<(PointCloud, Vec<Vec<usize>>)> {
    reduce(cloud, voxel_size, true)
}

fn reduce(
    cloud: &PointCloud,
    voxel_size: f32,
    trace: bool,
) -> Result<(PointCloud, Vec<Vec<usize>>)> {
    check_voxel_size(voxel_size)?;
    cloud.validate()?;

    let size = f64::from(voxel_size);
    let mut bins: HashMap<VoxelKey, VoxelAccum> = HashMap::new();
    let mut skipped = 0usize;

    for i in 0..cloud.len() {
        let p = cloud.point(i);
        if !p.iter().all(|v| v.is_finite()) {
            skipped += 1;
            continue;
        }

        let key = VoxelKey::of(p, size).ok_or_else(|| {
            Error::invalid_parameter(format!(
                "voxel size {voxel_size} is too small for point ({}, {}, {})",
                p[0], p[1], p[2]
            ))
        })?;

        let a = bins.entry(key).or_default();
        a.sx += f64::from(p[0]);
        a.sy += f64::from(p[1]);
        a.sz += f64::from(p[2]);
        if let Some(normals) = &cloud.normals {
            for (acc, v) in a.normal.iter_mut().zip(normals.get(i)) {
                *acc += f64::from(v);
            }
        }
        if let Some(colors) = &cloud.colors {
            for (acc, v) in a.color.iter_mut().zip(colors.get(i)) {
                *acc += f64::from(v);
            }
        }
        if let Some(intensity) = &cloud.intensity {
            a.intensity += f64::from(intensity[i]);
        }
        a.n += 1;
        if trace {
            a.members.push(i);
        }
    }

    if skipped > 0 {
        log::debug!("voxel_downsample: skipped {skipped} non-finite points");
    }

    let mut voxels: Vec<(VoxelKey, VoxelAccum)> = bins.into_iter().collect();
    voxels.sort_unstable_by_key(|(key, _)| *key);

    let n = voxels.len();
    let mut out = PointCloud::new();
    out.x.reserve(n);
    out.y.reserve(n);
    out.z.reserve(n);
    out.normals = cloud.normals.as_ref().map(|_| Normals::with_capacity(n));
    out.colors = cloud.colors.as_ref().map(|_| Colors::with_capacity(n));
    out.intensity = cloud.intensity.as_ref().map(|_| Vec::with_capacity(n));

    let mut traces = Vec::with_capacity(if trace { n } else { 0 });

    for (_, a) in voxels {
        let denom = a.n as f64;
        out.x.push((a.sx / denom) as f32);
        out.y.push((a.sy / denom) as f32);
        out.z.push((a.sz / denom) as f32);
        if let Some(normals) = out.normals.as_mut() {
            normals.push(a.normal.map(|s| (s / denom) as f32));
        }
        if let Some(colors) = out.colors.as_mut() {
            colors.push(a.color.map(|s| (s / denom).round().clamp(0.0, 255.0) as u8));
        }
        if let Some(intensity) = out.intensity.as_mut() {
            intensity.push((a.intensity / denom) as f32);
        }
        if trace {
            traces.push(a.members);
        }
    }

    log::debug!(
        "voxel_downsample: {} points -> {} voxels at size {voxel_size}",
        cloud.len(),
        out.len()
    );

    Ok((out, traces))
}

use crate::{Aabb, Error, Point, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub z: Vec<f32>,
    pub normals: Option<Normals>,
    pub colors: Option<Colors>,
    pub intensity: Option<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Normals {
    pub nx: Vec<f32>,
    pub ny: Vec<f32>,
    pub nz: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Colors {
    pub r: Vec<u8>,
    pub g: Vec<u8>,
    pub b: Vec<u8>,
}

impl Normals {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            nx: Vec::with_capacity(n),
            ny: Vec::with_capacity(n),
            nz: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, n: [f32; 3]) {
        self.nx.push(n[0]);
        self.ny.push(n[1]);
        self.nz.push(n[2]);
    }

    pub fn get(&self, i: usize) -> [f32; 3] {
        [self.nx[i], self.ny[i], self.nz[i]]
    }

    fn uniform_len(&self) -> Option<usize> {
        let n = self.nx.len();
        (self.ny.len() == n && self.nz.len() == n).then_some(n)
    }
}

impl Colors {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            r: Vec::with_capacity(n),
            g: Vec::with_capacity(n),
            b: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, c: [u8; 3]) {
        self.r.push(c[0]);
        self.g.push(c[1]);
        self.b.push(c[2]);
    }

    pub fn get(&self, i: usize) -> [u8; 3] {
        [self.r[i], self.g[i], self.b[i]]
    }

    fn uniform_len(&self) -> Option<usize> {
        let n = self.r.len();
        (self.g.len() == n && self.b.len() == n).then_some(n)
    }
}

impl PointCloud {
    pub fn new() -> Self {
        Self {
            x: Vec::new(),
            y: Vec::new(),
            z: Vec::new(),
            normals: None,
            colors: None,
            intensity: None,
        }
    }

    pub fn from_xyz(x: Vec<f32>, y: Vec<f32>, z: Vec<f32>) -> Self {
        assert_eq!(x.len(), y.len(), "x and y must have same length");
        assert_eq!(x.len(), z.len(), "x and z must have same length");

        Self {
            x,
            y,
            z,
            normals: None,
            colors: None,
            intensity: None,
        }
    }

    /// Builds a cloud from point records.
    ///
    /// The first point decides which attributes the cloud carries; every
    /// other point must carry exactly the same set.
    pub fn from_points(points: &[Point]) -> Result<Self> {
        let n = points.len();
        let mut cloud = Self {
            x: Vec::with_capacity(n),
            y: Vec::with_capacity(n),
            z: Vec::with_capacity(n),
            normals: None,
            colors: None,
            intensity: None,
        };

        let Some(first) = points.first() else {
            return Ok(cloud);
        };
        if first.normal.is_some() {
            cloud.normals = Some(Normals::with_capacity(n));
        }
        if first.color.is_some() {
            cloud.colors = Some(Colors::with_capacity(n));
        }
        if first.intensity.is_some() {
            cloud.intensity = Some(Vec::with_capacity(n));
        }

        for (i, p) in points.iter().enumerate() {
            let consistent = p.normal.is_some() == cloud.normals.is_some()
                && p.color.is_some() == cloud.colors.is_some()
                && p.intensity.is_some() == cloud.intensity.is_some();
            if !consistent {
                return Err(Error::invalid_parameter(format!(
                    "point {i} carries a different attribute set than point 0"
                )));
            }
            cloud.push(p);
        }

        Ok(cloud)
    }

    /// Appends a point. Attributes the cloud does not carry are ignored;
    /// attributes the cloud carries but the point lacks are zero-filled.
    pub fn push(&mut self, p: &Point) {
        self.x.push(p.position[0]);
        self.y.push(p.position[1]);
        self.z.push(p.position[2]);
        if let Some(normals) = self.normals.as_mut() {
            normals.push(p.normal.unwrap_or_default());
        }
        if let Some(colors) = self.colors.as_mut() {
            colors.push(p.color.unwrap_or_default());
        }
        if let Some(intensity) = self.intensity.as_mut() {
            intensity.push(p.intensity.unwrap_or_default());
        }
    }

    pub fn len(&self) -> usize {
        debug_assert_eq!(self.x.len(), self.y.len());
        debug_assert_eq!(self.x.len(), self.z.len());
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_xyz(&self.x, &self.y, &self.z)
    }

    pub fn point(&self, i: usize) -> [f32; 3] {
        [self.x[i], self.y[i], self.z[i]]
    }

    /// Full record for point `i`, including every attribute the cloud carries.
    pub fn get(&self, i: usize) -> Point {
        Point {
            position: self.point(i),
            normal: self.normals.as_ref().map(|n| n.get(i)),
            color: self.colors.as_ref().map(|c| c.get(i)),
            intensity: self.intensity.as_ref().map(|it| it[i]),
        }
    }

    pub fn iter_points(&self) -> impl Iterator<Item = [f32; 3]> + '_ {
        self.x
            .iter()
            .zip(&self.y)
            .zip(&self.z)
            .map(|((x, y), z)| [*x, *y, *z])
    }

    pub fn iter(&self) -> impl Iterator<Item = Point> + '_ {
        (0..self.len()).map(|i| self.get(i))
    }

    /// Checks that every coordinate and attribute array has one entry per point.
    ///
    /// The fields are public, so a caller can build a cloud whose arrays
    /// disagree; encoders call this before writing anything.
    pub fn validate(&self) -> Result<()> {
        let n = self.x.len();
        if self.y.len() != n || self.z.len() != n {
            return Err(Error::invalid_parameter(format!(
                "coordinate arrays disagree: x={}, y={}, z={}",
                n,
                self.y.len(),
                self.z.len()
            )));
        }
        if let Some(normals) = &self.normals {
            if normals.uniform_len() != Some(n) {
                return Err(Error::invalid_parameter(format!(
                    "cloud has {n} points but normals of length {}/{}/{}",
                    normals.nx.len(),
                    normals.ny.len(),
                    normals.nz.len()
                )));
            }
        }
        if let Some(colors) = &self.colors {
            if colors.uniform_len() != Some(n) {
                return Err(Error::invalid_parameter(format!(
                    "cloud has {n} points but colors of length {}/{}/{}",
                    colors.r.len(),
                    colors.g.len(),
                    colors.b.len()
                )));
            }
        }
        if let Some(intensity) = &self.intensity {
            if intensity.len() != n {
                return Err(Error::invalid_parameter(format!(
                    "cloud has {n} points but {} intensity values",
                    intensity.len()
                )));
            }
        }
        Ok(())
    }
}

impl Default for PointCloud {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{Colors, Normals, PointCloud};
    use crate::{Error, Point};
    use proptest::prelude::*;

    #[test]
    fn new_is_empty() {
        let cloud = PointCloud::new();
        assert!(cloud.is_empty());
        assert_eq!(cloud.len(), 0);
        assert!(cloud.validate().is_ok());
    }

    #[test]
    fn from_xyz_builds_cloud() {
        let cloud = PointCloud::from_xyz(vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]);
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.point(0), [1.0, 3.0, 5.0]);
        assert_eq!(cloud.point(1), [2.0, 4.0, 6.0]);
    }

    #[test]
    fn iter_points_yields_xyz_tuples() {
        let cloud = PointCloud::from_xyz(vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]);
        let pts: Vec<[f32; 3]> = cloud.iter_points().collect();
        assert_eq!(pts, vec![[1.0, 3.0, 5.0], [2.0, 4.0, 6.0]]);
    }

    #[test]
    fn from_points_carries_attributes() {
        let points = [
            Point::new(0.0, 1.0, 2.0).with_color([1, 2, 3]).with_intensity(0.25),
            Point::new(3.0, 4.0, 5.0).with_color([4, 5, 6]).with_intensity(0.75),
        ];
        let cloud = PointCloud::from_points(&points).unwrap();
        assert_eq!(cloud.len(), 2);
        assert!(cloud.normals.is_none());
        assert_eq!(cloud.colors.as_ref().unwrap().g, vec![2, 5]);
        assert_eq!(cloud.intensity, Some(vec![0.25, 0.75]));
        let back: Vec<Point> = cloud.iter().collect();
        assert_eq!(back, points);
    }

    #[test]
    fn from_points_rejects_mixed_attributes() {
        let points = [
            Point::new(0.0, 0.0, 0.0).with_normal([0.0, 0.0, 1.0]),
            Point::new(1.0, 1.0, 1.0),
        ];
        let err = PointCloud::from_points(&points).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn from_points_empty() {
        let cloud = PointCloud::from_points(&[]).unwrap();
        assert!(cloud.is_empty());
    }

    #[test]
    fn push_zero_fills_missing_attributes() {
        let mut cloud = PointCloud::new();
        cloud.colors = Some(Colors::default());
        cloud.push(&Point::new(1.0, 2.0, 3.0));
        assert_eq!(cloud.get(0).color, Some([0, 0, 0]));
        assert!(cloud.validate().is_ok());
    }

    #[test]
    fn validate_catches_short_attribute_arrays() {
        let mut cloud = PointCloud::from_xyz(vec![0.0, 1.0], vec![0.0; 2], vec![0.0; 2]);
        cloud.normals = Some(Normals {
            nx: vec![0.0, 0.0],
            ny: vec![0.0],
            nz: vec![1.0, 1.0],
        });
        assert!(matches!(cloud.validate(), Err(Error::InvalidParameter(_))));

        cloud.normals = None;
        cloud.intensity = Some(vec![1.0]);
        assert!(matches!(cloud.validate(), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn aabb_spans_all_points() {
        let cloud = PointCloud::from_xyz(vec![-1.0, 2.0], vec![3.0, -4.0], vec![5.0, 6.0]);
        let aabb = cloud.aabb();
        assert_eq!(aabb.min, [-1.0, -4.0, 5.0]);
        assert_eq!(aabb.max, [2.0, 3.0, 6.0]);
    }

    #[test]
    fn aabb_ignores_nan() {
        let cloud = PointCloud::from_xyz(
            vec![0.0, f32::NAN, 2.0],
            vec![1.0, 2.0, 3.0],
            vec![4.0, 5.0, 6.0],
        );
        let aabb = cloud.aabb();
        assert_eq!(aabb.min, [0.0, 1.0, 4.0]);
        assert_eq!(aabb.max, [2.0, 3.0, 6.0]);
    }

    #[test]
    #[should_panic]
    fn from_xyz_panics_on_mismatch() {
        let _ = PointCloud::from_xyz(vec![1.0], vec![2.0, 3.0], vec![4.0]);
    }

    proptest! {
        #[test]
        fn from_points_then_iter_preserves_records(
            pts in prop::collection::vec(
                (-1000.0f32..1000.0f32, -1000.0f32..1000.0f32, -1000.0f32..1000.0f32, any::<[u8; 3]>()),
                0..300
            )
        ) {
            let points: Vec<Point> = pts
                .iter()
                .map(|&(x, y, z, c)| Point::new(x, y, z).with_color(c))
                .collect();
            let cloud = PointCloud::from_points(&points).unwrap();
            prop_assert_eq!(cloud.len(), points.len());
            prop_assert!(cloud.validate().is_ok());
            let back: Vec<Point> = cloud.iter().collect();
            prop_assert_eq!(back, points);
        }

        #[test]
        fn aabb_bounds_all_finite_points(
            pts in prop::collection::vec((-1000.0f32..1000.0f32, -1000.0f32..1000.0f32, -1000.0f32..1000.0f32), 1..500)
        ) {
            let cloud = PointCloud::from_xyz(
                pts.iter().map(|p| p.0).collect(),
                pts.iter().map(|p| p.1).collect(),
                pts.iter().map(|p| p.2).collect(),
            );
            let aabb = cloud.aabb();
            for p in cloud.iter_points() {
                for axis in 0..3 {
                    prop_assert!(aabb.min[axis] <= p[axis] && p[axis] <= aabb.max[axis]);
                }
            }
        }
    }
}

/// Bounds of the finite points of a cloud. Non-finite points never widen it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    pub fn empty() -> Self {
        Self {
            min: [f32::INFINITY; 3],
            max: [f32::NEG_INFINITY; 3],
        }
    }

    /// True until a finite point has been added.
    pub fn is_empty(&self) -> bool {
        self.min[0] > self.max[0]
    }

    pub fn expand_with_point(&mut self, point: [f32; 3]) {
        if point.iter().any(|v| !v.is_finite()) {
            return;
        }
        for ((lo, hi), v) in self.min.iter_mut().zip(&mut self.max).zip(point) {
            *lo = lo.min(v);
            *hi = hi.max(v);
        }
    }

    /// Edge lengths along x, y and z; zero for an empty box.
    pub fn extent(&self) -> [f32; 3] {
        if self.is_empty() {
            return [0.0; 3];
        }
        std::array::from_fn(|axis| self.max[axis] - self.min[axis])
    }

    pub fn from_xyz(x: &[f32], y: &[f32], z: &[f32]) -> Self {
        x.iter()
            .zip(y)
            .zip(z)
            .fold(Self::empty(), |mut aabb, ((&x, &y), &z)| {
                aabb.expand_with_point([x, y, z]);
                aabb
            })
    }
}

#[cfg(test)]
mod tests {
    use super::Aabb;

    #[test]
    fn empty_box_has_no_extent() {
        let aabb = Aabb::empty();
        assert!(aabb.is_empty());
        assert_eq!(aabb.extent(), [0.0; 3]);
        assert_eq!(Aabb::from_xyz(&[f32::NAN], &[0.0], &[0.0]), aabb);
    }

    #[test]
    fn single_point_is_not_empty() {
        let mut aabb = Aabb::default();
        aabb.expand_with_point([1.0, -2.0, 3.0]);
        assert!(!aabb.is_empty());
        assert_eq!(aabb.min, aabb.max);
        assert_eq!(aabb.extent(), [0.0; 3]);
    }

    #[test]
    fn extent_spans_finite_points() {
        let aabb = Aabb::from_xyz(&[0.0, 4.0, f32::NAN], &[1.0, 3.0, 9.0], &[-1.0, 5.0, 9.0]);
        assert_eq!(aabb.min, [0.0, 1.0, -1.0]);
        assert_eq!(aabb.max, [4.0, 3.0, 5.0]);
        assert_eq!(aabb.extent(), [4.0, 2.0, 6.0]);
    }
}

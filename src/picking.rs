use glam::{Mat4, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit direction.
    pub dir: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, dir: Vec3) -> Option<Self> {
        if !origin.is_finite() || !dir.is_finite() || dir.length_squared() <= f32::EPSILON {
            return None;
        }
        Some(Self { origin, dir: dir.normalize() })
    }

    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin + self.dir * distance
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Aabb = Aabb { min: Vec3::splat(f32::INFINITY), max: Vec3::splat(f32::NEG_INFINITY) };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min: min.min(max), max: min.max(max) }
    }

    /// World bounds of a box with `half_extents` placed by `model`.
    pub fn of_box(model: &Mat4, half_extents: Vec3) -> Self {
        let mut bounds = Self::EMPTY;
        for corner in 0..8u32 {
            let sign = Vec3::new(
                if corner & 1 == 0 { -1.0 } else { 1.0 },
                if corner & 2 == 0 { -1.0 } else { 1.0 },
                if corner & 4 == 0 { -1.0 } else { 1.0 },
            );
            bounds.include(model.transform_point3(sign * half_extents));
        }
        bounds
    }

    pub fn include(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb { min: self.min.min(other.min), max: self.max.max(other.max) }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn hit(&self, ray: &Ray) -> Option<f32> {
        if self.is_empty() {
            return None;
        }
        ray_aabb_intersection(ray.origin, ray.dir, self.min, self.max).map(|(t, _)| t)
    }
}

/// Distance along `ray` to a box of `half_extents` placed by the rigid `model` matrix.
pub fn ray_hit_obb(ray: &Ray, model: &Mat4, half_extents: Vec3) -> Option<f32> {
    if !half_extents.is_finite() || !matrix_is_finite(model) {
        return None;
    }
    let inv = model.inverse();
    if !matrix_is_finite(&inv) {
        return None;
    }
    let origin_local = inv.transform_point3(ray.origin);
    let dir_local = inv.transform_vector3(ray.dir);
    if dir_local.length_squared() <= f32::EPSILON {
        return None;
    }
    let dir_local = dir_local.normalize();
    let extents = half_extents.abs();
    let (t_local, hit_local) = ray_aabb_intersection(origin_local, dir_local, -extents, extents)?;
    if t_local < 0.0 {
        return None;
    }
    let hit_world = model.transform_point3(hit_local);
    Some((hit_world - ray.origin).length())
}

pub fn matrix_is_finite(mat: &Mat4) -> bool {
    mat.to_cols_array().iter().all(|v| v.is_finite())
}

/// Slab test. Returns the entry distance (or exit distance when `origin` is inside)
/// and the hit point.
pub fn ray_aabb_intersection(origin: Vec3, dir: Vec3, min: Vec3, max: Vec3) -> Option<(f32, Vec3)> {
    let mut t_min: f32 = 0.0;
    let mut t_max: f32 = f32::INFINITY;
    for axis in 0..3 {
        let o = origin[axis];
        let d = dir[axis];
        if d.abs() < 1e-6 {
            if o < min[axis] || o > max[axis] {
                return None;
            }
            continue;
        }
        let inv_d = 1.0 / d;
        let mut t1 = (min[axis] - o) * inv_d;
        let mut t2 = (max[axis] - o) * inv_d;
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
        }
        t_min = t_min.max(t1);
        t_max = t_max.min(t2);
        if t_min > t_max {
            return None;
        }
    }
    if t_max < 0.0 {
        return None;
    }
    let t_hit = if t_min > 0.0 { t_min } else { t_max };
    Some((t_hit, origin + dir * t_hit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn obb_hit_respects_rotation() {
        let model = Mat4::from_rotation_translation(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2), Vec3::new(0.0, 0.0, -2.0));
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z).expect("ray");
        // Rotated a quarter turn, the thin local Z axis lies along world X; depth along the ray is the wide local X.
        let distance = ray_hit_obb(&ray, &model, Vec3::new(0.5, 0.5, 0.05)).expect("hit");
        assert!((distance - 1.5).abs() < 1e-4, "distance {distance}");
    }

    #[test]
    fn obb_behind_ray_is_ignored() {
        let model = Mat4::from_translation(Vec3::new(0.0, 0.0, 2.0));
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z).expect("ray");
        assert!(ray_hit_obb(&ray, &model, Vec3::splat(0.1)).is_none());
    }

    #[test]
    fn box_bounds_cover_rotated_corners() {
        let model = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4);
        let bounds = Aabb::of_box(&model, Vec3::new(1.0, 1.0, 0.0));
        let reach = std::f32::consts::FRAC_1_SQRT_2;
        assert!((bounds.max.x - reach).abs() < 1e-5);
        assert!((bounds.max.z - reach).abs() < 1e-5);
        assert!(Aabb::EMPTY.is_empty());
    }
}

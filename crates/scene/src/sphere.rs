use glam::Vec3;

use crate::{Material, Ray};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub t: f32,
    pub point: Vec3,
    /// Outward unit normal.
    pub normal: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Nearest intersection with `t` strictly inside `(t_min, t_max)`.
    pub fn hit(&self, ray: &Ray, t_min: f32, t_max: f32) -> Option<Hit> {
        let oc = ray.origin - self.center;
        let a = ray.direction.length_squared();
        let b = oc.dot(ray.direction);
        let c = oc.length_squared() - self.radius * self.radius;
        let discriminant = b * b - a * c;
        if discriminant <= 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        [(-b - root) / a, (-b + root) / a]
            .into_iter()
            .find(|&t| t > t_min && t < t_max)
            .map(|t| {
                let point = ray.at(t);
                Hit {
                    t,
                    point,
                    normal: (point - self.center) / self.radius,
                }
            })
    }
}

/// A sphere and the material it is made of.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Object {
    pub sphere: Sphere,
    pub material: Material,
}

impl Object {
    pub fn new(sphere: Sphere, material: Material) -> Self {
        Self { sphere, material }
    }
}

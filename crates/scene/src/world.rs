use glam::Vec3;
use rand::rngs::SmallRng;

use crate::{Hit, Material, Object, Ray};

/// Scattering events followed before a path is treated as absorbed.
pub const MAX_BOUNCES: u32 = 50;

const T_MIN: f32 = 0.001;

/// Spheres under a sky that fades from `horizon` to `zenith`.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    objects: Vec<Object>,
    zenith: Vec3,
    horizon: Vec3,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            objects: Vec::new(),
            zenith: Vec3::new(0.5, 0.7, 1.0),
            horizon: Vec3::ONE,
        }
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, object: Object) {
        self.objects.push(object);
    }

    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn hit(&self, ray: &Ray, t_min: f32, t_max: f32) -> Option<(Hit, Material)> {
        let mut closest = t_max;
        let mut found = None;
        for object in &self.objects {
            if let Some(hit) = object.sphere.hit(ray, t_min, closest) {
                closest = hit.t;
                found = Some((hit, object.material));
            }
        }
        found
    }

    pub fn sky(&self, direction: Vec3) -> Vec3 {
        let t = 0.5 * (direction.normalize().y + 1.0);
        self.horizon.lerp(self.zenith, t)
    }

    /// Radiance carried back along `ray`.
    pub fn color(&self, mut ray: Ray, rng: &mut SmallRng) -> Vec3 {
        let mut throughput = Vec3::ONE;
        for _ in 0..MAX_BOUNCES {
            let Some((hit, material)) = self.hit(&ray, T_MIN, f32::MAX) else {
                return throughput * self.sky(ray.direction);
            };
            match material.scatter(&ray, &hit, rng) {
                Some((attenuation, scattered)) => {
                    throughput *= attenuation;
                    ray = scattered;
                }
                None => return Vec3::ZERO,
            }
        }
        Vec3::ZERO
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::Sphere;

    #[test]
    fn empty_scene_shows_the_sky_gradient() {
        let scene = Scene::new();
        let mut rng = SmallRng::seed_from_u64(0);
        let up = scene.color(Ray::new(Vec3::ZERO, Vec3::Y), &mut rng);
        let down = scene.color(Ray::new(Vec3::ZERO, -Vec3::Y), &mut rng);

        assert!(up.abs_diff_eq(Vec3::new(0.5, 0.7, 1.0), 1e-6));
        assert!(down.abs_diff_eq(Vec3::ONE, 1e-6));
    }

    #[test]
    fn nearest_object_wins() {
        let mut scene = Scene::new();
        let far = Material::diffuse(Vec3::X);
        let near = Material::diffuse(Vec3::Y);
        scene.add(Object::new(Sphere::new(Vec3::new(0.0, 0.0, -10.0), 1.0), far));
        scene.add(Object::new(Sphere::new(Vec3::new(0.0, 0.0, -4.0), 1.0), near));

        let (hit, material) = scene
            .hit(&Ray::new(Vec3::ZERO, -Vec3::Z), T_MIN, f32::MAX)
            .unwrap();
        assert!((hit.t - 3.0).abs() < 1e-5);
        assert_eq!(material, near);
    }

    #[test]
    fn paths_inside_a_mirror_never_reach_the_sky() {
        let mut scene = Scene::new();
        scene.add(Object::new(
            Sphere::new(Vec3::ZERO, 5.0),
            Material::metallic(Vec3::ONE, 0.0),
        ));
        let mut rng = SmallRng::seed_from_u64(0);
        let color = scene.color(Ray::new(Vec3::ZERO, Vec3::new(0.3, 0.4, 0.5)), &mut rng);
        assert_eq!(color, Vec3::ZERO);
    }
}

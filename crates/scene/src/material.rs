use glam::Vec3;
use rand::Rng;
use rand::rngs::SmallRng;

use crate::{Hit, Ray};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Material {
    /// Lambertian surface.
    Diffuse { albedo: Vec3 },
    /// Mirror with a blurred reflection; `fuzz` is clamped to `[0, 1]`.
    Metallic { albedo: Vec3, fuzz: f32 },
    /// Clear dielectric such as glass.
    Crystalline { refractive_index: f32 },
}

impl Material {
    pub fn diffuse(albedo: Vec3) -> Self {
        Material::Diffuse { albedo }
    }

    pub fn metallic(albedo: Vec3, fuzz: f32) -> Self {
        Material::Metallic {
            albedo,
            fuzz: fuzz.clamp(0.0, 1.0),
        }
    }

    pub fn crystalline(refractive_index: f32) -> Self {
        Material::Crystalline { refractive_index }
    }

    /// Returns the attenuation and the continued ray, or `None` when the
    /// ray is absorbed.
    pub fn scatter(&self, ray: &Ray, hit: &Hit, rng: &mut SmallRng) -> Option<(Vec3, Ray)> {
        match *self {
            Material::Diffuse { albedo } => {
                let direction = hit.normal + random_in_unit_sphere(rng);
                Some((albedo, Ray::new(hit.point, direction)))
            }
            Material::Metallic { albedo, fuzz } => {
                let reflected = reflect(ray.direction.normalize(), hit.normal);
                let scattered = Ray::new(hit.point, reflected + fuzz * random_in_unit_sphere(rng));
                (scattered.direction.dot(hit.normal) > 0.0).then_some((albedo, scattered))
            }
            Material::Crystalline { refractive_index } => {
                let incidence = ray.direction.dot(hit.normal);
                let (outward_normal, eta, cosine) = if incidence > 0.0 {
                    (
                        -hit.normal,
                        refractive_index,
                        refractive_index * incidence / ray.direction.length(),
                    )
                } else {
                    (
                        hit.normal,
                        refractive_index.recip(),
                        -incidence / ray.direction.length(),
                    )
                };
                let direction = match refract(ray.direction, outward_normal, eta) {
                    Some(refracted) if rng.random::<f32>() >= schlick(cosine, refractive_index) => {
                        refracted
                    }
                    _ => reflect(ray.direction, hit.normal),
                };
                Some((Vec3::ONE, Ray::new(hit.point, direction)))
            }
        }
    }
}

pub(crate) fn reflect(direction: Vec3, normal: Vec3) -> Vec3 {
    direction - 2.0 * direction.dot(normal) * normal
}

pub(crate) fn refract(direction: Vec3, normal: Vec3, eta: f32) -> Option<Vec3> {
    let unit = direction.normalize();
    let dt = unit.dot(normal);
    let discriminant = 1.0 - eta * eta * (1.0 - dt * dt);
    (discriminant > 0.0).then(|| eta * (unit - normal * dt) - normal * discriminant.sqrt())
}

/// Schlick's approximation of reflectance.
fn schlick(cosine: f32, refractive_index: f32) -> f32 {
    let r0 = ((1.0 - refractive_index) / (1.0 + refractive_index)).powi(2);
    r0 + (1.0 - r0) * (1.0 - cosine).powi(5)
}

fn random_in_unit_sphere(rng: &mut SmallRng) -> Vec3 {
    loop {
        let point = 2.0 * Vec3::new(rng.random(), rng.random(), rng.random()) - Vec3::ONE;
        if point.length_squared() < 1.0 {
            return point;
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn hit_from_above() -> Hit {
        Hit {
            t: 1.0,
            point: Vec3::ZERO,
            normal: Vec3::Y,
        }
    }

    #[test]
    fn polished_metal_is_a_mirror() {
        let ray = Ray::new(Vec3::new(-1.0, 1.0, 0.0), Vec3::new(1.0, -1.0, 0.0));
        let mut rng = SmallRng::seed_from_u64(3);
        let (attenuation, scattered) = Material::metallic(Vec3::splat(0.8), 0.0)
            .scatter(&ray, &hit_from_above(), &mut rng)
            .unwrap();

        assert_eq!(attenuation, Vec3::splat(0.8));
        let expected = Vec3::new(1.0, 1.0, 0.0).normalize();
        assert!(scattered.direction.abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn diffuse_bounces_stay_above_the_surface() {
        let ray = Ray::new(Vec3::Y, -Vec3::Y);
        let mut rng = SmallRng::seed_from_u64(11);
        let material = Material::diffuse(Vec3::new(0.1, 0.2, 0.3));
        for _ in 0..100 {
            let (attenuation, scattered) =
                material.scatter(&ray, &hit_from_above(), &mut rng).unwrap();
            assert_eq!(attenuation, Vec3::new(0.1, 0.2, 0.3));
            assert!(scattered.direction.dot(Vec3::Y) >= 0.0);
        }
    }

    #[test]
    fn total_internal_reflection_has_no_refraction() {
        let grazing = Vec3::new(1.0, 0.1, 0.0);
        assert!(refract(grazing, -Vec3::Y, 1.5).is_none());
        assert!(refract(Vec3::new(0.0, -1.0, 0.0), Vec3::Y, 1.0 / 1.5).is_some());
    }

    #[test]
    fn fuzz_is_clamped() {
        assert_eq!(
            Material::metallic(Vec3::ONE, 3.0),
            Material::Metallic {
                albedo: Vec3::ONE,
                fuzz: 1.0
            }
        );
    }

    #[test]
    fn glass_never_absorbs() {
        let ray = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.3, -1.0, 0.0));
        let mut rng = SmallRng::seed_from_u64(5);
        let (attenuation, _) = Material::crystalline(1.5)
            .scatter(&ray, &hit_from_above(), &mut rng)
            .unwrap();
        assert_eq!(attenuation, Vec3::ONE);
    }
}

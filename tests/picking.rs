use glam::{EulerRot, Mat4, Quat, Vec3};
use shelfwalk::picking::{ray_hit_obb, Aabb, Ray};

#[test]
fn obb_pick_follows_item_transform() {
    let half = Vec3::new(0.08, 0.11, 0.02);
    let origin = Vec3::new(0.0, 0.0, 5.0);
    let ray = Ray::new(origin, Vec3::NEG_Z).expect("ray");
    assert!(ray_hit_obb(&ray, &Mat4::IDENTITY, half).is_some());

    let miss = Ray::new(origin, Vec3::new(5.0, 0.0, -1.0)).expect("ray");
    assert!(ray_hit_obb(&miss, &Mat4::IDENTITY, half).is_none());

    let rotation = Quat::from_euler(EulerRot::YXZ, std::f32::consts::FRAC_PI_4, 0.0, 0.0);
    let model = Mat4::from_rotation_translation(rotation, Vec3::new(1.5, 0.0, 0.0));
    let toward = Ray::new(Vec3::new(1.5, 0.02, 4.0), Vec3::new(0.0, -0.005, -1.0)).expect("ray");
    let distance = ray_hit_obb(&toward, &model, half).expect("rotated hit");
    let expected_front = 4.0 - half.z / std::f32::consts::FRAC_PI_4.cos();
    assert!((distance - expected_front).abs() < 0.02, "distance {distance}");

    let world_box = Aabb::of_box(&model, half);
    assert!(world_box.hit(&toward).is_some());
}

#[test]
fn degenerate_inputs_never_hit() {
    assert!(Ray::new(Vec3::ZERO, Vec3::ZERO).is_none());
    let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z).expect("ray");
    let broken = Mat4::from_cols_array(&[f32::NAN; 16]);
    assert!(ray_hit_obb(&ray, &broken, Vec3::ONE).is_none());
    assert!(Aabb::EMPTY.hit(&ray).is_none());
}

use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shelfwalk::config::MovementConfig;
use shelfwalk::movement::{CollisionAwareMovementController, MoveOutcome, MovementIntent, ObstacleZone, RoomBounds};
use shelfwalk::scene::SceneLayout;

fn assert_clear(controller: &CollisionAwareMovementController) {
    let position = controller.position();
    let margin = controller.margin();
    for zone in controller.zones() {
        assert!(!zone.blocks(position, margin), "{position:?} inside {zone:?}");
    }
    let room = controller.room();
    assert!(position.x >= room.min.x + margin - 1e-4 && position.x <= room.max.x - margin + 1e-4);
    assert!(position.y >= room.min.y + margin - 1e-4 && position.y <= room.max.y - margin + 1e-4);
}

#[test]
fn random_walks_never_enter_expanded_zones() {
    let layout = SceneLayout::demo(11, 300, 20);
    let config = MovementConfig::default();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut controller =
        CollisionAwareMovementController::new(&config, layout.spawn_position(), layout.room_bounds(), layout.obstacle_zones());
    assert_clear(&controller);

    for _walk in 0..40 {
        let room = layout.room_bounds();
        let start = Vec2::new(rng.gen_range(room.min.x..room.max.x), rng.gen_range(room.min.y..room.max.y));
        controller.teleport(start);
        assert_clear(&controller);
        for _frame in 0..120 {
            let intent = MovementIntent {
                forward: rng.gen_range(-1.0..=1.0),
                strafe: rng.gen_range(-1.0..=1.0),
                sprint: rng.gen_bool(0.3),
            };
            let yaw = rng.gen_range(-std::f32::consts::PI..std::f32::consts::PI);
            let dt = rng.gen_range(0.001..0.1);
            controller.tick(&intent, yaw, dt);
            assert_clear(&controller);
        }
    }
}

#[test]
fn head_on_push_slides_or_stops_at_margin() {
    let config = MovementConfig::default();
    let room = RoomBounds::new(Vec2::new(-10.0, -10.0), Vec2::new(10.0, 10.0));
    let wall = ObstacleZone::new(Vec2::new(-1.0, -2.0), Vec2::new(1.0, -1.0));
    let mut controller = CollisionAwareMovementController::new(&config, Vec2::new(0.0, 1.0), room, vec![wall]);
    let forward = MovementIntent { forward: 1.0, strafe: 0.0, sprint: true };

    let mut saw_contact = false;
    for _ in 0..240 {
        let outcome = controller.tick(&forward, 0.0, 1.0 / 60.0);
        saw_contact |= outcome != MoveOutcome::Free;
        assert_clear(&controller);
    }
    assert!(saw_contact);
    let position = controller.position();
    assert!(position.y >= -1.0 + controller.margin() - 1e-4);
    assert!(position.y < -0.5, "walked up to the wall, stopped at {position:?}");
}

#[test]
fn teleport_into_zone_is_rejected() {
    let layout = SceneLayout::demo(3, 60, 5);
    let zones = layout.obstacle_zones();
    let mut controller = CollisionAwareMovementController::new(
        &MovementConfig::default(),
        layout.spawn_position(),
        layout.room_bounds(),
        zones.clone(),
    );
    let before = controller.position();
    let inside = (zones[0].min + zones[0].max) * 0.5;
    assert!(!controller.teleport(inside));
    assert_eq!(controller.position(), before);
}

#[test]
fn spawn_inside_zone_starts_clear_and_can_walk() {
    let config = MovementConfig::default();
    let mut controller = CollisionAwareMovementController::new(
        &config,
        Vec2::ZERO,
        RoomBounds::new(Vec2::splat(-6.0), Vec2::splat(6.0)),
        vec![ObstacleZone::new(Vec2::splat(-1.0), Vec2::splat(1.0))],
    );
    assert_clear(&controller);
    let start = controller.position();
    let forward = MovementIntent { forward: 1.0, ..Default::default() };
    for _ in 0..120 {
        controller.tick(&forward, 0.0, 1.0 / 60.0);
        assert_clear(&controller);
    }
    assert!(controller.position() != start, "viewer is stuck at {start:?}");
}

use glam::Vec2;
use plonk::*;

fn main() {
    env_logger::init();

    let mut world = PhysicsWorld::new(WorldConfig {
        enable_timing: true,
        ..WorldConfig::default()
    });
    world.register_classname("coin", |name| {
        let mut ent = Entity::anchored(name);
        ent.set_hitbox(Vec2::splat(16.0));
        ent.events
            .get_mut(EventSlot::Collision)
            .set_func(event_fn(|w: &mut PhysicsWorld, me, args| {
                if let Some(info) = args.collision() {
                    println!("coin {:?} picked up by {:?}", me, info.other);
                }
                w.delete_entity(me);
                EventValue::Bool(false)
            }));
        ent
    });

    let floor = world.create_entity("rect").expect("builtin classname");
    if let Some(ent) = world.entity_mut(floor) {
        ent.set_base_origin(Vec2::new(-400.0, 0.0));
        ent.set_hitbox(Vec2::new(800.0, 32.0));
    }
    world.activate_entity(floor);

    let player = world.create_entity("entity").expect("builtin classname");
    if let Some(ent) = world.entity_mut(player) {
        ent.set_base_origin(Vec2::new(-200.0, 120.0));
        ent.set_hitbox(Vec2::new(24.0, 48.0));
        ent.move_type = MoveType::Physics;
        ent.move_speed = 180.0;
    }
    world.activate_entity(player);

    let coin = world.create_entity("coin").expect("registered above");
    if let Some(ent) = world.entity_mut(coin) {
        ent.set_base_origin(Vec2::new(-50.0, 40.0));
    }
    world.activate_entity(coin);

    for frame in 1..=120 {
        world.run_frame(1.0 / 60.0);
        if frame % 20 == 0 {
            if let Some(ent) = world.entity(player) {
                println!(
                    "frame {frame}: origin=({:.1},{:.1}) vel=({:.1},{:.1}) grounded={} entities={}",
                    ent.base_origin().x,
                    ent.base_origin().y,
                    ent.velocity.x,
                    ent.velocity.y,
                    ent.ground_entity.is_some(),
                    world.count_entities(false),
                );
            }
            let stats = world.last_stats();
            println!(
                "  step: simulated={} candidates={} hits={} time={:.3}ms",
                stats.simulated,
                stats.candidates,
                stats.hits,
                stats.step_ms.unwrap_or(0.0)
            );
        }
    }
}

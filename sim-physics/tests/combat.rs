//! Firing, laser flight and hit resolution across several steps.

use nalgebra::{UnitQuaternion, Vector3};
use sim_physics::combat::{Body, Laser, laser_hits, prune_expired, ship_collisions};
use sim_physics::{FighterConfig, FighterParts, MotionState};

const DT: f64 = 1.0 / 60.0;

const FIGHTER: &str = r#"{
    "name": "test",
    "fire_control": {
        "offsets": [[2.0, 0.5, 0.0], [2.0, -0.5, 0.0]],
        "fire_modes": [2, 1],
        "recharge_times_s": [0.2, 0.1]
    },
    "laser": {"speed": 300.0, "lifetime_s": 1.0},
    "geometry": {
        "name": "hull",
        "kind": {"type": "bounding_box", "min": [-3, -2, -2], "max": [3, 2, 2]}
    }
}"#;

fn fighter() -> (FighterConfig, FighterParts) {
    let config: FighterConfig = serde_json::from_str(FIGHTER).unwrap();
    let parts = config.build().unwrap();
    (config, parts)
}

fn body<'a>(id: usize, state: &MotionState, parts: &'a FighterParts) -> Body<'a, usize> {
    Body {
        id,
        pose: state.pose(),
        shape: &parts.shape,
        hull_points: parts.hull_points.as_ref(),
    }
}

#[test]
fn volley_hits_target_ahead_and_then_expires() {
    let (config, mut shooter) = fighter();
    let (_, target) = fighter();
    let shooter_state = MotionState::default();
    let target_state = MotionState::at_rest(
        Vector3::new(60.0, 0.0, 0.0),
        UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.4),
    );

    let offsets = shooter.fire_control.fire(0.0).unwrap();
    assert_eq!(offsets.len(), 2);
    let mut lasers: Vec<Laser<usize>> = offsets
        .iter()
        .map(|offset| Laser::spawn(0, &shooter_state, offset, &config.laser, 0.0))
        .collect();
    // Still recharging.
    assert!(shooter.fire_control.fire(0.1).is_none());

    let bodies = [body(0, &shooter_state, &shooter), body(1, &target_state, &target)];
    let mut hits = Vec::new();
    let mut now = 0.0;
    for _ in 0..30 {
        now += DT;
        for laser in &mut lasers {
            laser.state = laser.state.integrate(DT);
        }
        let step_hits = laser_hits(&lasers, &bodies, DT);
        // Remove hit lasers, highest index first so earlier indices stay valid.
        let mut indices: Vec<usize> = step_hits.iter().map(|h| h.laser).collect();
        indices.sort_unstable();
        for index in indices.into_iter().rev() {
            lasers.remove(index);
        }
        hits.extend(step_hits);
    }

    assert_eq!(hits.len(), 2);
    for hit in &hits {
        assert_eq!(hit.target, 1);
        // The near face of the target, facing back at the shooter.
        assert!(hit.point.x > 55.0 && hit.point.x < 60.0);
        assert!(hit.normal.x < 0.0);
    }
    assert!(lasers.is_empty());

    // A miss flies on until its lifetime runs out.
    let stray = Laser::spawn(
        0,
        &MotionState::at_rest(Vector3::new(0.0, 50.0, 0.0), UnitQuaternion::identity()),
        &Vector3::zeros(),
        &config.laser,
        now,
    );
    let mut lasers = vec![stray];
    assert_eq!(prune_expired(&mut lasers, now + 0.5), 0);
    assert_eq!(prune_expired(&mut lasers, now + 1.0), 1);
    assert!(lasers.is_empty());
}

#[test]
fn head_on_pass_collides() {
    let (_, parts_a) = fighter();
    let (_, parts_b) = fighter();
    let mut a = MotionState::default();
    a.velocity = Vector3::new(50.0, 0.0, 0.0);
    let mut b = MotionState::at_rest(
        Vector3::new(100.0, 0.0, 0.0),
        UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f64::consts::PI),
    );
    b.velocity = Vector3::new(-50.0, 0.0, 0.0);

    let mut first_contact = None;
    for step in 0..120 {
        a = a.integrate(DT);
        b = b.integrate(DT);
        let bodies = [body(0, &a, &parts_a), body(1, &b, &parts_b)];
        let events = ship_collisions(&bodies);
        if let Some(event) = events.first() {
            first_contact = Some((step, event.clone()));
            break;
        }
        // Hulls are 6 m long, so no contact while the centers are further apart.
        assert!(b.position.x - a.position.x > 6.0 - 1e-9);
    }

    let (step, event) = first_contact.unwrap();
    assert!(step > 0);
    assert_eq!((event.a, event.b), (0, 1));
    assert!(event.depth > 0.0);
    assert!(event.normal.x.abs() > 0.9);
}

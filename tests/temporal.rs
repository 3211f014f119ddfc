use stat_gauge::prelude::*;

fn scope_with(name: &str, base: f64) -> (Scope, StatId) {
    let mut scope = Scope::new("timers");
    let id = scope.create_stat(&StatSchema::new(name), Some(base)).unwrap();
    (scope, id)
}

#[test]
fn test_staggered_expiry() {
    let (mut scope, haste) = scope_with("Haste", 0.0);
    scope.add_temporary_bonus(haste, 10.0, 1.0).unwrap();
    scope.add_temporary_bonus(haste, 20.0, 3.0).unwrap();
    scope.add_modifier(haste, Modifier::additive(5.0)).unwrap();
    assert_eq!(scope.value(haste).unwrap(), 35.0);

    scope.tick(1.5);
    assert_eq!(scope.value(haste).unwrap(), 25.0);
    scope.tick(1.5);
    assert_eq!(scope.value(haste).unwrap(), 5.0);
    assert!(scope.scheduler().is_empty());
    assert_eq!(scope.time(), 3.0);
}

#[test]
fn test_expiry_batches_per_stat() {
    let (mut scope, armor) = scope_with("Armor", 10.0);
    let shield = scope.create_stat(&StatSchema::new("Shield"), Some(0.0)).unwrap();
    let first = scope.add_temporary_bonus(armor, 1.0, 0.5).unwrap().unwrap();
    let second = scope.add_temporary_bonus(armor, 2.0, 1.0).unwrap().unwrap();
    let third = scope.add_temporary_bonus(shield, 3.0, 0.75).unwrap().unwrap();
    scope.value(armor).unwrap();
    let recomputations = scope.node(armor).unwrap().recomputations();

    let expired = scope.tick(1.0);
    assert_eq!(
        expired,
        vec![
            Expiration { stat: armor, modifiers: vec![first, second] },
            Expiration { stat: shield, modifiers: vec![third] },
        ]
    );
    assert_eq!(scope.value(armor).unwrap(), 10.0);
    assert_eq!(scope.node(armor).unwrap().recomputations(), recomputations + 1);
}

#[test]
fn test_expiry_reaches_dependents() {
    let mut scope = Scope::new("timers");
    let str_id = scope.create_stat(&StatSchema::new("Strength"), Some(10.0)).unwrap();
    let carry = scope
        .create_stat(&StatSchema::new("Carry Weight").with_formula("strength * 5"), None)
        .unwrap();
    scope.add_temporary_bonus(str_id, 4.0, 2.0).unwrap();
    assert_eq!(scope.value(carry).unwrap(), 70.0);

    scope.tick(2.0);
    assert!(scope.is_dirty(carry).unwrap());
    assert_eq!(scope.value(carry).unwrap(), 50.0);
}

#[test]
fn test_remaining_time() {
    let (mut scope, haste) = scope_with("Haste", 0.0);
    scope.tick(4.0);
    let id = scope.add_temporary_bonus(haste, 1.0, 2.5).unwrap().unwrap();
    scope.tick(1.0);

    let modifier = scope.modifiers(haste).unwrap().iter().find(|m| m.id() == id).unwrap();
    assert_eq!(modifier.expires_at(), Some(6.5));
    assert_eq!(modifier.remaining(scope.time()), Some(1.5));
}

#[test]
fn test_removing_a_temporary_modifier_cancels_it() {
    let (mut scope, haste) = scope_with("Haste", 0.0);
    let id = scope.add_temporary_bonus(haste, 10.0, 1.0).unwrap().unwrap();
    assert!(scope.scheduler().is_scheduled(id));

    scope.remove_modifier(haste, id).unwrap();
    assert!(!scope.scheduler().is_scheduled(id));
    assert!(scope.tick(2.0).is_empty());
}

#[test]
fn test_invalid_deltas_do_not_move_time() {
    let (mut scope, haste) = scope_with("Haste", 0.0);
    scope.add_temporary_bonus(haste, 10.0, 1.0).unwrap();

    assert!(scope.tick(f64::NAN).is_empty());
    assert!(scope.tick(-5.0).is_empty());
    assert!(scope.tick(f64::INFINITY).is_empty());
    assert_eq!(scope.time(), 0.0);
    assert_eq!(scope.value(haste).unwrap(), 10.0);
}

#[test]
fn test_zero_duration_expires_on_next_tick() {
    let (mut scope, haste) = scope_with("Haste", 1.0);
    scope.add_temporary_bonus(haste, 10.0, 0.0).unwrap();
    assert_eq!(scope.value(haste).unwrap(), 11.0);
    assert_eq!(scope.tick(0.0).len(), 1);
    assert_eq!(scope.value(haste).unwrap(), 1.0);
}

#[test]
fn test_temporary_modifier_of_any_kind() {
    let (mut scope, speed) = scope_with("Speed", 10.0);
    scope
        .add_modifier(speed, Modifier::override_with(0.0).with_source("Frozen").temporary(3.0))
        .unwrap();
    assert_eq!(scope.value(speed).unwrap(), 0.0);
    scope.tick(3.0);
    assert_eq!(scope.value(speed).unwrap(), 10.0);
}

#[test]
fn test_dropping_a_scope_with_pending_timers() {
    let (mut scope, haste) = scope_with("Haste", 0.0);
    for i in 0..16 {
        scope.add_temporary_bonus(haste, 1.0, i as f64).unwrap();
    }
    assert_eq!(scope.scheduler().scheduled_for(haste), 16);
    drop(scope);
}

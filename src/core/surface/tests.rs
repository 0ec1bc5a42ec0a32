use crate::core::surface::commit::apply_state;
use crate::core::surface::*;
use crate::core::types::Rect;

#[test]
fn test_surface_init() {
    let surface = Surface::new(1, 7, 3);
    assert_eq!(surface.id, 1);
    assert_eq!(surface.client, 7);
    assert!(surface.role.is_none());
    assert!(surface.initial_commit);
    assert!(!surface.is_mapped());
}

#[test]
fn test_pending_invisible_until_commit() {
    let mut surface = Surface::new(1, 1, 3);

    surface.pending.geometry = Some(Rect::new(0, 0, 640, 480));
    surface.pending.buffer_scale = Some(2);
    surface.pending.damage.push(Rect::new(0, 0, 10, 10));

    // Nothing observable before commit.
    assert_eq!(surface.current.geometry, None);
    assert_eq!(surface.current.buffer_scale, 0);
    assert!(surface.current.damage.is_empty());

    apply_state(surface.id, &mut surface.pending, &mut surface.current);

    assert_eq!(surface.current.geometry, Some(Rect::new(0, 0, 640, 480)));
    assert_eq!(surface.current.buffer_scale, 2);
    assert_eq!(surface.current.damage.len(), 1);
    assert!(surface.pending.damage.is_empty());
}

#[test]
fn test_degenerate_geometry_discarded() {
    let mut surface = Surface::new(2, 1, 3);

    surface.pending.geometry = Some(Rect::new(0, 0, 800, 600));
    apply_state(surface.id, &mut surface.pending, &mut surface.current);
    assert_eq!(surface.current.geometry, Some(Rect::new(0, 0, 800, 600)));

    // Zero width must not replace the previous geometry.
    surface.pending.geometry = Some(Rect::new(0, 0, 0, 600));
    apply_state(surface.id, &mut surface.pending, &mut surface.current);
    assert_eq!(surface.current.geometry, Some(Rect::new(0, 0, 800, 600)));

    surface.pending.geometry = Some(Rect::new(0, 0, 800, 0));
    apply_state(surface.id, &mut surface.pending, &mut surface.current);
    assert_eq!(surface.current.geometry, Some(Rect::new(0, 0, 800, 600)));
}

#[test]
fn test_damage_accumulates_across_commits() {
    let mut surface = Surface::new(3, 1, 3);

    surface.pending.damage.push(Rect::new(0, 0, 10, 10));
    apply_state(surface.id, &mut surface.pending, &mut surface.current);
    surface.pending.damage.push(Rect::new(10, 10, 20, 20));
    apply_state(surface.id, &mut surface.pending, &mut surface.current);

    assert_eq!(surface.current.damage.len(), 2);
    assert_eq!(surface.current.damage[1], Rect::new(10, 10, 20, 20));
}

#[test]
fn test_frame_callback_moves_to_active_slot() {
    let mut surface = Surface::new(4, 1, 3);

    surface.pending.frame_callback = Some(9);
    let armed = apply_state(surface.id, &mut surface.pending, &mut surface.current);
    assert_eq!(armed, Some(9));
    assert_eq!(surface.pending.frame_callback, None);

    // No new frame request on the next commit.
    let armed = apply_state(surface.id, &mut surface.pending, &mut surface.current);
    assert_eq!(armed, None);
}

#[test]
fn test_surface_role_assigned_once() {
    let mut surface = Surface::new(5, 1, 3);
    assert!(surface.set_role(SurfaceRole::Toplevel).is_ok());
    assert_eq!(surface.role, SurfaceRole::Toplevel);

    // Re-assigning the same role is fine, switching is not.
    assert!(surface.set_role(SurfaceRole::Toplevel).is_ok());
    assert_eq!(surface.set_role(SurfaceRole::Popup), Err(SurfaceRole::Toplevel));
}

#[test]
fn test_null_region_distinct_from_unset() {
    let mut surface = Surface::new(6, 1, 3);

    surface.current.input_region = Some(11);
    // No set_input_region this cycle: untouched.
    apply_state(surface.id, &mut surface.pending, &mut surface.current);
    assert_eq!(surface.current.input_region, Some(11));

    // Explicit null clears it.
    surface.pending.input_region = Some(None);
    apply_state(surface.id, &mut surface.pending, &mut surface.current);
    assert_eq!(surface.current.input_region, None);
}

//! Territory capture, trail extension and subtraction
//!
//! Capture closes the trail against the territory boundary: the trail's
//! first and last segments are intersected with the polygon, and the
//! trail is spliced into the boundary walked either way around. The
//! larger of the two candidates is the union of the old territory and
//! the enclosed area.

use tracing::warn;

use crate::game::constants::{territory, trail};
use crate::game::state::{mark_dead, Death, DirtyFlags, KillType, Player};
use crate::game::systems::snip;
use crate::game::world::WorldEvent;
use crate::util::clip::largest_difference;
use crate::util::geometry::{dedupe_ring, polygon_area, segment_intersection, simplify_polygon, Bounds};
use crate::util::vec2::Vec2;

// ============================================================================
// Capture
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// New territory accepted
    Captured { polygon: Vec<Vec2>, area_gained: f32 },
    /// No area worth taking (within tolerance of the old area)
    Unchanged,
    /// Candidates degenerate or shrink the territory; old one kept
    Rejected,
}

/// Where the closed path meets the boundary: on edge `edge`
/// (`poly[edge] -> poly[edge + 1]`) at fraction `along` of it
#[derive(Debug, Clone, Copy)]
struct BoundaryHit {
    point: Vec2,
    edge: usize,
    along: f32,
}

/// Crossing of segment `a -> b` with the polygon boundary. `last` picks
/// the crossing furthest along the segment instead of the nearest.
fn boundary_crossing(poly: &[Vec2], a: Vec2, b: Vec2, last: bool) -> Option<BoundaryHit> {
    let n = poly.len();
    let mut best: Option<(f32, BoundaryHit)> = None;
    for edge in 0..n {
        let (p, q) = (poly[edge], poly[(edge + 1) % n]);
        let Some(hit) = segment_intersection(a, b, p, q) else {
            continue;
        };
        let better = match best {
            None => true,
            Some((t, _)) => if last { hit.t > t } else { hit.t < t },
        };
        if better {
            best = Some((
                hit.t,
                BoundaryHit {
                    point: hit.point,
                    edge,
                    along: hit.u,
                },
            ));
        }
    }
    best.map(|(_, hit)| hit)
}

/// Nearest vertex, expressed as a hit at the start of its outgoing edge
fn nearest_vertex(poly: &[Vec2], point: Vec2) -> BoundaryHit {
    let mut edge = 0;
    let mut best = f32::INFINITY;
    for (i, v) in poly.iter().enumerate() {
        let d = v.distance_sq_to(point);
        if d < best {
            best = d;
            edge = i;
        }
    }
    BoundaryHit {
        point: poly[edge],
        edge,
        along: 0.0,
    }
}

/// Boundary vertices met walking from `from` to `to`, forward or backward
fn boundary_walk(poly: &[Vec2], from: BoundaryHit, to: BoundaryHit, forward: bool) -> Vec<Vec2> {
    let n = poly.len();
    let count = if from.edge == to.edge {
        // Same edge: one direction reaches `to` directly, the other goes all the way around
        let direct = if forward { to.along >= from.along } else { to.along <= from.along };
        if direct { 0 } else { n }
    } else if forward {
        (to.edge + n - from.edge) % n
    } else {
        (from.edge + n - to.edge) % n
    };

    (0..count)
        .map(|s| {
            let idx = if forward {
                (from.edge + 1 + s) % n
            } else {
                (from.edge + n - s) % n
            };
            poly[idx]
        })
        .collect()
}

/// Simplify until the polygon fits under the point cap
pub fn simplify_territory(polygon: &[Vec2]) -> Vec<Vec2> {
    let mut epsilon = territory::SIMPLIFY_EPSILON;
    let mut simplified = simplify_polygon(polygon, epsilon);
    while simplified.len() > territory::MAX_POINTS {
        epsilon *= 2.0;
        simplified = simplify_polygon(&simplified, epsilon);
    }
    simplified
}

/// Close `path` (first point inside or on the boundary, last point back
/// inside) against `territory`
pub fn capture_territory(territory_poly: &[Vec2], path: &[Vec2]) -> CaptureOutcome {
    if territory_poly.len() < 3 || path.len() < 2 {
        return CaptureOutcome::Rejected;
    }
    let m = path.len();

    let exit = boundary_crossing(territory_poly, path[0], path[1], true)
        .unwrap_or_else(|| nearest_vertex(territory_poly, path[0]));
    let entry = boundary_crossing(territory_poly, path[m - 2], path[m - 1], false)
        .unwrap_or_else(|| nearest_vertex(territory_poly, path[m - 1]));

    let outside = &path[1..m - 1];
    let build = |forward: bool| {
        let mut candidate = Vec::with_capacity(outside.len() + territory_poly.len() + 2);
        candidate.push(exit.point);
        candidate.extend_from_slice(outside);
        candidate.push(entry.point);
        candidate.extend(boundary_walk(territory_poly, entry, exit, forward));
        dedupe_ring(&candidate, territory::DEDUPE_DISTANCE)
    };
    let forward = build(true);
    let backward = build(false);

    let area_of = |poly: &[Vec2]| if poly.len() >= 3 { polygon_area(poly) } else { 0.0 };
    let (forward_area, backward_area) = (area_of(&forward), area_of(&backward));
    let (chosen, chosen_area) = if forward_area >= backward_area {
        (forward, forward_area)
    } else {
        (backward, backward_area)
    };

    let old_area = polygon_area(territory_poly);
    if chosen.len() < 3 || chosen_area < old_area - territory::CAPTURE_AREA_TOLERANCE {
        return CaptureOutcome::Rejected;
    }
    if chosen_area - old_area <= territory::CAPTURE_AREA_TOLERANCE {
        return CaptureOutcome::Unchanged;
    }

    let polygon = simplify_territory(&chosen);
    let area_gained = (polygon_area(&polygon) - old_area).max(0.0);
    CaptureOutcome::Captured { polygon, area_gained }
}

// ============================================================================
// Per-tick territory step (phase 4)
// ============================================================================

/// Capture on re-entry, extend the trail outside. Returns the capture
/// event, if any.
pub fn step(player: &mut Player) -> Option<WorldEvent> {
    let inside = player.contains_point(player.position);
    let was_inside = player.in_territory;

    if inside {
        let mut event = None;
        if player.is_snipped() {
            // Made it home: fuse cleared, no capture
            snip::clear(player);
        } else if player.trail.len() >= 3 {
            let mut path = std::mem::take(&mut player.trail);
            path.push(player.position);
            match capture_territory(&player.territory, &path) {
                CaptureOutcome::Captured { polygon, area_gained } => {
                    player.set_territory(polygon);
                    player.area_gained += area_gained;
                    player.captured_this_tick = true;
                    event = Some(WorldEvent::Capture {
                        player: player.id,
                        area_gained,
                        position: player.position,
                    });
                }
                CaptureOutcome::Unchanged => {}
                CaptureOutcome::Rejected => {
                    warn!("Rejected capture for player {} ({} trail points)", player.id, path.len());
                }
            }
            player.mark_dirty(DirtyFlags::TRAIL);
        } else {
            player.clear_trail();
        }
        player.in_territory = true;
        player.time_outside = 0.0;
        if !was_inside {
            player.mark_dirty(DirtyFlags::TRAIL);
        }
        return event;
    }

    if was_inside || player.trail.is_empty() {
        // Anchor the trail on the last position inside the boundary
        player.trail.clear();
        player.trail.push(player.prev_position);
        player.trail.push(player.position);
        player.mark_dirty(DirtyFlags::TRAIL);
    } else if let Some(&last) = player.trail.last() {
        if last.distance_to(player.position) >= trail::MIN_POINT_SPACING {
            player.trail.push(player.position);
            player.mark_dirty(DirtyFlags::TRAIL);
        }
    }
    player.in_territory = false;
    None
}

// ============================================================================
// Subtraction (phase 8)
// ============================================================================

/// Cut `capturer`'s territory out of `victim`'s, killing the victim if
/// nothing usable is left, and trap the victim if its body ended up in
/// `capturer`'s land while outside its own.
pub fn subtract(capturer: &Player, victim: &mut Player, deaths: &mut Vec<Death>) {
    if victim.territory.len() >= 3 {
        let overlaps = match (Bounds::of(&capturer.territory), Bounds::of(&victim.territory)) {
            (Some(a), Some(b)) => a.overlaps(&b),
            _ => false,
        };
        if overlaps {
            match largest_difference(&victim.territory, &capturer.territory) {
                Some(remaining) if remaining.len() < 3 => {
                    mark_dead(victim, Some(capturer.id), KillType::Territory, deaths);
                }
                Some(remaining) => {
                    let before = victim.territory_area();
                    let after = polygon_area(&remaining);
                    if (before - after).abs() > territory::CAPTURE_AREA_TOLERANCE {
                        victim.set_territory(simplify_territory(&remaining));
                    }
                }
                None => {
                    warn!(
                        "Territory difference failed ({} vs {}), keeping victim territory",
                        capturer.id, victim.id
                    );
                }
            }
        }
    }

    if capturer.contains_point(victim.position) && !victim.contains_point(victim.position) {
        mark_dead(victim, Some(capturer.id), KillType::Trapped, deaths);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::HslColor;
    use crate::util::geometry::point_in_polygon;

    fn square(x0: f32, y0: f32, side: f32) -> Vec<Vec2> {
        vec![
            Vec2::new(x0, y0),
            Vec2::new(x0 + side, y0),
            Vec2::new(x0 + side, y0 + side),
            Vec2::new(x0, y0 + side),
        ]
    }

    fn player_with(id: u32, territory: Vec<Vec2>, position: Vec2) -> Player {
        let color = HslColor { hue: 0, sat: 0, lum: 0 };
        let mut p = Player::new(id, format!("p{}", id), position, 0.0, color, None);
        p.set_territory(territory);
        p.in_territory = p.contains_point(position);
        p
    }

    #[test]
    fn test_capture_rectangle_extension() {
        let terr = square(0.0, 0.0, 100.0);
        // Out the right side, up and back in: adds a 50x100 strip
        let path = vec![
            Vec2::new(90.0, 10.0),
            Vec2::new(150.0, 10.0),
            Vec2::new(150.0, 90.0),
            Vec2::new(90.0, 90.0),
        ];
        match capture_territory(&terr, &path) {
            CaptureOutcome::Captured { polygon, area_gained } => {
                assert!((area_gained - 50.0 * 80.0).abs() < 1.0);
                assert!((polygon_area(&polygon) - 14000.0).abs() < 1.0);
                assert!(point_in_polygon(Vec2::new(50.0, 50.0), &polygon));
                assert!(point_in_polygon(Vec2::new(140.0, 50.0), &polygon));
            }
            other => panic!("expected capture, got {:?}", other),
        }
    }

    #[test]
    fn test_capture_orientation_independent() {
        let mut terr = square(0.0, 0.0, 100.0);
        terr.reverse();
        let path = vec![
            Vec2::new(90.0, 10.0),
            Vec2::new(150.0, 10.0),
            Vec2::new(150.0, 90.0),
            Vec2::new(90.0, 90.0),
        ];
        let CaptureOutcome::Captured { area_gained, .. } = capture_territory(&terr, &path) else {
            panic!("expected capture");
        };
        assert!((area_gained - 4000.0).abs() < 1.0);
    }

    #[test]
    fn test_capture_wrapping_corner() {
        let terr = square(0.0, 0.0, 100.0);
        // Leave through the right edge and come back through the bottom
        let path = vec![
            Vec2::new(90.0, 50.0),
            Vec2::new(150.0, 50.0),
            Vec2::new(150.0, 150.0),
            Vec2::new(50.0, 150.0),
            Vec2::new(50.0, 90.0),
        ];
        let CaptureOutcome::Captured { polygon, area_gained } = capture_territory(&terr, &path) else {
            panic!("expected capture");
        };
        assert!((area_gained - 7500.0).abs() < 1.0);
        assert!(point_in_polygon(Vec2::new(10.0, 10.0), &polygon));
    }

    #[test]
    fn test_zero_area_capture_is_noop() {
        let terr = square(0.0, 0.0, 100.0);
        // Out and straight back along the same line
        let path = vec![
            Vec2::new(90.0, 50.0),
            Vec2::new(130.0, 50.0),
            Vec2::new(130.0, 50.05),
            Vec2::new(90.0, 50.05),
        ];
        assert_eq!(capture_territory(&terr, &path), CaptureOutcome::Unchanged);
    }

    #[test]
    fn test_capture_never_shrinks() {
        let terr = square(0.0, 0.0, 100.0);
        let old = polygon_area(&terr);
        let path = vec![
            Vec2::new(90.0, 50.0),
            Vec2::new(120.0, 40.0),
            Vec2::new(120.0, 60.0),
            Vec2::new(95.0, 55.0),
        ];
        match capture_territory(&terr, &path) {
            CaptureOutcome::Captured { polygon, .. } => {
                assert!(polygon_area(&polygon) >= old - territory::CAPTURE_AREA_TOLERANCE);
            }
            CaptureOutcome::Unchanged | CaptureOutcome::Rejected => {}
        }
    }

    #[test]
    fn test_degenerate_input_rejected() {
        assert_eq!(capture_territory(&[], &[Vec2::ZERO, Vec2::ZERO]), CaptureOutcome::Rejected);
        assert_eq!(capture_territory(&square(0.0, 0.0, 10.0), &[Vec2::ZERO]), CaptureOutcome::Rejected);
    }

    #[test]
    fn test_simplify_territory_respects_cap() {
        let noisy: Vec<Vec2> = (0..2000)
            .map(|i| {
                let a = i as f32 / 2000.0 * std::f32::consts::TAU;
                let r = 500.0 + if i % 2 == 0 { 3.0 } else { -3.0 };
                Vec2::new(a.cos() * r, a.sin() * r)
            })
            .collect();
        let simplified = simplify_territory(&noisy);
        assert!(simplified.len() <= territory::MAX_POINTS);
        assert!(simplified.len() >= 3);
    }

    #[test]
    fn test_step_starts_and_extends_trail() {
        let mut p = player_with(1, square(0.0, 0.0, 100.0), Vec2::new(95.0, 50.0));
        p.prev_position = p.position;
        p.position = Vec2::new(105.0, 50.0);
        assert!(step(&mut p).is_none());
        assert!(!p.in_territory);
        assert_eq!(p.trail, vec![Vec2::new(95.0, 50.0), Vec2::new(105.0, 50.0)]);

        p.prev_position = p.position;
        p.position = Vec2::new(108.0, 50.0);
        step(&mut p);
        // Closer than the spacing: not recorded
        assert_eq!(p.trail.len(), 2);

        p.position = Vec2::new(115.0, 50.0);
        step(&mut p);
        assert_eq!(p.trail.len(), 3);
    }

    #[test]
    fn test_step_captures_on_reentry() {
        let mut p = player_with(1, square(0.0, 0.0, 100.0), Vec2::new(90.0, 10.0));
        p.in_territory = false;
        p.trail = vec![Vec2::new(90.0, 10.0), Vec2::new(150.0, 10.0), Vec2::new(150.0, 90.0)];
        p.position = Vec2::new(90.0, 90.0);
        let before = p.territory_area();
        let event = step(&mut p);
        assert!(matches!(event, Some(WorldEvent::Capture { player: 1, .. })));
        assert!(p.territory_area() > before);
        assert!(p.trail.is_empty());
        assert!(p.in_territory);
        assert!(p.captured_this_tick);
        assert!(p.area_gained > 0.0);
    }

    #[test]
    fn test_snipped_player_home_clears_without_capture() {
        let mut p = player_with(1, square(0.0, 0.0, 100.0), Vec2::new(90.0, 10.0));
        p.in_territory = false;
        p.trail = vec![Vec2::new(90.0, 10.0), Vec2::new(150.0, 10.0), Vec2::new(150.0, 90.0)];
        p.position = Vec2::new(150.0, 50.0);
        snip::start(&mut p, None, 0, Vec2::new(120.0, 10.0));
        p.position = Vec2::new(90.0, 90.0);
        let before = p.territory_area();
        assert!(step(&mut p).is_none());
        assert!(!p.is_snipped());
        assert!(p.trail.is_empty());
        assert_eq!(p.territory_area(), before);
    }

    #[test]
    fn test_subtract_takes_overlap() {
        let capturer = player_with(1, square(0.0, 0.0, 100.0), Vec2::new(50.0, 50.0));
        let mut victim = player_with(2, square(50.0, 0.0, 100.0), Vec2::new(125.0, 50.0));
        let mut deaths = Vec::new();
        subtract(&capturer, &mut victim, &mut deaths);
        assert!(deaths.is_empty());
        assert!((victim.territory_area() - 5000.0).abs() < 5.0);
        assert!(victim.dirty.contains(DirtyFlags::TERRITORY));
    }

    #[test]
    fn test_subtract_fully_covered_kills() {
        let capturer = player_with(1, square(0.0, 0.0, 300.0), Vec2::new(20.0, 20.0));
        let mut victim = player_with(2, square(100.0, 100.0, 50.0), Vec2::new(125.0, 125.0));
        let mut deaths = Vec::new();
        subtract(&capturer, &mut victim, &mut deaths);
        assert!(victim.dead);
        assert_eq!(deaths[0].kill_type, KillType::Territory);
        assert_eq!(deaths[0].killer, Some(1));
    }

    #[test]
    fn test_trapped_body_dies() {
        let capturer = player_with(1, square(0.0, 0.0, 300.0), Vec2::new(20.0, 20.0));
        let mut victim = player_with(2, square(1000.0, 1000.0, 50.0), Vec2::new(150.0, 150.0));
        let mut deaths = Vec::new();
        subtract(&capturer, &mut victim, &mut deaths);
        assert_eq!(deaths.len(), 1);
        assert_eq!(deaths[0].kill_type, KillType::Trapped);
    }
}

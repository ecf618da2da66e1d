//! Pairwise player interactions (tick phase 8)
//!
//! Every pair of the alive snapshot is resolved once, in slot order:
//! trail contact, territory subtraction after a capture, then body
//! collision. Self-trail contact is checked per player afterwards.

use crate::game::constants::{territory, trail};
use crate::game::state::{mark_dead, Death, KillType, Player};
use crate::game::systems::{snip, territory as territory_system};
use crate::game::world::WorldEvent;

/// The inputs body-collision resolution looks at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub in_territory: bool,
    pub area: f32,
}

impl BodyState {
    pub fn of(player: &Player) -> Self {
        Self {
            in_territory: player.in_territory,
            area: player.territory_area(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionOutcome {
    /// First player survives, second dies
    FirstWins,
    /// Second player survives, first dies
    SecondWins,
    /// Equal footing: both die, no killer
    BothDie,
}

impl CollisionOutcome {
    /// Outcome with the argument order swapped
    pub fn mirrored(self) -> Self {
        match self {
            CollisionOutcome::FirstWins => CollisionOutcome::SecondWins,
            CollisionOutcome::SecondWins => CollisionOutcome::FirstWins,
            CollisionOutcome::BothDie => CollisionOutcome::BothDie,
        }
    }
}

/// Territory advantage first, then larger area; ties within tolerance
/// kill both
pub fn resolve_body_collision(a: &BodyState, b: &BodyState) -> CollisionOutcome {
    match (a.in_territory, b.in_territory) {
        (true, false) => return CollisionOutcome::FirstWins,
        (false, true) => return CollisionOutcome::SecondWins,
        _ => {}
    }
    let diff = a.area - b.area;
    if diff.abs() <= territory::AREA_TIE_TOLERANCE {
        CollisionOutcome::BothDie
    } else if diff > 0.0 {
        CollisionOutcome::FirstWins
    } else {
        CollisionOutcome::SecondWins
    }
}

#[inline]
pub fn bodies_touch(a: &Player, b: &Player) -> bool {
    let reach = a.radius() + b.radius();
    a.position.distance_sq_to(b.position) < reach * reach
}

/// `attacker`'s body against `owner`'s trail. Snipped players cannot snip.
fn trail_contact(attacker: &Player, owner: &mut Player, events: &mut Vec<WorldEvent>) {
    if attacker.is_snipped() || owner.is_snipped() || owner.trail.is_empty() {
        return;
    }
    if let Some(segment) = owner.hits_trail(attacker.position, attacker.radius(), 0) {
        events.extend(snip::start(owner, Some(attacker.id), segment, attacker.position));
    }
}

/// Resolve one pair
pub fn interact(a: &mut Player, b: &mut Player, events: &mut Vec<WorldEvent>, deaths: &mut Vec<Death>) {
    trail_contact(a, b, events);
    trail_contact(b, a, events);

    if a.captured_this_tick {
        territory_system::subtract(a, b, deaths);
    }
    if b.captured_this_tick {
        territory_system::subtract(b, a, deaths);
    }

    if bodies_touch(a, b) {
        match resolve_body_collision(&BodyState::of(a), &BodyState::of(b)) {
            CollisionOutcome::FirstWins => {
                mark_dead(b, Some(a.id), KillType::Body, deaths);
            }
            CollisionOutcome::SecondWins => {
                mark_dead(a, Some(b.id), KillType::Body, deaths);
            }
            CollisionOutcome::BothDie => {
                mark_dead(a, None, KillType::Body, deaths);
                mark_dead(b, None, KillType::Body, deaths);
            }
        }
    }
}

/// Own-trail contact starts a self-snip (no kill credit)
pub fn self_trail(player: &mut Player, events: &mut Vec<WorldEvent>) {
    if player.dead || player.is_snipped() {
        return;
    }
    if let Some(segment) = player.hits_trail(player.position, player.radius(), trail::SELF_SKIP_SEGMENTS) {
        let contact = player.position;
        events.extend(snip::start(player, None, segment, contact));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::HslColor;
    use crate::util::vec2::Vec2;

    fn body(in_territory: bool, area: f32) -> BodyState {
        BodyState { in_territory, area }
    }

    fn player(id: u32, x: f32, y: f32) -> Player {
        let color = HslColor { hue: 0, sat: 0, lum: 0 };
        Player::new(id, format!("p{}", id), Vec2::new(x, y), 0.0, color, None)
    }

    #[test]
    fn test_territory_advantage() {
        assert_eq!(
            resolve_body_collision(&body(true, 10.0), &body(false, 1e6)),
            CollisionOutcome::FirstWins
        );
        assert_eq!(
            resolve_body_collision(&body(false, 1e6), &body(true, 10.0)),
            CollisionOutcome::SecondWins
        );
    }

    #[test]
    fn test_larger_area_wins() {
        assert_eq!(
            resolve_body_collision(&body(false, 500.0), &body(false, 400.0)),
            CollisionOutcome::FirstWins
        );
        assert_eq!(
            resolve_body_collision(&body(true, 400.0), &body(true, 500.0)),
            CollisionOutcome::SecondWins
        );
    }

    #[test]
    fn test_tie_kills_both() {
        assert_eq!(
            resolve_body_collision(&body(false, 500.0), &body(false, 502.0)),
            CollisionOutcome::BothDie
        );
    }

    #[test]
    fn test_resolution_is_commutative() {
        let states = [
            body(true, 100.0),
            body(false, 100.0),
            body(true, 5000.0),
            body(false, 5000.0),
            body(false, 5003.0),
        ];
        for a in &states {
            for b in &states {
                assert_eq!(resolve_body_collision(a, b), resolve_body_collision(b, a).mirrored());
            }
        }
    }

    #[test]
    fn test_interact_body_tie_outside() {
        let mut a = player(1, 1000.0, 1000.0);
        let mut b = player(2, 1010.0, 1000.0);
        a.in_territory = false;
        b.in_territory = false;
        let (mut events, mut deaths) = (Vec::new(), Vec::new());
        interact(&mut a, &mut b, &mut events, &mut deaths);
        assert!(a.dead && b.dead);
        assert_eq!(deaths.len(), 2);
        assert!(deaths.iter().all(|d| d.killer.is_none() && d.kill_type == KillType::Body));
    }

    #[test]
    fn test_interact_trail_hit_snips_owner() {
        let mut a = player(1, 1000.0, 1000.0);
        let mut b = player(2, 1000.0, 1200.0);
        b.in_territory = false;
        b.trail = vec![Vec2::new(950.0, 1005.0), Vec2::new(1050.0, 1005.0)];
        b.position = Vec2::new(1100.0, 1100.0);
        let (mut events, mut deaths) = (Vec::new(), Vec::new());
        interact(&mut a, &mut b, &mut events, &mut deaths);
        assert!(b.is_snipped());
        assert_eq!(b.snipped_by(), Some(1));
        assert!(!b.dead);
        assert!(matches!(events[0], WorldEvent::SnipStart { victim: 2, attacker: Some(1), .. }));
    }

    #[test]
    fn test_snipped_player_cannot_snip() {
        let mut a = player(1, 1000.0, 1000.0);
        a.trail = vec![Vec2::new(900.0, 900.0), Vec2::new(950.0, 900.0)];
        snip::start(&mut a, None, 0, Vec2::new(920.0, 900.0));
        let mut b = player(2, 1000.0, 1200.0);
        b.trail = vec![Vec2::new(950.0, 1005.0), Vec2::new(1050.0, 1005.0)];
        b.position = Vec2::new(1100.0, 1100.0);
        let (mut events, mut deaths) = (Vec::new(), Vec::new());
        interact(&mut a, &mut b, &mut events, &mut deaths);
        assert!(!b.is_snipped());
    }

    #[test]
    fn test_self_trail_skips_recent_segments() {
        let mut p = player(1, 1000.0, 1000.0);
        p.in_territory = false;
        p.trail = vec![
            Vec2::new(1000.0, 900.0),
            Vec2::new(1100.0, 900.0),
            Vec2::new(1100.0, 1000.0),
            Vec2::new(1000.0, 1000.0),
        ];
        // Sitting on the newest segments only: no self-snip
        p.position = Vec2::new(990.0, 1000.0);
        let mut events = Vec::new();
        self_trail(&mut p, &mut events);
        assert!(!p.is_snipped());

        // Crossing the oldest segment starts a self-snip
        p.trail.push(Vec2::new(1000.0, 950.0));
        p.trail.push(Vec2::new(1050.0, 950.0));
        p.position = Vec2::new(1050.0, 905.0);
        self_trail(&mut p, &mut events);
        assert!(p.is_snipped());
        assert_eq!(p.snipped_by(), None);
    }
}

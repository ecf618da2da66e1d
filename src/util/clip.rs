//! Polygon difference for simple polygons
//!
//! Greiner-Hormann style: both rings get their mutual crossings spliced
//! in, crossings along the subject are tagged as entering or leaving the
//! clip polygon, and the result is traced by walking the subject forward
//! outside the clip and the clip backward inside the subject.
//!
//! Degenerate contacts (a vertex on the other ring's edge, collinear
//! overlapping edges) are avoided by nudging the clip polygon a fraction
//! of a unit and retrying. Holes are not representable, so a clip polygon
//! strictly inside the subject leaves the subject unchanged.

use crate::util::geometry::{point_in_polygon, signed_area, Bounds};
use crate::util::vec2::Vec2;

/// Parametric slack treated as touching a segment end
const ENDPOINT_EPS: f64 = 1e-7;
/// Nudge distances tried when the first pass hits a degenerate contact
const NUDGES: [(f64, f64); 4] = [(0.0, 0.0), (1.3e-3, 0.7e-3), (-0.9e-3, 1.6e-3), (2.1e-3, -2.9e-3)];

#[derive(Debug, Clone, Copy)]
struct Node {
    p: (f64, f64),
    intersect: bool,
    /// Subject ring: crossing goes from outside to inside the clip ring
    entry: bool,
    /// Index of the twin node in the other ring
    neighbor: usize,
    visited: bool,
}

impl Node {
    fn vertex(p: (f64, f64)) -> Self {
        Self {
            p,
            intersect: false,
            entry: false,
            neighbor: usize::MAX,
            visited: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Crossing {
    p: (f64, f64),
    edge_a: usize,
    alpha_a: f64,
    edge_b: usize,
    alpha_b: f64,
}

struct Degenerate;

/// `subject − clip`. Returns `None` when no robust answer was found, in
/// which case the caller keeps its previous state. An empty list means
/// the subject was entirely covered.
pub fn polygon_difference(subject: &[Vec2], clip: &[Vec2]) -> Option<Vec<Vec<Vec2>>> {
    if subject.len() < 3 {
        return Some(Vec::new());
    }
    if clip.len() < 3 {
        return Some(vec![subject.to_vec()]);
    }
    match (Bounds::of(subject), Bounds::of(clip)) {
        (Some(a), Some(b)) if a.overlaps(&b) => {}
        _ => return Some(vec![subject.to_vec()]),
    }

    let a = oriented(subject);
    let b = oriented(clip);

    for (dx, dy) in NUDGES {
        let shifted: Vec<(f64, f64)> = b.iter().map(|&(x, y)| (x + dx, y + dy)).collect();
        if let Ok(pieces) = difference_pass(&a, &shifted) {
            let out = pieces
                .into_iter()
                .map(|ring| ring.into_iter().map(|(x, y)| Vec2::new(x as f32, y as f32)).collect::<Vec<_>>())
                .filter(|ring| ring.len() >= 3)
                .collect();
            return Some(out);
        }
    }
    None
}

/// Largest piece of `subject − clip`, or an empty ring when nothing is left
pub fn largest_difference(subject: &[Vec2], clip: &[Vec2]) -> Option<Vec<Vec2>> {
    let pieces = polygon_difference(subject, clip)?;
    Some(
        pieces
            .into_iter()
            .max_by(|x, y| signed_area(x).abs().total_cmp(&signed_area(y).abs()))
            .unwrap_or_default(),
    )
}

/// Counter-clockwise (positive shoelace) copy in f64
fn oriented(poly: &[Vec2]) -> Vec<(f64, f64)> {
    let mut out: Vec<(f64, f64)> = poly.iter().map(|p| (p.x as f64, p.y as f64)).collect();
    if signed_area(poly) < 0.0 {
        out.reverse();
    }
    out
}

fn to_vec2(poly: &[(f64, f64)]) -> Vec<Vec2> {
    poly.iter().map(|&(x, y)| Vec2::new(x as f32, y as f32)).collect()
}

fn find_crossings(a: &[(f64, f64)], b: &[(f64, f64)]) -> Result<Vec<Crossing>, Degenerate> {
    let mut out = Vec::new();
    for i in 0..a.len() {
        let a1 = a[i];
        let a2 = a[(i + 1) % a.len()];
        let r = (a2.0 - a1.0, a2.1 - a1.1);
        for j in 0..b.len() {
            let b1 = b[j];
            let b2 = b[(j + 1) % b.len()];
            let s = (b2.0 - b1.0, b2.1 - b1.1);
            let q = (b1.0 - a1.0, b1.1 - a1.1);
            let denom = r.0 * s.1 - r.1 * s.0;
            let r_len = (r.0 * r.0 + r.1 * r.1).sqrt().max(1e-12);
            let s_len = (s.0 * s.0 + s.1 * s.1).sqrt().max(1e-12);

            if denom.abs() <= 1e-12 * r_len * s_len {
                // Parallel: only a problem when collinear and overlapping
                let offset = (q.0 * r.1 - q.1 * r.0).abs() / r_len;
                if offset < 1e-9 {
                    let t0 = (q.0 * r.0 + q.1 * r.1) / (r_len * r_len);
                    let t1 = ((b2.0 - a1.0) * r.0 + (b2.1 - a1.1) * r.1) / (r_len * r_len);
                    let (lo, hi) = if t0 < t1 { (t0, t1) } else { (t1, t0) };
                    if hi >= -ENDPOINT_EPS && lo <= 1.0 + ENDPOINT_EPS {
                        return Err(Degenerate);
                    }
                }
                continue;
            }

            let t = (q.0 * s.1 - q.1 * s.0) / denom;
            let u = (q.0 * r.1 - q.1 * r.0) / denom;
            let t_in = t > -ENDPOINT_EPS && t < 1.0 + ENDPOINT_EPS;
            let u_in = u > -ENDPOINT_EPS && u < 1.0 + ENDPOINT_EPS;
            if !(t_in && u_in) {
                continue;
            }
            let t_clean = t > ENDPOINT_EPS && t < 1.0 - ENDPOINT_EPS;
            let u_clean = u > ENDPOINT_EPS && u < 1.0 - ENDPOINT_EPS;
            if !(t_clean && u_clean) {
                return Err(Degenerate);
            }
            out.push(Crossing {
                p: (a1.0 + t * r.0, a1.1 + t * r.1),
                edge_a: i,
                alpha_a: t,
                edge_b: j,
                alpha_b: u,
            });
        }
    }
    Ok(out)
}

/// Lay out a ring with its crossings spliced in after their edge start.
/// Returns the node list and, per crossing, its node index.
fn splice(
    ring: &[(f64, f64)],
    crossings: &[Crossing],
    edge_of: impl Fn(&Crossing) -> (usize, f64),
) -> (Vec<Node>, Vec<usize>) {
    let mut per_edge: Vec<Vec<(f64, usize)>> = vec![Vec::new(); ring.len()];
    for (k, c) in crossings.iter().enumerate() {
        let (edge, alpha) = edge_of(c);
        per_edge[edge].push((alpha, k));
    }

    let mut nodes = Vec::with_capacity(ring.len() + crossings.len());
    let mut slot = vec![0usize; crossings.len()];
    for (i, &p) in ring.iter().enumerate() {
        nodes.push(Node::vertex(p));
        let edge = &mut per_edge[i];
        edge.sort_by(|x, y| x.0.total_cmp(&y.0));
        for &(_, k) in edge.iter() {
            slot[k] = nodes.len();
            let mut n = Node::vertex(crossings[k].p);
            n.intersect = true;
            nodes.push(n);
        }
    }
    (nodes, slot)
}

fn contains(ring: &[(f64, f64)], p: (f64, f64)) -> bool {
    point_in_polygon(Vec2::new(p.0 as f32, p.1 as f32), &to_vec2(ring))
}

fn difference_pass(a: &[(f64, f64)], b: &[(f64, f64)]) -> Result<Vec<Vec<(f64, f64)>>, Degenerate> {
    let crossings = find_crossings(a, b)?;

    if crossings.is_empty() {
        if contains(b, a[0]) {
            return Ok(Vec::new());
        }
        // Disjoint, or clip strictly inside (a hole we cannot carve)
        return Ok(vec![a.to_vec()]);
    }
    if crossings.len() % 2 != 0 {
        return Err(Degenerate);
    }

    let (mut sa, slot_a) = splice(a, &crossings, |c| (c.edge_a, c.alpha_a));
    let (mut sb, slot_b) = splice(b, &crossings, |c| (c.edge_b, c.alpha_b));
    for k in 0..crossings.len() {
        sa[slot_a[k]].neighbor = slot_b[k];
        sb[slot_b[k]].neighbor = slot_a[k];
    }

    let mut inside = contains(b, a[0]);
    for node in sa.iter_mut().filter(|n| n.intersect) {
        node.entry = !inside;
        inside = !inside;
    }

    let (na, nb) = (sa.len(), sb.len());
    let guard_limit = (na + nb) * 2;
    let mut rings = Vec::new();

    while let Some(start) = (0..na).find(|&i| sa[i].intersect && !sa[i].visited && !sa[i].entry) {
        let mut ring = Vec::new();
        let mut on_a = true;
        let mut cur = start;
        let mut guard = 0usize;

        loop {
            let node = if on_a { sa[cur] } else { sb[cur] };
            ring.push(node.p);
            if node.intersect {
                let (ia, ib) = if on_a { (cur, node.neighbor) } else { (node.neighbor, cur) };
                sa[ia].visited = true;
                sb[ib].visited = true;
            }

            cur = if on_a { (cur + 1) % na } else { (cur + nb - 1) % nb };
            let next = if on_a { sa[cur] } else { sb[cur] };
            if next.intersect {
                let a_index = if on_a { cur } else { next.neighbor };
                if a_index == start {
                    break;
                }
                cur = next.neighbor;
                on_a = !on_a;
            }

            guard += 1;
            if guard > guard_limit {
                return Err(Degenerate);
            }
        }
        rings.push(ring);
    }

    Ok(rings)
}

//! Clustering helpers for grouping raw cascade hits.

use crate::shared::region::FaceRegion;

/// Find root of element `i` with path halving for amortized near-O(1).
pub fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Merge the sets containing `a` and `b`.
pub fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        parent[ra] = rb;
    }
}

/// Collect union-find clusters into groups of member indices.
///
/// Groups are ordered by their smallest member so output is deterministic.
pub fn collect_groups(parent: &mut [usize]) -> Vec<Vec<usize>> {
    let mut groups: std::collections::HashMap<usize, Vec<usize>> =
        std::collections::HashMap::new();
    for idx in 0..parent.len() {
        let root = find(parent, idx);
        groups.entry(root).or_default().push(idx);
    }

    let mut result: Vec<Vec<usize>> = groups.into_values().collect();
    for g in &mut result {
        g.sort_unstable();
    }
    result.sort_by_key(|g| g[0]);
    result
}

/// Two detections belong to the same face when every edge differs by at
/// most `eps` times the mean of the smaller side lengths.
pub fn similar_regions(a: &FaceRegion, b: &FaceRegion, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    let close = |p: i32, q: i32| ((p - q).abs() as f64) <= delta;
    close(a.x, b.x)
        && close(a.y, b.y)
        && close(a.x + a.width, b.x + b.width)
        && close(a.y + a.height, b.y + b.height)
}

//! Graph coloring over the interference graph.

use std::collections::BTreeSet;

/// Color an undirected graph with a fixed palette.
///
/// Two phases: repeatedly push a vertex of degree below the palette size
/// onto a stack, deleting its edges; then pop and assign each vertex the
/// least color unused by its already-colored neighbours. Vertices left
/// edge-free after coarsening take color zero. Vertex order is stable
/// (degree descending, id ascending), so the result is deterministic.
///
/// `adjacency[v]` holds the neighbour ids of vertex `v`; self-edges are
/// ignored. The palette must be large enough to cover the largest clique;
/// the caller derives it from the maximum number of co-live symbols.
#[must_use]
pub fn color_graph(adjacency: &[BTreeSet<usize>], num_colors: usize) -> Vec<usize> {
    let num_vertices = adjacency.len();
    let mut working: Vec<BTreeSet<usize>> = adjacency
        .iter()
        .enumerate()
        .map(|(vertex, neighbours)| {
            neighbours.iter().copied().filter(|&n| n != vertex).collect()
        })
        .collect();

    let mut order: Vec<usize> = (0..num_vertices).collect();
    order.sort_by_key(|&vertex| (std::cmp::Reverse(working[vertex].len()), vertex));

    let mut removed = vec![false; num_vertices];
    let mut stack = Vec::with_capacity(num_vertices);

    // Phase one: peel vertices whose degree fits the palette.
    loop {
        let candidate = order.iter().copied().find(|&vertex| {
            !removed[vertex]
                && !working[vertex].is_empty()
                && working[vertex].len() < num_colors
        });
        let Some(vertex) = candidate else { break };
        removed[vertex] = true;
        stack.push(vertex);
        let neighbours: Vec<usize> = working[vertex].iter().copied().collect();
        for neighbour in neighbours {
            working[neighbour].remove(&vertex);
        }
    }

    // The rest of the graph is edge-free; color zero serves all of it.
    let mut colors = vec![0usize; num_vertices];

    // Phase two: pop and take the least color free among neighbours.
    let mut assigned = vec![false; num_vertices];
    for (vertex, &is_removed) in removed.iter().enumerate() {
        if !is_removed {
            assigned[vertex] = true;
        }
    }
    while let Some(vertex) = stack.pop() {
        let occupied: BTreeSet<usize> = adjacency[vertex]
            .iter()
            .filter(|&&neighbour| assigned[neighbour])
            .map(|&neighbour| colors[neighbour])
            .collect();
        let color = (0..num_colors)
            .find(|candidate| !occupied.contains(candidate))
            .unwrap_or(0);
        colors[vertex] = color;
        assigned[vertex] = true;
    }
    colors
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn adjacency_from_edges(num_vertices: usize, edges: &[(usize, usize)]) -> Vec<BTreeSet<usize>> {
        let mut adjacency = vec![BTreeSet::new(); num_vertices];
        for &(a, b) in edges {
            adjacency[a].insert(b);
            adjacency[b].insert(a);
        }
        adjacency
    }

    #[test]
    fn triangle_needs_three_colors() {
        let adjacency = adjacency_from_edges(3, &[(0, 1), (1, 2), (0, 2)]);
        let colors = color_graph(&adjacency, 3);
        assert_ne!(colors[0], colors[1]);
        assert_ne!(colors[1], colors[2]);
        assert_ne!(colors[0], colors[2]);
    }

    #[test]
    fn disconnected_vertices_share_color_zero() {
        let adjacency = adjacency_from_edges(3, &[]);
        assert_eq!(color_graph(&adjacency, 1), vec![0, 0, 0]);
    }

    #[test]
    fn path_reuses_colors() {
        let adjacency = adjacency_from_edges(4, &[(0, 1), (1, 2), (2, 3)]);
        let colors = color_graph(&adjacency, 2);
        for &(a, b) in &[(0, 1), (1, 2), (2, 3)] {
            assert_ne!(colors[a], colors[b]);
        }
        assert!(colors.iter().all(|&c| c < 2));
    }

    #[test]
    fn coloring_is_deterministic() {
        let adjacency = adjacency_from_edges(5, &[(0, 1), (0, 2), (1, 2), (3, 4)]);
        let first = color_graph(&adjacency, 3);
        let second = color_graph(&adjacency, 3);
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn neighbours_never_share_a_color(
            num_vertices in 1usize..10,
            raw_edges in proptest::collection::vec((0usize..10, 0usize..10), 0..20)
        ) {
            let edges: Vec<(usize, usize)> = raw_edges
                .into_iter()
                .map(|(a, b)| (a % num_vertices, b % num_vertices))
                .filter(|(a, b)| a != b)
                .collect();
            let adjacency = adjacency_from_edges(num_vertices, &edges);
            let max_degree = adjacency.iter().map(BTreeSet::len).max().unwrap_or(0);
            let colors = color_graph(&adjacency, max_degree + 1);
            for (a, b) in edges {
                prop_assert_ne!(colors[a], colors[b]);
            }
        }
    }
}

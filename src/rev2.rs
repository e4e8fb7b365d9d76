//! REV2-style fairness / goodness scoring.
//!
//! Each round runs three passes in a fixed order: node goodness from
//! incoming ratings, edge fairness from goodness and rater fairness, then
//! node fairness from outgoing edge fairness. A pass reads only the state
//! left by the previous pass, collects new values into a buffer, and
//! commits the buffer in one step once every value has been computed.
//!
//! All sums are accumulated by sweeping edges in insertion order, so a
//! given snapshot always follows the same numeric trajectory.

use petgraph::graph::DiGraph;
use petgraph::visit::EdgeRef;
use tracing::{debug, info, warn};

use crate::config::ScoringConfig;
use crate::models::{TrustEdge, TrustNode};
use crate::snapshot::SnapshotGraph;

/// Smoothing constant for the edge-fairness blend. It cancels out of the
/// current formula but keeps the weighting explicit.
pub const GAMMA: f64 = 0.01;

type Graph = DiGraph<TrustNode, TrustEdge>;

/// Sum of absolute changes made by one round, per quantity.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RoundDeltas {
    /// Node fairness (`du`).
    pub fairness: f64,
    /// Node goodness (`dp`).
    pub goodness: f64,
    /// Edge fairness (`dr`).
    pub edge_fairness: f64,
}

impl RoundDeltas {
    pub fn within(&self, tolerance: f64) -> bool {
        self.fairness < tolerance && self.goodness < tolerance && self.edge_fairness < tolerance
    }
}

/// How a scoring run ended. The scores themselves live on the graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Convergence {
    pub rounds: usize,
    pub last: RoundDeltas,
    pub converged: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Rev2Scorer {
    config: ScoringConfig,
}

impl Rev2Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Runs rounds until every delta drops below the tolerance or the
    /// round cap is reached, annotating `snapshot` in place.
    pub fn run(&self, snapshot: &mut SnapshotGraph) -> Convergence {
        let mut last = RoundDeltas::default();

        for round_number in 1..=self.config.max_rounds {
            last = round(snapshot);
            debug!(
                round = round_number,
                du = last.fairness,
                dp = last.goodness,
                dr = last.edge_fairness,
                "scoring round"
            );

            if last.within(self.config.tolerance) {
                info!(rounds = round_number, "scores converged");
                return Convergence {
                    rounds: round_number,
                    last,
                    converged: true,
                };
            }
        }

        warn!(
            rounds = self.config.max_rounds,
            du = last.fairness,
            dp = last.goodness,
            dr = last.edge_fairness,
            "round cap reached before convergence"
        );
        Convergence {
            rounds: self.config.max_rounds,
            last,
            converged: false,
        }
    }
}

/// One full round: goodness, then edge fairness, then node fairness.
pub fn round(snapshot: &mut SnapshotGraph) -> RoundDeltas {
    let graph = &mut snapshot.graph;
    let goodness = goodness_pass(graph);
    let edge_fairness = edge_fairness_pass(graph);
    let fairness = fairness_pass(graph);
    RoundDeltas {
        fairness,
        goodness,
        edge_fairness,
    }
}

/// `1 - |w - g| / 2` blended with the rater's fairness, clamped to `[0, 1]`.
pub fn edge_fairness(weight: f64, target_goodness: f64, rater_fairness: f64) -> f64 {
    let rating_distance = 1.0 - (weight - target_goodness).abs() / 2.0;
    let blended = (GAMMA * rating_distance + GAMMA * rater_fairness) / (2.0 * GAMMA);
    blended.clamp(0.0, 1.0)
}

fn goodness_pass(graph: &mut Graph) -> f64 {
    let mut totals = vec![(0.0_f64, 0_usize); graph.node_count()];
    for edge in graph.edge_references() {
        let rater = &graph[edge.source()];
        let slot = &mut totals[edge.target().index()];
        slot.0 += rater.fairness * edge.weight().weight;
        slot.1 += 1;
    }

    let mut delta = 0.0;
    for (node, (sum, count)) in graph.node_weights_mut().zip(totals) {
        let next = if count == 0 {
            0.0
        } else {
            (sum / count as f64).clamp(-1.0, 1.0)
        };
        delta += (next - node.goodness).abs();
        node.goodness = next;
    }
    delta
}

fn edge_fairness_pass(graph: &mut Graph) -> f64 {
    let next: Vec<f64> = graph
        .edge_references()
        .map(|edge| {
            edge_fairness(
                edge.weight().weight,
                graph[edge.target()].goodness,
                graph[edge.source()].fairness,
            )
        })
        .collect();

    let mut delta = 0.0;
    for (edge, value) in graph.edge_weights_mut().zip(next) {
        delta += (value - edge.fairness.unwrap_or(0.0)).abs();
        edge.fairness = Some(value);
    }
    delta
}

fn fairness_pass(graph: &mut Graph) -> f64 {
    let mut totals = vec![(0.0_f64, 0_usize); graph.node_count()];
    for edge in graph.edge_references() {
        let slot = &mut totals[edge.source().index()];
        slot.0 += edge.weight().fairness.unwrap_or(0.0);
        slot.1 += 1;
    }

    let mut delta = 0.0;
    for (node, (sum, count)) in graph.node_weights_mut().zip(totals) {
        // Raters with no outgoing edges keep whatever fairness they had.
        if count == 0 {
            continue;
        }
        let next = (sum / count as f64).clamp(0.0, 1.0);
        delta += (next - node.fairness).abs();
        node.fairness = next;
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EdgeRecord;
    use chrono::{TimeZone, Utc};

    const EPS: f64 = 1e-12;

    fn record(source: &str, target: &str, rating: f64) -> EdgeRecord {
        EdgeRecord {
            source: source.to_string(),
            target: target.to_string(),
            rating,
            timestamp: Utc.timestamp_opt(1_300_000_000, 0).unwrap(),
        }
    }

    fn triangle() -> SnapshotGraph {
        SnapshotGraph::build(&[
            record("A", "B", 8.0),
            record("B", "C", -5.0),
            record("C", "A", 2.0),
        ])
    }

    fn mixed() -> SnapshotGraph {
        SnapshotGraph::build(&[
            record("1", "2", 10.0),
            record("1", "3", -10.0),
            record("2", "3", -10.0),
            record("3", "1", 7.0),
            record("4", "2", -3.0),
            record("4", "2", 9.0),
            record("2", "2", 1.0),
            record("5", "1", 0.0),
        ])
    }

    fn set_fairness(snapshot: &mut SnapshotGraph, id: &str, value: f64) {
        let idx = snapshot.ensure_node(id);
        snapshot.graph[idx].fairness = value;
    }

    #[test]
    fn gamma_cancels_in_edge_fairness() {
        assert!((edge_fairness(0.8, 0.0, 0.0) - 0.3).abs() < EPS);
        assert!((edge_fairness(-1.0, 1.0, 1.0) - 0.5).abs() < EPS);
        assert_eq!(edge_fairness(1.0, 1.0, 1.0), 1.0);
    }

    #[test]
    fn first_two_rounds_match_hand_computation() {
        let mut graph = SnapshotGraph::build(&[record("A", "B", 8.0)]);

        let first = round(&mut graph);
        assert_eq!(graph.node("B").unwrap().goodness, 0.0);
        assert!((graph.edges().next().unwrap().edge.fairness.unwrap() - 0.3).abs() < EPS);
        assert!((graph.node("A").unwrap().fairness - 0.3).abs() < EPS);
        assert_eq!(graph.node("B").unwrap().fairness, 0.0);
        assert_eq!(first.goodness, 0.0);
        assert!((first.edge_fairness - 0.3).abs() < EPS);
        assert!((first.fairness - 0.3).abs() < EPS);

        let second = round(&mut graph);
        assert!((graph.node("B").unwrap().goodness - 0.24).abs() < EPS);
        assert!((graph.node("A").unwrap().fairness - 0.51).abs() < EPS);
        assert!((second.goodness - 0.24).abs() < EPS);
        assert!((second.edge_fairness - 0.21).abs() < EPS);
        assert!((second.fairness - 0.21).abs() < EPS);
    }

    #[test]
    fn runs_are_bit_identical() {
        let scorer = Rev2Scorer::default();
        let mut first = mixed();
        let mut second = mixed();
        let a = scorer.run(&mut first);
        let b = scorer.run(&mut second);
        assert_eq!(a, b);

        for (x, y) in first.nodes().zip(second.nodes()) {
            assert_eq!(x.id, y.id);
            assert_eq!(x.fairness.to_bits(), y.fairness.to_bits());
            assert_eq!(x.goodness.to_bits(), y.goodness.to_bits());
        }
        for (x, y) in first.edges().zip(second.edges()) {
            let (x, y) = (x.edge.fairness.unwrap(), y.edge.fairness.unwrap());
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn annotations_stay_clamped_every_round() {
        let mut graph = mixed();
        for _ in 0..crate::config::MAX_ROUNDS {
            round(&mut graph);
            for node in graph.nodes() {
                assert!((-1.0..=1.0).contains(&node.goodness), "{node:?}");
                assert!((0.0..=1.0).contains(&node.fairness), "{node:?}");
            }
            for view in graph.edges() {
                let fairness = view.edge.fairness.unwrap();
                assert!((0.0..=1.0).contains(&fairness));
            }
        }
    }

    #[test]
    fn never_exceeds_the_round_cap() {
        let scorer = Rev2Scorer::new(ScoringConfig {
            max_rounds: 3,
            tolerance: 0.0,
        });
        let outcome = scorer.run(&mut mixed());
        assert_eq!(outcome.rounds, 3);
        assert!(!outcome.converged);
    }

    #[test]
    fn early_stop_means_all_deltas_below_tolerance() {
        let outcome = Rev2Scorer::default().run(&mut mixed());
        assert!(outcome.rounds <= crate::config::MAX_ROUNDS);
        if outcome.converged {
            assert!(outcome.last.fairness < 0.01);
            assert!(outcome.last.goodness < 0.01);
            assert!(outcome.last.edge_fairness < 0.01);
        }
    }

    #[test]
    fn source_only_nodes_keep_zero_goodness() {
        let mut graph = mixed();
        for _ in 0..10 {
            round(&mut graph);
            assert_eq!(graph.node("4").unwrap().goodness, 0.0);
            assert_eq!(graph.node("5").unwrap().goodness, 0.0);
        }
    }

    #[test]
    fn sink_nodes_keep_their_previous_fairness() {
        let mut graph = SnapshotGraph::build(&[record("A", "B", 6.0)]);
        set_fairness(&mut graph, "B", 0.7);
        for _ in 0..5 {
            round(&mut graph);
            assert_eq!(graph.node("B").unwrap().fairness, 0.7);
        }
    }

    #[test]
    fn edgeless_graph_converges_after_one_round() {
        let mut graph = SnapshotGraph::default();
        graph.ensure_node("lonely");
        graph.ensure_node("quiet");

        let outcome = Rev2Scorer::default().run(&mut graph);
        assert!(outcome.converged);
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.last, RoundDeltas::default());
        for node in graph.nodes() {
            assert_eq!(node.fairness, 0.0);
            assert_eq!(node.goodness, 0.0);
        }
    }

    #[test]
    fn triangle_converges_inside_bounds() {
        let mut graph = triangle();
        let scorer = Rev2Scorer::default();
        let outcome = scorer.run(&mut graph);
        assert!(outcome.converged);
        assert!(outcome.rounds < crate::config::MAX_ROUNDS);

        for node in graph.nodes() {
            assert!((-1.0..=1.0).contains(&node.goodness));
            assert!((0.0..=1.0).contains(&node.fairness));
        }
        assert!(graph.node("B").unwrap().goodness > 0.0);
        assert!(graph.node("C").unwrap().goodness < 0.0);

        let before: Vec<TrustNode> = graph.nodes().cloned().collect();
        let extra = round(&mut graph);
        assert!(extra.within(0.01));
        for (old, new) in before.iter().zip(graph.nodes()) {
            assert!((old.fairness - new.fairness).abs() < 0.01);
            assert!((old.goodness - new.goodness).abs() < 0.01);
        }
    }

    #[test]
    fn triangle_settles_on_an_exact_fixed_point() {
        let mut graph = triangle();
        let scorer = Rev2Scorer::new(ScoringConfig {
            max_rounds: 200,
            tolerance: 0.0,
        });
        let outcome = scorer.run(&mut graph);
        assert_eq!(outcome.rounds, 200);
        assert_eq!(outcome.last, RoundDeltas::default());

        let nodes: Vec<TrustNode> = graph.nodes().cloned().collect();
        let edges: Vec<Option<f64>> = graph.edges().map(|e| e.edge.fairness).collect();

        assert_eq!(round(&mut graph), RoundDeltas::default());
        assert_eq!(graph.nodes().cloned().collect::<Vec<_>>(), nodes);
        assert_eq!(
            graph.edges().map(|e| e.edge.fairness).collect::<Vec<_>>(),
            edges
        );
    }

    #[test]
    fn exact_fixed_point_is_idempotent() {
        let mut graph = triangle();
        for id in ["A", "B", "C"] {
            set_fairness(&mut graph, id, 1.0);
        }
        round(&mut graph);
        let snapshot: Vec<TrustNode> = graph.nodes().cloned().collect();

        let extra = round(&mut graph);
        assert_eq!(extra, RoundDeltas::default());
        assert_eq!(graph.nodes().cloned().collect::<Vec<_>>(), snapshot);
        assert!((graph.node("B").unwrap().goodness - 0.8).abs() < EPS);
        assert!((graph.node("C").unwrap().goodness + 0.5).abs() < EPS);
        assert!(graph.edges().all(|e| e.edge.fairness == Some(1.0)));
    }

    #[test]
    fn self_loop_feeds_both_passes() {
        let mut graph = SnapshotGraph::build(&[record("A", "A", 10.0)]);
        assert_eq!(graph.edge_count(), 1);

        round(&mut graph);
        let node = graph.node("A").unwrap();
        assert_eq!(node.goodness, 0.0);
        assert!((node.fairness - 0.25).abs() < EPS);

        round(&mut graph);
        let node = graph.node("A").unwrap();
        assert!((node.goodness - 0.25).abs() < EPS);
        assert!((node.fairness - 0.4375).abs() < EPS);
    }
}

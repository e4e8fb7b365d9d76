use std::cmp::Ordering;
use std::fmt::{self, Write};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::TrustError;
use crate::rev2::Convergence;
use crate::snapshot::SnapshotGraph;

/// How node trust is derived for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringMode {
    /// In-degree and mean incoming rating, no scoring run needed.
    Average,
    /// Goodness and fairness from the REV2 scorer.
    Rev2,
}

impl FromStr for ScoringMode {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "average" => Ok(ScoringMode::Average),
            "rev2" => Ok(ScoringMode::Rev2),
            other => Err(TrustError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for ScoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScoringMode::Average => "average",
            ScoringMode::Rev2 => "rev2",
        })
    }
}

/// Per-node values a renderer needs: a size and a colour position in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeView {
    pub id: String,
    pub in_degree: usize,
    pub mean_rating: Option<f64>,
    pub goodness: f64,
    pub fairness: f64,
    pub size: f64,
    pub colour: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeBand {
    Red,
    Orange,
    Grey,
    Brown,
    Green,
}

impl EdgeBand {
    pub const ALL: [EdgeBand; 5] = [
        EdgeBand::Red,
        EdgeBand::Orange,
        EdgeBand::Grey,
        EdgeBand::Brown,
        EdgeBand::Green,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeBand::Red => "red",
            EdgeBand::Orange => "orange",
            EdgeBand::Grey => "grey",
            EdgeBand::Brown => "brown",
            EdgeBand::Green => "green",
        }
    }
}

/// Colour band for a raw `[-10, 10]` rating.
pub fn edge_band(rating: f64) -> EdgeBand {
    if rating <= -6.0 {
        EdgeBand::Red
    } else if rating < 0.0 {
        EdgeBand::Orange
    } else if rating == 0.0 {
        EdgeBand::Grey
    } else if rating < 6.0 {
        EdgeBand::Brown
    } else {
        EdgeBand::Green
    }
}

/// Linear map of `value` from `[lo, hi]` onto `[0, 1]`, clamped at both ends.
fn interp(value: f64, lo: f64, hi: f64) -> f64 {
    ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
}

pub fn node_views(graph: &SnapshotGraph, mode: ScoringMode) -> Vec<NodeView> {
    graph
        .nodes()
        .map(|node| {
            // Count and mean come from the same in-edge enumeration.
            let (count, total) = graph
                .in_edges(&node.id)
                .iter()
                .fold((0usize, 0.0_f64), |(count, total), view| {
                    (count + 1, total + view.edge.rating)
                });
            let mean_rating = (count > 0).then(|| total / count as f64);

            let (size, colour) = match mode {
                ScoringMode::Average => (
                    100.0 * count.max(1) as f64,
                    mean_rating.map_or(0.5, |mean| interp(mean, -10.0, 10.0)),
                ),
                ScoringMode::Rev2 => (
                    100.0 + 900.0 * node.fairness,
                    interp(node.goodness, -1.0, 1.0),
                ),
            };

            NodeView {
                id: node.id.clone(),
                in_degree: count,
                mean_rating,
                goodness: node.goodness,
                fairness: node.fairness,
                size,
                colour,
            }
        })
        .collect()
}

/// Views sorted most trusted first. Ties keep graph order.
pub fn rank_nodes(graph: &SnapshotGraph, mode: ScoringMode) -> Vec<NodeView> {
    let mut views = node_views(graph, mode);
    views.sort_by(|a, b| b.colour.partial_cmp(&a.colour).unwrap_or(Ordering::Equal));
    views
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportedNode<'a> {
    pub id: &'a str,
    pub fairness: f64,
    pub goodness: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportedEdge<'a> {
    pub source: &'a str,
    pub target: &'a str,
    pub rating: f64,
    pub weight: f64,
    pub timestamp: DateTime<Utc>,
    pub fairness: Option<f64>,
    pub band: EdgeBand,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportedGraph<'a> {
    pub nodes: Vec<ExportedNode<'a>>,
    pub edges: Vec<ExportedEdge<'a>>,
}

impl<'a> From<&'a SnapshotGraph> for ExportedGraph<'a> {
    fn from(graph: &'a SnapshotGraph) -> Self {
        Self {
            nodes: graph
                .nodes()
                .map(|node| ExportedNode {
                    id: &node.id,
                    fairness: node.fairness,
                    goodness: node.goodness,
                })
                .collect(),
            edges: graph
                .edges()
                .map(|view| ExportedEdge {
                    source: view.source,
                    target: view.target,
                    rating: view.edge.rating,
                    weight: view.edge.weight,
                    timestamp: view.edge.timestamp,
                    fairness: view.edge.fairness,
                    band: edge_band(view.edge.rating),
                })
                .collect(),
        }
    }
}

/// Node and edge tables as pretty-printed JSON.
pub fn export_json(graph: &SnapshotGraph) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&ExportedGraph::from(graph))
}

pub fn build_report(
    window: &str,
    graph: &SnapshotGraph,
    mode: ScoringMode,
    convergence: Option<&Convergence>,
    limit: usize,
) -> String {
    let ranked = rank_nodes(graph, mode);
    let mut output = String::new();

    let _ = writeln!(output, "# Trust Network Report");
    let _ = writeln!(
        output,
        "Snapshot {} ({} mode): {} nodes, {} ratings",
        window,
        mode,
        graph.node_count(),
        graph.edge_count()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Scoring");

    match convergence {
        Some(run) if run.converged => {
            let _ = writeln!(output, "Converged after {} rounds.", run.rounds);
        }
        Some(run) => {
            let _ = writeln!(
                output,
                "Stopped at the {}-round cap (du {:.4}, dp {:.4}, dr {:.4}).",
                run.rounds, run.last.fairness, run.last.goodness, run.last.edge_fairness
            );
        }
        None => {
            let _ = writeln!(output, "Scoring was not run for this snapshot.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Trusted");
    if ranked.is_empty() {
        let _ = writeln!(output, "No ratings recorded for this window.");
    } else {
        for view in ranked.iter().take(limit) {
            write_node(&mut output, view, mode);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Least Trusted");
    if ranked.is_empty() {
        let _ = writeln!(output, "No ratings recorded for this window.");
    } else {
        for view in ranked.iter().rev().take(limit) {
            write_node(&mut output, view, mode);
        }
    }

    if mode == ScoringMode::Rev2 {
        let mut raters: Vec<&NodeView> = ranked
            .iter()
            .filter(|view| !graph.out_edges(&view.id).is_empty())
            .collect();
        raters.sort_by(|a, b| b.fairness.partial_cmp(&a.fairness).unwrap_or(Ordering::Equal));

        let _ = writeln!(output);
        let _ = writeln!(output, "## Fairest Raters");
        if raters.is_empty() {
            let _ = writeln!(output, "No raters in this window.");
        } else {
            for view in raters.iter().take(limit) {
                let _ = writeln!(
                    output,
                    "- {}: fairness {:.3} over {} ratings given",
                    view.id,
                    view.fairness,
                    graph.out_edges(&view.id).len()
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Rating Bands");
    for band in EdgeBand::ALL {
        let count = graph
            .edges()
            .filter(|view| edge_band(view.edge.rating) == band)
            .count();
        let _ = writeln!(output, "- {}: {}", band.as_str(), count);
    }

    output
}

fn write_node(output: &mut String, view: &NodeView, mode: ScoringMode) {
    let _ = match mode {
        ScoringMode::Rev2 => writeln!(
            output,
            "- {}: goodness {:.3}, fairness {:.3} across {} ratings received",
            view.id, view.goodness, view.fairness, view.in_degree
        ),
        ScoringMode::Average => writeln!(
            output,
            "- {}: mean rating {} across {} ratings received",
            view.id,
            view.mean_rating
                .map_or_else(|| "n/a".to_string(), |mean| format!("{mean:.2}")),
            view.in_degree
        ),
    };
}

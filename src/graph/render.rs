//! Plain-text rendering for CLI output

use std::fmt::Write;

use crate::graph::model::{Graph, Link};

/// `name (Kind)` for a known id, the bare id for a dangling one
pub fn endpoint_label(graph: &Graph, id: &str) -> String {
    match graph.get(id) {
        Some(r) if r.is_cluster_scoped() => format!("{} ({})", r.name, r.kind),
        Some(r) => format!("{}/{} ({})", r.namespace, r.name, r.kind),
        None => format!("{} (missing)", id),
    }
}

pub fn render_link(graph: &Graph, link: &Link) -> String {
    format!(
        "{} -{}-> {}",
        endpoint_label(graph, &link.source),
        link.relation,
        endpoint_label(graph, &link.target)
    )
}

/// Summary line, resources by kind, then every link
pub fn render_text(graph: &Graph) -> String {
    let summary = graph.summary();
    let mut out = String::new();
    let _ = writeln!(out, "{}", summary);
    for (kind, count) in &summary.by_kind {
        let _ = writeln!(out, "  {:<24}{}", kind.as_str(), count);
    }
    if !graph.links.is_empty() {
        let _ = writeln!(out, "links:");
        for link in &graph.links {
            let _ = writeln!(out, "  {}", render_link(graph, link));
        }
    }
    out
}

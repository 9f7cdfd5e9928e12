//! Topic graph: creation DAG, transition path, image records.
//!
//! Two distinct histories live here and must not be conflated:
//!
//! - the **graph** (nodes + edges) records where each topic was *first*
//!   created — an edge `u → v` means v was created while u was current;
//! - the **path** records *every* transition, including returns to
//!   existing topics.
//!
//! Edges are added only in [`TopicGraph::add_node`]. Reuse touches the
//! current pointer and the path only, so edge targets always have a larger
//! id than their source and the graph stays acyclic by construction.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ColloquyError, Result};

/// One topic the conversation has been on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicNode {
    pub id: u64,
    pub topic_text: String,
    pub keywords: Vec<String>,
    pub timestamp: DateTime<Utc>,
    /// How many topic triggers landed on this node (creation counts as 1).
    pub sentence_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Creation-order edge: `to` was first created while `from` was current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicEdge {
    pub from: u64,
    pub to: u64,
}

/// One image-resolution attempt for a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicImage {
    pub topic_id: u64,
    pub topic_text: String,
    pub image_url: Option<String>,
}

/// The mutable topic model. Owned by the state core; never shared directly.
#[derive(Debug, Default)]
pub(crate) struct TopicGraph {
    nodes: BTreeMap<u64, TopicNode>,
    edges: Vec<TopicEdge>,
    path: Vec<u64>,
    images: Vec<TopicImage>,
    current: Option<u64>,
    next_id: u64,
}

impl TopicGraph {
    /// Create a new topic node, link it from the current topic (if any),
    /// make it current and append it to the path. Returns the fresh id.
    pub(crate) fn add_node(
        &mut self,
        topic_text: String,
        keywords: Vec<String>,
        timestamp: DateTime<Utc>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        if let Some(current) = self.current {
            self.edges.push(TopicEdge { from: current, to: id });
        }

        self.nodes.insert(
            id,
            TopicNode {
                id,
                topic_text,
                keywords,
                timestamp,
                sentence_count: 1,
                image_url: None,
            },
        );
        self.current = Some(id);
        self.path.push(id);
        id
    }

    /// Return to an existing topic: bump its count, make it current, append
    /// to the path. Never creates an edge.
    pub(crate) fn switch_to(&mut self, id: u64) -> Result<()> {
        let node = self.nodes.get_mut(&id).ok_or_else(|| {
            ColloquyError::Invariant(format!("switch_to_topic: node {id} does not exist"))
        })?;
        node.sentence_count += 1;
        self.current = Some(id);
        self.path.push(id);
        Ok(())
    }

    /// Record the outcome of one image-resolution attempt. Repeated calls
    /// with the same `(topic_id, url)` are no-ops.
    pub(crate) fn record_image(&mut self, topic_id: u64, url: Option<String>) -> Result<()> {
        let node = self.nodes.get_mut(&topic_id).ok_or_else(|| {
            ColloquyError::Invariant(format!(
                "record_topic_image: node {topic_id} does not exist"
            ))
        })?;

        let entry = TopicImage {
            topic_id,
            topic_text: node.topic_text.clone(),
            image_url: url.clone(),
        };
        if self.images.contains(&entry) {
            return Ok(());
        }

        if node.image_url.is_none() && url.is_some() {
            node.image_url = url;
        }
        self.images.push(entry);
        Ok(())
    }

    pub(crate) fn node(&self, id: u64) -> Option<&TopicNode> {
        self.nodes.get(&id)
    }

    /// All nodes in id (creation) order.
    pub(crate) fn nodes(&self) -> impl Iterator<Item = &TopicNode> {
        self.nodes.values()
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn transition_count(&self) -> usize {
        self.path.len()
    }

    pub(crate) fn current(&self) -> Option<u64> {
        self.current
    }

    pub(crate) fn export(&self) -> TopicGraphExport {
        TopicGraphExport {
            nodes: self.nodes.values().cloned().collect(),
            edges: self.edges.clone(),
            topic_path: self.path.clone(),
            topic_images: self.images.clone(),
        }
    }
}

/// Immutable snapshot of the topic model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicGraphExport {
    pub nodes: Vec<TopicNode>,
    pub edges: Vec<TopicEdge>,
    pub topic_path: Vec<u64>,
    pub topic_images: Vec<TopicImage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn first_node_creates_no_edge() {
        let mut graph = TopicGraph::default();
        let id = graph.add_node("Solar Energy".into(), vec!["solar".into()], ts());
        assert_eq!(id, 0);
        assert_eq!(graph.current(), Some(0));
        let export = graph.export();
        assert!(export.edges.is_empty());
        assert_eq!(export.topic_path, vec![0]);
    }

    #[test]
    fn creation_links_from_current_and_reuse_never_adds_edges() {
        let mut graph = TopicGraph::default();
        let solar = graph.add_node("Solar Energy".into(), vec![], ts());
        let ai = graph.add_node("AI Future".into(), vec![], ts());
        graph.switch_to(solar).unwrap();
        graph.switch_to(ai).unwrap();
        graph.switch_to(solar).unwrap();

        let export = graph.export();
        assert_eq!(export.edges, vec![TopicEdge { from: solar, to: ai }]);
        assert_eq!(export.topic_path, vec![solar, ai, solar, ai, solar]);
        assert_eq!(graph.current(), Some(solar));
        assert_eq!(graph.node(solar).unwrap().sentence_count, 3);
        assert_eq!(graph.node(ai).unwrap().sentence_count, 2);
    }

    #[test]
    fn edges_always_point_from_older_to_newer_nodes() {
        let mut graph = TopicGraph::default();
        let a = graph.add_node("A".into(), vec![], ts());
        let _b = graph.add_node("B".into(), vec![], ts());
        graph.switch_to(a).unwrap();
        let _c = graph.add_node("C".into(), vec![], ts());

        // Creation order matches id order, so from < to implies acyclicity.
        for edge in &graph.export().edges {
            assert!(edge.from < edge.to);
        }
    }

    #[test]
    fn switch_to_unknown_id_is_an_invariant_error() {
        let mut graph = TopicGraph::default();
        let err = graph.switch_to(7).unwrap_err();
        assert_eq!(err.kind(), "invariant");
        assert_eq!(graph.transition_count(), 0);
        assert_eq!(graph.current(), None);
    }

    #[test]
    fn record_image_is_idempotent_and_fills_the_node() {
        let mut graph = TopicGraph::default();
        let id = graph.add_node("Solar Energy".into(), vec![], ts());

        graph
            .record_image(id, Some("https://img.example/solar.png".into()))
            .unwrap();
        graph
            .record_image(id, Some("https://img.example/solar.png".into()))
            .unwrap();

        let export = graph.export();
        assert_eq!(export.topic_images.len(), 1);
        assert_eq!(
            graph.node(id).unwrap().image_url.as_deref(),
            Some("https://img.example/solar.png")
        );
    }

    #[test]
    fn record_image_none_marks_the_attempt_without_touching_the_node() {
        let mut graph = TopicGraph::default();
        let id = graph.add_node("Tides".into(), vec![], ts());
        graph.record_image(id, None).unwrap();

        let export = graph.export();
        assert_eq!(export.topic_images.len(), 1);
        assert_eq!(export.topic_images[0].image_url, None);
        assert!(graph.node(id).unwrap().image_url.is_none());
    }

    #[test]
    fn replaying_the_exported_path_reconstructs_the_graph() {
        let mut graph = TopicGraph::default();
        let a = graph.add_node("A".into(), vec![], ts());
        let b = graph.add_node("B".into(), vec![], ts());
        graph.switch_to(a).unwrap();
        let c = graph.add_node("C".into(), vec![], ts());
        graph.switch_to(b).unwrap();
        let export = graph.export();

        // First occurrence in the path is a creation, the rest are reuses.
        let mut replayed = TopicGraph::default();
        for &id in &export.topic_path {
            if replayed.node(id).is_none() {
                let original = graph.node(id).unwrap();
                let new_id = replayed.add_node(
                    original.topic_text.clone(),
                    original.keywords.clone(),
                    original.timestamp,
                );
                assert_eq!(new_id, id);
            } else {
                replayed.switch_to(id).unwrap();
            }
        }

        let replayed_export = replayed.export();
        assert_eq!(replayed_export.topic_path, export.topic_path);
        assert_eq!(replayed_export.edges, export.edges);
        assert_eq!(replayed.current(), graph.current());
        for id in [a, b, c] {
            assert_eq!(
                replayed.node(id).unwrap().sentence_count,
                graph.node(id).unwrap().sentence_count
            );
        }
    }
}

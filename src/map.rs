//! Authored map records and their conversion to and from a [`SectorGraph`].

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::DEFAULT_EDGE_WEIGHT;
use crate::graph::SectorGraph;
use crate::layout::GridLayout;
use crate::types::{Cell, EnemyKind, KeyType, SectorId, WorldPos};

#[derive(Debug, Error)]
pub enum MapError {
    #[error("failed to read map file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse map description: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("map has no sectors")]
    Empty,
    #[error("duplicate sector id {0}")]
    DuplicateSectorId(SectorId),
    #[error("sector ids must be dense from 0: expected {expected}, found {found}")]
    NonDenseSectorId { expected: SectorId, found: SectorId },
    #[error("edge {from} -> {to} targets an unknown sector")]
    UnknownEdgeTarget { from: SectorId, to: SectorId },
    #[error("edge {from} -> {to} has invalid weight {weight}")]
    InvalidEdgeWeight {
        from: SectorId,
        to: SectorId,
        weight: f32,
    },
    #[error("{what} placed in unknown sector {sector_id}")]
    UnknownPlacementSector {
        what: &'static str,
        sector_id: SectorId,
    },
}

fn default_weight() -> f32 {
    DEFAULT_EDGE_WEIGHT
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub to: SectorId,
    #[serde(default = "default_weight")]
    pub weight: f32,
    #[serde(default)]
    pub locked: bool,
    #[serde(default, rename = "requiredKey")]
    pub required_key: Option<KeyType>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectorRecord {
    pub id: SectorId,
    #[serde(default)]
    pub cells: Vec<Cell>,
    /// Centroid of the cells under the map layout when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<WorldPos>,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyPlacement {
    #[serde(rename = "sectorId")]
    pub sector_id: SectorId,
    pub key: KeyType,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnemyPlacement {
    #[serde(rename = "sectorId")]
    pub sector_id: SectorId,
    pub kind: EnemyKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapDescription {
    #[serde(default)]
    pub layout: GridLayout,
    #[serde(default, rename = "heroStart")]
    pub hero_start: SectorId,
    pub sectors: Vec<SectorRecord>,
    #[serde(default)]
    pub keys: Vec<KeyPlacement>,
    #[serde(default)]
    pub enemies: Vec<EnemyPlacement>,
}

impl MapDescription {
    pub fn from_json_str(text: &str) -> Result<Self, MapError> {
        let map: MapDescription = serde_json::from_str(text)?;
        map.validate()?;
        Ok(map)
    }

    pub fn load(path: &Path) -> Result<Self, MapError> {
        let text = fs::read_to_string(path).map_err(|source| MapError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String, MapError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks ids are exactly `0..n`, edges target known sectors with positive
    /// finite weights, and placements name known sectors.
    pub fn validate(&self) -> Result<(), MapError> {
        if self.sectors.is_empty() {
            return Err(MapError::Empty);
        }
        let mut ids: Vec<SectorId> = self.sectors.iter().map(|s| s.id).collect();
        ids.sort_unstable();
        let mut seen = HashSet::new();
        for (expected, id) in ids.iter().copied().enumerate() {
            if !seen.insert(id) {
                return Err(MapError::DuplicateSectorId(id));
            }
            if id != expected {
                return Err(MapError::NonDenseSectorId {
                    expected,
                    found: id,
                });
            }
        }

        let count = self.sectors.len();
        for sector in &self.sectors {
            for edge in &sector.edges {
                if edge.to >= count {
                    return Err(MapError::UnknownEdgeTarget {
                        from: sector.id,
                        to: edge.to,
                    });
                }
                if !edge.weight.is_finite() || edge.weight <= 0.0 {
                    return Err(MapError::InvalidEdgeWeight {
                        from: sector.id,
                        to: edge.to,
                        weight: edge.weight,
                    });
                }
            }
        }

        let placements = std::iter::once(("hero start", self.hero_start))
            .chain(self.keys.iter().map(|k| ("key", k.sector_id)))
            .chain(self.enemies.iter().map(|e| ("enemy", e.sector_id)));
        for (what, sector_id) in placements {
            if sector_id >= count {
                return Err(MapError::UnknownPlacementSector { what, sector_id });
            }
        }
        Ok(())
    }

    pub fn build_graph(&self) -> Result<SectorGraph, MapError> {
        self.validate()?;
        let mut records: Vec<&SectorRecord> = self.sectors.iter().collect();
        records.sort_by_key(|record| record.id);

        let mut graph = SectorGraph::new();
        for record in &records {
            let center = record
                .center
                .unwrap_or_else(|| self.layout.centroid(&record.cells));
            let id = graph.add_sector(record.cells.clone(), center);
            graph.set_blocked(id, record.blocked);
        }
        for record in &records {
            for edge in &record.edges {
                graph.add_or_update_edge(
                    record.id,
                    edge.to,
                    edge.weight,
                    edge.locked,
                    edge.required_key,
                );
            }
        }
        Ok(graph)
    }

    /// Snapshot of a runtime graph as records; edges are listed by target id.
    pub fn from_graph(
        graph: &SectorGraph,
        layout: GridLayout,
        hero_start: SectorId,
        keys: Vec<KeyPlacement>,
        enemies: Vec<EnemyPlacement>,
    ) -> Self {
        let sectors = graph
            .sectors()
            .iter()
            .map(|sector| {
                let mut edges: Vec<EdgeRecord> = sector
                    .edges()
                    .map(|edge| EdgeRecord {
                        to: edge.to,
                        weight: edge.weight,
                        locked: edge.locked,
                        required_key: edge.required_key,
                    })
                    .collect();
                edges.sort_by_key(|edge| edge.to);
                SectorRecord {
                    id: sector.id(),
                    cells: sector.cells().to_vec(),
                    center: Some(sector.center()),
                    blocked: sector.blocked(),
                    edges,
                }
            })
            .collect();
        Self {
            layout,
            hero_start,
            sectors,
            keys,
            enemies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAIN: &str = r#"{
        "sectors": [
            {"id": 0, "cells": [{"x": 0, "y": 0}], "edges": [{"to": 1}]},
            {"id": 1, "cells": [{"x": 1, "y": 0}], "edges": [{"to": 0}, {"to": 2, "locked": true, "requiredKey": "red"}]},
            {"id": 2, "cells": [{"x": 2, "y": 0}, {"x": 2, "y": 1}], "center": {"x": 9.0, "y": 9.0}, "edges": [{"to": 1, "weight": 2.5}]}
        ],
        "keys": [{"sectorId": 0, "key": "red"}],
        "enemies": [{"sectorId": 2, "kind": "strong"}]
    }"#;

    #[test]
    fn parses_defaults_and_builds_graph() {
        let map = MapDescription::from_json_str(CHAIN).unwrap();
        assert_eq!(map.hero_start, 0);
        assert_eq!(map.layout, GridLayout::default());

        let graph = map.build_graph().unwrap();
        assert_eq!(graph.len(), 3);
        let edge = graph.try_get_edge(1, 2).unwrap();
        assert!(edge.locked);
        assert_eq!(edge.required_key, Some(KeyType::Red));
        assert_eq!(graph.try_get_edge(0, 1).unwrap().weight, DEFAULT_EDGE_WEIGHT);
        assert_eq!(graph.try_get_edge(2, 1).unwrap().weight, 2.5);
        assert_eq!(graph.sector(0).unwrap().center(), WorldPos::new(0.5, 0.5));
        assert_eq!(graph.sector(2).unwrap().center(), WorldPos::new(9.0, 9.0));
    }

    #[test]
    fn sector_order_in_file_does_not_matter() {
        let text = r#"{"sectors": [
            {"id": 1, "cells": [{"x": 5, "y": 5}]},
            {"id": 0, "cells": [{"x": 0, "y": 0}], "edges": [{"to": 1}]}
        ]}"#;
        let graph = MapDescription::from_json_str(text)
            .unwrap()
            .build_graph()
            .unwrap();
        assert_eq!(graph.sector_by_cell(Cell::new(5, 5)), Some(1));
        assert!(graph.are_neighbors(0, 1));
    }

    #[test]
    fn rejects_gaps_and_duplicates() {
        let gap = r#"{"sectors": [{"id": 0}, {"id": 2}]}"#;
        assert!(matches!(
            MapDescription::from_json_str(gap),
            Err(MapError::NonDenseSectorId {
                expected: 1,
                found: 2
            })
        ));

        let duplicate = r#"{"sectors": [{"id": 0}, {"id": 0}]}"#;
        assert!(matches!(
            MapDescription::from_json_str(duplicate),
            Err(MapError::DuplicateSectorId(0))
        ));

        let empty = r#"{"sectors": []}"#;
        assert!(matches!(
            MapDescription::from_json_str(empty),
            Err(MapError::Empty)
        ));
    }

    #[test]
    fn rejects_bad_edges_and_placements() {
        let unknown = r#"{"sectors": [{"id": 0, "edges": [{"to": 3}]}]}"#;
        assert!(matches!(
            MapDescription::from_json_str(unknown),
            Err(MapError::UnknownEdgeTarget { from: 0, to: 3 })
        ));

        let weight = r#"{"sectors": [{"id": 0}, {"id": 1, "edges": [{"to": 0, "weight": 0.0}]}]}"#;
        assert!(matches!(
            MapDescription::from_json_str(weight),
            Err(MapError::InvalidEdgeWeight { from: 1, to: 0, .. })
        ));

        let key = r#"{"sectors": [{"id": 0}], "keys": [{"sectorId": 4, "key": "blue"}]}"#;
        assert!(matches!(
            MapDescription::from_json_str(key),
            Err(MapError::UnknownPlacementSector {
                what: "key",
                sector_id: 4
            })
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let result = MapDescription::from_json_str("{\"sectors\": [");
        assert!(matches!(result, Err(MapError::Parse(_))));
        let unknown_key = r#"{"sectors": [{"id": 0, "edges": []}], "keys": [{"sectorId": 0, "key": "purple"}]}"#;
        assert!(matches!(
            MapDescription::from_json_str(unknown_key),
            Err(MapError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let path = std::env::temp_dir()
            .join("sector-quest-missing-dir-for-test")
            .join("map.json");
        let error = MapDescription::load(&path).unwrap_err();
        assert!(matches!(error, MapError::Io { .. }));
        assert!(error.to_string().contains("map.json"));
    }

    #[test]
    fn exported_runtime_graph_reflects_mutations() {
        let map = MapDescription::from_json_str(CHAIN).unwrap();
        let mut graph = map.build_graph().unwrap();
        graph.unlock_edges_with_key(KeyType::Red);
        graph.remove_edge(2, 1);

        let exported = MapDescription::from_graph(
            &graph,
            map.layout,
            map.hero_start,
            map.keys.clone(),
            map.enemies.clone(),
        );
        assert_eq!(exported.sectors[1].edges.len(), 2);
        assert_eq!(exported.sectors[1].edges[0].to, 0);
        assert!(!exported.sectors[1].edges[1].locked);
        assert!(exported.sectors[2].edges.is_empty());

        let reloaded = MapDescription::from_json_str(&exported.to_json_pretty().unwrap()).unwrap();
        assert_eq!(reloaded, exported);
    }
}

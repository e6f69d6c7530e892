use serde::{Deserialize, Serialize};

pub type SectorId = usize;
pub type UnitId = u32;

/// Grid cell coordinate inside the painted map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldPos {
    pub x: f32,
    pub y: f32,
}

impl WorldPos {
    pub const ORIGIN: WorldPos = WorldPos { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: WorldPos) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    Red,
    Blue,
    Yellow,
    Green,
}

impl KeyType {
    pub const ALL: [KeyType; 4] = [KeyType::Red, KeyType::Blue, KeyType::Yellow, KeyType::Green];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "red" => Some(Self::Red),
            "blue" => Some(Self::Blue),
            "yellow" => Some(Self::Yellow),
            "green" => Some(Self::Green),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Blue => "blue",
            Self::Yellow => "yellow",
            Self::Green => "green",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnemyKind {
    Basic,
    Strong,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum UnitRole {
    Hero,
    Enemy { kind: EnemyKind },
}

#[derive(Clone, Debug, Serialize)]
pub struct UnitView {
    pub id: UnitId,
    pub name: String,
    #[serde(flatten)]
    pub role: UnitRole,
    #[serde(rename = "sectorId")]
    pub sector_id: SectorId,
    pub position: WorldPos,
    #[serde(rename = "visionRange")]
    pub vision_range: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    UnitSpawned {
        #[serde(rename = "unitId")]
        unit_id: UnitId,
        #[serde(rename = "sectorId")]
        sector_id: SectorId,
    },
    UnitArrived {
        #[serde(rename = "unitId")]
        unit_id: UnitId,
        #[serde(rename = "sectorId")]
        sector_id: SectorId,
        position: WorldPos,
    },
    KeyPickedUp {
        #[serde(rename = "unitId")]
        unit_id: UnitId,
        #[serde(rename = "sectorId")]
        sector_id: SectorId,
        key: KeyType,
    },
    EdgesRebuilt {
        changed: Vec<(SectorId, SectorId)>,
    },
    EnemySpotted {
        #[serde(rename = "enemyId")]
        enemy_id: UnitId,
        distance: usize,
    },
    RouteBlocked {
        #[serde(rename = "unitId")]
        unit_id: UnitId,
        goal: SectorId,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct KeyOnMap {
    #[serde(rename = "sectorId")]
    pub sector_id: SectorId,
    pub key: KeyType,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub turn: u64,
    pub units: Vec<UnitView>,
    pub keys: Vec<KeyOnMap>,
    pub inventory: Vec<KeyType>,
    #[serde(rename = "lockedEdges")]
    pub locked_edges: usize,
    pub events: Vec<SessionEvent>,
}

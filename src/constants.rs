pub const DEFAULT_EDGE_WEIGHT: f32 = 1.0;

pub const SLOTS_PER_SECTOR: usize = 5;
pub const SLOT_CORE_PERCENT: f32 = 0.7;
pub const SLOT_CORE_PERCENT_MIN: f32 = 0.3;
pub const SLOT_CORE_PERCENT_MAX: f32 = 1.0;
pub const SLOT_PICK_STEP: usize = 2;
pub const MIN_SLOT_DISTANCE: f32 = 1.0;

pub const CELL_SIZE: f32 = 1.0;

pub const HERO_ID: u32 = 1;
pub const FIRST_ENEMY_ID: u32 = 2;
pub const DEFAULT_VISION_RANGE: u32 = 4;

pub const DEMO_SECTOR_SIZE: i32 = 5;
pub const DEFAULT_TURN_LIMIT: u64 = 200;

pub fn get_demo_side_by_enemy_count(enemy_count: usize) -> usize {
    if enemy_count <= 2 {
        return 4;
    }
    if enemy_count <= 6 {
        return 5;
    }
    if enemy_count <= 12 {
        return 6;
    }
    8
}

pub fn get_gate_chance(side: usize) -> f32 {
    ((side as f32) / 40.0).clamp(0.08, 0.25)
}

use clap::Parser;
use log::{Level, LevelFilter};
use sector_quest_core::constants::CELL_SIZE;
use sector_quest_core::demo_map::{generate_demo_map, DemoMapOptions};
use sector_quest_core::layout::GridLayout;
use sector_quest_core::map::MapDescription;
use sector_quest_core::structured_log::{self, emit_event, LogContext};
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about = "Print a seeded demo sector map as JSON")]
struct Cli {
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    side: Option<usize>,
    #[arg(long)]
    enemies: Option<usize>,
    /// Lay cells out as flat-top hexes instead of squares.
    #[arg(long)]
    hex: bool,
    /// Write to this file instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();
    let level = structured_log::parse_level(&cli.log_level).unwrap_or(LevelFilter::Warn);
    if let Err(error) = structured_log::init(level) {
        eprintln!("failed to install logger: {error}");
    }

    let seed = cli.seed.unwrap_or_else(|| rand::random::<u32>() as u64) as u32;
    let context = LogContext {
        seed: Some(seed),
        ..LogContext::default()
    };
    let map = generate_demo_map(&options_from_cli(&cli), seed);
    let text = match map.to_json_pretty() {
        Ok(text) => text,
        Err(error) => {
            emit_event(Level::Error, "map_serialize_failed", &context, json!({ "error": error.to_string() }));
            std::process::exit(2);
        }
    };

    match cli.out.as_deref() {
        Some(path) => {
            if let Err(error) = write_map(path, &text) {
                emit_event(
                    Level::Error,
                    "map_write_failed",
                    &context,
                    json!({ "path": path.to_string_lossy(), "error": error.to_string() }),
                );
                std::process::exit(2);
            }
        }
        None => println!("{text}"),
    }

    emit_event(Level::Info, "map_generated", &context, map_details(&map));
}

fn options_from_cli(cli: &Cli) -> DemoMapOptions {
    let defaults = DemoMapOptions::default();
    let layout = if cli.hex {
        GridLayout::FlatTopHex {
            cell_size: CELL_SIZE,
            even_offset: false,
        }
    } else {
        defaults.layout
    };
    DemoMapOptions {
        enemy_count: cli.enemies.unwrap_or(defaults.enemy_count),
        side: cli.side,
        layout,
        ..defaults
    }
}

fn map_details(map: &MapDescription) -> serde_json::Value {
    let locked_edges: usize = map
        .sectors
        .iter()
        .map(|sector| sector.edges.iter().filter(|edge| edge.locked).count())
        .sum();
    json!({
        "sectors": map.sectors.len(),
        "blocked": map.sectors.iter().filter(|sector| sector.blocked).count(),
        "lockedEdges": locked_edges,
        "keys": map.keys.len(),
        "enemies": map.enemies.len(),
    })
}

fn write_map(path: &Path, text: &str) -> std::io::Result<()> {
    std::fs::write(path, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_flag_switches_layout() {
        let cli = Cli::parse_from(["generate_map", "--hex", "--side", "3"]);
        let options = options_from_cli(&cli);
        assert_eq!(options.side, Some(3));
        assert!(matches!(options.layout, GridLayout::FlatTopHex { .. }));

        let map = generate_demo_map(&options, 5);
        assert_eq!(map.sectors.len(), 9);
        let reloaded = MapDescription::from_json_str(&map.to_json_pretty().unwrap()).unwrap();
        assert_eq!(reloaded, map);
    }

    #[test]
    fn details_count_both_directions_of_a_gate() {
        let text = r#"{"sectors": [
            {"id": 0, "edges": [{"to": 1, "locked": true, "requiredKey": "green"}]},
            {"id": 1, "blocked": true, "edges": [{"to": 0, "locked": true, "requiredKey": "green"}]}
        ]}"#;
        let map = MapDescription::from_json_str(text).unwrap();
        let details = map_details(&map);
        assert_eq!(details["lockedEdges"], 2);
        assert_eq!(details["blocked"], 1);
    }
}

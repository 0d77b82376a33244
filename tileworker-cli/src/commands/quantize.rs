//! `tileworker quantize`: parse tiles from a JSON file on the worker pool.
//!
//! The input is a JSON array of tiles:
//!
//! ```json
//! [{ "uid": "14/8190/5447", "features": [{ "id": 1, "extent": 4096, "rings": [[[0, 0]]] }] }]
//! ```

use serde_json::Value;
use std::path::{Path, PathBuf};
use tileworker::worker::{ChannelConfig, ChannelError, Operation, WorkerChannel, VECTOR_SOURCE_TYPE};
use tracing::{info, warn};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the quantize command.
pub fn run(input: &Path, config_path: Option<&Path>, pretty: bool) -> Result<(), CliError> {
    let runner = CliRunner::new(config_path)?;
    let tiles = read_tiles(input)?;
    let channel = WorkerChannel::new(ChannelConfig::from(runner.config()))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    let results = runtime.block_on(quantize_tiles(&channel, tiles))?;
    channel.terminate();

    let total = results.len();
    let mut failed = 0;
    let mut parsed = Vec::with_capacity(total);
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(tile) => parsed.push(tile),
            Err(e) => {
                failed += 1;
                warn!(tile = index, error = %e, "Tile failed to parse");
                eprintln!("Tile {}: {}", index, e);
            }
        }
    }

    let output = Value::Array(parsed);
    let rendered = if pretty {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string(&output)
    };
    // Serializing a Value cannot fail.
    println!("{}", rendered.unwrap_or_default());

    if channel.diagnostics().has_warned() {
        eprintln!("Warning: some geometry exceeded the allowed extent and was clamped");
    }

    info!(total, failed, "Quantize finished");
    if failed > 0 {
        return Err(CliError::TilesFailed { failed, total });
    }
    Ok(())
}

/// Reads the tile array from `input`.
pub fn read_tiles(input: &Path) -> Result<Vec<Value>, CliError> {
    let content = std::fs::read_to_string(input).map_err(|error| CliError::FileRead {
        path: input.to_path_buf(),
        error,
    })?;
    let invalid = |reason: String| CliError::InvalidInput {
        path: PathBuf::from(input),
        reason,
    };
    match serde_json::from_str::<Value>(&content).map_err(|e| invalid(e.to_string()))? {
        Value::Array(tiles) => Ok(tiles),
        _ => Err(invalid("expected a JSON array of tiles".to_string())),
    }
}

/// Sends every tile before awaiting any, so the pool works on them together.
///
/// Results are returned in input order.
pub async fn quantize_tiles(
    channel: &WorkerChannel,
    tiles: Vec<Value>,
) -> Result<Vec<Result<Value, ChannelError>>, CliError> {
    let mut pending = Vec::with_capacity(tiles.len());
    for tile in tiles {
        pending.push(channel.send(VECTOR_SOURCE_TYPE, Operation::LoadTile, tile)?);
    }

    let mut results = Vec::with_capacity(pending.len());
    for request in pending {
        results.push(request.wait().await);
    }
    Ok(results)
}

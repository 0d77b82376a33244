//! Built-in `vector` worker source.
//!
//! Decodes a tile through a [`TileDecoder`], quantizes every feature and
//! answers with a [`ParsedTile`]. Loaded tiles are remembered per uid so that
//! `reloadTile` can re-serve them and `removeTile` can forget them.
//!
//! # Parameters
//!
//! ```json
//! { "uid": "14/8190/5447", "features": [ { "id": 1, "extent": 4096, "rings": [[[0, 0], [10, 10]]] } ] }
//! ```
//!
//! `abortTile` and `removeTile` only need `uid`. `reloadTile` without
//! `features` re-serves the previously loaded tile and otherwise parses again.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::DispatchError;
use super::protocol::{CorrelationId, Operation};
use super::source::{BoxFuture, RequestContext, WorkerSource};
use crate::geometry::{FeatureIndex, GeometryQuantizer, RawFeature};

/// Registry name of the built-in source.
pub const VECTOR_SOURCE_TYPE: &str = "vector";

/// Features processed between cooperative yields to the worker runtime.
const YIELD_EVERY: usize = 64;

/// Errors from a [`TileDecoder`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The parameters carry no feature list.
    #[error("Tile parameters contain no features")]
    MissingFeatures,

    /// The feature list is malformed.
    #[error("Malformed features: {0}")]
    Malformed(String),

    /// A feature declares an unusable native extent.
    #[error("Feature {feature} has invalid extent {extent}")]
    InvalidExtent { feature: usize, extent: u32 },
}

/// Turns request parameters into raw features.
///
/// The binary tile format parser lives outside this crate; implement this
/// trait to plug one in.
pub trait TileDecoder: Send + Sync {
    /// Decodes every feature of a tile.
    fn decode(&self, params: &Value) -> Result<Vec<RawFeature>, DecodeError>;
}

/// Reads features embedded as JSON in the request parameters.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonTileDecoder;

impl TileDecoder for JsonTileDecoder {
    fn decode(&self, params: &Value) -> Result<Vec<RawFeature>, DecodeError> {
        let features = params.get("features").ok_or(DecodeError::MissingFeatures)?;
        let features: Vec<RawFeature> = serde_json::from_value(features.clone())
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;

        if let Some((index, feature)) = features.iter().enumerate().find(|(_, f)| f.extent == 0) {
            return Err(DecodeError::InvalidExtent {
                feature: index,
                extent: feature.extent,
            });
        }
        Ok(features)
    }
}

/// Result of parsing one tile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParsedTile {
    pub uid: String,
    pub features: FeatureIndex,
}

/// The built-in vector tile source.
pub struct VectorTileSource {
    quantizer: GeometryQuantizer,
    decoder: Arc<dyn TileDecoder>,
    loading: LoadingMap,
    /// Completed parses by tile uid.
    loaded: Mutex<HashMap<String, Arc<ParsedTile>>>,
}

impl VectorTileSource {
    /// Creates a source that decodes JSON-embedded features.
    pub fn new(quantizer: GeometryQuantizer) -> Self {
        Self::with_decoder(quantizer, Arc::new(JsonTileDecoder))
    }

    /// Creates a source with a custom decoder.
    pub fn with_decoder(quantizer: GeometryQuantizer, decoder: Arc<dyn TileDecoder>) -> Self {
        Self {
            quantizer,
            decoder,
            loading: Mutex::new(HashMap::new()),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true if a parse for `uid` is cached.
    pub fn is_loaded(&self, uid: &str) -> bool {
        self.loaded.lock().contains_key(uid)
    }

    async fn load(
        &self,
        uid: String,
        params: &Value,
        ctx: &RequestContext,
    ) -> Result<Value, DispatchError> {
        let _loading = LoadingGuard::register(&self.loading, &uid, ctx);
        let features = self.decoder.decode(params)?;

        let mut ids = Vec::with_capacity(features.len());
        let mut geometries = Vec::with_capacity(features.len());
        for (index, feature) in features.iter().enumerate() {
            if ctx.is_cancelled() {
                debug!(uid = %uid, parsed = index, "Tile load cancelled mid-parse");
                return Err(DispatchError::Cancelled);
            }
            ids.push(feature.id.unwrap_or(index as u64));
            geometries.push(self.quantizer.quantize_feature(feature));

            if (index + 1) % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
        }

        let tile = ParsedTile {
            features: FeatureIndex::from_parts(ids, geometries)?,
            uid,
        };
        let data = serde_json::to_value(&tile)?;
        debug!(uid = %tile.uid, features = tile.features.len(), "Tile parsed");
        self.loaded.lock().insert(tile.uid.clone(), Arc::new(tile));
        Ok(data)
    }

    async fn reload(
        &self,
        uid: String,
        params: &Value,
        ctx: &RequestContext,
    ) -> Result<Value, DispatchError> {
        if params.get("features").is_none() {
            let cached = self.loaded.lock().get(&uid).cloned();
            if let Some(tile) = cached {
                return Ok(serde_json::to_value(tile.as_ref())?);
            }
        }
        self.load(uid, params, ctx).await
    }

    fn abort(&self, uid: &str) -> Value {
        if let Some((owner, token)) = self.loading.lock().remove(uid) {
            debug!(uid = %uid, request = %owner, "Aborting in-flight tile load");
            token.cancel();
        }
        Value::Null
    }

    fn remove(&self, uid: &str) -> Value {
        self.loaded.lock().remove(uid);
        Value::Null
    }
}

impl WorkerSource for VectorTileSource {
    fn name(&self) -> &str {
        VECTOR_SOURCE_TYPE
    }

    fn handle<'a>(
        &'a self,
        op: &'a Operation,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Value, DispatchError>> {
        Box::pin(async move {
            let uid = tile_uid(&params)?;
            match op {
                Operation::LoadTile => self.load(uid, &params, ctx).await,
                Operation::ReloadTile => self.reload(uid, &params, ctx).await,
                Operation::AbortTile => Ok(self.abort(&uid)),
                Operation::RemoveTile => Ok(self.remove(&uid)),
                Operation::Other(name) => Err(DispatchError::UnsupportedOperation {
                    source_type: VECTOR_SOURCE_TYPE.to_string(),
                    op: name.clone(),
                }),
            }
        })
    }
}

/// Extracts the tile uid, accepting a string or a number.
fn tile_uid(params: &Value) -> Result<String, DispatchError> {
    match params.get("uid") {
        Some(Value::String(uid)) => Ok(uid.clone()),
        Some(Value::Number(uid)) => Ok(uid.to_string()),
        _ => Err(DispatchError::InvalidParams(
            "missing tile uid".to_string(),
        )),
    }
}

/// In-flight loads keyed by tile uid, tagged with the owning request.
type LoadingMap = Mutex<HashMap<String, (CorrelationId, CancellationToken)>>;

/// Tracks an in-flight load so `abortTile` can reach it.
struct LoadingGuard<'a> {
    loading: &'a LoadingMap,
    uid: String,
    owner: CorrelationId,
}

impl<'a> LoadingGuard<'a> {
    fn register(loading: &'a LoadingMap, uid: &str, ctx: &RequestContext) -> Self {
        loading
            .lock()
            .insert(uid.to_string(), (ctx.id.clone(), ctx.cancellation.clone()));
        Self {
            loading,
            uid: uid.to_string(),
            owner: ctx.id.clone(),
        }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut loading = self.loading.lock();
        // A newer load of the same uid may have replaced this entry.
        if loading.get(&self.uid).is_some_and(|(owner, _)| *owner == self.owner) {
            loading.remove(&self.uid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ExtentDiagnostics;
    use crate::point::Point2D;
    use serde_json::json;

    fn source() -> VectorTileSource {
        VectorTileSource::new(GeometryQuantizer::new(Arc::new(ExtentDiagnostics::new())))
    }

    fn ctx(id: &str) -> RequestContext {
        RequestContext {
            id: CorrelationId::new(id),
            cancellation: CancellationToken::new(),
        }
    }

    fn tile_params() -> Value {
        json!({
            "uid": "0/0/0",
            "features": [
                { "id": 10, "extent": 4096, "rings": [[[0, 0], [4096, 4096]]] },
                { "extent": 4096, "rings": [[[1, 2]]] }
            ]
        })
    }

    #[tokio::test]
    async fn test_load_quantizes_features() {
        let source = source();
        let data = source
            .handle(&Operation::LoadTile, tile_params(), &ctx("a"))
            .await
            .unwrap();
        let tile: ParsedTile = serde_json::from_value(data).unwrap();

        assert_eq!(tile.uid, "0/0/0");
        assert_eq!(tile.features.len(), 2);
        assert_eq!(
            tile.features.get(10).unwrap().rings()[0],
            vec![Point2D::new(0.0, 0.0), Point2D::new(8192.0, 8192.0)]
        );
        // Features without an id are indexed by position.
        assert_eq!(tile.features.get(1).unwrap().rings()[0], vec![Point2D::new(2.0, 4.0)]);
        assert!(source.is_loaded("0/0/0"));
    }

    #[tokio::test]
    async fn test_reload_without_features_serves_cached_tile() {
        let source = source();
        let loaded = source
            .handle(&Operation::LoadTile, tile_params(), &ctx("a"))
            .await
            .unwrap();
        let reloaded = source
            .handle(&Operation::ReloadTile, json!({ "uid": "0/0/0" }), &ctx("b"))
            .await
            .unwrap();
        assert_eq!(loaded, reloaded);
    }

    #[tokio::test]
    async fn test_reload_of_unknown_tile_without_features_fails() {
        let err = source()
            .handle(&Operation::ReloadTile, json!({ "uid": 7 }), &ctx("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Decode(DecodeError::MissingFeatures)));
    }

    #[tokio::test]
    async fn test_remove_forgets_tile() {
        let source = source();
        source
            .handle(&Operation::LoadTile, tile_params(), &ctx("a"))
            .await
            .unwrap();
        let data = source
            .handle(&Operation::RemoveTile, json!({ "uid": "0/0/0" }), &ctx("b"))
            .await
            .unwrap();
        assert_eq!(data, Value::Null);
        assert!(!source.is_loaded("0/0/0"));
    }

    #[tokio::test]
    async fn test_abort_cancels_registered_load() {
        let source = source();
        let load_ctx = ctx("a");
        let guard = LoadingGuard::register(&source.loading, "5", &load_ctx);

        source
            .handle(&Operation::AbortTile, json!({ "uid": "5" }), &ctx("b"))
            .await
            .unwrap();
        assert!(load_ctx.is_cancelled());
        drop(guard);
        assert!(source.loading.lock().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_load_stops() {
        let source = source();
        let load_ctx = ctx("a");
        load_ctx.cancellation.cancel();
        let err = source
            .handle(&Operation::LoadTile, tile_params(), &load_ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Cancelled));
        assert!(!source.is_loaded("0/0/0"));
        assert!(source.loading.lock().is_empty());
    }

    #[tokio::test]
    async fn test_abort_during_yield_stops_large_load() {
        let source = source();
        let features: Vec<Value> = (0..1000)
            .map(|i| json!({ "id": i, "extent": 4096, "rings": [[[i, i]]] }))
            .collect();
        let params = json!({ "uid": "big", "features": features });
        let load_ctx = ctx("load");
        let abort_ctx = ctx("abort");

        let load = source.handle(&Operation::LoadTile, params, &load_ctx);
        let abort = async {
            // Runs while the load is parked at a yield point.
            while !source.loading.lock().contains_key("big") {
                tokio::task::yield_now().await;
            }
            source
                .handle(&Operation::AbortTile, json!({ "uid": "big" }), &abort_ctx)
                .await
        };
        let (loaded, aborted) = tokio::join!(load, abort);

        assert_eq!(aborted.unwrap(), Value::Null);
        assert!(matches!(loaded, Err(DispatchError::Cancelled)));
        assert!(load_ctx.is_cancelled());
        assert!(!source.is_loaded("big"));
        assert!(source.loading.lock().is_empty());
    }

    #[tokio::test]
    async fn test_missing_uid_and_unknown_operation() {
        let source = source();
        let err = source
            .handle(&Operation::LoadTile, json!({ "features": [] }), &ctx("a"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_params");

        let err = source
            .handle(&Operation::from("getGlyphs"), json!({ "uid": "1" }), &ctx("b"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unsupported_operation");
    }

    #[test]
    fn test_json_decoder_errors() {
        let decoder = JsonTileDecoder;
        assert_eq!(
            decoder.decode(&json!({ "uid": "1" })),
            Err(DecodeError::MissingFeatures)
        );
        assert!(matches!(
            decoder.decode(&json!({ "features": [{ "extent": 4096 }] })),
            Err(DecodeError::Malformed(_))
        ));
        assert_eq!(
            decoder.decode(&json!({ "features": [{ "extent": 0, "rings": [] }] })),
            Err(DecodeError::InvalidExtent { feature: 0, extent: 0 })
        );
    }
}

//! The road-network gateway trait, its per-call memoizing cache, and the
//! bounded fan-out pool used to batch independent gateway calls.
//!
//! A concrete PostGIS-backed implementation is an external collaborator and
//! out of scope for this crate; what's in scope is the trait contract, the
//! per-call cache, and the `GatewayPool` fan-out primitive.

use std::collections::HashMap;

use mapmatch_common::{Error, LonLat, NodeId, WayId};
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::way::Way;

/// Read-only queries against the OSM-derived road network store.
pub trait RoadNetworkGateway: Send + Sync {
    /// All ways whose geometry has any point within `radius_m` of `(lon, lat)`.
    /// Ordering is not guaranteed.
    fn ways_near(&self, lon: f64, lat: f64, radius_m: f64) -> Result<Vec<WayId>, Error>;

    /// The full ordered node list and tags for a way.
    fn way_nodes(&self, way_id: WayId) -> Result<Way, Error>;

    /// A node's coordinates and tags.
    fn node(&self, node_id: NodeId) -> Result<(LonLat, HashMap<String, String>), Error>;

    /// Ways that include this node, used for routing adjacency.
    fn ways_at_node(&self, node_id: NodeId) -> Result<Vec<WayId>, Error>;
}

/// Per-call memoizing wrapper around a [`RoadNetworkGateway`]. Every cache is keyed by identifier and lives only as long as the
/// match call; nothing here is shared across concurrent match calls.
pub struct CachedGateway<'g> {
    inner: &'g dyn RoadNetworkGateway,
    way_cache: Mutex<HashMap<WayId, Way>>,
    node_cache: Mutex<HashMap<NodeId, (LonLat, HashMap<String, String>)>>,
    adjacency_cache: Mutex<HashMap<NodeId, Vec<WayId>>>,
}

impl<'g> CachedGateway<'g> {
    pub fn new(inner: &'g dyn RoadNetworkGateway) -> Self {
        CachedGateway {
            inner,
            way_cache: Mutex::new(HashMap::new()),
            node_cache: Mutex::new(HashMap::new()),
            adjacency_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn ways_near(&self, lon: f64, lat: f64, radius_m: f64) -> Result<Vec<WayId>, Error> {
        self.inner.ways_near(lon, lat, radius_m)
    }

    pub fn way_nodes(&self, way_id: WayId) -> Result<Way, Error> {
        if let Some(w) = self.way_cache.lock().get(&way_id) {
            return Ok(w.clone());
        }
        let way = self.inner.way_nodes(way_id)?;
        self.way_cache.lock().insert(way_id, way.clone());
        Ok(way)
    }

    pub fn node(&self, node_id: NodeId) -> Result<(LonLat, HashMap<String, String>), Error> {
        if let Some(n) = self.node_cache.lock().get(&node_id) {
            return Ok(n.clone());
        }
        let node = self.inner.node(node_id)?;
        self.node_cache.lock().insert(node_id, node.clone());
        Ok(node)
    }

    pub fn ways_at_node(&self, node_id: NodeId) -> Result<Vec<WayId>, Error> {
        if let Some(ways) = self.adjacency_cache.lock().get(&node_id) {
            return Ok(ways.clone());
        }
        let ways = self.inner.ways_at_node(node_id)?;
        self.adjacency_cache.lock().insert(node_id, ways.clone());
        Ok(ways)
    }

    /// Batches `node()` lookups across the bounded `GatewayPool`, reassembling
    /// results in submission order regardless of completion order.
    pub fn nodes_batch(&self, pool: &GatewayPool, ids: &[NodeId]) -> Vec<Result<(LonLat, HashMap<String, String>), Error>> {
        pool.fan_out(ids.iter().map(|&id| move || self.node(id)).collect())
    }
}

/// A bounded worker pool for fanning out independent gateway queries.
/// Sized by `Config::db_threads`.
pub struct GatewayPool {
    pool: rayon::ThreadPool,
}

impl GatewayPool {
    pub fn new(db_threads: usize) -> Result<Self, Error> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(db_threads.max(1))
            .build()
            .map_err(|e| Error::internal(format!("failed to build gateway pool: {e}")))?;
        Ok(GatewayPool { pool })
    }

    /// Runs each independent query and reassembles results in submission
    /// order, regardless of completion order.
    pub fn fan_out<T, F>(&self, jobs: Vec<F>) -> Vec<Result<T, Error>>
    where
        T: Send,
        F: FnOnce() -> Result<T, Error> + Send,
    {
        self.pool.install(|| jobs.into_par_iter().map(|job| job()).collect())
    }
}

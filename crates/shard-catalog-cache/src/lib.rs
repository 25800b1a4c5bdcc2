//! The mapping cache (§4.5): an in-process lookup cache keyed by
//! `(shard map id, encoded key)`, with a per-entry time-to-live that backs
//! off exponentially on connection failure and resets to zero ("this entry
//! is authoritative") on success. Guards one `dashmap::DashMap` shard per
//! entry so independent keys never contend, matching the concurrency model
//! in §5.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// The TTL a previously-authoritative entry is given the first time a
/// connection attempt against it fails transiently.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(50);
/// The TTL backoff never exceeds, however many consecutive failures occur.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Where a cached mapping currently points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardEndpoint {
    pub protocol: Option<String>,
    pub host: String,
    pub database: String,
    pub port: Option<i32>,
}

/// The cached projection of a mapping: just enough to open and validate a
/// connection without a GSM round-trip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedMapping {
    pub mapping_id: uuid::Uuid,
    pub version: i64,
    pub shard: ShardEndpoint,
}

#[derive(Clone, Hash, PartialEq, Eq)]
struct CacheKey {
    map_id: uuid::Uuid,
    key: Vec<u8>,
}

struct Entry {
    value: CachedMapping,
    /// Zero means "authoritative": no backoff is in effect and the entry
    /// does not expire on its own (it's still replaced by the next
    /// `publish`/`invalidate`).
    ttl: Duration,
    set_at: Instant,
}

/// A lookup outcome: whether the returned value came from an authoritative
/// cache entry, a degraded (backed-off) one, or required a fresh fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    Hit(CachedMapping),
    Miss,
}

pub struct MappingCache {
    entries: DashMap<CacheKey, Entry>,
}

impl Default for MappingCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingCache {
    pub fn new() -> Self {
        MappingCache {
            entries: DashMap::new(),
        }
    }

    /// Looks up `(map_id, key)`. An authoritative entry is always a hit. A
    /// backed-off entry is a hit only while its TTL, decremented by elapsed
    /// wall-clock time since it was last touched, remains positive;
    /// otherwise it's evicted and reported as a miss so the caller re-fetches
    /// from the GSM.
    pub fn lookup(&self, map_id: uuid::Uuid, key: &[u8]) -> Lookup {
        let cache_key = CacheKey {
            map_id,
            key: key.to_vec(),
        };
        let Some(mut entry) = self.entries.get_mut(&cache_key) else {
            return Lookup::Miss;
        };

        if entry.ttl.is_zero() {
            return Lookup::Hit(entry.value.clone());
        }

        let elapsed = entry.set_at.elapsed();
        if elapsed >= entry.ttl {
            drop(entry);
            self.entries.remove(&cache_key);
            tracing::debug!(%map_id, "mapping cache entry expired");
            Lookup::Miss
        } else {
            entry.ttl -= elapsed;
            entry.set_at = Instant::now();
            Lookup::Hit(entry.value.clone())
        }
    }

    /// Publishes a freshly-fetched or freshly-mutated entry as authoritative
    /// (TTL = 0). Called after a successful GSM fetch or a successful
    /// mutation affecting this region.
    pub fn publish(&self, map_id: uuid::Uuid, key: &[u8], value: CachedMapping) {
        let cache_key = CacheKey {
            map_id,
            key: key.to_vec(),
        };
        self.entries.insert(
            cache_key,
            Entry {
                value,
                ttl: Duration::ZERO,
                set_at: Instant::now(),
            },
        );
    }

    /// Removes one entry, e.g. because the mapping it names no longer
    /// exists.
    pub fn invalidate(&self, map_id: uuid::Uuid, key: &[u8]) {
        self.entries.remove(&CacheKey {
            map_id,
            key: key.to_vec(),
        });
    }

    /// Removes every entry for a map, e.g. on `DeleteShardMap`.
    pub fn invalidate_map(&self, map_id: uuid::Uuid) {
        self.entries.retain(|k, _| k.map_id != map_id);
    }

    /// Records a classified transient connect failure against a cached
    /// entry, growing its TTL with capped exponential backoff so repeated
    /// callers don't stampede an unreachable shard's catalog entry. A no-op
    /// if the entry isn't present (there's nothing to back off).
    pub fn record_transient_failure(&self, map_id: uuid::Uuid, key: &[u8]) {
        let cache_key = CacheKey {
            map_id,
            key: key.to_vec(),
        };
        if let Some(mut entry) = self.entries.get_mut(&cache_key) {
            let next = if entry.ttl.is_zero() {
                INITIAL_BACKOFF
            } else {
                (entry.ttl * 2).min(MAX_BACKOFF)
            };
            tracing::warn!(%map_id, ttl_ms = next.as_millis() as u64, "mapping cache backing off after transient fault");
            entry.ttl = next;
            entry.set_at = Instant::now();
        }
    }

    /// Records a successful connection against a cached entry, resetting it
    /// to authoritative (TTL = 0).
    pub fn record_success(&self, map_id: uuid::Uuid, key: &[u8]) {
        let cache_key = CacheKey {
            map_id,
            key: key.to_vec(),
        };
        if let Some(mut entry) = self.entries.get_mut(&cache_key) {
            entry.ttl = Duration::ZERO;
            entry.set_at = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(n: u8) -> CachedMapping {
        CachedMapping {
            mapping_id: uuid::Uuid::from_u128(n as u128),
            version: 1,
            shard: ShardEndpoint {
                protocol: None,
                host: "db1".into(),
                database: "tenants".into(),
                port: Some(5432),
            },
        }
    }

    #[test]
    fn miss_then_publish_then_hit() {
        let cache = MappingCache::new();
        let map_id = uuid::Uuid::from_u128(1);
        assert_eq!(cache.lookup(map_id, b"k"), Lookup::Miss);

        cache.publish(map_id, b"k", mapping(7));
        assert_eq!(cache.lookup(map_id, b"k"), Lookup::Hit(mapping(7)));
    }

    #[test]
    fn transient_failure_backs_off_then_expires() {
        let cache = MappingCache::new();
        let map_id = uuid::Uuid::from_u128(1);
        cache.publish(map_id, b"k", mapping(1));

        cache.record_transient_failure(map_id, b"k");
        // Still a hit immediately: TTL just grew from zero.
        assert_eq!(cache.lookup(map_id, b"k"), Lookup::Hit(mapping(1)));

        std::thread::sleep(INITIAL_BACKOFF + Duration::from_millis(10));
        assert_eq!(cache.lookup(map_id, b"k"), Lookup::Miss);
    }

    #[test]
    fn success_resets_ttl_to_authoritative() {
        let cache = MappingCache::new();
        let map_id = uuid::Uuid::from_u128(1);
        cache.publish(map_id, b"k", mapping(1));
        cache.record_transient_failure(map_id, b"k");
        cache.record_success(map_id, b"k");

        std::thread::sleep(INITIAL_BACKOFF + Duration::from_millis(10));
        // No longer decaying: still a hit well past the old backoff window.
        assert_eq!(cache.lookup(map_id, b"k"), Lookup::Hit(mapping(1)));
    }

    #[test]
    fn invalidate_map_clears_only_that_maps_entries() {
        let cache = MappingCache::new();
        let map_a = uuid::Uuid::from_u128(1);
        let map_b = uuid::Uuid::from_u128(2);
        cache.publish(map_a, b"k", mapping(1));
        cache.publish(map_b, b"k", mapping(2));

        cache.invalidate_map(map_a);
        assert_eq!(cache.lookup(map_a, b"k"), Lookup::Miss);
        assert_eq!(cache.lookup(map_b, b"k"), Lookup::Hit(mapping(2)));
    }
}

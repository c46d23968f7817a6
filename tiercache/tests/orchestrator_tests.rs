//! Orchestrator Integration Tests
//!
//! Exercises the cascade across all three tiers, using in-process stores
//! for the remote layers.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tiercache::{
    CacheConfig, CacheError, CacheOrchestrator, InMemoryStore, LayerKind, QueryFingerprint,
    RemoteStore,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Customer {
    id: u64,
    name: String,
    balance_cents: i64,
}

fn customer(id: u64) -> Customer {
    Customer {
        id,
        name: format!("customer-{}", id),
        balance_cents: 1_250 * id as i64,
    }
}

struct Tiers {
    cache: CacheOrchestrator,
    primary: Arc<InMemoryStore>,
    secondary: Arc<InMemoryStore>,
}

async fn three_tiers(config: CacheConfig) -> Tiers {
    let primary = Arc::new(InMemoryStore::named("redis"));
    let secondary = Arc::new(InMemoryStore::named("synap"));
    let cache = CacheOrchestrator::builder(config)
        .with_primary_store(primary.clone())
        .with_secondary_store(secondary.clone())
        .build()
        .await
        .unwrap();

    Tiers {
        cache,
        primary,
        secondary,
    }
}

#[tokio::test]
async fn test_set_then_get_returns_value() {
    let tiers = three_tiers(CacheConfig::default()).await;

    assert!(tiers.cache.set("customer:1", &customer(1), None).await.unwrap());
    assert_eq!(
        tiers.cache.get::<Customer>("customer:1").await.unwrap(),
        Some(customer(1))
    );

    // Every layer received its own copy
    assert!(tiers.primary.contains_key("customer:1"));
    assert!(tiers.secondary.contains_key("customer:1"));
}

#[tokio::test]
async fn test_get_unknown_key_is_absent() {
    let tiers = three_tiers(CacheConfig::default()).await;
    assert_eq!(tiers.cache.get::<Customer>("nope").await.unwrap(), None);

    let stats = tiers.cache.get_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 0);
}

#[tokio::test(start_paused = true)]
async fn test_entries_expire_in_every_layer() {
    let tiers = three_tiers(CacheConfig::default()).await;

    tiers
        .cache
        .set("session", &"abc", Some(Duration::from_secs(5)))
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(4)).await;
    assert_eq!(
        tiers.cache.get::<String>("session").await.unwrap(),
        Some("abc".to_string())
    );

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(tiers.cache.get::<String>("session").await.unwrap(), None);
    assert!(!tiers.primary.contains_key("session"));
    assert!(!tiers.secondary.contains_key("session"));
}

#[tokio::test]
async fn test_lower_layer_hit_is_promoted() {
    let tiers = three_tiers(CacheConfig::default()).await;

    // Only the secondary tier holds the key
    let bytes = tiers.cache.serializer().encode(&customer(7)).unwrap();
    tiers
        .secondary
        .set_with_ttl("customer:7", &bytes, 60)
        .await
        .unwrap();
    assert!(!tiers.primary.contains_key("customer:7"));

    assert_eq!(
        tiers.cache.get::<Customer>("customer:7").await.unwrap(),
        Some(customer(7))
    );
    assert!(tiers.primary.contains_key("customer:7"));

    // Lowest layer gone: the promoted copies still answer
    tiers.secondary.set_online(false);
    assert_eq!(
        tiers.cache.get::<Customer>("customer:7").await.unwrap(),
        Some(customer(7))
    );

    let stats = tiers.cache.get_stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 0);
}

#[tokio::test(start_paused = true)]
async fn test_promotion_uses_layer_default_ttl() {
    let mut config = CacheConfig::default();
    config.primary_remote.default_ttl_seconds = Some(30);
    let tiers = three_tiers(config).await;

    let bytes = tiers.cache.serializer().encode(&1u32).unwrap();
    tiers.secondary.set_with_ttl("k", &bytes, 3600).await.unwrap();
    tiers.cache.get::<u32>("k").await.unwrap();
    assert!(tiers.primary.contains_key("k"));

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(!tiers.primary.contains_key("k"));
    assert!(tiers.secondary.contains_key("k"));
}

#[tokio::test]
async fn test_invalidate_pattern_skips_secondary() {
    let tiers = three_tiers(CacheConfig::default()).await;
    for key in ["user_1", "user_2", "order_1"] {
        tiers.cache.set(key, &key, None).await.unwrap();
    }

    // Two keys from local plus two from primary
    let removed = tiers.cache.invalidate_pattern("user_*").await.unwrap();
    assert_eq!(removed, 4);

    assert!(!tiers.primary.contains_key("user_1"));
    assert!(!tiers.primary.contains_key("user_2"));
    assert!(tiers.primary.contains_key("order_1"));
    assert!(tiers.secondary.contains_key("user_1"));
    assert!(tiers.secondary.contains_key("user_2"));

    // The secondary copy is still served and promoted back up
    assert_eq!(
        tiers.cache.get::<String>("user_1").await.unwrap(),
        Some("user_1".to_string())
    );
    assert!(tiers.primary.contains_key("user_1"));
}

#[tokio::test]
async fn test_invalidate_pattern_is_case_sensitive() {
    let tiers = three_tiers(CacheConfig::default()).await;
    tiers.cache.set("User_1", &1u8, None).await.unwrap();
    tiers.cache.set("user_1", &1u8, None).await.unwrap();

    assert_eq!(tiers.cache.invalidate_pattern("user_?").await.unwrap(), 2);
    assert!(tiers.primary.contains_key("User_1"));
}

#[tokio::test]
async fn test_delete_removes_from_every_layer() {
    let tiers = three_tiers(CacheConfig::default()).await;
    tiers.cache.set("k", &"v", None).await.unwrap();

    assert!(tiers.cache.delete("k").await);
    assert!(!tiers.primary.contains_key("k"));
    assert!(!tiers.secondary.contains_key("k"));
    assert_eq!(tiers.cache.get::<String>("k").await.unwrap(), None);
}

#[tokio::test]
async fn test_clear_flushes_every_layer() {
    let tiers = three_tiers(CacheConfig::default()).await;
    for i in 0..5 {
        tiers.cache.set(&format!("k{}", i), &i, None).await.unwrap();
    }

    assert!(tiers.cache.clear().await);
    assert!(tiers.primary.is_empty());
    assert!(tiers.secondary.is_empty());
    assert_eq!(tiers.cache.get::<i32>("k0").await.unwrap(), None);
    assert_eq!(tiers.cache.get_stats().clears, 3);
}

#[tokio::test]
async fn test_remember_calls_producer_once() {
    let tiers = three_tiers(CacheConfig::default()).await;
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
        let value: Customer = tiers
            .cache
            .remember("customer:3", None, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CacheError>(customer(3))
            })
            .await
            .unwrap();
        assert_eq!(value, customer(3));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Absent again after a delete: computed again
    tiers.cache.delete("customer:3").await;
    let _: Customer = tiers
        .cache
        .remember("customer:3", None, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, CacheError>(customer(3))
        })
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[derive(Debug)]
enum LoadError {
    Cache(CacheError),
    Database(String),
}

impl From<CacheError> for LoadError {
    fn from(e: CacheError) -> Self {
        LoadError::Cache(e)
    }
}

#[tokio::test]
async fn test_remember_propagates_producer_error() {
    let tiers = three_tiers(CacheConfig::default()).await;

    let result: Result<u32, LoadError> = tiers
        .cache
        .remember("k", None, || async {
            Err(LoadError::Database("connection reset".to_string()))
        })
        .await;
    assert!(matches!(result, Err(LoadError::Database(ref msg)) if msg == "connection reset"));
    assert_eq!(tiers.cache.get::<u32>("k").await.unwrap(), None);
}

#[tokio::test]
async fn test_remember_rejects_zero_ttl_before_producing() {
    let tiers = three_tiers(CacheConfig::default()).await;
    let calls = AtomicUsize::new(0);

    let result: Result<u32, LoadError> = tiers
        .cache
        .remember("k", Some(Duration::ZERO), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        })
        .await;
    assert!(matches!(
        result,
        Err(LoadError::Cache(CacheError::InvalidTtl(_)))
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_huge_ttl_is_stored_in_every_layer() {
    let tiers = three_tiers(CacheConfig::default()).await;

    for (key, ttl) in [
        ("max", Duration::MAX),
        ("half", Duration::from_secs(u64::MAX / 2)),
    ] {
        assert!(tiers.cache.set(key, &1u32, Some(ttl)).await.unwrap());
        assert_eq!(tiers.cache.get::<u32>(key).await.unwrap(), Some(1));
        assert!(tiers.primary.contains_key(key));
        assert!(tiers.secondary.contains_key(key));
    }

    let value: Result<u32, LoadError> = tiers
        .cache
        .remember("produced", Some(Duration::MAX), || async { Ok(7) })
        .await;
    assert_eq!(value.unwrap(), 7);
    assert!(tiers.primary.contains_key("produced"));
}

#[tokio::test]
async fn test_zero_layer_ttl_override_is_rejected() {
    let mut config = CacheConfig::default();
    config.local.default_ttl_seconds = Some(0);

    let result = CacheOrchestrator::builder(config).build().await;
    assert!(matches!(result, Err(CacheError::Config(_))));
}

#[tokio::test]
async fn test_remember_query_keys_by_fingerprint() {
    let tiers = three_tiers(CacheConfig::default()).await;
    let fingerprint = QueryFingerprint::new(
        "SELECT id, name FROM customers WHERE region = $1",
        json!(["emea"]),
    );
    let calls = AtomicUsize::new(0);

    for _ in 0..2 {
        let rows: Vec<Customer> = tiers
            .cache
            .remember_query(&fingerprint, Some(Duration::from_secs(60)), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CacheError>(vec![customer(1), customer(2)])
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(tiers.primary.contains_key(&fingerprint.cache_key()));
}

#[tokio::test]
async fn test_soft_capacity_keeps_all_entries() {
    let mut config = CacheConfig::default();
    config.local.capacity = 2;
    let cache = CacheOrchestrator::builder(config).build().await.unwrap();

    for key in ["a", "b", "c"] {
        assert!(cache.set(key, &key, None).await.unwrap());
    }
    for key in ["a", "b", "c"] {
        assert_eq!(
            cache.get::<String>(key).await.unwrap(),
            Some(key.to_string())
        );
    }

    let occupancy = cache.get_stats().local_occupancy.unwrap();
    assert_eq!(occupancy.entries, 3);
    assert_eq!(occupancy.capacity, 2);
}

#[tokio::test]
async fn test_remote_outage_falls_through() {
    let tiers = three_tiers(CacheConfig::default()).await;
    tiers.cache.set("k", &"v", None).await.unwrap();

    tiers.primary.set_online(false);
    tiers.secondary.set_online(false);

    // Local still answers and writes still land somewhere
    assert_eq!(
        tiers.cache.get::<String>("k").await.unwrap(),
        Some("v".to_string())
    );
    assert!(tiers.cache.set("k2", &"v2", None).await.unwrap());
    assert!(tiers.cache.delete("k").await);
    assert_eq!(tiers.cache.invalidate_pattern("k*").await.unwrap(), 1);
}

#[tokio::test]
async fn test_total_outage_every_remember_produces() {
    let mut config = CacheConfig::default();
    config.local.enabled = false;
    let tiers = three_tiers(config).await;
    tiers.primary.set_online(false);
    tiers.secondary.set_online(false);

    assert!(!tiers.cache.set("k", &1u32, None).await.unwrap());
    assert_eq!(tiers.cache.get::<u32>("k").await.unwrap(), None);
    assert!(!tiers.cache.delete("k").await);
    assert!(!tiers.cache.clear().await);

    let calls = AtomicUsize::new(0);
    for _ in 0..3 {
        let value: u32 = tiers
            .cache
            .remember("k", None, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CacheError>(9)
            })
            .await
            .unwrap();
        assert_eq!(value, 9);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_offline_store_at_startup_is_disabled() {
    let primary = Arc::new(InMemoryStore::named("redis"));
    primary.set_online(false);

    let cache = CacheOrchestrator::builder(CacheConfig::default())
        .with_primary_store(primary.clone())
        .build()
        .await
        .unwrap();

    let descriptor = &cache.layers()[1];
    assert_eq!(descriptor.kind, LayerKind::PrimaryRemote);
    assert!(!descriptor.enabled);

    // Disabled layers are never called again, even once the store recovers
    let calls_after_probe = primary.calls();
    primary.set_online(true);
    cache.set("k", &1u8, None).await.unwrap();
    cache.get::<u8>("k").await.unwrap();
    assert_eq!(primary.calls(), calls_after_probe);
}

#[tokio::test]
async fn test_type_mismatch_surfaces_serialization_error() {
    let tiers = three_tiers(CacheConfig::default()).await;
    tiers.cache.set("k", &"text", None).await.unwrap();

    assert!(matches!(
        tiers.cache.get::<u64>("k").await,
        Err(CacheError::Serialization(_))
    ));
}

#[tokio::test]
async fn test_binary_codec_with_compression() {
    let mut config = CacheConfig::default();
    config.cache.codec = tiercache::Codec::Binary;
    config.compression.threshold_bytes = 32;
    let tiers = three_tiers(config).await;

    let customers: Vec<Customer> = (0..100).map(customer).collect();
    assert!(tiers.cache.set("all", &customers, None).await.unwrap());
    assert_eq!(
        tiers.cache.get::<Vec<Customer>>("all").await.unwrap(),
        Some(customers)
    );
}

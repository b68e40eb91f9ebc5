// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! End-to-end engine behavior: the full insert → maintain → search
//! pipeline, caching, hybrid fusion, re-ranking, rebuilds, durability,
//! and tenant isolation.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use proxdb_core::{
    CollectionConfig, DistanceMetric, EngineError, IndexVariant, Payload, TenantId, VectorId,
};
use proxdb_engine::{engine::manual_maintenance_config, Engine, SearchRequest};
use proxdb_query::{Bm25Index, ExactReranker, FilterOp, FilterPredicate};

fn open_engine(dir: &TempDir) -> Engine {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Engine::open(dir.path(), manual_maintenance_config()).unwrap()
}

fn payload(pairs: &[(&str, &str)]) -> Payload {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), (*v).into()))
        .collect()
}

/// Seeds the worked reference collection: D=4, metric=L2, three vectors.
fn seed_reference(engine: &Engine) -> (VectorId, VectorId, VectorId) {
    engine
        .create_collection("docs", CollectionConfig::new(4, DistanceMetric::L2))
        .unwrap();
    let t = TenantId(1);
    let a = engine
        .insert("docs", t, vec![0.0, 0.0, 0.0, 0.0], payload(&[("name", "v1")]))
        .unwrap();
    let b = engine
        .insert("docs", t, vec![1.0, 0.0, 0.0, 0.0], payload(&[("name", "v2")]))
        .unwrap();
    let c = engine
        .insert("docs", t, vec![5.0, 5.0, 5.0, 5.0], payload(&[("name", "v3")]))
        .unwrap();
    engine.maintain("docs").unwrap();
    (a.id, b.id, c.id)
}

#[test]
fn test_reference_l2_ranking() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let (id1, id2, _) = seed_reference(&engine);

    let response = engine
        .search(
            "docs",
            &SearchRequest::new(TenantId(1), vec![0.9, 0.0, 0.0, 0.0], 2),
        )
        .unwrap();

    assert_eq!(response.hits.len(), 2);
    assert_eq!(response.hits[0].id, id2);
    assert!((response.hits[0].distance.unwrap() - 0.01).abs() < 1e-5);
    assert_eq!(response.hits[1].id, id1);
    assert!((response.hits[1].distance.unwrap() - 0.81).abs() < 1e-5);
    assert!(!response.cache_hit);
    assert!(!response.stale);
}

#[test]
fn test_delete_excludes_id_regardless_of_cache_state() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let (id1, id2, id3) = seed_reference(&engine);
    let request = SearchRequest::new(TenantId(1), vec![0.9, 0.0, 0.0, 0.0], 2);

    // Prime the cache with a result that includes id2.
    let first = engine.search("docs", &request).unwrap();
    assert_eq!(first.hits[0].id, id2);
    assert!(engine.search("docs", &request).unwrap().cache_hit);

    // Tombstone id2; the cached entry cites it and must not be served.
    assert!(engine.delete("docs", id2).unwrap());
    let after = engine.search("docs", &request).unwrap();
    let ids: Vec<VectorId> = after.hits.iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![id1, id3]);
    assert!(!after.cache_hit);

    // Idempotent delete: second call is a no-op.
    assert!(!engine.delete("docs", id2).unwrap());
}

#[test]
fn test_cache_hit_then_rebuild_recomputes() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    seed_reference(&engine);
    let request = SearchRequest::new(TenantId(1), vec![0.9, 0.0, 0.0, 0.0], 2);

    let miss = engine.search("docs", &request).unwrap();
    assert!(!miss.cache_hit);

    let hit = engine.search("docs", &request).unwrap();
    assert!(hit.cache_hit);
    assert_eq!(hit.generation, miss.generation);

    // A near-duplicate (not identical) embedding also hits.
    let near = engine
        .search(
            "docs",
            &SearchRequest::new(TenantId(1), vec![0.9005, 0.0, 0.0, 0.0], 2),
        )
        .unwrap();
    assert!(near.cache_hit);

    // After a rebuild the generation moved; the identical query must
    // recompute.
    let new_generation = engine.trigger_rebuild("docs").unwrap();
    let recomputed = engine.search("docs", &request).unwrap();
    assert!(!recomputed.cache_hit);
    assert_eq!(recomputed.generation, new_generation);
    assert!(recomputed.generation > miss.generation);
}

#[test]
fn test_tenant_isolation_end_to_end() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    engine
        .create_collection("shared", CollectionConfig::new(2, DistanceMetric::L2))
        .unwrap();

    let mut tenant_b_ids = Vec::new();
    for i in 0..10 {
        let ack_a = engine
            .insert("shared", TenantId(1), vec![i as f32, 0.0], Payload::new())
            .unwrap();
        let ack_b = engine
            .insert("shared", TenantId(2), vec![i as f32, 0.1], Payload::new())
            .unwrap();
        assert!(ack_b.version > ack_a.version);
        tenant_b_ids.push(ack_b.id);
    }
    engine.maintain("shared").unwrap();

    let response = engine
        .search("shared", &SearchRequest::new(TenantId(1), vec![3.0, 0.0], 10))
        .unwrap();
    assert!(!response.hits.is_empty());
    for hit in &response.hits {
        assert!(
            !tenant_b_ids.contains(&hit.id),
            "tenant B record {} leaked into tenant A results",
            hit.id
        );
    }

    // The cache is tenant-partitioned too: tenant B's identical query
    // must not see tenant A's cached hits.
    let b = engine
        .search("shared", &SearchRequest::new(TenantId(2), vec![3.0, 0.0], 10))
        .unwrap();
    assert!(!b.cache_hit);
    for hit in &b.hits {
        assert!(tenant_b_ids.contains(&hit.id));
    }
}

#[test]
fn test_filtered_search_returns_only_matching_payloads() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    engine
        .create_collection("docs", CollectionConfig::new(2, DistanceMetric::L2))
        .unwrap();
    let t = TenantId(1);
    for i in 0..40 {
        let lang = if i % 4 == 0 { "de" } else { "en" };
        engine
            .insert("docs", t, vec![i as f32, 0.0], payload(&[("lang", lang)]))
            .unwrap();
    }
    engine.maintain("docs").unwrap();

    let request = SearchRequest::new(t, vec![0.0, 0.0], 5)
        .with_filter(FilterPredicate::new().and("lang", FilterOp::Eq, "de"));
    let response = engine.search("docs", &request).unwrap();
    assert!(!response.hits.is_empty());
    for hit in &response.hits {
        assert_eq!(hit.payload.get("lang"), Some(&"de".into()));
    }
}

#[test]
fn test_hybrid_fusion_with_lexical_collaborator() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    let lexical = Arc::new(Bm25Index::new());
    engine.set_lexical_provider(lexical.clone());
    engine
        .create_collection("docs", CollectionConfig::new(2, DistanceMetric::Cosine))
        .unwrap();

    let t = TenantId(1);
    let texts = [
        "rust systems programming",
        "vector similarity search",
        "cooking pasta at home",
        "approximate nearest neighbors",
    ];
    let mut ids = Vec::new();
    for (i, text) in texts.iter().enumerate() {
        let angle = i as f32 * 0.4;
        let ack = engine
            .insert("docs", t, vec![angle.cos(), angle.sin()], payload(&[("text", text)]))
            .unwrap();
        lexical.add_document(t, ack.id, text);
        ids.push(ack.id);
    }
    engine.maintain("docs").unwrap();

    // Vector query near doc 0, lexical terms matching docs 1 and 3.
    let request = SearchRequest::new(t, vec![1.0, 0.0], 4)
        .with_lexical_terms(vec!["similarity", "search", "neighbors"]);
    let response = engine.search("docs", &request).unwrap();

    assert!(!response.hits.is_empty());
    // Doc 1 appears in both ranked lists; fusion must place it above the
    // lexical-only doc 3.
    let pos = |id: VectorId| response.hits.iter().position(|h| h.id == id);
    let p1 = pos(ids[1]).expect("doc in both sources must survive fusion");
    if let Some(p3) = pos(ids[3]) {
        assert!(p1 < p3);
    }
    // The cooking doc matches neither source strongly; it must not lead.
    assert_ne!(response.hits[0].id, ids[2]);
}

#[test]
fn test_reranker_reorders_by_exact_distance() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    engine.set_reranker(Arc::new(ExactReranker::new(DistanceMetric::L2)));
    engine
        .create_collection("docs", CollectionConfig::new(2, DistanceMetric::L2))
        .unwrap();

    let t = TenantId(1);
    for i in 0..20 {
        engine
            .insert("docs", t, vec![i as f32, 0.0], Payload::new())
            .unwrap();
    }
    engine.maintain("docs").unwrap();

    let response = engine
        .search("docs", &SearchRequest::new(t, vec![7.2, 0.0], 3))
        .unwrap();
    assert_eq!(response.hits.len(), 3);
    // Rerank scores are negated exact distances: descending score means
    // ascending true distance from 7.2.
    let scores: Vec<f32> = response.hits.iter().map(|h| h.score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    let first = &response.hits[0];
    assert!((first.score + 0.04).abs() < 1e-3); // -(7.2-7)^2
}

#[test]
fn test_validation_errors() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    engine
        .create_collection("docs", CollectionConfig::new(4, DistanceMetric::L2))
        .unwrap();

    assert!(matches!(
        engine.search("missing", &SearchRequest::new(TenantId(1), vec![0.0; 4], 1)),
        Err(EngineError::UnknownCollection(_))
    ));
    assert!(matches!(
        engine.insert("docs", TenantId(1), vec![0.0; 3], Payload::new()),
        Err(EngineError::DimensionMismatch { expected: 4, actual: 3 })
    ));
    assert!(matches!(
        engine.search("docs", &SearchRequest::new(TenantId(1), vec![0.0; 5], 1)),
        Err(EngineError::QueryDimensionMismatch { expected: 4, actual: 5 })
    ));
    let bad_filter = SearchRequest::new(TenantId(1), vec![0.0; 4], 1)
        .with_filter(FilterPredicate::new().and("x", FilterOp::Lt, true));
    assert!(matches!(
        engine.search("docs", &bad_filter),
        Err(EngineError::InvalidFilter(_))
    ));
}

#[test]
fn test_expired_deadline_returns_timeout() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    engine
        .create_collection("docs", CollectionConfig::new(2, DistanceMetric::L2))
        .unwrap();
    let t = TenantId(1);
    for i in 0..50 {
        engine
            .insert("docs", t, vec![i as f32, 0.0], Payload::new())
            .unwrap();
    }
    engine.maintain("docs").unwrap();

    let request =
        SearchRequest::new(t, vec![0.0, 0.0], 5).with_timeout(Duration::from_nanos(1));
    let err = engine.search("docs", &request).unwrap_err();
    assert!(matches!(err, EngineError::Timeout));
    assert!(err.is_retryable());
}

#[test]
fn test_durability_across_reopen() {
    let dir = TempDir::new().unwrap();
    let (id_kept, id_gone);
    {
        let engine = open_engine(&dir);
        engine
            .create_collection("docs", CollectionConfig::new(2, DistanceMetric::L2))
            .unwrap();
        let t = TenantId(1);
        id_kept = engine
            .insert("docs", t, vec![1.0, 1.0], payload(&[("name", "kept")]))
            .unwrap()
            .id;
        id_gone = engine
            .insert("docs", t, vec![2.0, 2.0], Payload::new())
            .unwrap()
            .id;
        engine.delete("docs", id_gone).unwrap();
    }

    let engine = open_engine(&dir);
    engine
        .create_collection("docs", CollectionConfig::new(2, DistanceMetric::L2))
        .unwrap();
    let response = engine
        .search("docs", &SearchRequest::new(TenantId(1), vec![1.0, 1.0], 5))
        .unwrap();
    let ids: Vec<VectorId> = response.hits.iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![id_kept]);
    assert_eq!(
        response.hits[0].payload,
        payload(&[("name", "kept")])
    );
}

#[test]
fn test_rebuild_concurrent_with_searches_never_mixes_generations() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(open_engine(&dir));
    engine
        .create_collection("docs", CollectionConfig::new(2, DistanceMetric::L2))
        .unwrap();
    let t = TenantId(1);
    for i in 0..200 {
        engine
            .insert("docs", t, vec![i as f32, 0.0], Payload::new())
            .unwrap();
    }
    engine.maintain("docs").unwrap();
    let initial_generation = engine.stats("docs").unwrap().generation;

    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let searcher = {
        let engine = Arc::clone(&engine);
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            let mut observed = Vec::new();
            while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                let response = engine
                    .search("docs", &SearchRequest::new(t, vec![50.0, 0.0], 5))
                    .unwrap();
                // The k nearest to x=50 are the same in every generation;
                // a torn read would surface as a missing or odd hit.
                assert_eq!(response.hits.len(), 5);
                observed.push(response.generation);
            }
            observed
        })
    };

    let mut published = vec![initial_generation];
    for _ in 0..3 {
        published.push(engine.trigger_rebuild("docs").unwrap());
    }
    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    let observed = searcher.join().unwrap();

    // Every response came wholly from one published generation.
    for generation in observed {
        assert!(published.contains(&generation));
    }
}

#[test]
fn test_tombstones_never_surface_under_random_interleaving() {
    for variant in [IndexVariant::Flat, IndexVariant::Ivf, IndexVariant::Hnsw] {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(&dir);
        let mut config = CollectionConfig::new(4, DistanceMetric::L2).with_variant(variant);
        config.flat_threshold = 0; // always exercise the configured variant
        engine.create_collection("rand", config).unwrap();

        let t = TenantId(1);
        let mut rng = StdRng::seed_from_u64(0xfeed ^ variant as u64);
        let mut live: Vec<VectorId> = Vec::new();
        let mut dead: Vec<VectorId> = Vec::new();

        for step in 0..300 {
            match rng.gen_range(0..10) {
                // Insert-heavy mix keeps the index populated.
                0..=5 => {
                    let embedding: Vec<f32> = (0..4).map(|_| rng.gen_range(-1.0..1.0)).collect();
                    let ack = engine.insert("rand", t, embedding, Payload::new()).unwrap();
                    live.push(ack.id);
                }
                6..=7 if !live.is_empty() => {
                    let victim = live.swap_remove(rng.gen_range(0..live.len()));
                    assert!(engine.delete("rand", victim).unwrap());
                    dead.push(victim);
                }
                _ => {
                    if step % 50 == 0 {
                        engine.maintain("rand").unwrap();
                        engine.trigger_rebuild("rand").unwrap();
                    }
                    let query: Vec<f32> = (0..4).map(|_| rng.gen_range(-1.0..1.0)).collect();
                    let response = engine
                        .search("rand", &SearchRequest::new(t, query, 8))
                        .unwrap();
                    for hit in &response.hits {
                        assert!(
                            !dead.contains(&hit.id),
                            "tombstoned {} surfaced from {variant:?}",
                            hit.id
                        );
                    }
                }
            }
        }

        // Rebuild compacts; tombstoned ids must stay gone.
        engine.maintain("rand").unwrap();
        engine.trigger_rebuild("rand").unwrap();
        let response = engine
            .search("rand", &SearchRequest::new(t, vec![0.0; 4], 20))
            .unwrap();
        for hit in &response.hits {
            assert!(!dead.contains(&hit.id));
        }
    }
}

#[test]
fn test_wire_types_round_trip_as_json() {
    // The facade types are what an HTTP adapter puts on the wire.
    let request = SearchRequest::new(TenantId(3), vec![0.1, 0.2], 5)
        .with_filter(FilterPredicate::new().and("lang", FilterOp::Eq, "en"))
        .with_lexical_terms(vec!["vector", "search"])
        .with_timeout(Duration::from_millis(250));
    let json = serde_json::to_string(&request).unwrap();
    let decoded: SearchRequest = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded.tenant, request.tenant);
    assert_eq!(decoded.k, 5);
    assert_eq!(decoded.filter, request.filter);
    assert_eq!(decoded.lexical_terms, request.lexical_terms);

    // Responses expose freshness metadata alongside the hits.
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    seed_reference(&engine);
    let response = engine
        .search(
            "docs",
            &SearchRequest::new(TenantId(1), vec![0.9, 0.0, 0.0, 0.0], 1),
        )
        .unwrap();
    let value: serde_json::Value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["cache_hit"], false);
    assert_eq!(value["stale"], false);
    assert!(value["generation"].as_u64().is_some());
}

#[test]
fn test_stats_expose_freshness_and_cache_counters() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    seed_reference(&engine);

    let request = SearchRequest::new(TenantId(1), vec![0.9, 0.0, 0.0, 0.0], 2);
    engine.search("docs", &request).unwrap();
    engine.search("docs", &request).unwrap();

    let stats = engine.stats("docs").unwrap();
    assert_eq!(stats.live_records, 3);
    assert_eq!(stats.index_len, 3);
    assert_eq!(stats.staleness, 0);
    assert!(!stats.degraded);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 1);
    assert!(stats.index_memory_bytes > 0);
}

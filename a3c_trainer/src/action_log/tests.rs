//! Action log tests.
//!
//! 1. **Retention**: traced episodes are exactly the retained set
//! 2. **Persistence**: JSON round trips, lenient record parsing
//! 3. **Registry**: restore with missing documents, flushing

use std::collections::BTreeSet;
use std::fs;

use proptest::prelude::*;
use tempfile::tempdir;

use super::*;

fn step(name: &str) -> StepRecord {
    StepRecord {
        action_name: name.to_string(),
        target_x: Some(1),
        target_y: Some(2),
        random_action: false,
        random_position: true,
        primary_resource: 5,
        secondary_resource: 0,
    }
}

fn entry(local: u64, primary: i64, secondary: i64) -> EpisodeLogEntry {
    EpisodeLogEntry {
        global_episode: local * 3,
        local_episode: local,
        total_reward: primary as f32,
        primary_resource: primary,
        secondary_resource: secondary,
        policy_loss: 0.5,
        value_loss: -0.25,
        trace: vec![step("gather"), step("no_op")],
    }
}

mod retention_tests {
    use super::*;

    #[test]
    fn should_keep_trace_while_under_retention() {
        let mut store = ActionLogStore::new(0, 10);
        for i in 1..=5 {
            assert!(store.append(entry(i, 0, 0)));
        }
        assert_eq!(store.traced_episodes(), (1..=5).collect());
        assert_eq!(store.last_local_episode(), 5);
    }

    #[test]
    fn should_keep_best_and_recent_only() {
        let mut store = ActionLogStore::new(0, 2);
        // local: primary, secondary
        store.append(entry(1, 100, 0));
        store.append(entry(2, 0, 90));
        store.append(entry(3, 1, 1));
        store.append(entry(4, 2, 2));
        store.append(entry(5, 3, 3));
        store.append(entry(6, 4, 4));

        // primary top-2: 1, 6; secondary top-2: 2, 6; recent: 5, 6
        let expected: BTreeSet<u64> = [1, 2, 5, 6].into_iter().collect();
        assert_eq!(store.traced_episodes(), expected);

        let stripped = &store.episodes()[2];
        assert_eq!(stripped.local_episode, 3);
        assert!(stripped.trace.is_empty());
        assert_eq!(stripped.primary_resource, 1);
        assert_eq!(stripped.policy_loss, 0.5);
    }

    #[test]
    fn should_prefer_newest_on_ties() {
        let mut store = ActionLogStore::new(0, 1);
        store.append(entry(1, 5, 5));
        assert!(store.append(entry(2, 5, 5)));
        assert_eq!(store.traced_episodes(), [2].into_iter().collect());
    }

    #[test]
    fn should_drop_new_trace_outside_retention() {
        let mut store = ActionLogStore::new(0, 1);
        store.append(entry(5, 50, 50));
        // a lower local index never counts as recent, and it loses both rankings
        assert!(!store.append(entry(3, 1, 1)));
        assert!(store.episodes()[1].trace.is_empty());
    }

    #[test]
    fn should_strip_everything_with_zero_retention() {
        let mut store = ActionLogStore::new(0, 0);
        assert!(!store.append(entry(1, 10, 10)));
        assert!(store.traced_episodes().is_empty());
        assert_eq!(store.len(), 1);
    }

    fn distinct_metrics() -> impl Strategy<Value = (usize, Vec<i64>, Vec<i64>)> {
        (1usize..5).prop_flat_map(|k| {
            (3 * k + 1..40).prop_flat_map(move |m| {
                let values: Vec<i64> = (0..m as i64).collect();
                (
                    Just(k),
                    Just(values.clone()).prop_shuffle(),
                    Just(values).prop_shuffle(),
                )
            })
        })
    }

    proptest! {
        #[test]
        fn prop_traces_match_retained_set((k, primary, secondary) in distinct_metrics()) {
            let mut store = ActionLogStore::new(0, k);
            let mut originals = Vec::new();
            for (i, (&a, &b)) in primary.iter().zip(&secondary).enumerate() {
                let e = entry(i as u64 + 1, a, b);
                originals.push(e.clone());
                store.append(e);
            }

            let mut top_a: Vec<&EpisodeLogEntry> = originals.iter().collect();
            top_a.sort_by(|x, y| y.primary_resource.cmp(&x.primary_resource));
            let mut top_b: Vec<&EpisodeLogEntry> = originals.iter().collect();
            top_b.sort_by(|x, y| y.secondary_resource.cmp(&x.secondary_resource));
            let m = originals.len() as u64;

            let mut expected = BTreeSet::new();
            expected.extend(top_a.iter().take(k).map(|e| e.local_episode));
            expected.extend(top_b.iter().take(k).map(|e| e.local_episode));
            expected.extend(m - k as u64 + 1..=m);

            prop_assert_eq!(store.traced_episodes(), expected.clone());
            prop_assert_eq!(retained_set(store.episodes(), k), expected.clone());

            for (stored, original) in store.episodes().iter().zip(&originals) {
                if expected.contains(&stored.local_episode) {
                    prop_assert_eq!(stored, original);
                } else {
                    prop_assert_eq!(stored, &original.without_trace());
                }
            }
        }
    }
}

mod persistence_tests {
    use super::*;

    fn sample_store() -> ActionLogStore {
        let mut store = ActionLogStore::new(3, 1);
        store.append(entry(1, 10, 0));
        store.append(entry(2, 0, 10));
        store.append(entry(3, 1, 1));
        store
    }

    #[test]
    fn should_round_trip_json() {
        let store = sample_store();
        let first = store.to_json().unwrap();
        let parsed = ActionLogStore::from_json(3, 1, &first).unwrap();
        let second = parsed.to_json().unwrap();

        assert_eq!(parsed, store);
        assert_eq!(first, second);
        assert_eq!(parsed.traced_episodes(), store.traced_episodes());
    }

    #[test]
    fn should_omit_empty_traces_and_targets() {
        let mut store = ActionLogStore::new(0, 0);
        let mut e = entry(1, 0, 0);
        e.trace[0].target_x = None;
        e.trace[0].target_y = None;
        store.append(e);

        let json = store.to_json().unwrap();
        assert!(!json.contains("trace"));
        assert!(json.contains("\"policy_loss\""));
    }

    #[test]
    fn should_save_and_load_from_dir() {
        let dir = tempdir().unwrap();
        let store = sample_store();
        let path = store.save(dir.path()).unwrap();

        assert_eq!(path.file_name().unwrap(), "agent03.json");
        let loaded = ActionLogStore::load(dir.path(), 3, 1).unwrap().unwrap();
        assert_eq!(loaded, store);
        assert_eq!(loaded.last_local_episode(), 3);
    }

    #[test]
    fn should_return_none_for_missing_document() {
        let dir = tempdir().unwrap();
        assert!(ActionLogStore::load(dir.path(), 7, 10).unwrap().is_none());
    }

    #[test]
    fn should_skip_malformed_records() {
        let json = r#"{
            "worker_id": 0,
            "episodes": [
                {"global_episode": 1, "local_episode": 1, "total_reward": 1.0,
                 "primary_resource": 5, "secondary_resource": 0,
                 "policy_loss": 0.1, "value_loss": 0.2},
                {"global_episode": "two", "local_episode": 2},
                {"global_episode": 3, "local_episode": 3, "total_reward": 2.0,
                 "primary_resource": 8, "secondary_resource": 1,
                 "policy_loss": 0.1, "value_loss": 0.2}
            ]
        }"#;
        let store = ActionLogStore::from_json(0, 10, json).unwrap();
        let locals: Vec<u64> = store.episodes().iter().map(|e| e.local_episode).collect();
        assert_eq!(locals, vec![1, 3]);
    }

    #[test]
    fn should_keep_episode_with_non_finite_losses() {
        let mut store = ActionLogStore::new(0, 10);
        store.append(entry(1, 5, 0));
        let mut diverged = entry(2, 6, 0);
        diverged.policy_loss = f32::NAN;
        diverged.value_loss = f32::INFINITY;
        store.append(diverged);

        let json = store.to_json().unwrap();
        assert!(json.contains("\"policy_loss\": null"));

        let parsed = ActionLogStore::from_json(0, 10, &json).unwrap();
        assert_eq!(parsed.len(), store.len());
        assert_eq!(parsed.last_local_episode(), 2);
        let restored = &parsed.episodes()[1];
        assert_eq!(restored.local_episode, 2);
        assert!(restored.policy_loss.is_nan());
        assert!(restored.value_loss.is_nan());
        assert_eq!(restored.trace, store.episodes()[1].trace);
    }

    #[test]
    fn should_reject_corrupt_document() {
        assert!(matches!(
            ActionLogStore::from_json(0, 10, "{ not json"),
            Err(ActionLogError::Parse(_))
        ));
        assert!(matches!(
            ActionLogStore::from_json(0, 10, "{\"worker_id\": 0}"),
            Err(ActionLogError::Parse(_))
        ));
    }
}

mod registry_tests {
    use super::*;

    #[test]
    fn should_start_empty_when_document_missing() {
        let dir = tempdir().unwrap();
        let registry = ActionLogRegistry::new(dir.path(), 10);

        let log = registry.restore(4).unwrap();
        assert!(log.lock().is_empty());
        assert_eq!(log.lock().last_local_episode(), 0);
        assert!(registry.get(4).is_some());
    }

    #[test]
    fn should_restore_saved_document() {
        let dir = tempdir().unwrap();
        let mut store = ActionLogStore::new(1, 10);
        store.append(entry(1, 1, 1));
        store.append(entry(2, 2, 2));
        store.save(dir.path()).unwrap();

        let registry = ActionLogRegistry::new(dir.path(), 10);
        let log = registry.restore(1).unwrap();
        assert_eq!(log.lock().len(), 2);
        assert_eq!(log.lock().last_local_episode(), 2);
    }

    #[test]
    fn should_fail_on_corrupt_document() {
        let dir = tempdir().unwrap();
        fs::write(ActionLogStore::path(dir.path(), 0), "garbage").unwrap();
        let registry = ActionLogRegistry::new(dir.path(), 10);
        assert!(registry.restore(0).is_err());
    }

    #[test]
    fn should_flush_every_worker() {
        let dir = tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let registry = ActionLogRegistry::new(&log_dir, 10);
        for id in 0..3 {
            registry.register(id).lock().append(entry(1, id as i64, 0));
        }

        assert_eq!(registry.flush_all().unwrap(), 3);
        for id in 0..3 {
            assert!(ActionLogStore::path(&log_dir, id).exists());
        }
    }

    #[test]
    fn should_return_same_store_on_register() {
        let dir = tempdir().unwrap();
        let registry = ActionLogRegistry::new(dir.path(), 10);
        let a = registry.register(0);
        let b = registry.register(0);
        a.lock().append(entry(1, 0, 0));
        assert_eq!(b.lock().len(), 1);
    }
}

//! Concurrent add/remove against one registry from many threads.

use std::sync::Arc;
use std::thread;

use hubfeed_registry::{Callback, FunctionNameMap, SubscriptionRegistry, callback};

const THREADS: usize = 8;
const PER_THREAD: usize = 200;

#[test]
fn test_concurrent_add_remove_leaves_only_kept_callbacks() {
    let registry = Arc::new(SubscriptionRegistry::new(FunctionNameMap::new()));

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let mut kept: Vec<Callback> = Vec::new();
                for i in 0..PER_THREAD {
                    let name = format!("fn-{}", i % 5);
                    let cb = callback(|_| {});
                    registry.add(&name, cb.clone(), vec![]);
                    // Odd iterations remove what they added.
                    if i % 2 == 1 {
                        registry.remove(&name, &cb);
                    } else {
                        kept.push(cb);
                    }
                }
                (t, kept)
            })
        })
        .collect();

    let mut total_kept = 0;
    for w in workers {
        let (_, kept) = w.join().unwrap();
        total_kept += kept.len();
    }

    let total_registered: usize = registry
        .function_names()
        .iter()
        .map(|n| registry.callback_count(n))
        .sum();
    assert_eq!(total_registered, total_kept);
    assert_eq!(total_kept, THREADS * PER_THREAD / 2);
}

#[test]
fn test_concurrent_remove_of_shared_callback_removes_once() {
    let registry = Arc::new(SubscriptionRegistry::new(FunctionNameMap::new()));
    let shared = callback(|_| {});
    registry.add("SubscribeTicker", shared.clone(), vec![]);

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let shared = shared.clone();
            thread::spawn(move || registry.remove("SubscribeTicker", &shared))
        })
        .collect();

    let removals: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    let effective = removals
        .iter()
        .filter(|r| r.emptied_registry())
        .count();

    assert_eq!(effective, 1, "exactly one thread observes the removal");
    assert!(registry.is_empty());
}

//! Concurrent producers and consumers sharing one queue.

use std::collections::HashSet;
use std::sync::Arc;

use sqliteq::{QueueOptions, Registry};

const ITEMS: usize = 100;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_producers_and_consumers_claim_each_item_once() {
    let registry = Registry::open_in_memory().await.unwrap();
    let queue = Arc::new(registry.new_queue("race", QueueOptions::default()).await.unwrap());

    let mut producers = Vec::new();
    for i in 0..ITEMS {
        let queue = Arc::clone(&queue);
        producers.push(tokio::spawn(async move {
            queue.enqueue(format!("item-{i}")).await.unwrap();
        }));
    }

    let mut consumers = Vec::new();
    for _ in 0..ITEMS {
        let queue = Arc::clone(&queue);
        consumers.push(tokio::spawn(async move {
            // Dequeue never blocks, so poll until a producer has caught up.
            loop {
                if let Some(claimed) = queue.dequeue_with_ack().await.unwrap() {
                    return claimed;
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    for producer in producers {
        producer.await.unwrap();
    }

    let mut tokens = HashSet::new();
    let mut payloads = HashSet::new();
    for consumer in consumers {
        let claimed = consumer.await.unwrap();
        assert!(tokens.insert(claimed.ack_token.clone()), "duplicate token");
        assert!(payloads.insert(claimed.payload.clone()), "item claimed twice");
        assert!(queue.acknowledge(&claimed.ack_token).await.unwrap());
    }

    assert_eq!(tokens.len(), ITEMS);
    assert_eq!(payloads.len(), ITEMS);
    assert_eq!(queue.len().await.unwrap(), 0);
    assert_eq!(queue.stats().await.unwrap().total(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_plain_dequeues_never_share_an_item() {
    let registry = Registry::open_in_memory().await.unwrap();
    let queue = Arc::new(registry.new_queue("drain", QueueOptions::default()).await.unwrap());
    for i in 0..ITEMS {
        queue.enqueue(format!("item-{i}")).await.unwrap();
    }

    let mut workers = Vec::new();
    for _ in 0..8 {
        let queue = Arc::clone(&queue);
        workers.push(tokio::spawn(async move {
            let mut taken = Vec::new();
            while let Some(payload) = queue.dequeue().await.unwrap() {
                taken.push(payload);
            }
            taken
        }));
    }

    let mut seen = HashSet::new();
    for worker in workers {
        for payload in worker.await.unwrap() {
            assert!(seen.insert(payload), "item dequeued twice");
        }
    }
    assert_eq!(seen.len(), ITEMS);
    assert!(queue.is_empty().await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn claimers_in_separate_registries_share_one_file_cleanly() {
    const CLAIMERS: usize = 4;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");

    // Two registries stand in for two processes, each with its own connection.
    let first = Registry::open(&path).await.unwrap();
    let second = Registry::open(&path).await.unwrap();
    let queues = [
        Arc::new(first.new_queue("shared", QueueOptions::default()).await.unwrap()),
        Arc::new(second.new_queue("shared", QueueOptions::default()).await.unwrap()),
    ];
    for i in 0..2 * ITEMS {
        queues[i % 2].enqueue(format!("item-{i}")).await.unwrap();
    }

    let mut claimers = Vec::new();
    for queue in &queues {
        for _ in 0..CLAIMERS {
            let queue = Arc::clone(queue);
            claimers.push(tokio::spawn(async move {
                let mut claimed = Vec::new();
                // Losing a race must look like an empty queue, never an error.
                while let Some(item) = queue.dequeue_with_ack().await.unwrap() {
                    assert!(queue.acknowledge(&item.ack_token).await.unwrap());
                    claimed.push(item.payload);
                }
                claimed
            }));
        }
    }

    let mut payloads = HashSet::new();
    for claimer in claimers {
        for payload in claimer.await.unwrap() {
            assert!(payloads.insert(payload), "item claimed twice");
        }
    }

    assert_eq!(payloads.len(), 2 * ITEMS);
    assert_eq!(queues[0].stats().await.unwrap().total(), 0);
    first.close().await;
    second.close().await;
}

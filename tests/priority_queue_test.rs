//! Integration tests for the priority queue: ordering plus the inherited
//! acknowledgment and recovery rules.

use sqliteq::{QueueOptions, QueueStats, Registry};

async fn test_registry() -> Registry {
    Registry::open_in_memory()
        .await
        .expect("failed to open in-memory registry")
}

#[tokio::test]
async fn lower_priority_value_is_served_first() {
    let registry = test_registry().await;
    let queue = registry
        .new_priority_queue("jobs", QueueOptions::default())
        .await
        .unwrap();

    queue.enqueue_with_priority(b"low", 10).await.unwrap();
    queue.enqueue_with_priority(b"medium", 5).await.unwrap();
    queue.enqueue_with_priority(b"high", 1).await.unwrap();
    queue.enqueue_with_priority(b"critical", 0).await.unwrap();

    let mut order = Vec::new();
    while let Some(payload) = queue.dequeue().await.unwrap() {
        order.push(String::from_utf8(payload).unwrap());
    }
    assert_eq!(order, ["critical", "high", "medium", "low"]);
}

#[tokio::test]
async fn equal_priorities_keep_insertion_order() {
    let registry = test_registry().await;
    let queue = registry
        .new_priority_queue("jobs", QueueOptions::default())
        .await
        .unwrap();

    queue.enqueue_with_priority(b"b1", 2).await.unwrap();
    queue.enqueue_with_priority(b"a1", 1).await.unwrap();
    queue.enqueue_with_priority(b"b2", 2).await.unwrap();
    queue.enqueue_with_priority(b"a2", 1).await.unwrap();
    queue.enqueue_with_priority(b"b3", 2).await.unwrap();

    let values: Vec<String> = queue
        .values()
        .await
        .unwrap()
        .into_iter()
        .map(|v| String::from_utf8(v).unwrap())
        .collect();
    assert_eq!(values, ["a1", "a2", "b1", "b2", "b3"]);

    let mut order = Vec::new();
    while let Some(claimed) = queue.dequeue_with_ack().await.unwrap() {
        order.push(String::from_utf8(claimed.payload).unwrap());
        assert!(queue.acknowledge(&claimed.ack_token).await.unwrap());
    }
    assert_eq!(order, values);
}

#[tokio::test]
async fn priorities_are_unbounded_signed_integers() {
    let registry = test_registry().await;
    let queue = registry
        .new_priority_queue("jobs", QueueOptions::default())
        .await
        .unwrap();

    queue.enqueue_with_priority(b"max", i64::MAX).await.unwrap();
    queue.enqueue(b"default").await.unwrap();
    queue.enqueue_with_priority(b"negative", -3).await.unwrap();
    queue.enqueue_with_priority(b"min", i64::MIN).await.unwrap();

    assert_eq!(queue.dequeue().await.unwrap(), Some(b"min".to_vec()));
    assert_eq!(queue.dequeue().await.unwrap(), Some(b"negative".to_vec()));
    assert_eq!(queue.dequeue().await.unwrap(), Some(b"default".to_vec()));
    assert_eq!(queue.dequeue().await.unwrap(), Some(b"max".to_vec()));
}

#[tokio::test]
async fn acknowledgment_rules_match_fifo_queue() {
    let registry = test_registry().await;
    let queue = registry
        .new_priority_queue("jobs", QueueOptions::default().remove_on_complete(false))
        .await
        .unwrap();

    queue.enqueue_with_priority(b"later", 9).await.unwrap();
    queue.enqueue_with_priority(b"sooner", 1).await.unwrap();

    let claimed = queue.dequeue_with_ack().await.unwrap().unwrap();
    assert_eq!(claimed.payload, b"sooner");
    assert!(queue.acknowledge(&claimed.ack_token).await.unwrap());
    assert!(!queue.acknowledge(&claimed.ack_token).await.unwrap());

    assert_eq!(
        queue.stats().await.unwrap(),
        QueueStats {
            pending: 1,
            processing: 0,
            completed: 1
        }
    );
}

#[tokio::test]
async fn orphans_return_to_their_priority_slot() {
    let registry = test_registry().await;
    let queue = registry
        .new_priority_queue("jobs", QueueOptions::default())
        .await
        .unwrap();

    queue.enqueue_with_priority(b"urgent", 0).await.unwrap();
    queue.enqueue_with_priority(b"routine", 5).await.unwrap();
    let abandoned = queue.dequeue_with_ack().await.unwrap().unwrap();
    assert_eq!(abandoned.payload, b"urgent");

    // Simulated restart.
    let queue = registry
        .new_priority_queue("jobs", QueueOptions::default())
        .await
        .unwrap();
    assert_eq!(queue.dequeue().await.unwrap(), Some(b"urgent".to_vec()));
    assert!(!queue.acknowledge(&abandoned.ack_token).await.unwrap());
}

#[tokio::test]
async fn fifo_table_is_migrated_on_first_priority_use() {
    let registry = test_registry().await;
    let fifo = registry.new_queue("shared", QueueOptions::default()).await.unwrap();
    fifo.enqueue(b"old-1").await.unwrap();
    fifo.enqueue(b"old-2").await.unwrap();
    fifo.close();

    let queue = registry
        .new_priority_queue("shared", QueueOptions::default())
        .await
        .unwrap();
    queue.enqueue_with_priority(b"new-urgent", -1).await.unwrap();
    queue.enqueue_with_priority(b"new-routine", 0).await.unwrap();

    let values: Vec<Vec<u8>> = queue.values().await.unwrap();
    assert_eq!(
        values,
        vec![
            b"new-urgent".to_vec(),
            b"old-1".to_vec(),
            b"old-2".to_vec(),
            b"new-routine".to_vec(),
        ]
    );

    // A FIFO view of the migrated table still works, ignoring priority.
    let fifo = registry.new_queue("shared", QueueOptions::default()).await.unwrap();
    fifo.enqueue(b"fifo-late").await.unwrap();
    assert_eq!(fifo.dequeue().await.unwrap(), Some(b"old-1".to_vec()));
}

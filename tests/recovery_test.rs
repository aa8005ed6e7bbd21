//! Orphan recovery: claimed but unacknowledged items come back after a restart.

use sqliteq::{QueueOptions, QueueStats, Registry};

#[tokio::test]
async fn unacknowledged_claim_is_redelivered_after_reinitialization() {
    let registry = Registry::open_in_memory().await.unwrap();
    let queue = registry.new_queue("tasks", QueueOptions::default()).await.unwrap();
    queue.enqueue(b"fragile").await.unwrap();

    let claimed = queue.dequeue_with_ack().await.unwrap().unwrap();
    assert!(queue.dequeue().await.unwrap().is_none());
    queue.close();

    // Creating the queue again runs the recovery pass.
    let queue = registry.new_queue("tasks", QueueOptions::default()).await.unwrap();
    assert_eq!(queue.len().await.unwrap(), 1);

    let again = queue.dequeue_with_ack().await.unwrap().unwrap();
    assert_eq!(again.payload, claimed.payload);
    assert_ne!(again.ack_token, claimed.ack_token);

    // The stale token cannot confirm the new claim.
    assert!(!queue.acknowledge(&claimed.ack_token).await.unwrap());
    assert!(queue.acknowledge(&again.ack_token).await.unwrap());
}

#[tokio::test]
async fn acknowledged_and_completed_items_are_not_requeued() {
    let registry = Registry::open_in_memory().await.unwrap();
    let options = QueueOptions::default().remove_on_complete(false);
    let queue = registry.new_queue("tasks", options).await.unwrap();
    queue.enqueue(b"done").await.unwrap();
    queue.enqueue(b"in-flight").await.unwrap();

    let done = queue.dequeue_with_ack().await.unwrap().unwrap();
    queue.acknowledge(&done.ack_token).await.unwrap();
    queue.dequeue_with_ack().await.unwrap().unwrap();

    assert_eq!(queue.requeue_orphans().await.unwrap(), 1);
    assert_eq!(queue.requeue_orphans().await.unwrap(), 0);
    assert_eq!(
        queue.stats().await.unwrap(),
        QueueStats {
            pending: 1,
            processing: 0,
            completed: 1
        }
    );
    assert_eq!(queue.values().await.unwrap(), vec![b"in-flight".to_vec()]);
}

#[tokio::test]
async fn requeued_items_keep_their_original_position() {
    let registry = Registry::open_in_memory().await.unwrap();
    let queue = registry.new_queue("tasks", QueueOptions::default()).await.unwrap();
    queue.enqueue(b"first").await.unwrap();
    queue.enqueue(b"second").await.unwrap();

    queue.dequeue_with_ack().await.unwrap().unwrap();
    queue.enqueue(b"third").await.unwrap();

    let queue = registry.new_queue("tasks", QueueOptions::default()).await.unwrap();
    assert_eq!(
        queue.values().await.unwrap(),
        vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]
    );
}

#[tokio::test]
async fn claims_survive_process_restart_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queues.db");

    let token = {
        let registry = Registry::open(&path).await.unwrap();
        let queue = registry.new_queue("durable", QueueOptions::default()).await.unwrap();
        queue.enqueue(b"committed").await.unwrap();
        queue.enqueue(b"claimed").await.unwrap();
        queue.dequeue().await.unwrap().unwrap();
        let claimed = queue.dequeue_with_ack().await.unwrap().unwrap();
        assert_eq!(claimed.payload, b"claimed");
        registry.close().await;
        claimed.ack_token
    };

    let registry = Registry::open(&path).await.unwrap();
    let queue = registry.new_queue("durable", QueueOptions::default()).await.unwrap();
    assert_eq!(queue.len().await.unwrap(), 1);
    assert!(!queue.acknowledge(&token).await.unwrap());

    let claimed = queue.dequeue_with_ack().await.unwrap().unwrap();
    assert_eq!(claimed.payload, b"claimed");
    assert!(queue.acknowledge(&claimed.ack_token).await.unwrap());
    assert_eq!(queue.stats().await.unwrap().total(), 0);
    registry.close().await;
}

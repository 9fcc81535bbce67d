//! At most one read, send or delete is ever outstanding.

use super::harness::{fix, Harness, QueueOp};

#[tokio::test(start_paused = true)]
async fn busy_drain_never_overlaps_operations() {
    let h = Harness::new(true);
    for i in 1..=3 {
        h.queue.seed(fix(i as f64));
    }
    h.start();

    for i in 4..=13 {
        h.push(fix(i as f64));
        if i % 3 == 0 {
            h.set_online(false);
            h.set_online(true);
        }
    }

    h.wait_until("all delivered", |h| h.transport.delivered().len() == 13)
        .await;
    h.wait_idle().await;

    assert_eq!(h.tracker.max_concurrent(), 1);
    let expected: Vec<f64> = (1..=13).map(|i| i as f64).collect();
    assert_eq!(h.transport.delivered_latitudes(), expected);
    h.shutdown().await;
}

/// An online transition while a read is outstanding does not start a second one.
#[tokio::test(start_paused = true)]
async fn reachability_flap_during_read_issues_no_extra_read() {
    let h = Harness::new(true);
    let id = h.queue.seed(fix(1.0));
    h.queue.hold_reads();
    h.start();
    h.settle().await;

    h.set_online(false);
    h.set_online(true);
    h.settle().await;

    h.queue.open_reads();
    h.wait_idle().await;

    assert_eq!(
        h.queue.ops(),
        vec![
            QueueOp::Select(Some(id)),
            QueueOp::Delete(id),
            QueueOp::Select(None),
        ]
    );
    assert_eq!(h.tracker.max_concurrent(), 1);
    h.shutdown().await;
}

/// A persist that lands while a read is outstanding is not stranded.
#[tokio::test(start_paused = true)]
async fn fix_persisted_during_outstanding_read_is_delivered() {
    let h = Harness::new(true);
    h.queue.hold_reads();
    h.start();
    h.settle().await;

    h.push(fix(1.0));
    h.wait_until("fix persisted", |h| h.queue.len() == 1).await;

    h.queue.open_reads();
    h.wait_until("fix delivered", |h| h.transport.delivered().len() == 1)
        .await;
    h.wait_idle().await;

    assert_eq!(h.queue.len(), 0);
    assert_eq!(h.tracker.max_concurrent(), 1);
    h.shutdown().await;
}

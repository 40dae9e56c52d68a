use cloudfs_adapter::events::{
    Acknowledgment, AggregatedSource, AggregatingEventLogClient, DispatchingEventLogClient,
    EventLogBatch, EventLogClient, EventLogEntry, LoggingEventLogClient,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::common::ScriptedEventSource;

fn collector() -> (Arc<Mutex<Vec<EventLogBatch>>>, Arc<dyn Fn(EventLogBatch) + Send + Sync>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    (
        received,
        Arc::new(move |batch: EventLogBatch| sink.lock().push(batch)),
    )
}

fn counting_ack() -> (Arc<AtomicUsize>, Acknowledgment) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    (
        count,
        Acknowledgment::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    )
}

#[tokio::test]
async fn dispatching_splits_batches_and_acknowledges_once() {
    let source = ScriptedEventSource::new(Duration::ZERO);
    let dispatching = DispatchingEventLogClient::new(source.clone());

    let (first, first_handler) = collector();
    let (second, second_handler) = collector();
    let _a = dispatching.subscribe(first_handler);
    let _b = dispatching.subscribe(second_handler);

    let (acks, ack) = counting_ack();
    source.queued.lock().push(EventLogBatch::new(
        vec![
            EventLogEntry::Created("/a".into()),
            EventLogEntry::Deleted("/b".into()),
        ],
        Some(ack),
    ));
    dispatching.get_events().await.unwrap();

    for received in [&first, &second] {
        let batches = received.lock();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].entries.len(), 2);
        assert!(batches[0].acknowledgment.is_none());
        assert!(batches[1].entries.is_empty());
        assert!(batches[1].acknowledgment.is_some());
    }

    for received in [&first, &second] {
        for batch in received.lock().iter() {
            batch.acknowledge();
            batch.acknowledge();
        }
    }
    assert_eq!(acks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn overlapping_pulls_are_coalesced() {
    let source = ScriptedEventSource::new(Duration::from_millis(50));
    let dispatching = Arc::new(DispatchingEventLogClient::new(source.clone()));

    let pulls: Vec<_> = (0..5)
        .map(|_| {
            let dispatching = dispatching.clone();
            tokio::spawn(async move { dispatching.get_events().await })
        })
        .collect();
    for pull in pulls {
        pull.await.unwrap().unwrap();
    }
    assert_eq!(source.pulls.load(Ordering::SeqCst), 1);

    dispatching.get_events().await.unwrap();
    assert_eq!(source.pulls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn aggregating_subscribes_lazily_and_tags_batches() {
    let left = ScriptedEventSource::new(Duration::ZERO);
    let right = ScriptedEventSource::new(Duration::ZERO);
    let aggregating = AggregatingEventLogClient::new(vec![
        AggregatedSource {
            scope: 1,
            volume_id: 10,
            client: left.clone(),
        },
        AggregatedSource {
            scope: 2,
            volume_id: 20,
            client: right.clone(),
        },
    ]);
    assert_eq!(left.subscriber_count(), 0);
    assert!(!aggregating.is_attached());

    let (received, handler) = collector();
    let first = aggregating.subscribe(handler.clone());
    let second = aggregating.subscribe(handler);
    assert_eq!(left.subscribe_calls.load(Ordering::SeqCst), 1);
    assert_eq!(right.subscriber_count(), 1);

    right.queued.lock().push(EventLogBatch::new(
        vec![EventLogEntry::Changed("/r".into())],
        None,
    ));
    aggregating.enable().unwrap();
    aggregating.get_events().await.unwrap();
    assert_eq!(left.enabled.load(Ordering::SeqCst), 1);

    {
        let batches = received.lock();
        assert_eq!(batches.len(), 2, "one delivery per subscriber");
        for batch in batches.iter() {
            assert_eq!(batch.scope, Some(2));
            assert_eq!(batch.volume_id, Some(20));
        }
    }

    drop(first);
    assert_eq!(left.subscriber_count(), 1);
    drop(second);
    assert_eq!(left.subscriber_count(), 0);
    assert_eq!(right.subscriber_count(), 0);
    assert!(!aggregating.is_attached());
}

#[tokio::test]
async fn full_stack_delivers_single_fire_acknowledgment() {
    let source = ScriptedEventSource::new(Duration::ZERO);
    let aggregating = Arc::new(AggregatingEventLogClient::new(vec![AggregatedSource {
        scope: 7,
        volume_id: 3,
        client: source.clone(),
    }]));
    let pipeline = LoggingEventLogClient::new(Arc::new(DispatchingEventLogClient::new(
        aggregating.clone(),
    )));

    let (received, handler) = collector();
    let subscription = pipeline.subscribe(handler);
    assert!(aggregating.is_attached());

    let (acks, ack) = counting_ack();
    source.queued.lock().push(EventLogBatch::new(
        vec![
            EventLogEntry::Moved {
                from: "/a".into(),
                to: "/b".into(),
            },
            EventLogEntry::Skipped {
                path: "/c".into(),
                reason: "unclassified event".into(),
            },
            EventLogEntry::Error("lost events".into()),
        ],
        Some(ack),
    ));
    pipeline.get_events().await.unwrap();

    let batches = received.lock().clone();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].scope, Some(7));
    assert_eq!(batches[0].entries.len(), 3);
    batches[1].acknowledge();
    batches[1].clone().acknowledge();
    assert_eq!(acks.load(Ordering::SeqCst), 1);

    drop(subscription);
    assert!(!aggregating.is_attached());
    assert_eq!(source.subscriber_count(), 0);
}

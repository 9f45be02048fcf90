use std::time::Duration;

use tempfile::tempdir;
use tokio::time::timeout;

use super::group::ConsumerGroup;
use super::topic::Topic;
use super::{Broker, BrokerError, DeliveryRecord, LogBroker, OffsetReset, Subscription};
use crate::persistence::{Persistence, Retention};

const WAIT: Duration = Duration::from_secs(2);

fn key_for_partition(partitions: u32, target: u32) -> String {
    let topic = Topic::new(partitions);
    (0..)
        .map(|i| format!("key-{i}"))
        .find(|key| topic.partition_for(key) == target)
        .unwrap()
}

async fn next_record(sub: &mut Box<dyn Subscription>) -> DeliveryRecord {
    timeout(WAIT, sub.next())
        .await
        .expect("timed out waiting for a delivery")
        .expect("subscription error")
}

#[test]
fn test_topic_new() {
    let topic = Topic::new(3);
    assert_eq!(topic.partitions, 3);
    assert!(topic.groups.is_empty());
}

#[test]
fn test_partition_for_is_stable_and_in_range() {
    let topic = Topic::new(4);
    for i in 0..100 {
        let key = format!("k{i}");
        let partition = topic.partition_for(&key);
        assert!(partition < 4);
        assert_eq!(partition, topic.partition_for(&key));
    }
}

#[test]
fn test_group_round_robin_assignment() {
    let mut group = ConsumerGroup::default();
    assert_eq!(group.join(10), 1);
    assert_eq!(group.assignment(10, 4), vec![0, 1, 2, 3]);

    assert_eq!(group.join(20), 2);
    assert_eq!(group.assignment(10, 4), vec![0, 2]);
    assert_eq!(group.assignment(20, 4), vec![1, 3]);
    assert_eq!(group.owner_of(3), Some(20));

    assert!(group.leave(10));
    assert!(!group.leave(10));
    assert_eq!(group.generation(), 3);
    assert_eq!(group.assignment(20, 4), vec![0, 1, 2, 3]);
    assert!(group.assignment(10, 4).is_empty());
}

#[test]
fn test_group_join_twice_is_noop() {
    let mut group = ConsumerGroup::default();
    group.join(1);
    assert_eq!(group.join(1), 1);
    assert_eq!(group.members(), &[1]);
}

#[tokio::test]
async fn test_publish_assigns_contiguous_offsets_per_partition() {
    let broker = LogBroker::in_memory(3).unwrap();

    let first = broker.publish("orders", "same", b"a".to_vec()).await.unwrap();
    let second = broker.publish("orders", "same", b"b".to_vec()).await.unwrap();

    assert_eq!(first.topic, "orders");
    assert_eq!(first.partition, second.partition);
    assert_eq!(first.offset, 0);
    assert_eq!(second.offset, 1);
    assert_eq!(broker.partitions("orders").unwrap(), Some(3));
}

#[tokio::test]
async fn test_create_topic_keeps_existing_partition_count() {
    let broker = LogBroker::in_memory(1).unwrap();
    assert_eq!(broker.create_topic("t", 4).unwrap(), 4);
    assert_eq!(broker.create_topic("t", 9).unwrap(), 4);
}

#[tokio::test]
async fn test_invalid_names_are_rejected() {
    let broker = LogBroker::in_memory(1).unwrap();

    let err = broker.publish("bad/topic", "k", vec![]).await.unwrap_err();
    assert!(matches!(err, BrokerError::InvalidName { kind: "topic", .. }));

    let err = broker.subscribe("fine", "").await.err().unwrap();
    assert!(matches!(err, BrokerError::InvalidName { kind: "group", .. }));

    let err = broker.create_topic("empty", 0).unwrap_err();
    assert!(matches!(err, BrokerError::NoPartitions(_)));
}

#[tokio::test]
async fn test_same_key_is_delivered_in_append_order() {
    let broker = LogBroker::in_memory(4).unwrap();
    for i in 0..10 {
        broker
            .publish("ordered", "one-key", format!("{i}").into_bytes())
            .await
            .unwrap();
    }

    let mut sub = broker.subscribe("ordered", "g").await.unwrap();
    let mut seen = Vec::new();
    for _ in 0..10 {
        let record = next_record(&mut sub).await;
        seen.push((record.offset, String::from_utf8(record.value).unwrap()));
    }

    let expected: Vec<_> = (0..10).map(|i| (i as u64, i.to_string())).collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_each_group_gets_every_record() {
    let broker = LogBroker::in_memory(2).unwrap();
    for i in 0..6 {
        broker
            .publish("fanout", &format!("k{i}"), vec![i])
            .await
            .unwrap();
    }

    let mut a = broker.subscribe("fanout", "group-a").await.unwrap();
    let mut b = broker.subscribe("fanout", "group-b").await.unwrap();

    let mut from_a = Vec::new();
    let mut from_b = Vec::new();
    for _ in 0..6 {
        from_a.push(next_record(&mut a).await.value[0]);
        from_b.push(next_record(&mut b).await.value[0]);
    }
    from_a.sort();
    from_b.sort();
    assert_eq!(from_a, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(from_b, from_a);
}

#[tokio::test]
async fn test_next_commits_previous_record() {
    let broker = LogBroker::in_memory(1).unwrap();
    broker.publish("c", "k", b"0".to_vec()).await.unwrap();
    broker.publish("c", "k", b"1".to_vec()).await.unwrap();

    let mut sub = broker.subscribe("c", "g").await.unwrap();
    assert_eq!(next_record(&mut sub).await.offset, 0);
    assert_eq!(broker.committed("c", "g", 0).unwrap(), None);

    assert_eq!(next_record(&mut sub).await.offset, 1);
    assert_eq!(broker.committed("c", "g", 0).unwrap(), Some(1));

    sub.close();
    assert_eq!(broker.committed("c", "g", 0).unwrap(), Some(2));
    assert_eq!(broker.group_size("c", "g"), 0);
}

#[tokio::test]
async fn test_dropped_subscription_redelivers_uncommitted_record() {
    let broker = LogBroker::in_memory(1).unwrap();
    broker.publish("r", "k", b"only".to_vec()).await.unwrap();

    let mut first = broker.subscribe("r", "g").await.unwrap();
    let delivered = next_record(&mut first).await;
    drop(first);

    let mut second = broker.subscribe("r", "g").await.unwrap();
    let again = next_record(&mut second).await;
    assert_eq!(again.offset, delivered.offset);
    assert_eq!(again.value, b"only");
}

#[tokio::test]
async fn test_members_of_one_group_split_partitions() {
    let broker = LogBroker::in_memory(2).unwrap();
    let key0 = key_for_partition(2, 0);
    let key1 = key_for_partition(2, 1);

    let mut first = broker.subscribe("split", "g").await.unwrap();
    let mut second = broker.subscribe("split", "g").await.unwrap();
    assert_eq!(broker.group_size("split", "g"), 2);

    broker.publish("split", &key0, b"p0".to_vec()).await.unwrap();
    broker.publish("split", &key1, b"p1".to_vec()).await.unwrap();

    let a = next_record(&mut first).await;
    let b = next_record(&mut second).await;
    assert_eq!((a.partition, a.value.as_slice()), (0, b"p0".as_slice()));
    assert_eq!((b.partition, b.value.as_slice()), (1, b"p1".as_slice()));

    // Nothing else is pending for either member.
    assert!(timeout(Duration::from_millis(100), first.next()).await.is_err());
}

#[tokio::test]
async fn test_waiting_member_is_woken_by_publish() {
    let broker = LogBroker::in_memory(1).unwrap();
    let mut sub = broker.subscribe("wake", "g").await.unwrap();

    let waiter = tokio::spawn(async move { timeout(WAIT, sub.next()).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    broker.publish("wake", "k", b"late".to_vec()).await.unwrap();

    let record = waiter.await.unwrap().expect("timed out").unwrap();
    assert_eq!(record.value, b"late");
}

#[tokio::test]
async fn test_latest_reset_skips_existing_records() {
    let store = Persistence::temporary(Retention::default()).unwrap();
    let broker = LogBroker::new(store, 1, OffsetReset::Latest);
    broker.publish("l", "k", b"old-0".to_vec()).await.unwrap();
    broker.publish("l", "k", b"old-1".to_vec()).await.unwrap();

    let mut sub = broker.subscribe("l", "fresh").await.unwrap();
    broker.publish("l", "k", b"new".to_vec()).await.unwrap();

    let record = next_record(&mut sub).await;
    assert_eq!(record.offset, 2);
    assert_eq!(record.value, b"new");
}

#[tokio::test]
async fn test_retention_moves_reader_to_earliest_retained() {
    let store = Persistence::temporary(Retention {
        ttl_seconds: None,
        max_records_per_partition: Some(2),
    })
    .unwrap();
    let broker = LogBroker::new(store, 1, OffsetReset::Earliest);
    for i in 0..5u8 {
        broker.publish("ret", "k", vec![i]).await.unwrap();
    }

    let mut sub = broker.subscribe("ret", "g").await.unwrap();
    let record = next_record(&mut sub).await;
    assert_eq!(record.offset, 3);
    assert_eq!(record.value, vec![3]);
}

#[tokio::test]
async fn test_group_resumes_after_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broker");

    {
        let store = Persistence::open(&path, Retention::default()).unwrap();
        let broker = LogBroker::new(store, 1, OffsetReset::Earliest);
        for i in 0..3u8 {
            broker.publish("replay", "k", vec![i]).await.unwrap();
        }
        let mut sub = broker.subscribe("replay", "g").await.unwrap();
        assert_eq!(next_record(&mut sub).await.offset, 0);
        assert_eq!(next_record(&mut sub).await.offset, 1);
        sub.close();
        broker.flush().await.unwrap();
    }

    let store = Persistence::open(&path, Retention::default()).unwrap();
    let broker = LogBroker::new(store, 1, OffsetReset::Earliest);
    let mut sub = broker.subscribe("replay", "g").await.unwrap();
    let record = next_record(&mut sub).await;
    assert_eq!(record.offset, 2);
    assert_eq!(record.value, vec![2]);
}

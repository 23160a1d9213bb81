mod testsupport;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use josef::mock::MockRecord;
use josef::prelude::*;
use std::result::Result;

const GROUP_ID: &str = "offset integration test";
const PARTITION_ID: i32 = 0;
const OFFSET: i64 = 42;
const MANUAL_STORE: [(&str, &str); 1] = [("enable.auto.offset.store", "false")];

#[tokio::test]
async fn it_can_commit_and_fetch_offsets() -> Result<(), Box<Error>> {
    let (cluster, topic) = testsupport::cluster_with_topic(1)?;
    let consumer = testsupport::string_consumer(&cluster, GROUP_ID, &[])?;
    let tp = TopicPartition::new(topic.as_str(), PARTITION_ID);

    let committed = consumer
        .committed_async(&[tp.clone()], testsupport::WAIT)
        .await?;
    assert_eq!(committed, vec![tp.with_offset(Offset::INVALID)]);

    let outcome = consumer
        .commit_offsets_async(vec![tp.with_offset(Offset::new(OFFSET))])
        .await?;
    assert_eq!(outcome, vec![tp.with_offset(Offset::new(OFFSET))]);

    let committed = consumer
        .committed_async(&[tp.clone(), tp.clone()], testsupport::WAIT)
        .await?;
    assert_eq!(committed, vec![tp.with_offset(Offset::new(OFFSET))]);
    Ok(())
}

#[tokio::test]
async fn it_commits_the_offset_after_a_stored_record() -> Result<(), Box<Error>> {
    let (cluster, topic) = testsupport::cluster_with_topic(1)?;
    testsupport::produce_values(&cluster, &topic, PARTITION_ID, 0..3)?;
    let tp = TopicPartition::new(topic.as_str(), PARTITION_ID);

    let mut consumer = testsupport::string_consumer(&cluster, GROUP_ID, &MANUAL_STORE)?;
    consumer.assign(&[tp.with_offset(Offset::BEGINNING)])?;

    assert!(matches!(
        consumer.commit_async().await,
        Err(Error::Kafka(err)) if err.code() == KafkaCode::LocalNoOffset
    ));

    testsupport::next_record(&mut consumer)?;
    let second = testsupport::next_record(&mut consumer)?;
    consumer.store_offset(&second)?;

    let outcome = consumer.commit_async().await?;
    assert_eq!(outcome, vec![tp.with_offset(Offset::new(2))]);
    assert_eq!(cluster.committed_offset(GROUP_ID, &tp), Some(Offset::new(2)));
    Ok(())
}

#[tokio::test]
async fn it_commits_a_single_result() -> Result<(), Box<Error>> {
    let (cluster, topic) = testsupport::cluster_with_topic(1)?;
    testsupport::produce_values(&cluster, &topic, PARTITION_ID, 0..1)?;
    let tp = TopicPartition::new(topic.as_str(), PARTITION_ID);

    let mut consumer = testsupport::string_consumer(
        &cluster,
        GROUP_ID,
        &[("enable.partition.eof", "true")],
    )?;
    consumer.assign(&[tp.with_offset(Offset::BEGINNING)])?;

    let record = consumer.consume(testsupport::WAIT)?;
    let eof = consumer.consume(testsupport::WAIT)?;
    assert!(eof.is_partition_eof());

    assert!(matches!(
        consumer.commit_result_async(&eof).await,
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(
        consumer.commit_result_async(&record).await?,
        tp.with_offset(Offset::new(1))
    );
    Ok(())
}

#[test]
fn it_rejects_explicit_stores_while_auto_storing() -> Result<(), Box<Error>> {
    let (cluster, topic) = testsupport::cluster_with_topic(1)?;
    testsupport::produce_values(&cluster, &topic, PARTITION_ID, 0..1)?;

    let mut consumer = testsupport::string_consumer(&cluster, GROUP_ID, &[])?;
    consumer.assign(&[TopicPartitionOffset::new(topic, PARTITION_ID, Offset::BEGINNING)])?;
    let record = testsupport::next_record(&mut consumer)?;

    assert!(matches!(
        consumer.store_offset(&record),
        Err(Error::InvalidState(_))
    ));
    Ok(())
}

#[test]
fn it_reports_every_partition_when_a_store_fails() -> Result<(), Box<Error>> {
    let (cluster, topic) = testsupport::cluster_with_topic(2)?;
    let mut consumer = testsupport::string_consumer(&cluster, GROUP_ID, &MANUAL_STORE)?;
    consumer.assign(&[TopicPartitionOffset::new(topic.as_str(), 0, Offset::END)])?;

    let err = consumer
        .store_offsets(&[
            TopicPartitionOffset::new(topic.as_str(), 0, 5),
            TopicPartitionOffset::new(topic.as_str(), 1, 5),
            TopicPartitionOffset::new(topic.as_str(), 0, Offset::END),
        ])
        .unwrap_err();

    match err {
        Error::TopicPartitionOffsetErrors(outcomes) => {
            assert_eq!(outcomes.len(), 2);
            assert_eq!(outcomes[0].error.code(), KafkaCode::LocalInvalidArg);
            assert_eq!(outcomes[1].error.code(), KafkaCode::LocalUnknownPartition);
        }
        other => panic!("unexpected {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn it_fails_the_whole_commit_when_one_topic_is_denied() -> Result<(), Box<Error>> {
    let (cluster, topic) = testsupport::cluster_with_topic(2)?;
    let denied = format!("{topic}-denied");
    cluster.create_topic(&denied, 1)?;
    cluster.deny_topic(&denied);

    let consumer = testsupport::string_consumer(&cluster, GROUP_ID, &[])?;
    let err = consumer
        .commit_offsets_async(vec![
            TopicPartitionOffset::new(topic.as_str(), 0, 10),
            TopicPartitionOffset::new(denied.as_str(), 0, 10),
            TopicPartitionOffset::new(topic.as_str(), 1, 10),
        ])
        .await
        .unwrap_err();

    match err {
        Error::TopicPartitionOffsetErrors(outcomes) => {
            let codes: Vec<KafkaCode> = outcomes.iter().map(|o| o.error.code()).collect();
            assert_eq!(
                codes,
                vec![
                    KafkaCode::None,
                    KafkaCode::TopicAuthorizationFailed,
                    KafkaCode::None
                ]
            );
            assert_eq!(outcomes[1].topic, denied);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(
        cluster.committed_offset(GROUP_ID, &TopicPartition::new(topic.as_str(), 1)),
        Some(Offset::new(10))
    );
    Ok(())
}

#[test]
fn it_auto_commits_stored_offsets_and_notifies_observers() -> Result<(), Box<Error>> {
    let (cluster, topic) = testsupport::cluster_with_topic(1)?;
    testsupport::produce_values(&cluster, &topic, PARTITION_ID, 0..2)?;
    let tp = TopicPartition::new(topic.as_str(), PARTITION_ID);

    let commits = Arc::new(Mutex::new(vec![]));
    let mut consumer = testsupport::string_consumer(
        &cluster,
        GROUP_ID,
        &[("auto.commit.interval.ms", "10")],
    )?;
    consumer.on_offsets_committed({
        let commits = commits.clone();
        move |committed| commits.lock().unwrap().push(committed.clone())
    });
    consumer.subscribe(&[topic.clone()])?;

    testsupport::next_record(&mut consumer)?;
    testsupport::next_record(&mut consumer)?;
    std::thread::sleep(Duration::from_millis(20));
    consumer.consume(Duration::from_millis(50))?;

    assert_eq!(cluster.committed_offset(GROUP_ID, &tp), Some(Offset::new(2)));
    let commits = commits.lock().unwrap();
    let last = commits.last().expect("a commit notification");
    assert!(!last.error.is_error());
    assert_eq!(last.offsets[0].offset, Offset::new(2));
    Ok(())
}

#[tokio::test]
async fn it_can_look_up_offsets_by_time() -> Result<(), Box<Error>> {
    let (cluster, topic) = testsupport::cluster_with_topic(1)?;
    for ts in [1_000, 2_000, 3_000] {
        cluster.produce(
            &topic,
            PARTITION_ID,
            MockRecord::new()
                .value("v")
                .timestamp(Timestamp::new(ts, TimestampType::CreateTime)),
        )?;
    }

    let consumer = testsupport::string_consumer(&cluster, GROUP_ID, &[])?;
    let offsets = consumer
        .offsets_for_times_async(
            &[TopicPartitionTimestamp::new(topic.as_str(), PARTITION_ID, 1_500)],
            testsupport::WAIT,
        )
        .await?;

    assert_eq!(
        offsets,
        vec![TopicPartitionOffset::new(topic.as_str(), PARTITION_ID, 1)]
    );

    let late = consumer
        .offsets_for_times_async(
            &[TopicPartitionTimestamp::new(topic.as_str(), PARTITION_ID, 9_000)],
            testsupport::WAIT,
        )
        .await?;
    assert_eq!(
        late,
        vec![TopicPartitionOffset::new(topic, PARTITION_ID, Offset::INVALID)]
    );
    Ok(())
}

#[tokio::test]
async fn it_resumes_after_a_committed_record_when_reopened() -> Result<(), Box<Error>> {
    let (cluster, topic) = testsupport::cluster_with_topic(1)?;
    testsupport::produce_values(&cluster, &topic, PARTITION_ID, 0..3)?;
    let tp = TopicPartition::new(topic.as_str(), PARTITION_ID);

    let mut consumer = testsupport::string_consumer(&cluster, GROUP_ID, &MANUAL_STORE)?;
    consumer.assign(&[tp.with_offset(Offset::BEGINNING)])?;
    let record = testsupport::next_record(&mut consumer)?;
    consumer.store_offset(&record)?;
    consumer.commit_result_async(&record).await?;
    consumer.close()?;

    let mut reopened = testsupport::string_consumer(&cluster, GROUP_ID, &MANUAL_STORE)?;
    reopened.assign_partitions(&[tp.clone()])?;
    let next = testsupport::next_record(&mut reopened)?;

    assert_eq!(next.offset(), Offset::new(1));
    assert_eq!(testsupport::value_of(&next), "value-1");
    Ok(())
}

#[test]
fn it_reports_one_position_per_distinct_partition() -> Result<(), Box<Error>> {
    let (cluster, topic) = testsupport::cluster_with_topic(2)?;
    let mut consumer = testsupport::string_consumer(&cluster, GROUP_ID, &[])?;
    consumer.assign(&[
        TopicPartitionOffset::new(topic.as_str(), 1, 7),
        TopicPartitionOffset::new(topic.as_str(), 0, Offset::END),
    ])?;

    let positions = consumer.position(&[
        TopicPartition::new(topic.as_str(), 1),
        TopicPartition::new(topic.as_str(), 0),
        TopicPartition::new(topic.as_str(), 1),
    ])?;

    assert_eq!(
        positions,
        vec![
            TopicPartitionOffset::new(topic.as_str(), 1, 7),
            TopicPartitionOffset::new(topic.as_str(), 0, Offset::INVALID),
        ]
    );
    Ok(())
}

mod testsupport;

use josef::mock::MockRecord;
use josef::prelude::*;
use std::result::Result;

const GROUP_ID: &str = "headers integration test";

#[test]
fn it_keeps_duplicate_and_empty_headers_in_order() -> Result<(), Box<Error>> {
    let (cluster, topic) = testsupport::cluster_with_topic(1)?;
    let mut headers = Headers::new();
    headers.add("a", vec![111u8]);
    headers.add("b", vec![112u8]);
    headers.add("a", vec![113u8]);
    headers.add("empty", Vec::<u8>::new());
    cluster.produce(&topic, 0, MockRecord::new().value("v").headers(headers.clone()))?;

    let mut consumer = testsupport::string_consumer(&cluster, GROUP_ID, &[])?;
    consumer.assign(&[TopicPartitionOffset::new(topic, 0, Offset::BEGINNING)])?;
    let result = testsupport::next_record(&mut consumer)?;

    let received = result.headers().expect("headers are marshaled by default");
    assert_eq!(received, &headers);
    assert_eq!(received.len(), 4);
    assert_eq!(received.last("a"), Some(&[113u8][..]));
    assert_eq!(received.last("empty"), Some(&[][..]));
    let keys: Vec<&str> = received.iter().map(Header::key).collect();
    assert_eq!(keys, vec!["a", "b", "a", "empty"]);
    Ok(())
}

#[test]
fn it_leaves_out_fields_that_are_not_marshaled() -> Result<(), Box<Error>> {
    let (cluster, topic) = testsupport::cluster_with_topic(1)?;
    cluster.produce(
        &topic,
        0,
        MockRecord::new()
            .value("v")
            .header("trace", "1")
            .timestamp(Timestamp::new(1_234, TimestampType::CreateTime)),
    )?;

    let mut consumer = testsupport::string_consumer(
        &cluster,
        GROUP_ID,
        &[("consume.result.fields", "topic, timestamp")],
    )?;
    consumer.assign(&[TopicPartitionOffset::new(topic.as_str(), 0, Offset::BEGINNING)])?;
    let result = testsupport::next_record(&mut consumer)?;

    assert_eq!(result.topic(), topic);
    assert!(result.headers().is_none());
    assert_eq!(
        result.timestamp(),
        Some(Timestamp::new(1_234, TimestampType::CreateTime))
    );
    assert_eq!(testsupport::value_of(&result), "v");
    Ok(())
}

#[test]
fn it_rejects_unknown_result_fields() -> Result<(), Box<Error>> {
    let (cluster, _topic) = testsupport::cluster_with_topic(1)?;

    let err = testsupport::string_consumer(
        &cluster,
        GROUP_ID,
        &[("consume.result.fields", "topic,offsetz")],
    )
    .unwrap_err();

    assert!(matches!(err, Error::Config(_)));
    Ok(())
}

use std::panic::Location;
use std::time::Duration;

use josef::mock::{MockCluster, MockRecord};
use josef::prelude::{
    ClientConfig, Consumer, ConsumeResult, ConsumerBuilder, Error, StringDeserializer,
};

#[allow(dead_code)]
pub const WAIT: Duration = Duration::from_secs(2);

pub type StringConsumer = Consumer<Option<String>, Option<String>>;

/// A fresh cluster with one topic named after the calling test file.
#[track_caller]
pub fn cluster_with_topic(partitions: i32) -> Result<(MockCluster, String), Error> {
    let topic = create_topic_from_file_path(Location::caller().file());
    let cluster = MockCluster::new();
    cluster.create_topic(&topic, partitions)?;
    Ok((cluster, topic))
}

pub fn create_topic_from_file_path(caller_path: &str) -> String {
    let file_name = std::path::Path::new(caller_path)
        .file_stem() // using `file_stem` to remove any extension
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("test");

    format!("{file_name}-integration")
}

pub fn config(group_id: &str, extra: &[(&str, &str)]) -> ClientConfig {
    let mut config: ClientConfig = [
        ("group.id", group_id),
        ("bootstrap.servers", "mock"),
        ("auto.offset.reset", "earliest"),
    ]
    .into_iter()
    .collect();
    for (key, value) in extra {
        config.set(*key, *value);
    }
    config
}

#[allow(dead_code)]
pub fn string_consumer(
    cluster: &MockCluster,
    group_id: &str,
    extra: &[(&str, &str)],
) -> Result<StringConsumer, Error> {
    ConsumerBuilder::new(config(group_id, extra))
        .key_deserializer(StringDeserializer::new())
        .value_deserializer(StringDeserializer::new())
        .build(cluster)
}

/// Produce `key-i` / `value-i` for `i` in `range`.
#[allow(dead_code)]
pub fn produce_values(
    cluster: &MockCluster,
    topic: &str,
    partition: i32,
    range: std::ops::Range<usize>,
) -> Result<(), Error> {
    for i in range {
        cluster.produce(
            topic,
            partition,
            MockRecord::new()
                .key(format!("key-{i}"))
                .value(format!("value-{i}")),
        )?;
    }
    Ok(())
}

/// Consume until a record arrives, skipping EOF markers.
#[allow(dead_code)]
pub fn next_record(
    consumer: &mut StringConsumer,
) -> Result<ConsumeResult<Option<String>, Option<String>>, Error> {
    let deadline = std::time::Instant::now() + WAIT;
    loop {
        let result = consumer.consume(Duration::from_millis(50))?;
        if result.message().is_some() {
            return Ok(result);
        }
        if std::time::Instant::now() >= deadline {
            panic!("no record arrived within {:?}", WAIT);
        }
    }
}

#[allow(dead_code)]
pub fn value_of(result: &ConsumeResult<Option<String>, Option<String>>) -> String {
    result
        .value()
        .cloned()
        .flatten()
        .unwrap_or_default()
}

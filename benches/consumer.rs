use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::{criterion_group, criterion_main};
use futures::stream::StreamExt;
use josef::mock::{MockCluster, MockRecord};
use josef::prelude::*;
use random_word::Lang;

const TOPIC: &str = "benchmark";
const PARTITIONS: i32 = 4;

fn cluster_with_records(size: usize) -> MockCluster {
    let cluster = MockCluster::new();
    cluster.create_topic(TOPIC, PARTITIONS).unwrap();
    for i in 0..size {
        let word = random_word::gen(Lang::En);
        cluster
            .produce(
                TOPIC,
                i as i32 % PARTITIONS,
                MockRecord::new().key(word).value(format!("{word}-{i}")),
            )
            .unwrap();
    }
    cluster
}

fn consumer(cluster: &MockCluster, group_id: &str) -> Consumer<Option<String>, Option<String>> {
    let config: ClientConfig = [
        ("group.id", group_id),
        ("auto.offset.reset", "earliest"),
        ("enable.auto.commit", "false"),
    ]
    .into_iter()
    .collect();

    ConsumerBuilder::new(config)
        .key_deserializer(StringDeserializer::new())
        .value_deserializer(StringDeserializer::new())
        .build(cluster)
        .map_err(|err| tracing::error!("{:?}", err))
        .unwrap()
}

fn assign_all(consumer: &mut Consumer<Option<String>, Option<String>>) {
    let partitions: Vec<TopicPartitionOffset> = (0..PARTITIONS)
        .map(|partition| TopicPartitionOffset::new(TOPIC, partition, Offset::BEGINNING))
        .collect();
    consumer.assign(&partitions).unwrap();
}

fn consume_blocking(cluster: &MockCluster, size: usize) {
    let mut consumer = consumer(cluster, "blocking");
    assign_all(&mut consumer);

    let mut count = 0;
    while count < size {
        let result = consumer
            .consume(std::time::Duration::from_secs(1))
            .unwrap();
        if result.message().is_some() {
            count += 1;
        }
    }
}

async fn consume_stream(cluster: MockCluster, size: usize) {
    let mut consumer = consumer(&cluster, "stream");
    assign_all(&mut consumer);

    let stream = consumer.into_stream();
    let mut count = 0;
    tokio::pin!(stream);
    while let Some(result) = stream.next().await {
        if result.unwrap().message().is_some() {
            count += 1;
        }
        if count == size {
            break;
        }
    }
}

fn from_elem(c: &mut Criterion) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();

    let size: usize = 10_000;
    let cluster = cluster_with_records(size);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();

    c.bench_with_input(
        BenchmarkId::new("consume_blocking", size),
        &size,
        |b, &s| b.iter(|| consume_blocking(&cluster, s)),
    );

    c.bench_with_input(
        BenchmarkId::new("consume_stream", size),
        &size,
        |b, &s| {
            // Insert a call to `to_async` to convert the bencher to async mode.
            b.to_async(&runtime)
                .iter(|| consume_stream(cluster.clone(), s));
        },
    );
}

criterion_group!(benches, from_elem);
criterion_main!(benches);

use tracing::instrument;

use crate::{
    config::{ClientConfig, ConsumerConfig},
    consumer::Consumer,
    deserializer::{Decoder, Deserializer},
    error::{Error, KafkaError, Result},
    membership::Membership,
    message::{CommittedOffsets, LogMessage},
    observers::Observers,
    topic_partition::TopicPartition,
    transport::Connect,
};

/// Configure a [`Consumer`].
///
/// Both a key and a value decoder are required. At [`build`] time the
/// configuration is offered to the key deserializer, then to the value
/// deserializer; only keys neither of them consumed reach the transport.
///
/// [`build`]: ConsumerBuilder::build
pub struct ConsumerBuilder<K, V> {
    config: ClientConfig,
    key_decoder: Option<Decoder<K>>,
    value_decoder: Option<Decoder<V>>,
    observers: Observers,
}

impl<K, V> ConsumerBuilder<K, V> {
    /// Start a consumer builder. To complete, use the [`build`] method.
    ///
    /// [`build`]: ConsumerBuilder::build
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            key_decoder: None,
            value_decoder: None,
            observers: Observers::default(),
        }
    }

    /// Set a single configuration property.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.set(key, value);
        self
    }

    pub fn key_deserializer(mut self, deserializer: impl Deserializer<K> + 'static) -> Self {
        self.key_decoder = Some(Decoder::typed(deserializer));
        self
    }

    /// Use a marker decoder, e.g. [`Decoder::Ignore`], for keys.
    pub fn key_decoder(mut self, decoder: Decoder<K>) -> Self {
        self.key_decoder = Some(decoder);
        self
    }

    pub fn value_deserializer(mut self, deserializer: impl Deserializer<V> + 'static) -> Self {
        self.value_decoder = Some(Decoder::typed(deserializer));
        self
    }

    pub fn value_decoder(mut self, decoder: Decoder<V>) -> Self {
        self.value_decoder = Some(decoder);
        self
    }

    pub fn on_partitions_assigned(
        mut self,
        handler: impl FnMut(&mut Membership, &[TopicPartition]) + Send + 'static,
    ) -> Self {
        self.observers.assigned.push(Box::new(handler));
        self
    }

    pub fn on_partitions_revoked(
        mut self,
        handler: impl FnMut(&mut Membership, &[TopicPartition]) + Send + 'static,
    ) -> Self {
        self.observers.revoked.push(Box::new(handler));
        self
    }

    pub fn on_offsets_committed(
        mut self,
        handler: impl FnMut(&CommittedOffsets) + Send + 'static,
    ) -> Self {
        self.observers.committed.push(Box::new(handler));
        self
    }

    pub fn on_error(mut self, handler: impl FnMut(&KafkaError) + Send + 'static) -> Self {
        self.observers.error.push(Box::new(handler));
        self
    }

    pub fn on_statistics(mut self, handler: impl FnMut(&str) + Send + 'static) -> Self {
        self.observers.statistics.push(Box::new(handler));
        self
    }

    pub fn on_log(mut self, handler: impl FnMut(&LogMessage) + Send + 'static) -> Self {
        self.observers.log.push(Box::new(handler));
        self
    }

    /// Validate the configuration and connect.
    #[instrument(level = "debug", skip(self, connector))]
    pub fn build<C: Connect + ?Sized>(self, connector: &C) -> Result<Consumer<K, V>> {
        let mut key_decoder = self
            .key_decoder
            .ok_or_else(|| Error::Config("a key deserializer must be specified".to_owned()))?;
        let mut value_decoder = self
            .value_decoder
            .ok_or_else(|| Error::Config("a value deserializer must be specified".to_owned()))?;

        let after_key = key_decoder.configure(self.config.clone(), true)?;
        let after_value = value_decoder.configure(self.config.clone(), false)?;
        let remaining = self.config.intersect(&after_key).intersect(&after_value);

        let (consumer_config, transport_config) = ConsumerConfig::split(remaining)?;
        let transport = connector.connect(&transport_config)?;
        tracing::info!(
            "Consumer {} connected for group {}",
            transport.name(),
            consumer_config.group_id
        );

        Ok(Consumer::new(
            consumer_config,
            transport,
            key_decoder,
            value_decoder,
            self.observers,
        ))
    }
}

use crate::{config::Config, record::Record, Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::info;

/// How long a submission waits before retrying when the client queue is full.
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(5);

/// Resolves exactly once, when the broker acknowledges or permanently fails
/// a submitted record.
pub type Delivery = BoxFuture<'static, Result<()>>;

/// A broker client that accepts records from many workers at once.
///
/// Batching, compression and retries belong to the implementation. The
/// workers only see two events per record: acceptance into the client's
/// buffer (`submit` resolving) and the final outcome (the returned
/// [`Delivery`] resolving). Deliveries may resolve in any order.
pub trait ProducerClient: Send + Sync {
    /// Hands `record` to the client.
    ///
    /// Resolves as soon as the client has taken ownership of the record and
    /// stays pending while the client's buffer is full. An error here means
    /// the record was never accepted.
    fn submit(&self, record: Record) -> BoxFuture<'_, Result<Delivery>>;
}

/// [`ProducerClient`] backed by an rdkafka [`FutureProducer`].
pub struct KafkaProducer {
    producer: FutureProducer,
    topic: String,
}

impl KafkaProducer {
    pub fn new(config: &Config) -> Result<Self> {
        Self::from_client_config(&config.client_config(), &config.topic)
    }

    pub fn from_client_config(client: &ClientConfig, topic: &str) -> Result<Self> {
        let producer: FutureProducer = client.create().map_err(Error::Kafka)?;

        info!(
            topic = %topic,
            brokers = client.get("bootstrap.servers").unwrap_or_default(),
            "Kafka producer created"
        );

        Ok(Self {
            producer,
            topic: topic.to_string(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl ProducerClient for KafkaProducer {
    fn submit(&self, record: Record) -> BoxFuture<'_, Result<Delivery>> {
        async move {
            loop {
                let kafka_record =
                    FutureRecord::<(), [u8]>::to(&self.topic).payload(&record.payload[..]);

                match self.producer.send_result(kafka_record) {
                    Ok(delivery) => {
                        let delivery: Delivery = async move {
                            match delivery.await {
                                Ok(Ok(_)) => Ok(()),
                                Ok(Err((e, _))) => Err(Error::Kafka(e)),
                                Err(_) => Err(Error::Kafka(KafkaError::Canceled)),
                            }
                        }
                        .boxed();
                        return Ok(delivery);
                    }
                    Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), _)) => {}
                    Err((e, _)) => return Err(Error::Kafka(e)),
                }

                tokio::time::sleep(QUEUE_FULL_BACKOFF).await;
            }
        }
        .boxed()
    }
}

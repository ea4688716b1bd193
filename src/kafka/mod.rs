pub mod memory;
pub mod producer;


pub use memory::MemoryProducer;
pub use producer::{Delivery, KafkaProducer, ProducerClient};

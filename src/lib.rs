pub mod model;
pub mod masking;
pub mod fingerprint;
pub mod rules;
pub mod classifier;
pub mod boundary;
pub mod store;
pub mod aggregation;
pub mod learner;
pub mod enrichment;
pub mod filter;
pub mod scheduler;
pub mod workers;
pub mod ingest;
pub mod monitor;
pub mod engine;
pub mod config;
pub mod telemetry;

pub use boundary::Channel;
pub use classifier::Classifier;
pub use config::EngineConfig;
pub use engine::Engine;
pub use model::{Category, DiagnosticRecord, Severity, Status};
pub use store::{MemoryStore, RecordStore};

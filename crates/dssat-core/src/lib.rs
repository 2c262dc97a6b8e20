pub mod batch;
pub mod codec;
pub mod collaborator;
pub mod config;
pub mod domain;
pub mod experiment;
pub mod genotype;
pub mod lock;
pub mod orchestrator;
pub mod serialization;
pub mod summary;

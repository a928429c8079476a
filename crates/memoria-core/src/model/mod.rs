//! Domain model: the entities persisted and manipulated by the reliability engine.

pub mod entity;
pub mod episode;
pub mod job;
pub mod memory;
pub mod pending_edge;

pub use entity::Entity;
pub use episode::Episode;
pub use job::{JobStatus, ReflectionJob, StageName, StageResult, StageStatus};
pub use memory::{
    Contradiction, ContradictionType, EdgeType, GraphEdge, Layer, MemoryRecord, MemoryType,
    MemoryValidationError, RememberOptions, ResolutionStatus, Severity,
};
pub use pending_edge::PendingEdge;

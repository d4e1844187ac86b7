//! Repository contracts the core consumes at its external boundary, plus
//! in-memory reference implementations and a Unit of Work that batches a
//! turn's writes into one transaction.

pub mod memory;
pub mod revert;
pub mod traits;
pub mod uow;

pub use memory::{
    InMemoryMemoryRepository, InMemoryMessageRepository, InMemoryPartRepository, InMemorySessionRepository, InMemoryToolExecutionRepository,
    RepoBackedTracker,
};
pub use revert::revert_to;
pub use traits::{MemoryRecord, MemoryRepository, MessageRepository, PartRepository, SessionRepository, ToolExecutionRecord, ToolExecutionRepository};
pub use uow::{UnitOfWork, UnitOfWorkImpl, Uow};

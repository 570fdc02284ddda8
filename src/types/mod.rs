//! Domain types persisted by the storage layer.

pub mod agent;
pub mod environment;
pub mod goal;
pub mod log;
pub mod memory;
pub mod primitives;

pub use agent::{Agent, Bio, Character};
pub use environment::{Component, Entity, Relationship, Room, World};
pub use goal::{Goal, GoalStatus, Objective};
pub use log::Log;
pub use memory::{Memory, MemoryType};
pub use primitives::{now_ms, Content, Metadata, UUID};

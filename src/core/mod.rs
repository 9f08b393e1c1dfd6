pub mod alphabet;
pub mod codec;
pub mod engine;
pub mod error;
pub mod io;
pub mod lock;
pub mod queue;
pub mod shard;
pub mod slots;
pub mod stats;
pub mod table;
pub mod topk;

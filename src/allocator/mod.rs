pub mod arena;
pub mod pool;

pub use arena::{Arena, OwnedArena};
pub use pool::Pool;

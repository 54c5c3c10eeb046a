pub mod defs;
pub mod memory;

pub use defs::*;
pub use memory::MemorySceneController;

pub mod analysis;
pub mod chord;
pub mod chroma;
pub mod features;
pub mod key;
pub mod pitch;
pub mod pulse;

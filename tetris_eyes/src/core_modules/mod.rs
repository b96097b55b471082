pub mod board;
pub mod classifier;
pub mod emitter;
pub mod identifier;
pub mod mask;
pub mod piece;
pub mod pixel;
pub mod region;
pub mod stabilizer;
pub mod tracker;

pub mod constants;
pub mod input_buffer;
pub mod spatial;
pub mod state;
pub mod storage;
pub mod systems;
pub mod tuning;
pub mod world;

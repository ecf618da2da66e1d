//! Rooms and matchmaking
//!
//! Each room is an actor task owning its world; the manager spawns rooms
//! on demand and assigns joining connections to one with a free slot.

pub mod manager;
pub mod room;

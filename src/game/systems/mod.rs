pub mod coins;
pub mod collision;
pub mod combat;
pub mod movement;
pub mod progression;
pub mod snip;
pub mod territory;

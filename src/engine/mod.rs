// Match core: clock, scoreboard, controller state machine, tournament session
// and the live server that drives them.

pub mod clock;
pub mod config;
pub mod controller;
pub mod events;
pub mod scoreboard;
pub mod server;
pub mod session;

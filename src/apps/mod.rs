//! Built-in guest applications, used by the demo binary and the integration
//! tests.

pub mod pingpong;

pub use pingpong::PingPongPlugin;

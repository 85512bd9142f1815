//! Concrete region variants.

pub mod damage_interval;
pub mod delete;
pub mod forwarding;
pub mod music;
pub mod spleef_floor;

pub use damage_interval::DamageInterval;
pub use delete::Delete;
pub use forwarding::Forwarding;
pub use music::Music;
pub use spleef_floor::SpleefFloor;

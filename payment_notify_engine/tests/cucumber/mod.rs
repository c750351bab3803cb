pub mod notification_world;
mod setups;
mod steps;

pub use notification_world::NotificationWorld;

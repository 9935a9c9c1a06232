mod registry;
mod room;

pub use registry::RoomRegistry;
pub use room::Room;

pub mod handler;
pub mod registry;

pub use handler::ws_routes;
pub use registry::{generate_room_name, ClientHandle, RoomRegistry, ROOM_CAPACITY};

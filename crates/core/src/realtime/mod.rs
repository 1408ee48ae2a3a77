pub mod bus;
pub mod handshake;
pub mod rooms;

pub use bus::{ConnectionId, Envelope, EventBus, Subscription};
pub use handshake::{admit, Admission, ClientFrame, JoinRejected};
pub use rooms::{Room, RoomRouter};

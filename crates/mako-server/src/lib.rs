pub mod handlers;
pub mod protocol;
pub mod rpc;
pub mod sessions;
pub mod stdio;

pub use handlers::HandlerState;
pub use sessions::{SessionConfig, SessionManager};
pub use stdio::{frame_channel, serve, FrameReceiver, FrameSender};

pub mod codec;
pub mod directive;
pub mod mailbox;
pub mod registry;
pub mod server;

pub use directive::Directive;
pub use mailbox::Mailbox;
pub use registry::{ConnId, Registry};
pub use server::{ChatServer, Config, ServerError, ShutdownHandle};

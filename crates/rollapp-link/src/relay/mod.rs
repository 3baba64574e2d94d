// Link lifecycle between a RollApp and its Hub

pub mod discovery;
pub mod handshake;
pub mod path;
pub mod whitelist;

pub use discovery::{Discovery, LinkDiscovery, NotFoundReason};
pub use handshake::{HandshakeOptions, HandshakeStep, LinkEstablisher};
pub use path::{ChannelState, LinkPath, PathEnd};
pub use whitelist::{WhitelistRequest, WhitelistState, WhitelistSynchronizer};

pub mod bridge;
pub mod cdp;
pub mod driver;
pub mod types;

pub use bridge::DomBridge;
pub use cdp::CdpDriver;
pub use driver::{LocatorMethod, PageDriver};
pub use types::{ChunkSnapshot, FullDomSnapshot};

pub mod client;
pub mod transport;

pub use client::InventoryClient;
pub use transport::{HttpTransport, ReqwestTransport};

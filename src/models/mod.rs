pub mod entity;
pub mod filter;
pub mod lineage;
pub mod request;
pub mod result;
pub mod urn;

pub use entity::*;
pub use filter::*;
pub use lineage::*;
pub use request::*;
pub use result::*;
pub use urn::*;

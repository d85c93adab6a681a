mod grouper;
mod store;

pub use grouper::{EndpointGroup, group_by_endpoint};
pub use store::{CATALOG_HEADER, EndpointCatalog};

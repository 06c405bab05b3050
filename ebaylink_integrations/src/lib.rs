//! eBay side of the connector: REST transport and the entity bindings.

pub mod entities;
pub mod transport;

pub use entities::{
    registry, CATEGORY, HOST_PARTNER, HOST_PRODUCT, HOST_SALE_ORDER, HOST_SALE_ORDER_LINE,
    PARTNER, PRODUCT, SALE_ORDER, SALE_ORDER_LINE,
};
pub use transport::rest::{EbayRestTransport, EbayTransportFactory};

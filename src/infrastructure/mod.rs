pub mod model;
pub mod transport;

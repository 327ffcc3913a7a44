pub mod connector;

pub use connector::{Connector, Row, StoreDriver};

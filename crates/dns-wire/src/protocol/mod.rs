pub mod deserialise;
pub mod qname;
pub mod serialise;
pub mod tracker;
pub mod types;

pub mod config;
pub mod entity_df;
pub mod error;
pub mod io;
pub mod model;
pub mod offline_store;
pub mod on_demand;
pub mod registry;
pub mod source;
pub mod table;
mod util;

#[cfg(test)]
mod test_utils;

pub mod feast {
    pub mod types {
        include!(concat!(env!("OUT_DIR"), "/feast.types.rs"));
    }
    pub mod core {
        include!(concat!(env!("OUT_DIR"), "/feast.core.rs"));
    }
}

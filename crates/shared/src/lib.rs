//! Infrastructure layer engine core: classification, layer storage,
//! proximity queries and feature selection. No I/O happens here.

pub mod classify;
pub mod geojson;
pub mod layers;
pub mod models;
pub mod proximity;
pub mod selection;

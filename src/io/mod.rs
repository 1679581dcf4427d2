//! I/O modules for reading scene catalogs

pub mod catalog;

pub use catalog::{CatalogDocument, FileCatalog, HttpCatalog, MemoryCatalog, SceneCatalog, SceneDocument};

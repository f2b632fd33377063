pub mod filesystem;

pub use filesystem::{metadata_sidecar_path, DocumentStore};

// Library crate for blobns: a hierarchical namespace over a flat blob store.
pub mod cadapter;
pub mod vfs;

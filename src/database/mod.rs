// Database module
// Contains the SQLite metadata store and the LanceDB vector store

pub mod lancedb;
pub mod sqlite;

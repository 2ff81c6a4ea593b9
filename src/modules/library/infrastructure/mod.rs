pub mod filesystem_importer;
pub mod memory;
pub mod models;
pub mod repository;

pub use filesystem_importer::FilesystemLibraryImporter;
pub use memory::InMemoryLibraryPathRegistry;
pub use repository::LibraryPathRepositoryImpl;

pub mod error;
pub mod file_loader;
pub mod overlay;
pub mod redb;
pub mod traits;

pub use error::KVError;
pub use file_loader::FileLoader;
pub use overlay::OverlayKV;
pub use redb::RedbStore;
pub use traits::KVStore;

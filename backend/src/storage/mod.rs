pub mod upload_store;

pub use upload_store::{MEDIA_URL, StorageError, StoredUpload, UploadStore};

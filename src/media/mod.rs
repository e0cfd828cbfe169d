mod annotate;
mod processor;
mod upload;

pub use annotate::{annotate, FACE_COLOR, PERSON_COLOR};
pub use processor::{ImageReport, MediaProcessor, StaleDetections, VideoReport};
pub use upload::{
    sanitize_file_name, validate_extension, MediaKind, StoredUpload, UploadStore, IMAGE_EXTENSIONS,
    VIDEO_EXTENSIONS,
};

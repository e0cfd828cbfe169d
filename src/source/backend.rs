use std::fmt;
use std::path::{Path, PathBuf};

/// Backend name used for decoded files
pub const FILE_BACKEND: &str = "decodebin";

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Camera device index (0 for /dev/video0)
    Device(u32),
    /// Video file path
    File(PathBuf),
}

impl SourceSpec {
    /// Bare integers are device indices, anything else is a path
    pub fn parse(source: &str) -> Self {
        match source.trim().parse::<u32>() {
            Ok(index) => SourceSpec::Device(index),
            Err(_) => SourceSpec::File(PathBuf::from(source.trim())),
        }
    }

    pub fn file<P: AsRef<Path>>(path: P) -> Self {
        SourceSpec::File(path.as_ref().to_path_buf())
    }

    pub fn is_file(&self) -> bool {
        matches!(self, SourceSpec::File(_))
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Device(index) => write!(f, "device {}", index),
            SourceSpec::File(path) => write!(f, "file {}", path.display()),
        }
    }
}

/// GStreamer launch line producing RGB frames on an appsink named `sink`.
///
/// `mode` pins width, height and framerate. Live sources keep a single
/// buffer and drop stale ones; files keep every frame.
pub fn pipeline_description(backend: &str, spec: &SourceSpec, mode: Option<(u32, u32, u32)>) -> String {
    let caps = match mode {
        Some((width, height, fps)) => format!(
            "video/x-raw,format=RGB,width={},height={},framerate={}/1",
            width, height, fps
        ),
        None => "video/x-raw,format=RGB".to_string(),
    };

    match spec {
        SourceSpec::File(path) => format!(
            "filesrc location=\"{}\" ! {} ! videoconvert ! {} ! \
             appsink name=sink sync=false max-buffers=4 drop=false",
            path.display().to_string().replace('"', "\\\""),
            FILE_BACKEND,
            caps
        ),
        SourceSpec::Device(index) => {
            let element = match backend {
                "v4l2src" => format!("v4l2src device=/dev/video{}", index),
                "libcamerasrc" => "libcamerasrc".to_string(),
                other => other.to_string(),
            };
            format!(
                "{} ! videoconvert ! videoscale ! {} ! \
                 appsink name=sink sync=false max-buffers=1 drop=true",
                element, caps
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source_spec() {
        assert_eq!(SourceSpec::parse("0"), SourceSpec::Device(0));
        assert_eq!(SourceSpec::parse(" 2 "), SourceSpec::Device(2));
        assert_eq!(
            SourceSpec::parse("uploads/clip.mp4"),
            SourceSpec::File(PathBuf::from("uploads/clip.mp4"))
        );
        assert!(SourceSpec::parse("-1").is_file());
    }

    #[test]
    fn test_device_pipeline_keeps_one_buffer() {
        let line = pipeline_description("v4l2src", &SourceSpec::Device(1), Some((640, 480, 30)));
        assert!(line.starts_with("v4l2src device=/dev/video1 ! "));
        assert!(line.contains("width=640,height=480,framerate=30/1"));
        assert!(line.contains("max-buffers=1 drop=true"));

        let line = pipeline_description("autovideosrc", &SourceSpec::Device(0), None);
        assert!(line.starts_with("autovideosrc ! "));
        assert!(line.contains("video/x-raw,format=RGB ! appsink"));
    }

    #[test]
    fn test_file_pipeline_keeps_every_frame() {
        let line = pipeline_description("v4l2src", &SourceSpec::file("/tmp/a.mp4"), None);
        assert!(line.starts_with("filesrc location=\"/tmp/a.mp4\" ! decodebin"));
        assert!(line.contains("drop=false"));
    }
}

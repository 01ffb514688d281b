// Per-execution scratch directory
//
// Every tool invocation gets its own uniquely named directory; dropping the
// workspace removes it, so cleanup holds on every exit path including
// timeouts and early returns.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tempfile::TempDir;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "svg", "gif"];

pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("opencern-exec-")
            .tempdir()?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Image files left behind by the run, as base64 data URIs.
    /// Best effort: unreadable entries are skipped.
    pub fn collect_images(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.dir.path()) else {
            return Vec::new();
        };

        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        paths
            .into_iter()
            .filter_map(|path| {
                let data = std::fs::read(&path).ok()?;
                let ext = path.extension()?.to_str()?.to_ascii_lowercase();
                let mime = match ext.as_str() {
                    "svg" => "image/svg+xml".to_string(),
                    "jpg" => "image/jpeg".to_string(),
                    other => format!("image/{}", other),
                };
                Some(format!("data:{};base64,{}", mime, BASE64.encode(data)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_removed_on_drop() {
        let workspace = Workspace::create().unwrap();
        let path = workspace.path().to_path_buf();
        std::fs::write(workspace.file_path("script.py"), "print(1)").unwrap();
        assert!(path.exists());

        drop(workspace);
        assert!(!path.exists());
    }

    #[test]
    fn test_collect_images_filters_and_encodes() {
        let workspace = Workspace::create().unwrap();
        std::fs::write(workspace.file_path("fig_1.png"), [0x89, 0x50, 0x4e, 0x47]).unwrap();
        std::fs::write(workspace.file_path("script.py"), "print(1)").unwrap();
        std::fs::write(workspace.file_path("notes.txt"), "not an image").unwrap();

        let images = workspace.collect_images();
        assert_eq!(images.len(), 1);
        assert!(images[0].starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_collect_images_sorted_by_name() {
        let workspace = Workspace::create().unwrap();
        std::fs::write(workspace.file_path("fig_2.png"), b"b").unwrap();
        std::fs::write(workspace.file_path("fig_1.svg"), b"<svg/>").unwrap();

        let images = workspace.collect_images();
        assert_eq!(images.len(), 2);
        assert!(images[0].starts_with("data:image/svg+xml;base64,"));
        assert!(images[1].starts_with("data:image/png;base64,"));
    }
}

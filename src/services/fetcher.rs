use crate::error::{Result, SegmenterError};
use crate::types::{DocumentMetadata, SourceType};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};
use url::Url;
use walkdir::WalkDir;

/// Reads segmentation input from local files, HTTP(S) URLs, or directories of
/// rendered `.md` outputs.
pub struct SourceReader;

impl SourceReader {
    /// Expand and validate sources: URLs are checked for shape, directories
    /// are expanded to the `.md` files inside them, files must exist.
    pub fn resolve_sources(sources: &[String]) -> Result<Vec<String>> {
        let mut resolved = Vec::new();

        for source in sources {
            if Self::is_url(source) {
                Url::parse(source)?;
                resolved.push(source.clone());
                continue;
            }

            let path = Path::new(source);
            if path.is_dir() {
                let before = resolved.len();
                for entry in WalkDir::new(path)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|e| e.ok())
                {
                    let p = entry.path();
                    if p.is_file() && p.extension().is_some_and(|ext| ext == "md") {
                        resolved.push(p.to_string_lossy().into_owned());
                    }
                }
                debug!(
                    "expanded directory {} into {} markdown files",
                    source,
                    resolved.len() - before
                );
            } else if path.is_file() {
                resolved.push(source.clone());
            } else {
                return Err(SegmenterError::FileNotFound {
                    path: source.clone(),
                });
            }
        }

        Ok(resolved)
    }

    pub async fn read(source: &str) -> Result<(String, DocumentMetadata)> {
        if Self::is_url(source) {
            Self::read_url(source).await
        } else {
            Self::read_file(source).await
        }
    }

    async fn read_url(url: &str) -> Result<(String, DocumentMetadata)> {
        info!("fetching content from URL: {}", url);

        let parsed = Url::parse(url)?;
        let response = reqwest::get(url).await?.error_for_status()?;
        let content = response.text().await?;

        let filename = parsed
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|name| !name.is_empty())
            .unwrap_or("downloaded.md")
            .to_string();

        let metadata = Self::metadata(filename, SourceType::Url, &content);
        Ok((content, metadata))
    }

    async fn read_file(file_path: &str) -> Result<(String, DocumentMetadata)> {
        info!("reading file: {}", file_path);

        let path = Path::new(file_path);
        if !path.is_file() {
            return Err(SegmenterError::FileNotFound {
                path: file_path.to_string(),
            });
        }

        let content = fs::read_to_string(path).await?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let metadata = Self::metadata(filename, SourceType::LocalFile, &content);
        Ok((content, metadata))
    }

    fn metadata(filename: String, source_type: SourceType, content: &str) -> DocumentMetadata {
        DocumentMetadata {
            filename,
            source_type,
            created_at: chrono::Utc::now().to_rfc3339(),
            total_lines: content.lines().count(),
        }
    }

    fn is_url(source: &str) -> bool {
        source.starts_with("http://") || source.starts_with("https://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_rejected() {
        let err = SourceReader::resolve_sources(&["does-not-exist.md".to_string()]);
        assert!(matches!(err, Err(SegmenterError::FileNotFound { .. })));
    }

    #[test]
    fn malformed_url_is_rejected() {
        let err = SourceReader::resolve_sources(&["http://".to_string()]);
        assert!(err.is_err());
    }

    #[test]
    fn well_formed_url_passes_validation() {
        let sources = vec!["https://example.com/report.md".to_string()];
        let resolved = SourceReader::resolve_sources(&sources).unwrap();
        assert_eq!(resolved, sources);
    }

    #[tokio::test]
    async fn directory_sources_expand_to_markdown_files() {
        let dir = std::env::temp_dir().join("md-segment-fetcher-test");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.md"), "# A").unwrap();
        std::fs::write(dir.join("b.md"), "# B").unwrap();
        std::fs::write(dir.join("notes.txt"), "skip me").unwrap();

        let resolved =
            SourceReader::resolve_sources(&[dir.to_string_lossy().into_owned()]).unwrap();
        assert_eq!(resolved.len(), 2);
        assert!(resolved.iter().all(|p| p.ends_with(".md")));

        let (content, metadata) = SourceReader::read(&resolved[0]).await.unwrap();
        assert_eq!(content, "# A");
        assert_eq!(metadata.total_lines, 1);

        let _ = std::fs::remove_dir_all(&dir);
    }
}

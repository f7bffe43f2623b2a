//! 输出路径生成

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MmToolsError, Result};

/// 派生文件名中各段之间的分隔符
pub const LINEAGE_SEPARATOR: &str = "__";

const DEFAULT_EXTENSION: &str = "png";
const DEFAULT_ORIGIN: &str = "output";

/// 根据模板路径和操作标签生成一个新的输出路径
///
/// 文件名格式为 `<origin>__<tag>__<suffix>.<ext>`：
/// - origin：模板文件名中第一个 `__` 之前的部分，多步处理时保留最初输入的名字
/// - tag：操作标签，只保留字母、数字和 `-`
/// - suffix：8 位十六进制随机数，与已有文件冲突时重新生成
///
/// 模板以路径分隔符结尾（如 `image/`）时视为目标目录，origin 为 `output`。
///
/// 只计算路径，不创建文件。
pub fn generate_path(template: impl AsRef<Path>, tag: &str) -> PathBuf {
    let template = template.as_ref();
    let names_dir = template
        .as_os_str()
        .to_string_lossy()
        .ends_with(['/', std::path::MAIN_SEPARATOR]);
    let (dir, file) = if names_dir {
        (template, None)
    } else {
        (
            template.parent().unwrap_or_else(|| Path::new("")),
            Some(template),
        )
    };

    let stem = file
        .and_then(Path::file_stem)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let origin = stem
        .split(LINEAGE_SEPARATOR)
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_ORIGIN)
        .to_string();
    let extension = file
        .and_then(Path::extension)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
    let tag = sanitize_tag(tag);

    loop {
        let suffix = format!("{:08x}", rand::random::<u32>());
        let candidate = dir.join(format!(
            "{origin}{sep}{tag}{sep}{suffix}.{extension}",
            sep = LINEAGE_SEPARATOR
        ));
        if !candidate.exists() {
            return candidate;
        }
    }
}

/// 写文件前确保父目录存在
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| MmToolsError::io(parent, e))
        }
        _ => Ok(()),
    }
}

fn sanitize_tag(tag: &str) -> String {
    let cleaned: String = tag
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    if cleaned.is_empty() {
        "out".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_generate_path_keeps_directory_and_extension() {
        let path = generate_path("image/sd-res.png", "generate-image");
        assert_eq!(path.parent(), Some(Path::new("image")));
        assert_eq!(path.extension().and_then(|s| s.to_str()), Some("png"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("sd-res__generate-image__"));
    }

    #[test]
    fn test_generate_path_relative_template_without_dir() {
        let path = generate_path("cat.jpg", "semseg");
        assert_eq!(path.parent(), Some(Path::new("")));
        assert_eq!(path.extension().and_then(|s| s.to_str()), Some("jpg"));
    }

    #[test]
    fn test_generate_path_directory_template() {
        let path = generate_path("image/", "generate-image");
        assert_eq!(path.parent(), Some(Path::new("image")));
        assert_eq!(path.extension().and_then(|s| s.to_str()), Some("png"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("output__generate-image__"));
    }

    #[test]
    fn test_generate_path_defaults_extension() {
        let path = generate_path("image/result", "x");
        assert_eq!(path.extension().and_then(|s| s.to_str()), Some("png"));
    }

    #[test]
    fn test_generate_path_is_distinct_after_write() {
        let dir = tempdir().unwrap();
        let template = dir.path().join("input.png");
        std::fs::write(&template, b"x").unwrap();

        let first = generate_path(&template, "semseg");
        assert_ne!(first, template);
        assert!(!first.exists());
        std::fs::write(&first, b"y").unwrap();

        let second = generate_path(&template, "semseg");
        assert_ne!(first, second);
        assert!(!second.exists());
        assert_eq!(second.parent(), Some(dir.path()));
    }

    #[test]
    fn test_generate_path_keeps_lineage_origin() {
        let first = generate_path("image/cat.png", "semseg");
        let second = generate_path(&first, "generate-image-from-seg");
        let name = second.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("cat__generate-image-from-seg__"));
    }

    #[test]
    fn test_sanitize_tag() {
        assert_eq!(sanitize_tag("generate image/from seg"), "generate-image-from-seg");
        assert_eq!(sanitize_tag("   "), "out");
    }

    #[test]
    fn test_ensure_parent_dir_creates_directory() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested/deeper/out.png");
        ensure_parent_dir(&target).unwrap();
        assert!(target.parent().unwrap().is_dir());
    }
}

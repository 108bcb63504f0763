const SIZE_UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

/// Human-readable file size, base 1024, at most two decimals.
///
/// `format_file_size(1536)` is `"1.5 KB"`, `format_file_size(0)` is `"0 Bytes"`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, SIZE_UNITS[unit])
}

/// Splits a slash-separated archive path into its non-empty segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Cumulative breadcrumbs for a path: `/a/b` gives `[("a", "/a"), ("b", "/a/b")]`.
pub fn breadcrumb_paths(path: &str) -> Vec<(String, String)> {
    let mut current = String::new();
    split_path(path)
        .into_iter()
        .map(|segment| {
            current.push('/');
            current.push_str(segment);
            (segment.to_string(), current.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_sizes() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(500), "500 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1_048_576), "1 MB");
        assert_eq!(format_file_size(1_234_567), "1.18 MB");
        assert_eq!(format_file_size(5 * 1024 * 1024 * 1024), "5 GB");
    }

    #[test]
    fn caps_at_terabytes() {
        let pb = 1024u64.pow(5);
        assert_eq!(format_file_size(pb), "1024 TB");
    }

    #[test]
    fn splits_paths_ignoring_extra_slashes() {
        assert_eq!(split_path("/Constitutions//South Africa/"), vec!["Constitutions", "South Africa"]);
        assert!(split_path("/").is_empty());
        assert!(split_path("").is_empty());
    }

    #[test]
    fn builds_cumulative_breadcrumbs() {
        let crumbs = breadcrumb_paths("/Africa/Kenya/2010");
        assert_eq!(
            crumbs,
            vec![
                ("Africa".to_string(), "/Africa".to_string()),
                ("Kenya".to_string(), "/Africa/Kenya".to_string()),
                ("2010".to_string(), "/Africa/Kenya/2010".to_string()),
            ]
        );
    }
}

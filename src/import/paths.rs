use std::path::{Component, Path, PathBuf};

use chrono::{Datelike, NaiveDateTime, Timelike};

/// Default layout of the import archive.
pub const DEFAULT_FOLDER_STRUCTURE: &str = "%Y/%m";

/// Directory for a photo taken at `date` under `output_dir`.
///
/// `folder_structure` supports `%Y %m %d %H %M %S`; the literal `none` puts
/// every file directly in `output_dir`. Parent and root components are
/// dropped so the result always stays below `output_dir`.
pub fn target_directory(
    output_dir: &Path,
    folder_structure: &str,
    date: &NaiveDateTime,
) -> PathBuf {
    if folder_structure.eq_ignore_ascii_case("none") {
        return output_dir.to_path_buf();
    }
    let expanded = expand_date_format(folder_structure, date);
    let mut dir = output_dir.to_path_buf();
    for component in Path::new(&expanded).components() {
        if let Component::Normal(part) = component {
            dir.push(part);
        }
    }
    dir
}

fn expand_date_format(format_str: &str, date: &NaiveDateTime) -> String {
    let mut result = String::with_capacity(format_str.len() + 8);
    let mut chars = format_str.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }
        let value = match chars.peek() {
            Some('Y') => Some(format!("{:04}", date.year())),
            Some('m') => Some(format!("{:02}", date.month())),
            Some('d') => Some(format!("{:02}", date.day())),
            Some('H') => Some(format!("{:02}", date.hour())),
            Some('M') => Some(format!("{:02}", date.minute())),
            Some('S') => Some(format!("{:02}", date.second())),
            _ => None,
        };
        match value {
            Some(v) => {
                chars.next();
                result.push_str(&v);
            }
            None => result.push(c),
        }
    }

    result
}

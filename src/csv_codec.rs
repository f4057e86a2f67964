use crate::location_cache::LocationCacheMap;

pub const CSV_HEADER: &str = "username,location,timestamp";
pub const CSV_LINE_TERMINATOR: &str = "\r\n";

const BYTE_ORDER_MARK: char = '\u{feff}';

#[derive(Debug, Clone, PartialEq)]
pub struct CsvExport {
    pub text: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CsvRow {
    pub username: String,
    pub location: String,
    pub timestamp: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnMap {
    username: Option<usize>,
    location: Option<usize>,
    timestamp: Option<usize>,
}

impl ColumnMap {
    const POSITIONAL: ColumnMap = ColumnMap {
        username: Some(0),
        location: Some(1),
        timestamp: Some(2),
    };

    fn from_header(cells: &[String]) -> Self {
        let find = |name: &str| cells.iter().position(|cell| cell == name);
        ColumnMap {
            username: find("username"),
            location: find("location"),
            timestamp: find("timestamp"),
        }
    }
}

pub fn escape_csv_value(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    if value.contains(['"', ',', '\n', '\r']) {
        return format!("\"{}\"", value.replace('"', "\"\""));
    }
    value.to_string()
}

pub fn to_csv(cache: &LocationCacheMap) -> CsvExport {
    let mut lines = Vec::with_capacity(cache.len() + 1);
    lines.push(CSV_HEADER.to_string());

    for (username, entry) in cache {
        let location = entry.location.as_deref().unwrap_or_default();
        let timestamp = format_timestamp(entry.timestamp);
        lines.push(
            [
                escape_csv_value(username),
                escape_csv_value(location),
                escape_csv_value(&timestamp),
            ]
            .join(","),
        );
    }

    CsvExport {
        text: lines.join(CSV_LINE_TERMINATOR),
        count: cache.len(),
    }
}

pub fn parse_rows<'a>(text: impl Into<Option<&'a str>>) -> Vec<CsvRow> {
    let Some(text) = text.into() else {
        return Vec::new();
    };
    let text = text.strip_prefix(BYTE_ORDER_MARK).unwrap_or(text);
    // Lines are split before quote handling; a quoted newline starts a new row.
    let lines: Vec<&str> = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
        .collect();
    let Some(first) = lines.first() else {
        return Vec::new();
    };

    let header: Vec<String> = split_line(first)
        .iter()
        .map(|cell| cell.trim().to_lowercase())
        .collect();
    let has_header = header.iter().any(|cell| cell == "username");
    let (columns, data) = if has_header {
        (ColumnMap::from_header(&header), &lines[1..])
    } else {
        (ColumnMap::POSITIONAL, &lines[..])
    };

    data.iter()
        .filter_map(|line| parse_row(&split_line(line), columns))
        .collect()
}

fn parse_row(cells: &[String], columns: ColumnMap) -> Option<CsvRow> {
    let username = resolve_cell(cells, columns.username, 0)?.trim();
    if username.is_empty() {
        return None;
    }
    let location = resolve_cell(cells, columns.location, 1)
        .map(str::trim)
        .unwrap_or_default();
    let timestamp = resolve_cell(cells, columns.timestamp, 2)
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| raw.parse::<f64>().ok())
        .filter(|ts| ts.is_finite());

    Some(CsvRow {
        username: username.to_string(),
        location: location.to_string(),
        timestamp,
    })
}

fn resolve_cell(cells: &[String], column: Option<usize>, position: usize) -> Option<&str> {
    cells
        .get(column.unwrap_or(position))
        .map(String::as_str)
}

pub fn split_line(line: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => values.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }

    values.push(current);
    values
}

pub fn normalize_username(raw: &str) -> String {
    raw.trim_start_matches('@').trim().to_string()
}

fn format_timestamp(timestamp: f64) -> String {
    if timestamp == 0.0 || !timestamp.is_finite() {
        return String::new();
    }
    timestamp.to_string()
}

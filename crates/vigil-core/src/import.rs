//! Import of browser password exports (Chrome, Firefox, Edge, Safari CSV).

use crate::models::{Entry, Group};
use reqwest::Url;
use thiserror::Error;

/// Name of the group imported credentials are collected in.
pub const IMPORTED_GROUP_NAME: &str = "Imported";

const URL_HEADERS: &[&str] = &["url", "origin"];
const USERNAME_HEADERS: &[&str] = &["username", "username field", "usernamevalue"];
const PASSWORD_HEADERS: &[&str] = &["password", "password field", "passwordvalue"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("CSV file is empty")]
    Empty,

    #[error("could not find required columns (url/origin, username, password) in the CSV file")]
    MissingColumns,

    #[error("no valid password entries found in CSV")]
    NoEntries,
}

/// One credential row of a browser export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvCredential {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl CsvCredential {
    /// Entry title: the URL's host name, else the raw URL, else the username.
    pub fn title(&self) -> String {
        if let Some(host) = Url::parse(&self.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
        {
            return host;
        }
        if !self.url.is_empty() {
            return self.url.clone();
        }
        if !self.username.is_empty() {
            return self.username.clone();
        }
        "Imported entry".to_string()
    }

    fn into_entry(self) -> Entry {
        Entry {
            title: self.title(),
            username: self.username,
            password: self.password,
            url: self.url,
            ..Entry::new()
        }
    }
}

/// Parse a browser export.
///
/// The header row decides the columns. A password column is required plus
/// at least one of url/origin and username. Rows without a password are skipped.
pub fn parse_csv(text: &str) -> Result<Vec<CsvCredential>, ImportError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());

    let header = lines.next().ok_or(ImportError::Empty)?;
    let headers: Vec<String> = split_line(header)
        .into_iter()
        .map(|h| h.to_lowercase())
        .collect();
    let column = |aliases: &[&str]| headers.iter().position(|h| aliases.contains(&h.as_str()));

    let url_index = column(URL_HEADERS);
    let username_index = column(USERNAME_HEADERS);
    let password_index = column(PASSWORD_HEADERS).ok_or(ImportError::MissingColumns)?;
    if url_index.is_none() && username_index.is_none() {
        return Err(ImportError::MissingColumns);
    }

    let mut credentials = Vec::new();
    for line in lines {
        let values = split_line(line);
        let field = |index: Option<usize>| {
            index
                .and_then(|i| values.get(i).cloned())
                .unwrap_or_default()
        };

        let password = field(Some(password_index));
        if password.is_empty() {
            continue;
        }
        credentials.push(CsvCredential {
            url: field(url_index),
            username: field(username_index),
            password,
        });
    }

    if credentials.is_empty() {
        return Err(ImportError::NoEntries);
    }
    tracing::info!("Parsed {} credentials from CSV", credentials.len());
    Ok(credentials)
}

/// Split one CSV line. Quotes group commas and `""` is a literal quote.
/// Fields are trimmed.
fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

/// Add the credentials as new entries of a fresh `Imported` group under `root`.
///
/// The group and its entries are unsynchronized until the tree is applied
/// to the database. Returns the number of entries added.
pub fn import_into(root: &mut Group, credentials: Vec<CsvCredential>) -> usize {
    let mut imported = Group::new(IMPORTED_GROUP_NAME);
    imported.entries = credentials.into_iter().map(CsvCredential::into_entry).collect();
    let count = imported.entries.len();
    root.children.push(imported);
    count
}

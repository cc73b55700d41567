//! Features read straight off the dump's own request, no history needed.

use super::domain::normalize_host;
use super::urls::last_segment;
use super::ColumnKind;
use crate::records::DumpEvent;
use crate::storage::Field;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Executable extensions
const COMMON_EXT: &[&str] = &["exe", "dll", "msi", "jar", "dmg", "apk"];
/// Extensions a binary commonly hides behind
const COMMON_FAKE: &[&str] = &["html", "gif", "jpg", "jpeg", "txt", "pdf", "htm"];
/// Server-side scripts
const OTHER_EXT: &[&str] = &["php", "aspx", "asp"];

const MAX_EXT_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionClass {
    NoExt,
    CommonExt,
    CommonFake,
    OtherExt,
    UnknownExt,
    NoUrl,
}

impl ExtensionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionClass::NoExt => "no_ext",
            ExtensionClass::CommonExt => "common_ext",
            ExtensionClass::CommonFake => "common_fake",
            ExtensionClass::OtherExt => "other_ext",
            ExtensionClass::UnknownExt => "unknown_ext",
            ExtensionClass::NoUrl => "no_url",
        }
    }

    pub fn classify(url: Option<&str>) -> Self {
        let Some(url) = url else {
            return ExtensionClass::NoUrl;
        };
        match extension_of(url) {
            None => ExtensionClass::NoExt,
            Some(ext) if COMMON_EXT.contains(&ext.as_str()) => ExtensionClass::CommonExt,
            Some(ext) if COMMON_FAKE.contains(&ext.as_str()) => ExtensionClass::CommonFake,
            Some(ext) if OTHER_EXT.contains(&ext.as_str()) => ExtensionClass::OtherExt,
            Some(_) => ExtensionClass::UnknownExt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFeatures {
    pub referer_exists: bool,
    /// False when the host is a literal address rather than a name
    pub host_name_exists: bool,
    pub extension_class: ExtensionClass,
    pub url_length: i64,
    pub directory_depth: i64,
}

impl RequestFeatures {
    pub const COLUMNS: &'static [(&'static str, ColumnKind)] = &[
        ("referer_exists", ColumnKind::Integer),
        ("host_name_exists", ColumnKind::Integer),
        ("extension_class", ColumnKind::Text),
        ("url_length", ColumnKind::Integer),
        ("directory_depth", ColumnKind::Integer),
    ];

    pub fn from_dump(dump: &DumpEvent) -> Self {
        let url = dump.url.as_deref();
        let host = normalize_host(&dump.host);
        let host_is_address =
            host.parse::<IpAddr>().is_ok() || host == dump.server_address.to_string();
        RequestFeatures {
            referer_exists: dump.referer.is_some(),
            host_name_exists: !host_is_address,
            extension_class: ExtensionClass::classify(url),
            url_length: url.map_or(0, |u| u.chars().count() as i64),
            directory_depth: url.map_or(0, |u| {
                u.split('?').next().unwrap_or(u).matches('/').count() as i64
            }),
        }
    }

    pub fn fields(&self) -> Vec<Field> {
        vec![
            Field::new("referer_exists", self.referer_exists),
            Field::new("host_name_exists", self.host_name_exists),
            Field::new("extension_class", self.extension_class.as_str()),
            Field::new("url_length", self.url_length),
            Field::new("directory_depth", self.directory_depth),
        ]
    }
}

/// Lowercased extension of the last path segment, truncated to 10 chars.
fn extension_of(url: &str) -> Option<String> {
    let segment = last_segment(url)?;
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.chars().take(MAX_EXT_LEN).collect::<String>().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_classes() {
        let c = |u: &str| ExtensionClass::classify(Some(u));
        assert_eq!(c("http://a.com/setup.EXE"), ExtensionClass::CommonExt);
        assert_eq!(c("http://a.com/img/photo.jpg?x=1"), ExtensionClass::CommonFake);
        assert_eq!(c("http://a.com/get.php?id=2"), ExtensionClass::OtherExt);
        assert_eq!(c("http://a.com/file.bin"), ExtensionClass::UnknownExt);
        assert_eq!(c("http://a.com/download"), ExtensionClass::NoExt);
        assert_eq!(c("http://a.com"), ExtensionClass::NoExt);
        assert_eq!(c("http://a.com/download#setup.exe"), ExtensionClass::NoExt);
        assert_eq!(ExtensionClass::classify(None), ExtensionClass::NoUrl);
    }

    #[test]
    fn address_hosts_with_ports_have_no_name() {
        let ts = chrono::Utc::now();
        let server = "192.0.2.1".parse().unwrap();
        let f = |host: &str| RequestFeatures::from_dump(&DumpEvent::new(1, host, server, ts));
        assert!(!f("198.51.100.4:8080").host_name_exists);
        assert!(!f("[2001:db8::1]:443").host_name_exists);
        assert!(!f("192.0.2.1:80").host_name_exists);
        assert!(f("dl.example.com:8080").host_name_exists);
    }

    #[test]
    fn long_extensions_are_truncated() {
        assert_eq!(
            extension_of("http://a.com/f.abcdefghijklmnop").as_deref(),
            Some("abcdefghij")
        );
    }
}

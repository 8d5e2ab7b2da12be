//! Accepted recording formats and object naming for submitted files.

use std::fmt;

use chrono::NaiveDate;
use unicode_normalization::UnicodeNormalization;

use crate::{PublicLink, UploadError, UploadResult};

/// Audio formats accepted for upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    M4a,
    Mp3,
    Wav,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 3] = [AudioFormat::M4a, AudioFormat::Mp3, AudioFormat::Wav];

    /// Format of `filename` by extension, ignoring case
    pub fn from_filename(filename: &str) -> UploadResult<Self> {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "m4a" => Ok(Self::M4a),
            "mp3" => Ok(Self::Mp3),
            "wav" => Ok(Self::Wav),
            _ => Err(UploadError::unsupported_format(filename)),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::M4a => "m4a",
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::M4a => "audio/mp4",
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Object name for a client's recording: `{client}_{DD-MM-YYYY}_{original}`,
/// made safe to use as a file name.
pub fn object_name(client: &str, date: NaiveDate, original: &str) -> String {
    let client = client.replace(['/', '\\'], "-");
    let raw = format!("{}_{}_{}", client, date.format("%d-%m-%Y"), original);
    sanitize(&raw)
}

/// Decompose (NFKD) and drop what is left outside ASCII, so `é` becomes `e`.
/// Whitespace and path separators collapse into `_`; only `[A-Za-z0-9._-]`
/// is kept and leading or trailing `.` and `_` are trimmed.
pub fn sanitize(name: &str) -> String {
    let ascii: String = name
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// Links joined for a single spreadsheet cell
pub fn links_cell(links: &[PublicLink]) -> String {
    links
        .iter()
        .map(|l| l.url.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GrantStatus, LinkSource};
    use proptest::prelude::*;

    #[test]
    fn extensions_are_case_insensitive() {
        assert_eq!(AudioFormat::from_filename("call.MP3").unwrap(), AudioFormat::Mp3);
        assert_eq!(AudioFormat::from_filename("a.b.m4a").unwrap(), AudioFormat::M4a);
        assert_eq!(AudioFormat::from_filename("x.Wav").unwrap().mime_type(), "audio/wav");
    }

    #[test]
    fn other_files_are_rejected() {
        for name in ["notes.txt", "mp3", "voice.ogg", ""] {
            assert!(matches!(
                AudioFormat::from_filename(name),
                Err(UploadError::UnsupportedFormat { .. })
            ));
        }
    }

    #[test]
    fn object_name_carries_client_and_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(
            object_name("Acme/Labs", date, "kickoff call.m4a"),
            "Acme-Labs_07-03-2024_kickoff_call.m4a"
        );
        assert_eq!(
            object_name("Café  Nord", date, "../x.mp3"),
            "Cafe_Nord_07-03-2024_.._x.mp3"
        );
    }

    #[test]
    fn accents_fold_to_ascii() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(
            object_name("Café Nord", date, "réunion.mp3"),
            "Cafe_Nord_07-03-2024_reunion.mp3"
        );
        assert_eq!(sanitize("Ångström ﬁle.wav"), "Angstrom_file.wav");
    }

    #[test]
    fn empty_client_leaves_date_first() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(object_name("", date, "file.mp3"), "07-03-2024_file.mp3");
    }

    #[test]
    fn sanitize_trims_dots_and_underscores() {
        assert_eq!(sanitize("  ..hidden file.wav__ "), "hidden_file.wav");
        assert_eq!(sanitize("a\\b/c.mp3"), "a_b_c.mp3");
    }

    #[test]
    fn links_are_comma_joined() {
        let link = |url: &str| PublicLink {
            url: url.to_string(),
            grant: GrantStatus::Granted,
            source: LinkSource::ViewLink,
        };
        assert_eq!(
            links_cell(&[link("https://a"), link("https://b")]),
            "https://a, https://b"
        );
        assert_eq!(links_cell(&[]), "");
    }

    proptest! {
        #[test]
        fn sanitized_names_use_safe_characters(name in ".{0,64}") {
            let safe = sanitize(&name);
            prop_assert!(safe
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')));
            prop_assert!(!safe.starts_with(['.', '_']));
            prop_assert!(!safe.ends_with(['.', '_']));
        }
    }
}

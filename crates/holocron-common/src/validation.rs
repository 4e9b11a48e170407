use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum title length in UTF-8 bytes
pub const MAX_TITLE_LEN: usize = 200;

/// Maximum display name length in UTF-8 bytes
pub const MAX_NAME_LEN: usize = 50;

/// Page size used when the caller gives none (or an out-of-range one)
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Largest page size a caller may request
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid title: must be 1-200 bytes")]
    InvalidTitle,

    #[error("Invalid authors: at least one author is required")]
    InvalidAuthors,

    #[error("Invalid code: must not be empty")]
    InvalidCode,

    #[error("Invalid delete reason '{0}': must be one of transfer, disposal, lost, other")]
    InvalidDeleteReason(String),

    #[error("Invalid name: must be 1-50 bytes")]
    InvalidName,
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// A book title of 1-200 bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookTitle(String);

impl BookTitle {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for BookTitle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Ordered, non-empty list of author names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookAuthors(Vec<String>);

impl BookAuthors {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

/// ISBN-like item code. Only emptiness is checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookCode(String);

impl BookCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for BookCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a book left the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteReason {
    Transfer,
    Disposal,
    Lost,
    Other,
}

impl DeleteReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeleteReason::Transfer => "transfer",
            DeleteReason::Disposal => "disposal",
            DeleteReason::Lost => "lost",
            DeleteReason::Other => "other",
        }
    }
}

impl fmt::Display for DeleteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeleteReason {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_delete_reason(s)
    }
}

/// A user's display name of 1-50 bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserName(String);

impl UserName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Free-text catalog search term; never empty
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchKeyword(String);

impl SearchKeyword {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Clamped limit/offset pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    limit: u32,
    offset: u64,
}

impl Pagination {
    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl Default for Pagination {
    fn default() -> Self {
        to_pagination(None, None)
    }
}

/// Validates a book title; the limit is in UTF-8 bytes
pub fn parse_title(s: &str) -> ValidationResult<BookTitle> {
    if s.is_empty() || s.len() > MAX_TITLE_LEN {
        return Err(ValidationError::InvalidTitle);
    }
    Ok(BookTitle(s.to_string()))
}

/// Validates an author list; order is preserved
pub fn parse_authors(authors: Vec<String>) -> ValidationResult<BookAuthors> {
    if authors.is_empty() {
        return Err(ValidationError::InvalidAuthors);
    }
    Ok(BookAuthors(authors))
}

pub fn parse_code(s: &str) -> ValidationResult<BookCode> {
    if s.is_empty() {
        return Err(ValidationError::InvalidCode);
    }
    Ok(BookCode(s.to_string()))
}

/// Exact, case-sensitive match against the four known reasons
pub fn parse_delete_reason(s: &str) -> ValidationResult<DeleteReason> {
    match s {
        "transfer" => Ok(DeleteReason::Transfer),
        "disposal" => Ok(DeleteReason::Disposal),
        "lost" => Ok(DeleteReason::Lost),
        "other" => Ok(DeleteReason::Other),
        _ => Err(ValidationError::InvalidDeleteReason(s.to_string())),
    }
}

/// Validates a user name; the limit is in UTF-8 bytes
pub fn parse_user_name(s: &str) -> ValidationResult<UserName> {
    if s.is_empty() || s.len() > MAX_NAME_LEN {
        return Err(ValidationError::InvalidName);
    }
    Ok(UserName(s.to_string()))
}

/// Absent or empty query means "no filter"
pub fn to_search_keyword(q: Option<&str>) -> Option<SearchKeyword> {
    match q {
        None | Some("") => None,
        Some(s) => Some(SearchKeyword(s.to_string())),
    }
}

/// Clamps raw paging input; never fails
///
/// - limit: default 20 when absent, <= 0, or > 100
/// - offset: used as given; 0 when absent or negative
pub fn to_pagination(limit: Option<i64>, offset: Option<i64>) -> Pagination {
    let limit = match limit {
        Some(l) if l > 0 && l <= i64::from(MAX_PAGE_LIMIT) => l as u32,
        _ => DEFAULT_PAGE_LIMIT,
    };
    let offset = match offset {
        Some(o) if o >= 0 => o.unsigned_abs(),
        _ => 0,
    };
    Pagination { limit, offset }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_title_bounds() {
        assert_eq!(parse_title(""), Err(ValidationError::InvalidTitle));
        assert!(parse_title("a").is_ok());
        assert!(parse_title(&"a".repeat(200)).is_ok());
        assert_eq!(
            parse_title(&"a".repeat(201)),
            Err(ValidationError::InvalidTitle)
        );
    }

    #[test]
    fn test_title_limit_is_in_bytes() {
        // "本" is three bytes in UTF-8
        assert!(parse_title(&"本".repeat(66)).is_ok());
        assert_eq!(
            parse_title(&"本".repeat(67)),
            Err(ValidationError::InvalidTitle)
        );
        assert_eq!(
            parse_title(&"本".repeat(100)),
            Err(ValidationError::InvalidTitle)
        );
    }

    #[test]
    fn test_authors() {
        let authors = parse_authors(vec!["Author1".to_string(), "Author2".to_string()]).unwrap();
        assert_eq!(authors.as_slice(), ["Author1", "Author2"]);

        assert_eq!(parse_authors(vec![]), Err(ValidationError::InvalidAuthors));
    }

    #[test]
    fn test_code() {
        assert_eq!(parse_code(""), Err(ValidationError::InvalidCode));
        assert_eq!(parse_code("9784873119045").unwrap().as_str(), "9784873119045");
    }

    #[test]
    fn test_delete_reason_exact_match() {
        assert_eq!(parse_delete_reason("transfer"), Ok(DeleteReason::Transfer));
        assert_eq!(parse_delete_reason("disposal"), Ok(DeleteReason::Disposal));
        assert_eq!(parse_delete_reason("lost"), Ok(DeleteReason::Lost));
        assert_eq!(parse_delete_reason("other"), Ok(DeleteReason::Other));

        assert!(parse_delete_reason("Lost").is_err());
        assert!(parse_delete_reason("TRANSFER").is_err());
        assert!(parse_delete_reason(" lost").is_err());
        assert!(parse_delete_reason("").is_err());
    }

    #[test]
    fn test_delete_reason_as_str_round_trip() {
        for reason in [
            DeleteReason::Transfer,
            DeleteReason::Disposal,
            DeleteReason::Lost,
            DeleteReason::Other,
        ] {
            assert_eq!(reason.as_str().parse::<DeleteReason>(), Ok(reason));
        }
    }

    #[test]
    fn test_user_name_bounds() {
        assert_eq!(parse_user_name(""), Err(ValidationError::InvalidName));
        assert!(parse_user_name("a").is_ok());
        assert!(parse_user_name(&"a".repeat(50)).is_ok());
        assert_eq!(
            parse_user_name(&"a".repeat(51)),
            Err(ValidationError::InvalidName)
        );
        // 16 three-byte characters fit in 50 bytes, 17 do not
        assert!(parse_user_name(&"名".repeat(16)).is_ok());
        assert_eq!(
            parse_user_name(&"名".repeat(17)),
            Err(ValidationError::InvalidName)
        );
    }

    #[test]
    fn test_search_keyword() {
        assert_eq!(to_search_keyword(None), None);
        assert_eq!(to_search_keyword(Some("")), None);
        assert_eq!(to_search_keyword(Some("rust")).unwrap().as_str(), "rust");
    }

    #[test]
    fn test_pagination_defaults() {
        let p = to_pagination(None, None);
        assert_eq!((p.limit(), p.offset()), (20, 0));
        assert_eq!(Pagination::default(), p);
    }

    #[test]
    fn test_pagination_clamping() {
        assert_eq!(to_pagination(Some(0), None).limit(), 20);
        assert_eq!(to_pagination(Some(-5), None).limit(), 20);
        assert_eq!(to_pagination(Some(101), None).limit(), 20);
        assert_eq!(to_pagination(Some(100), None).limit(), 100);
        assert_eq!(to_pagination(Some(1), None).limit(), 1);

        assert_eq!(to_pagination(None, Some(-1)).offset(), 0);
        assert_eq!(to_pagination(None, Some(0)).offset(), 0);
        assert_eq!(to_pagination(None, Some(40)).offset(), 40);
        assert_eq!(
            to_pagination(None, Some(i64::from(u32::MAX) + 1)).offset(),
            u64::from(u32::MAX) + 1
        );
    }

    #[test]
    fn test_error_display() {
        let err = ValidationError::InvalidDeleteReason("stolen".into());
        assert!(err.to_string().contains("stolen"));
        assert!(ValidationError::InvalidTitle.to_string().contains("200"));
    }

    proptest! {
        /// Any printable ASCII title of 1-200 bytes is accepted unchanged
        #[test]
        fn proptest_title_round_trips(title in "[ -~]{1,200}") {
            let parsed = parse_title(&title).unwrap();
            prop_assert_eq!(parsed.as_str(), title.as_str());
        }

        #[test]
        fn proptest_title_too_long_rejected(title in "\\PC{201,300}") {
            prop_assert_eq!(parse_title(&title), Err(ValidationError::InvalidTitle));
        }

        #[test]
        fn proptest_code_passes_through(code in "[0-9A-Za-z-]{1,20}") {
            prop_assert_eq!(parse_code(&code).unwrap().into_inner(), code);
        }

        #[test]
        fn proptest_pagination_always_in_range(limit in any::<Option<i64>>(), offset in any::<Option<i64>>()) {
            let p = to_pagination(limit, offset);
            prop_assert!(p.limit() >= 1 && p.limit() <= MAX_PAGE_LIMIT);
            if let Some(o) = offset {
                if o < 0 {
                    prop_assert_eq!(p.offset(), 0);
                } else {
                    prop_assert_eq!(p.offset(), o as u64);
                }
            }
        }
    }
}

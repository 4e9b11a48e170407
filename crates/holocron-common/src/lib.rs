pub mod validation;

pub use validation::{
    parse_authors, parse_code, parse_delete_reason, parse_title, parse_user_name,
    to_pagination, to_search_keyword, BookAuthors, BookCode, BookTitle, DeleteReason,
    Pagination, SearchKeyword, UserName, ValidationError, ValidationResult,
};

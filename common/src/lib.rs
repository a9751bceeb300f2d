use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

#[cfg(not(target_arch = "wasm32"))]
use sqlx::FromRow;

pub mod utils;

use utils::{validate_isbn, validate_not_blank};

#[cfg_attr(not(target_arch = "wasm32"), derive(FromRow))]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Genre {
    pub id: String,
    pub title: String,
}

#[cfg_attr(not(target_arch = "wasm32"), derive(FromRow))]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Author {
    pub id: String,
    pub name: String,
}

/// A catalog entry as every backend returns it. `id` is `None` until the
/// book has been persisted.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BookDto {
    pub id: Option<String>,
    pub isbn: String,
    pub title: String,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub authors: Vec<Author>,
}

impl BookDto {
    pub fn has_genre(&self, genre_id: &str) -> bool {
        self.genres.iter().any(|genre| genre.id == genre_id)
    }

    pub fn has_author(&self, author_id: &str) -> bool {
        self.authors.iter().any(|author| author.id == author_id)
    }
}

/// Payload for creating or updating a book. Genres and authors are given by
/// title/name and are created on demand.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Validate)]
pub struct BookForm {
    #[validate(custom(function = "validate_isbn"))]
    pub isbn: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub title: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub authors: Vec<String>,
}

impl From<&BookDto> for BookForm {
    fn from(book: &BookDto) -> Self {
        BookForm {
            isbn: book.isbn.clone(),
            title: book.title.clone(),
            genres: book.genres.iter().map(|g| g.title.clone()).collect(),
            authors: book.authors.iter().map(|a| a.name.clone()).collect(),
        }
    }
}

/// Optional genre/author ids restricting a book listing.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct BookFilter {
    pub genre: Option<String>,
    pub author: Option<String>,
}

impl BookFilter {
    pub fn by_genre(genre_id: impl Into<String>) -> Self {
        BookFilter {
            genre: Some(genre_id.into()),
            author: None,
        }
    }

    pub fn by_author(author_id: impl Into<String>) -> Self {
        BookFilter {
            genre: None,
            author: Some(author_id.into()),
        }
    }

    /// Drops blank ids, the listing endpoint treats them as "no filter".
    pub fn normalized(self) -> Self {
        BookFilter {
            genre: utils::blank_to_none(self.genre),
            author: utils::blank_to_none(self.author),
        }
    }

    pub fn matches(&self, book: &BookDto) -> bool {
        self.genre.as_deref().map_or(true, |id| book.has_genre(id))
            && self.author.as_deref().map_or(true, |id| book.has_author(id))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct GenreList {
    pub genres: Vec<Genre>,
    /// Genre id to number of books in that genre.
    pub statistic: BTreeMap<String, u64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthorList {
    pub authors: Vec<Author>,
    /// Author id to number of books written.
    pub statistic: BTreeMap<String, u64>,
}

#[cfg_attr(not(target_arch = "wasm32"), derive(FromRow))]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BookComment {
    pub id: String,
    pub book_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct NewComment {
    pub text: String,
}

/// Outcome envelope returned by the mutating catalog endpoints.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ActionResult {
    pub fn ok() -> Self {
        Self::ok_with("")
    }

    pub fn ok_with(message: impl Into<String>) -> Self {
        ActionResult {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ActionResult {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

//! In-memory library backend used outside production.

use async_trait::async_trait;
use chrono::Utc;
use common::{
    Author, AuthorList, BookComment, BookDto, BookFilter, BookForm, Genre, GenreList,
};
use futures::{stream, StreamExt};
use rand::seq::IndexedRandom;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

use crate::error::ServerError;
use crate::server::{CommentStream, LibraryServer};

pub const DEFAULT_TICK: Duration = Duration::from_secs(2);

const PHRASES: &[&str] = &[
    "Could not put it down.",
    "The second half drags a little.",
    "Read it twice, still found new things.",
    "Better than the film.",
    "Recommended it to my whole book club.",
    "The ending was a surprise.",
];

#[derive(Debug, Default)]
struct Catalog {
    genres: Vec<Genre>,
    authors: Vec<Author>,
    books: Vec<BookDto>,
    comments: Vec<BookComment>,
}

impl Catalog {
    fn seeded() -> Self {
        let genre = |id: &str, title: &str| Genre {
            id: id.to_string(),
            title: title.to_string(),
        };
        let author = |id: &str, name: &str| Author {
            id: id.to_string(),
            name: name.to_string(),
        };
        let genres = vec![genre("g1", "Novel"), genre("g2", "Science Fiction"), genre("g3", "Poetry")];
        let authors = vec![
            author("a1", "Leo Tolstoy"),
            author("a2", "Stanislaw Lem"),
            author("a3", "Arkady Strugatsky"),
            author("a4", "Boris Strugatsky"),
        ];
        let books = vec![
            BookDto {
                id: Some("b1".to_string()),
                isbn: "978-0-14-044793-4".to_string(),
                title: "War and Peace".to_string(),
                genres: vec![genres[0].clone()],
                authors: vec![authors[0].clone()],
            },
            BookDto {
                id: Some("b2".to_string()),
                isbn: "978-0-15-602760-1".to_string(),
                title: "Solaris".to_string(),
                genres: vec![genres[0].clone(), genres[1].clone()],
                authors: vec![authors[1].clone()],
            },
            BookDto {
                id: Some("b3".to_string()),
                isbn: "978-1-61374-342-7".to_string(),
                title: "Roadside Picnic".to_string(),
                genres: vec![genres[1].clone()],
                authors: vec![authors[2].clone(), authors[3].clone()],
            },
        ];
        let comments = vec![BookComment {
            id: Uuid::new_v4().to_string(),
            book_id: "b2".to_string(),
            text: "The ocean is the real protagonist.".to_string(),
            created_at: Utc::now(),
        }];
        Catalog {
            genres,
            authors,
            books,
            comments,
        }
    }

    fn book(&self, id: &str) -> Option<&BookDto> {
        self.books.iter().find(|book| book.id.as_deref() == Some(id))
    }

    fn genre_by_title(&mut self, title: &str) -> Genre {
        if let Some(genre) = self.genres.iter().find(|g| g.title == title) {
            return genre.clone();
        }
        let genre = Genre {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
        };
        self.genres.push(genre.clone());
        genre
    }

    fn author_by_name(&mut self, name: &str) -> Author {
        if let Some(author) = self.authors.iter().find(|a| a.name == name) {
            return author.clone();
        }
        let author = Author {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
        };
        self.authors.push(author.clone());
        author
    }

    fn resolve(&mut self, id: String, form: &BookForm) -> BookDto {
        let mut genres: Vec<Genre> = Vec::new();
        for title in form.genres.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            let genre = self.genre_by_title(title);
            if !genres.contains(&genre) {
                genres.push(genre);
            }
        }
        let mut authors: Vec<Author> = Vec::new();
        for name in form.authors.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            let author = self.author_by_name(name);
            if !authors.contains(&author) {
                authors.push(author);
            }
        }
        genres.sort_by(|a, b| a.title.cmp(&b.title));
        authors.sort_by(|a, b| a.name.cmp(&b.name));
        BookDto {
            id: Some(id),
            isbn: form.isbn.trim().to_string(),
            title: form.title.trim().to_string(),
            genres,
            authors,
        }
    }
}

/// Library backend that keeps its catalog in memory and invents live
/// comments on a timer.
#[derive(Debug, Clone)]
pub struct MockServer {
    catalog: Arc<RwLock<Catalog>>,
    tick: Duration,
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServer {
    /// An empty catalog.
    pub fn new() -> Self {
        MockServer {
            catalog: Arc::new(RwLock::new(Catalog::default())),
            tick: DEFAULT_TICK,
        }
    }

    /// A small fixed catalog: genres `g1`..`g3`, authors `a1`..`a4` and books
    /// `b1`..`b3`.
    pub fn seeded() -> Self {
        MockServer {
            catalog: Arc::new(RwLock::new(Catalog::seeded())),
            tick: DEFAULT_TICK,
        }
    }

    /// Interval between two synthetic live comments.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.catalog.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn synthetic_text() -> String {
    PHRASES
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or("Nice book.")
        .to_string()
}

/// Records a synthetic comment on `book_id`, `None` once the book is gone.
fn invent_comment(catalog: &RwLock<Catalog>, book_id: &str) -> Option<BookComment> {
    let mut catalog = catalog.write().unwrap_or_else(PoisonError::into_inner);
    catalog.book(book_id)?;
    let comment = BookComment {
        id: Uuid::new_v4().to_string(),
        book_id: book_id.to_string(),
        text: synthetic_text(),
        created_at: Utc::now(),
    };
    catalog.comments.push(comment.clone());
    Some(comment)
}

#[async_trait]
impl LibraryServer for MockServer {
    async fn get_book_list(&self, filter: &BookFilter) -> Result<Vec<BookDto>, ServerError> {
        let filter = filter.clone().normalized();
        let mut books: Vec<BookDto> = self
            .read()
            .books
            .iter()
            .filter(|book| filter.matches(book))
            .cloned()
            .collect();
        books.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(books)
    }

    async fn get_book(&self, id: &str) -> Result<BookDto, ServerError> {
        self.read()
            .book(id)
            .cloned()
            .ok_or_else(|| ServerError::book_not_found(id))
    }

    async fn delete_book(&self, id: &str) -> Result<(), ServerError> {
        let mut catalog = self.write();
        let before = catalog.books.len();
        catalog.books.retain(|book| book.id.as_deref() != Some(id));
        if catalog.books.len() == before {
            return Err(ServerError::book_not_found(id));
        }
        catalog.comments.retain(|comment| comment.book_id != id);
        tracing::debug!(id, "Mock book deleted");
        Ok(())
    }

    async fn get_genre_list(&self) -> Result<GenreList, ServerError> {
        let catalog = self.read();
        let statistic: BTreeMap<String, u64> = catalog
            .genres
            .iter()
            .map(|genre| {
                let count = catalog.books.iter().filter(|b| b.has_genre(&genre.id)).count();
                (genre.id.clone(), count as u64)
            })
            .collect();
        let mut genres = catalog.genres.clone();
        genres.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(GenreList {
            genres,
            statistic,
        })
    }

    async fn get_author_list(&self) -> Result<AuthorList, ServerError> {
        let catalog = self.read();
        let statistic: BTreeMap<String, u64> = catalog
            .authors
            .iter()
            .map(|author| {
                let count = catalog.books.iter().filter(|b| b.has_author(&author.id)).count();
                (author.id.clone(), count as u64)
            })
            .collect();
        let mut authors = catalog.authors.clone();
        authors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(AuthorList {
            authors,
            statistic,
        })
    }

    async fn save_book(&self, id: Option<&str>, form: &BookForm) -> Result<BookDto, ServerError> {
        form.validate()?;
        let mut catalog = self.write();
        match id {
            None => {
                let book = catalog.resolve(Uuid::new_v4().to_string(), form);
                catalog.books.push(book.clone());
                tracing::debug!(id = ?book.id, "Mock book created");
                Ok(book)
            }
            Some(id) => {
                let index = catalog
                    .books
                    .iter()
                    .position(|book| book.id.as_deref() == Some(id))
                    .ok_or_else(|| ServerError::book_not_found(id))?;
                let book = catalog.resolve(id.to_string(), form);
                catalog.books[index] = book.clone();
                tracing::debug!(id, "Mock book updated");
                Ok(book)
            }
        }
    }

    async fn live_book_comment(&self, book_id: &str) -> Result<CommentStream, ServerError> {
        if self.read().book(book_id).is_none() {
            return Err(ServerError::book_not_found(book_id));
        }
        let catalog = self.catalog.clone();
        let book_id = book_id.to_string();
        let tick = self.tick;
        let comments = stream::unfold((), move |()| {
            let catalog = catalog.clone();
            let book_id = book_id.clone();
            async move {
                tokio::time::sleep(tick).await;
                invent_comment(&catalog, &book_id).map(|comment| (Ok(comment), ()))
            }
        });
        Ok(comments.boxed())
    }

    async fn get_book_comments(&self, book_id: &str) -> Result<Vec<BookComment>, ServerError> {
        let catalog = self.read();
        catalog
            .book(book_id)
            .ok_or_else(|| ServerError::book_not_found(book_id))?;
        Ok(catalog
            .comments
            .iter()
            .filter(|comment| comment.book_id == book_id)
            .cloned()
            .collect())
    }
}

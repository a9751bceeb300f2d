//! The capability surface every library backend exposes to the application.

use async_trait::async_trait;
use common::{AuthorList, BookComment, BookDto, BookFilter, BookForm, GenreList};
use futures::stream::BoxStream;
use std::collections::BTreeSet;
use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator, IntoStaticStr};

use crate::error::ServerError;

/// Live comments of a single book. The stream ends when the backend stops
/// producing them (connection closed, book removed).
pub type CommentStream = BoxStream<'static, Result<BookComment, ServerError>>;

/// One operation of the backend contract, named the way the application
/// refers to it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, Display, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "camelCase")]
pub enum Capability {
    GetBookList,
    GetBook,
    DeleteBook,
    GetGenreList,
    GetAuthorList,
    SaveBook,
    LiveBookComment,
    GetBookComments,
}

/// The operations a backend can actually serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    /// Every operation of the contract.
    pub fn all() -> Self {
        Capability::iter().collect()
    }

    pub fn empty() -> Self {
        CapabilitySet(BTreeSet::new())
    }

    pub fn without(mut self, capability: Capability) -> Self {
        self.0.remove(&capability);
        self
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// Required operations absent from this set, in contract order.
    pub fn missing(&self) -> Vec<Capability> {
        Capability::iter().filter(|c| !self.contains(*c)).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        CapabilitySet(iter.into_iter().collect())
    }
}

/// Book catalog operations shared by the mock and REST backends.
///
/// Implementations report through [`LibraryServer::capabilities`] which of
/// the operations they can serve; the selector refuses to hand out a backend
/// whose set is incomplete.
#[async_trait]
pub trait LibraryServer: Send + Sync {
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::all()
    }

    async fn get_book_list(&self, filter: &BookFilter) -> Result<Vec<BookDto>, ServerError>;

    async fn get_book(&self, id: &str) -> Result<BookDto, ServerError>;

    async fn delete_book(&self, id: &str) -> Result<(), ServerError>;

    async fn get_genre_list(&self) -> Result<GenreList, ServerError>;

    async fn get_author_list(&self) -> Result<AuthorList, ServerError>;

    /// Creates a book when `id` is `None`, otherwise replaces the stored one.
    async fn save_book(&self, id: Option<&str>, form: &BookForm) -> Result<BookDto, ServerError>;

    async fn live_book_comment(&self, book_id: &str) -> Result<CommentStream, ServerError>;

    async fn get_book_comments(&self, book_id: &str) -> Result<Vec<BookComment>, ServerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_names_follow_the_contract() {
        let names: Vec<&'static str> = Capability::iter().map(Into::into).collect();
        assert_eq!(
            names,
            vec![
                "getBookList",
                "getBook",
                "deleteBook",
                "getGenreList",
                "getAuthorList",
                "saveBook",
                "liveBookComment",
                "getBookComments",
            ]
        );
    }

    #[test]
    fn missing_capabilities_are_reported_in_order() {
        let set = CapabilitySet::all()
            .without(Capability::GetBookComments)
            .without(Capability::DeleteBook);
        assert_eq!(set.missing(), vec![Capability::DeleteBook, Capability::GetBookComments]);
        assert!(!set.is_complete());
        assert!(CapabilitySet::all().is_complete());
        assert_eq!(CapabilitySet::empty().missing().len(), 8);
    }
}

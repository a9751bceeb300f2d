//! Library backend talking to the library REST service.

use async_trait::async_trait;
use common::{ActionResult, AuthorList, BookComment, BookDto, BookFilter, BookForm, GenreList};
use futures::{stream, Stream, StreamExt};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use strum::IntoEnumIterator;

use crate::config::RestConfig;
use crate::error::ServerError;
use crate::server::{Capability, CapabilitySet, CommentStream, LibraryServer};

/// Path templates of the service, relative to the base URL. `{id}` is
/// replaced by the percent-encoded book id. A blank entry disables the
/// operation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Routes {
    pub get_book_list: String,
    pub get_book: String,
    pub delete_book: String,
    pub get_genre_list: String,
    pub get_author_list: String,
    pub save_book: String,
    pub update_book: String,
    pub live_book_comment: String,
    pub get_book_comments: String,
}

impl Default for Routes {
    fn default() -> Self {
        Routes {
            get_book_list: "/book/list".to_string(),
            get_book: "/book/get/{id}".to_string(),
            delete_book: "/book/delete/{id}".to_string(),
            get_genre_list: "/genre/list".to_string(),
            get_author_list: "/author/list".to_string(),
            save_book: "/book/add".to_string(),
            update_book: "/book/update/{id}".to_string(),
            live_book_comment: "/book/{id}/comments/live".to_string(),
            get_book_comments: "/book/{id}/comments".to_string(),
        }
    }
}

impl Routes {
    /// The configured template for `capability`. Saving needs both the add
    /// and the update route; the add route is returned.
    pub fn path(&self, capability: Capability) -> Option<&str> {
        let path = match capability {
            Capability::GetBookList => &self.get_book_list,
            Capability::GetBook => &self.get_book,
            Capability::DeleteBook => &self.delete_book,
            Capability::GetGenreList => &self.get_genre_list,
            Capability::GetAuthorList => &self.get_author_list,
            Capability::SaveBook => {
                if self.update_book.trim().is_empty() {
                    return None;
                }
                &self.save_book
            }
            Capability::LiveBookComment => &self.live_book_comment,
            Capability::GetBookComments => &self.get_book_comments,
        };
        Some(path.as_str()).filter(|p| !p.trim().is_empty())
    }

    pub fn without(mut self, capability: Capability) -> Self {
        match capability {
            Capability::GetBookList => self.get_book_list.clear(),
            Capability::GetBook => self.get_book.clear(),
            Capability::DeleteBook => self.delete_book.clear(),
            Capability::GetGenreList => self.get_genre_list.clear(),
            Capability::GetAuthorList => self.get_author_list.clear(),
            Capability::SaveBook => self.save_book.clear(),
            Capability::LiveBookComment => self.live_book_comment.clear(),
            Capability::GetBookComments => self.get_book_comments.clear(),
        }
        self
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone)]
pub struct RestServer {
    client: reqwest::Client,
    base_url: String,
    routes: Routes,
}

impl RestServer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        RestServer {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            routes: Routes::default(),
        }
    }

    pub fn from_config(config: &RestConfig) -> Result<Self, ServerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self::with_client(client, config.base_url.clone()).with_routes(config.routes.clone()))
    }

    pub fn with_routes(mut self, routes: Routes) -> Self {
        self.routes = routes;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, capability: Capability, id: Option<&str>) -> Result<String, ServerError> {
        let template = self
            .routes
            .path(capability)
            .ok_or(ServerError::Unsupported(capability))?;
        Ok(self.expand(template, id))
    }

    fn expand(&self, template: &str, id: Option<&str>) -> String {
        let path = match id {
            Some(id) => template.replace("{id}", &urlencoding::encode(id)),
            None => template.to_string(),
        };
        format!("{}{}", self.base_url, path)
    }

    fn save_url(&self, id: Option<&str>) -> Result<String, ServerError> {
        match id {
            None => self.url(Capability::SaveBook, None),
            Some(id) => {
                self.routes
                    .path(Capability::SaveBook)
                    .ok_or(ServerError::Unsupported(Capability::SaveBook))?;
                Ok(self.expand(&self.routes.update_book, Some(id)))
            }
        }
    }
}

/// Turns a non-success response into the matching error.
async fn check(response: Response) -> Result<Response, ServerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or(body);
    tracing::warn!(%status, %message, "Library service returned an error");
    match status {
        StatusCode::NOT_FOUND => Err(ServerError::NotFound(message)),
        // Older services answer unknown ids with 400.
        StatusCode::BAD_REQUEST if message.ends_with("not exists") => Err(ServerError::NotFound(message)),
        _ => Err(ServerError::Api { status, message }),
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ServerError> {
    let bytes = check(response).await?.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn accepted(result: ActionResult) -> Result<Option<serde_json::Value>, ServerError> {
    if result.success {
        Ok(result.data)
    } else {
        Err(ServerError::Rejected(result.message))
    }
}

/// Position and length of the first blank line ending an event. Lines may
/// end in `\n`, `\r\n` or `\r`.
fn event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let separators: [&[u8]; 3] = [b"\r\n\r\n", b"\n\n", b"\r\r"];
    separators
        .into_iter()
        .filter_map(|sep| {
            buffer
                .windows(sep.len())
                .position(|w| w == sep)
                .map(|at| (at, sep.len()))
        })
        .min_by_key(|(at, _)| *at)
}

/// Splits a server-sent event stream into comments. Events without data
/// (keep-alives, comments) are skipped, as is an unterminated event at the
/// end of the stream.
fn comment_events<S, B, E>(bytes: S) -> CommentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ServerError> + Send + 'static,
{
    stream::unfold((Box::pin(bytes), Vec::<u8>::new()), |(mut bytes, mut buffer)| async move {
        loop {
            if let Some((at, len)) = event_boundary(&buffer) {
                let event: Vec<u8> = buffer.drain(..at + len).collect();
                match parse_event(&String::from_utf8_lossy(&event)) {
                    Some(item) => return Some((item, (bytes, buffer))),
                    None => continue,
                }
            }
            match bytes.next().await {
                Some(Ok(chunk)) => buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(err)) => return Some((Err(err.into()), (bytes, buffer))),
                None => {
                    if !buffer.iter().all(u8::is_ascii_whitespace) {
                        tracing::debug!(bytes = buffer.len(), "Discarding unterminated live comment event");
                    }
                    return None;
                }
            }
        }
    })
    .boxed()
}

fn parse_event(event: &str) -> Option<Result<BookComment, ServerError>> {
    let event = event.replace("\r\n", "\n").replace('\r', "\n");
    let data: Vec<&str> = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();
    if data.is_empty() {
        return None;
    }
    Some(serde_json::from_str(&data.join("\n")).map_err(ServerError::from))
}

#[async_trait]
impl LibraryServer for RestServer {
    fn capabilities(&self) -> CapabilitySet {
        Capability::iter()
            .filter(|c| self.routes.path(*c).is_some())
            .collect()
    }

    async fn get_book_list(&self, filter: &BookFilter) -> Result<Vec<BookDto>, ServerError> {
        let url = self.url(Capability::GetBookList, None)?;
        let filter = filter.clone().normalized();
        let response = self.client.get(&url).query(&filter).send().await?;
        read_json(response).await
    }

    async fn get_book(&self, id: &str) -> Result<BookDto, ServerError> {
        let url = self.url(Capability::GetBook, Some(id))?;
        read_json(self.client.get(&url).send().await?).await
    }

    async fn delete_book(&self, id: &str) -> Result<(), ServerError> {
        let url = self.url(Capability::DeleteBook, Some(id))?;
        let result: ActionResult = read_json(self.client.post(&url).send().await?).await?;
        accepted(result).map(|_| ())
    }

    async fn get_genre_list(&self) -> Result<GenreList, ServerError> {
        let url = self.url(Capability::GetGenreList, None)?;
        read_json(self.client.get(&url).send().await?).await
    }

    async fn get_author_list(&self) -> Result<AuthorList, ServerError> {
        let url = self.url(Capability::GetAuthorList, None)?;
        read_json(self.client.get(&url).send().await?).await
    }

    async fn save_book(&self, id: Option<&str>, form: &BookForm) -> Result<BookDto, ServerError> {
        let url = self.save_url(id)?;
        let result: ActionResult = read_json(self.client.post(&url).json(form).send().await?).await?;
        match accepted(result)? {
            Some(data) => Ok(serde_json::from_value(data)?),
            None => Err(ServerError::Rejected("saved book missing from response".to_string())),
        }
    }

    async fn live_book_comment(&self, book_id: &str) -> Result<CommentStream, ServerError> {
        let url = self.url(Capability::LiveBookComment, Some(book_id))?;
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = check(response).await?;
        tracing::debug!(book_id, "Subscribed to live comments");
        Ok(comment_events(response.bytes_stream()))
    }

    async fn get_book_comments(&self, book_id: &str) -> Result<Vec<BookComment>, ServerError> {
        let url = self.url(Capability::GetBookComments, Some(book_id))?;
        read_json(self.client.get(&url).send().await?).await
    }
}

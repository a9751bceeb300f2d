// --- File: backend/src/web_server.rs ---

use axum::{
    debug_handler,
    extract::{Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use common::{ActionResult, AuthorList, BookComment, BookDto, BookFilter, BookForm, GenreList, NewComment};
use futures::{stream, Stream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use validator::{Validate, ValidationErrors};

use crate::catalog;
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::error::AppError;

/// Buffered live comments per subscriber before it starts lagging.
const COMMENT_EVENTS_CAPACITY: usize = 64;

/// What live comment subscribers are told about.
#[derive(Debug, Clone)]
pub enum CommentEvent {
    Added(BookComment),
    BookRemoved(String),
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub app_config: AppConfig,
    pub comment_events: broadcast::Sender<CommentEvent>,
}

impl AppState {
    pub fn new(db_pool: DbPool, app_config: AppConfig) -> Self {
        let (comment_events, _) = broadcast::channel(COMMENT_EVENTS_CAPACITY);
        AppState {
            db_pool,
            app_config,
            comment_events,
        }
    }
}

pub async fn run_server(app_state: AppState) -> std::io::Result<()> {
    let addr = format!("{}:{}", app_state.app_config.web.addr, app_state.app_config.web.port);
    let app = create_router(app_state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Serving library API at http://{}/api/v1", listener.local_addr()?);
    axum::serve(listener, app.into_make_service()).await
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);
    match origin.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            tracing::warn!("Ignoring invalid CORS origin {:?}: {}", origin, e);
            layer
        }
    }
}

pub fn create_router(app_state: AppState) -> Router {
    let cors = cors_layer(&app_state.app_config.web.cors_origin);

    let book_routes = Router::new()
        .route("/book/list", get(book_list))
        .route("/book/get/{id}", get(book_show))
        .route("/book/add", post(book_register))
        .route("/book/update/{id}", post(book_update))
        .route("/book/delete/{id}", post(book_delete))
        .route("/book/{id}/comments", get(book_comments))
        .route("/book/{id}/comments/live", get(live_book_comments))
        .route("/book/{id}/comment/add", post(add_comment_to_book));

    let catalog_routes = Router::new()
        .route("/genre/list", get(genres))
        .route("/genres/{id}", get(books_by_genre))
        .route("/author/list", get(authors))
        .route("/authors/{id}", get(books_by_author));

    Router::new()
        .nest("/api/v1", book_routes.merge(catalog_routes))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

// --- Helpers ---

async fn require_book(state: &AppState, id: &str) -> Result<(), AppError> {
    if catalog::book_exists(&state.db_pool, id).await? {
        Ok(())
    } else {
        Err(AppError::book_not_found(id))
    }
}

fn saved(book: &BookDto) -> Result<ActionResult, AppError> {
    let data = serde_json::to_value(book).map_err(|e| AppError::InternalServerError(e.to_string()))?;
    Ok(ActionResult::ok().with_data(data))
}

fn rejected(errors: &ValidationErrors) -> ActionResult {
    tracing::info!("Rejecting book form: {}", errors);
    ActionResult::error("Has some errors").with_data(serde_json::to_value(errors).unwrap_or_default())
}

// --- API Handlers ---

#[debug_handler]
async fn book_list(
    State(state): State<AppState>,
    Query(filter): Query<BookFilter>,
) -> Result<Json<Vec<BookDto>>, AppError> {
    tracing::info!("Listing books with filter: {:?}", filter);
    let books = catalog::list_books(&state.db_pool, &filter).await?;
    Ok(Json(books))
}

#[debug_handler]
async fn book_show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BookDto>, AppError> {
    tracing::info!("Fetching book with id: {}", id);
    catalog::find_book(&state.db_pool, &id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::book_not_found(&id))
}

#[debug_handler]
async fn book_register(
    State(state): State<AppState>,
    Json(form): Json<BookForm>,
) -> Result<Json<ActionResult>, AppError> {
    tracing::info!("Registering book: {:?}", form);
    if let Err(errors) = form.validate() {
        return Ok(Json(rejected(&errors)));
    }
    let book = catalog::create_book(&state.db_pool, &form).await?;
    Ok(Json(saved(&book)?))
}

#[debug_handler]
async fn book_update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(form): Json<BookForm>,
) -> Result<Json<ActionResult>, AppError> {
    tracing::info!("Updating book with id: {}", id);
    if let Err(errors) = form.validate() {
        return Ok(Json(rejected(&errors)));
    }
    let book = catalog::update_book(&state.db_pool, &id, &form)
        .await?
        .ok_or_else(|| AppError::book_not_found(&id))?;
    Ok(Json(saved(&book)?))
}

#[debug_handler]
async fn book_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ActionResult>, AppError> {
    tracing::info!("Deleting book with id: {}", id);
    if catalog::delete_book(&state.db_pool, &id).await? {
        let _ = state.comment_events.send(CommentEvent::BookRemoved(id));
        Ok(Json(ActionResult::ok()))
    } else {
        Err(AppError::book_not_found(&id))
    }
}

#[debug_handler]
async fn book_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<BookComment>>, AppError> {
    require_book(&state, &id).await?;
    let comments = catalog::list_comments(&state.db_pool, &id).await?;
    Ok(Json(comments))
}

#[debug_handler]
async fn add_comment_to_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(new_comment): Json<NewComment>,
) -> Result<Response, AppError> {
    require_book(&state, &id).await?;
    if new_comment.text.trim().is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    let comment = catalog::add_comment(&state.db_pool, &id, &new_comment.text).await?;
    tracing::info!("Comment {} added to book {}", comment.id, id);
    // No live subscribers is not an error.
    let _ = state.comment_events.send(CommentEvent::Added(comment.clone()));
    Ok((StatusCode::CREATED, Json(comment)).into_response())
}

/// Live comments of one book, ending once the book is deleted.
fn comment_events(
    db_pool: DbPool,
    receiver: broadcast::Receiver<CommentEvent>,
    book_id: String,
) -> impl Stream<Item = Result<Event, axum::Error>> {
    let greeting = stream::once(async { Ok::<_, axum::Error>(Event::default().comment("live")) });
    let comments = stream::unfold(receiver, move |mut receiver| {
        let book_id = book_id.clone();
        let db_pool = db_pool.clone();
        async move {
            loop {
                match receiver.recv().await {
                    Ok(CommentEvent::Added(comment)) if comment.book_id == book_id => {
                        return Some((Event::default().json_data(&comment), receiver));
                    }
                    Ok(CommentEvent::BookRemoved(removed)) if removed == book_id => {
                        tracing::info!("Book {} removed, closing live comments", book_id);
                        return None;
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Live comment subscriber for {} skipped {} events", book_id, skipped);
                        // The removal may have been among them.
                        if !catalog::book_exists(&db_pool, &book_id).await.unwrap_or(true) {
                            return None;
                        }
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        }
    });
    greeting.chain(comments)
}

async fn live_book_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    // Subscribe first so a delete racing the lookup is still seen.
    let receiver = state.comment_events.subscribe();
    require_book(&state, &id).await?;
    tracing::info!("Live comment subscription for book {}", id);
    Ok(Sse::new(comment_events(state.db_pool.clone(), receiver, id)).keep_alive(KeepAlive::default()))
}

#[debug_handler]
async fn genres(State(state): State<AppState>) -> Result<Json<GenreList>, AppError> {
    Ok(Json(catalog::genre_list(&state.db_pool).await?))
}

#[debug_handler]
async fn authors(State(state): State<AppState>) -> Result<Json<AuthorList>, AppError> {
    Ok(Json(catalog::author_list(&state.db_pool).await?))
}

#[debug_handler]
async fn books_by_genre(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<BookDto>>, AppError> {
    if !catalog::genre_exists(&state.db_pool, &id).await? {
        return Err(AppError::NotFound(format!("Genre with id {id} not exists")));
    }
    let books = catalog::list_books(&state.db_pool, &BookFilter::by_genre(id)).await?;
    Ok(Json(books))
}

#[debug_handler]
async fn books_by_author(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<BookDto>>, AppError> {
    if !catalog::author_exists(&state.db_pool, &id).await? {
        return Err(AppError::NotFound(format!("Author with id {id} not exists")));
    }
    let books = catalog::list_books(&state.db_pool, &BookFilter::by_author(id)).await?;
    Ok(Json(books))
}

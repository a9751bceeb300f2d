// backend/tests/helpers.rs
#![allow(dead_code)]

use backend::{config::AppConfig, db, web_server::AppState};
use common::{ActionResult, BookDto, BookForm};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use tokio::net::TcpListener;

/// In-memory database with the schema applied.
pub async fn test_pool() -> SqlitePool {
    // Create connection options that enforce foreign keys
    let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);

    // A single connection, every new in-memory connection would be a new database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options)
        .await
        .expect("Failed to create in-memory database pool.");

    db::migrate(&db_pool)
        .await
        .expect("Failed to run migrations on test database.");

    db_pool
}

pub fn test_state(db_pool: SqlitePool, port: u16) -> AppState {
    let mut config = AppConfig::default();
    config.web.port = port;
    config.database.url = "sqlite::memory:".to_string();
    AppState::new(db_pool, config)
}

/// Spawn a test server and return the address and a reqwest client.
pub async fn spawn_app() -> (SocketAddr, reqwest::Client, SqlitePool) {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let db_pool = test_pool().await;
    let app = backend::web_server::create_router(test_state(db_pool.clone(), addr.port()));

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    (addr, client, db_pool)
}

pub fn book_form(isbn: &str, title: &str, genres: &[&str], authors: &[&str]) -> BookForm {
    BookForm {
        isbn: isbn.to_string(),
        title: title.to_string(),
        genres: genres.iter().map(|g| g.to_string()).collect(),
        authors: authors.iter().map(|a| a.to_string()).collect(),
    }
}

/// Registers a book through the API and returns it as stored.
pub async fn add_book(addr: &SocketAddr, client: &reqwest::Client, form: &BookForm) -> BookDto {
    let response = client
        .post(format!("http://{addr}/api/v1/book/add"))
        .json(form)
        .send()
        .await
        .expect("Failed to execute add request.");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let result: ActionResult = response.json().await.expect("Failed to parse action result");
    assert!(result.success, "Book was rejected: {}", result.message);
    serde_json::from_value(result.data.expect("Saved book missing")).unwrap()
}

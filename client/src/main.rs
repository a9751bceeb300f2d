use client::config::ClientConfig;
use client::{selector, LibraryServer, MockServer, RestServer};
use common::BookFilter;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- Setup ---
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::INFO)
        .init();

    let config = ClientConfig::from_env()?;

    // Both candidates exist up front, the selector only picks one.
    let mock: Arc<dyn LibraryServer> = Arc::new(MockServer::seeded().with_tick(config.mock.tick()));
    let rest: Arc<dyn LibraryServer> = Arc::new(RestServer::from_config(&config.rest)?);

    let server = selector::init(config.environment(), mock, rest)?;

    let genres = server.get_genre_list().await?;
    let authors = server.get_author_list().await?;
    tracing::info!(
        genres = genres.genres.len(),
        authors = authors.authors.len(),
        "Catalog reachable"
    );

    for book in server.get_book_list(&BookFilter::default()).await? {
        tracing::info!(id = ?book.id, isbn = %book.isbn, "{}", book.title);
    }

    Ok(())
}

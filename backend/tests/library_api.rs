use common::{ActionResult, AuthorList, BookComment, BookDto, GenreList, NewComment};
use futures::StreamExt;
use once_cell::sync::Lazy;
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;

mod helpers;
use crate::helpers::{add_book, book_form};

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
});

#[tokio::test]
async fn test_book_lifecycle() {
    Lazy::force(&TRACING);
    let (addr, client, _db_pool) = helpers::spawn_app().await;

    // 1. Register a book, unknown genres and authors are created on the way
    let created = add_book(
        &addr,
        &client,
        &book_form("0-306-40615-2", "Solaris", &["Science Fiction", "Novel"], &["Stanislaw Lem"]),
    )
    .await;
    let id = created.id.clone().expect("Stored book has an id");
    assert_eq!(created.title, "Solaris");
    assert_eq!(created.genres.len(), 2);
    assert_eq!(created.authors[0].name, "Stanislaw Lem");

    // 2. Fetch it back
    let response = client
        .get(format!("http://{addr}/api/v1/book/get/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched: BookDto = response.json().await.unwrap();
    assert_eq!(fetched, created);

    // 3. Update title and genres
    let response = client
        .post(format!("http://{addr}/api/v1/book/update/{id}"))
        .json(&book_form("0-306-40615-2", "Solaris (revised)", &["Novel"], &["Stanislaw Lem"]))
        .send()
        .await
        .unwrap();
    let result: ActionResult = response.json().await.unwrap();
    assert!(result.success);
    let updated: BookDto = serde_json::from_value(result.data.unwrap()).unwrap();
    assert_eq!(updated.id.as_deref(), Some(id.as_str()));
    assert_eq!(updated.title, "Solaris (revised)");
    assert_eq!(updated.genres.len(), 1);

    // 4. Delete it
    let response = client
        .post(format!("http://{addr}/api/v1/book/delete/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let result: ActionResult = response.json().await.unwrap();
    assert!(result.success);

    // 5. It is gone
    let response = client
        .get(format!("http://{addr}/api/v1/book/get/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "error": format!("Book with id {id} not exists") }));

    let response = client
        .post(format!("http://{addr}/api/v1/book/delete/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_book_is_rejected() {
    Lazy::force(&TRACING);
    let (addr, client, _db_pool) = helpers::spawn_app().await;

    let response = client
        .post(format!("http://{addr}/api/v1/book/add"))
        .json(&book_form("not-an-isbn", " ", &[], &[]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let result: ActionResult = response.json().await.unwrap();
    assert!(!result.success);
    assert_eq!(result.message, "Has some errors");
    let details = result.data.expect("Validation details");
    assert!(details.get("isbn").is_some());
    assert!(details.get("title").is_some());

    let books: Vec<BookDto> = client
        .get(format!("http://{addr}/api/v1/book/list"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(books.is_empty());
}

#[tokio::test]
async fn test_update_unknown_book_is_not_found() {
    Lazy::force(&TRACING);
    let (addr, client, _db_pool) = helpers::spawn_app().await;

    let response = client
        .post(format!("http://{addr}/api/v1/book/update/missing"))
        .json(&book_form("0-306-40615-2", "Ghost", &[], &[]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_filters_and_statistics() {
    Lazy::force(&TRACING);
    let (addr, client, _db_pool) = helpers::spawn_app().await;

    add_book(&addr, &client, &book_form("0-306-40615-2", "War and Peace", &["Novel"], &["Leo Tolstoy"])).await;
    add_book(&addr, &client, &book_form("080442957X", "Solaris", &["Novel", "Science Fiction"], &["Stanislaw Lem"])).await;
    add_book(
        &addr,
        &client,
        &book_form("978-3-16-148410-0", "Roadside Picnic", &["Science Fiction"], &["Arkady Strugatsky", "Boris Strugatsky"]),
    )
    .await;

    let genres: GenreList = client
        .get(format!("http://{addr}/api/v1/genre/list"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let titles: Vec<&str> = genres.genres.iter().map(|g| g.title.as_str()).collect();
    assert_eq!(titles, vec!["Novel", "Science Fiction"]);
    let sci_fi = genres.genres[1].id.clone();
    assert_eq!(genres.statistic[&genres.genres[0].id], 2);
    assert_eq!(genres.statistic[&sci_fi], 2);

    let authors: AuthorList = client
        .get(format!("http://{addr}/api/v1/author/list"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(authors.authors.len(), 4);
    assert!(authors.statistic.values().all(|count| *count == 1));
    let lem = authors
        .authors
        .iter()
        .find(|a| a.name == "Stanislaw Lem")
        .unwrap()
        .id
        .clone();

    // Blank filter values mean "no filter"
    let all: Vec<BookDto> = client
        .get(format!("http://{addr}/api/v1/book/list?genre=&author="))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let titles: Vec<&str> = all.iter().map(|b| b.title.as_str()).collect();
    assert_eq!(titles, vec!["Roadside Picnic", "Solaris", "War and Peace"]);

    let filtered: Vec<BookDto> = client
        .get(format!("http://{addr}/api/v1/book/list"))
        .query(&[("genre", sci_fi.as_str()), ("author", lem.as_str())])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].title, "Solaris");

    let by_genre: Vec<BookDto> = client
        .get(format!("http://{addr}/api/v1/genres/{sci_fi}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(by_genre.len(), 2);

    let by_author: Vec<BookDto> = client
        .get(format!("http://{addr}/api/v1/authors/{lem}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(by_author.len(), 1);

    let response = client
        .get(format!("http://{addr}/api/v1/genres/unknown"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_comments() {
    Lazy::force(&TRACING);
    let (addr, client, _db_pool) = helpers::spawn_app().await;
    let book = add_book(&addr, &client, &book_form("0-306-40615-2", "Solaris", &[], &[])).await;
    let id = book.id.unwrap();
    let add_url = format!("http://{addr}/api/v1/book/{id}/comment/add");

    for text in ["First!", "Second thoughts"] {
        let response = client
            .post(&add_url)
            .json(&NewComment { text: text.to_string() })
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    // Blank comments are ignored
    let response = client
        .post(&add_url)
        .json(&NewComment { text: "  ".to_string() })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let comments: Vec<BookComment> = client
        .get(format!("http://{addr}/api/v1/book/{id}/comments"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let texts: Vec<&str> = comments.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["First!", "Second thoughts"]);

    let response = client
        .post(format!("http://{addr}/api/v1/book/missing/comment/add"))
        .json(&NewComment { text: "hello".to_string() })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_live_comments_stream() {
    Lazy::force(&TRACING);
    let (addr, client, _db_pool) = helpers::spawn_app().await;
    let watched = add_book(&addr, &client, &book_form("0-306-40615-2", "Solaris", &[], &[])).await;
    let other = add_book(&addr, &client, &book_form("080442957X", "Eden", &[], &[])).await;
    let watched_id = watched.id.unwrap();
    let other_id = other.id.unwrap();

    let response = client
        .get(format!("http://{addr}/api/v1/book/{watched_id}/comments/live"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    let mut body = response.bytes_stream();

    for (book_id, text) in [(&other_id, "elsewhere"), (&watched_id, "here")] {
        client
            .post(format!("http://{addr}/api/v1/book/{book_id}/comment/add"))
            .json(&NewComment { text: text.to_string() })
            .send()
            .await
            .unwrap();
    }

    let mut received = String::new();
    let read = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(chunk) = body.next().await {
            received.push_str(&String::from_utf8_lossy(&chunk.unwrap()));
            if received.contains("\"here\"") {
                break;
            }
        }
    })
    .await;
    assert!(read.is_ok(), "No live comment within timeout, got: {received}");
    assert!(!received.contains("elsewhere"));

    let response = client
        .get(format!("http://{addr}/api/v1/book/missing/comments/live"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_live_comments_end_when_book_is_deleted() {
    Lazy::force(&TRACING);
    let (addr, client, _db_pool) = helpers::spawn_app().await;
    let book = add_book(&addr, &client, &book_form("0-306-40615-2", "Solaris", &[], &[])).await;
    let id = book.id.unwrap();

    let response = client
        .get(format!("http://{addr}/api/v1/book/{id}/comments/live"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.bytes_stream();

    let response = client
        .post(format!("http://{addr}/api/v1/book/delete/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(chunk) = body.next().await {
            chunk.unwrap();
        }
    })
    .await;
    assert!(drained.is_ok(), "Live comment stream still open after delete");
}

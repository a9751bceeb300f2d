//! SQL access to the book catalog.

use chrono::Utc;
use common::{Author, AuthorList, BookComment, BookDto, BookFilter, BookForm, Genre, GenreList};
use sqlx::{FromRow, SqliteConnection};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::db::DbPool;

#[derive(FromRow)]
struct BookRow {
    id: String,
    isbn: String,
    title: String,
}

async fn attach_relations(conn: &mut SqliteConnection, row: BookRow) -> Result<BookDto, sqlx::Error> {
    let genres = sqlx::query_as::<_, Genre>(
        r#"
        SELECT g.id, g.title FROM genres g
        JOIN books_genres bg ON bg.genre_id = g.id
        WHERE bg.book_id = ?
        ORDER BY g.title
        "#,
    )
    .bind(&row.id)
    .fetch_all(&mut *conn)
    .await?;

    let authors = sqlx::query_as::<_, Author>(
        r#"
        SELECT a.id, a.name FROM authors a
        JOIN books_authors ba ON ba.author_id = a.id
        WHERE ba.book_id = ?
        ORDER BY a.name
        "#,
    )
    .bind(&row.id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(BookDto {
        id: Some(row.id),
        isbn: row.isbn,
        title: row.title,
        genres,
        authors,
    })
}

async fn load_book(conn: &mut SqliteConnection, id: &str) -> Result<Option<BookDto>, sqlx::Error> {
    let row = sqlx::query_as::<_, BookRow>("SELECT id, isbn, title FROM books WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => Ok(Some(attach_relations(conn, row).await?)),
        None => Ok(None),
    }
}

pub async fn list_books(pool: &DbPool, filter: &BookFilter) -> Result<Vec<BookDto>, sqlx::Error> {
    let filter = filter.clone().normalized();
    let mut conn = pool.acquire().await?;
    let rows = sqlx::query_as::<_, BookRow>(
        r#"
        SELECT b.id, b.isbn, b.title FROM books b
        WHERE (?1 IS NULL OR EXISTS (
                SELECT 1 FROM books_genres bg WHERE bg.book_id = b.id AND bg.genre_id = ?1))
          AND (?2 IS NULL OR EXISTS (
                SELECT 1 FROM books_authors ba WHERE ba.book_id = b.id AND ba.author_id = ?2))
        ORDER BY b.title
        "#,
    )
    .bind(filter.genre.as_deref())
    .bind(filter.author.as_deref())
    .fetch_all(&mut *conn)
    .await?;

    let mut books = Vec::with_capacity(rows.len());
    for row in rows {
        books.push(attach_relations(&mut conn, row).await?);
    }
    Ok(books)
}

pub async fn find_book(pool: &DbPool, id: &str) -> Result<Option<BookDto>, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    load_book(&mut conn, id).await
}

pub async fn book_exists(pool: &DbPool, id: &str) -> Result<bool, sqlx::Error> {
    let found: Option<String> = sqlx::query_scalar("SELECT id FROM books WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

pub async fn genre_exists(pool: &DbPool, id: &str) -> Result<bool, sqlx::Error> {
    let found: Option<String> = sqlx::query_scalar("SELECT id FROM genres WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

pub async fn author_exists(pool: &DbPool, id: &str) -> Result<bool, sqlx::Error> {
    let found: Option<String> = sqlx::query_scalar("SELECT id FROM authors WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// Trimmed, non-blank entries with duplicates removed, in input order.
fn cleaned(values: &[String]) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::new();
    for value in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

async fn genre_id_for(conn: &mut SqliteConnection, title: &str) -> Result<String, sqlx::Error> {
    sqlx::query("INSERT INTO genres (id, title) VALUES (?, ?) ON CONFLICT(title) DO NOTHING")
        .bind(Uuid::new_v4().to_string())
        .bind(title)
        .execute(&mut *conn)
        .await?;
    sqlx::query_scalar("SELECT id FROM genres WHERE title = ?")
        .bind(title)
        .fetch_one(&mut *conn)
        .await
}

async fn author_id_for(conn: &mut SqliteConnection, name: &str) -> Result<String, sqlx::Error> {
    sqlx::query("INSERT INTO authors (id, name) VALUES (?, ?) ON CONFLICT(name) DO NOTHING")
        .bind(Uuid::new_v4().to_string())
        .bind(name)
        .execute(&mut *conn)
        .await?;
    sqlx::query_scalar("SELECT id FROM authors WHERE name = ?")
        .bind(name)
        .fetch_one(&mut *conn)
        .await
}

async fn link_relations(conn: &mut SqliteConnection, book_id: &str, form: &BookForm) -> Result<(), sqlx::Error> {
    for title in cleaned(&form.genres) {
        let genre_id = genre_id_for(conn, title).await?;
        sqlx::query("INSERT OR IGNORE INTO books_genres (book_id, genre_id) VALUES (?, ?)")
            .bind(book_id)
            .bind(genre_id)
            .execute(&mut *conn)
            .await?;
    }
    for name in cleaned(&form.authors) {
        let author_id = author_id_for(conn, name).await?;
        sqlx::query("INSERT OR IGNORE INTO books_authors (book_id, author_id) VALUES (?, ?)")
            .bind(book_id)
            .bind(author_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Inserts a new book; unknown genres and authors are created on the way.
pub async fn create_book(pool: &DbPool, form: &BookForm) -> Result<BookDto, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO books (id, isbn, title) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(form.isbn.trim())
        .bind(form.title.trim())
        .execute(&mut *tx)
        .await?;
    link_relations(&mut tx, &id, form).await?;

    let book = load_book(&mut tx, &id).await?.ok_or(sqlx::Error::RowNotFound)?;
    tx.commit().await?;
    Ok(book)
}

/// Replaces isbn, title, genres and authors of an existing book. `None` if
/// there is no book with that id.
pub async fn update_book(pool: &DbPool, id: &str, form: &BookForm) -> Result<Option<BookDto>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query("UPDATE books SET isbn = ?, title = ? WHERE id = ?")
        .bind(form.isbn.trim())
        .bind(form.title.trim())
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if updated.rows_affected() == 0 {
        return Ok(None);
    }

    sqlx::query("DELETE FROM books_genres WHERE book_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM books_authors WHERE book_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    link_relations(&mut tx, id, form).await?;

    let book = load_book(&mut tx, id).await?;
    tx.commit().await?;
    Ok(book)
}

/// Removes a book together with its links and comments. `false` if there was
/// nothing to delete.
pub async fn delete_book(pool: &DbPool, id: &str) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;
    for statement in [
        "DELETE FROM books_genres WHERE book_id = ?",
        "DELETE FROM books_authors WHERE book_id = ?",
        "DELETE FROM comments WHERE book_id = ?",
    ] {
        sqlx::query(statement).bind(id).execute(&mut *tx).await?;
    }
    let deleted = sqlx::query("DELETE FROM books WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(deleted.rows_affected() > 0)
}

fn to_statistic(rows: Vec<(String, i64)>) -> BTreeMap<String, u64> {
    rows.into_iter()
        .map(|(id, count)| (id, count.max(0) as u64))
        .collect()
}

pub async fn genre_list(pool: &DbPool) -> Result<GenreList, sqlx::Error> {
    let genres = sqlx::query_as::<_, Genre>("SELECT id, title FROM genres ORDER BY title")
        .fetch_all(pool)
        .await?;
    let counts = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT g.id, COUNT(bg.book_id) FROM genres g
        LEFT JOIN books_genres bg ON bg.genre_id = g.id
        GROUP BY g.id
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(GenreList {
        genres,
        statistic: to_statistic(counts),
    })
}

pub async fn author_list(pool: &DbPool) -> Result<AuthorList, sqlx::Error> {
    let authors = sqlx::query_as::<_, Author>("SELECT id, name FROM authors ORDER BY name")
        .fetch_all(pool)
        .await?;
    let counts = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT a.id, COUNT(ba.book_id) FROM authors a
        LEFT JOIN books_authors ba ON ba.author_id = a.id
        GROUP BY a.id
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(AuthorList {
        authors,
        statistic: to_statistic(counts),
    })
}

pub async fn list_comments(pool: &DbPool, book_id: &str) -> Result<Vec<BookComment>, sqlx::Error> {
    sqlx::query_as::<_, BookComment>(
        "SELECT id, book_id, text, created_at FROM comments WHERE book_id = ? ORDER BY created_at, rowid",
    )
    .bind(book_id)
    .fetch_all(pool)
    .await
}

pub async fn add_comment(pool: &DbPool, book_id: &str, text: &str) -> Result<BookComment, sqlx::Error> {
    let comment = BookComment {
        id: Uuid::new_v4().to_string(),
        book_id: book_id.to_string(),
        text: text.trim().to_string(),
        created_at: Utc::now(),
    };
    sqlx::query("INSERT INTO comments (id, book_id, text, created_at) VALUES (?, ?, ?, ?)")
        .bind(&comment.id)
        .bind(&comment.book_id)
        .bind(&comment.text)
        .bind(comment.created_at)
        .execute(pool)
        .await?;
    Ok(comment)
}

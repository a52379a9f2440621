//! Shared fixtures: a scripted in-memory backend and a small blog schema.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use relata::{
    Backend, BackendError, ColumnInfo, CopyRowCounter, Db, Model, Row, RowStream, TableBuilder,
    Type, Value,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// One statement as the backend received it.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// What the backend answers to a matching statement.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub rows: Vec<Row>,
    pub affected: u64,
    /// After the rows, the stream never ends
    pub hang: bool,
}

impl Reply {
    pub fn rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    pub fn affected(affected: u64) -> Self {
        Self {
            affected,
            ..Self::default()
        }
    }

    pub fn hang(mut self) -> Self {
        self.hang = true;
        self
    }
}

type Handler = Box<dyn Fn(&Statement) -> Reply + Send + Sync>;

/// Everything the backend observed, shared with the test after the backend moves into a
/// [`Db`].
#[derive(Clone, Default)]
pub struct Recorder {
    statements: Arc<Mutex<Vec<Statement>>>,
    copied_in: Arc<Mutex<Vec<u8>>>,
    cancels: Arc<AtomicUsize>,
}

impl Recorder {
    pub fn statements(&self) -> Vec<Statement> {
        self.statements.lock().unwrap().clone()
    }

    pub fn sql(&self) -> Vec<String> {
        self.statements().into_iter().map(|s| s.sql).collect()
    }

    pub fn copied_in(&self) -> Vec<u8> {
        self.copied_in.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

/// A backend answering from scripted handlers; the first handler whose pattern occurs in
/// the statement wins, everything else gets an empty reply.
#[derive(Default)]
pub struct MockBackend {
    handlers: Vec<(String, Handler)>,
    copy_out: Vec<u8>,
    recorder: Recorder,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, pattern: &str, reply: Reply) -> Self {
        self.on_with(pattern, move |_| reply.clone())
    }

    pub fn on_with<F>(mut self, pattern: &str, f: F) -> Self
    where
        F: Fn(&Statement) -> Reply + Send + Sync + 'static,
    {
        self.handlers.push((pattern.to_owned(), Box::new(f)));
        self
    }

    pub fn copy_out_data(mut self, data: &[u8]) -> Self {
        self.copy_out = data.to_vec();
        self
    }

    pub fn recorder(&self) -> Recorder {
        self.recorder.clone()
    }

    /// The backend as a [`Db`], plus the recorder to inspect afterwards.
    pub fn into_db(self) -> (Db, Recorder) {
        let recorder = self.recorder();
        (Db::new(self), recorder)
    }

    fn answer(&self, sql: &str, params: &[Value]) -> Reply {
        let statement = Statement {
            sql: sql.to_owned(),
            params: params.to_vec(),
        };
        self.recorder
            .statements
            .lock()
            .unwrap()
            .push(statement.clone());
        self.handlers
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, handler)| handler(&statement))
            .unwrap_or_default()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, BackendError> {
        Ok(self.answer(sql, params).affected)
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<RowStream, BackendError> {
        let reply = self.answer(sql, params);
        let rows = stream::iter(reply.rows.into_iter().map(Ok));
        if reply.hang {
            Ok(rows.chain(stream::pending()).boxed())
        } else {
            Ok(rows.boxed())
        }
    }

    async fn copy_in(
        &self,
        sql: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64, BackendError> {
        self.answer(sql, &[]);
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        let rows = data.iter().filter(|b| **b == b'\n').count() as u64;
        self.recorder.copied_in.lock().unwrap().extend(data);
        Ok(rows)
    }

    async fn copy_out(
        &self,
        sql: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, BackendError> {
        self.answer(sql, &[]);
        writer.write_all(&self.copy_out).await?;
        let mut rows = CopyRowCounter::new(sql);
        rows.feed(&self.copy_out);
        Ok(rows.rows())
    }

    async fn cancel(&self) -> Result<(), BackendError> {
        self.recorder.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Text-format rows; `None` is NULL.
pub fn rows(columns: &[(&str, Type)], data: &[&[Option<&str>]]) -> Vec<Row> {
    let columns: Arc<[ColumnInfo]> = columns
        .iter()
        .map(|(name, ty)| ColumnInfo::new(*name, ty.clone()))
        .collect();
    data.iter()
        .map(|values| {
            let values = values
                .iter()
                .map(|v| v.map(|text| Bytes::copy_from_slice(text.as_bytes())))
                .collect();
            Row::new(Arc::clone(&columns), values)
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub profile: Option<Profile>,
    pub posts: Vec<Post>,
}

impl Model for User {
    fn describe(t: &mut TableBuilder<Self>) {
        t.column("id", |u| &u.id, |u| &mut u.id).pk();
        t.column("name", |u| &u.name, |u| &mut u.name);
        t.column("email", |u| &u.email, |u| &mut u.email);
        t.has_one("profile", |u| &mut u.profile);
        t.has_many("posts", |u| &mut u.posts);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub bio: String,
}

impl Model for Profile {
    fn describe(t: &mut TableBuilder<Self>) {
        t.column("id", |p| &p.id, |p| &mut p.id).pk();
        t.column("user_id", |p| &p.user_id, |p| &mut p.user_id);
        t.column("bio", |p| &p.bio, |p| &mut p.bio);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub author: Option<User>,
    pub tags: Vec<Tag>,
}

impl Model for Post {
    fn describe(t: &mut TableBuilder<Self>) {
        t.column("id", |p| &p.id, |p| &mut p.id).pk();
        t.column("user_id", |p| &p.user_id, |p| &mut p.user_id);
        t.column("title", |p| &p.title, |p| &mut p.title);
        t.belongs_to("author", |p| &mut p.author)
            .join_fk(["user_id"]);
        t.many_to_many("tags", |p| &mut p.tags)
            .m2m_table("post_tags");
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

impl Model for Tag {
    fn describe(t: &mut TableBuilder<Self>) {
        t.column("id", |t| &t.id, |t| &mut t.id).pk();
        t.column("name", |t| &t.name, |t| &mut t.name);
    }
}

/// A soft-delete model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub body: String,
    pub deleted_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Model for Comment {
    fn describe(t: &mut TableBuilder<Self>) {
        t.column("id", |c| &c.id, |c| &mut c.id).pk();
        t.column("body", |c| &c.body, |c| &mut c.body);
        t.column("deleted_at", |c| &c.deleted_at, |c| &mut c.deleted_at)
            .soft_delete();
    }
}

pub fn user_rows(data: &[(i64, &str)]) -> Vec<Row> {
    let ids: Vec<String> = data.iter().map(|(id, _)| id.to_string()).collect();
    let rows_data: Vec<Vec<Option<&str>>> = data
        .iter()
        .zip(&ids)
        .map(|((_, name), id)| vec![Some(id.as_str()), Some(*name), None])
        .collect();
    let refs: Vec<&[Option<&str>]> = rows_data.iter().map(Vec::as_slice).collect();
    rows(
        &[("id", Type::INT8), ("name", Type::TEXT), ("email", Type::TEXT)],
        &refs,
    )
}

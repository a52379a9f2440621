//! Async backend over [`tokio_postgres`].
//!
//! ```no_run
//! use relata_core::Db;
//! use relata_postgres::PgBackend;
//!
//! # async fn run() -> relata_core::Result<()> {
//! let backend = PgBackend::connect("host=localhost user=postgres").await?;
//! let db = Db::new(backend);
//! db.exec("SELECT 1", ()).await?;
//! # Ok(())
//! # }
//! ```

use std::error::Error;
use std::pin::pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use relata_core::{
    Backend, BackendError, ColumnInfo, CopyRowCounter, RelataError, Row, RowStream, Value,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::{Client, NoTls};

const COPY_CHUNK: usize = 8 * 1024;

/// Column bytes exactly as the server sent them.
struct RawBytes(Bytes);

impl<'a> FromSql<'a> for RawBytes {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(RawBytes(Bytes::copy_from_slice(raw)))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn params(values: &[Value]) -> impl ExactSizeIterator<Item = &(dyn ToSql + Sync)> {
    values.iter().map(|value| value as &(dyn ToSql + Sync))
}

fn convert_row(
    columns: &mut Option<Arc<[ColumnInfo]>>,
    row: tokio_postgres::Row,
) -> Result<Row, BackendError> {
    let columns = columns
        .get_or_insert_with(|| {
            row.columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_().clone()).binary())
                .collect()
        })
        .clone();
    let values = (0..row.len())
        .map(|idx| {
            row.try_get::<_, Option<RawBytes>>(idx)
                .map(|raw| raw.map(|raw| raw.0))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Row::new(columns, values))
}

/// A [`Backend`] over one [`tokio_postgres::Client`].
pub struct PgBackend {
    client: Client,
}

impl PgBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connects without TLS and drives the connection on a spawned task.
    pub async fn connect(config: &str) -> relata_core::Result<Self> {
        let (client, connection) = tokio_postgres::connect(config, NoTls)
            .await
            .map_err(RelataError::connect)?;
        tokio::spawn(async move {
            if let Err(_err) = connection.await {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %_err, "relata.connection");
            }
        });
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Backend for PgBackend {
    async fn execute(&self, sql: &str, values: &[Value]) -> Result<u64, BackendError> {
        Ok(self.client.execute_raw(sql, params(values)).await?)
    }

    async fn query(&self, sql: &str, values: &[Value]) -> Result<RowStream, BackendError> {
        let stream = self.client.query_raw(sql, params(values)).await?;
        let mut columns = None;
        Ok(stream
            .map(move |row| convert_row(&mut columns, row?))
            .boxed())
    }

    async fn copy_in(
        &self,
        sql: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64, BackendError> {
        let sink = self.client.copy_in::<_, Bytes>(sql).await?;
        let mut sink = pin!(sink);
        loop {
            let mut buf = BytesMut::with_capacity(COPY_CHUNK);
            if reader.read_buf(&mut buf).await? == 0 {
                break;
            }
            sink.send(buf.freeze()).await?;
        }
        Ok(sink.as_mut().finish().await?)
    }

    async fn copy_out(
        &self,
        sql: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, BackendError> {
        let stream = self.client.copy_out(sql).await?;
        let mut stream = pin!(stream);
        let mut rows = CopyRowCounter::new(sql);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            rows.feed(&chunk);
            writer.write_all(&chunk).await?;
        }
        writer.flush().await?;
        Ok(rows.rows())
    }

    async fn cancel(&self) -> Result<(), BackendError> {
        self.client.cancel_token().cancel_query(NoTls).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bad_config_is_a_connection_error() {
        let err = match PgBackend::connect("port=not-a-number").await {
            Ok(_) => panic!("connected with an invalid config"),
            Err(err) => err,
        };
        assert!(matches!(err, RelataError::Connect(_)));
    }
}

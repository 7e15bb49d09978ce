use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use mongodb::bson::{Bson, Document};
use mongodb::{Collection, Cursor, Database};

use crate::error::{Error, Result};

/// Lazily produced aggregation results.
pub type DocumentStream = BoxStream<'static, mongodb::error::Result<Document>>;

/// Something that can run an aggregation pipeline and name itself for shell
/// text. Implemented for [`Collection`].
pub trait AggregateTarget {
    fn collection_name(&self) -> &str;

    fn run_pipeline(
        &self,
        pipeline: Vec<Document>,
    ) -> BoxFuture<'_, mongodb::error::Result<DocumentStream>>;
}

/// Something that can run an administrative command. Implemented for
/// [`Database`].
pub trait CommandTarget {
    fn command(&self, command: Document) -> BoxFuture<'_, mongodb::error::Result<Document>>;
}

impl AggregateTarget for Collection<Document> {
    fn collection_name(&self) -> &str {
        self.name()
    }

    fn run_pipeline(
        &self,
        pipeline: Vec<Document>,
    ) -> BoxFuture<'_, mongodb::error::Result<DocumentStream>> {
        Box::pin(async move {
            let cursor: Cursor<Document> = self.aggregate(pipeline, None).await?;
            Ok(cursor.boxed())
        })
    }
}

impl CommandTarget for Database {
    fn command(&self, command: Document) -> BoxFuture<'_, mongodb::error::Result<Document>> {
        Box::pin(async move { self.run_command(command, None).await })
    }
}

/// Stream over documents that are already in memory.
pub fn stream_from_documents(documents: Vec<Document>) -> DocumentStream {
    stream::iter(documents.into_iter().map(Ok)).boxed()
}

/// Extract `cursor.firstBatch` from a raw command reply such as the one
/// returned by `{aggregate: .., cursor: {}}`.
pub fn first_batch(reply: &Bson) -> Result<Vec<Document>> {
    let batch = match reply {
        Bson::Document(doc) => doc
            .get_document("cursor")
            .ok()
            .and_then(|cursor| cursor.get_array("firstBatch").ok()),
        _ => None,
    };

    let Some(batch) = batch else {
        return Err(Error::type_mismatch("a command cursor reply", reply));
    };

    batch
        .iter()
        .map(|item| match item {
            Bson::Document(doc) => Ok(doc.clone()),
            other => Err(Error::type_mismatch("a firstBatch entry", other)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use mongodb::bson::doc;

    #[test]
    fn test_first_batch_extracts_documents() {
        let reply = Bson::Document(doc! {
            "cursor": { "firstBatch": [ { "a": 1 }, { "a": 2 } ], "id": 0_i64, "ns": "db.c" },
            "ok": 1.0,
        });
        let docs = first_batch(&reply).unwrap();
        assert_eq!(docs, vec![doc! { "a": 1 }, doc! { "a": 2 }]);
    }

    #[test]
    fn test_first_batch_rejects_other_values() {
        assert!(matches!(
            first_batch(&Bson::Document(doc! { "ok": 1.0 })),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            first_batch(&Bson::String("cursor".into())),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_stream_from_documents_yields_in_order() {
        let docs = vec![doc! { "n": 1 }, doc! { "n": 2 }];
        let collected: Vec<Document> = stream_from_documents(docs.clone())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(collected, docs);
    }
}

use std::future::Future;

use bson::{doc, Bson, Document};

use crate::protocol::ClientError;

/// Progress of one paginated document-store query.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorState {
    pub cursor_id: i64,
    pub accumulated: Vec<Bson>,
    pub source_collection: String,
}

impl CursorState {
    /// Read the cursor descriptor of a successful command reply.
    ///
    /// Returns `None` when the reply is not `ok: 1` or carries no cursor, in
    /// which case the reply is already the final result.
    pub fn from_reply(reply: &Document) -> Option<Self> {
        if !is_ok(reply) {
            return None;
        }
        let cursor = reply.get_document("cursor").ok().filter(|c| !c.is_empty())?;

        let accumulated = cursor
            .get_array("firstBatch")
            .map(|batch| batch.clone())
            .unwrap_or_default();
        let source_collection = cursor
            .get_str("ns")
            .ok()
            .and_then(|ns| ns.split_once('.'))
            .map(|(_, collection)| collection.to_string())
            .unwrap_or_default();

        Some(Self {
            cursor_id: cursor.get("id").and_then(cursor_id).unwrap_or(0),
            accumulated,
            source_collection,
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor_id <= 0
    }

    /// The follow-up command asking for the next batch.
    pub fn get_more(&self) -> Document {
        doc! {
            "getMore": Bson::Int64(self.cursor_id),
            "collection": self.source_collection.as_str(),
        }
    }
}

/// `ok: 1` in any numeric representation.
pub fn is_ok(reply: &Document) -> bool {
    match reply.get("ok") {
        Some(Bson::Int32(v)) => *v == 1,
        Some(Bson::Int64(v)) => *v == 1,
        Some(Bson::Double(v)) => *v == 1.0,
        Some(Bson::Boolean(v)) => *v,
        _ => false,
    }
}

/// Integral cursor id; anything else counts as exhausted.
pub fn cursor_id(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int64(v) => Some(*v),
        Bson::Int32(v) => Some(i64::from(*v)),
        Bson::Double(v) if v.fract() == 0.0 => Some(*v as i64),
        _ => None,
    }
}

/// Materialize every batch of a cursor reply into one array.
///
/// `fetch` runs one follow-up command and yields its reply. Batches are
/// requested one at a time with the original cursor id. Draining stops when
/// a follow-up is not `ok: 1`, has no cursor, or reports a different cursor
/// id (an exhausted cursor reports zero); the batches gathered so far are
/// returned. Replies that are not cursor replies come back unchanged.
pub async fn drain_cursor<F, Fut>(reply: Bson, mut fetch: F) -> Result<Bson, ClientError>
where
    F: FnMut(Document) -> Fut,
    Fut: Future<Output = Result<Bson, ClientError>>,
{
    let Some(mut state) = reply.as_document().and_then(CursorState::from_reply) else {
        return Ok(reply);
    };

    if !state.is_exhausted() {
        let requested = state.cursor_id;
        loop {
            let batch = fetch(state.get_more()).await?;
            let Some(batch) = batch.as_document() else {
                break;
            };
            if !is_ok(batch) {
                break;
            }
            let Some(cursor) = batch.get_document("cursor").ok().filter(|c| !c.is_empty()) else {
                break;
            };

            if let Ok(next) = cursor.get_array("nextBatch") {
                state.accumulated.extend(next.iter().cloned());
            }

            if cursor.get("id").and_then(cursor_id) != Some(requested) {
                break;
            }
        }
    }

    tracing::trace!(
        "Drained {} documents from {}",
        state.accumulated.len(),
        state.source_collection
    );
    Ok(Bson::Array(state.accumulated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    fn first_reply(id: i64, docs: Vec<i32>) -> Bson {
        Bson::Document(doc! {
            "ok": 1.0,
            "cursor": {
                "id": Bson::Int64(id),
                "ns": "shop.orders",
                "firstBatch": docs.into_iter().map(|n| Bson::Document(doc! { "n": n })).collect::<Vec<_>>(),
            },
        })
    }

    fn next_reply(id: i64, docs: Vec<i32>) -> Bson {
        Bson::Document(doc! {
            "ok": 1.0,
            "cursor": {
                "id": Bson::Int64(id),
                "ns": "shop.orders",
                "nextBatch": docs.into_iter().map(|n| Bson::Document(doc! { "n": n })).collect::<Vec<_>>(),
            },
        })
    }

    fn numbers(result: &Bson) -> Vec<i32> {
        result
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d.as_document().unwrap().get_i32("n").unwrap())
            .collect()
    }

    /// Serves scripted replies and records every follow-up command.
    fn scripted(
        replies: Vec<Bson>,
    ) -> (
        Arc<Mutex<Vec<Document>>>,
        impl FnMut(Document) -> std::future::Ready<Result<Bson, ClientError>>,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let mut replies: VecDeque<Bson> = replies.into();
        let fetch = move |command: Document| {
            log.lock().unwrap().push(command);
            std::future::ready(replies.pop_front().ok_or(ClientError::Closed))
        };
        (seen, fetch)
    }

    #[tokio::test]
    async fn test_drains_until_cursor_is_exhausted() {
        let (seen, fetch) = scripted(vec![next_reply(7, vec![3, 4]), next_reply(0, vec![5])]);
        let result = drain_cursor(first_reply(7, vec![1, 2]), fetch).await.unwrap();

        assert_eq!(numbers(&result), vec![1, 2, 3, 4, 5]);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], doc! { "getMore": Bson::Int64(7), "collection": "orders" });
    }

    #[tokio::test]
    async fn test_stops_on_failed_batch() {
        let (seen, fetch) = scripted(vec![
            Bson::Document(doc! { "ok": 0.0, "errmsg": "cursor killed" }),
            next_reply(0, vec![9]),
        ]);
        let result = drain_cursor(first_reply(7, vec![1]), fetch).await.unwrap();

        assert_eq!(numbers(&result), vec![1]);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stops_on_cursor_id_mismatch() {
        let (seen, fetch) = scripted(vec![next_reply(3, vec![2]), next_reply(0, vec![3])]);
        let result = drain_cursor(first_reply(7, vec![1]), fetch).await.unwrap();

        assert_eq!(numbers(&result), vec![1, 2]);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stops_on_missing_cursor() {
        let (_, fetch) = scripted(vec![Bson::Document(doc! { "ok": 1 })]);
        let result = drain_cursor(first_reply(7, vec![1]), fetch).await.unwrap();
        assert_eq!(numbers(&result), vec![1]);
    }

    #[tokio::test]
    async fn test_exhausted_first_batch_needs_no_follow_up() {
        let (seen, fetch) = scripted(vec![]);
        let result = drain_cursor(first_reply(0, vec![1, 2]), fetch).await.unwrap();
        assert_eq!(numbers(&result), vec![1, 2]);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_cursor_reply_is_returned_unchanged() {
        let reply = Bson::Document(doc! { "ok": 1, "n": 42 });
        let (_, fetch) = scripted(vec![]);
        assert_eq!(drain_cursor(reply.clone(), fetch).await.unwrap(), reply);

        let failed = Bson::Document(doc! { "ok": 0, "cursor": { "id": 5_i64 } });
        let (_, fetch) = scripted(vec![]);
        assert_eq!(drain_cursor(failed.clone(), fetch).await.unwrap(), failed);
    }

    #[tokio::test]
    async fn test_fetch_errors_propagate() {
        let (_, fetch) = scripted(vec![]);
        let err = drain_cursor(first_reply(7, vec![1]), fetch).await.unwrap_err();
        assert_eq!(err, ClientError::Closed);
    }

    #[test]
    fn test_cursor_id_forms() {
        assert_eq!(cursor_id(&Bson::Int64(12)), Some(12));
        assert_eq!(cursor_id(&Bson::Int32(5)), Some(5));
        assert_eq!(cursor_id(&Bson::Double(3.0)), Some(3));
        assert_eq!(cursor_id(&Bson::Double(3.5)), None);
        assert_eq!(cursor_id(&Bson::String("7".into())), None);
    }
}

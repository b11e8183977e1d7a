//! Bounded relay between a store read and a response body.
//!
//! A pump task moves chunks from the upstream store stream into a bounded
//! channel; the response body drains the other end. When the client is
//! slow the channel fills and the pump stops pulling from the store. When
//! the client goes away the body (and with it the receiver) is dropped,
//! the pump sees the channel close and drops the upstream stream, which
//! releases the store connection or file handle.

use crate::store::ByteStream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How a relayed transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Completed,
    /// The client stopped reading before the window was sent.
    ClientGone,
    /// The store read failed mid-transfer.
    UpstreamFailed,
}

/// Spawn a pump from `upstream` and return the receiving end as a stream.
///
/// `capacity` bounds the number of chunks in flight. `label` names the
/// transfer in logs.
pub fn relay(upstream: ByteStream, capacity: usize, label: String) -> ByteStream {
    let (tx, mut rx) = mpsc::channel(capacity.max(1));

    tokio::spawn(async move {
        let mut upstream = upstream;
        let mut relayed: u64 = 0;
        let outcome = loop {
            let next = tokio::select! {
                _ = tx.closed() => break RelayOutcome::ClientGone,
                next = upstream.next() => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    let len = chunk.len() as u64;
                    if tx.send(Ok(chunk)).await.is_err() {
                        break RelayOutcome::ClientGone;
                    }
                    relayed += len;
                }
                Some(Err(err)) => {
                    warn!("store read failed for {} after {} bytes: {}", label, relayed, err);
                    let _ = tx.send(Err(err)).await;
                    break RelayOutcome::UpstreamFailed;
                }
                None => break RelayOutcome::Completed,
            }
        };
        drop(upstream);

        match outcome {
            RelayOutcome::Completed => info!("streamed {} ({} bytes)", label, relayed),
            RelayOutcome::ClientGone => {
                debug!("client left {} after {} bytes, store read cancelled", label, relayed)
            }
            RelayOutcome::UpstreamFailed => {}
        }
    });

    Box::pin(futures::stream::poll_fn(move |cx| rx.poll_recv(cx)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::{TryStreamExt, stream};
    use std::{
        io,
        sync::{
            Arc,
            atomic::{AtomicBool, AtomicUsize, Ordering},
        },
        time::Duration,
    };

    /// Sets its flag when dropped.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn chunks(parts: &[&'static str]) -> ByteStream {
        let items: Vec<io::Result<Bytes>> = parts
            .iter()
            .map(|p| Ok(Bytes::from_static(p.as_bytes())))
            .collect();
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn preserves_chunk_order() {
        let out: Vec<Bytes> = relay(chunks(&["ab", "cd", "ef"]), 1, "t".into())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(out.concat(), b"abcdef");
    }

    #[tokio::test]
    async fn upstream_error_reaches_the_body() {
        let upstream: ByteStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"ok")),
            Err(io::Error::other("connection reset")),
        ]));
        let mut body = relay(upstream, 4, "t".into());

        assert_eq!(body.next().await.unwrap().unwrap(), Bytes::from_static(b"ok"));
        assert!(body.next().await.unwrap().is_err());
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn slow_reader_throttles_upstream() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let upstream: ByteStream = Box::pin(stream::iter(0..100).map(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from_static(b"x"))
        }));

        let mut body = relay(upstream, 2, "t".into());
        body.next().await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // one chunk consumed, two buffered, one held by a blocked send
        assert!(pulled.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn dropping_the_body_cancels_the_store_read() {
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = DropFlag(dropped.clone());
        let upstream: ByteStream = Box::pin(
            stream::iter(vec![Ok(Bytes::from_static(b"first"))])
                .chain(stream::pending())
                .map(move |item| {
                    let _keep = &guard;
                    item
                }),
        );

        let mut body = relay(upstream, 4, "t".into());
        assert_eq!(body.next().await.unwrap().unwrap(), Bytes::from_static(b"first"));
        drop(body);

        tokio::time::timeout(Duration::from_secs(2), async {
            while !dropped.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("store stream was not released");
    }
}

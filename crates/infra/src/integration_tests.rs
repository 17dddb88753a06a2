//! Integration tests for the full ingest pipeline.
//!
//! Tests: feed bytes → Row Source → Classifier Pool → Sinks → ProductStore
//!
//! Verifies:
//! - Every row ends up as exactly one create, update or no-op
//! - A malformed row stops the run and nothing after it is persisted
//! - Store failures surface as the run's single error without deadlocking
//! - Stalled stages wind down once the run is cancelled or dropped

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use pricefeed_core::ProductId;
    use pricefeed_products::{ListQuery, Product};

    use crate::config::{HeaderPolicy, IngestConfig};
    use crate::ingest::{IngestCoordinator, IngestError, IngestSummary};
    use crate::store::{InMemoryProductStore, InsertOutcome, PriceSwap, ProductStore, StoreError};

    /// In-memory store with switchable faults and call counters.
    #[derive(Default)]
    struct FaultyStore {
        inner: InMemoryProductStore,
        fail_lookup_of: Option<String>,
        fail_all_lookups: bool,
        fail_inserts: bool,
        fail_swaps: bool,
        hang_swaps: bool,
        inserts: AtomicUsize,
        swaps: AtomicUsize,
    }

    impl FaultyStore {
        fn writes(&self) -> usize {
            self.inserts.load(Ordering::SeqCst) + self.swaps.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProductStore for FaultyStore {
        async fn find_by_name(&self, name: &str) -> Result<Option<Product>, StoreError> {
            if self.fail_all_lookups || self.fail_lookup_of.as_deref() == Some(name) {
                tokio::task::yield_now().await;
                return Err(StoreError::Backend(format!("lookup of {name} refused")));
            }
            self.inner.find_by_name(name).await
        }

        async fn insert_if_absent(&self, product: Product) -> Result<InsertOutcome, StoreError> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            if self.fail_inserts {
                return Err(StoreError::Backend("disk full".into()));
            }
            self.inner.insert_if_absent(product).await
        }

        async fn swap_price(
            &self,
            id: ProductId,
            expected: f64,
            new_price: f64,
            at: DateTime<Utc>,
        ) -> Result<PriceSwap, StoreError> {
            self.swaps.fetch_add(1, Ordering::SeqCst);
            if self.fail_swaps {
                return Err(StoreError::Backend("replica lag".into()));
            }
            if self.hang_swaps {
                std::future::pending::<()>().await;
            }
            self.inner.swap_price(id, expected, new_price, at).await
        }

        async fn list(&self, query: &ListQuery) -> Result<Vec<Product>, StoreError> {
            self.inner.list(query).await
        }
    }

    fn coordinator(store: Arc<dyn ProductStore>, config: IngestConfig) -> IngestCoordinator {
        IngestCoordinator::new(store, config).unwrap()
    }

    async fn run(
        store: Arc<dyn ProductStore>,
        config: IngestConfig,
        feed: String,
    ) -> Result<IngestSummary, IngestError> {
        let coordinator = coordinator(store, config);
        let run = coordinator.ingest(std::io::Cursor::new(feed.into_bytes()));
        tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .expect("ingest run did not finish")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn widget_is_repriced_and_gadget_created() {
        let store = Arc::new(InMemoryProductStore::new());
        let before = Utc::now() - chrono::Duration::hours(1);
        let widget = Product::restore(ProductId::new(), "Widget".into(), 9.0, before, 3);
        let widget_id = widget.id_typed();
        store.seed(widget).unwrap();

        let summary = run(
            store.clone(),
            IngestConfig::default(),
            "Widget,10.00\nGadget,5.50\n".into(),
        )
        .await
        .unwrap();

        let gadget = store.get_by_name("Gadget").unwrap();
        assert_eq!(gadget.price(), 5.5);
        assert_eq!(gadget.price_update_count(), 0);

        let widget = store.get_by_name("Widget").unwrap();
        assert_eq!(widget.id_typed(), widget_id);
        assert_eq!(widget.price(), 10.0);
        assert_eq!(widget.price_update_count(), 4);
        assert!(widget.updated_at() > before);

        assert_eq!(summary.rows, 2);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.unchanged, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unchanged_price_makes_no_write() {
        let store = Arc::new(FaultyStore::default());
        store.inner.seed(Product::create("Widget", 10.0, Utc::now()).unwrap()).unwrap();

        let summary = run(store.clone(), IngestConfig::default(), "Widget,10\n".into())
            .await
            .unwrap();

        assert_eq!(summary.unchanged, 1);
        assert_eq!(store.writes(), 0);
        assert_eq!(store.inner.get_by_name("Widget").unwrap().price_update_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn every_row_is_accounted_for_at_any_pool_size() {
        for workers in [1, 2, 5, 16] {
            let store = Arc::new(InMemoryProductStore::new());
            for i in 0..40 {
                store
                    .seed(Product::create(format!("item-{i:03}"), 1.0, Utc::now()).unwrap())
                    .unwrap();
            }
            // 0..20 unchanged, 20..40 repriced, 40..100 new.
            let feed: String = (0..100)
                .map(|i| {
                    let price = if i < 20 { 1.0 } else { 2.0 + f64::from(i) };
                    format!("item-{i:03},{price}\n")
                })
                .collect();

            let summary = run(
                store.clone(),
                IngestConfig::default().with_workers(workers),
                feed,
            )
            .await
            .unwrap();

            assert_eq!(summary.rows, 100, "workers={workers}");
            assert_eq!(summary.classified(), 100, "workers={workers}");
            assert_eq!(summary.unchanged, 20);
            assert_eq!(summary.to_update, 20);
            assert_eq!(summary.to_create, 60);
            assert_eq!(summary.created, 60);
            assert_eq!(summary.updated, 20);
            assert_eq!(store.len(), 100);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_price_stops_everything_after_it() {
        let store = Arc::new(InMemoryProductStore::new());
        let mut feed = String::new();
        for i in 1..=5 {
            feed.push_str(&format!("before-{i},{i}\n"));
        }
        feed.push_str("broken,ten dollars\n");
        for i in 7..=50 {
            feed.push_str(&format!("after-{i},{i}\n"));
        }

        let err = run(store.clone(), IngestConfig::default(), feed)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Parse { line: 6, .. }), "{err:?}");
        assert!(store.get_by_name("broken").is_none());
        let all = store.list(&ListQuery::new(vec![], 1000, 0)).await.unwrap();
        assert!(all.iter().all(|p| p.name().starts_with("before-")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn header_row_is_skipped_by_default() {
        let store = Arc::new(InMemoryProductStore::new());
        let summary = run(
            store.clone(),
            IngestConfig::default(),
            "Name,Price\nWidget,1.25\n".into(),
        )
        .await
        .unwrap();

        assert_eq!(summary.rows, 1);
        assert_eq!(store.len(), 1);

        let err = run(
            Arc::new(InMemoryProductStore::new()),
            IngestConfig::default().with_header(HeaderPolicy::Absent),
            "Name,Price\nWidget,1.25\n".into(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IngestError::Parse { line: 1, .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lookup_failure_fails_the_run() {
        let store = Arc::new(FaultyStore {
            fail_lookup_of: Some("poison".into()),
            ..FaultyStore::default()
        });

        let err = run(
            store,
            IngestConfig::default(),
            "a,1\npoison,2\nb,3\n".into(),
        )
        .await
        .unwrap_err();

        match err {
            IngestError::Lookup { name, source } => {
                assert_eq!(name, "poison");
                assert!(matches!(source, StoreError::Backend(_)));
            }
            other => panic!("expected lookup error, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn persist_failures_fail_the_run() {
        let store = Arc::new(FaultyStore {
            fail_inserts: true,
            ..FaultyStore::default()
        });
        let err = run(store, IngestConfig::default(), "a,1\n".into())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Persist { op: "create", .. }));

        let store = Arc::new(FaultyStore {
            fail_swaps: true,
            ..FaultyStore::default()
        });
        store.inner.seed(Product::create("a", 1.0, Utc::now()).unwrap()).unwrap();
        let err = run(store, IngestConfig::default(), "a,2\n".into())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Persist { op: "update", .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn many_concurrent_failures_report_one_error_without_deadlock() {
        let store = Arc::new(FaultyStore {
            fail_all_lookups: true,
            ..FaultyStore::default()
        });
        let feed: String = (0..500).map(|i| format!("p{i},{i}\n")).collect();

        let err = run(
            store.clone(),
            IngestConfig::default().with_workers(8),
            feed,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, IngestError::Lookup { .. }));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn duplicate_rows_and_concurrent_runs_never_duplicate_names() {
        let store = Arc::new(InMemoryProductStore::new());
        let feed: String = (0..50).map(|i| format!("shared-{},{}\n", i % 10, i)).collect();

        let config = IngestConfig::default()
            .with_workers(4)
            .with_queue_capacity(4)
            .with_max_price_swaps(64);
        let a = run(store.clone(), config.clone(), feed.clone());
        let b = run(store.clone(), config, feed);
        let (a, b) = tokio::join!(a, b);
        a.unwrap();
        b.unwrap();

        assert_eq!(store.len(), 10);
        for i in 0..10 {
            assert!(store.get_by_name(&format!("shared-{i}")).is_some());
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_feed_is_a_fetch_error() {
        let coordinator = coordinator(
            Arc::new(InMemoryProductStore::new()),
            IngestConfig::default(),
        );
        let err = coordinator
            .fetch("http://127.0.0.1:1/feed.csv")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Fetch(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stalled_sink_and_blocked_workers_stop_when_a_lookup_fails() {
        let store = Arc::new(FaultyStore {
            hang_swaps: true,
            fail_lookup_of: Some("poison".into()),
            ..FaultyStore::default()
        });
        for name in ["a", "b", "c"] {
            store.inner.seed(Product::create(name, 1.0, Utc::now()).unwrap()).unwrap();
        }

        // The update sink parks inside swap_price on "a", "b" fills the update
        // queue and the worker holding "c" parks on its send. A fourth worker
        // is still free to fail on "poison".
        let coordinator = coordinator(store.clone(), IngestConfig::default().with_workers(4));
        let feed = std::io::Cursor::new(b"a,2\nb,2\nc,2\npoison,1\n".to_vec());
        let err = tokio::time::timeout(Duration::from_secs(2), coordinator.ingest(feed))
            .await
            .expect("stalled stages did not wind down")
            .unwrap_err();

        assert!(matches!(err, IngestError::Lookup { ref name, .. } if name == "poison"), "{err:?}");
        assert!(store.swaps.load(Ordering::SeqCst) <= 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dropping_a_run_stops_reading_and_writing() {
        let store = Arc::new(InMemoryProductStore::new());
        let coordinator = coordinator(store.clone(), IngestConfig::default());
        let (mut feed, body) = tokio::io::duplex(64);

        feed.write_all(b"a,1\n").await.unwrap();
        let run = tokio::spawn(async move { coordinator.ingest(body).await });

        tokio::time::timeout(Duration::from_secs(5), async {
            while store.get_by_name("a").is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("first row was never persisted");

        run.abort();
        assert!(run.await.unwrap_err().is_cancelled());

        // The body is gone, so this write may fail; either way nothing lands.
        let _ = feed.write_all(b"b,2\nc,3\n").await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.len(), 1);
        assert!(store.get_by_name("b").is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stalled_feed_body_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/feed.csv", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\nWidget,1\n")
                .await
                .unwrap();
            // Promise more bytes than are ever sent.
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let mut config = IngestConfig::default();
        config.request_timeout_secs = 1;
        let store = Arc::new(InMemoryProductStore::new());
        let coordinator = coordinator(store.clone(), config);

        let err = tokio::time::timeout(Duration::from_secs(10), coordinator.fetch(&url))
            .await
            .expect("stalled body kept fetch waiting")
            .unwrap_err();
        server.abort();

        assert!(matches!(err, IngestError::Read { .. }), "{err:?}");
    }
}

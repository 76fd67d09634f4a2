// End-to-end feed writes:
// * body order equals input order under random completion order
// * every record in the body equals its isolated encoding
// * all-or-nothing output on failure
// * failure policies, cancellation, timeout, encoder panics
// * bounded vs unbounded live-buffer peak, one pool across windows
// * strategies agree byte-for-byte where they preserve order

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::fs;
    use std::sync::Mutex;
    use std::thread::{self, ThreadId};
    use std::time::Duration;

    use proptest::prelude::*;
    use rand::Rng;

    use feed_core::feed::{
        decode_feed, write_feed, write_feed_to, Concurrency, Envelope, RECORD_PREFIX_LEN, FailurePolicy, OutputSink, Strategy, WriteConfig,
    };
    use feed_core::headers::PayloadFormat;
    use feed_core::model::{
        EncodeErrorKind, EncodeFailure, EntityType, JsonEntryEncoder, Model, PropertyDef, PropertyKind, Record,
        RecordEncoder, Value,
    };
    use feed_core::telemetry::Stage;
    use feed_core::types::FeedError;

    // ------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------
    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn customers_model() -> Model {
        Model::builder("http://host/service/")
            .entity_type(
                EntityType::new("Customer")
                    .property(PropertyDef::required("ID", PropertyKind::Int64))
                    .property(PropertyDef::new("Name", PropertyKind::String)),
            )
            .entity_set("Customers", "Customer")
            .build()
            .unwrap()
    }

    fn customer(id: i64) -> Record {
        Record::new().with_property("ID", id).with_property("Name", format!("c{id}"))
    }

    fn customers(n: usize) -> Vec<Record> {
        (0..n as i64).map(customer).collect()
    }

    fn record_id(record: &Record) -> i64 {
        match record.property("ID") {
            Some(Value::Int(id)) => *id,
            other => panic!("record without ID: {other:?}"),
        }
    }

    /// Writes the record ID as text after a random delay, so tasks finish out of order.
    struct JitterEncoder {
        max_delay_us: u64,
    }

    impl RecordEncoder for JitterEncoder {
        fn encode(&self, record: &Record, _model: &Model) -> Result<Vec<u8>, EncodeFailure> {
            let delay = rand::thread_rng().gen_range(0..=self.max_delay_us);
            thread::sleep(Duration::from_micros(delay));
            Ok(record_id(record).to_string().into_bytes())
        }
    }

    /// Fails the records whose ID is listed.
    struct FailingEncoder {
        fail_ids: Vec<i64>,
        delay: Duration,
    }

    impl RecordEncoder for FailingEncoder {
        fn encode(&self, record: &Record, _model: &Model) -> Result<Vec<u8>, EncodeFailure> {
            thread::sleep(self.delay);
            let id = record_id(record);
            if self.fail_ids.contains(&id) {
                return Err(EncodeFailure::schema(format!("rejected {id}")));
            }
            Ok(id.to_string().into_bytes())
        }
    }

    struct PanickingEncoder {
        panic_id: i64,
    }

    impl RecordEncoder for PanickingEncoder {
        fn encode(&self, record: &Record, _model: &Model) -> Result<Vec<u8>, EncodeFailure> {
            let id = record_id(record);
            if id == self.panic_id {
                panic!("encoder blew up on {id}");
            }
            Ok(id.to_string().into_bytes())
        }
    }

    /// Remembers which threads ran encodes.
    #[derive(Default)]
    struct ThreadTrackingEncoder {
        threads: Mutex<HashSet<ThreadId>>,
    }

    impl RecordEncoder for ThreadTrackingEncoder {
        fn encode(&self, record: &Record, _model: &Model) -> Result<Vec<u8>, EncodeFailure> {
            self.threads.lock().unwrap().insert(thread::current().id());
            Ok(record_id(record).to_string().into_bytes())
        }
    }

    fn ids_in(wire: &[u8]) -> Vec<i64> {
        let view = decode_feed(wire).unwrap();
        view.records
            .iter()
            .map(|p| std::str::from_utf8(p).unwrap().parse::<i64>().unwrap())
            .collect()
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("feed_core_{}_{}", std::process::id(), name))
    }

    // ------------------------------------------------------------
    // Ordering and self-containment
    // ------------------------------------------------------------
    #[test]
    fn body_order_matches_input_under_random_delays() {
        init_logs();
        let model = customers_model();
        let records = customers(500);
        let config = WriteConfig::unbounded().with_workers(8);

        let mut sink = Vec::new();
        let report = write_feed(&records, &model, &JitterEncoder { max_delay_us: 500 }, &config, &mut sink).unwrap();

        assert_eq!(ids_in(&sink), (0..500).collect::<Vec<i64>>());
        assert_eq!(report.snapshot.records_encoded, 500);
        assert_eq!(report.bytes_written, sink.len() as u64);
    }

    #[test]
    fn bounded_windows_keep_order() {
        let model = customers_model();
        let records = customers(103);
        let config = WriteConfig::bounded(10).with_workers(4);

        let mut sink = Vec::new();
        let report = write_feed(&records, &model, &JitterEncoder { max_delay_us: 200 }, &config, &mut sink).unwrap();

        assert_eq!(ids_in(&sink), (0..103).collect::<Vec<i64>>());
        assert_eq!(report.snapshot.windows_dispatched, 11);
    }

    #[test]
    fn each_record_equals_its_isolated_encoding() {
        let model = customers_model();
        let records = customers(64);
        let encoder = JsonEntryEncoder::default();

        let mut sink = Vec::new();
        write_feed(&records, &model, &encoder, &WriteConfig::unbounded().with_workers(6), &mut sink).unwrap();

        let view = decode_feed(&sink).unwrap();
        assert_eq!(view.header.format(), Some(PayloadFormat::Json));
        assert_eq!(view.header.context, "http://host/service/$metadata#Customers");
        for (record, payload) in records.iter().zip(&view.records) {
            let alone = encoder.encode(record, &model).unwrap();
            assert_eq!(*payload, alone.as_slice());
        }
        assert_eq!(view.records[7], br#"{"ID":7,"Name":"c7"}"#);
    }

    // ------------------------------------------------------------
    // Boundaries
    // ------------------------------------------------------------
    #[test]
    fn empty_batch_writes_markers_only() {
        let model = customers_model();
        let mut sink = Vec::new();
        let report = write_feed(&[], &model, &JsonEntryEncoder::default(), &WriteConfig::default(), &mut sink).unwrap();

        let view = decode_feed(&sink).unwrap();
        assert!(view.is_empty());
        assert_eq!(view.header.record_count, 0);
        assert_eq!(view.trailer.body_len, 0);
        assert_eq!(report.snapshot.bytes_body, 0);
        assert_eq!(report.snapshot.peak_live_buffers, 0);
    }

    #[test]
    fn single_record_feed() {
        let model = customers_model();
        let mut sink = Vec::new();
        write_feed(&[customer(42)], &model, &JsonEntryEncoder::default(), &WriteConfig::default(), &mut sink).unwrap();

        let view = decode_feed(&sink).unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view.records[0], br#"{"ID":42,"Name":"c42"}"#);
    }

    #[test]
    fn worker_count_above_record_count_is_fine() {
        let model = customers_model();
        let mut sink = Vec::new();
        let config = WriteConfig::default().with_workers(64);
        write_feed(&customers(3), &model, &JitterEncoder { max_delay_us: 50 }, &config, &mut sink).unwrap();
        assert_eq!(ids_in(&sink), vec![0, 1, 2]);
    }

    // ------------------------------------------------------------
    // Failures
    // ------------------------------------------------------------
    #[test]
    fn failure_at_index_two_leaves_sink_empty() {
        let model = customers_model();
        let mut records = customers(5);
        records[2] = Record::new().with_property("ID", 2i64).with_property("Name", 17i64);

        let mut sink = Vec::new();
        let err = write_feed(&records, &model, &JsonEntryEncoder::default(), &WriteConfig::default(), &mut sink)
            .unwrap_err();

        assert!(sink.is_empty(), "no bytes may reach the sink on failure");
        match &err {
            FeedError::PartialBatchFailure { failures, failed, total } => {
                assert_eq!(*failed, 1);
                assert_eq!(*total, 5);
                assert_eq!(failures[0].index, 2);
                assert_eq!(failures[0].kind, EncodeErrorKind::SchemaViolation);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.failed_indices(), vec![2]);
    }

    #[test]
    fn abort_on_first_reports_lowest_index() {
        let model = customers_model();
        let encoder = FailingEncoder { fail_ids: vec![40, 9, 77], delay: Duration::ZERO };
        let config = WriteConfig::unbounded().with_workers(4);

        let mut sink = Vec::new();
        let err = write_feed(&customers(100), &model, &encoder, &config, &mut sink).unwrap_err();

        assert!(sink.is_empty());
        assert_eq!(err.failed_indices(), vec![9]);
    }

    #[test]
    fn collect_all_reports_every_failure_in_order() {
        let model = customers_model();
        let encoder = FailingEncoder { fail_ids: vec![40, 9, 77], delay: Duration::ZERO };
        let config = WriteConfig::bounded(16)
            .with_workers(4)
            .with_failure_policy(FailurePolicy::CollectAll);

        let mut sink = Vec::new();
        let err = write_feed(&customers(100), &model, &encoder, &config, &mut sink).unwrap_err();

        assert!(sink.is_empty());
        assert_eq!(err.failed_indices(), vec![9, 40, 77]);
        assert!(matches!(err, FeedError::PartialBatchFailure { failed: 3, total: 100, .. }));
    }

    #[test]
    fn encoder_panic_is_a_failed_record() {
        let model = customers_model();
        let config = WriteConfig::unbounded().with_workers(4);

        let mut sink = Vec::new();
        let err = write_feed(&customers(20), &model, &PanickingEncoder { panic_id: 3 }, &config, &mut sink)
            .unwrap_err();

        assert!(sink.is_empty());
        match err {
            FeedError::PartialBatchFailure { failures, .. } => {
                assert_eq!(failures[0].index, 3);
                assert_eq!(failures[0].kind, EncodeErrorKind::Panicked);
                assert!(failures[0].message.contains("blew up on 3"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn cancel_on_failure_still_reports_the_failure() {
        let model = customers_model();
        let encoder = FailingEncoder { fail_ids: vec![0], delay: Duration::from_millis(1) };
        let config = WriteConfig::unbounded().with_workers(1).with_cancel_on_failure(true);

        let mut sink = Vec::new();
        let err = write_feed(&customers(30), &model, &encoder, &config, &mut sink).unwrap_err();

        assert!(sink.is_empty());
        assert!(matches!(err, FeedError::PartialBatchFailure { failed: 1, total: 30, .. }));
    }

    #[test]
    fn deadline_yields_barrier_timeout() {
        let model = customers_model();
        let encoder = FailingEncoder { fail_ids: vec![], delay: Duration::from_millis(30) };
        let config = WriteConfig::unbounded()
            .with_workers(2)
            .with_timeout(Duration::from_millis(10));

        let mut sink = Vec::new();
        let err = write_feed(&customers(40), &model, &encoder, &config, &mut sink).unwrap_err();

        assert!(sink.is_empty());
        match err {
            FeedError::BarrierTimeout { limit, completed, total, .. } => {
                assert_eq!(limit, Duration::from_millis(10));
                assert_eq!(total, 40);
                assert!(completed < 40);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_config_is_rejected_before_writing() {
        let model = customers_model();
        let mut sink = Vec::new();
        let config = WriteConfig { concurrency: Concurrency::Bounded(0), ..WriteConfig::default() };
        let err = write_feed(&customers(2), &model, &JsonEntryEncoder::default(), &config, &mut sink).unwrap_err();
        assert!(matches!(err, FeedError::Config(_)));
        assert!(sink.is_empty());
    }

    // ------------------------------------------------------------
    // Memory profile
    // ------------------------------------------------------------
    #[test]
    fn unbounded_holds_every_buffer_at_the_barrier() {
        let model = customers_model();
        let mut sink = Vec::new();
        let report = write_feed(
            &customers(50),
            &model,
            &JsonEntryEncoder::default(),
            &WriteConfig::unbounded().with_workers(4),
            &mut sink,
        )
        .unwrap();
        assert_eq!(report.snapshot.peak_live_buffers, 50);
    }

    #[test]
    fn bounded_limits_live_buffers() {
        let model = customers_model();
        let mut sink = Vec::new();
        let report = write_feed(
            &customers(200),
            &model,
            &JitterEncoder { max_delay_us: 100 },
            &WriteConfig::bounded(8).with_workers(4),
            &mut sink,
        )
        .unwrap();

        assert!(report.snapshot.peak_live_buffers <= 8, "peak {}", report.snapshot.peak_live_buffers);
        assert_eq!(report.snapshot.windows_dispatched, 25);
        assert_eq!(ids_in(&sink).len(), 200);
    }

    #[test]
    fn bounded_windows_share_one_worker_pool() {
        let model = customers_model();
        let encoder = ThreadTrackingEncoder::default();
        let mut sink = Vec::new();
        let report = write_feed(&customers(400), &model, &encoder, &WriteConfig::bounded(4).with_workers(4), &mut sink)
            .unwrap();

        assert_eq!(report.snapshot.windows_dispatched, 100);
        let threads = encoder.threads.lock().unwrap().len();
        assert!(threads <= 4, "{threads} distinct worker threads across 100 windows");
        assert_eq!(ids_in(&sink), (0..400).collect::<Vec<i64>>());
    }

    #[test]
    fn bounded_throughput_stays_close_to_unbounded() {
        let model = customers_model();
        let records = customers(64);
        let encoder = FailingEncoder { fail_ids: Vec::new(), delay: Duration::from_millis(2) };

        let mut sink = Vec::new();
        let unbounded = write_feed(&records, &model, &encoder, &WriteConfig::unbounded().with_workers(4), &mut sink)
            .unwrap()
            .snapshot
            .elapsed;

        sink.clear();
        let bounded = write_feed(&records, &model, &encoder, &WriteConfig::bounded(8).with_workers(4), &mut sink)
            .unwrap()
            .snapshot
            .elapsed;

        assert!(
            bounded < unbounded * 3 + Duration::from_millis(50),
            "bounded {bounded:?} vs unbounded {unbounded:?}"
        );
    }

    #[test]
    fn envelope_is_presized_for_the_batch() {
        let envelope = Envelope::for_records(100, 60);
        assert!(envelope.capacity() >= 100 * (RECORD_PREFIX_LEN + 60));
        assert_eq!(envelope.staged_len(), 0);
    }

    // ------------------------------------------------------------
    // Strategies
    // ------------------------------------------------------------
    #[test]
    fn sequential_and_slotted_are_byte_identical() {
        let model = customers_model();
        let records = customers(128);
        let encoder = JsonEntryEncoder::default();

        let mut sequential = Vec::new();
        write_feed(&records, &model, &encoder, &WriteConfig::sequential(), &mut sequential).unwrap();

        let mut slotted = Vec::new();
        write_feed(&records, &model, &encoder, &WriteConfig::bounded(7).with_workers(5), &mut slotted).unwrap();

        assert_eq!(sequential, slotted);
    }

    #[test]
    fn shared_lock_writes_every_record_once() {
        let model = customers_model();
        let config = WriteConfig::shared_lock_baseline().with_workers(4);

        let mut sink = Vec::new();
        write_feed(&customers(300), &model, &JitterEncoder { max_delay_us: 100 }, &config, &mut sink).unwrap();

        let mut ids = ids_in(&sink);
        ids.sort_unstable();
        assert_eq!(ids, (0..300).collect::<Vec<i64>>());
    }

    #[test]
    fn shared_lock_failure_leaves_sink_empty() {
        let model = customers_model();
        let encoder = FailingEncoder { fail_ids: vec![5], delay: Duration::ZERO };
        let config = WriteConfig::shared_lock_baseline().with_workers(3);

        let mut sink = Vec::new();
        let err = write_feed(&customers(20), &model, &encoder, &config, &mut sink).unwrap_err();
        assert!(sink.is_empty());
        assert_eq!(err.failed_indices(), vec![5]);
    }

    #[test]
    fn shared_lock_requires_unordered_opt_in() {
        let model = customers_model();
        let config = WriteConfig::unbounded().with_strategy(Strategy::SharedLock);

        let mut sink = Vec::new();
        let err = write_feed(&customers(3), &model, &JsonEntryEncoder::default(), &config, &mut sink).unwrap_err();
        assert!(matches!(err, FeedError::Config(_)));
        assert!(sink.is_empty());
    }

    #[test]
    fn sequential_abort_skips_the_rest() {
        let model = customers_model();
        let encoder = FailingEncoder { fail_ids: vec![1, 3], delay: Duration::ZERO };

        let mut sink = Vec::new();
        let err = write_feed(&customers(6), &model, &encoder, &WriteConfig::sequential(), &mut sink).unwrap_err();
        assert!(matches!(err, FeedError::PartialBatchFailure { failed: 1, total: 6, .. }));
        assert_eq!(err.failed_indices(), vec![1]);
    }

    // ------------------------------------------------------------
    // Sinks and telemetry
    // ------------------------------------------------------------
    #[test]
    fn memory_sink_returns_the_feed() {
        let model = customers_model();
        let report = write_feed_to(
            &customers(10),
            &model,
            &JsonEntryEncoder::default(),
            &WriteConfig::default(),
            OutputSink::Memory,
        )
        .unwrap();

        let output = report.output.expect("memory sink keeps output");
        assert_eq!(output.len() as u64, report.bytes_written);
        assert_eq!(decode_feed(&output).unwrap().len(), 10);
    }

    #[test]
    fn file_sink_is_not_created_on_failure() {
        let model = customers_model();
        let path = temp_path("failed.feed");
        let _ = fs::remove_file(&path);

        let encoder = FailingEncoder { fail_ids: vec![0], delay: Duration::ZERO };
        let result = write_feed_to(&customers(4), &model, &encoder, &WriteConfig::default(), OutputSink::File(path.clone()));

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn file_sink_holds_the_feed() {
        let model = customers_model();
        let path = temp_path("ok.feed");

        let report = write_feed_to(
            &customers(12),
            &model,
            &JsonEntryEncoder::default(),
            &WriteConfig::bounded(5),
            OutputSink::File(path.clone()),
        )
        .unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len() as u64, report.bytes_written);
        assert_eq!(decode_feed(&bytes).unwrap().len(), 12);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn snapshot_accounts_for_every_byte_and_record() {
        let model = customers_model();
        let mut sink = Vec::new();
        let report = write_feed(
            &customers(33),
            &model,
            &JsonEntryEncoder::default(),
            &WriteConfig::bounded(10).with_workers(3),
            &mut sink,
        )
        .unwrap();

        let snap = &report.snapshot;
        assert!(snap.sanity_check());
        assert_eq!(snap.output_bytes(), sink.len() as u64);
        assert_eq!(snap.worker_count, 3);
        assert!(snap.has_all_stages(&[Stage::Encode, Stage::Assemble, Stage::Write]));
        assert!(snap.to_json().unwrap().contains("\"peak_live_buffers\""));
    }

    // ------------------------------------------------------------
    // Determinism
    // ------------------------------------------------------------
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn output_is_independent_of_scheduling(
            ids in proptest::collection::vec(-1_000_000i64..1_000_000, 0..80),
            workers in 1usize..8,
            window in 1usize..20,
        ) {
            let model = customers_model();
            let records: Vec<Record> = ids.iter().map(|&id| customer(id)).collect();
            let encoder = JsonEntryEncoder::default();

            let mut reference = Vec::new();
            write_feed(&records, &model, &encoder, &WriteConfig::sequential(), &mut reference).unwrap();

            let mut parallel = Vec::new();
            let config = WriteConfig::bounded(window).with_workers(workers);
            write_feed(&records, &model, &encoder, &config, &mut parallel).unwrap();

            prop_assert_eq!(reference, parallel);
        }
    }
}
